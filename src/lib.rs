pub mod analysis;
pub mod auth;
pub mod authz;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod models;
pub mod routes;
pub mod schema;
pub mod state;
pub mod taxonomy;
