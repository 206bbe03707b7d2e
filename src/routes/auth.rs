use axum::{extract::State, Json};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::{password, AuthenticatedUser},
    error::{AppError, AppResult},
    models::{NewUser, User},
    schema::users::dsl,
    state::AppState,
};

const DEFAULT_ROLE: &str = "ATTORNEY";

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserResponse,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
        }
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<Json<AuthResponse>> {
    let username = payload.username.trim().to_string();
    let email = payload.email.trim().to_lowercase();
    if username.is_empty() {
        return Err(AppError::bad_request("username must not be empty"));
    }
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::bad_request("email must be a valid address"));
    }
    if payload.password.len() < 8 {
        return Err(AppError::bad_request(
            "password must be at least 8 characters",
        ));
    }

    let mut conn = state.db()?;

    let username_taken: i64 = dsl::users
        .filter(dsl::username.eq(&username))
        .count()
        .get_result(&mut conn)?;
    if username_taken > 0 {
        return Err(AppError::conflict("username already taken"));
    }

    let email_taken: i64 = dsl::users
        .filter(dsl::email.eq(&email))
        .count()
        .get_result(&mut conn)?;
    if email_taken > 0 {
        return Err(AppError::conflict("email already registered"));
    }

    let new_user = NewUser {
        id: Uuid::new_v4(),
        username,
        email,
        password_hash: password::hash_password(&payload.password)?,
        role: payload.role.unwrap_or_else(|| DEFAULT_ROLE.to_string()),
    };

    diesel::insert_into(dsl::users)
        .values(&new_user)
        .execute(&mut conn)?;

    let user: User = dsl::users.find(new_user.id).first(&mut conn)?;
    info!(username = %user.username, "user registered");

    build_auth_response(&state, user)
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let mut conn = state.db()?;

    let user: User = match dsl::users
        .filter(dsl::email.eq(payload.email.trim().to_lowercase()))
        .first(&mut conn)
    {
        Ok(user) => user,
        Err(diesel::result::Error::NotFound) => return Err(AppError::unauthorized()),
        Err(err) => return Err(AppError::from(err)),
    };

    let valid = password::verify_password(&payload.password, &user.password_hash)
        .map_err(|_| AppError::unauthorized())?;
    if !valid {
        return Err(AppError::unauthorized());
    }

    build_auth_response(&state, user)
}

pub async fn me(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<UserResponse>> {
    let mut conn = state.db()?;
    let user: User = dsl::users.find(user.user_id).first(&mut conn)?;
    Ok(Json(user.into()))
}

fn build_auth_response(state: &AppState, user: User) -> AppResult<Json<AuthResponse>> {
    let access_token = state
        .jwt
        .generate_token(user.id, &user.username, &user.role)
        .map_err(AppError::from)?;

    Ok(Json(AuthResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.config.jwt_expiry_minutes * 60,
        user: user.into(),
    }))
}
