use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use anyhow::{anyhow, ensure, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use backend::analysis::chat::ChatModel;
use backend::analysis::extract::PageExtractor;
use backend::auth::jwt::JwtService;
use backend::authz::ProjectRole;
use backend::config::AppConfig;
use backend::db::{self, PgPool};
use backend::models::{NewProject, NewProjectMember, NewUser};
use backend::routes;
use backend::state::AppState;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde::Serialize;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Scripted chat model: per-page responses keyed by the page number embedded
/// in the user message, with an invocation counter so tests can assert blank
/// pages never reach the model.
#[derive(Default)]
pub struct FakeChatModel {
    responses: StdMutex<HashMap<i32, Result<String, String>>>,
    calls: AtomicUsize,
}

impl FakeChatModel {
    pub fn respond_with(&self, page: i32, payload: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(page, Ok(payload.to_string()));
    }

    pub fn fail_page(&self, page: i32, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(page, Err(message.to_string()));
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for FakeChatModel {
    async fn complete(&self, _system: &str, user: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let page = user
            .strip_prefix("PAGE ")
            .and_then(|rest| rest.split(':').next())
            .and_then(|digits| digits.parse::<i32>().ok())
            .ok_or_else(|| anyhow!("user message missing page marker"))?;

        match self.responses.lock().unwrap().get(&page) {
            Some(Ok(payload)) => Ok(payload.clone()),
            Some(Err(message)) => Err(anyhow!(message.clone())),
            None => Ok(r#"{"risks": []}"#.to_string()),
        }
    }
}

/// Page extractor fake: returns configured pages or a configured failure,
/// ignoring the scratch file contents.
#[derive(Default)]
pub struct FakePageExtractor {
    outcome: StdMutex<Option<Result<Vec<String>, String>>>,
}

impl FakePageExtractor {
    pub fn set_pages(&self, pages: Vec<&str>) {
        let pages = pages.into_iter().map(str::to_string).collect();
        *self.outcome.lock().unwrap() = Some(Ok(pages));
    }

    pub fn fail_with(&self, message: &str) {
        *self.outcome.lock().unwrap() = Some(Err(message.to_string()));
    }
}

impl PageExtractor for FakePageExtractor {
    fn extract_pages(&self, _path: &Path) -> Result<Vec<String>> {
        match self.outcome.lock().unwrap().clone() {
            Some(Ok(pages)) => Ok(pages),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(Vec::new()),
        }
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    chat: Arc<FakeChatModel>,
    extractor: Arc<FakePageExtractor>,
    scratch_dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let database_url = env::var("TEST_DATABASE_URL")
            .context("TEST_DATABASE_URL must be set for integration tests")?;

        let scratch_dir = TempDir::new().context("failed to create scratch dir")?;

        let config = AppConfig {
            database_url: database_url.clone(),
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_minutes: 60,
            cors_allowed_origin: None,
            groq_api_key: "test-key".to_string(),
            groq_base_url: "http://127.0.0.1:0".to_string(),
            groq_model: "test-model".to_string(),
            groq_temperature: 0.1,
            analysis_concurrency: 4,
            scratch_dir: scratch_dir.path().to_path_buf(),
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let chat = Arc::new(FakeChatModel::default());
        let extractor = Arc::new(FakePageExtractor::default());
        let jwt = JwtService::from_config(&config)?;
        let state = AppState::new(
            pool.clone(),
            config,
            chat.clone(),
            extractor.clone(),
            jwt,
        );
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            router,
            chat,
            extractor,
            scratch_dir,
        })
    }

    pub async fn cleanup(&self) -> Result<()> {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get cleanup connection: {err}"))?;
            truncate_all(&mut conn)?;
            Ok(())
        })
        .await
        .context("cleanup task panicked")?
    }

    pub fn chat(&self) -> Arc<FakeChatModel> {
        self.chat.clone()
    }

    pub fn extractor(&self) -> Arc<FakePageExtractor> {
        self.extractor.clone()
    }

    /// Number of files currently in the scratch directory; zero retention
    /// means this is always zero once an analysis request has resolved.
    pub fn scratch_file_count(&self) -> Result<usize> {
        Ok(std::fs::read_dir(self.scratch_dir.path())?.count())
    }

    pub async fn insert_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<Uuid> {
        let username = username.to_string();
        let email = email.to_string();
        let password = password.to_string();
        self.with_conn(move |conn| {
            let user = NewUser {
                id: Uuid::new_v4(),
                username,
                email,
                password_hash: backend::auth::password::hash_password(&password)?,
                role: "ATTORNEY".to_string(),
            };
            diesel::insert_into(backend::schema::users::table)
                .values(&user)
                .execute(conn)
                .context("failed to insert user")?;
            Ok(user.id)
        })
        .await
    }

    /// Direct-DB project setup for tests that exercise a single operation.
    pub async fn insert_project(&self, name: &str, creator: Uuid) -> Result<Uuid> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let project = NewProject {
                id: Uuid::new_v4(),
                name,
                studio_name: None,
                director: None,
                producer: None,
                production_email: None,
                production_phone: None,
                genre: None,
                logline: None,
                expected_release: None,
                imdb_link: None,
                notes: None,
                created_by: Some(creator),
            };
            diesel::insert_into(backend::schema::projects::table)
                .values(&project)
                .execute(conn)
                .context("failed to insert project")?;

            diesel::insert_into(backend::schema::project_members::table)
                .values(&NewProjectMember {
                    id: Uuid::new_v4(),
                    project_id: project.id,
                    user_id: creator,
                    project_role: ProjectRole::Attorney.as_str().to_string(),
                })
                .execute(conn)
                .context("failed to insert creator membership")?;

            Ok(project.id)
        })
        .await
    }

    pub async fn insert_member(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        role: ProjectRole,
    ) -> Result<()> {
        self.with_conn(move |conn| {
            diesel::insert_into(backend::schema::project_members::table)
                .values(&NewProjectMember {
                    id: Uuid::new_v4(),
                    project_id,
                    user_id,
                    project_role: role.as_str().to_string(),
                })
                .execute(conn)
                .context("failed to insert member")?;
            Ok(())
        })
        .await
    }

    pub async fn login_token(&self, email: &str, password: &str) -> Result<String> {
        #[derive(Serialize)]
        struct LoginPayload<'a> {
            email: &'a str,
            password: &'a str,
        }

        let response = self
            .post_json("/api/auth/login", &LoginPayload { email, password }, None)
            .await?;

        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );

        let body = body_to_vec(response.into_body()).await?;
        #[derive(serde::Deserialize)]
        struct LoginResponse {
            access_token: String,
        }
        let parsed: LoginResponse = serde_json::from_slice(&body)?;
        Ok(parsed.access_token)
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::POST, path, payload, token).await
    }

    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::PATCH, path, payload, token).await
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let builder = Request::builder().method(Method::DELETE).uri(path);
        let builder = if let Some(token) = token {
            builder.header("authorization", format!("Bearer {token}"))
        } else {
            builder
        };
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn scan_script(
        &self,
        project_id: Uuid,
        filename: &str,
        data: &[u8],
        version_name: Option<&str>,
        token: &str,
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();
        body.extend(format!("--{boundary}\r\n").as_bytes());
        body.extend(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                filename
            )
            .as_bytes(),
        );
        body.extend(b"Content-Type: application/pdf\r\n\r\n");
        body.extend(data);
        body.extend(b"\r\n");

        body.extend(format!("--{boundary}\r\n").as_bytes());
        body.extend(b"Content-Disposition: form-data; name=\"project_id\"\r\n\r\n");
        body.extend(project_id.to_string().as_bytes());
        body.extend(b"\r\n");

        if let Some(version) = version_name {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            body.extend(b"Content-Disposition: form-data; name=\"version_name\"\r\n\r\n");
            body.extend(version.as_bytes());
            body.extend(b"\r\n");
        }

        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/scripts/scan")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header("authorization", format!("Bearer {token}"))
            .body(Body::from(body))?;

        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE notifications, comments, risk_flags, scripts, project_members, projects, users RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
