use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use anyhow::{anyhow, ensure, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use billdesk::auth::jwt::JwtService;
use billdesk::config::AppConfig;
use billdesk::db::{self, PgPool};
use billdesk::models::{NewRole, NewUser};
use billdesk::routes;
use billdesk::state::AppState;
use billdesk::storage::FileStore;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use serde::Serialize;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[derive(Default)]
pub struct FakeStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl FileStore for FakeStore {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<()> {
        let mut guard = self.blobs.lock().await;
        guard.insert(path.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let guard = self.blobs.lock().await;
        guard
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("blob {path} missing"))
    }

    async fn remove(&self, path: &str) -> Result<bool> {
        let mut guard = self.blobs.lock().await;
        Ok(guard.remove(path).is_some())
    }
}

impl FakeStore {
    #[allow(dead_code)]
    pub async fn blob_count(&self) -> usize {
        let guard = self.blobs.lock().await;
        guard.len()
    }
}

/// Flags granted to a test role, named after what the role may do.
#[derive(Default, Clone, Copy)]
pub struct Grants {
    pub view_users: bool,
    pub edit_users: bool,
    pub delete_users: bool,
    pub create_users: bool,
    pub view_bills: bool,
    pub edit_bills: bool,
    pub delete_bills: bool,
    pub create_bills: bool,
    pub view_tags: bool,
    pub edit_tags: bool,
    pub delete_tags: bool,
    pub create_tags: bool,
    pub view_roles: bool,
    pub edit_roles: bool,
    pub delete_roles: bool,
    pub create_roles: bool,
    pub manage_document_types: bool,
}

impl Grants {
    pub fn all() -> Self {
        Self {
            view_users: true,
            edit_users: true,
            delete_users: true,
            create_users: true,
            view_bills: true,
            edit_bills: true,
            delete_bills: true,
            create_bills: true,
            view_tags: true,
            edit_tags: true,
            delete_tags: true,
            create_tags: true,
            view_roles: true,
            edit_roles: true,
            delete_roles: true,
            create_roles: true,
            manage_document_types: true,
        }
    }
}

#[allow(dead_code)]
pub struct UploadFile {
    pub field: &'static str,
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    #[allow(dead_code)]
    pub fn new(field: &'static str, filename: &str, content_type: &str, bytes: &[u8]) -> Self {
        Self {
            field,
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            bytes: bytes.to_vec(),
        }
    }
}

/// The standard three-slot attachment set most bill tests need.
#[allow(dead_code)]
pub fn default_bill_files() -> Vec<UploadFile> {
    vec![
        UploadFile::new("bill_pdf", "bill.pdf", "application/pdf", b"%PDF-1.4 fake"),
        UploadFile::new(
            "client_deposit_image",
            "client.png",
            "image/png",
            b"\x89PNG client",
        ),
        UploadFile::new("deposit_image", "deposit.png", "image/png", b"\x89PNG deposit"),
    ]
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    store: Arc<FakeStore>,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let database_url = env::var("TEST_DATABASE_URL")
            .context("TEST_DATABASE_URL must be set for integration tests")?;

        let config = AppConfig {
            database_url: database_url.clone(),
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            upload_dir: "unused-in-tests".to_string(),
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_minutes: 60,
            refresh_token_expiry_days: 30,
            refresh_cookie_secure: false,
            refresh_cookie_domain: None,
            cors_allowed_origin: None,
        };

        let pool = db::init_pool(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let store = Arc::new(FakeStore::default());
        let store_for_state: Arc<dyn FileStore> = store.clone();
        let jwt = JwtService::from_config(&config)?;
        let state = AppState::new(pool.clone(), config, store_for_state, jwt);
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            router,
            store,
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

    #[allow(dead_code)]
    pub fn store(&self) -> Arc<FakeStore> {
        self.store.clone()
    }

    pub async fn insert_role(&self, title: &str, grants: Grants) -> Result<Uuid> {
        let title = title.to_string();
        self.with_conn(move |conn| {
            let role = NewRole {
                id: Uuid::new_v4(),
                title,
                description: None,
                can_view_users: grants.view_users,
                can_edit_users: grants.edit_users,
                can_delete_users: grants.delete_users,
                can_create_users: grants.create_users,
                can_view_bills: grants.view_bills,
                can_edit_bills: grants.edit_bills,
                can_delete_bills: grants.delete_bills,
                can_create_bills: grants.create_bills,
                can_view_tags: grants.view_tags,
                can_edit_tags: grants.edit_tags,
                can_delete_tags: grants.delete_tags,
                can_create_tags: grants.create_tags,
                can_view_roles: grants.view_roles,
                can_edit_roles: grants.edit_roles,
                can_delete_roles: grants.delete_roles,
                can_create_roles: grants.create_roles,
                can_manage_document_types: grants.manage_document_types,
            };
            diesel::insert_into(billdesk::schema::roles::table)
                .values(&role)
                .execute(conn)
                .context("failed to insert role")?;
            Ok(role.id)
        })
        .await
    }

    pub async fn insert_user(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role_id: Uuid,
    ) -> Result<Uuid> {
        let name = name.to_string();
        let email = email.to_string();
        let password = password.to_string();
        self.with_conn(move |conn| {
            let password_hash = hash_password(&password)?;
            let user = NewUser {
                id: Uuid::new_v4(),
                email,
                name,
                password_hash,
                role_id,
            };
            diesel::insert_into(billdesk::schema::users::table)
                .values(&user)
                .execute(conn)
                .context("failed to insert user")?;
            Ok(user.id)
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

    #[allow(dead_code)]
    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::PATCH, path, payload, token).await
    }

    #[allow(dead_code)]
    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::PUT, path, payload, token).await
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

    #[allow(dead_code)]
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

    /// Posts a bill as multipart form data: the scalar fields plus one part
    /// per attached file.
    #[allow(dead_code)]
    pub async fn upload_bill(
        &self,
        fields: &[(&str, String)],
        files: &[UploadFile],
        token: &str,
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();

        for (name, value) in fields {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            body.extend(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            );
            body.extend(value.as_bytes());
            body.extend(b"\r\n");
        }

        for file in files {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            body.extend(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                    file.field, file.filename
                )
                .as_bytes(),
            );
            body.extend(format!("Content-Type: {}\r\n\r\n", file.content_type).as_bytes());
            body.extend(&file.bytes);
            body.extend(b"\r\n");
        }

        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/bills")
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

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
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
        "TRUNCATE TABLE bill_tags, bills, files, file_groups, tags, document_types, refresh_tokens, users, roles RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}

fn hash_password(password: &str) -> Result<String> {
    use argon2::password_hash::{PasswordHasher, SaltString};
    use argon2::Argon2;

    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {err}"))?
        .to_string())
}
