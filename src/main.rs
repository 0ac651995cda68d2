use actix_web::{middleware::Compress, App, HttpServer};
use actix_cors::Cors;
use utoipa_swagger_ui::SwaggerUi;

mod auth;
mod credential;
mod error;
mod gateway;
mod models;
mod openapi;
mod otp;
mod repo;
mod routes;
mod storage;

use auth::SessionStore;
use gateway::{AccessPolicy, AuthGateway};
use openapi::ApiDoc;
use otp::{LogOtpSender, OtpStore};
#[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
use repo::inmem::InMemRepo;
use routes::{config, AppState};
use std::sync::Arc;
use storage::{build_file_store, ExtensionPolicy};
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Environment variables must be set externally (shell, systemd, Docker).
    // Load .env automatically only in debug builds to reduce manual setup.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping filedrop server");

    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    let repo = InMemRepo::new();
    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    info!("Using in-memory repository backend");

    #[cfg(feature = "postgres-store")]
    let repo = {
        use sqlx::postgres::PgPoolOptions;
        let db_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set for postgres-store");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(&db_url)
            .expect("Failed to create Pg pool");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations");
        info!("Using Postgres repository backend");
        crate::repo::pg::PgRepo::new(pool)
    };

    let openapi = ApiDoc::openapi();
    let file_store = build_file_store();
    let extensions = Arc::new(ExtensionPolicy::from_env());
    let sessions = Arc::new(SessionStore::new());
    let otp = Arc::new(OtpStore::from_env(Arc::new(LogOtpSender)));
    let policy = Arc::new(AccessPolicy::new());
    let gateway = AuthGateway::new(policy, sessions.clone());

    info!(
        "Upload dir: {}",
        std::env::var("FILEDROP_UPLOAD_DIR").unwrap_or_else(|_| "uploads".into())
    );

    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                .allowed_origin("http://localhost:5173")
                .allowed_origin("http://127.0.0.1:5173")
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
                .allow_any_header()
                .allowed_methods(["GET", "POST", "OPTIONS"])
                .supports_credentials() // the session rides on a cookie
                .max_age(3600);
            if let Ok(front) = std::env::var("FRONTEND_URL") {
                c = c.allowed_origin(&front);
            }
            c
        };

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(gateway.clone())
            .wrap(cors)
            .app_data(actix_web::web::Data::new(AppState {
                repo: Arc::new(repo.clone()),
                file_store: file_store.clone(),
                sessions: sessions.clone(),
                otp: otp.clone(),
                extensions: extensions.clone(),
            }))
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind(("0.0.0.0", 8080))?;

    info!("Listening on http://0.0.0.0:8080");

    server.run().await
}
