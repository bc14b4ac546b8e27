pub mod admin;
pub mod auth;
pub mod config;
pub mod err;
pub mod io;
pub mod meetings;
pub mod models;
pub mod profiles;
pub mod roster;
pub mod store;
pub mod student;

use axum::handler::Handler;
use axum::http::Uri;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};

use std::sync::Arc;
use anyhow::Context;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::config::{ServerConfig, StorageBackend};
use crate::err::{Error, Fine, Maybe, Nothing};
use crate::roster::RosterManager;
use crate::store::{Documents, FileStore};

pub type Payload<T> = axum::response::Result<Json<Maybe<T>>, Error>;

pub fn proceeds<V>(value: V) -> Payload<V> where V: Serialize {
    Ok(Json(Fine(value)))
}

/// A non-fatal signal: the request was understood but nothing changed.
pub fn breaks<V>(err: Error) -> Payload<V> where V: Serialize {
    Ok(Json(Nothing(err)))
}

/// Shared by every handler through an `Extension` layer.
#[derive(Clone)]
pub struct AppState {
    pub roster: RosterManager,
    pub session_days: i64,
}

impl AppState {
    pub fn docs(&self) -> &Documents {
        self.roster.documents()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let config = ServerConfig::from_env()?;

    let docs = match config.storage {
        StorageBackend::File => {
            log::info!("Using document store at {}", config.data_dir.display());
            Documents::new(Arc::new(FileStore::open(&config.data_dir).await?))
        }
        StorageBackend::Memory => {
            log::warn!("Using in-memory document store, nothing will be persisted");
            Documents::in_memory()
        }
    };
    log::info!("Counter policy: {:?}", config.counter_policy);
    let state = AppState {
        roster: RosterManager::new(docs, config.counter_policy),
        session_days: config.session_days,
    };

    let pg = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("could not connect to DATABASE_URL")?;
    sqlx::migrate!("./migrations")
        .run(&pg)
        .await
        .context("could not apply account migrations")?;
    if let Some(admin) = &config.admin {
        auth::seed_admin(&pg, admin)
            .await
            .context("could not seed the admin account")?;
    }

    let app = router().layer(
        ServiceBuilder::new()
            .layer(CorsLayer::permissive())
            .layer(Extension(pg))
            .layer(Extension(state)),
    );

    log::info!("Starting Math Circle HTTP Server on http://{}", config.addr);
    axum::Server::bind(&config.addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn router() -> Router {
    Router::new()
        .route("/auth/register", post(auth::register_account))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        .route("/student/update_email", put(auth::update_email))
        .route("/student/update_password", put(auth::update_password))
        .route("/student/update_disabled", put(auth::update_disabled))
        .route(
            "/student/profile",
            post(student::create_profile)
                .get(student::get_profile)
                .put(student::update_profile),
        )
        .route("/student/meetings", post(student::search_meetings))
        .route("/student/registration", post(student::update_registration))
        .route("/admin/profiles", get(admin::list_profiles))
        .route("/admin/profile", get(admin::get_profile))
        .route("/admin/meetings", post(admin::search_meetings))
        .route(
            "/admin/meeting",
            post(admin::create_meeting)
                .put(admin::update_meeting)
                .delete(admin::delete_meeting),
        )
        .route("/admin/attendance", put(admin::update_attendance))
        .route("/admin/verification", put(admin::update_verification))
        .fallback(err::handler404.into_service())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("Could not listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    log::info!("Shutting down");
}
