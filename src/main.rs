mod auth;
mod clock;
mod config;
mod error;
mod models;
mod routes;
mod store;
mod sweeper;
mod verify;

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use clap::{Parser, Subcommand};
use clock::Clock;
use config::Config;
use sqlx::PgPool;
use store::{InviteStore, PgInviteStore};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
pub struct AppState {
    pub store: InviteStore,
    pub clock: Clock,
    pub config: Arc<Config>,
}

#[derive(Parser)]
#[command(version, about = "Guest invite validation and expiry service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the validation API and run the periodic expiry sweep (default)
    Serve,
    /// Run a single expiry sweep and exit
    Sweep,
    /// Mint a bearer token for a guard device
    MintToken {
        #[arg(long)]
        subject: String,
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let db = state.store.ping().await.is_ok();
    Json(serde_json::json!({ "status": "ok", "db": db }))
}

async fn connect_store(config: &Config) -> InviteStore {
    let db = PgPool::connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    sqlx::migrate!()
        .run(&db)
        .await
        .expect("failed to run migrations");

    InviteStore::Postgres(PgInviteStore::new(db))
}

async fn serve(config: Config) {
    let store = connect_store(&config).await;
    let clock = Clock::System;

    if config.sweep_enabled {
        tracing::info!(
            period_secs = config.sweep_interval.as_secs(),
            "starting invite expiry sweeper"
        );
        sweeper::spawn_sweeper(store.clone(), clock.clone(), config.sweep_interval);
    }

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState {
        store,
        clock,
        config: Arc::new(config),
    };

    let app = Router::new()
        .route("/api/health", get(health))
        .merge(routes::api_router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Sweep => {
            let store = connect_store(&config).await;
            let outcome = sweeper::sweep_expired(&store, &Clock::System).await;
            println!("{outcome:?}");
        }
        Command::MintToken { subject, hours } => {
            match auth::jwt::create_token(&subject, hours, &config.jwt_secret) {
                Ok(token) => println!("{token}"),
                Err(e) => {
                    eprintln!("{e}");
                    std::process::exit(1);
                }
            }
        }
    }
}
