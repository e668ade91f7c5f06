use std::sync::Arc;

use axum::{routing::get, Router};
use sqlx::PgPool;
use tower_http::trace::TraceLayer;

mod config;
mod db;
mod error;
mod handlers;
mod models;
mod services;

use config::Config;
use db::store::PgStore;
use handlers::webhooks::CheckinPipeline;
use services::checkin::{ExtractorChain, FlexibleCheckinExtractor, StrictCheckinParser};
use services::claude::{ClaudeClient, TextGenerator};
use services::plan::DailyCoach;
use services::twilio::TwilioGateway;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub pipeline: Arc<CheckinPipeline>,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dailycoach_api=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    let config = Config::from_env();

    // Database
    let db = db::create_pool(&config.database_url).await;

    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Database migrations applied");

    // Wire the pipeline: one Claude client shared by the flexible extractor
    // and the coach, Twilio for delivery, Postgres for state.
    let llm: Arc<dyn TextGenerator> = Arc::new(ClaudeClient::new(
        config.claude_api_key.clone(),
        config.claude_model.clone(),
    ));
    let store = Arc::new(PgStore::new(db.clone()));
    let gateway = Arc::new(TwilioGateway::new(
        config.twilio_account_sid.clone(),
        config.twilio_auth_token.clone(),
        config.twilio_whatsapp_number.clone(),
    ));
    let extractors = ExtractorChain::new(vec![
        Box::new(StrictCheckinParser),
        Box::new(FlexibleCheckinExtractor::new(llm.clone())),
    ]);
    let coach = DailyCoach::new(llm);

    let pipeline = Arc::new(CheckinPipeline::new(store, gateway, extractors, coach));

    let state = AppState { db, pipeline };

    let app = Router::new()
        // Some Twilio configurations post to the root URL; accept both.
        .route(
            "/",
            get(handlers::health::root_status).post(handlers::webhooks::receive_whatsapp),
        )
        .route(
            "/webhooks/whatsapp",
            get(handlers::webhooks::webhook_status).post(handlers::webhooks::receive_whatsapp),
        )
        .route("/health", get(handlers::health::health_check))
        .route("/readyz", get(handlers::health::readyz))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.listen_addr();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
