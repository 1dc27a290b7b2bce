use anyhow::Context;
use axum::http::HeaderValue;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use lut_chat::config::Settings;
use lut_chat::db::member_repository::MemberRepository;
use lut_chat::db::space_repository::SpaceRepository;
use lut_chat::lut::{LutClient, PretrainedCatalog};
use lut_chat::routes::{api_router, AppState};
use lut_chat::service::chat_service::ChatService;
use lut_chat::service::space_chat_service::SpaceChatService;
use lut_chat::service::space_service::SpaceService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lut_chat=debug,tower_http=debug".into()),
        )
        .init();

    let settings = Settings::from_env()?;

    // ── Database ──────────────────────────────────────────────────────────────
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&settings.database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    info!("Database connection established and migrations applied");

    // ── Dependency wiring ─────────────────────────────────────────────────────
    let catalog = match &settings.pretrained_luts_path {
        Some(path) => PretrainedCatalog::load(path)?,
        None => PretrainedCatalog::default(),
    };
    let client = LutClient::new(&settings.lut_api_base_url, &settings.lut_api_model)?;
    info!(
        "LUT inference server at {} (model {})",
        client.base_url(),
        client.model()
    );

    let chat = ChatService::new(client, catalog);
    let state = AppState {
        space_chat: SpaceChatService::new(chat.clone()),
        chat,
        spaces: SpaceService::new(SpaceRepository::new(pool.clone()), MemberRepository::new(pool)),
    };

    // ── Router ────────────────────────────────────────────────────────────────
    let cors = match &settings.cors_allow_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(
                origin
                    .parse::<HeaderValue>()
                    .with_context(|| format!("Invalid CORS_ALLOW_ORIGIN '{origin}'"))?,
            )
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::permissive(),
    };
    let app = api_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // ── Listen ────────────────────────────────────────────────────────────────
    let addr = format!("0.0.0.0:{}", settings.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{addr}/");

    axum::serve(listener, app).await?;
    Ok(())
}
