use gravis_ai::config::AppConfig;
use gravis_ai::gemini_client::GeminiClient;
use gravis_ai::services::{LogMailer, Mailer, ResendMailer};
use gravis_ai::{build_router, db, AppState};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_logging()?;

    let config = AppConfig::from_env()?;
    config.log_summary();

    let db_pool = db::create_pool(&config.database_url).await?;
    let http_client = reqwest::Client::new();

    let gemini_client = match &config.gemini_api_key {
        Some(api_key) => {
            tracing::info!("Initializing Gemini AI client...");
            Some(GeminiClient::new(http_client.clone(), api_key.clone()))
        }
        None => {
            tracing::warn!("GEMINI_API_KEY not found. Generation endpoints will answer 503.");
            None
        }
    };

    let mailer: Arc<dyn Mailer> = match &config.resend_api_key {
        Some(api_key) => Arc::new(ResendMailer::new(
            http_client.clone(),
            api_key.clone(),
            config.email_from.as_deref(),
        )),
        None => {
            tracing::warn!("RESEND_API_KEY not found. Password reset links will be logged instead of mailed.");
            Arc::new(LogMailer)
        }
    };

    if config.pabbly_webhook_secret.is_none() {
        tracing::warn!("PABBLY_WEBHOOK_SECRET not found. Enrolment webhook will reject every call.");
    }
    if config.google_oauth.is_none() {
        tracing::warn!("Google OAuth credentials not found. Google sign-in is disabled.");
    }

    let bind_addr = config.bind_addr.clone();
    let shared_state = Arc::new(AppState {
        db_pool,
        config,
        gemini_client,
        mailer,
        http_client,
    });

    let app = build_router(shared_state);

    // ConnectInfo provides socket addresses for rate limiting
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>()).await?;

    Ok(())
}

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug,gravis_ai=trace,sqlx=info,reqwest=info,hyper=info,tower=info".to_string()
        } else {
            "info,gravis_ai=info,sqlx=warn,reqwest=warn,hyper=warn,tower=warn".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry().with(env_filter).with(fmt_layer).try_init()?;

    tracing::info!("🏛️ Gravis AI starting up...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Build mode: {}", if cfg!(debug_assertions) { "development" } else { "production" });
    tracing::info!("Log level: {}", log_level);

    Ok(())
}
