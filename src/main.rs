use std::sync::Arc;

use anyhow::Context;

use leadbot::auth::OperatorAllowList;
use leadbot::bot::{BotDeps, Orchestrator};
use leadbot::catalog;
use leadbot::channels::TelegramChannel;
use leadbot::config::{BotConfig, DispatchConfig, ServerConfig, UpdateMode};
use leadbot::dispatch::{self, DispatchEngine};
use leadbot::http::{AppState, routes};
use leadbot::llm::{LlmConfig, create_provider};
use leadbot::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let server_config = ServerConfig::from_env()?;
    let bot_config = BotConfig::from_env()?;
    let dispatch_config = DispatchConfig::from_env()?;
    let llm_config = LlmConfig::from_env()?;

    eprintln!("🤖 Leadbot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", llm_config.model);
    eprintln!("   HTTP: http://0.0.0.0:{}", server_config.http_port);
    eprintln!("   Updates: {:?}", server_config.update_mode);
    eprintln!("   Operators: {}", bot_config.admin_ids.len());

    let llm = create_provider(&llm_config)?;

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&server_config.db_path)
            .await
            .with_context(|| format!("opening database at {}", server_config.db_path.display()))?,
    );
    eprintln!("   Database: {}", server_config.db_path.display());

    if let Some(path) = &server_config.catalog_seed {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading catalog seed {}", path.display()))?;
        let added = catalog::seed_from_json(db.as_ref(), &json).await?;
        eprintln!("   Catalog seed: {added} new item(s)");
    }

    // ── Telegram ─────────────────────────────────────────────────────────
    let telegram = TelegramChannel::new(server_config.telegram_token.clone());
    telegram
        .health_check()
        .await
        .context("Telegram getMe failed; check TELEGRAM_BOT_TOKEN")?;
    let platform = Arc::new(telegram.clone());

    let orchestrator = Arc::new(Orchestrator::new(
        BotDeps {
            db: Arc::clone(&db),
            llm,
            platform: platform.clone(),
            authorizer: Arc::new(OperatorAllowList::new(bot_config.admin_ids.clone())),
        },
        bot_config,
    ));

    // ── Dispatch ─────────────────────────────────────────────────────────
    let dispatch_engine = Arc::new(DispatchEngine::new(Arc::clone(&db), platform, dispatch_config));
    let _bio_handle = dispatch::spawn_bio_ticker(Arc::clone(&dispatch_engine));

    // ── HTTP ─────────────────────────────────────────────────────────────
    let webhook = server_config.update_mode == UpdateMode::Webhook;
    let app = routes(AppState {
        dispatch: dispatch_engine,
        orchestrator: webhook.then(|| Arc::clone(&orchestrator)),
    });
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", server_config.http_port))
        .await
        .with_context(|| format!("binding HTTP port {}", server_config.http_port))?;
    tracing::info!(port = server_config.http_port, "HTTP server started");

    match server_config.update_mode {
        UpdateMode::Polling => {
            tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, app).await {
                    tracing::error!("HTTP server stopped: {e}");
                }
            });
            let events = telegram.poll_updates().await?;
            orchestrator.run(events).await;
        }
        UpdateMode::Webhook => {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                    tracing::info!("Ctrl+C received, shutting down...");
                })
                .await?;
        }
    }

    Ok(())
}
