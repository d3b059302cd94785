use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use dotenvy::dotenv;
use teloxide::prelude::*;
use tracing::{error, info, warn};
use url::Url;

mod config;
mod conversation;
mod db;
mod handlers;
mod llm;
mod state;
mod storage;
mod utils;

use config::CONFIG;
use conversation::engine::EngineSettings;
use conversation::ports::Services;
use db::database::Database;
use handlers::webhook::{router, DispatchSettings};
use llm::GeminiDescriber;
use state::AppState;
use storage::SupabaseStorage;
use utils::logging::init_logging;
use utils::telegram::{build_bot, TelegramGateway};

const PRUNE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, PartialEq, Eq)]
struct ProvisionOwnerArgs {
    owner_id: String,
}

fn provision_owner_usage() -> &'static str {
    "Usage: catalog_admin_bot provision-owner --owner-id <telegram user id>"
}

fn parse_provision_args(args: &[String]) -> anyhow::Result<Option<ProvisionOwnerArgs>> {
    if args.get(1).map(|value| value.as_str()) != Some("provision-owner") {
        return Ok(None);
    }

    let mut owner_id: Option<String> = None;
    let mut index = 2;
    while index < args.len() {
        match args[index].as_str() {
            "--owner-id" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --owner-id"))?;
                value
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| anyhow!("Invalid --owner-id value: {value}"))?;
                owner_id = Some(value.trim().to_string());
            }
            "--help" | "-h" => {
                return Err(anyhow!(provision_owner_usage()));
            }
            other => {
                return Err(anyhow!(
                    "Unknown provision-owner argument: {other}\n{}",
                    provision_owner_usage()
                ));
            }
        }
        index += 1;
    }

    let owner_id = owner_id.ok_or_else(|| anyhow!("--owner-id is required"))?;
    Ok(Some(ProvisionOwnerArgs { owner_id }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let _guards = init_logging();

    let args: Vec<String> = std::env::args().collect();
    let db = Database::init(&CONFIG.database_url).await?;

    if let Some(provision) = parse_provision_args(&args)? {
        db.provision_owner(&provision.owner_id).await?;
        info!("Owner identity set to {}", provision.owner_id);
        return Ok(());
    }

    if CONFIG.bot_token.trim().is_empty() {
        return Err(anyhow!("BOT_TOKEN is required unless running provision-owner"));
    }

    if !CONFIG.owner_id.is_empty() && db.ensure_owner(&CONFIG.owner_id).await? {
        info!("Provisioned owner identity from OWNER_ID");
    }

    let bot = build_bot(
        &CONFIG.bot_token,
        Duration::from_secs(CONFIG.gateway_timeout_seconds.max(1)),
    )?;
    info!("Starting catalog admin bot");

    register_webhook(&bot).await;

    let database = Arc::new(db.clone());
    let services = Services {
        gateway: Arc::new(TelegramGateway::new(
            bot,
            &CONFIG.bot_token,
            &CONFIG.message_prefix,
        )),
        media: Arc::new(SupabaseStorage::from_config(&CONFIG)),
        generator: Arc::new(GeminiDescriber::from_config(&CONFIG)),
        catalog: database.clone(),
        conversations: database,
    };
    let settings = DispatchSettings {
        fallback_owner_id: CONFIG.owner_fallback_id.clone(),
        engine: EngineSettings {
            recent_products_limit: CONFIG.recent_products_limit,
        },
    };
    let state = AppState::new(db.clone(), services, settings, &CONFIG.webhook_secret);

    spawn_update_pruner(db);

    let app = router(state, &CONFIG.webhook_path);
    let listener = tokio::net::TcpListener::bind(&CONFIG.bind_addr).await?;
    info!(
        "Listening on {} (webhook path {})",
        CONFIG.bind_addr, CONFIG.webhook_path
    );
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn register_webhook(bot: &Bot) {
    if CONFIG.webhook_url.is_empty() {
        info!("WEBHOOK_URL not set; expecting the webhook to be registered externally");
        return;
    }

    let url = match Url::parse(&CONFIG.webhook_url) {
        Ok(url) => url,
        Err(err) => {
            error!("Invalid WEBHOOK_URL '{}': {}", CONFIG.webhook_url, err);
            return;
        }
    };

    let mut request = bot.set_webhook(url.clone());
    if !CONFIG.webhook_secret.is_empty() {
        request = request.secret_token(CONFIG.webhook_secret.clone());
    }
    match request.await {
        Ok(_) => info!("Registered webhook at {}", url),
        Err(err) => warn!(
            "Failed to register webhook: {}",
            utils::http::redact_secrets(&err.to_string(), &CONFIG.secrets())
        ),
    }
}

fn spawn_update_pruner(db: Database) {
    let retention = chrono::Duration::hours(CONFIG.processed_update_retention_hours as i64);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            let cutoff = chrono::Utc::now() - retention;
            match db.prune_processed_updates(cutoff).await {
                Ok(0) => {}
                Ok(count) => info!("Pruned {} processed update ids", count),
                Err(err) => warn!("Pruning processed updates failed: {}", err),
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
