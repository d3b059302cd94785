use std::env;

use anyhow::Result;
use once_cell::sync::Lazy;
use tracing::warn;

pub const DEFAULT_OWNER_FALLBACK_ID: &str = "8343591065";

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub log_level: String,
    pub database_url: String,
    pub bind_addr: String,
    pub webhook_path: String,
    pub webhook_url: String,
    pub webhook_secret: String,
    pub owner_id: String,
    pub owner_fallback_id: String,
    pub message_prefix: String,
    pub recent_products_limit: i64,
    pub supabase_url: String,
    pub supabase_service_role_key: String,
    pub storage_bucket: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_temperature: f32,
    pub gemini_max_output_tokens: i32,
    pub gemini_timeout_seconds: u64,
    pub gateway_timeout_seconds: u64,
    pub processed_update_retention_hours: u64,
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

fn env_string(name: &str, default: &str) -> String {
    env::var(name)
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|_| default.to_string())
}

fn env_f32(name: &str, default: f32) -> f32 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<f32>().ok())
        .unwrap_or(default)
}

fn env_i32(name: &str, default: i32) -> i32 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<i32>().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn normalize_database_url(value: String) -> String {
    if value.starts_with("sqlite+aiosqlite://") {
        return value.replacen("sqlite+aiosqlite://", "sqlite://", 1);
    }
    value
}

fn normalize_webhook_path(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "/webhook/telegram".to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn normalize_limit(value: u64) -> i64 {
    if value == 0 {
        warn!("RECENT_PRODUCTS_LIMIT must be positive; using 10.");
        return 10;
    }
    // Telegram caps inline keyboards at 100 buttons.
    value.min(100) as i64
}

impl Config {
    /// `BOT_TOKEN` is checked by the server entry point, so maintenance
    /// subcommands run without it.
    pub fn load() -> Result<Self> {
        Ok(Config {
            bot_token: env_string("BOT_TOKEN", ""),
            log_level: env_string("LOG_LEVEL", "info"),
            database_url: normalize_database_url(env_string(
                "DATABASE_URL",
                "sqlite://catalog.db",
            )),
            bind_addr: env_string("BIND_ADDR", "0.0.0.0:8080"),
            webhook_path: normalize_webhook_path(env_string(
                "WEBHOOK_PATH",
                "/webhook/telegram",
            )),
            webhook_url: env_string("WEBHOOK_URL", ""),
            webhook_secret: env_string("WEBHOOK_SECRET", ""),
            owner_id: env_string("OWNER_ID", ""),
            owner_fallback_id: env_string("OWNER_FALLBACK_ID", DEFAULT_OWNER_FALLBACK_ID),
            message_prefix: env_string("MESSAGE_PREFIX", ""),
            recent_products_limit: normalize_limit(env_u64("RECENT_PRODUCTS_LIMIT", 10)),
            supabase_url: env_string("SUPABASE_URL", "")
                .trim_end_matches('/')
                .to_string(),
            supabase_service_role_key: env_string("SUPABASE_SERVICE_ROLE_KEY", ""),
            storage_bucket: env_string("STORAGE_BUCKET", "catalog-images"),
            gemini_api_key: env_string("GEMINI_API_KEY", ""),
            gemini_model: env_string("GEMINI_MODEL", "gemini-2.0-flash"),
            gemini_temperature: env_f32("GEMINI_TEMPERATURE", 0.7),
            gemini_max_output_tokens: env_i32("GEMINI_MAX_OUTPUT_TOKENS", 512),
            gemini_timeout_seconds: env_u64("GEMINI_TIMEOUT_SECONDS", 60),
            gateway_timeout_seconds: env_u64("GATEWAY_TIMEOUT_SECONDS", 30),
            processed_update_retention_hours: env_u64("PROCESSED_UPDATE_RETENTION_HOURS", 72),
        })
    }

    /// Strings that must never reach a log line.
    pub fn secrets(&self) -> Vec<&str> {
        [
            self.bot_token.as_str(),
            self.supabase_service_role_key.as_str(),
            self.gemini_api_key.as_str(),
            self.webhook_secret.as_str(),
        ]
        .into_iter()
        .filter(|value| !value.is_empty())
        .collect()
    }
}

pub const DESCRIPTION_SYSTEM_PROMPT: &str = "Eres un redactor de marketing para una tienda de regalos. \
Mira la foto del producto y escribe una descripción atractiva en español de 2 a 3 frases. \
Destaca lo que lo hace especial como regalo. \
Responde solo con la descripción, sin títulos, comillas ni emojis.";

pub const DESCRIPTION_USER_PROMPT: &str = "Describe este producto para el catálogo.";
