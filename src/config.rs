// Application configuration
// Read once at startup from the environment (optionally seeded by a .env file)

use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_WHATSAPP_API_BASE: &str = "https://graph.facebook.com/v19.0";
const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

/// Errors raised while reading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set in environment")]
    Missing(&'static str),

    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

/// WhatsApp Business Cloud API credentials
#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    pub verify_token: Option<String>,
    pub access_token: Option<String>,
    pub phone_number_id: Option<String>,
    pub api_base: String,
}

/// Chat completion endpoint settings
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: Decimal,
}

/// Object storage (Supabase storage) used for product images
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub supabase_url: Option<String>,
    pub service_key: Option<String>,
    pub bucket: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub redis_url: Option<String>,
    pub dedup_ttl: Duration,
    pub http_timeout: Duration,
    pub whatsapp: WhatsAppConfig,
    pub llm: LlmConfig,
    pub storage: StorageConfig,
    pub menu_url: Option<String>,
    pub follow_up_interval: Duration,
    pub menu_follow_up_delay: Duration,
}

impl AppConfig {
    /// Load configuration from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// Empty values are treated as absent.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        Ok(Self {
            database_url,
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(get("PORT"), "PORT", 8080)?,
            redis_url: get("REDIS_URL"),
            dedup_ttl: Duration::from_secs(parse_or(get("DEDUP_TTL_SECS"), "DEDUP_TTL_SECS", 604_800)?),
            http_timeout: Duration::from_secs(parse_or(get("HTTP_TIMEOUT_SECS"), "HTTP_TIMEOUT_SECS", 15)?),
            whatsapp: WhatsAppConfig {
                verify_token: get("WHATSAPP_VERIFY_TOKEN"),
                access_token: get("WHATSAPP_ACCESS_TOKEN"),
                phone_number_id: get("WHATSAPP_PHONE_NUMBER_ID"),
                api_base: get("WHATSAPP_API_BASE").unwrap_or_else(|| DEFAULT_WHATSAPP_API_BASE.to_string()),
            },
            llm: LlmConfig {
                api_key: get("LLM_API_KEY"),
                base_url: get("LLM_BASE_URL").unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
                model: get("LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
                max_tokens: parse_or(get("LLM_MAX_TOKENS"), "LLM_MAX_TOKENS", 300)?,
                temperature: parse_or(get("LLM_TEMPERATURE"), "LLM_TEMPERATURE", Decimal::new(7, 1))?,
            },
            storage: StorageConfig {
                supabase_url: get("SUPABASE_URL"),
                service_key: get("SUPABASE_SERVICE_KEY"),
                bucket: get("STORAGE_BUCKET").unwrap_or_else(|| "produtos".to_string()),
            },
            menu_url: get("MENU_URL"),
            follow_up_interval: Duration::from_secs(parse_or(
                get("FOLLOW_UP_INTERVAL_SECS"),
                "FOLLOW_UP_INTERVAL_SECS",
                5,
            )?),
            menu_follow_up_delay: Duration::from_secs(parse_or(
                get("MENU_FOLLOW_UP_DELAY_SECS"),
                "MENU_FOLLOW_UP_DELAY_SECS",
                3,
            )?),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}
