// Settings Service
//
// Single source of truth for the store-open flag, delivery fee, marketplace
// configuration and default margin. Reads go through a 60-second cache.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::db::StoreError;
use crate::error::ApiError;
use crate::settings::store::{SettingsStore, StoreSettings};

/// Time-to-live for the cached settings (60 seconds)
const CACHE_TTL: Duration = Duration::from_secs(60);

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Invalid setting {field}: {message}")]
    Invalid { field: &'static str, message: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<SettingsError> for ApiError {
    fn from(error: SettingsError) -> Self {
        match error {
            SettingsError::Invalid { .. } => ApiError::BadRequest(error.to_string()),
            SettingsError::Store(store) => ApiError::StoreError(store),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedSettings {
    settings: StoreSettings,
    loaded_at: Instant,
}

pub struct SettingsService {
    store: Arc<dyn SettingsStore>,
    cache: RwLock<Option<CachedSettings>>,
    cache_ttl: Duration,
}

impl SettingsService {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(None),
            cache_ttl: CACHE_TTL,
        }
    }

    /// Current settings; defaults when nothing was saved yet
    pub async fn get(&self) -> Result<StoreSettings, SettingsError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.loaded_at.elapsed() <= self.cache_ttl {
                    return Ok(cached.settings.clone());
                }
            }
        }

        let settings = match self.store.load().await? {
            Some(settings) => settings,
            None => {
                tracing::debug!("No stored settings, using defaults");
                StoreSettings::default()
            }
        };

        let mut cache = self.cache.write().await;
        *cache = Some(CachedSettings {
            settings: settings.clone(),
            loaded_at: Instant::now(),
        });

        Ok(settings)
    }

    /// Validate and persist, then drop the cached copy
    pub async fn update(&self, settings: StoreSettings) -> Result<StoreSettings, SettingsError> {
        validate(&settings)?;

        self.store.save(&settings).await?;
        self.cache.write().await.take();

        tracing::info!(
            "Store settings updated (open: {}, delivery fee: {})",
            settings.store_open,
            settings.default_delivery_fee
        );
        Ok(settings)
    }
}

fn validate(settings: &StoreSettings) -> Result<(), SettingsError> {
    if settings.default_delivery_fee < Decimal::ZERO {
        return Err(invalid("default_delivery_fee", "must not be negative"));
    }
    if settings.default_margin_pct < Decimal::ZERO || settings.default_margin_pct >= HUNDRED {
        return Err(invalid("default_margin_pct", "must be in [0, 100)"));
    }

    let marketplace = &settings.marketplace;
    if marketplace.delivery_fee < Decimal::ZERO {
        return Err(invalid("marketplace.delivery_fee", "must not be negative"));
    }
    if marketplace.coupon < Decimal::ZERO {
        return Err(invalid("marketplace.coupon", "must not be negative"));
    }
    if marketplace.commission_pct < Decimal::ZERO || marketplace.commission_pct >= HUNDRED {
        return Err(invalid("marketplace.commission_pct", "must be in [0, 100)"));
    }
    Ok(())
}

fn invalid(field: &'static str, message: &str) -> SettingsError {
    SettingsError::Invalid {
        field,
        message: message.to_string(),
    }
}
