use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;
use utoipa::ToSchema;

use crate::costing::MarketplaceConfig;
use crate::db::StoreError;

/// Store-wide settings shared by the storefront, the dashboards and the bot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StoreSettings {
    pub store_open: bool,
    pub default_delivery_fee: Decimal,
    /// Target margin used when a pricing request gives none
    pub default_margin_pct: Decimal,
    #[serde(default)]
    pub marketplace: MarketplaceConfig,
    #[serde(default)]
    pub menu_url: Option<String>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            store_open: true,
            default_delivery_fee: Decimal::ZERO,
            default_margin_pct: Decimal::from(30),
            marketplace: MarketplaceConfig::default(),
            menu_url: None,
        }
    }
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Stored settings, `None` before the first save
    async fn load(&self) -> Result<Option<StoreSettings>, StoreError>;

    async fn save(&self, settings: &StoreSettings) -> Result<(), StoreError>;
}

/// Single-row JSONB table
#[derive(Clone)]
pub struct PgSettingsStore {
    pool: PgPool,
}

impl PgSettingsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsStore for PgSettingsStore {
    async fn load(&self) -> Result<Option<StoreSettings>, StoreError> {
        let row: Option<Json<StoreSettings>> =
            sqlx::query_scalar("SELECT data FROM store_settings WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|json| json.0))
    }

    async fn save(&self, settings: &StoreSettings) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO store_settings (id, data, updated_at)
            VALUES (1, $1, NOW())
            ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()
            "#,
        )
        .bind(Json(settings))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
