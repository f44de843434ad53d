mod catalog;
mod config;
mod costing;
mod db;
mod error;
mod inventory;
mod orders;
mod settings;
mod whatsapp;

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use catalog::{CatalogRepository, PgCatalogRepository};
use config::AppConfig;
use costing::{BomResolver, ComboComposer, CostingEngine, StockSufficiencyChecker};
use inventory::{InventoryService, PgInventoryStore};
use orders::{AuditLogger, OrderService, PgAuditSink, PgOrderRepository};
use settings::{PgSettingsStore, SettingsService};
use whatsapp::{
    ConversationalGateway, DisabledMessaging, DisabledReplyGenerator, FollowUpWorker, GatewayMetrics, GatewayParts,
    ImageResolver, MessageDeduplicator, MessagingGateway, ObjectStorage, OpenAiCompatibleClient, Outbox,
    PgComplaintStore, PgConversationStore, PgFollowUpQueue, PgProcessedMessages, ProcessedMessageStore,
    RedisProcessedMessages, ReplyGenerator, SupabaseStorage, WhatsAppCloudClient,
};

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        catalog::handlers::get_menu,
        costing::handlers::get_product_cost,
        costing::handlers::refresh_product_pricing,
        costing::handlers::simulate_cost,
        costing::handlers::quote_combo,
        costing::handlers::refresh_combo_pricing,
        inventory::handlers::get_average_cost,
        inventory::handlers::get_ingredient_stock,
        inventory::handlers::get_insumo_stock,
        inventory::handlers::record_purchase,
        inventory::handlers::deduct_stock,
        inventory::handlers::get_low_stock,
        orders::handlers::create_order,
        orders::handlers::list_orders,
        orders::handlers::active_orders,
        orders::handlers::get_order,
        orders::handlers::get_order_by_number,
        orders::handlers::update_order_status,
        orders::handlers::order_stock_check,
        orders::handlers::delete_order,
        settings::handlers::get_settings,
        settings::handlers::update_settings,
        whatsapp::handlers::verify_webhook,
        whatsapp::handlers::receive_webhook,
        whatsapp::handlers::gateway_health,
    ),
    components(
        schemas(
            catalog::MenuSnapshot,
            catalog::MenuCategory,
            catalog::MenuEntry,
            catalog::BomLine,
            costing::Unit,
            costing::CostBreakdown,
            costing::ProductCostReport,
            costing::MarginStatus,
            costing::ComboQuote,
            costing::MissingComboItem,
            costing::MarketplaceConfig,
            costing::LineItemRef,
            costing::StockReport,
            costing::LineShortage,
            costing::IngredientShortage,
            costing::BomWarning,
            costing::handlers::SimulateCostRequest,
            costing::handlers::SimulateCostResponse,
            inventory::PurchaseLot,
            inventory::InventoryLevel,
            inventory::RecordPurchaseRequest,
            inventory::DeductRequest,
            inventory::StockResponse,
            inventory::AverageCostResponse,
            orders::Order,
            orders::OrderItem,
            orders::OrderStatus,
            orders::OrderOrigin,
            orders::SelectedAddOn,
            orders::CreateOrderRequest,
            orders::OrderItemRequest,
            orders::UpdateStatusRequest,
            orders::OrderResponse,
            settings::StoreSettings,
            whatsapp::GatewayHealth,
            whatsapp::metrics::DeliveryFailure,
            whatsapp::handlers::WebhookAck,
        )
    ),
    tags(
        (name = "health", description = "Liveness"),
        (name = "menu", description = "Menu snapshot"),
        (name = "costing", description = "Product cost, margins and combo pricing"),
        (name = "inventory", description = "Purchases, stock levels and valuation"),
        (name = "orders", description = "Order lifecycle"),
        (name = "settings", description = "Store settings"),
        (name = "whatsapp", description = "WhatsApp webhook and gateway health")
    ),
    info(
        title = "Delivery API",
        version = "1.0.0",
        description = "Costing, order lifecycle and WhatsApp gateway for a delivery restaurant"
    )
)]
struct ApiDoc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn CatalogRepository>,
    pub inventory: Arc<InventoryService>,
    pub costing: Arc<CostingEngine>,
    pub combos: Arc<ComboComposer>,
    pub orders: OrderService,
    pub settings: Arc<SettingsService>,
    pub gateway: Arc<ConversationalGateway>,
    /// `None` disables webhook verification
    pub verify_token: Option<String>,
}

/// Handler for GET /health
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up")),
    tag = "health"
)]
async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Creates and configures the application router
/// Maps all API endpoints to their handlers and adds CORS and tracing middleware
fn create_router(state: AppState) -> Router {
    use axum::routing::patch;
    use tower::ServiceBuilder;
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(health_check))
        // WhatsApp
        .route(
            "/webhook",
            get(whatsapp::handlers::verify_webhook).post(whatsapp::handlers::receive_webhook),
        )
        .route("/api/whatsapp/health", get(whatsapp::handlers::gateway_health))
        // Catalog and costing
        .route("/api/menu", get(catalog::handlers::get_menu))
        .route("/api/products/:id/cost", get(costing::handlers::get_product_cost))
        .route(
            "/api/products/:id/pricing/refresh",
            post(costing::handlers::refresh_product_pricing),
        )
        .route("/api/costing/simulate", post(costing::handlers::simulate_cost))
        .route("/api/combos/:id/quote", get(costing::handlers::quote_combo))
        .route(
            "/api/combos/:id/pricing/refresh",
            post(costing::handlers::refresh_combo_pricing),
        )
        // Inventory
        .route(
            "/api/inventory/ingredients/:id/average-cost",
            get(inventory::handlers::get_average_cost),
        )
        .route(
            "/api/inventory/ingredients/:id/stock",
            get(inventory::handlers::get_ingredient_stock),
        )
        .route("/api/inventory/insumos/:id/stock", get(inventory::handlers::get_insumo_stock))
        .route("/api/inventory/purchases", post(inventory::handlers::record_purchase))
        .route("/api/inventory/insumos/:id/deduct", post(inventory::handlers::deduct_stock))
        .route("/api/inventory/low-stock", get(inventory::handlers::get_low_stock))
        // Orders
        .route(
            "/api/orders",
            post(orders::handlers::create_order).get(orders::handlers::list_orders),
        )
        .route("/api/orders/active", get(orders::handlers::active_orders))
        .route("/api/orders/number/:number", get(orders::handlers::get_order_by_number))
        .route(
            "/api/orders/:id",
            get(orders::handlers::get_order).delete(orders::handlers::delete_order),
        )
        .route("/api/orders/:id/status", patch(orders::handlers::update_order_status))
        .route("/api/orders/:id/stock-check", get(orders::handlers::order_stock_check))
        // Settings
        .route(
            "/api/settings",
            get(settings::handlers::get_settings).put(settings::handlers::update_settings),
        )
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state)
}

/// Redis when configured and reachable, Postgres otherwise
async fn processed_message_store(config: &AppConfig, pool: &db::DbPool) -> Arc<dyn ProcessedMessageStore> {
    if let Some(url) = &config.redis_url {
        match RedisProcessedMessages::new(url, config.dedup_ttl).await {
            Ok(store) => return Arc::new(store),
            Err(e) => tracing::warn!("Redis unavailable ({}), using Postgres for message ids", e),
        }
    }
    Arc::new(PgProcessedMessages::new(pool.clone()))
}

fn messaging_client(config: &AppConfig) -> Arc<dyn MessagingGateway> {
    match WhatsAppCloudClient::new(&config.whatsapp, config.http_timeout) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::warn!("WhatsApp sending disabled: {}", e);
            Arc::new(DisabledMessaging)
        }
    }
}

fn reply_generator(config: &AppConfig) -> Arc<dyn ReplyGenerator> {
    match OpenAiCompatibleClient::new(&config.llm, config.http_timeout) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::warn!("LLM replies disabled, using fallback text: {}", e);
            Arc::new(DisabledReplyGenerator)
        }
    }
}

fn object_storage(config: &AppConfig) -> Option<Arc<dyn ObjectStorage>> {
    match SupabaseStorage::new(&config.storage, config.http_timeout) {
        Ok(storage) => Some(Arc::new(storage)),
        Err(e) => {
            tracing::info!("Image uploads disabled: {}", e);
            None
        }
    }
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("Delivery API - Starting...");

    let config = AppConfig::from_env().expect("Invalid configuration");

    tracing::info!("Connecting to database...");
    let db_pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Migrations completed successfully");

    // Core services
    let catalog: Arc<dyn CatalogRepository> = Arc::new(PgCatalogRepository::new(db_pool.clone()));
    let inventory = Arc::new(InventoryService::new(
        catalog.clone(),
        Arc::new(PgInventoryStore::new(db_pool.clone())),
    ));
    let settings = Arc::new(SettingsService::new(Arc::new(PgSettingsStore::new(db_pool.clone()))));
    let stock_checker = Arc::new(StockSufficiencyChecker::new(
        BomResolver::new(catalog.clone()),
        inventory.clone(),
    ));
    let orders = OrderService::new(
        Arc::new(PgOrderRepository::new(db_pool.clone())),
        catalog.clone(),
        stock_checker,
        inventory.clone(),
        settings.clone(),
        AuditLogger::new(Arc::new(PgAuditSink::new(db_pool.clone()))),
    );

    // WhatsApp gateway
    let metrics = GatewayMetrics::new();
    let conversations = Arc::new(PgConversationStore::new(db_pool.clone()));
    let follow_ups = Arc::new(PgFollowUpQueue::new(db_pool.clone()));
    let outbox = Outbox::new(conversations.clone(), messaging_client(&config), metrics.clone());

    let gateway = Arc::new(ConversationalGateway::new(GatewayParts {
        dedup: MessageDeduplicator::new(processed_message_store(&config, &db_pool).await),
        conversations: conversations.clone(),
        complaints: Arc::new(PgComplaintStore::new(db_pool.clone())),
        orders: orders.clone(),
        catalog: catalog.clone(),
        settings: settings.clone(),
        llm: reply_generator(&config),
        outbox: outbox.clone(),
        follow_ups: follow_ups.clone(),
        images: ImageResolver::new(object_storage(&config)),
        metrics,
        menu_url: config.menu_url.clone(),
        menu_follow_up_delay: config.menu_follow_up_delay,
    }));

    let worker = FollowUpWorker::new(follow_ups, conversations, outbox);
    tokio::spawn(worker.run(config.follow_up_interval));

    if config.whatsapp.verify_token.is_none() {
        tracing::warn!("WHATSAPP_VERIFY_TOKEN not set, webhook verification will fail");
    }

    let state = AppState {
        costing: Arc::new(CostingEngine::new(catalog.clone(), inventory.clone())),
        combos: Arc::new(ComboComposer::new(catalog.clone())),
        catalog,
        inventory,
        orders,
        settings,
        gateway,
        verify_token: config.whatsapp.verify_token.clone(),
    };
    let app = create_router(state);

    // Start the Axum server
    let addr = config.bind_address();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Delivery API is running on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    axum::serve(listener, app).await.expect("Server error");
}

#[cfg(test)]
mod test_support;
