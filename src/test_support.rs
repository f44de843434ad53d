// In-memory stores and fixtures shared by the unit tests
//
// Every store trait in the crate has a Postgres implementation next to it;
// the doubles here keep the services testable without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::catalog::{
    Adicional, Bebida, CatalogRepository, Combo, FixedCost, IngredientBase, Insumo, Personalizacao, Product,
    VariableCost,
};
use crate::costing::{BomResolver, ComboComposer, CostingEngine, StockSufficiencyChecker};
use crate::db::StoreError;
use crate::inventory::valuation::consume_fifo;
use crate::inventory::{
    Deduction, InventoryLevel, InventoryService, InventoryStore, LotDraw, NewPurchase, PurchaseLot, StockMovement,
    DEFAULT_MIN_THRESHOLD,
};
use crate::orders::audit::{AuditSink, OrderAuditEntry};
use crate::orders::{
    phones_match, AuditLogger, NewOrder, Order, OrderFilter, OrderItem, OrderRepository, OrderService, OrderStatus,
};
use crate::settings::{SettingsService, SettingsStore, StoreSettings};
use crate::whatsapp::complaint::{ComplaintStore, NewComplaint};
use crate::whatsapp::conversation::{
    Conversation, ConversationMessage, ConversationStore, DeliveryStatus, NewConversationMessage,
};
use crate::whatsapp::dedup::{MessageDeduplicator, ProcessedMessageStore};
use crate::whatsapp::followup::{FollowUp, FollowUpQueue, FollowUpStatus, NewFollowUp, MAX_FOLLOW_UP_ATTEMPTS};
use crate::whatsapp::gateway::{ConversationalGateway, GatewayParts};
use crate::whatsapp::llm::{LlmError, ReplyGenerator};
use crate::whatsapp::media::ImageResolver;
use crate::whatsapp::messaging::{MessagingError, MessagingGateway, SentMessage};
use crate::whatsapp::metrics::GatewayMetrics;
use crate::whatsapp::outbox::Outbox;
use crate::AppState;

// ============================================================================
// Catalog
// ============================================================================

#[derive(Default)]
struct CatalogData {
    ingredients: Vec<IngredientBase>,
    insumos: Vec<Insumo>,
    products: Vec<Product>,
    drinks: Vec<Bebida>,
    combos: Vec<Combo>,
    adicionais: Vec<Adicional>,
    personalizacoes: Vec<Personalizacao>,
    fixed_costs: Vec<FixedCost>,
    variable_costs: Vec<VariableCost>,
}

fn upsert<T>(items: &mut Vec<T>, item: T, same: impl Fn(&T) -> bool) {
    match items.iter_mut().find(|existing| same(existing)) {
        Some(existing) => *existing = item,
        None => items.push(item),
    }
}

#[derive(Default)]
pub struct InMemoryCatalog {
    data: Mutex<CatalogData>,
}

impl InMemoryCatalog {
    pub fn add_ingredient(&self, ingredient: IngredientBase) {
        let id = ingredient.id;
        upsert(&mut self.data.lock().unwrap().ingredients, ingredient, |i| i.id == id);
    }

    pub fn add_insumo(&self, insumo: Insumo) {
        let id = insumo.id;
        upsert(&mut self.data.lock().unwrap().insumos, insumo, |i| i.id == id);
    }

    pub fn add_product(&self, product: Product) {
        let id = product.id;
        upsert(&mut self.data.lock().unwrap().products, product, |p| p.id == id);
    }

    pub fn add_drink(&self, drink: Bebida) {
        let id = drink.id;
        upsert(&mut self.data.lock().unwrap().drinks, drink, |d| d.id == id);
    }

    pub fn add_combo(&self, combo: Combo) {
        let id = combo.id;
        upsert(&mut self.data.lock().unwrap().combos, combo, |c| c.id == id);
    }

    pub fn add_adicional(&self, adicional: Adicional) {
        let id = adicional.id;
        upsert(&mut self.data.lock().unwrap().adicionais, adicional, |a| a.id == id);
    }

    pub fn add_fixed_cost(&self, cost: FixedCost) {
        let id = cost.id;
        upsert(&mut self.data.lock().unwrap().fixed_costs, cost, |c| c.id == id);
    }

    pub fn add_variable_cost(&self, cost: VariableCost) {
        let id = cost.id;
        upsert(&mut self.data.lock().unwrap().variable_costs, cost, |c| c.id == id);
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalog {
    async fn ingredient(&self, id: i32) -> Result<Option<IngredientBase>, StoreError> {
        Ok(self.data.lock().unwrap().ingredients.iter().find(|i| i.id == id).cloned())
    }

    async fn insumo(&self, id: i32) -> Result<Option<Insumo>, StoreError> {
        Ok(self.data.lock().unwrap().insumos.iter().find(|i| i.id == id).cloned())
    }

    async fn insumos_for_ingredient(&self, ingredient_id: i32) -> Result<Vec<Insumo>, StoreError> {
        let data = self.data.lock().unwrap();
        Ok(data
            .insumos
            .iter()
            .filter(|i| i.ingredient_base_id == ingredient_id)
            .cloned()
            .collect())
    }

    async fn product(&self, id: i32) -> Result<Option<Product>, StoreError> {
        Ok(self.data.lock().unwrap().products.iter().find(|p| p.id == id).cloned())
    }

    async fn products(&self) -> Result<Vec<Product>, StoreError> {
        Ok(self.data.lock().unwrap().products.clone())
    }

    async fn drink(&self, id: i32) -> Result<Option<Bebida>, StoreError> {
        Ok(self.data.lock().unwrap().drinks.iter().find(|d| d.id == id).cloned())
    }

    async fn drinks(&self) -> Result<Vec<Bebida>, StoreError> {
        Ok(self.data.lock().unwrap().drinks.clone())
    }

    async fn combo(&self, id: i32) -> Result<Option<Combo>, StoreError> {
        Ok(self.data.lock().unwrap().combos.iter().find(|c| c.id == id).cloned())
    }

    async fn combos(&self) -> Result<Vec<Combo>, StoreError> {
        Ok(self.data.lock().unwrap().combos.clone())
    }

    async fn adicionais(&self) -> Result<Vec<Adicional>, StoreError> {
        Ok(self.data.lock().unwrap().adicionais.clone())
    }

    async fn personalizacoes(&self) -> Result<Vec<Personalizacao>, StoreError> {
        Ok(self.data.lock().unwrap().personalizacoes.clone())
    }

    async fn fixed_costs(&self) -> Result<Vec<FixedCost>, StoreError> {
        Ok(self.data.lock().unwrap().fixed_costs.clone())
    }

    async fn variable_costs(&self) -> Result<Vec<VariableCost>, StoreError> {
        Ok(self.data.lock().unwrap().variable_costs.clone())
    }

    async fn update_product_pricing(
        &self,
        product_id: i32,
        cmv: Decimal,
        margin_pct: Decimal,
    ) -> Result<bool, StoreError> {
        let mut data = self.data.lock().unwrap();
        match data.products.iter_mut().find(|p| p.id == product_id) {
            Some(product) => {
                product.cmv = cmv;
                product.margin_pct = margin_pct;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_combo_pricing(
        &self,
        combo_id: i32,
        final_price: Decimal,
        marketplace_price: Option<Decimal>,
    ) -> Result<bool, StoreError> {
        let mut data = self.data.lock().unwrap();
        match data.combos.iter_mut().find(|c| c.id == combo_id) {
            Some(combo) => {
                combo.final_price = final_price;
                combo.marketplace_price = marketplace_price;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// ============================================================================
// Inventory
// ============================================================================

#[derive(Default)]
pub struct InMemoryInventory {
    levels: Mutex<HashMap<i32, InventoryLevel>>,
    lots: Mutex<Vec<PurchaseLot>>,
    next_lot_id: AtomicI64,
}

impl InMemoryInventory {
    pub fn set_level(&self, insumo_id: i32, quantity: Decimal) {
        self.levels.lock().unwrap().insert(
            insumo_id,
            InventoryLevel {
                insumo_id,
                quantity,
                min_threshold: DEFAULT_MIN_THRESHOLD,
                updated_at: Utc::now(),
            },
        );
    }

    pub fn level_of(&self, insumo_id: i32) -> Decimal {
        self.levels
            .lock()
            .unwrap()
            .get(&insumo_id)
            .map(|level| level.quantity)
            .unwrap_or_default()
    }

    /// Store a lot as given, e.g. one without remaining tracking
    pub fn seed_lot(&self, ingredient_id: i32, quantity: Decimal, unit_price: Decimal, remaining: Option<Decimal>) {
        let id = self.next_lot_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.lots.lock().unwrap().push(PurchaseLot {
            id,
            ingredient_id,
            quantity,
            unit_price,
            remaining,
            purchased_at: Utc::now(),
        });
    }

    fn credit(&self, insumo_id: i32, quantity: Decimal) {
        let mut levels = self.levels.lock().unwrap();
        let level = levels.entry(insumo_id).or_insert_with(|| InventoryLevel {
            insumo_id,
            quantity: Decimal::ZERO,
            min_threshold: DEFAULT_MIN_THRESHOLD,
            updated_at: Utc::now(),
        });
        level.quantity += quantity;
        level.updated_at = Utc::now();
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventory {
    async fn lots_for(&self, ingredient_id: i32) -> Result<Vec<PurchaseLot>, StoreError> {
        let mut lots: Vec<PurchaseLot> = self
            .lots
            .lock()
            .unwrap()
            .iter()
            .filter(|lot| lot.ingredient_id == ingredient_id)
            .cloned()
            .collect();
        lots.sort_by_key(|lot| (lot.purchased_at, lot.id));
        Ok(lots)
    }

    async fn level(&self, insumo_id: i32) -> Result<Option<InventoryLevel>, StoreError> {
        Ok(self.levels.lock().unwrap().get(&insumo_id).cloned())
    }

    async fn levels(&self) -> Result<Vec<InventoryLevel>, StoreError> {
        let mut levels: Vec<InventoryLevel> = self.levels.lock().unwrap().values().cloned().collect();
        levels.sort_by_key(|level| level.insumo_id);
        Ok(levels)
    }

    async fn record_purchase(&self, purchase: &NewPurchase) -> Result<PurchaseLot, StoreError> {
        let lot = PurchaseLot {
            id: self.next_lot_id.fetch_add(1, Ordering::SeqCst) + 1,
            ingredient_id: purchase.ingredient_id,
            quantity: purchase.quantity,
            unit_price: purchase.unit_price,
            remaining: Some(purchase.quantity),
            purchased_at: Utc::now(),
        };
        self.lots.lock().unwrap().push(lot.clone());
        self.credit(purchase.insumo_id, purchase.quantity);
        Ok(lot)
    }

    async fn try_deduct_many(&self, deductions: &[Deduction]) -> Result<Option<StockMovement>, StoreError> {
        {
            let mut levels = self.levels.lock().unwrap();
            let covered = deductions.iter().all(|d| {
                levels
                    .get(&d.insumo_id)
                    .is_some_and(|level| level.quantity >= d.quantity)
            });
            if !covered {
                return Ok(None);
            }
            for deduction in deductions {
                if let Some(level) = levels.get_mut(&deduction.insumo_id) {
                    level.quantity -= deduction.quantity;
                    level.updated_at = Utc::now();
                }
            }
        }

        let mut lot_draws = Vec::new();
        for deduction in deductions {
            let lots = self.lots_for(deduction.ingredient_id).await?;
            let plan = consume_fifo(&lots, deduction.quantity);
            let mut stored = self.lots.lock().unwrap();
            for (lot_id, taken) in plan {
                if let Some(lot) = stored.iter_mut().find(|lot| lot.id == lot_id) {
                    lot.remaining = Some(lot.remaining.unwrap_or(lot.quantity) - taken);
                    lot_draws.push(LotDraw { lot_id, quantity: taken });
                }
            }
        }
        Ok(Some(StockMovement {
            deductions: deductions.to_vec(),
            lot_draws,
        }))
    }

    async fn restock(&self, movement: &StockMovement) -> Result<(), StoreError> {
        for deduction in &movement.deductions {
            self.credit(deduction.insumo_id, deduction.quantity);
        }
        let mut stored = self.lots.lock().unwrap();
        for draw in &movement.lot_draws {
            if let Some(lot) = stored.iter_mut().find(|lot| lot.id == draw.lot_id) {
                let refilled = lot.remaining.unwrap_or(Decimal::ZERO) + draw.quantity;
                lot.remaining = Some(refilled.min(lot.quantity));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Settings
// ============================================================================

#[derive(Default)]
pub struct InMemorySettings {
    saved: Mutex<Option<StoreSettings>>,
    loads: AtomicUsize,
}

impl InMemorySettings {
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SettingsStore for InMemorySettings {
    async fn load(&self) -> Result<Option<StoreSettings>, StoreError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.saved.lock().unwrap().clone())
    }

    async fn save(&self, settings: &StoreSettings) -> Result<(), StoreError> {
        *self.saved.lock().unwrap() = Some(settings.clone());
        Ok(())
    }
}

// ============================================================================
// Orders
// ============================================================================

#[derive(Default)]
pub struct InMemoryOrders {
    orders: Mutex<Vec<Order>>,
    items: Mutex<Vec<OrderItem>>,
    next_item_id: AtomicI64,
    fail_next_status_write: AtomicBool,
}

impl InMemoryOrders {
    pub fn seed(&self, order: Order) -> Order {
        self.orders.lock().unwrap().push(order.clone());
        order
    }

    /// The next conditional status write behaves as if another writer won
    pub fn fail_next_status_write(&self) {
        self.fail_next_status_write.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrders {
    async fn insert(&self, new_order: &NewOrder) -> Result<(Order, Vec<OrderItem>), StoreError> {
        let mut orders = self.orders.lock().unwrap();
        if orders.iter().any(|o| o.number == new_order.number) {
            return Err(StoreError::UniqueViolation(format!("orders.number {}", new_order.number)));
        }

        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            number: new_order.number.clone(),
            customer_name: new_order.customer_name.clone(),
            customer_phone: new_order.customer_phone.clone(),
            address: new_order.address.clone(),
            complement: new_order.complement.clone(),
            notes: new_order.notes.clone(),
            subtotal: new_order.subtotal,
            delivery_fee: new_order.delivery_fee,
            total: new_order.total,
            payment_method: new_order.payment_method.clone(),
            status: OrderStatus::Pendente,
            origin: new_order.origin,
            stock_deducted: false,
            created_at: now,
            updated_at: now,
        };
        let items: Vec<OrderItem> = new_order
            .items
            .iter()
            .map(|item| OrderItem {
                id: self.next_item_id.fetch_add(1, Ordering::SeqCst) + 1,
                order_id: order.id,
                item: item.item,
                name: item.name.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                subtotal: item.subtotal,
                removed: item.removed.clone(),
                added: item.added.clone(),
                comment: item.comment.clone(),
            })
            .collect();

        orders.push(order.clone());
        self.items.lock().unwrap().extend(items.iter().cloned());
        Ok((order, items))
    }

    async fn find(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.lock().unwrap().iter().find(|o| o.id == id).cloned())
    }

    async fn find_by_number(&self, number: &str) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.lock().unwrap().iter().find(|o| o.number == number).cloned())
    }

    async fn items(&self, order_id: Uuid) -> Result<Vec<OrderItem>, StoreError> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self
            .orders
            .lock()
            .unwrap()
            .iter()
            .filter(|o| filter.statuses.is_empty() || filter.statuses.contains(&o.status))
            .filter(|o| filter.from.map_or(true, |from| o.created_at >= from))
            .filter(|o| filter.to.map_or(true, |to| o.created_at <= to))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn latest_active_for_phone(&self, phone: &str) -> Result<Option<Order>, StoreError> {
        Ok(self
            .orders
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.status.is_active() && phones_match(&o.customer_phone, phone))
            .max_by_key(|o| o.created_at)
            .cloned())
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        mark_stock_deducted: bool,
    ) -> Result<Option<Order>, StoreError> {
        if self.fail_next_status_write.swap(false, Ordering::SeqCst) {
            return Ok(None);
        }
        let mut orders = self.orders.lock().unwrap();
        match orders.iter_mut().find(|o| o.id == id && o.status == from) {
            Some(order) => {
                order.status = to;
                order.stock_deducted |= mark_stock_deducted;
                order.updated_at = Utc::now();
                Ok(Some(order.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut orders = self.orders.lock().unwrap();
        let before = orders.len();
        orders.retain(|o| o.id != id);
        self.items.lock().unwrap().retain(|i| i.order_id != id);
        Ok(orders.len() < before)
    }
}

#[derive(Default)]
pub struct InMemoryAudit {
    entries: Mutex<Vec<OrderAuditEntry>>,
    failing: bool,
}

impl InMemoryAudit {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn entries(&self) -> Vec<OrderAuditEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for InMemoryAudit {
    async fn append(&self, entry: &OrderAuditEntry) -> Result<(), StoreError> {
        if self.failing {
            return Err(StoreError::Unavailable("audit log offline".into()));
        }
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

// ============================================================================
// WhatsApp
// ============================================================================

#[derive(Default)]
pub struct InMemoryProcessedMessages {
    seen: Mutex<HashSet<String>>,
    unavailable: AtomicBool,
}

impl InMemoryProcessedMessages {
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProcessedMessageStore for InMemoryProcessedMessages {
    async fn claim(&self, message_id: &str) -> Result<bool, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("processed_messages offline".into()));
        }
        Ok(self.seen.lock().unwrap().insert(message_id.to_string()))
    }
}

#[derive(Default)]
pub struct InMemoryConversations {
    conversations: Mutex<Vec<Conversation>>,
    messages: Mutex<Vec<ConversationMessage>>,
}

impl InMemoryConversations {
    pub fn messages(&self) -> Vec<ConversationMessage> {
        self.messages.lock().unwrap().clone()
    }

    fn update_message(&self, message_id: i64, apply: impl FnOnce(&mut ConversationMessage)) {
        if let Some(message) = self.messages.lock().unwrap().iter_mut().find(|m| m.id == message_id) {
            apply(message);
        }
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversations {
    async fn upsert_conversation(
        &self,
        phone: &str,
        customer_name: Option<&str>,
    ) -> Result<(Conversation, bool), StoreError> {
        let mut conversations = self.conversations.lock().unwrap();
        let now = Utc::now();
        if let Some(existing) = conversations.iter_mut().find(|c| c.phone == phone) {
            existing.last_message_at = now;
            if let Some(name) = customer_name {
                existing.customer_name = Some(name.to_string());
            }
            return Ok((existing.clone(), false));
        }

        let conversation = Conversation {
            id: conversations.len() as i64 + 1,
            phone: phone.to_string(),
            customer_name: customer_name.map(str::to_string),
            created_at: now,
            last_message_at: now,
        };
        conversations.push(conversation.clone());
        Ok((conversation, true))
    }

    async fn append_message(&self, message: &NewConversationMessage) -> Result<ConversationMessage, StoreError> {
        let mut messages = self.messages.lock().unwrap();
        let stored = ConversationMessage {
            id: messages.len() as i64 + 1,
            conversation_id: message.conversation_id,
            direction: message.direction,
            kind: message.kind,
            body: message.body.clone(),
            status: message.status,
            wa_message_id: message.wa_message_id.clone(),
            error: None,
            created_at: Utc::now(),
        };
        messages.push(stored.clone());
        Ok(stored)
    }

    async fn mark_sent(&self, message_id: i64, wa_message_id: Option<&str>) -> Result<(), StoreError> {
        self.update_message(message_id, |m| {
            m.status = DeliveryStatus::Sent;
            m.wa_message_id = wa_message_id.map(str::to_string);
        });
        Ok(())
    }

    async fn mark_failed(&self, message_id: i64, error: &str) -> Result<(), StoreError> {
        self.update_message(message_id, |m| {
            m.status = DeliveryStatus::Failed;
            m.error = Some(error.to_string());
        });
        Ok(())
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Conversation>, StoreError> {
        Ok(self.conversations.lock().unwrap().iter().find(|c| c.phone == phone).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryComplaints {
    recorded: Mutex<Vec<NewComplaint>>,
}

impl InMemoryComplaints {
    pub fn recorded(&self) -> Vec<NewComplaint> {
        self.recorded.lock().unwrap().clone()
    }
}

#[async_trait]
impl ComplaintStore for InMemoryComplaints {
    async fn record(&self, complaint: &NewComplaint) -> Result<i64, StoreError> {
        let mut recorded = self.recorded.lock().unwrap();
        recorded.push(complaint.clone());
        Ok(recorded.len() as i64)
    }
}

#[derive(Default)]
pub struct InMemoryFollowUps {
    rows: Mutex<Vec<FollowUp>>,
}

impl InMemoryFollowUps {
    pub fn with_status(&self, status: FollowUpStatus) -> Vec<FollowUp> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.status == status)
            .cloned()
            .collect()
    }

    fn update(&self, id: i64, apply: impl FnOnce(&mut FollowUp)) {
        if let Some(row) = self.rows.lock().unwrap().iter_mut().find(|f| f.id == id) {
            apply(row);
        }
    }
}

#[async_trait]
impl FollowUpQueue for InMemoryFollowUps {
    async fn enqueue(&self, follow_up: &NewFollowUp) -> Result<i64, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let id = rows.len() as i64 + 1;
        rows.push(FollowUp {
            id,
            phone: follow_up.phone.clone(),
            conversation_id: follow_up.conversation_id,
            action: sqlx::types::Json(follow_up.action.clone()),
            deliver_at: follow_up.deliver_at,
            status: FollowUpStatus::Pending,
            attempts: 0,
            last_error: None,
        });
        Ok(id)
    }

    async fn due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<FollowUp>, StoreError> {
        let mut due: Vec<FollowUp> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.status == FollowUpStatus::Pending && f.deliver_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|f| (f.deliver_at, f.id));
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn mark_sent(&self, id: i64) -> Result<(), StoreError> {
        self.update(id, |f| {
            f.status = FollowUpStatus::Sent;
            f.attempts += 1;
            f.last_error = None;
        });
        Ok(())
    }

    async fn mark_failed(&self, id: i64, error: &str) -> Result<(), StoreError> {
        self.update(id, |f| {
            f.attempts += 1;
            f.last_error = Some(error.to_string());
            if f.attempts >= MAX_FOLLOW_UP_ATTEMPTS {
                f.status = FollowUpStatus::Failed;
            }
        });
        Ok(())
    }
}

/// One message handed to the provider
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSend {
    pub to: String,
    /// Text body, CTA body, or image caption/URL
    pub body: String,
}

#[derive(Default)]
pub struct RecordingMessaging {
    sent: Mutex<Vec<RecordedSend>>,
    attempts: AtomicUsize,
    failure: Mutex<Option<MessagingError>>,
}

impl RecordingMessaging {
    pub fn sent(&self) -> Vec<RecordedSend> {
        self.sent.lock().unwrap().clone()
    }

    /// Every send, failed ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// All further sends fail with `error`
    pub fn fail_with(&self, error: MessagingError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    fn record(&self, to: &str, body: &str) -> Result<SentMessage, MessagingError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }
        self.sent.lock().unwrap().push(RecordedSend {
            to: to.to_string(),
            body: body.to_string(),
        });
        Ok(SentMessage {
            wa_message_id: Some(format!("wamid.out.{}", attempt)),
        })
    }
}

#[async_trait]
impl MessagingGateway for RecordingMessaging {
    async fn send_text(&self, to: &str, body: &str) -> Result<SentMessage, MessagingError> {
        self.record(to, body)
    }

    async fn send_interactive_cta(
        &self,
        to: &str,
        body: &str,
        _button_label: &str,
        _url: &str,
    ) -> Result<SentMessage, MessagingError> {
        self.record(to, body)
    }

    async fn send_image(&self, to: &str, image_url: &str, caption: Option<&str>) -> Result<SentMessage, MessagingError> {
        self.record(to, caption.unwrap_or(image_url))
    }
}

const SCRIPTED_REPLY: &str = "Olá! Como posso ajudar? 😊";

#[derive(Default)]
pub struct ScriptedLlm {
    prompts: Mutex<Vec<String>>,
    reply: Mutex<Option<String>>,
    failing: AtomicBool,
}

impl ScriptedLlm {
    /// System prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn reply_with(&self, reply: &str) {
        *self.reply.lock().unwrap() = Some(reply.to_string());
    }
}

#[async_trait]
impl ReplyGenerator for ScriptedLlm {
    async fn generate(&self, system_prompt: &str, _user_message: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(system_prompt.to_string());
        if self.failing.load(Ordering::SeqCst) {
            return Err(LlmError::Network("connection refused".into()));
        }
        Ok(self
            .reply
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| SCRIPTED_REPLY.to_string()))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub mod fixtures {
    use super::*;
    use crate::catalog::ComboItem;
    use crate::costing::Unit;
    use crate::orders::OrderOrigin;
    use rust_decimal_macros::dec;

    pub const FARINHA: i32 = 1;
    pub const CARNE: i32 = 2;

    pub const PAO: i32 = 10;
    pub const HAMBURGUER: i32 = 11;
    /// Second insumo of FARINHA, not part of `burger_catalog`
    pub const MASSA: i32 = 12;

    pub const X_BURGER: i32 = 1;
    pub const X_SALADA: i32 = 2;
    pub const REFRIGERANTE: i32 = 1;
    pub const COMBO_A_B: i32 = 1;
    pub const BACON_EXTRA: i32 = 1;
    pub const PIZZA: i32 = 3;

    pub fn product(id: i32, name: &str, sale_price: Decimal) -> Product {
        Product {
            id,
            name: name.to_string(),
            category: "Lanches".into(),
            description: String::new(),
            image: None,
            insumos: vec![],
            cmv: Decimal::ZERO,
            sale_price,
            margin_pct: Decimal::ZERO,
            marketplace_price: None,
            active: true,
        }
    }

    /// 0.1 kg of bread per burger
    pub fn x_burger() -> Product {
        Product {
            description: "Pão, hambúrguer e queijo".into(),
            image: Some("https://cdn.example/x-burger.png".into()),
            insumos: vec![crate::catalog::BomLine {
                insumo_id: PAO,
                quantity: dec!(0.1),
                unit: Some(Unit::Kilogram),
            }],
            ..product(X_BURGER, "X-Burger", dec!(20))
        }
    }

    pub fn x_salada() -> Product {
        Product {
            description: "Hambúrguer com alface e tomate".into(),
            insumos: vec![crate::catalog::BomLine {
                insumo_id: HAMBURGUER,
                quantity: dec!(1),
                unit: Some(Unit::Piece),
            }],
            ..product(X_SALADA, "X-Salada", dec!(22))
        }
    }

    pub fn massa() -> Insumo {
        Insumo {
            id: MASSA,
            name: "Massa".into(),
            ingredient_base_id: FARINHA,
            yield_quantity: dec!(1),
            unit: Unit::Kilogram,
            category: "Padaria".into(),
            unit_price: dec!(5),
        }
    }

    /// 0.3 kg of dough per pizza
    pub fn pizza() -> Product {
        Product {
            insumos: vec![crate::catalog::BomLine {
                insumo_id: MASSA,
                quantity: dec!(0.3),
                unit: Some(Unit::Kilogram),
            }],
            ..product(PIZZA, "Pizza", dec!(45))
        }
    }

    /// `burger_catalog` plus the dough insumo and the pizza made from it
    pub fn pizza_catalog() -> InMemoryCatalog {
        let catalog = burger_catalog();
        catalog.add_insumo(massa());
        catalog.add_product(pizza());
        catalog
    }

    pub fn refrigerante() -> Bebida {
        Bebida {
            id: REFRIGERANTE,
            name: "Refrigerante".into(),
            category: "Bebidas".into(),
            cost: dec!(2.50),
            sale_price: dec!(6),
            image: None,
            active: true,
        }
    }

    pub fn combo_a_b() -> Combo {
        Combo {
            id: COMBO_A_B,
            name: "Combo Clássico".into(),
            description: "X-Burger com refrigerante".into(),
            image: None,
            products: vec![ComboItem {
                item_id: X_BURGER,
                quantity: 1,
            }],
            drinks: vec![ComboItem {
                item_id: REFRIGERANTE,
                quantity: 1,
            }],
            discount_pct: dec!(15),
            final_price: dec!(22.10),
            marketplace_price: None,
            adicional_ids: vec![],
            personalizacao_ids: vec![],
            active: true,
        }
    }

    /// Flour and beef, bread and patty insumos, two burgers, a drink, a combo
    /// and one add-on; no fixed or variable costs
    pub fn burger_catalog() -> InMemoryCatalog {
        let catalog = InMemoryCatalog::default();
        catalog.add_ingredient(IngredientBase {
            id: FARINHA,
            name: "Farinha".into(),
            category: "Secos".into(),
            unit: Unit::Kilogram,
            nominal_price: dec!(5),
            supplier: None,
        });
        catalog.add_ingredient(IngredientBase {
            id: CARNE,
            name: "Carne moída".into(),
            category: "Carnes".into(),
            unit: Unit::Kilogram,
            nominal_price: dec!(40),
            supplier: Some("Açougue Central".into()),
        });
        catalog.add_insumo(Insumo {
            id: PAO,
            name: "Pão".into(),
            ingredient_base_id: FARINHA,
            yield_quantity: dec!(1),
            unit: Unit::Kilogram,
            category: "Padaria".into(),
            unit_price: dec!(5),
        });
        catalog.add_insumo(Insumo {
            id: HAMBURGUER,
            name: "Hambúrguer 150g".into(),
            ingredient_base_id: CARNE,
            yield_quantity: dec!(0.15),
            unit: Unit::Piece,
            category: "Carnes".into(),
            unit_price: dec!(6),
        });
        catalog.add_product(x_burger());
        catalog.add_product(x_salada());
        catalog.add_drink(refrigerante());
        catalog.add_combo(combo_a_b());
        catalog.add_adicional(Adicional {
            id: BACON_EXTRA,
            name: "Bacon extra".into(),
            price: dec!(4),
            insumo_id: None,
            categories: vec!["Lanches".into()],
        });
        catalog
    }

    /// Order from a phone the gateway tests never write from
    pub fn order(number: &str, status: OrderStatus) -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            number: number.to_string(),
            customer_name: "João".into(),
            customer_phone: "21988887777".into(),
            address: Some("Rua B, 20".into()),
            complement: None,
            notes: None,
            subtotal: dec!(20),
            delivery_fee: dec!(5),
            total: dec!(25),
            payment_method: "pix".into(),
            status,
            origin: OrderOrigin::Menu,
            stock_deducted: false,
            created_at: now,
            updated_at: now,
        }
    }
}

// ============================================================================
// Gateway harness
// ============================================================================

pub struct GatewayHarness {
    pub gateway: Arc<ConversationalGateway>,
    pub conversations: Arc<InMemoryConversations>,
    pub messaging: Arc<RecordingMessaging>,
    pub llm: Arc<ScriptedLlm>,
    pub follow_ups: Arc<InMemoryFollowUps>,
    pub orders: Arc<InMemoryOrders>,
    pub complaints: Arc<InMemoryComplaints>,
    pub processed: Arc<InMemoryProcessedMessages>,
    pub inventory: Arc<InMemoryInventory>,
    catalog: Arc<dyn CatalogRepository>,
    inventory_service: Arc<InventoryService>,
    order_service: OrderService,
    settings: Arc<SettingsService>,
}

impl GatewayHarness {
    /// Router state sharing this harness' stores
    pub fn app_state(&self, verify_token: Option<&str>) -> AppState {
        AppState {
            catalog: self.catalog.clone(),
            inventory: self.inventory_service.clone(),
            costing: Arc::new(CostingEngine::new(self.catalog.clone(), self.inventory_service.clone())),
            combos: Arc::new(ComboComposer::new(self.catalog.clone())),
            orders: self.order_service.clone(),
            settings: self.settings.clone(),
            gateway: self.gateway.clone(),
            verify_token: verify_token.map(str::to_string),
        }
    }
}

pub fn gateway_harness() -> GatewayHarness {
    let catalog: Arc<dyn CatalogRepository> = Arc::new(fixtures::burger_catalog());
    let inventory = Arc::new(InMemoryInventory::default());
    let inventory_service = Arc::new(InventoryService::new(catalog.clone(), inventory.clone()));
    let checker = Arc::new(StockSufficiencyChecker::new(
        BomResolver::new(catalog.clone()),
        inventory_service.clone(),
    ));
    let settings = Arc::new(SettingsService::new(Arc::new(InMemorySettings::default())));
    let orders = Arc::new(InMemoryOrders::default());
    let order_service = OrderService::new(
        orders.clone(),
        catalog.clone(),
        checker,
        inventory_service.clone(),
        settings.clone(),
        AuditLogger::new(Arc::new(InMemoryAudit::default())),
    );

    let processed = Arc::new(InMemoryProcessedMessages::default());
    let conversations = Arc::new(InMemoryConversations::default());
    let messaging = Arc::new(RecordingMessaging::default());
    let llm = Arc::new(ScriptedLlm::default());
    let follow_ups = Arc::new(InMemoryFollowUps::default());
    let complaints = Arc::new(InMemoryComplaints::default());
    let metrics = GatewayMetrics::new();

    let gateway = ConversationalGateway::new(GatewayParts {
        dedup: MessageDeduplicator::new(processed.clone()),
        conversations: conversations.clone(),
        complaints: complaints.clone(),
        orders: order_service.clone(),
        catalog: catalog.clone(),
        settings: settings.clone(),
        llm: llm.clone(),
        outbox: Outbox::new(conversations.clone(), messaging.clone(), metrics.clone()),
        follow_ups: follow_ups.clone(),
        images: ImageResolver::new(None),
        metrics,
        menu_url: Some("https://loja.example/cardapio".into()),
        menu_follow_up_delay: Duration::from_secs(30),
    });

    GatewayHarness {
        gateway: Arc::new(gateway),
        conversations,
        messaging,
        llm,
        follow_ups,
        orders,
        complaints,
        processed,
        inventory,
        catalog,
        inventory_service,
        order_service,
        settings,
    }
}
