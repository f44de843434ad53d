use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::catalog::{Adicional, CatalogRepository, Personalizacao, COMBO_CATEGORY};
use crate::costing::{LineItemRef, StockCheckLine, StockReport, StockSufficiencyChecker};
use crate::db::StoreError;
use crate::inventory::{InventoryService, StockMovement};
use crate::orders::audit::AuditLogger;
use crate::orders::numbering::{generate_order_number, normalize_order_number, MAX_NUMBER_ATTEMPTS};
use crate::orders::{
    CreateOrderRequest, NewOrder, NewOrderItem, Order, OrderError, OrderFilter, OrderItemRequest,
    OrderRepository, OrderResponse, OrderStatus, PriceCalculator, SelectedAddOn, StatusMachine,
};
use crate::settings::SettingsService;

/// Catalog facts a line needs to be priced
struct PricedItem {
    name: String,
    base_price: Decimal,
    category: String,
    scoped_adicionais: Vec<i32>,
    scoped_personalizacoes: Vec<i32>,
}

/// Service for order business logic
#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    catalog: Arc<dyn CatalogRepository>,
    stock_checker: Arc<StockSufficiencyChecker>,
    inventory: Arc<InventoryService>,
    settings: Arc<SettingsService>,
    audit: AuditLogger,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        catalog: Arc<dyn CatalogRepository>,
        stock_checker: Arc<StockSufficiencyChecker>,
        inventory: Arc<InventoryService>,
        settings: Arc<SettingsService>,
        audit: AuditLogger,
    ) -> Self {
        Self {
            orders,
            catalog,
            stock_checker,
            inventory,
            settings,
            audit,
        }
    }

    /// Create a new order
    ///
    /// # Validation
    /// - At least one item, every quantity positive
    /// - Customer name and phone present
    /// - Store must be open
    /// - Add-ons and customizations must be scoped to the item's category
    ///
    /// Unit prices are snapshotted from the current catalog and the total is
    /// never recomputed afterwards. The order starts as `pendente`.
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<OrderResponse, OrderError> {
        request
            .validate()
            .map_err(|e| OrderError::ValidationError(e.to_string()))?;

        let settings = self.settings.get().await?;
        if !settings.store_open {
            return Err(OrderError::StoreClosed);
        }

        let delivery_fee = request.delivery_fee.unwrap_or(settings.default_delivery_fee);
        if delivery_fee < Decimal::ZERO {
            return Err(OrderError::ValidationError(format!(
                "Delivery fee must not be negative, got {}",
                delivery_fee
            )));
        }

        let needs_extras = request
            .items
            .iter()
            .any(|item| !item.added.is_empty() || !item.removed.is_empty());
        let (adicionais, personalizacoes) = if needs_extras {
            (self.catalog.adicionais().await?, self.catalog.personalizacoes().await?)
        } else {
            (Vec::new(), Vec::new())
        };

        let mut items = Vec::with_capacity(request.items.len());
        for line in &request.items {
            items.push(self.price_line(line, &adicionais, &personalizacoes).await?);
        }

        let subtotals: Vec<Decimal> = items.iter().map(|item| item.subtotal).collect();
        let subtotal = PriceCalculator::calculate_total(&subtotals);
        let total = PriceCalculator::order_total(subtotal, delivery_fee);

        let mut new_order = NewOrder {
            number: String::new(),
            customer_name: request.customer_name.trim().to_string(),
            customer_phone: request.customer_phone.trim().to_string(),
            address: request.address,
            complement: request.complement,
            notes: request.notes,
            subtotal,
            delivery_fee,
            total,
            payment_method: request.payment_method,
            origin: request.origin,
            items,
        };

        for attempt in 0..MAX_NUMBER_ATTEMPTS {
            new_order.number = generate_order_number(new_order.origin, Utc::now(), attempt, &mut rand::thread_rng());

            match self.orders.insert(&new_order).await {
                Ok((order, items)) => {
                    tracing::info!(
                        "Created order {} ({} item(s), total {})",
                        order.number,
                        items.len(),
                        order.total
                    );
                    self.audit.log_created(&order).await;
                    return Ok(OrderResponse { order, items });
                }
                Err(StoreError::UniqueViolation(_)) => {
                    tracing::warn!("Order number {} already taken, retrying", new_order.number);
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(OrderError::NumberExhausted)
    }

    async fn price_line(
        &self,
        line: &OrderItemRequest,
        adicionais: &[Adicional],
        personalizacoes: &[Personalizacao],
    ) -> Result<NewOrderItem, OrderError> {
        if line.quantity <= 0 {
            return Err(OrderError::ValidationError(format!(
                "Quantity must be positive, got {}",
                line.quantity
            )));
        }

        let priced = self.priced_item(line.item).await?;

        let mut added = Vec::with_capacity(line.added.len());
        for add_on_id in &line.added {
            let add_on = adicionais
                .iter()
                .find(|a| a.id == *add_on_id)
                .filter(|a| a.applies_to(&priced.category) || priced.scoped_adicionais.contains(&a.id))
                .ok_or_else(|| OrderError::InvalidAddOn {
                    add_on_id: *add_on_id,
                    item: priced.name.clone(),
                })?;
            added.push(SelectedAddOn {
                id: add_on.id,
                name: add_on.name.clone(),
                price: add_on.price,
            });
        }

        let mut removed = Vec::with_capacity(line.removed.len());
        for customization_id in &line.removed {
            let customization = personalizacoes
                .iter()
                .find(|p| p.id == *customization_id)
                .filter(|p| p.applies_to(&priced.category) || priced.scoped_personalizacoes.contains(&p.id))
                .ok_or_else(|| OrderError::InvalidAddOn {
                    add_on_id: *customization_id,
                    item: priced.name.clone(),
                })?;
            removed.push(customization.name.clone());
        }

        let add_on_prices: Vec<Decimal> = added.iter().map(|a| a.price).collect();
        let unit_price = PriceCalculator::unit_price(priced.base_price, &add_on_prices);

        Ok(NewOrderItem {
            item: line.item,
            name: priced.name,
            quantity: line.quantity,
            unit_price,
            subtotal: PriceCalculator::calculate_subtotal(line.quantity, unit_price),
            removed,
            added,
            comment: line.comment.clone().filter(|c| !c.trim().is_empty()),
        })
    }

    async fn priced_item(&self, item: LineItemRef) -> Result<PricedItem, OrderError> {
        let priced = match item {
            LineItemRef::Product(id) => self
                .catalog
                .product(id)
                .await?
                .filter(|p| p.active)
                .map(|p| PricedItem {
                    name: p.name,
                    base_price: p.sale_price,
                    category: p.category,
                    scoped_adicionais: Vec::new(),
                    scoped_personalizacoes: Vec::new(),
                }),
            LineItemRef::Drink(id) => self
                .catalog
                .drink(id)
                .await?
                .filter(|d| d.active)
                .map(|d| PricedItem {
                    name: d.name,
                    base_price: d.sale_price,
                    category: d.category,
                    scoped_adicionais: Vec::new(),
                    scoped_personalizacoes: Vec::new(),
                }),
            LineItemRef::Combo(id) => self
                .catalog
                .combo(id)
                .await?
                .filter(|c| c.active)
                .map(|c| PricedItem {
                    name: c.name,
                    base_price: c.final_price,
                    category: COMBO_CATEGORY.to_string(),
                    scoped_adicionais: c.adicional_ids,
                    scoped_personalizacoes: c.personalizacao_ids,
                }),
        };

        priced.ok_or_else(|| OrderError::ItemNotFound(format!("{:?}", item)))
    }

    pub async fn get_order(&self, id: Uuid) -> Result<OrderResponse, OrderError> {
        let order = self.find(id).await?;
        self.with_items(order).await
    }

    /// Look up by the number customers quote; `1234` and `#1234` are the same
    pub async fn get_by_number(&self, number: &str) -> Result<OrderResponse, OrderError> {
        let normalized = normalize_order_number(number);
        let order = self
            .orders
            .find_by_number(&normalized)
            .await?
            .ok_or_else(|| OrderError::NotFound(normalized.clone()))?;
        self.with_items(order).await
    }

    pub async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, OrderError> {
        Ok(self.orders.list(filter).await?)
    }

    /// Orders still being worked on: everything but concluido and cancelado
    pub async fn active_orders(&self) -> Result<Vec<Order>, OrderError> {
        let filter = OrderFilter {
            statuses: OrderStatus::active(),
            ..OrderFilter::default()
        };
        Ok(self.orders.list(&filter).await?)
    }

    pub async fn latest_active_for_phone(&self, phone: &str) -> Result<Option<Order>, OrderError> {
        Ok(self.orders.latest_active_for_phone(phone).await?)
    }

    /// Move an order to `to`
    ///
    /// The first time an order enters `entregue` or `concluido` the stock of
    /// every product line and combo constituent is deducted all-or-nothing.
    /// A refused deduction leaves the order where it was and reports the
    /// shortages. The status write is conditional on the status read here.
    pub async fn update_status(&self, id: Uuid, to: OrderStatus) -> Result<Order, OrderError> {
        let order = self.find(id).await?;
        let from = order.status;

        if from == to {
            tracing::debug!("Order {} already {}, nothing to do", order.number, to);
            return Ok(order);
        }

        StatusMachine::transition(from, to).map_err(OrderError::InvalidTransition)?;

        let deduct = to.consumes_stock() && !order.stock_deducted;
        let mut movement: Option<StockMovement> = None;

        if deduct {
            let items = self.orders.items(id).await?;
            let lines: Vec<StockCheckLine> = items.iter().map(|i| i.stock_line()).collect();
            let plan = self.deduction_plan(&lines).await?;

            match self.inventory.fulfil(&plan).await? {
                Some(taken) => movement = Some(taken),
                None => {
                    let mut report = self.stock_checker.check(&lines).await?;
                    if report.is_satisfiable() {
                        // Lines fit one by one but not together
                        report = self.stock_checker.check_combined(&order.number, &lines).await?;
                    }
                    tracing::warn!("Order {} cannot move to {}: insufficient stock", order.number, to);
                    return Err(OrderError::InsufficientStock(report));
                }
            }
        }

        let Some(updated) = self.orders.update_status(id, from, to, deduct).await? else {
            if let Some(taken) = &movement {
                if let Err(e) = self.inventory.restock(taken).await {
                    tracing::error!("Failed to return stock for order {}: {}", order.number, e);
                }
            }
            return Err(OrderError::ConcurrentUpdate(id));
        };

        tracing::info!("Order {} moved from {} to {}", updated.number, from, to);
        self.audit.log_transition(&updated, from, deduct).await;
        Ok(updated)
    }

    /// Insumo totals for the lines; drinks and vanished items contribute nothing
    async fn deduction_plan(&self, lines: &[StockCheckLine]) -> Result<Vec<(i32, Decimal)>, OrderError> {
        let mut warnings = Vec::new();
        let mut merged: BTreeMap<i32, Decimal> = BTreeMap::new();

        for line in lines {
            if let Some(resolution) = self.stock_checker.resolve(line, &mut warnings).await? {
                for (insumo_id, quantity) in resolution.by_insumo() {
                    *merged.entry(insumo_id).or_default() += quantity;
                }
            }
        }

        if !warnings.is_empty() {
            tracing::warn!("Stock deduction skipped {} catalog entries: {:?}", warnings.len(), warnings);
        }

        Ok(merged.into_iter().filter(|(_, quantity)| *quantity > Decimal::ZERO).collect())
    }

    /// Shortage report for the order's lines as they stand now
    pub async fn stock_report(&self, id: Uuid) -> Result<StockReport, OrderError> {
        self.find(id).await?;
        let items = self.orders.items(id).await?;
        let lines: Vec<StockCheckLine> = items.iter().map(|i| i.stock_line()).collect();
        Ok(self.stock_checker.check(&lines).await?)
    }

    /// Hard delete of a finished order
    pub async fn delete_order(&self, id: Uuid) -> Result<(), OrderError> {
        let order = self.find(id).await?;
        if order.status.is_active() {
            return Err(OrderError::ActiveOrder(id));
        }

        if !self.orders.delete(id).await? {
            return Err(OrderError::NotFound(id.to_string()));
        }

        tracing::info!("Deleted order {} ({})", order.number, order.status);
        self.audit.log_deletion(&order).await;
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Order, OrderError> {
        self.orders
            .find(id)
            .await?
            .ok_or_else(|| OrderError::NotFound(id.to_string()))
    }

    async fn with_items(&self, order: Order) -> Result<OrderResponse, OrderError> {
        let items = self.orders.items(order.id).await?;
        Ok(OrderResponse { order, items })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogRepository;
    use crate::costing::BomResolver;
    use crate::orders::audit::AuditAction;
    use crate::orders::{OrderItemRequest, OrderOrigin};
    use crate::settings::StoreSettings;
    use crate::inventory::RecordPurchaseRequest;
    use crate::test_support::{
        fixtures, InMemoryAudit, InMemoryCatalog, InMemoryInventory, InMemoryOrders, InMemorySettings,
    };
    use rust_decimal_macros::dec;

    struct Harness {
        service: OrderService,
        orders: Arc<InMemoryOrders>,
        inventory: Arc<InMemoryInventory>,
        stock: Arc<InventoryService>,
        audit: Arc<InMemoryAudit>,
        settings: Arc<SettingsService>,
    }

    fn harness() -> Harness {
        harness_with(fixtures::burger_catalog())
    }

    fn harness_with(catalog: InMemoryCatalog) -> Harness {
        let catalog: Arc<dyn CatalogRepository> = Arc::new(catalog);
        let inventory = Arc::new(InMemoryInventory::default());
        let inventory_service = Arc::new(InventoryService::new(catalog.clone(), inventory.clone()));
        let checker = Arc::new(StockSufficiencyChecker::new(
            BomResolver::new(catalog.clone()),
            inventory_service.clone(),
        ));
        let orders = Arc::new(InMemoryOrders::default());
        let audit = Arc::new(InMemoryAudit::default());
        let settings = Arc::new(SettingsService::new(Arc::new(InMemorySettings::default())));

        let service = OrderService::new(
            orders.clone(),
            catalog,
            checker,
            inventory_service.clone(),
            settings.clone(),
            AuditLogger::new(audit.clone()),
        );
        Harness {
            service,
            orders,
            inventory,
            stock: inventory_service,
            audit,
            settings,
        }
    }

    fn request(items: Vec<OrderItemRequest>) -> CreateOrderRequest {
        CreateOrderRequest {
            customer_name: "Maria".into(),
            customer_phone: "11999990000".into(),
            address: Some("Rua A, 10".into()),
            complement: None,
            notes: None,
            payment_method: "pix".into(),
            origin: OrderOrigin::Menu,
            delivery_fee: Some(dec!(5)),
            items,
        }
    }

    fn line(item: LineItemRef, quantity: i32) -> OrderItemRequest {
        OrderItemRequest {
            item,
            quantity,
            removed: vec![],
            added: vec![],
            comment: None,
        }
    }

    #[tokio::test]
    async fn test_create_order_snapshots_prices() {
        let h = harness();
        let created = h
            .service
            .create_order(request(vec![
                line(LineItemRef::Product(fixtures::X_BURGER), 2),
                line(LineItemRef::Drink(fixtures::REFRIGERANTE), 1),
            ]))
            .await
            .unwrap();

        assert_eq!(created.order.status, OrderStatus::Pendente);
        assert_eq!(created.order.subtotal, dec!(46));
        assert_eq!(created.order.total, dec!(51));
        assert!(created.order.number.starts_with('#'));
        assert_eq!(created.items.len(), 2);
        assert_eq!(created.items[0].unit_price, dec!(20));
        assert_eq!(h.audit.entries()[0].action, AuditAction::Created);
    }

    #[tokio::test]
    async fn test_blank_customer_name_rejected() {
        let h = harness();
        let mut blank = request(vec![line(LineItemRef::Product(fixtures::X_BURGER), 1)]);
        blank.customer_name = "   ".into();

        let result = h.service.create_order(blank).await;

        assert!(matches!(result, Err(OrderError::ValidationError(_))));
        assert!(h.audit.entries().is_empty());
    }

    #[tokio::test]
    async fn test_add_on_outside_category_rejected() {
        let h = harness();
        let mut burger = line(LineItemRef::Product(fixtures::X_BURGER), 1);
        burger.added = vec![fixtures::BACON_EXTRA];
        let created = h.service.create_order(request(vec![burger])).await.unwrap();
        assert_eq!(created.items[0].unit_price, dec!(24));

        let mut drink = line(LineItemRef::Drink(fixtures::REFRIGERANTE), 1);
        drink.added = vec![fixtures::BACON_EXTRA];
        let result = h.service.create_order(request(vec![drink])).await;
        assert!(matches!(result, Err(OrderError::InvalidAddOn { .. })));
    }

    #[tokio::test]
    async fn test_closed_store_rejects_orders() {
        let h = harness();
        h.settings
            .update(StoreSettings {
                store_open: false,
                ..StoreSettings::default()
            })
            .await
            .unwrap();

        let result = h
            .service
            .create_order(request(vec![line(LineItemRef::Product(fixtures::X_BURGER), 1)]))
            .await;
        assert!(matches!(result, Err(OrderError::StoreClosed)));
    }

    #[tokio::test]
    async fn test_unknown_item_rejected() {
        let h = harness();
        let result = h
            .service
            .create_order(request(vec![line(LineItemRef::Product(999), 1)]))
            .await;
        assert!(matches!(result, Err(OrderError::ItemNotFound(_))));
    }

    #[tokio::test]
    async fn test_get_by_number_accepts_bare_digits() {
        let h = harness();
        let created = h
            .service
            .create_order(request(vec![line(LineItemRef::Product(fixtures::X_BURGER), 1)]))
            .await
            .unwrap();
        let digits = created.order.number.trim_start_matches('#').to_string();

        let found = h.service.get_by_number(&digits).await.unwrap();
        assert_eq!(found.order.id, created.order.id);
    }

    #[tokio::test]
    async fn test_invalid_transition_rejected() {
        let h = harness();
        let order = h.orders.seed(fixtures::order("#111111", OrderStatus::Concluido));

        let result = h.service.update_status(order.id, OrderStatus::Pendente).await;
        assert!(matches!(result, Err(OrderError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn test_same_status_is_noop() {
        let h = harness();
        let order = h.orders.seed(fixtures::order("#111111", OrderStatus::Pronto));

        let updated = h.service.update_status(order.id, OrderStatus::Pronto).await.unwrap();
        assert_eq!(updated.status, OrderStatus::Pronto);
        assert!(h.audit.entries().is_empty());
    }

    #[tokio::test]
    async fn test_delivery_deducts_stock_once() {
        let h = harness();
        h.inventory.set_level(fixtures::PAO, dec!(1));
        let created = h
            .service
            .create_order(request(vec![line(LineItemRef::Product(fixtures::X_BURGER), 3)]))
            .await
            .unwrap();

        let delivered = h
            .service
            .update_status(created.order.id, OrderStatus::Entregue)
            .await
            .unwrap();
        assert!(delivered.stock_deducted);
        assert_eq!(h.inventory.level_of(fixtures::PAO), dec!(0.7));

        h.service
            .update_status(created.order.id, OrderStatus::Concluido)
            .await
            .unwrap();
        assert_eq!(h.inventory.level_of(fixtures::PAO), dec!(0.7));
    }

    #[tokio::test]
    async fn test_insufficient_stock_keeps_status_and_reports_shortage() {
        let h = harness();
        h.inventory.set_level(fixtures::PAO, dec!(0.2));
        let created = h
            .service
            .create_order(request(vec![line(LineItemRef::Product(fixtures::X_BURGER), 3)]))
            .await
            .unwrap();

        let result = h.service.update_status(created.order.id, OrderStatus::Concluido).await;
        let Err(OrderError::InsufficientStock(report)) = result else {
            panic!("expected insufficient stock, got {:?}", result);
        };
        assert_eq!(report.lines.len(), 1);
        assert_eq!(report.lines[0].shortages[0].required, dec!(0.3));

        let order = h.service.get_order(created.order.id).await.unwrap().order;
        assert_eq!(order.status, OrderStatus::Pendente);
        assert_eq!(h.inventory.level_of(fixtures::PAO), dec!(0.2));
    }

    #[tokio::test]
    async fn test_drink_only_order_completes_without_stock() {
        let h = harness();
        let created = h
            .service
            .create_order(request(vec![line(LineItemRef::Drink(fixtures::REFRIGERANTE), 2)]))
            .await
            .unwrap();

        let done = h
            .service
            .update_status(created.order.id, OrderStatus::Concluido)
            .await
            .unwrap();
        assert_eq!(done.status, OrderStatus::Concluido);
    }

    #[tokio::test]
    async fn test_lost_race_returns_stock() {
        let h = harness();
        h.inventory.set_level(fixtures::PAO, dec!(1));
        let created = h
            .service
            .create_order(request(vec![line(LineItemRef::Product(fixtures::X_BURGER), 3)]))
            .await
            .unwrap();
        h.orders.fail_next_status_write();

        let result = h.service.update_status(created.order.id, OrderStatus::Entregue).await;
        assert!(matches!(result, Err(OrderError::ConcurrentUpdate(_))));
        assert_eq!(h.inventory.level_of(fixtures::PAO), dec!(1));
    }

    async fn buy_flour(h: &Harness, quantity: Decimal, unit_price: Decimal) {
        h.stock
            .record_purchase(RecordPurchaseRequest {
                ingredient_id: fixtures::FARINHA,
                insumo_id: None,
                quantity,
                unit_price,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_lost_race_keeps_average_cost() {
        let h = harness();
        buy_flour(&h, dec!(1), dec!(4)).await;
        buy_flour(&h, dec!(1), dec!(6)).await;
        let created = h
            .service
            .create_order(request(vec![line(LineItemRef::Product(fixtures::X_BURGER), 3)]))
            .await
            .unwrap();
        h.orders.fail_next_status_write();

        let result = h.service.update_status(created.order.id, OrderStatus::Entregue).await;

        assert!(matches!(result, Err(OrderError::ConcurrentUpdate(_))));
        assert_eq!(h.inventory.level_of(fixtures::PAO), dec!(2));
        assert_eq!(h.stock.weighted_average_unit_cost(fixtures::FARINHA).await.unwrap(), dec!(5));
    }

    #[tokio::test]
    async fn test_product_on_second_insumo_is_fulfilled_from_ingredient_stock() {
        let h = harness_with(fixtures::pizza_catalog());
        buy_flour(&h, dec!(10), dec!(5)).await;
        let created = h
            .service
            .create_order(request(vec![line(LineItemRef::Product(fixtures::PIZZA), 2)]))
            .await
            .unwrap();

        assert!(h.service.stock_report(created.order.id).await.unwrap().is_satisfiable());

        let done = h
            .service
            .update_status(created.order.id, OrderStatus::Concluido)
            .await
            .unwrap();

        assert!(done.stock_deducted);
        assert_eq!(h.stock.current_stock_ingredient(fixtures::FARINHA).await.unwrap(), dec!(9.4));
    }

    #[tokio::test]
    async fn test_lines_short_only_together_are_reported() {
        let h = harness();
        h.inventory.set_level(fixtures::PAO, dec!(0.5));
        let created = h
            .service
            .create_order(request(vec![
                line(LineItemRef::Product(fixtures::X_BURGER), 3),
                line(LineItemRef::Combo(fixtures::COMBO_A_B), 3),
            ]))
            .await
            .unwrap();

        let result = h.service.update_status(created.order.id, OrderStatus::Entregue).await;

        let Err(OrderError::InsufficientStock(report)) = result else {
            panic!("expected insufficient stock, got {:?}", result);
        };
        assert_eq!(report.lines.len(), 1);
        assert_eq!(report.lines[0].line_item_name, created.order.number);
        assert_eq!(report.lines[0].shortages[0].required, dec!(0.6));
        assert_eq!(report.lines[0].shortages[0].available, dec!(0.5));
        assert_eq!(h.inventory.level_of(fixtures::PAO), dec!(0.5));
    }

    #[tokio::test]
    async fn test_active_order_cannot_be_deleted() {
        let h = harness();
        let active = h.orders.seed(fixtures::order("#222222", OrderStatus::Preparando));
        let done = h.orders.seed(fixtures::order("#333333", OrderStatus::Cancelado));

        assert!(matches!(
            h.service.delete_order(active.id).await,
            Err(OrderError::ActiveOrder(_))
        ));
        h.service.delete_order(done.id).await.unwrap();
        assert!(matches!(
            h.service.get_order(done.id).await,
            Err(OrderError::NotFound(_))
        ));
        assert_eq!(h.audit.entries().last().map(|e| e.action), Some(AuditAction::Deleted));
    }

    #[tokio::test]
    async fn test_active_orders_exclude_terminal() {
        let h = harness();
        h.orders.seed(fixtures::order("#444444", OrderStatus::Pendente));
        h.orders.seed(fixtures::order("#555555", OrderStatus::SaiuEntrega));
        h.orders.seed(fixtures::order("#666666", OrderStatus::Concluido));

        let active = h.service.active_orders().await.unwrap();
        assert_eq!(active.len(), 2);
        assert!(active.iter().all(|o| o.status.is_active()));
    }
}
