use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::costing::{LineItemRef, StockCheckLine};

/// Order status enum representing the production lifecycle of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pendente,
    Preparando,
    Pronto,
    SaiuEntrega,
    Entregue,
    Concluido,
    Cancelado,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pendente,
        OrderStatus::Preparando,
        OrderStatus::Pronto,
        OrderStatus::SaiuEntrega,
        OrderStatus::Entregue,
        OrderStatus::Concluido,
        OrderStatus::Cancelado,
    ];

    /// Convert status to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pendente => "pendente",
            OrderStatus::Preparando => "preparando",
            OrderStatus::Pronto => "pronto",
            OrderStatus::SaiuEntrega => "saiu_entrega",
            OrderStatus::Entregue => "entregue",
            OrderStatus::Concluido => "concluido",
            OrderStatus::Cancelado => "cancelado",
        }
    }

    /// No transition leaves a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Concluido | OrderStatus::Cancelado)
    }

    /// Orders in the kitchen/delivery working set
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Entering one of these statuses means the food left the kitchen
    pub fn consumes_stock(&self) -> bool {
        matches!(self, OrderStatus::Entregue | OrderStatus::Concluido)
    }

    pub fn active() -> Vec<OrderStatus> {
        Self::ALL.into_iter().filter(OrderStatus::is_active).collect()
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pendente" => Ok(OrderStatus::Pendente),
            "preparando" => Ok(OrderStatus::Preparando),
            "pronto" => Ok(OrderStatus::Pronto),
            "saiu_entrega" => Ok(OrderStatus::SaiuEntrega),
            "entregue" => Ok(OrderStatus::Entregue),
            "concluido" => Ok(OrderStatus::Concluido),
            "cancelado" => Ok(OrderStatus::Cancelado),
            _ => Err(format!("Invalid order status: {}", s)),
        }
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pendente
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Channel the order came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderOrigin {
    /// Customer storefront
    Menu,
    /// Counter / phone sales screen
    Vendas,
}

/// Domain model representing an order in the database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub number: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub address: Option<String>,
    pub complement: Option<String>,
    pub notes: Option<String>,
    pub subtotal: Decimal,
    pub delivery_fee: Decimal,
    pub total: Decimal,
    pub payment_method: String,
    pub status: OrderStatus,
    pub origin: OrderOrigin,
    pub stock_deducted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Paid extra as priced when the order was placed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SelectedAddOn {
    pub id: i32,
    pub name: String,
    pub price: Decimal,
}

/// Line of an order with its price snapshot
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: Uuid,
    pub item: LineItemRef,
    pub name: String,
    pub quantity: i32,
    /// Catalog price plus selected add-ons at order time
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub removed: Vec<String>,
    pub added: Vec<SelectedAddOn>,
    pub comment: Option<String>,
}

impl OrderItem {
    pub fn stock_line(&self) -> StockCheckLine {
        StockCheckLine {
            name: self.name.clone(),
            item: self.item,
            quantity: self.quantity,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct OrderItemRow {
    pub id: i64,
    pub order_id: Uuid,
    pub item_kind: String,
    pub item_id: i32,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub removed: Json<Vec<String>>,
    pub added: Json<Vec<SelectedAddOn>>,
    pub comment: Option<String>,
}

pub(crate) fn item_kind(item: &LineItemRef) -> (&'static str, i32) {
    match item {
        LineItemRef::Product(id) => ("product", *id),
        LineItemRef::Drink(id) => ("drink", *id),
        LineItemRef::Combo(id) => ("combo", *id),
    }
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = String;

    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        let item = match row.item_kind.as_str() {
            "product" => LineItemRef::Product(row.item_id),
            "drink" => LineItemRef::Drink(row.item_id),
            "combo" => LineItemRef::Combo(row.item_id),
            other => return Err(format!("Invalid order item kind: {}", other)),
        };
        Ok(Self {
            id: row.id,
            order_id: row.order_id,
            item,
            name: row.name,
            quantity: row.quantity,
            unit_price: row.unit_price,
            subtotal: row.subtotal,
            removed: row.removed.0,
            added: row.added.0,
            comment: row.comment,
        })
    }
}

/// Order line ready to be inserted
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderItem {
    pub item: LineItemRef,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub removed: Vec<String>,
    pub added: Vec<SelectedAddOn>,
    pub comment: Option<String>,
}

/// Fully priced order ready to be inserted
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub number: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub address: Option<String>,
    pub complement: Option<String>,
    pub notes: Option<String>,
    pub subtotal: Decimal,
    pub delivery_fee: Decimal,
    pub total: Decimal,
    pub payment_method: String,
    pub origin: OrderOrigin,
    pub items: Vec<NewOrderItem>,
}

/// Request DTO for creating an order item
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct OrderItemRequest {
    pub item: LineItemRef,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    /// Personalizacao ids to apply
    #[serde(default)]
    pub removed: Vec<i32>,
    /// Adicional ids to add
    #[serde(default)]
    pub added: Vec<i32>,
    pub comment: Option<String>,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Customer name is required".into());
        return Err(err);
    }
    Ok(())
}

/// Request DTO for creating a new order
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    #[validate(custom = "not_blank")]
    pub customer_name: String,
    #[validate(length(min = 8, max = 20, message = "Customer phone must have 8 to 20 characters"))]
    pub customer_phone: String,
    pub address: Option<String>,
    pub complement: Option<String>,
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "Payment method is required"))]
    pub payment_method: String,
    pub origin: OrderOrigin,
    /// Overrides the store's default delivery fee
    pub delivery_fee: Option<Decimal>,
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<OrderItemRequest>,
}

/// Request DTO for updating order status
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

/// Query parameters for order listings
#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrderListQuery {
    /// Comma separated statuses, e.g. `pendente,preparando`
    pub status: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Parsed order listing filter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderFilter {
    pub statuses: Vec<OrderStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TryFrom<OrderListQuery> for OrderFilter {
    type Error = String;

    fn try_from(query: OrderListQuery) -> Result<Self, Self::Error> {
        let statuses = match query.status {
            Some(raw) => raw
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(str::parse)
                .collect::<Result<Vec<OrderStatus>, String>>()?,
            None => Vec::new(),
        };
        Ok(Self {
            statuses,
            from: query.from,
            to: query.to,
        })
    }
}

/// Response DTO for order with items
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}
