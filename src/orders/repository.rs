use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::StoreError;
use crate::orders::models::{item_kind, OrderItemRow};
use crate::orders::{NewOrder, Order, OrderFilter, OrderItem, OrderStatus};

/// Digits compared when matching a WhatsApp sender against a typed phone
const PHONE_MATCH_DIGITS: usize = 8;

const ORDER_COLUMNS: &str = "id, number, customer_name, customer_phone, address, complement, notes, \
     subtotal, delivery_fee, total, payment_method, status, origin, stock_deducted, created_at, updated_at";

/// Persistence for orders and their items
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert the order and all of its items atomically.
    /// A taken `number` surfaces as `StoreError::UniqueViolation`.
    async fn insert(&self, order: &NewOrder) -> Result<(Order, Vec<OrderItem>), StoreError>;

    async fn find(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    async fn find_by_number(&self, number: &str) -> Result<Option<Order>, StoreError>;

    async fn items(&self, order_id: Uuid) -> Result<Vec<OrderItem>, StoreError>;

    /// Newest first
    async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError>;

    async fn latest_active_for_phone(&self, phone: &str) -> Result<Option<Order>, StoreError>;

    /// Write `to` only if the order is still in `from`; `None` when another
    /// writer got there first
    async fn update_status(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        mark_stock_deducted: bool,
    ) -> Result<Option<Order>, StoreError>;

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
}

/// Digits only, so `(11) 99999-0000` and `5511999990000` compare equal
pub fn phone_digits(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}

/// Same line when one number is the other with a country/area prefix
pub fn phones_match(stored: &str, sender: &str) -> bool {
    let (a, b) = (phone_digits(stored), phone_digits(sender));
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    short.len() >= PHONE_MATCH_DIGITS && long.ends_with(&short)
}

#[derive(Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn insert(&self, new_order: &NewOrder) -> Result<(Order, Vec<OrderItem>), StoreError> {
        let mut tx = self.pool.begin().await?;

        let order = sqlx::query_as::<_, Order>(&format!(
            r#"
            INSERT INTO orders (number, customer_name, customer_phone, address, complement, notes,
                                subtotal, delivery_fee, total, payment_method, status, origin)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(&new_order.number)
        .bind(&new_order.customer_name)
        .bind(&new_order.customer_phone)
        .bind(&new_order.address)
        .bind(&new_order.complement)
        .bind(&new_order.notes)
        .bind(new_order.subtotal)
        .bind(new_order.delivery_fee)
        .bind(new_order.total)
        .bind(&new_order.payment_method)
        .bind(OrderStatus::Pendente)
        .bind(new_order.origin)
        .fetch_one(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(new_order.items.len());
        for item in &new_order.items {
            let (kind, item_id) = item_kind(&item.item);
            let row = sqlx::query_as::<_, OrderItemRow>(
                r#"
                INSERT INTO order_items (order_id, item_kind, item_id, name, quantity, unit_price,
                                         subtotal, removed, added, comment)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                RETURNING id, order_id, item_kind, item_id, name, quantity, unit_price, subtotal,
                          removed, added, comment
                "#,
            )
            .bind(order.id)
            .bind(kind)
            .bind(item_id)
            .bind(&item.name)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.subtotal)
            .bind(Json(&item.removed))
            .bind(Json(&item.added))
            .bind(&item.comment)
            .fetch_one(&mut *tx)
            .await?;
            items.push(OrderItem::try_from(row).map_err(StoreError::InvalidRow)?);
        }

        tx.commit().await?;

        Ok((order, items))
    }

    async fn find(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let order = sqlx::query_as::<_, Order>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(order)
    }

    async fn find_by_number(&self, number: &str) -> Result<Option<Order>, StoreError> {
        let order = sqlx::query_as::<_, Order>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE number = $1"))
            .bind(number)
            .fetch_optional(&self.pool)
            .await?;
        Ok(order)
    }

    async fn items(&self, order_id: Uuid) -> Result<Vec<OrderItem>, StoreError> {
        let rows = sqlx::query_as::<_, OrderItemRow>(
            r#"
            SELECT id, order_id, item_kind, item_id, name, quantity, unit_price, subtotal,
                   removed, added, comment
            FROM order_items
            WHERE order_id = $1
            ORDER BY id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| OrderItem::try_from(row).map_err(StoreError::InvalidRow))
            .collect()
    }

    async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let statuses: Vec<&str> = filter.statuses.iter().map(OrderStatus::as_str).collect();
        let orders = sqlx::query_as::<_, Order>(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE (cardinality($1::text[]) = 0 OR status = ANY($1))
              AND ($2::timestamptz IS NULL OR created_at >= $2)
              AND ($3::timestamptz IS NULL OR created_at <= $3)
            ORDER BY created_at DESC
            "#
        ))
        .bind(&statuses)
        .bind(filter.from)
        .bind(filter.to)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    async fn latest_active_for_phone(&self, phone: &str) -> Result<Option<Order>, StoreError> {
        let digits = phone_digits(phone);
        if digits.len() < PHONE_MATCH_DIGITS {
            return Ok(None);
        }
        let tail = &digits[digits.len() - PHONE_MATCH_DIGITS..];
        let active: Vec<&str> = OrderStatus::active().iter().map(OrderStatus::as_str).collect();

        let candidates = sqlx::query_as::<_, Order>(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE status = ANY($1)
              AND right(regexp_replace(customer_phone, '[^0-9]', '', 'g'), {PHONE_MATCH_DIGITS}) = $2
            ORDER BY created_at DESC
            LIMIT 10
            "#
        ))
        .bind(&active)
        .bind(tail)
        .fetch_all(&self.pool)
        .await?;

        Ok(candidates
            .into_iter()
            .find(|order| phones_match(&order.customer_phone, phone)))
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        mark_stock_deducted: bool,
    ) -> Result<Option<Order>, StoreError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            r#"
            UPDATE orders
            SET status = $1, stock_deducted = stock_deducted OR $2, updated_at = NOW()
            WHERE id = $3 AND status = $4
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(to)
        .bind(mark_stock_deducted)
        .bind(id)
        .bind(from)
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
