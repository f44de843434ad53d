// Order Audit Trail
//
// Append-only record of order creation, status transitions and hard deletions.
// Write failures are logged and never block the order operation itself.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::StoreError;
use crate::orders::{Order, OrderStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    StatusChanged,
    Deleted,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Created => "created",
            AuditAction::StatusChanged => "status_changed",
            AuditAction::Deleted => "deleted",
        }
    }
}

/// One audit row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderAuditEntry {
    pub order_id: Uuid,
    pub order_number: String,
    pub action: AuditAction,
    pub from_status: Option<OrderStatus>,
    pub to_status: Option<OrderStatus>,
    pub detail: JsonValue,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: &OrderAuditEntry) -> Result<(), StoreError>;
}

pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn append(&self, entry: &OrderAuditEntry) -> Result<(), StoreError> {
        // No foreign key on order_id: deletion entries outlive their order
        sqlx::query(
            r#"
            INSERT INTO order_audit_log (order_id, order_number, action, from_status, to_status, detail, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.order_id)
        .bind(&entry.order_number)
        .bind(entry.action.as_str())
        .bind(entry.from_status)
        .bind(entry.to_status)
        .bind(&entry.detail)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Audit Logger
///
/// Records order events to the audit trail.
/// Failures are logged but do not propagate.
#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    pub async fn log_created(&self, order: &Order) {
        let detail = serde_json::json!({
            "origin": order.origin,
            "total": order.total,
        });
        self.record(order, AuditAction::Created, None, Some(order.status), detail).await;
    }

    pub async fn log_transition(&self, order: &Order, from: OrderStatus, stock_deducted: bool) {
        let detail = serde_json::json!({ "stock_deducted": stock_deducted });
        self.record(order, AuditAction::StatusChanged, Some(from), Some(order.status), detail)
            .await;
    }

    pub async fn log_deletion(&self, order: &Order) {
        let detail = serde_json::json!({
            "customer_name": order.customer_name,
            "total": order.total,
        });
        self.record(order, AuditAction::Deleted, Some(order.status), None, detail).await;
    }

    async fn record(
        &self,
        order: &Order,
        action: AuditAction,
        from_status: Option<OrderStatus>,
        to_status: Option<OrderStatus>,
        detail: JsonValue,
    ) {
        let entry = OrderAuditEntry {
            order_id: order.id,
            order_number: order.number.clone(),
            action,
            from_status,
            to_status,
            detail,
            created_at: Utc::now(),
        };

        if let Err(e) = self.sink.append(&entry).await {
            tracing::warn!(
                "Failed to write audit entry {} for order {}: {}",
                action.as_str(),
                order.number,
                e
            );
        }
    }
}
