// Gateway metrics
//
// Counters for the conversational gateway plus the delivery health the
// staff dashboard shows as a banner (last failure, expired credential).

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use utoipa::ToSchema;

/// LLM calls slower than this are logged
const SLOW_LLM_CALL_THRESHOLD_MS: u64 = 5_000;

#[derive(Debug, Clone, Default)]
pub struct GatewayMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    messages_received: AtomicU64,
    duplicates_skipped: AtomicU64,
    non_text_skipped: AtomicU64,
    complaints_opened: AtomicU64,
    complaints_recorded: AtomicU64,
    tracking_replies: AtomicU64,
    llm_replies: AtomicU64,
    llm_fallbacks: AtomicU64,
    llm_calls: AtomicU64,
    total_llm_time_us: AtomicU64,
    slow_llm_calls: AtomicU64,
    deliveries_sent: AtomicU64,
    deliveries_failed: AtomicU64,
    credential_expired: AtomicBool,
    last_delivery_error: Mutex<Option<DeliveryFailure>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeliveryFailure {
    pub error: String,
    pub at: DateTime<Utc>,
}

/// Snapshot served by `GET /api/whatsapp/health`
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GatewayHealth {
    pub messages_received: u64,
    pub duplicates_skipped: u64,
    pub non_text_skipped: u64,
    pub complaints_opened: u64,
    pub complaints_recorded: u64,
    pub tracking_replies: u64,
    pub llm_replies: u64,
    pub llm_fallbacks: u64,
    pub avg_llm_time_ms: f64,
    pub slow_llm_calls: u64,
    pub deliveries_sent: u64,
    pub deliveries_failed: u64,
    pub credential_expired: bool,
    pub last_delivery_error: Option<DeliveryFailure>,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        bump(&self.inner.messages_received);
    }

    pub fn record_duplicate(&self) {
        bump(&self.inner.duplicates_skipped);
    }

    pub fn record_non_text(&self) {
        bump(&self.inner.non_text_skipped);
    }

    pub fn record_complaint_opened(&self) {
        bump(&self.inner.complaints_opened);
    }

    pub fn record_complaint_recorded(&self) {
        bump(&self.inner.complaints_recorded);
    }

    pub fn record_tracking_reply(&self) {
        bump(&self.inner.tracking_replies);
    }

    pub fn record_llm_reply(&self, fell_back: bool) {
        if fell_back {
            bump(&self.inner.llm_fallbacks);
        } else {
            bump(&self.inner.llm_replies);
        }
    }

    /// Times an LLM call until the returned guard is dropped
    pub fn start_llm_call(&self) -> LlmCallTimer {
        LlmCallTimer {
            start: Instant::now(),
            metrics: self.clone(),
        }
    }

    fn record_llm_call(&self, duration: Duration) {
        bump(&self.inner.llm_calls);
        self.inner
            .total_llm_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);

        if duration.as_millis() as u64 > SLOW_LLM_CALL_THRESHOLD_MS {
            bump(&self.inner.slow_llm_calls);
            tracing::warn!("Slow LLM call: {}ms", duration.as_millis());
        }
    }

    pub fn record_delivery_sent(&self) {
        bump(&self.inner.deliveries_sent);
        self.inner.credential_expired.store(false, Ordering::Relaxed);
    }

    pub fn record_delivery_failed(&self, error: &str, credential_expired: bool) {
        bump(&self.inner.deliveries_failed);
        if credential_expired {
            self.inner.credential_expired.store(true, Ordering::Relaxed);
        }
        let failure = DeliveryFailure {
            error: error.to_string(),
            at: Utc::now(),
        };
        match self.inner.last_delivery_error.lock() {
            Ok(mut slot) => *slot = Some(failure),
            Err(poisoned) => *poisoned.into_inner() = Some(failure),
        }
    }

    pub fn credential_expired(&self) -> bool {
        self.inner.credential_expired.load(Ordering::Relaxed)
    }

    pub fn avg_llm_time_ms(&self) -> f64 {
        let count = self.inner.llm_calls.load(Ordering::Relaxed);
        let total_us = self.inner.total_llm_time_us.load(Ordering::Relaxed);

        if count == 0 {
            0.0
        } else {
            (total_us as f64 / count as f64) / 1000.0
        }
    }

    pub fn snapshot(&self) -> GatewayHealth {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        let last_delivery_error = self
            .inner
            .last_delivery_error
            .lock()
            .map(|slot| slot.clone())
            .unwrap_or(None);

        GatewayHealth {
            messages_received: load(&self.inner.messages_received),
            duplicates_skipped: load(&self.inner.duplicates_skipped),
            non_text_skipped: load(&self.inner.non_text_skipped),
            complaints_opened: load(&self.inner.complaints_opened),
            complaints_recorded: load(&self.inner.complaints_recorded),
            tracking_replies: load(&self.inner.tracking_replies),
            llm_replies: load(&self.inner.llm_replies),
            llm_fallbacks: load(&self.inner.llm_fallbacks),
            avg_llm_time_ms: self.avg_llm_time_ms(),
            slow_llm_calls: load(&self.inner.slow_llm_calls),
            deliveries_sent: load(&self.inner.deliveries_sent),
            deliveries_failed: load(&self.inner.deliveries_failed),
            credential_expired: self.credential_expired(),
            last_delivery_error,
        }
    }
}

/// Records the elapsed time on drop
pub struct LlmCallTimer {
    start: Instant,
    metrics: GatewayMetrics,
}

impl Drop for LlmCallTimer {
    fn drop(&mut self) {
        self.metrics.record_llm_call(self.start.elapsed());
    }
}
