//! Notifications
//!
//! The engine's externally observable audit trail. Each state transition emits
//! exactly one notification carrying the full record snapshot taken after the
//! transition. A synchronous gateway rejection emits `RequestSubmitted` (with
//! the negative handle) followed by `SettlementFailed`, the same pair an
//! asynchronous failure produces.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::payoff::{Party, RefundSplit};
use super::record::DerivativeRecord;
use super::types::{Amount, DerivativeId, Height, Identity, PriceValue, RequestHandle};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DerivativeEvent {
    Created {
        record: DerivativeRecord,
    },
    Taken {
        record: DerivativeRecord,
    },
    Canceled {
        record: DerivativeRecord,
        refunded: Amount,
    },
    RequestSubmitted {
        record: DerivativeRecord,
        handle: RequestHandle,
        fee_paid: Amount,
    },
    Settled {
        record: DerivativeRecord,
        handle: RequestHandle,
        winner: Party,
        winner_identity: Identity,
        payout: Amount,
        observed_value: PriceValue,
    },
    SettlementFailed {
        record: DerivativeRecord,
        handle: RequestHandle,
        status: i64,
        refund: RefundSplit,
    },
}

impl DerivativeEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            DerivativeEvent::Created { .. } => "created",
            DerivativeEvent::Taken { .. } => "taken",
            DerivativeEvent::Canceled { .. } => "canceled",
            DerivativeEvent::RequestSubmitted { .. } => "request_submitted",
            DerivativeEvent::Settled { .. } => "settled",
            DerivativeEvent::SettlementFailed { .. } => "settlement_failed",
        }
    }

    pub fn record(&self) -> &DerivativeRecord {
        match self {
            DerivativeEvent::Created { record }
            | DerivativeEvent::Taken { record }
            | DerivativeEvent::Canceled { record, .. }
            | DerivativeEvent::RequestSubmitted { record, .. }
            | DerivativeEvent::Settled { record, .. }
            | DerivativeEvent::SettlementFailed { record, .. } => record,
        }
    }

    pub fn derivative_id(&self) -> DerivativeId {
        self.record().id
    }
}

/// A notification as delivered to sinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Engine-wide sequence number, starting at 1, no gaps.
    pub seq: u64,
    /// Logical height at emission.
    pub height: Height,
    #[serde(flatten)]
    pub event: DerivativeEvent,
}

/// Receives notifications. Called inside the engine's critical section, so
/// implementations must not block or call back into the engine.
pub trait EventSink: Send + Sync {
    fn publish(&self, notification: &Notification);
}

/// In-memory sink that keeps every notification.
#[derive(Debug, Default)]
pub struct EventLog {
    notifications: Mutex<Vec<Notification>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.notifications.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Event kinds in emission order.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.notifications
            .lock()
            .iter()
            .map(|n| n.event.kind())
            .collect()
    }

    /// Notifications concerning one derivative.
    pub fn for_derivative(&self, id: DerivativeId) -> Vec<Notification> {
        self.notifications
            .lock()
            .iter()
            .filter(|n| n.event.derivative_id() == id)
            .cloned()
            .collect()
    }

    pub fn last(&self) -> Option<Notification> {
        self.notifications.lock().last().cloned()
    }
}

impl EventSink for EventLog {
    fn publish(&self, notification: &Notification) {
        self.notifications.lock().push(notification.clone());
    }
}

/// Fans notifications out to async subscribers. Lagging receivers drop the
/// oldest notifications; publishing never blocks.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn publish(&self, notification: &Notification) {
        // No subscribers is not an error
        let _ = self.tx.send(notification.clone());
    }
}
