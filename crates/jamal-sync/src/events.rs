//! In-process pub/sub for ride lifecycle events.

use jamal_core::{DriverId, DriverStatus, RideId};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum RideEvent {
    NewRequest {
        ride_id: RideId,
    },
    RideAccepted {
        ride_id: RideId,
        driver_id: DriverId,
        eta_minutes: u32,
    },
    RequestCancelled {
        ride_id: RideId,
    },
    DriverArrived {
        ride_id: RideId,
    },
    RideCompleted {
        ride_id: RideId,
    },
    RideRefused {
        ride_id: RideId,
    },
    DriverStatusChanged {
        driver_id: DriverId,
        status: DriverStatus,
    },
}

impl RideEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RideEvent::NewRequest { .. } => "new-request",
            RideEvent::RideAccepted { .. } => "ride-accepted",
            RideEvent::RequestCancelled { .. } => "request-cancelled",
            RideEvent::DriverArrived { .. } => "driver-arrived",
            RideEvent::RideCompleted { .. } => "ride-completed",
            RideEvent::RideRefused { .. } => "ride-refused",
            RideEvent::DriverStatusChanged { .. } => "driver-status-changed",
        }
    }

    pub fn ride_id(&self) -> Option<RideId> {
        match *self {
            RideEvent::NewRequest { ride_id }
            | RideEvent::RideAccepted { ride_id, .. }
            | RideEvent::RequestCancelled { ride_id }
            | RideEvent::DriverArrived { ride_id }
            | RideEvent::RideCompleted { ride_id }
            | RideEvent::RideRefused { ride_id } => Some(ride_id),
            RideEvent::DriverStatusChanged { .. } => None,
        }
    }
}

/// Fan-out of [`RideEvent`]s to every live subscriber in this process.
///
/// Slow subscribers lose the oldest events (`RecvError::Lagged`) rather
/// than blocking publishers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RideEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns how many subscribers received the event. Zero is fine.
    pub fn publish(&self, event: RideEvent) -> usize {
        trace!(event = event.name(), "publish");
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RideEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(RideEvent::NewRequest { ride_id: 1 }), 0);
    }

    #[tokio::test]
    async fn every_subscriber_sees_each_event() {
        let bus = EventBus::default();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        let sent = bus.publish(RideEvent::RideAccepted {
            ride_id: 7,
            driver_id: 2,
            eta_minutes: 5,
        });
        assert_eq!(sent, 2);
        assert_eq!(a.recv().await.unwrap().ride_id(), Some(7));
        assert_eq!(b.recv().await.unwrap().name(), "ride-accepted");
    }

    #[test]
    fn serialises_with_event_tag() {
        let json = serde_json::to_value(RideEvent::DriverStatusChanged {
            driver_id: 3,
            status: DriverStatus::Online,
        })
        .unwrap();
        assert_eq!(json["event"], "driver-status-changed");
        assert_eq!(json["status"], "online");
    }
}
