//! Notification Hub (§4.1): synchronous fan-out for results and IMU events.
//!
//! Every publish happens on the publisher's own execution context — a slow
//! subscriber blocks whoever is publishing. Subscribers that need
//! asynchrony must hand off themselves; the hub holds no internal queue.

pub mod bus;

pub use bus::{EventBus, SubscriptionId};
pub use imu_protocol::ImuSample;

use command_types::ModelResult;

/// `ImuConnectionChanged` (§3): published on connect and on disconnect,
/// distinguished by `connected`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImuConnectionChanged {
    pub connected: bool,
    pub remote_endpoint: Option<String>,
}

/// `ImuStateChanged` (§3): the sensor's armed/disarmed state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuStateChanged {
    pub is_on: bool,
}

/// The aggregate hub: one [`EventBus`] per event kind named in §4.1.
#[derive(Default)]
pub struct Hub {
    pub results: EventBus<ModelResult>,
    pub imu_connected: EventBus<ImuConnectionChanged>,
    pub imu_disconnected: EventBus<ImuConnectionChanged>,
    pub imu_state: EventBus<ImuStateChanged>,
    pub imu_sample: EventBus<ImuSample>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify_result(&self, result: ModelResult) {
        self.results.publish(&result);
    }

    pub fn notify_imu_connected(&self, remote_endpoint: Option<String>) {
        self.imu_connected.publish(&ImuConnectionChanged {
            connected: true,
            remote_endpoint,
        });
    }

    pub fn notify_imu_disconnected(&self) {
        self.imu_disconnected.publish(&ImuConnectionChanged {
            connected: false,
            remote_endpoint: None,
        });
    }

    pub fn notify_imu_state(&self, is_on: bool) {
        self.imu_state.publish(&ImuStateChanged { is_on });
    }

    pub fn notify_imu_sample(&self, sample: ImuSample) {
        self.imu_sample.publish(&sample);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use command_types::{CommandType, ImuCommandPayload, ImuControlStatus};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn result_publication_reaches_subscribers() {
        let hub = Hub::new();
        let seen = Arc::new(AtomicBool::new(false));
        let seen_clone = seen.clone();
        hub.results.subscribe(move |r: &ModelResult| {
            assert_eq!(r.controller_id, "c1");
            seen_clone.store(true, Ordering::SeqCst);
        });
        hub.notify_result(ModelResult {
            controller_id: "c1".to_string(),
            command_type: CommandType::Start,
            correlation_id: None,
            success: true,
            error: None,
            payload: ImuCommandPayload {
                status: ImuControlStatus::Success,
                is_connected: true,
                message: "ok".to_string(),
            },
            completed_at: chrono::Utc::now(),
        });
        assert!(seen.load(Ordering::SeqCst));
    }

    #[test]
    fn imu_disconnected_event_carries_connected_false() {
        let hub = Hub::new();
        let seen = Arc::new(AtomicBool::new(false));
        let seen_clone = seen.clone();
        hub.imu_disconnected.subscribe(move |e: &ImuConnectionChanged| {
            assert!(!e.connected);
            seen_clone.store(true, Ordering::SeqCst);
        });
        hub.notify_imu_disconnected();
        assert!(seen.load(Ordering::SeqCst));
    }
}
