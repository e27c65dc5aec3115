//! Fixed-interval polling and the diffing that turns repeated reads into changes.

use std::collections::HashSet;
use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use jamal_core::{DriverSnapshot, RideId, RideRequest, RideStatus};
use jamal_store::{Backend, StoreError};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    /// Client watching its own request.
    pub ride_status: Duration,
    /// Driver watching the pending queue.
    pub driver_queue: Duration,
    /// Client header showing how many drivers are online.
    pub online_count: Duration,
    /// Driver pushing its position.
    pub driver_location: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            ride_status: Duration::from_secs(3),
            driver_queue: Duration::from_secs(5),
            online_count: Duration::from_secs(30),
            driver_location: Duration::from_secs(60),
        }
    }
}

/// A running poll loop. Dropping the handle stops the loop.
#[derive(Debug)]
pub struct PollHandle {
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait until the task breaks out of its loop.
    pub async fn join(mut self) {
        let _ = (&mut self.task).await;
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Run `task` every `period`, first tick immediately.
///
/// Ticks missed while a slow task runs are skipped, never bunched. The loop
/// ends when `task` returns [`ControlFlow::Break`].
pub fn spawn_poller<F, Fut>(period: Duration, mut task: F) -> PollHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ControlFlow<()>> + Send + 'static,
{
    let task = tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if task().await.is_break() {
                debug!("poller stopped");
                break;
            }
        }
    });
    PollHandle { task }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RideChange {
    Accepted(DriverSnapshot),
    Arrived(DriverSnapshot),
    Refused,
    Cancelled,
    Completed,
    /// The row was deleted.
    Vanished,
}

/// Tracks one ride across polls and reports what changed since the last read.
#[derive(Debug)]
pub struct RideWatcher {
    ride_id: RideId,
    last: Option<RideRequest>,
    vanished: bool,
}

impl RideWatcher {
    pub fn new(ride_id: RideId) -> Self {
        Self {
            ride_id,
            last: None,
            vanished: false,
        }
    }

    pub fn ride_id(&self) -> RideId {
        self.ride_id
    }

    pub fn current(&self) -> Option<&RideRequest> {
        self.last.as_ref()
    }

    /// Nothing more will change: the ride ended or disappeared.
    pub fn is_done(&self) -> bool {
        self.vanished || self.last.as_ref().is_some_and(|r| r.status.is_terminal())
    }

    /// Read the ride and diff it against the previous read.
    pub async fn poll(&mut self, backend: &dyn Backend) -> Result<Vec<RideChange>, StoreError> {
        match backend.get_ride(self.ride_id).await {
            Ok(ride) => Ok(self.observe(Some(ride))),
            Err(e) if e.is_not_found() => Ok(self.observe(None)),
            Err(e) => Err(e),
        }
    }

    /// The first observation is compared against a fresh pending request.
    pub fn observe(&mut self, current: Option<RideRequest>) -> Vec<RideChange> {
        let Some(ride) = current else {
            if self.vanished {
                return Vec::new();
            }
            self.vanished = true;
            self.last = None;
            return vec![RideChange::Vanished];
        };

        let previous = self.last.as_ref().map_or(RideStatus::Pending, |r| r.status);
        let was_arrived = self.last.as_ref().is_some_and(|r| r.driver.has_arrived());
        let mut changes = Vec::new();

        if ride.status != previous {
            match ride.status {
                RideStatus::Accepted => changes.push(RideChange::Accepted(ride.driver.clone())),
                RideStatus::Refused => changes.push(RideChange::Refused),
                RideStatus::Cancelled => changes.push(RideChange::Cancelled),
                RideStatus::Completed => changes.push(RideChange::Completed),
                RideStatus::Pending => {}
            }
        }
        if ride.driver.has_arrived() && !was_arrived && ride.status == RideStatus::Accepted {
            changes.push(RideChange::Arrived(ride.driver.clone()));
        }

        self.vanished = false;
        self.last = Some(ride);
        changes
    }
}

/// Tracks the pending queue and reports requests not seen on the previous read.
#[derive(Debug, Default)]
pub struct QueueWatcher {
    seen: HashSet<RideId>,
}

impl QueueWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids in `pending` that were absent last time. Everything is new on the
    /// first call.
    pub fn observe<'a>(
        &mut self,
        pending: impl IntoIterator<Item = &'a RideRequest>,
    ) -> Vec<RideId> {
        let current: HashSet<RideId> = pending.into_iter().map(|r| r.id).collect();
        let mut fresh: Vec<RideId> = current.difference(&self.seen).copied().collect();
        fresh.sort_unstable();
        self.seen = current;
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use jamal_core::{ClientInfo, NewRideRequest, RidePatch};
    use jamal_store::MemoryStore;

    fn ride(id: RideId, status: RideStatus) -> RideRequest {
        let mut new = NewRideRequest::pending(ClientInfo::default(), "Centro");
        new.status = status;
        RideRequest::from_new(id, new)
    }

    #[test]
    fn default_intervals() {
        let i = PollIntervals::default();
        assert_eq!(i.ride_status, Duration::from_secs(3));
        assert_eq!(i.driver_queue, Duration::from_secs(5));
        assert_eq!(i.online_count, Duration::from_secs(30));
        assert_eq!(i.driver_location, Duration::from_secs(60));
    }

    #[test]
    fn watcher_reports_acceptance_then_arrival_then_completion() {
        let mut w = RideWatcher::new(1);
        assert!(w.observe(Some(ride(1, RideStatus::Pending))).is_empty());

        let mut accepted = ride(1, RideStatus::Accepted);
        accepted.driver.name = Some("Carlos".into());
        let changes = w.observe(Some(accepted.clone()));
        assert!(matches!(
            &changes[..],
            [RideChange::Accepted(s)] if s.name.as_deref() == Some("Carlos")
        ));
        assert!(w.observe(Some(accepted.clone())).is_empty());

        accepted.driver.mark_arrived(chrono::Utc::now());
        assert!(matches!(&w.observe(Some(accepted.clone()))[..], [RideChange::Arrived(_)]));
        assert!(w.observe(Some(accepted)).is_empty());

        assert_eq!(
            w.observe(Some(ride(1, RideStatus::Completed))),
            vec![RideChange::Completed]
        );
        assert!(w.is_done());
    }

    #[test]
    fn watcher_reports_vanished_once() {
        let mut w = RideWatcher::new(1);
        w.observe(Some(ride(1, RideStatus::Pending)));
        assert_eq!(w.observe(None), vec![RideChange::Vanished]);
        assert!(w.observe(None).is_empty());
        assert!(w.is_done());
    }

    #[test]
    fn first_observation_of_refused_ride_is_reported() {
        let mut w = RideWatcher::new(4);
        assert_eq!(
            w.observe(Some(ride(4, RideStatus::Refused))),
            vec![RideChange::Refused]
        );
    }

    #[tokio::test]
    async fn watcher_polls_backend() {
        let store = MemoryStore::new();
        let r = store
            .insert_ride(NewRideRequest::pending(ClientInfo::default(), "Centro"))
            .await
            .unwrap();
        let mut w = RideWatcher::new(r.id);
        assert!(w.poll(&store).await.unwrap().is_empty());
        store
            .update_ride(r.id, &RidePatch::status(RideStatus::Cancelled))
            .await
            .unwrap();
        assert_eq!(w.poll(&store).await.unwrap(), vec![RideChange::Cancelled]);
        store.delete_ride(r.id).await.unwrap();
        assert_eq!(w.poll(&store).await.unwrap(), vec![RideChange::Vanished]);
    }

    #[test]
    fn queue_watcher_reports_only_new_ids() {
        let mut q = QueueWatcher::new();
        let first = [ride(1, RideStatus::Pending), ride(2, RideStatus::Pending)];
        assert_eq!(q.observe(&first), vec![1, 2]);
        let second = [ride(2, RideStatus::Pending), ride(3, RideStatus::Pending)];
        assert_eq!(q.observe(&second), vec![3]);
        assert!(q.observe(&second).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn poller_runs_until_break() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let handle = spawn_poller(Duration::from_secs(3), move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) + 1 >= 3 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            }
        });
        handle.join().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }
}
