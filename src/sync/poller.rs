//! Control poller
//!
//! Keeps a local copy of the shared control state that eventually reflects
//! the server. One read is issued as soon as a configuration is selected and
//! then one per interval. Subscribers are notified only when one of the
//! synchronization fields actually changed.
//!
//! Failed polls are swallowed: the last good snapshot stays on screen and
//! the next tick simply tries again.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{ApiError, StageApi};
use crate::data::{ConfigId, ControlState};

use super::cache::{Offer, SnapshotCache};

/// Commands accepted by a running poller
#[derive(Debug, Clone)]
pub enum PollerCommand {
    /// Switch to another configuration, `None` suspends polling
    SetConfig(Option<ConfigId>),
    /// Poll now instead of waiting for the next tick
    Refetch,
}

/// Status updates from the poller
#[derive(Debug, Clone, PartialEq)]
pub enum PollerStatus {
    /// No configuration selected, nothing is polled
    Idle,
    Polling { config_id: ConfigId },
    /// A changed snapshot was published
    Updated { config_id: ConfigId },
    /// A poll returned the snapshot already published
    Confirmed { config_id: ConfigId },
    /// A poll failed; the cached snapshot is kept
    FetchFailed { config_id: ConfigId, reason: String },
    Stopped,
}

/// Completed read, tagged with the configuration generation it belongs to
struct FetchOutcome {
    generation: u64,
    config_id: ConfigId,
    result: Result<ControlState, ApiError>,
}

/// Handle for controlling and observing a running poller
#[derive(Clone)]
pub struct PollerHandle {
    cmd_tx: mpsc::Sender<PollerCommand>,
    state_rx: watch::Receiver<Option<ControlState>>,
    status_tx: broadcast::Sender<PollerStatus>,
    cancel: CancellationToken,
}

impl PollerHandle {
    pub async fn set_config(&self, config_id: Option<ConfigId>) {
        if self.cmd_tx.send(PollerCommand::SetConfig(config_id)).await.is_err() {
            debug!("Poller already stopped, ignoring config change");
        }
    }

    pub async fn refetch(&self) {
        if self.cmd_tx.send(PollerCommand::Refetch).await.is_err() {
            debug!("Poller already stopped, ignoring refetch");
        }
    }

    /// Stop polling; responses still in flight are discarded
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Receiver that observes every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<Option<ControlState>> {
        self.state_rx.clone()
    }

    /// Stream of published snapshots, starting with the next change
    pub fn updates(&self) -> WatchStream<Option<ControlState>> {
        WatchStream::from_changes(self.state_rx.clone())
    }

    pub fn statuses(&self) -> broadcast::Receiver<PollerStatus> {
        self.status_tx.subscribe()
    }

    /// Latest published snapshot
    pub fn latest(&self) -> Option<ControlState> {
        self.state_rx.borrow().clone()
    }
}

/// Periodically reads the control state of one configuration
pub struct ControlPoller<A: StageApi + 'static> {
    api: Arc<A>,
    /// Selected configuration, `None` while suspended
    config_id: Option<ConfigId>,
    /// Periodic interval, `None` disables the timer (reads only on demand)
    interval: Option<Duration>,
    cache: SnapshotCache,
    /// Bumped whenever the configuration changes; older outcomes are dropped
    generation: u64,
    /// Whether a read for the current generation is outstanding
    in_flight: bool,
    cmd_rx: mpsc::Receiver<PollerCommand>,
    state_tx: watch::Sender<Option<ControlState>>,
    status_tx: broadcast::Sender<PollerStatus>,
    cancel: CancellationToken,
}

impl<A: StageApi + 'static> ControlPoller<A> {
    /// Create a poller and the handle used to drive it
    pub fn new(
        api: Arc<A>,
        config_id: Option<ConfigId>,
        interval: Option<Duration>,
    ) -> (Self, PollerHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (state_tx, state_rx) = watch::channel(None);
        let (status_tx, _status_rx) = broadcast::channel(16);
        let cancel = CancellationToken::new();

        let handle = PollerHandle {
            cmd_tx,
            state_rx,
            status_tx: status_tx.clone(),
            cancel: cancel.clone(),
        };

        let poller = Self {
            api,
            config_id,
            interval,
            cache: SnapshotCache::new(),
            generation: 0,
            in_flight: false,
            cmd_rx,
            state_tx,
            status_tx,
            cancel,
        };

        (poller, handle)
    }

    /// Read the control state once and publish it if it changed.
    ///
    /// Errors are returned to the caller but never clear the cached state.
    pub async fn fetch(&mut self, config_id: ConfigId) -> Result<Offer, ApiError> {
        let generation = self.generation;
        let result = self.api.fetch_control(config_id).await;
        self.apply(FetchOutcome {
            generation,
            config_id,
            result,
        })
    }

    /// Run the poller until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<FetchOutcome>();

        let mut timer = self.start_config(&result_tx);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("Poller cancelled");
                    break;
                }

                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(PollerCommand::SetConfig(config_id)) => {
                            if config_id != self.config_id {
                                info!("Control poller switching to config {:?}", config_id);
                                self.config_id = config_id;
                                self.generation += 1;
                                self.in_flight = false;
                                self.cache.clear();
                                if config_id.is_none() {
                                    self.state_tx.send_replace(None);
                                }
                                timer = self.start_config(&result_tx);
                            }
                        }
                        Some(PollerCommand::Refetch) => {
                            self.issue_fetch(&result_tx);
                        }
                        None => {
                            debug!("All poller handles dropped");
                            break;
                        }
                    }
                }

                Some(outcome) = result_rx.recv() => {
                    if outcome.generation == self.generation {
                        self.in_flight = false;
                    }
                    // Failures are already logged and reported as status
                    let _ = self.apply(outcome);
                }

                _ = async {
                    match timer.as_mut() {
                        Some(timer) => { timer.tick().await; }
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    self.issue_fetch(&result_tx);
                }
            }
        }

        let _ = self.status_tx.send(PollerStatus::Stopped);
        info!("Control poller stopped");
    }

    /// Issue the immediate read for the selected configuration and create
    /// the periodic timer. Returns `None` when suspended.
    fn start_config(
        &mut self,
        result_tx: &mpsc::UnboundedSender<FetchOutcome>,
    ) -> Option<Interval> {
        let Some(config_id) = self.config_id else {
            let _ = self.status_tx.send(PollerStatus::Idle);
            return None;
        };

        let _ = self.status_tx.send(PollerStatus::Polling { config_id });
        self.issue_fetch(result_tx);

        // interval_at delays the first tick; the immediate read was just issued
        self.interval.map(|period| {
            let mut timer = tokio::time::interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer
        })
    }

    /// Spawn a read for the current configuration unless one is outstanding
    fn issue_fetch(&mut self, result_tx: &mpsc::UnboundedSender<FetchOutcome>) {
        let Some(config_id) = self.config_id else {
            return;
        };

        if self.in_flight {
            debug!("Previous poll for config {} still in flight, skipping tick", config_id);
            return;
        }
        self.in_flight = true;

        let api = self.api.clone();
        let generation = self.generation;
        let tx = result_tx.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let result = api.fetch_control(config_id).await;
            if cancel.is_cancelled() {
                debug!("Discarding poll result for config {} after shutdown", config_id);
                return;
            }
            let _ = tx.send(FetchOutcome {
                generation,
                config_id,
                result,
            });
        });
    }

    /// Apply a completed read to the cache and notify on change
    fn apply(&mut self, outcome: FetchOutcome) -> Result<Offer, ApiError> {
        if outcome.generation != self.generation || self.cancel.is_cancelled() {
            debug!(
                "Ignoring poll result for config {} from a superseded selection",
                outcome.config_id
            );
            return Ok(Offer::Stale);
        }

        match outcome.result {
            Ok(state) => {
                let offer = self.cache.offer(state);
                if offer == Offer::Changed {
                    if let Some(current) = self.cache.current() {
                        debug!(
                            "Control state changed: slide {} production {} revealed {} playing {}",
                            current.current_slide_index,
                            current.current_production_index,
                            current.revealed_positions,
                            current.is_playing
                        );
                        self.state_tx.send_replace(Some(current.clone()));
                    }
                    let _ = self.status_tx.send(PollerStatus::Updated {
                        config_id: outcome.config_id,
                    });
                } else if offer == Offer::Unchanged {
                    let _ = self.status_tx.send(PollerStatus::Confirmed {
                        config_id: outcome.config_id,
                    });
                }
                Ok(offer)
            }
            Err(e) => {
                if e.is_transient() {
                    debug!("Control poll for config {} failed: {}", outcome.config_id, e);
                } else {
                    warn!("Control poll for config {} failed: {}", outcome.config_id, e);
                }
                let _ = self.status_tx.send(PollerStatus::FetchFailed {
                    config_id: outcome.config_id,
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeStageApi;
    use crate::data::fixtures::control_at;
    use futures::StreamExt;

    fn poller(api: &Arc<FakeStageApi>) -> (ControlPoller<FakeStageApi>, PollerHandle) {
        ControlPoller::new(api.clone(), Some(7), Some(Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn test_equal_snapshots_notify_once() {
        let api = Arc::new(FakeStageApi::new());
        api.push_control(control_at(0));
        let (mut poller, handle) = poller(&api);
        let mut rx = handle.subscribe();
        let mut statuses = handle.statuses();

        assert_eq!(poller.fetch(7).await.unwrap(), Offer::Changed);
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        assert_eq!(poller.fetch(7).await.unwrap(), Offer::Unchanged);
        assert!(!rx.has_changed().unwrap());

        assert_eq!(statuses.try_recv().unwrap(), PollerStatus::Updated { config_id: 7 });
        assert_eq!(statuses.try_recv().unwrap(), PollerStatus::Confirmed { config_id: 7 });
    }

    #[tokio::test]
    async fn test_failed_poll_keeps_cached_state() {
        let api = Arc::new(FakeStageApi::new());
        let mut first = control_at(0);
        first.current_slide_index = 2;
        api.push_control(first);
        api.push_control_failure();
        let (mut poller, handle) = poller(&api);

        poller.fetch(7).await.unwrap();
        assert!(poller.fetch(7).await.is_err());
        assert_eq!(handle.latest().map(|s| s.current_slide_index), Some(2));
    }

    #[tokio::test]
    async fn test_stale_response_is_not_published() {
        let api = Arc::new(FakeStageApi::new());
        let mut newer = control_at(10);
        newer.revealed_positions = 3;
        let mut older = control_at(2);
        older.revealed_positions = 1;
        api.push_control(newer);
        api.push_control(older);
        let (mut poller, handle) = poller(&api);

        poller.fetch(7).await.unwrap();
        assert_eq!(poller.fetch(7).await.unwrap(), Offer::Stale);
        assert_eq!(handle.latest().map(|s| s.revealed_positions), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_polls_immediately_then_on_interval() {
        let api = Arc::new(FakeStageApi::new());
        api.push_control(control_at(0));
        let (poller, handle) = poller(&api);
        let task = tokio::spawn(poller.run());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(api.control_fetches(), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(api.control_fetches(), 2);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(api.control_fetches(), 3);

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_config_means_no_polling() {
        let api = Arc::new(FakeStageApi::new());
        api.push_control(control_at(0));
        let (poller, handle) = ControlPoller::new(api.clone(), None, Some(Duration::from_secs(5)));
        let task = tokio::spawn(poller.run());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(api.control_fetches(), 0);

        handle.set_config(Some(7)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(api.control_fetches(), 1);
        assert!(handle.latest().is_some());

        handle.set_config(None).await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(api.control_fetches(), 1);
        assert!(handle.latest().is_none());

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_stream_yields_changes() {
        let api = Arc::new(FakeStageApi::new());
        let mut revealed = control_at(5);
        revealed.revealed_positions = 1;
        api.push_control(control_at(0));
        api.push_control(control_at(0));
        api.push_control(revealed);
        let (poller, handle) = poller(&api);
        let mut updates = handle.updates();
        let task = tokio::spawn(poller.run());

        let first = updates.next().await.flatten().unwrap();
        assert_eq!(first.revealed_positions, 0);

        // The unchanged second poll is skipped; the next item is the reveal
        let second = updates.next().await.flatten().unwrap();
        assert_eq!(second.revealed_positions, 1);
        assert_eq!(api.control_fetches(), 3);

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_stops_run_loop() {
        let api = Arc::new(FakeStageApi::new());
        let (poller, handle) = poller(&api);
        let mut statuses = handle.statuses();
        handle.shutdown();
        poller.run().await;

        let mut saw_stopped = false;
        while let Ok(status) = statuses.try_recv() {
            if status == PollerStatus::Stopped {
                saw_stopped = true;
            }
        }
        assert!(saw_stopped);
    }
}
