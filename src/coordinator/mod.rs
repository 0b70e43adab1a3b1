/// Update coordinator module
///
/// This module owns the refresh cycle for all tracked symbols:
/// - Fetch quotes for the full symbol list
/// - Validate and normalize the payload into a `Snapshot`
/// - Publish the snapshot and success flag to readers
/// - Arm retry / warm-up timers
///
/// Submodules provide the scheduling primitives the cycle relies on:
/// - timer:    single-slot, cancellable one-shot timer
/// - debounce: coalesces refresh requests, single-flight worker
/// - interval: periodic scan-interval trigger
///
pub mod debounce;
pub mod interval;
pub mod timer;


use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::Timings;
use crate::error::UpdateFailed;
use crate::metrics::METRICS;
use crate::registry::SymbolRegistry;
use crate::schema::{Snapshot, parse_quote_response};
use crate::source::QuoteSource;
use crate::util;

use debounce::Debouncer;
pub use timer::TimerPurpose;
use timer::RefreshTimer;

/// Fixed delays used by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSettings {
    pub fetch_timeout: Duration,
    pub failure_delay: Duration,
    pub warmup_delay: Duration,
    pub debounce_window: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from(&Timings::default())
    }
}

impl From<&Timings> for CoordinatorSettings {
    fn from(t: &Timings) -> Self {
        Self {
            fetch_timeout: Duration::from_secs(t.fetch_timeout_secs),
            failure_delay: Duration::from_secs(t.failure_delay_secs),
            warmup_delay: Duration::from_secs(t.warmup_delay_secs),
            debounce_window: Duration::from_millis(t.debounce_ms),
        }
    }
}

/// What readers see. Replaced as a whole on success, only the flag
/// flips on failure.
#[derive(Debug, Clone, Default)]
pub struct RefreshState {
    /// Latest fully successful snapshot, `None` before the first one.
    pub snapshot: Option<Arc<Snapshot>>,

    pub last_update_success: bool,

    pub last_success_at: Option<DateTime<Utc>>,
}

/// Observable coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorPhase {
    /// No fetch running and no retry pending.
    Idle,

    /// A fetch-parse-store attempt is in progress.
    Fetching,

    /// The last attempt failed and a timer will trigger the next one.
    /// The timer may be a warm-up that replaced the retry.
    RetryScheduled,
}

/// Owns the symbol registry and drives fetch-parse-store cycles.
///
/// CONCURRENCY:
/// - `refresh` is single-flight; concurrent callers queue behind the
///   running attempt instead of issuing overlapping fetches
/// - readers go through a `watch` channel and never block on I/O
/// - registry and timer slot use short non-async critical sections
///
/// Must be constructed inside a tokio runtime; it spawns the
/// debounce worker.
pub struct UpdateCoordinator {
    registry: Mutex<SymbolRegistry>,
    source: Arc<dyn QuoteSource>,
    settings: CoordinatorSettings,
    state: watch::Sender<RefreshState>,
    in_flight: tokio::sync::Mutex<()>,
    last_attempt_failed: AtomicBool,
    timer: RefreshTimer,
    debouncer: Debouncer,
}

impl UpdateCoordinator {
    pub fn new<I, S>(
        symbols: I,
        source: Arc<dyn QuoteSource>,
        settings: CoordinatorSettings,
    ) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let registry = SymbolRegistry::from_symbols(symbols);
        if registry.is_empty() {
            warn!("Coordinator created without symbols");
        }
        METRICS.symbols_tracked.store(registry.len(), Ordering::Relaxed);

        Arc::new_cyclic(|this: &Weak<Self>| {
            let (debouncer, _) = Debouncer::spawn(settings.debounce_window, {
                let this = this.clone();
                move || {
                    let this = this.clone();
                    async move {
                        let Some(coordinator) = this.upgrade() else {
                            return;
                        };
                        // Failures are already recorded and a retry armed;
                        // this is the bookkeeping/log side.
                        if let Err(err) = coordinator.refresh().await {
                            error!("Quote update failed: {}", err);
                        }
                    }
                }
            });

            Self {
                registry: Mutex::new(registry),
                source,
                settings,
                state: watch::Sender::new(RefreshState::default()),
                in_flight: tokio::sync::Mutex::new(()),
                last_attempt_failed: AtomicBool::new(false),
                timer: RefreshTimer::new(),
                debouncer,
            }
        })
    }

    // --------------------------------------------------------
    // Reader API
    // --------------------------------------------------------

    /// Tracked symbols in first-seen order.
    pub fn get_symbols(&self) -> Vec<String> {
        self.registry.lock().list().to_vec()
    }

    pub fn is_tracked(&self, symbol: &str) -> bool {
        self.registry.lock().contains(symbol)
    }

    /// Latest successful snapshot.
    pub fn data(&self) -> Option<Arc<Snapshot>> {
        self.state.borrow().snapshot.clone()
    }

    pub fn last_update_success(&self) -> bool {
        self.state.borrow().last_update_success
    }

    /// Receiver that wakes on every published state change.
    pub fn subscribe(&self) -> watch::Receiver<RefreshState> {
        self.state.subscribe()
    }

    pub fn phase(&self) -> CoordinatorPhase {
        if self.in_flight.try_lock().is_err() {
            CoordinatorPhase::Fetching
        } else if self.timer.armed().is_some()
            && self.last_attempt_failed.load(Ordering::Acquire)
        {
            CoordinatorPhase::RetryScheduled
        } else {
            CoordinatorPhase::Idle
        }
    }

    /// Purpose of the single outstanding timer, if any.
    pub fn armed_timer(&self) -> Option<TimerPurpose> {
        self.timer.armed()
    }

    // --------------------------------------------------------
    // Triggers
    // --------------------------------------------------------

    /// Starts tracking `symbol`.
    ///
    /// Returns `false` if it is already tracked (any casing). Otherwise
    /// a warm-up refresh is scheduled; nothing is fetched here, so the
    /// caller never waits on the network.
    pub fn add_symbol(&self, symbol: &str) -> bool {
        let added = {
            let mut registry = self.registry.lock();
            let added = registry.add(symbol);
            METRICS.symbols_tracked.store(registry.len(), Ordering::Relaxed);
            added
        };

        if !added {
            return false;
        }

        self.arm_timer(self.settings.warmup_delay, TimerPurpose::WarmUp);
        info!(
            "Added {} and requested update in {} seconds.",
            symbol.trim().to_uppercase(),
            self.settings.warmup_delay.as_secs()
        );
        true
    }

    /// Asks for a refresh soon. Bursts collapse into one attempt.
    pub fn request_refresh(&self) {
        self.debouncer.request();
    }

    /// Spawns the scan-interval driver.
    pub fn spawn_interval(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        interval::spawn_interval(Arc::downgrade(self), period)
    }

    /// Startup refresh, run once before consumers are wired up.
    ///
    /// If it does not succeed another refresh is requested right away;
    /// the retry timer from the failure stays armed as well.
    pub async fn first_refresh(&self) -> bool {
        if let Err(err) = self.refresh().await {
            warn!("Initial quote update failed: {}", err);
        }

        let ok = self.last_update_success();
        if !ok {
            debug!("Coordinator did not report any data, requesting refresh");
            self.request_refresh();
        }
        ok
    }

    // --------------------------------------------------------
    // Refresh cycle
    // --------------------------------------------------------

    /// One fetch-parse-store attempt.
    ///
    /// Success replaces the snapshot, sets the success flag and cancels
    /// an outstanding retry. Failure clears the flag, keeps the previous
    /// snapshot, arms a retry and returns the error.
    pub async fn refresh(&self) -> Result<(), UpdateFailed> {
        let _flight = self.in_flight.lock().await;
        METRICS.refresh_attempts.fetch_add(1, Ordering::Relaxed);

        // Symbols added after this point wait for the next attempt.
        let symbols = self.get_symbols();

        match self.fetch_snapshot(&symbols).await {
            Ok(snapshot) => {
                let count = snapshot.len();
                if snapshot.is_empty() {
                    warn!("Quote response contained no records");
                }
                let missing: Vec<&String> =
                    symbols.iter().filter(|s| !snapshot.contains(s)).collect();
                if !missing.is_empty() {
                    debug!("No quote returned for {:?}", missing);
                }

                self.state.send_replace(RefreshState {
                    snapshot: Some(Arc::new(snapshot)),
                    last_update_success: true,
                    last_success_at: Some(Utc::now()),
                });
                self.last_attempt_failed.store(false, Ordering::Release);
                self.timer.cancel_if(TimerPurpose::Retry);

                METRICS.refresh_successes.fetch_add(1, Ordering::Relaxed);
                METRICS.last_success_ms.store(util::now_ms(), Ordering::Relaxed);
                info!("Data updated ({} of {} symbols)", count, symbols.len());
                Ok(())
            }
            Err(err) => {
                self.state.send_modify(|state| state.last_update_success = false);
                self.last_attempt_failed.store(true, Ordering::Release);
                self.arm_timer(self.settings.failure_delay, TimerPurpose::Retry);

                METRICS.refresh_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Error obtaining data [{}], retrying in {} seconds.",
                    err.kind(),
                    self.settings.failure_delay.as_secs()
                );
                Err(err)
            }
        }
    }

    async fn fetch_snapshot(&self, symbols: &[String]) -> Result<Snapshot, UpdateFailed> {
        debug!(
            "Fetching {} symbol(s) from {}",
            symbols.len(),
            self.source.name()
        );

        let payload = timeout(self.settings.fetch_timeout, self.source.fetch(symbols))
            .await
            .map_err(|_| UpdateFailed::Timeout(self.settings.fetch_timeout))??;

        parse_quote_response(payload.as_ref())
    }

    fn arm_timer(&self, delay: Duration, purpose: TimerPurpose) {
        match purpose {
            TimerPurpose::Retry => METRICS.retries_armed.fetch_add(1, Ordering::Relaxed),
            TimerPurpose::WarmUp => METRICS.warmups_armed.fetch_add(1, Ordering::Relaxed),
        };

        let debouncer = self.debouncer.clone();
        self.timer.arm(delay, purpose, move || {
            debug!("{:?} timer fired, requesting refresh", purpose);
            debouncer.request();
        });
    }
}
