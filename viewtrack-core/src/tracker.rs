//! Page-view tracker
//!
//! The [`Tracker`] is invoked once per completed navigation. It classifies the
//! navigation, drops duplicates and filtered views, records the view in the
//! session and then either:
//! - queues it and (re)arms the debounce timer, when the environment offers a
//!   beacon, or
//! - delivers it immediately over fetch, when it does not.
//!
//! A queued batch leaves through exactly one of two doors: the timer firing or
//! [`Tracker::unload`]. [`Tracker::teardown`] closes both without flushing, so
//! views still queued at that point are dropped.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use viewtrack_core::{HostEnvironment, HttpFetcher, Navigation, Tracker, TrackerConfig};
//!
//! # async fn run() -> viewtrack_core::Result<()> {
//! let config = TrackerConfig {
//!     hostname: "example.com".to_string(),
//!     ..TrackerConfig::new("pk_live_123")
//! };
//! let env = Arc::new(HostEnvironment::new(&config));
//! let fetcher = Arc::new(HttpFetcher::new(&config.hostname, config.timeout())?);
//!
//! let tracker = Tracker::new(config, env, fetcher)?;
//! tracker.navigate(&Navigation::new("/[place]", "/berlin")).await;
//! tracker.unload();
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::classifier;
use crate::config::TrackerConfig;
use crate::environment::Environment;
use crate::error::Result;
use crate::filter::{Filter, SkipReason};
use crate::scheduler::{Scheduler, ViewQueue};
use crate::session::Session;
use crate::transport::{DeliveryReport, Fetcher, Transporter};
use crate::types::{Navigation, PageView};

/// What happened to a navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// The runtime was not interactive yet; nothing was recorded
    NotInteractive,
    /// The tracker was torn down
    Inactive,
    /// Same pathname as the previous accepted view
    Duplicate,
    /// Rejected by the filter
    Skipped(SkipReason),
    /// Queued for the next flush; carries the queue length
    Queued { pending: usize },
    /// Sent immediately over fetch
    Delivered,
}

/// Which trigger drained the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushTrigger {
    Timer,
    Unload,
    /// No runtime to arm the timer on
    NoRuntime,
}

/// Counters over the tracker's lifetime
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Views accepted into the queue
    pub views_queued: usize,
    /// Views handed to a transport
    pub views_delivered: usize,
    /// Views rejected by the filter
    pub views_skipped: usize,
    /// Navigations dropped as duplicates
    pub duplicates: usize,
    /// Queued views discarded by teardown
    pub views_dropped: usize,
    pub beacon_calls: usize,
    pub fetch_calls: usize,
    /// Failed fetch calls and refused beacon sends
    pub failures: usize,
}

impl DeliveryStats {
    fn absorb(&mut self, report: DeliveryReport) {
        self.views_delivered += report.views;
        self.beacon_calls += report.beacon_calls;
        self.fetch_calls += report.fetch_calls;
        self.failures += report.failures;
    }
}

struct TrackerState {
    session: Session,
    queue: ViewQueue,
    scheduler: Scheduler,
    /// Unload listener still registered
    unload_armed: bool,
    torn_down: bool,
    stats: DeliveryStats,
}

struct Shared {
    config: TrackerConfig,
    env: Arc<dyn Environment>,
    fetcher: Arc<dyn Fetcher>,
    filter: Filter,
    state: Mutex<TrackerState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transporter(&self) -> Transporter {
        Transporter::probe(self.env.as_ref(), &self.fetcher)
    }
}

/// Page-view tracker for one page-load session
pub struct Tracker {
    shared: Arc<Shared>,
}

impl Tracker {
    /// Create a tracker.
    ///
    /// Fails immediately when the public key is missing; nothing after
    /// construction ever returns an error.
    pub fn new(
        config: TrackerConfig,
        env: Arc<dyn Environment>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self> {
        config.validate()?;

        let filter = Filter::from_config(&config);
        let state = TrackerState {
            session: Session::new(),
            queue: ViewQueue::new(),
            scheduler: Scheduler::new(config.delay()),
            unload_armed: true,
            torn_down: false,
            stats: DeliveryStats::default(),
        };

        tracing::debug!(
            api_route = %config.api_route,
            delay_ms = config.delay_ms,
            "Tracker created"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                env,
                fetcher,
                filter,
                state: Mutex::new(state),
            }),
        })
    }

    /// Handle a completed navigation. Never fails.
    ///
    /// The debounce timer needs a tokio runtime. Polled on any other executor,
    /// a queued view is flushed straight away instead of waiting for the delay.
    pub async fn navigate(&self, nav: &Navigation) -> NavigationOutcome {
        let shared = &self.shared;

        if !shared.env.is_interactive() {
            tracing::trace!(as_path = %nav.as_path, "Runtime not interactive, ignoring navigation");
            return NavigationOutcome::NotInteractive;
        }

        let has_prior_view = {
            let mut state = shared.lock();
            if state.torn_down {
                return NavigationOutcome::Inactive;
            }
            if state.session.is_duplicate(nav.pathname()) {
                state.stats.duplicates += 1;
                tracing::trace!(pathname = %nav.pathname(), "Duplicate navigation");
                return NavigationOutcome::Duplicate;
            }
            state.session.has_prior_view()
        };

        let view = classifier::classify(shared.env.as_ref(), nav, has_prior_view);

        // The predicate is caller code; run it without holding the lock.
        if let Some(reason) = shared.filter.rejection(&view) {
            shared.lock().stats.views_skipped += 1;
            tracing::debug!(pathname = %view.pathname, reason = %reason, "View skipped");
            return NavigationOutcome::Skipped(reason);
        }

        let transporter = shared.transporter();
        let view = {
            let mut state = shared.lock();
            if state.torn_down {
                return NavigationOutcome::Inactive;
            }
            // A concurrent navigation may have recorded this pathname while
            // the predicate ran.
            if state.session.is_duplicate(&view.pathname) {
                state.stats.duplicates += 1;
                tracing::trace!(pathname = %view.pathname, "Duplicate navigation");
                return NavigationOutcome::Duplicate;
            }
            let view = state.session.record(view);

            if transporter.is_beacon() {
                state.queue.push(view);
                state.stats.views_queued += 1;
                let pending = state.queue.len();

                let weak = Arc::downgrade(&self.shared);
                if state
                    .scheduler
                    .arm(move |generation| fire_timer(weak, generation))
                    .is_some()
                {
                    tracing::debug!(pending, "View queued");
                    return NavigationOutcome::Queued { pending };
                }

                let views = state.queue.drain();
                drop(state);
                flush(shared, views, FlushTrigger::NoRuntime);
                return NavigationOutcome::Delivered;
            }
            view
        };

        tracing::debug!(pathname = %view.pathname, "Delivering view over fetch");
        let report = transporter
            .deliver(&shared.config.api_route, &shared.config.public_key, vec![view])
            .await;
        shared.lock().stats.absorb(report);
        NavigationOutcome::Delivered
    }

    /// Page-unload hook.
    ///
    /// Drains the queue through the transport without waiting for anything.
    /// Only the first call after construction does any work; returns whether
    /// this call was that one.
    pub fn unload(&self) -> bool {
        let views = {
            let mut state = self.shared.lock();
            if !state.unload_armed {
                return false;
            }
            state.unload_armed = false;
            // The armed timer keeps running, detached; it will find the queue empty.
            state.scheduler.detach();
            state.queue.drain()
        };

        flush(&self.shared, views, FlushTrigger::Unload);
        true
    }

    /// Dispose of the tracker: cancel the timer and unregister the unload hook.
    ///
    /// Does not flush. Returns how many queued views were dropped.
    pub fn teardown(&self) -> usize {
        let mut state = self.shared.lock();
        if state.torn_down {
            return 0;
        }
        state.torn_down = true;
        state.unload_armed = false;
        state.scheduler.cancel();

        let dropped = state.queue.drain().len();
        state.stats.views_dropped += dropped;
        if dropped > 0 {
            tracing::debug!(dropped, "Tracker torn down with undelivered views");
        }
        dropped
    }

    pub fn stats(&self) -> DeliveryStats {
        self.shared.lock().stats.clone()
    }

    /// Number of views waiting for the next flush
    pub fn pending_count(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Views are queued or the timer is armed
    pub fn is_pending(&self) -> bool {
        let state = self.shared.lock();
        !state.queue.is_empty() || state.scheduler.is_armed()
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.shared.config
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn fire_timer(weak: Weak<Shared>, generation: u64) {
    let Some(shared) = weak.upgrade() else {
        return;
    };

    let views = {
        let mut state = shared.lock();
        if !state.scheduler.take_fired(generation) {
            return;
        }
        state.queue.drain()
    };

    flush(&shared, views, FlushTrigger::Timer);
}

/// Hand a drained batch to the transport. Empty batches are a no-op.
fn flush(shared: &Shared, views: Vec<PageView>, trigger: FlushTrigger) {
    if views.is_empty() {
        tracing::trace!(?trigger, "Nothing to flush");
        return;
    }

    let transporter = shared.transporter();
    tracing::debug!(
        ?trigger,
        views = views.len(),
        transport = transporter.name(),
        "Flushing views"
    );
    let report = transporter.deliver_detached(
        &shared.config.api_route,
        &shared.config.public_key,
        views,
    );
    shared.lock().stats.absorb(report);
}
