//! Environment context
//!
//! Everything the classifier and tracker would otherwise read from ambient
//! runtime state (document host, referrer, user agent, clock, the beacon
//! capability) is reached through the [`Environment`] trait, so the tracker
//! can be driven deterministically.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use crate::config::TrackerConfig;
use crate::transport::Beacon;

/// Capabilities of the runtime hosting the tracker
pub trait Environment: Send + Sync {
    /// Current document host
    fn hostname(&self) -> String;

    /// Referrer of the current page load, if any
    fn referrer(&self) -> Option<String>;

    fn user_agent(&self) -> Option<String>;

    fn time_zone(&self) -> Option<String>;

    /// Viewport width; `None` when there is no window (server-side, CLI)
    fn viewport_width(&self) -> Option<u32>;

    /// Milliseconds since the epoch
    fn now_ms(&self) -> i64;

    /// Whether the runtime has finished its initial render and can be tracked
    fn is_interactive(&self) -> bool {
        true
    }

    /// Probe for the non-blocking delivery channel
    fn beacon(&self) -> Option<Arc<dyn Beacon>>;
}

/// Environment of the running process, configured from [`TrackerConfig`]
pub struct HostEnvironment {
    hostname: String,
    referrer: Option<String>,
    user_agent: String,
    time_zone: Option<String>,
    beacon: Option<Arc<dyn Beacon>>,
}

impl HostEnvironment {
    pub fn new(config: &TrackerConfig) -> Self {
        let user_agent = config
            .user_agent
            .clone()
            .unwrap_or_else(|| format!("viewtrack/{}", env!("CARGO_PKG_VERSION")));
        let time_zone = config
            .time_zone
            .clone()
            .or_else(|| std::env::var("TZ").ok().filter(|tz| !tz.is_empty()));

        Self {
            hostname: config.hostname.clone(),
            referrer: None,
            user_agent,
            time_zone,
            beacon: None,
        }
    }

    /// Referrer reported for this page load
    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    /// Offer a non-blocking delivery channel
    pub fn with_beacon(mut self, beacon: Arc<dyn Beacon>) -> Self {
        self.beacon = Some(beacon);
        self
    }
}

impl Environment for HostEnvironment {
    fn hostname(&self) -> String {
        self.hostname.clone()
    }

    fn referrer(&self) -> Option<String> {
        self.referrer.clone()
    }

    fn user_agent(&self) -> Option<String> {
        Some(self.user_agent.clone())
    }

    fn time_zone(&self) -> Option<String> {
        self.time_zone.clone()
    }

    fn viewport_width(&self) -> Option<u32> {
        None
    }

    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn beacon(&self) -> Option<Arc<dyn Beacon>> {
        self.beacon.clone()
    }
}

/// Fixed environment with a manually driven clock and readiness flag
pub struct StaticEnvironment {
    pub hostname: String,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub time_zone: Option<String>,
    pub viewport_width: Option<u32>,
    pub beacon: Option<Arc<dyn Beacon>>,
    now_ms: AtomicI64,
    interactive: AtomicBool,
}

impl StaticEnvironment {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            referrer: None,
            user_agent: Some("viewtrack-test".to_string()),
            time_zone: Some("UTC".to_string()),
            viewport_width: Some(1024),
            beacon: None,
            now_ms: AtomicI64::new(1_700_000_000_000),
            interactive: AtomicBool::new(true),
        }
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    pub fn with_beacon(mut self, beacon: Arc<dyn Beacon>) -> Self {
        self.beacon = Some(beacon);
        self
    }

    /// Move the clock forward
    pub fn advance(&self, ms: i64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set_interactive(&self, interactive: bool) {
        self.interactive.store(interactive, Ordering::SeqCst);
    }
}

impl Environment for StaticEnvironment {
    fn hostname(&self) -> String {
        self.hostname.clone()
    }

    fn referrer(&self) -> Option<String> {
        self.referrer.clone()
    }

    fn user_agent(&self) -> Option<String> {
        self.user_agent.clone()
    }

    fn time_zone(&self) -> Option<String> {
        self.time_zone.clone()
    }

    fn viewport_width(&self) -> Option<u32> {
        self.viewport_width
    }

    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    fn is_interactive(&self) -> bool {
        self.interactive.load(Ordering::SeqCst)
    }

    fn beacon(&self) -> Option<Arc<dyn Beacon>> {
        self.beacon.clone()
    }
}
