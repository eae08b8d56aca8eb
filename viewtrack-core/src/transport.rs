//! Delivery of page views to the collection endpoint
//!
//! Two channels exist:
//! - **Beacon**: fire-and-forget. One call carries the whole batch, the caller
//!   never learns the outcome and the call never blocks.
//! - **Fetch**: a plain HTTP request per view, used when no beacon is offered.
//!
//! [`Transporter::probe`] picks one at delivery time. Both send the same
//! plain-text body, `{"publicKey": ..., "views": [...]}`, without setting a
//! content type. Failures are never retried and never surfaced to the
//! tracker's caller; they only show up in [`DeliveryReport`] and debug logs.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::types::{PageView, ViewBatch};

/// Non-blocking delivery primitive
pub trait Beacon: Send + Sync {
    /// Queue `body` for delivery to `url`. Returns false if the channel refused it.
    fn send(&self, url: &str, body: String) -> bool;
}

/// Blocking delivery primitive
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// POST `body` to `url` as plain text
    async fn post(&self, url: &str, body: String) -> Result<()>;
}

/// Outcome of one delivery attempt, for stats only
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Views handed to a channel
    pub views: usize,
    pub beacon_calls: usize,
    pub fetch_calls: usize,
    /// Fetch calls that failed or beacon sends that were refused
    pub failures: usize,
}

/// Delivery channel selected by capability probing
#[derive(Clone)]
pub enum Transporter {
    Beacon(Arc<dyn Beacon>),
    Fetch(Arc<dyn Fetcher>),
}

impl Transporter {
    /// Prefer the environment's beacon, fall back to `fetcher`
    pub fn probe(env: &dyn Environment, fetcher: &Arc<dyn Fetcher>) -> Self {
        match env.beacon() {
            Some(beacon) => Transporter::Beacon(beacon),
            None => Transporter::Fetch(fetcher.clone()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transporter::Beacon(_) => "beacon",
            Transporter::Fetch(_) => "fetch",
        }
    }

    pub fn is_beacon(&self) -> bool {
        matches!(self, Transporter::Beacon(_))
    }

    /// Deliver `views`, waiting for fetch requests to complete
    pub async fn deliver(&self, url: &str, public_key: &str, views: Vec<PageView>) -> DeliveryReport {
        match self {
            Transporter::Beacon(beacon) => send_beacon(beacon.as_ref(), url, public_key, views),
            Transporter::Fetch(fetcher) => {
                let mut report = DeliveryReport::default();
                for view in views {
                    let body = match ViewBatch::new(public_key, vec![view]).to_body() {
                        Ok(body) => body,
                        Err(e) => {
                            tracing::debug!(error = %e, "Failed to serialize view");
                            report.failures += 1;
                            continue;
                        }
                    };
                    report.fetch_calls += 1;
                    report.views += 1;
                    if let Err(e) = fetcher.post(url, body).await {
                        tracing::debug!(url = %url, error = %e, "Fetch delivery failed");
                        report.failures += 1;
                    }
                }
                report
            }
        }
    }

    /// Deliver `views` without waiting.
    ///
    /// Fetch requests are detached onto the current runtime so they outlive the
    /// caller; outside a runtime they are dropped.
    pub fn deliver_detached(&self, url: &str, public_key: &str, views: Vec<PageView>) -> DeliveryReport {
        match self {
            Transporter::Beacon(beacon) => send_beacon(beacon.as_ref(), url, public_key, views),
            Transporter::Fetch(_) => {
                let Ok(handle) = tokio::runtime::Handle::try_current() else {
                    tracing::debug!(views = views.len(), "No runtime for detached fetch, dropping views");
                    return DeliveryReport {
                        failures: views.len(),
                        ..DeliveryReport::default()
                    };
                };
                let report = DeliveryReport {
                    views: views.len(),
                    fetch_calls: views.len(),
                    ..DeliveryReport::default()
                };
                let transporter = self.clone();
                let url = url.to_string();
                let public_key = public_key.to_string();
                handle.spawn(async move {
                    transporter.deliver(&url, &public_key, views).await;
                });
                report
            }
        }
    }
}

fn send_beacon(beacon: &dyn Beacon, url: &str, public_key: &str, views: Vec<PageView>) -> DeliveryReport {
    let count = views.len();
    let mut report = DeliveryReport::default();
    match ViewBatch::new(public_key, views).to_body() {
        Ok(body) => {
            report.beacon_calls = 1;
            report.views = count;
            if !beacon.send(url, body) {
                tracing::debug!(url = %url, views = count, "Beacon refused batch");
                report.failures = 1;
            }
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to serialize batch");
            report.failures = 1;
        }
    }
    report
}

// ============================================
// HTTP implementations
// ============================================

/// Resolve a possibly relative endpoint against the page origin
pub fn resolve_endpoint(route: &str, hostname: &str) -> Result<Url> {
    match Url::parse(route) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let origin = Url::parse(&format!("https://{}/", hostname))
                .map_err(|e| Error::Config(format!("invalid hostname {:?}: {}", hostname, e)))?;
            origin
                .join(route)
                .map_err(|e| Error::Config(format!("invalid api route {:?}: {}", route, e)))
        }
        Err(e) => Err(Error::Config(format!("invalid api route {:?}: {}", route, e))),
    }
}

async fn post_text(client: &reqwest::Client, url: Url, body: String) -> Result<()> {
    let response = client
        .post(url)
        .body(body)
        .send()
        .await
        .map_err(|e| Error::Transport(format!("HTTP request failed: {}", e)))?;

    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(Error::Transport(format!("API error ({})", status)))
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))
}

/// [`Fetcher`] backed by reqwest
pub struct HttpFetcher {
    client: reqwest::Client,
    hostname: String,
}

impl HttpFetcher {
    /// `hostname` is the page origin relative endpoints resolve against
    pub fn new(hostname: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            hostname: hostname.into(),
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn post(&self, url: &str, body: String) -> Result<()> {
        let url = resolve_endpoint(url, &self.hostname)?;
        post_text(&self.client, url, body).await
    }
}

/// [`Beacon`] that hands bodies to a background worker task.
///
/// `send` only enqueues, so it never blocks; the worker posts each body in
/// order. Close the beacon and join its [`BeaconWorker`] to wait for
/// everything queued to be sent.
pub struct ChannelBeacon {
    tx: Mutex<Option<mpsc::UnboundedSender<(String, String)>>>,
}

/// Background task draining a [`ChannelBeacon`]
pub struct BeaconWorker {
    handle: JoinHandle<BeaconSummary>,
}

/// What a beacon worker did over its lifetime
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BeaconSummary {
    pub sent: usize,
    pub failed: usize,
}

impl ChannelBeacon {
    /// Spawn the worker on the current runtime
    pub fn spawn(hostname: impl Into<String>, timeout: Duration) -> Result<(Arc<Self>, BeaconWorker)> {
        let client = build_client(timeout)?;
        let hostname = hostname.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, String)>();

        let handle = tokio::spawn(async move {
            let mut summary = BeaconSummary::default();
            while let Some((url, body)) = rx.recv().await {
                let result = match resolve_endpoint(&url, &hostname) {
                    Ok(url) => post_text(&client, url, body).await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(()) => summary.sent += 1,
                    Err(e) => {
                        tracing::debug!(url = %url, error = %e, "Beacon delivery failed");
                        summary.failed += 1;
                    }
                }
            }
            summary
        });

        let beacon = Arc::new(Self {
            tx: Mutex::new(Some(tx)),
        });
        Ok((beacon, BeaconWorker { handle }))
    }

    /// Stop accepting bodies; the worker exits once the backlog is sent
    pub fn close(&self) {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

impl Beacon for ChannelBeacon {
    fn send(&self, url: &str, body: String) -> bool {
        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(tx) => tx.send((url.to_string(), body)).is_ok(),
            None => false,
        }
    }
}

impl BeaconWorker {
    /// Wait for the worker to finish (after [`ChannelBeacon::close`])
    pub async fn join(self) -> BeaconSummary {
        self.handle.await.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::StaticEnvironment;

    #[derive(Default)]
    struct RecordingBeacon {
        calls: Mutex<Vec<(String, String)>>,
    }

    impl Beacon for RecordingBeacon {
        fn send(&self, url: &str, body: String) -> bool {
            self.calls.lock().unwrap().push((url.to_string(), body));
            true
        }
    }

    #[derive(Default)]
    struct RecordingFetcher {
        calls: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl Fetcher for RecordingFetcher {
        async fn post(&self, url: &str, body: String) -> Result<()> {
            self.calls.lock().unwrap().push((url.to_string(), body));
            if self.fail {
                Err(Error::Transport("connection refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn views() -> Vec<PageView> {
        vec![
            PageView::new("example.com", "/a", "/a", 1),
            PageView::new("example.com", "/b", "/b", 2),
        ]
    }

    #[test]
    fn test_probe_prefers_beacon() {
        let fetcher: Arc<dyn Fetcher> = Arc::new(RecordingFetcher::default());
        let env = StaticEnvironment::new("example.com");
        assert_eq!(Transporter::probe(&env, &fetcher).name(), "fetch");

        let env = env.with_beacon(Arc::new(RecordingBeacon::default()));
        assert!(Transporter::probe(&env, &fetcher).is_beacon());
    }

    #[tokio::test]
    async fn test_beacon_sends_one_batch() {
        let beacon = Arc::new(RecordingBeacon::default());
        let transporter = Transporter::Beacon(beacon.clone());

        let report = transporter.deliver("/api/pv", "pk_test", views()).await;
        assert_eq!(report.beacon_calls, 1);
        assert_eq!(report.views, 2);

        let calls = beacon.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let batch: ViewBatch = serde_json::from_str(&calls[0].1).unwrap();
        assert_eq!(batch.public_key, "pk_test");
        assert_eq!(batch.views.len(), 2);
        assert_eq!(batch.views[1].pathname, "/b");
    }

    #[tokio::test]
    async fn test_fetch_sends_per_view_and_swallows_failures() {
        let fetcher = Arc::new(RecordingFetcher {
            fail: true,
            ..Default::default()
        });
        let transporter = Transporter::Fetch(fetcher.clone());

        let report = transporter.deliver("/api/pv", "pk_test", views()).await;
        assert_eq!(report.fetch_calls, 2);
        assert_eq!(report.failures, 2);

        let calls = fetcher.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        let batch: ViewBatch = serde_json::from_str(&calls[0].1).unwrap();
        assert_eq!(batch.views.len(), 1);
        assert_eq!(batch.views[0].pathname, "/a");
    }

    #[tokio::test]
    async fn test_detached_fetch_runs_on_runtime() {
        let fetcher = Arc::new(RecordingFetcher::default());
        let transporter = Transporter::Fetch(fetcher.clone());

        let report = transporter.deliver_detached("/api/pv", "pk_test", views());
        assert_eq!(report.fetch_calls, 2);

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(fetcher.calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_resolve_endpoint() {
        let url = resolve_endpoint("https://happykit.dev/api/pv", "example.com").unwrap();
        assert_eq!(url.as_str(), "https://happykit.dev/api/pv");

        let url = resolve_endpoint("/foo", "example.com").unwrap();
        assert_eq!(url.as_str(), "https://example.com/foo");
    }

    #[tokio::test]
    async fn test_closed_channel_beacon_refuses() {
        let (beacon, worker) = ChannelBeacon::spawn("example.com", Duration::from_secs(1)).unwrap();
        beacon.close();
        assert!(!beacon.send("/api/pv", "{}".to_string()));
        assert_eq!(worker.join().await, BeaconSummary::default());
    }
}
