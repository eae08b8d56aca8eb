//! Recording transport doubles shared by the integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use viewtrack_core::{Beacon, Error, Fetcher, Result, ViewBatch};

/// One captured delivery call
#[derive(Debug, Clone)]
pub struct Call {
    pub url: String,
    pub body: String,
}

impl Call {
    pub fn batch(&self) -> ViewBatch {
        serde_json::from_str(&self.body).expect("body should be a view batch")
    }
}

#[derive(Default)]
pub struct RecordingBeacon {
    calls: Mutex<Vec<Call>>,
}

impl RecordingBeacon {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

impl Beacon for RecordingBeacon {
    fn send(&self, url: &str, body: String) -> bool {
        self.calls.lock().unwrap().push(Call {
            url: url.to_string(),
            body,
        });
        true
    }
}

#[derive(Default)]
pub struct RecordingFetcher {
    calls: Mutex<Vec<Call>>,
    fail: bool,
}

impl RecordingFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for RecordingFetcher {
    async fn post(&self, url: &str, body: String) -> Result<()> {
        self.calls.lock().unwrap().push(Call {
            url: url.to_string(),
            body,
        });
        if self.fail {
            return Err(Error::Transport("connection reset".to_string()));
        }
        Ok(())
    }
}
