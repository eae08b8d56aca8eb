//! View filtering
//!
//! A view is dropped when its hostname is on the skip list or when the
//! caller's skip predicate returns `true`. The hostname check runs first and
//! short-circuits, so the predicate only sees views that survived it.

use std::fmt;

use crate::config::{SkipFn, TrackerConfig};
use crate::types::PageView;

/// Why a view was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Hostname matched the skip list
    Hostname,
    /// The skip predicate returned true
    Predicate,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Hostname => write!(f, "hostname"),
            SkipReason::Predicate => write!(f, "predicate"),
        }
    }
}

/// Side-effect-free accept/reject decision over classified views
#[derive(Clone, Default)]
pub struct Filter {
    /// Lowercased skip list
    skip_hostnames: Vec<String>,
    skip: Option<SkipFn>,
}

impl Filter {
    pub fn new(skip_hostnames: &[String], skip: Option<SkipFn>) -> Self {
        Self {
            skip_hostnames: skip_hostnames
                .iter()
                .map(|h| h.trim().to_ascii_lowercase())
                .collect(),
            skip,
        }
    }

    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(&config.skip_hostnames, config.skip.clone())
    }

    /// Returns the reason a view should be dropped, if any
    pub fn rejection(&self, view: &PageView) -> Option<SkipReason> {
        let host = view.hostname.to_ascii_lowercase();
        if self.skip_hostnames.iter().any(|h| *h == host) {
            return Some(SkipReason::Hostname);
        }
        if let Some(skip) = &self.skip {
            if skip(view) {
                return Some(SkipReason::Predicate);
            }
        }
        None
    }

    pub fn accept(&self, view: &PageView) -> bool {
        self.rejection(view).is_none()
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("skip_hostnames", &self.skip_hostnames)
            .field("skip", &self.skip.as_ref().map(|_| "<fn>"))
            .finish()
    }
}
