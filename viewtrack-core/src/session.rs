//! Session state
//!
//! One session lives exactly as long as one tracker instance. It remembers
//! whether a view has already been recorded and which pathname was recorded
//! last. Only accepted views are recorded.

use crate::types::PageView;

#[derive(Debug, Default)]
pub struct Session {
    has_prior_view: bool,
    last_pathname: Option<String>,
    recorded: usize,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a view has already been recorded in this session
    pub fn has_prior_view(&self) -> bool {
        self.has_prior_view
    }

    /// Same pathname as the last recorded view
    pub fn is_duplicate(&self, pathname: &str) -> bool {
        self.last_pathname.as_deref() == Some(pathname)
    }

    pub fn last_pathname(&self) -> Option<&str> {
        self.last_pathname.as_deref()
    }

    /// Number of views recorded so far
    pub fn recorded(&self) -> usize {
        self.recorded
    }

    /// Record an accepted view.
    ///
    /// Every view after the first leaves here with `is_unique == Some(false)`,
    /// whatever the classifier computed.
    pub fn record(&mut self, mut view: PageView) -> PageView {
        if self.has_prior_view {
            view.is_unique = Some(false);
        }
        self.has_prior_view = true;
        self.last_pathname = Some(view.pathname.clone());
        self.recorded += 1;
        view
    }
}
