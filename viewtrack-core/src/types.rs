//! Core domain types for viewtrack
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **View** | One classified page navigation ([`PageView`]) |
//! | **Navigation** | A completed route change handed over by the routing layer |
//! | **Session** | The lifetime of one page load's tracker instance (never persisted) |
//! | **Batch** | The wire payload: a public key plus the ordered views ([`ViewBatch`]) |
//!
//! Field names on the wire follow the collection endpoint's schema, so several
//! Rust fields are renamed (`user_agent` is sent as `ua`, `timestamp` as `time`).
//! Absent optional fields are omitted rather than sent as `null`.

use serde::{Deserialize, Serialize};

// ============================================
// PageView
// ============================================

/// A single classified page view.
///
/// Built by [`crate::classifier::classify`] and treated as a value afterwards;
/// the only later adjustment is the session forcing `is_unique` to `false`
/// for every view after the first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageView {
    /// Current document host
    pub hostname: String,
    /// Navigation path with the query string stripped
    pub pathname: String,
    /// Parameterized route template (e.g. `/[place]`)
    pub route: String,
    /// User agent of the runtime
    #[serde(rename = "ua", default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Viewport width, absent outside an interactive window
    #[serde(rename = "width", default, skip_serializing_if = "Option::is_none")]
    pub viewport_width: Option<u32>,
    /// First view of the session from outside the site
    #[serde(rename = "unique", default, skip_serializing_if = "Option::is_none")]
    pub is_unique: Option<bool>,
    /// IANA time zone of the runtime
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    /// Referrer URL, empty when absent or self-referred
    #[serde(default)]
    pub referrer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer_hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer_pathname: Option<String>,
    /// Referrer named explicitly by the `ref` query parameter
    #[serde(rename = "urlReferrer", default, skip_serializing_if = "Option::is_none")]
    pub url_referrer_override: Option<String>,
    /// Capture time in milliseconds since the epoch
    #[serde(rename = "time")]
    pub timestamp: i64,
}

impl PageView {
    /// Create a view with no referrer and no ambient runtime details
    pub fn new(
        hostname: impl Into<String>,
        pathname: impl Into<String>,
        route: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            pathname: pathname.into(),
            route: route.into(),
            user_agent: None,
            viewport_width: None,
            is_unique: None,
            time_zone: None,
            referrer: String::new(),
            referrer_hostname: None,
            referrer_pathname: None,
            url_referrer_override: None,
            timestamp,
        }
    }
}

// ============================================
// Navigation
// ============================================

/// A completed route change reported by the navigation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Navigation {
    /// Route template as resolved by the router; never re-derived here
    pub route: String,
    /// Path actually shown in the address bar, including any query string
    pub as_path: String,
}

impl Navigation {
    pub fn new(route: impl Into<String>, as_path: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            as_path: as_path.into(),
        }
    }

    /// Path with everything from `?` onward removed
    pub fn pathname(&self) -> &str {
        match self.as_path.find('?') {
            Some(idx) => &self.as_path[..idx],
            None => &self.as_path,
        }
    }

    /// Raw query string (without `?` and without any fragment), if present
    pub fn query(&self) -> Option<&str> {
        let idx = self.as_path.find('?')?;
        let query = &self.as_path[idx + 1..];
        let query = match query.find('#') {
            Some(end) => &query[..end],
            None => query,
        };
        Some(query)
    }
}

// ============================================
// Wire payload
// ============================================

/// Body posted to the collection endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewBatch {
    pub public_key: String,
    pub views: Vec<PageView>,
}

impl ViewBatch {
    pub fn new(public_key: impl Into<String>, views: Vec<PageView>) -> Self {
        Self {
            public_key: public_key.into(),
            views,
        }
    }

    /// Serialize as the plain-text request body
    pub fn to_body(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_strips_query() {
        let nav = Navigation::new("/[place]", "/home?ref=example.com&x=1");
        assert_eq!(nav.pathname(), "/home");
        assert_eq!(nav.query(), Some("ref=example.com&x=1"));

        let nav = Navigation::new("/", "/");
        assert_eq!(nav.pathname(), "/");
        assert_eq!(nav.query(), None);
    }

    #[test]
    fn test_navigation_query_ignores_fragment() {
        let nav = Navigation::new("/docs", "/docs?ref=news.ycombinator.com#intro");
        assert_eq!(nav.query(), Some("ref=news.ycombinator.com"));
    }

    #[test]
    fn test_page_view_wire_names() {
        let mut view = PageView::new("example.com", "/home", "/[place]", 1_700_000_000_000);
        view.user_agent = Some("agent".to_string());
        view.viewport_width = Some(1280);
        view.is_unique = Some(true);
        view.time_zone = Some("Europe/Berlin".to_string());

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["hostname"], "example.com");
        assert_eq!(json["ua"], "agent");
        assert_eq!(json["width"], 1280);
        assert_eq!(json["unique"], true);
        assert_eq!(json["timeZone"], "Europe/Berlin");
        assert_eq!(json["referrer"], "");
        assert_eq!(json["time"], 1_700_000_000_000i64);
    }

    #[test]
    fn test_absent_fields_are_omitted() {
        let view = PageView::new("example.com", "/", "/", 0);
        let json = serde_json::to_value(&view).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("referrerHostname"));
        assert!(!obj.contains_key("referrerPathname"));
        assert!(!obj.contains_key("urlReferrer"));
        assert!(!obj.contains_key("width"));
        assert!(obj.contains_key("referrer"));
    }

    #[test]
    fn test_batch_body() {
        let batch = ViewBatch::new("pk_test", vec![PageView::new("example.com", "/a", "/a", 1)]);
        let body = batch.to_body().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["publicKey"], "pk_test");
        assert_eq!(parsed["views"][0]["pathname"], "/a");
    }
}
