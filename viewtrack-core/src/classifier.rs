//! Page view classification
//!
//! Turns a [`Navigation`] plus the ambient [`Environment`] into a [`PageView`]:
//! query stripping, self-referral suppression, the explicit `ref` override and
//! the session uniqueness rule.
//!
//! Malformed input never fails classification. A referrer that does not parse
//! as a URL is kept verbatim but yields no referrer hostname or pathname.

use url::Url;

use crate::environment::Environment;
use crate::types::{Navigation, PageView};

/// Query parameter naming an upstream referrer explicitly
pub const REFERRER_QUERY_PARAM: &str = "ref";

/// Classify a navigation.
///
/// `has_prior_view` is the session's first-view flag; when it is set the view
/// is never unique.
pub fn classify(env: &dyn Environment, nav: &Navigation, has_prior_view: bool) -> PageView {
    let hostname = env.hostname();
    let referrer = ReferrerInfo::detect(env.referrer(), &hostname);
    let url_referrer = nav.query().and_then(referrer_override);

    let is_unique = !has_prior_view && !referrer.is_self;

    let (referrer_hostname, referrer_pathname) = match &url_referrer {
        Some(source) => (Some(source.clone()), None),
        None => (referrer.hostname.clone(), referrer.pathname.clone()),
    };

    PageView {
        hostname,
        pathname: nav.pathname().to_string(),
        route: nav.route.clone(),
        user_agent: env.user_agent(),
        viewport_width: env.viewport_width(),
        is_unique: Some(is_unique),
        time_zone: env.time_zone(),
        referrer: referrer.url,
        referrer_hostname,
        referrer_pathname,
        url_referrer_override: url_referrer,
        timestamp: env.now_ms(),
    }
}

/// Value of the `ref` query parameter, if present and non-empty
pub fn referrer_override(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == REFERRER_QUERY_PARAM)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Detected referrer after self-referral suppression
#[derive(Debug, Default, PartialEq, Eq)]
struct ReferrerInfo {
    /// Referrer URL, empty when absent or self-referred
    url: String,
    hostname: Option<String>,
    pathname: Option<String>,
    /// The raw referrer pointed at the current host
    is_self: bool,
}

impl ReferrerInfo {
    fn detect(raw: Option<String>, current_host: &str) -> Self {
        let raw = match raw.map(|r| r.trim().to_string()) {
            Some(r) if !r.is_empty() => r,
            _ => return Self::default(),
        };

        let parsed = match Url::parse(&raw) {
            Ok(url) => url,
            Err(e) => {
                tracing::trace!(referrer = %raw, error = %e, "Unparseable referrer");
                return Self {
                    url: raw,
                    ..Self::default()
                };
            }
        };

        let host = parsed.host_str().map(str::to_string);
        if host
            .as_deref()
            .is_some_and(|h| h.eq_ignore_ascii_case(current_host))
        {
            return Self {
                is_self: true,
                ..Self::default()
            };
        }

        Self {
            url: raw,
            pathname: host.as_ref().map(|_| parsed.path().to_string()),
            hostname: host,
            is_self: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::StaticEnvironment;

    #[test]
    fn test_classify_without_referrer() {
        let env = StaticEnvironment::new("localhost");
        let view = classify(&env, &Navigation::new("/[place]", "/home"), false);

        assert_eq!(view.hostname, "localhost");
        assert_eq!(view.pathname, "/home");
        assert_eq!(view.route, "/[place]");
        assert_eq!(view.referrer, "");
        assert_eq!(view.referrer_hostname, None);
        assert_eq!(view.referrer_pathname, None);
        assert_eq!(view.url_referrer_override, None);
        assert_eq!(view.is_unique, Some(true));
        assert_eq!(view.timestamp, env.now_ms());
        assert_eq!(view.viewport_width, Some(1024));
    }

    #[test]
    fn test_query_is_stripped_and_route_kept() {
        let env = StaticEnvironment::new("example.com");
        let view = classify(&env, &Navigation::new("/posts/[id]", "/posts/7?utm=x"), false);
        assert_eq!(view.pathname, "/posts/7");
        assert_eq!(view.route, "/posts/[id]");
    }

    #[test]
    fn test_external_referrer() {
        let env = StaticEnvironment::new("example.com")
            .with_referrer("https://news.ycombinator.com/item?id=1");
        let view = classify(&env, &Navigation::new("/", "/"), false);

        assert_eq!(view.referrer, "https://news.ycombinator.com/item?id=1");
        assert_eq!(view.referrer_hostname.as_deref(), Some("news.ycombinator.com"));
        assert_eq!(view.referrer_pathname.as_deref(), Some("/item"));
        assert_eq!(view.is_unique, Some(true));
    }

    #[test]
    fn test_self_referral_is_suppressed() {
        let env = StaticEnvironment::new("example.com").with_referrer("https://EXAMPLE.com/about");
        let view = classify(&env, &Navigation::new("/", "/"), false);

        assert_eq!(view.referrer, "");
        assert_eq!(view.referrer_hostname, None);
        assert_eq!(view.referrer_pathname, None);
        assert_eq!(view.is_unique, Some(false));
    }

    #[test]
    fn test_ref_param_overrides_referrer() {
        let env = StaticEnvironment::new("example.com").with_referrer("https://google.com/search");
        let view = classify(&env, &Navigation::new("/", "/?ref=producthunt.com"), false);

        assert_eq!(view.url_referrer_override.as_deref(), Some("producthunt.com"));
        assert_eq!(view.referrer_hostname.as_deref(), Some("producthunt.com"));
        assert_eq!(view.referrer_pathname, None);
        assert_eq!(view.referrer, "https://google.com/search");
        assert_eq!(view.pathname, "/");
    }

    #[test]
    fn test_empty_ref_param_is_ignored() {
        assert_eq!(referrer_override("ref=&x=1"), None);
        assert_eq!(referrer_override("x=1"), None);
        assert_eq!(
            referrer_override("a=b&ref=newsletter%20june"),
            Some("newsletter june".to_string())
        );
    }

    #[test]
    fn test_prior_view_is_never_unique() {
        let env = StaticEnvironment::new("example.com").with_referrer("https://other.org/");
        let view = classify(&env, &Navigation::new("/", "/"), true);
        assert_eq!(view.is_unique, Some(false));
    }

    #[test]
    fn test_malformed_referrer_degrades() {
        let env = StaticEnvironment::new("example.com").with_referrer("not a url");
        let view = classify(&env, &Navigation::new("/", "/"), false);

        assert_eq!(view.referrer, "not a url");
        assert_eq!(view.referrer_hostname, None);
        assert_eq!(view.referrer_pathname, None);
        assert_eq!(view.is_unique, Some(true));
    }
}
