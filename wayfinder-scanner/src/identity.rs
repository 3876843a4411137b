// Resource identity: turns whatever the address bar says into a stable key.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use url::Url;

/// Query parameters that change between visits without changing the screen.
pub const DEFAULT_VOLATILE_PARAMS: &[&str] = &[
    "ts",
    "t",
    "_",
    "timestamp",
    "cache",
    "cachebuster",
    "nocache",
    "rnd",
    "random",
    "fbclid",
    "gclid",
    "msclkid",
    "sessionid",
    "sid",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalId(String);

impl CanonicalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A logical page observed after a navigation attempt. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigableResource {
    pub canonical_id: CanonicalId,
    pub raw_location: String,
    pub route_fragment: Option<String>,
    /// Identity of the hosting document with any route fragment removed.
    pub document_id: CanonicalId,
}

#[derive(Debug, Clone)]
pub struct ResourceIdentity {
    volatile_params: HashSet<String>,
}

impl ResourceIdentity {
    pub fn new() -> Self {
        Self::with_volatile_params(DEFAULT_VOLATILE_PARAMS.iter().map(|p| p.to_string()))
    }

    pub fn with_volatile_params<I>(params: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            volatile_params: params.into_iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    pub fn canonicalize(&self, raw_location: &str, prior_anchor: Option<&str>) -> CanonicalId {
        self.observe(raw_location, prior_anchor).canonical_id
    }

    /// Canonicalize and keep the pieces the visited set needs.
    pub fn observe(&self, raw_location: &str, prior_anchor: Option<&str>) -> NavigableResource {
        let Some(url) = self.parse(raw_location, prior_anchor) else {
            let id = fallback_id(raw_location);
            return NavigableResource {
                canonical_id: id.clone(),
                raw_location: raw_location.to_string(),
                route_fragment: None,
                document_id: id,
            };
        };

        let document = self.document_key(&url);
        let route = url.fragment().and_then(|f| self.route_key(f));

        let canonical = match &route {
            Some(route) => format!("{}#{}", document, route),
            None => document.clone(),
        };

        NavigableResource {
            canonical_id: CanonicalId(canonical),
            raw_location: raw_location.to_string(),
            route_fragment: route,
            document_id: CanonicalId(document),
        }
    }

    fn parse(&self, raw: &str, prior_anchor: Option<&str>) -> Option<Url> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match Url::parse(raw) {
            Ok(url) => Some(url),
            Err(_) => {
                let anchor = Url::parse(prior_anchor?).ok()?;
                anchor.join(raw).ok()
            }
        }
    }

    fn is_volatile(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        key.starts_with("utm_") || self.volatile_params.contains(&key)
    }

    fn stable_query<'a, I>(&self, pairs: I) -> Option<String>
    where
        I: Iterator<Item = (std::borrow::Cow<'a, str>, std::borrow::Cow<'a, str>)>,
    {
        let mut stable: Vec<(String, String)> = pairs
            .filter(|(k, _)| !self.is_volatile(k))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if stable.is_empty() {
            return None;
        }
        stable.sort();
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &stable {
            serializer.append_pair(k, v);
        }
        Some(serializer.finish())
    }

    fn document_key(&self, url: &Url) -> String {
        if url.cannot_be_a_base() {
            let mut plain = url.clone();
            plain.set_fragment(None);
            return plain.to_string();
        }

        let mut key = format!("{}://", url.scheme());
        if let Some(host) = url.host_str() {
            key.push_str(&host.to_lowercase());
        }
        if let Some(port) = url.port() {
            key.push_str(&format!(":{}", port));
        }

        let path = url.path();
        if path.len() > 1 && path.ends_with('/') {
            key.push_str(path.trim_end_matches('/'));
        } else if path.is_empty() {
            key.push('/');
        } else {
            key.push_str(path);
        }

        if let Some(query) = self.stable_query(url.query_pairs()) {
            key.push('?');
            key.push_str(&query);
        }
        key
    }

    /// `#/clients?ts=1` becomes `/clients`; plain in-page anchors are not routes.
    fn route_key(&self, fragment: &str) -> Option<String> {
        if !(fragment.starts_with('/') || fragment.starts_with("!/")) {
            return None;
        }
        let (path, query) = match fragment.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (fragment, None),
        };

        let mut route = path.to_string();
        if route.len() > 2 && route.ends_with('/') {
            route.truncate(route.trim_end_matches('/').len());
        }
        if let Some(query) = query
            && let Some(stable) = self.stable_query(url::form_urlencoded::parse(query.as_bytes()))
        {
            route.push('?');
            route.push_str(&stable);
        }
        Some(route)
    }
}

impl Default for ResourceIdentity {
    fn default() -> Self {
        Self::new()
    }
}

fn fallback_id(raw: &str) -> CanonicalId {
    let digest = Sha256::digest(raw.as_bytes());
    let hex = hex::encode(digest);
    CanonicalId(format!("raw:{}", &hex[..16]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volatile_fragment_param_is_ignored() {
        let identity = ResourceIdentity::new();
        let a = identity.canonicalize("https://x/y#/clients", None);
        let b = identity.canonicalize("https://x/y#/clients?ts=123", None);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "https://x/y#/clients");
    }

    #[test]
    fn test_stable_fragment_params_survive() {
        let identity = ResourceIdentity::new();
        let a = identity.canonicalize("https://x/y#/clients?id=5&ts=1", None);
        let b = identity.canonicalize("https://x/y#/clients?id=6", None);
        assert_ne!(a, b);
        assert_eq!(a.as_str(), "https://x/y#/clients?id=5");
    }

    #[test]
    fn test_query_params_sorted_and_tracking_dropped() {
        let identity = ResourceIdentity::new();
        let a = identity.canonicalize("https://Example.com/list?b=2&a=1&utm_source=mail", None);
        let b = identity.canonicalize("https://example.com/list?a=1&b=2", None);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "https://example.com/list?a=1&b=2");
    }

    #[test]
    fn test_default_port_and_trailing_slash() {
        let identity = ResourceIdentity::new();
        let a = identity.canonicalize("https://example.com:443/app/", None);
        let b = identity.canonicalize("https://example.com/app", None);
        assert_eq!(a, b);
        assert_eq!(
            identity.canonicalize("http://example.com:8080/", None).as_str(),
            "http://example.com:8080/"
        );
    }

    #[test]
    fn test_plain_anchor_is_not_a_route() {
        let identity = ResourceIdentity::new();
        let resource = identity.observe("https://example.com/docs#top", None);
        assert_eq!(resource.canonical_id.as_str(), "https://example.com/docs");
        assert!(resource.route_fragment.is_none());
    }

    #[test]
    fn test_fragment_and_document_ids_are_related() {
        let identity = ResourceIdentity::new();
        let resource = identity.observe("https://x/app#/tasks", None);
        assert_eq!(resource.canonical_id.as_str(), "https://x/app#/tasks");
        assert_eq!(resource.document_id.as_str(), "https://x/app");
        assert_eq!(resource.route_fragment.as_deref(), Some("/tasks"));
    }

    #[test]
    fn test_hashbang_route() {
        let identity = ResourceIdentity::new();
        let id = identity.canonicalize("https://x/app#!/inbox", None);
        assert_eq!(id.as_str(), "https://x/app#!/inbox");
    }

    #[test]
    fn test_relative_location_uses_anchor() {
        let identity = ResourceIdentity::new();
        let id = identity.canonicalize("#/clients", Some("https://x/app?ts=9"));
        assert_eq!(id.as_str(), "https://x/app#/clients");

        let id = identity.canonicalize("/reports/", Some("https://x/app"));
        assert_eq!(id.as_str(), "https://x/reports");
    }

    #[test]
    fn test_malformed_location_falls_back_to_hash() {
        let identity = ResourceIdentity::new();
        let a = identity.canonicalize("not a url at all", None);
        let b = identity.canonicalize("not a url at all", None);
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("raw:"));
        assert_eq!(a.as_str().len(), "raw:".len() + 16);

        let empty = identity.canonicalize("", Some("https://x/"));
        assert!(empty.as_str().starts_with("raw:"));
    }

    #[test]
    fn test_custom_volatile_params() {
        let identity = ResourceIdentity::with_volatile_params(vec!["page".to_string()]);
        let a = identity.canonicalize("https://x/list?page=2", None);
        let b = identity.canonicalize("https://x/list", None);
        assert_eq!(a, b);
        let c = identity.canonicalize("https://x/list?ts=2", None);
        assert_ne!(b, c);
    }
}
