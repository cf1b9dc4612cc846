//! Path-prefix routing
//!
//! `/auth` always routes to the in-process issuer. Other prefixes come from
//! `UPSTREAMS` (`/dashboard=http://127.0.0.1:8081,...`). The longest matching
//! prefix wins, and prefixes only match on segment boundaries, so `/dash`
//! does not match `/dashboard`.
//!
//! The public allowlist only applies to upstream routes. Issuer endpoints
//! authenticate themselves, so an allowlist entry under `/auth` is rejected.

use reqwest::Url;

use crate::types::LintelError;

/// Path prefix served by the issuer
pub const ISSUER_PREFIX: &str = "/auth";

/// Where a request goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    /// Handled in-process by the identity issuer
    Issuer,
    /// Forwarded to this base URL
    Upstream(String),
}

#[derive(Debug, Clone)]
struct Route {
    prefix: String,
    target: RouteTarget,
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    /// Longest prefix first
    routes: Vec<Route>,
    public: Vec<String>,
}

impl RouteTable {
    pub fn parse(upstreams: &str, public_routes: &str) -> Result<Self, LintelError> {
        let mut routes = vec![Route {
            prefix: ISSUER_PREFIX.to_string(),
            target: RouteTarget::Issuer,
        }];

        for entry in upstreams.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (prefix, url) = entry.split_once('=').ok_or_else(|| {
                LintelError::Config(format!("Upstream {entry:?} must be prefix=url"))
            })?;
            let prefix = normalize_prefix(prefix)?;
            if prefix_matches(ISSUER_PREFIX, &prefix) {
                return Err(LintelError::Config(format!(
                    "Upstream prefix {prefix} overlaps the issuer routes"
                )));
            }
            if routes.iter().any(|r| r.prefix == prefix) {
                return Err(LintelError::Config(format!("Duplicate upstream prefix {prefix}")));
            }

            let url = url.trim();
            let parsed = Url::parse(url)
                .map_err(|e| LintelError::Config(format!("Invalid upstream URL {url:?}: {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(LintelError::Config(format!(
                    "Upstream URL {url:?} must be http or https"
                )));
            }

            routes.push(Route {
                prefix,
                target: RouteTarget::Upstream(url.trim_end_matches('/').to_string()),
            });
        }

        routes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));

        let public = public_routes
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(normalize_prefix)
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(prefix) = public.iter().find(|p| prefix_matches(ISSUER_PREFIX, p)) {
            return Err(LintelError::Config(format!(
                "Public route {prefix} is an issuer route; issuer endpoints authenticate themselves"
            )));
        }

        Ok(Self { routes, public })
    }

    /// Target for a request path, by longest matching prefix
    pub fn resolve(&self, path: &str) -> Option<&RouteTarget> {
        self.routes
            .iter()
            .find(|route| prefix_matches(&route.prefix, path))
            .map(|route| &route.target)
    }

    /// Whether the path skips token verification
    pub fn is_public(&self, path: &str) -> bool {
        self.public.iter().any(|prefix| prefix_matches(prefix, path))
    }

    /// Configured upstream prefixes, for the startup banner
    pub fn upstreams(&self) -> impl Iterator<Item = (&str, &str)> {
        self.routes.iter().filter_map(|route| match route.target {
            RouteTarget::Upstream(ref url) => Some((route.prefix.as_str(), url.as_str())),
            RouteTarget::Issuer => None,
        })
    }
}

fn normalize_prefix(prefix: &str) -> Result<String, LintelError> {
    let prefix = prefix.trim();
    if !prefix.starts_with('/') {
        return Err(LintelError::Config(format!(
            "Route prefix {prefix:?} must start with '/'"
        )));
    }
    if prefix.len() > 1 {
        Ok(prefix.trim_end_matches('/').to_string())
    } else {
        Ok(prefix.to_string())
    }
}

fn prefix_matches(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return path.starts_with('/');
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteTable {
        RouteTable::parse(
            "/dashboard=http://127.0.0.1:8081/, /dashboard/admin=http://10.0.0.2:9000",
            "/dashboard/public,/health",
        )
        .unwrap()
    }

    #[test]
    fn test_longest_prefix_wins() {
        let routes = table();
        assert_eq!(
            routes.resolve("/dashboard/entries"),
            Some(&RouteTarget::Upstream("http://127.0.0.1:8081".into()))
        );
        assert_eq!(
            routes.resolve("/dashboard/admin/users"),
            Some(&RouteTarget::Upstream("http://10.0.0.2:9000".into()))
        );
        assert_eq!(routes.resolve("/auth/login"), Some(&RouteTarget::Issuer));
    }

    #[test]
    fn test_segment_boundaries() {
        let routes = table();
        assert!(routes.resolve("/dashboards").is_none());
        assert!(routes.resolve("/authx").is_none());
        assert!(routes.resolve("/dashboard").is_some());
        assert!(routes.resolve("/other").is_none());
    }

    #[test]
    fn test_public_routes() {
        let routes = table();
        assert!(routes.is_public("/dashboard/public/about"));
        assert!(routes.is_public("/health"));
        assert!(!routes.is_public("/dashboard/publicx"));
        assert!(!routes.is_public("/dashboard/entries"));
        assert!(!routes.is_public("/auth/login"));
    }

    #[test]
    fn test_invalid_configs() {
        assert!(RouteTable::parse("dashboard=http://x", "").is_err());
        assert!(RouteTable::parse("/dashboard", "").is_err());
        assert!(RouteTable::parse("/dashboard=ftp://x", "").is_err());
        assert!(RouteTable::parse("/auth/extra=http://x", "").is_err());
        assert!(RouteTable::parse("/a=http://x,/a=http://y", "").is_err());
        assert!(RouteTable::parse("", "health").is_err());
        assert!(RouteTable::parse("", "/auth/login").is_err());
        assert!(RouteTable::parse("", "/auth").is_err());
    }

    #[test]
    fn test_catch_all_upstream() {
        let routes = RouteTable::parse("/=http://backend:80", "").unwrap();
        assert_eq!(routes.resolve("/auth/me"), Some(&RouteTarget::Issuer));
        assert_eq!(
            routes.resolve("/anything"),
            Some(&RouteTarget::Upstream("http://backend:80".into()))
        );
    }
}
