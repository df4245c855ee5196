/// Perimeter route table
///
/// Patterns ending in `/**` match the prefix itself and everything below
/// it. Any other pattern matches one path exactly. When several entries
/// match, the one with the longest literal part wins; an exact pattern
/// beats a prefix of the same length, and ties go to the entry listed first.

use std::sync::Arc;

use actix_web::http::Method;

use crate::configuration::RouteSettings;
use crate::error::ConfigError;

const REGISTRY_SCHEME: &str = "lb://";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPattern {
    Prefix(String),
    Exact(String),
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self, ConfigError> {
        if !pattern.starts_with('/') {
            return Err(ConfigError::InvalidValue(format!(
                "route path must start with '/': {}",
                pattern
            )));
        }

        match pattern.strip_suffix("/**") {
            Some(prefix) => Ok(PathPattern::Prefix(prefix.to_string())),
            None if pattern.contains('*') => Err(ConfigError::InvalidValue(format!(
                "only a trailing '/**' wildcard is supported: {}",
                pattern
            ))),
            None => Ok(PathPattern::Exact(pattern.to_string())),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathPattern::Exact(exact) => path == exact,
            PathPattern::Prefix(prefix) => {
                path == prefix
                    || (path.starts_with(prefix.as_str())
                        && path[prefix.len()..].starts_with('/'))
            }
        }
    }

    fn specificity(&self) -> (usize, bool) {
        match self {
            PathPattern::Exact(exact) => (exact.len(), true),
            PathPattern::Prefix(prefix) => (prefix.len(), false),
        }
    }
}

/// A method + path pair that may pass without a token
#[derive(Debug, Clone)]
pub struct PublicRule {
    pub method: Method,
    pub pattern: PathPattern,
}

impl PublicRule {
    pub fn new(method: &str, path: &str) -> Result<Self, ConfigError> {
        let method = Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| ConfigError::InvalidValue(format!("invalid HTTP method: {}", method)))?;
        Ok(Self {
            method,
            pattern: PathPattern::parse(path)?,
        })
    }

    pub fn matches(&self, method: &Method, path: &str) -> bool {
        &self.method == method && self.pattern.matches(path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    /// Base URL requests are forwarded to
    Url(String),
    /// Service name resolved through the registry
    Service(String),
    /// Handled by the process hosting the guard
    Local,
}

impl RouteTarget {
    pub fn parse(uri: &str) -> Result<Self, ConfigError> {
        if let Some(service) = uri.strip_prefix(REGISTRY_SCHEME) {
            let service = service.trim_end_matches('/');
            if service.is_empty() {
                return Err(ConfigError::InvalidValue(format!("empty service name: {}", uri)));
            }
            return Ok(RouteTarget::Service(service.to_string()));
        }

        if uri.starts_with("http://") || uri.starts_with("https://") {
            return Ok(RouteTarget::Url(uri.trim_end_matches('/').to_string()));
        }

        Err(ConfigError::InvalidValue(format!("unsupported route uri: {}", uri)))
    }
}

#[derive(Debug, Clone)]
pub struct RouteEntry {
    pub id: String,
    pub pattern: PathPattern,
    pub target: RouteTarget,
    pub public: Vec<PublicRule>,
    pub required_scope: Option<String>,
}

impl RouteEntry {
    pub fn from_settings(settings: &RouteSettings) -> Result<Self, ConfigError> {
        let public = settings
            .public
            .iter()
            .map(|rule| PublicRule::new(&rule.method, &rule.path))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: settings.id.clone(),
            pattern: PathPattern::parse(&settings.path)?,
            target: RouteTarget::parse(&settings.uri)?,
            public,
            required_scope: settings
                .required_scope
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        })
    }

    pub fn is_public(&self, method: &Method, path: &str) -> bool {
        self.public.iter().any(|rule| rule.matches(method, path))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: Vec<Arc<RouteEntry>>,
}

impl RouteTable {
    pub fn new(entries: Vec<RouteEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn from_settings(routes: &[RouteSettings]) -> Result<Self, ConfigError> {
        let entries = routes
            .iter()
            .map(RouteEntry::from_settings)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most specific entry matching `path`
    pub fn find(&self, path: &str) -> Option<Arc<RouteEntry>> {
        let mut best: Option<&Arc<RouteEntry>> = None;
        for entry in self.entries.iter().filter(|e| e.pattern.matches(path)) {
            let better = match best {
                None => true,
                Some(current) => entry.pattern.specificity() > current.pattern.specificity(),
            };
            if better {
                best = Some(entry);
            }
        }
        best.cloned()
    }
}
