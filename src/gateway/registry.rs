/// Service registry
///
/// Maps a logical service name (`lb://employee-service`) to a live
/// instance base URL. `StaticRegistry` serves a fixed instance list from
/// configuration and rotates through it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::configuration::RegistrySettings;
use crate::error::GatewayError;

#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Base URL of one live instance, or `ServiceUnavailable`.
    async fn resolve(&self, service: &str) -> Result<String, GatewayError>;
}

struct Instances {
    urls: Vec<String>,
    cursor: AtomicUsize,
}

#[derive(Default)]
pub struct StaticRegistry {
    services: HashMap<String, Instances>,
}

impl StaticRegistry {
    pub fn new(services: HashMap<String, Vec<String>>) -> Self {
        let services = services
            .into_iter()
            .map(|(name, urls)| {
                let urls = urls
                    .into_iter()
                    .map(|url| url.trim_end_matches('/').to_string())
                    .filter(|url| !url.is_empty())
                    .collect();
                (
                    name,
                    Instances {
                        urls,
                        cursor: AtomicUsize::new(0),
                    },
                )
            })
            .collect();
        Self { services }
    }

    pub fn from_settings(settings: &RegistrySettings) -> Self {
        Self::new(settings.services.clone())
    }
}

#[async_trait]
impl ServiceRegistry for StaticRegistry {
    async fn resolve(&self, service: &str) -> Result<String, GatewayError> {
        let instances = self
            .services
            .get(service)
            .filter(|instances| !instances.urls.is_empty())
            .ok_or_else(|| GatewayError::ServiceUnavailable(service.to_string()))?;

        let index = instances.cursor.fetch_add(1, Ordering::Relaxed) % instances.urls.len();
        Ok(instances.urls[index].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> StaticRegistry {
        let mut services = HashMap::new();
        services.insert(
            "employee-service".to_string(),
            vec!["http://10.0.0.1:8081/".to_string(), "http://10.0.0.2:8081".to_string()],
        );
        services.insert("drained".to_string(), vec![]);
        StaticRegistry::new(services)
    }

    #[tokio::test]
    async fn test_resolve_rotates_through_instances() {
        let registry = registry();

        let first = registry.resolve("employee-service").await.unwrap();
        let second = registry.resolve("employee-service").await.unwrap();
        let third = registry.resolve("employee-service").await.unwrap();

        assert_eq!(first, "http://10.0.0.1:8081");
        assert_eq!(second, "http://10.0.0.2:8081");
        assert_eq!(third, first);
    }

    #[tokio::test]
    async fn test_unknown_or_empty_service_is_unavailable() {
        let registry = registry();

        assert_eq!(
            registry.resolve("missing").await,
            Err(GatewayError::ServiceUnavailable("missing".to_string()))
        );
        assert!(registry.resolve("drained").await.is_err());
    }
}
