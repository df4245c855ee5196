/// Request forwarding
///
/// Rebuilds the inbound request against the resolved backend and copies
/// the backend's response back. A backend that cannot be reached is a
/// `502`; nothing is retried.

use std::sync::Arc;
use std::time::Duration;

use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};

use crate::auth::Claims;
use crate::error::{AppError, ConfigError, GatewayError};
use crate::gateway::registry::ServiceRegistry;
use crate::gateway::route::{RouteEntry, RouteTarget};

pub const SUBJECT_HEADER: &str = "x-authenticated-subject";
pub const SCOPE_HEADER: &str = "x-authenticated-scope";
const IDENTITY_HEADER_PREFIX: &str = "x-authenticated-";

// Hop-by-hop headers (RFC 7230 section 6.1) plus the ones the client
// library recomputes.
const SKIPPED_HEADERS: [&str; 10] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

fn is_skipped(name: &str) -> bool {
    SKIPPED_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h))
}

pub struct Forwarder {
    client: reqwest::Client,
    registry: Arc<dyn ServiceRegistry>,
}

impl Forwarder {
    pub fn new(registry: Arc<dyn ServiceRegistry>, timeout: Duration) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ConfigError::InvalidValue(format!("HTTP client: {}", e)))?;

        Ok(Self { client, registry })
    }

    /// Base URL for `target`
    pub async fn resolve(&self, target: &RouteTarget) -> Result<String, GatewayError> {
        match target {
            RouteTarget::Url(url) => Ok(url.clone()),
            RouteTarget::Service(name) => self.registry.resolve(name).await,
            RouteTarget::Local => Err(GatewayError::NoRoute("local route".to_string())),
        }
    }

    pub async fn forward(
        &self,
        req: &HttpRequest,
        body: web::Bytes,
        route: &RouteEntry,
        claims: Option<&Claims>,
    ) -> Result<HttpResponse, AppError> {
        let base = self.resolve(&route.target).await?;

        let mut url = format!("{}{}", base, req.uri().path());
        if !req.query_string().is_empty() {
            url.push('?');
            url.push_str(req.query_string());
        }

        let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes())
            .map_err(|e| AppError::Internal(format!("Unsupported method: {}", e)))?;

        let mut outbound = self.client.request(method, &url);
        for (name, value) in req.headers().iter() {
            let name = name.as_str();
            if is_skipped(name) || name.starts_with(IDENTITY_HEADER_PREFIX) {
                continue;
            }
            outbound = outbound.header(name, value.as_bytes());
        }
        if let Some(claims) = claims {
            outbound = outbound
                .header(SUBJECT_HEADER, claims.sub.as_str())
                .header(SCOPE_HEADER, claims.scope.as_str());
        }

        tracing::debug!(route = %route.id, upstream = %base, "Forwarding request");

        let upstream = outbound.body(body).send().await.map_err(|e| {
            tracing::warn!(route = %route.id, upstream = %base, error = %e, "Upstream request failed");
            GatewayError::Upstream(e.to_string())
        })?;

        let status = StatusCode::from_u16(upstream.status().as_u16())
            .map_err(|e| GatewayError::Upstream(format!("Invalid upstream status: {}", e)))?;

        let mut response = HttpResponse::build(status);
        for (name, value) in upstream.headers().iter() {
            if is_skipped(name.as_str()) {
                continue;
            }
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_str().as_bytes()),
                HeaderValue::from_bytes(value.as_bytes()),
            ) {
                response.append_header((name, value));
            }
        }

        let payload = upstream
            .bytes()
            .await
            .map_err(|e| GatewayError::Upstream(format!("Failed to read upstream body: {}", e)))?;

        Ok(response.body(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hop_by_hop_headers_are_skipped() {
        assert!(is_skipped("Connection"));
        assert!(is_skipped("transfer-encoding"));
        assert!(is_skipped("Host"));
        assert!(!is_skipped("authorization"));
        assert!(!is_skipped("content-type"));
    }

    #[tokio::test]
    async fn test_local_target_cannot_be_forwarded() {
        let registry = Arc::new(crate::gateway::registry::StaticRegistry::default());
        let forwarder = Forwarder::new(registry, Duration::from_secs(1)).unwrap();

        assert!(matches!(
            forwarder.resolve(&RouteTarget::Local).await,
            Err(GatewayError::NoRoute(_))
        ));
        assert_eq!(
            forwarder
                .resolve(&RouteTarget::Url("http://a:1".to_string()))
                .await
                .unwrap(),
            "http://a:1"
        );
    }
}
