/// CORS Middleware
///
/// One fixed policy for every route: methods `GET, POST, PUT, DELETE,
/// OPTIONS`, request headers `Content-Type` and `Authorization`,
/// credentials allowed. Preflight requests are answered here and never
/// reach the guard. Only listed origins are echoed back; with an empty
/// list every request carrying an `Origin` header is refused.
///
/// Refusals from the guard (401, 403, 404) are ordinary responses and get
/// the CORS headers like any other.

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::{
        header::{self, HeaderValue},
        Method,
    },
    Error, HttpResponse,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use std::sync::Arc;

pub const ALLOWED_METHODS: [&str; 5] = ["GET", "POST", "PUT", "DELETE", "OPTIONS"];
pub const ALLOWED_HEADERS: [&str; 2] = ["Content-Type", "Authorization"];
const MAX_AGE_SECONDS: &str = "1800";

pub struct Cors {
    allowed_origins: Arc<Vec<String>>,
}

impl Cors {
    pub fn new(allowed_origins: Vec<String>) -> Self {
        Self {
            allowed_origins: Arc::new(allowed_origins),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Cors
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = CorsService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(CorsService {
            service: Rc::new(service),
            allowed_origins: self.allowed_origins.clone(),
        }))
    }
}

pub struct CorsService<S> {
    service: Rc<S>,
    allowed_origins: Arc<Vec<String>>,
}

fn origin_allowed(allowed_origins: &[String], origin: &str) -> bool {
    allowed_origins.iter().any(|o| o == origin)
}

fn method_allowed(method: &str) -> bool {
    ALLOWED_METHODS.iter().any(|m| m.eq_ignore_ascii_case(method.trim()))
}

fn headers_allowed(requested: &str) -> bool {
    requested
        .split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .all(|h| ALLOWED_HEADERS.iter().any(|a| a.eq_ignore_ascii_case(h)))
}

fn add_origin_headers(headers: &mut header::HeaderMap, origin: &HeaderValue) {
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(header::VARY, HeaderValue::from_static("Origin"));
}

impl<S, B> Service<ServiceRequest> for CorsService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let origin = req.headers().get(header::ORIGIN).cloned();

        if let Some(origin) = &origin {
            let allowed = origin
                .to_str()
                .map(|o| origin_allowed(&self.allowed_origins, o))
                .unwrap_or(false);
            if !allowed {
                tracing::warn!(origin = ?origin, "Cross-origin request from unknown origin");
                let res = req.into_response(HttpResponse::Forbidden().body("Invalid CORS request"));
                return Box::pin(async move { Ok(res.map_into_right_body()) });
            }
        }

        let requested_method = req
            .headers()
            .get(header::ACCESS_CONTROL_REQUEST_METHOD)
            .map(|v| v.to_str().unwrap_or_default().to_string());

        if let (Some(origin), Some(requested_method), true) =
            (&origin, &requested_method, req.method() == Method::OPTIONS)
        {
            let requested_headers = req
                .headers()
                .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
                .map(|v| v.to_str().unwrap_or("\u{0}").to_string())
                .unwrap_or_default();

            if !method_allowed(requested_method) || !headers_allowed(&requested_headers) {
                tracing::warn!(
                    method = %requested_method,
                    headers = %requested_headers,
                    "Preflight rejected"
                );
                let res = req.into_response(HttpResponse::Forbidden().body("Invalid CORS request"));
                return Box::pin(async move { Ok(res.map_into_right_body()) });
            }

            let mut preflight = HttpResponse::Ok();
            preflight
                .insert_header((
                    header::ACCESS_CONTROL_ALLOW_METHODS,
                    ALLOWED_METHODS.join(","),
                ))
                .insert_header((
                    header::ACCESS_CONTROL_ALLOW_HEADERS,
                    ALLOWED_HEADERS.join(", "),
                ))
                .insert_header((header::ACCESS_CONTROL_MAX_AGE, MAX_AGE_SECONDS));
            let mut res = req.into_response(preflight.finish());
            add_origin_headers(res.headers_mut(), origin);
            return Box::pin(async move { Ok(res.map_into_right_body()) });
        }

        let service = self.service.clone();

        Box::pin(async move {
            let mut res = service.call(req).await?.map_into_left_body();
            if let Some(origin) = &origin {
                add_origin_headers(res.headers_mut(), origin);
            }
            Ok(res)
        })
    }
}
