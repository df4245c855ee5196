use std::sync::Arc;

use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};

use crate::auth::Claims;
use crate::error::{AppError, GatewayError};
use crate::gateway::{Forwarder, RouteEntry};

/// Default gateway handler: forward to the route the guard matched.
pub async fn forward(
    req: HttpRequest,
    body: web::Bytes,
    forwarder: web::Data<Forwarder>,
) -> Result<HttpResponse, AppError> {
    let route = req
        .extensions()
        .get::<Arc<RouteEntry>>()
        .cloned()
        .ok_or_else(|| GatewayError::NoRoute(req.path().to_string()))?;
    let claims = req.extensions().get::<Claims>().cloned();

    forwarder.forward(&req, body, &route, claims.as_ref()).await
}
