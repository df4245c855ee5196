/// Perimeter Guard Middleware
///
/// Matches the request against the route table, asks the access policy
/// for a decision and either answers with the refusal response or passes
/// the request on with the matched `Arc<RouteEntry>` (and `Claims`, when a
/// token was verified) in the request extensions.

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error, HttpMessage, ResponseError,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::{AppError, GatewayError};
use crate::gateway::{AccessDecision, AccessPolicy, RouteTable};

pub struct PerimeterGuard {
    routes: Arc<RouteTable>,
    policy: Arc<AccessPolicy>,
}

impl PerimeterGuard {
    pub fn new(routes: Arc<RouteTable>, policy: Arc<AccessPolicy>) -> Self {
        Self { routes, policy }
    }
}

impl<S, B> Transform<S, ServiceRequest> for PerimeterGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = PerimeterGuardService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(PerimeterGuardService {
            service: Rc::new(service),
            routes: self.routes.clone(),
            policy: self.policy.clone(),
        }))
    }
}

pub struct PerimeterGuardService<S> {
    service: Rc<S>,
    routes: Arc<RouteTable>,
    policy: Arc<AccessPolicy>,
}

impl<S, B> Service<ServiceRequest> for PerimeterGuardService<S>
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
        let path = req.path().to_string();

        let route = match self.routes.find(&path) {
            Some(route) => route,
            None => {
                tracing::info!(method = %req.method(), path = %path, "No route matched");
                let err = AppError::Gateway(GatewayError::NoRoute(path));
                return refuse(req, err);
            }
        };

        // A header that is not visible ASCII still counts as presented.
        let authorization = req
            .headers()
            .get(AUTHORIZATION)
            .map(|value| value.to_str().unwrap_or_default());

        let decision = self
            .policy
            .decide(&route, req.method(), &path, authorization);

        match decision {
            AccessDecision::Public => {
                tracing::debug!(route = %route.id, path = %path, "Public route");
            }
            AccessDecision::Authenticated(claims) => {
                tracing::debug!(route = %route.id, subject = %claims.sub, "Token accepted");
                req.extensions_mut().insert(claims);
            }
            refused => {
                tracing::warn!(
                    route = %route.id,
                    method = %req.method(),
                    path = %path,
                    decision = ?refused,
                    "Request refused at perimeter"
                );
                let err = refused
                    .into_error()
                    .unwrap_or_else(|| AppError::Internal("Inconsistent access decision".into()));
                return refuse(req, err);
            }
        }

        req.extensions_mut().insert(route);

        let service = self.service.clone();
        Box::pin(async move { service.call(req).await.map(|res| res.map_into_left_body()) })
    }
}

/// Answer with the error's response; the inner service is never called.
fn refuse<B>(
    req: ServiceRequest,
    err: AppError,
) -> LocalBoxFuture<'static, Result<ServiceResponse<EitherBody<B>>, Error>>
where
    B: 'static,
{
    let response = ResponseError::error_response(&err);
    let res = req.into_response(response).map_into_right_body();
    Box::pin(async move { Ok(res) })
}
