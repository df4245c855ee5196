use actix_web::dev::Server;
use actix_web::middleware::{DefaultHeaders, Logger};
use actix_web::{web, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{PasswordVerifier, RefreshTokenStore, SigningKeys, TokenIssuer, TokenVerifier};
use crate::configuration::Settings;
use crate::error::AppError;
use crate::gateway::{
    AccessPolicy, Forwarder, PathPattern, PublicRule, RouteEntry, RouteTable, RouteTarget,
    StaticRegistry,
};
use crate::logger::LoggerMiddleware;
use crate::middleware::{Cors, PerimeterGuard};
use crate::routes::{forward, health_check, login, logout, refresh_token, save};
use crate::session::LoginService;
use crate::store::memory::{InMemoryCredentialStore, InMemoryRefreshTokenRepository};
use crate::store::postgres::{PgCredentialStore, PgRefreshTokenRepository};
use crate::store::{CredentialStore, RefreshTokenRepository};

pub const SERVICE_ID_HEADER: &str = "X-Service-Id";
const LOGIN_SERVICE_ID: &str = "login-service";
const MAX_FORWARDED_BODY: usize = 10 * 1024 * 1024;

/// Everything the login service needs to serve requests
pub struct LoginApplication {
    pub service: LoginService,
    pub verifier: Arc<TokenVerifier>,
    pub allowed_origins: Vec<String>,
}

/// Load keys, open the stores and register the seed credentials.
///
/// Without a `database` section both stores are in memory.
pub async fn build_login_service(settings: &Settings) -> Result<LoginApplication, AppError> {
    let keys = Arc::new(SigningKeys::from_settings(&settings.jwt)?);

    let (credentials, refresh_repository): (
        Arc<dyn CredentialStore>,
        Arc<dyn RefreshTokenRepository>,
    ) = match &settings.database {
        Some(database) => {
            tracing::info!("Attempting to connect to database");
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(&database.connection_string())
                .await?;
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|e| AppError::Internal(format!("Migration failed: {}", e)))?;
            tracing::info!("Database connection pool created successfully");
            (
                Arc::new(PgCredentialStore::new(pool.clone())),
                Arc::new(PgRefreshTokenRepository::new(pool)),
            )
        }
        None => {
            tracing::warn!("No database configured, records are kept in memory");
            (
                Arc::new(InMemoryCredentialStore::new()),
                Arc::new(InMemoryRefreshTokenRepository::new()),
            )
        }
    };

    let hash_cost = settings.application.password_hash_cost;
    let issuer = TokenIssuer::new(keys.clone(), &settings.jwt)?;
    let password_verifier = Arc::new(PasswordVerifier::new(credentials.clone(), hash_cost)?);
    let refresh_tokens = RefreshTokenStore::new(
        refresh_repository,
        settings.jwt.refresh_token_expiry.map(chrono::Duration::seconds),
    );

    let service = LoginService::new(
        password_verifier,
        credentials,
        issuer,
        refresh_tokens,
        hash_cost,
    );
    service.seed(&settings.seed_credentials).await?;

    Ok(LoginApplication {
        service,
        verifier: Arc::new(TokenVerifier::new(keys, settings.jwt.issuer.clone())),
        allowed_origins: settings.gateway.cors.allowed_origins.clone(),
    })
}

/// The login service guards itself: everything except login, registration
/// and refresh needs a bearer token.
pub fn login_service_routes() -> RouteTable {
    let public = ["/api/login", "/api/login/save", "/api/login/refreshToken"]
        .iter()
        .map(|path| PublicRule {
            method: actix_web::http::Method::POST,
            pattern: PathPattern::Exact(path.to_string()),
        })
        .collect();

    RouteTable::new(vec![RouteEntry {
        id: LOGIN_SERVICE_ID.to_string(),
        pattern: PathPattern::Prefix(String::new()),
        target: RouteTarget::Local,
        public,
        required_scope: None,
    }])
}

pub fn run_login_service(
    listener: TcpListener,
    application: LoginApplication,
) -> Result<Server, std::io::Error> {
    let service = web::Data::new(application.service);
    let routes = Arc::new(login_service_routes());
    let policy = Arc::new(AccessPolicy::new(application.verifier));
    let allowed_origins = application.allowed_origins;

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(Logger::default())
            .wrap(LoggerMiddleware)
            .wrap(DefaultHeaders::new().add((SERVICE_ID_HEADER, LOGIN_SERVICE_ID)))

            // Shared state
            .app_data(service.clone())

            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/api/login")
                    .wrap(PerimeterGuard::new(routes.clone(), policy.clone()))
                    .wrap(Cors::new(allowed_origins.clone()))
                    .route("", web::post().to(login))
                    .route("/save", web::post().to(save))
                    .route("/refreshToken", web::post().to(refresh_token))
                    .route("/logout", web::post().to(logout)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}

pub struct GatewayApplication {
    pub routes: Arc<RouteTable>,
    pub policy: Arc<AccessPolicy>,
    pub forwarder: Forwarder,
    pub allowed_origins: Vec<String>,
}

/// Verify-only keys, route table and registry for the gateway.
pub fn build_gateway(settings: &Settings) -> Result<GatewayApplication, AppError> {
    let keys = Arc::new(SigningKeys::from_settings(&settings.jwt)?);
    let verifier = Arc::new(TokenVerifier::new(keys, settings.jwt.issuer.clone()));

    let routes = RouteTable::from_settings(&settings.gateway.routes)?;
    if routes.is_empty() {
        tracing::warn!("Route table is empty, every request will be rejected");
    }

    let registry = Arc::new(StaticRegistry::from_settings(&settings.registry));
    let forwarder = Forwarder::new(
        registry,
        Duration::from_secs(settings.gateway.upstream_timeout_seconds),
    )?;

    tracing::info!(routes = routes.len(), "Gateway configured");

    Ok(GatewayApplication {
        routes: Arc::new(routes),
        policy: Arc::new(AccessPolicy::new(verifier)),
        forwarder,
        allowed_origins: settings.gateway.cors.allowed_origins.clone(),
    })
}

pub fn run_gateway(
    listener: TcpListener,
    application: GatewayApplication,
) -> Result<Server, std::io::Error> {
    let forwarder = web::Data::new(application.forwarder);
    let routes = application.routes;
    let policy = application.policy;
    let allowed_origins = application.allowed_origins;

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(LoggerMiddleware)
            .app_data(forwarder.clone())
            .app_data(web::PayloadConfig::new(MAX_FORWARDED_BODY))
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("")
                    .wrap(PerimeterGuard::new(routes.clone(), policy.clone()))
                    .wrap(Cors::new(allowed_origins.clone()))
                    .default_service(web::to(forward)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
