#![allow(dead_code)]

use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use serde_json::json;

use gatehouse::auth::{Principal, SigningKeys, TokenIssuer};
use gatehouse::configuration::{
    ApplicationSettings, CorsSettings, GatewaySettings, JwtSettings, PublicRuleSettings,
    RegistrySettings, RouteSettings, SeedCredential, Settings,
};
use gatehouse::startup::{build_gateway, build_login_service, run_gateway, run_login_service};

pub const PRIVATE_KEY: &str = include_str!("../fixtures/private_key.pem");
pub const PUBLIC_KEY: &str = include_str!("../fixtures/public_key.pem");
pub const FOREIGN_PRIVATE_KEY: &str = include_str!("../fixtures/foreign_private_key.pem");
pub const FOREIGN_PUBLIC_KEY: &str = include_str!("../fixtures/foreign_public_key.pem");

pub const SEED_IDENTIFIER: &str = "test12345@test.com";
pub const SEED_SECRET: &str = "test1234";

pub fn jwt_settings() -> JwtSettings {
    JwtSettings {
        private_key_pem: Some(PRIVATE_KEY.to_string()),
        private_key_path: None,
        public_key_pem: Some(PUBLIC_KEY.to_string()),
        public_key_path: None,
        access_token_expiry: 900,
        refresh_token_expiry: None,
        issuer: "self".to_string(),
        scope: "ROLE_USER".to_string(),
    }
}

pub fn test_settings() -> Settings {
    Settings {
        application: ApplicationSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            password_hash_cost: 4,
        },
        gateway: GatewaySettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            upstream_timeout_seconds: 5,
            routes: vec![],
            cors: CorsSettings::default(),
        },
        jwt: jwt_settings(),
        database: None,
        registry: RegistrySettings::default(),
        seed_credentials: vec![SeedCredential {
            identifier: SEED_IDENTIFIER.to_string(),
            secret: SEED_SECRET.to_string(),
        }],
    }
}

pub fn route(id: &str, path: &str, uri: &str) -> RouteSettings {
    RouteSettings {
        id: id.to_string(),
        path: path.to_string(),
        uri: uri.to_string(),
        public: vec![],
        required_scope: None,
    }
}

pub fn public(method: &str, path: &str) -> PublicRuleSettings {
    PublicRuleSettings {
        method: method.to_string(),
        path: path.to_string(),
    }
}

/// The public rules the gateway applies to the login service
pub fn login_route(uri: &str) -> RouteSettings {
    let mut route = route("login_route", "/api/login/**", uri);
    route.public = vec![
        public("POST", "/api/login"),
        public("POST", "/api/login/save"),
        public("POST", "/api/login/refreshToken"),
    ];
    route
}

fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    (listener, format!("http://127.0.0.1:{}", port))
}

pub async fn spawn_login_service(settings: &Settings) -> String {
    let (listener, address) = bind();
    let application = build_login_service(settings)
        .await
        .expect("Failed to build login service");
    let server = run_login_service(listener, application).expect("Failed to bind address");
    let _ = tokio::spawn(server);
    address
}

pub fn spawn_gateway(settings: &Settings) -> String {
    let (listener, address) = bind();
    let application = build_gateway(settings).expect("Failed to build gateway");
    let server = run_gateway(listener, application).expect("Failed to bind address");
    let _ = tokio::spawn(server);
    address
}

/// A backend that echoes what it received and counts requests.
pub struct TestBackend {
    pub address: String,
    hits: Arc<AtomicUsize>,
}

impl TestBackend {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn echo(req: HttpRequest, body: web::Bytes, hits: web::Data<AtomicUsize>) -> HttpResponse {
    hits.fetch_add(1, Ordering::SeqCst);

    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    HttpResponse::Ok()
        .insert_header(("X-Backend", "echo"))
        .json(json!({
            "method": req.method().as_str(),
            "path": req.path(),
            "query": req.query_string(),
            "subject": header("x-authenticated-subject"),
            "scope": header("x-authenticated-scope"),
            "authorization": header("authorization"),
            "body": String::from_utf8_lossy(&body),
        }))
}

pub fn spawn_backend() -> TestBackend {
    let (listener, address) = bind();
    let hits = Arc::new(AtomicUsize::new(0));
    let data = web::Data::from(hits.clone());

    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .default_service(web::to(echo))
    })
    .workers(1)
    .listen(listener)
    .expect("Failed to bind backend")
    .run();
    let _ = tokio::spawn(server);

    TestBackend { address, hits }
}

/// An address nothing listens on
pub fn closed_address() -> String {
    let (listener, address) = bind();
    drop(listener);
    address
}

pub fn token_signed_with(
    private_key: &str,
    public_key: &str,
    issuer: &str,
    scope: &str,
    issued_at: i64,
) -> String {
    let keys = Arc::new(
        SigningKeys::from_pem(Some(private_key.as_bytes()), public_key.as_bytes())
            .expect("Failed to load keys"),
    );
    let mut settings = jwt_settings();
    settings.issuer = issuer.to_string();
    settings.scope = scope.to_string();
    let issuer = TokenIssuer::new(keys, &settings).expect("Failed to build issuer");
    issuer
        .issue_at(&Principal::new(SEED_IDENTIFIER), issued_at)
        .expect("Failed to issue token")
        .token
}

pub fn valid_token() -> String {
    token_signed_with(
        PRIVATE_KEY,
        PUBLIC_KEY,
        "self",
        "ROLE_USER",
        chrono::Utc::now().timestamp(),
    )
}
