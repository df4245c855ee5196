use config::ConfigError;
use std::collections::HashMap;

#[derive(serde::Deserialize, Clone, Debug)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub gateway: GatewaySettings,
    pub jwt: JwtSettings,
    /// Absent: credential and refresh-token records live in memory.
    #[serde(default)]
    pub database: Option<DatabaseSettings>,
    #[serde(default)]
    pub registry: RegistrySettings,
    #[serde(default = "default_seed_credentials")]
    pub seed_credentials: Vec<SeedCredential>,
}

/// Login service listener and hashing parameters
#[derive(serde::Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    #[serde(default = "default_hash_cost")]
    pub password_hash_cost: u32,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct GatewaySettings {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_seconds: u64,
    #[serde(default)]
    pub routes: Vec<RouteSettings>,
    #[serde(default)]
    pub cors: CorsSettings,
}

/// One entry of the perimeter route table.
///
/// `uri` is either a direct base URL (`http://login-service:8080`) or a
/// registry reference (`lb://employee-service`).
#[derive(serde::Deserialize, Clone, Debug)]
pub struct RouteSettings {
    pub id: String,
    pub path: String,
    pub uri: String,
    #[serde(default)]
    pub public: Vec<PublicRuleSettings>,
    #[serde(default)]
    pub required_scope: Option<String>,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct PublicRuleSettings {
    pub method: String,
    pub path: String,
}

/// Empty `allowed_origins` means any origin is echoed back.
#[derive(serde::Deserialize, Clone, Debug, Default)]
pub struct CorsSettings {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

#[derive(serde::Deserialize, Clone, Debug, Default)]
pub struct RegistrySettings {
    /// service name -> instance base URLs
    #[serde(default)]
    pub services: HashMap<String, Vec<String>>,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }
}

/// JWT signing settings
///
/// Each key may be given inline (`*_pem`) or as a file path (`*_path`).
/// The gateway only needs the public half.
#[derive(serde::Deserialize, Clone, Debug)]
pub struct JwtSettings {
    #[serde(default)]
    pub private_key_pem: Option<String>,
    #[serde(default)]
    pub private_key_path: Option<String>,
    #[serde(default)]
    pub public_key_pem: Option<String>,
    #[serde(default)]
    pub public_key_path: Option<String>,
    pub access_token_expiry: i64,   // seconds (e.g., 900 for 15 minutes)
    #[serde(default)]
    pub refresh_token_expiry: Option<i64>,  // seconds, unset = no expiry
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_scope")]
    pub scope: String,
}

/// Credential registered at startup when missing.
#[derive(serde::Deserialize, Clone)]
pub struct SeedCredential {
    pub identifier: String,
    pub secret: String,
}

impl std::fmt::Debug for SeedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedCredential")
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .finish()
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_hash_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

fn default_upstream_timeout() -> u64 {
    30
}

fn default_issuer() -> String {
    "self".to_string()
}

fn default_scope() -> String {
    "ROLE_USER".to_string()
}

fn default_seed_credentials() -> Vec<SeedCredential> {
    vec![SeedCredential {
        identifier: "test12345@test.com".to_string(),
        secret: "test1234".to_string(),
    }]
}

/// Reads `configuration.{yaml,toml,json}` from the working directory, then
/// applies `APP_`-prefixed environment overrides (`APP_JWT__ISSUER=...`).
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;
    settings.try_deserialize::<Settings>()
}
