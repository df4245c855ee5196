/// Login Routes
///
/// Login, credential registration, refresh-token exchange and logout.
/// Mounted under `/api/login`.

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::auth::Claims;
use crate::error::{AppError, AuthError, ErrorContext};
use crate::session::LoginService;
use crate::validators::{is_valid_identifier, is_valid_secret};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Login / registration payload
#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "email")]
    pub identifier: String,
    #[serde(alias = "password")]
    pub secret: String,
    /// Also issue a refresh token
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Deserialize)]
pub struct RefreshTokenRequest {
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
    #[serde(alias = "email")]
    pub identifier: String,
}

#[derive(Deserialize)]
pub struct LogoutRequest {
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

/// POST /api/login
pub async fn login(
    form: web::Json<LoginRequest>,
    service: web::Data<LoginService>,
) -> Result<HttpResponse, AppError> {
    let response = service
        .login(&form.identifier, &form.secret, form.refresh)
        .await?;

    Ok(HttpResponse::Ok().json(response))
}

/// POST /api/login/save
pub async fn save(
    form: web::Json<LoginRequest>,
    service: web::Data<LoginService>,
) -> Result<HttpResponse, AppError> {
    let ctx = ErrorContext::new("save_login").with_identifier(form.identifier.as_str());

    let identifier = is_valid_identifier(&form.identifier).map_err(|e| {
        let err = AppError::from(e);
        ctx.log_error(&err);
        err
    })?;
    is_valid_secret(&form.secret).map_err(|e| {
        let err = AppError::from(e);
        ctx.log_error(&err);
        err
    })?;

    let secret_hash = service.hash_secret(&form.secret).await?;

    match service.register(&identifier, &secret_hash).await {
        Ok(()) => Ok(HttpResponse::Ok()
            .content_type(TEXT_PLAIN)
            .body("Login information saved successfully.")),
        Err(AppError::Auth(conflict @ AuthError::AlreadyExists(_))) => {
            tracing::info!(request_id = %ctx.request_id, identifier = %identifier, "Duplicate registration");
            Ok(HttpResponse::Conflict()
                .content_type(TEXT_PLAIN)
                .body(conflict.to_string()))
        }
        Err(e) => {
            ctx.log_error(&e);
            Err(e)
        }
    }
}

/// POST /api/login/refreshToken
pub async fn refresh_token(
    form: web::Json<RefreshTokenRequest>,
    service: web::Data<LoginService>,
) -> Result<HttpResponse, AppError> {
    let response = service.refresh(&form.refresh_token, &form.identifier).await?;

    Ok(HttpResponse::Ok().json(response))
}

/// POST /api/login/logout (token required)
pub async fn logout(
    form: web::Json<LogoutRequest>,
    claims: web::ReqData<Claims>,
    service: web::Data<LoginService>,
) -> Result<HttpResponse, AppError> {
    service.logout(&form.refresh_token, &claims.sub).await?;

    tracing::info!(subject = %claims.sub, "Logged out");

    Ok(HttpResponse::Ok()
        .content_type(TEXT_PLAIN)
        .body("Refresh token deleted successfully."))
}
