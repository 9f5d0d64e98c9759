use std::sync::Arc;

use axum::{
    extract::{Extension, Json, Path, State},
    http::{header::USER_AGENT, HeaderMap, StatusCode},
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{TokenResponse, User};
use shared_models::error::AppError;
use shared_utils::jwt::validate_token as decode_access_token;

use crate::models::{
    ChangePasswordRequest, ClientInfo, DisableTwoFactorRequest, EmailRequest, EnableTwoFactorRequest,
    LoginRequest, RefreshRequest, RegisterRequest, ResetPasswordRequest, UpdateProfileRequest,
    VerifyEmailRequest,
};
use crate::services::AccountService;

type BearerHeader = Option<TypedHeader<Authorization<Bearer>>>;

fn client_info(headers: &HeaderMap) -> ClientInfo {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    ClientInfo {
        user_agent: header(USER_AGENT.as_str()),
        ip: header("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
            .or_else(|| header("x-real-ip")),
    }
}

fn bearer_token(header: BearerHeader) -> Result<String, AppError> {
    header
        .map(|TypedHeader(Authorization(bearer))| bearer.token().to_string())
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))
}

// ==============================================================================
// PUBLIC HANDLERS
// ==============================================================================

pub async fn register(
    State(config): State<Arc<AppConfig>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let account = AccountService::new(&config).register(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User registered successfully",
            "user": account
        })),
    ))
}

pub async fn login(
    State(config): State<Arc<AppConfig>>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Result<Json<Value>, AppError> {
    let tokens = AccountService::new(&config)
        .login(request, client_info(&headers))
        .await?;

    Ok(Json(json!(tokens)))
}

pub async fn refresh(
    State(config): State<Arc<AppConfig>>,
    headers: HeaderMap,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<Value>, AppError> {
    let tokens = AccountService::new(&config)
        .refresh(&request.refresh_token, client_info(&headers))
        .await?;

    Ok(Json(json!(tokens)))
}

pub async fn logout(
    State(config): State<Arc<AppConfig>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<Value>, AppError> {
    AccountService::new(&config).logout(&request.refresh_token).await?;

    Ok(Json(json!({ "message": "Logged out" })))
}

pub async fn verify_email(
    State(config): State<Arc<AppConfig>>,
    Json(request): Json<VerifyEmailRequest>,
) -> Result<Json<Value>, AppError> {
    AccountService::new(&config).verify_email(&request.token).await?;

    Ok(Json(json!({ "message": "Email verified successfully" })))
}

pub async fn resend_verification(
    State(config): State<Arc<AppConfig>>,
    Json(request): Json<EmailRequest>,
) -> Result<Json<Value>, AppError> {
    AccountService::new(&config)
        .resend_verification(&request.email)
        .await?;

    Ok(Json(json!({
        "message": "If the account exists and is unverified, a verification email has been sent"
    })))
}

pub async fn forgot_password(
    State(config): State<Arc<AppConfig>>,
    Json(request): Json<EmailRequest>,
) -> Result<Json<Value>, AppError> {
    AccountService::new(&config)
        .request_password_reset(&request.email)
        .await?;

    Ok(Json(json!({
        "message": "If the account exists, a password reset email has been sent"
    })))
}

pub async fn reset_password(
    State(config): State<Arc<AppConfig>>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<Value>, AppError> {
    AccountService::new(&config).reset_password(request).await?;

    Ok(Json(json!({ "message": "Password reset successfully" })))
}

pub async fn validate_token(
    State(config): State<Arc<AppConfig>>,
    auth: BearerHeader,
) -> Result<Json<TokenResponse>, AppError> {
    debug!("Validating token");

    let token = bearer_token(auth)?;
    let user = decode_access_token(&token, &config.jwt_secret).map_err(AppError::Auth)?;

    Ok(Json(TokenResponse {
        valid: true,
        user_id: user.id.to_string(),
        email: user.email,
        role: Some(user.role.to_string()),
    }))
}

pub async fn verify_token(
    State(config): State<Arc<AppConfig>>,
    auth: BearerHeader,
) -> Result<Json<Value>, AppError> {
    debug!("Verifying token");

    let token = bearer_token(auth)?;
    let valid = decode_access_token(&token, &config.jwt_secret).is_ok();

    Ok(Json(json!({ "valid": valid })))
}

// ==============================================================================
// AUTHENTICATED HANDLERS
// ==============================================================================

pub async fn get_profile(
    State(config): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    debug!("Getting profile for user: {}", user.id);

    let account = AccountService::new(&config).get_user(user.id).await?;
    Ok(Json(json!(account)))
}

pub async fn update_profile(
    State(config): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<Value>, AppError> {
    let account = AccountService::new(&config)
        .update_profile(user.id, request)
        .await?;

    Ok(Json(json!(account)))
}

pub async fn change_password(
    State(config): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<Value>, AppError> {
    AccountService::new(&config)
        .change_password(user.id, request)
        .await?;

    Ok(Json(json!({ "message": "Password updated successfully" })))
}

pub async fn setup_two_factor(
    State(config): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let setup = AccountService::new(&config).setup_two_factor(user.id).await?;
    Ok(Json(json!(setup)))
}

pub async fn enable_two_factor(
    State(config): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Json(request): Json<EnableTwoFactorRequest>,
) -> Result<Json<Value>, AppError> {
    AccountService::new(&config)
        .enable_two_factor(user.id, request)
        .await?;

    Ok(Json(json!({ "message": "Two-factor authentication enabled successfully" })))
}

pub async fn disable_two_factor(
    State(config): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Json(request): Json<DisableTwoFactorRequest>,
) -> Result<Json<Value>, AppError> {
    AccountService::new(&config)
        .disable_two_factor(user.id, &request.password)
        .await?;

    Ok(Json(json!({ "message": "Two-factor authentication disabled successfully" })))
}

pub async fn admin_get_user(
    State(config): State<Arc<AppConfig>>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let account = AccountService::new(&config).get_user(user_id).await?;
    Ok(Json(json!(account)))
}
