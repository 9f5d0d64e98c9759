use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use reqwest::Method;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::auth::{Role, TokenKind};
use shared_utils::jwt::{decode_claims, issue_token};

use crate::models::{
    AuthError, AuthTokens, ChangePasswordRequest, ClientInfo, EnableTwoFactorRequest, LoginRequest,
    RegisterRequest, ResetPasswordRequest, SessionRecord, TokenPurpose, TwoFactorSetup,
    UpdateProfileRequest, UserAccount, VerificationRecord,
};
use crate::services::mailer::{AccountMailer, LoggingMailer};
use crate::services::password::PasswordService;
use crate::services::totp;

const ONE_TIME_TOKEN_LENGTH: usize = 32;

/// Hex-encoded SHA-256; sessions and one-time tokens store this instead of the raw value.
pub fn hash_refresh_token(token: &str) -> String {
    Sha256::digest(token.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Random alphanumeric token for e-mail verification and password reset links.
pub fn generate_one_time_token() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(ONE_TIME_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

pub struct AccountService {
    supabase: SupabaseClient,
    mailer: Arc<dyn AccountMailer>,
    jwt_secret: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl AccountService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_mailer(config, Arc::new(LoggingMailer))
    }

    pub fn with_mailer(config: &AppConfig, mailer: Arc<dyn AccountMailer>) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            mailer,
            jwt_secret: config.jwt_secret.clone(),
            access_ttl: Duration::minutes(config.access_token_ttl_minutes),
            refresh_ttl: Duration::days(config.refresh_token_ttl_days),
        }
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<UserAccount, AuthError> {
        let email = PasswordService::normalize_email(&request.email).map_err(AuthError::Validation)?;
        debug!("Registering account for {}", email);

        let name = request.name.trim();
        if name.is_empty() {
            return Err(AuthError::Validation("Name is required".to_string()));
        }

        let role = request.role.unwrap_or(Role::Patient);
        if role == Role::Admin {
            return Err(AuthError::Validation("Admin accounts cannot be self-registered".to_string()));
        }

        PasswordService::validate_password_strength(&request.password).map_err(AuthError::Validation)?;

        if self.find_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = PasswordService::hash_password(&request.password)
            .map_err(|e| AuthError::Store(format!("Failed to hash password: {}", e)))?;

        let now = Utc::now().to_rfc3339();
        let row = json!({
            "name": name,
            "email": email,
            "password_hash": password_hash,
            "role": role,
            "phone": request.phone,
            "address": request.address,
            "email_verified": false,
            "created_at": now,
            "updated_at": now
        });

        let created: Vec<UserAccount> = self
            .supabase
            .request_returning(Method::POST, "/rest/v1/users", row)
            .await?;

        let account = created
            .into_iter()
            .next()
            .ok_or_else(|| AuthError::Store("Insert returned no rows".to_string()))?;

        info!("Registered {} account {}", account.role, account.id);
        self.send_verification(&account).await?;
        Ok(account)
    }

    pub async fn login(&self, request: LoginRequest, client: ClientInfo) -> Result<AuthTokens, AuthError> {
        let email = PasswordService::normalize_email(&request.email).map_err(|_| AuthError::InvalidCredentials)?;
        debug!("Login attempt for {}", email);

        let account = self.find_by_email(&email).await?.ok_or(AuthError::InvalidCredentials)?;

        let verified = PasswordService::verify_password(&request.password, &account.password_hash)
            .map_err(|e| {
                warn!("Stored hash for {} is unreadable: {}", account.id, e);
                AuthError::InvalidCredentials
            })?;
        if !verified {
            warn!("Failed login for {}", account.id);
            return Err(AuthError::InvalidCredentials);
        }

        if !account.email_verified {
            return Err(AuthError::EmailNotVerified);
        }

        if account.two_factor_enabled {
            let code = request.two_factor_code.as_deref().ok_or(AuthError::TwoFactorRequired)?;
            let secret = account.two_factor_secret.as_deref().unwrap_or_default();
            if !totp::verify_code(secret, code, Utc::now()) {
                warn!("Rejected two-factor code for {}", account.id);
                return Err(AuthError::InvalidTwoFactorCode);
            }
        }

        let tokens = self.issue_session(account, &client).await?;

        let path = format!("/rest/v1/users?id=eq.{}", tokens.user.id);
        self.supabase
            .execute(Method::PATCH, &path, Some(json!({ "last_login": Utc::now().to_rfc3339() })))
            .await?;

        info!("User {} logged in", tokens.user.id);
        Ok(tokens)
    }

    /// Rotates a refresh session: the presented token is consumed and a new pair issued.
    pub async fn refresh(&self, refresh_token: &str, client: ClientInfo) -> Result<AuthTokens, AuthError> {
        let claims = decode_claims(refresh_token, &self.jwt_secret, TokenKind::Refresh)
            .map_err(AuthError::InvalidToken)?;

        let token_hash = hash_refresh_token(refresh_token);
        let path = format!(
            "/rest/v1/sessions?token_hash=eq.{}&select=id,user_id,expires_at",
            token_hash
        );
        let sessions: Vec<SessionRecord> = self.supabase.request(Method::GET, &path, None).await?;

        let session = sessions
            .into_iter()
            .next()
            .ok_or_else(|| AuthError::InvalidToken("Session not found".to_string()))?;

        self.delete_session(session.id).await?;

        if session.expires_at <= Utc::now() {
            return Err(AuthError::InvalidToken("Session expired".to_string()));
        }
        if session.user_id.to_string() != claims.sub {
            return Err(AuthError::InvalidToken("Session does not match token".to_string()));
        }

        let account = self.get_user(session.user_id).await?;
        debug!("Rotating refresh session for {}", account.id);
        self.issue_session(account, &client).await
    }

    /// Unknown tokens are ignored.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        let path = format!("/rest/v1/sessions?token_hash=eq.{}", hash_refresh_token(refresh_token));
        self.supabase.execute(Method::DELETE, &path, None).await?;
        debug!("Refresh session revoked");
        Ok(())
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<UserAccount, AuthError> {
        let path = format!("/rest/v1/users?id=eq.{}", user_id);
        let rows: Vec<UserAccount> = self.supabase.request(Method::GET, &path, None).await?;
        rows.into_iter().next().ok_or(AuthError::UserNotFound)
    }

    pub async fn update_profile(
        &self,
        user_id: Uuid,
        request: UpdateProfileRequest,
    ) -> Result<UserAccount, AuthError> {
        debug!("Updating profile for {}", user_id);

        if request.is_empty() {
            return Err(AuthError::Validation("No fields to update".to_string()));
        }

        let mut update = Map::new();
        if let Some(name) = request.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(AuthError::Validation("Name cannot be empty".to_string()));
            }
            update.insert("name".to_string(), json!(name));
        }
        if let Some(phone) = request.phone {
            update.insert("phone".to_string(), json!(phone));
        }
        if let Some(address) = request.address {
            update.insert("address".to_string(), json!(address));
        }
        if let Some(avatar) = request.avatar {
            update.insert("avatar".to_string(), json!(avatar));
        }
        update.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/users?id=eq.{}", user_id);
        let rows: Vec<UserAccount> = self
            .supabase
            .request_returning(Method::PATCH, &path, Value::Object(update))
            .await?;

        rows.into_iter().next().ok_or(AuthError::UserNotFound)
    }

    pub async fn change_password(&self, user_id: Uuid, request: ChangePasswordRequest) -> Result<(), AuthError> {
        let account = self.get_user(user_id).await?;

        let verified = PasswordService::verify_password(&request.current_password, &account.password_hash)
            .unwrap_or(false);
        if !verified {
            return Err(AuthError::Validation("Current password is incorrect".to_string()));
        }

        PasswordService::validate_password_strength(&request.new_password).map_err(AuthError::Validation)?;

        let password_hash = PasswordService::hash_password(&request.new_password)
            .map_err(|e| AuthError::Store(format!("Failed to hash password: {}", e)))?;

        let path = format!("/rest/v1/users?id=eq.{}", user_id);
        self.supabase
            .execute(
                Method::PATCH,
                &path,
                Some(json!({ "password_hash": password_hash, "updated_at": Utc::now().to_rfc3339() })),
            )
            .await?;

        info!("Password changed for {}", user_id);
        Ok(())
    }

    /// Marks the owner's e-mail as verified and consumes the token.
    pub async fn verify_email(&self, token: &str) -> Result<(), AuthError> {
        let record = self.consume_one_time_token(token, TokenPurpose::EmailVerification).await?;

        let path = format!("/rest/v1/users?id=eq.{}", record.user_id);
        self.supabase
            .execute(
                Method::PATCH,
                &path,
                Some(json!({ "email_verified": true, "updated_at": Utc::now().to_rfc3339() })),
            )
            .await?;

        info!("Email verified for {}", record.user_id);
        Ok(())
    }

    /// Issues a fresh verification e-mail. Unknown or already verified addresses are ignored.
    pub async fn resend_verification(&self, email: &str) -> Result<(), AuthError> {
        let Ok(email) = PasswordService::normalize_email(email) else {
            return Ok(());
        };

        match self.find_by_email(&email).await? {
            Some(account) if !account.email_verified => self.send_verification(&account).await,
            _ => {
                debug!("No unverified account for {}", email);
                Ok(())
            }
        }
    }

    /// Unknown addresses succeed silently.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let Ok(email) = PasswordService::normalize_email(email) else {
            return Ok(());
        };

        let Some(account) = self.find_by_email(&email).await? else {
            debug!("Password reset requested for unknown address");
            return Ok(());
        };

        let token = self.issue_one_time_token(account.id, TokenPurpose::PasswordReset).await?;
        if let Err(e) = self
            .mailer
            .send_password_reset_email(&account.email, &account.name, &token)
            .await
        {
            warn!("Failed to send password reset e-mail to {}: {:#}", account.id, e);
        }

        info!("Password reset issued for {}", account.id);
        Ok(())
    }

    /// Sets a new password from a reset token and revokes every refresh session of the account.
    pub async fn reset_password(&self, request: ResetPasswordRequest) -> Result<(), AuthError> {
        PasswordService::validate_password_strength(&request.new_password).map_err(AuthError::Validation)?;

        let record = self
            .consume_one_time_token(&request.token, TokenPurpose::PasswordReset)
            .await?;

        let password_hash = PasswordService::hash_password(&request.new_password)
            .map_err(|e| AuthError::Store(format!("Failed to hash password: {}", e)))?;

        let path = format!("/rest/v1/users?id=eq.{}", record.user_id);
        self.supabase
            .execute(
                Method::PATCH,
                &path,
                Some(json!({ "password_hash": password_hash, "updated_at": Utc::now().to_rfc3339() })),
            )
            .await?;

        let path = format!("/rest/v1/sessions?user_id=eq.{}", record.user_id);
        self.supabase.execute(Method::DELETE, &path, None).await?;

        info!("Password reset for {}", record.user_id);
        Ok(())
    }

    /// New secret and authenticator URI; nothing is stored until it is confirmed with a code.
    pub async fn setup_two_factor(&self, user_id: Uuid) -> Result<TwoFactorSetup, AuthError> {
        let account = self.get_user(user_id).await?;
        let secret = totp::generate_secret();
        let otpauth_url = totp::provisioning_uri(&secret, &account.email);

        Ok(TwoFactorSetup { secret, otpauth_url })
    }

    pub async fn enable_two_factor(&self, user_id: Uuid, request: EnableTwoFactorRequest) -> Result<(), AuthError> {
        let secret = request.secret.trim().to_ascii_uppercase();
        if totp::base32_decode(&secret).map_or(true, |key| key.is_empty()) {
            return Err(AuthError::Validation("Two-factor secret is not valid base32".to_string()));
        }
        if !totp::verify_code(&secret, &request.code, Utc::now()) {
            return Err(AuthError::Validation("Invalid two-factor code".to_string()));
        }

        let path = format!("/rest/v1/users?id=eq.{}", user_id);
        self.supabase
            .execute(
                Method::PATCH,
                &path,
                Some(json!({
                    "two_factor_enabled": true,
                    "two_factor_secret": secret,
                    "updated_at": Utc::now().to_rfc3339()
                })),
            )
            .await?;

        info!("Two-factor authentication enabled for {}", user_id);
        Ok(())
    }

    pub async fn disable_two_factor(&self, user_id: Uuid, password: &str) -> Result<(), AuthError> {
        let account = self.get_user(user_id).await?;

        let verified = PasswordService::verify_password(password, &account.password_hash).unwrap_or(false);
        if !verified {
            return Err(AuthError::Validation("Password is incorrect".to_string()));
        }

        let path = format!("/rest/v1/users?id=eq.{}", user_id);
        self.supabase
            .execute(
                Method::PATCH,
                &path,
                Some(json!({
                    "two_factor_enabled": false,
                    "two_factor_secret": null,
                    "updated_at": Utc::now().to_rfc3339()
                })),
            )
            .await?;

        info!("Two-factor authentication disabled for {}", user_id);
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>, AuthError> {
        let path = format!("/rest/v1/users?email=eq.{}", urlencoding::encode(email));
        let rows: Vec<UserAccount> = self.supabase.request(Method::GET, &path, None).await?;
        Ok(rows.into_iter().next())
    }

    /// Mail failures are logged; the token stays valid and can be re-sent.
    async fn send_verification(&self, account: &UserAccount) -> Result<(), AuthError> {
        let token = self
            .issue_one_time_token(account.id, TokenPurpose::EmailVerification)
            .await?;
        if let Err(e) = self
            .mailer
            .send_verification_email(&account.email, &account.name, &token)
            .await
        {
            warn!("Failed to send verification e-mail to {}: {:#}", account.id, e);
        }
        Ok(())
    }

    /// Replaces any outstanding token of the same purpose and returns the raw value.
    async fn issue_one_time_token(&self, user_id: Uuid, purpose: TokenPurpose) -> Result<String, AuthError> {
        let path = format!(
            "/rest/v1/verification_tokens?user_id=eq.{}&purpose=eq.{}",
            user_id,
            purpose.as_str()
        );
        self.supabase.execute(Method::DELETE, &path, None).await?;

        let token = generate_one_time_token();
        let row = json!({
            "user_id": user_id,
            "token_hash": hash_refresh_token(&token),
            "purpose": purpose,
            "expires_at": (Utc::now() + purpose.ttl()).to_rfc3339()
        });
        self.supabase
            .execute(Method::POST, "/rest/v1/verification_tokens", Some(row))
            .await?;

        debug!("Issued {} token for {}", purpose.as_str(), user_id);
        Ok(token)
    }

    /// Looks up and deletes a one-time token; expired tokens are deleted and rejected.
    async fn consume_one_time_token(
        &self,
        token: &str,
        purpose: TokenPurpose,
    ) -> Result<VerificationRecord, AuthError> {
        let path = format!(
            "/rest/v1/verification_tokens?token_hash=eq.{}&purpose=eq.{}&select=id,user_id,expires_at",
            hash_refresh_token(token.trim()),
            purpose.as_str()
        );
        let rows: Vec<VerificationRecord> = self.supabase.request(Method::GET, &path, None).await?;
        let record = rows
            .into_iter()
            .next()
            .ok_or(AuthError::InvalidOneTimeToken(purpose))?;

        let path = format!("/rest/v1/verification_tokens?id=eq.{}", record.id);
        self.supabase.execute(Method::DELETE, &path, None).await?;

        if record.expires_at <= Utc::now() {
            return Err(AuthError::InvalidOneTimeToken(purpose));
        }
        Ok(record)
    }

    async fn delete_session(&self, session_id: Uuid) -> Result<(), AuthError> {
        let path = format!("/rest/v1/sessions?id=eq.{}", session_id);
        self.supabase.execute(Method::DELETE, &path, None).await?;
        Ok(())
    }

    async fn issue_session(&self, account: UserAccount, client: &ClientInfo) -> Result<AuthTokens, AuthError> {
        let access_token = issue_token(
            account.id,
            Some(&account.email),
            account.role,
            TokenKind::Access,
            self.access_ttl,
            &self.jwt_secret,
        )
        .map_err(AuthError::Store)?;

        let refresh_token = issue_token(
            account.id,
            Some(&account.email),
            account.role,
            TokenKind::Refresh,
            self.refresh_ttl,
            &self.jwt_secret,
        )
        .map_err(AuthError::Store)?;

        let session = json!({
            "user_id": account.id,
            "token_hash": hash_refresh_token(&refresh_token),
            "expires_at": (Utc::now() + self.refresh_ttl).to_rfc3339(),
            "user_agent": client.user_agent,
            "ip": client.ip
        });
        self.supabase
            .execute(Method::POST, "/rest/v1/sessions", Some(session))
            .await?;

        Ok(AuthTokens {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_ttl.num_seconds(),
            user: account,
        })
    }
}
