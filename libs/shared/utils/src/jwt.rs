use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;
use uuid::Uuid;

use shared_models::auth::{JwtClaims, JwtHeader, Role, TokenKind, User};

type HmacSha256 = Hmac<Sha256>;

fn sign(signing_input: &str, jwt_secret: &str) -> Result<Vec<u8>, String> {
    let mut mac = HmacSha256::new_from_slice(jwt_secret.as_bytes())
        .map_err(|_| "Failed to create HMAC".to_string())?;
    mac.update(signing_input.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Mints an HS256 token for `user_id` that expires after `ttl`.
pub fn issue_token(
    user_id: Uuid,
    email: Option<&str>,
    role: Role,
    kind: TokenKind,
    ttl: Duration,
    jwt_secret: &str,
) -> Result<String, String> {
    if jwt_secret.is_empty() {
        return Err("JWT secret is not set".to_string());
    }

    let now = Utc::now();
    let header = JwtHeader {
        alg: "HS256".to_string(),
        typ: "JWT".to_string(),
    };
    let claims = JwtClaims {
        sub: user_id.to_string(),
        exp: Some((now + ttl).timestamp().max(0) as u64),
        iat: Some(now.timestamp() as u64),
        email: email.map(str::to_string),
        role: Some(role.as_str().to_string()),
        token_type: kind,
        jti: Some(Uuid::new_v4().to_string()),
    };

    let header_json = serde_json::to_string(&header).map_err(|e| e.to_string())?;
    let claims_json = serde_json::to_string(&claims).map_err(|e| e.to_string())?;

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header_json),
        URL_SAFE_NO_PAD.encode(claims_json)
    );
    let signature = sign(&signing_input, jwt_secret)?;

    Ok(format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(signature)))
}

/// Verifies signature, expiry and token kind, returning the raw claims.
pub fn decode_claims(token: &str, jwt_secret: &str, expected: TokenKind) -> Result<JwtClaims, String> {
    if jwt_secret.is_empty() {
        return Err("JWT secret is not set".to_string());
    }

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err("Invalid token format".to_string());
    }

    let (header_b64, claims_b64, signature_b64) = (parts[0], parts[1], parts[2]);

    let signature = URL_SAFE_NO_PAD.decode(signature_b64).map_err(|e| {
        debug!("Failed to decode signature: {}", e);
        "Invalid signature encoding".to_string()
    })?;

    let mut mac = HmacSha256::new_from_slice(jwt_secret.as_bytes())
        .map_err(|_| "Failed to create HMAC".to_string())?;
    mac.update(format!("{}.{}", header_b64, claims_b64).as_bytes());

    if mac.verify_slice(&signature).is_err() {
        debug!("Token signature verification failed");
        return Err("Invalid token signature".to_string());
    }

    let claims_json = URL_SAFE_NO_PAD
        .decode(claims_b64)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| "Invalid claims encoding".to_string())?;

    let claims: JwtClaims = serde_json::from_str(&claims_json).map_err(|e| {
        debug!("Failed to parse claims: {}", e);
        "Invalid claims format".to_string()
    })?;

    if let Some(exp) = claims.exp {
        let now = Utc::now().timestamp() as u64;
        if exp < now {
            debug!("Token expired at {} (now: {})", exp, now);
            return Err("Token expired".to_string());
        }
    }

    if claims.token_type != expected {
        return Err("Wrong token type".to_string());
    }

    Ok(claims)
}

/// Validates an access token and builds the request principal from it.
pub fn validate_token(token: &str, jwt_secret: &str) -> Result<User, String> {
    let claims = decode_claims(token, jwt_secret, TokenKind::Access)?;
    user_from_claims(claims)
}

pub fn user_from_claims(claims: JwtClaims) -> Result<User, String> {
    let id = Uuid::parse_str(&claims.sub).map_err(|_| "Invalid subject".to_string())?;
    let role = claims
        .role
        .as_deref()
        .ok_or_else(|| "Missing role claim".to_string())?
        .parse::<Role>()?;

    let created_at = claims
        .iat
        .and_then(|timestamp| Utc.timestamp_opt(timestamp as i64, 0).single());

    let user = User {
        id,
        email: claims.email,
        role,
        created_at,
    };

    debug!("Token validated successfully for user: {}", user.id);
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const SECRET: &str = "unit-test-secret";

    #[test]
    fn issued_access_token_validates() {
        let id = Uuid::new_v4();
        let token = issue_token(id, Some("a@b.io"), Role::Doctor, TokenKind::Access, Duration::minutes(5), SECRET)
            .unwrap();

        let user = validate_token(&token, SECRET).unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.role, Role::Doctor);
        assert_eq!(user.email.as_deref(), Some("a@b.io"));
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let token = issue_token(Uuid::new_v4(), None, Role::Patient, TokenKind::Refresh, Duration::days(1), SECRET)
            .unwrap();

        assert_matches!(validate_token(&token, SECRET), Err(msg) if msg == "Wrong token type");
        assert!(decode_claims(&token, SECRET, TokenKind::Refresh).is_ok());
    }

    #[test]
    fn rejects_expired_and_tampered_tokens() {
        let id = Uuid::new_v4();
        let expired = issue_token(id, None, Role::Patient, TokenKind::Access, Duration::hours(-1), SECRET).unwrap();
        assert_matches!(validate_token(&expired, SECRET), Err(msg) if msg == "Token expired");

        let valid = issue_token(id, None, Role::Patient, TokenKind::Access, Duration::hours(1), SECRET).unwrap();
        assert_matches!(validate_token(&valid, "other-secret"), Err(msg) if msg == "Invalid token signature");
        assert_matches!(validate_token("not-a-token", SECRET), Err(msg) if msg == "Invalid token format");
    }

    #[test]
    fn empty_secret_is_refused() {
        assert!(issue_token(Uuid::new_v4(), None, Role::Admin, TokenKind::Access, Duration::minutes(1), "").is_err());
        assert!(validate_token("a.b.c", "").is_err());
    }
}
