use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_host: String,
    pub server_port: u16,
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub jwt_secret: String,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,
    pub app_env: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            server_host: env::var("SERVER_HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: parse_or_default("SERVER_PORT", 8080),
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_service_key: env::var("SUPABASE_SERVICE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_KEY not set, using empty value");
                    String::new()
                }),
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("JWT_SECRET not set, using empty value");
                    String::new()
                }),
            access_token_ttl_minutes: parse_or_default("ACCESS_TOKEN_TTL_MINUTES", 60),
            refresh_token_ttl_days: parse_or_default("REFRESH_TOKEN_TTL_DAYS", 30),
            app_env: env::var("APP_ENV")
                .unwrap_or_else(|_| "development".to_string()),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        self.missing_settings().is_empty()
    }

    /// Names of the required variables that are unset.
    pub fn missing_settings(&self) -> Vec<&'static str> {
        [
            ("SUPABASE_URL", &self.supabase_url),
            ("SUPABASE_SERVICE_KEY", &self.supabase_service_key),
            ("JWT_SECRET", &self.jwt_secret),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(key, _)| key)
        .collect()
    }

    /// Production refuses to start on a partial configuration.
    pub fn ensure_startable(&self) -> Result<(), String> {
        let missing = self.missing_settings();
        if self.is_production() && !missing.is_empty() {
            return Err(format!("missing required settings: {}", missing.join(", ")));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }
}

fn parse_or_default<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
