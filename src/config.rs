use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub identity: IdentityConfig,
    pub calendar: CalendarConfig,
    pub llm: LlmConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// `*` allows any origin; anything else is used as the single allowed origin.
    /// Read from env var `CORS_ALLOWED_ORIGIN`.
    pub cors_allowed_origin: String,
    /// Emit logs as JSON lines (`LOG_FORMAT=json`).
    pub log_json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub expiration_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// Base URL of the identity provider's backend API (token broker).
    pub api_url: String,
    /// Backend secret for the token broker. When absent the calendar bridge is disabled.
    pub secret_key: Option<String>,
    /// OAuth provider slug whose access token is requested, e.g. `oauth_google`.
    pub oauth_provider: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalendarConfig {
    pub api_url: String,
    pub calendar_id: String,
    /// Color given to events created by the assistant.
    pub default_color: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// When absent the assistant endpoints answer 503.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    /// Upper bound on model calls per assistant turn.
    pub max_steps: u32,
    pub temperature: f32,
    /// Quick parse turns unparseable model output into a to-do titled with the raw input.
    pub parse_fallback_to_task: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Allowed requests per second (per IP) for the assistant endpoints
    pub assistant_per_second: u32,
    /// Burst size for the assistant endpoints
    pub assistant_burst: u32,
}

fn env_flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                cors_allowed_origin: env::var("CORS_ALLOWED_ORIGIN")
                    .unwrap_or_else(|_| "*".to_string()),
                log_json: env::var("LOG_FORMAT")
                    .map(|v| v.eq_ignore_ascii_case("json"))
                    .unwrap_or(false),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/planner.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            jwt: JwtConfig {
                secret: env::var("JWT_SECRET")
                    .map_err(|_| ConfigError::MissingEnv("JWT_SECRET".to_string()))?,
                expiration_hours: env::var("JWT_EXPIRATION_HOURS")
                    .unwrap_or_else(|_| "24".to_string())
                    .parse()
                    .unwrap_or(24),
            },
            identity: IdentityConfig {
                api_url: env::var("IDENTITY_API_URL")
                    .unwrap_or_else(|_| "https://api.clerk.com/v1".to_string()),
                secret_key: non_empty("IDENTITY_SECRET_KEY"),
                oauth_provider: env::var("IDENTITY_OAUTH_PROVIDER")
                    .unwrap_or_else(|_| "oauth_google".to_string()),
            },
            calendar: CalendarConfig {
                api_url: env::var("CALENDAR_API_URL")
                    .unwrap_or_else(|_| "https://www.googleapis.com/calendar/v3".to_string()),
                calendar_id: env::var("CALENDAR_ID").unwrap_or_else(|_| "primary".to_string()),
                default_color: env::var("CALENDAR_DEFAULT_COLOR")
                    .unwrap_or_else(|_| "#ec4899".to_string()),
            },
            llm: LlmConfig {
                api_key: non_empty("LLM_API_KEY"),
                base_url: env::var("LLM_BASE_URL")
                    .unwrap_or_else(|_| "https://openrouter.ai/api/v1".to_string()),
                model: env::var("LLM_MODEL").unwrap_or_else(|_| "openai/gpt-4o-mini".to_string()),
                max_steps: env::var("LLM_MAX_STEPS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("LLM_MAX_STEPS".to_string()))?,
                temperature: env::var("LLM_TEMPERATURE")
                    .unwrap_or_else(|_| "0.2".to_string())
                    .parse()
                    .unwrap_or(0.2),
                parse_fallback_to_task: env_flag("LLM_PARSE_FALLBACK_TO_TASK", false),
            },
            rate_limit: RateLimitConfig {
                assistant_per_second: env::var("RATE_LIMIT_ASSISTANT_PER_SECOND")
                    .unwrap_or_else(|_| "1".to_string())
                    .parse()
                    .unwrap_or(1),
                assistant_burst: env::var("RATE_LIMIT_ASSISTANT_BURST")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                cors_allowed_origin: "*".to_string(),
                log_json: false,
            },
            database: DatabaseConfig {
                url: "sqlite://data/planner.db".to_string(),
                max_connections: 5,
            },
            jwt: JwtConfig {
                secret: "change-me".to_string(),
                expiration_hours: 24,
            },
            identity: IdentityConfig {
                api_url: "https://api.clerk.com/v1".to_string(),
                secret_key: None,
                oauth_provider: "oauth_google".to_string(),
            },
            calendar: CalendarConfig {
                api_url: "https://www.googleapis.com/calendar/v3".to_string(),
                calendar_id: "primary".to_string(),
                default_color: "#ec4899".to_string(),
            },
            llm: LlmConfig {
                api_key: None,
                base_url: "https://openrouter.ai/api/v1".to_string(),
                model: "openai/gpt-4o-mini".to_string(),
                max_steps: 5,
                temperature: 0.2,
                parse_fallback_to_task: false,
            },
            rate_limit: RateLimitConfig {
                assistant_per_second: 1,
                assistant_burst: 10,
            },
        }
    }
}
