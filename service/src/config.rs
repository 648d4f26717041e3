use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";
const DEFAULT_PUSH_URL: &str = "ws://localhost:8000/ws/notifications/";

#[derive(Clone, Debug, PartialEq)]
pub enum RustEnv {
    Development,
    Production,
    Staging,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RustEnvParseError;

impl FromStr for RustEnv {
    type Err = RustEnvParseError;
    fn from_str(level: &str) -> Result<RustEnv, Self::Err> {
        match level.to_lowercase().as_str() {
            "development" => Ok(RustEnv::Development),
            "production" => Ok(RustEnv::Production),
            "staging" => Ok(RustEnv::Staging),
            _ => Err(RustEnvParseError),
        }
    }
}

impl fmt::Display for RustEnv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RustEnv::Development => write!(f, "development"),
            RustEnv::Production => write!(f, "production"),
            RustEnv::Staging => write!(f, "staging"),
        }
    }
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Base URL of the permit REST API. Endpoint paths are resolved against it.
    #[arg(short, long, env = "API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    pub base_url: String,

    /// Full URL of the notifications push channel (WebSocket).
    #[arg(long, env, default_value = DEFAULT_PUSH_URL)]
    pub push_url: String,

    /// Path of the session refresh endpoint.
    #[arg(long, env, default_value = "/auth/token/refresh/")]
    pub refresh_path: String,

    /// Path of the anti-forgery token endpoint.
    #[arg(long, env, default_value = "/auth/csrf/")]
    pub csrf_path: String,

    #[arg(long, env, default_value = "/auth/login/")]
    pub login_path: String,

    #[arg(long, env, default_value = "/auth/logout/")]
    pub logout_path: String,

    /// Header name used to echo the anti-forgery token back to the backend.
    #[arg(long, env, default_value = "X-CSRFToken")]
    pub csrf_header: String,

    /// Timeout in seconds for ordinary API requests
    #[arg(long, env, default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Timeout in seconds for the session refresh call. A refresh that hangs longer fails the cycle.
    #[arg(long, env, default_value_t = 30)]
    pub refresh_timeout_secs: u64,

    /// Backend session lifetime in seconds (default: 24 hours = 86400 seconds)
    #[arg(long, env, default_value_t = 86400)]
    pub session_lifetime_secs: u64,

    /// How many seconds before the session expires the proactive refresh fires
    #[arg(long, env, default_value_t = 7200)]
    pub refresh_lead_secs: u64,

    /// Delay in seconds before a failed proactive refresh is retried
    #[arg(long, env, default_value_t = 60)]
    pub refresh_retry_delay_secs: u64,

    /// Fixed delay in milliseconds between push channel reconnect attempts
    #[arg(long, env, default_value_t = 3000)]
    pub push_reconnect_delay_ms: u64,

    /// Consecutive failed push channel connections before giving up
    #[arg(long, env, default_value_t = 10)]
    pub push_max_retries: u32,

    /// Username used by the demo binary to sign in.
    #[arg(long, env = "PERMIT_USERNAME")]
    username: Option<String>,

    /// Password used by the demo binary to sign in.
    #[arg(long, env = "PERMIT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,

    /// Set the Rust runtime environment to use.
    #[arg(
    short,
    long,
    env,
    default_value_t = RustEnv::Development,
    value_parser = clap::builder::PossibleValuesParser::new([
        "DEVELOPMENT", "PRODUCTION", "STAGING",
        "development", "production", "staging"
    ])
        .map(|s| s.parse::<RustEnv>().unwrap()),
    )]
    pub runtime_env: RustEnv,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    /// Returns the sign-in credentials when both halves are configured.
    pub fn credentials(&self) -> Option<(String, String)> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some((username.clone(), password.clone())),
            _ => None,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }

    /// Delay between proactive refreshes: the session lifetime minus the lead,
    /// never shorter than one retry delay.
    pub fn proactive_refresh_interval(&self) -> Duration {
        let interval = self
            .session_lifetime_secs
            .saturating_sub(self.refresh_lead_secs)
            .max(self.refresh_retry_delay_secs);
        Duration::from_secs(interval)
    }

    pub fn refresh_retry_delay(&self) -> Duration {
        Duration::from_secs(self.refresh_retry_delay_secs)
    }

    pub fn push_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.push_reconnect_delay_ms)
    }

    pub fn runtime_env(&self) -> RustEnv {
        self.runtime_env.clone()
    }

    pub fn is_production(&self) -> bool {
        self.runtime_env() == RustEnv::Production
    }
}
