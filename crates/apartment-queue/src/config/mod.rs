use std::env;
use std::fmt;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the allocation engine and its tooling.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub allocation: AllocationConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let dependents_min_rooms = match env::var("ALLOCATION_DEPENDENTS_MIN_ROOMS") {
            Err(_) => Some(DEFAULT_DEPENDENTS_MIN_ROOMS),
            Ok(raw) if raw.trim().eq_ignore_ascii_case("off") => None,
            Ok(raw) => Some(
                raw.trim()
                    .parse::<u8>()
                    .map_err(|_| ConfigError::InvalidDependentsThreshold(raw.clone()))?,
            ),
        };

        let cascade_cancels_holding = match env::var("ALLOCATION_CASCADE_CANCELS_HOLDING") {
            Err(_) => true,
            Ok(raw) => parse_bool(&raw).ok_or(ConfigError::InvalidBool {
                key: "ALLOCATION_CASCADE_CANCELS_HOLDING",
                value: raw,
            })?,
        };

        let lottery_seed = match env::var("ALLOCATION_LOTTERY_SEED") {
            Err(_) => None,
            Ok(raw) => Some(
                raw.trim()
                    .parse::<u64>()
                    .map_err(|_| ConfigError::InvalidSeed(raw.clone()))?,
            ),
        };
        if lottery_seed.is_some() && environment == AppEnvironment::Production {
            return Err(ConfigError::SeedInProduction);
        }

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            allocation: AllocationConfig {
                dependents_min_rooms,
                cascade_cancels_holding,
                lottery_seed,
            },
            telemetry: TelemetryConfig { log_level },
        })
    }
}

pub const DEFAULT_DEPENDENTS_MIN_ROOMS: u8 = 3;

/// Allocation rules that vary by deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationConfig {
    /// Units with at least this many rooms draw households with children first.
    /// `None` turns the priority off.
    pub dependents_min_rooms: Option<u8>,
    /// Whether winning a higher-priority unit also cancels a lower-priority unit already held.
    pub cascade_cancels_holding: bool,
    pub lottery_seed: Option<u64>,
}

impl AllocationConfig {
    pub fn prioritises_children(&self, room_count: u8) -> bool {
        self.dependents_min_rooms
            .is_some_and(|min_rooms| room_count >= min_rooms)
    }
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            dependents_min_rooms: Some(DEFAULT_DEPENDENTS_MIN_ROOMS),
            cascade_cancels_holding: true,
            lottery_seed: None,
        }
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidDependentsThreshold(String),
    InvalidBool { key: &'static str, value: String },
    InvalidSeed(String),
    SeedInProduction,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidDependentsThreshold(value) => write!(
                f,
                "ALLOCATION_DEPENDENTS_MIN_ROOMS must be a room count or `off`, got '{}'",
                value
            ),
            ConfigError::InvalidBool { key, value } => {
                write!(f, "{} must be true or false, got '{}'", key, value)
            }
            ConfigError::InvalidSeed(value) => {
                write!(f, "ALLOCATION_LOTTERY_SEED must be a u64, got '{}'", value)
            }
            ConfigError::SeedInProduction => {
                write!(f, "ALLOCATION_LOTTERY_SEED is not allowed in production")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
