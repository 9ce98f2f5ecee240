use crate::allocation::AllocationError;
use crate::config::ConfigError;
use crate::import::ImportError;
use crate::telemetry::TelemetryError;
use std::fmt;

/// Process-level error for binaries built on the allocation engine.
#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Csv(csv::Error),
    Json(serde_json::Error),
    Import(ImportError),
    Allocation(AllocationError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Csv(err) => write!(f, "invalid CSV data: {}", err),
            AppError::Json(err) => write!(f, "json error: {}", err),
            AppError::Import(err) => write!(f, "import error: {}", err),
            AppError::Allocation(err) => write!(f, "allocation error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Csv(err) => Some(err),
            AppError::Json(err) => Some(err),
            AppError::Import(err) => Some(err),
            AppError::Allocation(err) => Some(err),
        }
    }
}

impl AppError {
    /// Exit code for the CLI: configuration problems are distinguished from bad input.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) | AppError::Telemetry(_) => 78,
            AppError::Allocation(err)
                if err.kind() == crate::allocation::ErrorKind::Configuration =>
            {
                78
            }
            AppError::Io(_) => 74,
            AppError::Csv(_)
            | AppError::Json(_)
            | AppError::Import(_)
            | AppError::Allocation(_) => 65,
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<csv::Error> for AppError {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<ImportError> for AppError {
    fn from(value: ImportError) -> Self {
        Self::Import(value)
    }
}

impl From<AllocationError> for AppError {
    fn from(value: AllocationError) -> Self {
        Self::Allocation(value)
    }
}
