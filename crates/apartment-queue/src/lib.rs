pub mod allocation;
pub mod config;
pub mod error;
pub mod import;
pub mod telemetry;

pub use allocation::{AllocationError, AllocationService, InMemoryUnitCatalog, QueueStore};
pub use config::{AllocationConfig, AppConfig, AppEnvironment};
pub use error::AppError;
