//! Apartment allocation core: per-unit queues, intake, lotteries, and winner resolution.
//!
//! Every mutation runs inside a [`store::QueueStore`] transaction covering the units it can
//! touch, so a failed intake or distribution leaves no trace.

pub mod cascade;
pub mod catalog;
pub mod domain;
pub mod error;
pub mod intake;
pub mod lottery;
pub mod service;
pub mod state;
pub mod store;
pub mod winner;

#[cfg(test)]
mod tests;

pub use cascade::CascadeReport;
pub use catalog::{CatalogError, InMemoryUnitCatalog, UnitCatalog, UnitMetadata};
pub use domain::{
    ActorId, ApplicantId, Application, ApplicationChoice, ApplicationId, ChoiceLink,
    LotteryEvent, LotteryResult, OwnershipRegime, ProjectId, QueueChangeEvent, QueueChangeKind,
    Reservation, ReservationId, StateChangeEvent, UnitId,
};
pub use error::{AllocationError, ErrorKind};
pub use lottery::{entropy_rng, seeded_rng, LotteryRng};
pub use service::{AllocationService, DistributionSummary};
pub use state::{CancellationReason, ReservationState, StateChange, TransitionError};
pub use store::{QueueStore, StoreError, UnitQueue};
pub use winner::{select_winner, Selection, WinnerOutcome};
