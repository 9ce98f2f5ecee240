use super::catalog::CatalogError;
use super::domain::{ApplicationId, OwnershipRegime, ReservationId, UnitId};
use super::state::TransitionError;
use super::store::StoreError;

/// Error raised by the allocation core. Any of these aborts the enclosing transaction.
#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    #[error("unsupported ownership regime `{tag}` on unit {unit}")]
    UnsupportedRegime { unit: UnitId, tag: String },
    #[error("application {application} has no right-of-occupancy number required for HASO")]
    MissingOrderingKey { application: ApplicationId },
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("application {application} already has a reservation on unit {unit}")]
    DuplicateReservation {
        application: ApplicationId,
        unit: UnitId,
    },
    #[error("application {application} is {declared} but unit {unit} is allocated as {actual}")]
    RegimeMismatch {
        application: ApplicationId,
        unit: UnitId,
        declared: OwnershipRegime,
        actual: OwnershipRegime,
    },
    #[error("application {0} does not choose any unit")]
    NoChoices(ApplicationId),
    #[error("transfer requires a target applicant")]
    MissingTransferTarget,
    #[error("unit {unit} is already held by reservation {holder}")]
    UnitAlreadyHeld { unit: UnitId, holder: ReservationId },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("reservation {0} not found")]
    ReservationNotFound(ReservationId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Coarse classification callers use to decide between surfacing, retrying, or paging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Fatal setup problem; never retried.
    Configuration,
    /// Rejected request; nothing was written.
    Validation,
    NotFound,
    /// Broken internal invariant; the transaction was aborted.
    Defect,
    /// Backing storage failed; safe to retry from scratch.
    Storage,
}

impl AllocationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AllocationError::UnsupportedRegime { .. } | AllocationError::MissingOrderingKey { .. } => {
                ErrorKind::Configuration
            }
            AllocationError::Transition(_)
            | AllocationError::DuplicateReservation { .. }
            | AllocationError::RegimeMismatch { .. }
            | AllocationError::NoChoices(_)
            | AllocationError::MissingTransferTarget
            | AllocationError::UnitAlreadyHeld { .. } => ErrorKind::Validation,
            AllocationError::Catalog(CatalogError::Unavailable(_)) => ErrorKind::Storage,
            AllocationError::Catalog(_) | AllocationError::ReservationNotFound(_) => {
                ErrorKind::NotFound
            }
            AllocationError::Store(_) => ErrorKind::Defect,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Storage
    }
}
