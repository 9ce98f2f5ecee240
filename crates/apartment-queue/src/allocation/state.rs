//! Reservation lifecycle.
//!
//! ```text
//!   submitted ──► holding ◄──► needs-review
//!                    │              │
//!                    ▼              ▼
//!                 offered ◄── offer-expired
//!                    │
//!                    ▼
//!             offer-accepted ──► sold (terminal)
//!
//!   any non-terminal state ──► cancelled (terminal, reason required)
//! ```
//!
//! Legal moves live in [`legal_predecessors`]; nothing else in the crate decides
//! whether a transition is allowed.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationState {
    Submitted,
    Holding,
    NeedsReview,
    Offered,
    OfferAccepted,
    OfferExpired,
    Cancelled,
    Sold,
}

impl ReservationState {
    pub const ALL: [Self; 8] = [
        Self::Submitted,
        Self::Holding,
        Self::NeedsReview,
        Self::Offered,
        Self::OfferAccepted,
        Self::OfferExpired,
        Self::Cancelled,
        Self::Sold,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Holding => "holding",
            Self::NeedsReview => "needs_review",
            Self::Offered => "offered",
            Self::OfferAccepted => "offer_accepted",
            Self::OfferExpired => "offer_expired",
            Self::Cancelled => "cancelled",
            Self::Sold => "sold",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Sold)
    }

    /// States in which the reservation already owns the unit.
    pub const fn holds_unit(self) -> bool {
        matches!(
            self,
            Self::Holding | Self::Offered | Self::OfferAccepted | Self::OfferExpired | Self::Sold
        )
    }

    pub const fn requires_reason(self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl std::fmt::Display for ReservationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationReason {
    /// The applicant holds a unit they ranked higher in the same project.
    LowerPriority,
    OfferRejected,
    /// The claim moved to a different applicant.
    Transferred,
    Terminated,
    Other,
}

impl CancellationReason {
    pub const fn label(self) -> &'static str {
        match self {
            Self::LowerPriority => "lower_priority",
            Self::OfferRejected => "offer_rejected",
            Self::Transferred => "transferred",
            Self::Terminated => "terminated",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// States from which `target` may be entered.
pub const fn legal_predecessors(target: ReservationState) -> &'static [ReservationState] {
    use ReservationState::*;

    match target {
        Submitted => &[],
        Holding => &[Submitted, NeedsReview],
        NeedsReview => &[Submitted, Holding],
        Offered => &[Holding, NeedsReview, OfferExpired],
        OfferAccepted => &[Offered],
        OfferExpired => &[Offered],
        Sold => &[Holding, Offered, OfferAccepted],
        Cancelled => &[
            Submitted,
            Holding,
            NeedsReview,
            Offered,
            OfferAccepted,
            OfferExpired,
        ],
    }
}

/// Validation failure for a requested state change. Raised before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("reservation is {from} which is terminal; cannot move to {to}")]
    Terminal {
        from: ReservationState,
        to: ReservationState,
    },
    #[error("illegal reservation transition {from} -> {to}")]
    Illegal {
        from: ReservationState,
        to: ReservationState,
    },
    #[error("cancelling a reservation requires a cancellation reason")]
    MissingReason,
    #[error("cancellation reason {reason} supplied for non-cancel transition to {to}")]
    UnexpectedReason {
        reason: CancellationReason,
        to: ReservationState,
    },
}

/// Checks a requested change against the transition table.
pub fn validate_transition(
    from: ReservationState,
    to: ReservationState,
    reason: Option<CancellationReason>,
) -> Result<(), TransitionError> {
    match (to.requires_reason(), reason) {
        (true, None) => return Err(TransitionError::MissingReason),
        (false, Some(reason)) => return Err(TransitionError::UnexpectedReason { reason, to }),
        _ => {}
    }

    if from.is_terminal() {
        return Err(TransitionError::Terminal { from, to });
    }

    if !legal_predecessors(to).contains(&from) {
        return Err(TransitionError::Illegal { from, to });
    }

    Ok(())
}

/// Requested change handed to the store; the store stamps it into a `StateChangeEvent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub state: ReservationState,
    pub actor: Option<super::domain::ActorId>,
    pub comment: Option<String>,
    pub reason: Option<CancellationReason>,
    pub replaced_by: Option<super::domain::ReservationId>,
}

impl StateChange {
    pub fn to(state: ReservationState) -> Self {
        Self {
            state,
            actor: None,
            comment: None,
            reason: None,
            replaced_by: None,
        }
    }

    pub fn cancel(reason: CancellationReason) -> Self {
        Self {
            reason: Some(reason),
            ..Self::to(ReservationState::Cancelled)
        }
    }

    pub fn by(mut self, actor: Option<super::domain::ActorId>) -> Self {
        self.actor = actor;
        self
    }

    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment;
        self
    }

    pub fn replaced_by(mut self, id: super::domain::ReservationId) -> Self {
        self.replaced_by = Some(id);
        self
    }
}
