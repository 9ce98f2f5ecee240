use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::{CancellationReason, ReservationState};

/// External reference to an apartment owned by the project catalog.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitId(pub String);

/// External reference to a housing project grouping several units.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub String);

/// Identifier wrapper for submitted applications.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

/// Opaque applicant reference; profiles live in another subsystem.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApplicantId(pub String);

/// Staff member (or integration) recorded on audit entries. `None` means the system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReservationId(pub Uuid);

impl ReservationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! display_inner {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    fmt::Display::fmt(&self.0, f)
                }
            }
        )+
    };
}

display_inner!(UnitId, ProjectId, ApplicationId, ApplicantId, ActorId, ReservationId);

/// Allocation regime attached to a unit's project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipRegime {
    /// Right-of-occupancy: ordered by the applicant's occupancy number, smallest first.
    Haso,
    /// Price-regulated ownership: ordered once by lottery.
    Hitas,
    HalfHitas,
}

impl OwnershipRegime {
    /// Parses the catalog's ownership tag; `None` for tags the engine cannot allocate.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "haso" => Some(Self::Haso),
            "hitas" => Some(Self::Hitas),
            "half_hitas" | "half-hitas" | "puolihitas" => Some(Self::HalfHitas),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Haso => "haso",
            Self::Hitas => "hitas",
            Self::HalfHitas => "half_hitas",
        }
    }

    /// HITAS and half-HITAS share the lottery rules.
    pub const fn uses_lottery(self) -> bool {
        matches!(self, Self::Hitas | Self::HalfHitas)
    }
}

impl fmt::Display for OwnershipRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One ranked claim inside an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationChoice {
    pub unit_id: UnitId,
    /// 1 is the applicant's most wanted unit.
    pub priority_number: u32,
}

/// An applicant's submission covering one or more units of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub applicant_id: ApplicantId,
    pub regime: OwnershipRegime,
    /// Required for HASO; ignored for HITAS.
    pub right_of_occupancy: Option<u32>,
    pub has_children: bool,
    pub submitted_late: bool,
    pub choices: Vec<ApplicationChoice>,
}

/// Link between a reservation and the application choice that created it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceLink {
    pub application_id: ApplicationId,
    pub priority_number: u32,
}

/// One applicant's claim on one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub unit_id: UnitId,
    pub applicant_id: Option<ApplicantId>,
    pub choice: Option<ChoiceLink>,
    pub list_position: u32,
    pub queue_position: Option<u32>,
    pub state: ReservationState,
    pub priority_key: Option<u32>,
    pub submitted_late: bool,
    pub has_children: bool,
    pub cancellation_reason: Option<CancellationReason>,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.queue_position.is_some()
    }

    pub fn application_id(&self) -> Option<&ApplicationId> {
        self.choice.as_ref().map(|choice| &choice.application_id)
    }

    pub fn priority_number(&self) -> Option<u32> {
        self.choice.as_ref().map(|choice| choice.priority_number)
    }
}

/// Append-only record of a reservation entering a state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChangeEvent {
    pub reservation_id: ReservationId,
    pub state: ReservationState,
    pub timestamp: DateTime<Utc>,
    pub actor: Option<ActorId>,
    pub comment: Option<String>,
    pub cancellation_reason: Option<CancellationReason>,
    pub replaced_by: Option<ReservationId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueChangeKind {
    Added,
    Removed,
}

/// Audit entry for a reservation entering or leaving the active queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueChangeEvent {
    pub reservation_id: ReservationId,
    pub kind: QueueChangeKind,
    /// Position taken on `Added`, position vacated on `Removed`.
    pub queue_position: Option<u32>,
    pub timestamp: DateTime<Utc>,
    pub comment: Option<String>,
}

/// Frozen order of a unit's queue at distribution time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotteryEvent {
    pub unit_id: UnitId,
    pub performed_at: DateTime<Utc>,
    pub performed_by: Option<ActorId>,
    pub results: Vec<LotteryResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotteryResult {
    pub reservation_id: ReservationId,
    pub result_position: u32,
}
