use chrono::Utc;
use tracing::debug;

use super::domain::{
    Application, ApplicationChoice, ChoiceLink, OwnershipRegime, Reservation, ReservationId,
};
use super::error::AllocationError;
use super::state::{ReservationState, StateChange};
use super::store::{QueueTransaction, UnitQueue};

/// Slot a new reservation takes in both orderings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub list_position: u32,
    pub queue_position: u32,
}

impl Placement {
    fn append(queue: &UnitQueue) -> Self {
        Self {
            list_position: queue.list_len() + 1,
            queue_position: queue.active_len() + 1,
        }
    }
}

/// Where a new claim enters `queue` under `regime`.
///
/// HASO keeps two pools, on-time then late, each sorted by ascending key; a new entry goes
/// in front of the first entry of its pool with a strictly greater key. Lottery regimes
/// always append, the order being decided later by the lottery.
pub fn placement(
    queue: &UnitQueue,
    regime: OwnershipRegime,
    priority_key: Option<u32>,
    submitted_late: bool,
) -> Placement {
    if regime.uses_lottery() {
        return Placement::append(queue);
    }

    let ranks_after = |existing: &Reservation| match (existing.priority_key, priority_key) {
        (Some(existing_key), Some(key)) => existing_key > key,
        (None, Some(_)) => true,
        (_, None) => false,
    };

    let anchor = queue.active().into_iter().find(|existing| {
        if submitted_late {
            existing.submitted_late && ranks_after(*existing)
        } else {
            existing.submitted_late || ranks_after(*existing)
        }
    });

    match anchor {
        Some(existing) => Placement {
            list_position: existing.list_position,
            queue_position: existing.queue_position.unwrap_or(queue.active_len() + 1),
        },
        None => Placement::append(queue),
    }
}

/// A late claim entered after the unit's lottery, when nobody else is queueing, starts out
/// holding it. Before the lottery every late claim waits behind on-time ones.
pub fn direct_creation_holds(queue: &UnitQueue, submitted_late: bool) -> bool {
    submitted_late && queue.is_distributed() && queue.active_len() == 0
}

/// Adds one application choice to its unit's queue inside `tx`.
pub(crate) fn enqueue_choice(
    tx: &mut QueueTransaction,
    application: &Application,
    choice: &ApplicationChoice,
    regime: OwnershipRegime,
    comment: Option<String>,
) -> Result<ReservationId, AllocationError> {
    let queue = tx.unit_mut(&choice.unit_id)?;
    if queue.has_application(&application.id) {
        return Err(AllocationError::DuplicateReservation {
            application: application.id.clone(),
            unit: choice.unit_id.clone(),
        });
    }

    let priority_key = match regime {
        OwnershipRegime::Haso => Some(application.right_of_occupancy.ok_or_else(|| {
            AllocationError::MissingOrderingKey {
                application: application.id.clone(),
            }
        })?),
        OwnershipRegime::Hitas | OwnershipRegime::HalfHitas => None,
    };

    let state = if direct_creation_holds(queue, application.submitted_late) {
        ReservationState::Holding
    } else {
        ReservationState::Submitted
    };
    let slot = placement(queue, regime, priority_key, application.submitted_late);

    let reservation = Reservation {
        id: ReservationId::new(),
        unit_id: choice.unit_id.clone(),
        applicant_id: Some(application.applicant_id.clone()),
        choice: Some(ChoiceLink {
            application_id: application.id.clone(),
            priority_number: choice.priority_number,
        }),
        list_position: slot.list_position,
        queue_position: Some(slot.queue_position),
        state,
        priority_key,
        submitted_late: application.submitted_late,
        has_children: application.has_children,
        cancellation_reason: None,
        created_at: Utc::now(),
    };
    let id = reservation.id;

    queue.admit(
        reservation,
        slot.list_position,
        slot.queue_position,
        StateChange::to(state).with_comment(comment),
    )?;

    debug!(
        unit = %choice.unit_id,
        application = %application.id,
        list_position = slot.list_position,
        queue_position = slot.queue_position,
        state = %state,
        "reservation added to queue"
    );
    Ok(id)
}
