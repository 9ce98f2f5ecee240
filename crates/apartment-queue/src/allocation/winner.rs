use tracing::{info, warn};

use super::domain::{OwnershipRegime, Reservation, ReservationId, UnitId};
use super::error::AllocationError;
use super::state::{ReservationState, StateChange};
use super::store::{QueueTransaction, UnitQueue};

/// Who should hold a unit given its current queue, before anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Empty,
    /// Some active reservation is already holding or further along.
    Held(ReservationId),
    Unique(ReservationId),
    Tied(Vec<ReservationId>),
}

/// Result of resolving one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WinnerOutcome {
    Empty,
    AlreadyHeld(ReservationId),
    /// The reservation moved to `holding` during this resolution.
    Winner(ReservationId),
    Tie(Vec<ReservationId>),
}

pub fn select_winner(queue: &UnitQueue, regime: OwnershipRegime) -> Selection {
    let active = queue.active();
    let Some(first) = active.first() else {
        return Selection::Empty;
    };

    if let Some(holder) = active.iter().find(|reservation| reservation.state.holds_unit()) {
        return Selection::Held(holder.id);
    }

    if regime.uses_lottery() || active.iter().all(|reservation| reservation.choice.is_none()) {
        return Selection::Unique(first.id);
    }

    // Late entries only compete once no on-time entry is left.
    let on_time: Vec<&Reservation> = active
        .iter()
        .copied()
        .filter(|reservation| !reservation.submitted_late)
        .collect();
    let pool = if on_time.is_empty() { active } else { on_time };

    let Some(best) = pool.iter().map(|reservation| key_rank(reservation)).min() else {
        return Selection::Empty;
    };
    let tied: Vec<ReservationId> = pool
        .iter()
        .filter(|reservation| key_rank(reservation) == best)
        .map(|reservation| reservation.id)
        .collect();

    if tied.len() == 1 {
        Selection::Unique(tied[0])
    } else {
        Selection::Tied(tied)
    }
}

// Keyless reservations sort after every keyed one.
fn key_rank(reservation: &Reservation) -> (bool, u32) {
    (
        reservation.priority_key.is_none(),
        reservation.priority_key.unwrap_or(u32::MAX),
    )
}

/// Applies the winner rule to one unit inside `tx`.
pub(crate) fn resolve_unit(
    tx: &mut QueueTransaction,
    unit_id: &UnitId,
    regime: OwnershipRegime,
) -> Result<WinnerOutcome, AllocationError> {
    let selection = select_winner(tx.unit(unit_id)?, regime);

    match selection {
        Selection::Empty => Ok(WinnerOutcome::Empty),
        Selection::Held(id) => Ok(WinnerOutcome::AlreadyHeld(id)),
        Selection::Unique(id) => {
            tx.unit_mut(unit_id)?.set_state(
                &id,
                StateChange::to(ReservationState::Holding)
                    .with_comment(Some("first in queue".to_string())),
            )?;
            info!(unit = %unit_id, reservation = %id, "unit winner selected");
            Ok(WinnerOutcome::Winner(id))
        }
        Selection::Tied(ids) => {
            let queue = tx.unit_mut(unit_id)?;
            for id in &ids {
                let already_flagged = queue
                    .reservation(id)
                    .is_some_and(|reservation| reservation.state == ReservationState::NeedsReview);
                if !already_flagged {
                    queue.set_state(
                        id,
                        StateChange::to(ReservationState::NeedsReview)
                            .with_comment(Some("tied right-of-occupancy number".to_string())),
                    )?;
                }
            }
            warn!(unit = %unit_id, tied = ids.len(), "winner tie requires manual review");
            Ok(WinnerOutcome::Tie(ids))
        }
    }
}
