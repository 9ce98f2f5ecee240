//! Project-wide winner propagation.
//!
//! Winning a unit cancels the same application's lower-priority claims elsewhere in the
//! project. A cancelled claim may have been the winner (or the next in line) of its own unit,
//! so that unit is pushed back onto the worklist and resolved again. The loop ends when the
//! worklist drains; every pass either finds a unit already settled or moves a reservation to
//! `holding`, and each reservation can be cancelled only once. Ties are flagged last.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::Serialize;
use tracing::{debug, info};

use super::domain::{OwnershipRegime, ReservationId, UnitId};
use super::error::AllocationError;
use super::state::{CancellationReason, ReservationState, StateChange};
use super::store::{QueueTransaction, StoreError};
use super::winner::{resolve_unit, select_winner, Selection, WinnerOutcome};
use crate::config::AllocationConfig;

/// What a cascade run changed, in the order it happened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    pub winners: Vec<(UnitId, ReservationId)>,
    pub ties: Vec<(UnitId, Vec<ReservationId>)>,
    pub cancelled: Vec<(UnitId, ReservationId)>,
    pub manual_review: Vec<(UnitId, ReservationId)>,
}

pub(crate) struct CascadeCanceller<'a> {
    regimes: &'a BTreeMap<UnitId, OwnershipRegime>,
    config: &'a AllocationConfig,
}

impl<'a> CascadeCanceller<'a> {
    pub(crate) fn new(
        regimes: &'a BTreeMap<UnitId, OwnershipRegime>,
        config: &'a AllocationConfig,
    ) -> Self {
        Self { regimes, config }
    }

    /// Resolves `seeds` and everything their winners knock on.
    ///
    /// Tied units are set aside until no unique winner is left to settle, so a tie is only
    /// flagged for review once no cancellation elsewhere in the project can break it.
    pub(crate) fn run(
        &self,
        tx: &mut QueueTransaction,
        seeds: impl IntoIterator<Item = UnitId>,
    ) -> Result<CascadeReport, AllocationError> {
        let mut report = CascadeReport::default();
        let mut worklist = VecDeque::new();
        let mut queued = BTreeSet::new();
        let mut deferred = BTreeSet::new();

        for unit_id in seeds {
            if queued.insert(unit_id.clone()) {
                worklist.push_back(unit_id);
            }
        }

        while let Some(unit_id) = worklist.pop_front() {
            queued.remove(&unit_id);

            if !tx.unit(&unit_id)?.is_distributed() {
                debug!(unit = %unit_id, "unit not distributed yet; winner left open");
                continue;
            }

            let regime = self.regime(&unit_id)?;
            if matches!(select_winner(tx.unit(&unit_id)?, regime), Selection::Tied(_)) {
                debug!(unit = %unit_id, "tie set aside until unique winners settle");
                deferred.insert(unit_id);
                continue;
            }
            deferred.remove(&unit_id);

            let holder = match resolve_unit(tx, &unit_id, regime)? {
                WinnerOutcome::Winner(winner) => {
                    report.winners.push((unit_id.clone(), winner));
                    winner
                }
                // A holder that never went through resolution still gives up its lower claims.
                WinnerOutcome::AlreadyHeld(holder) => holder,
                WinnerOutcome::Tie(ids) => {
                    report.ties.push((unit_id, ids));
                    continue;
                }
                WinnerOutcome::Empty => continue,
            };

            for affected in self.cancel_lower_priority(tx, &unit_id, holder, &mut report)? {
                if queued.insert(affected.clone()) {
                    debug!(unit = %affected, "unit queued for winner re-evaluation");
                    worklist.push_back(affected);
                }
            }
        }

        // Flagging a tie cancels nothing, so these no longer affect each other.
        for unit_id in deferred {
            let regime = self.regime(&unit_id)?;
            if let WinnerOutcome::Tie(ids) = resolve_unit(tx, &unit_id, regime)? {
                report.ties.push((unit_id, ids));
            }
        }

        Ok(report)
    }

    fn regime(&self, unit_id: &UnitId) -> Result<OwnershipRegime, AllocationError> {
        self.regimes
            .get(unit_id)
            .copied()
            .ok_or_else(|| StoreError::UnitNotLocked(unit_id.clone()).into())
    }

    fn cascade_cancellable(&self, state: ReservationState) -> bool {
        match state {
            ReservationState::Submitted => true,
            ReservationState::Holding => self.config.cascade_cancels_holding,
            _ => false,
        }
    }

    /// Cancels the winning application's claims it ranked below `unit_id`; returns the units touched.
    fn cancel_lower_priority(
        &self,
        tx: &mut QueueTransaction,
        unit_id: &UnitId,
        winner: ReservationId,
        report: &mut CascadeReport,
    ) -> Result<Vec<UnitId>, AllocationError> {
        let reservation = tx
            .unit(unit_id)?
            .reservation(&winner)
            .cloned()
            .ok_or(AllocationError::ReservationNotFound(winner))?;
        let Some(link) = reservation.choice else {
            return Ok(Vec::new());
        };

        let siblings: Vec<(UnitId, ReservationId, ReservationState)> = tx
            .units()
            .filter(|queue| queue.unit_id() != unit_id)
            .flat_map(|queue| {
                queue
                    .reservations()
                    .iter()
                    .filter(|other| other.application_id() == Some(&link.application_id))
                    .filter(|other| {
                        other
                            .priority_number()
                            .is_some_and(|priority| priority > link.priority_number)
                    })
                    .map(|other| (queue.unit_id().clone(), other.id, other.state))
            })
            .collect();

        let mut affected = Vec::new();
        for (sibling_unit, sibling, state) in siblings {
            if state.is_terminal() {
                continue;
            }
            if !self.cascade_cancellable(state) {
                debug!(
                    unit = %sibling_unit,
                    reservation = %sibling,
                    state = %state,
                    "lower-priority claim left for manual handling"
                );
                let entry = (sibling_unit, sibling);
                if !report.manual_review.contains(&entry) {
                    report.manual_review.push(entry);
                }
                continue;
            }

            tx.unit_mut(&sibling_unit)?.set_state(
                &sibling,
                StateChange::cancel(CancellationReason::LowerPriority).with_comment(Some(format!(
                    "won unit {unit_id} with priority {}",
                    link.priority_number
                ))),
            )?;
            info!(
                unit = %sibling_unit,
                reservation = %sibling,
                winning_unit = %unit_id,
                "lower-priority reservation cancelled"
            );
            report.cancelled.push((sibling_unit.clone(), sibling));
            affected.push(sibling_unit);
        }

        Ok(affected)
    }
}
