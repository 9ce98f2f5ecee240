use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use super::cascade::{CascadeCanceller, CascadeReport};
use super::catalog::UnitCatalog;
use super::domain::{
    ActorId, ApplicantId, Application, LotteryEvent, OwnershipRegime, ProjectId,
    QueueChangeEvent, Reservation, ReservationId, StateChangeEvent, UnitId,
};
use super::error::AllocationError;
use super::intake::enqueue_choice;
use super::lottery::{distribute_unit, entropy_rng, seeded_rng, LotteryRng};
use super::state::{
    validate_transition, CancellationReason, ReservationState, StateChange,
};
use super::store::{QueueStore, QueueTransaction};
use crate::config::AllocationConfig;

/// Outcome of distributing one project.
#[derive(Debug, Clone, Serialize)]
pub struct DistributionSummary {
    pub project_id: ProjectId,
    /// Units whose lottery ran in this call; empty when the project was already distributed.
    pub distributed_units: Vec<UnitId>,
    /// Reservation holding (or further along on) each unit once the cascade settled.
    pub holders: BTreeMap<UnitId, ReservationId>,
    pub cascade: CascadeReport,
}

#[derive(Debug, Clone, Copy)]
struct PlannedUnit {
    regime: OwnershipRegime,
    room_count: u8,
}

/// Public contract of the allocation core: intake, distribution, and reservation lifecycle.
pub struct AllocationService<C> {
    catalog: Arc<C>,
    store: Arc<QueueStore>,
    rng: Mutex<LotteryRng>,
    config: AllocationConfig,
}

impl<C> AllocationService<C>
where
    C: UnitCatalog + 'static,
{
    pub fn new(catalog: Arc<C>, store: Arc<QueueStore>, config: AllocationConfig) -> Self {
        let rng = match config.lottery_seed {
            Some(seed) => seeded_rng(seed),
            None => entropy_rng(),
        };
        Self::with_rng(catalog, store, config, rng)
    }

    pub fn with_rng(
        catalog: Arc<C>,
        store: Arc<QueueStore>,
        config: AllocationConfig,
        rng: LotteryRng,
    ) -> Self {
        Self {
            catalog,
            store,
            rng: Mutex::new(rng),
            config,
        }
    }

    pub fn config(&self) -> &AllocationConfig {
        &self.config
    }

    /// Runs intake for every unit the application names.
    pub fn add_application_to_queues(
        &self,
        application: &Application,
    ) -> Result<Vec<ReservationId>, AllocationError> {
        self.add_application_with_comment(application, None)
    }

    /// Same as [`Self::add_application_to_queues`], with a comment on the `Added` audit entries.
    pub fn add_application_with_comment(
        &self,
        application: &Application,
        comment: Option<String>,
    ) -> Result<Vec<ReservationId>, AllocationError> {
        if application.choices.is_empty() {
            return Err(AllocationError::NoChoices(application.id.clone()));
        }

        let mut choices = application.choices.clone();
        choices.sort_by_key(|choice| choice.priority_number);

        let mut units = BTreeSet::new();
        let mut regimes = BTreeMap::new();
        for choice in &choices {
            if !units.insert(choice.unit_id.clone()) {
                return Err(AllocationError::DuplicateReservation {
                    application: application.id.clone(),
                    unit: choice.unit_id.clone(),
                });
            }

            let regime = self.regime_of(&choice.unit_id)?;
            if !regimes_compatible(application.regime, regime) {
                return Err(AllocationError::RegimeMismatch {
                    application: application.id.clone(),
                    unit: choice.unit_id.clone(),
                    declared: application.regime,
                    actual: regime,
                });
            }
            if regime == OwnershipRegime::Haso && application.right_of_occupancy.is_none() {
                return Err(AllocationError::MissingOrderingKey {
                    application: application.id.clone(),
                });
            }
            regimes.insert(choice.unit_id.clone(), regime);
        }

        let ids = self.store.transaction(&units, |tx| {
            choices
                .iter()
                .map(|choice| {
                    enqueue_choice(
                        tx,
                        application,
                        choice,
                        regimes[&choice.unit_id],
                        comment.clone(),
                    )
                })
                .collect::<Result<Vec<_>, AllocationError>>()
        })?;

        info!(
            application = %application.id,
            units = ids.len(),
            late = application.submitted_late,
            "application added to queues"
        );
        Ok(ids)
    }

    /// Runs the lottery for every undistributed unit of the project, then resolves winners.
    pub fn distribute_units(
        &self,
        project_id: &ProjectId,
        actor: Option<ActorId>,
    ) -> Result<DistributionSummary, AllocationError> {
        let plan = self.project_plan(project_id)?;
        let units: BTreeSet<UnitId> = plan.keys().cloned().collect();
        let regimes: BTreeMap<UnitId, OwnershipRegime> = plan
            .iter()
            .map(|(unit_id, unit)| (unit_id.clone(), unit.regime))
            .collect();

        let summary = self.store.transaction(&units, |tx| {
            let mut distributed = Vec::new();
            {
                let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
                for (unit_id, unit) in &plan {
                    let ran = distribute_unit(
                        tx,
                        unit_id,
                        unit.regime,
                        unit.room_count,
                        &self.config,
                        &mut **rng,
                        actor.as_ref(),
                    )?;
                    if ran {
                        distributed.push(unit_id.clone());
                    }
                }
            }

            // Every lottery is in place before the first winner is computed.
            let cascade = if distributed.is_empty() {
                CascadeReport::default()
            } else {
                CascadeCanceller::new(&regimes, &self.config).run(tx, distributed.iter().cloned())?
            };

            Ok::<_, AllocationError>(DistributionSummary {
                project_id: project_id.clone(),
                distributed_units: distributed,
                holders: holders(tx),
                cascade,
            })
        })?;

        info!(
            project = %project_id,
            distributed = summary.distributed_units.len(),
            winners = summary.cascade.winners.len(),
            ties = summary.cascade.ties.len(),
            cancelled = summary.cascade.cancelled.len(),
            "project distribution finished"
        );
        Ok(summary)
    }

    /// Cancels a reservation and, when it held the unit, lets the next in line take over.
    pub fn cancel_reservation(
        &self,
        reservation_id: &ReservationId,
        reason: CancellationReason,
        actor: Option<ActorId>,
        comment: Option<String>,
    ) -> Result<StateChangeEvent, AllocationError> {
        let unit_id = self.unit_of(reservation_id)?;
        let project_id = self.catalog.unit(&unit_id)?.project_id;
        let plan = self.project_plan(&project_id)?;
        let mut units: BTreeSet<UnitId> = plan.keys().cloned().collect();
        units.insert(unit_id.clone());
        let regimes: BTreeMap<UnitId, OwnershipRegime> = plan
            .iter()
            .map(|(unit_id, unit)| (unit_id.clone(), unit.regime))
            .collect();

        self.store.transaction(&units, |tx| {
            let queue = tx.unit_mut(&unit_id)?;
            let previous = queue
                .reservation(reservation_id)
                .map(|reservation| reservation.state)
                .ok_or(AllocationError::ReservationNotFound(*reservation_id))?;

            let event = queue.set_state(
                reservation_id,
                StateChange::cancel(reason).by(actor).with_comment(comment),
            )?;
            info!(
                unit = %unit_id,
                reservation = %reservation_id,
                reason = %reason,
                previous = %previous,
                "reservation cancelled"
            );

            if previous.holds_unit() || previous == ReservationState::NeedsReview {
                CascadeCanceller::new(&regimes, &self.config).run(tx, [unit_id.clone()])?;
            }
            Ok(event)
        })
    }

    /// Moves a reservation to `state`. Cancellation goes through [`Self::cancel_reservation`].
    ///
    /// A unit has at most one holder; moving a second reservation into a holding state fails.
    pub fn set_reservation_state(
        &self,
        reservation_id: &ReservationId,
        state: ReservationState,
        actor: Option<ActorId>,
        comment: Option<String>,
    ) -> Result<StateChangeEvent, AllocationError> {
        let unit_id = self.unit_of(reservation_id)?;
        let units = BTreeSet::from([unit_id.clone()]);

        self.store.transaction(&units, |tx| {
            let queue = tx.unit_mut(&unit_id)?;
            let event = queue.set_state(
                reservation_id,
                StateChange::to(state).by(actor).with_comment(comment),
            )?;
            if state.holds_unit() {
                let other_holder = queue.active().into_iter().find(|reservation| {
                    reservation.id != *reservation_id && reservation.state.holds_unit()
                });
                if let Some(holder) = other_holder {
                    return Err(AllocationError::UnitAlreadyHeld {
                        unit: unit_id.clone(),
                        holder: holder.id,
                    });
                }
            }
            info!(unit = %unit_id, reservation = %reservation_id, state = %state, "reservation state changed");
            Ok(event)
        })
    }

    /// Hands a reservation to another applicant.
    ///
    /// The original is cancelled as transferred and a new reservation takes its place: next
    /// list position, same queue position, same state.
    pub fn transfer_reservation(
        &self,
        reservation_id: &ReservationId,
        new_applicant: ApplicantId,
        actor: Option<ActorId>,
        comment: Option<String>,
    ) -> Result<(StateChangeEvent, ReservationId), AllocationError> {
        if new_applicant.0.trim().is_empty() {
            return Err(AllocationError::MissingTransferTarget);
        }

        let unit_id = self.unit_of(reservation_id)?;
        let units = BTreeSet::from([unit_id.clone()]);

        self.store.transaction(&units, |tx| {
            let queue = tx.unit_mut(&unit_id)?;
            let original = queue
                .reservation(reservation_id)
                .cloned()
                .ok_or(AllocationError::ReservationNotFound(*reservation_id))?;
            validate_transition(
                original.state,
                ReservationState::Cancelled,
                Some(CancellationReason::Transferred),
            )?;
            let queue_position = original
                .queue_position
                .ok_or(AllocationError::ReservationNotFound(*reservation_id))?;

            let replacement = Reservation {
                id: ReservationId::new(),
                applicant_id: Some(new_applicant.clone()),
                choice: None,
                list_position: original.list_position + 1,
                queue_position: Some(queue_position),
                cancellation_reason: None,
                created_at: Utc::now(),
                ..original.clone()
            };
            let replacement_id = replacement.id;

            let event = queue.set_state(
                reservation_id,
                StateChange::cancel(CancellationReason::Transferred)
                    .by(actor.clone())
                    .with_comment(comment.clone())
                    .replaced_by(replacement_id),
            )?;
            queue.admit(
                replacement,
                original.list_position + 1,
                queue_position,
                StateChange::to(original.state)
                    .by(actor)
                    .with_comment(comment),
            )?;

            info!(
                unit = %unit_id,
                reservation = %reservation_id,
                replacement = %replacement_id,
                applicant = %new_applicant,
                "reservation transferred"
            );
            Ok((event, replacement_id))
        })
    }

    pub fn reservation(&self, reservation_id: &ReservationId) -> Result<Reservation, AllocationError> {
        let unit_id = self.unit_of(reservation_id)?;
        self.store
            .snapshot(&unit_id)
            .and_then(|queue| queue.reservation(reservation_id).cloned())
            .ok_or(AllocationError::ReservationNotFound(*reservation_id))
    }

    /// Active reservations of a unit in queue order.
    pub fn active_queue(&self, unit_id: &UnitId) -> Vec<Reservation> {
        self.store
            .snapshot(unit_id)
            .map(|queue| queue.active().into_iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every reservation ever created for a unit, in list order.
    pub fn reservations(&self, unit_id: &UnitId) -> Vec<Reservation> {
        self.store
            .snapshot(unit_id)
            .map(|queue| queue.reservations().to_vec())
            .unwrap_or_default()
    }

    pub fn state_history(
        &self,
        reservation_id: &ReservationId,
    ) -> Result<Vec<StateChangeEvent>, AllocationError> {
        let unit_id = self.unit_of(reservation_id)?;
        Ok(self
            .store
            .snapshot(&unit_id)
            .map(|queue| queue.history_of(reservation_id))
            .unwrap_or_default())
    }

    pub fn queue_history(&self, unit_id: &UnitId) -> Vec<QueueChangeEvent> {
        self.store
            .snapshot(unit_id)
            .map(|queue| queue.queue_events().to_vec())
            .unwrap_or_default()
    }

    pub fn lottery_event(&self, unit_id: &UnitId) -> Option<LotteryEvent> {
        self.store
            .snapshot(unit_id)
            .and_then(|queue| queue.lottery().cloned())
    }

    fn unit_of(&self, reservation_id: &ReservationId) -> Result<UnitId, AllocationError> {
        self.store
            .unit_of(reservation_id)
            .ok_or(AllocationError::ReservationNotFound(*reservation_id))
    }

    fn regime_of(&self, unit_id: &UnitId) -> Result<OwnershipRegime, AllocationError> {
        let unit = self.catalog.unit(unit_id)?;
        unit.regime()
            .ok_or_else(|| AllocationError::UnsupportedRegime {
                unit: unit.unit_id.clone(),
                tag: unit.ownership_tag.clone(),
            })
    }

    fn project_plan(
        &self,
        project_id: &ProjectId,
    ) -> Result<BTreeMap<UnitId, PlannedUnit>, AllocationError> {
        let mut plan = BTreeMap::new();
        for unit_id in self.catalog.unit_ids_for_project(project_id)? {
            let unit = self.catalog.unit(&unit_id)?;
            let regime = unit
                .regime()
                .ok_or_else(|| AllocationError::UnsupportedRegime {
                    unit: unit_id.clone(),
                    tag: unit.ownership_tag.clone(),
                })?;
            plan.insert(
                unit_id,
                PlannedUnit {
                    regime,
                    room_count: unit.room_count,
                },
            );
        }
        Ok(plan)
    }
}

/// HITAS and half-HITAS applications may be placed on either kind of lottery unit.
fn regimes_compatible(declared: OwnershipRegime, actual: OwnershipRegime) -> bool {
    declared == actual || (declared.uses_lottery() && actual.uses_lottery())
}

fn holders(tx: &QueueTransaction) -> BTreeMap<UnitId, ReservationId> {
    tx.units()
        .filter_map(|queue| {
            queue
                .active()
                .into_iter()
                .find(|reservation| reservation.state.holds_unit())
                .map(|reservation| (queue.unit_id().clone(), reservation.id))
        })
        .collect()
}
