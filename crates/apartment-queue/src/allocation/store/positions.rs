use std::collections::HashSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::StoreError;
use crate::allocation::domain::{
    ApplicationId, LotteryEvent, QueueChangeEvent, QueueChangeKind, Reservation, ReservationId,
    StateChangeEvent, UnitId,
};
use crate::allocation::error::AllocationError;
use crate::allocation::state::{validate_transition, ReservationState, StateChange};

/// Everything recorded for one unit: its reservations, their audit trails, and the lottery.
///
/// `reservations` is kept sorted by `list_position`. Positions only change through
/// [`UnitQueue::insert_at`], [`UnitQueue::remove_from_queue`] and [`UnitQueue::apply_order`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitQueue {
    unit_id: UnitId,
    reservations: Vec<Reservation>,
    state_events: Vec<StateChangeEvent>,
    queue_events: Vec<QueueChangeEvent>,
    lottery: Option<LotteryEvent>,
}

impl UnitQueue {
    pub fn new(unit_id: UnitId) -> Self {
        Self {
            unit_id,
            reservations: Vec::new(),
            state_events: Vec::new(),
            queue_events: Vec::new(),
            lottery: None,
        }
    }

    pub fn unit_id(&self) -> &UnitId {
        &self.unit_id
    }

    /// All reservations ever created for the unit, in list order.
    pub fn reservations(&self) -> &[Reservation] {
        &self.reservations
    }

    pub fn reservation(&self, id: &ReservationId) -> Option<&Reservation> {
        self.reservations.iter().find(|reservation| &reservation.id == id)
    }

    /// Active reservations ordered by queue position.
    pub fn active(&self) -> Vec<&Reservation> {
        let mut active: Vec<&Reservation> = self
            .reservations
            .iter()
            .filter(|reservation| reservation.is_active())
            .collect();
        active.sort_by_key(|reservation| reservation.queue_position);
        active
    }

    pub fn first_active(&self) -> Option<&Reservation> {
        self.reservations
            .iter()
            .filter(|reservation| reservation.is_active())
            .min_by_key(|reservation| reservation.queue_position)
    }

    pub fn list_len(&self) -> u32 {
        self.reservations.len() as u32
    }

    pub fn active_len(&self) -> u32 {
        self.reservations
            .iter()
            .filter(|reservation| reservation.is_active())
            .count() as u32
    }

    pub fn has_application(&self, application_id: &ApplicationId) -> bool {
        self.reservations
            .iter()
            .any(|reservation| reservation.application_id() == Some(application_id))
    }

    pub fn lottery(&self) -> Option<&LotteryEvent> {
        self.lottery.as_ref()
    }

    pub fn is_distributed(&self) -> bool {
        self.lottery.is_some()
    }

    pub fn state_events(&self) -> &[StateChangeEvent] {
        &self.state_events
    }

    pub fn history_of(&self, id: &ReservationId) -> Vec<StateChangeEvent> {
        self.state_events
            .iter()
            .filter(|event| &event.reservation_id == id)
            .cloned()
            .collect()
    }

    pub fn queue_events(&self) -> &[QueueChangeEvent] {
        &self.queue_events
    }

    /// Shifts the tail and places `reservation` at the freed positions.
    pub fn insert_at(
        &mut self,
        mut reservation: Reservation,
        list_position: u32,
        queue_position: u32,
    ) -> Result<(), StoreError> {
        let list_max = self.list_len() + 1;
        if list_position == 0 || list_position > list_max {
            return Err(StoreError::PositionOutOfRange {
                unit: self.unit_id.clone(),
                kind: "list",
                position: list_position,
                max: list_max,
            });
        }
        let queue_max = self.active_len() + 1;
        if queue_position == 0 || queue_position > queue_max {
            return Err(StoreError::PositionOutOfRange {
                unit: self.unit_id.clone(),
                kind: "queue",
                position: queue_position,
                max: queue_max,
            });
        }
        if self.reservation(&reservation.id).is_some() {
            return Err(StoreError::InvariantViolation {
                unit: self.unit_id.clone(),
                detail: format!("reservation {} inserted twice", reservation.id),
            });
        }

        for existing in &mut self.reservations {
            if existing.list_position >= list_position {
                existing.list_position += 1;
            }
            if let Some(position) = existing.queue_position.as_mut() {
                if *position >= queue_position {
                    *position += 1;
                }
            }
        }

        reservation.unit_id = self.unit_id.clone();
        reservation.list_position = list_position;
        reservation.queue_position = Some(queue_position);

        let index = self
            .reservations
            .partition_point(|existing| existing.list_position < list_position);
        self.reservations.insert(index, reservation);
        Ok(())
    }

    /// Inserts a new reservation and writes its `Added` queue entry and initial state event.
    pub fn admit(
        &mut self,
        reservation: Reservation,
        list_position: u32,
        queue_position: u32,
        initial: StateChange,
    ) -> Result<StateChangeEvent, StoreError> {
        let id = reservation.id;
        let state = reservation.state;
        let now = Utc::now();
        self.insert_at(reservation, list_position, queue_position)?;

        self.queue_events.push(QueueChangeEvent {
            reservation_id: id,
            kind: QueueChangeKind::Added,
            queue_position: Some(queue_position),
            timestamp: now,
            comment: initial.comment.clone(),
        });

        let event = StateChangeEvent {
            reservation_id: id,
            state,
            timestamp: now,
            actor: initial.actor,
            comment: initial.comment,
            cancellation_reason: None,
            replaced_by: None,
        };
        self.state_events.push(event.clone());
        Ok(event)
    }

    /// Takes the reservation out of the active queue and closes the gap behind it.
    ///
    /// Returns the vacated position, or `None` when the reservation was already inactive.
    pub fn remove_from_queue(
        &mut self,
        id: &ReservationId,
        comment: Option<String>,
    ) -> Result<Option<u32>, StoreError> {
        let reservation = self.reservation_mut(id)?;
        let Some(vacated) = reservation.queue_position.take() else {
            return Ok(None);
        };

        for other in &mut self.reservations {
            if let Some(position) = other.queue_position.as_mut() {
                if *position > vacated {
                    *position -= 1;
                }
            }
        }

        self.queue_events.push(QueueChangeEvent {
            reservation_id: *id,
            kind: QueueChangeKind::Removed,
            queue_position: Some(vacated),
            timestamp: Utc::now(),
            comment,
        });
        Ok(Some(vacated))
    }

    /// Validates and applies a state change, appending exactly one audit event.
    ///
    /// Cancelling also removes the reservation from the active queue.
    pub fn set_state(
        &mut self,
        id: &ReservationId,
        change: StateChange,
    ) -> Result<StateChangeEvent, AllocationError> {
        let from = self.reservation_mut(id)?.state;
        validate_transition(from, change.state, change.reason)?;

        if change.state == ReservationState::Cancelled {
            self.remove_from_queue(id, change.comment.clone())?;
        }

        let reservation = self.reservation_mut(id)?;
        reservation.state = change.state;
        if change.reason.is_some() {
            reservation.cancellation_reason = change.reason;
        }

        let event = StateChangeEvent {
            reservation_id: *id,
            state: change.state,
            timestamp: Utc::now(),
            actor: change.actor,
            comment: change.comment,
            cancellation_reason: change.reason,
            replaced_by: change.replaced_by,
        };
        self.state_events.push(event.clone());
        Ok(event)
    }

    /// Rewrites the active queue in the given order.
    ///
    /// `ordered` must name every active reservation exactly once. Queue positions become
    /// `1..=M`; the list positions already held by active reservations are redistributed in
    /// the same order so cancelled history keeps its slots.
    pub fn apply_order(&mut self, ordered: &[ReservationId]) -> Result<(), StoreError> {
        let active: HashSet<ReservationId> = self
            .reservations
            .iter()
            .filter(|reservation| reservation.is_active())
            .map(|reservation| reservation.id)
            .collect();
        let requested: HashSet<ReservationId> = ordered.iter().copied().collect();
        if requested.len() != ordered.len() || requested != active {
            return Err(StoreError::InvariantViolation {
                unit: self.unit_id.clone(),
                detail: "lottery order does not match the active queue".to_string(),
            });
        }

        let mut list_slots: Vec<u32> = self
            .reservations
            .iter()
            .filter(|reservation| reservation.is_active())
            .map(|reservation| reservation.list_position)
            .collect();
        list_slots.sort_unstable();

        for (index, (id, list_position)) in ordered.iter().zip(list_slots).enumerate() {
            let reservation = self.reservation_mut(id)?;
            reservation.queue_position = Some(index as u32 + 1);
            reservation.list_position = list_position;
        }
        self.reservations.sort_by_key(|reservation| reservation.list_position);
        Ok(())
    }

    pub fn record_lottery(&mut self, event: LotteryEvent) -> Result<(), StoreError> {
        if self.lottery.is_some() {
            return Err(StoreError::InvariantViolation {
                unit: self.unit_id.clone(),
                detail: "lottery already recorded".to_string(),
            });
        }
        self.lottery = Some(event);
        Ok(())
    }

    /// Checks positional and audit invariants; any failure is a defect, never corrected here.
    pub fn verify_positions(&self) -> Result<(), StoreError> {
        let violation = |detail: String| StoreError::InvariantViolation {
            unit: self.unit_id.clone(),
            detail,
        };

        let mut list: Vec<u32> = self
            .reservations
            .iter()
            .map(|reservation| reservation.list_position)
            .collect();
        list.sort_unstable();
        if !is_dense(&list) {
            return Err(violation(format!("list positions not dense: {list:?}")));
        }

        let mut queue: Vec<u32> = self
            .reservations
            .iter()
            .filter_map(|reservation| reservation.queue_position)
            .collect();
        queue.sort_unstable();
        if !is_dense(&queue) {
            return Err(violation(format!("queue positions not dense: {queue:?}")));
        }

        let mut applications = HashSet::new();
        for reservation in &self.reservations {
            let cancelled = reservation.state == ReservationState::Cancelled;
            if cancelled == reservation.is_active() {
                return Err(violation(format!(
                    "reservation {} is {} with queue position {:?}",
                    reservation.id, reservation.state, reservation.queue_position
                )));
            }
            if let Some(application) = reservation.application_id() {
                if !applications.insert(application) {
                    return Err(violation(format!(
                        "application {application} has more than one reservation"
                    )));
                }
            }
            let recorded = self
                .state_events
                .iter()
                .rev()
                .find(|event| event.reservation_id == reservation.id)
                .map(|event| event.state);
            if recorded != Some(reservation.state) {
                return Err(violation(format!(
                    "reservation {} state {} missing from audit trail",
                    reservation.id, reservation.state
                )));
            }
        }

        Ok(())
    }

    fn reservation_mut(&mut self, id: &ReservationId) -> Result<&mut Reservation, StoreError> {
        let unit = &self.unit_id;
        self.reservations
            .iter_mut()
            .find(|reservation| &reservation.id == id)
            .ok_or_else(|| StoreError::ReservationNotFound {
                unit: unit.clone(),
                reservation: *id,
            })
    }
}

fn is_dense(sorted: &[u32]) -> bool {
    sorted
        .iter()
        .enumerate()
        .all(|(index, position)| *position == index as u32 + 1)
}
