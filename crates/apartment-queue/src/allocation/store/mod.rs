//! In-memory backing store for unit queues.
//!
//! Each unit's reservation set sits behind its own mutex. A transaction locks every unit it
//! names (in sorted order, so overlapping transactions cannot deadlock), works on private
//! copies, and only writes them back once the closure succeeded and every touched unit still
//! satisfies its positional invariants.

mod positions;

pub use positions::UnitQueue;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::domain::{ReservationId, UnitId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unit {0} is not locked by this transaction")]
    UnitNotLocked(UnitId),
    #[error("reservation {reservation} not found on unit {unit}")]
    ReservationNotFound {
        unit: UnitId,
        reservation: ReservationId,
    },
    #[error("{kind} position {position} out of range 1..={max} on unit {unit}")]
    PositionOutOfRange {
        unit: UnitId,
        kind: &'static str,
        position: u32,
        max: u32,
    },
    #[error("queue invariant violated on unit {unit}: {detail}")]
    InvariantViolation { unit: UnitId, detail: String },
}

type UnitHandle = Arc<Mutex<UnitQueue>>;

#[derive(Debug, Default)]
pub struct QueueStore {
    registry: Mutex<HashMap<UnitId, UnitHandle>>,
    index: Mutex<HashMap<ReservationId, UnitId>>,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `work` with exclusive ownership of `units`; commits only on success.
    pub fn transaction<T, E, F>(&self, units: &BTreeSet<UnitId>, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut QueueTransaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        let handles: Vec<UnitHandle> = {
            let mut registry = lock(&self.registry);
            units
                .iter()
                .map(|unit_id| {
                    registry
                        .entry(unit_id.clone())
                        .or_insert_with(|| Arc::new(Mutex::new(UnitQueue::new(unit_id.clone()))))
                        .clone()
                })
                .collect()
        };

        let mut guards: Vec<MutexGuard<'_, UnitQueue>> = handles
            .iter()
            .map(|handle| lock(handle.as_ref()))
            .collect();

        let mut tx = QueueTransaction {
            units: guards
                .iter()
                .map(|guard| (guard.unit_id().clone(), (**guard).clone()))
                .collect(),
            touched: BTreeSet::new(),
        };

        let value = work(&mut tx)?;

        for unit_id in &tx.touched {
            if let Some(queue) = tx.units.get(unit_id) {
                queue.verify_positions()?;
            }
        }

        let mut indexed = Vec::new();
        for guard in guards.iter_mut() {
            if !tx.touched.contains(guard.unit_id()) {
                continue;
            }
            if let Some(updated) = tx.units.remove(guard.unit_id()) {
                indexed.extend(
                    updated
                        .reservations()
                        .iter()
                        .map(|reservation| (reservation.id, updated.unit_id().clone())),
                );
                **guard = updated;
            }
        }
        debug!(units = tx.touched.len(), "queue transaction committed");

        lock(&self.index).extend(indexed);
        Ok(value)
    }

    /// Committed copy of a unit's queue, if anything was ever written for it.
    pub fn snapshot(&self, unit_id: &UnitId) -> Option<UnitQueue> {
        let handle = lock(&self.registry).get(unit_id).cloned()?;
        let queue = lock(handle.as_ref()).clone();
        Some(queue)
    }

    pub fn unit_of(&self, reservation_id: &ReservationId) -> Option<UnitId> {
        lock(&self.index).get(reservation_id).cloned()
    }
}

// Committed state is only replaced wholesale after verification, so a poisoned lock still
// guards consistent data.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Working copies of the locked units for the duration of one transaction.
#[derive(Debug)]
pub struct QueueTransaction {
    units: BTreeMap<UnitId, UnitQueue>,
    touched: BTreeSet<UnitId>,
}

impl QueueTransaction {
    pub fn unit(&self, unit_id: &UnitId) -> Result<&UnitQueue, StoreError> {
        self.units
            .get(unit_id)
            .ok_or_else(|| StoreError::UnitNotLocked(unit_id.clone()))
    }

    pub fn unit_mut(&mut self, unit_id: &UnitId) -> Result<&mut UnitQueue, StoreError> {
        let queue = self
            .units
            .get_mut(unit_id)
            .ok_or_else(|| StoreError::UnitNotLocked(unit_id.clone()))?;
        self.touched.insert(unit_id.clone());
        Ok(queue)
    }

    pub fn units(&self) -> impl Iterator<Item = &UnitQueue> {
        self.units.values()
    }

    /// Locked unit holding the reservation, if any.
    pub fn locate(&self, reservation_id: &ReservationId) -> Option<&UnitId> {
        self.units
            .values()
            .find(|queue| queue.reservation(reservation_id).is_some())
            .map(UnitQueue::unit_id)
    }
}
