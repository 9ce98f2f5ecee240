use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{RngCore, SeedableRng};
use tracing::{debug, info};

use super::domain::{
    ActorId, LotteryEvent, LotteryResult, OwnershipRegime, Reservation, ReservationId, UnitId,
};
use super::error::AllocationError;
use super::store::{QueueTransaction, UnitQueue};
use crate::config::AllocationConfig;

/// Random source driving HITAS lotteries.
pub type LotteryRng = Box<dyn RngCore + Send>;

/// OS-seeded ChaCha generator for production draws.
pub fn entropy_rng() -> LotteryRng {
    Box::new(StdRng::from_entropy())
}

/// Reproducible generator for tests and rehearsals; never use for a real draw.
pub fn seeded_rng(seed: u64) -> LotteryRng {
    Box::new(StdRng::seed_from_u64(seed))
}

/// Draws a new order for the active queue.
///
/// With `prioritise_children` the households with children fill the first block of positions
/// and everyone else the block after it; each block is an independent uniform permutation.
pub fn lottery_order<R>(queue: &UnitQueue, prioritise_children: bool, rng: &mut R) -> Vec<ReservationId>
where
    R: RngCore + ?Sized,
{
    let active = queue.active();

    if !prioritise_children {
        let mut order: Vec<ReservationId> = active.iter().map(|reservation| reservation.id).collect();
        order.shuffle(rng);
        return order;
    }

    let (with_children, without_children): (Vec<&&Reservation>, Vec<&&Reservation>) = active
        .iter()
        .partition(|reservation| reservation.has_children);
    let mut first: Vec<ReservationId> = with_children.iter().map(|reservation| reservation.id).collect();
    let mut second: Vec<ReservationId> = without_children
        .iter()
        .map(|reservation| reservation.id)
        .collect();

    first.shuffle(rng);
    second.shuffle(rng);
    first.extend(second);
    first
}

/// Freezes the order of one unit. Returns `false` when the unit was already distributed.
pub(crate) fn distribute_unit<R>(
    tx: &mut QueueTransaction,
    unit_id: &UnitId,
    regime: OwnershipRegime,
    room_count: u8,
    config: &AllocationConfig,
    rng: &mut R,
    actor: Option<&ActorId>,
) -> Result<bool, AllocationError>
where
    R: RngCore + ?Sized,
{
    if tx.unit(unit_id)?.is_distributed() {
        debug!(unit = %unit_id, "unit already distributed; skipping lottery");
        return Ok(false);
    }

    let queue = tx.unit_mut(unit_id)?;
    let prioritise_children = regime.uses_lottery() && config.prioritises_children(room_count);
    if regime.uses_lottery() {
        let order = lottery_order(queue, prioritise_children, rng);
        queue.apply_order(&order)?;
    }

    let results: Vec<LotteryResult> = queue
        .active()
        .into_iter()
        .map(|reservation| LotteryResult {
            reservation_id: reservation.id,
            result_position: if regime.uses_lottery() {
                reservation.list_position
            } else {
                reservation.queue_position.unwrap_or_default()
            },
        })
        .collect();

    info!(
        unit = %unit_id,
        regime = %regime,
        participants = results.len(),
        prioritise_children,
        "lottery recorded"
    );

    queue.record_lottery(LotteryEvent {
        unit_id: unit_id.clone(),
        performed_at: Utc::now(),
        performed_by: actor.cloned(),
        results,
    })?;
    Ok(true)
}
