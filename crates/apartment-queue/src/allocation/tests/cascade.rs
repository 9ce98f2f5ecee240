use super::common::*;
use crate::allocation::{CancellationReason, ReservationState};
use crate::config::AllocationConfig;

fn cyclic_project(config: AllocationConfig) -> TestService {
    let service = service_with(haso_units(&["U1", "U2", "U3"]), config, 1);
    add(&service, &haso_application("A", 1, &["U1", "U2", "U3"]));
    add(&service, &haso_application("B", 2, &["U2", "U3", "U1"]));
    add(&service, &haso_application("C", 3, &["U1", "U2", "U3"]));
    service
}

#[test]
fn cyclic_preferences_settle_with_one_holder_per_unit() {
    let service = cyclic_project(AllocationConfig::default());
    let summary = service.distribute_units(&project(), None).expect("distribution");

    assert_eq!(state_of(&service, "U1", "A"), ReservationState::Holding);
    assert_eq!(state_of(&service, "U2", "B"), ReservationState::Holding);
    assert_eq!(state_of(&service, "U3", "C"), ReservationState::Holding);
    assert_eq!(summary.holders.len(), 3);

    for (unit, application) in [("U2", "A"), ("U3", "A"), ("U3", "B"), ("U1", "B")] {
        let reservation = find(&service, unit, application);
        assert_eq!(reservation.state, ReservationState::Cancelled, "{application} on {unit}");
        assert_eq!(
            reservation.cancellation_reason,
            Some(CancellationReason::LowerPriority)
        );
    }
    // C's better-ranked claims stay queued behind the holders.
    assert_eq!(state_of(&service, "U1", "C"), ReservationState::Submitted);
    assert_eq!(state_of(&service, "U2", "C"), ReservationState::Submitted);

    for unit in ["U1", "U2", "U3"] {
        let holding = service
            .active_queue(&unit_id(unit))
            .iter()
            .filter(|reservation| reservation.state == ReservationState::Holding)
            .count();
        assert_eq!(holding, 1, "unit {unit}");
    }
}

#[test]
fn cascade_cancellation_is_audited() {
    let service = cyclic_project(AllocationConfig::default());
    service.distribute_units(&project(), None).expect("distribution");

    let cancelled = find(&service, "U2", "A");
    let history = service.state_history(&cancelled.id).expect("history");
    let last = history.last().expect("cancellation recorded");
    assert_eq!(last.state, ReservationState::Cancelled);
    assert_eq!(last.comment.as_deref(), Some("won unit U1 with priority 1"));
    assert_eq!(last.actor, None);
}

fn swap_project(config: AllocationConfig) -> TestService {
    let service = service_with(haso_units(&["U1", "U2"]), config, 1);
    add(&service, &haso_application("X", 1, &["U2", "U1"]));
    add(&service, &haso_application("Y", 2, &["U1"]));
    service
}

#[test]
fn winning_a_better_unit_releases_a_held_one() {
    let service = swap_project(AllocationConfig::default());
    let summary = service.distribute_units(&project(), None).expect("distribution");

    assert_eq!(state_of(&service, "U2", "X"), ReservationState::Holding);
    assert_eq!(state_of(&service, "U1", "X"), ReservationState::Cancelled);
    assert_eq!(state_of(&service, "U1", "Y"), ReservationState::Holding);
    assert_eq!(
        summary.holders.get(&unit_id("U1")),
        Some(&find(&service, "U1", "Y").id)
    );
}

#[test]
fn held_claims_can_be_left_for_staff() {
    let config = AllocationConfig {
        cascade_cancels_holding: false,
        ..AllocationConfig::default()
    };
    let service = swap_project(config);
    let summary = service.distribute_units(&project(), None).expect("distribution");

    assert_eq!(state_of(&service, "U1", "X"), ReservationState::Holding);
    assert_eq!(state_of(&service, "U2", "X"), ReservationState::Holding);
    assert_eq!(state_of(&service, "U1", "Y"), ReservationState::Submitted);
    assert_eq!(
        summary.cascade.manual_review,
        [(unit_id("U1"), find(&service, "U1", "X").id)]
    );
}

/// X and Y share key 5. X prefers `better` over `contested`; Y only wants `contested`.
fn contested_outcome(better: &str, contested: &str) -> [ReservationState; 3] {
    let service = service(haso_units(&[better, contested]));
    add(&service, &haso_application("X", 5, &[better, contested]));
    add(&service, &haso_application("Y", 5, &[contested]));
    service.distribute_units(&project(), None).expect("distribution");

    [
        state_of(&service, better, "X"),
        state_of(&service, contested, "X"),
        state_of(&service, contested, "Y"),
    ]
}

#[test]
fn unit_naming_does_not_change_who_wins() {
    let contested_sorts_first = contested_outcome("U2", "U1");
    let contested_sorts_last = contested_outcome("U1", "U2");

    assert_eq!(contested_sorts_first, contested_sorts_last);
    assert_eq!(
        contested_sorts_first,
        [
            ReservationState::Holding,
            ReservationState::Cancelled,
            ReservationState::Holding,
        ]
    );
}

#[test]
fn tie_broken_by_a_winner_elsewhere_is_not_reported() {
    let service = service(haso_units(&["U1", "U2"]));
    add(&service, &haso_application("X", 5, &["U2", "U1"]));
    add(&service, &haso_application("Z", 5, &["U1"]));

    let summary = service.distribute_units(&project(), None).expect("distribution");

    assert_eq!(state_of(&service, "U2", "X"), ReservationState::Holding);
    assert_eq!(state_of(&service, "U1", "X"), ReservationState::Cancelled);
    assert_eq!(state_of(&service, "U1", "Z"), ReservationState::Holding);
    assert!(summary.cascade.ties.is_empty());
    assert!(summary.cascade.manual_review.is_empty());
}

#[test]
fn claims_under_review_are_left_for_staff() {
    let service = service(haso_units(&["U1", "U2"]));
    add(&service, &haso_application("W", 1, &["U2"]));
    add(&service, &haso_application("X", 5, &["U2", "U1"]));
    add(&service, &haso_application("Z", 5, &["U1"]));

    let summary = service.distribute_units(&project(), None).expect("distribution");
    assert_eq!(state_of(&service, "U2", "W"), ReservationState::Holding);
    assert_eq!(state_of(&service, "U1", "X"), ReservationState::NeedsReview);
    assert_eq!(state_of(&service, "U1", "Z"), ReservationState::NeedsReview);
    assert_eq!(summary.cascade.ties.len(), 1);

    let holder = find(&service, "U2", "W");
    service
        .cancel_reservation(&holder.id, CancellationReason::OfferRejected, None, None)
        .expect("cancel holder");

    // X now holds its first choice, but its claim under review is not cancelled automatically.
    assert_eq!(state_of(&service, "U2", "X"), ReservationState::Holding);
    assert_eq!(state_of(&service, "U1", "X"), ReservationState::NeedsReview);
    assert_eq!(state_of(&service, "U1", "Z"), ReservationState::NeedsReview);
}

#[test]
fn cancelling_a_holder_promotes_the_next_and_cascades() {
    let service = service(haso_units(&["U1", "U2"]));
    add(&service, &haso_application("W", 1, &["U1"]));
    add(&service, &haso_application("R", 2, &["U1", "U2"]));
    service.distribute_units(&project(), None).expect("distribution");

    assert_eq!(state_of(&service, "U1", "W"), ReservationState::Holding);
    assert_eq!(state_of(&service, "U2", "R"), ReservationState::Holding);

    let winner = find(&service, "U1", "W");
    let event = service
        .cancel_reservation(&winner.id, CancellationReason::OfferRejected, None, None)
        .expect("cancel winner");
    assert_eq!(event.cancellation_reason, Some(CancellationReason::OfferRejected));

    assert_eq!(state_of(&service, "U1", "W"), ReservationState::Cancelled);
    assert_eq!(state_of(&service, "U1", "R"), ReservationState::Holding);
    let released = find(&service, "U2", "R");
    assert_eq!(released.state, ReservationState::Cancelled);
    assert_eq!(
        released.cancellation_reason,
        Some(CancellationReason::LowerPriority)
    );
    assert!(service.active_queue(&unit_id("U2")).is_empty());
}

#[test]
fn cancelling_a_waiting_claim_leaves_the_holder_untouched() {
    let service = service(haso_units(&["U1"]));
    add(&service, &haso_application("W", 1, &["U1"]));
    add(&service, &haso_application("R", 2, &["U1"]));
    add(&service, &haso_application("S", 3, &["U1"]));
    service.distribute_units(&project(), None).expect("distribution");

    let waiting = find(&service, "U1", "R");
    service
        .cancel_reservation(&waiting.id, CancellationReason::Other, None, None)
        .expect("cancel waiting claim");

    assert_eq!(state_of(&service, "U1", "W"), ReservationState::Holding);
    assert_eq!(queue_order(&service, "U1"), ["W", "S"]);
    assert_eq!(find(&service, "U1", "S").queue_position, Some(2));
}

#[test]
fn cancelling_before_distribution_does_not_pick_a_winner() {
    let service = service(haso_units(&["U1"]));
    add(&service, &haso_application("W", 1, &["U1"]));
    add(&service, &haso_application("R", 2, &["U1"]));

    let first = find(&service, "U1", "W");
    service
        .cancel_reservation(&first.id, CancellationReason::Other, None, None)
        .expect("cancel");

    assert_eq!(state_of(&service, "U1", "R"), ReservationState::Submitted);
    assert!(service.lottery_event(&unit_id("U1")).is_none());
}
