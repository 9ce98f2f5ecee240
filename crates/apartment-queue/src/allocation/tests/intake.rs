use super::common::*;
use crate::allocation::domain::{ApplicationId, OwnershipRegime, QueueChangeKind};
use crate::allocation::{AllocationError, CatalogError, ErrorKind, ReservationState};

#[test]
fn haso_queue_is_ordered_by_ascending_key() {
    let service = service(haso_units(&["A1"]));
    add(&service, &haso_application("app-30", 30, &["A1"]));
    add(&service, &haso_application("app-10", 10, &["A1"]));
    add(&service, &haso_application("app-20", 20, &["A1"]));

    assert_eq!(queue_order(&service, "A1"), ["app-10", "app-20", "app-30"]);

    let list: Vec<u32> = service
        .active_queue(&unit_id("A1"))
        .iter()
        .map(|reservation| reservation.list_position)
        .collect();
    assert_eq!(list, [1, 2, 3]);
}

#[test]
fn late_arrival_never_overtakes_on_time_entries() {
    let service = service(haso_units(&["A1"]));
    add(&service, &haso_application("on-time-10", 10, &["A1"]));
    add(&service, &haso_application("on-time-20", 20, &["A1"]));
    add(&service, &late_haso_application("late-1", 1, &["A1"]));

    assert_eq!(
        queue_order(&service, "A1"),
        ["on-time-10", "on-time-20", "late-1"]
    );

    add(&service, &haso_application("on-time-15", 15, &["A1"]));
    add(&service, &late_haso_application("late-5", 5, &["A1"]));
    add(&service, &late_haso_application("late-0", 0, &["A1"]));
    add(&service, &haso_application("on-time-99", 99, &["A1"]));

    assert_eq!(
        queue_order(&service, "A1"),
        [
            "on-time-10",
            "on-time-15",
            "on-time-20",
            "on-time-99",
            "late-0",
            "late-1",
            "late-5",
        ]
    );
}

#[test]
fn equal_keys_keep_arrival_order() {
    let service = service(haso_units(&["A1"]));
    add(&service, &haso_application("first", 10, &["A1"]));
    add(&service, &haso_application("second", 10, &["A1"]));

    assert_eq!(queue_order(&service, "A1"), ["first", "second"]);
}

#[test]
fn lottery_units_append_in_arrival_order() {
    let service = service(hitas_units(&["H1"], 2));
    for id in ["app-c", "app-a", "app-b"] {
        add(&service, &hitas_application(id, false, &["H1"]));
    }

    assert_eq!(queue_order(&service, "H1"), ["app-c", "app-a", "app-b"]);
    assert!(service
        .active_queue(&unit_id("H1"))
        .iter()
        .all(|reservation| reservation.priority_key.is_none()));
}

#[test]
fn late_claim_on_an_empty_distributed_unit_starts_holding() {
    let service = service(haso_units(&["A1", "A2"]));
    add(&service, &haso_application("on-time", 10, &["A2"]));
    service.distribute_units(&project(), None).expect("distribution");

    add(&service, &late_haso_application("late", 40, &["A1", "A2"]));

    assert_eq!(state_of(&service, "A1", "late"), ReservationState::Holding);
    assert_eq!(state_of(&service, "A2", "late"), ReservationState::Submitted);
    assert_eq!(state_of(&service, "A2", "on-time"), ReservationState::Holding);
}

#[test]
fn late_claim_before_the_lottery_waits_for_on_time_applicants() {
    let service = service(haso_units(&["A1"]));
    add(&service, &late_haso_application("late", 1, &["A1"]));
    assert_eq!(state_of(&service, "A1", "late"), ReservationState::Submitted);

    add(&service, &haso_application("on-time", 5, &["A1"]));
    service.distribute_units(&project(), None).expect("distribution");

    assert_eq!(queue_order(&service, "A1"), ["on-time", "late"]);
    assert_eq!(state_of(&service, "A1", "on-time"), ReservationState::Holding);
    assert_eq!(state_of(&service, "A1", "late"), ReservationState::Submitted);
}

#[test]
fn on_time_claim_on_an_empty_unit_starts_submitted() {
    let service = service(haso_units(&["A1"]));
    add(&service, &haso_application("app-1", 10, &["A1"]));

    assert_eq!(state_of(&service, "A1", "app-1"), ReservationState::Submitted);
}

#[test]
fn reservation_links_back_to_its_choice() {
    let service = service(haso_units(&["A1", "A2"]));
    let ids = add(&service, &haso_application("app-1", 10, &["A2", "A1"]));
    assert_eq!(ids.len(), 2);

    let second_choice = find(&service, "A1", "app-1");
    assert_eq!(second_choice.priority_number(), Some(2));
    assert_eq!(second_choice.priority_key, Some(10));
    assert_eq!(ids[1], second_choice.id);

    let history = service.state_history(&second_choice.id).expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].state, ReservationState::Submitted);

    let added = service.queue_history(&unit_id("A1"));
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].kind, QueueChangeKind::Added);
    assert_eq!(added[0].queue_position, Some(1));
}

#[test]
fn haso_application_without_key_is_rejected_before_any_write() {
    let service = service(haso_units(&["A1", "A2"]));
    let mut application = haso_application("app-1", 10, &["A1", "A2"]);
    application.right_of_occupancy = None;

    let err = service
        .add_application_to_queues(&application)
        .expect_err("key required");
    assert!(matches!(err, AllocationError::MissingOrderingKey { .. }));
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(service.reservations(&unit_id("A1")).is_empty());
    assert!(service.reservations(&unit_id("A2")).is_empty());
}

#[test]
fn second_intake_of_the_same_application_is_rejected() {
    let service = service(haso_units(&["A1", "A2"]));
    let application = haso_application("app-1", 10, &["A1"]);
    add(&service, &application);

    let mut again = application.clone();
    again.choices = haso_application("app-1", 10, &["A2", "A1"]).choices;
    let err = service
        .add_application_to_queues(&again)
        .expect_err("duplicate rejected");

    assert!(matches!(
        err,
        AllocationError::DuplicateReservation { ref unit, .. } if *unit == unit_id("A1")
    ));
    assert_eq!(err.kind(), ErrorKind::Validation);
    // The A2 reservation created earlier in the same call was rolled back.
    assert!(service.reservations(&unit_id("A2")).is_empty());
    assert_eq!(service.reservations(&unit_id("A1")).len(), 1);
}

#[test]
fn same_unit_twice_in_one_application_is_rejected() {
    let service = service(haso_units(&["A1"]));
    let application = haso_application("app-1", 10, &["A1", "A1"]);

    assert!(matches!(
        service.add_application_to_queues(&application),
        Err(AllocationError::DuplicateReservation { .. })
    ));
}

#[test]
fn application_regime_must_match_the_unit() {
    let mut units = haso_units(&["A1"]);
    units.extend(hitas_units(&["H1"], 2));
    units.push(unit("Q1", "half_hitas", 2));
    let service = service(units);

    let err = service
        .add_application_to_queues(&hitas_application("app-1", false, &["A1"]))
        .expect_err("hitas application on haso unit");
    assert!(matches!(
        err,
        AllocationError::RegimeMismatch {
            declared: OwnershipRegime::Hitas,
            actual: OwnershipRegime::Haso,
            ..
        }
    ));

    add(&service, &hitas_application("app-2", false, &["H1", "Q1"]));
    assert_eq!(queue_order(&service, "Q1"), ["app-2"]);
}

#[test]
fn unknown_units_and_tags_are_reported() {
    let mut units = haso_units(&["A1"]);
    units.push(unit("R1", "rental", 2));
    let service = service(units);

    let err = service
        .add_application_to_queues(&haso_application("app-1", 10, &["A1", "Z9"]))
        .expect_err("unknown unit");
    assert!(matches!(
        err,
        AllocationError::Catalog(CatalogError::UnitNotFound(_))
    ));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = service
        .add_application_to_queues(&haso_application("app-1", 10, &["R1"]))
        .expect_err("unsupported tag");
    assert!(matches!(
        err,
        AllocationError::UnsupportedRegime { ref tag, .. } if tag == "rental"
    ));
    assert!(service.reservations(&unit_id("A1")).is_empty());
}

#[test]
fn application_without_choices_is_rejected() {
    let service = service(haso_units(&["A1"]));
    let application = haso_application("app-1", 10, &[]);

    assert!(matches!(
        service.add_application_to_queues(&application),
        Err(AllocationError::NoChoices(ApplicationId(id))) if id == "app-1"
    ));
}

#[test]
fn intake_comment_is_recorded_on_audit_entries() {
    let service = service(haso_units(&["A1"]));
    let ids = service
        .add_application_with_comment(
            &haso_application("app-1", 10, &["A1"]),
            Some("entered by sales".to_string()),
        )
        .expect("accepted");

    let history = service.state_history(&ids[0]).expect("history");
    assert_eq!(history[0].comment.as_deref(), Some("entered by sales"));
    assert_eq!(
        service.queue_history(&unit_id("A1"))[0].comment.as_deref(),
        Some("entered by sales")
    );
}
