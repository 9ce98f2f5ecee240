use std::sync::Arc;

use chrono::Utc;

use crate::allocation::domain::{
    ApplicantId, Application, ApplicationChoice, ApplicationId, ChoiceLink, OwnershipRegime,
    ProjectId, Reservation, ReservationId, UnitId,
};
use crate::allocation::{
    seeded_rng, AllocationService, InMemoryUnitCatalog, QueueStore, ReservationState,
    UnitMetadata,
};
use crate::config::AllocationConfig;

pub(super) const PROJECT: &str = "P-100";

pub(super) fn unit_id(id: &str) -> UnitId {
    UnitId(id.to_string())
}

pub(super) fn project() -> ProjectId {
    ProjectId(PROJECT.to_string())
}

pub(super) fn unit(id: &str, tag: &str, room_count: u8) -> UnitMetadata {
    UnitMetadata {
        unit_id: unit_id(id),
        project_id: project(),
        ownership_tag: tag.to_string(),
        room_count,
    }
}

pub(super) fn haso_units(ids: &[&str]) -> Vec<UnitMetadata> {
    ids.iter().map(|id| unit(id, "haso", 2)).collect()
}

pub(super) fn hitas_units(ids: &[&str], room_count: u8) -> Vec<UnitMetadata> {
    ids.iter().map(|id| unit(id, "hitas", room_count)).collect()
}

fn choices(units: &[&str]) -> Vec<ApplicationChoice> {
    units
        .iter()
        .enumerate()
        .map(|(index, id)| ApplicationChoice {
            unit_id: unit_id(id),
            priority_number: index as u32 + 1,
        })
        .collect()
}

pub(super) fn haso_application(id: &str, key: u32, units: &[&str]) -> Application {
    Application {
        id: ApplicationId(id.to_string()),
        applicant_id: ApplicantId(format!("applicant-{id}")),
        regime: OwnershipRegime::Haso,
        right_of_occupancy: Some(key),
        has_children: false,
        submitted_late: false,
        choices: choices(units),
    }
}

pub(super) fn late_haso_application(id: &str, key: u32, units: &[&str]) -> Application {
    Application {
        submitted_late: true,
        ..haso_application(id, key, units)
    }
}

pub(super) fn hitas_application(id: &str, has_children: bool, units: &[&str]) -> Application {
    Application {
        id: ApplicationId(id.to_string()),
        applicant_id: ApplicantId(format!("applicant-{id}")),
        regime: OwnershipRegime::Hitas,
        right_of_occupancy: None,
        has_children,
        submitted_late: false,
        choices: choices(units),
    }
}

pub(super) type TestService = AllocationService<InMemoryUnitCatalog>;

pub(super) fn service_with(units: Vec<UnitMetadata>, config: AllocationConfig, seed: u64) -> TestService {
    AllocationService::with_rng(
        Arc::new(InMemoryUnitCatalog::new(units)),
        Arc::new(QueueStore::new()),
        config,
        seeded_rng(seed),
    )
}

pub(super) fn service(units: Vec<UnitMetadata>) -> TestService {
    service_with(units, AllocationConfig::default(), 7)
}

pub(super) fn add(service: &TestService, application: &Application) -> Vec<ReservationId> {
    service
        .add_application_to_queues(application)
        .expect("application accepted")
}

/// Application ids of the unit's active queue, in queue order.
pub(super) fn queue_order(service: &TestService, unit: &str) -> Vec<String> {
    service
        .active_queue(&unit_id(unit))
        .iter()
        .map(application_of)
        .collect()
}

pub(super) fn application_of(reservation: &Reservation) -> String {
    reservation
        .application_id()
        .map(|id| id.0.clone())
        .unwrap_or_default()
}

/// State of the reservation `application` holds on `unit`.
pub(super) fn state_of(service: &TestService, unit: &str, application: &str) -> ReservationState {
    find(service, unit, application).state
}

pub(super) fn find(service: &TestService, unit: &str, application: &str) -> Reservation {
    service
        .reservations(&unit_id(unit))
        .into_iter()
        .find(|reservation| application_of(reservation) == application)
        .expect("reservation exists")
}

/// Bare reservation for exercising `UnitQueue` directly; positions are assigned on insert.
pub(super) fn draft(unit: &str, application: &str) -> Reservation {
    Reservation {
        id: ReservationId::new(),
        unit_id: unit_id(unit),
        applicant_id: Some(ApplicantId(format!("applicant-{application}"))),
        choice: Some(ChoiceLink {
            application_id: ApplicationId(application.to_string()),
            priority_number: 1,
        }),
        list_position: 0,
        queue_position: None,
        state: ReservationState::Submitted,
        priority_key: None,
        submitted_late: false,
        has_children: false,
        cancellation_reason: None,
        created_at: Utc::now(),
    }
}
