use std::io;

use apartment_queue::allocation::{
    AllocationError, ApplicantId, ApplicationId, CascadeReport, DistributionSummary,
    InMemoryUnitCatalog, ProjectId, ReservationState, UnitCatalog, UnitId,
};
use apartment_queue::error::AppError;
use serde::Serialize;

use crate::infra::{CliService, OutputFormat};

#[derive(Debug, Serialize)]
pub(crate) struct AllocationReport {
    pub(crate) projects: Vec<ProjectReport>,
    pub(crate) rejected: Vec<RejectedApplication>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RejectedApplication {
    pub(crate) application_id: ApplicationId,
    pub(crate) reason: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ProjectReport {
    pub(crate) project_id: ProjectId,
    pub(crate) distributed_units: Vec<UnitId>,
    pub(crate) units: Vec<UnitReport>,
    pub(crate) cascade: CascadeReport,
}

#[derive(Debug, Serialize)]
pub(crate) struct UnitReport {
    pub(crate) unit_id: UnitId,
    pub(crate) ownership: String,
    pub(crate) room_count: u8,
    pub(crate) lottery_recorded: bool,
    pub(crate) queue: Vec<QueueRow>,
}

/// One active reservation as shown to sales staff.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct QueueRow {
    pub(crate) queue_position: u32,
    pub(crate) list_position: u32,
    pub(crate) application_id: Option<ApplicationId>,
    pub(crate) applicant_id: Option<ApplicantId>,
    pub(crate) state: ReservationState,
    pub(crate) priority_key: Option<u32>,
    pub(crate) late: bool,
    pub(crate) has_children: bool,
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    project_id: &'a ProjectId,
    unit_id: &'a UnitId,
    queue_position: u32,
    list_position: u32,
    application_id: Option<&'a ApplicationId>,
    applicant_id: Option<&'a ApplicantId>,
    state: ReservationState,
    priority_key: Option<u32>,
    late: bool,
}

pub(crate) fn project_report(
    service: &CliService,
    catalog: &InMemoryUnitCatalog,
    summary: DistributionSummary,
) -> Result<ProjectReport, AllocationError> {
    let mut units = Vec::new();
    for unit_id in catalog.unit_ids_for_project(&summary.project_id)? {
        let unit = catalog.unit(&unit_id)?;
        let queue = service
            .active_queue(&unit_id)
            .into_iter()
            .map(|reservation| QueueRow {
                queue_position: reservation.queue_position.unwrap_or_default(),
                list_position: reservation.list_position,
                application_id: reservation.application_id().cloned(),
                applicant_id: reservation.applicant_id.clone(),
                state: reservation.state,
                priority_key: reservation.priority_key,
                late: reservation.submitted_late,
                has_children: reservation.has_children,
            })
            .collect();

        units.push(UnitReport {
            lottery_recorded: service.lottery_event(&unit_id).is_some(),
            unit_id,
            ownership: unit.ownership_tag,
            room_count: unit.room_count,
            queue,
        });
    }

    Ok(ProjectReport {
        project_id: summary.project_id,
        distributed_units: summary.distributed_units,
        units,
        cascade: summary.cascade,
    })
}

pub(crate) fn render(report: &AllocationReport, format: OutputFormat) -> Result<(), AppError> {
    match format {
        OutputFormat::Table => {
            render_table(report);
            Ok(())
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
            Ok(())
        }
        OutputFormat::Csv => render_csv(report),
    }
}

fn render_table(report: &AllocationReport) {
    for project in &report.projects {
        println!(
            "Project {} ({} units distributed in this run)",
            project.project_id,
            project.distributed_units.len()
        );
        for unit in &project.units {
            println!(
                "\n  {} [{}; {} rooms]",
                unit.unit_id, unit.ownership, unit.room_count
            );
            if unit.queue.is_empty() {
                println!("    queue empty");
                continue;
            }
            for row in &unit.queue {
                let application = row
                    .application_id
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "-".to_string());
                let key = row
                    .priority_key
                    .map(|key| format!("key {key}"))
                    .unwrap_or_default();
                println!(
                    "    {:>3}. {:<12} {:<14} {:<10}{}{}",
                    row.queue_position,
                    application,
                    row.state,
                    key,
                    if row.late { " late" } else { "" },
                    if row.has_children { " children" } else { "" },
                );
            }
        }

        let cascade = &project.cascade;
        println!(
            "\n  Cascade: {} winners, {} ties, {} cancelled, {} left for staff\n",
            cascade.winners.len(),
            cascade.ties.len(),
            cascade.cancelled.len(),
            cascade.manual_review.len()
        );
    }

    if report.rejected.is_empty() {
        println!("Rejected applications: none");
    } else {
        println!("Rejected applications");
        for rejected in &report.rejected {
            println!("  - {}: {}", rejected.application_id, rejected.reason);
        }
    }
}

fn render_csv(report: &AllocationReport) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    for project in &report.projects {
        for unit in &project.units {
            for row in &unit.queue {
                writer.serialize(CsvRow {
                    project_id: &project.project_id,
                    unit_id: &unit.unit_id,
                    queue_position: row.queue_position,
                    list_position: row.list_position,
                    application_id: row.application_id.as_ref(),
                    applicant_id: row.applicant_id.as_ref(),
                    state: row.state,
                    priority_key: row.priority_key,
                    late: row.late,
                })?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}
