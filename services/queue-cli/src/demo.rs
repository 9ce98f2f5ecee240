use std::path::PathBuf;

use apartment_queue::allocation::{ActorId, Application, ErrorKind, ProjectId, UnitMetadata};
use apartment_queue::config::{AllocationConfig, AppConfig, AppEnvironment};
use apartment_queue::error::AppError;
use apartment_queue::import;
use clap::Args;
use tracing::{info, warn};

use crate::infra::{
    allocation_config, build_service, OutputFormat, DEMO_SEED, SAMPLE_APPLICATIONS,
    SAMPLE_UNITS,
};
use crate::report::{project_report, render, AllocationReport, RejectedApplication};

#[derive(Args, Debug)]
pub(crate) struct RunArgs {
    /// Unit catalog CSV (unit_id,project_id,ownership,room_count)
    #[arg(long)]
    pub(crate) units: PathBuf,
    /// Applications CSV (application_id,applicant_id,regime,right_of_occupancy,has_children,late,choices)
    #[arg(long)]
    pub(crate) applications: PathBuf,
    /// Distribute only this project. Defaults to every project in the unit catalog.
    #[arg(long)]
    pub(crate) project: Option<String>,
    /// Seed the lottery for a reproducible rehearsal. Refused in production.
    #[arg(long)]
    pub(crate) seed: Option<u64>,
    /// Staff member recorded on the lottery events.
    #[arg(long)]
    pub(crate) actor: Option<String>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub(crate) format: OutputFormat,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Lottery seed. Defaults to a fixed seed outside production.
    #[arg(long)]
    pub(crate) seed: Option<u64>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub(crate) format: OutputFormat,
}

pub(crate) fn run_allocation(args: RunArgs, config: &AppConfig) -> Result<(), AppError> {
    let RunArgs {
        units,
        applications,
        project,
        seed,
        actor,
        format,
    } = args;

    let units = import::units_from_path(&units)?;
    let applications = import::applications_from_path(&applications)?;
    info!(
        units = units.len(),
        applications = applications.len(),
        "fixtures loaded"
    );

    let report = allocate(
        units,
        &applications,
        project.map(|project| vec![ProjectId(project)]),
        allocation_config(config, seed)?,
        actor.map(ActorId),
    )?;
    render(&report, format)
}

pub(crate) fn run_demo(args: DemoArgs, config: &AppConfig) -> Result<(), AppError> {
    let seed = args
        .seed
        .or((config.environment != AppEnvironment::Production).then_some(DEMO_SEED));

    let units = import::parse_units(SAMPLE_UNITS.as_bytes())?;
    let applications = import::parse_applications(SAMPLE_APPLICATIONS.as_bytes())?;

    let report = allocate(
        units,
        &applications,
        None,
        allocation_config(config, seed)?,
        Some(ActorId("demo".to_string())),
    )?;
    render(&report, args.format)
}

/// Runs intake for every application, then distributes the requested projects.
///
/// Rejected applications are reported and skipped; broken queues or an unavailable catalog
/// abort the run.
pub(crate) fn allocate(
    units: Vec<UnitMetadata>,
    applications: &[Application],
    projects: Option<Vec<ProjectId>>,
    config: AllocationConfig,
    actor: Option<ActorId>,
) -> Result<AllocationReport, AppError> {
    let (service, catalog) = build_service(units, config);

    let mut rejected = Vec::new();
    for application in applications {
        if let Err(err) = service.add_application_to_queues(application) {
            if matches!(err.kind(), ErrorKind::Defect | ErrorKind::Storage) {
                return Err(err.into());
            }
            warn!(application = %application.id, error = %err, "application rejected");
            rejected.push(RejectedApplication {
                application_id: application.id.clone(),
                reason: err.to_string(),
            });
        }
    }

    let projects = projects.unwrap_or_else(|| catalog.projects());
    let mut reports = Vec::with_capacity(projects.len());
    for project_id in projects {
        let summary = service.distribute_units(&project_id, actor.clone())?;
        reports.push(project_report(&service, catalog.as_ref(), summary)?);
    }

    Ok(AllocationReport {
        projects: reports,
        rejected,
    })
}
