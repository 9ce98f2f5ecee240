use std::sync::Arc;

use apartment_queue::allocation::{
    AllocationService, InMemoryUnitCatalog, QueueStore, UnitMetadata,
};
use apartment_queue::config::{AllocationConfig, AppConfig, AppEnvironment, ConfigError};
use apartment_queue::error::AppError;
use clap::ValueEnum;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    #[default]
    Table,
    Json,
    Csv,
}

pub(crate) type CliService = AllocationService<InMemoryUnitCatalog>;

pub(crate) fn build_service(
    units: Vec<UnitMetadata>,
    config: AllocationConfig,
) -> (CliService, Arc<InMemoryUnitCatalog>) {
    let catalog = Arc::new(InMemoryUnitCatalog::new(units));
    let service = AllocationService::new(
        Arc::clone(&catalog),
        Arc::new(QueueStore::new()),
        config,
    );
    (service, catalog)
}

/// Applies a `--seed` override on top of the loaded configuration.
pub(crate) fn allocation_config(
    config: &AppConfig,
    seed: Option<u64>,
) -> Result<AllocationConfig, AppError> {
    let mut allocation = config.allocation.clone();
    if let Some(seed) = seed {
        if config.environment == AppEnvironment::Production {
            return Err(ConfigError::SeedInProduction.into());
        }
        allocation.lottery_seed = Some(seed);
    }
    Ok(allocation)
}

pub(crate) const DEMO_SEED: u64 = 2024;

pub(crate) const SAMPLE_UNITS: &str = "\
unit_id,project_id,ownership,room_count
JS-A1,JATKASAARI,haso,2
JS-A2,JATKASAARI,haso,3
JS-B1,JATKASAARI,haso,1
KS-101,KALASATAMA,hitas,4
KS-102,KALASATAMA,hitas,2
KS-201,KALASATAMA,half_hitas,3
";

pub(crate) const SAMPLE_APPLICATIONS: &str = "\
application_id,applicant_id,regime,right_of_occupancy,has_children,late,choices
haso-1,aino,haso,118,false,false,JS-A1;JS-A2
haso-2,bertta,haso,42,true,false,JS-A2;JS-A1;JS-B1
haso-3,eino,haso,305,false,false,JS-A1;JS-B1
haso-4,helmi,haso,42,false,false,JS-B1
haso-5,kalle,haso,3,false,true,JS-A2
haso-6,lauri,haso,,false,false,JS-A1
hitas-1,maija,hitas,,true,false,KS-101;KS-201
hitas-2,niilo,hitas,,false,false,KS-101;KS-102
hitas-3,olga,hitas,,true,false,KS-101
hitas-4,pekka,hitas,,false,false,KS-102;KS-101
hitas-5,riikka,half_hitas,,true,false,KS-201;KS-101
hitas-6,sanni,hitas,,false,false,KS-201
";
