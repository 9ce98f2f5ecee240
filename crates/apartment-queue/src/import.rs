//! CSV fixtures for rehearsing a distribution outside the production pipeline.
//!
//! Units: `unit_id,project_id,ownership,room_count`.
//! Applications: `application_id,applicant_id,regime,right_of_occupancy,has_children,late,choices`
//! where `choices` lists unit ids separated by `;`, most wanted first.

use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Deserializer};

use crate::allocation::{
    ApplicantId, Application, ApplicationChoice, ApplicationId, OwnershipRegime, ProjectId,
    UnitId, UnitMetadata,
};

#[derive(Debug)]
pub enum ImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    Invalid { line: usize, message: String },
}

impl std::fmt::Display for ImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportError::Io(err) => write!(f, "failed to read fixture: {}", err),
            ImportError::Csv(err) => write!(f, "invalid fixture CSV: {}", err),
            ImportError::Invalid { line, message } => {
                write!(f, "invalid fixture row {}: {}", line, message)
            }
        }
    }
}

impl std::error::Error for ImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ImportError::Io(err) => Some(err),
            ImportError::Csv(err) => Some(err),
            ImportError::Invalid { .. } => None,
        }
    }
}

impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

pub fn units_from_path<P: AsRef<Path>>(path: P) -> Result<Vec<UnitMetadata>, ImportError> {
    let file = std::fs::File::open(path)?;
    parse_units(file)
}

pub fn applications_from_path<P: AsRef<Path>>(path: P) -> Result<Vec<Application>, ImportError> {
    let file = std::fs::File::open(path)?;
    parse_applications(file)
}

pub fn parse_units<R: Read>(reader: R) -> Result<Vec<UnitMetadata>, ImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut units = Vec::new();

    for record in csv_reader.deserialize::<UnitRow>() {
        let row = record?;
        units.push(UnitMetadata {
            unit_id: UnitId(row.unit_id),
            project_id: ProjectId(row.project_id),
            ownership_tag: row.ownership,
            room_count: row.room_count,
        });
    }

    Ok(units)
}

pub fn parse_applications<R: Read>(reader: R) -> Result<Vec<Application>, ImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut applications = Vec::new();

    for (index, record) in csv_reader.deserialize::<ApplicationRow>().enumerate() {
        let row = record?;
        // Header is line 1.
        let line = index + 2;

        let regime = OwnershipRegime::from_tag(&row.regime).ok_or_else(|| ImportError::Invalid {
            line,
            message: format!("unknown regime '{}'", row.regime),
        })?;

        let choices: Vec<ApplicationChoice> = row
            .choices
            .split(';')
            .map(str::trim)
            .filter(|unit| !unit.is_empty())
            .enumerate()
            .map(|(rank, unit)| ApplicationChoice {
                unit_id: UnitId(unit.to_string()),
                priority_number: rank as u32 + 1,
            })
            .collect();

        applications.push(Application {
            id: ApplicationId(row.application_id),
            applicant_id: ApplicantId(row.applicant_id),
            regime,
            right_of_occupancy: row.right_of_occupancy,
            has_children: row.has_children.unwrap_or(false),
            submitted_late: row.late.unwrap_or(false),
            choices,
        });
    }

    Ok(applications)
}

#[derive(Debug, Deserialize)]
struct UnitRow {
    unit_id: String,
    project_id: String,
    ownership: String,
    room_count: u8,
}

#[derive(Debug, Deserialize)]
struct ApplicationRow {
    application_id: String,
    applicant_id: String,
    regime: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    right_of_occupancy: Option<u32>,
    #[serde(default, deserialize_with = "empty_as_none")]
    has_children: Option<bool>,
    #[serde(default, deserialize_with = "empty_as_none")]
    late: Option<bool>,
    choices: String,
}

fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    match opt.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse::<T>().map(Some).map_err(serde::de::Error::custom),
    }
}
