mod cli;
mod demo;
mod infra;
mod report;

use apartment_queue::error::AppError;

pub fn run() -> Result<(), AppError> {
    cli::run()
}
