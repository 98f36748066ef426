mod cli;
mod demo;
mod infra;
mod routes;
mod server;

use spot_traffic::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
