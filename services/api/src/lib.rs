mod cli;
mod demo;
mod infra;
mod routes;
mod server;

use p2p_lending::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
