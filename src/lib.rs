pub mod config;
pub mod logging;

pub use sorng_transfer as transfer;

use config::EngineConfig;
use sorng_transfer::{TransferDirection, TransferResult, TransferService, TransferServiceState};
use tracing::info;

/// Build the transfer service from `config`.
pub fn build(config: &EngineConfig) -> TransferResult<TransferServiceState> {
    config.validate()?;
    let service = TransferService::new(config.queue_config());
    service.set_global_speed_limit(TransferDirection::Upload, config.global_upload_limit)?;
    service.set_global_speed_limit(TransferDirection::Download, config.global_download_limit)?;
    info!(
        max_concurrent = config.max_concurrent,
        chunk_size = config.chunk_size,
        "Transfer service ready"
    );
    Ok(service)
}

/// Load configuration from the default location, set up logging and build
/// the service.
pub fn run() -> TransferResult<TransferServiceState> {
    let config = EngineConfig::load_default()?;
    logging::init(&config.log_filter);
    build(&config)
}
