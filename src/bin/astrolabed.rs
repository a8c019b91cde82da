//! astrolabed: message director and state server daemon.
//!
//! ## Configuration
//! ```yaml
//! messagedirector:
//!   bind: 0.0.0.0:7199
//!
//! general:
//!   schema_files: [schema/game.yaml]
//!   authority_scope_prefix: 4030
//!
//! roles:
//!   - type: stateserver
//!     control: 4000
//!   - type: database
//!     control: 4003
//!     generate: { min: 100000000, max: 199999999 }
//! ```

use tracing::{error, info};

use astrolabe::config::Config;
use astrolabe::runtime::Runtime;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    astrolabe::utils::bootstrap::init_tracing();

    let config_path = astrolabe::utils::bootstrap::parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!("Starting astrolabed");

    let runtime = Runtime::from_config(&config).await.map_err(|e| {
        error!("Failed to start: {}", e);
        e
    })?;
    runtime.run().await?;

    info!("astrolabed stopped");
    Ok(())
}
