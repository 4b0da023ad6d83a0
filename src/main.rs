use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use roboclaw_zenoh_runtime::config::{Args, RuntimeConfig};
use roboclaw_zenoh_runtime::motor::SimulatedRoboclaw;

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    // Invalid configuration is the only fatal error
    let config = match RuntimeConfig::from_args(Args::parse()) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    debug!("dev {}", config.dev);
    debug!("baud {}", config.baud);
    debug!("address 0x{:02X}", config.address);
    debug!("max_speed {} m/s, {} rad/s", config.linear_max, config.angular_max);
    debug!("ticks_per_meter {}", config.ticks_per_meter);
    debug!("base_width {}", config.base_width);

    // No serial transport is linked into this binary; drive the in-process controller
    info!(
        "Using simulated controller at address 0x{:02X} (configured device {} @ {} baud)",
        config.address, config.dev, config.baud
    );
    let driver = SimulatedRoboclaw::new(config.address, config.ticks_per_meter, config.linear_max);

    if let Err(e) = roboclaw_zenoh_runtime::runtime::run(config, driver).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
