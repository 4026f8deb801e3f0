mod bench;
mod clock;
mod settings;
mod sim;
mod storage;

use anyhow::Result;
use settings::BenchSettings;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Telemetry goes to stdout, logs to stderr
    tracing_subscriber::fmt()
        .with_env_filter("tacho_governor_controller=debug,tacho_governor=info,info")
        .with_writer(std::io::stderr)
        .init();

    let settings = BenchSettings::from_env()?;
    info!(
        "Bench settings: calibration={} speed={} load={}",
        settings.calibration.display(),
        settings.speed,
        settings.load
    );

    if settings.simulate {
        bench::simulate(settings)
    } else {
        bench::run(settings).await
    }
}
