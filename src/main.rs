use color_eyre::{eyre::eyre, Result};
use nunchuck::config::AppConfig;
use nunchuck::controller::{Callbacks, NunchuckHandle};
use nunchuck::transport::open_transport;
use tracing::{debug, info, Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let (config, level) = {
        // Config loading logs before the configured level is known
        let _bootstrap =
            tracing::subscriber::set_default(log_subscriber(Level::INFO, std::io::stdout));
        let config = AppConfig::load_or_create().await?;
        let level = config.log_level();
        (config, level)
    };
    setup_logging_env(level)?;
    debug!("Running with config: {:?}", config);

    let transport = open_transport(config.device.transport, config.device.bus)
        .map_err(|e| eyre!("Failed to open transport: {}", e))?;

    let callbacks = Callbacks::new()
        .on_c_change(|state| info!("C {}", if state.button_c { "down" } else { "up" }))
        .on_z_change(|state| info!("Z {}", if state.button_z { "down" } else { "up" }))
        .on_any_update(|state| debug!("Reading {}", state));

    info!("Starting nunchuck on bus {}", config.device.bus);
    let handle = NunchuckHandle::spawn(transport, Some(config.nunchuck_settings()), callbacks)
        .await
        .map_err(|e| eyre!("Failed to start nunchuck: {}", e))?;
    if let Some(ident) = handle.ident() {
        info!("Device ident {}", ident);
    }

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| eyre!("Failed to wait for Ctrl-C: {}", e))?;
    info!("Last state {}", handle);
    handle
        .shutdown()
        .await
        .map_err(|e| eyre!("Failed to stop nunchuck: {}", e))?;

    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    Ok(())
}

fn setup_logging_env(level: Level) -> Result<()> {
    tracing::subscriber::set_global_default(log_subscriber(level, std::io::stdout))
        .map_err(|e| eyre!("Failed to install logger: {}", e))
}

fn log_subscriber<W>(level: Level, writer: W) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(writer)
        .pretty()
        .finish()
}
