mod core;
mod mpv;
mod shell;

use loop_core::config::Config;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Config first: it decides where the log goes and how chatty it is
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("config unreadable ({:#}), using defaults", e);
            Config::default()
        }
    };

    let data_dir = config.storage.data_dir.clone();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("loopd.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.filter)),
        )
        .init();

    info!("Log file: {:?}", log_path);
    info!("Config: {:?}", Config::config_path());
    eprintln!("logging to {}", log_path.display());

    // Event channel: stdin commands and mpv events funnel into AppCore
    let (event_tx, event_rx) = tokio::sync::mpsc::channel::<core::AppEvent>(256);

    let app = core::AppCore::new(config, event_tx.clone());
    let _stdin_handle = shell::spawn_stdin_reader(event_tx);

    println!("{}", shell::HELP);
    app.run(event_rx).await?;

    info!("loopd exiting");
    Ok(())
}
