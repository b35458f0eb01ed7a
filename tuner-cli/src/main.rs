//! # Tuner - terminal front end
//!
//! Captures from the default input device and keeps a single status line on
//! stdout with the detected note, tuning direction, fundamental and peak
//! frequency. Logs go to stderr (`RUST_LOG` controls the level).
//!
//! ## Architecture
//! - **Main Thread**: capture, analysis and output, one block at a time
//! - **Signal Thread**: waits for Ctrl-C or SIGTERM and cancels the detection loop
//!
//! Set `TUNER_CONFIG` to a JSON file to override the default configuration.

use anyhow::{Context, Result};
use std::io;
use std::thread;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tuner_core::audio::CpalCapture;
use tuner_core::output::TerminalSink;
use tuner_core::{CancelToken, Tuner, TunerConfig};

/// Environment variable naming an optional JSON config file.
const CONFIG_ENV: &str = "TUNER_CONFIG";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let config = load_config()?;
    let mut tuner = Tuner::new(config).context("invalid tuner configuration")?;
    spawn_signal_watcher(tuner.cancel_token())?;

    let mut capture = CpalCapture::open(tuner.config()).context("failed to start audio capture")?;
    info!("Listening, press Ctrl-C to stop");

    let mut sink = TerminalSink::new(io::stdout().lock());
    let result = tuner.run(&mut capture, &mut sink);

    // End the status line and stop the stream before reporting the outcome.
    sink.finish().context("failed to write to stdout")?;
    drop(capture);

    result.context("detection loop failed")?;
    info!("Tuner stopped");
    Ok(())
}

fn load_config() -> Result<TunerConfig> {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) => {
            let shown = path.to_string_lossy().into_owned();
            info!("Loading configuration from {}", shown);
            TunerConfig::load(&path).with_context(|| format!("failed to load {}", shown))
        }
        None => Ok(TunerConfig::default()),
    }
}

/// Cancels `cancel` on the first Ctrl-C or termination signal.
fn spawn_signal_watcher(cancel: CancelToken) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;

    thread::Builder::new()
        .name("signal-watcher".into())
        .spawn(move || {
            runtime.block_on(async {
                match shutdown_signal().await {
                    Ok(name) => {
                        info!("{} received, stopping after the current block", name);
                        cancel.cancel();
                    }
                    Err(e) => error!("Failed to listen for shutdown signals: {}", e),
                }
            });
        })
        .context("failed to spawn signal watcher")?;

    Ok(())
}

/// Resolves with the name of the first shutdown signal delivered.
#[cfg(unix)]
async fn shutdown_signal() -> io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "Interrupt"),
        _ = terminate.recv() => Ok("Termination signal"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "Interrupt")
}
