//! Playrec - plays a swept sine on one interface and records the response on another.

use std::process;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::LocalTime;

use playrec::audio::{AudioBackend, CpalBackend, Direction, directory};
use playrec::config::AppConfig;
use playrec::coordinator::{DuplexRequest, play_and_capture};
use playrec::{report, signal as excitation};

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn wait_for_shutdown() {
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("🛑 Received Ctrl+C, aborting measurement...");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(e) => {
                        debug!("Failed to register SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("🛑 Received SIGTERM, aborting measurement...");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let config = AppConfig::from_args();

    // Respect RUST_LOG env var, fallback to verbose flag, default to info
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| if config.verbose { EnvFilter::try_new("debug") } else { EnvFilter::try_new("info") })
        .context("Failed to build log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(LocalTime::new(time::macros::format_description!("[hour]:[minute]:[second]")))
        .init();

    let backend = CpalBackend::default_host();
    let interfaces = backend.interfaces().context("Failed to enumerate audio interfaces")?;

    if config.list_devices {
        if config.json {
            report::print_interfaces_json(&interfaces)?;
        } else {
            report::print_interfaces(&interfaces);
        }
        return Ok(());
    }

    info!("🎛️  Playrec v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = config.validate() {
        error!("❌ Configuration error: {}", e);
        error!("Run with --help to see the available options.");
        process::exit(1);
    }

    let input = directory::select(&interfaces, config.input_interface(), Direction::Input)?;
    let output = directory::select(&interfaces, config.output_interface(), Direction::Output)?;
    info!("Capturing from {} ({}), playing on {} ({})", input.id, input.name, output.id, output.name);

    let capture_channels = config.capture_channels.unwrap_or(input.input_channels);
    let output_channels = config.output_channels.unwrap_or(output.output_channels);
    config.log_config();

    let sweep = config.sweep().generate()?;
    let excitation = excitation::on_first_channel(sweep, usize::from(output_channels))?;

    // Workers own only plain data, so the blocking run can be abandoned
    let capture_length = config.capture_length();
    let capture_rate = config.effective_capture_rate();
    let play_rate = config.sample_rate;
    let normalize = config.normalize;
    let settings = config.duplex_settings();
    let run_backend = backend.clone();
    let (input, output) = (input.clone(), output.clone());
    let run = tokio::task::spawn_blocking(move || {
        let request = DuplexRequest {
            excitation,
            capture_length,
            capture_channels,
            input: Some(&input),
            output: Some(&output),
            capture_rate,
            play_rate,
            normalize,
        };
        play_and_capture(&run_backend, request, settings)
    });

    let deadline = config.run_deadline();
    let captured = tokio::select! {
        joined = run => joined.context("Measurement worker panicked")?,
        _ = tokio::time::sleep(deadline) => {
            error!("❌ Measurement did not finish within {:.1} s", deadline.as_secs_f64());
            process::exit(2);
        }
        _ = wait_for_shutdown() => {
            process::exit(130);
        }
    };

    match captured {
        Ok(buffer) => {
            report::print_capture_summary(&buffer, config.effective_capture_rate());
            info!("✅ Measurement complete");
            Ok(())
        }
        Err(e) => {
            error!("❌ Measurement failed: {}", e);
            process::exit(1);
        }
    }
}
