//! # Paper Clock Application Entry Point
//!
//! Loads the configuration, starts the weather and activity pollers, and hands
//! the frame to the render loop. Frames go to the Waveshare 2.13" panel, or
//! with `--stdout` to the terminal as ASCII art for development without
//! hardware.
//!
//! Commands typed on stdin are forwarded to the loop (see `help`). The display
//! is cleared and put to sleep on `exit`, Ctrl-C or SIGTERM.

// Test modules
#[cfg(test)]
mod tests;

#[cfg(all(target_os = "linux", feature = "hardware"))]
mod gpio_cdev;
#[cfg(all(target_os = "linux", feature = "hardware"))]
mod hw_spi_spidev;

use anyhow::{Context, Result};
use clap::Parser;
use paper_clock_lib::{
    app::{self, Sources},
    assets::Assets,
    commands::{self, Request},
    config::{Config, InfoKind, CONFIG_FILE},
    fitbit::FitbitFetcher,
    frame::Frame,
    logging,
    scheduler::{DisplayScheduler, RefreshPolicy},
    services::{spawn_poller, Fetcher},
    transport::TerminalDisplay,
    weather::WeatherFetcher,
};
use std::path::PathBuf;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "paper-clock", version, about)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Draw frames as ASCII art on stdout instead of the e-paper panel
    #[arg(long)]
    stdout: bool,

    /// Do not read commands from stdin (for running as a service)
    #[arg(long)]
    no_console: bool,

    /// Write the default configuration to the config path and exit
    #[arg(long)]
    init_config: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.init_config {
        Config::default().save_to_path(&args.config)?;
        println!("Wrote default configuration to {}", args.config.display());
        return Ok(());
    }

    let mut config = Config::load_from_path(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    logging::init(&config.logging)?;

    // Terminal output is always upright
    if args.stdout {
        config.display.rotate_180 = false;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run(args, config));

    // A pending stdin read would otherwise keep the process alive.
    runtime.shutdown_timeout(std::time::Duration::from_millis(200));
    result
}

async fn run(args: Args, config: Config) -> Result<()> {
    let sources = start_services(&config);
    let assets = Assets::new(&config.frame.asset_dir);
    let mut frame = app::build_frame(&config, assets, sources)?;
    let policy = RefreshPolicy::from(&config.display);

    let (sender, receiver) = commands::channel(8);
    if args.no_console {
        drop(sender);
    } else {
        tokio::spawn(async move {
            let stdin = BufReader::new(tokio::io::stdin());
            if let Err(err) = commands::run_console(stdin, tokio::io::stdout(), sender).await {
                warn!("Console stopped: {}", err);
            }
        });
    }

    if args.stdout {
        info!("Rendering to stdout");
        let mut scheduler = DisplayScheduler::new(TerminalDisplay::stdout(), policy);
        app::run(
            &mut frame,
            &mut scheduler,
            receiver,
            shutdown_signal(),
            config.display.tick(),
        )
        .await?;
        return Ok(());
    }

    run_hardware(&config, &mut frame, receiver, policy).await
}

/// Spawn pollers for the service panels that are enabled and configured.
fn start_services(config: &Config) -> Sources {
    let mut sources = Sources::default();
    let enabled = |kind: InfoKind| config.frame.infos.contains(&kind);

    if enabled(InfoKind::Weather) {
        match &config.weather {
            Some(weather) => {
                let interval = weather.refresh_interval();
                match WeatherFetcher::new(weather.clone()) {
                    Ok(fetcher) => sources.weather = Some(start_poller(fetcher, interval)),
                    Err(err) => warn!("Weather service disabled: {}", err),
                }
            }
            None => warn!("Weather panel enabled without a [weather] section"),
        }
    }

    if enabled(InfoKind::Activity) {
        match &config.fitbit {
            Some(fitbit) => {
                let interval = fitbit.refresh_interval();
                match FitbitFetcher::new(fitbit.clone()) {
                    Ok(fetcher) => sources.activity = Some(start_poller(fetcher, interval)),
                    Err(err) => warn!("Fitbit service disabled: {}", err),
                }
            }
            None => warn!("Activity panel enabled without a [fitbit] section"),
        }
    }

    sources
}

fn start_poller<F: Fetcher>(
    fetcher: F,
    interval: chrono::Duration,
) -> Box<dyn paper_clock_lib::services::DataSource> {
    info!("Polling {} every {}s", fetcher.name(), interval.num_seconds());
    // The poller stops by itself once the panel drops its source.
    let (source, _handle) = spawn_poller(fetcher, interval);
    Box::new(source)
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("Cannot listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Drive the Waveshare 2.13" V4 over spidev and gpio-cdev.
#[cfg(all(target_os = "linux", feature = "hardware"))]
async fn run_hardware(
    config: &Config,
    frame: &mut Frame,
    receiver: mpsc::Receiver<Request>,
    policy: RefreshPolicy,
) -> Result<()> {
    use crate::gpio_cdev::{CdevInputPin, CdevOutputPin};
    use crate::hw_spi_spidev::SpidevHwSpi;
    use linux_embedded_hal::gpio_cdev::Chip;
    use paper_clock_lib::epd2in13_v4::Epd2in13V4;

    let hw = &config.display.hardware;
    info!(
        dc = hw.dc_pin,
        rst = hw.rst_pin,
        busy = hw.busy_pin,
        "Opening e-paper display on {}",
        hw.spi_device
    );

    let mut chip =
        Chip::new(&hw.gpio_chip).with_context(|| format!("open {}", hw.gpio_chip))?;
    let dc = CdevOutputPin::new(&mut chip, hw.dc_pin)?;
    let rst = CdevOutputPin::new(&mut chip, hw.rst_pin)?;
    let busy = CdevInputPin::new(&mut chip, hw.busy_pin)?;
    let spi = SpidevHwSpi::open(&hw.spi_device)?;

    let mut scheduler = DisplayScheduler::new(Epd2in13V4::new(spi, dc, rst, busy), policy);
    app::run(
        frame,
        &mut scheduler,
        receiver,
        shutdown_signal(),
        config.display.tick(),
    )
    .await?;
    Ok(())
}

#[cfg(not(all(target_os = "linux", feature = "hardware")))]
async fn run_hardware(
    _config: &Config,
    _frame: &mut Frame,
    _receiver: mpsc::Receiver<Request>,
    _policy: RefreshPolicy,
) -> Result<()> {
    anyhow::bail!(
        "E-paper support is not enabled. Rebuild with --features hardware on Linux, \
         or use --stdout for terminal output."
    )
}
