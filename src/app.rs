//! Frame assembly and the render loop.
//!
//! [`run`] is the single owner of the [`Frame`] and the [`DisplayScheduler`].
//! It wakes on three kinds of events, in priority order: the shutdown signal,
//! a console command, and the periodic tick that composes and presents the
//! next image. Commands are applied between ticks, so a composition never sees
//! a half-applied change.

use crate::assets::Assets;
use crate::bitmap::Bitmap;
use crate::bodies::{Body, WEATHER_ICONS};
use crate::commands::{Command, CommandError, Request, HELP};
use crate::config::{BannerKind, Config, ConfigError, InfoKind};
use crate::frame::{Frame, FrameOptions};
use crate::panel::Panel;
use crate::scheduler::{DisplayScheduler, Refresh};
use crate::services::DataSource;
use crate::transport::{DisplayError, DisplayTransport};
use embedded_graphics::prelude::Size;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Providers for the panels that poll external services.
#[derive(Default)]
pub struct Sources {
    pub weather: Option<Box<dyn DataSource>>,
    pub activity: Option<Box<dyn DataSource>>,
}

/// Build the frame described by `config`.
///
/// Weather and activity panels without a source stay on "loading...".
pub fn build_frame(
    config: &Config,
    assets: Assets,
    mut sources: Sources,
) -> Result<Frame, ConfigError> {
    let display = &config.display;
    let layout = &config.frame;
    let alignment = layout.alignment();
    let [clock_width, clock_height] = layout.clock_size;

    let clock = Panel::clock(
        Size::new(clock_width, clock_height),
        alignment,
        &layout.clock_format,
    );

    let info_size = Size::new(display.width - clock_width, clock_height);
    let mut infos = Vec::with_capacity(layout.infos.len());
    for kind in &layout.infos {
        let panel = match kind {
            InfoKind::Text => Panel::info("Text", info_size, alignment, Body::text(None))
                .with_description("This panel is used to display text."),
            InfoKind::Date => Panel::info("Date", info_size, alignment, Body::date())
                .with_description("This panel is used to display the date."),
            InfoKind::Weather => {
                let icons = weather_icons(&assets, clock_height.saturating_sub(2));
                let panel = Panel::info("Weather", info_size, alignment, Body::weather(icons))
                    .with_description("This panel displays the current weather.");
                match sources.weather.take() {
                    Some(source) => panel.with_source(source),
                    None => panel,
                }
            }
            InfoKind::Activity => {
                let panel = Panel::info("Activity", info_size, alignment, Body::activity())
                    .with_description("This panel displays today's step count.");
                match sources.activity.take() {
                    Some(source) => panel.with_source(source),
                    None => panel,
                }
            }
        };
        infos.push(panel);
    }

    let banner_size = Size::new(display.width, layout.banner_height);
    let banners = layout
        .banners
        .iter()
        .map(|kind| match kind {
            BannerKind::Text => Panel::banner(
                "Banner",
                banner_size,
                alignment,
                Body::text(Some(layout.banner_text.clone())),
            )
            .with_description("This banner displays a line of text."),
        })
        .collect();

    Frame::new(
        FrameOptions {
            size: Size::new(display.width, display.height),
            rotate_180: display.rotate_180,
            slide_interval: layout.slide_interval(),
            background: layout.background().map(str::to_string),
        },
        clock,
        infos,
        banners,
        assets,
    )
}

fn weather_icons(assets: &Assets, size: u32) -> HashMap<String, Bitmap> {
    let icons: HashMap<String, Bitmap> = WEATHER_ICONS
        .iter()
        .filter_map(|icon| {
            assets
                .weather_icon(icon, size)
                .map(|bitmap| (icon.to_string(), bitmap))
        })
        .collect();
    debug!("Loaded {} of {} weather icons", icons.len(), WEATHER_ICONS.len());
    icons
}

/// Apply a console command and describe the outcome.
///
/// [`Command::Shutdown`] is handled by [`run`] itself.
pub fn apply_command(frame: &mut Frame, command: Command) -> Result<String, CommandError> {
    match command {
        Command::SetText(text) => {
            frame.set_text(&text)?;
            Ok(format!("Displaying '{}'", text))
        }
        Command::Align(alignment) => {
            frame.set_alignment(alignment);
            Ok(format!("Alignment set to {}", alignment))
        }
        Command::Background(name) => {
            frame.set_background(name.as_deref())?;
            Ok(format!("Background set to {}", name.as_deref().unwrap_or("slideshow")))
        }
        Command::SetPanel(kind) => {
            frame.set_active_info(kind)?;
            Ok(format!("Info panel set to {}", kind.name()))
        }
        Command::Panels => Ok(frame.get_info_panel_descriptions().join("\n")),
        Command::Banners => Ok(frame.get_banner_panel_descriptions().join("\n")),
        Command::Help => Ok(HELP.to_string()),
        Command::Shutdown => Ok("Shutting down".to_string()),
    }
}

/// Drive the display until `shutdown` resolves or an `exit` command arrives.
///
/// The first tick recomposes the whole frame. Display errors end the loop;
/// in every case the panel is cleared and put to sleep on the way out.
/// Must run on a multi-threaded runtime, since refreshes block.
pub async fn run<T, S>(
    frame: &mut Frame,
    scheduler: &mut DisplayScheduler<T>,
    mut commands: mpsc::Receiver<Request>,
    shutdown: S,
    tick: Duration,
) -> Result<(), DisplayError>
where
    T: DisplayTransport,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let result = match tokio::task::block_in_place(|| scheduler.begin()) {
        Ok(()) => render_loop(frame, scheduler, &mut commands, &mut shutdown, tick).await,
        Err(err) => Err(err),
    };

    if let Err(err) = &result {
        error!("Display failure: {}", err);
    }
    if let Err(err) = tokio::task::block_in_place(|| scheduler.shutdown()) {
        warn!("Could not clear the display: {}", err);
    }
    result
}

async fn render_loop<T, S>(
    frame: &mut Frame,
    scheduler: &mut DisplayScheduler<T>,
    commands: &mut mpsc::Receiver<Request>,
    shutdown: &mut std::pin::Pin<&mut S>,
    tick: Duration,
) -> Result<(), DisplayError>
where
    T: DisplayTransport,
    S: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut force = true;

    loop {
        tokio::select! {
            biased;

            _ = shutdown.as_mut() => {
                info!("Shutdown requested");
                return Ok(());
            }

            Some(request) = commands.recv() => {
                if request.command == Command::Shutdown {
                    info!("Exit requested from the console");
                    let _ = request.reply.send(apply_command(frame, Command::Shutdown));
                    return Ok(());
                }
                let reply = apply_command(frame, request.command);
                if let Err(err) = &reply {
                    warn!("Command rejected: {}", err);
                }
                let _ = request.reply.send(reply);
            }

            _ = ticker.tick() => {
                let composition = frame.draw(force);
                force = false;
                if let Some(composition) = &composition {
                    for change in &composition.changes {
                        debug!("{}", change);
                    }
                }

                let image = composition.as_ref().map(|composition| &composition.image);
                let refresh = tokio::task::block_in_place(|| scheduler.present(image))?;
                if refresh != Refresh::Skipped {
                    debug!("Display updated: {:?}", refresh);
                }
            }
        }
    }
}
