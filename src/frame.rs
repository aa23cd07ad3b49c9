//! # Frame Composition
//!
//! The frame owns every layer and composes them into one screen-sized canvas:
//!
//! ```text
//!  BOTTOM LEFT                      TOP RIGHT
//! +---------------------------+    +---------------+-----------+
//! | banner                    |    | info          |   clock   |
//! +---------------------------+    +---------------+-----------+
//! |                           |    |                           |
//! | background                |    | background                |
//! |                           |    |                           |
//! +-----------+---------------+    +---------------------------+
//! |   clock   | info          |    | banner                    |
//! +-----------+---------------+    +---------------------------+
//! ```
//!
//! ## Incremental Updates
//! [`Frame::draw_at`] asks each layer for a redraw and pastes only the layers
//! that answered into the previous canvas. A forced draw, or the first draw
//! after an alignment change, recomposes everything from a blank canvas.
//!
//! The canvas is handed out in display orientation: when the panel is mounted
//! upside down the composed image is rotated 180 degrees, and rotated back
//! before it is used as the base of the next incremental update.

use crate::assets::Assets;
use crate::background::{Background, Geometry, Slideshow, StaticBackground};
use crate::bitmap::Bitmap;
use crate::commands::CommandError;
use crate::config::{ConfigError, InfoKind};
use crate::panel::Panel;
use crate::{Alignment, HorizontalAlignment, VerticalAlignment};
use chrono::{DateTime, Duration, Local};
use embedded_graphics::prelude::*;
use tracing::{debug, info};

/// Change list entry of a full recomposition.
pub const FRAME_REDRAWN: &str = "Frame has been redrawn.";

/// A composed screen image and the reasons it changed.
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub image: Bitmap,
    pub changes: Vec<String>,
}

/// Screen-level settings of a frame.
#[derive(Debug, Clone)]
pub struct FrameOptions {
    pub size: Size,
    /// Rotate every composed frame by 180 degrees
    pub rotate_180: bool,
    pub slide_interval: Duration,
    /// Fixed background name, `None` for the slideshow
    pub background: Option<String>,
}

#[derive(Debug)]
pub struct Frame {
    size: Size,
    alignment: Alignment,
    alignment_changed: bool,
    rotate_180: bool,
    image: Bitmap,
    clock: Panel,
    infos: Vec<Panel>,
    active_info: usize,
    banners: Vec<Panel>,
    active_banner: usize,
    background: Background,
    assets: Assets,
    slide_interval: Duration,
}

impl Frame {
    /// Assemble a frame. The alignment is taken from the clock panel.
    ///
    /// A configured background that cannot be loaded is a configuration
    /// error.
    pub fn new(
        options: FrameOptions,
        clock: Panel,
        infos: Vec<Panel>,
        banners: Vec<Panel>,
        assets: Assets,
    ) -> Result<Self, ConfigError> {
        if infos.is_empty() || banners.is_empty() {
            return Err(ConfigError::Invalid(
                "a frame needs at least one info and one banner panel".into(),
            ));
        }

        let alignment = clock.alignment();
        let mut frame = Self {
            size: options.size,
            alignment,
            alignment_changed: false,
            rotate_180: options.rotate_180,
            image: Bitmap::new(options.size.width, options.size.height),
            clock,
            infos,
            active_info: 0,
            banners,
            active_banner: 0,
            background: Background::Static(StaticBackground::new(Geometry {
                width: options.size.width,
                height: options.size.height,
                clock_height: 0,
                banner_height: 0,
                alignment,
            })),
            assets,
            slide_interval: options.slide_interval,
        };
        frame.background = frame.make_background(options.background.as_deref())?;
        Ok(frame)
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn alignment(&self) -> Alignment {
        self.alignment
    }

    /// Last composed image, in display orientation.
    pub fn image(&self) -> &Bitmap {
        &self.image
    }

    pub fn clock(&self) -> &Panel {
        &self.clock
    }

    pub fn active_info(&self) -> &Panel {
        &self.infos[self.active_info]
    }

    pub fn active_banner(&self) -> &Panel {
        &self.banners[self.active_banner]
    }

    pub fn background(&self) -> &Background {
        &self.background
    }

    pub fn draw(&mut self, force: bool) -> Option<Composition> {
        self.draw_at(force, Local::now())
    }

    /// Compose the next frame. `None` means the screen content is unchanged.
    pub fn draw_at(&mut self, force: bool, now: DateTime<Local>) -> Option<Composition> {
        if force || self.alignment_changed {
            return Some(self.compose_at(now));
        }

        let background_y = self.geometry().offset() as i32;
        let clock_at = self.clock_origin();
        let info_at = self.info_origin();
        let banner_at = self.banner_origin();

        let mut canvas = self.oriented(&self.image);
        let mut changes = Vec::new();

        if let Some(redraw) = self.background.draw_at(now) {
            canvas.paste(redraw.image, 0, background_y);
            changes.push(format!("Background has changed. {}", redraw.change));
        }
        if let Some(redraw) = self.clock.draw_at(now) {
            canvas.paste(redraw.image, clock_at.x, clock_at.y);
            changes.push(format!("Clock has changed. {}", redraw.change));
        }
        if let Some(redraw) = self.infos[self.active_info].draw_at(now) {
            canvas.paste(redraw.image, info_at.x, info_at.y);
            changes.push(format!("Info panel has changed. {}", redraw.change));
        }
        if let Some(redraw) = self.banners[self.active_banner].draw_at(now) {
            canvas.paste(redraw.image, banner_at.x, banner_at.y);
            changes.push(format!("Banner has changed. {}", redraw.change));
        }

        if changes.is_empty() {
            return None;
        }
        self.image = self.oriented(&canvas);
        Some(Composition {
            image: self.image.clone(),
            changes,
        })
    }

    /// Redraw every active layer onto a blank canvas in z-order.
    fn compose_at(&mut self, now: DateTime<Local>) -> Composition {
        let background_y = self.geometry().offset() as i32;
        let clock_at = self.clock_origin();
        let info_at = self.info_origin();
        let banner_at = self.banner_origin();

        let mut canvas = Bitmap::new(self.size.width, self.size.height);

        // Lets a due slideshow advance before its image is used.
        let _ = self.background.draw_at(now);
        canvas.paste(self.background.image(), 0, background_y);
        canvas.paste(self.clock.redraw_at(now), clock_at.x, clock_at.y);
        canvas.paste(
            self.infos[self.active_info].redraw_at(now),
            info_at.x,
            info_at.y,
        );
        canvas.paste(
            self.banners[self.active_banner].redraw_at(now),
            banner_at.x,
            banner_at.y,
        );

        self.alignment_changed = false;
        self.image = self.oriented(&canvas);
        debug!("Frame recomposed with alignment {}", self.alignment);
        Composition {
            image: self.image.clone(),
            changes: vec![FRAME_REDRAWN.to_string()],
        }
    }

    pub fn set_alignment(&mut self, alignment: Alignment) {
        self.set_vertical_alignment(alignment.vertical);
        self.set_horizontal_alignment(alignment.horizontal);
    }

    pub fn set_vertical_alignment(&mut self, vertical: VerticalAlignment) {
        self.alignment.vertical = vertical;
        self.realign(Some(vertical), None);
    }

    pub fn set_horizontal_alignment(&mut self, horizontal: HorizontalAlignment) {
        self.alignment.horizontal = horizontal;
        self.realign(None, Some(horizontal));
    }

    fn realign(
        &mut self,
        vertical: Option<VerticalAlignment>,
        horizontal: Option<HorizontalAlignment>,
    ) {
        self.clock.set_alignment(vertical, horizontal);
        for panel in self.infos.iter_mut().chain(self.banners.iter_mut()) {
            panel.set_alignment(vertical, horizontal);
        }
        self.background.set_alignment(self.alignment);
        self.alignment_changed = true;
    }

    /// Show `text` on the text info panel.
    pub fn set_text(&mut self, text: &str) -> Result<(), CommandError> {
        let panel = self
            .infos
            .iter_mut()
            .find(|panel| panel.body().kind() == "Text")
            .ok_or(CommandError::NoTextPanel)?;
        panel.set_text(text);
        Ok(())
    }

    /// Switch to a fixed background, or back to the slideshow with `None`.
    pub fn set_background(&mut self, name: Option<&str>) -> Result<(), CommandError> {
        self.background = self.make_background(name).map_err(|err| match err {
            ConfigError::Asset(err) => CommandError::Asset(err),
            other => CommandError::Invalid(other.to_string()),
        })?;
        info!("Background set to {}", name.unwrap_or("slideshow"));
        Ok(())
    }

    /// Make the info panel of `kind` the visible one.
    pub fn set_active_info(&mut self, kind: InfoKind) -> Result<(), CommandError> {
        let index = self
            .infos
            .iter()
            .position(|panel| panel.body().kind().eq_ignore_ascii_case(kind.name()))
            .ok_or_else(|| CommandError::UnknownPanel(kind.name().to_string()))?;
        if index != self.active_info {
            self.active_info = index;
            self.infos[index].invalidate();
        }
        Ok(())
    }

    pub fn get_info_panel_descriptions(&self) -> Vec<String> {
        self.infos.iter().map(Panel::description).collect()
    }

    pub fn get_banner_panel_descriptions(&self) -> Vec<String> {
        self.banners.iter().map(Panel::description).collect()
    }

    fn make_background(&self, name: Option<&str>) -> Result<Background, ConfigError> {
        let geometry = self.geometry();
        Ok(match name {
            Some(name) => {
                Background::Static(StaticBackground::load(geometry, &self.assets, name)?)
            }
            None => Background::Slideshow(Slideshow::new(
                geometry,
                self.assets.clone(),
                self.slide_interval,
            )),
        })
    }

    fn geometry(&self) -> Geometry {
        Geometry {
            width: self.size.width,
            height: self.size.height,
            clock_height: self.clock.size().height,
            banner_height: self.banners[self.active_banner].size().height,
            alignment: self.alignment,
        }
    }

    fn clock_origin(&self) -> Point {
        let clock = self.clock.size();
        let x = match self.alignment.horizontal {
            HorizontalAlignment::Left => 0,
            HorizontalAlignment::Right => self.size.width.saturating_sub(clock.width),
        };
        Point::new(x as i32, self.clock_row())
    }

    fn info_origin(&self) -> Point {
        let x = match self.alignment.horizontal {
            HorizontalAlignment::Left => self.clock.size().width,
            HorizontalAlignment::Right => 0,
        };
        Point::new(x as i32, self.clock_row())
    }

    fn clock_row(&self) -> i32 {
        match self.alignment.vertical {
            VerticalAlignment::Bottom => {
                self.size.height.saturating_sub(self.clock.size().height) as i32
            }
            VerticalAlignment::Top => 0,
        }
    }

    fn banner_origin(&self) -> Point {
        let banner_height = self.banners[self.active_banner].size().height;
        let y = match self.alignment.vertical {
            VerticalAlignment::Bottom => 0,
            VerticalAlignment::Top => self.size.height.saturating_sub(banner_height),
        };
        Point::new(0, y as i32)
    }

    /// Convert between composition and display orientation (its own inverse).
    fn oriented(&self, image: &Bitmap) -> Bitmap {
        if self.rotate_180 {
            image.rotated_180()
        } else {
            image.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::Color;
    use crate::bodies::Body;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32, second: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 3, 4, hour, minute, second)
            .unwrap()
    }

    fn frame(dir: &std::path::Path, rotate_180: bool) -> Frame {
        let alignment = Alignment::default();
        let clock = Panel::clock(Size::new(82, 35), alignment, "%H:%M");
        let infos = vec![
            Panel::info("Text", Size::new(168, 35), alignment, Body::text(None))
                .with_description("This panel is used to display text."),
            Panel::info("Date", Size::new(168, 35), alignment, Body::date())
                .with_description("This panel is used to display the date."),
        ];
        let banners = vec![Panel::banner(
            "Banner",
            Size::new(250, 20),
            alignment,
            Body::text(Some("hello".into())),
        )];
        Frame::new(
            FrameOptions {
                size: Size::new(250, 122),
                rotate_180,
                slide_interval: Duration::seconds(300),
                background: None,
            },
            clock,
            infos,
            banners,
            Assets::new(dir),
        )
        .unwrap()
    }

    #[test]
    fn forced_draw_recomposes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mut frame = frame(dir.path(), false);

        let composition = frame.draw_at(true, at(9, 41, 0)).unwrap();
        assert_eq!(composition.changes, vec![FRAME_REDRAWN]);
        // Clock border at the bottom left, banner border at the top
        assert_eq!(composition.image.pixel(0, 87), Some(Color::Black));
        assert_eq!(composition.image.pixel(0, 0), Some(Color::Black));
        // Info panel shares its left edge with the clock's right border
        assert_eq!(composition.image.pixel(249, 100), Some(Color::Black));

        // Everything is clean afterwards
        assert!(frame.draw_at(false, at(9, 41, 20)).is_none());
    }

    #[test]
    fn incremental_draw_reports_changed_layers() {
        let dir = tempfile::tempdir().unwrap();
        let mut frame = frame(dir.path(), false);
        frame.draw_at(true, at(9, 41, 0));

        let composition = frame.draw_at(false, at(9, 42, 0)).unwrap();
        assert_eq!(
            composition.changes,
            vec!["Clock has changed. Clock now displays 09:42"]
        );

        frame.set_text("reminder").unwrap();
        let composition = frame.draw_at(false, at(9, 42, 5)).unwrap();
        assert_eq!(
            composition.changes,
            vec!["Info panel has changed. Text now displays reminder"]
        );
    }

    #[test]
    fn alignment_change_forces_full_recompose() {
        let dir = tempfile::tempdir().unwrap();
        let mut frame = frame(dir.path(), false);
        frame.draw_at(true, at(9, 41, 0));

        frame.set_alignment(Alignment::new(VerticalAlignment::Top, HorizontalAlignment::Right));
        let composition = frame.draw_at(false, at(9, 41, 1)).unwrap();
        assert_eq!(composition.changes, vec![FRAME_REDRAWN]);

        // Clock now top right, banner at the bottom
        assert_eq!(composition.image.pixel(168, 0), Some(Color::Black));
        assert_eq!(composition.image.pixel(249, 34), Some(Color::Black));
        assert_eq!(composition.image.pixel(0, 102), Some(Color::Black));
        assert!(frame.draw_at(false, at(9, 41, 2)).is_none());
    }

    #[test]
    fn rotated_frame_is_flipped_consistently() {
        let dir = tempfile::tempdir().unwrap();
        let mut upright = frame(dir.path(), false);
        let mut flipped = frame(dir.path(), true);

        let a = upright.draw_at(true, at(9, 41, 0)).unwrap();
        let b = flipped.draw_at(true, at(9, 41, 0)).unwrap();
        assert_eq!(a.image.rotated_180(), b.image);

        let a = upright.draw_at(false, at(9, 42, 0)).unwrap();
        let b = flipped.draw_at(false, at(9, 42, 0)).unwrap();
        assert_eq!(a.image.rotated_180(), b.image);
    }

    #[test]
    fn switching_info_panels() {
        let dir = tempfile::tempdir().unwrap();
        let mut frame = frame(dir.path(), false);
        frame.draw_at(true, at(9, 41, 0));

        frame.set_active_info(InfoKind::Date).unwrap();
        let composition = frame.draw_at(false, at(9, 41, 5)).unwrap();
        assert_eq!(
            composition.changes,
            vec!["Info panel has changed. Date now displays Mon 04 Mar"]
        );
        assert_eq!(frame.active_info().name(), "Date");

        assert!(matches!(
            frame.set_active_info(InfoKind::Weather),
            Err(CommandError::UnknownPanel(_))
        ));
    }

    #[test]
    fn background_commands() {
        let dir = tempfile::tempdir().unwrap();
        let mut frame = frame(dir.path(), false);

        assert!(matches!(
            frame.set_background(Some("missing.bmp")),
            Err(CommandError::Asset(_))
        ));
        assert!(frame.set_background(None).is_ok());
        assert!(matches!(frame.background(), Background::Slideshow(_)));
    }

    #[test]
    fn descriptions() {
        let dir = tempfile::tempdir().unwrap();
        let frame = frame(dir.path(), false);
        assert_eq!(
            frame.get_info_panel_descriptions(),
            vec![
                "Text Panel: This panel is used to display text.",
                "Date Panel: This panel is used to display the date.",
            ]
        );
        assert_eq!(frame.get_banner_panel_descriptions(), vec!["Banner Panel: "]);
    }
}
