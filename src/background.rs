//! # Background Layer
//!
//! The background fills the band between the clock row and the banner. Images
//! are scaled to the whole screen first and then cropped to that band, so a
//! picture keeps its position on screen when the clock moves from the bottom to
//! the top edge; only the visible slice changes.
//!
//! Two modes exist:
//! - [`StaticBackground`]: one configured image, drawn once after it is set
//! - [`Slideshow`]: cycles through every `.bmp` in the asset directory on a
//!   fixed interval

use crate::assets::{AssetError, Assets};
use crate::bitmap::{Bitmap, Border};
use crate::panel::Redraw;
use crate::{Alignment, VerticalAlignment};
use chrono::{DateTime, Duration, Local};
use tracing::{debug, info, warn};

/// Screen size, sibling panel heights and alignment: everything needed to place
/// the background band.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub clock_height: u32,
    pub banner_height: u32,
    pub alignment: Alignment,
}

impl Geometry {
    /// Pixels taken from the (top, bottom) of the screen by the sibling panels.
    pub fn insets(&self) -> (u32, u32) {
        match self.alignment.vertical {
            VerticalAlignment::Bottom => (self.banner_height, self.clock_height),
            VerticalAlignment::Top => (self.clock_height, self.banner_height),
        }
    }

    /// Row where the band starts.
    pub fn offset(&self) -> u32 {
        self.insets().0
    }

    pub fn band_height(&self) -> u32 {
        let (top, bottom) = self.insets();
        self.height.saturating_sub(top + bottom)
    }

    /// Cut the band out of a full-screen image and frame it left and right.
    fn fit(&self, screen_image: &Bitmap) -> Bitmap {
        screen_image
            .crop(1, self.offset(), self.width.saturating_sub(2), self.band_height())
            .expanded(Border::new(1, 0, 1, 0))
    }

    fn blank(&self) -> Bitmap {
        Bitmap::new(self.width.saturating_sub(2), self.band_height())
            .expanded(Border::new(1, 0, 1, 0))
    }
}

/// A single fixed image.
#[derive(Debug, Clone)]
pub struct StaticBackground {
    geometry: Geometry,
    name: Option<String>,
    screen_image: Option<Bitmap>,
    image: Bitmap,
    drawn: bool,
}

impl StaticBackground {
    /// An empty background; [`Self::image`] is a blank band until an image is set.
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            name: None,
            screen_image: None,
            image: geometry.blank(),
            drawn: true,
        }
    }

    /// A background showing `name` from the asset directory.
    pub fn load(geometry: Geometry, assets: &Assets, name: &str) -> Result<Self, AssetError> {
        let mut background = Self::new(geometry);
        background.set_image(assets, name)?;
        Ok(background)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Load and show `name`. On error the current image stays.
    pub fn set_image(&mut self, assets: &Assets, name: &str) -> Result<(), AssetError> {
        let screen_image = assets.load_scaled(name, self.geometry.width, self.geometry.height)?;
        self.image = self.geometry.fit(&screen_image);
        self.screen_image = Some(screen_image);
        self.name = Some(name.to_string());
        self.drawn = false;
        debug!("Background image set to {}", name);
        Ok(())
    }

    /// Recompute the band for a new alignment.
    pub fn set_alignment(&mut self, alignment: Alignment) {
        self.geometry.alignment = alignment;
        self.image = match &self.screen_image {
            Some(screen_image) => self.geometry.fit(screen_image),
            None => self.geometry.blank(),
        };
        self.drawn = false;
    }

    pub fn image(&self) -> &Bitmap {
        &self.image
    }

    /// The image once after it was set, `None` afterwards.
    pub fn draw(&mut self) -> Option<Redraw<'_>> {
        if self.drawn {
            return None;
        }
        self.drawn = true;
        let name = self.name.as_deref()?;
        Some(Redraw {
            image: &self.image,
            change: format!("Drawing {} as background", name),
        })
    }
}

/// Rotates through all backgrounds in the asset directory.
#[derive(Debug, Clone)]
pub struct Slideshow {
    assets: Assets,
    interval: Duration,
    candidates: Vec<String>,
    current: Option<usize>,
    last_rotation: Option<DateTime<Local>>,
    slide: StaticBackground,
}

impl Slideshow {
    pub fn new(geometry: Geometry, assets: Assets, interval: Duration) -> Self {
        Self {
            candidates: assets.list_backgrounds(),
            assets,
            interval,
            current: None,
            last_rotation: None,
            slide: StaticBackground::new(geometry),
        }
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn current(&self) -> Option<&str> {
        self.slide.name()
    }

    pub fn set_alignment(&mut self, alignment: Alignment) {
        self.slide.set_alignment(alignment);
    }

    pub fn image(&self) -> &Bitmap {
        self.slide.image()
    }

    /// Advance to the next slide once the interval has passed.
    ///
    /// The directory is re-listed on every rotation so added or removed files
    /// are picked up without a restart. The first rotation shows the first
    /// file in name order.
    pub fn draw_at(&mut self, now: DateTime<Local>) -> Option<Redraw<'_>> {
        if let Some(last) = self.last_rotation {
            if now - last < self.interval {
                return None;
            }
        }
        self.last_rotation = Some(now);

        self.candidates = self.assets.list_backgrounds();
        if self.candidates.is_empty() {
            warn!(
                "No background images found in {}",
                self.assets.dir().display()
            );
            return None;
        }

        let next = match self.current {
            Some(index) => (index + 1) % self.candidates.len(),
            None => 0,
        };
        self.current = Some(next);

        let name = self.candidates[next].clone();
        if let Err(err) = self.slide.set_image(&self.assets, &name) {
            warn!("Skipping slide {}: {}", name, err);
            return None;
        }
        info!("Slideshow advanced to {}", name);
        self.slide.draw()
    }
}

/// The background layer in either mode.
#[derive(Debug, Clone)]
pub enum Background {
    Static(StaticBackground),
    Slideshow(Slideshow),
}

impl Background {
    pub fn image(&self) -> &Bitmap {
        match self {
            Background::Static(background) => background.image(),
            Background::Slideshow(slideshow) => slideshow.image(),
        }
    }

    pub fn set_alignment(&mut self, alignment: Alignment) {
        match self {
            Background::Static(background) => background.set_alignment(alignment),
            Background::Slideshow(slideshow) => slideshow.set_alignment(alignment),
        }
    }

    pub fn draw_at(&mut self, now: DateTime<Local>) -> Option<Redraw<'_>> {
        match self {
            Background::Static(background) => background.draw(),
            Background::Slideshow(slideshow) => slideshow.draw_at(now),
        }
    }

    /// Name of the image on screen, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            Background::Static(background) => background.name(),
            Background::Slideshow(slideshow) => slideshow.current(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::Color;
    use crate::HorizontalAlignment;
    use chrono::TimeZone;
    use image::{Rgb, RgbImage};
    use std::path::Path;

    fn geometry(vertical: VerticalAlignment) -> Geometry {
        Geometry {
            width: 250,
            height: 122,
            clock_height: 35,
            banner_height: 20,
            alignment: Alignment::new(vertical, HorizontalAlignment::Left),
        }
    }

    /// Black top half, white bottom half.
    fn write_split(path: &Path) {
        RgbImage::from_fn(50, 40, |_, y| if y < 20 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) })
            .save(path)
            .unwrap();
    }

    fn at(seconds: i64) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap() + Duration::seconds(seconds)
    }

    #[test]
    fn insets_follow_vertical_alignment() {
        let bottom = geometry(VerticalAlignment::Bottom);
        assert_eq!(bottom.insets(), (20, 35));
        assert_eq!(bottom.band_height(), 67);

        let top = geometry(VerticalAlignment::Top);
        assert_eq!(top.insets(), (35, 20));
        assert_eq!(top.offset(), 35);
    }

    #[test]
    fn blank_static_background_draws_nothing() {
        let mut background = StaticBackground::new(geometry(VerticalAlignment::Bottom));
        assert!(background.draw().is_none());
        let image = background.image();
        assert_eq!((image.width(), image.height()), (250, 67));
        assert_eq!(image.pixel(0, 10), Some(Color::Black));
        assert_eq!(image.pixel(1, 10), Some(Color::White));
    }

    #[test]
    fn static_image_is_drawn_once_and_recropped_on_alignment() {
        let dir = tempfile::tempdir().unwrap();
        write_split(&dir.path().join("split.bmp"));
        let assets = Assets::new(dir.path());

        let bottom = geometry(VerticalAlignment::Bottom);
        let mut background = StaticBackground::load(bottom, &assets, "split.bmp").unwrap();
        let redraw = background.draw().unwrap();
        assert_eq!(redraw.change, "Drawing split.bmp as background");
        assert!(background.draw().is_none());

        // Band starts at row 20 of a 122px screen: the black half covers rows < 61
        assert_eq!(background.image().pixel(100, 0), Some(Color::Black));
        assert_eq!(background.image().pixel(100, 66), Some(Color::White));

        background.set_alignment(Alignment::new(VerticalAlignment::Top, HorizontalAlignment::Left));
        assert_eq!(background.image().height(), 67);
        // Band now starts at row 35
        assert_eq!(background.image().pixel(100, 0), Some(Color::Black));
        assert_eq!(background.image().pixel(100, 40), Some(Color::White));
        assert!(background.draw().is_some());
    }

    #[test]
    fn slideshow_rotates_in_name_order_on_interval() {
        let dir = tempfile::tempdir().unwrap();
        write_split(&dir.path().join("b.bmp"));
        write_split(&dir.path().join("a.bmp"));
        let mut slideshow = Slideshow::new(
            geometry(VerticalAlignment::Bottom),
            Assets::new(dir.path()),
            Duration::seconds(60),
        );
        assert_eq!(slideshow.candidates(), ["a.bmp", "b.bmp"]);

        assert_eq!(slideshow.draw_at(at(0)).unwrap().change, "Drawing a.bmp as background");
        assert!(slideshow.draw_at(at(30)).is_none());
        assert_eq!(slideshow.draw_at(at(65)).unwrap().change, "Drawing b.bmp as background");
        assert_eq!(slideshow.draw_at(at(130)).unwrap().change, "Drawing a.bmp as background");
        assert_eq!(slideshow.current(), Some("a.bmp"));
    }

    #[test]
    fn empty_slideshow_waits_a_full_interval() {
        let dir = tempfile::tempdir().unwrap();
        let mut background = Background::Slideshow(Slideshow::new(
            geometry(VerticalAlignment::Bottom),
            Assets::new(dir.path()),
            Duration::seconds(60),
        ));

        assert!(background.draw_at(at(0)).is_none());
        write_split(&dir.path().join("late.bmp"));
        assert!(background.draw_at(at(30)).is_none());
        assert!(background.draw_at(at(60)).is_some());
        assert_eq!(background.name(), Some("late.bmp"));
    }
}
