//! # Image Assets
//!
//! Backgrounds and weather icons live in one directory (`pic/` by default):
//!
//! ```text
//! pic/
//!   beach.bmp          <- background / slideshow candidates
//!   mountains.bmp
//!   weather/
//!     rain.bmp         <- icons named after the service's icon codes
//!     clear-day.bmp
//! ```
//!
//! Images are decoded with the `image` crate, scaled with a bicubic
//! (Catmull-Rom) filter and thresholded to 1-bit at mid grey.

use crate::bitmap::{Bitmap, Color};
use image::imageops::FilterType;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Problems locating or decoding an image asset.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("file must be a .bmp file: {0}")]
    NotBmp(String),

    #[error("file not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("cannot decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },
}

/// Handle to the asset directory.
#[derive(Clone, Debug)]
pub struct Assets {
    dir: PathBuf,
}

impl Assets {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve a background file name, checking extension and existence.
    pub fn check_image(&self, filename: &str) -> Result<PathBuf, AssetError> {
        if !filename.to_ascii_lowercase().ends_with(".bmp") {
            return Err(AssetError::NotBmp(filename.to_string()));
        }
        let path = self.dir.join(filename);
        if !path.is_file() {
            return Err(AssetError::Missing(path));
        }
        Ok(path)
    }

    /// Load a background and scale it to exactly `width` x `height`.
    pub fn load_scaled(
        &self,
        filename: &str,
        width: u32,
        height: u32,
    ) -> Result<Bitmap, AssetError> {
        let path = self.check_image(filename)?;
        load_bitmap(&path, width, height)
    }

    /// All `.bmp` files directly inside the asset directory, sorted by name so
    /// the slideshow order is stable across runs.
    pub fn list_backgrounds(&self) -> Vec<String> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("Cannot list assets in {}: {}", self.dir.display(), err);
                return Vec::new();
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.to_ascii_lowercase().ends_with(".bmp"))
            .collect();
        names.sort();
        names
    }

    /// Weather icon `weather/<icon>.bmp` scaled to a `size` x `size` square.
    /// Missing icons are logged and skipped; the panel falls back to text.
    pub fn weather_icon(&self, icon: &str, size: u32) -> Option<Bitmap> {
        let path = self.dir.join("weather").join(format!("{icon}.bmp"));
        if !path.is_file() {
            debug!("Weather icon {} not found", path.display());
            return None;
        }
        match load_bitmap(&path, size, size) {
            Ok(bitmap) => Some(bitmap),
            Err(err) => {
                warn!("Weather icon {} unusable: {}", icon, err);
                None
            }
        }
    }
}

fn load_bitmap(path: &Path, width: u32, height: u32) -> Result<Bitmap, AssetError> {
    let decoded = image::open(path).map_err(|source| AssetError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    let gray = image::imageops::resize(&decoded.to_luma8(), width, height, FilterType::CatmullRom);

    let mut bitmap = Bitmap::new(width, height);
    for (x, y, pixel) in gray.enumerate_pixels() {
        if pixel.0[0] < 128 {
            bitmap.set_pixel(x, y, Color::Black);
        }
    }
    Ok(bitmap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_bmp(path: &Path, width: u32, height: u32, black_left_half: bool) {
        let img = RgbImage::from_fn(width, height, |x, _| {
            if black_left_half && x < width / 2 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        img.save(path).unwrap();
    }

    #[test]
    fn check_image_requires_bmp_extension_and_existence() {
        let dir = tempfile::tempdir().unwrap();
        let assets = Assets::new(dir.path());

        assert!(matches!(
            assets.check_image("photo.png"),
            Err(AssetError::NotBmp(_))
        ));
        assert!(matches!(
            assets.check_image("missing.bmp"),
            Err(AssetError::Missing(_))
        ));

        write_bmp(&dir.path().join("present.bmp"), 4, 4, false);
        assert!(assets.check_image("present.bmp").is_ok());
    }

    #[test]
    fn backgrounds_are_listed_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_bmp(&dir.path().join("b.bmp"), 4, 4, false);
        write_bmp(&dir.path().join("a.bmp"), 4, 4, false);
        fs::write(dir.path().join("notes.txt"), "not an image").unwrap();
        fs::create_dir(dir.path().join("weather")).unwrap();

        let assets = Assets::new(dir.path());
        assert_eq!(assets.list_backgrounds(), vec!["a.bmp", "b.bmp"]);
    }

    #[test]
    fn load_scaled_thresholds_to_one_bit() {
        let dir = tempfile::tempdir().unwrap();
        write_bmp(&dir.path().join("half.bmp"), 20, 10, true);

        let bitmap = Assets::new(dir.path()).load_scaled("half.bmp", 40, 20).unwrap();
        assert_eq!((bitmap.width(), bitmap.height()), (40, 20));
        assert_eq!(bitmap.pixel(2, 10), Some(Color::Black));
        assert_eq!(bitmap.pixel(37, 10), Some(Color::White));
    }

    #[test]
    fn missing_weather_icon_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Assets::new(dir.path()).weather_icon("rain", 16).is_none());
    }
}
