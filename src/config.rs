//! # Configuration Management
//!
//! This module handles loading and parsing configuration from the paper-clock.toml file.
//! It provides a centralized way to configure the display geometry, refresh budget,
//! panel selection, and the optional weather and Fitbit services.
//!
//! A missing file is not an error: the clock starts with [`Config::default`].
//! A file that exists but cannot be parsed, or whose values do not describe a
//! usable layout, is rejected at startup.

use crate::{assets::AssetError, Alignment, HorizontalAlignment, VerticalAlignment};
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "paper-clock.toml";

/// Upper bound for every `*_secs` setting: one leap year.
pub const MAX_INTERVAL_SECS: u64 = 366 * 24 * 60 * 60;

/// Longest accepted `tick_ms`. The clock must be looked at every minute.
pub const MAX_TICK_MS: u64 = 60_000;

/// Startup configuration problems. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read
    #[error("cannot read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    /// TOML syntax or type mismatch
    #[error("invalid config file format: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values that parse but cannot describe a working clock
    #[error("invalid config: {0}")]
    Invalid(String),

    /// Missing or unreadable image asset
    #[error("asset error: {0}")]
    Asset(#[from] AssetError),

    #[error("cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("cannot write config: {0}")]
    Write(#[source] io::Error),
}

/// Application configuration loaded from paper-clock.toml
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Log level and optional log file
    pub logging: LoggingConfig,
    /// Panel geometry, tick rate and refresh budget
    pub display: DisplayConfig,
    /// Layout, panel selection and background
    pub frame: FrameConfig,
    /// Visual Crossing weather service (weather panel shows "loading..." without it)
    pub weather: Option<WeatherConfig>,
    /// Fitbit activity service (activity panel shows "loading..." without it)
    pub fitbit: Option<FitbitConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "paper_clock_lib=debug"
    pub level: String,
    /// Also append plain-text logs to this file
    pub file: Option<PathBuf>,
}

/// Display and refresh configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Frame width in pixels (landscape)
    pub width: u32,
    /// Frame height in pixels (landscape)
    pub height: u32,
    /// The panel is mounted upside down; flip every frame before sending it
    pub rotate_180: bool,
    /// Render loop period in milliseconds
    pub tick_ms: u64,
    /// Partial updates allowed between two full refreshes
    pub partial_ceiling: u32,
    /// Longest time between two full refreshes, in seconds
    pub max_staleness_secs: u64,
    /// SPI / GPIO wiring of the e-paper HAT
    pub hardware: HardwareConfig,
}

/// Raspberry Pi wiring of the Waveshare HAT (BCM GPIO numbers)
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub spi_device: String,
    pub gpio_chip: String,
    pub dc_pin: u32,
    pub rst_pin: u32,
    pub busy_pin: u32,
}

/// Panels that can occupy the info strip next to the clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InfoKind {
    Text,
    Date,
    Weather,
    Activity,
}

impl InfoKind {
    pub const ALL: [InfoKind; 4] = [
        InfoKind::Text,
        InfoKind::Date,
        InfoKind::Weather,
        InfoKind::Activity,
    ];

    pub fn name(self) -> &'static str {
        match self {
            InfoKind::Text => "text",
            InfoKind::Date => "date",
            InfoKind::Weather => "weather",
            InfoKind::Activity => "activity",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name.trim()))
    }
}

/// Panels that can occupy the banner strip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BannerKind {
    Text,
}

/// Frame layout configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FrameConfig {
    pub v_alignment: VerticalAlignment,
    pub h_alignment: HorizontalAlignment,
    /// Fixed background image in `asset_dir`; empty selects the slideshow
    pub default_background: String,
    /// Seconds between slideshow images
    pub slide_interval_secs: u64,
    /// Clock panel size [width, height]
    pub clock_size: [u32; 2],
    /// Banner height in pixels (the banner always spans the full width)
    pub banner_height: u32,
    /// strftime format of the clock face
    pub clock_format: String,
    /// Info panels in rotation order; the first one starts active
    pub infos: Vec<InfoKind>,
    pub banners: Vec<BannerKind>,
    /// Initial text of the text banner
    pub banner_text: String,
    /// Directory of .bmp backgrounds and weather/ icons
    pub asset_dir: PathBuf,
}

/// Visual Crossing timeline API
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub api_key: String,
    /// Base URL; the city is appended
    pub api_url: String,
    pub city: String,
    /// "metric", "us" or "uk"
    pub units: String,
    pub refresh_interval_secs: u64,
}

/// Fitbit Web API with OAuth2 PKCE
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FitbitConfig {
    pub client_id: String,
    /// Authorization code obtained by visiting the logged authorization URL
    pub auth_code: String,
    /// PKCE code verifier (43-128 characters)
    pub code_verifier: String,
    pub scope: String,
    pub authorize_url: String,
    pub token_url: String,
    /// Daily activity endpoint; "<date>.json" is appended
    pub activity_url: String,
    pub refresh_interval_secs: u64,
    /// Where access and refresh tokens are persisted between runs
    pub token_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            logging: LoggingConfig::default(),
            display: DisplayConfig::default(),
            frame: FrameConfig::default(),
            weather: None,
            fitbit: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 250,  // Waveshare 2.13" V4, landscape
            height: 122, // Waveshare 2.13" V4, landscape
            rotate_180: true,
            tick_ms: 330,
            partial_ceiling: 6,
            max_staleness_secs: 12 * 60 * 60,
            hardware: HardwareConfig::default(),
        }
    }
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            spi_device: "/dev/spidev0.0".to_string(),
            gpio_chip: "/dev/gpiochip0".to_string(),
            dc_pin: 25,
            rst_pin: 17,
            busy_pin: 24,
        }
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            v_alignment: VerticalAlignment::Bottom,
            h_alignment: HorizontalAlignment::Left,
            default_background: String::new(),
            slide_interval_secs: 300,
            clock_size: [82, 35],
            banner_height: 20,
            clock_format: "%H:%M".to_string(),
            infos: vec![InfoKind::Text, InfoKind::Date],
            banners: vec![BannerKind::Text],
            banner_text: "paper clock".to_string(),
            asset_dir: PathBuf::from("pic"),
        }
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: "https://weather.visualcrossing.com/VisualCrossingWebServices/rest/services/timeline/"
                .to_string(),
            city: "London".to_string(),
            units: "metric".to_string(),
            refresh_interval_secs: 900,
        }
    }
}

impl Default for FitbitConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            auth_code: String::new(),
            code_verifier: String::new(),
            scope: "activity".to_string(),
            authorize_url: "https://www.fitbit.com/oauth2/authorize".to_string(),
            token_url: "https://api.fitbit.com/oauth2/token".to_string(),
            activity_url: "https://api.fitbit.com/1/user/-/activities/date/".to_string(),
            refresh_interval_secs: 600,
            token_file: PathBuf::from("fitbit-tokens.json"),
        }
    }
}

impl DisplayConfig {
    pub fn tick(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.tick_ms)
    }

    pub fn max_staleness(&self) -> chrono::Duration {
        seconds(self.max_staleness_secs)
    }
}

impl FrameConfig {
    pub fn alignment(&self) -> Alignment {
        Alignment::new(self.v_alignment, self.h_alignment)
    }

    pub fn slide_interval(&self) -> chrono::Duration {
        seconds(self.slide_interval_secs)
    }

    /// The configured fixed background, or `None` for slideshow mode.
    pub fn background(&self) -> Option<&str> {
        let name = self.default_background.trim();
        (!name.is_empty()).then_some(name)
    }
}

impl WeatherConfig {
    pub fn refresh_interval(&self) -> chrono::Duration {
        seconds(self.refresh_interval_secs)
    }
}

impl FitbitConfig {
    pub fn refresh_interval(&self) -> chrono::Duration {
        seconds(self.refresh_interval_secs)
    }
}

/// Clamped to [`MAX_INTERVAL_SECS`]; `validate` rejects anything above it.
fn seconds(secs: u64) -> chrono::Duration {
    let secs = i64::try_from(secs.min(MAX_INTERVAL_SECS)).unwrap_or(i64::MAX);
    chrono::Duration::try_seconds(secs).unwrap_or(chrono::Duration::MAX)
}

fn check_secs(setting: &str, secs: u64) -> Result<(), ConfigError> {
    if secs == 0 || secs > MAX_INTERVAL_SECS {
        return Err(ConfigError::Invalid(format!(
            "{setting} must be between 1 and {MAX_INTERVAL_SECS} seconds, got {secs}"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from paper-clock.toml in the working directory.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(CONFIG_FILE)
    }

    /// Load configuration from specified path.
    /// Falls back to default configuration if the file doesn't exist.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = match fs::read_to_string(path) {
            Ok(contents) => {
                let config = toml::from_str::<Config>(&contents)?;
                info!("Loaded configuration from {}", path.display());
                config
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!(
                    "No config file found at {}, using default configuration",
                    path.display()
                );
                Self::default()
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Save current configuration to the given path
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path.as_ref(), contents).map_err(ConfigError::Write)?;
        info!("Configuration saved to {}", path.as_ref().display());
        Ok(())
    }

    /// Reject layouts the frame cannot compose.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let display = &self.display;
        let frame = &self.frame;
        let [clock_w, clock_h] = frame.clock_size;

        if display.width == 0 || display.height == 0 {
            return Err(ConfigError::Invalid("display size must be non-zero".into()));
        }
        if clock_w == 0 || clock_h == 0 || frame.banner_height == 0 {
            return Err(ConfigError::Invalid(
                "clock and banner sizes must be non-zero".into(),
            ));
        }
        if clock_w >= display.width {
            return Err(ConfigError::Invalid(format!(
                "clock width {clock_w} leaves no room for an info panel on a {}px wide display",
                display.width
            )));
        }
        if clock_h + frame.banner_height >= display.height {
            return Err(ConfigError::Invalid(format!(
                "clock height {clock_h} and banner height {} leave no room for the background",
                frame.banner_height
            )));
        }
        if frame.infos.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one info panel must be enabled".into(),
            ));
        }
        if frame.banners.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one banner panel must be enabled".into(),
            ));
        }
        if StrftimeItems::new(&frame.clock_format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::Invalid(format!(
                "clock format '{}' is not a valid strftime pattern",
                frame.clock_format
            )));
        }
        if display.tick_ms == 0 || display.tick_ms > MAX_TICK_MS {
            return Err(ConfigError::Invalid(format!(
                "tick_ms must be between 1 and {MAX_TICK_MS}, got {}",
                display.tick_ms
            )));
        }
        check_secs("max_staleness_secs", display.max_staleness_secs)?;
        check_secs("slide_interval_secs", frame.slide_interval_secs)?;
        if let Some(weather) = &self.weather {
            check_secs("weather refresh_interval_secs", weather.refresh_interval_secs)?;
        }
        if let Some(fitbit) = &self.fitbit {
            check_secs("fitbit refresh_interval_secs", fitbit.refresh_interval_secs)?;
        }
        Ok(())
    }
}
