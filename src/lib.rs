//! # Paper Clock Core Library
//!
//! This library holds the display composition and refresh-scheduling engine for
//! the paper clock: a Raspberry Pi driving a 2.13" black/white e-paper panel that
//! shows the time, an info strip (text, date, weather or fitness activity), a
//! banner and a rotating background picture.
//!
//! ## Design Philosophy
//!
//! ### Redraw Only What Changed
//! - Every layer answers `draw()` with `None` when nothing changed since the last
//!   call, so most ticks end without touching the hardware
//! - Service-backed panels cache their last payload and only re-render when the
//!   new payload differs field by field
//! - The frame keeps the last composed canvas and pastes changed layers into it
//!
//! ### Refresh Budget
//! Partial e-paper updates are fast but leave ghosting behind. The
//! [`scheduler`] counts partial updates and forces a full clear-and-redraw once a
//! configurable budget or age is exceeded.
//!
//! ### Data Flow
//! 1. **Services**: weather / fitness fetchers poll in the background
//! 2. **Panels**: pull the newest payload at most once per refresh interval
//! 3. **Frame**: composes background, clock, info and banner layers
//! 4. **Scheduler**: picks a partial or full refresh and drives the transport
//!
//! ## Layout
//!
//! The clock sits in one corner chosen by an [`Alignment`]; the active info panel
//! fills the rest of the clock's row, the banner spans the opposite edge and the
//! background fills what is left in between.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Module declarations
pub mod app;
pub mod assets;
pub mod background;
pub mod bitmap;
pub mod bodies;
pub mod commands;
pub mod config;
pub mod epd2in13_v4;
pub mod fitbit;
pub mod frame;
pub mod logging;
pub mod panel;
pub mod scheduler;
pub mod services;
pub mod transport;
pub mod weather;

/// Which edge of the screen holds the clock row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerticalAlignment {
    Top,
    Bottom,
}

/// Which side of the clock row holds the clock itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HorizontalAlignment {
    Left,
    Right,
}

/// Clock placement: one of the four screen corners.
///
/// # Example
/// ```
/// use paper_clock_lib::{Alignment, HorizontalAlignment, VerticalAlignment};
///
/// let alignment: Alignment = "bottom left".parse().unwrap();
/// assert_eq!(alignment.vertical, VerticalAlignment::Bottom);
/// assert_eq!(alignment.horizontal, HorizontalAlignment::Left);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alignment {
    pub vertical: VerticalAlignment,
    pub horizontal: HorizontalAlignment,
}

impl Alignment {
    pub const fn new(vertical: VerticalAlignment, horizontal: HorizontalAlignment) -> Self {
        Self {
            vertical,
            horizontal,
        }
    }
}

impl Default for Alignment {
    fn default() -> Self {
        Self::new(VerticalAlignment::Bottom, HorizontalAlignment::Left)
    }
}

/// Error for alignment names that are neither TOP/BOTTOM nor LEFT/RIGHT.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown alignment '{0}'")]
pub struct ParseAlignmentError(pub String);

impl FromStr for VerticalAlignment {
    type Err = ParseAlignmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TOP" => Ok(Self::Top),
            "BOTTOM" => Ok(Self::Bottom),
            _ => Err(ParseAlignmentError(s.to_string())),
        }
    }
}

impl FromStr for HorizontalAlignment {
    type Err = ParseAlignmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LEFT" => Ok(Self::Left),
            "RIGHT" => Ok(Self::Right),
            _ => Err(ParseAlignmentError(s.to_string())),
        }
    }
}

impl FromStr for Alignment {
    type Err = ParseAlignmentError;

    /// Parse "<vertical> <horizontal>", e.g. `"TOP RIGHT"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(v), Some(h), None) => Ok(Self::new(v.parse()?, h.parse()?)),
            _ => Err(ParseAlignmentError(s.to_string())),
        }
    }
}

impl fmt::Display for VerticalAlignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Top => write!(f, "TOP"),
            Self::Bottom => write!(f, "BOTTOM"),
        }
    }
}

impl fmt::Display for HorizontalAlignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => write!(f, "LEFT"),
            Self::Right => write!(f, "RIGHT"),
        }
    }
}

impl fmt::Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.vertical, self.horizontal)
    }
}
