//! # Display Transport
//!
//! The narrow contract between the refresh scheduler and whatever shows the
//! pixels. Two implementations ship with the crate:
//!
//! - [`crate::epd2in13_v4::Epd2in13V4`]: the Waveshare 2.13" V4 e-paper HAT
//! - [`TerminalDisplay`]: ASCII art on stdout for development on a desktop
//!
//! Every operation is synchronous and may block (the e-paper BUSY line holds a
//! refresh for up to a few seconds). Errors are hardware errors and are fatal
//! to the render loop.

use crate::bitmap::{Bitmap, Color};
use std::io::{self, Write};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Hardware communication failure.
#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("SPI error: {0}")]
    Spi(String),

    #[error("GPIO error: {0}")]
    Gpio(String),

    /// BUSY never dropped
    #[error("display stayed busy for more than {0:?}")]
    BusyTimeout(Duration),

    /// Image does not match the panel
    #[error("image is {got_width}x{got_height}, panel expects {width}x{height}")]
    Size {
        width: u32,
        height: u32,
        got_width: u32,
        got_height: u32,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Operations a refresh needs from the display.
pub trait DisplayTransport {
    /// Wake the controller and load its configuration.
    fn init(&mut self) -> Result<(), DisplayError>;

    /// Blank the whole panel with a full refresh.
    fn clear(&mut self) -> Result<(), DisplayError>;

    /// Enter deep sleep until the next `init`.
    fn sleep(&mut self) -> Result<(), DisplayError>;

    /// Load `image` as both the shown image and the partial-update reference.
    fn set_base_image(&mut self, image: &Bitmap) -> Result<(), DisplayError>;

    /// Load `image` for a partial refresh.
    fn update_partial(&mut self, image: &Bitmap) -> Result<(), DisplayError>;

    /// Run the full refresh waveform.
    fn turn_on_full(&mut self) -> Result<(), DisplayError>;

    /// Run the fast partial waveform.
    fn turn_on_partial(&mut self) -> Result<(), DisplayError>;
}

impl<T: DisplayTransport + ?Sized> DisplayTransport for Box<T> {
    fn init(&mut self) -> Result<(), DisplayError> {
        (**self).init()
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        (**self).clear()
    }

    fn sleep(&mut self) -> Result<(), DisplayError> {
        (**self).sleep()
    }

    fn set_base_image(&mut self, image: &Bitmap) -> Result<(), DisplayError> {
        (**self).set_base_image(image)
    }

    fn update_partial(&mut self, image: &Bitmap) -> Result<(), DisplayError> {
        (**self).update_partial(image)
    }

    fn turn_on_full(&mut self) -> Result<(), DisplayError> {
        (**self).turn_on_full()
    }

    fn turn_on_partial(&mut self) -> Result<(), DisplayError> {
        (**self).turn_on_partial()
    }
}

/// Development display: prints every refreshed frame as ASCII art.
///
/// Each character covers a 2x4 pixel block and is `#` when any pixel of the
/// block is black, so a 250x122 frame fits in 125x31 characters.
pub struct TerminalDisplay<W: Write = io::Stdout> {
    out: W,
    pending: Option<Bitmap>,
    partials: u32,
}

impl TerminalDisplay {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalDisplay<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            pending: None,
            partials: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn show(&mut self, header: &str) -> Result<(), DisplayError> {
        writeln!(self.out, "{}", header)?;
        if let Some(image) = &self.pending {
            write!(self.out, "{}", render_ascii(image))?;
        }
        self.out.flush()?;
        Ok(())
    }
}

impl<W: Write> DisplayTransport for TerminalDisplay<W> {
    fn init(&mut self) -> Result<(), DisplayError> {
        debug!("Terminal display ready");
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        self.pending = None;
        Ok(())
    }

    fn sleep(&mut self) -> Result<(), DisplayError> {
        Ok(())
    }

    fn set_base_image(&mut self, image: &Bitmap) -> Result<(), DisplayError> {
        self.pending = Some(image.clone());
        Ok(())
    }

    fn update_partial(&mut self, image: &Bitmap) -> Result<(), DisplayError> {
        self.pending = Some(image.clone());
        Ok(())
    }

    fn turn_on_full(&mut self) -> Result<(), DisplayError> {
        self.partials = 0;
        self.show("[full refresh]")
    }

    fn turn_on_partial(&mut self) -> Result<(), DisplayError> {
        self.partials += 1;
        let header = format!("[partial #{}]", self.partials);
        self.show(&header)
    }
}

/// ASCII rendering of a bitmap, one line per four pixel rows.
pub fn render_ascii(image: &Bitmap) -> String {
    const BLOCK_W: u32 = 2;
    const BLOCK_H: u32 = 4;

    let columns = image.width().div_ceil(BLOCK_W);
    let rows = image.height().div_ceil(BLOCK_H);
    let mut out = String::with_capacity(((columns + 1) * rows) as usize);

    for row in 0..rows {
        for column in 0..columns {
            let inked = (0..BLOCK_H).any(|dy| {
                (0..BLOCK_W).any(|dx| {
                    image.pixel(column * BLOCK_W + dx, row * BLOCK_H + dy) == Some(Color::Black)
                })
            });
            out.push(if inked { '#' } else { ' ' });
        }
        out.push('\n');
    }
    out
}
