//! Waveshare 2.13" V4 (SSD1680, 122x250) driver
//!
//! Follows the command sequences of the Waveshare reference driver for this
//! panel, including the partial-refresh mode used for the per-minute clock
//! updates. The controller is portrait (122 pixels wide, 250 tall); landscape
//! frames are turned a quarter counter-clockwise before they are sent.
//!
//! The driver only needs a byte-oriented SPI bus, two output pins and the BUSY
//! input, so it stays independent of any particular HAL. The binary provides
//! spidev / gpio-cdev implementations of the traits below.

use crate::bitmap::Bitmap;
use crate::transport::{DisplayError, DisplayTransport};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Controller RAM dimensions (portrait)
pub const EPD_WIDTH: u32 = 122;
pub const EPD_HEIGHT: u32 = 250;

/// Longest time a refresh may hold BUSY high
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(10);
const BUSY_POLL_MS: u32 = 10;

/// Byte-oriented SPI bus with chip select handled by the bus itself
pub trait SoftwareSpi {
    fn write_byte(&mut self, data: u8) -> Result<(), DisplayError>;

    fn write_bytes(&mut self, data: &[u8]) -> Result<(), DisplayError> {
        for &byte in data {
            self.write_byte(byte)?;
        }
        Ok(())
    }
}

/// Output pin (DC, RST)
pub trait GpioPin {
    fn set_high(&mut self) -> Result<(), DisplayError>;
    fn set_low(&mut self) -> Result<(), DisplayError>;
}

/// Input pin (BUSY)
pub trait InputPin {
    fn is_high(&self) -> Result<bool, DisplayError>;
}

/// Blocking millisecond delay
pub trait Delay {
    fn delay_ms(&mut self, ms: u32);
}

/// `thread::sleep` based delay
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadDelay;

impl Delay for ThreadDelay {
    fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(ms as u64));
    }
}

pub struct Epd2in13V4<SPI, DC, RST, BUSY, D = ThreadDelay> {
    spi: SPI,
    dc_pin: DC,
    rst_pin: RST,
    busy_pin: BUSY,
    delay: D,
}

impl<SPI, DC, RST, BUSY> Epd2in13V4<SPI, DC, RST, BUSY, ThreadDelay>
where
    SPI: SoftwareSpi,
    DC: GpioPin,
    RST: GpioPin,
    BUSY: InputPin,
{
    pub fn new(spi: SPI, dc_pin: DC, rst_pin: RST, busy_pin: BUSY) -> Self {
        Self::with_delay(spi, dc_pin, rst_pin, busy_pin, ThreadDelay)
    }
}

impl<SPI, DC, RST, BUSY, D> Epd2in13V4<SPI, DC, RST, BUSY, D>
where
    SPI: SoftwareSpi,
    DC: GpioPin,
    RST: GpioPin,
    BUSY: InputPin,
    D: Delay,
{
    pub fn with_delay(spi: SPI, dc_pin: DC, rst_pin: RST, busy_pin: BUSY, delay: D) -> Self {
        Self {
            spi,
            dc_pin,
            rst_pin,
            busy_pin,
            delay,
        }
    }

    /// Hardware reset pulse
    fn reset(&mut self) -> Result<(), DisplayError> {
        self.rst_pin.set_high()?;
        self.delay.delay_ms(20);
        self.rst_pin.set_low()?;
        self.delay.delay_ms(2);
        self.rst_pin.set_high()?;
        self.delay.delay_ms(20);
        Ok(())
    }

    fn send_command(&mut self, command: u8) -> Result<(), DisplayError> {
        self.dc_pin.set_low()?;
        self.spi.write_byte(command)
    }

    fn send_data(&mut self, data: &[u8]) -> Result<(), DisplayError> {
        self.dc_pin.set_high()?;
        self.spi.write_bytes(data)
    }

    fn command_with(&mut self, command: u8, data: &[u8]) -> Result<(), DisplayError> {
        self.send_command(command)?;
        self.send_data(data)
    }

    /// Wait while BUSY is high, giving up after [`BUSY_TIMEOUT`].
    fn read_busy(&mut self) -> Result<(), DisplayError> {
        let max_polls = BUSY_TIMEOUT.as_millis() as u32 / BUSY_POLL_MS;
        let mut polls = 0;
        while self.busy_pin.is_high()? {
            if polls >= max_polls {
                return Err(DisplayError::BusyTimeout(BUSY_TIMEOUT));
            }
            self.delay.delay_ms(BUSY_POLL_MS);
            polls += 1;
        }
        debug!("EPD ready after {} busy polls", polls);
        Ok(())
    }

    fn set_window(
        &mut self,
        x_start: u32,
        y_start: u32,
        x_end: u32,
        y_end: u32,
    ) -> Result<(), DisplayError> {
        self.command_with(0x44, &[(x_start >> 3) as u8, (x_end >> 3) as u8])?;
        self.command_with(
            0x45,
            &[
                (y_start & 0xFF) as u8,
                (y_start >> 8) as u8,
                (y_end & 0xFF) as u8,
                (y_end >> 8) as u8,
            ],
        )
    }

    fn set_cursor(&mut self, x: u32, y: u32) -> Result<(), DisplayError> {
        self.command_with(0x4E, &[(x & 0xFF) as u8])?;
        self.command_with(0x4F, &[(y & 0xFF) as u8, (y >> 8) as u8])
    }

    /// Full-screen window, cursor at the origin.
    fn set_full_window(&mut self) -> Result<(), DisplayError> {
        self.set_window(0, 0, EPD_WIDTH - 1, EPD_HEIGHT - 1)?;
        self.set_cursor(0, 0)
    }

    fn turn_on_display(&mut self) -> Result<(), DisplayError> {
        self.command_with(0x22, &[0xF7])?; // Display update control: full
        self.send_command(0x20)?; // Activate display update sequence
        self.read_busy()
    }

    fn turn_on_display_part(&mut self) -> Result<(), DisplayError> {
        self.command_with(0x22, &[0xFF])?; // Display update control: partial
        self.send_command(0x20)?;
        self.read_busy()
    }

    /// Portrait RAM image of `image`, which may be given in either orientation.
    fn ram_image(image: &Bitmap) -> Result<Bitmap, DisplayError> {
        match (image.width(), image.height()) {
            (EPD_WIDTH, EPD_HEIGHT) => Ok(image.clone()),
            (EPD_HEIGHT, EPD_WIDTH) => Ok(image.rotated_90_ccw()),
            (got_width, got_height) => Err(DisplayError::Size {
                width: EPD_HEIGHT,
                height: EPD_WIDTH,
                got_width,
                got_height,
            }),
        }
    }
}

impl<SPI, DC, RST, BUSY, D> DisplayTransport for Epd2in13V4<SPI, DC, RST, BUSY, D>
where
    SPI: SoftwareSpi,
    DC: GpioPin,
    RST: GpioPin,
    BUSY: InputPin,
    D: Delay,
{
    fn init(&mut self) -> Result<(), DisplayError> {
        debug!("Initializing EPD");
        self.reset()?;

        self.read_busy()?;
        self.send_command(0x12)?; // SWRESET
        self.read_busy()?;

        self.command_with(0x01, &[0xF9, 0x00, 0x00])?; // Driver output control
        self.command_with(0x11, &[0x03])?; // Data entry mode: x+, y+
        self.set_full_window()?;
        self.command_with(0x3C, &[0x05])?; // Border waveform
        self.command_with(0x21, &[0x00, 0x80])?; // Display update control
        self.command_with(0x18, &[0x80])?; // Internal temperature sensor
        self.read_busy()
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        let white = vec![0xFF; (EPD_WIDTH.div_ceil(8) * EPD_HEIGHT) as usize];
        self.command_with(0x24, &white)?;
        self.turn_on_display()
    }

    fn sleep(&mut self) -> Result<(), DisplayError> {
        self.command_with(0x10, &[0x01])?; // Deep sleep mode 1
        self.delay.delay_ms(2000);
        Ok(())
    }

    fn set_base_image(&mut self, image: &Bitmap) -> Result<(), DisplayError> {
        let ram = Self::ram_image(image)?;
        self.command_with(0x24, ram.as_bytes())?;
        self.command_with(0x26, ram.as_bytes())
    }

    fn update_partial(&mut self, image: &Bitmap) -> Result<(), DisplayError> {
        let ram = Self::ram_image(image)?;

        self.rst_pin.set_low()?;
        self.delay.delay_ms(1);
        self.rst_pin.set_high()?;

        self.command_with(0x3C, &[0x80])?; // Border waveform
        self.command_with(0x01, &[0xF9, 0x00, 0x00])?;
        self.command_with(0x11, &[0x03])?;
        self.set_full_window()?;
        self.command_with(0x24, ram.as_bytes())
    }

    fn turn_on_full(&mut self) -> Result<(), DisplayError> {
        self.turn_on_display()
    }

    fn turn_on_partial(&mut self) -> Result<(), DisplayError> {
        self.turn_on_display_part()
    }
}
