use linux_embedded_hal::spidev::{SpiModeFlags, Spidev, SpidevOptions};
use paper_clock_lib::epd2in13_v4::SoftwareSpi;
use paper_clock_lib::transport::DisplayError;
use std::io::Write;

/// Largest write the spidev driver accepts by default
const SPIDEV_BUFSIZ: usize = 4096;

/// Kernel SPI device; chip select is driven by the kernel.
pub struct SpidevHwSpi {
    dev: Spidev,
}

impl SpidevHwSpi {
    pub fn open(path: &str) -> Result<Self, DisplayError> {
        let mut dev =
            Spidev::open(path).map_err(|e| DisplayError::Spi(format!("{}: {}", path, e)))?;

        let opts = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(4_000_000)
            .mode(SpiModeFlags::SPI_MODE_0)
            .build();
        dev.configure(&opts)
            .map_err(|e| DisplayError::Spi(e.to_string()))?;
        Ok(Self { dev })
    }
}

impl SoftwareSpi for SpidevHwSpi {
    fn write_byte(&mut self, data: u8) -> Result<(), DisplayError> {
        self.write_bytes(&[data])
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<(), DisplayError> {
        for chunk in data.chunks(SPIDEV_BUFSIZ) {
            self.dev
                .write_all(chunk)
                .map_err(|e| DisplayError::Spi(e.to_string()))?;
        }
        Ok(())
    }
}
