use linux_embedded_hal::gpio_cdev::{Chip, LineHandle, LineRequestFlags};
use paper_clock_lib::epd2in13_v4::{GpioPin, InputPin};
use paper_clock_lib::transport::DisplayError;

const CONSUMER: &str = "paper-clock";

fn request(
    chip: &mut Chip,
    offset: u32,
    flags: LineRequestFlags,
) -> Result<LineHandle, DisplayError> {
    chip.get_line(offset)
        .and_then(|line| line.request(flags, 0, CONSUMER))
        .map_err(|e| DisplayError::Gpio(format!("line {}: {}", offset, e)))
}

pub struct CdevOutputPin {
    line: LineHandle,
}

pub struct CdevInputPin {
    line: LineHandle,
}

impl CdevOutputPin {
    pub fn new(chip: &mut Chip, offset: u32) -> Result<Self, DisplayError> {
        Ok(Self {
            line: request(chip, offset, LineRequestFlags::OUTPUT)?,
        })
    }
}

impl CdevInputPin {
    pub fn new(chip: &mut Chip, offset: u32) -> Result<Self, DisplayError> {
        Ok(Self {
            line: request(chip, offset, LineRequestFlags::INPUT)?,
        })
    }
}

impl GpioPin for CdevOutputPin {
    fn set_high(&mut self) -> Result<(), DisplayError> {
        self.line
            .set_value(1)
            .map_err(|e| DisplayError::Gpio(e.to_string()))
    }

    fn set_low(&mut self) -> Result<(), DisplayError> {
        self.line
            .set_value(0)
            .map_err(|e| DisplayError::Gpio(e.to_string()))
    }
}

impl InputPin for CdevInputPin {
    fn is_high(&self) -> Result<bool, DisplayError> {
        let value = self
            .line
            .get_value()
            .map_err(|e| DisplayError::Gpio(e.to_string()))?;
        Ok(value == 1)
    }
}
