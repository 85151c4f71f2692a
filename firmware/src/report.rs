use core::fmt::{self, Debug, Write};

use levelcap_core::{status_line, Outcome};
use stm32f7xx_hal::prelude::*;

use crate::board::ConsoleSerial;

/// Line oriented text output on the serial port
pub struct Console {
    serial: ConsoleSerial,
}

impl Console {
    pub fn new(serial: ConsoleSerial) -> Self {
        Self { serial }
    }
}

impl fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for &byte in s.as_bytes() {
            nb::block!(self.serial.write(byte)).map_err(|_| fmt::Error)?;
        }
        Ok(())
    }
}

/// Send the status line of one cycle to the console and to the defmt log
///
/// Output failures are dropped, the measurement loop keeps going regardless.
pub fn emit<E: Debug>(console: &mut Console, outcome: &Outcome<E>) {
    let line = status_line(outcome);

    match outcome {
        Ok(reading) if reading.is_nominal() => defmt::info!("{=str}", line.as_str()),
        Ok(_) => defmt::warn!("{=str}", line.as_str()),
        Err(_) => defmt::error!("{=str}", line.as_str()),
    }

    let _ = write!(console, "{}\r\n", line);
}
