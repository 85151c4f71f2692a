use core::fmt::{self, Write};

use crate::{
    cycle::Outcome,
    measurement::{Reading, Status},
};

pub const STATUS_LINE_LEN: usize = 96;

pub type StatusLine = heapless::String<STATUS_LINE_LEN>;

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t_us={}  C={:.2} pF  h={:.1} mm",
            self.sample.elapsed_micros(),
            self.sample.capacitance.as_picofarads(),
            self.sample.height_mm,
        )?;

        if self.status == Status::OutOfRange {
            f.write_str(" (out of range)")?;
        }

        Ok(())
    }
}

/// Render the human readable line for one cycle
///
/// Formatting never fails the cycle: a line that does not fit is cut short.
pub fn status_line<E: fmt::Debug>(outcome: &Outcome<E>) -> StatusLine {
    let mut line = StatusLine::new();

    let _ = match outcome {
        Ok(reading) => write!(line, "{reading}"),
        Err(e) => write!(line, "{e}"),
    };

    line
}
