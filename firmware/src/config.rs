//! Build time configuration of this unit

use levelcap_core::{Calibration, Config, CycleSettings};

pub const CALIBRATION: Calibration = Calibration::DEFAULT;

/// Busy-wait variant, 2 ms hold
pub const POLLING: Config = Config {
    calibration: CALIBRATION,
    cycle: CycleSettings::DEFAULT,
};

/// Input capture variant. Waits run on the 1 ms systick, so the hold and
/// timeout are rounded up to whole milliseconds.
pub const CAPTURE: Config = Config {
    calibration: CALIBRATION,
    cycle: CycleSettings {
        discharge_hold_us: 1_000,
        ..CycleSettings::DEFAULT
    },
};
