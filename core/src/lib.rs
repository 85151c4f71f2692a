#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod config;
pub mod cycle;
pub mod measurement;
pub mod report;
#[cfg(any(test, feature = "std"))]
pub mod sim;
pub mod units;

pub use config::{Calibration, Config, ConfigError, CycleSettings};
pub use cycle::{ChargeClock, CycleError, MeasurementCycle, NodeMode, Outcome, Phase, SenseNode};
pub use measurement::{compute_capacitance, compute_height, Reading, Sample, Status};
pub use report::{status_line, StatusLine};
pub use units::{Capacitance, Ticks};
