//! The RC charge-time measurement cycle
//!
//! One cycle drains the sense node, lets the pull-up resistor charge the sensor
//! plate, times the crossing of the digital input threshold and turns that time
//! into a capacitance and a liquid height. The node is driven low again before a
//! cycle returns, whatever happened in between.

use core::fmt;

use fugit::HertzU32;

use crate::{
    config::{Config, ConfigError},
    measurement::{Reading, Sample},
    units::Ticks,
};

/// Electrical mode of the sense node
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NodeMode {
    /// Sinking to ground, the sensor is being emptied
    DrivenLow,
    /// High impedance input, the resistor charges the sensor
    Released,
}

/// The single pin shared between discharging and threshold detection
pub trait SenseNode {
    type Error;

    fn drive_low(&mut self) -> Result<(), Self::Error>;
    fn release(&mut self) -> Result<(), Self::Error>;
    fn is_high(&mut self) -> Result<bool, Self::Error>;
}

/// A free running counter used as the time reference of a cycle
pub trait ChargeClock {
    fn rate(&self) -> HertzU32;
    fn now(&mut self) -> Ticks;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    Discharging,
    AwaitingThreshold,
    Computing,
    Reporting,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CycleError<E> {
    /// The node did not reach the threshold within the configured bound
    ThresholdTimeout { waited_us: u32 },
    Node(E),
}

impl<E: fmt::Debug> fmt::Display for CycleError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleError::ThresholdTimeout { waited_us } => {
                write!(f, "threshold timeout after {waited_us} us")
            }
            CycleError::Node(e) => write!(f, "sense node error: {e:?}"),
        }
    }
}

#[cfg(feature = "std")]
impl<E: fmt::Debug> std::error::Error for CycleError<E> {}

pub type Outcome<E> = Result<Reading, CycleError<E>>;

pub struct MeasurementCycle<N, C> {
    node: N,
    clock: C,
    config: Config,
    phase: Phase,
    hold: Ticks,
    timeout: Ticks,
}

impl<N: SenseNode, C: ChargeClock> MeasurementCycle<N, C> {
    pub fn new(node: N, clock: C, config: Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let rate = clock.rate();
        if rate.to_Hz() == 0 {
            return Err(ConfigError::ZeroClockRate);
        }

        // Both waits compare a wrapping difference, which only works below half the counter range
        let hold = Ticks::from_micros_ceil(config.cycle.discharge_hold_us, rate)
            .ok_or(ConfigError::HoldTooLong)?;
        let timeout = Ticks::from_micros_ceil(config.cycle.threshold_timeout_us, rate)
            .ok_or(ConfigError::TimeoutTooLong)?;

        Ok(Self {
            node,
            clock,
            config,
            phase: Phase::Discharging,
            hold,
            timeout,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn into_parts(self) -> (N, C) {
        (self.node, self.clock)
    }

    /// Drive the node low and wait out the configured hold time
    pub fn discharge(&mut self) -> Result<(), N::Error> {
        self.phase = Phase::Discharging;
        self.node.drive_low()?;

        let start = self.clock.now();
        while self.clock.now() - start < self.hold {}

        Ok(())
    }

    /// Release the node and return the tick count the charge started at
    pub fn start_timed_charge(&mut self) -> Result<Ticks, N::Error> {
        self.node.release()?;
        self.phase = Phase::AwaitingThreshold;
        Ok(self.clock.now())
    }

    /// Poll the node until it reads high, or give up once the timeout has passed
    pub fn await_threshold(&mut self, start: Ticks) -> Result<Ticks, CycleError<N::Error>> {
        loop {
            let high = self.node.is_high().map_err(CycleError::Node)?;
            let elapsed = self.clock.now() - start;

            if high {
                return Ok(elapsed);
            }

            if elapsed >= self.timeout {
                return Err(CycleError::ThresholdTimeout {
                    waited_us: elapsed.to_micros(self.clock.rate()),
                });
            }
        }
    }

    /// Return the node to its discharge configuration. Safe to call any number of times.
    pub fn rearm(&mut self) -> Result<(), N::Error> {
        self.node.drive_low()?;
        self.phase = Phase::Discharging;
        Ok(())
    }

    /// Run one full cycle and hand the outcome to `report` before returning it
    ///
    /// The node is re-armed on every path out of here, including timeouts and pin
    /// errors, before the outcome is reported. A failed rearm takes precedence over
    /// whatever the cycle produced, since the node may still be released.
    pub fn run_once(&mut self, report: impl FnOnce(&Outcome<N::Error>)) -> Outcome<N::Error> {
        let outcome = self.charge_and_compute();

        let outcome = match self.rearm() {
            Ok(()) => outcome,
            Err(e) => Err(CycleError::Node(e)),
        };

        self.phase = Phase::Reporting;
        report(&outcome);
        self.phase = Phase::Discharging;

        outcome
    }

    pub fn measure(&mut self) -> Outcome<N::Error> {
        self.run_once(|_| {})
    }

    fn charge_and_compute(&mut self) -> Outcome<N::Error> {
        self.discharge().map_err(CycleError::Node)?;
        let start = self.start_timed_charge().map_err(CycleError::Node)?;
        let ticks = self.await_threshold(start)?;

        self.phase = Phase::Computing;
        let calibration = &self.config.calibration;
        let sample = Sample::from_ticks(ticks, self.clock.rate(), calibration);

        Ok(Reading::new(sample, calibration))
    }
}
