use core::ops::Sub;

use fugit::HertzU32;

/// Raw timer counts since the charge started
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Ticks(pub u32);

impl Ticks {
    pub const ZERO: Ticks = Ticks(0);

    /// Longest span a wrapping difference still measures when reads skip ticks.
    /// Any read of a longer span may already have wrapped past the target.
    pub const MAX_SPAN: Ticks = Ticks(u32::MAX / 2);

    pub fn to_secs(self, rate: HertzU32) -> f32 {
        self.0 as f32 / rate.to_Hz() as f32
    }

    pub fn to_micros(self, rate: HertzU32) -> u32 {
        let micros = self.0 as u64 * 1_000_000 / u64::from(rate.to_Hz());
        micros.try_into().unwrap_or(u32::MAX)
    }

    /// Number of ticks covering at least `micros` at the given rate, `None` above
    /// [`Self::MAX_SPAN`]
    pub fn from_micros_ceil(micros: u32, rate: HertzU32) -> Option<Self> {
        let ticks = (micros as u64 * u64::from(rate.to_Hz())).div_ceil(1_000_000);

        if ticks > u64::from(Self::MAX_SPAN.0) {
            return None;
        }

        Some(Ticks(ticks as u32))
    }
}

// Timer counters wrap, so the distance between two readings is modular.
impl Sub for Ticks {
    type Output = Ticks;

    fn sub(self, rhs: Self) -> Self::Output {
        Ticks(self.0.wrapping_sub(rhs.0))
    }
}

/// Capacitance in farads
#[derive(Copy, Clone, Debug, Default, PartialEq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Capacitance(pub f32);

impl Capacitance {
    pub fn from_picofarads(picofarads: f32) -> Self {
        Self(picofarads * 1e-12)
    }

    pub const fn as_farads(self) -> f32 {
        self.0
    }

    pub fn as_picofarads(self) -> f32 {
        self.0 * 1e12
    }
}
