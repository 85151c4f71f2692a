use fugit::HertzU32;

use crate::{
    config::Calibration,
    units::{Capacitance, Ticks},
};

/// Solve `elapsed = k * R * C` for `C`
///
/// `elapsed_secs` in seconds and `resistance_ohms` in ohms yield farads. `k` is the
/// threshold factor, `ln(1 / (1 - v_threshold / v_supply))`.
pub fn compute_capacitance(elapsed_secs: f32, resistance_ohms: f32, k: f32) -> Capacitance {
    Capacitance(elapsed_secs / (k * resistance_ohms))
}

/// Linear map from sensor capacitance to liquid height in millimetres
///
/// Neither clamped nor checked: readings outside the tube pass through as-is.
pub fn compute_height(capacitance: Capacitance, offset: Capacitance, per_mm: Capacitance) -> f32 {
    (capacitance.0 - offset.0) / per_mm.0
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    Nominal,
    /// Height below the tube bottom or above its top
    OutOfRange,
}

/// Everything derived from one threshold crossing
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sample {
    pub ticks: Ticks,
    pub elapsed_secs: f32,
    pub capacitance: Capacitance,
    pub height_mm: f32,
}

impl Sample {
    pub fn from_ticks(ticks: Ticks, rate: HertzU32, calibration: &Calibration) -> Self {
        let elapsed_secs = ticks.to_secs(rate);
        let capacitance = compute_capacitance(
            elapsed_secs,
            calibration.resistance_ohms,
            calibration.threshold_factor,
        );
        let height_mm = compute_height(
            capacitance,
            calibration.offset(),
            calibration.sensitivity_per_mm(),
        );

        Self {
            ticks,
            elapsed_secs,
            capacitance,
            height_mm,
        }
    }

    pub fn elapsed_micros(&self) -> u32 {
        libm::roundf(self.elapsed_secs * 1e6) as u32
    }

    pub fn status(&self, calibration: &Calibration) -> Status {
        if (0.0..=calibration.tube_length_mm).contains(&self.height_mm) {
            Status::Nominal
        } else {
            Status::OutOfRange
        }
    }
}

/// A classified sample, ready to be reported
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reading {
    pub sample: Sample,
    pub status: Status,
}

impl Reading {
    pub fn new(sample: Sample, calibration: &Calibration) -> Self {
        Self {
            status: sample.status(calibration),
            sample,
        }
    }

    pub fn is_nominal(&self) -> bool {
        self.status == Status::Nominal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fugit::RateExtU32;
    use rand::{
        distributions::{Distribution, Uniform},
        thread_rng, Rng,
    };
    use rand_distr::Normal;

    const K: f32 = 0.693;

    fn close(a: f32, b: f32, rel: f32) -> bool {
        (a - b).abs() <= rel * a.abs().max(b.abs())
    }

    #[test]
    fn hundred_nanofarad_scenario() {
        let c = compute_capacitance(6.93e-3, 100e3, K);
        assert!(close(c.as_farads(), 1.0e-7, 1e-5), "got {c:?}");
    }

    #[test]
    fn one_millimetre_scenario() {
        let h = compute_height(
            Capacitance::from_picofarads(66.7),
            Capacitance::from_picofarads(51.0),
            Capacitance::from_picofarads(15.7),
        );
        assert!(close(h, 1.0, 1e-4), "got {h}");
    }

    #[test]
    fn zero_elapsed_is_zero_capacitance() {
        let c = compute_capacitance(0.0, 100e3, K);
        assert_eq!(c.as_farads(), 0.0);

        let h = compute_height(
            c,
            Calibration::DEFAULT.offset(),
            Calibration::DEFAULT.sensitivity_per_mm(),
        );
        assert!(h <= 0.0);
    }

    #[test]
    fn height_at_offset_is_zero() {
        let mut rng = thread_rng();
        for _ in 0..1000 {
            let offset = Capacitance::from_picofarads(rng.gen_range(0.0..500.0));
            let per_mm = Capacitance::from_picofarads(rng.gen_range(0.001..50.0));
            assert_eq!(compute_height(offset, offset, per_mm), 0.0);
        }
    }

    #[test]
    fn height_is_linear() {
        let offset = Capacitance::from_picofarads(51.0);
        let per_mm = Capacitance::from_picofarads(15.7);

        let slope = |a: f32, b: f32| {
            let ha = compute_height(Capacitance::from_picofarads(a), offset, per_mm);
            let hb = compute_height(Capacitance::from_picofarads(b), offset, per_mm);
            (hb - ha) / (b - a)
        };

        let expected = 1.0 / 15.7;
        assert!(close(slope(10.0, 20.0), expected, 1e-3));
        assert!(close(slope(100.0, 400.0), expected, 1e-3));
        assert!(close(slope(-30.0, 0.0), expected, 1e-3));
    }

    #[test]
    fn capacitance_round_trip() {
        let dist = Uniform::new(1e-12f32, 1e-6);
        let rng = &mut thread_rng();

        for _ in 0..1000 {
            let r = rng.gen_range(1e3f32..1e7);
            let c = dist.sample(rng);
            let t = K * r * c;
            let back = compute_capacitance(t, r, K).as_farads();
            assert!(close(back, c, 1e-5), "r={r} c={c} back={back}");
        }
    }

    #[test]
    fn plate_noise_averages_out() {
        let noise = Normal::new(0.0f32, 0.5).unwrap();
        let rng = &mut thread_rng();
        let offset = Capacitance::from_picofarads(51.0);
        let per_mm = Capacitance::from_picofarads(15.7);

        let n = 1000;
        let mean = (0..n)
            .map(|_| {
                let c = Capacitance::from_picofarads(66.7 + noise.sample(rng));
                compute_height(c, offset, per_mm)
            })
            .sum::<f32>()
            / n as f32;

        assert!((mean - 1.0).abs() < 0.01, "mean height {mean}");
    }

    #[test]
    fn capacitance_is_monotonic() {
        let rng = &mut thread_rng();
        let mut times: std::vec::Vec<f32> = (0..500).map(|_| rng.gen_range(0.0..1e-2)).collect();
        times.sort_by(f32::total_cmp);

        let caps = times
            .iter()
            .map(|&t| compute_capacitance(t, 100e3, K).as_farads())
            .collect::<std::vec::Vec<_>>();

        assert!(caps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn sample_from_ticks() {
        let calibration = Calibration {
            sensitivity_pf_per_mm: 15.7,
            ..Calibration::DEFAULT
        };
        // 66.7 pF through 100 kOhm crosses after 4.62 us, 333 ticks at 72 MHz
        let sample = Sample::from_ticks(Ticks(333), 72.MHz(), &calibration);

        assert_eq!(sample.elapsed_micros(), 5);
        assert!(close(sample.capacitance.as_picofarads(), 66.7, 1e-2));
        assert!(close(sample.height_mm, 1.0, 5e-2), "{sample:?}");
        assert_eq!(sample.status(&calibration), Status::Nominal);
    }

    #[test]
    fn out_of_range_classification() {
        let calibration = Calibration::DEFAULT;
        let sample = |height_mm| Sample {
            ticks: Ticks::ZERO,
            elapsed_secs: 0.0,
            capacitance: Capacitance(0.0),
            height_mm,
        };

        assert_eq!(Reading::new(sample(-0.1), &calibration).status, Status::OutOfRange);
        assert_eq!(Reading::new(sample(0.0), &calibration).status, Status::Nominal);
        assert_eq!(Reading::new(sample(250.0), &calibration).status, Status::Nominal);
        assert_eq!(Reading::new(sample(250.1), &calibration).status, Status::OutOfRange);
        assert_eq!(Reading::new(sample(f32::NAN), &calibration).status, Status::OutOfRange);

        // classification never touches the value
        assert_eq!(Reading::new(sample(-3.5), &calibration).sample.height_mm, -3.5);
    }
}
