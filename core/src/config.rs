use core::fmt;

use fugit::{MicrosDurationU32, MillisDurationU32};

use crate::units::Capacitance;

/// Electrical and mechanical constants of one sensor unit
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(default)]
pub struct Calibration {
    /// Charging resistor in ohms
    pub resistance_ohms: f32,
    /// Capacitance of the empty tube in picofarads
    pub offset_pf: f32,
    /// Capacitance gained per millimetre of liquid, in picofarads
    pub sensitivity_pf_per_mm: f32,
    /// `ln(1 / (1 - v_threshold / v_supply))`, 0.693 when the threshold sits at half supply
    pub threshold_factor: f32,
    /// Heights outside `0..=tube_length_mm` are flagged as out of range
    pub tube_length_mm: f32,
}

impl Calibration {
    pub const DEFAULT: Self = Self {
        resistance_ohms: 100e3,
        offset_pf: 51.0,
        sensitivity_pf_per_mm: 0.0157,
        threshold_factor: 0.693,
        tube_length_mm: 250.0,
    };

    pub fn offset(&self) -> Capacitance {
        Capacitance::from_picofarads(self.offset_pf)
    }

    pub fn sensitivity_per_mm(&self) -> Capacitance {
        Capacitance::from_picofarads(self.sensitivity_pf_per_mm)
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Timing of the measurement loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(default)]
pub struct CycleSettings {
    /// How long the node is held low before a charge, at least 5 RC time constants
    pub discharge_hold_us: u32,
    /// Upper bound on the wait for the threshold crossing
    pub threshold_timeout_us: u32,
    /// Pause between two reports
    pub report_interval_ms: u32,
}

impl CycleSettings {
    pub const DEFAULT: Self = Self {
        discharge_hold_us: 2_000,
        threshold_timeout_us: 20_000,
        report_interval_ms: 1_000,
    };

    pub fn discharge_hold(&self) -> MicrosDurationU32 {
        MicrosDurationU32::micros(self.discharge_hold_us)
    }

    pub fn report_interval(&self) -> MillisDurationU32 {
        MillisDurationU32::millis(self.report_interval_ms)
    }
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(default)]
pub struct Config {
    pub calibration: Calibration,
    pub cycle: CycleSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    NonPositiveResistance,
    NonPositiveSensitivity,
    NonPositiveThresholdFactor,
    ZeroTimeout,
    /// The clock driving the cycle reports a rate of 0 Hz
    ZeroClockRate,
    /// The discharge hold is more than half a counter period
    HoldTooLong,
    /// The threshold timeout is more than half a counter period
    TimeoutTooLong,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NonPositiveResistance => f.write_str("resistance must be positive"),
            ConfigError::NonPositiveSensitivity => f.write_str("sensitivity must be positive"),
            ConfigError::NonPositiveThresholdFactor => {
                f.write_str("threshold factor must be positive")
            }
            ConfigError::ZeroTimeout => f.write_str("threshold timeout must not be zero"),
            ConfigError::ZeroClockRate => f.write_str("clock rate must not be zero"),
            ConfigError::HoldTooLong => {
                f.write_str("discharge hold does not fit in half the counter range")
            }
            ConfigError::TimeoutTooLong => {
                f.write_str("threshold timeout does not fit in half the counter range")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

impl Config {
    pub const DEFAULT: Self = Self {
        calibration: Calibration::DEFAULT,
        cycle: CycleSettings::DEFAULT,
    };

    pub fn validate(&self) -> Result<(), ConfigError> {
        // `!(x > 0.0)` so NaN is rejected too
        if !(self.calibration.resistance_ohms > 0.0) {
            return Err(ConfigError::NonPositiveResistance);
        }
        if !(self.calibration.sensitivity_pf_per_mm > 0.0) {
            return Err(ConfigError::NonPositiveSensitivity);
        }
        if !(self.calibration.threshold_factor > 0.0) {
            return Err(ConfigError::NonPositiveThresholdFactor);
        }
        if self.cycle.threshold_timeout_us == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

#[cfg(feature = "config")]
mod load {
    use std::{
        error::Error,
        path::{Path, PathBuf},
    };

    use super::Config;

    pub const CONFIG_FILE_NAME: &str = "levelcap.toml";

    impl Config {
        /// Load the config from `path`, or from the first `levelcap.toml` found in the
        /// current directory or one of its ancestors
        pub fn load(path: Option<&Path>) -> Result<Self, Box<dyn Error>> {
            match path {
                Some(p) => Self::load_first(vec![p.into()]),
                None => Self::find_from(&std::env::current_dir()?),
            }
        }

        /// Load the first `levelcap.toml` found in `dir` or one of its ancestors
        pub fn find_from(dir: &Path) -> Result<Self, Box<dyn Error>> {
            let paths = dir
                .ancestors()
                .map(|path| path.join(CONFIG_FILE_NAME))
                .collect();

            Self::load_first(paths)
        }

        fn load_first(paths: Vec<PathBuf>) -> Result<Self, Box<dyn Error>> {
            let mut last_error = None;

            for path in paths {
                match std::fs::read_to_string(path) {
                    Ok(config_string) => return Ok(Self::from_toml(&config_string)?),
                    Err(e) => last_error = Some(e),
                }
            }

            match last_error {
                Some(e) => Err(e.into()),
                None => Err("no config file found".into()),
            }
        }

        pub fn from_toml(config_string: &str) -> Result<Self, Box<dyn Error>> {
            let config: Config = toml::from_str(config_string)?;
            config.validate()?;
            Ok(config)
        }
    }
}

#[cfg(feature = "config")]
pub use load::CONFIG_FILE_NAME;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(Config::default(), Config::DEFAULT);
        assert_eq!(Config::DEFAULT.validate(), Ok(()));
        assert_eq!(CycleSettings::DEFAULT.discharge_hold().to_micros(), 2_000);
        assert_eq!(CycleSettings::DEFAULT.report_interval().to_millis(), 1_000);
    }

    #[test]
    fn rejects_bad_calibration() {
        let mut config = Config::DEFAULT;
        config.calibration.resistance_ohms = 0.0;
        assert_eq!(config.validate(), Err(ConfigError::NonPositiveResistance));

        let mut config = Config::DEFAULT;
        config.calibration.sensitivity_pf_per_mm = f32::NAN;
        assert_eq!(config.validate(), Err(ConfigError::NonPositiveSensitivity));

        let mut config = Config::DEFAULT;
        config.calibration.threshold_factor = -0.693;
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonPositiveThresholdFactor)
        );

        let mut config = Config::DEFAULT;
        config.cycle.threshold_timeout_us = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeout));
    }

    #[test]
    #[cfg(feature = "config")]
    fn partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [calibration]
            offset_pf = 48.5
            sensitivity_pf_per_mm = 15.7

            [cycle]
            threshold_timeout_us = 5000
            "#,
        )
        .unwrap();

        assert_eq!(config.calibration.offset_pf, 48.5);
        assert_eq!(config.calibration.sensitivity_pf_per_mm, 15.7);
        assert_eq!(config.calibration.resistance_ohms, 100e3);
        assert_eq!(config.cycle.threshold_timeout_us, 5_000);
        assert_eq!(config.cycle.discharge_hold_us, 2_000);
    }

    #[test]
    #[cfg(feature = "config")]
    fn invalid_toml_is_rejected() {
        assert!(Config::from_toml("[calibration]\nresistance_ohms = -1.0\n").is_err());
        assert!(Config::from_toml("[calibration]\nresistance_ohms = \"lots\"\n").is_err());
    }

    #[test]
    #[cfg(feature = "config")]
    fn finds_the_nearest_config_up_the_tree() {
        let root = std::env::temp_dir().join(format!("levelcap-find-{}", std::process::id()));
        let nested = root.join("site").join("tank");
        std::fs::create_dir_all(&nested).unwrap();

        std::fs::write(
            root.join(CONFIG_FILE_NAME),
            "[calibration]\noffset_pf = 42.0\n",
        )
        .unwrap();
        let from_root = Config::find_from(&nested).unwrap();

        std::fs::write(
            root.join("site").join(CONFIG_FILE_NAME),
            "[calibration]\noffset_pf = 47.5\n",
        )
        .unwrap();
        let from_site = Config::find_from(&nested).unwrap();

        std::fs::remove_dir_all(&root).unwrap();

        assert_eq!(from_root.calibration.offset_pf, 42.0);
        assert_eq!(from_root.cycle, CycleSettings::DEFAULT);
        assert_eq!(from_site.calibration.offset_pf, 47.5);
    }

    #[test]
    #[cfg(feature = "config")]
    fn missing_file_is_an_error() {
        let path = std::path::Path::new("/definitely/not/here/levelcap.toml");
        assert!(Config::load(Some(path)).is_err());
    }
}
