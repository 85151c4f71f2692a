use std::{thread, time::Duration};

use fugit::RateExtU32;
use levelcap_core::{
    config::CONFIG_FILE_NAME, sim::RcCircuit, status_line, Capacitance, Config,
    MeasurementCycle, Outcome,
};
use rand::thread_rng;
use rand_distr::{Distribution, Normal};

/// Stray capacitance picked up by the leads on every charge, in picofarads
const NOISE_PF: f32 = 0.05;

fn main() {
    pretty_env_logger::init();

    let config = match Config::load(None) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("No usable {CONFIG_FILE_NAME}: {e}. Using built-in calibration");
            Config::default()
        }
    };
    log::info!("{config:#?}");

    let calibration = config.calibration;
    // Same counter rate as TIM2 on the board
    let circuit = RcCircuit::disconnected(108.MHz(), &calibration);
    let (node, clock) = circuit.split();

    let mut cycle = match MeasurementCycle::new(node, clock, config) {
        Ok(cycle) => cycle,
        Err(e) => {
            log::error!("Invalid config: {e}");
            std::process::exit(1);
        }
    };

    let noise = Normal::new(0.0, NOISE_PF).unwrap();
    let rng = &mut thread_rng();

    // Fill the tube in ten steps, then overfill it and run it dry
    let step = calibration.tube_length_mm / 10.0;
    let levels = (0..=10)
        .map(|i| i as f32 * step)
        .chain([calibration.tube_length_mm * 1.2, -step]);

    for level_mm in levels {
        let picofarads = calibration.offset_pf
            + level_mm * calibration.sensitivity_pf_per_mm
            + noise.sample(rng);
        circuit.set_capacitance(Some(Capacitance::from_picofarads(picofarads.max(0.0))));

        log::debug!("Simulating {level_mm:.1} mm ({picofarads:.2} pF)");
        let _ = cycle.run_once(|outcome| log_outcome(outcome));

        thread::sleep(Duration::from_millis(u64::from(config.cycle.report_interval_ms / 10)));
    }

    log::info!("Disconnecting the sensor lead");
    circuit.set_capacitance(None);
    let _ = cycle.run_once(|outcome| log_outcome(outcome));
}

fn log_outcome<E: std::fmt::Debug>(outcome: &Outcome<E>) {
    let line = status_line(outcome);
    match outcome {
        Ok(reading) if reading.is_nominal() => log::info!("{line}"),
        Ok(_) => log::warn!("{line}"),
        Err(_) => log::error!("{line}"),
    }
}
