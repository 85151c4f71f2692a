//! Busy-wait variant of the measurement loop
//!
//! Same cycle as the `main` binary, but the threshold crossing is found by
//! sampling the sense pin in a loop instead of with the capture unit.

#![no_std]
#![no_main]

use defmt_rtt as _;
use panic_probe as _;
use stm32f7xx_hal::{pac, prelude::*};

use levelcap_core::MeasurementCycle;
use levelcap_firmware::{
    board::{setup_board, Board},
    config::POLLING as CONFIG,
    report,
    sense::{DynamicNode, FreeRunningTimer},
};

#[cortex_m_rt::entry]
fn main() -> ! {
    let p = defmt::unwrap!(pac::Peripherals::take());
    let cp = defmt::unwrap!(pac::CorePeripherals::take());

    let Board {
        clocks,
        mut apb1,
        mut led,
        sense,
        tim2,
        mut console,
    } = setup_board(p);

    let mut delay = cp.SYST.delay(&clocks);

    let node = DynamicNode::new(sense);
    let clock = FreeRunningTimer::init(tim2, &mut apb1, &clocks);

    defmt::info!("Config: {}", CONFIG);
    let mut cycle = defmt::unwrap!(MeasurementCycle::new(node, clock, CONFIG));

    loop {
        let _ = cycle.run_once(|outcome| report::emit(&mut console, outcome));

        led.toggle();
        delay.delay(CONFIG.cycle.report_interval().convert());
    }
}
