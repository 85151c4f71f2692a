use fugit::RateExtU32;
use stm32f7xx_hal::{
    gpio::{Alternate, Output, Pin},
    pac::{self, USART3},
    prelude::*,
    rcc::{self, Clocks},
    serial::Serial,
};

use crate::report::Console;

pub type ConsoleSerial = Serial<USART3, (Pin<'D', 8, Alternate<7>>, Pin<'D', 9, Alternate<7>>)>;

/// Everything the measurement loop needs from a Nucleo-F767ZI
pub struct Board {
    pub clocks: Clocks,
    pub apb1: rcc::APB1,
    /// LD2, blinks as a heartbeat
    pub led: Pin<'B', 7, Output>,
    /// Sense node: pull-up resistor and sensor plate, TIM2_CH1 on AF1
    pub sense: Pin<'A', 5>,
    pub tim2: pac::TIM2,
    /// USART3 on the ST-LINK virtual COM port
    pub console: Console,
}

pub fn setup_board(p: pac::Peripherals) -> Board {
    defmt::info!("Constraining RCC");
    let rcc = p.RCC.constrain();

    let clocks = rcc.cfgr.sysclk(216.MHz()).hclk(216.MHz()).freeze();
    defmt::info!(
        "Clocks setup: sysclk={} Hz, timclk1={} Hz",
        clocks.sysclk().to_Hz(),
        clocks.timclk1().to_Hz()
    );

    let gpioa = p.GPIOA.split();
    let gpiob = p.GPIOB.split();
    let gpiod = p.GPIOD.split();

    let led = gpiob.pb7.into_push_pull_output();

    let serial = Serial::new(
        p.USART3,
        (gpiod.pd8.into_alternate(), gpiod.pd9.into_alternate()),
        &clocks,
        Default::default(),
    );
    defmt::info!("UART ready");

    defmt::info!("Board setup done!");

    Board {
        clocks,
        apb1: rcc.apb1,
        led,
        sense: gpioa.pa5,
        tim2: p.TIM2,
        console: Console::new(serial),
    }
}
