//! Sense node and time reference for the polling variant

use fugit::HertzU32;
use levelcap_core::{ChargeClock, SenseNode, Ticks};
use stm32f7xx_hal::{
    gpio::{DynamicPin, Pin, PinState},
    pac,
    rcc::{self, Clocks, Enable, Reset},
};

/// The node was read while it was not configured as an input
#[derive(Copy, Clone, Debug, defmt::Format)]
pub struct WrongMode;

/// Sense pin that flips between push-pull low and floating input at runtime
pub struct DynamicNode {
    pin: DynamicPin<'A', 5>,
}

impl DynamicNode {
    pub fn new(pin: Pin<'A', 5>) -> Self {
        let mut pin = pin.into_dynamic();
        pin.make_push_pull_output_in_state(PinState::Low);
        Self { pin }
    }
}

impl SenseNode for DynamicNode {
    type Error = WrongMode;

    fn drive_low(&mut self) -> Result<(), Self::Error> {
        self.pin.make_push_pull_output_in_state(PinState::Low);
        Ok(())
    }

    fn release(&mut self) -> Result<(), Self::Error> {
        self.pin.make_floating_input();
        Ok(())
    }

    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.pin.is_high().map_err(|_| WrongMode)
    }
}

/// TIM2 counting up at the full timer clock, never stopped
pub struct FreeRunningTimer {
    tim2: pac::TIM2,
    rate: HertzU32,
}

impl FreeRunningTimer {
    pub fn init(tim2: pac::TIM2, apb1: &mut rcc::APB1, clocks: &Clocks) -> Self {
        <pac::TIM2 as Enable>::enable(apb1);
        <pac::TIM2 as Reset>::reset(apb1);

        // No prescaler, wrap at u32::MAX
        tim2.psc.write(|w| unsafe { w.bits(0) });
        tim2.arr.write(|w| w.arr().bits(u32::MAX));
        // Load the prescaler
        tim2.egr.write(|w| w.ug().set_bit());

        tim2.cr1.modify(|_, w| w.cen().enabled());

        Self {
            tim2,
            rate: clocks.timclk1(),
        }
    }
}

impl ChargeClock for FreeRunningTimer {
    fn rate(&self) -> HertzU32 {
        self.rate
    }

    fn now(&mut self) -> Ticks {
        Ticks(self.tim2.cnt.read().bits())
    }
}
