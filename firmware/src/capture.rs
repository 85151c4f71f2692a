use fugit::HertzU32;
use levelcap_core::Ticks;
use stm32f7xx_hal::{
    gpio::{Alternate, Output, Pin, PinState},
    pac,
    rcc::{self, Clocks, Enable, Reset},
};

enum NodePin {
    DrivenLow(Pin<'A', 5, Output>),
    Capturing(Pin<'A', 5, Alternate<1>>),
}

/// TIM2 channel 1 input capture on the sense node
///
/// Between charges PA5 is a push-pull output held low. Arming hands the pin to
/// TIM2_CH1, which latches the counter on the rising edge of the node and raises
/// the TIM2 interrupt.
pub struct ChargeCapture {
    tim2: pac::TIM2,
    // Only `None` for the duration of a mode switch
    pin: Option<NodePin>,
    rate: HertzU32,
}

impl ChargeCapture {
    pub fn init(
        tim2: pac::TIM2,
        pin: Pin<'A', 5>,
        apb1: &mut rcc::APB1,
        clocks: &Clocks,
    ) -> Self {
        let this = Self {
            tim2,
            pin: Some(NodePin::DrivenLow(
                pin.into_push_pull_output_in_state(PinState::Low),
            )),
            rate: clocks.timclk1(),
        };

        this.init_tim2(apb1);

        this
    }

    /// Setup TIM2 to count at the timer clock and capture on TI1 rising edges
    fn init_tim2(&self, apb1: &mut rcc::APB1) {
        let tim2 = &self.tim2;
        <pac::TIM2 as Enable>::enable(apb1);
        <pac::TIM2 as Reset>::reset(apb1);

        // Full timer clock, ARR resets to u32::MAX
        tim2.psc.write(|w| unsafe { w.bits(0) });
        tim2.arr.write(|w| w.arr().bits(u32::MAX));
        tim2.egr.write(|w| w.ug().set_bit());

        // Configures TIM2 CC1 to capture the timer value on TI1
        tim2.ccmr1_input()
            .modify(|_, w| unsafe { w.cc1s().ti1().ic1f().no_filter().ic1psc().bits(0b00) });

        // Rising edge only
        tim2.ccer
            .modify(|_, w| w.cc1p().clear_bit().cc1np().clear_bit());
    }

    pub fn rate(&self) -> HertzU32 {
        self.rate
    }

    /// Drive the node low. Repeating it is harmless.
    pub fn discharge(&mut self) {
        self.pin = self.pin.take().map(|pin| match pin {
            NodePin::DrivenLow(mut pin) => {
                pin.set_low();
                NodePin::DrivenLow(pin)
            }
            NodePin::Capturing(pin) => {
                NodePin::DrivenLow(pin.into_push_pull_output_in_state(PinState::Low))
            }
        });
    }

    /// Restart the counter from zero and release the node to the capture unit
    pub fn arm(&mut self) {
        let tim2 = &self.tim2;

        tim2.cr1.modify(|_, w| w.cen().disabled());
        tim2.cnt.write(|w| unsafe { w.bits(0) });

        // Forget any edge seen while disarmed
        tim2.sr
            .modify(|_, w| w.cc1if().clear_bit().cc1of().clear_bit());

        tim2.ccer.modify(|_, w| w.cc1e().set_bit());
        tim2.dier.modify(|_, w| w.cc1ie().enabled());

        self.pin = self.pin.take().map(|pin| match pin {
            NodePin::DrivenLow(pin) => NodePin::Capturing(pin.into_alternate()),
            capturing => capturing,
        });

        tim2.cr1.modify(|_, w| w.cen().enabled());
    }

    /// Stop capturing and counting. The pin is left alone, call [`Self::discharge`] after.
    pub fn disarm(&mut self) {
        let tim2 = &self.tim2;

        tim2.dier.modify(|_, w| w.cc1ie().disabled());
        tim2.ccer.modify(|_, w| w.cc1e().clear_bit());
        tim2.cr1.modify(|_, w| w.cen().disabled());
    }

    /// Handle the TIM2 interrupt, returning the latched charge time if CC1 fired
    ///
    /// Capture is disarmed before returning a value, so one charge never yields two.
    pub fn on_interrupt(&mut self) -> Option<Ticks> {
        let tim2 = &self.tim2;
        let sr = tim2.sr.read();
        tim2.sr.write(|w| unsafe { w.bits(!sr.bits()) });

        if sr.cc1if().bit_is_clear() {
            return None;
        }

        let ticks = Ticks(tim2.ccr1.read().ccr().bits());
        self.disarm();

        Some(ticks)
    }
}
