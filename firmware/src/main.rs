#![no_main]
#![no_std]
#![feature(type_alias_impl_trait)]

use core::convert::Infallible;

use defmt_rtt as _;
use panic_probe as _;
use rtic::{app, Mutex};
use rtic_monotonics::{
    systick::{ExtU64, Systick},
    Monotonic,
};
use rtic_sync::{
    channel::{Receiver, Sender},
    make_channel,
};
use stm32f7xx_hal::gpio::{Output, Pin};

use levelcap_core::{CycleError, Outcome, Reading, Sample, Ticks};
use levelcap_firmware::{
    board::{setup_board, Board},
    capture::ChargeCapture,
    config::CAPTURE as CONFIG,
    report::{self, Console},
};

defmt::timestamp!("{=u64:ms}", {
    Systick::now().duration_since_epoch().to_millis()
});

/// Round a microsecond setting up to whole systick periods, at least one
fn systick_millis(micros: u32) -> u64 {
    u64::from(micros.div_ceil(1_000).max(1))
}

#[app(device = stm32f7xx_hal::pac, dispatchers = [CAN1_RX0])]
mod app {
    use super::*;

    #[shared]
    struct Shared {
        capture: ChargeCapture,
    }

    #[local]
    struct Local {
        capture_sender: Sender<'static, Ticks, 1>,
    }

    #[init]
    fn init(cx: init::Context) -> (Shared, Local) {
        defmt::println!("levelcap starting");
        defmt::info!("Config: {}", CONFIG);
        defmt::unwrap!(CONFIG.validate());

        let Board {
            clocks,
            mut apb1,
            led,
            sense,
            tim2,
            console,
        } = setup_board(cx.device);

        // Setup systick to be used for delays
        let systick_token = rtic_monotonics::create_systick_token!();
        Systick::start(cx.core.SYST, clocks.sysclk().to_Hz(), systick_token);

        let capture = ChargeCapture::init(tim2, sense, &mut apb1, &clocks);
        defmt::info!("TIM2 capture at {} Hz", capture.rate().to_Hz());

        // Single slot hand-off from the capture interrupt to the measuring task
        let (capture_sender, capture_receiver) = make_channel!(Ticks, 1);

        // Start tasks
        {
            measure::spawn(console, capture_receiver)
                .unwrap_or_else(|_| defmt::panic!("Failed to start measure"));

            heartbeat::spawn(led).unwrap_or_else(|_| defmt::panic!("Failed to start heartbeat"));
        }

        (Shared { capture }, Local { capture_sender })
    }

    /// Runs the measurement cycle forever
    ///
    /// Discharge, arm the capture, wait a bounded time for the interrupt to hand
    /// over the charge time, then compute and report. The node is driven low again
    /// whether or not the capture fired.
    #[task(shared = [capture], priority = 1)]
    async fn measure(
        mut cx: measure::Context,
        mut console: Console,
        mut captures: Receiver<'static, Ticks, 1>,
    ) {
        let calibration = &CONFIG.calibration;
        let hold_ms = systick_millis(CONFIG.cycle.discharge_hold_us);
        let timeout_ms = systick_millis(CONFIG.cycle.threshold_timeout_us);
        let interval_ms = u64::from(CONFIG.cycle.report_interval_ms);

        loop {
            cx.shared.capture.lock(|capture| capture.discharge());
            Systick::delay(hold_ms.millis()).await;

            // A capture that fired just as the previous wait timed out is stale now
            while captures.try_recv().is_ok() {}

            let rate = cx.shared.capture.lock(|capture| {
                capture.arm();
                capture.rate()
            });

            let outcome: Outcome<Infallible> =
                match Systick::timeout_after(timeout_ms.millis(), captures.recv()).await {
                    Ok(Ok(ticks)) => {
                        let sample = Sample::from_ticks(ticks, rate, calibration);
                        Ok(Reading::new(sample, calibration))
                    }
                    Ok(Err(_)) => defmt::panic!("Capture channel closed"),
                    Err(_) => Err(CycleError::ThresholdTimeout {
                        waited_us: CONFIG.cycle.threshold_timeout_us,
                    }),
                };

            cx.shared.capture.lock(|capture| {
                capture.disarm();
                capture.discharge();
            });

            report::emit(&mut console, &outcome);

            Systick::delay(interval_ms.millis()).await;
        }
    }

    /// Latch the charge time and pass it on
    #[task(binds = TIM2, shared = [capture], local = [capture_sender], priority = 2)]
    fn on_tim2_capture(mut cx: on_tim2_capture::Context) {
        let Some(ticks) = cx.shared.capture.lock(|capture| capture.on_interrupt()) else {
            return;
        };

        if cx.local.capture_sender.try_send(ticks).is_err() {
            defmt::warn!("Dropped capture of {} ticks", ticks);
        }
    }

    /// Blinks LD2 so a hung board is easy to spot
    #[task(priority = 0)]
    async fn heartbeat(_cx: heartbeat::Context, mut led: Pin<'B', 7, Output>) {
        loop {
            Systick::delay(500u64.millis()).await;
            led.set_high();
            Systick::delay(500u64.millis()).await;
            led.set_low();
        }
    }
}
