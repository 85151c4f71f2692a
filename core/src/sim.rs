//! A software RC circuit to run the measurement cycle against without hardware
//!
//! The node and the clock share one virtual timeline. Every clock read advances
//! it by a single tick, which stands in for the cost of one polling iteration.

use std::{cell::RefCell, convert::Infallible, rc::Rc};

use fugit::HertzU32;

use crate::{
    config::Calibration,
    cycle::{ChargeClock, NodeMode, SenseNode},
    units::{Capacitance, Ticks},
};

struct State {
    now: u64,
    rate: HertzU32,
    resistance_ohms: f32,
    threshold_factor: f32,
    /// `None` models an open sensor lead: the node never charges past the threshold
    capacitance: Option<Capacitance>,
    mode: NodeMode,
    released_at: u64,
}

impl State {
    fn crossed_threshold(&self) -> bool {
        let Some(capacitance) = self.capacitance else {
            return false;
        };

        let charged_for = (self.now - self.released_at) as f64 / self.rate.to_Hz() as f64;
        let crossing =
            self.threshold_factor as f64 * self.resistance_ohms as f64 * capacitance.0 as f64;

        charged_for >= crossing
    }
}

#[derive(Clone)]
pub struct RcCircuit {
    state: Rc<RefCell<State>>,
}

impl RcCircuit {
    pub fn new(rate: HertzU32, calibration: &Calibration, capacitance: Capacitance) -> Self {
        Self::with_capacitance(rate, calibration, Some(capacitance))
    }

    pub fn disconnected(rate: HertzU32, calibration: &Calibration) -> Self {
        Self::with_capacitance(rate, calibration, None)
    }

    fn with_capacitance(
        rate: HertzU32,
        calibration: &Calibration,
        capacitance: Option<Capacitance>,
    ) -> Self {
        Self {
            state: Rc::new(RefCell::new(State {
                now: 0,
                rate,
                resistance_ohms: calibration.resistance_ohms,
                threshold_factor: calibration.threshold_factor,
                capacitance,
                mode: NodeMode::DrivenLow,
                released_at: 0,
            })),
        }
    }

    /// Hand out the node and the clock, both wired to this circuit
    pub fn split(&self) -> (SimNode, SimClock) {
        (
            SimNode {
                state: self.state.clone(),
            },
            SimClock {
                state: self.state.clone(),
            },
        )
    }

    pub fn set_capacitance(&self, capacitance: Option<Capacitance>) {
        self.state.borrow_mut().capacitance = capacitance;
    }

    pub fn mode(&self) -> NodeMode {
        self.state.borrow().mode
    }

    pub fn now(&self) -> Ticks {
        Ticks(self.state.borrow().now as u32)
    }
}

pub struct SimNode {
    state: Rc<RefCell<State>>,
}

impl SenseNode for SimNode {
    type Error = Infallible;

    fn drive_low(&mut self) -> Result<(), Self::Error> {
        self.state.borrow_mut().mode = NodeMode::DrivenLow;
        Ok(())
    }

    fn release(&mut self) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        if state.mode != NodeMode::Released {
            state.mode = NodeMode::Released;
            state.released_at = state.now;
        }
        Ok(())
    }

    fn is_high(&mut self) -> Result<bool, Self::Error> {
        let state = self.state.borrow();
        Ok(state.mode == NodeMode::Released && state.crossed_threshold())
    }
}

pub struct SimClock {
    state: Rc<RefCell<State>>,
}

impl ChargeClock for SimClock {
    fn rate(&self) -> HertzU32 {
        self.state.borrow().rate
    }

    fn now(&mut self) -> Ticks {
        let mut state = self.state.borrow_mut();
        state.now += 1;
        Ticks(state.now as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fugit::RateExtU32;

    #[test]
    fn node_goes_high_after_one_threshold_time() {
        // 0.693 * 100k * 100p = 6.93 us, 7 ticks at 1 MHz
        let circuit = RcCircuit::new(1.MHz(), &Calibration::DEFAULT, Capacitance::from_picofarads(100.0));
        let (mut node, mut clock) = circuit.split();

        node.release().unwrap();
        let mut ticks = 0;
        while !node.is_high().unwrap() {
            clock.now();
            ticks += 1;
        }

        assert_eq!(ticks, 7);
    }

    #[test]
    fn driven_low_node_never_reads_high() {
        let circuit = RcCircuit::new(1.MHz(), &Calibration::DEFAULT, Capacitance::from_picofarads(1.0));
        let (mut node, mut clock) = circuit.split();

        for _ in 0..100 {
            clock.now();
        }

        assert!(!node.is_high().unwrap());
        assert_eq!(circuit.mode(), NodeMode::DrivenLow);
    }

    #[test]
    fn disconnected_node_stays_low() {
        let circuit = RcCircuit::disconnected(1.MHz(), &Calibration::DEFAULT);
        let (mut node, mut clock) = circuit.split();

        node.release().unwrap();
        for _ in 0..100_000 {
            clock.now();
        }

        assert!(!node.is_high().unwrap());
    }
}
