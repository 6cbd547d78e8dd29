//! The cooperative control loop.
//!
//! One `service` call is one loop iteration: sync the requested sample rate
//! to the source, drain at most one pending conversion into the estimator,
//! then tick the controller — in that order, so stop decisions always act on
//! same-iteration-fresh estimates. Nothing blocks; the caller invokes
//! `service` at its own cadence with a monotonic millisecond timestamp.

use gravidose_traits::{Actuator, PersistentStore, SampleSource, UserInput};

use crate::controller::DosingController;
use crate::gate::DrdyGate;

pub struct ControlLoop<S> {
    source: S,
    applied_period_ms: u16,
}

impl<S: SampleSource> ControlLoop<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            applied_period_ms: 0, // forces a sync on the first iteration
        }
    }

    /// One iteration. Returns true when a sample was consumed.
    pub fn service<A, P, U>(
        &mut self,
        gate: &DrdyGate,
        ctl: &mut DosingController<A, P, U>,
        now_ms: u32,
    ) -> bool
    where
        A: Actuator,
        P: PersistentStore,
        U: UserInput,
    {
        // Propagate the controller's requested decimation to the converter.
        let want = ctl.estimator().sample_period_ms();
        if want != self.applied_period_ms {
            self.source.set_sample_period_ms(want);
            self.applied_period_ms = want;
        }

        // At most one pending sample per iteration; coalesced edges were
        // already decimated by the gate.
        let mut consumed = false;
        if let Some(t_ms) = gate.take()
            && self.source.is_ready()
        {
            let counts = self.source.read();
            consumed = ctl.ingest_sample(counts, t_ms);
        }

        ctl.tick(now_ms);
        consumed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ControllerBuilder;
    use crate::mocks::{BenchSource, MemoryStore, RecordingActuator, ScriptedInput};
    use crate::status::ControllerState;

    fn rig() -> (
        ControlLoop<BenchSource>,
        BenchSource,
        DosingController<RecordingActuator, MemoryStore, ScriptedInput>,
        ScriptedInput,
    ) {
        let source = BenchSource::new(true);
        let input = ScriptedInput::new();
        let ctl = ControllerBuilder::new()
            .with_actuator(RecordingActuator::new())
            .with_store(MemoryStore::new())
            .with_input(input.clone())
            .with_fast_capable(true)
            .build(0)
            .unwrap();
        (ControlLoop::new(source.clone()), source, ctl, input)
    }

    #[test]
    fn sample_flows_from_gate_to_estimator() {
        let (mut cl, source, mut ctl, _input) = rig();
        let gate = DrdyGate::new();
        source.latch(1234);
        gate.notify(0);
        assert!(cl.service(&gate, &mut ctl, 0));
        // without a new edge, no further sample is consumed
        assert!(!cl.service(&gate, &mut ctl, 10));
    }

    #[test]
    fn requested_rate_reaches_the_source() {
        let (mut cl, source, mut ctl, input) = rig();
        let gate = DrdyGate::new();
        cl.service(&gate, &mut ctl, 0);
        assert_eq!(source.period_ms(), 100);
        input.press_start();
        cl.service(&gate, &mut ctl, 10);
        assert_eq!(ctl.state(), ControllerState::Measuring);
        cl.service(&gate, &mut ctl, 20);
        assert_eq!(source.period_ms(), 12); // fast rate while measuring
    }

    #[test]
    fn edge_without_ready_source_is_dropped() {
        let (mut cl, _source, mut ctl, _input) = rig();
        let gate = DrdyGate::new();
        gate.notify(5);
        assert!(!cl.service(&gate, &mut ctl, 5));
        assert_eq!(gate.take(), None); // edge was consumed, not left pending
    }
}
