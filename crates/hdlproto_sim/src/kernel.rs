//! The simulation scheduler.
//!
//! [`Simulator`] owns a built design and runs it step by step. A step is one
//! change of an externally driven signal (half a clock period, a stimulus
//! write, or a reset). Within a step the kernel alternates between
//! combinational stabilization and edge-triggered register commits until no
//! sequential block fires any more.
//!
//! Stabilization is a Jacobi iteration: every combinational block runs once
//! per pass against the values committed at the start of the pass, and the
//! staged wire writes are committed together at the end. A pass that changes
//! nothing ends the settle; `max_comb_loops` passes that all changed
//! something are a [`SimError::ConvergenceFailure`].

use std::collections::HashSet;
use std::fs::File;
use std::io::BufWriter;
use std::rc::Rc;

use hdlproto_common::{bits, BlockId, ModuleId, SignalId};
use serde::Serialize;
use tracing::{debug, error, instrument, trace};

use crate::config::SimConfig;
use crate::design::Design;
use crate::error::{AccessRule, SimError};
use crate::hierarchy::Hierarchy;
use crate::registry::{BlockRegistry, STIMULUS};
use crate::signal::{SignalGraph, SignalKind};
use crate::testcase::{TestcaseOutcome, TestcaseRegistry};
use crate::waveform::{VcdRecorder, WaveformRecorder};

/// Scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SimState {
    /// Between steps; all values settled.
    Idle,
    /// Running stabilization passes.
    CombSettling,
    /// Running fired sequential blocks and committing registers.
    EdgeCommit,
    /// Halted by a fatal error; only reads are allowed.
    Error,
}

/// Counters accumulated over the simulator's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SimStats {
    /// Steps executed (half clocks, stimulus writes, resets).
    pub steps: u64,
    /// Stabilization passes executed, including quiet ones.
    pub comb_passes: u64,
    /// Passes that changed something in the most recent settle.
    pub last_settle_passes: u32,
    /// Sequential block activations.
    pub blocks_fired: u64,
    /// Registers whose value changed at a commit.
    pub register_commits: u64,
}

/// A built design ready to simulate.
pub struct Simulator {
    graph: SignalGraph,
    hierarchy: Hierarchy,
    registry: BlockRegistry,
    config: SimConfig,
    state: SimState,
    halted: Option<String>,
    stats: SimStats,
    time: u64,
    recorder: Option<Box<dyn WaveformRecorder>>,
    dumped: Vec<u64>,
    testcases: TestcaseRegistry,
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("state", &self.state)
            .field("stats", &self.stats)
            .field("time", &self.time)
            .field("signals", &self.graph.len())
            .field("blocks", &self.registry.len())
            .field("testcases", &self.testcases)
            .finish()
    }
}

impl Simulator {
    /// Validates the design and configuration, then settles the initial state.
    ///
    /// Static driver conflicts, bad declared write-sets, an invalid clock
    /// binding, and a non-converging initial network are all reported here.
    pub fn new(design: Design, config: SimConfig) -> Result<Self, SimError> {
        let Design {
            graph,
            hierarchy,
            mut registry,
        } = design;
        if config.max_comb_loops == 0 {
            return Err(SimError::config("max_comb_loops must be positive"));
        }
        registry.validate(&graph, &hierarchy)?;
        if let Some(clock) = config.clock {
            Self::check_clock(&graph, &registry, clock)?;
        }

        let mut sim = Self {
            graph,
            hierarchy,
            registry,
            config,
            state: SimState::Idle,
            halted: None,
            stats: SimStats::default(),
            time: 0,
            recorder: None,
            dumped: Vec::new(),
            testcases: TestcaseRegistry::default(),
        };
        debug!(
            signals = sim.graph.len(),
            modules = sim.hierarchy.len(),
            blocks = sim.registry.len(),
            "simulator constructed"
        );
        sim.settle()?;
        if let Some(path) = sim.config.waveform_path.clone() {
            let file = File::create(&path)?;
            sim.set_recorder(Box::new(VcdRecorder::new(BufWriter::new(file))))?;
        }
        Ok(sim)
    }

    fn check_clock(
        graph: &SignalGraph,
        registry: &BlockRegistry,
        clock: SignalId,
    ) -> Result<(), SimError> {
        let Some(state) = graph.try_get(clock) else {
            return Err(SimError::config(format!("clock {clock} is not a signal of this design")));
        };
        if state.kind != SignalKind::Wire || state.width != 1 {
            return Err(SimError::config(format!(
                "clock '{}' must be a 1-bit Wire",
                state.path
            )));
        }
        if registry.is_driven(clock) {
            return Err(SimError::config(format!(
                "clock '{}' is driven by a block",
                state.path
            )));
        }
        Ok(())
    }

    /// Attaches a waveform recorder and dumps the current values.
    ///
    /// A previously attached recorder is finalized first.
    pub fn set_recorder(&mut self, recorder: Box<dyn WaveformRecorder>) -> Result<(), SimError> {
        if let Some(mut old) = self.recorder.take() {
            old.finalize()?;
        }
        let mut recorder = recorder;
        declare_scope(&self.hierarchy, &self.graph, recorder.as_mut(), self.hierarchy.top())?;
        self.dumped = self.graph.snapshot();
        for (id, signal) in self.graph.iter() {
            recorder.record_change(self.time, id, signal.value())?;
        }
        self.recorder = Some(recorder);
        Ok(())
    }

    /// Flushes and detaches the waveform recorder, if any.
    pub fn finish(&mut self) -> Result<(), SimError> {
        if let Some(mut recorder) = self.recorder.take() {
            recorder.finalize()?;
        }
        Ok(())
    }

    fn record_waveform(&mut self) -> Result<(), SimError> {
        let Some(recorder) = self.recorder.as_mut() else {
            return Ok(());
        };
        for (id, signal) in self.graph.iter() {
            let slot = &mut self.dumped[id.as_raw() as usize];
            if *slot != signal.value() {
                recorder.record_change(self.time, id, signal.value())?;
                *slot = signal.value();
            }
        }
        Ok(())
    }

    fn ensure_running(&self) -> Result<(), SimError> {
        match (&self.state, &self.halted) {
            (SimState::Error, Some(cause)) => Err(SimError::Halted {
                cause: cause.clone(),
            }),
            (SimState::Error, None) => Err(SimError::Halted {
                cause: "unknown error".to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Discards uncommitted values on failure and halts on fatal errors.
    fn guard<T>(&mut self, result: Result<T, SimError>) -> Result<T, SimError> {
        match &result {
            Ok(_) => self.state = SimState::Idle,
            Err(err) => {
                self.graph.discard_pending();
                if err.is_fatal() {
                    error!(error = %err, step = self.stats.steps, "simulation halted");
                    self.state = SimState::Error;
                    self.halted = Some(err.to_string());
                } else {
                    self.state = SimState::Idle;
                }
            }
        }
        result
    }

    fn stabilize(&mut self) -> Result<u32, SimError> {
        self.state = SimState::CombSettling;
        let order = self.registry.evaluation_order().to_vec();
        let max = self.config.max_comb_loops;
        let mut unstable = Vec::new();
        for pass in 1..=max {
            self.stats.comb_passes += 1;
            for &block in &order {
                self.registry
                    .run_combinational(block, &mut self.graph, &self.hierarchy)?;
            }
            let changed = self.graph.commit_wires();
            trace!(pass, changed = changed.len(), "stabilization pass");
            if changed.is_empty() {
                self.stats.last_settle_passes = pass - 1;
                return Ok(pass - 1);
            }
            unstable = changed;
        }
        Err(SimError::ConvergenceFailure {
            max_loops: max,
            unstable: unstable
                .into_iter()
                .map(|s| self.graph.get(s).path.clone())
                .collect(),
        })
    }

    /// Runs stabilization passes until one changes nothing.
    ///
    /// Returns the number of passes that changed at least one wire, so a
    /// settle of an already settled design returns 0.
    #[instrument(level = "debug", skip(self))]
    pub fn settle(&mut self) -> Result<u32, SimError> {
        self.ensure_running()?;
        let result = self.stabilize();
        self.guard(result)
    }

    fn is_triggered(&self, block: BlockId, baseline: &[u64]) -> bool {
        self.registry
            .get(block)
            .triggers()
            .iter()
            .any(|t| {
                t.edge
                    .matches(baseline[t.signal.as_raw() as usize], self.graph.value(t.signal))
            })
    }

    fn run_step(&mut self, stimulus: Option<(SignalId, u64)>) -> Result<(), SimError> {
        let baseline = self.graph.snapshot();
        self.stats.steps += 1;
        self.time += 1;
        if let Some((signal, value)) = stimulus {
            self.graph.force(signal, value);
        }

        let mut fired: HashSet<BlockId> = HashSet::new();
        loop {
            self.stabilize()?;
            let ready: Vec<BlockId> = self
                .registry
                .sequential_blocks()
                .iter()
                .copied()
                .filter(|b| !fired.contains(b) && self.is_triggered(*b, &baseline))
                .collect();
            if ready.is_empty() {
                break;
            }
            self.state = SimState::EdgeCommit;
            for &block in &ready {
                self.registry
                    .run_sequential(block, &mut self.graph, &self.hierarchy)?;
            }
            let committed = self.graph.commit_registers();
            debug!(
                fired = ready.len(),
                committed = committed.len(),
                "register commit"
            );
            self.stats.blocks_fired += ready.len() as u64;
            self.stats.register_commits += committed.len() as u64;
            fired.extend(ready);
        }
        self.record_waveform()
    }

    fn check_stimulus(&self, signal: SignalId) -> Result<(), SimError> {
        let Some(state) = self.graph.try_get(signal) else {
            return Err(SimError::config(format!(
                "stimulus targets unknown signal {signal}"
            )));
        };
        let rule = if state.kind == SignalKind::Reg {
            AccessRule::StimulusOnRegister
        } else if self.registry.is_driven(signal) {
            AccessRule::StimulusOnDrivenSignal
        } else {
            return Ok(());
        };
        Err(SimError::AccessViolation {
            signal: state.path.clone(),
            block: STIMULUS.to_string(),
            module: self.hierarchy.get(self.hierarchy.top()).path.clone(),
            rule,
        })
    }

    fn step(&mut self, signal: SignalId, value: u64) -> Result<(), SimError> {
        self.ensure_running()?;
        let result = self
            .check_stimulus(signal)
            .and_then(|()| self.registry.claim_stimulus(signal, &self.graph))
            .and_then(|()| self.run_step(Some((signal, value))));
        self.guard(result)
    }

    /// Applies an external value to an undriven Wire and runs a step.
    #[instrument(level = "debug", skip(self), fields(step = self.stats.steps))]
    pub fn drive(&mut self, signal: SignalId, value: u64) -> Result<(), SimError> {
        self.step(signal, value)
    }

    /// Drives the configured clock to `level` (0 or 1) and runs a step.
    #[instrument(level = "debug", skip(self), fields(step = self.stats.steps))]
    pub fn half_clock(&mut self, level: u64) -> Result<(), SimError> {
        self.ensure_running()?;
        let clock = self
            .config
            .clock
            .ok_or_else(|| SimError::config("no clock signal configured"))?;
        if level > 1 {
            return Err(SimError::config(format!(
                "clock level must be 0 or 1, got {level}"
            )));
        }
        self.step(clock, level)
    }

    /// One full clock period: rising half, then falling half.
    pub fn clock(&mut self) -> Result<(), SimError> {
        self.half_clock(1)?;
        self.half_clock(0)
    }

    /// Runs `n` full clock periods.
    pub fn clocks(&mut self, n: usize) -> Result<(), SimError> {
        for _ in 0..n {
            self.clock()?;
        }
        Ok(())
    }

    /// Restores every signal's init value and settles without firing edges.
    #[instrument(level = "debug", skip(self))]
    pub fn reset(&mut self) -> Result<(), SimError> {
        self.ensure_running()?;
        self.graph.reset_to_init();
        self.stats.steps += 1;
        self.time += 1;
        let result = self.stabilize().and_then(|_| self.record_waveform());
        self.guard(result)
    }

    /// Registers a named scenario.
    pub fn register_testcase<F>(&mut self, name: &str, case: F) -> Result<(), SimError>
    where
        F: Fn(&mut Simulator) -> Result<(), SimError> + 'static,
    {
        self.testcases.register(name, Rc::new(case))
    }

    /// Names of registered scenarios, in registration order.
    pub fn testcase_names(&self) -> Vec<String> {
        self.testcases.names().map(str::to_string).collect()
    }

    /// Runs a registered scenario against this simulator.
    ///
    /// Errors propagate unchanged; nothing is rolled back.
    #[instrument(level = "debug", skip(self))]
    pub fn testcase(&mut self, name: &str) -> Result<(), SimError> {
        let case = self
            .testcases
            .get(name)
            .ok_or_else(|| SimError::config(format!("unknown testcase '{name}'")))?;
        debug!(testcase = name, "running testcase");
        (*case)(self)
    }

    /// Runs every registered scenario in order and collects the outcomes.
    pub fn run_testcases(&mut self) -> Vec<TestcaseOutcome> {
        self.testcase_names()
            .into_iter()
            .map(|name| {
                let result = self.testcase(&name);
                if let Err(err) = &result {
                    debug!(testcase = %name, error = %err, "testcase failed");
                }
                TestcaseOutcome { name, result }
            })
            .collect()
    }

    /// Fails with [`SimError::AssertionFailed`] unless `signal` reads `expected`.
    pub fn expect(&self, signal: SignalId, expected: u64) -> Result<(), SimError> {
        let actual = self.read(signal);
        if actual != expected {
            return Err(SimError::AssertionFailed {
                signal: self.signal_name(signal).to_string(),
                expected,
                actual,
                step: self.stats.steps,
            });
        }
        Ok(())
    }

    /// Current settled value of a signal.
    ///
    /// # Panics
    ///
    /// Panics if `signal` does not belong to this simulator's design.
    pub fn read(&self, signal: SignalId) -> u64 {
        self.graph.value(signal)
    }

    /// Bits `[msb:lsb]` of a signal's settled value.
    pub fn read_bits(&self, signal: SignalId, msb: u32, lsb: u32) -> Result<u64, SimError> {
        let state = self.graph.get(signal);
        bits::read_bits(state.value(), state.width, msb, lsb).map_err(|e| {
            SimError::AccessViolation {
                signal: state.path.clone(),
                block: STIMULUS.to_string(),
                module: self.hierarchy.get(self.hierarchy.top()).path.clone(),
                rule: AccessRule::BitRange {
                    msb: e.msb,
                    lsb: e.lsb,
                    width: e.width,
                },
            }
        })
    }

    /// A signal's settled value as two's complement.
    pub fn read_signed(&self, signal: SignalId) -> i64 {
        let state = self.graph.get(signal);
        bits::to_signed(state.value(), state.width)
    }

    /// Looks a signal up by hierarchical path.
    pub fn find_signal(&self, path: &str) -> Option<SignalId> {
        self.graph.find(path)
    }

    /// Hierarchical path of a signal.
    pub fn signal_name(&self, signal: SignalId) -> &str {
        &self.graph.get(signal).path
    }

    /// Current scheduler state.
    pub fn state(&self) -> SimState {
        self.state
    }

    /// Lifetime counters.
    pub fn stats(&self) -> SimStats {
        self.stats
    }

    /// Waveform time: the number of steps taken.
    pub fn time(&self) -> u64 {
        self.time
    }

    /// The configuration the simulator was built with.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// The signal graph.
    pub fn signals(&self) -> &SignalGraph {
        &self.graph
    }

    /// The module tree.
    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    /// The block registry.
    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }
}

fn declare_scope(
    hierarchy: &Hierarchy,
    graph: &SignalGraph,
    recorder: &mut dyn WaveformRecorder,
    module: ModuleId,
) -> Result<(), SimError> {
    let node = hierarchy.get(module);
    recorder.begin_scope(&node.name)?;
    for &signal in &node.signals {
        let state = graph.get(signal);
        recorder.register_signal(signal, &state.name, state.width, state.kind)?;
    }
    for &child in &node.children {
        declare_scope(hierarchy, graph, recorder, child)?;
    }
    recorder.end_scope()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::Scope;
    use crate::registry::Trigger;

    fn counter_design() -> (Design, SignalId, SignalId) {
        let mut d = Design::new("tb");
        let mut top = d.top();
        let clk = top.wire("clk", 1).unwrap();
        let count = top.reg("count", 4, 0).unwrap();
        top.always_ff("count_up", [Trigger::rising(clk)], move |c| {
            let v = c.get(count)?;
            c.set_next(count, v + 1)
        })
        .unwrap();
        (d, clk, count)
    }

    #[test]
    fn construction_settles_combinational_logic() {
        let mut d = Design::new("tb");
        let mut top = d.top();
        let a = top.signal(crate::SignalSpec::wire("a", 4).init(3)).unwrap();
        let y = top.wire("y", 4).unwrap();
        top.always_comb("double", move |c| {
            let v = c.get(a)?;
            c.set(y, v * 2)
        })
        .unwrap();
        let sim = Simulator::new(d, SimConfig::default()).unwrap();
        assert_eq!(sim.read(y), 6);
        assert_eq!(sim.state(), SimState::Idle);
    }

    #[test]
    fn clock_advances_counter() {
        let (d, clk, count) = counter_design();
        let mut sim = Simulator::new(d, SimConfig::default().with_clock(clk)).unwrap();
        sim.clock().unwrap();
        assert_eq!(sim.read(count), 1);
        sim.clocks(15).unwrap();
        assert_eq!(sim.read(count), 0);
        assert_eq!(sim.stats().steps, 32);
        assert_eq!(sim.stats().blocks_fired, 16);
        assert_eq!(sim.time(), 32);
    }

    #[test]
    fn half_clock_needs_clock() {
        let (d, _, _) = counter_design();
        let mut sim = Simulator::new(d, SimConfig::default()).unwrap();
        let err = sim.half_clock(1).unwrap_err();
        assert!(matches!(err, SimError::Configuration { .. }));
        assert_eq!(sim.state(), SimState::Idle);
    }

    #[test]
    fn half_clock_rejects_bad_level() {
        let (d, clk, _) = counter_design();
        let mut sim = Simulator::new(d, SimConfig::default().with_clock(clk)).unwrap();
        assert!(sim.half_clock(2).is_err());
    }

    #[test]
    fn clock_must_be_undriven_one_bit_wire() {
        let (d, _, count) = counter_design();
        let err = Simulator::new(d, SimConfig::default().with_clock(count)).unwrap_err();
        assert!(matches!(err, SimError::Configuration { .. }));
    }

    #[test]
    fn zero_comb_loops_rejected() {
        let (d, _, _) = counter_design();
        let err = Simulator::new(d, SimConfig::default().with_max_comb_loops(0)).unwrap_err();
        assert!(matches!(err, SimError::Configuration { .. }));
    }

    #[test]
    fn reset_restores_init() {
        let (d, clk, count) = counter_design();
        let mut sim = Simulator::new(d, SimConfig::default().with_clock(clk)).unwrap();
        sim.clocks(3).unwrap();
        assert_eq!(sim.read(count), 3);
        sim.reset().unwrap();
        assert_eq!(sim.read(count), 0);
        assert_eq!(sim.stats().blocks_fired, 3);
    }

    #[test]
    fn stimulus_on_register_halts() {
        let (d, clk, count) = counter_design();
        let mut sim = Simulator::new(d, SimConfig::default().with_clock(clk)).unwrap();
        let err = sim.drive(count, 3).unwrap_err();
        assert!(matches!(
            err,
            SimError::AccessViolation {
                rule: AccessRule::StimulusOnRegister,
                ..
            }
        ));
        assert_eq!(sim.state(), SimState::Error);
        assert!(matches!(sim.clock().unwrap_err(), SimError::Halted { .. }));
        assert_eq!(sim.read(count), 0);
    }

    #[test]
    fn testcase_lookup() {
        let (d, clk, count) = counter_design();
        let mut sim = Simulator::new(d, SimConfig::default().with_clock(clk)).unwrap();
        sim.register_testcase("two_clocks", move |s: &mut Simulator| {
            s.clocks(2)?;
            s.expect(count, 2)
        })
        .unwrap();
        sim.testcase("two_clocks").unwrap();
        let err = sim.testcase("missing").unwrap_err();
        assert!(matches!(err, SimError::Configuration { .. }));
    }

    #[test]
    fn expect_reports_mismatch() {
        let (d, clk, count) = counter_design();
        let sim = Simulator::new(d, SimConfig::default().with_clock(clk)).unwrap();
        match sim.expect(count, 5).unwrap_err() {
            SimError::AssertionFailed {
                signal,
                expected,
                actual,
                ..
            } => {
                assert_eq!(signal, "tb.count");
                assert_eq!(expected, 5);
                assert_eq!(actual, 0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn derived_clock_fires_in_same_step() {
        let mut d = Design::new("tb");
        let mut top = d.top();
        let clk = top.wire("clk", 1).unwrap();
        let div = top.reg("div", 1, 0).unwrap();
        let slow = top.reg("slow", 4, 0).unwrap();
        top.always_ff("divide", [Trigger::rising(clk)], move |c| {
            let v = c.get(div)?;
            c.set_next(div, v ^ 1)
        })
        .unwrap();
        top.always_ff("slow_count", [Trigger::rising(div)], move |c| {
            let v = c.get(slow)?;
            c.set_next(slow, v + 1)
        })
        .unwrap();
        let mut sim = Simulator::new(d, SimConfig::default().with_clock(clk)).unwrap();
        sim.clock().unwrap();
        assert_eq!(sim.read(div), 1);
        assert_eq!(sim.read(slow), 1);
        sim.clock().unwrap();
        assert_eq!(sim.read(slow), 1);
        sim.clock().unwrap();
        assert_eq!(sim.read(slow), 2);
    }

    #[test]
    fn stats_serialize() {
        let (d, clk, _) = counter_design();
        let mut sim = Simulator::new(d, SimConfig::default().with_clock(clk)).unwrap();
        sim.clock().unwrap();
        let json = serde_json::to_value(sim.stats()).unwrap();
        assert_eq!(json["steps"], 2);
        assert_eq!(json["blocks_fired"], 1);
        assert_eq!(serde_json::to_string(&sim.state()).unwrap(), "\"Idle\"");
    }

    #[test]
    fn read_helpers() {
        let mut d = Design::new("tb");
        let v = d
            .top()
            .signal(crate::SignalSpec::wire("v", 8).init(0xF6))
            .unwrap();
        let sim = Simulator::new(d, SimConfig::default()).unwrap();
        assert_eq!(sim.read_bits(v, 7, 4).unwrap(), 0xF);
        assert_eq!(sim.read_signed(v), -10);
        assert!(sim.read_bits(v, 8, 0).is_err());
        assert_eq!(sim.find_signal("tb.v"), Some(v));
        assert_eq!(sim.signal_name(v), "tb.v");
    }

    #[test]
    fn nested_module_counter() {
        let mut d = Design::new("tb");
        let mut top = d.top();
        let clk = top.wire("clk", 1).unwrap();
        let out = top.reg("out", 4, 0).unwrap();
        top.instantiate("counter", move |m: &mut Scope<'_>| -> Result<(), SimError> {
            let clk = m.input("clk", clk)?;
            let out = m.output_reg("out", out)?;
            m.always_ff("count_up", [Trigger::rising(clk)], move |c| {
                let v = c.get(out)?;
                c.set_next(out, v + 1)
            })?;
            Ok(())
        })
        .unwrap();
        let mut sim = Simulator::new(d, SimConfig::default().with_clock(clk)).unwrap();
        sim.clocks(2).unwrap();
        assert_eq!(sim.read(out), 2);
    }
}
