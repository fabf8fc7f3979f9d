//! Typed fixed-width signal storage.
//!
//! The [`SignalGraph`] owns every signal of a design. A signal is created
//! once by its owning scope and afterwards addressed only through its
//! [`SignalId`]; ports bind the same ID, so a value is never duplicated.
//!
//! Wires and registers share the store but are written through different
//! paths. [`SignalGraph::write_wire`] stages a value that becomes visible at
//! the end of the current stabilization pass; [`SignalGraph::schedule_register_write`]
//! fills a pending slot that becomes visible at the next register commit.

use std::collections::HashMap;

use hdlproto_common::{bits, Arena, ModuleId, SignalId, MAX_WIDTH};
use serde::{Deserialize, Serialize};

use crate::error::{AccessRule, SimError};

/// Storage class of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    /// Continuously assigned by combinational logic.
    Wire,
    /// Holds its value between edges; written with non-blocking semantics.
    Reg,
}

/// How a signal was declared by its owning scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalRole {
    /// A plain internal signal.
    Internal,
    /// Declared as an input of the owning scope.
    Input,
    /// Declared as an output of the owning scope.
    Output,
}

/// The execution phase a write originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Inside a combinational block during stabilization.
    Combinational,
    /// Inside a sequential block that fired on an edge.
    Sequential,
}

/// Identifies the block performing a write, for error reporting.
#[derive(Debug, Clone, Copy)]
pub struct Writer<'a> {
    /// Qualified block name (`module::block`).
    pub block: &'a str,
    /// Path of the module that owns the block.
    pub module: &'a str,
    /// Phase the block executes in.
    pub phase: Phase,
}

impl Writer<'_> {
    /// Builds an access violation for `signal` attributed to this writer.
    pub fn violation(&self, signal: &SignalState, rule: AccessRule) -> SimError {
        SimError::AccessViolation {
            signal: signal.path.clone(),
            block: self.block.to_string(),
            module: self.module.to_string(),
            rule,
        }
    }
}

/// Declaration of a new signal.
///
/// ```
/// use hdlproto_sim::{SignalKind, SignalSpec};
///
/// let spec = SignalSpec::reg("count", 4).init(3);
/// assert_eq!(spec.kind, SignalKind::Reg);
/// assert_eq!(spec.init, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalSpec {
    /// Local name inside the owning scope.
    pub name: String,
    /// Wire or Reg.
    pub kind: SignalKind,
    /// Bit width, 1..=64.
    pub width: u32,
    /// Initial and reset value; must fit the width.
    pub init: u64,
    /// Declared role inside the owning scope.
    pub role: SignalRole,
}

impl SignalSpec {
    /// A zero-initialized internal Wire.
    pub fn wire(name: impl Into<String>, width: u32) -> Self {
        Self {
            name: name.into(),
            kind: SignalKind::Wire,
            width,
            init: 0,
            role: SignalRole::Internal,
        }
    }

    /// A zero-initialized internal Reg.
    pub fn reg(name: impl Into<String>, width: u32) -> Self {
        Self {
            kind: SignalKind::Reg,
            ..Self::wire(name, width)
        }
    }

    /// Sets the initial value.
    pub fn init(mut self, init: u64) -> Self {
        self.init = init;
        self
    }

    /// Sets the declared role.
    pub fn role(mut self, role: SignalRole) -> Self {
        self.role = role;
        self
    }
}

/// Runtime state of one signal.
#[derive(Debug, Clone)]
pub struct SignalState {
    /// Local name inside the owning scope.
    pub name: String,
    /// Full hierarchical path (e.g. `tb.counter.count`).
    pub path: String,
    /// The scope that created the signal.
    pub owner: ModuleId,
    /// Wire or Reg.
    pub kind: SignalKind,
    /// Declared role.
    pub role: SignalRole,
    /// Bit width.
    pub width: u32,
    /// Initial and reset value.
    pub init: u64,
    value: u64,
    staged: Option<u64>,
    pending: Option<u64>,
}

impl SignalState {
    /// The current settled value.
    pub fn value(&self) -> u64 {
        self.value
    }

    /// The value scheduled for the next register commit, if any.
    pub fn pending(&self) -> Option<u64> {
        self.pending
    }

    /// Returns `true` if `module` declared this signal as its own input.
    pub fn is_input_of(&self, module: ModuleId) -> bool {
        self.role == SignalRole::Input && self.owner == module
    }
}

/// Owner of every signal in a design.
#[derive(Debug, Default)]
pub struct SignalGraph {
    signals: Arena<SignalId, SignalState>,
    by_path: HashMap<String, SignalId>,
}

impl SignalGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a signal owned by `owner`, whose hierarchical path is `owner_path`.
    ///
    /// Rejects widths outside `1..=64`, an `init` that does not fit the width,
    /// and a duplicate hierarchical path.
    pub fn create(
        &mut self,
        owner: ModuleId,
        owner_path: &str,
        spec: SignalSpec,
    ) -> Result<SignalId, SimError> {
        let path = format!("{owner_path}.{}", spec.name);
        if spec.width == 0 || spec.width > MAX_WIDTH {
            return Err(SimError::config(format!(
                "signal '{path}' has width {}, expected 1..={MAX_WIDTH}",
                spec.width
            )));
        }
        if !bits::fits(spec.init, spec.width) {
            return Err(SimError::config(format!(
                "init value {} of signal '{path}' does not fit in {} bits",
                spec.init, spec.width
            )));
        }
        if self.by_path.contains_key(&path) {
            return Err(SimError::config(format!("duplicate signal '{path}'")));
        }
        let id = self.signals.alloc(SignalState {
            name: spec.name,
            path: path.clone(),
            owner,
            kind: spec.kind,
            role: spec.role,
            width: spec.width,
            init: spec.init,
            value: spec.init,
            staged: None,
            pending: None,
        });
        self.by_path.insert(path, id);
        Ok(id)
    }

    /// Returns the state of a signal.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not allocated by this graph.
    pub fn get(&self, id: SignalId) -> &SignalState {
        self.signals.get(id)
    }

    /// Returns the state of a signal, or `None` for a foreign ID.
    pub fn try_get(&self, id: SignalId) -> Option<&SignalState> {
        self.signals.try_get(id)
    }

    /// Returns the current settled value.
    pub fn value(&self, id: SignalId) -> u64 {
        self.signals.get(id).value
    }

    /// Reads a Wire (or any signal) as of the start of the current pass.
    pub fn read_wire(&self, id: SignalId) -> u64 {
        self.value(id)
    }

    /// Reads the pre-edge value of a signal.
    ///
    /// Pending register writes are not visible until [`commit_registers`](Self::commit_registers).
    pub fn read_register(&self, id: SignalId) -> u64 {
        self.value(id)
    }

    /// Value a wire will hold after this pass commits.
    pub fn next_wire_value(&self, id: SignalId) -> u64 {
        let s = self.signals.get(id);
        s.staged.unwrap_or(s.value)
    }

    /// Value a register will hold after the next commit.
    pub fn next_register_value(&self, id: SignalId) -> u64 {
        let s = self.signals.get(id);
        s.pending.unwrap_or(s.value)
    }

    /// Stages a masked value on a Wire for the end of the current pass.
    ///
    /// Returns `true` if the staged value differs from the settled value,
    /// i.e. the write will re-arm another stabilization pass.
    pub fn write_wire(&mut self, id: SignalId, value: u64, by: Writer<'_>) -> Result<bool, SimError> {
        let signal = self.signals.get_mut(id);
        if signal.kind != SignalKind::Wire {
            return Err(by.violation(signal, AccessRule::RegisterWrittenAsWire));
        }
        if by.phase != Phase::Combinational {
            return Err(by.violation(signal, AccessRule::WireOutsideCombinational));
        }
        let masked = bits::truncate(value, signal.width);
        signal.staged = Some(masked);
        Ok(masked != signal.value)
    }

    /// Schedules a masked non-blocking write on a Reg.
    ///
    /// The current value is untouched; a later write in the same edge
    /// overrides an earlier one.
    pub fn schedule_register_write(
        &mut self,
        id: SignalId,
        value: u64,
        by: Writer<'_>,
    ) -> Result<(), SimError> {
        let signal = self.signals.get_mut(id);
        if signal.kind != SignalKind::Reg {
            return Err(by.violation(signal, AccessRule::WireWrittenAsRegister));
        }
        if by.phase != Phase::Sequential {
            return Err(by.violation(signal, AccessRule::RegisterOutsideSequential));
        }
        signal.pending = Some(bits::truncate(value, signal.width));
        Ok(())
    }

    /// Applies every staged wire value and returns the wires that changed.
    pub fn commit_wires(&mut self) -> Vec<SignalId> {
        Self::commit_slots(&mut self.signals, |s| s.staged.take())
    }

    /// Applies every pending register slot and returns the registers that changed.
    pub fn commit_registers(&mut self) -> Vec<SignalId> {
        Self::commit_slots(&mut self.signals, |s| s.pending.take())
    }

    fn commit_slots(
        signals: &mut Arena<SignalId, SignalState>,
        mut take: impl FnMut(&mut SignalState) -> Option<u64>,
    ) -> Vec<SignalId> {
        let mut changed = Vec::new();
        for (id, signal) in signals.iter_mut() {
            if let Some(next) = take(signal) {
                if next != signal.value {
                    signal.value = next;
                    changed.push(id);
                }
            }
        }
        changed
    }

    /// Drops every staged and pending value without applying it.
    pub fn discard_pending(&mut self) {
        for signal in self.signals.values_mut() {
            signal.staged = None;
            signal.pending = None;
        }
    }

    /// Restores every signal to its init value and clears all slots.
    pub fn reset_to_init(&mut self) {
        for signal in self.signals.values_mut() {
            signal.value = signal.init;
            signal.staged = None;
            signal.pending = None;
        }
    }

    /// Sets a settled value directly, bypassing the phase rules.
    ///
    /// Used for external stimulus after the simulator has checked the target.
    /// Returns `true` if the value changed.
    pub(crate) fn force(&mut self, id: SignalId, value: u64) -> bool {
        let signal = self.signals.get_mut(id);
        let masked = bits::truncate(value, signal.width);
        let changed = masked != signal.value;
        signal.value = masked;
        changed
    }

    /// Captures every settled value, indexed by raw signal ID.
    pub fn snapshot(&self) -> Vec<u64> {
        self.signals.values().map(|s| s.value).collect()
    }

    /// Looks a signal up by hierarchical path.
    pub fn find(&self, path: &str) -> Option<SignalId> {
        self.by_path.get(path).copied()
    }

    /// Iterates over all signals in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (SignalId, &SignalState)> {
        self.signals.iter()
    }

    /// Returns the number of signals.
    pub fn len(&self) -> usize {
        self.signals.len()
    }

    /// Returns `true` if the graph holds no signals.
    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMB: Writer<'static> = Writer {
        block: "tb::logic",
        module: "tb",
        phase: Phase::Combinational,
    };
    const SEQ: Writer<'static> = Writer {
        block: "tb::regs",
        module: "tb",
        phase: Phase::Sequential,
    };

    fn top() -> ModuleId {
        ModuleId::from_raw(0)
    }

    #[test]
    fn create_records_path_and_init() {
        let mut g = SignalGraph::new();
        let id = g.create(top(), "tb", SignalSpec::reg("count", 4).init(5)).unwrap();
        let s = g.get(id);
        assert_eq!(s.path, "tb.count");
        assert_eq!(s.value(), 5);
        assert_eq!(g.find("tb.count"), Some(id));
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn create_rejects_bad_width() {
        let mut g = SignalGraph::new();
        assert!(g.create(top(), "tb", SignalSpec::wire("a", 0)).is_err());
        assert!(g.create(top(), "tb", SignalSpec::wire("b", 65)).is_err());
        assert!(g.create(top(), "tb", SignalSpec::wire("c", 64)).is_ok());
    }

    #[test]
    fn create_rejects_oversized_init() {
        let mut g = SignalGraph::new();
        let err = g
            .create(top(), "tb", SignalSpec::wire("a", 4).init(16))
            .unwrap_err();
        assert!(matches!(err, SimError::Configuration { .. }));
    }

    #[test]
    fn create_rejects_duplicate_path() {
        let mut g = SignalGraph::new();
        g.create(top(), "tb", SignalSpec::wire("a", 1)).unwrap();
        assert!(g.create(top(), "tb", SignalSpec::reg("a", 1)).is_err());
    }

    #[test]
    fn wire_write_is_staged_until_commit() {
        let mut g = SignalGraph::new();
        let a = g.create(top(), "tb", SignalSpec::wire("a", 8)).unwrap();
        assert!(g.write_wire(a, 7, COMB).unwrap());
        assert_eq!(g.read_wire(a), 0);
        assert_eq!(g.next_wire_value(a), 7);
        assert_eq!(g.commit_wires(), vec![a]);
        assert_eq!(g.read_wire(a), 7);
        assert!(!g.write_wire(a, 7, COMB).unwrap());
        assert!(g.commit_wires().is_empty());
    }

    #[test]
    fn writes_are_masked() {
        let mut g = SignalGraph::new();
        let w = g.create(top(), "tb", SignalSpec::wire("w", 4)).unwrap();
        let r = g.create(top(), "tb", SignalSpec::reg("r", 4)).unwrap();
        g.write_wire(w, 16, COMB).unwrap();
        g.schedule_register_write(r, 0x1F, SEQ).unwrap();
        g.commit_wires();
        g.commit_registers();
        assert_eq!(g.value(w), 0);
        assert_eq!(g.value(r), 0xF);
    }

    #[test]
    fn register_write_is_deferred() {
        let mut g = SignalGraph::new();
        let r = g.create(top(), "tb", SignalSpec::reg("r", 8).init(1)).unwrap();
        g.schedule_register_write(r, 2, SEQ).unwrap();
        assert_eq!(g.read_register(r), 1);
        assert_eq!(g.get(r).pending(), Some(2));
        g.schedule_register_write(r, 3, SEQ).unwrap();
        assert_eq!(g.commit_registers(), vec![r]);
        assert_eq!(g.read_register(r), 3);
        assert_eq!(g.get(r).pending(), None);
    }

    #[test]
    fn reg_through_wire_view_is_violation() {
        let mut g = SignalGraph::new();
        let r = g.create(top(), "tb", SignalSpec::reg("r", 1)).unwrap();
        let err = g.write_wire(r, 1, COMB).unwrap_err();
        match err {
            SimError::AccessViolation { signal, block, rule, .. } => {
                assert_eq!(signal, "tb.r");
                assert_eq!(block, "tb::logic");
                assert_eq!(rule, AccessRule::RegisterWrittenAsWire);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn wire_through_register_view_is_violation() {
        let mut g = SignalGraph::new();
        let w = g.create(top(), "tb", SignalSpec::wire("w", 1)).unwrap();
        let err = g.schedule_register_write(w, 1, SEQ).unwrap_err();
        assert!(matches!(
            err,
            SimError::AccessViolation {
                rule: AccessRule::WireWrittenAsRegister,
                ..
            }
        ));
    }

    #[test]
    fn phase_mismatch_is_violation() {
        let mut g = SignalGraph::new();
        let w = g.create(top(), "tb", SignalSpec::wire("w", 1)).unwrap();
        let r = g.create(top(), "tb", SignalSpec::reg("r", 1)).unwrap();
        assert!(matches!(
            g.write_wire(w, 1, SEQ).unwrap_err(),
            SimError::AccessViolation {
                rule: AccessRule::WireOutsideCombinational,
                ..
            }
        ));
        assert!(matches!(
            g.schedule_register_write(r, 1, COMB).unwrap_err(),
            SimError::AccessViolation {
                rule: AccessRule::RegisterOutsideSequential,
                ..
            }
        ));
    }

    #[test]
    fn reset_and_discard() {
        let mut g = SignalGraph::new();
        let w = g.create(top(), "tb", SignalSpec::wire("w", 4).init(2)).unwrap();
        let r = g.create(top(), "tb", SignalSpec::reg("r", 4).init(9)).unwrap();
        g.write_wire(w, 5, COMB).unwrap();
        g.commit_wires();
        g.write_wire(w, 6, COMB).unwrap();
        g.schedule_register_write(r, 1, SEQ).unwrap();
        g.discard_pending();
        assert!(g.commit_wires().is_empty());
        assert!(g.commit_registers().is_empty());
        assert_eq!(g.value(w), 5);
        g.reset_to_init();
        assert_eq!(g.value(w), 2);
        assert_eq!(g.value(r), 9);
    }

    #[test]
    fn force_masks_and_reports_change() {
        let mut g = SignalGraph::new();
        let a = g.create(top(), "tb", SignalSpec::wire("a", 2)).unwrap();
        assert!(g.force(a, 7));
        assert_eq!(g.value(a), 3);
        assert!(!g.force(a, 3));
    }

    #[test]
    fn snapshot_is_indexed_by_raw_id() {
        let mut g = SignalGraph::new();
        let a = g.create(top(), "tb", SignalSpec::wire("a", 8).init(4)).unwrap();
        let b = g.create(top(), "tb", SignalSpec::reg("b", 8).init(9)).unwrap();
        let snap = g.snapshot();
        assert_eq!(snap[a.as_raw() as usize], 4);
        assert_eq!(snap[b.as_raw() as usize], 9);
    }
}
