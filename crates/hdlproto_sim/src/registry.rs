//! Logic block catalog and single-driver enforcement.
//!
//! The [`BlockRegistry`] owns every combinational and sequential block in
//! registration order. Blocks may declare the signals they write; declared
//! sets are checked up front by [`BlockRegistry::validate`], and every write
//! made at runtime is checked against the first-observed writer recorded in
//! the [`DriverTable`].

use std::collections::HashMap;
use std::fmt;

use hdlproto_common::{Arena, BlockId, ModuleId, SignalId};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{AccessRule, SimError};
use crate::hierarchy::{Hierarchy, ModuleNode};
use crate::signal::{Phase, SignalGraph, SignalKind, Writer};
use crate::view::{CombCtx, SeqCtx};

/// Body of a combinational block.
pub type CombFn = Box<dyn Fn(&mut CombCtx<'_>) -> Result<(), SimError>>;

/// Body of a sequential block.
pub type SeqFn = Box<dyn Fn(&mut SeqCtx<'_>) -> Result<(), SimError>>;

/// Polarity of an edge trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Edge {
    /// Zero to non-zero.
    Rising,
    /// Non-zero to zero.
    Falling,
}

impl Edge {
    /// Returns `true` if the transition `before -> after` is this edge.
    pub fn matches(self, before: u64, after: u64) -> bool {
        match self {
            Edge::Rising => before == 0 && after != 0,
            Edge::Falling => before != 0 && after == 0,
        }
    }
}

/// One `(polarity, signal)` entry of a sequential block's trigger list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Trigger {
    /// Edge polarity.
    pub edge: Edge,
    /// Watched signal.
    pub signal: SignalId,
}

impl Trigger {
    /// A rising-edge trigger.
    pub fn rising(signal: SignalId) -> Self {
        Self {
            edge: Edge::Rising,
            signal,
        }
    }

    /// A falling-edge trigger.
    pub fn falling(signal: SignalId) -> Self {
        Self {
            edge: Edge::Falling,
            signal,
        }
    }
}

enum BlockBody {
    Combinational(CombFn),
    Sequential(SeqFn),
}

/// A registered logic block.
pub struct Block {
    /// Local block name.
    pub name: String,
    /// `module_path::name`, used in diagnostics.
    pub qualified: String,
    /// Owning module.
    pub module: ModuleId,
    triggers: Vec<Trigger>,
    declared: Option<Vec<SignalId>>,
    body: BlockBody,
}

impl Block {
    /// Execution phase of the block.
    pub fn phase(&self) -> Phase {
        match self.body {
            BlockBody::Combinational(_) => Phase::Combinational,
            BlockBody::Sequential(_) => Phase::Sequential,
        }
    }

    /// Trigger list; empty for combinational blocks.
    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    /// The declared write-set, if the block declared one.
    pub fn declared_writes(&self) -> Option<&[SignalId]> {
        self.declared.as_deref()
    }

    /// Returns `true` unless a declared write-set excludes `signal`.
    pub fn may_write(&self, signal: SignalId) -> bool {
        self.declared
            .as_ref()
            .map_or(true, |set| set.contains(&signal))
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("qualified", &self.qualified)
            .field("phase", &self.phase())
            .field("triggers", &self.triggers)
            .field("declared", &self.declared)
            .finish()
    }
}

/// Name reported for writes made by the testbench through stimulus.
pub const STIMULUS: &str = "<stimulus>";

/// Who first wrote a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    /// A combinational or sequential block.
    Block(BlockId),
    /// External stimulus applied by the testbench.
    Stimulus,
}

/// First-observed writer of every driven signal.
///
/// Entries persist for the lifetime of the simulator, across steps and resets.
#[derive(Debug, Default)]
pub struct DriverTable {
    drivers: HashMap<SignalId, Driver>,
}

impl DriverTable {
    /// The recorded writer of `signal`, block or stimulus.
    pub fn driver(&self, signal: SignalId) -> Option<Driver> {
        self.drivers.get(&signal).copied()
    }

    /// The block recorded as the signal's driver.
    pub fn driver_of(&self, signal: SignalId) -> Option<BlockId> {
        match self.driver(signal) {
            Some(Driver::Block(block)) => Some(block),
            _ => None,
        }
    }

    fn name(driver: Driver, blocks: &Arena<BlockId, Block>) -> String {
        match driver {
            Driver::Block(block) => blocks.get(block).qualified.clone(),
            Driver::Stimulus => STIMULUS.to_string(),
        }
    }

    fn record(
        &mut self,
        signal: SignalId,
        writer: Driver,
        blocks: &Arena<BlockId, Block>,
        graph: &SignalGraph,
    ) -> Result<(), SimError> {
        match self.drivers.get(&signal) {
            Some(&owner) if owner == writer => Ok(()),
            Some(&owner) => Err(SimError::DriverConflict {
                signal: graph.get(signal).path.clone(),
                blocks: vec![Self::name(owner, blocks), Self::name(writer, blocks)],
            }),
            None => {
                trace!(
                    signal = %graph.get(signal).path,
                    driver = %Self::name(writer, blocks),
                    "driver recorded"
                );
                self.drivers.insert(signal, writer);
                Ok(())
            }
        }
    }

    /// Records `block` as the driver of `signal`, or reports a conflict if a
    /// different block or the testbench got there first.
    pub fn claim(
        &mut self,
        signal: SignalId,
        block: BlockId,
        blocks: &Arena<BlockId, Block>,
        graph: &SignalGraph,
    ) -> Result<(), SimError> {
        self.record(signal, Driver::Block(block), blocks, graph)
    }

    /// Records the testbench as the driver of `signal`.
    pub fn claim_stimulus(
        &mut self,
        signal: SignalId,
        blocks: &Arena<BlockId, Block>,
        graph: &SignalGraph,
    ) -> Result<(), SimError> {
        self.record(signal, Driver::Stimulus, blocks, graph)
    }

    /// Number of signals with a recorded driver.
    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    /// Returns `true` if no driver has been recorded.
    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

/// Catalog of all blocks in a design.
#[derive(Debug, Default)]
pub struct BlockRegistry {
    blocks: Arena<BlockId, Block>,
    drivers: DriverTable,
    combinational: Vec<BlockId>,
    sequential: Vec<BlockId>,
}

impl BlockRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn qualify(module: &ModuleNode, name: &str) -> String {
        format!("{}::{name}", module.path)
    }

    /// Registers a combinational block of `module`.
    pub fn register_combinational(
        &mut self,
        module: ModuleId,
        node: &ModuleNode,
        name: &str,
        body: CombFn,
    ) -> BlockId {
        let id = self.blocks.alloc(Block {
            name: name.to_string(),
            qualified: Self::qualify(node, name),
            module,
            triggers: Vec::new(),
            declared: None,
            body: BlockBody::Combinational(body),
        });
        self.combinational.push(id);
        id
    }

    /// Registers a sequential block of `module`.
    ///
    /// The trigger list must be non-empty and every trigger signal must be
    /// visible in the module.
    pub fn register_sequential(
        &mut self,
        module: ModuleId,
        node: &ModuleNode,
        name: &str,
        triggers: Vec<Trigger>,
        body: SeqFn,
    ) -> Result<BlockId, SimError> {
        let qualified = Self::qualify(node, name);
        if triggers.is_empty() {
            return Err(SimError::config(format!(
                "sequential block '{qualified}' has no triggers"
            )));
        }
        if let Some(t) = triggers.iter().find(|t| !node.is_visible(t.signal)) {
            return Err(SimError::config(format!(
                "sequential block '{qualified}' triggers on {} which is not visible in '{}'",
                t.signal, node.path
            )));
        }
        let id = self.blocks.alloc(Block {
            name: name.to_string(),
            qualified,
            module,
            triggers,
            declared: None,
            body: BlockBody::Sequential(body),
        });
        self.sequential.push(id);
        Ok(id)
    }

    /// Adds signals to a block's declared write-set.
    pub fn declare_writes(&mut self, block: BlockId, signals: &[SignalId]) {
        let declared = self.blocks.get_mut(block).declared.get_or_insert_with(Vec::new);
        for &s in signals {
            if !declared.contains(&s) {
                declared.push(s);
            }
        }
    }

    /// Statically checks every declared write-set.
    ///
    /// Declared drivers are entered into the driver table, so a later
    /// undeclared write to the same signal by another block is a conflict.
    pub fn validate(&mut self, graph: &SignalGraph, hierarchy: &Hierarchy) -> Result<(), SimError> {
        let Self {
            blocks, drivers, ..
        } = self;
        let blocks = &*blocks;
        for (id, block) in blocks.iter() {
            let Some(declared) = block.declared_writes() else {
                continue;
            };
            let module = hierarchy.get(block.module);
            let writer = Writer {
                block: &block.qualified,
                module: &module.path,
                phase: block.phase(),
            };
            for &signal in declared {
                let Some(state) = graph.try_get(signal) else {
                    return Err(SimError::config(format!(
                        "block '{}' declares unknown signal {signal}",
                        block.qualified
                    )));
                };
                let rule = if !module.is_visible(signal) {
                    Some(AccessRule::NotVisible)
                } else if module.is_input(signal) || state.is_input_of(block.module) {
                    Some(AccessRule::InputWrittenByOwner)
                } else {
                    match (block.phase(), state.kind) {
                        (Phase::Combinational, SignalKind::Reg) => {
                            Some(AccessRule::RegisterWrittenAsWire)
                        }
                        (Phase::Sequential, SignalKind::Wire) => {
                            Some(AccessRule::WireWrittenAsRegister)
                        }
                        _ => None,
                    }
                };
                if let Some(rule) = rule {
                    return Err(writer.violation(state, rule));
                }
                drivers.claim(signal, id, blocks, graph)?;
            }
        }
        Ok(())
    }

    /// Combinational blocks in evaluation order.
    ///
    /// The order is registration order: modules in the pre-order in which
    /// their `build` ran, then declaration order within a module.
    pub fn evaluation_order(&self) -> &[BlockId] {
        &self.combinational
    }

    /// Sequential blocks in registration order.
    pub fn sequential_blocks(&self) -> &[BlockId] {
        &self.sequential
    }

    /// Returns a block.
    pub fn get(&self, id: BlockId) -> &Block {
        self.blocks.get(id)
    }

    /// Number of registered blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` if no block is registered.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The block recorded as the driver of `signal`, if any.
    pub fn driver_of(&self, signal: SignalId) -> Option<BlockId> {
        self.drivers.driver_of(signal)
    }

    /// The recorded writer of `signal`, including stimulus.
    pub fn driver(&self, signal: SignalId) -> Option<Driver> {
        self.drivers.driver(signal)
    }

    /// Records external stimulus on `signal`.
    ///
    /// A block that later writes the signal is a [`SimError::DriverConflict`].
    pub fn claim_stimulus(
        &mut self,
        signal: SignalId,
        graph: &SignalGraph,
    ) -> Result<(), SimError> {
        let Self {
            blocks, drivers, ..
        } = self;
        drivers.claim_stimulus(signal, blocks, graph)
    }

    /// Returns `true` if any block drives `signal` or declares that it will.
    pub fn is_driven(&self, signal: SignalId) -> bool {
        self.driver_of(signal).is_some()
            || self
                .blocks
                .values()
                .any(|b| b.declared_writes().is_some_and(|d| d.contains(&signal)))
    }

    /// Runs one combinational block against the wire view.
    pub fn run_combinational(
        &mut self,
        id: BlockId,
        graph: &mut SignalGraph,
        hierarchy: &Hierarchy,
    ) -> Result<(), SimError> {
        let Self {
            blocks, drivers, ..
        } = self;
        let blocks = &*blocks;
        let block = blocks.get(id);
        let BlockBody::Combinational(body) = &block.body else {
            return Ok(());
        };
        let module = hierarchy.get(block.module);
        let mut ctx = CombCtx::new(id, block, blocks, module, graph, drivers);
        body(&mut ctx)
    }

    /// Runs one sequential block against the register view.
    pub fn run_sequential(
        &mut self,
        id: BlockId,
        graph: &mut SignalGraph,
        hierarchy: &Hierarchy,
    ) -> Result<(), SimError> {
        let Self {
            blocks, drivers, ..
        } = self;
        let blocks = &*blocks;
        let block = blocks.get(id);
        let BlockBody::Sequential(body) = &block.body else {
            return Ok(());
        };
        trace!(block = %block.qualified, "sequential block fired");
        let module = hierarchy.get(block.module);
        let mut ctx = SeqCtx::new(id, block, blocks, module, graph, drivers);
        body(&mut ctx)
    }
}
