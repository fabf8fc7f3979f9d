//! Phase-restricted signal views handed to block bodies.
//!
//! A combinational block sees a [`CombCtx`] (the wire view) and a sequential
//! block sees a [`SeqCtx`] (the register view). Both check visibility, own
//! Input ports, and declared write-sets before touching the signal graph,
//! and both record the writing block in the driver table.

use hdlproto_common::{bits, Arena, BitRangeError, BlockId, SignalId};

use crate::error::{AccessRule, SimError};
use crate::hierarchy::ModuleNode;
use crate::registry::{Block, DriverTable};
use crate::signal::{SignalGraph, Writer};

struct Access<'a> {
    id: BlockId,
    block: &'a Block,
    blocks: &'a Arena<BlockId, Block>,
    module: &'a ModuleNode,
    graph: &'a mut SignalGraph,
    drivers: &'a mut DriverTable,
}

impl<'a> Access<'a> {
    fn writer(&self) -> Writer<'a> {
        let block: &'a Block = self.block;
        let module: &'a ModuleNode = self.module;
        Writer {
            block: &block.qualified,
            module: &module.path,
            phase: block.phase(),
        }
    }

    fn violation(&self, signal: SignalId, rule: AccessRule) -> SimError {
        self.writer().violation(self.graph.get(signal), rule)
    }

    fn check_read(&self, signal: SignalId) -> Result<(), SimError> {
        if self.graph.try_get(signal).is_none() {
            return Err(SimError::config(format!(
                "block '{}' used unknown signal {signal}",
                self.block.qualified
            )));
        }
        if !self.module.is_visible(signal) {
            return Err(self.violation(signal, AccessRule::NotVisible));
        }
        Ok(())
    }

    fn check_write(&self, signal: SignalId) -> Result<(), SimError> {
        self.check_read(signal)?;
        let own_input = self.graph.get(signal).is_input_of(self.block.module);
        if own_input || self.module.is_input(signal) {
            return Err(self.violation(signal, AccessRule::InputWrittenByOwner));
        }
        if !self.block.may_write(signal) {
            return Err(self.violation(signal, AccessRule::UndeclaredWrite));
        }
        Ok(())
    }

    fn claim(&mut self, signal: SignalId) -> Result<(), SimError> {
        self.drivers.claim(signal, self.id, self.blocks, self.graph)
    }

    fn range_error(&self, signal: SignalId, err: BitRangeError) -> SimError {
        self.violation(
            signal,
            AccessRule::BitRange {
                msb: err.msb,
                lsb: err.lsb,
                width: err.width,
            },
        )
    }

    fn read(&self, signal: SignalId) -> Result<u64, SimError> {
        self.check_read(signal)?;
        Ok(self.graph.value(signal))
    }

    fn read_bits(&self, signal: SignalId, msb: u32, lsb: u32) -> Result<u64, SimError> {
        let value = self.read(signal)?;
        let width = self.graph.get(signal).width;
        bits::read_bits(value, width, msb, lsb).map_err(|e| self.range_error(signal, e))
    }

    fn read_signed(&self, signal: SignalId) -> Result<i64, SimError> {
        let value = self.read(signal)?;
        Ok(bits::to_signed(value, self.graph.get(signal).width))
    }

    fn splice(
        &self,
        signal: SignalId,
        base: u64,
        msb: u32,
        lsb: u32,
        field: u64,
    ) -> Result<u64, SimError> {
        let width = self.graph.get(signal).width;
        bits::write_bits(base, width, msb, lsb, field).map_err(|e| self.range_error(signal, e))
    }
}

/// The wire view: what a combinational block can see and do.
///
/// Reads return values committed at the start of the current pass. Writes
/// are staged and become visible to every block on the next pass.
pub struct CombCtx<'a> {
    access: Access<'a>,
}

impl<'a> CombCtx<'a> {
    pub(crate) fn new(
        id: BlockId,
        block: &'a Block,
        blocks: &'a Arena<BlockId, Block>,
        module: &'a ModuleNode,
        graph: &'a mut SignalGraph,
        drivers: &'a mut DriverTable,
    ) -> Self {
        Self {
            access: Access {
                id,
                block,
                blocks,
                module,
                graph,
                drivers,
            },
        }
    }

    /// Reads a visible signal.
    pub fn get(&self, signal: SignalId) -> Result<u64, SimError> {
        self.access.read(signal)
    }

    /// Reads bits `[msb:lsb]` of a visible signal.
    pub fn get_bits(&self, signal: SignalId, msb: u32, lsb: u32) -> Result<u64, SimError> {
        self.access.read_bits(signal, msb, lsb)
    }

    /// Reads a visible signal as two's complement.
    pub fn get_signed(&self, signal: SignalId) -> Result<i64, SimError> {
        self.access.read_signed(signal)
    }

    /// Drives a Wire; the value is masked to the wire's width.
    pub fn set(&mut self, signal: SignalId, value: u64) -> Result<(), SimError> {
        self.access.check_write(signal)?;
        let by = self.access.writer();
        self.access.graph.write_wire(signal, value, by)?;
        self.access.claim(signal)
    }

    /// Drives bits `[msb:lsb]` of a Wire, keeping the other bits of this
    /// pass's staged value.
    pub fn set_bits(
        &mut self,
        signal: SignalId,
        msb: u32,
        lsb: u32,
        value: u64,
    ) -> Result<(), SimError> {
        self.access.check_write(signal)?;
        let base = self.access.graph.next_wire_value(signal);
        let merged = self.access.splice(signal, base, msb, lsb, value)?;
        self.set(signal, merged)
    }

    /// Drives a Wire with a two's complement value.
    pub fn set_signed(&mut self, signal: SignalId, value: i64) -> Result<(), SimError> {
        self.access.check_write(signal)?;
        let width = self.access.graph.get(signal).width;
        self.set(signal, bits::from_signed(value, width))
    }
}

/// The register view: what a sequential block can see and do.
///
/// Reads return pre-edge values. Writes are deferred until every block that
/// fired on the edge has run.
pub struct SeqCtx<'a> {
    access: Access<'a>,
}

impl<'a> SeqCtx<'a> {
    pub(crate) fn new(
        id: BlockId,
        block: &'a Block,
        blocks: &'a Arena<BlockId, Block>,
        module: &'a ModuleNode,
        graph: &'a mut SignalGraph,
        drivers: &'a mut DriverTable,
    ) -> Self {
        Self {
            access: Access {
                id,
                block,
                blocks,
                module,
                graph,
                drivers,
            },
        }
    }

    /// Reads the pre-edge value of a visible signal.
    pub fn get(&self, signal: SignalId) -> Result<u64, SimError> {
        self.access.read(signal)
    }

    /// Reads bits `[msb:lsb]` of a visible signal.
    pub fn get_bits(&self, signal: SignalId, msb: u32, lsb: u32) -> Result<u64, SimError> {
        self.access.read_bits(signal, msb, lsb)
    }

    /// Reads a visible signal as two's complement.
    pub fn get_signed(&self, signal: SignalId) -> Result<i64, SimError> {
        self.access.read_signed(signal)
    }

    /// Schedules the next value of a Reg.
    pub fn set_next(&mut self, signal: SignalId, value: u64) -> Result<(), SimError> {
        self.access.check_write(signal)?;
        let by = self.access.writer();
        self.access
            .graph
            .schedule_register_write(signal, value, by)?;
        self.access.claim(signal)
    }

    /// Schedules bits `[msb:lsb]` of a Reg, on top of any value already
    /// scheduled on this edge.
    pub fn set_next_bits(
        &mut self,
        signal: SignalId,
        msb: u32,
        lsb: u32,
        value: u64,
    ) -> Result<(), SimError> {
        self.access.check_write(signal)?;
        let base = self.access.graph.next_register_value(signal);
        let merged = self.access.splice(signal, base, msb, lsb, value)?;
        self.set_next(signal, merged)
    }

    /// Schedules a two's complement value on a Reg.
    pub fn set_next_signed(&mut self, signal: SignalId, value: i64) -> Result<(), SimError> {
        self.access.check_write(signal)?;
        let width = self.access.graph.get(signal).width;
        self.set_next(signal, bits::from_signed(value, width))
    }
}
