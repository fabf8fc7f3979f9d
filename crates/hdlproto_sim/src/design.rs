//! Design construction.
//!
//! A [`Design`] collects the signal graph, module tree and block registry
//! while user modules build themselves through a [`Scope`]. The finished
//! design is handed to [`Simulator::new`](crate::Simulator::new).

use hdlproto_common::{BlockId, ModuleId, SignalId};
use tracing::debug;

use crate::error::SimError;
use crate::hierarchy::{Hierarchy, Module, PortDirection};
use crate::interface::{Interface, InterfaceMember, InterfaceSpec, Modport};
use crate::registry::{BlockRegistry, Trigger};
use crate::signal::{SignalGraph, SignalKind, SignalSpec};
use crate::view::{CombCtx, SeqCtx};

/// A design under construction: signals, modules and blocks.
#[derive(Debug)]
pub struct Design {
    pub(crate) graph: SignalGraph,
    pub(crate) hierarchy: Hierarchy,
    pub(crate) registry: BlockRegistry,
}

impl Design {
    /// Creates a design whose root (testbench) scope is named `top_name`.
    pub fn new(top_name: &str) -> Self {
        Self {
            graph: SignalGraph::new(),
            hierarchy: Hierarchy::new(top_name),
            registry: BlockRegistry::new(),
        }
    }

    /// Returns a builder for the root scope.
    pub fn top(&mut self) -> Scope<'_> {
        let module = self.hierarchy.top();
        Scope {
            design: self,
            module,
        }
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

    /// Looks a signal up by hierarchical path.
    pub fn find_signal(&self, path: &str) -> Option<SignalId> {
        self.graph.find(path)
    }
}

/// Builder handle for one module of a [`Design`].
pub struct Scope<'d> {
    design: &'d mut Design,
    module: ModuleId,
}

impl Scope<'_> {
    /// ID of the module being built.
    pub fn id(&self) -> ModuleId {
        self.module
    }

    /// Hierarchical path of the module being built.
    pub fn path(&self) -> &str {
        &self.design.hierarchy.get(self.module).path
    }

    /// Width of a signal visible to this module.
    pub fn width(&self, signal: SignalId) -> Result<u32, SimError> {
        self.check_visible(signal)?;
        Ok(self.design.graph.get(signal).width)
    }

    fn check_visible(&self, signal: SignalId) -> Result<(), SimError> {
        if self.design.graph.try_get(signal).is_none()
            || !self.design.hierarchy.get(self.module).is_visible(signal)
        {
            return Err(SimError::config(format!(
                "signal {signal} is not visible in '{}'",
                self.path()
            )));
        }
        Ok(())
    }

    fn create(&mut self, owner: ModuleId, spec: SignalSpec) -> Result<SignalId, SimError> {
        let name = spec.name.clone();
        self.design.hierarchy.check_name(owner, &name)?;
        let path = self.design.hierarchy.get(owner).path.clone();
        let id = self.design.graph.create(owner, &path, spec)?;
        self.design.hierarchy.add_signal(owner, &name, id)?;
        Ok(id)
    }

    /// Declares a signal owned by this module.
    pub fn signal(&mut self, spec: SignalSpec) -> Result<SignalId, SimError> {
        self.create(self.module, spec)
    }

    /// Declares a zero-initialized Wire.
    pub fn wire(&mut self, name: &str, width: u32) -> Result<SignalId, SimError> {
        self.signal(SignalSpec::wire(name, width))
    }

    /// Declares a Reg with an initial value.
    pub fn reg(&mut self, name: &str, width: u32, init: u64) -> Result<SignalId, SimError> {
        self.signal(SignalSpec::reg(name, width).init(init))
    }

    /// Declares `count` Wires named `name[0]` .. `name[count-1]`.
    pub fn wire_array(
        &mut self,
        name: &str,
        count: usize,
        width: u32,
    ) -> Result<Vec<SignalId>, SimError> {
        (0..count)
            .map(|i| self.signal(SignalSpec::wire(format!("{name}[{i}]"), width)))
            .collect()
    }

    /// Declares `count` Regs named `name[i]`.
    ///
    /// `init` supplies one value per element, or a single value shared by
    /// every element; an empty slice means zero.
    pub fn reg_array(
        &mut self,
        name: &str,
        count: usize,
        width: u32,
        init: &[u64],
    ) -> Result<Vec<SignalId>, SimError> {
        let init_at = |i: usize| -> Result<u64, SimError> {
            match init.len() {
                0 => Ok(0),
                1 => Ok(init[0]),
                n if n == count => Ok(init[i]),
                n => Err(SimError::config(format!(
                    "array '{name}' has {count} elements but {n} init values"
                ))),
            }
        };
        (0..count)
            .map(|i| {
                let spec = SignalSpec::reg(format!("{name}[{i}]"), width).init(init_at(i)?);
                self.signal(spec)
            })
            .collect()
    }

    /// Binds an Input port to a signal of the parent scope.
    ///
    /// Returns the same handle; the module reads the parent's signal.
    pub fn input(&mut self, name: &str, signal: SignalId) -> Result<SignalId, SimError> {
        self.bind(name, PortDirection::Input, signal)
    }

    /// Binds an Output port to a parent Wire, to be driven combinationally.
    pub fn output(&mut self, name: &str, signal: SignalId) -> Result<SignalId, SimError> {
        self.bind(name, PortDirection::OutputWire, signal)
    }

    /// Binds an Output port to a parent Reg, to be driven sequentially.
    pub fn output_reg(&mut self, name: &str, signal: SignalId) -> Result<SignalId, SimError> {
        self.bind(name, PortDirection::OutputReg, signal)
    }

    fn check_port_kind(
        &self,
        name: &str,
        direction: PortDirection,
        signal: SignalId,
    ) -> Result<(), SimError> {
        let Some(state) = self.design.graph.try_get(signal) else {
            return Err(SimError::config(format!(
                "port '{}.{name}' is bound to unknown signal {signal}",
                self.path()
            )));
        };
        let expected = match direction {
            PortDirection::Input => None,
            PortDirection::OutputWire => Some(SignalKind::Wire),
            PortDirection::OutputReg => Some(SignalKind::Reg),
        };
        if let Some(kind) = expected.filter(|k| *k != state.kind) {
            return Err(SimError::config(format!(
                "port '{}.{name}' expects a {kind:?} but '{}' is a {:?}",
                self.path(),
                state.path,
                state.kind
            )));
        }
        Ok(())
    }

    fn bind(
        &mut self,
        name: &str,
        direction: PortDirection,
        signal: SignalId,
    ) -> Result<SignalId, SimError> {
        self.check_port_kind(name, direction, signal)?;
        self.design
            .hierarchy
            .bind_port(self.module, name, direction, signal)?;
        Ok(signal)
    }

    /// Declares an interface instance owned by this module.
    ///
    /// The interface becomes a child scope holding its members; the members
    /// are also visible here, so this module can read them, drive them, or
    /// pass [`Modport`] views of them to children.
    pub fn interface(&mut self, spec: InterfaceSpec) -> Result<Interface, SimError> {
        let node = self.design.hierarchy.add_child(self.module, &spec.name)?;
        let mut members = Vec::with_capacity(spec.members.len());
        for (member, count) in spec.members {
            let name = member.name.clone();
            let kind = member.kind;
            let signals = match count {
                None => vec![self.create(node, member)?],
                Some(count) => (0..count)
                    .map(|i| {
                        let element = SignalSpec {
                            name: format!("{name}[{i}]"),
                            ..member.clone()
                        };
                        self.create(node, element)
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            };
            for &signal in &signals {
                self.design.hierarchy.expose(self.module, signal);
            }
            members.push(InterfaceMember {
                name,
                kind,
                signals,
                is_array: count.is_some(),
            });
        }
        let path = self.design.hierarchy.get(node).path.clone();
        debug!(path = %path, members = members.len(), "interface declared");
        Ok(Interface::new(path, members))
    }

    /// Binds every member of `modport` as a port of this module.
    ///
    /// Ports are named `group.member` (`group.member[i]` for array elements);
    /// the handles are read back through [`Modport::signal`] and
    /// [`Modport::array`].
    pub fn modport(&mut self, group: &str, modport: &Modport) -> Result<(), SimError> {
        let ports = modport.ports(group);
        for (name, direction, signal) in &ports {
            self.check_port_kind(name, *direction, *signal)?;
        }
        self.design
            .hierarchy
            .bind_port_group(self.module, group, ports)
    }

    /// Fails unless `signal` is `width` bits wide.
    pub fn expect_width(&self, signal: SignalId, width: u32) -> Result<(), SimError> {
        let actual = self.width(signal)?;
        if actual != width {
            return Err(SimError::config(format!(
                "'{}' is {actual} bits wide, '{}' expects {width}",
                self.design.graph.get(signal).path,
                self.path()
            )));
        }
        Ok(())
    }

    /// Registers a combinational block.
    pub fn always_comb<F>(&mut self, name: &str, body: F) -> Result<BlockId, SimError>
    where
        F: Fn(&mut CombCtx<'_>) -> Result<(), SimError> + 'static,
    {
        self.design
            .hierarchy
            .get_mut(self.module)
            .claim_block_name(name)?;
        let id = self.design.registry.register_combinational(
            self.module,
            self.design.hierarchy.get(self.module),
            name,
            Box::new(body),
        );
        self.design.hierarchy.get_mut(self.module).blocks.push(id);
        Ok(id)
    }

    /// Registers a sequential block fired by any of `triggers`.
    pub fn always_ff<F>(
        &mut self,
        name: &str,
        triggers: impl IntoIterator<Item = Trigger>,
        body: F,
    ) -> Result<BlockId, SimError>
    where
        F: Fn(&mut SeqCtx<'_>) -> Result<(), SimError> + 'static,
    {
        self.design
            .hierarchy
            .get_mut(self.module)
            .claim_block_name(name)?;
        let id = self.design.registry.register_sequential(
            self.module,
            self.design.hierarchy.get(self.module),
            name,
            triggers.into_iter().collect(),
            Box::new(body),
        )?;
        self.design.hierarchy.get_mut(self.module).blocks.push(id);
        Ok(id)
    }

    /// Declares the signals a block of this module writes.
    ///
    /// Declared sets are checked when the simulator is built; a block with a
    /// declared set may write nothing outside it.
    pub fn drives(&mut self, block: BlockId, signals: &[SignalId]) -> Result<(), SimError> {
        if !self.design.hierarchy.get(self.module).blocks.contains(&block) {
            return Err(SimError::config(format!(
                "block {block} does not belong to '{}'",
                self.path()
            )));
        }
        self.design.registry.declare_writes(block, signals);
        Ok(())
    }

    /// Instantiates a child module and builds it.
    pub fn instantiate(&mut self, name: &str, module: impl Module) -> Result<ModuleId, SimError> {
        let child = self.design.hierarchy.add_child(self.module, name)?;
        debug!(path = %self.design.hierarchy.get(child).path, "building module");
        let mut scope = Scope {
            design: &mut *self.design,
            module: child,
        };
        module.build(&mut scope)?;
        Ok(child)
    }
}
