//! Module tree and port bindings.
//!
//! Each [`ModuleNode`] records the signals it owns, the parent signals bound
//! to its ports, its child instances, and its blocks. Port binding never
//! creates a signal: a port is a name for a [`SignalId`] owned further up.

use std::collections::HashSet;

use hdlproto_common::{Arena, BlockId, ModuleId, SignalId};

use crate::design::Scope;
use crate::error::SimError;

/// A user-defined hardware module.
///
/// The implementing value carries the signal handles its parent passes in;
/// `build` binds them to ports, declares owned signals, registers blocks and
/// instantiates children.
pub trait Module {
    /// Populates the module's scope.
    fn build(self, m: &mut Scope<'_>) -> Result<(), SimError>;
}

impl<F> Module for F
where
    F: FnOnce(&mut Scope<'_>) -> Result<(), SimError>,
{
    fn build(self, m: &mut Scope<'_>) -> Result<(), SimError> {
        self(m)
    }
}

/// Direction of a port as seen from inside the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    /// Read-only inside the module.
    Input,
    /// Driven by a combinational block of the module.
    OutputWire,
    /// Driven by a sequential block of the module.
    OutputReg,
}

/// A named port bound to a parent-visible signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    /// Port name, unique within the module.
    pub name: String,
    /// Port direction.
    pub direction: PortDirection,
    /// The bound signal, owned by an ancestor scope.
    pub signal: SignalId,
}

/// One node of the module tree.
#[derive(Debug, Clone)]
pub struct ModuleNode {
    /// Instance name.
    pub name: String,
    /// Hierarchical path (`parent.name`).
    pub path: String,
    /// Enclosing module, `None` for the testbench root.
    pub parent: Option<ModuleId>,
    /// Child instances in instantiation order.
    pub children: Vec<ModuleId>,
    /// Signals created by this module, in declaration order.
    pub signals: Vec<SignalId>,
    /// Port bindings in declaration order.
    pub ports: Vec<PortBinding>,
    /// Blocks registered by this module.
    pub blocks: Vec<BlockId>,
    names: HashSet<String>,
    block_names: HashSet<String>,
    visible: HashSet<SignalId>,
    inputs: HashSet<SignalId>,
}

impl ModuleNode {
    fn new(name: String, path: String, parent: Option<ModuleId>) -> Self {
        Self {
            name,
            path,
            parent,
            children: Vec::new(),
            signals: Vec::new(),
            ports: Vec::new(),
            blocks: Vec::new(),
            names: HashSet::new(),
            block_names: HashSet::new(),
            visible: HashSet::new(),
            inputs: HashSet::new(),
        }
    }

    /// Returns `true` if the signal is owned by or bound to this module.
    pub fn is_visible(&self, signal: SignalId) -> bool {
        self.visible.contains(&signal)
    }

    /// Returns `true` if the signal is bound to one of this module's Input ports.
    pub fn is_input(&self, signal: SignalId) -> bool {
        self.inputs.contains(&signal)
    }

    /// Looks up a port by name.
    pub fn port(&self, name: &str) -> Option<&PortBinding> {
        self.ports.iter().find(|p| p.name == name)
    }

    fn claim_name(&mut self, name: &str) -> Result<(), SimError> {
        if name.is_empty() || name.contains('.') {
            return Err(SimError::config(format!(
                "invalid name '{name}' in '{}'",
                self.path
            )));
        }
        if !self.names.insert(name.to_string()) {
            return Err(SimError::config(format!(
                "name '{name}' is already used in '{}'",
                self.path
            )));
        }
        Ok(())
    }

    pub(crate) fn claim_block_name(&mut self, name: &str) -> Result<(), SimError> {
        if !self.block_names.insert(name.to_string()) {
            return Err(SimError::config(format!(
                "block '{name}' is already defined in '{}'",
                self.path
            )));
        }
        Ok(())
    }
}

/// The module tree rooted at the testbench scope.
#[derive(Debug, Clone)]
pub struct Hierarchy {
    modules: Arena<ModuleId, ModuleNode>,
    top: ModuleId,
}

impl Hierarchy {
    /// Creates a hierarchy containing only the root scope.
    pub fn new(top_name: &str) -> Self {
        let mut modules = Arena::new();
        let top = modules.alloc(ModuleNode::new(
            top_name.to_string(),
            top_name.to_string(),
            None,
        ));
        Self { modules, top }
    }

    /// The root scope.
    pub fn top(&self) -> ModuleId {
        self.top
    }

    /// Returns a module node.
    pub fn get(&self, id: ModuleId) -> &ModuleNode {
        self.modules.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: ModuleId) -> &mut ModuleNode {
        self.modules.get_mut(id)
    }

    /// Number of modules including the root.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Always `false`; the root scope exists from construction.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Iterates modules in instantiation (pre-order) order.
    pub fn iter(&self) -> impl Iterator<Item = (ModuleId, &ModuleNode)> {
        self.modules.iter()
    }

    /// Looks a module up by hierarchical path.
    pub fn find(&self, path: &str) -> Option<ModuleId> {
        self.modules
            .iter()
            .find(|(_, m)| m.path == path)
            .map(|(id, _)| id)
    }

    /// Adds a child instance under `parent`.
    pub fn add_child(&mut self, parent: ModuleId, name: &str) -> Result<ModuleId, SimError> {
        let parent_node = self.modules.get_mut(parent);
        parent_node.claim_name(name)?;
        let path = format!("{}.{name}", parent_node.path);
        let id = self
            .modules
            .alloc(ModuleNode::new(name.to_string(), path, Some(parent)));
        self.modules.get_mut(parent).children.push(id);
        Ok(id)
    }

    /// Records a signal created by `module` under the local `name`.
    pub fn add_signal(
        &mut self,
        module: ModuleId,
        name: &str,
        signal: SignalId,
    ) -> Result<(), SimError> {
        let node = self.modules.get_mut(module);
        node.claim_name(name)?;
        node.signals.push(signal);
        node.visible.insert(signal);
        Ok(())
    }

    /// Checks that a signal-local name is free in `module` without claiming it.
    pub fn check_name(&self, module: ModuleId, name: &str) -> Result<(), SimError> {
        let node = self.modules.get(module);
        if name.is_empty() || name.contains('.') || node.names.contains(name) {
            return Err(SimError::config(format!(
                "name '{name}' is invalid or already used in '{}'",
                node.path
            )));
        }
        Ok(())
    }

    /// Makes a signal owned by a child (an interface instance) visible in
    /// `module` as well.
    pub(crate) fn expose(&mut self, module: ModuleId, signal: SignalId) {
        self.modules.get_mut(module).visible.insert(signal);
    }

    fn check_bindable(
        &self,
        module: ModuleId,
        name: &str,
        signal: SignalId,
    ) -> Result<(), SimError> {
        let node = self.modules.get(module);
        let Some(parent) = node.parent else {
            return Err(SimError::config(format!(
                "port '{name}' declared on root scope '{}'",
                node.path
            )));
        };
        if !self.modules.get(parent).is_visible(signal) {
            return Err(SimError::config(format!(
                "port '{}.{name}' is bound to a signal not visible in '{}'",
                node.path,
                self.modules.get(parent).path
            )));
        }
        Ok(())
    }

    fn attach(
        &mut self,
        module: ModuleId,
        name: String,
        direction: PortDirection,
        signal: SignalId,
    ) {
        let node = self.modules.get_mut(module);
        node.visible.insert(signal);
        if direction == PortDirection::Input {
            node.inputs.insert(signal);
        }
        node.ports.push(PortBinding {
            name,
            direction,
            signal,
        });
    }

    /// Binds a port of `module` to a signal visible in its parent.
    pub fn bind_port(
        &mut self,
        module: ModuleId,
        name: &str,
        direction: PortDirection,
        signal: SignalId,
    ) -> Result<(), SimError> {
        self.check_bindable(module, name, signal)?;
        self.modules.get_mut(module).claim_name(name)?;
        self.attach(module, name.to_string(), direction, signal);
        Ok(())
    }

    /// Binds a group of ports that share the prefix `group`, as produced by
    /// a modport. The group name is claimed once; nothing is bound if any
    /// signal is not visible in the parent.
    pub fn bind_port_group(
        &mut self,
        module: ModuleId,
        group: &str,
        ports: Vec<(String, PortDirection, SignalId)>,
    ) -> Result<(), SimError> {
        for (name, _, signal) in &ports {
            self.check_bindable(module, name, *signal)?;
        }
        self.modules.get_mut(module).claim_name(group)?;
        for (name, direction, signal) in ports {
            self.attach(module, name, direction, signal);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(raw: u32) -> SignalId {
        SignalId::from_raw(raw)
    }

    #[test]
    fn root_only() {
        let h = Hierarchy::new("tb");
        assert_eq!(h.len(), 1);
        assert_eq!(h.get(h.top()).path, "tb");
        assert!(h.get(h.top()).parent.is_none());
    }

    #[test]
    fn child_paths_nest() {
        let mut h = Hierarchy::new("tb");
        let top = h.top();
        let a = h.add_child(top, "alu").unwrap();
        let b = h.add_child(a, "adder").unwrap();
        assert_eq!(h.get(b).path, "tb.alu.adder");
        assert_eq!(h.get(top).children, vec![a]);
        assert_eq!(h.find("tb.alu.adder"), Some(b));
        assert_eq!(h.find("tb.nope"), None);
    }

    #[test]
    fn names_are_unique_per_module() {
        let mut h = Hierarchy::new("tb");
        let top = h.top();
        h.add_signal(top, "x", sig(0)).unwrap();
        assert!(h.add_child(top, "x").is_err());
        assert!(h.add_signal(top, "x", sig(1)).is_err());
        assert!(h.check_name(top, "y").is_ok());
        assert!(h.check_name(top, "x").is_err());
        assert!(h.check_name(top, "a.b").is_err());
    }

    #[test]
    fn port_binds_parent_signal() {
        let mut h = Hierarchy::new("tb");
        let top = h.top();
        h.add_signal(top, "a", sig(0)).unwrap();
        let child = h.add_child(top, "u0").unwrap();
        h.bind_port(child, "in_a", PortDirection::Input, sig(0))
            .unwrap();
        let node = h.get(child);
        assert!(node.is_visible(sig(0)));
        assert!(node.is_input(sig(0)));
        assert_eq!(node.port("in_a").map(|p| p.signal), Some(sig(0)));
    }

    #[test]
    fn port_rejects_invisible_signal() {
        let mut h = Hierarchy::new("tb");
        let top = h.top();
        let a = h.add_child(top, "a").unwrap();
        h.add_signal(a, "private", sig(0)).unwrap();
        let b = h.add_child(top, "b").unwrap();
        let err = h
            .bind_port(b, "p", PortDirection::Input, sig(0))
            .unwrap_err();
        assert!(matches!(err, SimError::Configuration { .. }));
    }

    #[test]
    fn root_has_no_ports() {
        let mut h = Hierarchy::new("tb");
        let top = h.top();
        h.add_signal(top, "a", sig(0)).unwrap();
        assert!(h
            .bind_port(top, "p", PortDirection::OutputWire, sig(0))
            .is_err());
    }

    #[test]
    fn exposed_signal_can_be_bound_below() {
        let mut h = Hierarchy::new("tb");
        let top = h.top();
        let bus = h.add_child(top, "bus").unwrap();
        h.add_signal(bus, "valid", sig(0)).unwrap();
        assert!(!h.get(top).is_visible(sig(0)));
        h.expose(top, sig(0));
        assert!(h.get(top).is_visible(sig(0)));
        let dev = h.add_child(top, "dev").unwrap();
        h.bind_port(dev, "valid", PortDirection::Input, sig(0))
            .unwrap();
    }

    #[test]
    fn port_group_claims_prefix_once() {
        let mut h = Hierarchy::new("tb");
        let top = h.top();
        h.add_signal(top, "a", sig(0)).unwrap();
        h.add_signal(top, "b", sig(1)).unwrap();
        let child = h.add_child(top, "u0").unwrap();
        h.bind_port_group(
            child,
            "bus",
            vec![
                ("bus.a".to_string(), PortDirection::Input, sig(0)),
                ("bus.b".to_string(), PortDirection::OutputWire, sig(1)),
            ],
        )
        .unwrap();
        let node = h.get(child);
        assert!(node.is_input(sig(0)));
        assert!(!node.is_input(sig(1)));
        assert_eq!(node.port("bus.b").map(|p| p.signal), Some(sig(1)));
        assert!(h.check_name(child, "bus").is_err());
        assert!(h.bind_port_group(child, "bus", Vec::new()).is_err());
    }

    #[test]
    fn port_group_is_all_or_nothing() {
        let mut h = Hierarchy::new("tb");
        let top = h.top();
        h.add_signal(top, "a", sig(0)).unwrap();
        let child = h.add_child(top, "u0").unwrap();
        let err = h
            .bind_port_group(
                child,
                "bus",
                vec![
                    ("bus.a".to_string(), PortDirection::Input, sig(0)),
                    ("bus.z".to_string(), PortDirection::Input, sig(7)),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, SimError::Configuration { .. }));
        assert!(h.get(child).ports.is_empty());
        assert!(h.check_name(child, "bus").is_ok());
    }
}
