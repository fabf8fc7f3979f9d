//! Signal bundles and directional views of them.
//!
//! An [`Interface`] is a named group of signals declared together by one
//! scope, such as the valid/ready/data lines of a handshake. Modules do not
//! receive the interface itself; they receive a [`Modport`], which assigns a
//! port direction to each member and is bound with
//! [`Scope::modport`](crate::Scope::modport).

use hdlproto_common::SignalId;

use crate::error::SimError;
use crate::hierarchy::PortDirection;
use crate::signal::{SignalKind, SignalSpec};

/// Declaration of an interface: its instance name and members.
///
/// ```
/// use hdlproto_sim::{InterfaceSpec, SignalSpec};
///
/// let spec = InterfaceSpec::new("bus")
///     .signal(SignalSpec::wire("valid", 1))
///     .array(SignalSpec::wire("data", 8), 4);
/// assert_eq!(spec.name, "bus");
/// ```
#[derive(Debug, Clone)]
pub struct InterfaceSpec {
    /// Instance name inside the declaring scope.
    pub name: String,
    pub(crate) members: Vec<(SignalSpec, Option<usize>)>,
}

impl InterfaceSpec {
    /// Starts an interface with no members.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
        }
    }

    /// Adds a scalar member.
    pub fn signal(mut self, spec: SignalSpec) -> Self {
        self.members.push((spec, None));
        self
    }

    /// Adds an array member of `count` elements named `name[i]`.
    pub fn array(mut self, spec: SignalSpec, count: usize) -> Self {
        self.members.push((spec, Some(count)));
        self
    }
}

/// One member of an interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceMember {
    /// Member name.
    pub name: String,
    /// Storage class shared by every element.
    pub kind: SignalKind,
    /// The member's signals; one element for a scalar member.
    pub signals: Vec<SignalId>,
    /// `true` if declared with [`InterfaceSpec::array`].
    pub is_array: bool,
}

/// A declared interface instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    path: String,
    members: Vec<InterfaceMember>,
}

impl Interface {
    pub(crate) fn new(path: String, members: Vec<InterfaceMember>) -> Self {
        Self { path, members }
    }

    /// Hierarchical path of the interface instance.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Members in declaration order.
    pub fn members(&self) -> &[InterfaceMember] {
        &self.members
    }

    fn member(&self, name: &str) -> Result<&InterfaceMember, SimError> {
        self.members.iter().find(|m| m.name == name).ok_or_else(|| {
            SimError::config(format!("interface '{}' has no member '{name}'", self.path))
        })
    }

    /// The signal of a scalar member.
    pub fn signal(&self, name: &str) -> Result<SignalId, SimError> {
        scalar(&self.path, self.member(name)?)
    }

    /// The signals of an array member.
    pub fn array(&self, name: &str) -> Result<&[SignalId], SimError> {
        array(&self.path, self.member(name)?)
    }

    /// Builds a directional view over some of the members.
    ///
    /// Every named member must exist, may appear once, and an output
    /// direction must match the member's kind.
    pub fn modport(&self, directions: &[(&str, PortDirection)]) -> Result<Modport, SimError> {
        let mut members: Vec<(PortDirection, InterfaceMember)> = Vec::new();
        for &(name, direction) in directions {
            if members.iter().any(|(_, m)| m.name == name) {
                return Err(SimError::config(format!(
                    "modport of '{}' lists '{name}' twice",
                    self.path
                )));
            }
            let member = self.member(name)?;
            let expected = match direction {
                PortDirection::Input => member.kind,
                PortDirection::OutputWire => SignalKind::Wire,
                PortDirection::OutputReg => SignalKind::Reg,
            };
            if expected != member.kind {
                return Err(SimError::config(format!(
                    "modport of '{}' declares '{name}' as {direction:?} but it is a {:?}",
                    self.path, member.kind
                )));
            }
            members.push((direction, member.clone()));
        }
        Ok(Modport {
            interface: self.path.clone(),
            members,
        })
    }
}

/// A directional view of an [`Interface`], handed to a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modport {
    interface: String,
    members: Vec<(PortDirection, InterfaceMember)>,
}

impl Modport {
    /// Path of the interface this view belongs to.
    pub fn interface(&self) -> &str {
        &self.interface
    }

    fn member(&self, name: &str) -> Result<&InterfaceMember, SimError> {
        self.members
            .iter()
            .map(|(_, m)| m)
            .find(|m| m.name == name)
            .ok_or_else(|| {
                SimError::config(format!(
                    "modport of '{}' has no member '{name}'",
                    self.interface
                ))
            })
    }

    /// Direction assigned to a member, if the view includes it.
    pub fn direction(&self, name: &str) -> Option<PortDirection> {
        self.members
            .iter()
            .find(|(_, m)| m.name == name)
            .map(|(d, _)| *d)
    }

    /// The signal of a scalar member.
    pub fn signal(&self, name: &str) -> Result<SignalId, SimError> {
        scalar(&self.interface, self.member(name)?)
    }

    /// The signals of an array member.
    pub fn array(&self, name: &str) -> Result<&[SignalId], SimError> {
        array(&self.interface, self.member(name)?)
    }

    /// Port name, direction and signal for every element, in view order.
    pub(crate) fn ports(&self, group: &str) -> Vec<(String, PortDirection, SignalId)> {
        let mut ports = Vec::new();
        for (direction, member) in &self.members {
            for (i, &signal) in member.signals.iter().enumerate() {
                let name = if member.is_array {
                    format!("{group}.{}[{i}]", member.name)
                } else {
                    format!("{group}.{}", member.name)
                };
                ports.push((name, *direction, signal));
            }
        }
        ports
    }
}

fn scalar(owner: &str, member: &InterfaceMember) -> Result<SignalId, SimError> {
    match member.signals.as_slice() {
        [signal] if !member.is_array => Ok(*signal),
        _ => Err(SimError::config(format!(
            "'{owner}.{}' is an array; use array()",
            member.name
        ))),
    }
}

fn array<'a>(owner: &str, member: &'a InterfaceMember) -> Result<&'a [SignalId], SimError> {
    if !member.is_array {
        return Err(SimError::config(format!(
            "'{owner}.{}' is not an array",
            member.name
        )));
    }
    Ok(&member.signals)
}
