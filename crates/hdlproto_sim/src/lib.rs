//! Cycle-based simulator for pre-RTL hardware models.
//!
//! A design is described as a tree of modules, each owning fixed-width
//! signals and registering combinational and sequential logic blocks. The
//! [`Simulator`] then runs the design step by step: combinational logic is
//! iterated to a fixed point, and sequential blocks fire on clock edges with
//! non-blocking register semantics.
//!
//! # Architecture
//!
//! - [`SignalGraph`] stores every signal once; ports bind the same [`SignalId`].
//! - [`Hierarchy`] is the module tree with port bindings.
//! - [`Interface`] bundles signals; a [`Modport`] binds them to a module with directions.
//! - [`BlockRegistry`] catalogs blocks and enforces one driver per signal.
//! - [`Simulator`] runs the settle / edge / commit protocol.
//!
//! # Usage
//!
//! ```
//! use hdlproto_sim::{simulate, Scope, SimConfig, SimError, Trigger};
//!
//! let mut sim = simulate(
//!     "tb",
//!     |tb: &mut Scope<'_>| -> Result<(), SimError> {
//!         let clk = tb.wire("clk", 1)?;
//!         let count = tb.reg("count", 4, 0)?;
//!         tb.always_ff("count_up", [Trigger::rising(clk)], move |c| {
//!             let v = c.get(count)?;
//!             c.set_next(count, v + 1)
//!         })?;
//!         Ok(())
//!     },
//!     |design| {
//!         let clk = design.find_signal("tb.clk").ok_or_else(|| SimError::config("no clk"))?;
//!         Ok(SimConfig::default().with_clock(clk))
//!     },
//! )?;
//! sim.clocks(3)?;
//! let count = sim.find_signal("tb.count").unwrap();
//! assert_eq!(sim.read(count), 3);
//! # Ok::<(), SimError>(())
//! ```
//!
//! # Modules
//!
//! - `error`: Error taxonomy and access rules
//! - `signal`: Signal storage with wire and register write paths
//! - `hierarchy`: Module tree and port bindings
//! - `design`: Construction-time builder scopes
//! - `interface`: Signal bundles and modport views
//! - `registry`: Logic blocks, triggers, and driver tracking
//! - `view`: Wire and register views handed to block bodies
//! - `kernel`: The scheduler
//! - `config`: Runtime configuration and `hdlproto.toml` resolution
//! - `testcase`: Named scenarios
//! - `waveform`: VCD recording

#![warn(missing_docs)]

pub mod config;
pub mod design;
pub mod error;
pub mod hierarchy;
pub mod interface;
pub mod kernel;
pub mod registry;
pub mod signal;
pub mod testcase;
pub mod view;
pub mod waveform;

pub use config::SimConfig;
pub use design::{Design, Scope};
pub use error::{AccessRule, SimError};
pub use hdlproto_common::{BlockId, ModuleId, SignalId};
pub use hierarchy::{Hierarchy, Module, ModuleNode, PortBinding, PortDirection};
pub use interface::{Interface, InterfaceMember, InterfaceSpec, Modport};
pub use kernel::{SimState, SimStats, Simulator};
pub use registry::{Block, BlockRegistry, Driver, Edge, Trigger, STIMULUS};
pub use signal::{SignalGraph, SignalKind, SignalRole, SignalSpec, SignalState};
pub use testcase::{TestcaseFn, TestcaseOutcome, TestcaseRegistry};
pub use view::{CombCtx, SeqCtx};
pub use waveform::{VcdRecorder, WaveformRecorder};

/// Builds a design whose root scope is populated by `testbench`, resolves
/// the configuration against it, and constructs the simulator.
pub fn simulate<M, C>(top_name: &str, testbench: M, config: C) -> Result<Simulator, SimError>
where
    M: Module,
    C: FnOnce(&Design) -> Result<SimConfig, SimError>,
{
    let mut design = Design::new(top_name);
    testbench.build(&mut design.top())?;
    let config = config(&design)?;
    Simulator::new(design, config)
}
