//! Shared foundational types for the hdlproto simulator.
//!
//! This crate provides dense ID-indexed storage ([`Arena`]), the opaque ID
//! newtypes used to address signals, modules, and logic blocks, and the
//! fixed-width bit arithmetic every signal value goes through.

#![warn(missing_docs)]

pub mod arena;
pub mod bits;
pub mod ids;

pub use arena::{Arena, ArenaId};
pub use bits::{BitRangeError, MAX_WIDTH};
pub use ids::{BlockId, ModuleId, SignalId};
