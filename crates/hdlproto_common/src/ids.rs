//! Opaque ID newtypes for simulation entities.
//!
//! Each ID is a thin `u32` wrapper that is `Copy`, `Hash`, and `Serialize`/`Deserialize`.
//! A [`SignalId`] is the handle through which every port, trigger, and block
//! refers to a signal; handing out the ID never duplicates the signal.

use crate::arena::ArenaId;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
        pub struct $name(u32);

        impl $name {
            /// Creates an ID from a raw `u32` index.
            pub fn from_raw(index: u32) -> Self {
                Self(index)
            }

            /// Returns the raw `u32` index.
            pub fn as_raw(self) -> u32 {
                self.0
            }
        }

        impl ArenaId for $name {
            fn from_raw(index: u32) -> Self {
                Self(index)
            }

            fn as_raw(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_id!(
    /// Opaque, copyable handle for a signal in the simulation's signal graph.
    SignalId,
    "s"
);

define_id!(
    /// Opaque, copyable ID for a module instance in the hierarchy.
    ModuleId,
    "m"
);

define_id!(
    /// Opaque, copyable ID for a combinational or sequential logic block.
    BlockId,
    "b"
);
