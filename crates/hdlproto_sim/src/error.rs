//! Simulation error types.
//!
//! All errors that can occur during design construction or simulation are
//! represented as variants of [`SimError`]. Access violations carry the
//! [`AccessRule`] that was broken so callers can match on the cause.

use std::fmt;
use std::io;

use hdlproto_config::ConfigError;

/// The phase or ownership rule an [`SimError::AccessViolation`] broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessRule {
    /// A Reg was written through the wire view.
    RegisterWrittenAsWire,
    /// A Wire was written through the register view.
    WireWrittenAsRegister,
    /// A wire write came from outside combinational execution.
    WireOutsideCombinational,
    /// A register write came from outside sequential execution.
    RegisterOutsideSequential,
    /// A module wrote a signal bound to one of its own Input ports.
    InputWrittenByOwner,
    /// The signal is neither owned by nor bound to the block's module.
    NotVisible,
    /// The block declared a write-set that does not contain the signal.
    UndeclaredWrite,
    /// A bit slice exceeded the signal width.
    BitRange {
        /// Requested most significant bit.
        msb: u32,
        /// Requested least significant bit.
        lsb: u32,
        /// Width of the signal.
        width: u32,
    },
    /// External stimulus targeted a Reg.
    StimulusOnRegister,
    /// External stimulus targeted a signal that a block drives.
    StimulusOnDrivenSignal,
}

impl fmt::Display for AccessRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RegisterWrittenAsWire => {
                f.write_str("a Reg can only be written through the register view")
            }
            Self::WireWrittenAsRegister => {
                f.write_str("a Wire can only be written through the wire view")
            }
            Self::WireOutsideCombinational => {
                f.write_str("wires may only be written by combinational blocks")
            }
            Self::RegisterOutsideSequential => {
                f.write_str("registers may only be written by sequential blocks")
            }
            Self::InputWrittenByOwner => {
                f.write_str("an Input port is read-only inside its own module")
            }
            Self::NotVisible => f.write_str("signal is not visible from this module"),
            Self::UndeclaredWrite => {
                f.write_str("signal is not in the block's declared write-set")
            }
            Self::BitRange { msb, lsb, width } => {
                write!(f, "bit range [{msb}:{lsb}] out of bounds for width {width}")
            }
            Self::StimulusOnRegister => f.write_str("stimulus cannot drive a Reg"),
            Self::StimulusOnDrivenSignal => {
                f.write_str("stimulus cannot drive a signal that has a block driver")
            }
        }
    }
}

/// Errors that can occur during design construction or simulation.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// A signal was accessed in a way its kind, phase, or scope forbids.
    #[error("access violation on '{signal}' by '{block}' in '{module}': {rule}")]
    AccessViolation {
        /// Hierarchical path of the signal.
        signal: String,
        /// Qualified name of the offending block (`module::block`).
        block: String,
        /// Path of the module the block belongs to.
        module: String,
        /// The violated rule.
        rule: AccessRule,
    },

    /// More than one writer drives the same signal.
    #[error("driver conflict on '{signal}': driven by {}", .blocks.join(" and "))]
    DriverConflict {
        /// Hierarchical path of the signal.
        signal: String,
        /// Qualified names of the competing blocks; testbench stimulus is
        /// reported as `<stimulus>`.
        blocks: Vec<String>,
    },

    /// The combinational network did not reach a fixed point.
    #[error(
        "combinational logic did not converge within {max_loops} passes (still changing: {})",
        .unstable.join(", ")
    )]
    ConvergenceFailure {
        /// The configured pass bound.
        max_loops: u32,
        /// Signals that changed during the final pass.
        unstable: Vec<String>,
    },

    /// Invalid clock binding, width, init value, name, or scenario.
    #[error("configuration error: {reason}")]
    Configuration {
        /// Description of what is misconfigured.
        reason: String,
    },

    /// A scenario assertion did not hold.
    #[error("assertion failed at step {step}: '{signal}' is {actual}, expected {expected}")]
    AssertionFailed {
        /// Hierarchical path of the checked signal.
        signal: String,
        /// Expected value.
        expected: u64,
        /// Observed value.
        actual: u64,
        /// Simulation step at which the check ran.
        step: u64,
    },

    /// A stepping call was made after a fatal error.
    #[error("simulation halted by an earlier error: {cause}")]
    Halted {
        /// Message of the error that halted the simulation.
        cause: String,
    },

    /// An I/O error occurred while writing waveform data.
    #[error("waveform I/O error: {0}")]
    WaveformIo(#[from] io::Error),
}

impl SimError {
    /// Shorthand for a [`SimError::Configuration`].
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors that move the simulator into its terminal
    /// error state.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AccessViolation { .. }
                | Self::DriverConflict { .. }
                | Self::ConvergenceFailure { .. }
        )
    }
}

impl From<ConfigError> for SimError {
    fn from(err: ConfigError) -> Self {
        Self::config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_violation_display() {
        let e = SimError::AccessViolation {
            signal: "tb.count".into(),
            block: "tb::decode".into(),
            module: "tb".into(),
            rule: AccessRule::RegisterWrittenAsWire,
        };
        assert_eq!(
            e.to_string(),
            "access violation on 'tb.count' by 'tb::decode' in 'tb': \
             a Reg can only be written through the register view"
        );
    }

    #[test]
    fn bit_range_rule_display() {
        let rule = AccessRule::BitRange {
            msb: 9,
            lsb: 2,
            width: 8,
        };
        assert_eq!(rule.to_string(), "bit range [9:2] out of bounds for width 8");
    }

    #[test]
    fn driver_conflict_display() {
        let e = SimError::DriverConflict {
            signal: "tb.y".into(),
            blocks: vec!["tb::first".into(), "tb::second".into()],
        };
        assert_eq!(
            e.to_string(),
            "driver conflict on 'tb.y': driven by tb::first and tb::second"
        );
    }

    #[test]
    fn convergence_failure_display() {
        let e = SimError::ConvergenceFailure {
            max_loops: 30,
            unstable: vec!["tb.a".into(), "tb.b".into()],
        };
        assert_eq!(
            e.to_string(),
            "combinational logic did not converge within 30 passes (still changing: tb.a, tb.b)"
        );
    }

    #[test]
    fn configuration_display() {
        let e = SimError::config("no clock configured");
        assert_eq!(e.to_string(), "configuration error: no clock configured");
    }

    #[test]
    fn assertion_failed_display() {
        let e = SimError::AssertionFailed {
            signal: "tb.out".into(),
            expected: 3,
            actual: 2,
            step: 8,
        };
        assert_eq!(
            e.to_string(),
            "assertion failed at step 8: 'tb.out' is 2, expected 3"
        );
    }

    #[test]
    fn fatal_classification() {
        assert!(SimError::DriverConflict {
            signal: String::new(),
            blocks: Vec::new()
        }
        .is_fatal());
        assert!(SimError::ConvergenceFailure {
            max_loops: 1,
            unstable: Vec::new()
        }
        .is_fatal());
        assert!(!SimError::config("x").is_fatal());
        assert!(!SimError::Halted { cause: "x".into() }.is_fatal());
    }

    #[test]
    fn config_error_converts() {
        let e: SimError = ConfigError::ValidationError("bad".into()).into();
        assert!(matches!(e, SimError::Configuration { .. }));
        assert!(e.to_string().contains("validation error: bad"));
    }

    #[test]
    fn waveform_io_display() {
        let e = SimError::WaveformIo(io::Error::new(io::ErrorKind::NotFound, "file not found"));
        assert!(e.to_string().contains("waveform I/O error"));
    }
}
