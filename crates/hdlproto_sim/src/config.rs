//! Runtime simulator configuration.

use std::path::{Path, PathBuf};

use hdlproto_common::SignalId;
use hdlproto_config::{load_config, FileConfig, DEFAULT_MAX_COMB_LOOPS};

use crate::design::Design;
use crate::error::SimError;

/// Options the [`Simulator`](crate::Simulator) is built with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimConfig {
    /// Signal driven by `clock()` and `half_clock()`.
    pub clock: Option<SignalId>,
    /// Maximum stabilization passes per settle.
    pub max_comb_loops: u32,
    /// Where to write a VCD dump, if anywhere.
    pub waveform_path: Option<PathBuf>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            clock: None,
            max_comb_loops: DEFAULT_MAX_COMB_LOOPS,
            waveform_path: None,
        }
    }
}

impl SimConfig {
    /// Sets the clock signal.
    pub fn with_clock(mut self, clock: SignalId) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the stabilization pass bound.
    pub fn with_max_comb_loops(mut self, max: u32) -> Self {
        self.max_comb_loops = max;
        self
    }

    /// Enables VCD output to `path`.
    pub fn with_waveform(mut self, path: impl Into<PathBuf>) -> Self {
        self.waveform_path = Some(path.into());
        self
    }

    /// Resolves a parsed `hdlproto.toml` against a built design.
    ///
    /// The clock path must name an existing signal.
    pub fn from_file_config(file: &FileConfig, design: &Design) -> Result<Self, SimError> {
        let clock = match &file.simulation.clock {
            Some(path) => Some(design.find_signal(path).ok_or_else(|| {
                SimError::config(format!("clock signal '{path}' not found in design"))
            })?),
            None => None,
        };
        Ok(Self {
            clock,
            max_comb_loops: file.simulation.max_comb_loops,
            waveform_path: file.waveform_path().cloned(),
        })
    }

    /// Loads `hdlproto.toml` from `project_dir` and resolves it.
    pub fn load(project_dir: &Path, design: &Design) -> Result<Self, SimError> {
        let file = load_config(project_dir)?;
        Self::from_file_config(&file, design)
    }
}
