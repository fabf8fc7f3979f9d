//! Configuration types deserialized from `hdlproto.toml`.

use serde::Deserialize;
use std::path::PathBuf;

/// Stabilization pass bound used when the file does not set one.
pub const DEFAULT_MAX_COMB_LOOPS: u32 = 30;

/// The top-level configuration parsed from `hdlproto.toml`.
///
/// Every section is optional; an empty file yields the defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Scheduler settings.
    #[serde(default)]
    pub simulation: SimulationSection,
    /// Waveform dump settings.
    #[serde(default)]
    pub waveform: WaveformSection,
}

/// The `[simulation]` section.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationSection {
    /// Hierarchical path of the clock signal (e.g. `"tb.clk"`).
    #[serde(default)]
    pub clock: Option<String>,
    /// Maximum stabilization passes before reporting non-convergence.
    #[serde(default = "default_max_comb_loops")]
    pub max_comb_loops: u32,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            clock: None,
            max_comb_loops: DEFAULT_MAX_COMB_LOOPS,
        }
    }
}

fn default_max_comb_loops() -> u32 {
    DEFAULT_MAX_COMB_LOOPS
}

/// The `[waveform]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WaveformSection {
    /// Whether a VCD file is written at all.
    #[serde(default)]
    pub enabled: bool,
    /// Output path of the VCD file.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl FileConfig {
    /// Returns the waveform path if dumping is enabled.
    pub fn waveform_path(&self) -> Option<&PathBuf> {
        if self.waveform.enabled {
            self.waveform.path.as_ref()
        } else {
            None
        }
    }
}
