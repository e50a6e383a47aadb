use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{arg_parser::ArgsOptions, render::bar::DEFAULT_THRESHOLD};

pub const DEFAULT_NVIDIA_SMI: &str = "nvidia-smi";
pub const DEFAULT_PS: &str = "ps";

/// Monitor configuration.
///
/// Every key is optional in the JSON file, missing keys keep their
/// default value. Command line flags are applied on top with
/// [`Config::with_overrides`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub nvidia_smi: String,
    pub ps: String,

    // Fraction of a bar from which it turns red
    pub threshold: f64,

    // Live refresh period, one frame only when unset
    pub interval_secs: Option<f64>,

    pub compact: bool,
    pub color: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nvidia_smi: DEFAULT_NVIDIA_SMI.to_string(),
            ps: DEFAULT_PS.to_string(),
            threshold: DEFAULT_THRESHOLD,
            interval_secs: None,
            compact: false,
            color: true,
        }
    }
}

impl Config {
    // Read the configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| {
            format!("Failed to open configuration file {path:?}")
        })?;

        let config: Config = serde_json::from_reader(BufReader::new(file))
            .with_context(|| {
                format!("Failed to parse configuration file {path:?}")
            })?;

        debug!("Loaded configuration from {path:?}: {config:?}");

        Ok(config.validated())
    }

    // Apply the command line flags on top of the file values
    pub fn with_overrides(mut self, args: &ArgsOptions) -> Self {
        if args.compact {
            self.compact = true;
        }
        if args.no_color {
            self.color = false;
        }
        if args.interval.is_some() {
            self.interval_secs = args.interval;
        }

        self.validated()
    }

    fn validated(mut self) -> Self {
        if !(self.threshold > 0. && self.threshold <= 1.) {
            warn!(
                "Invalid threshold {}, using {DEFAULT_THRESHOLD}",
                self.threshold
            );
            self.threshold = DEFAULT_THRESHOLD;
        }

        if let Some(interval) = self.interval_secs {
            if !(interval.is_finite() && interval > 0.) {
                warn!("Invalid refresh interval {interval}, showing one frame");
                self.interval_secs = None;
            }
        }

        self
    }
}
