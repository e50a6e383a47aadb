use std::env;

use nix::unistd::{User, getuid};
use tracing::{debug, warn};

use crate::{
    command::CommandRunner,
    config::Config,
    render::{RenderOptions, terminal::terminal_width},
    smi::{GpuIdentity, SmiError, query_gpu_list},
};

/// Facts captured once at startup and shared by every refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub gpus: Vec<GpuIdentity>,
    pub username: Option<String>,
    pub width: usize,
}

impl Session {
    // Query the GPU list and read the user and terminal facts
    pub fn init<R: CommandRunner + ?Sized>(
        runner: &R,
        config: &Config,
    ) -> Result<Self, SmiError> {
        let gpus = query_gpu_list(runner, &config.nvidia_smi)?;

        let session = Self {
            gpus,
            username: current_username(),
            width: terminal_width(),
        };
        debug!("Session: {session:?}");

        Ok(session)
    }

    pub fn device_count(&self) -> usize {
        self.gpus.len()
    }

    pub fn device_indices(&self) -> Vec<u32> {
        self.gpus.iter().map(|gpu| gpu.index).collect()
    }

    pub fn render_options(&self, config: &Config) -> RenderOptions {
        RenderOptions {
            width: self.width,
            username: self.username.clone(),
            threshold: config.threshold,
            compact: config.compact,
            color: config.color,
        }
    }
}

// Name of the real user, used to highlight their processes
fn current_username() -> Option<String> {
    match User::from_uid(getuid()) {
        Ok(Some(user)) => Some(user.name),
        Ok(None) => env::var("USER").ok(),
        Err(err) => {
            warn!("Failed to read the user database: {err}");
            env::var("USER").ok()
        }
    }
}
