use std::{
    fs,
    io,
    path::{Path, PathBuf},
    process::Command,
};

use thiserror::Error;
use tracing::trace;

// File names used by the replay runner, one per nvidia-smi invocation
pub const REPLAY_LIST_FILE: &str = "nvidia-smi-L.txt";
pub const REPLAY_REPORT_FILE: &str = "nvidia-smi.txt";

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Failed to run \"{program}\": {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("\"{program}\" exited with status {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("\"{program}\" reported an error: {stderr}")]
    ErrorStream { program: String, stderr: String },
}

// Everything a finished external command left behind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub status: String,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    // A successful run with the given standard output
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            status: "0".to_string(),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    // Return the standard output only if the command exited cleanly
    // and left its error stream empty
    pub fn into_clean_stdout(self, program: &str) -> Result<String, ToolError> {
        if !self.success {
            return Err(ToolError::Failed {
                program: program.to_string(),
                status: self.status,
                stderr: self.stderr.trim().to_string(),
            });
        }

        if !self.stderr.trim().is_empty() {
            return Err(ToolError::ErrorStream {
                program: program.to_string(),
                stderr: self.stderr.trim().to_string(),
            });
        }

        Ok(self.stdout)
    }
}

// Invoke an external tool and collect its output.
// Only spawning failures are errors here, exit status
// and error stream are left for the caller to judge
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ToolError>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for Box<T> {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ToolError> {
        (**self).run(program, args)
    }
}

// Runs the tools found on PATH
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ToolError> {
        trace!("Running {program} {args:?}");

        let output = Command::new(program).args(args).output().map_err(
            |source| ToolError::Spawn {
                program: program.to_string(),
                source,
            },
        )?;

        let status = match output.status.code() {
            Some(code) => code.to_string(),
            None => "killed by signal".to_string(),
        };

        Ok(CommandOutput {
            success: output.status.success(),
            status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Answers nvidia-smi queries from captured text files and hands
/// every other invocation to the wrapped runner.
///
/// `nvidia-smi -L` is read from [`REPLAY_LIST_FILE`] and plain
/// `nvidia-smi` from [`REPLAY_REPORT_FILE`], both inside `dir`.
pub struct ReplayRunner<R> {
    dir: PathBuf,
    smi_program: String,
    fallback: R,
}

impl<R: CommandRunner> ReplayRunner<R> {
    pub fn new(dir: &Path, smi_program: &str, fallback: R) -> Self {
        Self {
            dir: dir.to_path_buf(),
            smi_program: smi_program.to_string(),
            fallback,
        }
    }

    fn replay(&self, program: &str, file: &str) -> Result<CommandOutput, ToolError> {
        let path = self.dir.join(file);
        trace!("Replaying {program} from {path:?}");

        fs::read_to_string(&path)
            .map(CommandOutput::ok)
            .map_err(|source| ToolError::Spawn {
                program: format!("{program} (replay of {})", path.display()),
                source,
            })
    }
}

impl<R: CommandRunner> CommandRunner for ReplayRunner<R> {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ToolError> {
        if program != self.smi_program {
            return self.fallback.run(program, args);
        }

        match args {
            ["-L"] => self.replay(program, REPLAY_LIST_FILE),
            [] => self.replay(program, REPLAY_REPORT_FILE),
            _ => self.fallback.run(program, args),
        }
    }
}
