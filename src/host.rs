use serde::Serialize;
use thiserror::Error;
use tracing::trace;

use crate::command::{CommandRunner, ToolError};

// Columns requested from ps, the command line must stay last.
// start_time prints "HH:MM", "MmmDD" or "YYYY", never with a space
const PS_FORMAT: &str = "user,pid,pcpu,pmem,vsz,rss,tty,stat,start_time,etime,args";
const FIXED_FIELDS: usize = 10;

#[derive(Debug, Error)]
pub enum HostError {
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("Unexpected ps output for pid {pid}: {line:?}")]
    Malformed { pid: u32, line: String },
}

// Host side view of a process, as reported by ps
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostProcessInfo {
    pub owner_username: String,
    pub process_id: u32,
    pub cpu_percent: f32,
    pub mem_percent: f32,
    pub virtual_size_kib: u64,
    pub resident_size_kib: u64,
    pub terminal: String,
    pub state: String,
    pub start_time: String,
    pub elapsed_time: String,
    pub full_command_line: String,
}

// Resolve a pid to its host process information.
// `Ok(None)` means the process no longer exists
pub trait ProcessLookup {
    fn lookup(&self, pid: u32) -> Result<Option<HostProcessInfo>, HostError>;
}

// Looks processes up with one ps invocation per pid
pub struct PsLookup<'a, R: ?Sized> {
    runner: &'a R,
    program: &'a str,
}

impl<'a, R: CommandRunner + ?Sized> PsLookup<'a, R> {
    pub fn new(runner: &'a R, program: &'a str) -> Self {
        Self { runner, program }
    }
}

impl<R: CommandRunner + ?Sized> ProcessLookup for PsLookup<'_, R> {
    fn lookup(&self, pid: u32) -> Result<Option<HostProcessInfo>, HostError> {
        let pid_arg = pid.to_string();
        let output = self.runner.run(
            self.program,
            &["-ww", "-o", PS_FORMAT, "-p", pid_arg.as_str()],
        )?;

        // ps exits with an error when the pid is gone, the missing
        // data line is what tells it apart from a real failure
        let info = parse_ps_output(pid, &output.stdout)?;

        if info.is_none() {
            trace!("Process {pid} is gone (ps status {})", output.status);
        }

        Ok(info)
    }
}

/// Parse the output of a single pid ps query: one header line
/// followed by at most one data line.
pub fn parse_ps_output(
    pid: u32,
    output: &str,
) -> Result<Option<HostProcessInfo>, HostError> {
    let line = match output.lines().skip(1).find(|l| !l.trim().is_empty()) {
        Some(line) => line,
        None => return Ok(None),
    };

    let malformed = || HostError::Malformed {
        pid,
        line: line.to_string(),
    };

    let (fields, command) = split_fields(line, FIXED_FIELDS).ok_or_else(malformed)?;

    let process_id: u32 = fields[1].parse().map_err(|_| malformed())?;
    if process_id != pid {
        return Err(malformed());
    }

    // A start column split in two shifts every later field by one,
    // the elapsed time column is the one that shows it
    if !is_elapsed_time(fields[9]) {
        return Err(malformed());
    }

    Ok(Some(HostProcessInfo {
        owner_username: fields[0].to_string(),
        process_id,
        cpu_percent: fields[2].parse().map_err(|_| malformed())?,
        mem_percent: fields[3].parse().map_err(|_| malformed())?,
        virtual_size_kib: fields[4].parse().map_err(|_| malformed())?,
        resident_size_kib: fields[5].parse().map_err(|_| malformed())?,
        terminal: fields[6].to_string(),
        state: fields[7].to_string(),
        start_time: fields[8].to_string(),
        elapsed_time: fields[9].to_string(),
        full_command_line: command.to_string(),
    }))
}

// "[[dd-]hh:]mm:ss"
fn is_elapsed_time(field: &str) -> bool {
    field.contains(':')
        && field
            .chars()
            .all(|c| c.is_ascii_digit() || c == ':' || c == '-')
}

// Split off the first `count` whitespace separated fields and return
// them with the untouched remainder of the line
fn split_fields(line: &str, count: usize) -> Option<(Vec<&str>, &str)> {
    let mut fields = Vec::with_capacity(count);
    let mut rest = line.trim_start();

    while fields.len() < count {
        if rest.is_empty() {
            return None;
        }

        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        fields.push(&rest[..end]);
        rest = rest[end..].trim_start();
    }

    Some((fields, rest.trim_end()))
}
