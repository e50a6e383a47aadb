//! Process table of the plain `nvidia-smi` report.
//!
//! The table grew two columns (GPU instance and compute instance ids)
//! when MIG support arrived, so rows are matched against a layout table
//! keyed by their token count. Rows matching no layout are not errors:
//! the table also carries "No running processes found" and similar
//! lines.

use serde::Serialize;
use tracing::debug;

use super::{RowError, value};

const TABLE_START: &str = "|=";
const TABLE_END: &str = "+-";

// One row of the nvidia-smi process table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessGpuRecord {
    pub device_index: u32,
    pub process_id: u32,
    pub process_type: String,
    pub process_name: String,
    pub gpu_memory_mib: Option<u32>,

    // Only reported by MIG aware drivers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_instance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compute_instance: Option<String>,
}

// Token positions of a process row, the "|" delimiters included
struct ProcessLayout {
    columns: usize,
    device: usize,
    instances: Option<(usize, usize)>,
    pid: usize,
    kind: usize,
    name: usize,
    memory: usize,
}

const PROCESS_LAYOUTS: &[ProcessLayout] = &[
    // |    0     12345    C   python                            1024MiB |
    ProcessLayout {
        columns: 7,
        device: 1,
        instances: None,
        pid: 2,
        kind: 3,
        name: 4,
        memory: 5,
    },
    // |    0   N/A  N/A     12345      C   python               1024MiB |
    ProcessLayout {
        columns: 9,
        device: 1,
        instances: Some((2, 3)),
        pid: 4,
        kind: 5,
        name: 6,
        memory: 7,
    },
];

/// Parse the text that follows the process section marker.
pub fn parse_process_table(block: &str) -> Vec<ProcessGpuRecord> {
    let rows = block
        .lines()
        .skip_while(|line| !line.starts_with(TABLE_START))
        .skip(1)
        .take_while(|line| !line.starts_with(TABLE_END));

    rows.filter_map(|line| match parse_process_row(line) {
        Ok(record) => Some(record),
        Err(err) => {
            debug!("Skipping process row {line:?}: {err}");
            None
        }
    })
    .collect()
}

pub fn parse_process_row(line: &str) -> Result<ProcessGpuRecord, RowError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    let layout = PROCESS_LAYOUTS
        .iter()
        .find(|layout| layout.columns == tokens.len())
        .ok_or(RowError::Layout(tokens.len()))?;

    if tokens.first() != Some(&"|") || tokens.last() != Some(&"|") {
        return Err(RowError::NotARow);
    }

    let device_index = number(tokens[layout.device], "device index")?;
    let process_id = number(tokens[layout.pid], "pid")?;

    let (gpu_instance, compute_instance) = match layout.instances {
        Some((gi, ci)) => (value::text(tokens[gi]), value::text(tokens[ci])),
        None => (None, None),
    };

    Ok(ProcessGpuRecord {
        device_index,
        process_id,
        process_type: tokens[layout.kind].to_string(),
        process_name: tokens[layout.name].to_string(),
        gpu_memory_mib: value::reading(tokens[layout.memory], "MiB"),
        gpu_instance,
        compute_instance,
    })
}

fn number(token: &str, field: &'static str) -> Result<u32, RowError> {
    token.parse().map_err(|_| RowError::Field {
        field,
        value: token.to_string(),
    })
}
