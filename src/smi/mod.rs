pub mod device_table;
pub mod gpu_list;
pub mod process_table;
pub mod value;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace};

use crate::command::{CommandRunner, ToolError};

pub use device_table::DeviceRecord;
pub use gpu_list::GpuIdentity;
pub use process_table::ProcessGpuRecord;

// Separates the device table from the process table in the report
pub const PROCESS_MARKER: &str = "Processes:";

#[derive(Debug, Error)]
pub enum SmiError {
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("nvidia-smi did not list any GPU")]
    NoDevices,
    #[error("Unrecognized nvidia-smi report: {0}")]
    UnrecognizedReport(&'static str),
}

// Why a single table row was left out of a snapshot
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RowError {
    #[error("no layout with {0} columns")]
    Layout(usize),
    #[error("invalid {field}: {value:?}")]
    Field { field: &'static str, value: String },
    #[error("not a table row")]
    NotARow,
}

// Everything one nvidia-smi report says about the GPUs
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub devices: Vec<DeviceRecord>,
    pub processes: Vec<ProcessGpuRecord>,
}

impl Snapshot {
    pub fn device(&self, index: u32) -> Option<&DeviceRecord> {
        self.devices.iter().find(|d| d.device_index == index)
    }
}

/// Run `nvidia-smi -L` and parse the GPU identity listing.
///
/// The listing decides how many devices exist, so failing to obtain
/// it, or obtaining an empty one, is an error.
pub fn query_gpu_list<R: CommandRunner + ?Sized>(
    runner: &R,
    program: &str,
) -> Result<Vec<GpuIdentity>, SmiError> {
    let listing = runner.run(program, &["-L"])?.into_clean_stdout(program)?;

    let gpus = gpu_list::parse_gpu_list(&listing);
    if gpus.is_empty() {
        return Err(SmiError::NoDevices);
    }

    debug!("Found {} GPUs: {:?}", gpus.len(), gpus);

    Ok(gpus)
}

// Run plain nvidia-smi and parse its report
pub fn query_snapshot<R: CommandRunner + ?Sized>(
    runner: &R,
    program: &str,
    gpus: &[GpuIdentity],
) -> Result<Snapshot, SmiError> {
    let report = runner.run(program, &[])?.into_clean_stdout(program)?;

    parse_report(&report, gpus)
}

/// Parse a full nvidia-smi report.
///
/// Process rows that name a device missing from the device table
/// are dropped along with the other malformed rows.
pub fn parse_report(
    report: &str,
    gpus: &[GpuIdentity],
) -> Result<Snapshot, SmiError> {
    let (device_block, process_block) = match report.split_once(PROCESS_MARKER) {
        Some((devices, processes)) => (devices, processes),
        None => (report, ""),
    };

    let devices = device_table::parse_device_table(device_block, gpus)?;

    let processes = process_table::parse_process_table(process_block)
        .into_iter()
        .filter(|process| {
            let known = devices
                .iter()
                .any(|d| d.device_index == process.device_index);

            if !known {
                debug!(
                    "Dropping process {} on unknown device {}",
                    process.process_id, process.device_index
                );
            }

            known
        })
        .collect::<Vec<_>>();

    trace!(
        "Parsed {} devices and {} processes",
        devices.len(),
        processes.len()
    );

    Ok(Snapshot { devices, processes })
}
