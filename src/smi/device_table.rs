//! Device table of the plain `nvidia-smi` report.
//!
//! ```text
//! |===============================+======================+======================|
//! |   0  GeForce GTX 1080    Off  | 0000:02:00.0     Off |                  N/A |
//! | 27%   36C    P8    11W / 180W |      2MiB /  8113MiB |      0%      Default |
//! +-------------------------------+----------------------+----------------------+
//! ```
//!
//! Each device occupies a fixed number of lines closed by a `+---` border.
//! That number (the stride, border included) differs between driver
//! releases, MIG capable drivers add a third line per device, so it is
//! measured on the first device and applied to the whole table.
//!
//! Fields are located through the `|` column delimiters rather than by
//! token offsets from the start of the line: the device name in the
//! first column spans a variable number of tokens, so the persistence
//! mode is taken as the last token of that column. The delimiters have
//! not moved across driver releases, while token offsets counted from
//! the line start shift with every name.

use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use super::{RowError, SmiError, gpu_list::GpuIdentity, value};

const TABLE_START: &str = "|===";
const DEVICE_BORDER: &str = "+-";

const UNKNOWN_NAME: &str = "Unknown GPU";

// Operating parameters of one GPU, every `None` is a reading
// nvidia-smi could not provide
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceRecord {
    pub device_index: u32,
    pub name: String,
    pub uuid: Option<String>,

    pub fan_percent: Option<u32>,
    pub temperature_celsius: Option<u32>,
    pub performance_state: String,

    pub power_draw_watts: Option<u32>,
    pub power_cap_watts: Option<u32>,

    pub memory_used_mib: Option<u32>,
    pub memory_total_mib: Option<u32>,

    pub gpu_utilization_percent: Option<u32>,
    pub compute_mode: String,

    // Raw identity columns
    pub persistence_mode: Option<String>,
    pub bus_id: Option<String>,
    pub display_active: Option<String>,
    pub ecc_uncorrected: Option<String>,
}

impl DeviceRecord {
    pub fn utilization_ratio(&self) -> Option<f64> {
        self.gpu_utilization_percent.map(|v| f64::from(v) / 100.)
    }

    // Temperatures are shown against a 100C scale
    pub fn temperature_ratio(&self) -> Option<f64> {
        self.temperature_celsius.map(|v| f64::from(v) / 100.)
    }

    pub fn fan_ratio(&self) -> Option<f64> {
        self.fan_percent.map(|v| f64::from(v) / 100.)
    }

    pub fn power_ratio(&self) -> Option<f64> {
        ratio(self.power_draw_watts, self.power_cap_watts)
    }

    pub fn memory_ratio(&self) -> Option<f64> {
        ratio(self.memory_used_mib, self.memory_total_mib)
    }
}

fn ratio(used: Option<u32>, total: Option<u32>) -> Option<f64> {
    match (used, total) {
        (Some(used), Some(total)) if total > 0 => {
            Some(f64::from(used) / f64::from(total))
        }
        _ => None,
    }
}

// Token positions on the metrics line once the "|" delimiters
// and "/" separators are removed, `columns` is the minimum count
struct MetricsLayout {
    columns: usize,
    fan: usize,
    temperature: usize,
    performance: usize,
    power_draw: usize,
    power_cap: usize,
    memory_used: usize,
    memory_total: usize,
    utilization: usize,
    compute_mode: usize,
}

const METRICS_LAYOUTS: &[MetricsLayout] = &[MetricsLayout {
    columns: 9,
    fan: 0,
    temperature: 1,
    performance: 2,
    power_draw: 3,
    power_cap: 4,
    memory_used: 5,
    memory_total: 6,
    utilization: 7,
    compute_mode: 8,
}];

/// Parse the part of the report that precedes the process table.
///
/// Devices whose lines do not match the expected layout are skipped.
pub fn parse_device_table(
    block: &str,
    gpus: &[GpuIdentity],
) -> Result<Vec<DeviceRecord>, SmiError> {
    let lines: Vec<&str> = block.lines().collect();

    // Everything up to the "|===" line is preamble
    let start = lines
        .iter()
        .position(|line| line.starts_with(TABLE_START))
        .ok_or(SmiError::UnrecognizedReport("no device table found"))?;
    let rows = &lines[start + 1..];

    let stride = detect_stride(rows)?;

    // The table ends at the first line that is not part of the grid
    let table_len = rows
        .iter()
        .position(|line| !(line.starts_with('|') || line.starts_with('+')))
        .unwrap_or(rows.len());

    let mut seen = HashSet::new();
    let mut devices = Vec::new();

    for group in rows[..table_len].chunks_exact(stride) {
        match parse_device(group, gpus) {
            Ok(device) => {
                if seen.insert(device.device_index) {
                    devices.push(device);
                } else {
                    debug!("Skipping duplicate device {}", device.device_index);
                }
            }
            Err(err) => debug!("Skipping device entry {group:?}: {err}"),
        }
    }

    Ok(devices)
}

// Offset of the first device border, plus one
fn detect_stride(rows: &[&str]) -> Result<usize, SmiError> {
    let border = rows
        .iter()
        .position(|line| line.starts_with(DEVICE_BORDER))
        .ok_or(SmiError::UnrecognizedReport("device entries are not closed"))?;

    // A device needs at least the identity and the metrics lines
    if border < 2 {
        return Err(SmiError::UnrecognizedReport("device entries are too short"));
    }

    Ok(border + 1)
}

fn parse_device(
    group: &[&str],
    gpus: &[GpuIdentity],
) -> Result<DeviceRecord, RowError> {
    let (identity, metrics) = match group {
        [identity, metrics, .., border] if border.starts_with(DEVICE_BORDER) => {
            (*identity, *metrics)
        }
        _ => return Err(RowError::NotARow),
    };

    let mut device = DeviceRecord::default();
    parse_identity(identity, &mut device)?;
    parse_metrics(metrics, &mut device)?;

    // The listing position stands in for a listing that numbers its
    // entries differently from the table
    let identity = gpus
        .iter()
        .find(|gpu| gpu.index == device.device_index)
        .or_else(|| gpus.get(device.device_index as usize));

    match identity {
        Some(gpu) => {
            device.name = gpu.name.clone();
            device.uuid = gpu.uuid.clone();
        }
        None => device.name = UNKNOWN_NAME.to_string(),
    }

    Ok(device)
}

fn cells(line: &str) -> Vec<&str> {
    line.trim().trim_matches('|').split('|').collect()
}

// "|   0  GeForce GTX 1080    Off  | 0000:02:00.0     Off |   N/A |"
fn parse_identity(line: &str, device: &mut DeviceRecord) -> Result<(), RowError> {
    let cells = cells(line);
    if cells.len() < 3 {
        return Err(RowError::Layout(cells.len()));
    }

    let first: Vec<&str> = cells[0].split_whitespace().collect();
    let (index, persistence) = match first.as_slice() {
        [index, .., persistence] => (*index, *persistence),
        _ => return Err(RowError::Layout(first.len())),
    };

    device.device_index = index.parse().map_err(|_| RowError::Field {
        field: "device index",
        value: index.to_string(),
    })?;
    device.persistence_mode = value::text(persistence);

    let second: Vec<&str> = cells[1].split_whitespace().collect();
    device.bus_id = second.first().and_then(|t| value::text(t));
    if second.len() > 1 {
        device.display_active = second.last().and_then(|t| value::text(t));
    }

    device.ecc_uncorrected = value::text(cells[2]);

    Ok(())
}

// "| 27%   36C    P8    11W / 180W |      2MiB /  8113MiB |      0%      Default |"
fn parse_metrics(line: &str, device: &mut DeviceRecord) -> Result<(), RowError> {
    let tokens: Vec<&str> = line
        .split('|')
        .flat_map(str::split_whitespace)
        .filter(|token| *token != "/")
        .collect();

    // The compute mode closes the line and may hold a space ("E. Process")
    let layout = METRICS_LAYOUTS
        .iter()
        .find(|layout| tokens.len() >= layout.columns)
        .ok_or(RowError::Layout(tokens.len()))?;

    device.fan_percent = value::reading(tokens[layout.fan], "%");
    device.temperature_celsius = value::reading(tokens[layout.temperature], "C");
    device.performance_state = tokens[layout.performance].to_string();
    device.power_draw_watts = value::reading(tokens[layout.power_draw], "W");
    device.power_cap_watts = value::reading(tokens[layout.power_cap], "W");
    device.memory_used_mib = value::reading(tokens[layout.memory_used], "MiB");
    device.memory_total_mib = value::reading(tokens[layout.memory_total], "MiB");
    device.gpu_utilization_percent =
        value::reading(tokens[layout.utilization], "%");
    device.compute_mode = tokens[layout.compute_mode..].join(" ");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_LINE_TABLE: &str = "\
+-----------------------------------------------------------------------------+
| NVIDIA-SMI 375.39                 Driver Version: 375.39                    |
|-------------------------------+----------------------+----------------------+
| GPU  Name        Persistence-M| Bus-Id        Disp.A | Volatile Uncorr. ECC |
| Fan  Temp  Perf  Pwr:Usage/Cap|         Memory-Usage | GPU-Util  Compute M. |
|===============================+======================+======================|
|   0  GeForce GTX 1080    Off  | 0000:02:00.0     Off |                  N/A |
| 27%   36C    P8    11W / 180W |      2MiB /  8113MiB |      0%      Default |
+-------------------------------+----------------------+----------------------+
|   1  GeForce GTX 1080    On   | 0000:03:00.0      On |                    0 |
|  0%   32C    P2   250W / 250W |   8000MiB /  8113MiB |     97%   E. Process |
+-------------------------------+----------------------+----------------------+
|   2  Tesla K80           Off  | 0000:04:00.0     Off |                    0 |
| N/A   41C    P0    58W / 149W |   1024MiB / 11439MiB |     12%      Default |
+-------------------------------+----------------------+----------------------+

+-----------------------------------------------------------------------------+
| ";

    const MIG_TABLE: &str = "\
+-----------------------------------------------------------------------------+
| NVIDIA-SMI 470.57.02    Driver Version: 470.57.02    CUDA Version: 11.4     |
|-------------------------------+----------------------+----------------------+
| GPU  Name        Persistence-M| Bus-Id        Disp.A | Volatile Uncorr. ECC |
| Fan  Temp  Perf  Pwr:Usage/Cap|         Memory-Usage | GPU-Util  Compute M. |
|                               |                      |               MIG M. |
|===============================+======================+======================|
|   0  NVIDIA GeForce ...  Off  | 00000000:01:00.0  On |                  N/A |
| 30%   45C    P8    20W / 320W |    500MiB / 10014MiB |      3%      Default |
|                               |                      |                  N/A |
+-------------------------------+----------------------+----------------------+
|   1  NVIDIA A100-SXM...  On   | 00000000:41:00.0 Off |                    0 |
| N/A   33C    P0    43W / 400W |      0MiB / 40536MiB |      0%      Default |
|                               |                      |             Disabled |
+-------------------------------+----------------------+----------------------+
";

    fn gpus() -> Vec<GpuIdentity> {
        (0..3)
            .map(|index| GpuIdentity {
                index,
                name: format!("Card {index}"),
                uuid: None,
            })
            .collect()
    }

    #[test]
    fn stride_covers_the_border() {
        let rows = ["| a |", "| b |", "+---+", "| c |"];
        assert_eq!(detect_stride(&rows).unwrap(), 3);

        let rows = ["| a |", "| b |", "| c |", "+---+"];
        assert_eq!(detect_stride(&rows).unwrap(), 4);
    }

    #[test]
    fn stride_needs_a_border() {
        let rows = ["| a |", "| b |"];
        assert!(matches!(
            detect_stride(&rows),
            Err(SmiError::UnrecognizedReport(_))
        ));
    }

    #[test]
    fn two_line_entries() {
        let devices = parse_device_table(TWO_LINE_TABLE, &gpus()).unwrap();
        assert_eq!(devices.len(), 3);

        let first = &devices[0];
        assert_eq!(first.device_index, 0);
        assert_eq!(first.name, "Card 0");
        assert_eq!(first.fan_percent, Some(27));
        assert_eq!(first.temperature_celsius, Some(36));
        assert_eq!(first.performance_state, "P8");
        assert_eq!(first.power_draw_watts, Some(11));
        assert_eq!(first.power_cap_watts, Some(180));
        assert_eq!(first.memory_used_mib, Some(2));
        assert_eq!(first.memory_total_mib, Some(8113));
        assert_eq!(first.gpu_utilization_percent, Some(0));
        assert_eq!(first.compute_mode, "Default");
        assert_eq!(first.persistence_mode.as_deref(), Some("Off"));
        assert_eq!(first.bus_id.as_deref(), Some("0000:02:00.0"));
        assert_eq!(first.display_active.as_deref(), Some("Off"));
        assert_eq!(first.ecc_uncorrected, None);
    }

    #[test]
    fn zero_fan_is_not_unavailable_fan() {
        let devices = parse_device_table(TWO_LINE_TABLE, &gpus()).unwrap();

        assert_eq!(devices[1].fan_percent, Some(0));
        assert_eq!(devices[2].fan_percent, None);
        assert_eq!(devices[1].ecc_uncorrected.as_deref(), Some("0"));
    }

    #[test]
    fn compute_mode_keeps_its_spaces() {
        let devices = parse_device_table(TWO_LINE_TABLE, &gpus()).unwrap();

        assert_eq!(devices[1].compute_mode, "E. Process");
        assert_eq!(devices[1].gpu_utilization_percent, Some(97));
        assert_eq!(devices[1].power_ratio(), Some(1.0));
    }

    #[test]
    fn three_line_entries() {
        let devices = parse_device_table(MIG_TABLE, &gpus()).unwrap();
        assert_eq!(devices.len(), 2);

        assert_eq!(devices[0].memory_total_mib, Some(10014));
        assert_eq!(devices[0].bus_id.as_deref(), Some("00000000:01:00.0"));
        assert_eq!(devices[0].display_active.as_deref(), Some("On"));
        assert_eq!(devices[1].device_index, 1);
        assert_eq!(devices[1].persistence_mode.as_deref(), Some("On"));
        assert_eq!(devices[1].fan_percent, None);
        assert_eq!(devices[1].memory_used_mib, Some(0));
    }

    #[test]
    fn squashed_power_cap_is_parsed() {
        let table = "\
|===============================+======================+======================|
|   0  GeForce GTX 108...  Off  | 0000:02:00.0     Off |                  N/A |
| 23%   30C    P8    10W /  250W|      0MiB / 11178MiB |      0%      Default |
+-------------------------------+----------------------+----------------------+
";
        let devices = parse_device_table(table, &gpus()).unwrap();

        assert_eq!(devices[0].power_cap_watts, Some(250));
        assert_eq!(devices[0].memory_used_mib, Some(0));
    }

    #[test]
    fn malformed_entry_is_dropped() {
        let table = "\
|===============================+======================+======================|
|   0  GeForce GTX 1080    Off  | 0000:02:00.0     Off |                  N/A |
| 27%   36C    P8    11W / 180W |      2MiB /  8113MiB |      0%      Default |
+-------------------------------+----------------------+----------------------+
|   x  GeForce GTX 1080    Off  | 0000:03:00.0     Off |                  N/A |
| 27%   36C    P8    11W / 180W |      2MiB /  8113MiB |      0%      Default |
+-------------------------------+----------------------+----------------------+
|   2  GeForce GTX 1080    Off  | 0000:04:00.0     Off |                  N/A |
| 27%   36C    P8  |      2MiB /  8113MiB |      0%      Default |
+-------------------------------+----------------------+----------------------+
";
        let devices = parse_device_table(table, &gpus()).unwrap();

        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].device_index, 0);
    }

    #[test]
    fn unknown_index_gets_a_placeholder_name() {
        let devices = parse_device_table(TWO_LINE_TABLE, &[]).unwrap();
        assert_eq!(devices[0].name, UNKNOWN_NAME);
    }

    #[test]
    fn listing_position_is_the_name_fallback() {
        let renumbered = vec![
            GpuIdentity {
                index: 10,
                name: "First".to_string(),
                uuid: None,
            },
            GpuIdentity {
                index: 1,
                name: "Second".to_string(),
                uuid: None,
            },
        ];

        let devices = parse_device_table(TWO_LINE_TABLE, &renumbered).unwrap();

        assert_eq!(devices[0].name, "First");
        assert_eq!(devices[1].name, "Second");
        assert_eq!(devices[2].name, UNKNOWN_NAME);
    }

    #[test]
    fn missing_table_is_an_error() {
        let result = parse_device_table("NVIDIA-SMI has failed\n", &gpus());
        assert!(matches!(result, Err(SmiError::UnrecognizedReport(_))));
    }

    #[test]
    fn ratios_guard_unavailable_and_zero() {
        let device = DeviceRecord {
            power_draw_watts: Some(50),
            power_cap_watts: Some(0),
            memory_used_mib: Some(512),
            memory_total_mib: Some(2048),
            ..Default::default()
        };

        assert_eq!(device.power_ratio(), None);
        assert_eq!(device.memory_ratio(), Some(0.25));
        assert_eq!(device.fan_ratio(), None);
    }
}
