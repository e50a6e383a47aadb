use std::collections::{HashMap, HashSet, hash_map::Entry};

use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    host::{HostError, HostProcessInfo, ProcessLookup},
    smi::ProcessGpuRecord,
};

// A GPU process row joined with what the host knows about the process.
// `host` is `None` when the process exited before it could be looked up
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelatedRow {
    #[serde(flatten)]
    pub gpu: ProcessGpuRecord,
    pub host: Option<HostProcessInfo>,
}

impl CorrelatedRow {
    pub fn is_stale(&self) -> bool {
        self.host.is_none()
    }
}

/// Join every GPU process row with its host process information.
///
/// A process that has already exited keeps its row, without host
/// fields. A row whose ps output cannot be understood is dropped, and
/// logged as a warning the first time its pid lands in `reported`.
/// Only a ps invocation failure aborts the whole join.
///
/// Each pid is looked up once, a process holding memory on several
/// GPUs appears in several rows.
pub fn correlate<L: ProcessLookup + ?Sized>(
    records: &[ProcessGpuRecord],
    lookup: &L,
    reported: &mut HashSet<u32>,
) -> Result<Vec<CorrelatedRow>, HostError> {
    let mut cache: HashMap<u32, Lookup> = HashMap::new();
    let mut rows = Vec::with_capacity(records.len());

    for record in records {
        let outcome = match cache.entry(record.process_id) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let outcome = match lookup.lookup(record.process_id) {
                    Ok(host) => Lookup::Resolved(host),
                    Err(HostError::Malformed { pid, line }) => {
                        if reported.insert(pid) {
                            warn!("Dropping process {pid}, unexpected ps output: {line:?}");
                        } else {
                            debug!("Dropping process {pid} again");
                        }
                        Lookup::Unreadable
                    }
                    Err(err) => return Err(err),
                };

                entry.insert(outcome)
            }
        };

        if let Lookup::Resolved(host) = outcome {
            rows.push(CorrelatedRow {
                gpu: record.clone(),
                host: host.clone(),
            });
        }
    }

    Ok(rows)
}

enum Lookup {
    Resolved(Option<HostProcessInfo>),
    Unreadable,
}
