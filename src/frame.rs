use serde::Serialize;
use tracing::warn;

use crate::{
    correlate::CorrelatedRow,
    smi::{DeviceRecord, Snapshot},
};

// One device and the processes running on it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Card {
    pub device: DeviceRecord,
    pub processes: Vec<CorrelatedRow>,
}

// Everything shown by one refresh of the dashboard
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Frame {
    pub cards: Vec<Card>,
}

impl Frame {
    /// Build one card per selected device, in selection order.
    ///
    /// A selected device missing from the report (its table entry was
    /// malformed) is left out of the frame.
    pub fn assemble(
        snapshot: Snapshot,
        rows: Vec<CorrelatedRow>,
        selection: &[u32],
    ) -> Self {
        let mut cards = Vec::with_capacity(selection.len());

        for &index in selection {
            let Some(device) = snapshot.device(index) else {
                warn!("GPU {index} is missing from the nvidia-smi report");
                continue;
            };

            let processes = rows
                .iter()
                .filter(|row| row.gpu.device_index == index)
                .cloned()
                .collect();

            cards.push(Card {
                device: device.clone(),
                processes,
            });
        }

        Self { cards }
    }
}
