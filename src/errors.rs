use thiserror::Error;

use crate::{host::HostError, smi::SmiError};

// Why one refresh of the dashboard failed
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Smi(#[from] SmiError),
    #[error(transparent)]
    Host(#[from] HostError),
}
