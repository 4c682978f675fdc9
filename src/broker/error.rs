//! Broker error types.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    #[error("broker is closed")]
    Closed,

    #[error("partition {partition} does not exist")]
    UnknownPartition { partition: usize },
}
