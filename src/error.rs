use super::medicine::{MedicineKey, MedicineState};
use std::convert::Infallible;

#[derive(thiserror::Error, Debug)]
pub enum ContractError {
    #[error("Medicine {0} does not exist")]
    NotFound(MedicineKey),
    #[error("Medicine {0} already exists")]
    AlreadyExists(MedicineKey),
    #[error("Cannot {operation} medicine {key}: state is {actual}, expected {expected}")]
    InvalidStateTransition {
        key: MedicineKey,
        operation: &'static str,
        expected: MedicineState,
        actual: MedicineState,
    },
    #[error("Identity {identity} of {msp_id} is not permitted to {operation}")]
    Authorization {
        identity: String,
        msp_id: String,
        operation: &'static str,
    },
    #[error("Failed to (de)serialise ledger value: {0}")]
    Serialization(String),
    #[error("Read of key {key} conflicts with a concurrent commit")]
    LedgerConflict { key: String },
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Unknown contract function {0}")]
    UnknownFunction(String),
    #[error("Transaction context was retained past its invocation")]
    ContextLeaked,
    #[error(transparent)]
    Storage(#[from] sled::Error),
}

impl ContractError {
    /// Only a conflict may succeed when the same proposal is submitted again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ContractError::LedgerConflict { .. })
    }
}

impl From<minicbor::encode::Error<Infallible>> for ContractError {
    fn from(value: minicbor::encode::Error<Infallible>) -> Self {
        ContractError::Serialization(value.to_string())
    }
}

impl From<minicbor::decode::Error> for ContractError {
    fn from(value: minicbor::decode::Error) -> Self {
        ContractError::Serialization(value.to_string())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Client configuration has already been initialised")]
    AlreadyInitialized,
    #[error("{name} must be 'true' or 'false', got {value:?}")]
    InvalidFlag { name: &'static str, value: String },
}
