use thiserror::Error;

/// Errors raised while constructing domain entities from raw inputs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FactoryError {
    #[error("Invalid network name '{0}': expected {{lrt|dev|loc|sre|stg}}{{index}}")]
    InvalidNetworkName(String),

    #[error("Invalid index {value} for {what}: must be positive")]
    InvalidIndex { what: &'static str, value: u32 },

    #[error("Invalid key material: {0}")]
    InvalidKey(String),
}
