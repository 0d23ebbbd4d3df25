use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid formation: {0}")]
    InvalidFormation(String),

    #[error("Unknown squad: {0:?}")]
    UnknownSquad(crate::core::types::SquadId),

    #[error("Unknown unit: {0:?}")]
    UnknownUnit(crate::core::types::UnitId),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
