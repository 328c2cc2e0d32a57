//! Error types for world operations.

use thiserror::Error;

use crate::player::PlayerId;

/// Consistency violations inside the player registry. These are absorbed by
/// the caller and never reach other connections.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("player {0} is already registered")]
    DuplicateId(PlayerId),

    #[error("player {0} is not registered")]
    UnknownPlayer(PlayerId),
}

/// Rejected join requests. The `Display` text is sent back to the joiner.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JoinError {
    #[error("nickname is required")]
    MissingNickname,

    #[error("nickname must not be empty")]
    EmptyNickname,

    #[error("characterType must be an integer in 0..{max}")]
    InvalidCharacterType { max: u32 },
}
