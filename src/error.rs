//! Error types for the keep subsystem.

use crate::types::KeepId;
use thiserror::Error;

/// Persistence collaborator failures.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Row not found: {0}")]
    NotFound(String),

    #[error("Malformed seed data: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Object factory failures. The raw tag is carried for logging.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FactoryError {
    #[error("Unknown class tag '{0}'")]
    UnknownTag(String),

    #[error("No constructor registered for class tag '{0}'")]
    Unregistered(String),

    #[error("Constructor for '{tag}' rejected the request: {reason}")]
    Rejected { tag: String, reason: String },
}

/// Keep aggregate and registry errors.
#[derive(Error, Debug)]
pub enum KeepError {
    #[error("Keep not found: {0}")]
    KeepNotFound(KeepId),

    #[error("Component {component} not found on {keep}")]
    ComponentNotFound { keep: KeepId, component: u16 },

    #[error("Hookpoint {hookpoint} not found on component {component} of {keep}")]
    HookPointNotFound {
        keep: KeepId,
        component: u16,
        hookpoint: u8,
    },

    #[error("Invalid keep level {0}")]
    InvalidLevel(u8),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Factory(#[from] FactoryError),
}

/// Why a claim was refused. `Display` is the text shown to the player.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClaimRejection {
    #[error("The keep is not owned by your realm.")]
    WrongRealm,

    #[error("You must be in a guild to claim a keep.")]
    NoGuild,

    #[error("You do not have permission to claim for your guild.")]
    NoPermission,

    #[error("Your guild must have at least {required} guild bounty points to claim.")]
    InsufficientBountyPoints { required: i64 },

    #[error("The keep is already claimed.")]
    AlreadyClaimed,

    #[error("Your guild already owns a keep.")]
    GuildOwnsKeep,

    #[error("You need a full group of {required} nearby to claim this tower ({have}/{required}).")]
    GroupTooSmall { have: usize, required: usize },

    #[error("No claim is awaiting your confirmation.")]
    NotPending,
}

/// Why an upgrade was refused. `Display` is the text shown to the player.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpgradeRejection {
    #[error("Your guild does not own this keep.")]
    NotOwner,

    #[error("You do not have permission to upgrade for your guild.")]
    NoPermission,

    #[error("Level {0} is not a valid upgrade target.")]
    InvalidTarget(u8),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, KeepError>;
