//! Realm Keeps
//!
//! Keep and tower control for a three-realm war: guild claims, upgrades,
//! structural damage, raizing, siege hookpoints and capture.
//!
//! ## Architecture
//!
//! ```text
//! KeepDriver  (driver.rs)            ← tokio tick loop, frame publishing
//!   ├── KeepRegistry  (registry.rs)  ← load, spatial lookup, enemy policy
//!   │     └── Keep  (keep.rs)        ← one Mutex per keep
//!   │           ├── StructuralComponent  (component.rs)
//!   │           │     ├── Position slots  (positions.rs)
//!   │           │     └── HookPoint       (hookpoint.rs)
//!   │           └── guards / banners / doors / patrols  (objects.rs)
//!   └── RealmBonusTracker  (bonus.rs)
//! ```
//!
//! Keeps talk to the outside through the collaborator traits bundled in
//! [`world::Services`]: [`store::KeepStore`], [`protocol::Notifier`],
//! [`world::WorldView`], [`guild::GuildDirectory`] and [`timer::Clock`].

// Core types and collaborator seams.
pub mod config;
pub mod error;
pub mod events;
pub mod guild;
pub mod objects;
pub mod protocol;
pub mod store;
pub mod timer;
pub mod types;
pub mod world;

// Keep aggregate.
pub mod area;
pub mod bonus;
pub mod component;
pub mod hookpoint;
pub mod keep;
pub mod positions;
pub mod registry;

// The tokio driver requires the `server` feature.
#[cfg(feature = "server")]
pub mod driver;

#[cfg(feature = "server")]
pub use driver::{DriverConfig, KeepDriver};
pub use bonus::{KeepBonus, RealmBonusTracker};
pub use config::KeepConfig;
pub use error::{ClaimRejection, KeepError, UpgradeRejection};
pub use keep::Keep;
pub use registry::{KeepEntry, KeepHandle, KeepRegistry};
pub use types::{ComponentStatus, KeepId, KeepKind, KeepType, Realm, WorldPoint};
pub use world::Services;
