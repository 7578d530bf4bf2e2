//! Presence and membership.

pub mod memory;
pub mod online;
pub mod store;

pub use memory::MemoryPresenceStore;
pub use online::{OnlineTracker, OnlineUser};
pub use store::{AvUpdate, Placement, PlacementChange, PresenceStats, PresenceStore};
