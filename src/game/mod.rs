//! Game simulation modules

pub mod catalog;
pub mod character;
pub mod client;
pub mod combat;
pub mod interaction;
pub mod inventory;
pub mod item;
pub mod loot;
pub mod physics;
pub mod presentation;
pub mod replication;
pub mod scheduler;
pub mod session;
pub mod sim;
pub mod snapshot;
pub mod weapon;
pub mod world;

pub use session::{ClientLink, GameSession, SessionHandle, SessionInput};
pub use world::{GameEvent, World};

use uuid::Uuid;

/// Identifier of any replicated actor
pub type ActorId = Uuid;
/// Identifier of an item instance
pub type ItemId = Uuid;
