//! Network roles, delivery classes and the per-step outbox

use serde::{Deserialize, Serialize};

use crate::ws::protocol::{ClientMsg, ServerMsg};

use super::combat::PointDamage;
use super::ActorId;

/// Role of the local copy of an actor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetRole {
    /// Canonical copy, lives on the server
    Authority,
    /// Client copy driven by local input
    AutonomousProxy,
    /// Client copy of someone else's actor
    SimulatedProxy,
}

/// Kind of participant running a world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetMode {
    DedicatedServer,
    ListenServer,
    Client,
}

impl NetMode {
    pub fn is_server(self) -> bool {
        !matches!(self, NetMode::Client)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    Reliable,
    /// May be dropped under load; only cosmetic traffic uses it
    Unreliable,
}

/// Recipient set of a remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcScope {
    Server,
    OwningClient(ActorId),
    Multicast,
}

/// Visibility rule of a replicated field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepCondition {
    Always,
    OwnerOnly,
    SkipOwner,
    /// Sent once when the actor enters a recipient's channel
    InitialOnly,
}

impl RepCondition {
    pub fn allows(self, is_owner: bool, is_initial: bool) -> bool {
        match self {
            RepCondition::Always => true,
            RepCondition::OwnerOnly => is_owner,
            RepCondition::SkipOwner => !is_owner,
            RepCondition::InitialOnly => is_initial,
        }
    }
}

/// Replicated field conditions
pub mod fields {
    use super::RepCondition;

    pub const AMMO_IN_CLIP: RepCondition = RepCondition::OwnerOnly;
    pub const BURST_COUNTER: RepCondition = RepCondition::SkipOwner;
    pub const PENDING_RELOAD: RepCondition = RepCondition::SkipOwner;
    pub const WEAPON_ITEM: RepCondition = RepCondition::InitialOnly;
    pub const WEAPON_OWNER: RepCondition = RepCondition::Always;
    pub const HEALTH: RepCondition = RepCondition::OwnerOnly;
    pub const AIMING: RepCondition = RepCondition::SkipOwner;
    pub const SPRINTING: RepCondition = RepCondition::Always;
    pub const KILLER: RepCondition = RepCondition::Always;
    pub const LOOT_SOURCE: RepCondition = RepCondition::Always;
    pub const EQUIPPED_WEAPON: RepCondition = RepCondition::Always;
    pub const EQUIPPED_ITEMS: RepCondition = RepCondition::Always;
    pub const INVENTORY: RepCondition = RepCondition::Always;
}

/// Server-to-client message with its routing
#[derive(Debug, Clone)]
pub struct Notification {
    pub scope: RpcScope,
    pub delivery: Delivery,
    pub message: ServerMsg,
}

/// Everything a simulation step wants to send or resolve later
#[derive(Debug, Default)]
pub struct Outbox {
    /// Requests for the authority (client worlds only)
    pub requests: Vec<ClientMsg>,
    pub notifications: Vec<Notification>,
    pub damage: Vec<PointDamage>,
}

impl Outbox {
    pub fn request(&mut self, msg: ClientMsg) {
        self.requests.push(msg);
    }

    pub fn notify_owner(&mut self, owner: ActorId, message: ServerMsg) {
        let delivery = message.delivery();
        self.notifications.push(Notification {
            scope: RpcScope::OwningClient(owner),
            delivery,
            message,
        });
    }

    pub fn multicast(&mut self, message: ServerMsg) {
        let delivery = message.delivery();
        self.notifications.push(Notification {
            scope: RpcScope::Multicast,
            delivery,
            message,
        });
    }

    pub fn apply_damage(&mut self, damage: PointDamage) {
        self.damage.push(damage);
    }

    pub fn take_requests(&mut self) -> Vec<ClientMsg> {
        std::mem::take(&mut self.requests)
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }
}
