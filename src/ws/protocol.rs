//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};

use crate::game::combat::ClaimedHit;
use crate::game::item::EquipSlot;
use crate::game::physics::{Vec3, ViewPoint};
use crate::game::presentation::Cue;
use crate::game::replication::{fields, Delivery, RepCondition};
use crate::game::{ActorId, ItemId};

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },

    /// Latest camera and body location of the controlled character
    UpdateView { position: Vec3, view: ViewPoint },

    StartFire,
    StopFire,
    StartReload,
    /// A shot fired locally, replayed by the server to keep clip ammo in step
    HandleFiring,
    /// Hit the client claims for its last shot; re-traced before damage
    HandleHit { hit: ClaimedHit },
    MeleeHit { hit: ClaimedHit },

    BeginInteract,
    EndInteract,

    UseItem { item: ItemId },
    DropItem { item: ItemId, quantity: u32 },
    /// Clients may only close their loot view; opening happens through interaction
    SetLootSource { source: Option<ActorId> },
    LootItem { item: ItemId },
    UseThrowable,

    SetAiming { aiming: bool },
    SetSprinting { sprinting: bool },
}

impl ClientMsg {
    pub fn delivery(&self) -> Delivery {
        match self {
            ClientMsg::UpdateView { .. } => Delivery::Unreliable,
            _ => Delivery::Reliable,
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        actor_id: ActorId,
        server_time: u64,
    },

    /// Replicated state that changed since the recipient's last snapshot
    Snapshot {
        tick: u64,
        server_time: u64,
        updates: Vec<ActorDelta>,
        removed: Vec<ActorId>,
    },

    /// Text for the owning client's HUD
    Notification { text: String },

    /// Cosmetic effect for every observer
    Cue {
        actor: ActorId,
        cue: Cue,
        #[serde(default)]
        location: Option<Vec3>,
    },

    PlayerJoined { actor_id: ActorId, name: String },

    PlayerLeft { actor_id: ActorId },

    /// Error message
    Error { code: String, message: String },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

impl ServerMsg {
    pub fn delivery(&self) -> Delivery {
        match self {
            ServerMsg::Cue { .. } => Delivery::Unreliable,
            _ => Delivery::Reliable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    Character,
    Weapon,
    Pickup,
    Container,
    Projectile,
}

/// Changed fields of one actor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorDelta {
    pub id: ActorId,
    pub kind: ActorKind,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemView {
    pub id: ItemId,
    pub class: String,
    pub quantity: u32,
    #[serde(default)]
    pub equipped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryView {
    pub capacity: usize,
    pub weight_capacity: f32,
    /// Bumped on every authoritative change
    pub version: u64,
    pub items: Vec<ItemView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquippedEntry {
    pub slot: EquipSlot,
    pub item: ItemId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractableView {
    pub name: String,
    pub action: String,
    pub interaction_time: f32,
    pub interaction_distance: f32,
    pub allow_multiple: bool,
    pub active: bool,
}

/// One replicated property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum Field {
    Name(String),
    Position(Vec3),
    Health(f32),
    MaxHealth(f32),
    Aiming(bool),
    Sprinting(bool),
    Killer(Option<ActorId>),
    LootSource(Option<ActorId>),
    Equipped(Vec<EquippedEntry>),
    Inventory(InventoryView),
    EquippedWeapon(Option<ActorId>),
    WeaponItem { item: ItemId, config: String },
    WeaponOwner(Option<ActorId>),
    AmmoInClip(u32),
    BurstCounter(u32),
    PendingReload(bool),
    Stack(ItemView),
    Interactable(InteractableView),
}

impl Field {
    pub fn condition(&self) -> RepCondition {
        match self {
            Field::Health(_) => fields::HEALTH,
            Field::Aiming(_) => fields::AIMING,
            Field::Sprinting(_) => fields::SPRINTING,
            Field::Killer(_) => fields::KILLER,
            Field::LootSource(_) => fields::LOOT_SOURCE,
            Field::Equipped(_) => fields::EQUIPPED_ITEMS,
            Field::Inventory(_) => fields::INVENTORY,
            Field::EquippedWeapon(_) => fields::EQUIPPED_WEAPON,
            Field::WeaponItem { .. } => fields::WEAPON_ITEM,
            Field::WeaponOwner(_) => fields::WEAPON_OWNER,
            Field::AmmoInClip(_) => fields::AMMO_IN_CLIP,
            Field::BurstCounter(_) => fields::BURST_COUNTER,
            Field::PendingReload(_) => fields::PENDING_RELOAD,
            Field::Name(_)
            | Field::Position(_)
            | Field::MaxHealth(_)
            | Field::Stack(_)
            | Field::Interactable(_) => RepCondition::Always,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_use_snake_case_tags() {
        let json = serde_json::to_string(&ClientMsg::StartFire).expect("serialize");
        assert_eq!(json, r#"{"type":"start_fire"}"#);

        let msg: ClientMsg = serde_json::from_str(r#"{"type":"drop_item","item":"6f1c5a3e-8a52-4c55-9d0a-2d1f0e1b7c11","quantity":3}"#)
            .expect("parse");
        assert!(matches!(msg, ClientMsg::DropItem { quantity: 3, .. }));
    }

    #[test]
    fn only_cosmetic_traffic_is_unreliable() {
        let cue = ServerMsg::Cue {
            actor: uuid::Uuid::nil(),
            cue: Cue::Impact,
            location: None,
        };
        assert_eq!(cue.delivery(), Delivery::Unreliable);
        assert_eq!(ServerMsg::Pong { t: 1 }.delivery(), Delivery::Reliable);
        assert_eq!(ClientMsg::HandleFiring.delivery(), Delivery::Reliable);
    }

    #[test]
    fn fields_carry_their_conditions() {
        assert_eq!(Field::AmmoInClip(3).condition(), RepCondition::OwnerOnly);
        assert_eq!(Field::BurstCounter(1).condition(), RepCondition::SkipOwner);
        assert_eq!(Field::Aiming(true).condition(), RepCondition::SkipOwner);
        assert_eq!(Field::Health(50.0).condition(), RepCondition::OwnerOnly);
        assert_eq!(
            Field::WeaponItem {
                item: uuid::Uuid::nil(),
                config: "rifle".into()
            }
            .condition(),
            RepCondition::InitialOnly
        );
    }
}
