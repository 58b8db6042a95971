//! Item classes and item instances

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::{ActorId, ItemId};

/// Identifier of an item class in the catalog
pub type ItemClassId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    #[default]
    Common,
    Uncommon,
    Rare,
    UltraRare,
    Legendary,
}

/// Character equipment slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipSlot {
    Head,
    Helmet,
    Chest,
    Vest,
    Legs,
    Feet,
    Hands,
    Backpack,
    PrimaryWeapon,
    Throwable,
}

/// Behavior attached to an item class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemKind {
    Misc,
    Ammo,
    Food {
        heal_amount: f32,
    },
    Gear {
        slot: EquipSlot,
        /// Fraction of incoming damage that gets through (1.0 = no protection)
        damage_defence_multiplier: f32,
    },
    Weapon {
        weapon: String,
    },
    Throwable {
        throwable: String,
    },
}

/// Capability tags derived from an item's kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Usable,
    Equippable(EquipSlot),
    Stackable,
}

fn default_max_stack() -> u32 {
    1
}

fn default_quantity() -> u32 {
    1
}

fn default_use_text() -> String {
    "Use".to_string()
}

/// Static definition shared by every instance of an item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemClass {
    pub id: ItemClassId,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_use_text")]
    pub use_action_text: String,
    #[serde(default)]
    pub rarity: Rarity,
    /// Weight of a single unit
    #[serde(default)]
    pub weight: f32,
    #[serde(default)]
    pub stackable: bool,
    #[serde(default = "default_max_stack")]
    pub max_stack_size: u32,
    #[serde(default = "default_quantity")]
    pub default_quantity: u32,
    pub kind: ItemKind,
}

impl ItemClass {
    /// Largest quantity one instance may hold
    pub fn max_quantity(&self) -> u32 {
        if self.stackable {
            self.max_stack_size.max(1)
        } else {
            1
        }
    }

    pub fn equip_slot(&self) -> Option<EquipSlot> {
        match &self.kind {
            ItemKind::Gear { slot, .. } => Some(*slot),
            ItemKind::Weapon { .. } => Some(EquipSlot::PrimaryWeapon),
            ItemKind::Throwable { .. } => Some(EquipSlot::Throwable),
            ItemKind::Misc | ItemKind::Ammo | ItemKind::Food { .. } => None,
        }
    }

    pub fn capabilities(&self) -> Vec<Capability> {
        let mut caps = Vec::new();
        if !matches!(self.kind, ItemKind::Misc | ItemKind::Ammo) {
            caps.push(Capability::Usable);
        }
        if let Some(slot) = self.equip_slot() {
            caps.push(Capability::Equippable(slot));
        }
        if self.stackable {
            caps.push(Capability::Stackable);
        }
        caps
    }

    pub fn has_capability(&self, cap: Capability) -> bool {
        self.capabilities().contains(&cap)
    }
}

/// Item instance living in an inventory or a pickup
#[derive(Debug, Clone)]
pub struct Item {
    pub id: ItemId,
    pub class: Arc<ItemClass>,
    quantity: u32,
    pub equipped: bool,
    owner: Option<ActorId>,
    rep_key: u32,
}

impl Item {
    /// New instance with a fresh id, quantity clamped to the class limits
    pub fn new(class: Arc<ItemClass>, quantity: u32) -> Self {
        Self::with_id(Uuid::new_v4(), class, quantity)
    }

    pub fn with_id(id: ItemId, class: Arc<ItemClass>, quantity: u32) -> Self {
        let quantity = quantity.clamp(1, class.max_quantity());
        Self {
            id,
            class,
            quantity,
            equipped: false,
            owner: None,
            rep_key: 0,
        }
    }

    pub fn class_id(&self) -> &str {
        &self.class.id
    }

    pub fn display_name(&self) -> &str {
        &self.class.display_name
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Set quantity clamped to 0..=max; returns the stored value
    pub fn set_quantity(&mut self, quantity: u32) -> u32 {
        let clamped = quantity.min(self.class.max_quantity());
        if clamped != self.quantity {
            self.quantity = clamped;
            self.mark_dirty();
        }
        self.quantity
    }

    pub fn stack_weight(&self) -> f32 {
        self.class.weight * self.quantity as f32
    }

    /// Equipped items are shown in their slot rather than the item list
    pub fn should_show_in_inventory(&self) -> bool {
        self.quantity > 0 && !self.equipped
    }

    /// Owning inventory's actor
    pub fn owner(&self) -> Option<ActorId> {
        self.owner
    }

    pub(crate) fn set_owner(&mut self, owner: Option<ActorId>) {
        self.owner = owner;
    }

    pub fn rep_key(&self) -> u32 {
        self.rep_key
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.rep_key = self.rep_key.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apple() -> Arc<ItemClass> {
        Arc::new(ItemClass {
            id: "apple".into(),
            display_name: "Apple".into(),
            description: String::new(),
            use_action_text: "Eat".into(),
            rarity: Rarity::Common,
            weight: 0.2,
            stackable: true,
            max_stack_size: 10,
            default_quantity: 1,
            kind: ItemKind::Food { heal_amount: 20.0 },
        })
    }

    #[test]
    fn quantity_is_clamped_to_stack_limit() {
        let mut item = Item::new(apple(), 50);
        assert_eq!(item.quantity(), 10);
        assert_eq!(item.set_quantity(3), 3);
        assert_eq!(item.set_quantity(0), 0);
        assert!(!item.should_show_in_inventory());
    }

    #[test]
    fn capabilities_follow_kind() {
        let class = apple();
        assert!(class.has_capability(Capability::Usable));
        assert!(class.has_capability(Capability::Stackable));
        assert_eq!(class.equip_slot(), None);
    }
}
