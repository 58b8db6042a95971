//! Inventory storage with slot-count and weight limits
//!
//! Only the authoritative copy of an inventory mutates. Replicas receive their
//! contents from snapshots and reject direct edits.

use std::sync::Arc;

use super::item::{Capability, Item, ItemClass};
use super::{ActorId, ItemId};

/// Tolerance for accumulated float error in weight sums
const WEIGHT_EPSILON: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    AddedNone,
    AddedSome,
    AddedAll,
}

/// Outcome of an add attempt, with a reason suitable for the player
#[derive(Debug, Clone, PartialEq)]
pub struct ItemAddResult {
    pub amount_to_give: u32,
    pub amount_actually_given: u32,
    pub outcome: AddOutcome,
    pub reason: String,
}

impl ItemAddResult {
    fn none(amount_to_give: u32, reason: impl Into<String>) -> Self {
        Self {
            amount_to_give,
            amount_actually_given: 0,
            outcome: AddOutcome::AddedNone,
            reason: reason.into(),
        }
    }

    fn some(amount_to_give: u32, given: u32, reason: impl Into<String>) -> Self {
        Self {
            amount_to_give,
            amount_actually_given: given,
            outcome: AddOutcome::AddedSome,
            reason: reason.into(),
        }
    }

    fn all(amount_to_give: u32) -> Self {
        Self {
            amount_to_give,
            amount_actually_given: amount_to_give,
            outcome: AddOutcome::AddedAll,
            reason: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Inventory {
    owner: ActorId,
    items: Vec<Item>,
    capacity: usize,
    weight_capacity: f32,
    authoritative: bool,
    version: u64,
}

impl Inventory {
    /// Authoritative inventory
    pub fn new(owner: ActorId, capacity: usize, weight_capacity: f32) -> Self {
        Self {
            owner,
            items: Vec::new(),
            capacity,
            weight_capacity,
            authoritative: true,
            version: 0,
        }
    }

    /// Replica filled from replication only
    pub fn replica(owner: ActorId, capacity: usize, weight_capacity: f32) -> Self {
        Self {
            authoritative: false,
            ..Self::new(owner, capacity, weight_capacity)
        }
    }

    pub fn owner(&self) -> ActorId {
        self.owner
    }

    pub fn is_authoritative(&self) -> bool {
        self.authoritative
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn weight_capacity(&self) -> f32 {
        self.weight_capacity
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.bump();
    }

    pub fn set_weight_capacity(&mut self, weight_capacity: f32) {
        self.weight_capacity = weight_capacity;
        self.bump();
    }

    /// Change key, bumped on every mutation
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn current_weight(&self) -> f32 {
        self.items.iter().map(Item::stack_weight).sum()
    }

    pub fn get(&self, id: ItemId) -> Option<&Item> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.get(id).is_some()
    }

    /// First stack of a class
    pub fn find_by_class(&self, class_id: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.class_id() == class_id)
    }

    pub fn find_all_by_class(&self, class_id: &str) -> Vec<&Item> {
        self.items.iter().filter(|i| i.class_id() == class_id).collect()
    }

    /// All items carrying a capability
    pub fn find_by_kind(&self, cap: Capability) -> Vec<&Item> {
        self.items
            .iter()
            .filter(|i| i.class.has_capability(cap))
            .collect()
    }

    /// Total units held across every stack of a class
    pub fn total_quantity(&self, class_id: &str) -> u32 {
        self.items
            .iter()
            .filter(|i| i.class_id() == class_id)
            .map(Item::quantity)
            .sum()
    }

    pub fn has_item(&self, class_id: &str, quantity: u32) -> bool {
        self.total_quantity(class_id) >= quantity
    }

    /// Add a copy of an existing item's stack
    pub fn try_add_item(&mut self, item: &Item) -> ItemAddResult {
        let class = Arc::clone(&item.class);
        self.try_add(&class, item.quantity())
    }

    pub fn try_add_from_class(&mut self, class: &Arc<ItemClass>, quantity: u32) -> ItemAddResult {
        self.try_add(class, quantity)
    }

    /// Add `quantity` units of `class`, merging into an existing stack when possible
    pub fn try_add(&mut self, class: &Arc<ItemClass>, quantity: u32) -> ItemAddResult {
        if !self.authoritative {
            return ItemAddResult::none(quantity, "Only the server can add items to an inventory.");
        }
        if quantity == 0 {
            return ItemAddResult::none(0, "Nothing to add.");
        }

        let requested = if class.stackable { quantity } else { 1 };
        let existing = if class.stackable {
            self.items.iter().position(|i| i.class.id == class.id)
        } else {
            None
        };

        if existing.is_none() && self.items.len() + 1 > self.capacity {
            tracing::debug!(owner = %self.owner, item = %class.id, "inventory full");
            return ItemAddResult::none(
                requested,
                "Couldn't add item to Inventory. Inventory is full.",
            );
        }

        let current_weight = self.current_weight();
        if class.weight > 0.0 && current_weight + class.weight > self.weight_capacity + WEIGHT_EPSILON {
            tracing::debug!(owner = %self.owner, item = %class.id, "inventory too heavy");
            return ItemAddResult::none(
                requested,
                "Couldn't add item to Inventory. Carrying too much weight.",
            );
        }

        let weight_room = if class.weight > 0.0 {
            let room = ((self.weight_capacity - current_weight) / class.weight + WEIGHT_EPSILON).floor();
            room.max(0.0) as u32
        } else {
            u32::MAX
        };
        let max_stack = class.max_quantity();

        let result = match existing {
            Some(idx) => {
                let held = self.items[idx].quantity();
                if held >= max_stack {
                    return ItemAddResult::none(
                        requested,
                        format!("Couldn't add {}. You already have a full stack of this item.", class.display_name),
                    );
                }
                let capacity_room = max_stack - held;
                let actual = requested.min(capacity_room).min(weight_room);
                if actual == 0 {
                    return ItemAddResult::none(
                        requested,
                        format!("Couldn't add {}. Carrying too much weight.", class.display_name),
                    );
                }
                self.items[idx].set_quantity(held + actual);
                Self::partial_result(class, requested, actual, weight_room < capacity_room)
            }
            None => {
                let actual = requested.min(max_stack).min(weight_room);
                let mut item = Item::new(Arc::clone(class), actual);
                item.set_owner(Some(self.owner));
                self.items.push(item);
                Self::partial_result(class, requested, actual, weight_room < max_stack)
            }
        };

        self.bump();
        result
    }

    fn partial_result(class: &ItemClass, requested: u32, actual: u32, weight_bound: bool) -> ItemAddResult {
        if actual >= requested {
            ItemAddResult::all(requested)
        } else if weight_bound {
            ItemAddResult::some(
                requested,
                actual,
                format!("Couldn't add entire stack of {} to Inventory. Carrying too much weight.", class.display_name),
            )
        } else {
            ItemAddResult::some(
                requested,
                actual,
                format!("Couldn't add entire stack of {} to Inventory. The stack is full.", class.display_name),
            )
        }
    }

    /// Remove up to `amount` units; drops the item at zero. Returns units removed.
    pub fn consume(&mut self, id: ItemId, amount: u32) -> u32 {
        if !self.authoritative {
            return 0;
        }
        let Some(idx) = self.items.iter().position(|i| i.id == id) else {
            tracing::warn!(owner = %self.owner, item_id = %id, "consume on missing item");
            return 0;
        };

        let held = self.items[idx].quantity();
        if amount > held {
            tracing::warn!(owner = %self.owner, item_id = %id, amount, held, "consume clamped to held quantity");
        }
        let removed = amount.min(held);
        let remaining = held - removed;
        if remaining == 0 {
            let mut item = self.items.remove(idx);
            item.set_owner(None);
        } else {
            self.items[idx].set_quantity(remaining);
        }
        self.bump();
        removed
    }

    /// Remove up to `amount` units of a class across stacks, oldest first
    pub fn consume_class(&mut self, class_id: &str, amount: u32) -> u32 {
        let ids: Vec<ItemId> = self
            .items
            .iter()
            .filter(|i| i.class_id() == class_id)
            .map(|i| i.id)
            .collect();

        let mut removed = 0;
        for id in ids {
            if removed >= amount {
                break;
            }
            removed += self.consume(id, amount - removed);
        }
        removed
    }

    /// Unconditional removal of a whole stack
    pub fn remove(&mut self, id: ItemId) -> Option<Item> {
        if !self.authoritative {
            return None;
        }
        let idx = self.items.iter().position(|i| i.id == id)?;
        let mut item = self.items.remove(idx);
        item.set_owner(None);
        self.bump();
        Some(item)
    }

    pub fn set_equipped(&mut self, id: ItemId, equipped: bool) -> bool {
        let Some(item) = self.items.iter_mut().find(|i| i.id == id) else {
            return false;
        };
        if item.equipped != equipped {
            item.equipped = equipped;
            item.mark_dirty();
            self.bump();
        }
        true
    }

    /// Overwrite a replica with replicated contents
    pub fn apply_replicated(&mut self, items: Vec<Item>, capacity: usize, weight_capacity: f32, version: u64) {
        self.items = items;
        for item in &mut self.items {
            item.set_owner(Some(self.owner));
        }
        self.capacity = capacity;
        self.weight_capacity = weight_capacity;
        self.version = version;
    }

    pub fn within_limits(&self) -> bool {
        self.items.len() <= self.capacity
            && self.current_weight() <= self.weight_capacity + WEIGHT_EPSILON * self.items.len().max(1) as f32
    }

    fn bump(&mut self) {
        self.version += 1;
        debug_assert!(self.within_limits(), "inventory limits violated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::item::{ItemKind, Rarity};
    use uuid::Uuid;

    fn class(id: &str, weight: f32, stackable: bool, max: u32) -> Arc<ItemClass> {
        Arc::new(ItemClass {
            id: id.into(),
            display_name: id.to_uppercase(),
            description: String::new(),
            use_action_text: "Use".into(),
            rarity: Rarity::Common,
            weight,
            stackable,
            max_stack_size: max,
            default_quantity: 1,
            kind: ItemKind::Misc,
        })
    }

    fn inventory(capacity: usize, weight: f32) -> Inventory {
        Inventory::new(Uuid::new_v4(), capacity, weight)
    }

    #[test]
    fn full_stack_yields_added_none() {
        let mut inv = inventory(20, 100.0);
        let ammo = class("ammo", 0.0, true, 30);
        assert_eq!(inv.try_add(&ammo, 30).outcome, AddOutcome::AddedAll);

        let result = inv.try_add(&ammo, 5);
        assert_eq!(result.outcome, AddOutcome::AddedNone);
        assert_eq!(result.amount_actually_given, 0);
        assert_eq!(inv.total_quantity("ammo"), 30);
    }

    #[test]
    fn weight_limited_add_gives_partial_amount() {
        let mut inv = inventory(20, 6.0);
        let rock = class("rock", 1.0, true, 20);

        let result = inv.try_add(&rock, 10);
        assert_eq!(result.outcome, AddOutcome::AddedSome);
        assert_eq!(result.amount_actually_given, 6);
        assert!(result.reason.contains("weight"));
        assert!(inv.current_weight() <= inv.weight_capacity());
    }

    #[test]
    fn merging_is_bounded_by_stack_room() {
        let mut inv = inventory(20, 100.0);
        let apple = class("apple", 1.0, true, 10);

        assert_eq!(inv.try_add(&apple, 5).outcome, AddOutcome::AddedAll);
        assert_eq!(inv.len(), 1);

        let result = inv.try_add(&apple, 8);
        assert_eq!(result.outcome, AddOutcome::AddedSome);
        assert_eq!(result.amount_actually_given, 5);
        assert!(result.reason.contains("stack is full"));
        assert_eq!(inv.len(), 1);
        assert_eq!(inv.total_quantity("apple"), 10);
    }

    #[test]
    fn slot_capacity_rejects_new_stacks_only() {
        let mut inv = inventory(2, 100.0);
        let sword = class("sword", 1.0, false, 1);
        let apple = class("apple", 0.5, true, 10);

        assert_eq!(inv.try_add(&apple, 1).outcome, AddOutcome::AddedAll);
        assert_eq!(inv.try_add(&sword, 1).outcome, AddOutcome::AddedAll);
        assert_eq!(inv.try_add(&sword, 1).outcome, AddOutcome::AddedNone);
        assert_eq!(inv.try_add(&apple, 3).outcome, AddOutcome::AddedAll);
        assert_eq!(inv.len(), 2);
    }

    #[test]
    fn consume_clamps_and_removes_at_zero() {
        let mut inv = inventory(20, 100.0);
        let apple = class("apple", 1.0, true, 10);
        inv.try_add(&apple, 3);
        let id = inv.find_by_class("apple").map(|i| i.id).unwrap();

        let version = inv.version();
        assert_eq!(inv.consume(id, 2), 2);
        assert!(inv.version() > version);
        assert_eq!(inv.get(id).map(Item::quantity), Some(1));
        assert_eq!(inv.consume(id, 1), 1);
        assert!(inv.get(id).is_none());
        assert_eq!(inv.consume(id, 1), 0);
    }

    #[test]
    fn consume_class_debits_reserve() {
        let mut inv = inventory(20, 100.0);
        let ammo = class("ammo", 0.0, true, 30);
        inv.try_add(&ammo, 10);
        assert_eq!(inv.consume_class("ammo", 4), 4);
        assert_eq!(inv.total_quantity("ammo"), 6);
        assert_eq!(inv.consume_class("ammo", 10), 6);
        assert!(inv.find_by_class("ammo").is_none());
    }

    #[test]
    fn replicas_reject_mutation() {
        let mut inv = Inventory::replica(Uuid::new_v4(), 20, 100.0);
        let apple = class("apple", 1.0, true, 10);
        let result = inv.try_add(&apple, 1);
        assert_eq!(result.outcome, AddOutcome::AddedNone);
        assert!(inv.is_empty());
    }

    #[test]
    fn limits_hold_across_mixed_operations() {
        let mut inv = inventory(4, 10.0);
        let heavy = class("heavy", 3.0, false, 1);
        let light = class("light", 0.5, true, 5);

        for step in 0..40u32 {
            match step % 5 {
                0 | 1 => {
                    inv.try_add(&heavy, 1);
                }
                2 | 3 => {
                    inv.try_add(&light, step % 7 + 1);
                }
                _ => {
                    if let Some(id) = inv.items().first().map(|i| i.id) {
                        inv.consume(id, 1);
                    }
                }
            }
            assert!(inv.len() <= inv.capacity());
            assert!(inv.current_weight() <= inv.weight_capacity() + 0.001);
        }
    }
}
