//! Snapshot building and per-recipient delta tracking

use std::collections::{HashMap, HashSet};
use std::mem::Discriminant;

use crate::ws::protocol::{
    ActorDelta, ActorKind, EquippedEntry, Field, InteractableView, InventoryView, ItemView, ServerMsg,
};

use super::character::Character;
use super::interaction::Interactable;
use super::inventory::Inventory;
use super::item::Item;
use super::weapon::Weapon;
use super::world::World;
use super::ActorId;

/// What one recipient has already been sent
#[derive(Debug)]
pub struct ReplicationChannel {
    recipient: ActorId,
    sent: HashMap<ActorId, HashMap<Discriminant<Field>, Field>>,
}

impl ReplicationChannel {
    pub fn new(recipient: ActorId) -> Self {
        Self {
            recipient,
            sent: HashMap::new(),
        }
    }

    pub fn recipient(&self) -> ActorId {
        self.recipient
    }

    pub fn knows(&self, actor: ActorId) -> bool {
        self.sent.contains_key(&actor)
    }

    /// Forget an actor so its next delta is a full initial one
    pub fn reset_actor(&mut self, actor: ActorId) {
        self.sent.remove(&actor);
    }

    fn diff(&mut self, id: ActorId, kind: ActorKind, owner: Option<ActorId>, fields: Vec<Field>) -> Option<ActorDelta> {
        let is_owner = owner == Some(self.recipient);
        let is_initial = !self.sent.contains_key(&id);
        let sent = self.sent.entry(id).or_default();

        let changed: Vec<Field> = fields
            .into_iter()
            .filter(|field| field.condition().allows(is_owner, is_initial))
            .filter(|field| {
                let key = std::mem::discriminant(field);
                if sent.get(&key) == Some(field) {
                    return false;
                }
                sent.insert(key, field.clone());
                true
            })
            .collect();

        if changed.is_empty() && !is_initial {
            return None;
        }
        Some(ActorDelta {
            id,
            kind,
            fields: changed,
        })
    }
}

/// Builds snapshots for network transmission
pub struct SnapshotBuilder {
    /// Tick counter since last snapshot
    ticks_since_snapshot: u32,
    /// Snapshot interval in ticks
    snapshot_interval: u32,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval: snapshot_interval.max(1),
        }
    }

    /// Check if it's time to send a snapshot
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Force snapshot on next check (used for important events)
    pub fn force_next(&mut self) {
        self.ticks_since_snapshot = self.snapshot_interval;
    }

    /// Changes since the recipient's previous snapshot, `None` when nothing changed
    pub fn build(&self, channel: &mut ReplicationChannel, tick: u64, server_time: u64, world: &World) -> Option<ServerMsg> {
        let mut updates = Vec::new();
        let mut live = HashSet::new();

        for character in world.characters() {
            live.insert(character.id);
            let fields = character_fields(character, world.interactables().get(&character.id));
            updates.extend(channel.diff(character.id, ActorKind::Character, Some(character.id), fields));

            if let Some(weapon) = &character.weapon {
                live.insert(weapon.id);
                updates.extend(channel.diff(weapon.id, ActorKind::Weapon, weapon.owner(), weapon_fields(weapon)));
            }
        }

        for pickup in world.pickups() {
            live.insert(pickup.id);
            let mut fields = vec![Field::Position(pickup.position), Field::Stack(item_view(&pickup.item))];
            fields.extend(interactable_field(world.interactables().get(&pickup.id)));
            updates.extend(channel.diff(pickup.id, ActorKind::Pickup, None, fields));
        }

        for container in world.containers() {
            live.insert(container.id);
            let mut fields = vec![
                Field::Name(container.name.clone()),
                Field::Position(container.position),
                Field::Inventory(inventory_view(&container.inventory)),
            ];
            fields.extend(interactable_field(world.interactables().get(&container.id)));
            updates.extend(channel.diff(container.id, ActorKind::Container, None, fields));
        }

        for projectile in world.projectiles() {
            live.insert(projectile.id);
            let fields = vec![Field::Name(projectile.throwable.clone()), Field::Position(projectile.position)];
            updates.extend(channel.diff(projectile.id, ActorKind::Projectile, Some(projectile.owner), fields));
        }

        let mut removed: Vec<ActorId> = channel
            .sent
            .keys()
            .filter(|id| !live.contains(id))
            .copied()
            .collect();
        removed.sort();
        for id in &removed {
            channel.sent.remove(id);
        }

        if updates.is_empty() && removed.is_empty() {
            return None;
        }
        Some(ServerMsg::Snapshot {
            tick,
            server_time,
            updates,
            removed,
        })
    }
}

fn character_fields(character: &Character, corpse: Option<&Interactable>) -> Vec<Field> {
    let equipped = character
        .equipped()
        .iter()
        .map(|(slot, item)| EquippedEntry {
            slot: *slot,
            item: *item,
        })
        .collect();
    let mut fields = vec![
        Field::Name(character.name.clone()),
        Field::Position(character.position),
        Field::Health(character.health()),
        Field::MaxHealth(character.max_health()),
        Field::Aiming(character.is_aiming()),
        Field::Sprinting(character.is_sprinting()),
        Field::Killer(character.killer()),
        Field::LootSource(character.loot_source()),
        Field::Equipped(equipped),
        Field::Inventory(inventory_view(&character.inventory)),
        Field::EquippedWeapon(character.weapon.as_ref().map(|w| w.id)),
    ];
    fields.extend(interactable_field(corpse));
    fields
}

fn weapon_fields(weapon: &Weapon) -> Vec<Field> {
    vec![
        Field::WeaponItem {
            item: weapon.item,
            config: weapon.config.id.clone(),
        },
        Field::WeaponOwner(weapon.owner()),
        Field::AmmoInClip(weapon.ammo_in_clip()),
        Field::BurstCounter(weapon.burst_counter()),
        Field::PendingReload(weapon.is_pending_reload()),
    ]
}

fn item_view(item: &Item) -> ItemView {
    ItemView {
        id: item.id,
        class: item.class_id().to_string(),
        quantity: item.quantity(),
        equipped: item.equipped,
    }
}

fn inventory_view(inventory: &Inventory) -> InventoryView {
    InventoryView {
        capacity: inventory.capacity(),
        weight_capacity: inventory.weight_capacity(),
        version: inventory.version(),
        items: inventory.items().iter().map(item_view).collect(),
    }
}

fn interactable_field(interactable: Option<&Interactable>) -> Option<Field> {
    interactable.map(|i| {
        Field::Interactable(InteractableView {
            name: i.config.name.clone(),
            action: i.config.action.clone(),
            interaction_time: i.config.interaction_time,
            interaction_distance: i.config.interaction_distance,
            allow_multiple: i.config.allow_multiple_interactors,
            active: i.is_active(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameTuning;
    use crate::game::catalog::Catalog;
    use crate::game::physics::Vec3;
    use crate::game::presentation::Headless;
    use crate::game::replication::NetMode;
    use std::sync::Arc;
    use uuid::Uuid;

    fn world_with(players: &[ActorId]) -> World {
        let mut world = World::new(
            NetMode::DedicatedServer,
            Arc::new(Catalog::builtin().expect("builtin catalog")),
            GameTuning::default(),
            7,
            Box::new(Headless),
        );
        for (i, id) in players.iter().enumerate() {
            world.spawn_character(*id, "Player", Vec3::new(i as f32 * 300.0, 0.0, 0.0), false);
        }
        world
    }

    fn updates(msg: &ServerMsg) -> &[ActorDelta] {
        match msg {
            ServerMsg::Snapshot { updates, .. } => updates,
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[test]
    fn snapshot_interval_throttles() {
        let mut builder = SnapshotBuilder::new(3);
        assert!(!builder.should_send());
        assert!(!builder.should_send());
        assert!(builder.should_send());
        builder.force_next();
        assert!(builder.should_send());
    }

    #[test]
    fn unchanged_state_produces_nothing() {
        let me = Uuid::new_v4();
        let world = world_with(&[me]);
        let builder = SnapshotBuilder::new(1);
        let mut channel = ReplicationChannel::new(me);

        let first = builder.build(&mut channel, 1, 0, &world).expect("initial snapshot");
        assert_eq!(updates(&first).len(), 1);
        assert!(builder.build(&mut channel, 2, 0, &world).is_none());
    }

    #[test]
    fn health_goes_to_the_owner_only() {
        let (me, other) = (Uuid::new_v4(), Uuid::new_v4());
        let mut world = world_with(&[me, other]);
        let builder = SnapshotBuilder::new(1);
        let mut mine = ReplicationChannel::new(me);
        let mut theirs = ReplicationChannel::new(other);
        builder.build(&mut mine, 1, 0, &world);
        builder.build(&mut theirs, 1, 0, &world);

        world.take_damage(me, 10.0, other, Some(other));
        let to_me = builder.build(&mut mine, 2, 0, &world).expect("health delta");
        assert_eq!(updates(&to_me)[0].fields, vec![Field::Health(90.0)]);
        assert!(builder.build(&mut theirs, 2, 0, &world).is_none());
    }

    #[test]
    fn removed_actors_are_listed_once() {
        let (me, other) = (Uuid::new_v4(), Uuid::new_v4());
        let mut world = world_with(&[me, other]);
        let builder = SnapshotBuilder::new(1);
        let mut channel = ReplicationChannel::new(me);
        builder.build(&mut channel, 1, 0, &world);

        world.remove_character(other);
        match builder.build(&mut channel, 2, 0, &world) {
            Some(ServerMsg::Snapshot { removed, .. }) => assert_eq!(removed, vec![other]),
            other => panic!("expected removal, got {other:?}"),
        }
        assert!(!channel.knows(other));
        assert!(builder.build(&mut channel, 3, 0, &world).is_none());
    }

    #[test]
    fn weapon_item_is_sent_only_initially() {
        let me = Uuid::new_v4();
        let mut world = world_with(&[me]);
        world.give_item(me, "rifle", 1);
        let rifle = world
            .character(me)
            .and_then(|c| c.inventory.find_by_class("rifle"))
            .map(|i| i.id)
            .expect("rifle");
        world.equip_item(me, rifle).expect("equip");

        let builder = SnapshotBuilder::new(1);
        let mut channel = ReplicationChannel::new(me);
        let first = builder.build(&mut channel, 1, 0, &world).expect("initial");
        let weapon = updates(&first)
            .iter()
            .find(|d| d.kind == ActorKind::Weapon)
            .expect("weapon delta");
        assert!(weapon
            .fields
            .iter()
            .any(|f| matches!(f, Field::WeaponItem { config, .. } if config == "rifle")));
        assert!(!weapon.fields.iter().any(|f| matches!(f, Field::BurstCounter(_))));

        world.tick(1.0);
        if let Some(next) = builder.build(&mut channel, 2, 0, &world) {
            assert!(updates(&next)
                .iter()
                .flat_map(|d| d.fields.iter())
                .all(|f| !matches!(f, Field::WeaponItem { .. })));
        }
    }
}
