//! Client-side replica of the world
//!
//! Applies snapshots from the server, fires the rep-notify hooks that drive
//! cosmetic state, and predicts the local player's actions.

use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::GameTuning;
use crate::ws::protocol::{ActorDelta, ActorKind, ClientMsg, EquippedEntry, Field, InventoryView, ItemView, ServerMsg};

use super::catalog::Catalog;
use super::character::Character;
use super::combat::ThrownProjectile;
use super::inventory::Inventory;
use super::item::{EquipSlot, Item};
use super::loot::{LootContainer, Pickup};
use super::physics::{TraceChannel, Vec3, ViewPoint, EYE_HEIGHT};
use super::presentation::{Cue, Presentation};
use super::replication::{NetMode, NetRole};
use super::weapon::Weapon;
use super::world::World;
use super::{ActorId, ItemId};

pub struct ClientWorld {
    world: World,
    local: Option<ActorId>,
    notifications: Vec<String>,
    last_snapshot_tick: u64,
}

impl ClientWorld {
    pub fn new(catalog: Arc<Catalog>, tuning: GameTuning, fx: Box<dyn Presentation>) -> Self {
        Self {
            world: World::new(NetMode::Client, catalog, tuning, 0, fx),
            local: None,
            notifications: Vec::new(),
            last_snapshot_tick: 0,
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn local_id(&self) -> Option<ActorId> {
        self.local
    }

    pub fn local_character(&self) -> Option<&Character> {
        self.local.and_then(|id| self.world.character(id))
    }

    pub fn take_notifications(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notifications)
    }

    pub fn handle_message(&mut self, msg: ServerMsg) {
        match msg {
            ServerMsg::Welcome { actor_id, .. } => {
                tracing::info!(actor_id = %actor_id, "joined session");
                self.local = Some(actor_id);
            }
            ServerMsg::Snapshot {
                tick, updates, removed, ..
            } => {
                if tick < self.last_snapshot_tick {
                    tracing::debug!(tick, last = self.last_snapshot_tick, "out of order snapshot");
                }
                self.last_snapshot_tick = tick;
                self.apply_snapshot(updates, removed);
            }
            ServerMsg::Notification { text } => self.notifications.push(text),
            ServerMsg::Cue { actor, cue, .. } => self.world.env.fx.play_cue(actor, cue),
            ServerMsg::PlayerJoined { actor_id, name } => {
                tracing::debug!(actor_id = %actor_id, name, "player joined");
            }
            ServerMsg::PlayerLeft { actor_id } => {
                tracing::debug!(actor_id = %actor_id, "player left");
            }
            ServerMsg::Error { code, message } => {
                tracing::warn!(code, message, "server error");
            }
            ServerMsg::Pong { .. } => {}
        }
    }

    fn apply_snapshot(&mut self, updates: Vec<ActorDelta>, removed: Vec<ActorId>) {
        for id in removed {
            self.world.remove_actor(id);
        }
        for delta in updates {
            match delta.kind {
                ActorKind::Character => self.apply_character(delta.id, delta.fields),
                ActorKind::Weapon => self.apply_weapon(delta.id, delta.fields),
                ActorKind::Pickup => self.apply_pickup(delta.id, delta.fields),
                ActorKind::Container => self.apply_container(delta.id, delta.fields),
                ActorKind::Projectile => self.apply_projectile(delta.id, delta.fields),
            }
        }
        // Replicated state is not a locally generated event
        self.world.take_events();
    }

    fn apply_character(&mut self, id: ActorId, fields: Vec<Field>) {
        let locally_controlled = self.local == Some(id);
        let revived = fields.contains(&Field::Killer(None)) && self.world.character(id).is_some_and(|c| c.is_dead());
        if revived {
            self.world.remove_character(id);
        }
        if self.world.character(id).is_none() {
            let name = fields
                .iter()
                .find_map(|f| match f {
                    Field::Name(name) => Some(name.clone()),
                    _ => None,
                })
                .unwrap_or_else(|| "Player".to_string());
            let position = fields
                .iter()
                .find_map(|f| match f {
                    Field::Position(p) => Some(*p),
                    _ => None,
                })
                .unwrap_or(Vec3::ZERO);
            self.world.spawn_character(id, &name, position, locally_controlled);
        }

        let catalog = Arc::clone(self.world.catalog());
        let World {
            characters,
            interactables,
            env,
            ..
        } = &mut self.world;
        let Some(ch) = characters.get_mut(&id) else {
            return;
        };

        for field in fields {
            match field {
                Field::Name(name) => ch.name = name,
                Field::Position(position) => {
                    if !ch.locally_controlled {
                        ch.position = position;
                        ch.view = ViewPoint::new(position + Vec3::UP * EYE_HEIGHT, ch.view.direction);
                        env.collision.set_position(&id, position);
                    }
                }
                Field::Health(health) => ch.health = health,
                Field::MaxHealth(max) => ch.max_health = max,
                Field::Aiming(aiming) => ch.aiming = aiming,
                Field::Sprinting(sprinting) => ch.sprinting = sprinting,
                Field::Killer(Some(killer)) => {
                    if !ch.is_dead() {
                        ch.stop_fire(env);
                        ch.mark_dead(killer);
                        env.collision.set_channel_response(&id, TraceChannel::Weapon, false);
                        env.fx.play_cue(id, Cue::Death);
                    }
                }
                Field::Killer(None) => {}
                Field::LootSource(source) => ch.loot_source = source,
                Field::Equipped(entries) => ch.equipped = equipped_map(entries),
                Field::Inventory(view) => apply_inventory(&catalog, &mut ch.inventory, view),
                Field::EquippedWeapon(weapon) => {
                    if ch.weapon.as_ref().map(|w| w.id) != weapon && ch.weapon.is_some() {
                        ch.destroy_weapon(env);
                    }
                }
                Field::Interactable(view) => {
                    if let Some(corpse) = interactables.get_mut(&id) {
                        corpse.set_active(view.active);
                    }
                }
                other => tracing::debug!(actor_id = %id, field = ?other, "unexpected character field"),
            }
        }
    }

    fn apply_weapon(&mut self, id: ActorId, fields: Vec<Field>) {
        let owner = fields.iter().find_map(|f| match f {
            Field::WeaponOwner(owner) => *owner,
            _ => None,
        });
        let spawn = fields.iter().find_map(|f| match f {
            Field::WeaponItem { item, config } => Some((*item, config.clone())),
            _ => None,
        });

        let holder = self
            .world
            .characters()
            .find(|c| c.weapon.as_ref().is_some_and(|w| w.id == id))
            .map(|c| c.id);
        let holder = match (holder, owner, spawn) {
            (Some(holder), _, _) => holder,
            (None, Some(owner), Some((item, config))) => {
                if !self.spawn_weapon(id, owner, item, &config) {
                    return;
                }
                owner
            }
            _ => {
                tracing::debug!(weapon_id = %id, "delta for unknown weapon");
                return;
            }
        };

        let World { characters, env, .. } = &mut self.world;
        let Some(ch) = characters.get_mut(&holder) else {
            return;
        };
        for field in fields {
            match field {
                Field::AmmoInClip(ammo) => {
                    ch.with_weapon(env, |w, _, _| w.apply_ammo_in_clip(ammo));
                }
                Field::BurstCounter(count) => {
                    ch.with_weapon(env, |w, env, _| w.apply_burst_counter(count, env));
                }
                Field::PendingReload(pending) => {
                    ch.with_weapon(env, |w, env, wl| w.apply_pending_reload(pending, env, wl));
                }
                Field::WeaponItem { .. } | Field::WeaponOwner(_) => {}
                other => tracing::debug!(weapon_id = %id, field = ?other, "unexpected weapon field"),
            }
        }
    }

    fn spawn_weapon(&mut self, id: ActorId, owner: ActorId, item: ItemId, config_id: &str) -> bool {
        let catalog = self.world.catalog();
        let Some(config) = catalog.weapon(config_id) else {
            tracing::warn!(weapon = config_id, "replicated weapon with unknown configuration");
            return false;
        };
        let Some(ammo) = catalog.item(&config.ammo_class) else {
            tracing::warn!(weapon = config_id, "replicated weapon with unknown ammo class");
            return false;
        };
        let local = self.local == Some(owner);
        let role = if local {
            NetRole::AutonomousProxy
        } else {
            NetRole::SimulatedProxy
        };

        let World { characters, env, .. } = &mut self.world;
        let Some(ch) = characters.get_mut(&owner) else {
            tracing::debug!(weapon_id = %id, owner = %owner, "weapon arrived before its owner");
            return false;
        };
        ch.destroy_weapon(env);
        ch.weapon = Some(Weapon::new(id, item, config, ammo, owner, role, local));
        ch.with_weapon(env, |w, env, wl| w.on_equip(env, wl));
        true
    }

    fn apply_pickup(&mut self, id: ActorId, fields: Vec<Field>) {
        let mut position = None;
        let mut stack = None;
        for field in fields {
            match field {
                Field::Position(p) => position = Some(p),
                Field::Stack(view) => stack = Some(view),
                _ => {}
            }
        }
        let item = stack.and_then(|view| item_from_view(self.world.catalog(), &view));

        if let Some(pickup) = self.world.pickups.get_mut(&id) {
            if let Some(item) = item {
                pickup.item = item;
            }
            if let Some(p) = position {
                pickup.position = p;
                self.world.env.collision.set_position(&id, p);
            }
            return;
        }
        let Some(item) = item else {
            tracing::debug!(actor_id = %id, "pickup without a known stack");
            return;
        };
        self.world.insert_pickup(Pickup {
            id,
            item,
            position: position.unwrap_or(Vec3::ZERO),
            spawner: None,
        });
    }

    fn apply_container(&mut self, id: ActorId, fields: Vec<Field>) {
        if !self.world.containers.contains_key(&id) {
            let name = fields
                .iter()
                .find_map(|f| match f {
                    Field::Name(name) => Some(name.as_str()),
                    _ => None,
                })
                .unwrap_or("Container");
            let position = fields
                .iter()
                .find_map(|f| match f {
                    Field::Position(p) => Some(*p),
                    _ => None,
                })
                .unwrap_or(Vec3::ZERO);
            self.world.insert_container(LootContainer::new(id, name, position));
        }

        let catalog = Arc::clone(self.world.catalog());
        let World {
            containers,
            interactables,
            ..
        } = &mut self.world;
        let Some(container) = containers.get_mut(&id) else {
            return;
        };
        for field in fields {
            match field {
                Field::Inventory(view) => apply_inventory(&catalog, &mut container.inventory, view),
                Field::Interactable(view) => {
                    if let Some(i) = interactables.get_mut(&id) {
                        i.set_active(view.active);
                    }
                }
                _ => {}
            }
        }
    }

    fn apply_projectile(&mut self, id: ActorId, fields: Vec<Field>) {
        let projectile = self.world.projectiles.entry(id).or_insert_with(|| ThrownProjectile {
            id,
            // owner is not replicated
            owner: Uuid::nil(),
            throwable: String::new(),
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
        });
        for field in fields {
            match field {
                Field::Name(throwable) => projectile.throwable = throwable,
                Field::Position(p) => projectile.position = p,
                _ => {}
            }
        }
    }

    // -- local input -----------------------------------------------------------

    fn with_local(&mut self, f: impl FnOnce(&mut World, ActorId)) {
        match self.local {
            Some(id) => f(&mut self.world, id),
            None => tracing::debug!("input before welcome"),
        }
    }

    pub fn update_view(&mut self, position: Vec3, direction: Vec3) {
        let Some(id) = self.local else {
            return;
        };
        let view = ViewPoint::new(position + Vec3::UP * EYE_HEIGHT, direction);
        self.world.update_view(id, position, view);
        self.world.env.outbox.request(ClientMsg::UpdateView { position, view });
    }

    pub fn start_fire(&mut self) {
        self.with_local(|w, id| w.start_fire(id));
    }

    pub fn stop_fire(&mut self) {
        self.with_local(|w, id| w.stop_fire(id));
    }

    pub fn reload(&mut self) {
        self.with_local(|w, id| w.reload(id));
    }

    pub fn begin_interact(&mut self) {
        self.with_local(|w, id| w.begin_interact(id));
    }

    pub fn end_interact(&mut self) {
        self.with_local(|w, id| w.end_interact(id));
    }

    pub fn use_item(&mut self, item: ItemId) {
        self.with_local(|w, id| w.use_item(id, item));
    }

    pub fn drop_item(&mut self, item: ItemId, quantity: u32) {
        self.with_local(|w, id| {
            w.drop_item(id, item, quantity);
        });
    }

    pub fn loot_item(&mut self, item: ItemId) {
        self.with_local(|w, id| w.loot_item(id, item));
    }

    pub fn close_loot(&mut self) {
        self.with_local(|w, id| w.set_loot_source(id, None));
    }

    pub fn use_throwable(&mut self) {
        self.with_local(|w, id| {
            w.use_throwable(id);
        });
    }

    pub fn set_aiming(&mut self, aiming: bool) {
        self.with_local(|w, id| w.set_aiming(id, aiming));
    }

    pub fn set_sprinting(&mut self, sprinting: bool) {
        self.with_local(|w, id| w.set_sprinting(id, sprinting));
    }

    /// Advance local timers and collect requests for the server
    pub fn tick(&mut self, dt: f32) -> Vec<ClientMsg> {
        self.world.tick(dt);
        for note in self.world.env.outbox.take_notifications() {
            if let ServerMsg::Notification { text } = note.message {
                self.notifications.push(text);
            }
        }
        self.world.take_events();
        self.world.env.outbox.take_requests()
    }
}

fn equipped_map(entries: Vec<EquippedEntry>) -> BTreeMap<EquipSlot, ItemId> {
    entries.into_iter().map(|e| (e.slot, e.item)).collect()
}

fn item_from_view(catalog: &Catalog, view: &ItemView) -> Option<Item> {
    let Some(class) = catalog.item(&view.class) else {
        tracing::warn!(item = %view.class, "replicated item with unknown class");
        return None;
    };
    let mut item = Item::with_id(view.id, class, view.quantity);
    item.equipped = view.equipped;
    Some(item)
}

fn apply_inventory(catalog: &Catalog, inventory: &mut Inventory, view: InventoryView) {
    if view.version == inventory.version() && inventory.len() == view.items.len() {
        return;
    }
    let items = view.items.iter().filter_map(|v| item_from_view(catalog, v)).collect();
    inventory.apply_replicated(items, view.capacity, view.weight_capacity, view.version);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::presentation::{Headless, SharedPresentationLog};
    use crate::game::snapshot::{ReplicationChannel, SnapshotBuilder};

    fn catalog() -> Arc<Catalog> {
        Arc::new(Catalog::builtin().expect("builtin catalog"))
    }

    fn server() -> World {
        World::new(NetMode::DedicatedServer, catalog(), GameTuning::default(), 3, Box::new(Headless))
    }

    fn sync(server: &World, channel: &mut ReplicationChannel, client: &mut ClientWorld) {
        if let Some(msg) = SnapshotBuilder::new(1).build(channel, server.tick_count(), 0, server) {
            client.handle_message(msg);
        }
    }

    #[test]
    fn snapshot_builds_replica_actors() {
        let me = Uuid::new_v4();
        let mut server = server();
        server.spawn_character(me, "Me", Vec3::ZERO, false);
        server.spawn_container("Crate", Vec3::new(500.0, 0.0, 0.0), Some("food"));
        let apples = server.catalog().item("apple").expect("apple");
        server.spawn_pickup(Item::new(apples, 2), Vec3::new(0.0, 500.0, 0.0), None);

        let mut client = ClientWorld::new(catalog(), GameTuning::default(), Box::new(Headless));
        client.handle_message(ServerMsg::Welcome {
            actor_id: me,
            server_time: 0,
        });
        let mut channel = ReplicationChannel::new(me);
        sync(&server, &mut channel, &mut client);

        let local = client.local_character().expect("local character");
        assert_eq!(local.role, NetRole::AutonomousProxy);
        assert_eq!(local.health(), 100.0);
        assert_eq!(client.world().containers().count(), 1);
        assert_eq!(client.world().pickups().next().map(|p| p.item.quantity()), Some(2));
        let crate_items = client.world().containers().next().map(|c| c.inventory.len());
        assert_eq!(crate_items, server.containers().next().map(|c| c.inventory.len()));
    }

    #[test]
    fn replicated_death_plays_once() {
        let (me, other) = (Uuid::new_v4(), Uuid::new_v4());
        let mut server = server();
        server.spawn_character(me, "Me", Vec3::ZERO, false);
        server.spawn_character(other, "Other", Vec3::new(300.0, 0.0, 0.0), false);

        let log = SharedPresentationLog::new();
        let mut client = ClientWorld::new(catalog(), GameTuning::default(), Box::new(log.clone()));
        client.handle_message(ServerMsg::Welcome {
            actor_id: me,
            server_time: 0,
        });
        let mut channel = ReplicationChannel::new(me);
        sync(&server, &mut channel, &mut client);

        server.take_damage(other, 200.0, me, Some(me));
        sync(&server, &mut channel, &mut client);
        sync(&server, &mut channel, &mut client);

        let corpse = client.world().character(other).expect("corpse");
        assert!(corpse.is_dead());
        assert_eq!(corpse.killer(), Some(me));
        assert_eq!(log.count(Cue::Death), 1);
        assert!(client.world().interactables()[&other].is_active());
    }

    #[test]
    fn requests_are_forwarded_with_prediction() {
        let me = Uuid::new_v4();
        let mut server = server();
        server.spawn_character(me, "Me", Vec3::ZERO, false);
        server.give_item(me, "rifle", 1);
        let rifle = server
            .character(me)
            .and_then(|c| c.inventory.find_by_class("rifle"))
            .map(|i| i.id)
            .expect("rifle");
        server.equip_item(me, rifle).expect("equip");

        let mut client = ClientWorld::new(catalog(), GameTuning::default(), Box::new(Headless));
        client.handle_message(ServerMsg::Welcome {
            actor_id: me,
            server_time: 0,
        });
        let mut channel = ReplicationChannel::new(me);
        sync(&server, &mut channel, &mut client);
        assert!(client.local_character().is_some_and(|c| c.weapon.is_some()));

        client.set_sprinting(true);
        client.close_loot();
        let requests = client.tick(1.0 / 30.0);
        assert!(requests.contains(&ClientMsg::SetSprinting { sprinting: true }));
        assert!(requests.contains(&ClientMsg::SetLootSource { source: None }));
        assert!(client.local_character().is_some_and(|c| c.is_sprinting()));
    }
}
