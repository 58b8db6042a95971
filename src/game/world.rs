//! Container of every gameplay actor in one participant's simulation
//!
//! The server runs an authoritative `World`; clients run one in `NetMode::Client`
//! that is filled from snapshots and predicts the local player's actions.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::GameTuning;
use crate::ws::protocol::{ClientMsg, ServerMsg};

use super::catalog::Catalog;
use super::character::{Character, EquipError};
use super::combat::{CombatSystem, PointDamage, ThrownProjectile};
use super::interaction::Interactables;
use super::inventory::{AddOutcome, Inventory, ItemAddResult};
use super::item::{EquipSlot, Item, ItemClassId};
use super::loot::{corpse_interactable, ItemSpawner, LootContainer, LootTable, Pickup};
use super::physics::{Collider, TraceChannel, Vec3, ViewPoint};
use super::presentation::{Cue, Presentation};
use super::replication::{NetMode, NetRole};
use super::sim::{Env, TimerTask};
use super::{ActorId, ItemId};

const PICKUP_RADIUS: f32 = 20.0;
const CONTAINER_RADIUS: f32 = 40.0;
/// Half-size of the square area used for random placement
const WORLD_EXTENT: f32 = 2_000.0;
/// Spacing between pickups produced by one spawn point
const SPAWN_SPACING: f32 = 30.0;
/// How far a reported view location may sit from the character's eye point
const MAX_EYE_OFFSET: f32 = 25.0;

/// Something the session layer reacts to
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    Died { victim: ActorId, killer: ActorId },
    ItemTaken { character: ActorId, class: ItemClassId, quantity: u32 },
    CorpseExpired { character: ActorId },
    ActorRemoved { actor: ActorId },
}

pub struct World {
    pub env: Env,
    catalog: Arc<Catalog>,
    tuning: GameTuning,
    pub(crate) characters: HashMap<ActorId, Character>,
    pub(crate) interactables: Interactables,
    pub(crate) pickups: HashMap<ActorId, Pickup>,
    pub(crate) containers: HashMap<ActorId, LootContainer>,
    pub(crate) projectiles: HashMap<ActorId, ThrownProjectile>,
    spawners: Vec<ItemSpawner>,
    rng: ChaCha8Rng,
    events: Vec<GameEvent>,
    tick: u64,
}

impl World {
    pub fn new(mode: NetMode, catalog: Arc<Catalog>, tuning: GameTuning, seed: u64, fx: Box<dyn Presentation>) -> Self {
        Self {
            env: Env::new(mode, fx),
            catalog,
            tuning,
            characters: HashMap::new(),
            interactables: Interactables::new(),
            pickups: HashMap::new(),
            containers: HashMap::new(),
            projectiles: HashMap::new(),
            spawners: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            events: Vec::new(),
            tick: 0,
        }
    }

    pub fn is_authority(&self) -> bool {
        self.env.mode.is_server()
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn tuning(&self) -> &GameTuning {
        &self.tuning
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn now(&self) -> f64 {
        self.env.now
    }

    pub fn character(&self, id: ActorId) -> Option<&Character> {
        self.characters.get(&id)
    }

    pub fn character_mut(&mut self, id: ActorId) -> Option<&mut Character> {
        self.characters.get_mut(&id)
    }

    pub fn characters(&self) -> impl Iterator<Item = &Character> {
        self.characters.values()
    }

    pub fn pickup(&self, id: ActorId) -> Option<&Pickup> {
        self.pickups.get(&id)
    }

    pub fn pickups(&self) -> impl Iterator<Item = &Pickup> {
        self.pickups.values()
    }

    pub fn container(&self, id: ActorId) -> Option<&LootContainer> {
        self.containers.get(&id)
    }

    pub fn containers(&self) -> impl Iterator<Item = &LootContainer> {
        self.containers.values()
    }

    pub fn projectiles(&self) -> impl Iterator<Item = &ThrownProjectile> {
        self.projectiles.values()
    }

    pub fn interactables(&self) -> &Interactables {
        &self.interactables
    }

    pub fn spawners(&self) -> &[ItemSpawner] {
        &self.spawners
    }

    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    /// Inventory of a container or character
    pub fn inventory_of(&self, owner: ActorId) -> Option<&Inventory> {
        if let Some(container) = self.containers.get(&owner) {
            return Some(&container.inventory);
        }
        self.characters.get(&owner).map(|c| &c.inventory)
    }

    fn inventory_of_mut(&mut self, owner: ActorId) -> Option<&mut Inventory> {
        if let Some(container) = self.containers.get_mut(&owner) {
            return Some(&mut container.inventory);
        }
        self.characters.get_mut(&owner).map(|c| &mut c.inventory)
    }

    // -- population ----------------------------------------------------------

    pub fn random_spawn_point(&mut self) -> Vec3 {
        Vec3::new(
            self.rng.gen_range(-WORLD_EXTENT..WORLD_EXTENT),
            self.rng.gen_range(-WORLD_EXTENT..WORLD_EXTENT),
            0.0,
        )
    }

    /// Containers and spawn points for a fresh server world
    pub fn populate_default(&mut self) {
        for i in 0..4 {
            let position = self.random_spawn_point();
            let (name, table) = if i % 2 == 0 {
                ("Military Crate", "military")
            } else {
                ("Food Crate", "food")
            };
            self.spawn_container(name, position, Some(table));
        }
        for _ in 0..8 {
            let position = self.random_spawn_point();
            self.add_spawner(ItemSpawner::new(position, "world", (30.0, 90.0)));
        }
        tracing::info!(
            containers = self.containers.len(),
            spawners = self.spawners.len(),
            pickups = self.pickups.len(),
            "world populated"
        );
    }

    pub fn spawn_character(&mut self, id: ActorId, name: &str, position: Vec3, locally_controlled: bool) -> &mut Character {
        if self.characters.contains_key(&id) {
            tracing::warn!(actor_id = %id, "character respawned over a live actor");
            self.remove_character(id);
        }
        let role = if self.is_authority() {
            NetRole::Authority
        } else if locally_controlled {
            NetRole::AutonomousProxy
        } else {
            NetRole::SimulatedProxy
        };
        self.env.collision.insert_pawn(id, position);
        self.interactables.insert(id, corpse_interactable(id, name));
        tracing::debug!(actor_id = %id, name, ?role, "character spawned");
        self.characters
            .entry(id)
            .or_insert_with(|| Character::new(id, name, role, locally_controlled, position))
    }

    pub fn remove_character(&mut self, id: ActorId) {
        self.drop_focus_on(id);
        let Some(mut character) = self.characters.remove(&id) else {
            return;
        };
        self.env.cancel(&mut character.lifespan_timer);
        if let Some(mut weapon) = character.weapon.take() {
            weapon.destroy(&mut self.env);
        }
        let who = character.interactor();
        character.interaction.couldnt_find(&who, &mut self.env, &mut self.interactables);
        character.interaction.reset(&mut self.env);

        self.env.collision.remove(&id);
        self.interactables.remove(&id);
        self.clear_loot_sources_for(id);
        self.events.push(GameEvent::ActorRemoved { actor: id });
        tracing::debug!(actor_id = %id, "character removed");
    }

    /// Give a character items from the catalog
    pub fn give_item(&mut self, character: ActorId, class_id: &str, quantity: u32) -> Option<ItemAddResult> {
        let class = self.catalog.item(class_id)?;
        let character = self.characters.get_mut(&character)?;
        Some(character.inventory.try_add(&class, quantity))
    }

    pub fn spawn_pickup(&mut self, item: Item, position: Vec3, spawner: Option<usize>) -> ActorId {
        let id = Uuid::new_v4();
        self.insert_pickup(Pickup {
            id,
            item,
            position,
            spawner,
        });
        id
    }

    pub(crate) fn insert_pickup(&mut self, pickup: Pickup) {
        let id = pickup.id;
        self.env
            .collision
            .insert(id, pickup.position, vec![Collider::sphere(Vec3::ZERO, PICKUP_RADIUS)]);
        self.env.collision.set_channel_response(&id, TraceChannel::Weapon, false);
        self.interactables.insert(id, pickup.interactable());
        self.pickups.insert(id, pickup);
    }

    pub fn remove_pickup(&mut self, id: ActorId) {
        self.drop_focus_on(id);
        let Some(pickup) = self.pickups.remove(&id) else {
            return;
        };
        self.env.collision.remove(&id);
        self.interactables.remove(&id);
        self.events.push(GameEvent::ActorRemoved { actor: id });

        if let Some(index) = pickup.spawner {
            let emptied = self
                .spawners
                .get_mut(index)
                .map(|s| s.release(id))
                .unwrap_or(false);
            if emptied && self.is_authority() {
                self.schedule_respawn(index);
            }
        }
    }

    /// Remove any kind of actor; weapons are torn down on their owner
    pub fn remove_actor(&mut self, id: ActorId) {
        if self.characters.contains_key(&id) {
            self.remove_character(id);
        } else if self.pickups.contains_key(&id) {
            self.remove_pickup(id);
        } else if self.containers.contains_key(&id) {
            self.drop_focus_on(id);
            self.containers.remove(&id);
            self.env.collision.remove(&id);
            self.interactables.remove(&id);
            self.clear_loot_sources_for(id);
            self.events.push(GameEvent::ActorRemoved { actor: id });
        } else if self.projectiles.remove(&id).is_some() {
            self.events.push(GameEvent::ActorRemoved { actor: id });
        } else if let Some(owner) = self
            .characters
            .values_mut()
            .find(|c| c.weapon.as_ref().is_some_and(|w| w.id == id))
        {
            owner.destroy_weapon(&mut self.env);
        }
    }

    /// Loot container, filled from `loot_table` when given
    pub fn spawn_container(&mut self, name: &str, position: Vec3, loot_table: Option<&str>) -> ActorId {
        let id = Uuid::new_v4();
        let mut container = LootContainer::new(id, name, position);
        if let Some(table_id) = loot_table {
            match self.catalog.loot_table(table_id) {
                Some(table) => fill_from_table(&self.catalog, &mut self.rng, &mut container.inventory, &table),
                None => tracing::warn!(loot_table = table_id, "unknown loot table, container left empty"),
            }
        }
        self.insert_container(container);
        id
    }

    pub(crate) fn insert_container(&mut self, container: LootContainer) {
        let id = container.id;
        self.env
            .collision
            .insert(id, container.position, vec![Collider::sphere(Vec3::ZERO, CONTAINER_RADIUS)]);
        self.interactables.insert(id, container.interactable());
        self.containers.insert(id, container);
    }

    pub fn add_spawner(&mut self, spawner: ItemSpawner) -> usize {
        self.spawners.push(spawner);
        let index = self.spawners.len() - 1;
        self.spawn_from_spawner(index);
        index
    }

    fn spawn_from_spawner(&mut self, index: usize) {
        let Some(spawner) = self.spawners.get(index) else {
            return;
        };
        if !spawner.spawned.is_empty() {
            return;
        }
        let origin = spawner.position;
        let Some(table) = self.catalog.loot_table(&spawner.loot_table) else {
            tracing::warn!(loot_table = %spawner.loot_table, "spawner references unknown loot table");
            return;
        };
        let Some(classes) = table.pick_row(&mut self.rng).map(|row| row.items.clone()) else {
            self.schedule_respawn(index);
            return;
        };

        let mut spawned = Vec::with_capacity(classes.len());
        for (i, class_id) in classes.iter().enumerate() {
            let Some(class) = self.catalog.item(class_id) else {
                continue;
            };
            let quantity = class.default_quantity;
            let position = origin + Vec3::FORWARD * (i as f32 * SPAWN_SPACING);
            spawned.push(self.spawn_pickup(Item::new(class, quantity), position, Some(index)));
        }
        if let Some(spawner) = self.spawners.get_mut(index) {
            spawner.spawned = spawned;
        }
    }

    fn schedule_respawn(&mut self, index: usize) {
        let Some(spawner) = self.spawners.get(index) else {
            return;
        };
        let delay = spawner.respawn_delay(&mut self.rng);
        self.env.schedule(delay, TimerTask::ItemRespawn { spawner: index });
    }

    // -- simulation step -----------------------------------------------------

    /// Advance the clock by `dt` seconds
    pub fn tick(&mut self, dt: f32) {
        self.tick += 1;
        self.env.now += f64::from(dt);
        while let Some((_, task)) = self.env.timers.pop_due(self.env.now) {
            self.run_task(task);
        }
        self.run_interaction_checks();
        for projectile in self.projectiles.values_mut() {
            projectile.update(dt);
        }
        self.resolve_damage();
    }

    fn run_task(&mut self, task: TimerTask) {
        match task {
            TimerTask::Weapon { owner, weapon, timer } => {
                let Some(character) = self.characters.get_mut(&owner) else {
                    return;
                };
                if character.weapon.as_ref().map(|w| w.id) != Some(weapon) {
                    tracing::trace!(actor_id = %owner, weapon_id = %weapon, "stale weapon timer");
                    return;
                }
                character.with_weapon(&mut self.env, |w, env, wl| w.on_timer(timer, env, wl));
            }
            TimerTask::Interact { character } => {
                let Some(ch) = self.characters.get_mut(&character) else {
                    return;
                };
                let who = ch.interactor();
                if let Some(target) = ch.interaction.on_timer(&who, &mut self.env, &self.interactables) {
                    self.perform_interact(character, target);
                }
            }
            TimerTask::CorpseExpire { character } => {
                if let Some(ch) = self.characters.get_mut(&character) {
                    ch.lifespan_timer = None;
                }
                self.events.push(GameEvent::CorpseExpired { character });
                self.remove_character(character);
            }
            TimerTask::ProjectileExpire { projectile } => {
                if self.projectiles.remove(&projectile).is_some() {
                    self.events.push(GameEvent::ActorRemoved { actor: projectile });
                }
            }
            TimerTask::ItemRespawn { spawner } => self.spawn_from_spawner(spawner),
        }
    }

    fn run_interaction_checks(&mut self) {
        let frequency = self.tuning.interaction_check_frequency;
        let distance = self.tuning.interaction_check_distance;
        let World {
            characters,
            interactables,
            env,
            ..
        } = self;
        for character in characters.values_mut() {
            if character.dead {
                continue;
            }
            let who = character.interactor();
            if character.interaction.check_due(&who, env, frequency) {
                character.interaction.perform_check(&who, distance, env, interactables);
            }
        }
    }

    /// Apply queued point damage
    pub fn resolve_damage(&mut self) {
        let pending = std::mem::take(&mut self.env.outbox.damage);
        for damage in pending {
            self.apply_point_damage(damage);
        }
    }

    pub fn apply_point_damage(&mut self, damage: PointDamage) -> f32 {
        tracing::trace!(
            target = %damage.target,
            amount = damage.amount,
            kind = ?damage.damage_type,
            bone = ?damage.bone,
            "point damage"
        );
        self.take_damage(damage.target, damage.amount, damage.causer, damage.instigator)
    }

    /// Damage after gear defence; returns the health actually removed
    pub fn take_damage(&mut self, target: ActorId, amount: f32, causer: ActorId, instigator: Option<ActorId>) -> f32 {
        if !self.is_authority() {
            return 0.0;
        }
        let Some(character) = self.characters.get_mut(&target) else {
            tracing::debug!(target = %target, causer = %causer, "damage for unknown actor");
            return 0.0;
        };
        if character.dead {
            return 0.0;
        }
        let scaled = CombatSystem::apply_defence(amount, character.defence_multipliers());
        let applied = -character.modify_health(-scaled);
        tracing::debug!(target = %target, causer = %causer, amount, applied, "damage taken");

        if character.needs_death_resolution() {
            self.resolve_death(target, instigator);
        }
        applied
    }

    fn resolve_death(&mut self, victim: ActorId, instigator: Option<ActorId>) {
        let killer = instigator
            .filter(|k| *k != victim && self.characters.contains_key(k))
            .unwrap_or(victim);
        let corpse_lifespan = self.tuning.corpse_lifespan;
        let World {
            characters,
            interactables,
            env,
            events,
            ..
        } = self;
        let Some(character) = characters.get_mut(&victim) else {
            return;
        };
        if character.dead {
            return;
        }

        character.mark_dead(killer);
        character.stop_fire(env);
        character.unequip_all(env);
        character.loot_source = None;
        let who = character.interactor();
        character.interaction.couldnt_find(&who, env, interactables);
        character.interaction.reset(env);

        env.collision.set_channel_response(&victim, TraceChannel::Weapon, false);
        if let Some(corpse) = interactables.get_mut(&victim) {
            corpse.set_active(true);
        }
        env.cancel(&mut character.lifespan_timer);
        character.lifespan_timer = Some(env.schedule(corpse_lifespan, TimerTask::CorpseExpire { character: victim }));
        env.fx.play_cue(victim, Cue::Death);

        events.push(GameEvent::Died { victim, killer });
        tracing::info!(actor_id = %victim, killer = %killer, "character died");
    }

    // -- character actions ---------------------------------------------------

    fn with_character(&mut self, id: ActorId, f: impl FnOnce(&mut Character, &mut Env)) {
        match self.characters.get_mut(&id) {
            Some(character) => f(character, &mut self.env),
            None => tracing::debug!(actor_id = %id, "action for unknown character"),
        }
    }

    pub fn update_view(&mut self, id: ActorId, position: Vec3, view: ViewPoint) {
        if !position.is_finite() || !view.location.is_finite() || !view.direction.is_finite() {
            tracing::warn!(actor_id = %id, "non-finite view update dropped");
            return;
        }
        let Some(character) = self.characters.get_mut(&id) else {
            return;
        };
        if character.dead {
            return;
        }
        character.position = position;
        let eye = character.eye_location();
        let location = if view.location.distance(eye) > MAX_EYE_OFFSET {
            tracing::warn!(actor_id = %id, "view location away from the eye point, snapped back");
            eye
        } else {
            view.location
        };
        character.view = ViewPoint::new(location, view.direction);
        self.env.collision.set_position(&id, position);
    }

    pub fn start_fire(&mut self, id: ActorId) {
        self.with_character(id, |ch, env| ch.start_fire(env));
    }

    pub fn stop_fire(&mut self, id: ActorId) {
        self.with_character(id, |ch, env| ch.stop_fire(env));
    }

    pub fn reload(&mut self, id: ActorId) {
        self.with_character(id, |ch, env| ch.start_reload(env));
    }

    pub fn begin_interact(&mut self, id: ActorId) {
        let distance = self.tuning.interaction_check_distance;
        let target = {
            let World {
                characters,
                interactables,
                env,
                ..
            } = self;
            let Some(character) = characters.get_mut(&id) else {
                return;
            };
            if character.dead {
                return;
            }
            let who = character.interactor();
            character.interaction.begin_interact(&who, distance, env, interactables)
        };
        if let Some(target) = target {
            self.perform_interact(id, target);
        }
    }

    pub fn end_interact(&mut self, id: ActorId) {
        let World {
            characters,
            interactables,
            env,
            ..
        } = self;
        if let Some(character) = characters.get_mut(&id) {
            let who = character.interactor();
            character.interaction.end_interact(&who, env, interactables);
        }
    }

    /// Completed interaction; only the authority changes anything
    fn perform_interact(&mut self, character: ActorId, target: ActorId) {
        if !self.is_authority() {
            return;
        }
        if self.pickups.contains_key(&target) {
            self.take_pickup(character, target);
        } else if self.containers.contains_key(&target) || self.characters.get(&target).is_some_and(|c| c.dead) {
            self.set_loot_source(character, Some(target));
        } else {
            tracing::debug!(actor_id = %character, target = %target, "interaction with nothing to do");
        }
    }

    fn take_pickup(&mut self, character: ActorId, pickup: ActorId) {
        let Some(item) = self.pickups.get(&pickup).map(|p| p.item.clone()) else {
            return;
        };
        let Some(ch) = self.characters.get_mut(&character) else {
            return;
        };
        let result = ch.inventory.try_add_item(&item);
        if result.outcome != AddOutcome::AddedAll {
            self.env
                .outbox
                .notify_owner(character, ServerMsg::Notification { text: result.reason });
        }
        let given = result.amount_actually_given;
        if given == 0 {
            return;
        }

        self.events.push(GameEvent::ItemTaken {
            character,
            class: item.class_id().to_string(),
            quantity: given,
        });
        let remaining = item.quantity().saturating_sub(given);
        if remaining == 0 {
            self.remove_pickup(pickup);
        } else if let Some(p) = self.pickups.get_mut(&pickup) {
            p.item.set_quantity(remaining);
        }
    }

    /// Open or close a loot view on a container or corpse
    pub fn set_loot_source(&mut self, character: ActorId, source: Option<ActorId>) {
        if !self.is_authority() {
            self.env.outbox.request(ClientMsg::SetLootSource { source });
            if source.is_none() {
                if let Some(ch) = self.characters.get_mut(&character) {
                    ch.loot_source = None;
                }
            }
            return;
        }

        if let Some(s) = source {
            let lootable = s != character
                && (self.containers.contains_key(&s) || self.characters.get(&s).is_some_and(|c| c.dead));
            if !lootable {
                tracing::debug!(actor_id = %character, source = %s, "not a loot source");
                return;
            }
        }
        let Some(ch) = self.characters.get_mut(&character) else {
            return;
        };
        if ch.dead && source.is_some() {
            return;
        }
        ch.loot_source = source;

        let lifespan = self.tuning.loot_source_lifespan;
        let Some(source) = source else {
            return;
        };
        if let Some(corpse) = self.characters.get_mut(&source) {
            self.env.cancel(&mut corpse.lifespan_timer);
            corpse.lifespan_timer = Some(
                self.env
                    .schedule(lifespan, TimerTask::CorpseExpire { character: source }),
            );
        }
    }

    fn clear_loot_sources_for(&mut self, owner: ActorId) {
        for character in self.characters.values_mut() {
            if character.loot_source == Some(owner) {
                character.loot_source = None;
            }
        }
    }

    /// Move a stack from the current loot source into the looter's inventory
    pub fn loot_item(&mut self, looter: ActorId, item: ItemId) {
        if !self.is_authority() {
            self.env.outbox.request(ClientMsg::LootItem { item });
            return;
        }
        let Some(source) = self
            .characters
            .get(&looter)
            .filter(|c| !c.dead)
            .and_then(|c| c.loot_source)
        else {
            tracing::debug!(actor_id = %looter, "loot request without a loot source");
            return;
        };
        let Some(stack) = self.inventory_of(source).and_then(|inv| inv.get(item)).cloned() else {
            tracing::debug!(actor_id = %looter, item_id = %item, "looted item not in source");
            return;
        };
        let Some(ch) = self.characters.get_mut(&looter) else {
            return;
        };
        let result = ch.inventory.try_add_item(&stack);

        if result.amount_actually_given > 0 {
            if let Some(inventory) = self.inventory_of_mut(source) {
                inventory.consume(item, result.amount_actually_given);
            }
            if let Some(owner) = self.characters.get_mut(&source) {
                owner.sync_equipment(&mut self.env);
            }
        }
        if result.outcome != AddOutcome::AddedAll {
            self.env
                .outbox
                .notify_owner(looter, ServerMsg::Notification { text: result.reason });
        }
    }

    pub fn use_item(&mut self, id: ActorId, item: ItemId) {
        let World {
            characters, env, catalog, ..
        } = self;
        if let Some(character) = characters.get_mut(&id) {
            character.use_item(item, catalog, env);
        }
    }

    pub fn equip_item(&mut self, id: ActorId, item: ItemId) -> Result<EquipSlot, EquipError> {
        let World {
            characters, env, catalog, ..
        } = self;
        let character = characters.get_mut(&id).ok_or(EquipError::NotInInventory)?;
        character.equip_item(item, catalog, env)
    }

    pub fn unequip_item(&mut self, id: ActorId, item: ItemId) -> Result<EquipSlot, EquipError> {
        let character = self.characters.get_mut(&id).ok_or(EquipError::NotEquipped)?;
        character.unequip_item(item, &mut self.env)
    }

    /// Drop part of a stack; returns the spawned pickup
    pub fn drop_item(&mut self, id: ActorId, item: ItemId, quantity: u32) -> Option<ActorId> {
        let character = self.characters.get_mut(&id)?;
        if character.dead {
            return None;
        }
        let position = character.position;
        let dropped = character.drop_item(item, quantity, &mut self.env)?;
        Some(self.spawn_pickup(dropped, position, None))
    }

    pub fn use_throwable(&mut self, id: ActorId) -> Option<ActorId> {
        let World {
            characters, env, catalog, ..
        } = self;
        let projectile = characters.get_mut(&id)?.use_throwable(catalog, env)?;
        let lifetime = catalog
            .throwable(&projectile.throwable)
            .map(|t| t.lifetime)
            .unwrap_or(0.0);
        let projectile_id = projectile.id;
        env.schedule(lifetime, TimerTask::ProjectileExpire { projectile: projectile_id });
        self.projectiles.insert(projectile_id, projectile);
        Some(projectile_id)
    }

    pub fn set_aiming(&mut self, id: ActorId, aiming: bool) {
        self.with_character(id, |ch, env| {
            ch.set_aiming(aiming, env);
        });
    }

    pub fn set_sprinting(&mut self, id: ActorId, sprinting: bool) {
        self.with_character(id, |ch, env| {
            ch.set_sprinting(sprinting, env);
        });
    }

    /// Execute a request forwarded by the client controlling `from`
    pub fn handle_request(&mut self, from: ActorId, msg: ClientMsg) {
        if !self.is_authority() {
            tracing::warn!(actor_id = %from, "client world received a request");
            return;
        }
        match msg {
            ClientMsg::Ping { .. } => {}
            ClientMsg::UpdateView { position, view } => self.update_view(from, position, view),
            ClientMsg::StartFire => self.start_fire(from),
            ClientMsg::StopFire => self.stop_fire(from),
            ClientMsg::StartReload => self.reload(from),
            ClientMsg::HandleFiring => self.with_character(from, |ch, env| {
                ch.with_weapon(env, |w, env, wl| w.server_handle_firing(env, wl));
            }),
            ClientMsg::HandleHit { hit } => self.with_character(from, |ch, env| {
                ch.with_weapon(env, |w, env, wl| w.server_handle_hit(env, wl, &hit));
            }),
            ClientMsg::MeleeHit { hit } => self.with_character(from, |ch, env| {
                ch.server_process_melee_hit(&hit, env);
            }),
            ClientMsg::BeginInteract => self.begin_interact(from),
            ClientMsg::EndInteract => self.end_interact(from),
            ClientMsg::UseItem { item } => self.use_item(from, item),
            ClientMsg::DropItem { item, quantity } => {
                self.drop_item(from, item, quantity);
            }
            ClientMsg::SetLootSource { source: None } => self.set_loot_source(from, None),
            ClientMsg::SetLootSource { source: Some(source) } => {
                tracing::debug!(actor_id = %from, source = %source, "clients open loot views by interacting");
            }
            ClientMsg::LootItem { item } => self.loot_item(from, item),
            ClientMsg::UseThrowable => {
                self.use_throwable(from);
            }
            ClientMsg::SetAiming { aiming } => self.set_aiming(from, aiming),
            ClientMsg::SetSprinting { sprinting } => self.set_sprinting(from, sprinting),
        }
    }

    /// End focus of every character looking at `target`
    fn drop_focus_on(&mut self, target: ActorId) {
        let World {
            characters,
            interactables,
            env,
            ..
        } = self;
        for character in characters.values_mut() {
            if character.interaction.viewed == Some(target) {
                let who = character.interactor();
                character.interaction.couldnt_find(&who, env, interactables);
            }
        }
    }
}

fn fill_from_table(catalog: &Catalog, rng: &mut ChaCha8Rng, inventory: &mut Inventory, table: &LootTable) {
    for row in table.roll(rng) {
        for class_id in &row.items {
            let Some(class) = catalog.item(class_id) else {
                continue;
            };
            let result = inventory.try_add(&class, class.default_quantity);
            if result.outcome != AddOutcome::AddedAll {
                tracing::debug!(item = %class_id, reason = %result.reason, "loot roll did not fit");
            }
        }
    }
}
