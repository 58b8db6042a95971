//! Player character: health, equipment slots and the glue between player
//! input and the weapon, interaction and inventory systems

use std::collections::BTreeMap;
use uuid::Uuid;

use crate::ws::protocol::{ClientMsg, ServerMsg};

use super::catalog::Catalog;
use super::combat::{ClaimedHit, CombatSystem, DamageType, MeleeConfig, PointDamage, ThrownProjectile};
use super::interaction::{InteractionData, Interactor};
use super::inventory::Inventory;
use super::item::{EquipSlot, Item, ItemKind};
use super::physics::{TraceChannel, Vec3, ViewPoint, WorldQuery, EYE_HEIGHT};
use super::presentation::Cue;
use super::replication::NetRole;
use super::scheduler::TimerHandle;
use super::sim::Env;
use super::weapon::{Weapon, Wielder};
use super::{ActorId, ItemId};

pub const DEFAULT_MAX_HEALTH: f32 = 100.0;
pub const INVENTORY_CAPACITY: usize = 20;
pub const INVENTORY_WEIGHT_CAPACITY: f32 = 80.0;
/// Fraction of the melee cooldown the server accepts between two hits
const MELEE_RATE_TOLERANCE: f64 = 0.5;

/// Rejected equipment change
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EquipError {
    #[error("Only the server can change equipment")]
    NotAuthority,

    #[error("That item is not in your inventory")]
    NotInInventory,

    #[error("{0} can't be equipped")]
    NotEquippable(String),

    #[error("That item is not equipped")]
    NotEquipped,

    #[error("Unknown weapon configuration '{0}'")]
    UnknownWeapon(String),
}

#[derive(Debug)]
pub struct Character {
    pub id: ActorId,
    pub name: String,
    pub role: NetRole,
    /// Driven by this participant's input
    pub locally_controlled: bool,
    pub position: Vec3,
    /// Camera eye point used for hit and focus traces
    pub view: ViewPoint,
    pub(crate) health: f32,
    pub(crate) max_health: f32,
    pub inventory: Inventory,
    pub(crate) equipped: BTreeMap<EquipSlot, ItemId>,
    pub weapon: Option<Weapon>,
    pub interaction: InteractionData,
    pub(crate) killer: Option<ActorId>,
    pub(crate) dead: bool,
    /// Inventory owner this character is looting from
    pub(crate) loot_source: Option<ActorId>,
    pub(crate) aiming: bool,
    pub(crate) sprinting: bool,
    pub melee: MeleeConfig,
    last_melee_time: Option<f64>,
    last_melee_hit: Option<f64>,
    /// Corpse cleanup timer
    pub(crate) lifespan_timer: Option<TimerHandle>,
}

impl Character {
    pub fn new(id: ActorId, name: &str, role: NetRole, locally_controlled: bool, position: Vec3) -> Self {
        let inventory = if role == NetRole::Authority {
            Inventory::new(id, INVENTORY_CAPACITY, INVENTORY_WEIGHT_CAPACITY)
        } else {
            Inventory::replica(id, INVENTORY_CAPACITY, INVENTORY_WEIGHT_CAPACITY)
        };
        Self {
            id,
            name: name.to_string(),
            role,
            locally_controlled,
            position,
            view: ViewPoint::new(position + Vec3::UP * EYE_HEIGHT, Vec3::FORWARD),
            health: DEFAULT_MAX_HEALTH,
            max_health: DEFAULT_MAX_HEALTH,
            inventory,
            equipped: BTreeMap::new(),
            weapon: None,
            interaction: InteractionData::default(),
            killer: None,
            dead: false,
            loot_source: None,
            aiming: false,
            sprinting: false,
            melee: MeleeConfig::default(),
            last_melee_time: None,
            last_melee_hit: None,
            lifespan_timer: None,
        }
    }

    pub fn has_authority(&self) -> bool {
        self.role == NetRole::Authority
    }

    pub fn health(&self) -> f32 {
        self.health
    }

    pub fn max_health(&self) -> f32 {
        self.max_health
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn killer(&self) -> Option<ActorId> {
        self.killer
    }

    pub fn loot_source(&self) -> Option<ActorId> {
        self.loot_source
    }

    pub fn is_aiming(&self) -> bool {
        self.aiming
    }

    pub fn is_sprinting(&self) -> bool {
        self.sprinting
    }

    pub fn equipped(&self) -> &BTreeMap<EquipSlot, ItemId> {
        &self.equipped
    }

    pub fn equipped_in(&self, slot: EquipSlot) -> Option<ItemId> {
        self.equipped.get(&slot).copied()
    }

    pub fn slot_of(&self, item: ItemId) -> Option<EquipSlot> {
        self.equipped
            .iter()
            .find(|(_, id)| **id == item)
            .map(|(slot, _)| *slot)
    }

    pub fn interactor(&self) -> Interactor {
        Interactor {
            id: self.id,
            view: self.view,
            authority: self.has_authority(),
            local: self.locally_controlled,
        }
    }

    /// Eye point derived from the body position rather than the reported camera
    pub fn eye_location(&self) -> Vec3 {
        self.position + Vec3::UP * EYE_HEIGHT
    }

    // -- health ------------------------------------------------------------

    /// Apply a clamped health change, returning the delta actually applied
    pub fn modify_health(&mut self, delta: f32) -> f32 {
        if !self.has_authority() || self.dead {
            return 0.0;
        }
        let (health, actual) = CombatSystem::apply_health_delta(self.health, self.max_health, delta);
        self.health = health;
        actual
    }

    /// Health hit zero but death has not been resolved yet
    pub fn needs_death_resolution(&self) -> bool {
        !self.dead && self.health <= 0.0
    }

    pub(crate) fn mark_dead(&mut self, killer: ActorId) {
        self.dead = true;
        self.killer = Some(killer);
        self.aiming = false;
        self.sprinting = false;
    }

    /// Damage multipliers of the equipped gear
    pub fn defence_multipliers(&self) -> Vec<f32> {
        self.equipped
            .values()
            .filter_map(|id| self.inventory.get(*id))
            .filter_map(|item| match item.class.kind {
                ItemKind::Gear {
                    damage_defence_multiplier,
                    ..
                } => Some(damage_defence_multiplier),
                _ => None,
            })
            .collect()
    }

    // -- weapon ------------------------------------------------------------

    /// Run `f` against the equipped weapon with this character as wielder
    pub(crate) fn with_weapon<R>(
        &mut self,
        env: &mut Env,
        f: impl FnOnce(&mut Weapon, &mut Env, &mut Wielder<'_>) -> R,
    ) -> Option<R> {
        let view = self.view;
        let weapon = self.weapon.as_mut()?;
        let mut wielder = Wielder {
            inventory: &mut self.inventory,
            view,
        };
        Some(f(weapon, env, &mut wielder))
    }

    /// Trigger pressed: fire the weapon, or melee when unarmed
    pub fn start_fire(&mut self, env: &mut Env) {
        if self.dead {
            return;
        }
        if self.weapon.is_some() {
            self.with_weapon(env, |w, env, wl| w.start_fire(env, wl));
        } else if self.locally_controlled {
            self.melee(env);
        }
    }

    pub fn stop_fire(&mut self, env: &mut Env) {
        self.with_weapon(env, |w, env, wl| w.stop_fire(env, wl));
    }

    pub fn start_reload(&mut self, env: &mut Env) {
        if self.dead {
            return;
        }
        self.with_weapon(env, |w, env, wl| w.start_reload(env, wl, false));
    }

    /// Unequip and tear down the spawned weapon
    pub(crate) fn destroy_weapon(&mut self, env: &mut Env) {
        let Some(mut weapon) = self.weapon.take() else {
            return;
        };
        let mut wielder = Wielder {
            inventory: &mut self.inventory,
            view: self.view,
        };
        weapon.on_unequip(env, &mut wielder);
        weapon.destroy(env);
        self.aiming = false;
    }

    // -- melee -------------------------------------------------------------

    /// Unarmed attack from local input, cooled down by the montage length
    pub fn melee(&mut self, env: &mut Env) {
        if self.dead {
            return;
        }
        let cooldown = f64::from(self.melee.montage.duration);
        if let Some(last) = self.last_melee_time {
            if env.now - last < cooldown {
                return;
            }
        }
        self.last_melee_time = Some(env.now);
        env.fx.play_montage(self.id, &self.melee.montage);

        let hit = env
            .collision
            .line_trace(
                self.view.location,
                self.view.direction,
                self.melee.distance,
                TraceChannel::Weapon,
                &[self.id],
            )
            .filter(|hit| hit.pawn);
        let Some(hit) = hit else {
            return;
        };
        let claimed = ClaimedHit {
            target: Some(hit.actor),
            impact_point: hit.impact_point,
            bone: hit.bone,
        };
        if self.has_authority() {
            self.server_process_melee_hit(&claimed, env);
        } else {
            env.outbox.request(ClientMsg::MeleeHit { hit: claimed });
        }
    }

    /// Validate a melee hit against range and cooldown, then queue damage
    pub fn server_process_melee_hit(&mut self, hit: &ClaimedHit, env: &mut Env) -> bool {
        if !self.has_authority() || self.dead {
            return false;
        }
        let Some(target) = hit.target.filter(|t| *t != self.id) else {
            return false;
        };
        let cooldown = f64::from(self.melee.montage.duration) * MELEE_RATE_TOLERANCE;
        if let Some(last) = self.last_melee_hit {
            if env.now - last < cooldown {
                tracing::debug!(actor_id = %self.id, "melee hit faster than attack rate, ignored");
                return false;
            }
        }
        let reach = self.eye_location().distance(hit.impact_point);
        if reach > self.melee.distance {
            tracing::debug!(actor_id = %self.id, reach, "melee hit out of range, ignored");
            return false;
        }

        self.last_melee_hit = Some(env.now);
        env.outbox.apply_damage(PointDamage {
            target,
            amount: self.melee.damage,
            damage_type: DamageType::Melee,
            causer: self.id,
            instigator: Some(self.id),
            impact_point: hit.impact_point,
            bone: hit.bone.clone(),
        });
        env.outbox.multicast(ServerMsg::Cue {
            actor: self.id,
            cue: Cue::MeleeSwing,
            location: Some(hit.impact_point),
        });
        true
    }

    // -- equipment -----------------------------------------------------------

    /// Put an item into its slot, evicting the previous occupant
    pub fn equip_item(&mut self, item: ItemId, catalog: &Catalog, env: &mut Env) -> Result<EquipSlot, EquipError> {
        if !self.has_authority() {
            return Err(EquipError::NotAuthority);
        }
        let class = self
            .inventory
            .get(item)
            .map(|i| i.class.clone())
            .ok_or(EquipError::NotInInventory)?;
        let slot = class
            .equip_slot()
            .ok_or_else(|| EquipError::NotEquippable(class.display_name.clone()))?;
        if self.equipped.get(&slot) == Some(&item) {
            return Ok(slot);
        }

        let weapon_parts = match &class.kind {
            ItemKind::Weapon { weapon } => {
                let config = catalog
                    .weapon(weapon)
                    .ok_or_else(|| EquipError::UnknownWeapon(weapon.clone()))?;
                let ammo = catalog
                    .item(&config.ammo_class)
                    .ok_or_else(|| EquipError::UnknownWeapon(weapon.clone()))?;
                Some((config, ammo))
            }
            _ => None,
        };

        if let Some(previous) = self.equipped.get(&slot).copied() {
            self.unequip_item(previous, env)?;
        }
        self.inventory.set_equipped(item, true);
        self.equipped.insert(slot, item);

        if let Some((config, ammo)) = weapon_parts {
            let mut weapon = Weapon::new(
                Uuid::new_v4(),
                item,
                config,
                ammo,
                self.id,
                self.role,
                self.locally_controlled,
            );
            let mut wielder = Wielder {
                inventory: &mut self.inventory,
                view: self.view,
            };
            weapon.on_equip(env, &mut wielder);
            self.weapon = Some(weapon);
        }

        tracing::debug!(actor_id = %self.id, item = %class.id, ?slot, "equipped");
        Ok(slot)
    }

    /// Clear the slot holding `item`
    pub fn unequip_item(&mut self, item: ItemId, env: &mut Env) -> Result<EquipSlot, EquipError> {
        if !self.has_authority() {
            return Err(EquipError::NotAuthority);
        }
        let slot = self.slot_of(item).ok_or(EquipError::NotEquipped)?;
        self.equipped.remove(&slot);
        self.inventory.set_equipped(item, false);
        if self.weapon.as_ref().is_some_and(|w| w.item == item) {
            self.destroy_weapon(env);
        }
        tracing::debug!(actor_id = %self.id, item_id = %item, ?slot, "unequipped");
        Ok(slot)
    }

    pub fn unequip_all(&mut self, env: &mut Env) {
        let items: Vec<ItemId> = self.equipped.values().copied().collect();
        for item in items {
            if let Err(err) = self.unequip_item(item, env) {
                tracing::warn!(actor_id = %self.id, item_id = %item, error = %err, "unequip failed");
            }
        }
    }

    /// Drop slots whose item left the inventory
    pub fn sync_equipment(&mut self, env: &mut Env) {
        let gone: Vec<(EquipSlot, ItemId)> = self
            .equipped
            .iter()
            .filter(|(_, id)| !self.inventory.contains(**id))
            .map(|(slot, id)| (*slot, *id))
            .collect();
        for (slot, item) in gone {
            self.equipped.remove(&slot);
            if self.weapon.as_ref().is_some_and(|w| w.item == item) {
                self.destroy_weapon(env);
            }
        }
    }

    // -- items -------------------------------------------------------------

    /// Use an inventory item: eat food, toggle equippables
    pub fn use_item(&mut self, item: ItemId, catalog: &Catalog, env: &mut Env) {
        if !self.has_authority() {
            env.outbox.request(ClientMsg::UseItem { item });
            return;
        }
        if self.dead {
            return;
        }
        let Some(class) = self.inventory.get(item).map(|i| i.class.clone()) else {
            tracing::debug!(actor_id = %self.id, item_id = %item, "use of item not in inventory");
            return;
        };

        match &class.kind {
            ItemKind::Food { heal_amount } => {
                let healed = self.modify_health(*heal_amount);
                let text = if healed.abs() > f32::EPSILON {
                    self.inventory.consume(item, 1);
                    format!("Ate {}, healed {:.0} health", class.display_name, healed)
                } else {
                    "Your health is already full".to_string()
                };
                env.outbox.notify_owner(self.id, ServerMsg::Notification { text });
            }
            ItemKind::Gear { .. } | ItemKind::Weapon { .. } | ItemKind::Throwable { .. } => {
                let result = if self.slot_of(item).is_some() {
                    self.unequip_item(item, env)
                } else {
                    self.equip_item(item, catalog, env)
                };
                if let Err(err) = result {
                    tracing::debug!(actor_id = %self.id, item_id = %item, error = %err, "equip toggle rejected");
                    env.outbox.notify_owner(
                        self.id,
                        ServerMsg::Notification {
                            text: err.to_string(),
                        },
                    );
                }
            }
            ItemKind::Misc | ItemKind::Ammo => {
                tracing::debug!(actor_id = %self.id, item = %class.id, "item has no use action");
            }
        }
    }

    /// Take up to `quantity` units out of the inventory as a new stack to place in the world
    pub fn drop_item(&mut self, item: ItemId, quantity: u32, env: &mut Env) -> Option<Item> {
        if !self.has_authority() {
            env.outbox.request(ClientMsg::DropItem { item, quantity });
            return None;
        }
        if quantity == 0 {
            return None;
        }
        let Some(class) = self.inventory.get(item).map(|i| i.class.clone()) else {
            tracing::debug!(actor_id = %self.id, item_id = %item, "drop of item not in inventory");
            return None;
        };
        if self.slot_of(item).is_some() {
            if let Err(err) = self.unequip_item(item, env) {
                tracing::warn!(actor_id = %self.id, item_id = %item, error = %err, "unequip before drop failed");
            }
        }
        let dropped = self.inventory.consume(item, quantity);
        (dropped > 0).then(|| Item::new(class, dropped))
    }

    /// Throw one unit of the equipped throwable
    pub fn use_throwable(&mut self, catalog: &Catalog, env: &mut Env) -> Option<ThrownProjectile> {
        if self.dead {
            return None;
        }
        let item_id = self.equipped_in(EquipSlot::Throwable)?;
        let (class, quantity) = self
            .inventory
            .get(item_id)
            .map(|i| (i.class.clone(), i.quantity()))?;
        let ItemKind::Throwable { throwable } = &class.kind else {
            return None;
        };
        let Some(config) = catalog.throwable(throwable) else {
            tracing::warn!(actor_id = %self.id, throwable = %throwable, "unknown throwable configuration");
            return None;
        };

        env.fx.play_montage(self.id, &config.toss_anim);
        if !self.has_authority() {
            if quantity <= 1 {
                self.equipped.remove(&EquipSlot::Throwable);
            }
            env.outbox.request(ClientMsg::UseThrowable);
            return None;
        }

        env.outbox.multicast(ServerMsg::Cue {
            actor: self.id,
            cue: Cue::ThrowableToss,
            location: Some(self.view.location),
        });
        self.inventory.consume(item_id, 1);
        self.sync_equipment(env);

        Some(ThrownProjectile {
            id: Uuid::new_v4(),
            owner: self.id,
            throwable: config.id.clone(),
            position: self.view.location,
            velocity: self.view.direction * config.initial_speed,
        })
    }

    // -- movement flags ------------------------------------------------------

    /// Aiming needs a weapon and cancels sprinting
    pub fn set_aiming(&mut self, aiming: bool, env: &mut Env) -> bool {
        if aiming && (self.weapon.is_none() || self.dead) {
            return false;
        }
        if !self.has_authority() {
            env.outbox.request(ClientMsg::SetAiming { aiming });
        }
        self.aiming = aiming;
        if aiming {
            self.sprinting = false;
        }
        true
    }

    pub fn set_sprinting(&mut self, sprinting: bool, env: &mut Env) -> bool {
        if sprinting && (self.aiming || self.dead) {
            return false;
        }
        if !self.has_authority() {
            env.outbox.request(ClientMsg::SetSprinting { sprinting });
        }
        self.sprinting = sprinting;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::presentation::SharedPresentationLog;
    use crate::game::replication::NetMode;

    fn rig() -> (Character, Env, Catalog, SharedPresentationLog) {
        let log = SharedPresentationLog::new();
        let env = Env::new(NetMode::ListenServer, Box::new(log.clone()));
        let ch = Character::new(Uuid::new_v4(), "Tester", NetRole::Authority, true, Vec3::ZERO);
        (ch, env, Catalog::builtin().expect("builtin catalog"), log)
    }

    fn give(ch: &mut Character, catalog: &Catalog, class: &str, quantity: u32) -> ItemId {
        let class = catalog.item(class).expect("class");
        ch.inventory.try_add(&class, quantity);
        ch.inventory.find_by_class(&class.id).expect("added").id
    }

    #[test]
    fn modify_health_returns_clamped_delta() {
        let (mut ch, ..) = rig();
        assert_eq!(ch.modify_health(-150.0), -100.0);
        assert_eq!(ch.health(), 0.0);
        assert!(ch.needs_death_resolution());
        ch.mark_dead(ch.id);
        assert!(!ch.needs_death_resolution());
        assert_eq!(ch.modify_health(-10.0), 0.0);
    }

    #[test]
    fn food_is_only_eaten_when_it_heals() {
        let (mut ch, mut env, catalog, _) = rig();
        let apple = give(&mut ch, &catalog, "apple", 2);

        ch.use_item(apple, &catalog, &mut env);
        assert_eq!(ch.inventory.total_quantity("apple"), 2);

        ch.modify_health(-50.0);
        ch.use_item(apple, &catalog, &mut env);
        assert_eq!(ch.health(), 70.0);
        assert_eq!(ch.inventory.total_quantity("apple"), 1);

        let texts: Vec<String> = env
            .outbox
            .take_notifications()
            .into_iter()
            .filter_map(|n| match n.message {
                ServerMsg::Notification { text } => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["Your health is already full".to_string(), "Ate Apple, healed 20 health".to_string()]);
    }

    #[test]
    fn equipping_into_occupied_slot_evicts_previous_item() {
        let (mut ch, mut env, catalog, _) = rig();
        let rifle = give(&mut ch, &catalog, "rifle", 1);
        let pistol = give(&mut ch, &catalog, "pistol", 1);

        assert_eq!(ch.equip_item(rifle, &catalog, &mut env), Ok(EquipSlot::PrimaryWeapon));
        let rifle_weapon = ch.weapon.as_ref().map(|w| w.id);
        assert!(rifle_weapon.is_some());

        ch.equip_item(pistol, &catalog, &mut env).expect("equip pistol");
        assert_eq!(ch.equipped_in(EquipSlot::PrimaryWeapon), Some(pistol));
        assert!(!ch.inventory.get(rifle).expect("rifle").equipped);
        assert_ne!(ch.weapon.as_ref().map(|w| w.id), rifle_weapon);
        assert_eq!(ch.weapon.as_ref().map(|w| w.item), Some(pistol));
    }

    #[test]
    fn unequip_requires_matching_occupant() {
        let (mut ch, mut env, catalog, _) = rig();
        let helmet = give(&mut ch, &catalog, "helmet", 1);
        let apple = give(&mut ch, &catalog, "apple", 1);
        assert_eq!(ch.unequip_item(helmet, &mut env), Err(EquipError::NotEquipped));
        assert!(matches!(
            ch.equip_item(apple, &catalog, &mut env),
            Err(EquipError::NotEquippable(_))
        ));

        ch.equip_item(helmet, &catalog, &mut env).expect("equip helmet");
        assert_eq!(ch.defence_multipliers(), vec![0.8]);
        assert_eq!(ch.unequip_item(helmet, &mut env), Ok(EquipSlot::Helmet));
        assert!(ch.defence_multipliers().is_empty());
    }

    #[test]
    fn dropping_equipped_item_unequips_it_first() {
        let (mut ch, mut env, catalog, _) = rig();
        let vest = give(&mut ch, &catalog, "vest", 1);
        ch.equip_item(vest, &catalog, &mut env).expect("equip vest");

        let dropped = ch.drop_item(vest, 5, &mut env).expect("dropped stack");
        assert_eq!(dropped.quantity(), 1);
        assert_eq!(dropped.class_id(), "vest");
        assert!(ch.equipped().is_empty());
        assert!(ch.inventory.is_empty());
    }

    #[test]
    fn last_throwable_clears_its_slot() {
        let (mut ch, mut env, catalog, log) = rig();
        let grenade = give(&mut ch, &catalog, "grenade", 1);
        ch.use_item(grenade, &catalog, &mut env);
        assert_eq!(ch.equipped_in(EquipSlot::Throwable), Some(grenade));

        let thrown = ch.use_throwable(&catalog, &mut env).expect("projectile");
        assert_eq!(thrown.owner, ch.id);
        assert_eq!(ch.equipped_in(EquipSlot::Throwable), None);
        assert!(ch.use_throwable(&catalog, &mut env).is_none());
        assert_eq!(log.montages_played(), vec!["grenade_toss".to_string()]);
    }

    #[test]
    fn aiming_needs_weapon_and_blocks_sprint() {
        let (mut ch, mut env, catalog, _) = rig();
        assert!(!ch.set_aiming(true, &mut env));

        let pistol = give(&mut ch, &catalog, "pistol", 1);
        ch.equip_item(pistol, &catalog, &mut env).expect("equip");
        assert!(ch.set_sprinting(true, &mut env));
        assert!(ch.set_aiming(true, &mut env));
        assert!(!ch.is_sprinting());
        assert!(!ch.set_sprinting(true, &mut env));
    }

    #[test]
    fn proxy_forwards_item_requests() {
        let mut env = Env::new(NetMode::Client, Box::new(SharedPresentationLog::new()));
        let catalog = Catalog::builtin().expect("builtin catalog");
        let mut ch = Character::new(Uuid::new_v4(), "Proxy", NetRole::AutonomousProxy, true, Vec3::ZERO);
        let item = Uuid::new_v4();

        ch.use_item(item, &catalog, &mut env);
        assert!(ch.drop_item(item, 2, &mut env).is_none());
        assert_eq!(
            env.outbox.take_requests(),
            vec![ClientMsg::UseItem { item }, ClientMsg::DropItem { item, quantity: 2 }]
        );
        assert_eq!(ch.equip_item(item, &catalog, &mut env), Err(EquipError::NotAuthority));
    }

    #[test]
    fn melee_validates_range_on_server() {
        let (mut ch, mut env, ..) = rig();
        let target = Uuid::new_v4();
        let near = ClaimedHit {
            target: Some(target),
            impact_point: ch.eye_location() + Vec3::FORWARD * 100.0,
            bone: None,
        };
        let far = ClaimedHit {
            impact_point: ch.eye_location() + Vec3::FORWARD * 400.0,
            ..near.clone()
        };
        assert!(!ch.server_process_melee_hit(&far, &mut env));
        assert!(ch.server_process_melee_hit(&near, &mut env));
        assert!(!ch.server_process_melee_hit(&near, &mut env), "cooldown");
        assert_eq!(env.outbox.damage.len(), 1);
        assert_eq!(env.outbox.damage[0].damage_type, DamageType::Melee);
    }
}
