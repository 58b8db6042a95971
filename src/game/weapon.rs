//! Weapon fire / reload / equip state machine
//!
//! The controlling side fires locally and mirrors every shot to the authority,
//! which replays the same firing logic to keep clip ammo and burst state in
//! step. Hits are re-traced on the authority before any damage is applied.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::ws::protocol::{ClientMsg, ServerMsg};

use super::combat::{ClaimedHit, CombatSystem, HitScanConfig, PointDamage};
use super::inventory::{AddOutcome, Inventory};
use super::item::{ItemClass, ItemClassId};
use super::physics::{TraceChannel, TraceHit, ViewPoint, WorldQuery};
use super::presentation::{Cue, Montage};
use super::replication::{NetMode, NetRole};
use super::scheduler::TimerHandle;
use super::sim::{Env, TimerTask};
use super::{ActorId, ItemId};

/// Lower bound for the refire delay
const MIN_REFIRE_DELAY: f32 = 1e-4;
/// Reload length used when no reload montage is available
const DEFAULT_RELOAD_DURATION: f32 = 0.5;
/// Earliest the ammo transfer may run after a reload starts
const MIN_RELOAD_TRANSFER: f32 = 0.1;
/// Shots a mirrored burst may run ahead of the fire rate to absorb delivery jitter
const MIRRORED_SHOT_SLACK: u32 = 2;

fn default_true() -> bool {
    true
}

fn default_reload_lead() -> f32 {
    0.1
}

/// Immutable weapon parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeaponConfig {
    pub id: String,
    pub ammo_per_clip: u32,
    pub ammo_class: ItemClassId,
    /// Seconds between automatic shots; 0 disables refire
    pub time_between_shots: f32,
    #[serde(default = "default_true")]
    pub allow_automatic_catchup: bool,
    /// How long before the reload montage ends the ammo moves into the clip
    #[serde(default = "default_reload_lead")]
    pub reload_transfer_lead: f32,
    #[serde(default)]
    pub equip_anim: Montage,
    #[serde(default)]
    pub reload_anim: Montage,
    #[serde(default)]
    pub fire_anim: Montage,
    #[serde(default)]
    pub fire_aiming_anim: Montage,
    #[serde(default)]
    pub looped_fire_anim: bool,
    #[serde(default)]
    pub looped_muzzle_fx: bool,
    #[serde(default)]
    pub looped_fire_sound: bool,
    #[serde(default)]
    pub hit_scan: HitScanConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponState {
    Idle,
    Equipping,
    Firing,
    Reloading,
}

/// Weapon continuation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeaponTimer {
    StopReload,
    ReloadWeapon,
    HandleFiring,
    HandleReFiring,
    EquipFinished,
}

/// State-machine inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateInputs {
    pub current: WeaponState,
    pub equipped: bool,
    pub pending_equip: bool,
    pub pending_reload: bool,
    pub wants_to_fire: bool,
    pub can_fire: bool,
    pub can_reload: bool,
}

/// Next weapon state from flags and predicates
pub fn determine_state(inputs: StateInputs) -> WeaponState {
    if inputs.equipped {
        if inputs.pending_reload {
            if inputs.can_reload {
                WeaponState::Reloading
            } else {
                inputs.current
            }
        } else if inputs.wants_to_fire && inputs.can_fire {
            WeaponState::Firing
        } else {
            WeaponState::Idle
        }
    } else if inputs.pending_equip {
        WeaponState::Equipping
    } else {
        WeaponState::Idle
    }
}

/// The wielding character's side of a weapon call
pub struct Wielder<'a> {
    pub inventory: &'a mut Inventory,
    /// Eye point used for hit traces
    pub view: ViewPoint,
}

#[derive(Debug, Default)]
struct WeaponTimers {
    stop_reload: Option<TimerHandle>,
    reload_weapon: Option<TimerHandle>,
    handle_firing: Option<TimerHandle>,
    equip_finished: Option<TimerHandle>,
}

/// Runtime weapon instance spawned when a weapon item is equipped
#[derive(Debug)]
pub struct Weapon {
    pub id: ActorId,
    /// Inventory item this weapon was spawned from
    pub item: ItemId,
    pub config: Arc<WeaponConfig>,
    ammo: Arc<ItemClass>,
    owner: Option<ActorId>,
    role: NetRole,
    locally_controlled: bool,
    state: WeaponState,
    equipped: bool,
    pending_equip: bool,
    pending_reload: bool,
    wants_to_fire: bool,
    refiring: bool,
    playing_fire_anim: bool,
    fire_loop_playing: bool,
    ammo_in_clip: u32,
    burst_counter: u32,
    last_fire_time: f64,
    /// Server time of the first mirrored shot in the current burst
    mirrored_burst_start: Option<f64>,
    mirrored_shots: u32,
    /// Accepted mirrored shots whose hit has not been claimed yet
    unresolved_shots: u32,
    timer_interval_adjustment: f32,
    equip_started: f64,
    equip_duration: f32,
    timers: WeaponTimers,
}

impl Weapon {
    pub fn new(
        id: ActorId,
        item: ItemId,
        config: Arc<WeaponConfig>,
        ammo: Arc<ItemClass>,
        owner: ActorId,
        role: NetRole,
        locally_controlled: bool,
    ) -> Self {
        Self {
            id,
            item,
            config,
            ammo,
            owner: Some(owner),
            role,
            locally_controlled,
            state: WeaponState::Idle,
            equipped: false,
            pending_equip: false,
            pending_reload: false,
            wants_to_fire: false,
            refiring: false,
            playing_fire_anim: false,
            fire_loop_playing: false,
            ammo_in_clip: 0,
            burst_counter: 0,
            last_fire_time: 0.0,
            mirrored_burst_start: None,
            mirrored_shots: 0,
            unresolved_shots: 0,
            timer_interval_adjustment: 0.0,
            equip_started: 0.0,
            equip_duration: 0.0,
            timers: WeaponTimers::default(),
        }
    }

    pub fn state(&self) -> WeaponState {
        self.state
    }

    pub fn owner(&self) -> Option<ActorId> {
        self.owner
    }

    pub fn has_authority(&self) -> bool {
        self.role == NetRole::Authority
    }

    pub fn is_equipped(&self) -> bool {
        self.equipped
    }

    pub fn is_pending_equip(&self) -> bool {
        self.pending_equip
    }

    pub fn is_attached(&self) -> bool {
        self.equipped || self.pending_equip
    }

    pub fn is_pending_reload(&self) -> bool {
        self.pending_reload
    }

    pub fn wants_to_fire(&self) -> bool {
        self.wants_to_fire
    }

    pub fn ammo_in_clip(&self) -> u32 {
        self.ammo_in_clip
    }

    pub fn ammo_per_clip(&self) -> u32 {
        self.config.ammo_per_clip
    }

    pub fn burst_counter(&self) -> u32 {
        self.burst_counter
    }

    pub fn ammo_class(&self) -> &str {
        &self.ammo.id
    }

    pub fn equip_started(&self) -> f64 {
        self.equip_started
    }

    pub fn equip_duration(&self) -> f32 {
        self.equip_duration
    }

    /// Reserve rounds in the wielder's inventory
    pub fn reserve_ammo(&self, inventory: &Inventory) -> u32 {
        if self.owner.is_none() {
            return 0;
        }
        inventory.total_quantity(&self.ammo.id)
    }

    pub fn can_fire(&self) -> bool {
        self.owner.is_some()
            && matches!(self.state, WeaponState::Idle | WeaponState::Firing)
            && !self.pending_reload
    }

    pub fn can_reload(&self, reserve: u32) -> bool {
        self.owner.is_some()
            && self.ammo_in_clip < self.config.ammo_per_clip
            && reserve > 0
            && matches!(self.state, WeaponState::Idle | WeaponState::Firing)
    }

    fn task(&self, timer: WeaponTimer) -> TimerTask {
        TimerTask::Weapon {
            owner: self.owner.unwrap_or(self.id),
            weapon: self.id,
            timer,
        }
    }

    fn owner_or_self(&self) -> ActorId {
        self.owner.unwrap_or(self.id)
    }

    // -- state machine -----------------------------------------------------

    fn determine_weapon_state(&mut self, env: &mut Env, wielder: &mut Wielder<'_>) {
        let reserve = self.reserve_ammo(wielder.inventory);
        let next = determine_state(StateInputs {
            current: self.state,
            equipped: self.equipped,
            pending_equip: self.pending_equip,
            pending_reload: self.pending_reload,
            wants_to_fire: self.wants_to_fire,
            can_fire: self.can_fire(),
            can_reload: self.can_reload(reserve),
        });
        self.set_weapon_state(next, env, wielder);
    }

    fn set_weapon_state(&mut self, next: WeaponState, env: &mut Env, wielder: &mut Wielder<'_>) {
        let prev = self.state;
        if prev == WeaponState::Firing && next != WeaponState::Firing {
            self.on_burst_finished(env);
        }
        self.state = next;
        if prev != WeaponState::Firing && next == WeaponState::Firing {
            self.on_burst_started(env, wielder);
        }
    }

    fn on_burst_started(&mut self, env: &mut Env, wielder: &mut Wielder<'_>) {
        let tbs = f64::from(self.config.time_between_shots);
        if self.last_fire_time > 0.0 && tbs > 0.0 && self.last_fire_time + tbs > env.now {
            let delay = (self.last_fire_time + tbs - env.now) as f32;
            env.cancel(&mut self.timers.handle_firing);
            self.timers.handle_firing = Some(env.schedule(delay, self.task(WeaponTimer::HandleFiring)));
        } else {
            self.handle_firing(env, wielder);
        }
    }

    fn on_burst_finished(&mut self, env: &mut Env) {
        self.burst_counter = 0;
        if env.mode != NetMode::DedicatedServer {
            self.stop_simulating_weapon_fire(env);
        }
        env.cancel(&mut self.timers.handle_firing);
        self.refiring = false;
        self.timer_interval_adjustment = 0.0;
        self.mirrored_burst_start = None;
        self.mirrored_shots = 0;
        self.unresolved_shots = 0;
    }

    // -- firing --------------------------------------------------------------

    pub fn start_fire(&mut self, env: &mut Env, wielder: &mut Wielder<'_>) {
        if !self.has_authority() {
            env.outbox.request(ClientMsg::StartFire);
        }
        if !self.wants_to_fire {
            self.wants_to_fire = true;
            self.determine_weapon_state(env, wielder);
        }
    }

    pub fn stop_fire(&mut self, env: &mut Env, wielder: &mut Wielder<'_>) {
        if !self.has_authority() && self.locally_controlled {
            env.outbox.request(ClientMsg::StopFire);
        }
        if self.wants_to_fire {
            self.wants_to_fire = false;
            self.determine_weapon_state(env, wielder);
        }
    }

    /// One fire attempt on the controlling side, mirrored on the authority
    pub fn handle_firing(&mut self, env: &mut Env, wielder: &mut Wielder<'_>) {
        // The authority has to replay the shot before it sees the hit claim
        if self.locally_controlled && !self.has_authority() {
            env.outbox.request(ClientMsg::HandleFiring);
        }
        let reserve = self.reserve_ammo(wielder.inventory);
        if self.ammo_in_clip > 0 && self.can_fire() {
            if env.mode != NetMode::DedicatedServer {
                self.simulate_weapon_fire(env);
            }
            if self.locally_controlled {
                self.fire_shot(env, wielder);
                self.use_clip_ammo();
                self.burst_counter += 1;
            }
        } else if self.can_reload(reserve) {
            self.start_reload(env, wielder, false);
        } else if self.locally_controlled {
            if reserve == 0 && self.ammo_in_clip == 0 && !self.refiring {
                env.fx.play_cue(self.owner_or_self(), Cue::OutOfAmmoSound);
            }
            if self.burst_counter > 0 {
                self.on_burst_finished(env);
            }
        }

        if self.locally_controlled {
            let reserve = self.reserve_ammo(wielder.inventory);
            if self.ammo_in_clip == 0 && self.can_reload(reserve) {
                self.start_reload(env, wielder, false);
            }

            self.refiring = self.state == WeaponState::Firing && self.config.time_between_shots > 0.0;
            if self.refiring {
                let delay = (self.config.time_between_shots + self.timer_interval_adjustment).max(MIN_REFIRE_DELAY);
                env.cancel(&mut self.timers.handle_firing);
                self.timers.handle_firing = Some(env.schedule(delay, self.task(WeaponTimer::HandleReFiring)));
                self.timer_interval_adjustment = 0.0;
            }
        }
        self.last_fire_time = env.now;
    }

    fn handle_refiring(&mut self, env: &mut Env, wielder: &mut Wielder<'_>) {
        let tbs = f64::from(self.config.time_between_shots);
        let stacked = ((env.now - self.last_fire_time) - tbs).max(0.0) as f32;
        if self.config.allow_automatic_catchup {
            self.timer_interval_adjustment -= stacked;
        }
        self.handle_firing(env, wielder);
    }

    /// Authority replay of a shot fired by the owning client
    pub fn server_handle_firing(&mut self, env: &mut Env, wielder: &mut Wielder<'_>) {
        if !self.has_authority() {
            return;
        }
        if !self.mirrored_shot_allowed(env.now) {
            tracing::debug!(weapon_id = %self.id, shots = self.mirrored_shots, "mirrored shot ahead of fire rate, ignored");
            return;
        }

        let should_update_ammo = self.ammo_in_clip > 0 && self.can_fire();
        self.handle_firing(env, wielder);
        if should_update_ammo {
            self.use_clip_ammo();
            self.burst_counter += 1;
            self.mirrored_burst_start.get_or_insert(env.now);
            self.mirrored_shots += 1;
            self.unresolved_shots += 1;
            self.on_rep_burst_counter(env);
        }
    }

    /// Shots in a burst are budgeted against the time since its first shot
    fn mirrored_shot_allowed(&self, now: f64) -> bool {
        let tbs = f64::from(self.config.time_between_shots);
        let Some(start) = self.mirrored_burst_start else {
            return true;
        };
        if tbs <= 0.0 {
            return true;
        }
        let earned = ((now - start + 1e-6) / tbs).floor().max(0.0) as u32;
        self.mirrored_shots < earned + 1 + MIRRORED_SHOT_SLACK
    }

    fn use_clip_ammo(&mut self) {
        self.ammo_in_clip = self.ammo_in_clip.saturating_sub(1);
    }

    fn fire_shot(&mut self, env: &mut Env, wielder: &mut Wielder<'_>) {
        let Some(owner) = self.owner else {
            return;
        };
        let view = wielder.view;
        let hit = env.collision.line_trace(
            view.location,
            view.direction,
            self.config.hit_scan.distance,
            TraceChannel::Weapon,
            &[self.id, owner],
        );
        if let Some(hit) = hit {
            self.handle_hit(env, wielder, hit);
        }
    }

    fn handle_hit(&mut self, env: &mut Env, wielder: &mut Wielder<'_>, hit: TraceHit) {
        tracing::trace!(weapon_id = %self.id, actor_id = %hit.actor, bone = ?hit.bone, "hit");
        let claimed = ClaimedHit {
            target: hit.pawn.then_some(hit.actor),
            impact_point: hit.impact_point,
            bone: hit.bone.clone(),
        };
        if self.has_authority() {
            self.apply_hit(env, wielder, &claimed);
        } else {
            env.outbox.request(ClientMsg::HandleHit { hit: claimed });
        }
        if hit.pawn {
            env.fx.play_cue(self.owner_or_self(), Cue::HitMarker);
        }
    }

    /// Hit claimed by the owning client; each accepted mirrored shot backs one claim
    pub fn server_handle_hit(&mut self, env: &mut Env, wielder: &Wielder<'_>, claimed: &ClaimedHit) {
        if !self.has_authority() {
            return;
        }
        if self.unresolved_shots == 0 {
            tracing::debug!(weapon_id = %self.id, "hit claimed without a fired shot, ignored");
            return;
        }
        self.unresolved_shots -= 1;
        self.apply_hit(env, wielder, claimed);
    }

    /// Re-derive a hit from the authority's own trace and apply damage
    fn apply_hit(&self, env: &mut Env, wielder: &Wielder<'_>, claimed: &ClaimedHit) {
        let Some(owner) = self.owner else {
            return;
        };

        env.outbox.multicast(ServerMsg::Cue {
            actor: claimed.target.unwrap_or(owner),
            cue: Cue::Impact,
            location: Some(claimed.impact_point),
        });

        let Some(target) = claimed.target else {
            return;
        };
        let view = wielder.view;
        let Some(hit) = env.collision.line_trace(
            view.location,
            view.direction,
            self.config.hit_scan.distance,
            TraceChannel::Weapon,
            &[self.id, owner],
        ) else {
            tracing::debug!(weapon_id = %self.id, target = %target, "claimed hit not confirmed by server trace");
            return;
        };
        if hit.actor != target {
            tracing::debug!(weapon_id = %self.id, target = %target, traced = %hit.actor, "claimed hit target mismatch");
            return;
        }

        let amount = CombatSystem::hit_damage(&self.config.hit_scan, hit.bone.as_deref());
        env.outbox.apply_damage(PointDamage {
            target,
            amount,
            damage_type: self.config.hit_scan.damage_type,
            causer: self.id,
            instigator: Some(owner),
            impact_point: hit.impact_point,
            bone: hit.bone,
        });
    }

    // -- presentation ----------------------------------------------------------

    fn simulate_weapon_fire(&mut self, env: &mut Env) {
        if self.has_authority() && self.state != WeaponState::Firing {
            return;
        }
        let actor = self.owner_or_self();
        env.fx.play_cue(actor, Cue::MuzzleFlash);

        if !self.config.looped_fire_anim || !self.playing_fire_anim {
            env.fx.play_montage(actor, &self.config.fire_anim);
            self.playing_fire_anim = true;
        }

        if self.config.looped_fire_sound {
            if !self.fire_loop_playing {
                env.fx.play_cue(actor, Cue::FireLoopSound);
                self.fire_loop_playing = true;
            }
        } else {
            env.fx.play_cue(actor, Cue::FireSound);
        }

        if self.locally_controlled {
            env.fx.play_cue(actor, Cue::CameraShake);
        }
    }

    fn stop_simulating_weapon_fire(&mut self, env: &mut Env) {
        let actor = self.owner_or_self();
        if self.config.looped_muzzle_fx {
            env.fx.play_cue(actor, Cue::MuzzleFlashStop);
        }
        if self.config.looped_fire_anim && self.playing_fire_anim {
            env.fx.stop_montage(actor, &self.config.fire_aiming_anim);
            env.fx.stop_montage(actor, &self.config.fire_anim);
            self.playing_fire_anim = false;
        }
        if self.fire_loop_playing {
            self.fire_loop_playing = false;
            env.fx.play_cue(actor, Cue::FireFinishSound);
        }
    }

    // -- reload ----------------------------------------------------------------

    /// Begin a reload; replication echoes skip the `can_reload` check
    pub fn start_reload(&mut self, env: &mut Env, wielder: &mut Wielder<'_>, from_replication: bool) {
        if !from_replication && !self.has_authority() {
            env.outbox.request(ClientMsg::StartReload);
        }
        let reserve = self.reserve_ammo(wielder.inventory);
        if !(from_replication || self.can_reload(reserve)) {
            return;
        }

        self.pending_reload = true;
        self.determine_weapon_state(env, wielder);

        let actor = self.owner_or_self();
        let mut duration = env.fx.play_montage(actor, &self.config.reload_anim);
        if duration <= 0.0 {
            duration = DEFAULT_RELOAD_DURATION;
        }

        env.cancel(&mut self.timers.stop_reload);
        self.timers.stop_reload = Some(env.schedule(duration, self.task(WeaponTimer::StopReload)));
        if self.has_authority() {
            let transfer_at = (duration - self.config.reload_transfer_lead).max(MIN_RELOAD_TRANSFER);
            env.cancel(&mut self.timers.reload_weapon);
            self.timers.reload_weapon = Some(env.schedule(transfer_at, self.task(WeaponTimer::ReloadWeapon)));
        }
        if self.locally_controlled {
            env.fx.play_cue(actor, Cue::ReloadSound);
        }
    }

    /// Finish a reload; ignored unless currently reloading
    pub fn stop_reload(&mut self, env: &mut Env, wielder: &mut Wielder<'_>) {
        if self.state != WeaponState::Reloading {
            return;
        }
        self.pending_reload = false;
        self.determine_weapon_state(env, wielder);
        env.fx.stop_montage(self.owner_or_self(), &self.config.reload_anim);
    }

    /// Move rounds from reserve into the clip
    fn reload_weapon(&mut self, wielder: &mut Wielder<'_>) {
        if !self.has_authority() {
            return;
        }
        let reserve = self.reserve_ammo(wielder.inventory);
        let clip_delta = self
            .config
            .ammo_per_clip
            .saturating_sub(self.ammo_in_clip)
            .min(reserve);
        if clip_delta == 0 {
            tracing::warn!(weapon_id = %self.id, "not enough ammo to reload");
            return;
        }
        let taken = wielder.inventory.consume_class(&self.ammo.id, clip_delta);
        self.ammo_in_clip += taken;
    }

    // -- equip -----------------------------------------------------------------

    pub fn on_equip(&mut self, env: &mut Env, wielder: &mut Wielder<'_>) {
        self.pending_equip = true;
        self.determine_weapon_state(env, wielder);

        let actor = self.owner_or_self();
        self.equip_started = env.now;
        self.equip_duration = env.fx.play_montage(actor, &self.config.equip_anim);
        if self.locally_controlled {
            env.fx.play_cue(actor, Cue::EquipSound);
        }

        if self.equip_duration > 0.0 {
            env.cancel(&mut self.timers.equip_finished);
            self.timers.equip_finished =
                Some(env.schedule(self.equip_duration, self.task(WeaponTimer::EquipFinished)));
        } else {
            self.on_equip_finished(env, wielder);
        }
    }

    fn on_equip_finished(&mut self, env: &mut Env, wielder: &mut Wielder<'_>) {
        self.equipped = true;
        self.pending_equip = false;
        self.determine_weapon_state(env, wielder);

        let reserve = self.reserve_ammo(wielder.inventory);
        if self.owner.is_some() && self.locally_controlled && self.can_reload(reserve) {
            self.start_reload(env, wielder, false);
        }
    }

    pub fn on_unequip(&mut self, env: &mut Env, wielder: &mut Wielder<'_>) {
        self.equipped = false;
        self.stop_fire(env, wielder);

        let actor = self.owner_or_self();
        if self.pending_reload {
            env.fx.stop_montage(actor, &self.config.reload_anim);
            self.pending_reload = false;
            env.cancel(&mut self.timers.stop_reload);
            env.cancel(&mut self.timers.reload_weapon);
        }
        if self.pending_equip {
            env.fx.stop_montage(actor, &self.config.equip_anim);
            self.pending_equip = false;
            env.cancel(&mut self.timers.equip_finished);
        }

        self.return_ammo_to_inventory(wielder.inventory);
        self.determine_weapon_state(env, wielder);
    }

    fn return_ammo_to_inventory(&mut self, inventory: &mut Inventory) {
        if !self.has_authority() || self.owner.is_none() || self.ammo_in_clip == 0 {
            return;
        }
        let result = inventory.try_add_from_class(&self.ammo, self.ammo_in_clip);
        self.ammo_in_clip -= result.amount_actually_given;
        if result.outcome != AddOutcome::AddedAll {
            tracing::warn!(
                weapon_id = %self.id,
                lost = self.ammo_in_clip,
                reason = %result.reason,
                "clip ammo could not be returned to inventory"
            );
        }
    }

    /// Cancel every outstanding timer and effect before the weapon goes away
    pub fn destroy(&mut self, env: &mut Env) {
        env.cancel(&mut self.timers.stop_reload);
        env.cancel(&mut self.timers.reload_weapon);
        env.cancel(&mut self.timers.handle_firing);
        env.cancel(&mut self.timers.equip_finished);
        self.stop_simulating_weapon_fire(env);
        self.owner = None;
    }

    // -- timers and replication -----------------------------------------------

    pub fn on_timer(&mut self, timer: WeaponTimer, env: &mut Env, wielder: &mut Wielder<'_>) {
        match timer {
            WeaponTimer::StopReload => {
                self.timers.stop_reload = None;
                self.stop_reload(env, wielder);
            }
            WeaponTimer::ReloadWeapon => {
                self.timers.reload_weapon = None;
                self.reload_weapon(wielder);
            }
            WeaponTimer::HandleFiring => {
                self.timers.handle_firing = None;
                self.handle_firing(env, wielder);
            }
            WeaponTimer::HandleReFiring => {
                self.timers.handle_firing = None;
                self.handle_refiring(env, wielder);
            }
            WeaponTimer::EquipFinished => {
                self.timers.equip_finished = None;
                self.on_equip_finished(env, wielder);
            }
        }
    }

    fn on_rep_burst_counter(&mut self, env: &mut Env) {
        if self.burst_counter > 0 {
            self.simulate_weapon_fire(env);
        } else {
            self.stop_simulating_weapon_fire(env);
        }
    }

    pub fn apply_burst_counter(&mut self, burst_counter: u32, env: &mut Env) {
        self.burst_counter = burst_counter;
        self.on_rep_burst_counter(env);
    }

    pub fn apply_pending_reload(&mut self, pending: bool, env: &mut Env, wielder: &mut Wielder<'_>) {
        self.pending_reload = pending;
        if pending {
            self.start_reload(env, wielder, true);
        } else {
            self.stop_reload(env, wielder);
        }
    }

    pub fn apply_ammo_in_clip(&mut self, ammo: u32) {
        self.ammo_in_clip = ammo.min(self.config.ammo_per_clip);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::item::{ItemKind, Rarity};
    use crate::game::physics::Vec3;
    use crate::game::presentation::SharedPresentationLog;
    use uuid::Uuid;

    fn ammo_class() -> Arc<ItemClass> {
        Arc::new(ItemClass {
            id: "rifle_ammo".into(),
            display_name: "Rifle Ammo".into(),
            description: String::new(),
            use_action_text: "Use".into(),
            rarity: Rarity::Common,
            weight: 0.0,
            stackable: true,
            max_stack_size: 120,
            default_quantity: 30,
            kind: ItemKind::Ammo,
        })
    }

    fn config() -> Arc<WeaponConfig> {
        Arc::new(WeaponConfig {
            id: "rifle".into(),
            ammo_per_clip: 10,
            ammo_class: "rifle_ammo".into(),
            time_between_shots: 0.1,
            allow_automatic_catchup: true,
            reload_transfer_lead: 0.1,
            equip_anim: Montage::default(),
            reload_anim: Montage::new("reload", 1.0),
            fire_anim: Montage::new("fire", 0.1),
            fire_aiming_anim: Montage::new("fire_aim", 0.1),
            looped_fire_anim: true,
            looped_muzzle_fx: false,
            looped_fire_sound: false,
            hit_scan: HitScanConfig::default(),
        })
    }

    struct Rig {
        env: Env,
        inventory: Inventory,
        weapon: Weapon,
        log: SharedPresentationLog,
    }

    impl Rig {
        fn new(reserve: u32) -> Self {
            let log = SharedPresentationLog::new();
            let env = Env::new(NetMode::ListenServer, Box::new(log.clone()));
            let owner = Uuid::new_v4();
            let mut inventory = Inventory::new(owner, 20, 80.0);
            if reserve > 0 {
                inventory.try_add(&ammo_class(), reserve);
            }
            let weapon = Weapon::new(
                Uuid::new_v4(),
                Uuid::new_v4(),
                config(),
                ammo_class(),
                owner,
                NetRole::Authority,
                true,
            );
            Self {
                env,
                inventory,
                weapon,
                log,
            }
        }

        fn call(&mut self, f: impl FnOnce(&mut Weapon, &mut Env, &mut Wielder<'_>)) {
            let mut wielder = Wielder {
                inventory: &mut self.inventory,
                view: ViewPoint::new(Vec3::ZERO, Vec3::FORWARD),
            };
            f(&mut self.weapon, &mut self.env, &mut wielder);
        }

        /// Advance the clock and deliver every weapon timer that comes due
        fn advance(&mut self, seconds: f64) {
            let end = self.env.now + seconds;
            loop {
                let next = self.env.now + 0.01;
                self.env.now = next.min(end);
                while let Some((_, task)) = self.env.timers.pop_due(self.env.now) {
                    if let TimerTask::Weapon { timer, .. } = task {
                        self.call(|w, env, wl| w.on_timer(timer, env, wl));
                    }
                }
                if self.env.now >= end {
                    break;
                }
            }
        }

        fn reserve(&self) -> u32 {
            self.inventory.total_quantity("rifle_ammo")
        }
    }

    fn inputs(current: WeaponState) -> StateInputs {
        StateInputs {
            current,
            equipped: true,
            pending_equip: false,
            pending_reload: false,
            wants_to_fire: false,
            can_fire: true,
            can_reload: true,
        }
    }

    #[test]
    fn determine_state_is_pure() {
        let firing = StateInputs {
            wants_to_fire: true,
            ..inputs(WeaponState::Idle)
        };
        for current in [WeaponState::Idle, WeaponState::Firing, WeaponState::Equipping, WeaponState::Reloading] {
            let i = StateInputs { current, ..firing };
            assert_eq!(determine_state(i), WeaponState::Firing);
            assert_eq!(determine_state(i), determine_state(i));
        }

        let equipping = StateInputs {
            equipped: false,
            pending_equip: true,
            ..inputs(WeaponState::Idle)
        };
        assert_eq!(determine_state(equipping), WeaponState::Equipping);

        let unequipped = StateInputs {
            equipped: false,
            ..inputs(WeaponState::Firing)
        };
        assert_eq!(determine_state(unequipped), WeaponState::Idle);

        let blocked = StateInputs {
            wants_to_fire: true,
            can_fire: false,
            ..inputs(WeaponState::Idle)
        };
        assert_eq!(determine_state(blocked), WeaponState::Idle);
    }

    #[test]
    fn invalid_reload_preserves_current_state() {
        for current in [WeaponState::Idle, WeaponState::Firing, WeaponState::Reloading] {
            let i = StateInputs {
                pending_reload: true,
                can_reload: false,
                ..inputs(current)
            };
            assert_eq!(determine_state(i), current);
        }
        let valid = StateInputs {
            pending_reload: true,
            ..inputs(WeaponState::Idle)
        };
        assert_eq!(determine_state(valid), WeaponState::Reloading);
    }

    #[test]
    fn equip_auto_reloads_and_transfers_ammo_before_anim_ends() {
        let mut rig = Rig::new(25);
        rig.call(|w, env, wl| w.on_equip(env, wl));
        assert!(rig.weapon.is_equipped());
        assert_eq!(rig.weapon.state(), WeaponState::Reloading);

        rig.advance(0.95);
        assert_eq!(rig.weapon.ammo_in_clip(), 10);
        assert_eq!(rig.reserve(), 15);
        assert_eq!(rig.weapon.state(), WeaponState::Reloading);

        rig.advance(0.1);
        assert_eq!(rig.weapon.state(), WeaponState::Idle);
        assert!(!rig.weapon.is_pending_reload());
        assert_eq!(rig.log.montages_stopped(), vec!["reload".to_string()]);
    }

    #[test]
    fn empty_clip_with_reserve_reloads_instead_of_firing() {
        let mut rig = Rig::new(5);
        rig.weapon.equipped = true;
        assert_eq!(rig.weapon.ammo_in_clip(), 0);

        rig.call(|w, env, wl| w.handle_firing(env, wl));
        assert_eq!(rig.weapon.state(), WeaponState::Reloading);
        assert_eq!(rig.weapon.burst_counter(), 0);
    }

    #[test]
    fn out_of_ammo_cue_plays_once() {
        let mut rig = Rig::new(0);
        rig.weapon.equipped = true;
        rig.call(|w, env, wl| w.start_fire(env, wl));
        assert_eq!(rig.weapon.state(), WeaponState::Firing);
        assert_eq!(rig.log.count(Cue::OutOfAmmoSound), 1);
        rig.advance(0.5);
        assert_eq!(rig.log.count(Cue::OutOfAmmoSound), 1);
    }

    #[test]
    fn sustained_fire_consumes_clip_at_fire_rate() {
        let mut rig = Rig::new(10);
        rig.call(|w, env, wl| w.on_equip(env, wl));
        rig.advance(1.1);
        assert_eq!(rig.weapon.ammo_in_clip(), 10);
        assert_eq!(rig.reserve(), 0);

        rig.call(|w, env, wl| w.start_fire(env, wl));
        assert_eq!(rig.weapon.ammo_in_clip(), 9);
        assert_eq!(rig.weapon.burst_counter(), 1);

        rig.advance(0.45);
        let fired = 10 - rig.weapon.ammo_in_clip();
        assert!((5..=6).contains(&fired), "fired {fired}");

        rig.call(|w, env, wl| w.stop_fire(env, wl));
        assert_eq!(rig.weapon.state(), WeaponState::Idle);
        assert_eq!(rig.weapon.burst_counter(), 0);
        let stopped = rig.log.montages_stopped();
        assert!(stopped.contains(&"fire".to_string()));
        assert!(stopped.contains(&"fire_aim".to_string()));

        let clip = rig.weapon.ammo_in_clip();
        rig.advance(0.5);
        assert_eq!(rig.weapon.ammo_in_clip(), clip);
    }

    #[test]
    fn stop_reload_outside_reloading_is_ignored() {
        let mut rig = Rig::new(10);
        rig.weapon.equipped = true;
        rig.weapon.pending_reload = true;
        rig.call(|w, env, wl| w.stop_reload(env, wl));
        assert!(rig.weapon.is_pending_reload());
        assert_eq!(rig.weapon.state(), WeaponState::Idle);
    }

    #[test]
    fn equip_then_unequip_conserves_reserve() {
        let mut rig = Rig::new(25);
        let before = rig.reserve();
        rig.call(|w, env, wl| w.on_equip(env, wl));
        rig.advance(1.1);
        assert_eq!(rig.reserve(), 15);

        rig.call(|w, env, wl| w.on_unequip(env, wl));
        assert_eq!(rig.reserve(), before);
        assert_eq!(rig.weapon.ammo_in_clip(), 0);
        assert_eq!(rig.weapon.state(), WeaponState::Idle);
    }

    #[test]
    fn unequip_mid_reload_cancels_transfer() {
        let mut rig = Rig::new(25);
        rig.call(|w, env, wl| w.on_equip(env, wl));
        rig.advance(0.3);
        rig.call(|w, env, wl| w.on_unequip(env, wl));
        assert!(!rig.weapon.is_pending_reload());

        rig.advance(2.0);
        assert_eq!(rig.weapon.ammo_in_clip(), 0);
        assert_eq!(rig.reserve(), 25);
    }

    #[test]
    fn proxies_forward_requests_to_authority() {
        let mut rig = Rig::new(25);
        rig.weapon.role = NetRole::AutonomousProxy;
        rig.env.mode = NetMode::Client;

        rig.call(|w, env, wl| w.on_equip(env, wl));
        assert_eq!(rig.env.outbox.take_requests(), vec![ClientMsg::StartReload]);
        rig.advance(1.1);
        assert_eq!(rig.weapon.ammo_in_clip(), 0, "only the authority moves ammo");
        assert_eq!(rig.reserve(), 25);

        rig.weapon.apply_ammo_in_clip(10);
        rig.call(|w, env, wl| w.start_fire(env, wl));
        let requests = rig.env.outbox.take_requests();
        assert_eq!(requests, vec![ClientMsg::StartFire, ClientMsg::HandleFiring]);
        assert_eq!(rig.weapon.ammo_in_clip(), 9);
    }

    #[test]
    fn mirrored_shots_update_authority_clip() {
        let mut rig = Rig::new(10);
        rig.weapon.locally_controlled = false;
        rig.env.mode = NetMode::DedicatedServer;
        rig.weapon.equipped = true;
        rig.weapon.ammo_in_clip = 5;

        rig.call(|w, env, wl| w.start_fire(env, wl));
        assert_eq!(rig.weapon.ammo_in_clip(), 5, "authority does not fire for a remote owner");

        rig.call(|w, env, wl| w.server_handle_firing(env, wl));
        assert_eq!(rig.weapon.ammo_in_clip(), 4);
        assert_eq!(rig.weapon.burst_counter(), 1);

        rig.call(|w, env, wl| w.server_handle_firing(env, wl));
        rig.call(|w, env, wl| w.server_handle_firing(env, wl));
        assert_eq!(rig.weapon.ammo_in_clip(), 2, "jitter within the slack is accepted");

        rig.call(|w, env, wl| w.server_handle_firing(env, wl));
        assert_eq!(rig.weapon.ammo_in_clip(), 2, "ahead of the fire rate");

        rig.advance(0.1);
        rig.call(|w, env, wl| w.server_handle_firing(env, wl));
        assert_eq!(rig.weapon.ammo_in_clip(), 1);
    }

    #[test]
    fn mirrored_shots_delivered_together_both_debit_the_clip() {
        let mut rig = Rig::new(0);
        rig.weapon.locally_controlled = false;
        rig.env.mode = NetMode::DedicatedServer;
        rig.weapon.equipped = true;
        rig.weapon.ammo_in_clip = 10;

        rig.call(|w, env, wl| w.start_fire(env, wl));
        rig.call(|w, env, wl| w.server_handle_firing(env, wl));
        rig.call(|w, env, wl| w.server_handle_firing(env, wl));
        assert_eq!(rig.weapon.ammo_in_clip(), 8);
        assert_eq!(rig.weapon.burst_counter(), 2);
    }

    #[test]
    fn new_burst_resets_the_mirrored_shot_budget() {
        let mut rig = Rig::new(0);
        rig.weapon.locally_controlled = false;
        rig.env.mode = NetMode::DedicatedServer;
        rig.weapon.equipped = true;
        rig.weapon.ammo_in_clip = 10;

        rig.call(|w, env, wl| w.start_fire(env, wl));
        for _ in 0..4 {
            rig.call(|w, env, wl| w.server_handle_firing(env, wl));
        }
        assert_eq!(rig.weapon.ammo_in_clip(), 7);

        rig.call(|w, env, wl| w.stop_fire(env, wl));
        rig.call(|w, env, wl| w.start_fire(env, wl));
        rig.call(|w, env, wl| w.server_handle_firing(env, wl));
        assert_eq!(rig.weapon.ammo_in_clip(), 6);
    }

    #[test]
    fn proxy_mirrors_the_shot_before_claiming_its_hit() {
        let mut rig = Rig::new(0);
        rig.weapon.role = NetRole::AutonomousProxy;
        rig.env.mode = NetMode::Client;
        rig.weapon.equipped = true;
        rig.weapon.apply_ammo_in_clip(10);
        let target = Uuid::new_v4();
        rig.env.collision.insert_pawn(target, Vec3::new(200.0, 0.0, 0.0));

        rig.call(|w, env, wl| w.start_fire(env, wl));
        let requests = rig.env.outbox.take_requests();
        assert!(matches!(
            requests.as_slice(),
            [ClientMsg::StartFire, ClientMsg::HandleFiring, ClientMsg::HandleHit { hit }] if hit.target == Some(target)
        ));
    }
}
