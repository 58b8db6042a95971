//! Combat - hit-scan configuration, damage events and health math

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::physics::Vec3;
use super::presentation::Montage;
use super::ActorId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageType {
    #[default]
    Bullet,
    Melee,
    Explosion,
}

/// Damage multiplier applied when a specific bone is hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoneDamageModifier {
    pub bone: String,
    pub multiplier: f32,
}

/// Instant-hit trace parameters for a weapon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitScanConfig {
    /// Max trace distance
    pub distance: f32,
    /// Base damage per hit
    pub damage: f32,
    #[serde(default)]
    pub bone_damage_modifiers: Vec<BoneDamageModifier>,
    #[serde(default)]
    pub damage_type: DamageType,
}

impl Default for HitScanConfig {
    fn default() -> Self {
        Self {
            distance: 10_000.0,
            damage: 20.0,
            bone_damage_modifiers: Vec::new(),
            damage_type: DamageType::Bullet,
        }
    }
}

impl HitScanConfig {
    /// Multiplier for the hit bone, 1.0 when unconfigured
    pub fn bone_multiplier(&self, bone: Option<&str>) -> f32 {
        bone.and_then(|b| {
            self.bone_damage_modifiers
                .iter()
                .find(|m| m.bone == b)
                .map(|m| m.multiplier)
        })
        .unwrap_or(1.0)
    }
}

/// Unarmed attack parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeleeConfig {
    pub distance: f32,
    pub damage: f32,
    /// Attack montage; its length is also the attack cooldown
    pub montage: Montage,
}

impl Default for MeleeConfig {
    fn default() -> Self {
        Self {
            distance: 150.0,
            damage: 20.0,
            montage: Montage::new("melee_attack", 0.8),
        }
    }
}

/// Thrown-item parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrowableConfig {
    pub id: String,
    pub toss_anim: Montage,
    /// Launch speed along the view direction
    pub initial_speed: f32,
    /// Seconds the thrown actor lives before cleanup
    #[serde(default = "default_fuse")]
    pub lifetime: f32,
}

fn default_fuse() -> f32 {
    5.0
}

/// Hit data a client submits for a shot it fired locally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimedHit {
    pub target: Option<ActorId>,
    pub impact_point: Vec3,
    #[serde(default)]
    pub bone: Option<String>,
}

/// Authoritative damage application queued for resolution
#[derive(Debug, Clone)]
pub struct PointDamage {
    pub target: ActorId,
    pub amount: f32,
    pub damage_type: DamageType,
    /// Actor that dealt the damage (weapon or character)
    pub causer: ActorId,
    /// Character responsible, if any
    pub instigator: Option<ActorId>,
    pub impact_point: Vec3,
    pub bone: Option<String>,
}

/// Thrown item in flight
#[derive(Debug, Clone)]
pub struct ThrownProjectile {
    pub id: Uuid,
    pub owner: ActorId,
    pub throwable: String,
    pub position: Vec3,
    pub velocity: Vec3,
}

impl ThrownProjectile {
    pub fn update(&mut self, dt: f32) {
        self.position = self.position + self.velocity * dt;
    }
}

/// Combat math shared by weapons, melee and health
pub struct CombatSystem;

impl CombatSystem {
    /// Hit-scan damage after the bone multiplier
    pub fn hit_damage(config: &HitScanConfig, bone: Option<&str>) -> f32 {
        config.damage * config.bone_multiplier(bone)
    }

    /// Scale incoming damage by the product of equipped gear multipliers
    pub fn apply_defence(damage: f32, multipliers: impl IntoIterator<Item = f32>) -> f32 {
        let factor: f32 = multipliers
            .into_iter()
            .map(|m| m.clamp(0.0, 1.0))
            .product();
        (damage * factor).max(0.0)
    }

    /// Clamp health after a change, returns (new_health, actual_delta)
    pub fn apply_health_delta(current: f32, max: f32, delta: f32) -> (f32, f32) {
        let new_health = (current + delta).clamp(0.0, max);
        (new_health, new_health - current)
    }
}
