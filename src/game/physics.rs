//! Geometry and line-trace queries against actor colliders

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::{Add, Mul, Sub};

use super::ActorId;

/// World-space vector
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };
    pub const UP: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 1.0 };
    pub const FORWARD: Vec3 = Vec3 { x: 1.0, y: 0.0, z: 0.0 };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Vec3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn length_squared(self) -> f32 {
        self.dot(self)
    }

    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    pub fn distance(self, other: Vec3) -> f32 {
        (self - other).length()
    }

    /// Unit vector in the same direction, or zero for degenerate input
    pub fn normalized(self) -> Vec3 {
        let len = self.length();
        if len <= f32::EPSILON {
            Vec3::ZERO
        } else {
            self * (1.0 / len)
        }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;
    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Eye point and facing of a character
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewPoint {
    pub location: Vec3,
    pub direction: Vec3,
}

impl Default for ViewPoint {
    fn default() -> Self {
        Self {
            location: Vec3::ZERO,
            direction: Vec3::FORWARD,
        }
    }
}

impl ViewPoint {
    pub fn new(location: Vec3, direction: Vec3) -> Self {
        Self {
            location,
            direction: direction.normalized(),
        }
    }

    /// Point `distance` units along the view direction
    pub fn project(&self, distance: f32) -> Vec3 {
        self.location + self.direction * distance
    }
}

/// Collision filter for traces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceChannel {
    /// Interaction focus checks
    Visibility,
    /// Hit-scan and melee traces
    Weapon,
}

/// First blocking hit of a trace
#[derive(Debug, Clone, PartialEq)]
pub struct TraceHit {
    pub actor: ActorId,
    pub impact_point: Vec3,
    pub bone: Option<String>,
    pub distance: f32,
    /// Hit actor is a character
    pub pawn: bool,
}

/// Physics query consumed by weapons and interaction checks
pub trait WorldQuery {
    /// First blocking hit along `direction` within `max_distance`
    fn line_trace(
        &self,
        start: Vec3,
        direction: Vec3,
        max_distance: f32,
        channel: TraceChannel,
        ignore: &[ActorId],
    ) -> Option<TraceHit>;
}

/// Sphere collider attached to an actor, optionally tagged with a bone
#[derive(Debug, Clone)]
pub struct Collider {
    /// Offset from the actor position
    pub offset: Vec3,
    pub radius: f32,
    pub bone: Option<String>,
}

impl Collider {
    pub fn sphere(offset: Vec3, radius: f32) -> Self {
        Self {
            offset,
            radius,
            bone: None,
        }
    }

    pub fn bone(offset: Vec3, radius: f32, bone: &str) -> Self {
        Self {
            offset,
            radius,
            bone: Some(bone.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
struct Body {
    position: Vec3,
    colliders: Vec<Collider>,
    pawn: bool,
    blocks_visibility: bool,
    blocks_weapon: bool,
}

/// Character capsule approximation: torso sphere plus a head sphere
pub fn character_colliders() -> Vec<Collider> {
    vec![
        Collider::sphere(Vec3::ZERO, 45.0),
        Collider::bone(Vec3::new(0.0, 0.0, 60.0), 15.0, "head"),
    ]
}

/// Eye height above a character's position
pub const EYE_HEIGHT: f32 = 60.0;

/// Collision scene made of sphere colliders per actor
#[derive(Debug, Default)]
pub struct CollisionWorld {
    bodies: HashMap<ActorId, Body>,
}

impl CollisionWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace an actor's colliders
    pub fn insert(&mut self, actor: ActorId, position: Vec3, colliders: Vec<Collider>) {
        self.bodies.insert(
            actor,
            Body {
                position,
                colliders,
                pawn: false,
                blocks_visibility: true,
                blocks_weapon: true,
            },
        );
    }

    /// Register a character body
    pub fn insert_pawn(&mut self, actor: ActorId, position: Vec3) {
        self.insert(actor, position, character_colliders());
        if let Some(body) = self.bodies.get_mut(&actor) {
            body.pawn = true;
        }
    }

    pub fn remove(&mut self, actor: &ActorId) {
        self.bodies.remove(actor);
    }

    pub fn contains(&self, actor: &ActorId) -> bool {
        self.bodies.contains_key(actor)
    }

    pub fn set_position(&mut self, actor: &ActorId, position: Vec3) {
        if let Some(body) = self.bodies.get_mut(actor) {
            body.position = position;
        }
    }

    pub fn position(&self, actor: &ActorId) -> Option<Vec3> {
        self.bodies.get(actor).map(|b| b.position)
    }

    /// Enable or disable blocking for one channel
    pub fn set_channel_response(&mut self, actor: &ActorId, channel: TraceChannel, blocks: bool) {
        if let Some(body) = self.bodies.get_mut(actor) {
            match channel {
                TraceChannel::Visibility => body.blocks_visibility = blocks,
                TraceChannel::Weapon => body.blocks_weapon = blocks,
            }
        }
    }
}

impl WorldQuery for CollisionWorld {
    fn line_trace(
        &self,
        start: Vec3,
        direction: Vec3,
        max_distance: f32,
        channel: TraceChannel,
        ignore: &[ActorId],
    ) -> Option<TraceHit> {
        let dir = direction.normalized();
        if dir == Vec3::ZERO || max_distance <= 0.0 {
            return None;
        }

        let mut best: Option<TraceHit> = None;
        for (actor, body) in &self.bodies {
            if ignore.contains(actor) {
                continue;
            }
            let blocks = match channel {
                TraceChannel::Visibility => body.blocks_visibility,
                TraceChannel::Weapon => body.blocks_weapon,
            };
            if !blocks {
                continue;
            }

            for collider in &body.colliders {
                let center = body.position + collider.offset;
                if let Some(t) = ray_sphere(start, dir, center, collider.radius) {
                    if t > max_distance {
                        continue;
                    }
                    let closer = best.as_ref().map(|b| t < b.distance).unwrap_or(true);
                    if closer {
                        best = Some(TraceHit {
                            actor: *actor,
                            impact_point: start + dir * t,
                            bone: collider.bone.clone(),
                            distance: t,
                            pawn: body.pawn,
                        });
                    }
                }
            }
        }
        best
    }
}

/// Distance along a unit ray to a sphere surface, 0 when starting inside
fn ray_sphere(origin: Vec3, dir: Vec3, center: Vec3, radius: f32) -> Option<f32> {
    let oc = origin - center;
    let c = oc.length_squared() - radius * radius;
    if c <= 0.0 {
        return Some(0.0);
    }
    let b = oc.dot(dir);
    if b > 0.0 {
        return None;
    }
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    Some(-b - disc.sqrt())
}
