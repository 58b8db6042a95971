//! Presentation boundary: named cues and timed montages
//!
//! The simulation never renders anything. It names cues and asks for montage
//! lengths, which size reload and equip timers.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::ActorId;

/// Animation reference with its playback length in seconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Montage {
    pub name: String,
    pub duration: f32,
}

impl Montage {
    pub fn new(name: &str, duration: f32) -> Self {
        Self {
            name: name.to_string(),
            duration,
        }
    }

    pub fn is_set(&self) -> bool {
        !self.name.is_empty()
    }
}

/// One-shot or looped effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cue {
    EquipSound,
    ReloadSound,
    FireSound,
    FireLoopSound,
    FireFinishSound,
    OutOfAmmoSound,
    MuzzleFlash,
    MuzzleFlashStop,
    CameraShake,
    HitMarker,
    Impact,
    MeleeSwing,
    ThrowableToss,
    FocusBegin,
    FocusEnd,
    Death,
}

pub trait Presentation: Send {
    fn play_cue(&mut self, actor: ActorId, cue: Cue);

    /// Start a montage, returning its length or 0.0 when unavailable
    fn play_montage(&mut self, actor: ActorId, montage: &Montage) -> f32;

    fn stop_montage(&mut self, actor: ActorId, montage: &Montage);
}

/// Server-side presentation: no output, montage lengths from configuration
#[derive(Debug, Default)]
pub struct Headless;

impl Presentation for Headless {
    fn play_cue(&mut self, actor: ActorId, cue: Cue) {
        tracing::trace!(actor_id = %actor, ?cue, "cue");
    }

    fn play_montage(&mut self, _actor: ActorId, montage: &Montage) -> f32 {
        if montage.is_set() {
            montage.duration.max(0.0)
        } else {
            0.0
        }
    }

    fn stop_montage(&mut self, _actor: ActorId, _montage: &Montage) {}
}

/// Records everything it is asked to present
#[derive(Debug, Default)]
pub struct PresentationLog {
    pub cues: Vec<(ActorId, Cue)>,
    pub montages_played: Vec<(ActorId, String)>,
    pub montages_stopped: Vec<(ActorId, String)>,
}

impl PresentationLog {
    pub fn count(&self, cue: Cue) -> usize {
        self.cues.iter().filter(|(_, c)| *c == cue).count()
    }

    pub fn clear(&mut self) {
        self.cues.clear();
        self.montages_played.clear();
        self.montages_stopped.clear();
    }
}

impl Presentation for PresentationLog {
    fn play_cue(&mut self, actor: ActorId, cue: Cue) {
        self.cues.push((actor, cue));
    }

    fn play_montage(&mut self, actor: ActorId, montage: &Montage) -> f32 {
        if !montage.is_set() {
            return 0.0;
        }
        self.montages_played.push((actor, montage.name.clone()));
        montage.duration.max(0.0)
    }

    fn stop_montage(&mut self, actor: ActorId, montage: &Montage) {
        if montage.is_set() {
            self.montages_stopped.push((actor, montage.name.clone()));
        }
    }
}

/// Cloneable handle to a log shared between a world and its observer
#[derive(Debug, Clone, Default)]
pub struct SharedPresentationLog(Arc<Mutex<PresentationLog>>);

impl SharedPresentationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, cue: Cue) -> usize {
        self.0.lock().count(cue)
    }

    pub fn montages_played(&self) -> Vec<String> {
        self.0.lock().montages_played.iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn montages_stopped(&self) -> Vec<String> {
        self.0.lock().montages_stopped.iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

impl Presentation for SharedPresentationLog {
    fn play_cue(&mut self, actor: ActorId, cue: Cue) {
        self.0.lock().play_cue(actor, cue);
    }

    fn play_montage(&mut self, actor: ActorId, montage: &Montage) -> f32 {
        self.0.lock().play_montage(actor, montage)
    }

    fn stop_montage(&mut self, actor: ActorId, montage: &Montage) {
        self.0.lock().stop_montage(actor, montage);
    }
}
