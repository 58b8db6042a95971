//! Per-world simulation services shared by every gameplay system

use super::physics::CollisionWorld;
use super::presentation::Presentation;
use super::replication::{NetMode, Outbox};
use super::scheduler::{Scheduler, TimerHandle};
use super::weapon::WeaponTimer;
use super::ActorId;

/// Deferred continuation owned by the world's tick loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimerTask {
    Weapon {
        owner: ActorId,
        weapon: ActorId,
        timer: WeaponTimer,
    },
    Interact {
        character: ActorId,
    },
    CorpseExpire {
        character: ActorId,
    },
    ProjectileExpire {
        projectile: ActorId,
    },
    ItemRespawn {
        spawner: usize,
    },
}

/// Clock, timers, collision, presentation and outbox of one participant
pub struct Env {
    pub now: f64,
    pub mode: NetMode,
    pub timers: Scheduler<TimerTask>,
    pub collision: CollisionWorld,
    pub fx: Box<dyn Presentation>,
    pub outbox: Outbox,
}

impl Env {
    pub fn new(mode: NetMode, fx: Box<dyn Presentation>) -> Self {
        Self {
            now: 0.0,
            mode,
            timers: Scheduler::new(),
            collision: CollisionWorld::new(),
            fx,
            outbox: Outbox::default(),
        }
    }

    pub fn schedule(&mut self, delay: f32, task: TimerTask) -> TimerHandle {
        self.timers.schedule(self.now, delay, task)
    }

    /// Cancel the timer held in `slot`, if any
    pub fn cancel(&mut self, slot: &mut Option<TimerHandle>) {
        self.timers.clear(slot);
    }

    pub fn is_active(&self, slot: Option<TimerHandle>) -> bool {
        slot.map(|h| self.timers.is_active(h)).unwrap_or(false)
    }

    pub fn remaining(&self, slot: Option<TimerHandle>) -> Option<f32> {
        slot.and_then(|h| self.timers.remaining(h, self.now))
    }
}
