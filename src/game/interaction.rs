//! Focus / hold / interact protocol between characters and interactables

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ws::protocol::ClientMsg;

use super::physics::{TraceChannel, ViewPoint, WorldQuery};
use super::presentation::Cue;
use super::scheduler::TimerHandle;
use super::sim::{Env, TimerTask};
use super::ActorId;

/// Hold times at or below this fire immediately
const INSTANT_INTERACTION: f32 = 1e-4;

/// Interactables indexed by owning actor
pub type Interactables = HashMap<ActorId, Interactable>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractableConfig {
    /// Seconds the interact key must be held
    pub interaction_time: f32,
    pub interaction_distance: f32,
    pub name: String,
    pub action: String,
    pub allow_multiple_interactors: bool,
}

impl Default for InteractableConfig {
    fn default() -> Self {
        Self {
            interaction_time: 0.0,
            interaction_distance: 200.0,
            name: "Interactable Object".to_string(),
            action: "Interact".to_string(),
            allow_multiple_interactors: true,
        }
    }
}

/// Interaction capability attached to an actor
#[derive(Debug, Clone)]
pub struct Interactable {
    pub owner: ActorId,
    pub config: InteractableConfig,
    active: bool,
    interactors: Vec<ActorId>,
}

impl Interactable {
    pub fn new(owner: ActorId, config: InteractableConfig) -> Self {
        Self {
            owner,
            config,
            active: true,
            interactors: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn interactors(&self) -> &[ActorId] {
        &self.interactors
    }

    /// Active and not exclusively held by someone else
    pub fn can_interact(&self, character: ActorId) -> bool {
        let held_by_other = self.interactors.iter().any(|i| *i != character);
        let blocked = !self.config.allow_multiple_interactors && held_by_other;
        !blocked && self.active
    }

    fn begin_focus(&mut self, who: &Interactor, env: &mut Env) {
        if !self.active {
            return;
        }
        if who.local {
            env.fx.play_cue(self.owner, Cue::FocusBegin);
        }
    }

    fn end_focus(&mut self, who: &Interactor, env: &mut Env) {
        if who.local {
            env.fx.play_cue(self.owner, Cue::FocusEnd);
        }
    }

    pub fn begin_interact(&mut self, character: ActorId) -> bool {
        if !self.can_interact(character) {
            return false;
        }
        if !self.interactors.contains(&character) {
            self.interactors.push(character);
        }
        true
    }

    pub fn end_interact(&mut self, character: ActorId) {
        self.interactors.retain(|i| *i != character);
    }

    /// Final dispatch check
    pub fn interact(&self, character: ActorId) -> bool {
        self.can_interact(character)
    }

    /// Deactivate and release every interactor, returning who was interacting
    pub fn deactivate(&mut self) -> Vec<ActorId> {
        self.active = false;
        std::mem::take(&mut self.interactors)
    }
}

/// The acting character as seen by the interaction protocol
#[derive(Debug, Clone, Copy)]
pub struct Interactor {
    pub id: ActorId,
    pub view: ViewPoint,
    pub authority: bool,
    /// Driven by this participant's input
    pub local: bool,
}

/// Per-character focus and hold state
#[derive(Debug, Default)]
pub struct InteractionData {
    pub viewed: Option<ActorId>,
    pub interact_held: bool,
    pub last_check_time: f64,
    timer: Option<TimerHandle>,
}

impl InteractionData {
    pub fn is_interacting(&self, env: &Env) -> bool {
        env.is_active(self.timer)
    }

    pub fn remaining_time(&self, env: &Env) -> Option<f32> {
        env.remaining(self.timer)
    }

    /// Progress of the current hold, 0..=1
    pub fn interact_percentage(&self, env: &Env, targets: &Interactables) -> f32 {
        let Some(target) = self.viewed.and_then(|id| targets.get(&id)) else {
            return 0.0;
        };
        let total = target.config.interaction_time;
        match self.remaining_time(env) {
            Some(remaining) if total > 0.0 => (1.0 - remaining / total).clamp(0.0, 1.0),
            _ => 0.0,
        }
    }

    /// Whether a periodic scan is due for this character
    pub fn check_due(&self, who: &Interactor, env: &Env, frequency: f32) -> bool {
        let scanning_side = !who.authority || who.local || self.is_interacting(env);
        scanning_side && env.now - self.last_check_time > f64::from(frequency)
    }

    pub fn perform_check(&mut self, who: &Interactor, check_distance: f32, env: &mut Env, targets: &mut Interactables) {
        self.last_check_time = env.now;

        let hit = env.collision.line_trace(
            who.view.location,
            who.view.direction,
            check_distance,
            TraceChannel::Visibility,
            &[who.id],
        );

        if let Some(hit) = hit {
            let found = targets
                .get(&hit.actor)
                .filter(|t| t.is_active())
                .map(|t| t.config.interaction_distance);
            if let Some(max_distance) = found {
                let distance = who.view.location.distance(hit.impact_point);
                if self.viewed != Some(hit.actor) && distance <= max_distance {
                    self.found_new(who, hit.actor, env, targets);
                } else if distance > max_distance && self.viewed.is_some() {
                    self.couldnt_find(who, env, targets);
                }
                return;
            }
        }

        self.couldnt_find(who, env, targets);
    }

    fn found_new(&mut self, who: &Interactor, target: ActorId, env: &mut Env, targets: &mut Interactables) {
        self.end_interact(who, env, targets);
        if let Some(old) = self.viewed.and_then(|id| targets.get_mut(&id)) {
            old.end_focus(who, env);
        }
        self.viewed = Some(target);
        if let Some(new) = targets.get_mut(&target) {
            new.begin_focus(who, env);
        }
    }

    /// Drop focus, cancelling any interaction in progress
    pub fn couldnt_find(&mut self, who: &Interactor, env: &mut Env, targets: &mut Interactables) {
        if self.viewed.is_none() && !self.interact_held && self.timer.is_none() {
            return;
        }
        env.cancel(&mut self.timer);
        if let Some(old) = self.viewed.and_then(|id| targets.get_mut(&id)) {
            old.end_focus(who, env);
        }
        if self.interact_held {
            self.end_interact(who, env, targets);
        }
        self.viewed = None;
    }

    /// Press: returns the target when the interaction completed immediately
    pub fn begin_interact(
        &mut self,
        who: &Interactor,
        check_distance: f32,
        env: &mut Env,
        targets: &mut Interactables,
    ) -> Option<ActorId> {
        if !who.authority {
            env.outbox.request(ClientMsg::BeginInteract);
        }
        if who.authority {
            self.perform_check(who, check_distance, env, targets);
        }
        self.interact_held = true;

        let target_id = self.viewed?;
        let Some(target) = targets.get_mut(&target_id) else {
            tracing::warn!(actor_id = %who.id, target = %target_id, "focused interactable no longer exists");
            self.viewed = None;
            return None;
        };
        if !target.begin_interact(who.id) {
            tracing::debug!(actor_id = %who.id, target = %target_id, "interactable busy");
            return None;
        }

        let hold = target.config.interaction_time;
        if hold <= INSTANT_INTERACTION {
            self.interact(who, env, targets)
        } else {
            env.cancel(&mut self.timer);
            self.timer = Some(env.schedule(hold, TimerTask::Interact { character: who.id }));
            None
        }
    }

    /// Release; a second call with nothing in progress does nothing
    pub fn end_interact(&mut self, who: &Interactor, env: &mut Env, targets: &mut Interactables) {
        if !self.interact_held && self.timer.is_none() {
            return;
        }
        if !who.authority {
            env.outbox.request(ClientMsg::EndInteract);
        }
        self.interact_held = false;
        env.cancel(&mut self.timer);
        if let Some(target) = self.viewed.and_then(|id| targets.get_mut(&id)) {
            target.end_interact(who.id);
        }
    }

    /// Hold completed; returns the target if it still accepts the interaction
    pub fn interact(&mut self, who: &Interactor, env: &mut Env, targets: &Interactables) -> Option<ActorId> {
        env.cancel(&mut self.timer);
        let target_id = self.viewed?;
        let target = targets.get(&target_id)?;
        target.interact(who.id).then_some(target_id)
    }

    /// Timer continuation
    pub fn on_timer(&mut self, who: &Interactor, env: &mut Env, targets: &Interactables) -> Option<ActorId> {
        self.timer = None;
        self.interact(who, env, targets)
    }

    /// Forget everything without notifying targets (owner is going away)
    pub fn reset(&mut self, env: &mut Env) {
        env.cancel(&mut self.timer);
        self.viewed = None;
        self.interact_held = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::physics::Vec3;
    use crate::game::presentation::PresentationLog;
    use crate::game::replication::NetMode;
    use uuid::Uuid;

    struct Rig {
        env: Env,
        targets: Interactables,
        who: Interactor,
        data: InteractionData,
        target: ActorId,
    }

    fn rig(hold: f32, distance_to_target: f32) -> Rig {
        let mut env = Env::new(NetMode::ListenServer, Box::new(PresentationLog::default()));
        let target = Uuid::new_v4();
        env.collision.insert(
            target,
            Vec3::new(distance_to_target + 10.0, 0.0, 0.0),
            vec![crate::game::physics::Collider::sphere(Vec3::ZERO, 10.0)],
        );
        let mut targets = Interactables::new();
        targets.insert(
            target,
            Interactable::new(
                target,
                InteractableConfig {
                    interaction_time: hold,
                    allow_multiple_interactors: false,
                    ..InteractableConfig::default()
                },
            ),
        );
        Rig {
            env,
            targets,
            who: Interactor {
                id: Uuid::new_v4(),
                view: ViewPoint::new(Vec3::ZERO, Vec3::FORWARD),
                authority: true,
                local: true,
            },
            data: InteractionData::default(),
            target,
        }
    }

    #[test]
    fn scan_focuses_target_within_its_distance() {
        let mut r = rig(0.5, 150.0);
        r.data.perform_check(&r.who, 1000.0, &mut r.env, &mut r.targets);
        assert_eq!(r.data.viewed, Some(r.target));

        let mut far = rig(0.5, 500.0);
        far.data.perform_check(&far.who, 1000.0, &mut far.env, &mut far.targets);
        assert_eq!(far.data.viewed, None);
    }

    #[test]
    fn instant_interaction_fires_on_press() {
        let mut r = rig(0.0, 100.0);
        let fired = r.data.begin_interact(&r.who, 1000.0, &mut r.env, &mut r.targets);
        assert_eq!(fired, Some(r.target));
        assert!(!r.data.is_interacting(&r.env));
    }

    #[test]
    fn held_interaction_fires_after_timer() {
        let mut r = rig(0.5, 100.0);
        assert_eq!(r.data.begin_interact(&r.who, 1000.0, &mut r.env, &mut r.targets), None);
        assert!(r.data.is_interacting(&r.env));
        assert_eq!(r.targets[&r.target].interactors(), &[r.who.id]);

        r.env.now = 0.25;
        let pct = r.data.interact_percentage(&r.env, &r.targets);
        assert!((pct - 0.5).abs() < 1e-3);

        r.env.now = 0.5;
        let (_, task) = r.env.timers.pop_due(r.env.now).expect("interact timer");
        assert_eq!(task, TimerTask::Interact { character: r.who.id });
        assert_eq!(r.data.on_timer(&r.who, &mut r.env, &r.targets), Some(r.target));
    }

    #[test]
    fn end_interact_twice_is_a_no_op() {
        let mut r = rig(0.5, 100.0);
        r.data.begin_interact(&r.who, 1000.0, &mut r.env, &mut r.targets);
        r.data.end_interact(&r.who, &mut r.env, &mut r.targets);
        assert!(!r.data.is_interacting(&r.env));
        assert!(r.targets[&r.target].interactors().is_empty());

        r.data.end_interact(&r.who, &mut r.env, &mut r.targets);
        assert!(!r.data.interact_held);
        assert!(r.env.timers.is_empty());
        assert_eq!(r.data.viewed, Some(r.target));
    }

    #[test]
    fn exclusive_target_rejects_second_interactor() {
        let mut r = rig(0.5, 100.0);
        r.data.begin_interact(&r.who, 1000.0, &mut r.env, &mut r.targets);

        let other = Interactor {
            id: Uuid::new_v4(),
            ..r.who
        };
        let mut other_data = InteractionData::default();
        assert_eq!(other_data.begin_interact(&other, 1000.0, &mut r.env, &mut r.targets), None);
        assert!(!other_data.is_interacting(&r.env));
        assert_eq!(r.targets[&r.target].interactors(), &[r.who.id]);
    }

    #[test]
    fn final_dispatch_rechecks_target() {
        let mut r = rig(0.5, 100.0);
        r.data.begin_interact(&r.who, 1000.0, &mut r.env, &mut r.targets);
        if let Some(t) = r.targets.get_mut(&r.target) {
            t.set_active(false);
        }
        assert_eq!(r.data.interact(&r.who, &mut r.env, &r.targets), None);
    }

    #[test]
    fn losing_focus_cancels_held_interaction() {
        let mut r = rig(0.5, 100.0);
        r.data.begin_interact(&r.who, 1000.0, &mut r.env, &mut r.targets);
        r.who.view = ViewPoint::new(Vec3::ZERO, Vec3::new(0.0, 1.0, 0.0));
        r.data.perform_check(&r.who, 1000.0, &mut r.env, &mut r.targets);

        assert_eq!(r.data.viewed, None);
        assert!(!r.data.interact_held);
        assert!(!r.data.is_interacting(&r.env));
        assert!(r.targets[&r.target].interactors().is_empty());
    }

    #[test]
    fn proxy_forwards_press_and_release() {
        let mut r = rig(0.5, 100.0);
        r.who.authority = false;
        r.data.perform_check(&r.who, 1000.0, &mut r.env, &mut r.targets);
        r.data.begin_interact(&r.who, 1000.0, &mut r.env, &mut r.targets);
        r.data.end_interact(&r.who, &mut r.env, &mut r.targets);
        assert_eq!(
            r.env.outbox.take_requests(),
            vec![ClientMsg::BeginInteract, ClientMsg::EndInteract]
        );
    }
}
