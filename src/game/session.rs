//! Game session and authoritative tick loop

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::GameTuning;
use crate::util::time::{tick_delta, unix_millis};
use crate::ws::protocol::{ClientMsg, ServerMsg};

use super::catalog::Catalog;
use super::presentation::Headless;
use super::replication::{Delivery, Notification, NetMode, RpcScope};
use super::snapshot::{ReplicationChannel, SnapshotBuilder};
use super::world::{GameEvent, World};
use super::ActorId;

/// Queue depth for cosmetic traffic before it is dropped
pub const UNRELIABLE_QUEUE: usize = 32;

/// Outgoing message queues of one connected client
#[derive(Debug, Clone)]
pub struct ClientLink {
    pub reliable: mpsc::UnboundedSender<ServerMsg>,
    pub unreliable: mpsc::Sender<ServerMsg>,
}

impl ClientLink {
    /// Link plus the receiving ends for the connection's writer task
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerMsg>, mpsc::Receiver<ServerMsg>) {
        let (reliable, reliable_rx) = mpsc::unbounded_channel();
        let (unreliable, unreliable_rx) = mpsc::channel(UNRELIABLE_QUEUE);
        (Self { reliable, unreliable }, reliable_rx, unreliable_rx)
    }

    pub fn send(&self, msg: ServerMsg) {
        match msg.delivery() {
            Delivery::Reliable => {
                let _ = self.reliable.send(msg);
            }
            Delivery::Unreliable => {
                if self.unreliable.try_send(msg).is_err() {
                    debug!("unreliable queue full, message dropped");
                }
            }
        }
    }
}

/// Input from a connection to the session loop
#[derive(Debug)]
pub enum SessionInput {
    Join {
        actor_id: ActorId,
        name: String,
        link: ClientLink,
    },
    Leave {
        actor_id: ActorId,
    },
    Request {
        actor_id: ActorId,
        msg: ClientMsg,
    },
}

#[derive(Debug, Default)]
pub struct SessionStats {
    pub players: AtomicUsize,
    pub tick: AtomicU64,
}

/// Handle to the running session
#[derive(Clone)]
pub struct SessionHandle {
    pub input_tx: mpsc::Sender<SessionInput>,
    pub stats: Arc<SessionStats>,
}

impl SessionHandle {
    pub fn player_count(&self) -> usize {
        self.stats.players.load(Ordering::Relaxed)
    }

    pub fn tick(&self) -> u64 {
        self.stats.tick.load(Ordering::Relaxed)
    }
}

struct ConnectedPlayer {
    name: String,
    link: ClientLink,
    channel: ReplicationChannel,
}

/// The authoritative game session
pub struct GameSession {
    world: World,
    input_rx: mpsc::Receiver<SessionInput>,
    players: HashMap<ActorId, ConnectedPlayer>,
    snapshot_builder: SnapshotBuilder,
    tuning: GameTuning,
    stats: Arc<SessionStats>,
}

impl GameSession {
    /// Create a new session with a populated world
    pub fn new(catalog: Arc<Catalog>, tuning: GameTuning, seed: u64) -> (Self, SessionHandle) {
        let (input_tx, input_rx) = mpsc::channel(1024);
        let stats = Arc::new(SessionStats::default());

        let handle = SessionHandle {
            input_tx,
            stats: stats.clone(),
        };

        let mut world = World::new(NetMode::DedicatedServer, catalog, tuning.clone(), seed, Box::new(Headless));
        world.populate_default();

        let session = Self {
            world,
            input_rx,
            players: HashMap::new(),
            snapshot_builder: SnapshotBuilder::new(tuning.snapshot_interval()),
            tuning,
            stats,
        };
        (session, handle)
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Run the authoritative tick loop until every handle is dropped
    pub async fn run(mut self) {
        info!(tick_rate = self.tuning.tick_rate, "Session started");

        let tick_duration = Duration::from_micros(1_000_000 / u64::from(self.tuning.tick_rate.max(1)));
        let mut tick_interval = interval(tick_duration);
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let dt = tick_delta(self.tuning.tick_rate);

        loop {
            tick_interval.tick().await;

            // Drain input queue
            if !self.process_inputs() {
                info!("All session handles dropped, stopping");
                break;
            }

            self.step(dt);
        }
    }

    /// Drain pending inputs; false once the input channel is closed
    fn process_inputs(&mut self) -> bool {
        loop {
            match self.input_rx.try_recv() {
                Ok(input) => self.handle_input(input),
                Err(mpsc::error::TryRecvError::Empty) => return true,
                Err(mpsc::error::TryRecvError::Disconnected) => return false,
            }
        }
    }

    pub fn handle_input(&mut self, input: SessionInput) {
        match input {
            SessionInput::Join { actor_id, name, link } => self.handle_join(actor_id, name, link),
            SessionInput::Leave { actor_id } => self.handle_leave(actor_id),
            SessionInput::Request {
                actor_id,
                msg: ClientMsg::Ping { t },
            } => {
                if let Some(player) = self.players.get(&actor_id) {
                    player.link.send(ServerMsg::Pong { t });
                }
            }
            SessionInput::Request { actor_id, msg } => {
                if !self.players.contains_key(&actor_id) {
                    debug!(actor_id = %actor_id, "request from unknown player");
                    return;
                }
                self.world.handle_request(actor_id, msg);
            }
        }
    }

    fn handle_join(&mut self, actor_id: ActorId, name: String, link: ClientLink) {
        if self.players.contains_key(&actor_id) {
            warn!(actor_id = %actor_id, "Player already in session");
            return;
        }
        if self.players.len() >= self.tuning.max_players {
            link.send(ServerMsg::Error {
                code: "session_full".to_string(),
                message: "Session is full".to_string(),
            });
            return;
        }

        let position = self.world.random_spawn_point();
        self.world.spawn_character(actor_id, &name, position, false);

        for player in self.players.values() {
            player.link.send(ServerMsg::PlayerJoined {
                actor_id,
                name: name.clone(),
            });
        }
        self.players.insert(
            actor_id,
            ConnectedPlayer {
                name,
                link,
                channel: ReplicationChannel::new(actor_id),
            },
        );
        self.stats.players.store(self.players.len(), Ordering::Relaxed);
        if let Some(player) = self.players.get(&actor_id) {
            player.link.send(ServerMsg::Welcome {
                actor_id,
                server_time: unix_millis(),
            });
        }
        self.snapshot_builder.force_next();

        info!(
            actor_id = %actor_id,
            player_count = self.players.len(),
            "Player joined session"
        );
    }

    fn handle_leave(&mut self, actor_id: ActorId) {
        if self.players.remove(&actor_id).is_none() {
            return;
        }
        self.world.remove_character(actor_id);
        for player in self.players.values() {
            player.link.send(ServerMsg::PlayerLeft { actor_id });
        }
        self.stats.players.store(self.players.len(), Ordering::Relaxed);
        info!(actor_id = %actor_id, player_count = self.players.len(), "Player left session");
    }

    /// One simulation step followed by message delivery
    pub fn step(&mut self, dt: f32) {
        self.world.tick(dt);
        self.stats.tick.store(self.world.tick_count(), Ordering::Relaxed);

        for event in self.world.take_events() {
            self.handle_event(event);
        }
        for notification in self.world.env.outbox.take_notifications() {
            self.route(notification);
        }
        // Requests only come from client worlds
        self.world.env.outbox.take_requests();

        if self.snapshot_builder.should_send() {
            self.send_snapshots();
        }
    }

    fn handle_event(&mut self, event: GameEvent) {
        match event {
            GameEvent::Died { victim, killer } => {
                debug!(actor_id = %victim, killer = %killer, "death replicated");
                self.snapshot_builder.force_next();
            }
            GameEvent::CorpseExpired { character } => self.respawn(character),
            GameEvent::ItemTaken {
                character,
                class,
                quantity,
            } => {
                debug!(actor_id = %character, item = %class, quantity, "item taken");
            }
            GameEvent::ActorRemoved { .. } => {}
        }
    }

    /// Fresh character for a connected player whose corpse expired
    fn respawn(&mut self, character: ActorId) {
        let Some(name) = self.players.get(&character).map(|p| p.name.clone()) else {
            return;
        };
        let position = self.world.random_spawn_point();
        self.world.spawn_character(character, &name, position, false);
        for player in self.players.values_mut() {
            player.channel.reset_actor(character);
        }
        self.snapshot_builder.force_next();
        info!(actor_id = %character, "Player respawned");
    }

    fn route(&self, notification: Notification) {
        let Notification { scope, message, .. } = notification;
        match scope {
            RpcScope::OwningClient(owner) => {
                if let Some(player) = self.players.get(&owner) {
                    player.link.send(message);
                }
            }
            RpcScope::Multicast => {
                for player in self.players.values() {
                    player.link.send(message.clone());
                }
            }
            RpcScope::Server => warn!("server-scoped notification produced on the server"),
        }
    }

    fn send_snapshots(&mut self) {
        let tick = self.world.tick_count();
        let server_time = unix_millis();
        for player in self.players.values_mut() {
            if let Some(snapshot) = self
                .snapshot_builder
                .build(&mut player.channel, tick, server_time, &self.world)
            {
                player.link.send(snapshot);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn session() -> GameSession {
        let catalog = Arc::new(Catalog::builtin().expect("builtin catalog"));
        GameSession::new(catalog, GameTuning::default(), 11).0
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn join_sends_welcome_and_snapshot() {
        let mut session = session();
        let id = Uuid::new_v4();
        let (link, mut reliable, _unreliable) = ClientLink::new();
        session.handle_input(SessionInput::Join {
            actor_id: id,
            name: "Alice".into(),
            link,
        });
        session.step(tick_delta(30));

        let msgs = drain(&mut reliable);
        assert!(matches!(msgs.first(), Some(ServerMsg::Welcome { actor_id, .. }) if *actor_id == id));
        assert!(msgs.iter().any(|m| matches!(m, ServerMsg::Snapshot { .. })));
        assert_eq!(session.players.len(), 1);
    }

    #[test]
    fn ping_is_answered_directly() {
        let mut session = session();
        let id = Uuid::new_v4();
        let (link, mut reliable, _unreliable) = ClientLink::new();
        session.handle_input(SessionInput::Join {
            actor_id: id,
            name: "Alice".into(),
            link,
        });
        drain(&mut reliable);
        session.handle_input(SessionInput::Request {
            actor_id: id,
            msg: ClientMsg::Ping { t: 42 },
        });
        assert_eq!(drain(&mut reliable), vec![ServerMsg::Pong { t: 42 }]);
    }

    #[test]
    fn leaving_notifies_remaining_players() {
        let mut session = session();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (link_a, mut rx_a, _ua) = ClientLink::new();
        let (link_b, _rx_b, _ub) = ClientLink::new();
        session.handle_input(SessionInput::Join {
            actor_id: a,
            name: "A".into(),
            link: link_a,
        });
        session.handle_input(SessionInput::Join {
            actor_id: b,
            name: "B".into(),
            link: link_b,
        });
        session.handle_input(SessionInput::Leave { actor_id: b });

        let msgs = drain(&mut rx_a);
        assert!(msgs.contains(&ServerMsg::PlayerJoined {
            actor_id: b,
            name: "B".into()
        }));
        assert!(msgs.contains(&ServerMsg::PlayerLeft { actor_id: b }));
        assert!(session.world().character(b).is_none());
    }

    #[test]
    fn full_session_rejects_joins() {
        let catalog = Arc::new(Catalog::builtin().expect("builtin catalog"));
        let tuning = GameTuning {
            max_players: 1,
            ..GameTuning::default()
        };
        let (mut session, _handle) = GameSession::new(catalog, tuning, 1);
        let (first, _rx1, _u1) = ClientLink::new();
        let (second, mut rx2, _u2) = ClientLink::new();
        session.handle_input(SessionInput::Join {
            actor_id: Uuid::new_v4(),
            name: "One".into(),
            link: first,
        });
        session.handle_input(SessionInput::Join {
            actor_id: Uuid::new_v4(),
            name: "Two".into(),
            link: second,
        });
        assert!(matches!(drain(&mut rx2).as_slice(), [ServerMsg::Error { code, .. }] if code == "session_full"));
    }

    #[test]
    fn expired_corpse_respawns_connected_player() {
        let mut session = session();
        let id = Uuid::new_v4();
        let (link, _rx, _u) = ClientLink::new();
        session.handle_input(SessionInput::Join {
            actor_id: id,
            name: "Alice".into(),
            link,
        });
        session.world.take_damage(id, 500.0, id, None);
        assert!(session.world().character(id).is_some_and(|c| c.is_dead()));

        let dt = tick_delta(30);
        let steps = (GameTuning::default().corpse_lifespan / dt).ceil() as usize + 2;
        for _ in 0..steps {
            session.step(dt);
        }
        let respawned = session.world().character(id).expect("respawned");
        assert!(!respawned.is_dead());
        assert_eq!(respawned.health(), respawned.max_health());
    }

    #[test]
    fn queued_inputs_are_drained_until_handles_drop() {
        let catalog = Arc::new(Catalog::builtin().expect("builtin catalog"));
        let (mut session, handle) = GameSession::new(catalog, GameTuning::default(), 2);
        let (link, _rx, _u) = ClientLink::new();
        tokio_test::block_on(handle.input_tx.send(SessionInput::Join {
            actor_id: Uuid::new_v4(),
            name: "Queued".into(),
            link,
        }))
        .expect("input queued");

        assert!(session.process_inputs());
        assert_eq!(handle.player_count(), 1);
        drop(handle);
        assert!(!session.process_inputs());
    }

    #[tokio::test]
    async fn running_session_welcomes_players() {
        let catalog = Arc::new(Catalog::builtin().expect("builtin catalog"));
        let (session, handle) = GameSession::new(catalog, GameTuning::default(), 5);
        let task = tokio::spawn(session.run());

        let id = Uuid::new_v4();
        let (link, mut reliable, _unreliable) = ClientLink::new();
        handle
            .input_tx
            .send(SessionInput::Join {
                actor_id: id,
                name: "Alice".into(),
                link,
            })
            .await
            .expect("session accepts input");

        let welcome = tokio::time::timeout(Duration::from_secs(2), reliable.recv())
            .await
            .expect("welcome in time");
        assert!(matches!(welcome, Some(ServerMsg::Welcome { actor_id, .. }) if actor_id == id));
        assert_eq!(handle.player_count(), 1);

        drop(handle);
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("session stops")
            .expect("session task");
    }
}
