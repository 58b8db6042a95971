//! World objects: pickups, loot containers and item spawn points

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::interaction::{Interactable, InteractableConfig};
use super::inventory::Inventory;
use super::item::{Item, ItemClassId};
use super::physics::Vec3;
use super::ActorId;

pub const PICKUP_INTERACTION_TIME: f32 = 0.5;
pub const PICKUP_INTERACTION_DISTANCE: f32 = 200.0;
pub const CONTAINER_CAPACITY: usize = 20;
pub const CONTAINER_WEIGHT_CAPACITY: f32 = 80.0;
/// Bound on re-picks when rows fail their probability roll
const MAX_ROW_ATTEMPTS: usize = 32;

/// One loot outcome: every listed item class spawns together
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LootRow {
    pub items: Vec<ItemClassId>,
    /// Chance in (0, 1] that the row is accepted when picked
    pub probability: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LootTable {
    pub id: String,
    pub rows: Vec<LootRow>,
    pub min_rolls: u32,
    pub max_rolls: u32,
}

impl LootTable {
    /// Pick a random row, re-picking until one passes its probability roll
    pub fn pick_row<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&LootRow> {
        if self.rows.is_empty() {
            return None;
        }
        for _ in 0..MAX_ROW_ATTEMPTS {
            let row = &self.rows[rng.gen_range(0..self.rows.len())];
            if rng.gen::<f32>() <= row.probability {
                return Some(row);
            }
        }
        None
    }

    /// Rows chosen for one fill of a container
    pub fn roll<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<&LootRow> {
        let rolls = rng.gen_range(self.min_rolls..=self.max_rolls.max(self.min_rolls));
        (0..rolls).filter_map(|_| self.pick_row(rng)).collect()
    }
}

/// A single item stack lying in the world
#[derive(Debug, Clone)]
pub struct Pickup {
    pub id: ActorId,
    pub item: Item,
    pub position: Vec3,
    /// Spawn point that produced this pickup
    pub spawner: Option<usize>,
}

impl Pickup {
    pub fn interactable(&self) -> Interactable {
        Interactable::new(
            self.id,
            InteractableConfig {
                interaction_time: PICKUP_INTERACTION_TIME,
                interaction_distance: PICKUP_INTERACTION_DISTANCE,
                name: self.item.display_name().to_string(),
                action: "Take".to_string(),
                allow_multiple_interactors: true,
            },
        )
    }
}

/// Lootable box with its own inventory
#[derive(Debug, Clone)]
pub struct LootContainer {
    pub id: ActorId,
    pub name: String,
    pub position: Vec3,
    pub inventory: Inventory,
}

impl LootContainer {
    pub fn new(id: ActorId, name: &str, position: Vec3) -> Self {
        Self {
            id,
            name: name.to_string(),
            position,
            inventory: Inventory::new(id, CONTAINER_CAPACITY, CONTAINER_WEIGHT_CAPACITY),
        }
    }

    pub fn interactable(&self) -> Interactable {
        Interactable::new(
            self.id,
            InteractableConfig {
                name: self.name.clone(),
                action: "Loot".to_string(),
                ..InteractableConfig::default()
            },
        )
    }
}

/// Interactable opened on a character's corpse
pub fn corpse_interactable(id: ActorId, name: &str) -> Interactable {
    let mut interactable = Interactable::new(
        id,
        InteractableConfig {
            name: name.to_string(),
            action: "Loot".to_string(),
            ..InteractableConfig::default()
        },
    );
    interactable.set_active(false);
    interactable
}

/// Point that keeps one loot row's worth of pickups in the world
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSpawner {
    pub position: Vec3,
    pub loot_table: String,
    /// Respawn delay range in seconds
    pub respawn_range: (f32, f32),
    #[serde(skip)]
    pub spawned: Vec<ActorId>,
}

impl ItemSpawner {
    pub fn new(position: Vec3, loot_table: &str, respawn_range: (f32, f32)) -> Self {
        Self {
            position,
            loot_table: loot_table.to_string(),
            respawn_range,
            spawned: Vec::new(),
        }
    }

    /// Forget a taken pickup; true once every pickup of the last spawn is gone
    pub fn release(&mut self, pickup: ActorId) -> bool {
        let before = self.spawned.len();
        self.spawned.retain(|p| *p != pickup);
        before != self.spawned.len() && self.spawned.is_empty()
    }

    pub fn respawn_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        let (lo, hi) = self.respawn_range;
        if hi > lo {
            rng.gen_range(lo..=hi)
        } else {
            lo.max(0.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn table() -> LootTable {
        LootTable {
            id: "test".into(),
            rows: vec![
                LootRow {
                    items: vec!["apple".into()],
                    probability: 1.0,
                },
                LootRow {
                    items: vec!["rifle".into(), "rifle_ammo".into()],
                    probability: 0.25,
                },
            ],
            min_rolls: 2,
            max_rolls: 4,
        }
    }

    #[test]
    fn rolls_stay_within_range_and_are_seeded() {
        let table = table();
        let mut a = ChaCha8Rng::seed_from_u64(7);
        let mut b = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..50 {
            let rows_a: Vec<_> = table.roll(&mut a).iter().map(|r| r.items.clone()).collect();
            let rows_b: Vec<_> = table.roll(&mut b).iter().map(|r| r.items.clone()).collect();
            assert!((2..=4).contains(&rows_a.len()));
            assert_eq!(rows_a, rows_b);
        }
    }

    #[test]
    fn respawn_delay_within_range() {
        let spawner = ItemSpawner::new(Vec3::ZERO, "test", (10.0, 30.0));
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..20 {
            let d = spawner.respawn_delay(&mut rng);
            assert!((10.0..=30.0).contains(&d));
        }
    }

    #[test]
    fn spawner_reports_when_last_pickup_is_taken() {
        let mut spawner = ItemSpawner::new(Vec3::ZERO, "test", (1.0, 1.0));
        let (a, b) = (uuid::Uuid::new_v4(), uuid::Uuid::new_v4());
        spawner.spawned = vec![a, b];
        assert!(!spawner.release(a));
        assert!(!spawner.release(a));
        assert!(spawner.release(b));
    }
}
