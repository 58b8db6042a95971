//! Immutable game data: item classes, weapons, throwables and loot tables

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::combat::{BoneDamageModifier, DamageType, HitScanConfig, ThrowableConfig};
use super::item::{EquipSlot, ItemClass, ItemKind, Rarity};
use super::loot::{LootRow, LootTable};
use super::presentation::Montage;
use super::weapon::WeaponConfig;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid catalog JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Duplicate {kind} id: {id}")]
    Duplicate { kind: &'static str, id: String },

    #[error("{owner} references unknown {kind} '{id}'")]
    UnknownReference {
        owner: String,
        kind: &'static str,
        id: String,
    },

    #[error("Invalid {field} on '{id}': {reason}")]
    Invalid {
        id: String,
        field: &'static str,
        reason: String,
    },
}

/// On-disk catalog layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub items: Vec<ItemClass>,
    #[serde(default)]
    pub weapons: Vec<WeaponConfig>,
    #[serde(default)]
    pub throwables: Vec<ThrowableConfig>,
    #[serde(default)]
    pub loot_tables: Vec<LootTable>,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    items: HashMap<String, Arc<ItemClass>>,
    weapons: HashMap<String, Arc<WeaponConfig>>,
    throwables: HashMap<String, Arc<ThrowableConfig>>,
    loot_tables: HashMap<String, Arc<LootTable>>,
}

fn index<T>(
    kind: &'static str,
    entries: Vec<T>,
    id: impl Fn(&T) -> &str,
) -> Result<HashMap<String, Arc<T>>, CatalogError> {
    let mut map = HashMap::with_capacity(entries.len());
    for entry in entries {
        let key = id(&entry).to_string();
        if map.contains_key(&key) {
            return Err(CatalogError::Duplicate { kind, id: key });
        }
        map.insert(key, Arc::new(entry));
    }
    Ok(map)
}

impl Catalog {
    pub fn from_file(file: CatalogFile) -> Result<Self, CatalogError> {
        let catalog = Self {
            items: index("item", file.items, |i| &i.id)?,
            weapons: index("weapon", file.weapons, |w| &w.id)?,
            throwables: index("throwable", file.throwables, |t| &t.id)?,
            loot_tables: index("loot table", file.loot_tables, |t| &t.id)?,
        };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(json)?;
        Self::from_file(file)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Catalog compiled into the server
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_file(builtin_file())
    }

    pub fn item(&self, id: &str) -> Option<Arc<ItemClass>> {
        self.items.get(id).cloned()
    }

    pub fn weapon(&self, id: &str) -> Option<Arc<WeaponConfig>> {
        self.weapons.get(id).cloned()
    }

    pub fn throwable(&self, id: &str) -> Option<Arc<ThrowableConfig>> {
        self.throwables.get(id).cloned()
    }

    pub fn loot_table(&self, id: &str) -> Option<Arc<LootTable>> {
        self.loot_tables.get(id).cloned()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    fn unknown(owner: &str, kind: &'static str, id: &str) -> CatalogError {
        CatalogError::UnknownReference {
            owner: owner.to_string(),
            kind,
            id: id.to_string(),
        }
    }

    fn validate(&self) -> Result<(), CatalogError> {
        for item in self.items.values() {
            if item.weight < 0.0 {
                return Err(CatalogError::Invalid {
                    id: item.id.clone(),
                    field: "weight",
                    reason: "must not be negative".into(),
                });
            }
            if item.stackable && item.max_stack_size < 2 {
                return Err(CatalogError::Invalid {
                    id: item.id.clone(),
                    field: "max_stack_size",
                    reason: "stackable items need a stack size of at least 2".into(),
                });
            }
            match &item.kind {
                ItemKind::Weapon { weapon } if !self.weapons.contains_key(weapon) => {
                    return Err(Self::unknown(&item.id, "weapon", weapon));
                }
                ItemKind::Throwable { throwable } if !self.throwables.contains_key(throwable) => {
                    return Err(Self::unknown(&item.id, "throwable", throwable));
                }
                _ => {}
            }
        }

        for weapon in self.weapons.values() {
            match self.items.get(&weapon.ammo_class) {
                Some(ammo) if ammo.kind == ItemKind::Ammo => {}
                _ => return Err(Self::unknown(&weapon.id, "ammo item", &weapon.ammo_class)),
            }
            if weapon.ammo_per_clip == 0 {
                return Err(CatalogError::Invalid {
                    id: weapon.id.clone(),
                    field: "ammo_per_clip",
                    reason: "must be positive".into(),
                });
            }
        }

        for table in self.loot_tables.values() {
            if table.min_rolls > table.max_rolls {
                return Err(CatalogError::Invalid {
                    id: table.id.clone(),
                    field: "rolls",
                    reason: format!("min {} exceeds max {}", table.min_rolls, table.max_rolls),
                });
            }
            for row in &table.rows {
                if !(row.probability > 0.0 && row.probability <= 1.0) {
                    return Err(CatalogError::Invalid {
                        id: table.id.clone(),
                        field: "probability",
                        reason: format!("{} is outside (0, 1]", row.probability),
                    });
                }
                if let Some(missing) = row.items.iter().find(|i| !self.items.contains_key(*i)) {
                    return Err(Self::unknown(&table.id, "item", missing));
                }
            }
        }
        Ok(())
    }
}

fn class(id: &str, name: &str, rarity: Rarity, weight: f32, kind: ItemKind) -> ItemClass {
    ItemClass {
        id: id.to_string(),
        display_name: name.to_string(),
        description: String::new(),
        use_action_text: match kind {
            ItemKind::Food { .. } => "Eat".to_string(),
            ItemKind::Gear { .. } | ItemKind::Weapon { .. } | ItemKind::Throwable { .. } => "Equip".to_string(),
            ItemKind::Misc | ItemKind::Ammo => "Use".to_string(),
        },
        rarity,
        weight,
        stackable: false,
        max_stack_size: 1,
        default_quantity: 1,
        kind,
    }
}

fn stack(mut class: ItemClass, max: u32, default_quantity: u32) -> ItemClass {
    class.stackable = true;
    class.max_stack_size = max;
    class.default_quantity = default_quantity;
    class
}

fn row(items: &[&str], probability: f32) -> LootRow {
    LootRow {
        items: items.iter().map(|s| s.to_string()).collect(),
        probability,
    }
}

fn headshot(multiplier: f32) -> Vec<BoneDamageModifier> {
    vec![BoneDamageModifier {
        bone: "head".to_string(),
        multiplier,
    }]
}

fn builtin_file() -> CatalogFile {
    use ItemKind::*;

    let items = vec![
        stack(class("rifle_ammo", "Rifle Ammo", Rarity::Common, 0.01, Ammo), 120, 30),
        stack(class("pistol_ammo", "Pistol Ammo", Rarity::Common, 0.01, Ammo), 60, 12),
        class("rifle", "Assault Rifle", Rarity::Rare, 4.0, Weapon { weapon: "rifle".into() }),
        class("pistol", "Pistol", Rarity::Uncommon, 1.5, Weapon { weapon: "pistol".into() }),
        stack(class("apple", "Apple", Rarity::Common, 0.2, Food { heal_amount: 20.0 }), 10, 1),
        stack(class("medkit", "Medkit", Rarity::Uncommon, 0.5, Food { heal_amount: 60.0 }), 3, 1),
        class(
            "helmet",
            "Combat Helmet",
            Rarity::Uncommon,
            1.5,
            Gear {
                slot: EquipSlot::Helmet,
                damage_defence_multiplier: 0.8,
            },
        ),
        class(
            "vest",
            "Kevlar Vest",
            Rarity::Rare,
            5.0,
            Gear {
                slot: EquipSlot::Vest,
                damage_defence_multiplier: 0.7,
            },
        ),
        class(
            "backpack",
            "Backpack",
            Rarity::Common,
            1.0,
            Gear {
                slot: EquipSlot::Backpack,
                damage_defence_multiplier: 1.0,
            },
        ),
        stack(
            class("grenade", "Grenade", Rarity::Uncommon, 0.4, Throwable { throwable: "grenade".into() }),
            5,
            1,
        ),
        stack(class("scrap", "Scrap Metal", Rarity::Common, 0.5, Misc), 20, 3),
    ];

    let weapons = vec![
        WeaponConfig {
            id: "rifle".into(),
            ammo_per_clip: 30,
            ammo_class: "rifle_ammo".into(),
            time_between_shots: 0.1,
            allow_automatic_catchup: true,
            reload_transfer_lead: 0.1,
            equip_anim: Montage::new("rifle_equip", 0.5),
            reload_anim: Montage::new("rifle_reload", 2.0),
            fire_anim: Montage::new("rifle_fire", 0.1),
            fire_aiming_anim: Montage::new("rifle_fire_aim", 0.1),
            looped_fire_anim: true,
            looped_muzzle_fx: true,
            looped_fire_sound: true,
            hit_scan: HitScanConfig {
                distance: 10_000.0,
                damage: 25.0,
                bone_damage_modifiers: headshot(2.5),
                damage_type: DamageType::Bullet,
            },
        },
        WeaponConfig {
            id: "pistol".into(),
            ammo_per_clip: 12,
            ammo_class: "pistol_ammo".into(),
            time_between_shots: 0.0,
            allow_automatic_catchup: false,
            reload_transfer_lead: 0.1,
            equip_anim: Montage::new("pistol_equip", 0.3),
            reload_anim: Montage::new("pistol_reload", 1.5),
            fire_anim: Montage::new("pistol_fire", 0.15),
            fire_aiming_anim: Montage::new("pistol_fire_aim", 0.15),
            looped_fire_anim: false,
            looped_muzzle_fx: false,
            looped_fire_sound: false,
            hit_scan: HitScanConfig {
                distance: 5_000.0,
                damage: 30.0,
                bone_damage_modifiers: headshot(2.0),
                damage_type: DamageType::Bullet,
            },
        },
    ];

    let throwables = vec![ThrowableConfig {
        id: "grenade".into(),
        toss_anim: Montage::new("grenade_toss", 0.8),
        initial_speed: 1_200.0,
        lifetime: 5.0,
    }];

    let loot_tables = vec![
        LootTable {
            id: "military".into(),
            rows: vec![
                row(&["rifle", "rifle_ammo"], 0.3),
                row(&["pistol", "pistol_ammo"], 0.5),
                row(&["rifle_ammo"], 1.0),
                row(&["helmet"], 0.4),
                row(&["vest"], 0.25),
                row(&["grenade"], 0.5),
            ],
            min_rolls: 2,
            max_rolls: 4,
        },
        LootTable {
            id: "food".into(),
            rows: vec![row(&["apple"], 1.0), row(&["medkit"], 0.4)],
            min_rolls: 1,
            max_rolls: 3,
        },
        LootTable {
            id: "world".into(),
            rows: vec![
                row(&["apple"], 1.0),
                row(&["scrap"], 1.0),
                row(&["pistol_ammo"], 0.6),
                row(&["backpack"], 0.3),
                row(&["pistol"], 0.2),
            ],
            min_rolls: 1,
            max_rolls: 1,
        },
    ];

    CatalogFile {
        items,
        weapons,
        throwables,
        loot_tables,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_is_consistent() {
        let catalog = Catalog::builtin().expect("builtin catalog");
        let rifle = catalog.weapon("rifle").expect("rifle");
        assert_eq!(catalog.item(&rifle.ammo_class).map(|c| c.kind.clone()), Some(ItemKind::Ammo));
        assert!(catalog.throwable("grenade").is_some());
        assert!(catalog.loot_table("military").is_some());
    }

    #[test]
    fn json_round_trips_through_builtin_layout() {
        let json = serde_json::to_string(&builtin_file()).expect("serialize");
        let catalog = Catalog::from_json(&json).expect("parse");
        assert_eq!(catalog.item_count(), Catalog::builtin().expect("builtin").item_count());
    }

    #[test]
    fn unknown_ammo_class_is_rejected() {
        let mut file = builtin_file();
        file.weapons[0].ammo_class = "missing".into();
        match Catalog::from_file(file) {
            Err(CatalogError::UnknownReference { kind, id, .. }) => {
                assert_eq!(kind, "ammo item");
                assert_eq!(id, "missing");
            }
            other => panic!("expected unknown reference, got {other:?}"),
        }
    }

    #[test]
    fn stackable_items_need_room_to_stack() {
        let mut file = builtin_file();
        file.items[0].max_stack_size = 1;
        assert!(matches!(
            Catalog::from_file(file),
            Err(CatalogError::Invalid { field: "max_stack_size", .. })
        ));
    }
}
