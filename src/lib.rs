//! Survival Game Server - authoritative gameplay core
//!
//! Inventory, interaction, weapon and character systems run inside a
//! fixed-rate session loop; clients connect over WebSocket and receive
//! per-recipient replication snapshots.

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod util;
pub mod ws;
