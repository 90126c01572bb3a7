//! Match-3 duel (workspace facade crate).
//!
//! Exposes `match3_duel::{types,core,engine,adapter}` while the implementation
//! lives in dedicated crates under `crates/`.

pub use match3_duel_adapter as adapter;
pub use match3_duel_core as core;
pub use match3_duel_engine as engine;
pub use match3_duel_types as types;
