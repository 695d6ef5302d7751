//! Arena collections used by the scene graph
//!
//! Nodes live in a `SlotMap` keyed by generated key types; per-node caches
//! live in `SecondaryMap`s sharing those keys.

pub use slotmap::{new_key_type, Key, SecondaryMap, SlotMap};
