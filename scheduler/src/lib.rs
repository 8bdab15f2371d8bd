//! Capacity aware scheduling of pods over node-local storage pools.
//!
//! The plugin mirrors the two-phase shape of a scheduler framework: a
//! PreFilter pass resolves the pod's claims into volume demands once per
//! scheduling cycle, and a Filter pass judges each candidate node against
//! those demands through a configurable predicate chain.

#[macro_use]
extern crate tracing;

pub mod cluster;
pub mod cycle;
pub mod filter;
pub mod plugin;
pub mod priority;
pub mod state;
