#[macro_use]
extern crate tracing;

pub mod config;
pub mod logger;
pub mod lvm;
pub mod pool;
pub mod spdk;
