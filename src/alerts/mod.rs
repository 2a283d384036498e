// src/alerts/mod.rs

pub mod arbiter;

pub use arbiter::{AlertArbiter, AlertKey};
