//! Domain contracts for motorcycle accessory renders.
//!
//! Everything here is synchronous and side-effect free apart from reading
//! catalog and policy files. The engine crate owns image work and network I/O.

pub mod catalog;
pub mod models;
pub mod prompt;
pub mod render;
