//! Application layer: daemon assembly and lifecycle.

pub mod monitor;

pub use monitor::Monitor;
