//! Document store backends.

pub mod memory;
pub mod sqlite;
