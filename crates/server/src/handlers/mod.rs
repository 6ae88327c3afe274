//! HTTP request handlers.

pub mod common;
pub mod events;
pub mod health;
pub mod jobs;

pub use common::*;
pub use events::*;
pub use health::*;
pub use jobs::*;
