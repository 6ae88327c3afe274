pub mod fixtures;
pub mod mocks;

#[allow(unused_imports)]
pub use fixtures::{doc, fields, jobs_config, seed_users, seed_waves};
#[allow(unused_imports)]
pub use mocks::{FlakyStore, InjectedFailure};
