pub mod fixtures;
pub mod mocks;

#[allow(unused_imports)]
pub use fixtures::{engine_with, md, multihashes, small_config};
#[allow(unused_imports)]
pub use mocks::{FailingAnnouncer, FlakyAnnouncer, RecordingAnnouncer};
