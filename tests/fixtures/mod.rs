//! Test fixtures.

mod two_host;

pub use two_host::{Host, TwoHostFixture};
