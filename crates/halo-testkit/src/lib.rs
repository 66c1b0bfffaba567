//! Halo Testing Infrastructure
//!
//! An in-memory worker fleet with fault injection and a few grid fixtures,
//! shared by the broker's integration tests.
//!
//! ```rust,no_run
//! use halo_testkit::*;
//!
//! let fleet = MemoryFleet::new(4);
//! fleet.crash_at_turn(2, 5);
//! let connector = fleet.connector();
//! ```

pub mod fixtures;
pub mod fleet;

pub use fixtures::{glider, r_pentomino, soup};
pub use fleet::{MemoryConnector, MemoryFleet, MemoryLink};
