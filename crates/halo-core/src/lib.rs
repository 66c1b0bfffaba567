//! Halo Core
//!
//! Grid model and the pure pieces of the distributed round: partitioning the
//! grid into worker strips, wrapping them in halo rows, stitching results back
//! together, and the pause gate that both broker and workers block on.
//!
//! Nothing in this crate touches the network.

pub mod error;
pub mod gate;
pub mod grid;
pub mod life;
pub mod params;
pub mod partition;
pub mod pgm;
pub mod strip;

pub use error::{HaloError, HaloResult};
pub use gate::{PauseGate, PauseStatus};
pub use grid::{Grid, DEAD, LIVE};
pub use params::Params;
pub use partition::{strip_sizes, Partition};
pub use strip::{build_strip, build_strips, merge_strips, HALO_ROWS};
