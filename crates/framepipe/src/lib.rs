//! Synthetic frame producer/consumer harness.
//!
//! framepipe generates self-describing binary frames, streams them through
//! in-process byte channels, and drains them into sinks so the throughput and
//! correctness of a data-acquisition pipeline can be exercised without the
//! real hardware.
//!
//! # Crate Structure
//!
//! - [`frame`]: frame layout, builders, readers, comparators
//! - [`channel`]: in-process endpoints with unit reader/writer and stop sentinel
//! - [`harness`]: run configuration, payload sources, producers, consumers, schedulers

/// Re-export frame types.
pub mod frame {
    pub use framepipe_frame::*;
}

/// Re-export channel types.
pub mod channel {
    pub use framepipe_channel::*;
}

/// Re-export harness types.
pub mod harness {
    pub use framepipe_harness::*;
}
