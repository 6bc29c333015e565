//! One-to-many joins over sorted flat rows.
//!
//! A target with `join` collections is assembled from consecutive rows: the
//! root key identifies the root instance, each nested level's key identifies
//! its elements. Levels without configured keys group on all of their own
//! columns.

pub mod break_detector;
pub mod grouping;

pub use break_detector::{BreakDetector, KeyTransition};
pub use grouping::{Grouped, GroupingMapper, JoinFactory, JoinNode};
