//! Lookback Window Logic
//!
//! Pure functions behind the reconciliation: planning the replay range,
//! choosing the cutover, merging the two sources, trimming to the exact
//! window and checking the result for sampling gaps.

mod gaps;
mod merge;
mod request;
mod result;
mod window;

pub use gaps::{SamplingGap, detect_gaps};
pub use merge::{Merged, merge, trim_to_window};
pub use request::{LookbackRequest, RequestError};
pub use result::ReconciliationResult;
pub use window::{DEFAULT_HISTORICAL_LAG, ReplayWindow, cutover};
