//! Domain models for the release gating pipeline.
//!
//! - `ParsedTag` / `Tier`: tag classification and precedence
//! - `GateName` / `GateResults`: quality gates and their outcomes
//! - `Release` / `ReleaseState`: release records and the state machine

pub mod error;
pub mod gate;
pub mod release;
pub mod tag;

pub use error::{PipelineError, Result};
pub use gate::{GateName, GateResult, GateResults, GateStatus};
pub use release::{Release, ReleaseState};
pub use tag::{
    compare_versions, is_valid_tag, matches_pattern, sort_descending, Channel, ParsedTag,
    Prerelease, Tier,
};
