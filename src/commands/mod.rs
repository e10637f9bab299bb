//! Command implementations behind the `strata` binary.

pub mod liftover;
pub mod lod;
pub mod mask_extract;
pub mod mutations;
pub mod stats;
pub mod validate;

pub use liftover::LiftoverCommand;
pub use lod::LodCommand;
pub use mask_extract::MaskExtractCommand;
pub use mutations::MutationsCommand;
pub use stats::{StatsCommand, StatsMode};
pub use validate::ValidateCommand;
