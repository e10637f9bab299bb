// Clippy allows for the whole crate
#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]

//! STRATA: hierarchical whole-genome alignment storage engine.
//!
//! Stores multiple sequence alignments of related genomes, arranged on a
//! rooted phylogenetic tree, as an on-disk columnar container and answers
//! random-access homology queries over them.
//!
//! # Features
//!
//! - **Segmental model**: per-genome top (child-facing) and bottom
//!   (parent-facing) segment arrays with paralogy rings and parse
//!   cross-links
//! - **Traversal primitives**: sliced segment iterators, gapped runs,
//!   cross-genome homology mapping, and a multi-genome column iterator
//! - **Level of detail**: build coarsened copies of an alignment for
//!   zoomed-out browsing
//!
//! # Example
//!
//! ```rust,no_run
//! use strata_genomics::{Alignment, ColumnIter, ColumnOptions};
//!
//! let aln = Alignment::open("alignment.strata").unwrap();
//! let human = aln.genome_id("human").unwrap();
//! let mut columns = ColumnIter::new(&aln, human, 0, 99, ColumnOptions::default()).unwrap();
//! while !columns.last_column() {
//!     println!("{} genomes at {}", columns.column().num_genomes(),
//!              columns.reference_position());
//!     columns.to_right().unwrap();
//! }
//! ```

pub mod alignment;
pub mod bed;
pub mod column;
pub mod commands;
pub mod dna;
pub mod error;
pub mod gapped;
pub mod genome;
pub mod iter;
pub mod lod;
pub mod mapped;
pub mod rearrangement;
pub mod segment;
pub mod sequence;
pub mod store;
pub mod validate;

// Re-export commonly used types
pub use alignment::{Alignment, TreeStep};
pub use column::{Column, ColumnIter, ColumnOptions};
pub use error::{Result, StrataError};
pub use genome::Genome;
pub use iter::{BottomIter, TopIter};
pub use mapped::{mapped_segments, MappedSegment, SegmentSlice};
pub use segment::{BottomSegmentSpec, TopSegmentSpec, NULL_INDEX};
pub use sequence::{Sequence, SequenceInfo};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::alignment::Alignment;
    pub use crate::column::{ColumnIter, ColumnOptions};
    pub use crate::error::{Result, StrataError};
    pub use crate::gapped::{GappedBottomIter, GappedTopIter};
    pub use crate::iter::{BottomIter, TopIter};
    pub use crate::lod::{interpolate_alignment, LodParams};
    pub use crate::mapped::{mapped_segments, SegmentSlice};
    pub use crate::rearrangement::{Rearrangement, RearrangementKind};
    pub use crate::segment::{BottomSegmentSpec, TopSegmentSpec, NULL_INDEX};
    pub use crate::sequence::SequenceInfo;
}
