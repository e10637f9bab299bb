//! Level-of-detail builder.
//!
//! Produces a coarsened copy of an alignment by sampling homology columns,
//! growing them into a bidirected segment graph (blocks of equal-length
//! homologous segments chained by head/tail adjacencies per sequence), and
//! writing the gap-free graph back as a new alignment.

mod extract;
mod graph;
mod segment;

pub use extract::{interpolate_alignment, LodParams};
pub use graph::LodGraph;
