//! Homology mapping between arbitrary genomes of one alignment.
//!
//! Given a base range on a source genome and a target genome, walk the tree
//! path between them (up to the common ancestor, then down), producing the
//! set of target ranges homologous to the source. Each fragment carries its
//! originating source slice, cut in lockstep with every split of the target,
//! so callers can reconstruct per-fragment correspondence after the walk.
//!
//! Orientation bookkeeping: a fragment's source and target slices correspond
//! base-by-base when each is walked in its own oriented direction (left to
//! right when not reversed). Every branch crossing composes the stored
//! per-segment strand flag into the target orientation.

use crate::alignment::{Alignment, TreeStep};
use crate::error::Result;
use crate::segment::NULL_INDEX;

/// A contiguous oriented base range on one genome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentSlice {
    pub genome: usize,
    /// Leftmost base, genome-global.
    pub start: i64,
    pub length: u64,
    pub reversed: bool,
}

impl SegmentSlice {
    pub fn new(genome: usize, start: i64, length: u64) -> Self {
        Self {
            genome,
            start,
            length,
            reversed: false,
        }
    }

    /// Rightmost base.
    #[inline]
    pub fn end(&self) -> i64 {
        self.start + self.length as i64 - 1
    }
}

/// One homologous fragment produced by the tree walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedSegment {
    pub source: SegmentSlice,
    pub target: SegmentSlice,
}

/// Cut `frag` down to the target sub-range `[a, b]`, cutting the source
/// slice at the matching oriented offsets.
pub(crate) fn cut_fragment(frag: &MappedSegment, a: i64, b: i64) -> MappedSegment {
    let off = (a - frag.target.start) as u64;
    let sublen = (b - a + 1) as u64;
    let oriented = if frag.target.reversed {
        frag.target.length - off - sublen
    } else {
        off
    };
    let source_start = if frag.source.reversed {
        frag.source.start + (frag.source.length - oriented - sublen) as i64
    } else {
        frag.source.start + oriented as i64
    };
    MappedSegment {
        source: SegmentSlice {
            start: source_start,
            length: sublen,
            ..frag.source
        },
        target: SegmentSlice {
            start: a,
            length: sublen,
            ..frag.target
        },
    }
}

/// Map one fragment across the branch to the parent genome.
fn map_up(aln: &Alignment, frag: &MappedSegment, out: &mut Vec<MappedSegment>) -> Result<()> {
    let genome = aln.genome_by_id(frag.target.genome);
    let parent_id = match genome.parent_id() {
        Some(p) => p,
        None => return Ok(()),
    };
    let parent = aln.genome_by_id(parent_id);
    let range_end = frag.target.end();
    let mut index = genome.top_segment_at(frag.target.start)?;
    while (index as u64) < genome.num_top_segments() {
        let seg = genome.top_segment(index);
        let ts = seg.start_position()?;
        if ts > range_end {
            break;
        }
        let te = seg.end_position()?;
        let parent_index = seg.parent_index()?;
        if parent_index != NULL_INDEX {
            let a = ts.max(frag.target.start);
            let b = te.min(range_end);
            let cut = cut_fragment(frag, a, b);
            let reversed = seg.parent_reversed()?;
            let ps = parent.bottom_segment(parent_index).start_position()?;
            let new_start = if reversed {
                // child start aligns to parent end
                ps + (te - b)
            } else {
                ps + (a - ts)
            };
            out.push(MappedSegment {
                source: cut.source,
                target: SegmentSlice {
                    genome: parent_id,
                    start: new_start,
                    length: cut.target.length,
                    reversed: cut.target.reversed != reversed,
                },
            });
        }
        index += 1;
    }
    Ok(())
}

/// Map one fragment across the branch down into `child`, branching on the
/// full paralogy ring when `traverse_dupes` is set.
fn map_down(
    aln: &Alignment,
    frag: &MappedSegment,
    child: usize,
    traverse_dupes: bool,
    out: &mut Vec<MappedSegment>,
) -> Result<()> {
    let genome = aln.genome_by_id(frag.target.genome);
    let child_genome = aln.genome_by_id(child);
    let slot = aln.child_slot(frag.target.genome, child)?;
    let range_end = frag.target.end();
    let mut index = genome.bottom_segment_at(frag.target.start)?;
    while (index as u64) < genome.num_bottom_segments() {
        let seg = genome.bottom_segment(index);
        let ps = seg.start_position()?;
        if ps > range_end {
            break;
        }
        let pe = seg.end_position()?;
        let canonical = seg.child_index(slot)?;
        if canonical != NULL_INDEX {
            let a = ps.max(frag.target.start);
            let b = pe.min(range_end);
            let members = if traverse_dupes {
                child_genome.top_segment(canonical).paralogy_ring()?
            } else {
                vec![canonical]
            };
            for member in members {
                let mseg = child_genome.top_segment(member);
                let reversed = mseg.parent_reversed()?;
                let ms = mseg.start_position()?;
                let cut = cut_fragment(frag, a, b);
                let new_start = if reversed {
                    ms + (pe - b)
                } else {
                    ms + (a - ps)
                };
                out.push(MappedSegment {
                    source: cut.source,
                    target: SegmentSlice {
                        genome: child,
                        start: new_start,
                        length: cut.target.length,
                        reversed: cut.target.reversed != reversed,
                    },
                });
            }
        }
        index += 1;
    }
    Ok(())
}

/// Produce every target-genome range homologous to `source`.
///
/// `via`, when given, names an ancestor of the source/target common ancestor
/// through which the walk must detour (the liftover coalescence limit).
/// Returns an empty set when no tree path connects the pair.
pub fn mapped_segments(
    aln: &Alignment,
    source: SegmentSlice,
    target_genome: usize,
    traverse_dupes: bool,
    via: Option<usize>,
) -> Result<Vec<MappedSegment>> {
    let steps = match aln.tree_path(source.genome, target_genome, via) {
        Ok(steps) => steps,
        Err(_) => return Ok(Vec::new()),
    };
    let mut frags = vec![MappedSegment {
        source,
        target: source,
    }];
    for step in steps {
        let mut next = Vec::new();
        for frag in &frags {
            match step {
                TreeStep::Up => map_up(aln, frag, &mut next)?,
                TreeStep::Down(child) => map_down(aln, frag, child, traverse_dupes, &mut next)?,
            }
        }
        frags = next;
        if frags.is_empty() {
            break;
        }
    }
    Ok(frags)
}

/// Drop duplicate target ranges (both ends of a paralogy detour landing on
/// the same spot) and fuse runs of fragments that are contiguous on both
/// sides with consistent orientation.
pub fn coalesce(frags: &mut Vec<MappedSegment>) {
    frags.sort_by_key(|f| (f.target.genome, f.target.start, f.target.length));
    frags.dedup_by(|a, b| a.target == b.target);

    let mut merged: Vec<MappedSegment> = Vec::with_capacity(frags.len());
    for frag in frags.drain(..) {
        if let Some(last) = merged.last_mut() {
            let same_frame = last.target.genome == frag.target.genome
                && last.target.reversed == frag.target.reversed
                && last.source.genome == frag.source.genome
                && last.source.reversed == frag.source.reversed
                && last.target.end() + 1 == frag.target.start;
            let rel = last.target.reversed != last.source.reversed;
            let source_adjacent = if rel {
                frag.source.end() + 1 == last.source.start
            } else {
                last.source.end() + 1 == frag.source.start
            };
            if same_frame && source_adjacent {
                last.target.length += frag.target.length;
                last.source.length += frag.source.length;
                if rel {
                    last.source.start = frag.source.start;
                }
                continue;
            }
        }
        merged.push(frag);
    }
    *frags = merged;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::Alignment;
    use crate::segment::{BottomSegmentSpec, TopSegmentSpec};
    use crate::sequence::SequenceInfo;
    use tempfile::tempdir;

    /// Root with two bottoms; leaf with two paralogous tops both aligned to
    /// the first bottom, linked as a ring.
    fn duplication_pair(dir: &std::path::Path) -> Alignment {
        let mut aln = Alignment::create(dir).unwrap();
        aln.add_root_genome("root").unwrap();
        aln.add_leaf_genome("leaf", "root", 1.0).unwrap();
        aln.genome_mut("root")
            .unwrap()
            .set_dimensions(&[SequenceInfo::new("chr", 10, 0, 2)])
            .unwrap();
        aln.genome_mut("leaf")
            .unwrap()
            .set_dimensions(&[SequenceInfo::new("chr", 10, 2, 0)])
            .unwrap();
        let root = aln.genome("root").unwrap();
        root.set_dna(b"ACGTAACGTA").unwrap();
        let mut b0 = BottomSegmentSpec::new(0, 5, 1);
        b0.children[0] = (0, false);
        root.set_bottom_segment(0, &b0).unwrap();
        root.set_bottom_segment(1, &BottomSegmentSpec::new(5, 5, 1))
            .unwrap();
        let leaf = aln.genome("leaf").unwrap();
        leaf.set_dna(b"ACGTAACGTA").unwrap();
        leaf.set_top_segment(
            0,
            &TopSegmentSpec {
                start: 0,
                length: 5,
                parent: 0,
                next_paralogy: 1,
                ..Default::default()
            },
        )
        .unwrap();
        leaf.set_top_segment(
            1,
            &TopSegmentSpec {
                start: 5,
                length: 5,
                parent: 0,
                next_paralogy: 0,
                ..Default::default()
            },
        )
        .unwrap();
        aln
    }

    #[test]
    fn test_identity_when_source_is_target() {
        let dir = tempdir().unwrap();
        let aln = duplication_pair(dir.path());
        let leaf = aln.genome_id("leaf").unwrap();
        let src = SegmentSlice::new(leaf, 2, 6);
        let frags = mapped_segments(&aln, src, leaf, true, None).unwrap();
        assert_eq!(frags.len(), 1);
        assert_eq!(frags[0].target, src);
        assert_eq!(frags[0].source, src);
    }

    #[test]
    fn test_duplication_ring_maps_both_copies() {
        let dir = tempdir().unwrap();
        let aln = duplication_pair(dir.path());
        let root = aln.genome_id("root").unwrap();
        let leaf = aln.genome_id("leaf").unwrap();
        let src = SegmentSlice::new(root, 0, 5);
        let mut frags = mapped_segments(&aln, src, leaf, true, None).unwrap();
        frags.sort_by_key(|f| f.target.start);
        assert_eq!(frags.len(), 2);
        assert_eq!((frags[0].target.start, frags[0].target.length), (0, 5));
        assert_eq!((frags[1].target.start, frags[1].target.length), (5, 5));
        assert!(frags.iter().all(|f| !f.target.reversed));

        // without dupe traversal only the canonical copy is produced
        let frags = mapped_segments(&aln, src, leaf, false, None).unwrap();
        assert_eq!(frags.len(), 1);
        assert_eq!(frags[0].target.start, 0);
    }

    #[test]
    fn test_unaligned_range_maps_to_nothing() {
        let dir = tempdir().unwrap();
        let aln = duplication_pair(dir.path());
        let root = aln.genome_id("root").unwrap();
        let leaf = aln.genome_id("leaf").unwrap();
        let frags =
            mapped_segments(&aln, SegmentSlice::new(root, 5, 5), leaf, true, None).unwrap();
        assert!(frags.is_empty());
    }

    #[test]
    fn test_coalesce_fuses_contiguous_runs() {
        let g = 0;
        let mut frags = vec![
            MappedSegment {
                source: SegmentSlice::new(g, 10, 5),
                target: SegmentSlice::new(g, 100, 5),
            },
            MappedSegment {
                source: SegmentSlice::new(g, 15, 5),
                target: SegmentSlice::new(g, 105, 5),
            },
            // orientation break: must not fuse
            MappedSegment {
                source: SegmentSlice::new(g, 30, 5),
                target: SegmentSlice {
                    genome: g,
                    start: 110,
                    length: 5,
                    reversed: true,
                },
            },
        ];
        coalesce(&mut frags);
        assert_eq!(frags.len(), 2);
        assert_eq!(frags[0].target.length, 10);
        assert_eq!(frags[0].source.start, 10);
        assert_eq!(frags[1].target.start, 110);
    }

    #[test]
    fn test_coalesce_reversed_pair() {
        let g = 0;
        // target walks right while source walks left: reversed correspondence
        let mut frags = vec![
            MappedSegment {
                source: SegmentSlice::new(g, 25, 5),
                target: SegmentSlice {
                    genome: g,
                    start: 100,
                    length: 5,
                    reversed: true,
                },
            },
            MappedSegment {
                source: SegmentSlice::new(g, 20, 5),
                target: SegmentSlice {
                    genome: g,
                    start: 105,
                    length: 5,
                    reversed: true,
                },
            },
        ];
        coalesce(&mut frags);
        assert_eq!(frags.len(), 1);
        assert_eq!(frags[0].target.length, 10);
        assert_eq!(frags[0].source.start, 20);
        assert_eq!(frags[0].source.length, 10);
    }

    #[test]
    fn test_dedup_identical_targets() {
        let g = 0;
        let f = MappedSegment {
            source: SegmentSlice::new(g, 0, 5),
            target: SegmentSlice::new(g, 50, 5),
        };
        let mut frags = vec![f, f];
        coalesce(&mut frags);
        assert_eq!(frags.len(), 1);
    }
}
