//! Column iterator: synchronized multi-genome traversal of homology columns.
//!
//! Anchored on a reference genome range, each step advances the reference by
//! one base and collects every position reachable through the
//! parent/child/paralogy pointer graph inside the spanning tree of the
//! target set. A column maps each touched sequence to the list of
//! `(genome position, reversed)` pairs discovered, in traversal order.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::alignment::Alignment;
use crate::error::{Result, StrataError};
use crate::genome::Genome;
use crate::segment::NULL_INDEX;
use crate::sequence::Sequence;

/// Flags controlling a column traversal.
#[derive(Debug, Clone, Default)]
pub struct ColumnOptions {
    /// Genomes to report; `None` reports every genome reached. The
    /// traversal is restricted to the spanning tree of this set plus the
    /// reference.
    pub targets: Option<Vec<usize>>,
    /// Largest unaligned run the traversal may bridge when extending a
    /// column front across indels. Reference-anchored traversal emits one
    /// column per reference base, so this only bounds duplication detours.
    pub gap_threshold: u64,
    /// Follow only canonical child pointers, never paralogy rings.
    pub no_dupes: bool,
    /// Do not report ancestral (internal-node) genomes; they are still
    /// traversed.
    pub no_ancestors: bool,
    /// Report the reference on its minus strand.
    pub reverse_strand: bool,
    /// Skip columns whose reference copy is a non-canonical paralog, so a
    /// full scan samples each homology class exactly once.
    pub unique: bool,
}

/// Positions of one sequence inside a column, in traversal order.
#[derive(Debug, Clone)]
pub struct ColumnEntry {
    pub genome: usize,
    pub sequence: usize,
    pub positions: Vec<(i64, bool)>,
}

/// One homology column.
#[derive(Debug, Clone, Default)]
pub struct Column {
    entries: Vec<ColumnEntry>,
}

impl Column {
    pub fn entries(&self) -> &[ColumnEntry] {
        &self.entries
    }

    pub fn get(&self, genome: usize, sequence: usize) -> Option<&ColumnEntry> {
        self.entries
            .iter()
            .find(|e| e.genome == genome && e.sequence == sequence)
    }

    /// Number of distinct genomes present.
    pub fn num_genomes(&self) -> usize {
        let mut seen = FxHashSet::default();
        for e in &self.entries {
            seen.insert(e.genome);
        }
        seen.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn push(&mut self, genome: usize, sequence: usize, pos: i64, reversed: bool) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.genome == genome && e.sequence == sequence)
        {
            entry.positions.push((pos, reversed));
        } else {
            self.entries.push(ColumnEntry {
                genome,
                sequence,
                positions: vec![(pos, reversed)],
            });
        }
    }
}

pub struct ColumnIter<'a> {
    aln: &'a Alignment,
    ref_genome: usize,
    pos: i64,
    last: i64,
    span: FxHashSet<usize>,
    report: Option<FxHashSet<usize>>,
    opts: ColumnOptions,
    column: Column,
}

impl<'a> ColumnIter<'a> {
    /// Position a new iterator at reference base `start`; `last` is the
    /// final reference base of the walk (inclusive, genome-global).
    pub fn new(
        aln: &'a Alignment,
        ref_genome: usize,
        start: i64,
        last: i64,
        opts: ColumnOptions,
    ) -> Result<Self> {
        let genome = aln.genome_by_id(ref_genome);
        if start < 0 || start as u64 >= genome.sequence_length() || last < start {
            return Err(StrataError::out_of_range(start, genome.sequence_length()));
        }
        let (span, report) = match &opts.targets {
            Some(targets) => {
                let mut ids = targets.clone();
                ids.push(ref_genome);
                ids.sort_unstable();
                ids.dedup();
                let span = aln.spanning_set(&ids);
                let mut report: FxHashSet<usize> = targets.iter().copied().collect();
                report.insert(ref_genome);
                (span, Some(report))
            }
            None => ((0..aln.num_genomes()).collect(), None),
        };
        let mut it = Self {
            aln,
            ref_genome,
            pos: start,
            last,
            span,
            report,
            opts,
            column: Column::default(),
        };
        it.settle()?;
        Ok(it)
    }

    #[inline]
    pub fn reference_genome(&self) -> &'a Genome {
        self.aln.genome_by_id(self.ref_genome)
    }

    /// Reference position, genome-global.
    #[inline]
    pub fn reference_position(&self) -> i64 {
        self.pos
    }

    pub fn reference_sequence(&self) -> Result<&'a Sequence> {
        self.reference_genome().sequence_by_site(self.pos)
    }

    /// Reference position local to its sequence.
    pub fn reference_sequence_position(&self) -> Result<i64> {
        Ok(self.pos - self.reference_sequence()?.start_position())
    }

    /// True once the reference has consumed its range.
    #[inline]
    pub fn last_column(&self) -> bool {
        self.pos >= self.last
    }

    pub fn column(&self) -> &Column {
        &self.column
    }

    /// Advance the reference one base and rebuild the column. Columns come
    /// out in strictly increasing reference position.
    pub fn to_right(&mut self) -> Result<()> {
        if self.last_column() {
            return Err(StrataError::out_of_range(
                self.pos + 1,
                self.last.max(0) as u64,
            ));
        }
        self.pos += 1;
        self.settle()
    }

    /// Reposition the iterator at an arbitrary reference base.
    pub fn to_site(&mut self, pos: i64, last: i64) -> Result<()> {
        let len = self.reference_genome().sequence_length();
        if pos < 0 || pos as u64 >= len || last < pos {
            return Err(StrataError::out_of_range(pos, len));
        }
        self.pos = pos;
        self.last = last;
        self.settle()
    }

    /// Rebuild at the current position; with `unique` set, keep advancing
    /// past columns owned by a non-canonical reference paralog.
    fn settle(&mut self) -> Result<()> {
        loop {
            self.build()?;
            if !self.opts.unique || self.reference_is_canonical()? || self.last_column() {
                return Ok(());
            }
            self.pos += 1;
        }
    }

    fn reference_is_canonical(&self) -> Result<bool> {
        let genome = self.reference_genome();
        if genome.num_top_segments() == 0 {
            return Ok(true);
        }
        let seg = genome.top_segment(genome.top_segment_at(self.pos)?);
        if !seg.has_next_paralogy()? {
            return Ok(true);
        }
        let parent_index = seg.parent_index()?;
        if parent_index == NULL_INDEX {
            return Ok(true);
        }
        let pid = genome.parent_id().ok_or_else(|| {
            StrataError::Invariant(format!(
                "root genome '{}' carries a parent index",
                genome.name()
            ))
        })?;
        let slot = self.aln.child_slot(pid, self.ref_genome)?;
        let back = self
            .aln
            .genome_by_id(pid)
            .bottom_segment(parent_index)
            .child_index(slot)?;
        Ok(back == seg.array_index())
    }

    fn build(&mut self) -> Result<()> {
        self.column.clear();
        let mut visited: FxHashSet<(usize, i64)> = FxHashSet::default();
        self.visit(
            self.ref_genome,
            self.pos,
            self.opts.reverse_strand,
            &mut visited,
        )
    }

    /// Depth-first walk of the homology graph from one `(genome, position)`
    /// node. Moves up through the top array, sideways through paralogy
    /// rings, and down through every child slot; the visited set terminates
    /// ring cycles and diamond paths.
    fn visit(
        &mut self,
        genome_id: usize,
        pos: i64,
        reversed: bool,
        visited: &mut FxHashSet<(usize, i64)>,
    ) -> Result<()> {
        if !self.span.contains(&genome_id) || !visited.insert((genome_id, pos)) {
            return Ok(());
        }
        let aln = self.aln;
        let genome = aln.genome_by_id(genome_id);

        let reportable = self
            .report
            .as_ref()
            .map_or(true, |r| r.contains(&genome_id));
        let ancestor_hidden =
            self.opts.no_ancestors && !genome.is_leaf() && genome_id != self.ref_genome;
        if reportable && !ancestor_hidden {
            let seq = genome.sequence_by_site(pos)?;
            self.column.push(genome_id, seq.index(), pos, reversed);
        }

        // up through the parent pointer, then sideways along the ring
        if genome.num_top_segments() > 0 {
            let seg = genome.top_segment(genome.top_segment_at(pos)?);
            let parent_index = seg.parent_index()?;
            if parent_index != NULL_INDEX {
                let pid = genome.parent_id().ok_or_else(|| {
                    StrataError::Invariant(format!(
                        "root genome '{}' carries a parent index",
                        genome.name()
                    ))
                })?;
                let ts = seg.start_position()?;
                let parent = aln.genome_by_id(pid);
                let bseg = parent.bottom_segment(parent_index);
                let ps = bseg.start_position()?;
                let pe = bseg.end_position()?;
                let seg_reversed = seg.parent_reversed()?;
                let ppos = if seg_reversed {
                    pe - (pos - ts)
                } else {
                    ps + (pos - ts)
                };
                self.visit(pid, ppos, reversed != seg_reversed, visited)?;

                if !self.opts.no_dupes {
                    for member in seg.paralogy_ring()? {
                        if member == seg.array_index() {
                            continue;
                        }
                        let mseg = genome.top_segment(member);
                        let mrev = mseg.parent_reversed()?;
                        let ms = mseg.start_position()?;
                        let mpos = if mrev {
                            ms + (pe - ppos)
                        } else {
                            ms + (ppos - ps)
                        };
                        self.visit(genome_id, mpos, reversed != (seg_reversed != mrev), visited)?;
                    }
                }
            }
        }

        // down through every aligned child slot
        if genome.num_bottom_segments() > 0 {
            let bseg = genome.bottom_segment(genome.bottom_segment_at(pos)?);
            let ps = bseg.start_position()?;
            let pe = bseg.end_position()?;
            for (slot, &child) in genome.child_ids().iter().enumerate() {
                if !self.span.contains(&child) {
                    continue;
                }
                let canonical = bseg.child_index(slot)?;
                if canonical == NULL_INDEX {
                    continue;
                }
                let child_genome = aln.genome_by_id(child);
                let members = if self.opts.no_dupes {
                    vec![canonical]
                } else {
                    child_genome.top_segment(canonical).paralogy_ring()?
                };
                for member in members {
                    let mseg = child_genome.top_segment(member);
                    let mrev = mseg.parent_reversed()?;
                    let ms = mseg.start_position()?;
                    let cpos = if mrev {
                        ms + (pe - pos)
                    } else {
                        ms + (pos - ps)
                    };
                    self.visit(child, cpos, reversed != mrev, visited)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::Alignment;
    use crate::segment::{BottomSegmentSpec, TopSegmentSpec};
    use crate::sequence::SequenceInfo;
    use tempfile::tempdir;

    fn identity_pair(dir: &std::path::Path, parent_reversed: bool) -> Alignment {
        let mut aln = Alignment::create(dir).unwrap();
        aln.add_root_genome("root").unwrap();
        aln.add_leaf_genome("leaf", "root", 1.0).unwrap();
        aln.genome_mut("root")
            .unwrap()
            .set_dimensions(&[SequenceInfo::new("chr", 10, 0, 1)])
            .unwrap();
        aln.genome_mut("leaf")
            .unwrap()
            .set_dimensions(&[SequenceInfo::new("chr", 10, 1, 0)])
            .unwrap();
        let root = aln.genome("root").unwrap();
        root.set_dna(b"ACGTACGTAC").unwrap();
        let mut spec = BottomSegmentSpec::new(0, 10, 1);
        spec.children[0] = (0, parent_reversed);
        root.set_bottom_segment(0, &spec).unwrap();
        let leaf = aln.genome("leaf").unwrap();
        leaf.set_dna(b"ACGTACGTAC").unwrap();
        leaf.set_top_segment(
            0,
            &TopSegmentSpec {
                start: 0,
                length: 10,
                parent: 0,
                parent_reversed,
                ..Default::default()
            },
        )
        .unwrap();
        aln
    }

    #[test]
    fn test_two_leaf_identity_columns() {
        let dir = tempdir().unwrap();
        let aln = identity_pair(dir.path(), false);
        let root = aln.genome_id("root").unwrap();
        let leaf = aln.genome_id("leaf").unwrap();
        let mut it = ColumnIter::new(&aln, leaf, 0, 9, ColumnOptions::default()).unwrap();
        for i in 0..10i64 {
            let col = it.column();
            assert_eq!(col.entries().len(), 2, "column {}", i);
            assert_eq!(col.get(leaf, 0).unwrap().positions, vec![(i, false)]);
            assert_eq!(col.get(root, 0).unwrap().positions, vec![(i, false)]);
            if i < 9 {
                it.to_right().unwrap();
            }
        }
        assert!(it.last_column());
        assert!(it.to_right().is_err());
    }

    #[test]
    fn test_reversed_parent_column() {
        let dir = tempdir().unwrap();
        let aln = identity_pair(dir.path(), true);
        let root = aln.genome_id("root").unwrap();
        let leaf = aln.genome_id("leaf").unwrap();
        let it = ColumnIter::new(&aln, leaf, 0, 9, ColumnOptions::default()).unwrap();
        let col = it.column();
        assert_eq!(col.get(leaf, 0).unwrap().positions, vec![(0, false)]);
        assert_eq!(col.get(root, 0).unwrap().positions, vec![(9, true)]);
    }

    #[test]
    fn test_no_ancestors_hides_root() {
        let dir = tempdir().unwrap();
        let aln = identity_pair(dir.path(), false);
        let leaf = aln.genome_id("leaf").unwrap();
        let opts = ColumnOptions {
            no_ancestors: true,
            ..Default::default()
        };
        let it = ColumnIter::new(&aln, leaf, 4, 9, opts).unwrap();
        let col = it.column();
        assert_eq!(col.entries().len(), 1);
        assert_eq!(col.entries()[0].genome, leaf);
    }

    fn duplication_leaf(dir: &std::path::Path) -> Alignment {
        let mut aln = Alignment::create(dir).unwrap();
        aln.add_root_genome("root").unwrap();
        aln.add_leaf_genome("leaf", "root", 1.0).unwrap();
        aln.genome_mut("root")
            .unwrap()
            .set_dimensions(&[SequenceInfo::new("chr", 5, 0, 1)])
            .unwrap();
        aln.genome_mut("leaf")
            .unwrap()
            .set_dimensions(&[SequenceInfo::new("chr", 10, 2, 0)])
            .unwrap();
        let root = aln.genome("root").unwrap();
        root.set_dna(b"ACGTA").unwrap();
        let mut spec = BottomSegmentSpec::new(0, 5, 1);
        spec.children[0] = (0, false);
        root.set_bottom_segment(0, &spec).unwrap();
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
    fn test_duplication_gathers_both_copies() {
        let dir = tempdir().unwrap();
        let aln = duplication_leaf(dir.path());
        let leaf = aln.genome_id("leaf").unwrap();
        let root = aln.genome_id("root").unwrap();
        let it = ColumnIter::new(&aln, leaf, 0, 9, ColumnOptions::default()).unwrap();
        let col = it.column();
        assert_eq!(col.get(root, 0).unwrap().positions, vec![(0, false)]);
        assert_eq!(
            col.get(leaf, 0).unwrap().positions,
            vec![(0, false), (5, false)]
        );

        let opts = ColumnOptions {
            no_dupes: true,
            ..Default::default()
        };
        let it = ColumnIter::new(&aln, leaf, 0, 9, opts).unwrap();
        assert_eq!(it.column().get(leaf, 0).unwrap().positions.len(), 1);
    }

    #[test]
    fn test_unique_skips_non_canonical_reference() {
        let dir = tempdir().unwrap();
        let aln = duplication_leaf(dir.path());
        let leaf = aln.genome_id("leaf").unwrap();
        let opts = ColumnOptions {
            unique: true,
            ..Default::default()
        };
        let mut it = ColumnIter::new(&aln, leaf, 0, 9, opts).unwrap();
        // positions 0..4 are canonical; 5..9 belong to the second paralog
        let mut sampled = Vec::new();
        loop {
            sampled.push(it.reference_position());
            if it.last_column() {
                break;
            }
            it.to_right().unwrap();
        }
        assert_eq!(sampled, vec![0, 1, 2, 3, 4, 9]);
    }
}
