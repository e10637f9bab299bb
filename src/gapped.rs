//! Gapped segment iterators.
//!
//! A gapped iterator widens a plain segment cursor into a *run*: starting
//! from a left anchor it absorbs rightward neighbours as long as unaligned
//! segments stay below the gap threshold and consecutive aligned segments
//! land next to each other on the other side of the branch, in the same
//! orientation, modulo gaps no larger than the threshold. Runs never cross
//! sequence boundaries. In *atomic* mode no extension happens at all; the
//! run is the single anchor segment.

use crate::alignment::Alignment;
use crate::error::{Result, StrataError};
use crate::genome::Genome;
use crate::segment::NULL_INDEX;

/// Parent-side footprint of a run: left and right genome positions on the
/// other genome plus the shared orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentRange {
    pub left: i64,
    pub right: i64,
    pub reversed: bool,
}

/// Gapped run over the top array of one genome.
pub struct GappedTopIter<'a> {
    aln: &'a Alignment,
    genome: usize,
    left: i64,
    right: i64,
    gap_threshold: u64,
    atomic: bool,
}

impl<'a> GappedTopIter<'a> {
    pub fn new(
        aln: &'a Alignment,
        genome: usize,
        left_index: i64,
        gap_threshold: u64,
        atomic: bool,
    ) -> Result<Self> {
        let count = aln.genome_by_id(genome).num_top_segments();
        if left_index < 0 || left_index as u64 >= count {
            return Err(StrataError::out_of_range(left_index, count));
        }
        let mut it = Self {
            aln,
            genome,
            left: left_index,
            right: left_index,
            gap_threshold,
            atomic,
        };
        it.extend_right()?;
        Ok(it)
    }

    #[inline]
    pub fn genome(&self) -> &'a Genome {
        self.aln.genome_by_id(self.genome)
    }

    #[inline]
    pub fn left_index(&self) -> i64 {
        self.left
    }

    #[inline]
    pub fn right_index(&self) -> i64 {
        self.right
    }

    #[inline]
    pub fn gap_threshold(&self) -> u64 {
        self.gap_threshold
    }

    pub fn start_position(&self) -> Result<i64> {
        self.genome().top_segment(self.left).start_position()
    }

    pub fn end_position(&self) -> Result<i64> {
        self.genome().top_segment(self.right).end_position()
    }

    /// Bases covered by the whole run, gaps included.
    pub fn length(&self) -> Result<u64> {
        Ok((self.end_position()? - self.start_position()? + 1) as u64)
    }

    fn is_mapped(&self, index: i64) -> Result<bool> {
        Ok(self.genome().top_segment(index).parent_index()? != NULL_INDEX)
    }

    /// Maximal-run extension per the contract above.
    fn extend_right(&mut self) -> Result<()> {
        if self.atomic {
            return Ok(());
        }
        let genome = self.genome();
        if !self.is_mapped(self.left)? {
            // an unaligned anchor swallows the whole unaligned block
            while !genome.top_segment(self.right).is_last()?
                && !self.is_mapped(self.right + 1)?
            {
                self.right += 1;
            }
            return Ok(());
        }
        loop {
            if genome.top_segment(self.right).is_last()? {
                return Ok(());
            }
            // candidate gap run, each member shorter than the threshold
            let mut j = self.right + 1;
            loop {
                if self.is_mapped(j)? {
                    break;
                }
                if genome.top_segment(j).length()? >= self.gap_threshold
                    || genome.top_segment(j).is_last()?
                {
                    return Ok(());
                }
                j += 1;
            }
            if !self.compatible(self.right, j)? {
                return Ok(());
            }
            self.right = j;
        }
    }

    /// Do two aligned tops continue one run: same orientation, parent
    /// ranges adjacent in the right direction with at most `gap_threshold`
    /// skipped parent bases.
    fn compatible(&self, cur: i64, next: i64) -> Result<bool> {
        let genome = self.genome();
        let parent = match genome.parent_id() {
            Some(p) => self.aln.genome_by_id(p),
            None => return Ok(false),
        };
        let c = genome.top_segment(cur);
        let n = genome.top_segment(next);
        let crev = c.parent_reversed()?;
        if crev != n.parent_reversed()? {
            return Ok(false);
        }
        let cb = parent.bottom_segment(c.parent_index()?);
        let nb = parent.bottom_segment(n.parent_index()?);
        let gap = if crev {
            cb.start_position()? - nb.end_position()? - 1
        } else {
            nb.start_position()? - cb.end_position()? - 1
        };
        if gap < 0 || gap as u64 > self.gap_threshold {
            return Ok(false);
        }
        // both ends must sit on one parent sequence
        let cseq = cb.sequence()?.index();
        let nseq = nb.sequence()?.index();
        Ok(cseq == nseq)
    }

    /// Number of unaligned gap runs inside the run.
    pub fn num_gaps(&self) -> Result<u64> {
        let mut gaps = 0;
        let mut in_gap = false;
        for i in self.left..=self.right {
            if !self.is_mapped(i)? {
                if !in_gap {
                    gaps += 1;
                }
                in_gap = true;
            } else {
                in_gap = false;
            }
        }
        Ok(gaps)
    }

    /// Total bases inside unaligned gap segments of the run.
    pub fn num_gap_bases(&self) -> Result<u64> {
        let genome = self.genome();
        let mut bases = 0;
        for i in self.left..=self.right {
            if !self.is_mapped(i)? {
                bases += genome.top_segment(i).length()?;
            }
        }
        Ok(bases)
    }

    /// True when the run contains at least one aligned segment.
    pub fn has_parent(&self) -> Result<bool> {
        for i in self.left..=self.right {
            if self.is_mapped(i)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// True when any aligned member sits on a paralogy ring.
    pub fn has_paralogy(&self) -> Result<bool> {
        let genome = self.genome();
        for i in self.left..=self.right {
            if self.is_mapped(i)? && genome.top_segment(i).has_next_paralogy()? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Parent-side footprint of the run's aligned members, or `None` for a
    /// fully unaligned run.
    pub fn parent_range(&self) -> Result<Option<ParentRange>> {
        let genome = self.genome();
        let parent = match genome.parent_id() {
            Some(p) => self.aln.genome_by_id(p),
            None => return Ok(None),
        };
        let mut first = None;
        let mut last = None;
        for i in self.left..=self.right {
            if self.is_mapped(i)? {
                if first.is_none() {
                    first = Some(i);
                }
                last = Some(i);
            }
        }
        let (first, last) = match (first, last) {
            (Some(f), Some(l)) => (f, l),
            _ => return Ok(None),
        };
        let reversed = genome.top_segment(first).parent_reversed()?;
        let fb = parent.bottom_segment(genome.top_segment(first).parent_index()?);
        let lb = parent.bottom_segment(genome.top_segment(last).parent_index()?);
        let (left, right) = if reversed {
            (lb.start_position()?, fb.end_position()?)
        } else {
            (fb.start_position()?, lb.end_position()?)
        };
        Ok(Some(ParentRange {
            left,
            right,
            reversed,
        }))
    }

    /// Re-anchor at the segment just past the run's right end and extend
    /// again; `OutOfRange` once the genome is consumed.
    pub fn to_right(&mut self) -> Result<()> {
        let count = self.genome().num_top_segments();
        if self.right as u64 + 1 >= count {
            return Err(StrataError::out_of_range(self.right + 1, count));
        }
        self.left = self.right + 1;
        self.right = self.left;
        self.extend_right()
    }
}

/// Gapped run over the bottom array of one genome, tracking one child slot.
pub struct GappedBottomIter<'a> {
    aln: &'a Alignment,
    genome: usize,
    child_slot: usize,
    left: i64,
    right: i64,
    gap_threshold: u64,
    atomic: bool,
}

impl<'a> GappedBottomIter<'a> {
    pub fn new(
        aln: &'a Alignment,
        genome: usize,
        child_slot: usize,
        left_index: i64,
        gap_threshold: u64,
        atomic: bool,
    ) -> Result<Self> {
        let g = aln.genome_by_id(genome);
        let count = g.num_bottom_segments();
        if left_index < 0 || left_index as u64 >= count {
            return Err(StrataError::out_of_range(left_index, count));
        }
        if child_slot >= g.num_children() {
            return Err(StrataError::InvalidArgument(format!(
                "genome '{}' has no child slot {}",
                g.name(),
                child_slot
            )));
        }
        let mut it = Self {
            aln,
            genome,
            child_slot,
            left: left_index,
            right: left_index,
            gap_threshold,
            atomic,
        };
        it.extend_right()?;
        Ok(it)
    }

    #[inline]
    pub fn genome(&self) -> &'a Genome {
        self.aln.genome_by_id(self.genome)
    }

    #[inline]
    pub fn left_index(&self) -> i64 {
        self.left
    }

    #[inline]
    pub fn right_index(&self) -> i64 {
        self.right
    }

    pub fn start_position(&self) -> Result<i64> {
        self.genome().bottom_segment(self.left).start_position()
    }

    pub fn end_position(&self) -> Result<i64> {
        self.genome().bottom_segment(self.right).end_position()
    }

    pub fn length(&self) -> Result<u64> {
        Ok((self.end_position()? - self.start_position()? + 1) as u64)
    }

    fn is_mapped(&self, index: i64) -> Result<bool> {
        Ok(self
            .genome()
            .bottom_segment(index)
            .child_index(self.child_slot)?
            != NULL_INDEX)
    }

    /// True when the run has no aligned member (candidate deletion block).
    pub fn is_unaligned(&self) -> Result<bool> {
        for i in self.left..=self.right {
            if self.is_mapped(i)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn num_gap_bases(&self) -> Result<u64> {
        let genome = self.genome();
        let mut bases = 0;
        for i in self.left..=self.right {
            if !self.is_mapped(i)? {
                bases += genome.bottom_segment(i).length()?;
            }
        }
        Ok(bases)
    }

    fn extend_right(&mut self) -> Result<()> {
        if self.atomic {
            return Ok(());
        }
        let genome = self.genome();
        if !self.is_mapped(self.left)? {
            while !genome.bottom_segment(self.right).is_last()?
                && !self.is_mapped(self.right + 1)?
            {
                self.right += 1;
            }
            return Ok(());
        }
        loop {
            if genome.bottom_segment(self.right).is_last()? {
                return Ok(());
            }
            let mut j = self.right + 1;
            loop {
                if self.is_mapped(j)? {
                    break;
                }
                if genome.bottom_segment(j).length()? >= self.gap_threshold
                    || genome.bottom_segment(j).is_last()?
                {
                    return Ok(());
                }
                j += 1;
            }
            if !self.compatible(self.right, j)? {
                return Ok(());
            }
            self.right = j;
        }
    }

    /// Child-side adjacency check mirroring the top-side rule.
    fn compatible(&self, cur: i64, next: i64) -> Result<bool> {
        let genome = self.genome();
        let child = self.aln.genome_by_id(genome.child_ids()[self.child_slot]);
        let c = genome.bottom_segment(cur);
        let n = genome.bottom_segment(next);
        let crev = c.child_reversed(self.child_slot)?;
        if crev != n.child_reversed(self.child_slot)? {
            return Ok(false);
        }
        let ct = child.top_segment(c.child_index(self.child_slot)?);
        let nt = child.top_segment(n.child_index(self.child_slot)?);
        let gap = if crev {
            ct.start_position()? - nt.end_position()? - 1
        } else {
            nt.start_position()? - ct.end_position()? - 1
        };
        if gap < 0 || gap as u64 > self.gap_threshold {
            return Ok(false);
        }
        Ok(ct.sequence()?.index() == nt.sequence()?.index())
    }

    pub fn to_right(&mut self) -> Result<()> {
        let count = self.genome().num_bottom_segments();
        if self.right as u64 + 1 >= count {
            return Err(StrataError::out_of_range(self.right + 1, count));
        }
        self.left = self.right + 1;
        self.right = self.left;
        self.extend_right()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::Alignment;
    use crate::segment::{BottomSegmentSpec, TopSegmentSpec};
    use crate::sequence::SequenceInfo;
    use tempfile::tempdir;

    /// Leaf with aligned-gap-aligned tops: [0,10)->b0, [10,12) unaligned,
    /// [12,22)->b1, [22,40) unaligned.
    fn gap_alignment(dir: &std::path::Path) -> Alignment {
        let mut aln = Alignment::create(dir).unwrap();
        aln.add_root_genome("root").unwrap();
        aln.add_leaf_genome("leaf", "root", 1.0).unwrap();
        aln.genome_mut("root")
            .unwrap()
            .set_dimensions(&[SequenceInfo::new("chr", 20, 0, 2)])
            .unwrap();
        aln.genome_mut("leaf")
            .unwrap()
            .set_dimensions(&[SequenceInfo::new("chr", 40, 4, 0)])
            .unwrap();
        let root = aln.genome("root").unwrap();
        root.set_dna(&vec![b'a'; 20]).unwrap();
        for (i, (s, l, c)) in [(0i64, 10u64, 0i64), (10, 10, 2)].iter().enumerate() {
            let mut spec = BottomSegmentSpec::new(*s, *l, 1);
            spec.children[0] = (*c, false);
            root.set_bottom_segment(i as i64, &spec).unwrap();
        }
        let leaf = aln.genome("leaf").unwrap();
        leaf.set_dna(&vec![b'a'; 40]).unwrap();
        let specs = [
            (0i64, 10u64, 0i64),
            (10, 2, NULL_INDEX),
            (12, 10, 1),
            (22, 18, NULL_INDEX),
        ];
        for (i, (s, l, p)) in specs.iter().enumerate() {
            leaf.set_top_segment(
                i as i64,
                &TopSegmentSpec {
                    start: *s,
                    length: *l,
                    parent: *p,
                    ..Default::default()
                },
            )
            .unwrap();
        }
        aln
    }

    #[test]
    fn test_run_bridges_small_gap() {
        let dir = tempdir().unwrap();
        let aln = gap_alignment(dir.path());
        let leaf = aln.genome_id("leaf").unwrap();
        let it = GappedTopIter::new(&aln, leaf, 0, 5, false).unwrap();
        assert_eq!(it.left_index(), 0);
        assert_eq!(it.right_index(), 2);
        assert_eq!(it.num_gaps().unwrap(), 1);
        assert_eq!(it.num_gap_bases().unwrap(), 2);
        assert_eq!(it.length().unwrap(), 22);
        let pr = it.parent_range().unwrap().unwrap();
        assert_eq!((pr.left, pr.right, pr.reversed), (0, 19, false));
    }

    #[test]
    fn test_threshold_blocks_large_gap() {
        let dir = tempdir().unwrap();
        let aln = gap_alignment(dir.path());
        let leaf = aln.genome_id("leaf").unwrap();
        // the 2-base gap is not shorter than a threshold of 2
        let it = GappedTopIter::new(&aln, leaf, 0, 2, false).unwrap();
        assert_eq!(it.right_index(), 0);
        // atomic mode never extends
        let it = GappedTopIter::new(&aln, leaf, 0, 100, true).unwrap();
        assert_eq!(it.right_index(), 0);
    }

    #[test]
    fn test_unaligned_anchor_swallows_block() {
        let dir = tempdir().unwrap();
        let aln = gap_alignment(dir.path());
        let leaf = aln.genome_id("leaf").unwrap();
        let it = GappedTopIter::new(&aln, leaf, 3, 5, false).unwrap();
        assert_eq!(it.left_index(), 3);
        assert_eq!(it.right_index(), 3);
        assert!(!it.has_parent().unwrap());
        assert_eq!(it.length().unwrap(), 18);
    }

    #[test]
    fn test_to_right_walks_runs() {
        let dir = tempdir().unwrap();
        let aln = gap_alignment(dir.path());
        let leaf = aln.genome_id("leaf").unwrap();
        let mut it = GappedTopIter::new(&aln, leaf, 0, 5, false).unwrap();
        it.to_right().unwrap();
        assert_eq!(it.left_index(), 3);
        assert!(it.to_right().is_err());
    }

    #[test]
    fn test_bottom_side_runs() {
        let dir = tempdir().unwrap();
        let aln = gap_alignment(dir.path());
        let root = aln.genome_id("root").unwrap();
        let it = GappedBottomIter::new(&aln, root, 0, 0, 5, false).unwrap();
        // b0 -> leaf t0 ends at 9, b1 -> leaf t2 starts at 12: a 2-base gap
        assert_eq!(it.right_index(), 1);
        assert!(!it.is_unaligned().unwrap());
        let it = GappedBottomIter::new(&aln, root, 0, 0, 1, false).unwrap();
        assert_eq!(it.right_index(), 0);
    }
}
