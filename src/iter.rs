//! Segment iterators: sliced, orientable cursors over the segment arrays.
//!
//! An iterator is `(genome, array index, start offset, end offset,
//! reversed)`. The offsets clip the underlying segment; they are relative to
//! the direction of travel, so `to_reverse` just swaps them. Moves keep four
//! invariants: the index stays inside the array (or one step past either
//! end, the explicit `at_end` state), the visible length is at least one,
//! offsets stay strictly below the underlying segment length, and
//! orientation composes with every parent/child crossing.
//!
//! The two sides share one generic implementation; transitions that switch
//! side or genome (`to_parent`, `to_child`, `to_parse_up`, `to_parse_down`)
//! are constructors on the destination type.

use std::marker::PhantomData;

use crate::alignment::Alignment;
use crate::error::{Result, StrataError};
use crate::genome::Genome;
use crate::segment::{BottomSegment, TopSegment, NULL_INDEX};

/// Array-side plumbing shared by the generic iterator.
pub trait SegmentSide: Copy {
    fn count(genome: &Genome) -> u64;
    fn start(genome: &Genome, index: i64) -> Result<i64>;
    fn length(genome: &Genome, index: i64) -> Result<u64>;
    fn segment_at(genome: &Genome, pos: i64) -> Result<i64>;
}

#[derive(Clone, Copy)]
pub struct TopSide;

#[derive(Clone, Copy)]
pub struct BottomSide;

impl SegmentSide for TopSide {
    fn count(genome: &Genome) -> u64 {
        genome.num_top_segments()
    }
    fn start(genome: &Genome, index: i64) -> Result<i64> {
        genome.top_segment(index).start_position()
    }
    fn length(genome: &Genome, index: i64) -> Result<u64> {
        genome.top_segment(index).length()
    }
    fn segment_at(genome: &Genome, pos: i64) -> Result<i64> {
        genome.top_segment_at(pos)
    }
}

impl SegmentSide for BottomSide {
    fn count(genome: &Genome) -> u64 {
        genome.num_bottom_segments()
    }
    fn start(genome: &Genome, index: i64) -> Result<i64> {
        genome.bottom_segment(index).start_position()
    }
    fn length(genome: &Genome, index: i64) -> Result<u64> {
        genome.bottom_segment(index).length()
    }
    fn segment_at(genome: &Genome, pos: i64) -> Result<i64> {
        genome.bottom_segment_at(pos)
    }
}

pub struct SegmentIter<'a, S> {
    aln: &'a Alignment,
    genome: usize,
    index: i64,
    start_offset: u64,
    end_offset: u64,
    reversed: bool,
    _side: PhantomData<S>,
}

impl<S> Clone for SegmentIter<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<S> Copy for SegmentIter<'_, S> {}

pub type TopIter<'a> = SegmentIter<'a, TopSide>;
pub type BottomIter<'a> = SegmentIter<'a, BottomSide>;

impl<'a, S: SegmentSide> SegmentIter<'a, S> {
    pub fn new(aln: &'a Alignment, genome: usize, index: i64) -> Self {
        Self {
            aln,
            genome,
            index,
            start_offset: 0,
            end_offset: 0,
            reversed: false,
            _side: PhantomData,
        }
    }

    #[inline]
    pub fn alignment(&self) -> &'a Alignment {
        self.aln
    }

    #[inline]
    pub fn genome(&self) -> &'a Genome {
        self.aln.genome_by_id(self.genome)
    }

    #[inline]
    pub fn genome_id(&self) -> usize {
        self.genome
    }

    #[inline]
    pub fn array_index(&self) -> i64 {
        self.index
    }

    #[inline]
    pub fn start_offset(&self) -> u64 {
        self.start_offset
    }

    #[inline]
    pub fn end_offset(&self) -> u64 {
        self.end_offset
    }

    #[inline]
    pub fn reversed(&self) -> bool {
        self.reversed
    }

    /// True when the cursor sits one step past either end of the array.
    #[inline]
    pub fn at_end(&self) -> bool {
        self.index < 0 || self.index as u64 >= S::count(self.genome())
    }

    fn seg_start(&self) -> Result<i64> {
        S::start(self.genome(), self.index)
    }

    fn seg_length(&self) -> Result<u64> {
        S::length(self.genome(), self.index)
    }

    /// Leftmost visible base, in genome coordinates.
    pub fn left_position(&self) -> Result<i64> {
        let off = if self.reversed {
            self.end_offset
        } else {
            self.start_offset
        };
        Ok(self.seg_start()? + off as i64)
    }

    /// Rightmost visible base, in genome coordinates.
    pub fn right_position(&self) -> Result<i64> {
        let off = if self.reversed {
            self.start_offset
        } else {
            self.end_offset
        };
        Ok(self.seg_start()? + self.seg_length()? as i64 - 1 - off as i64)
    }

    /// First visible base in iteration order.
    pub fn start_position(&self) -> Result<i64> {
        if self.reversed {
            self.right_position()
        } else {
            self.left_position()
        }
    }

    /// Last visible base in iteration order.
    pub fn end_position(&self) -> Result<i64> {
        if self.reversed {
            self.left_position()
        } else {
            self.right_position()
        }
    }

    /// Visible length.
    pub fn length(&self) -> Result<u64> {
        Ok(self.seg_length()? - self.start_offset - self.end_offset)
    }

    pub fn left_of(&self, pos: i64) -> Result<bool> {
        Ok(self.right_position()? < pos)
    }

    pub fn right_of(&self, pos: i64) -> Result<bool> {
        Ok(self.left_position()? > pos)
    }

    pub fn overlaps(&self, pos: i64) -> Result<bool> {
        Ok(!self.left_of(pos)? && !self.right_of(pos)?)
    }

    /// Step one segment ahead in iteration order, or shrink to the
    /// unconsumed remainder of a partially-visible segment. `cutoff`, when
    /// given, clips the new visible range so it does not extend past that
    /// genome position.
    pub fn to_right(&mut self, cutoff: Option<i64>) -> Result<()> {
        if self.at_end() {
            return Err(StrataError::out_of_range(
                self.index,
                S::count(self.genome()),
            ));
        }
        if self.end_offset == 0 {
            self.index += if self.reversed { -1 } else { 1 };
            self.start_offset = 0;
        } else {
            let len = self.seg_length()?;
            self.start_offset = len - self.end_offset;
            self.end_offset = 0;
        }
        if let Some(cut) = cutoff {
            if !self.at_end() && self.overlaps(cut)? {
                self.end_offset = if self.reversed {
                    (cut - self.seg_start()?) as u64
                } else {
                    (self.seg_start()? + self.seg_length()? as i64 - 1 - cut) as u64
                };
            }
        }
        Ok(())
    }

    /// Mirror image of [`SegmentIter::to_right`].
    pub fn to_left(&mut self, cutoff: Option<i64>) -> Result<()> {
        if self.at_end() {
            return Err(StrataError::out_of_range(
                self.index,
                S::count(self.genome()),
            ));
        }
        if self.start_offset == 0 {
            self.index += if self.reversed { 1 } else { -1 };
            self.end_offset = 0;
        } else {
            let len = self.seg_length()?;
            self.end_offset = len - self.start_offset;
            self.start_offset = 0;
        }
        if let Some(cut) = cutoff {
            if !self.at_end() && self.overlaps(cut)? {
                self.start_offset = if self.reversed {
                    (self.seg_start()? + self.seg_length()? as i64 - 1 - cut) as u64
                } else {
                    (cut - self.seg_start()?) as u64
                };
            }
        }
        Ok(())
    }

    /// Flip orientation; the visible base range is preserved.
    pub fn to_reverse(&mut self) {
        std::mem::swap(&mut self.start_offset, &mut self.end_offset);
        self.reversed = !self.reversed;
    }

    /// Flip orientation keeping the iteration-relative offsets. Used by the
    /// branch crossings, where the offsets already live in the composed
    /// frame: the i-th visible base in iteration order stays the i-th.
    fn to_reverse_in_place(&mut self) {
        self.reversed = !self.reversed;
    }

    /// Clip the current segment: `start_offset + end_offset` must leave at
    /// least one visible base.
    pub fn slice(&mut self, start_offset: u64, end_offset: u64) -> Result<()> {
        let len = self.seg_length()?;
        if start_offset + end_offset >= len {
            return Err(StrataError::InvalidArgument(format!(
                "slice {}+{} consumes entire segment of length {}",
                start_offset, end_offset, len
            )));
        }
        self.start_offset = start_offset;
        self.end_offset = end_offset;
        Ok(())
    }

    /// Jump to the segment containing genome position `pos`, forward
    /// oriented and unsliced; with `do_slice`, clip the visible range to
    /// exactly that one base.
    pub fn to_site(&mut self, pos: i64, do_slice: bool) -> Result<()> {
        self.reversed = false;
        self.start_offset = 0;
        self.end_offset = 0;
        self.index = S::segment_at(self.genome(), pos)?;
        debug_assert!(self.overlaps(pos)?);
        if do_slice {
            let start = self.seg_start()?;
            let len = self.seg_length()? as i64;
            self.start_offset = (pos - start) as u64;
            self.end_offset = (start + len - 1 - pos) as u64;
        }
        Ok(())
    }

    /// Set the visible range to `[left, right]` in genome coordinates,
    /// without moving the array index or orientation.
    pub(crate) fn set_absolute_range(&mut self, left: i64, right: i64) -> Result<()> {
        let start = self.seg_start()?;
        let end = start + self.seg_length()? as i64 - 1;
        let (a, b) = ((left - start) as u64, (end - right) as u64);
        if self.reversed {
            self.start_offset = b;
            self.end_offset = a;
        } else {
            self.start_offset = a;
            self.end_offset = b;
        }
        Ok(())
    }

    /// Visible bases, reverse-complemented when the cursor is reversed.
    pub fn base_string(&self) -> Result<Vec<u8>> {
        self.genome()
            .dna_substring(self.left_position()?, self.length()?, self.reversed)
    }

    /// Same array slot in the same genome (offsets ignored).
    pub fn same_segment(&self, other: &Self) -> bool {
        self.genome == other.genome && self.index == other.index
    }
}

impl<'a> TopIter<'a> {
    /// Cursor over the accessor for the current record.
    pub fn segment(&self) -> TopSegment<'a> {
        self.genome().top_segment(self.index)
    }

    pub fn has_parent(&self) -> Result<bool> {
        Ok(!self.at_end() && self.segment().has_parent()?)
    }

    pub fn has_parse_down(&self) -> Result<bool> {
        Ok(!self.at_end() && self.segment().has_parse_down()?)
    }

    pub fn has_next_paralogy(&self) -> Result<bool> {
        Ok(!self.at_end() && self.segment().has_next_paralogy()?)
    }

    /// Follow the paralogy ring one hop, keeping the parent frame fixed:
    /// if the next copy aligns to the parent on the other strand, the
    /// cursor flips with it.
    pub fn to_next_paralogy(&mut self) -> Result<()> {
        let seg = self.segment();
        let next = seg.next_paralogy_index()?;
        if next == NULL_INDEX {
            return Err(StrataError::InvalidArgument(format!(
                "top segment {} of '{}' has no paralogy link",
                self.index,
                self.genome().name()
            )));
        }
        let was_reversed = seg.parent_reversed()?;
        self.index = next;
        if self.segment().parent_reversed()? != was_reversed {
            self.to_reverse_in_place();
        }
        Ok(())
    }

    /// Descend from a bottom cursor into child `slot`, composing offsets
    /// and strand.
    pub fn to_child(bottom: &BottomIter<'a>, slot: usize) -> Result<Self> {
        let bseg = bottom.segment();
        let child_index = bseg.child_index(slot)?;
        if child_index == NULL_INDEX {
            return Err(StrataError::InvalidArgument(format!(
                "bottom segment {} of '{}' has no child in slot {}",
                bottom.index,
                bottom.genome().name(),
                slot
            )));
        }
        let child_genome = bottom.genome().child_ids()[slot];
        let mut it = TopIter {
            aln: bottom.aln,
            genome: child_genome,
            index: child_index,
            start_offset: bottom.start_offset,
            end_offset: bottom.end_offset,
            reversed: bottom.reversed,
            _side: PhantomData,
        };
        if bseg.child_reversed(slot)? {
            it.to_reverse_in_place();
        }
        Ok(it)
    }

    /// Cross from a bottom cursor to the top array of the same genome via
    /// the parse index, advancing to the record that covers the bottom's
    /// leftmost visible base.
    pub fn to_parse_up(bottom: &BottomIter<'a>) -> Result<Self> {
        let parse = bottom.segment().top_parse_index()?;
        if parse == NULL_INDEX {
            return Err(StrataError::InvalidArgument(format!(
                "bottom segment {} of '{}' has no parse link",
                bottom.index,
                bottom.genome().name()
            )));
        }
        let left = bottom.left_position()?;
        let right = bottom.right_position()?;
        let mut it = TopIter {
            aln: bottom.aln,
            genome: bottom.genome,
            index: parse,
            start_offset: 0,
            end_offset: 0,
            reversed: bottom.reversed,
            _side: PhantomData,
        };
        loop {
            let seg = it.segment();
            if left < seg.start_position()? + seg.length()? as i64 {
                break;
            }
            it.index += 1;
        }
        let seg_end = it.segment().end_position()?;
        it.set_absolute_range(left, right.min(seg_end))?;
        Ok(it)
    }

    /// The canonical copy is the one its parent's child pointer selects.
    pub fn is_canonical_paralog(&self) -> Result<bool> {
        let genome = self.genome();
        let parent_index = self.segment().parent_index()?;
        if parent_index == NULL_INDEX {
            return Ok(true);
        }
        let pid = genome.parent_id().ok_or_else(|| {
            StrataError::Invariant(format!(
                "root genome '{}' carries a parent index",
                genome.name()
            ))
        })?;
        let slot = self.aln.child_slot(pid, self.genome)?;
        let back = self
            .aln
            .genome_by_id(pid)
            .bottom_segment(parent_index)
            .child_index(slot)?;
        Ok(back == self.index)
    }
}

impl<'a> BottomIter<'a> {
    pub fn segment(&self) -> BottomSegment<'a> {
        self.genome().bottom_segment(self.index)
    }

    pub fn has_child(&self, slot: usize) -> Result<bool> {
        Ok(!self.at_end() && self.segment().has_child(slot)?)
    }

    pub fn has_parse_up(&self) -> Result<bool> {
        Ok(!self.at_end() && self.segment().has_parse_up()?)
    }

    /// Ascend from a top cursor to its parent segment, composing offsets
    /// and strand.
    pub fn to_parent(top: &TopIter<'a>) -> Result<Self> {
        let tseg = top.segment();
        let parent_index = tseg.parent_index()?;
        if parent_index == NULL_INDEX {
            return Err(StrataError::InvalidArgument(format!(
                "top segment {} of '{}' has no parent",
                top.index,
                top.genome().name()
            )));
        }
        let pid = top.genome().parent_id().ok_or_else(|| {
            StrataError::Invariant(format!(
                "root genome '{}' carries a parent index",
                top.genome().name()
            ))
        })?;
        let mut it = BottomIter {
            aln: top.aln,
            genome: pid,
            index: parent_index,
            start_offset: top.start_offset,
            end_offset: top.end_offset,
            reversed: top.reversed,
            _side: PhantomData,
        };
        if tseg.parent_reversed()? {
            it.to_reverse_in_place();
        }
        Ok(it)
    }

    /// Cross from a top cursor to the bottom array of the same genome via
    /// the parse index.
    pub fn to_parse_down(top: &TopIter<'a>) -> Result<Self> {
        let parse = top.segment().bottom_parse_index()?;
        if parse == NULL_INDEX {
            return Err(StrataError::InvalidArgument(format!(
                "top segment {} of '{}' has no parse link",
                top.index,
                top.genome().name()
            )));
        }
        let left = top.left_position()?;
        let right = top.right_position()?;
        let mut it = BottomIter {
            aln: top.aln,
            genome: top.genome,
            index: parse,
            start_offset: 0,
            end_offset: 0,
            reversed: top.reversed,
            _side: PhantomData,
        };
        loop {
            let seg = it.segment();
            if left < seg.start_position()? + seg.length()? as i64 {
                break;
            }
            it.index += 1;
        }
        let seg_end = it.segment().end_position()?;
        it.set_absolute_range(left, right.min(seg_end))?;
        Ok(it)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::Alignment;
    use crate::segment::{BottomSegmentSpec, TopSegmentSpec};
    use crate::sequence::SequenceInfo;
    use tempfile::tempdir;

    /// Root and leaf, same ten bases, one top segment aligned 1-to-1.
    fn identity_pair(dir: &std::path::Path, parent_reversed: bool) -> Alignment {
        let mut aln = Alignment::create(dir).unwrap();
        aln.add_root_genome("root").unwrap();
        aln.add_leaf_genome("leaf", "root", 1.0).unwrap();
        aln.genome_mut("root")
            .unwrap()
            .set_dimensions(&[SequenceInfo::new("chrR", 10, 0, 1)])
            .unwrap();
        aln.genome_mut("leaf")
            .unwrap()
            .set_dimensions(&[SequenceInfo::new("chrL", 10, 1, 0)])
            .unwrap();
        let root = aln.genome("root").unwrap();
        root.set_dna(b"ACGTACGTAC").unwrap();
        let mut spec = BottomSegmentSpec::new(0, 10, 1);
        spec.children[0] = (0, parent_reversed);
        root.set_bottom_segment(0, &spec).unwrap();
        let leaf = aln.genome("leaf").unwrap();
        if parent_reversed {
            let mut s = b"ACGTACGTAC".to_vec();
            crate::dna::reverse_complement(&mut s);
            leaf.set_dna(&s).unwrap();
        } else {
            leaf.set_dna(b"ACGTACGTAC").unwrap();
        }
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

    /// Three segments on one genome for pure movement tests.
    fn segmented_genome(dir: &std::path::Path) -> Alignment {
        let mut aln = Alignment::create(dir).unwrap();
        aln.add_root_genome("root").unwrap();
        aln.add_leaf_genome("leaf", "root", 1.0).unwrap();
        aln.genome_mut("root")
            .unwrap()
            .set_dimensions(&[SequenceInfo::new("chr", 30, 0, 3)])
            .unwrap();
        aln.genome_mut("leaf")
            .unwrap()
            .set_dimensions(&[SequenceInfo::new("chr", 30, 3, 0)])
            .unwrap();
        let leaf = aln.genome("leaf").unwrap();
        leaf.set_dna(&vec![b'a'; 30]).unwrap();
        for (i, (start, len)) in [(0i64, 10u64), (10, 5), (15, 15)].iter().enumerate() {
            leaf.set_top_segment(
                i as i64,
                &TopSegmentSpec {
                    start: *start,
                    length: *len,
                    ..Default::default()
                },
            )
            .unwrap();
        }
        aln
    }

    #[test]
    fn test_forward_walk_and_lengths() {
        let dir = tempdir().unwrap();
        let aln = segmented_genome(dir.path());
        let leaf = aln.genome_id("leaf").unwrap();
        let mut it = TopIter::new(&aln, leaf, 0);
        assert_eq!(it.start_position().unwrap(), 0);
        assert_eq!(it.length().unwrap(), 10);
        it.to_right(None).unwrap();
        assert_eq!(it.array_index(), 1);
        assert_eq!(it.length().unwrap(), 5);
        it.to_right(None).unwrap();
        assert_eq!(it.start_position().unwrap(), 15);
        assert_eq!(it.end_position().unwrap(), 29);
        it.to_right(None).unwrap();
        assert!(it.at_end());
        assert!(it.to_right(None).is_err());
    }

    #[test]
    fn test_slice_and_cutoff() {
        let dir = tempdir().unwrap();
        let aln = segmented_genome(dir.path());
        let leaf = aln.genome_id("leaf").unwrap();
        let mut it = TopIter::new(&aln, leaf, 0);
        it.slice(2, 3).unwrap();
        assert_eq!(it.start_position().unwrap(), 2);
        assert_eq!(it.end_position().unwrap(), 6);
        assert_eq!(it.length().unwrap(), 5);
        assert!(it.slice(5, 5).is_err());

        // stepping right from a partial segment exposes the remainder
        it.to_right(None).unwrap();
        assert_eq!(it.array_index(), 0);
        assert_eq!(it.start_position().unwrap(), 7);
        assert_eq!(it.end_position().unwrap(), 9);

        // a cutoff clips the next segment
        it.to_right(Some(12)).unwrap();
        assert_eq!(it.array_index(), 1);
        assert_eq!(it.start_position().unwrap(), 10);
        assert_eq!(it.end_position().unwrap(), 12);
    }

    #[test]
    fn test_reverse_preserves_range() {
        let dir = tempdir().unwrap();
        let aln = segmented_genome(dir.path());
        let leaf = aln.genome_id("leaf").unwrap();
        let mut it = TopIter::new(&aln, leaf, 2);
        it.slice(3, 4).unwrap();
        let (l, r) = (it.left_position().unwrap(), it.right_position().unwrap());
        it.to_reverse();
        assert!(it.reversed());
        assert_eq!(it.left_position().unwrap(), l);
        assert_eq!(it.right_position().unwrap(), r);
        assert_eq!(it.start_position().unwrap(), r);
        assert_eq!(it.end_position().unwrap(), l);
        // a sliced cursor first exposes the unconsumed remainder
        it.to_right(None).unwrap();
        assert_eq!(it.array_index(), 2);
        assert_eq!(it.start_position().unwrap(), l - 1);
        // then reversed iteration walks leftward through the array
        it.to_right(None).unwrap();
        assert_eq!(it.array_index(), 1);
    }

    #[test]
    fn test_to_site() {
        let dir = tempdir().unwrap();
        let aln = segmented_genome(dir.path());
        let leaf = aln.genome_id("leaf").unwrap();
        let mut it = TopIter::new(&aln, leaf, 0);
        it.to_site(17, false).unwrap();
        assert_eq!(it.array_index(), 2);
        assert_eq!(it.start_position().unwrap(), 15);
        it.to_site(12, true).unwrap();
        assert_eq!(it.array_index(), 1);
        assert_eq!(it.start_position().unwrap(), 12);
        assert_eq!(it.length().unwrap(), 1);
        assert!(it.to_site(30, false).is_err());
    }

    #[test]
    fn test_to_parent_forward() {
        let dir = tempdir().unwrap();
        let aln = identity_pair(dir.path(), false);
        let leaf = aln.genome_id("leaf").unwrap();
        let mut it = TopIter::new(&aln, leaf, 0);
        it.to_site(3, true).unwrap();
        let parent = BottomIter::to_parent(&it).unwrap();
        assert_eq!(parent.genome().name(), "root");
        assert_eq!(parent.start_position().unwrap(), 3);
        assert_eq!(parent.length().unwrap(), 1);
        assert!(!parent.reversed());
        assert_eq!(parent.base_string().unwrap(), b"T");
    }

    #[test]
    fn test_to_parent_reversed_composes_strand() {
        let dir = tempdir().unwrap();
        let aln = identity_pair(dir.path(), true);
        let leaf = aln.genome_id("leaf").unwrap();
        let mut it = TopIter::new(&aln, leaf, 0);
        it.to_site(0, true).unwrap();
        let parent = BottomIter::to_parent(&it).unwrap();
        assert!(parent.reversed());
        // leaf base 0 is homologous to root base 9
        assert_eq!(parent.left_position().unwrap(), 9);
        // and the visible strings agree
        assert_eq!(it.base_string().unwrap(), parent.base_string().unwrap());
    }

    #[test]
    fn test_child_of_round_trip() {
        let dir = tempdir().unwrap();
        let aln = identity_pair(dir.path(), true);
        let root = aln.genome_id("root").unwrap();
        let bot = BottomIter::new(&aln, root, 0);
        let top = TopIter::to_child(&bot, 0).unwrap();
        assert_eq!(top.genome().name(), "leaf");
        assert!(top.reversed());
        let back = BottomIter::to_parent(&top).unwrap();
        assert!(bot.same_segment(&back));
        assert!(!back.reversed());
    }
}
