//! Top and bottom segment records.
//!
//! A genome carries two segment arrays: *top* segments partition it under the
//! alignment to its parent, *bottom* segments under the alignment to its
//! children. Both arrays store one extra sentinel record whose start position
//! is the genome length, so a segment's length is always the next record's
//! start minus its own.
//!
//! All index fields are signed 64-bit with [`NULL_INDEX`] as the absent
//! value. The accessor types here stay within one genome; transitions that
//! cross genomes live with the iterators.

use crate::error::Result;
use crate::genome::Genome;
use crate::sequence::Sequence;

/// Sentinel for every absent index field.
pub const NULL_INDEX: i64 = -1;

// top record layout
pub(crate) const TOP_START_OFFSET: usize = 0;
pub(crate) const TOP_BOTTOM_PARSE_OFFSET: usize = 8;
pub(crate) const TOP_PARALOGY_OFFSET: usize = 16;
pub(crate) const TOP_PARENT_OFFSET: usize = 24;
pub(crate) const TOP_PARENT_REVERSED_OFFSET: usize = 32;
pub const TOP_RECORD_SIZE: usize = 33;

// bottom record layout; child slots follow the fixed fields
pub(crate) const BOTTOM_START_OFFSET: usize = 0;
pub(crate) const BOTTOM_TOP_PARSE_OFFSET: usize = 8;
pub(crate) const BOTTOM_FIRST_CHILD_OFFSET: usize = 16;
pub(crate) const BOTTOM_CHILD_SLOT_SIZE: usize = 9;

/// Byte size of a bottom record for a genome with `num_children` children.
pub fn bottom_record_size(num_children: usize) -> usize {
    BOTTOM_FIRST_CHILD_OFFSET + BOTTOM_CHILD_SLOT_SIZE * num_children
}

#[inline]
pub(crate) fn child_index_offset(slot: usize) -> usize {
    BOTTOM_FIRST_CHILD_OFFSET + slot * BOTTOM_CHILD_SLOT_SIZE
}

#[inline]
pub(crate) fn child_reversed_offset(slot: usize) -> usize {
    child_index_offset(slot) + 8
}

/// Field values for writing one top segment (plus the start sentinel of its
/// right neighbour).
#[derive(Debug, Clone)]
pub struct TopSegmentSpec {
    pub start: i64,
    pub length: u64,
    pub parent: i64,
    pub parent_reversed: bool,
    pub next_paralogy: i64,
    pub bottom_parse: i64,
}

impl Default for TopSegmentSpec {
    fn default() -> Self {
        Self {
            start: 0,
            length: 0,
            parent: NULL_INDEX,
            parent_reversed: false,
            next_paralogy: NULL_INDEX,
            bottom_parse: NULL_INDEX,
        }
    }
}

/// Field values for writing one bottom segment. `children` must carry one
/// `(child index, reversed)` pair per child of the genome.
#[derive(Debug, Clone)]
pub struct BottomSegmentSpec {
    pub start: i64,
    pub length: u64,
    pub top_parse: i64,
    pub children: Vec<(i64, bool)>,
}

impl BottomSegmentSpec {
    pub fn new(start: i64, length: u64, num_children: usize) -> Self {
        Self {
            start,
            length,
            top_parse: NULL_INDEX,
            children: vec![(NULL_INDEX, false); num_children],
        }
    }
}

/// Read accessor for one top segment record.
#[derive(Clone, Copy)]
pub struct TopSegment<'a> {
    genome: &'a Genome,
    index: i64,
}

impl<'a> TopSegment<'a> {
    pub fn new(genome: &'a Genome, index: i64) -> Self {
        Self { genome, index }
    }

    #[inline]
    pub fn genome(&self) -> &'a Genome {
        self.genome
    }

    #[inline]
    pub fn array_index(&self) -> i64 {
        self.index
    }

    pub fn start_position(&self) -> Result<i64> {
        self.genome
            .with_top(|a| a.read_i64(self.index, TOP_START_OFFSET))
    }

    pub fn length(&self) -> Result<u64> {
        self.genome.with_top(|a| {
            let here = a.read_i64(self.index, TOP_START_OFFSET)?;
            let next = a.read_i64(self.index + 1, TOP_START_OFFSET)?;
            Ok((next - here) as u64)
        })
    }

    pub fn end_position(&self) -> Result<i64> {
        Ok(self.start_position()? + self.length()? as i64 - 1)
    }

    pub fn parent_index(&self) -> Result<i64> {
        self.genome
            .with_top(|a| a.read_i64(self.index, TOP_PARENT_OFFSET))
    }

    pub fn has_parent(&self) -> Result<bool> {
        Ok(self.parent_index()? != NULL_INDEX)
    }

    pub fn parent_reversed(&self) -> Result<bool> {
        self.genome
            .with_top(|a| Ok(a.read_u8(self.index, TOP_PARENT_REVERSED_OFFSET)? != 0))
    }

    pub fn next_paralogy_index(&self) -> Result<i64> {
        self.genome
            .with_top(|a| a.read_i64(self.index, TOP_PARALOGY_OFFSET))
    }

    pub fn has_next_paralogy(&self) -> Result<bool> {
        Ok(self.next_paralogy_index()? != NULL_INDEX)
    }

    pub fn bottom_parse_index(&self) -> Result<i64> {
        self.genome
            .with_top(|a| a.read_i64(self.index, TOP_BOTTOM_PARSE_OFFSET))
    }

    pub fn has_parse_down(&self) -> Result<bool> {
        Ok(self.bottom_parse_index()? != NULL_INDEX)
    }

    pub fn sequence(&self) -> Result<&'a Sequence> {
        self.genome.sequence_by_site(self.start_position()?)
    }

    pub fn is_first(&self) -> Result<bool> {
        let seq = self.sequence()?;
        Ok(self.index == 0 || self.index == seq.top_segment_array_index())
    }

    pub fn is_last(&self) -> Result<bool> {
        let seq = self.sequence()?;
        Ok(self.index == self.genome.num_top_segments() as i64 - 1
            || self.index == seq.top_segment_array_index() + seq.num_top_segments() as i64 - 1)
    }

    /// Parent index of the segment immediately to the left.
    pub fn left_parent_index(&self) -> Result<i64> {
        TopSegment::new(self.genome, self.index - 1).parent_index()
    }

    /// Parent index of the segment immediately to the right.
    pub fn right_parent_index(&self) -> Result<i64> {
        TopSegment::new(self.genome, self.index + 1).parent_index()
    }

    /// Walk the paralogy ring starting here, yielding every member index
    /// once. The visited bound makes a corrupt (non-cyclic) chain an error
    /// rather than a hang.
    pub fn paralogy_ring(&self) -> Result<Vec<i64>> {
        let mut ring = vec![self.index];
        let mut cur = self.next_paralogy_index()?;
        let bound = self.genome.num_top_segments();
        while cur != NULL_INDEX && cur != self.index {
            if ring.len() as u64 > bound {
                return Err(crate::error::StrataError::Invariant(format!(
                    "genome '{}': paralogy chain from {} does not cycle",
                    self.genome.name(),
                    self.index
                )));
            }
            ring.push(cur);
            cur = TopSegment::new(self.genome, cur).next_paralogy_index()?;
        }
        Ok(ring)
    }
}

/// Read accessor for one bottom segment record.
#[derive(Clone, Copy)]
pub struct BottomSegment<'a> {
    genome: &'a Genome,
    index: i64,
}

impl<'a> BottomSegment<'a> {
    pub fn new(genome: &'a Genome, index: i64) -> Self {
        Self { genome, index }
    }

    #[inline]
    pub fn genome(&self) -> &'a Genome {
        self.genome
    }

    #[inline]
    pub fn array_index(&self) -> i64 {
        self.index
    }

    pub fn start_position(&self) -> Result<i64> {
        self.genome
            .with_bottom(|a| a.read_i64(self.index, BOTTOM_START_OFFSET))
    }

    pub fn length(&self) -> Result<u64> {
        self.genome.with_bottom(|a| {
            let here = a.read_i64(self.index, BOTTOM_START_OFFSET)?;
            let next = a.read_i64(self.index + 1, BOTTOM_START_OFFSET)?;
            Ok((next - here) as u64)
        })
    }

    pub fn end_position(&self) -> Result<i64> {
        Ok(self.start_position()? + self.length()? as i64 - 1)
    }

    #[inline]
    pub fn num_children(&self) -> usize {
        self.genome.num_children()
    }

    pub fn child_index(&self, slot: usize) -> Result<i64> {
        self.genome
            .with_bottom(|a| a.read_i64(self.index, child_index_offset(slot)))
    }

    pub fn has_child(&self, slot: usize) -> Result<bool> {
        Ok(self.child_index(slot)? != NULL_INDEX)
    }

    pub fn child_reversed(&self, slot: usize) -> Result<bool> {
        self.genome
            .with_bottom(|a| Ok(a.read_u8(self.index, child_reversed_offset(slot))? != 0))
    }

    pub fn top_parse_index(&self) -> Result<i64> {
        self.genome
            .with_bottom(|a| a.read_i64(self.index, BOTTOM_TOP_PARSE_OFFSET))
    }

    pub fn has_parse_up(&self) -> Result<bool> {
        Ok(self.top_parse_index()? != NULL_INDEX)
    }

    pub fn sequence(&self) -> Result<&'a Sequence> {
        self.genome.sequence_by_site(self.start_position()?)
    }

    pub fn is_first(&self) -> Result<bool> {
        let seq = self.sequence()?;
        Ok(self.index == 0 || self.index == seq.bottom_segment_array_index())
    }

    pub fn is_last(&self) -> Result<bool> {
        let seq = self.sequence()?;
        Ok(self.index == self.genome.num_bottom_segments() as i64 - 1
            || self.index == seq.bottom_segment_array_index() + seq.num_bottom_segments() as i64 - 1)
    }

    pub fn left_child_index(&self, slot: usize) -> Result<i64> {
        BottomSegment::new(self.genome, self.index - 1).child_index(slot)
    }

    pub fn right_child_index(&self, slot: usize) -> Result<i64> {
        BottomSegment::new(self.genome, self.index + 1).child_index(slot)
    }
}
