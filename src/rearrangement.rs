//! Rearrangement classifier.
//!
//! A state machine over gapped top runs of a child genome. Each breakpoint
//! separates the current run from the one to its right; comparing how the
//! two runs land on the parent labels the breakpoint as one of the
//! rearrangement categories. `identify_next` walks the breakpoints left to
//! right until the right endpoint passes the genome end.
//!
//! Atomic mode disables gapped extension and the deletion size threshold,
//! which lets callers enumerate gap-sized deletions in a second pass.

use crate::alignment::Alignment;
use crate::error::{Result, StrataError};
use crate::gapped::GappedTopIter;
use crate::segment::NULL_INDEX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RearrangementKind {
    Insertion,
    Deletion,
    Inversion,
    Duplication,
    Transposition,
    Nothing,
    Other,
}

impl RearrangementKind {
    pub fn tag(&self) -> &'static str {
        match self {
            RearrangementKind::Insertion => "I",
            RearrangementKind::Deletion => "D",
            RearrangementKind::Inversion => "V",
            RearrangementKind::Duplication => "U",
            RearrangementKind::Transposition => "P",
            RearrangementKind::Nothing => "N",
            RearrangementKind::Other => "O",
        }
    }
}

pub struct Rearrangement<'a> {
    aln: &'a Alignment,
    genome: usize,
    gap_threshold: u64,
    atomic: bool,
    current: GappedTopIter<'a>,
    kind: RearrangementKind,
    deleted: Option<(i64, i64)>,
    duplicated: Option<(i64, i64)>,
}

impl<'a> Rearrangement<'a> {
    /// Anchor a classifier at top segment `top_index` of `genome` (which
    /// must have a parent) and identify the first breakpoint.
    pub fn new(
        aln: &'a Alignment,
        genome: usize,
        top_index: i64,
        gap_threshold: u64,
        atomic: bool,
    ) -> Result<Self> {
        let g = aln.genome_by_id(genome);
        if g.parent_id().is_none() {
            return Err(StrataError::InvalidArgument(format!(
                "genome '{}' has no parent to classify against",
                g.name()
            )));
        }
        let current = GappedTopIter::new(aln, genome, top_index, gap_threshold, atomic)?;
        let mut r = Self {
            aln,
            genome,
            gap_threshold,
            atomic,
            current,
            kind: RearrangementKind::Nothing,
            deleted: None,
            duplicated: None,
        };
        r.identify()?;
        Ok(r)
    }

    #[inline]
    pub fn kind(&self) -> RearrangementKind {
        self.kind
    }

    /// Left breakpoint: first top index of the current run.
    #[inline]
    pub fn left_breakpoint(&self) -> i64 {
        self.current.left_index()
    }

    /// Right breakpoint: last top index of the current run.
    #[inline]
    pub fn right_breakpoint(&self) -> i64 {
        self.current.right_index()
    }

    pub fn start_position(&self) -> Result<i64> {
        self.current.start_position()
    }

    pub fn end_position(&self) -> Result<i64> {
        self.current.end_position()
    }

    /// Length of the current run in child bases.
    pub fn length(&self) -> Result<u64> {
        self.current.length()
    }

    /// Parent range removed on this branch, when the breakpoint is a
    /// deletion.
    #[inline]
    pub fn deleted_range(&self) -> Option<(i64, i64)> {
        self.deleted
    }

    /// Parent range copied more than once, when the breakpoint is a
    /// duplication.
    #[inline]
    pub fn duplicated_range(&self) -> Option<(i64, i64)> {
        self.duplicated
    }

    /// Advance to the next breakpoint; `false` once the right endpoint has
    /// passed the genome end.
    pub fn identify_next(&mut self) -> Result<bool> {
        if self.current.to_right().is_err() {
            return Ok(false);
        }
        self.identify()?;
        Ok(true)
    }

    fn identify(&mut self) -> Result<()> {
        self.deleted = None;
        self.duplicated = None;

        if !self.current.has_parent()? {
            // an unaligned run shorter than the threshold is a plain gap
            self.kind = if self.current.length()? >= self.gap_threshold {
                RearrangementKind::Insertion
            } else {
                RearrangementKind::Nothing
            };
            return Ok(());
        }

        if self.current.has_paralogy()? {
            self.kind = RearrangementKind::Duplication;
            self.duplicated = self
                .current
                .parent_range()?
                .map(|pr| (pr.left, pr.right));
            return Ok(());
        }

        let genome = self.aln.genome_by_id(self.genome);
        let right_anchor = self.current.right_index() + 1;
        if right_anchor as u64 >= genome.num_top_segments()
            || genome.top_segment(self.current.right_index()).is_last()?
        {
            self.kind = RearrangementKind::Nothing;
            return Ok(());
        }
        let next = GappedTopIter::new(
            self.aln,
            self.genome,
            right_anchor,
            self.gap_threshold,
            self.atomic,
        )?;
        let left_range = match self.current.parent_range()? {
            Some(r) => r,
            None => {
                self.kind = RearrangementKind::Other;
                return Ok(());
            }
        };
        let right_range = match next.parent_range()? {
            Some(r) => r,
            None => {
                // breakpoint against an unaligned run: classified when the
                // walk reaches that run
                self.kind = RearrangementKind::Nothing;
                return Ok(());
            }
        };

        let parent = self.aln.genome_by_id(genome.parent_id().unwrap());
        let same_sequence = parent.sequence_by_site(left_range.left)?.index()
            == parent.sequence_by_site(right_range.left)?.index();
        if !same_sequence {
            self.kind = RearrangementKind::Transposition;
            return Ok(());
        }

        if left_range.reversed == right_range.reversed {
            let gap = if left_range.reversed {
                left_range.left - right_range.right - 1
            } else {
                right_range.left - left_range.right - 1
            };
            if gap == 0 {
                self.kind = RearrangementKind::Nothing;
            } else if gap > 0 {
                let span = if left_range.reversed {
                    (right_range.right + 1, left_range.left - 1)
                } else {
                    (left_range.right + 1, right_range.left - 1)
                };
                if !self.parent_span_unaligned(span)? {
                    // the skipped parent bases live on elsewhere in the
                    // child: the child segment moved, nothing was lost
                    self.kind = RearrangementKind::Transposition;
                } else if self.atomic || gap as u64 >= self.gap_threshold {
                    self.kind = RearrangementKind::Deletion;
                    self.deleted = Some(span);
                } else {
                    self.kind = RearrangementKind::Nothing;
                }
            } else {
                self.kind = RearrangementKind::Other;
            }
        } else {
            // orientation flip: an inversion if the two footprints are
            // adjacent on the parent, a transposition otherwise
            let distance = if right_range.left > left_range.right {
                right_range.left - left_range.right - 1
            } else if left_range.left > right_range.right {
                left_range.left - right_range.right - 1
            } else {
                0
            };
            self.kind = if distance as u64 <= self.gap_threshold {
                RearrangementKind::Inversion
            } else {
                RearrangementKind::Transposition
            };
        }
        Ok(())
    }

    /// True when every parent bottom segment inside `[span.0, span.1]` is
    /// unaligned to this child.
    fn parent_span_unaligned(&self, span: (i64, i64)) -> Result<bool> {
        if span.1 < span.0 {
            return Ok(true);
        }
        let genome = self.aln.genome_by_id(self.genome);
        let pid = genome.parent_id().unwrap();
        let parent = self.aln.genome_by_id(pid);
        let slot = self.aln.child_slot(pid, self.genome)?;
        let mut index = parent.bottom_segment_at(span.0)?;
        while (index as u64) < parent.num_bottom_segments() {
            let seg = parent.bottom_segment(index);
            if seg.start_position()? > span.1 {
                break;
            }
            if seg.child_index(slot)? != NULL_INDEX {
                return Ok(false);
            }
            index += 1;
        }
        Ok(true)
    }
}
