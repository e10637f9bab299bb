//! Per-branch mutation summary.
//!
//! Walks every branch of the tree (or a chosen subtree), counting
//! substitutions from aligned base comparison and rearrangement events from
//! the breakpoint classifier. Gap-scale indels are gathered in a second,
//! atomic classifier pass, mirroring how the event classes are defined: an
//! indel shorter than the gap threshold is a gap event, not a rearrangement.

use std::io::Write;
use std::ops::AddAssign;

use rustc_hash::FxHashSet;

use crate::alignment::Alignment;
use crate::error::{Result, StrataError};
use crate::iter::{BottomIter, TopIter};
use crate::rearrangement::{Rearrangement, RearrangementKind};

#[derive(Debug, Clone, Copy, Default)]
pub struct MutationsStats {
    pub genome_length: u64,
    pub parent_length: u64,
    pub branch_length: f64,
    pub substitutions: u64,
    pub insertions: u64,
    pub inserted_bases: u64,
    pub deletions: u64,
    pub deleted_bases: u64,
    pub inversions: u64,
    pub inverted_bases: u64,
    pub duplications: u64,
    pub duplicated_bases: u64,
    pub transpositions: u64,
    pub transposed_bases: u64,
    pub gap_insertions: u64,
    pub gap_inserted_bases: u64,
    pub gap_deletions: u64,
    pub gap_deleted_bases: u64,
}

impl AddAssign for MutationsStats {
    fn add_assign(&mut self, rhs: Self) {
        self.genome_length += rhs.genome_length;
        self.parent_length += rhs.parent_length;
        self.branch_length += rhs.branch_length;
        self.substitutions += rhs.substitutions;
        self.insertions += rhs.insertions;
        self.inserted_bases += rhs.inserted_bases;
        self.deletions += rhs.deletions;
        self.deleted_bases += rhs.deleted_bases;
        self.inversions += rhs.inversions;
        self.inverted_bases += rhs.inverted_bases;
        self.duplications += rhs.duplications;
        self.duplicated_bases += rhs.duplicated_bases;
        self.transpositions += rhs.transpositions;
        self.transposed_bases += rhs.transposed_bases;
        self.gap_insertions += rhs.gap_insertions;
        self.gap_inserted_bases += rhs.gap_inserted_bases;
        self.gap_deletions += rhs.gap_deletions;
        self.gap_deleted_bases += rhs.gap_deleted_bases;
    }
}

impl MutationsStats {
    fn divide(&mut self, n: u64) {
        if n == 0 {
            return;
        }
        self.genome_length /= n;
        self.parent_length /= n;
        self.branch_length /= n as f64;
        self.substitutions /= n;
        self.insertions /= n;
        self.inserted_bases /= n;
        self.deletions /= n;
        self.deleted_bases /= n;
        self.inversions /= n;
        self.inverted_bases /= n;
        self.duplications /= n;
        self.duplicated_bases /= n;
        self.transpositions /= n;
        self.transposed_bases /= n;
        self.gap_insertions /= n;
        self.gap_inserted_bases /= n;
        self.gap_deletions /= n;
        self.gap_deleted_bases /= n;
    }

    fn write_row<W: Write>(&self, out: &mut W) -> Result<()> {
        let mut ryu_buf = ryu::Buffer::new();
        writeln!(
            out,
            "{}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}",
            self.genome_length,
            self.parent_length,
            ryu_buf.format(self.branch_length),
            self.substitutions,
            self.insertions,
            self.inserted_bases,
            self.deletions,
            self.deleted_bases,
            self.inversions,
            self.inverted_bases,
            self.duplications,
            self.duplicated_bases,
            self.transpositions,
            self.transposed_bases,
            self.gap_insertions,
            self.gap_inserted_bases,
            self.gap_deletions,
            self.gap_deleted_bases
        )?;
        Ok(())
    }
}

pub struct MutationsCommand {
    /// Indels this size or larger are rearrangements; smaller are gaps.
    pub max_gap: u64,
    /// Skip segments whose N fraction exceeds this.
    pub max_n_fraction: f64,
    /// Count substitutions only.
    pub just_subs: bool,
    /// Analyze only the subtree below this genome.
    pub root: Option<String>,
    /// Restrict branch rows to these child genomes.
    pub targets: Option<Vec<String>>,
}

impl Default for MutationsCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl MutationsCommand {
    pub fn new() -> Self {
        Self {
            max_gap: 10,
            max_n_fraction: 1.0,
            just_subs: false,
            root: None,
            targets: None,
        }
    }

    pub fn run<W: Write>(&self, aln: &Alignment, out: &mut W) -> Result<()> {
        let root_id = match &self.root {
            Some(name) => aln.genome_id(name)?,
            None => aln.root()?.id(),
        };
        let target_set: Option<FxHashSet<&str>> = self
            .targets
            .as_ref()
            .map(|t| t.iter().map(|s| s.as_str()).collect());

        let header = "GenomeName, ParentName, GenomeLength, ParentLength, BranchLength, \
                      Substitutions, Insertions, InsertionBases, Deletions, DeletionBases, \
                      Inversions, InversionBases, Duplications, DuplicationBases, \
                      Transpositions, TranspositionBases, GapInsertions, GapInsertionBases, \
                      GapDeletions, GapDeletionBases";
        writeln!(out, "{}", header)?;

        let mut rows: Vec<(String, String, MutationsStats)> = Vec::new();
        let mut queue = vec![root_id];
        while let Some(gid) = queue.pop() {
            let genome = aln.genome_by_id(gid);
            queue.extend_from_slice(genome.child_ids());
            let parent = match genome.parent_id() {
                Some(p) => aln.genome_by_id(p),
                None => continue,
            };
            if let Some(targets) = &target_set {
                if !targets.contains(genome.name()) {
                    continue;
                }
            }
            let mut stats = MutationsStats {
                genome_length: genome.sequence_length(),
                parent_length: parent.sequence_length(),
                branch_length: genome.branch_length(),
                ..Default::default()
            };
            self.count_substitutions(aln, gid, &mut stats)?;
            if !self.just_subs {
                self.count_rearrangements(aln, gid, &mut stats)?;
            }
            rows.push((genome.name().to_string(), parent.name().to_string(), stats));
        }

        let mut total = MutationsStats::default();
        for (name, parent, stats) in &rows {
            write!(out, "{}, {}, ", name, parent)?;
            stats.write_row(out)?;
            total += *stats;
        }
        write!(out, "Total, , ")?;
        total.write_row(out)?;
        total.divide(rows.len() as u64);
        write!(out, "Average, , ")?;
        total.write_row(out)?;
        Ok(())
    }

    /// Compare each aligned segment against its parent image base by base.
    fn count_substitutions(
        &self,
        aln: &Alignment,
        gid: usize,
        stats: &mut MutationsStats,
    ) -> Result<()> {
        let genome = aln.genome_by_id(gid);
        let mut it = TopIter::new(aln, gid, 0);
        while !it.at_end() {
            if it.has_parent()? {
                let child_bases = it.base_string()?;
                let parent_bases = BottomIter::to_parent(&it)?.base_string()?;
                if child_bases.len() != parent_bases.len() {
                    return Err(StrataError::Invariant(format!(
                        "genome '{}': top {} length differs from its parent image",
                        genome.name(),
                        it.array_index()
                    )));
                }
                let n_count = child_bases
                    .iter()
                    .filter(|c| c.eq_ignore_ascii_case(&b'n'))
                    .count();
                if (n_count as f64) <= self.max_n_fraction * child_bases.len() as f64 {
                    for (c, p) in child_bases.iter().zip(parent_bases.iter()) {
                        let c = c.to_ascii_uppercase();
                        let p = p.to_ascii_uppercase();
                        if c != b'N' && p != b'N' && c != p {
                            stats.substitutions += 1;
                        }
                    }
                }
            }
            it.to_right(None)?;
        }
        Ok(())
    }

    fn count_rearrangements(
        &self,
        aln: &Alignment,
        gid: usize,
        stats: &mut MutationsStats,
    ) -> Result<()> {
        let genome = aln.genome_by_id(gid);
        if genome.num_top_segments() == 0 {
            return Ok(());
        }
        let mut r = Rearrangement::new(aln, gid, 0, self.max_gap, false)?;
        loop {
            match r.kind() {
                RearrangementKind::Insertion => {
                    stats.insertions += 1;
                    stats.inserted_bases += r.length()?;
                }
                RearrangementKind::Deletion => {
                    if let Some((from, to)) = r.deleted_range() {
                        stats.deletions += 1;
                        stats.deleted_bases += (to - from + 1) as u64;
                    }
                }
                RearrangementKind::Inversion => {
                    stats.inversions += 1;
                    stats.inverted_bases += r.length()?;
                }
                RearrangementKind::Duplication => {
                    stats.duplications += 1;
                    if let Some((from, to)) = r.duplicated_range() {
                        stats.duplicated_bases += (to - from + 1) as u64;
                    }
                }
                RearrangementKind::Transposition => {
                    stats.transpositions += 1;
                    stats.transposed_bases += r.length()?;
                }
                RearrangementKind::Nothing | RearrangementKind::Other => {}
            }
            // small unaligned runs are gap insertions
            if r.kind() == RearrangementKind::Nothing {
                let len = r.length()?;
                if len < self.max_gap
                    && self.is_unaligned_run(aln, gid, r.left_breakpoint(), r.right_breakpoint())?
                {
                    stats.gap_insertions += 1;
                    stats.gap_inserted_bases += len;
                }
            }
            if !r.identify_next()? {
                break;
            }
        }

        // second pass: atomic classification exposes gap-scale deletions
        let mut r = Rearrangement::new(aln, gid, 0, 0, true)?;
        loop {
            if r.kind() == RearrangementKind::Deletion {
                if let Some((from, to)) = r.deleted_range() {
                    let len = (to - from + 1) as u64;
                    if len < self.max_gap {
                        stats.gap_deletions += 1;
                        stats.gap_deleted_bases += len;
                    }
                }
            }
            if !r.identify_next()? {
                break;
            }
        }
        Ok(())
    }

    fn is_unaligned_run(
        &self,
        aln: &Alignment,
        gid: usize,
        left: i64,
        right: i64,
    ) -> Result<bool> {
        let genome = aln.genome_by_id(gid);
        for i in left..=right {
            if genome.top_segment(i).has_parent()? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
