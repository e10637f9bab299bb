//! Structural invariant checks over a stored alignment.
//!
//! Every check surfaces `Invariant` with enough context to locate the bad
//! record. The full battery is what the `validate` tool runs per genome;
//! individual checks are exposed for tests.

use crate::alignment::Alignment;
use crate::error::{Result, StrataError};
use crate::genome::Genome;
use crate::segment::NULL_INDEX;

fn fail(genome: &Genome, what: impl std::fmt::Display) -> StrataError {
    StrataError::Invariant(format!("genome '{}': {}", genome.name(), what))
}

/// Sequences tile the genome without overlap and own the declared segment
/// ranges.
pub fn check_sequence_tiling(aln: &Alignment, gid: usize) -> Result<()> {
    let genome = aln.genome_by_id(gid);
    let mut expected_start: i64 = 0;
    let mut expected_top: i64 = 0;
    let mut expected_bottom: i64 = 0;
    for seq in genome.sequences() {
        if seq.start_position() != expected_start {
            return Err(fail(
                genome,
                format!(
                    "sequence '{}' starts at {} instead of {}",
                    seq.name(),
                    seq.start_position(),
                    expected_start
                ),
            ));
        }
        if seq.num_top_segments() > 0 && seq.top_segment_array_index() != expected_top {
            return Err(fail(
                genome,
                format!("sequence '{}' top index out of order", seq.name()),
            ));
        }
        if seq.num_bottom_segments() > 0 && seq.bottom_segment_array_index() != expected_bottom {
            return Err(fail(
                genome,
                format!("sequence '{}' bottom index out of order", seq.name()),
            ));
        }
        expected_start += seq.length() as i64;
        expected_top += seq.num_top_segments() as i64;
        expected_bottom += seq.num_bottom_segments() as i64;
    }
    if expected_start as u64 != genome.sequence_length() {
        return Err(fail(genome, "sequence lengths do not sum to genome length"));
    }
    if expected_top as u64 != genome.num_top_segments()
        || expected_bottom as u64 != genome.num_bottom_segments()
    {
        return Err(fail(genome, "per-sequence segment counts do not sum"));
    }
    Ok(())
}

/// Segment arrays are contiguous with positive lengths, and each
/// sequence's segments stay inside its base range.
pub fn check_segment_coverage(aln: &Alignment, gid: usize) -> Result<()> {
    let genome = aln.genome_by_id(gid);
    for (top, count) in [
        (true, genome.num_top_segments()),
        (false, genome.num_bottom_segments()),
    ] {
        let side = if top { "top" } else { "bottom" };
        let mut expected: i64 = 0;
        for i in 0..count as i64 {
            let (start, len) = if top {
                let s = genome.top_segment(i);
                (s.start_position()?, s.length()?)
            } else {
                let s = genome.bottom_segment(i);
                (s.start_position()?, s.length()?)
            };
            if start != expected {
                return Err(fail(
                    genome,
                    format!("{} segment {} starts at {} instead of {}", side, i, start, expected),
                ));
            }
            if len == 0 {
                return Err(fail(genome, format!("{} segment {} has zero length", side, i)));
            }
            let seq = genome.sequence_by_site(start)?;
            if start + len as i64 - 1 > seq.end_position() {
                return Err(fail(
                    genome,
                    format!("{} segment {} crosses a sequence boundary", side, i),
                ));
            }
            expected = start + len as i64;
        }
        if count > 0 && expected as u64 != genome.sequence_length() {
            return Err(fail(genome, format!("{} segments do not cover the genome", side)));
        }
    }
    Ok(())
}

/// Parent pointers, child back-pointers, equal aligned lengths, and
/// paralogy ring consistency.
pub fn check_homology_links(aln: &Alignment, gid: usize) -> Result<()> {
    let genome = aln.genome_by_id(gid);
    let parent = match genome.parent_id() {
        Some(p) => aln.genome_by_id(p),
        None => {
            if genome.num_top_segments() > 0 {
                return Err(fail(genome, "root genome carries top segments"));
            }
            return Ok(());
        }
    };
    let slot = aln.child_slot(parent.id(), gid)?;
    for i in 0..genome.num_top_segments() as i64 {
        let seg = genome.top_segment(i);
        let parent_index = seg.parent_index()?;
        if parent_index == NULL_INDEX {
            if seg.has_next_paralogy()? {
                return Err(fail(genome, format!("unaligned top {} on a paralogy ring", i)));
            }
            continue;
        }
        if parent_index as u64 >= parent.num_bottom_segments() {
            return Err(fail(genome, format!("top {} parent index out of range", i)));
        }
        let bottom = parent.bottom_segment(parent_index);
        if bottom.length()? != seg.length()? {
            return Err(fail(
                genome,
                format!("top {} length differs from its parent's", i),
            ));
        }
        let ring = seg.paralogy_ring()?;
        for &member in &ring {
            let m = genome.top_segment(member);
            if m.next_paralogy_index()? == member {
                return Err(fail(genome, format!("top {} paralogy self-loop", member)));
            }
            if m.parent_index()? != parent_index {
                return Err(fail(
                    genome,
                    format!("paralogy ring of top {} spans multiple parents", i),
                ));
            }
        }
        let back = bottom.child_index(slot)?;
        if !ring.contains(&back) {
            return Err(fail(
                genome,
                format!("top {}: parent child-pointer {} not on its ring", i, back),
            ));
        }
    }

    for i in 0..genome.num_bottom_segments() as i64 {
        let bottom = genome.bottom_segment(i);
        for (child_slot, &child) in genome.child_ids().iter().enumerate() {
            let child_index = bottom.child_index(child_slot)?;
            if child_index == NULL_INDEX {
                continue;
            }
            let child_genome = aln.genome_by_id(child);
            if child_index as u64 >= child_genome.num_top_segments() {
                return Err(fail(
                    genome,
                    format!("bottom {} child index out of range", i),
                ));
            }
            let top = child_genome.top_segment(child_index);
            if top.parent_index()? != i {
                return Err(fail(
                    genome,
                    format!("bottom {}: child {} does not point back", i, child_index),
                ));
            }
            if top.parent_reversed()? != bottom.child_reversed(child_slot)? {
                return Err(fail(
                    genome,
                    format!("bottom {}: strand flags disagree with child {}", i, child_index),
                ));
            }
        }
    }
    Ok(())
}

/// Top/bottom parse indices cross-reference the counterpart covering the
/// left endpoint.
pub fn check_parse_links(aln: &Alignment, gid: usize) -> Result<()> {
    let genome = aln.genome_by_id(gid);
    if genome.num_top_segments() == 0 || genome.num_bottom_segments() == 0 {
        return Ok(());
    }
    for i in 0..genome.num_top_segments() as i64 {
        let seg = genome.top_segment(i);
        let parse = seg.bottom_parse_index()?;
        if parse == NULL_INDEX {
            return Err(fail(genome, format!("top {} missing parse link", i)));
        }
        let bottom = genome.bottom_segment(parse);
        let start = seg.start_position()?;
        if start < bottom.start_position()? || start > bottom.end_position()? {
            return Err(fail(
                genome,
                format!("top {} parse link does not cover its start", i),
            ));
        }
    }
    for i in 0..genome.num_bottom_segments() as i64 {
        let seg = genome.bottom_segment(i);
        let parse = seg.top_parse_index()?;
        if parse == NULL_INDEX {
            return Err(fail(genome, format!("bottom {} missing parse link", i)));
        }
        let top = genome.top_segment(parse);
        let start = seg.start_position()?;
        if start < top.start_position()? || start > top.end_position()? {
            return Err(fail(
                genome,
                format!("bottom {} parse link does not cover its start", i),
            ));
        }
    }
    Ok(())
}

/// The packed DNA dataset matches the declared genome length.
pub fn check_dna(aln: &Alignment, gid: usize) -> Result<()> {
    let genome = aln.genome_by_id(gid);
    let expected = (genome.sequence_length() + 1) / 2;
    let actual = genome.with_dna(|a| Ok(a.len()))?;
    if actual != expected {
        return Err(fail(
            genome,
            format!("DNA array holds {} bytes, expected {}", actual, expected),
        ));
    }
    Ok(())
}

/// Run the whole battery on one genome.
pub fn validate_genome(aln: &Alignment, gid: usize) -> Result<()> {
    check_sequence_tiling(aln, gid)?;
    check_segment_coverage(aln, gid)?;
    check_homology_links(aln, gid)?;
    check_parse_links(aln, gid)?;
    check_dna(aln, gid)
}

/// Validate every genome of an alignment with one shared handle.
pub fn validate_alignment(aln: &Alignment) -> Result<()> {
    for id in 0..aln.num_genomes() {
        validate_genome(aln, id)?;
    }
    Ok(())
}
