//! Level-of-detail build: coverage, invariants, and idempotence.

use std::path::Path;

use strata_genomics::lod::{interpolate_alignment, LodParams};
use strata_genomics::prelude::*;
use strata_genomics::validate::validate_alignment;
use tempfile::tempdir;

/// Three-level identity alignment: root -> mid -> (leaf1, leaf2), one
/// 100-base sequence each, ten aligned segments per branch.
fn three_level_identity(dir: &Path) -> Alignment {
    let mut aln = Alignment::create(dir).unwrap();
    aln.add_root_genome("root").unwrap();
    aln.add_leaf_genome("mid", "root", 1.0).unwrap();
    aln.add_leaf_genome("leaf1", "mid", 1.0).unwrap();
    aln.add_leaf_genome("leaf2", "mid", 1.0).unwrap();

    aln.genome_mut("root")
        .unwrap()
        .set_dimensions(&[SequenceInfo::new("chr", 100, 0, 10)])
        .unwrap();
    aln.genome_mut("mid")
        .unwrap()
        .set_dimensions(&[SequenceInfo::new("chr", 100, 10, 10)])
        .unwrap();
    for leaf in ["leaf1", "leaf2"] {
        aln.genome_mut(leaf)
            .unwrap()
            .set_dimensions(&[SequenceInfo::new("chr", 100, 10, 0)])
            .unwrap();
    }

    let bases: Vec<u8> = b"ACGTACGTAG".iter().copied().cycle().take(100).collect();
    for name in ["root", "mid", "leaf1", "leaf2"] {
        aln.genome(name).unwrap().set_dna(&bases).unwrap();
    }

    let root = aln.genome("root").unwrap();
    for i in 0..10i64 {
        let mut spec = BottomSegmentSpec::new(i * 10, 10, 1);
        spec.children[0] = (i, false);
        root.set_bottom_segment(i, &spec).unwrap();
    }
    let mid = aln.genome("mid").unwrap();
    for i in 0..10i64 {
        mid.set_top_segment(
            i,
            &TopSegmentSpec {
                start: i * 10,
                length: 10,
                parent: i,
                ..Default::default()
            },
        )
        .unwrap();
        let mut spec = BottomSegmentSpec::new(i * 10, 10, 2);
        spec.children[0] = (i, false);
        spec.children[1] = (i, false);
        mid.set_bottom_segment(i, &spec).unwrap();
    }
    for leaf in ["leaf1", "leaf2"] {
        let genome = aln.genome(leaf).unwrap();
        for i in 0..10i64 {
            genome
                .set_top_segment(
                    i,
                    &TopSegmentSpec {
                        start: i * 10,
                        length: 10,
                        parent: i,
                        ..Default::default()
                    },
                )
                .unwrap();
        }
    }
    for name in ["root", "mid", "leaf1", "leaf2"] {
        aln.genome(name).unwrap().fix_parse_info().unwrap();
    }
    aln
}

fn params(scale: f64) -> LodParams {
    LodParams {
        scale,
        keep_sequences: true,
        ..Default::default()
    }
}

/// Structural fingerprint of a genome's segment tables.
fn fingerprint(aln: &Alignment, name: &str) -> Vec<(i64, u64, i64, bool, i64)> {
    let genome = aln.genome(name).unwrap();
    let mut rows = Vec::new();
    for i in 0..genome.num_top_segments() as i64 {
        let seg = genome.top_segment(i);
        rows.push((
            seg.start_position().unwrap(),
            seg.length().unwrap(),
            seg.parent_index().unwrap(),
            seg.parent_reversed().unwrap(),
            seg.next_paralogy_index().unwrap(),
        ));
    }
    for i in 0..genome.num_bottom_segments() as i64 {
        let seg = genome.bottom_segment(i);
        rows.push((
            seg.start_position().unwrap(),
            seg.length().unwrap(),
            seg.top_parse_index().unwrap(),
            false,
            seg.child_index(0).unwrap(),
        ));
    }
    rows
}

#[test]
fn test_input_fixture_is_valid() {
    let dir = tempdir().unwrap();
    let aln = three_level_identity(&dir.path().join("in"));
    validate_alignment(&aln).unwrap();
}

#[test]
fn test_build_produces_valid_coarser_level() {
    let dir = tempdir().unwrap();
    let aln = three_level_identity(&dir.path().join("in"));
    let out = interpolate_alignment(&aln, dir.path().join("out"), &params(2.0)).unwrap();

    // whole tree replicated
    assert_eq!(out.num_genomes(), 4);
    assert_eq!(out.newick().unwrap(), aln.newick().unwrap());

    // every invariant of the storage model holds, including parse links on
    // the internal node and full segment coverage
    validate_alignment(&out).unwrap();

    // coarser than the input
    let mid = out.genome("mid").unwrap();
    assert!(mid.num_top_segments() > 0);
    assert!(mid.num_top_segments() < 10);
    assert_eq!(mid.sequence_length(), 100);

    // DNA came across at every level, including the internal node
    let bases: Vec<u8> = b"ACGTACGTAG".iter().copied().cycle().take(100).collect();
    for name in ["root", "mid", "leaf1", "leaf2"] {
        assert_eq!(
            out.genome(name).unwrap().dna_substring(0, 100, false).unwrap(),
            bases,
            "genome {}",
            name
        );
    }
}

#[test]
fn test_rebuild_is_idempotent() {
    let dir = tempdir().unwrap();
    let aln = three_level_identity(&dir.path().join("in"));
    let out1 = interpolate_alignment(&aln, dir.path().join("out1"), &params(2.0)).unwrap();
    let out2 = interpolate_alignment(&aln, dir.path().join("out2"), &params(2.0)).unwrap();
    for name in ["root", "mid", "leaf1", "leaf2"] {
        assert_eq!(
            fingerprint(&out1, name),
            fingerprint(&out2, name),
            "genome {}",
            name
        );
    }
}

#[test]
fn test_step_changes_granularity_not_coverage() {
    let dir = tempdir().unwrap();
    let aln = three_level_identity(&dir.path().join("in"));
    let fine = interpolate_alignment(&aln, dir.path().join("fine"), &params(2.0)).unwrap();
    let coarse = interpolate_alignment(&aln, dir.path().join("coarse"), &params(4.0)).unwrap();
    validate_alignment(&fine).unwrap();
    validate_alignment(&coarse).unwrap();
    assert!(
        coarse.genome("mid").unwrap().num_top_segments()
            <= fine.genome("mid").unwrap().num_top_segments()
    );
}

#[test]
fn test_columns_survive_coarsening() {
    let dir = tempdir().unwrap();
    let aln = three_level_identity(&dir.path().join("in"));
    let out = interpolate_alignment(&aln, dir.path().join("out"), &params(2.0)).unwrap();
    let leaf1 = out.genome_id("leaf1").unwrap();
    let leaf2 = out.genome_id("leaf2").unwrap();
    // identity alignment: every leaf1 base still lines up with the same
    // position of leaf2 after coarsening
    let mut col = ColumnIter::new(&out, leaf1, 0, 99, ColumnOptions::default()).unwrap();
    loop {
        let pos = col.reference_position();
        let entry = col
            .column()
            .entries()
            .iter()
            .find(|e| e.genome == leaf2)
            .expect("leaf2 missing from column");
        assert_eq!(entry.positions, vec![(pos, false)]);
        if col.last_column() {
            break;
        }
        col.to_right().unwrap();
    }
}
