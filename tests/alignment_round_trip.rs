//! Container write/read round trip and cross-checks between the column
//! iterator and the homology mapper over the shared fixture.

mod common;

use strata_genomics::prelude::*;
use strata_genomics::validate::validate_alignment;
use tempfile::tempdir;

#[test]
fn test_shared_fixture_is_valid() {
    let dir = tempdir().unwrap();
    let aln = common::setup_shared_alignment(dir.path());
    validate_alignment(&aln).unwrap();
}

#[test]
fn test_flush_and_reopen_preserves_everything() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("aln");
    let written_dna;
    {
        let aln = common::setup_shared_alignment(&path);
        written_dna = aln.genome("leaf2").unwrap().dna_substring(0, 70, false).unwrap();
        aln.flush().unwrap();
    }
    let aln = Alignment::open(&path).unwrap();
    assert_eq!(aln.num_genomes(), 5);
    validate_alignment(&aln).unwrap();

    let child1 = aln.genome("child1").unwrap();
    assert_eq!(child1.num_top_segments(), 5);
    assert_eq!(child1.num_bottom_segments(), 7);
    assert_eq!(child1.sequence_length(), 100);
    let seq = child1.sequence_by_name("Sequence").unwrap();
    assert_eq!(seq.length(), 100);
    assert_eq!(seq.num_bottom_segments(), 7);

    // segment fields survive
    let t0 = child1.top_segment(0);
    assert_eq!(t0.parent_index().unwrap(), 0);
    assert!(t0.parent_reversed().unwrap());
    assert_eq!(t0.next_paralogy_index().unwrap(), 4);
    assert_eq!(t0.paralogy_ring().unwrap(), vec![0, 4]);
    let b4 = child1.bottom_segment(4);
    assert_eq!(b4.child_index(0).unwrap(), 4);
    assert!(b4.child_reversed(1).unwrap());

    // DNA survives, nibble-packed
    let leaf2 = aln.genome("leaf2").unwrap();
    assert_eq!(leaf2.dna_substring(0, 70, false).unwrap(), written_dna);
    assert_eq!(leaf2.dna_base(0).unwrap(), b'A');

    // a loaded container refuses writes
    assert!(leaf2.set_dna_base(0, b'C').is_err());
}

#[test]
fn test_parse_links_cover_left_endpoints() {
    let dir = tempdir().unwrap();
    let aln = common::setup_shared_alignment(dir.path());
    let child1 = aln.genome("child1").unwrap();
    for i in 0..child1.num_top_segments() as i64 {
        let seg = child1.top_segment(i);
        let parse = seg.bottom_parse_index().unwrap();
        let bottom = child1.bottom_segment(parse);
        let start = seg.start_position().unwrap();
        assert!(start >= bottom.start_position().unwrap());
        assert!(start <= bottom.end_position().unwrap());
    }
}

/// Every position a column reports must be reachable by an independent
/// homology mapping from the reference base, and vice versa.
#[test]
fn test_column_agrees_with_mapped_segments() {
    let dir = tempdir().unwrap();
    let aln = common::setup_shared_alignment(dir.path());
    let leaf2 = aln.genome_id("leaf2").unwrap();
    let leaf3 = aln.genome_id("leaf3").unwrap();

    let opts = ColumnOptions {
        targets: Some(vec![leaf3]),
        ..Default::default()
    };
    let mut col = ColumnIter::new(&aln, leaf2, 30, 59, opts).unwrap();
    loop {
        let pos = col.reference_position();
        let expected: Vec<i64> = {
            let mut frags = strata_genomics::mapped_segments(
                &aln,
                SegmentSlice::new(leaf2, pos, 1),
                leaf3,
                true,
                None,
            )
            .unwrap();
            frags.sort_by_key(|f| f.target.start);
            frags.iter().map(|f| f.target.start).collect()
        };
        let mut got: Vec<i64> = col
            .column()
            .entries()
            .iter()
            .filter(|e| e.genome == leaf3)
            .flat_map(|e| e.positions.iter().map(|&(p, _)| p))
            .collect();
        got.sort_unstable();
        assert_eq!(got, expected, "column at leaf2 position {}", pos);
        if col.last_column() {
            break;
        }
        col.to_right().unwrap();
    }
}

#[test]
fn test_mutation_summary_over_fixture() {
    use strata_genomics::commands::MutationsCommand;

    let dir = tempdir().unwrap();
    let aln = common::setup_shared_alignment(dir.path());
    let mut out = Vec::new();
    MutationsCommand::new().run(&aln, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    // header, one row per non-root genome, Total and Average
    assert_eq!(lines.len(), 1 + 4 + 2);
    assert!(lines[0].starts_with("GenomeName, ParentName"));
    assert!(text.contains("\nTotal, , "));
    assert!(text.contains("\nAverage, , "));
    for name in ["child1", "leaf1", "leaf2", "leaf3"] {
        assert!(text.contains(&format!("{}, ", name)), "row for {}", name);
    }
}

#[test]
fn test_rearrangement_scan_over_fixture() {
    let dir = tempdir().unwrap();
    let aln = common::setup_shared_alignment(dir.path());
    let leaf3 = aln.genome_id("leaf3").unwrap();
    // just verify the scan terminates and visits every breakpoint
    let mut r = Rearrangement::new(&aln, leaf3, 0, 5, false).unwrap();
    let mut breakpoints = vec![r.left_breakpoint()];
    while r.identify_next().unwrap() {
        breakpoints.push(r.left_breakpoint());
    }
    assert_eq!(*breakpoints.last().unwrap(), 5);
}
