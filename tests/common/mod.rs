//! Shared test fixture: a five-genome alignment with duplications,
//! inversions and unaligned stretches on every branch.
//!
//! Tree: root -> (child1, leaf1); child1 -> (leaf2, leaf3). Each genome has
//! one sequence named "Sequence". The segment tables exercise paralogy
//! rings (child1 and leaf2), reversed alignments on most branches, and
//! unaligned segments on all levels.

use std::path::Path;

use strata_genomics::prelude::*;

pub fn setup_shared_alignment(dir: &Path) -> Alignment {
    let mut aln = Alignment::create(dir).unwrap();
    aln.add_root_genome("root").unwrap();
    aln.add_leaf_genome("child1", "root", 1.0).unwrap();
    aln.add_leaf_genome("leaf1", "root", 1.0).unwrap();
    aln.add_leaf_genome("leaf2", "child1", 1.0).unwrap();
    aln.add_leaf_genome("leaf3", "child1", 1.0).unwrap();

    aln.genome_mut("root")
        .unwrap()
        .set_dimensions(&[SequenceInfo::new("Sequence", 100, 0, 5)])
        .unwrap();
    aln.genome_mut("child1")
        .unwrap()
        .set_dimensions(&[SequenceInfo::new("Sequence", 100, 5, 7)])
        .unwrap();
    aln.genome_mut("leaf1")
        .unwrap()
        .set_dimensions(&[SequenceInfo::new("Sequence", 100, 5, 0)])
        .unwrap();
    aln.genome_mut("leaf2")
        .unwrap()
        .set_dimensions(&[SequenceInfo::new("Sequence", 70, 5, 0)])
        .unwrap();
    aln.genome_mut("leaf3")
        .unwrap()
        .set_dimensions(&[SequenceInfo::new("Sequence", 100, 6, 0)])
        .unwrap();

    let shared = b"CAAAAGCTGCCTCGGCGTAGCCAGGTGTAAGCTGGTATTGTTCTTGTGCATCTGGGCACCATTCTCTTGTTCGTAAATAGGCGACGCTGTCTTTTGGCCG";
    aln.genome("root").unwrap().set_dna(shared).unwrap();
    aln.genome("child1").unwrap().set_dna(shared).unwrap();
    aln.genome("leaf1").unwrap().set_dna(shared).unwrap();
    aln.genome("leaf2")
        .unwrap()
        .set_dna(b"ATGTGTATGCTTGGGTCAACTCTCTTTTCAGATCCGGGCGGTCGTCCGTAATTATGTGCCGAATCTCCAC")
        .unwrap();
    aln.genome("leaf3").unwrap().set_dna(shared).unwrap();

    // root bottoms; child slots are (child1, leaf1)
    let root = aln.genome("root").unwrap();
    let root_bottoms: [(i64, u64, (i64, bool), (i64, bool)); 5] = [
        (0, 20, (0, true), (0, true)),
        (20, 20, (NULL_INDEX, false), (2, true)),
        (40, 20, (2, false), (1, false)),
        (60, 20, (3, true), (NULL_INDEX, false)),
        (80, 20, (NULL_INDEX, false), (4, false)),
    ];
    for (i, (start, len, c0, c1)) in root_bottoms.iter().enumerate() {
        let mut spec = BottomSegmentSpec::new(*start, *len, 2);
        spec.children[0] = *c0;
        spec.children[1] = *c1;
        root.set_bottom_segment(i as i64, &spec).unwrap();
    }

    // child1 tops: one paralogy ring (t0 <-> t4) and one unaligned segment
    let child1 = aln.genome("child1").unwrap();
    let child1_tops: [(i64, u64, i64, bool, i64); 5] = [
        (0, 20, 0, true, 4),
        (20, 20, NULL_INDEX, false, NULL_INDEX),
        (40, 20, 2, false, NULL_INDEX),
        (60, 20, 3, true, NULL_INDEX),
        (80, 20, 0, false, 0),
    ];
    for (i, (start, len, parent, reversed, paralogy)) in child1_tops.iter().enumerate() {
        child1
            .set_top_segment(
                i as i64,
                &TopSegmentSpec {
                    start: *start,
                    length: *len,
                    parent: *parent,
                    parent_reversed: *reversed,
                    next_paralogy: *paralogy,
                    ..Default::default()
                },
            )
            .unwrap();
    }

    // child1 bottoms; child slots are (leaf2, leaf3)
    let child1_bottoms: [(i64, u64, (i64, bool), (i64, bool)); 7] = [
        (0, 20, (0, true), (NULL_INDEX, false)),
        (20, 10, (NULL_INDEX, false), (0, true)),
        (30, 5, (1, false), (NULL_INDEX, false)),
        (35, 15, (NULL_INDEX, false), (2, false)),
        (50, 20, (4, true), (1, true)),
        (70, 20, (3, false), (3, true)),
        (90, 10, (NULL_INDEX, false), (4, false)),
    ];
    for (i, (start, len, c0, c1)) in child1_bottoms.iter().enumerate() {
        let mut spec = BottomSegmentSpec::new(*start, *len, 2);
        spec.children[0] = *c0;
        spec.children[1] = *c1;
        child1.set_bottom_segment(i as i64, &spec).unwrap();
    }

    let leaf1 = aln.genome("leaf1").unwrap();
    let leaf1_tops: [(i64, u64, i64, bool); 5] = [
        (0, 20, 0, true),
        (20, 20, 2, false),
        (40, 20, 1, true),
        (60, 20, NULL_INDEX, false),
        (80, 20, 4, false),
    ];
    for (i, (start, len, parent, reversed)) in leaf1_tops.iter().enumerate() {
        leaf1
            .set_top_segment(
                i as i64,
                &TopSegmentSpec {
                    start: *start,
                    length: *len,
                    parent: *parent,
                    parent_reversed: *reversed,
                    ..Default::default()
                },
            )
            .unwrap();
    }

    // leaf2 tops: paralogy ring (t1 <-> t2) into child1 bottom 2
    let leaf2 = aln.genome("leaf2").unwrap();
    let leaf2_tops: [(i64, u64, i64, bool, i64); 5] = [
        (0, 20, 0, true, NULL_INDEX),
        (20, 5, 2, false, 2),
        (25, 5, 2, false, 1),
        (30, 20, 5, false, NULL_INDEX),
        (50, 20, 4, true, NULL_INDEX),
    ];
    for (i, (start, len, parent, reversed, paralogy)) in leaf2_tops.iter().enumerate() {
        leaf2
            .set_top_segment(
                i as i64,
                &TopSegmentSpec {
                    start: *start,
                    length: *len,
                    parent: *parent,
                    parent_reversed: *reversed,
                    next_paralogy: *paralogy,
                    ..Default::default()
                },
            )
            .unwrap();
    }

    let leaf3 = aln.genome("leaf3").unwrap();
    let leaf3_tops: [(i64, u64, i64, bool); 6] = [
        (0, 10, 1, true),
        (10, 20, 4, true),
        (30, 15, 3, false),
        (45, 20, 5, true),
        (65, 10, 6, false),
        (75, 25, NULL_INDEX, false),
    ];
    for (i, (start, len, parent, reversed)) in leaf3_tops.iter().enumerate() {
        leaf3
            .set_top_segment(
                i as i64,
                &TopSegmentSpec {
                    start: *start,
                    length: *len,
                    parent: *parent,
                    parent_reversed: *reversed,
                    ..Default::default()
                },
            )
            .unwrap();
    }

    for name in ["root", "child1", "leaf1", "leaf2", "leaf3"] {
        aln.genome(name).unwrap().fix_parse_info().unwrap();
    }
    aln
}
