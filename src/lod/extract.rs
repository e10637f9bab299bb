//! Writeback of a level-of-detail graph as a new alignment.
//!
//! Conversion walks the tree breadth-first; every internal node is the
//! parent of one graph build whose blocks become that node's bottom
//! segments and its children's top segments. The new container carries the
//! same tree and global coordinates as the source.

use rustc_hash::FxHashMap;

use crate::alignment::Alignment;
use crate::error::{Result, StrataError};
use crate::segment::NULL_INDEX;
use crate::sequence::SequenceInfo;

use super::graph::LodGraph;
use super::segment::SegId;

/// Options for one interpolation run.
#[derive(Debug, Clone)]
pub struct LodParams {
    /// Step = scale x the mean block size of the genomes being converted.
    pub scale: f64,
    /// Convert only the subtree rooted here (whole tree when `None`).
    pub root: Option<String>,
    /// Copy DNA into the output container.
    pub keep_sequences: bool,
    /// Sample every sequence, even ones shorter than the step fraction.
    pub all_sequences: bool,
    /// Fraction of each probe window actually probed.
    pub probe_frac: f64,
    /// Sequences shorter than this fraction of the step are skipped.
    pub min_seq_frac: f64,
}

impl Default for LodParams {
    fn default() -> Self {
        Self {
            scale: 10.0,
            root: None,
            keep_sequences: false,
            all_sequences: false,
            probe_frac: 0.035,
            min_seq_frac: 0.5,
        }
    }
}

/// Build a coarsened copy of `input` at `out_path`.
pub fn interpolate_alignment<P: AsRef<std::path::Path>>(
    input: &Alignment,
    out_path: P,
    params: &LodParams,
) -> Result<Alignment> {
    let root_id = match &params.root {
        Some(name) => input.genome_id(name)?,
        None => input.root()?.id(),
    };

    let mut out = Alignment::create(out_path)?;
    out.add_root_genome(input.genome_by_id(root_id).name())?;
    let mut queue = vec![root_id];
    let mut cursor = 0;
    while cursor < queue.len() {
        let node = queue[cursor];
        cursor += 1;
        let genome = input.genome_by_id(node);
        for &child in genome.child_ids() {
            let child_genome = input.genome_by_id(child);
            out.add_leaf_genome(
                child_genome.name(),
                genome.name(),
                child_genome.branch_length(),
            )?;
            queue.push(child);
        }
    }

    for &node in &queue {
        if !input.genome_by_id(node).is_leaf() {
            convert_internal_node(input, &mut out, node, params)?;
        }
    }
    out.flush()?;
    Ok(out)
}

/// The interpolation step for one conversion: scale times the smallest
/// mean block length among the involved genomes.
fn min_avg_block_size(input: &Alignment, parent: usize, children: &[usize]) -> Result<u64> {
    let mut min_avg = u64::MAX;
    let pg = input.genome_by_id(parent);
    if pg.sequence_length() > 0 && pg.num_bottom_segments() > 0 {
        min_avg = min_avg.min(pg.sequence_length() / pg.num_bottom_segments());
    }
    for &child in children {
        let cg = input.genome_by_id(child);
        if cg.sequence_length() > 0 && cg.num_top_segments() > 0 {
            min_avg = min_avg.min(cg.sequence_length() / cg.num_top_segments());
        }
    }
    if min_avg == u64::MAX {
        return Err(StrataError::InvalidArgument(format!(
            "genome '{}' has no segments to interpolate",
            pg.name()
        )));
    }
    Ok(min_avg.max(1))
}

fn convert_internal_node(
    input: &Alignment,
    out: &mut Alignment,
    parent: usize,
    params: &LodParams,
) -> Result<()> {
    let children: Vec<usize> = input.genome_by_id(parent).child_ids().to_vec();
    let step = ((params.scale * min_avg_block_size(input, parent, &children)? as f64) as u64).max(1);
    let mut graph = LodGraph::build(
        input,
        parent,
        &children,
        None,
        step,
        params.all_sequences,
        params.probe_frac,
        params.min_seq_frac,
    )?;
    let counts = graph.segment_counts(input);

    write_dimensions(input, out, parent, &children, &counts)?;
    if params.keep_sequences {
        write_sequences(input, out, parent, &children)?;
    }
    write_segments(input, out, parent, &mut graph)?;
    write_homologies(input, out, parent, &graph)?;
    out.genome(input.genome_by_id(parent).name())?.fix_parse_info()
}

fn write_dimensions(
    input: &Alignment,
    out: &mut Alignment,
    parent: usize,
    children: &[usize],
    counts: &FxHashMap<(usize, usize), u64>,
) -> Result<()> {
    let mut order: Vec<usize> = children.to_vec();
    order.push(parent);
    for gid in order {
        let in_genome = input.genome_by_id(gid);
        let mut infos = Vec::new();
        for seq in in_genome.sequences() {
            if let Some(&n) = counts.get(&(gid, seq.index())) {
                let (ntop, nbot) = if gid == parent { (0, n) } else { (n, 0) };
                infos.push(SequenceInfo::new(seq.name(), seq.length(), ntop, nbot));
            }
        }
        let out_genome = out.genome_mut(in_genome.name())?;
        if gid == parent && !out_genome.is_root() {
            // written earlier as a child of its own conversion pass; only
            // the bottom dimensions are new
            let updates: Vec<(String, u64)> = infos
                .iter()
                .map(|i| (i.name.clone(), i.num_bottom_segments))
                .collect();
            out_genome.update_bottom_dimensions(&updates)?;
        } else {
            out_genome.set_dimensions(&infos)?;
        }
    }
    Ok(())
}

fn write_sequences(
    input: &Alignment,
    out: &Alignment,
    parent: usize,
    children: &[usize],
) -> Result<()> {
    let mut order: Vec<usize> = children.to_vec();
    order.push(parent);
    for gid in order {
        let in_genome = input.genome_by_id(gid);
        let out_genome = out.genome(in_genome.name())?;
        // the pass parent and leaf children get DNA here; an internal child
        // is covered by the pass that converts it as a parent
        if gid != parent && !out_genome.is_leaf() {
            continue;
        }
        for seq in in_genome.sequences() {
            if seq.is_empty() {
                continue;
            }
            if let Ok(out_seq) = out_genome.sequence_by_name(seq.name()) {
                let bases = in_genome.sequence_dna(seq.index())?;
                out_genome.set_sequence_dna(out_seq.index(), &bases)?;
            }
        }
    }
    Ok(())
}

/// Turn the graph's live segments into coordinate records, remembering
/// each segment's output array slot for the homology pass.
fn write_segments(
    input: &Alignment,
    out: &Alignment,
    parent: usize,
    graph: &mut LodGraph,
) -> Result<()> {
    let live = graph.live_segments_by_sequence();
    let genome_ids = graph.genomes.clone();
    for &gid in &genome_ids {
        let in_genome = input.genome_by_id(gid);
        let out_genome = out.genome(in_genome.name())?;
        let is_top = gid != parent;
        for in_seq in in_genome.sequences() {
            let out_seq = match out_genome.sequence_by_name(in_seq.name()) {
                Ok(s) => s,
                Err(_) => continue,
            };
            let base = if is_top {
                out_seq.top_segment_array_index()
            } else {
                out_seq.bottom_segment_array_index()
            };
            let ids = match live.get(&(gid, in_seq.index())) {
                Some(ids) => ids,
                None => continue,
            };
            if ids.is_empty() {
                if !out_seq.is_empty() {
                    // unsampled sequence: one segment covering everything,
                    // all pointers already null
                    if is_top {
                        out_genome.set_top_coordinates(
                            base,
                            out_seq.start_position(),
                            out_seq.length(),
                        )?;
                    } else {
                        out_genome.set_bottom_coordinates(
                            base,
                            out_seq.start_position(),
                            out_seq.length(),
                        )?;
                    }
                }
                continue;
            }
            for (k, &id) in ids.iter().enumerate() {
                let seg = &graph.arena[id];
                let index = base + k as i64;
                if is_top {
                    out_genome.set_top_coordinates(index, seg.left_pos(), seg.length())?;
                } else {
                    out_genome.set_bottom_coordinates(index, seg.left_pos(), seg.length())?;
                }
                graph.arena[id].array_index = index;
            }
        }
    }
    Ok(())
}

/// Wire each block's parent/child/paralogy pointers: the first parent
/// segment anchors the block, child copies ring together in position
/// order.
fn write_homologies(
    input: &Alignment,
    out: &Alignment,
    parent: usize,
    graph: &LodGraph,
) -> Result<()> {
    let out_parent = out.genome(input.genome_by_id(parent).name())?;
    for block in &graph.blocks {
        if block.is_empty() {
            continue;
        }
        let mut by_genome: FxHashMap<usize, Vec<SegId>> = FxHashMap::default();
        for &id in block {
            if !graph.arena[id].dead {
                by_genome.entry(graph.arena[id].seq.0).or_default().push(id);
            }
        }
        for ids in by_genome.values_mut() {
            ids.sort_by_key(|&id| (graph.arena[id].seq.1, graph.arena[id].left_pos()));
        }

        let root_seg: Option<SegId> = by_genome.get(&parent).map(|segs| segs[0]);
        if let Some(parent_segs) = by_genome.get(&parent) {
            for &id in parent_segs {
                let index = graph.arena[id].array_index;
                for slot in 0..out_parent.num_children() {
                    out_parent.set_bottom_child(index, slot, NULL_INDEX, false)?;
                }
                out_parent.set_bottom_parse(index, NULL_INDEX)?;
            }
        }

        for (&gid, segs) in by_genome.iter() {
            if gid == parent {
                continue;
            }
            let in_child = input.genome_by_id(gid);
            let out_child = out.genome(in_child.name())?;
            let slot = out.child_slot(out_parent.id(), out_child.id())?;
            for (k, &id) in segs.iter().enumerate() {
                let index = graph.arena[id].array_index;
                out_child.set_top_parse(index, NULL_INDEX)?;
                match root_seg {
                    Some(rs) => {
                        let reversed =
                            graph.arena[id].flipped() != graph.arena[rs].flipped();
                        out_child.set_top_parent(
                            index,
                            graph.arena[rs].array_index,
                            reversed,
                        )?;
                        if k == 0 {
                            out_parent.set_bottom_child(
                                graph.arena[rs].array_index,
                                slot,
                                index,
                                reversed,
                            )?;
                        }
                    }
                    None => out_child.set_top_parent(index, NULL_INDEX, false)?,
                }
                let next = segs[(k + 1) % segs.len()];
                if next == id {
                    out_child.set_top_paralogy(index, NULL_INDEX)?;
                } else {
                    out_child.set_top_paralogy(index, graph.arena[next].array_index)?;
                }
            }
        }
    }
    Ok(())
}
