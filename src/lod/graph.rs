//! Level-of-detail segment graph: sampling and optimization.
//!
//! The build walks every sequence of the chosen genome subset, sampling
//! roughly every `step` bases. Each accepted homology column becomes one
//! block of single-base segments; per-sequence neighbours are chained with
//! head/tail adjacencies, bracketed by telomere sentinels just outside each
//! sequence. Three optimization passes then make the graph gap-free:
//! extension grows blocks into their adjacencies, merging fuses blocks that
//! sit head-to-tail with zero gap, and insertion fills every remaining
//! adjacency with new blocks until all adjacency lengths are zero.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::alignment::Alignment;
use crate::column::{ColumnIter, ColumnOptions};
use crate::error::{Result, StrataError};

use super::segment::{
    add_edge_right_to_left, head_adj_len, head_to_tail, insert_new_head_adj, insert_new_tail_adj,
    merge_head, tail_adj_len, tail_to_head, LodSegment, SegId, TELOMERE_BLOCK,
};

type SeqKey = (usize, usize);

pub struct LodGraph {
    pub(crate) arena: Vec<LodSegment>,
    pub(crate) blocks: Vec<Vec<SegId>>,
    pub(crate) telomeres: Vec<SegId>,
    /// Per-sequence left-position index; positions are stable during
    /// sampling (all segments are single bases until extension).
    seq_map: FxHashMap<SeqKey, BTreeMap<i64, SegId>>,
    pub(crate) genomes: Vec<usize>,
    parent: usize,
    step: u64,
    all_sequences: bool,
    probe_frac: f64,
    min_seq_len: u64,
}

impl LodGraph {
    /// Sample and optimize a graph over `parent`, its `children`, and an
    /// optional `grandparent` (sampled for column quality, ignored at
    /// writeback).
    pub fn build(
        aln: &Alignment,
        parent: usize,
        children: &[usize],
        grandparent: Option<usize>,
        step: u64,
        all_sequences: bool,
        probe_frac: f64,
        min_seq_frac: f64,
    ) -> Result<Self> {
        if step == 0 {
            return Err(StrataError::InvalidArgument(
                "interpolation step must be positive".to_string(),
            ));
        }
        let mut genomes = vec![parent];
        genomes.extend_from_slice(children);
        if let Some(gp) = grandparent {
            genomes.push(gp);
        }
        let mut graph = Self {
            arena: Vec::new(),
            blocks: Vec::new(),
            telomeres: Vec::new(),
            seq_map: FxHashMap::default(),
            genomes,
            parent,
            step,
            all_sequences,
            probe_frac,
            min_seq_len: (min_seq_frac * step as f64) as u64,
        };
        for gid in graph.genomes.clone() {
            graph.scan_genome(aln, gid)?;
        }
        graph.compute_adjacencies();
        graph.optimize_by_extension();
        graph.optimize_by_merging();
        graph.optimize_by_insertion();
        graph.check_coverage(aln)?;
        Ok(graph)
    }

    // ------------------------------------------------------------------
    // sampling

    fn scan_genome(&mut self, aln: &Alignment, gid: usize) -> Result<()> {
        let genome = aln.genome_by_id(gid);
        let half_step = (self.step / 2).max(1) as i64;
        let mut last_sampled: i64 = 0;
        for seq_idx in 0..genome.num_sequences() {
            let seq = genome.sequence(seq_idx);
            let len = seq.length() as i64;
            self.add_telomeres(gid, seq_idx, seq.start_position(), seq.end_position());
            if len == 0 {
                continue;
            }
            let seq_end = seq.start_position() + len;
            if !(self.all_sequences
                || (seq.length() > self.min_seq_len
                    && seq_end - last_sampled > self.step as i64))
            {
                continue;
            }
            let mut col = ColumnIter::new(
                aln,
                gid,
                seq.start_position(),
                seq.end_position(),
                ColumnOptions {
                    targets: Some(self.genomes.clone()),
                    ..Default::default()
                },
            )?;
            let mut pos: i64 = 0;
            while pos < len {
                // clamp the final sample to the last base
                if pos > 0 && pos + self.step as i64 >= len {
                    pos = len - 1;
                }
                let min_try = (pos - half_step).max(0);
                let max_try = (pos + half_step).min(len - 1);
                let window = (max_try - min_try) as f64;
                let reduced = self.probe_frac * (window / seq.length() as f64);
                let num_probe = ((window * reduced) as i64).max(1);
                let np_minus_1 = if num_probe < 2 { num_probe } else { num_probe - 1 };
                let probe_step = ((max_try - min_try) / np_minus_1).max(1);

                let mut best_pos: Option<i64> = None;
                let mut max_num_genomes: u64 = 1;
                let mut max_delta: u64 = 0;
                let mut max_min_seq_len: u64 = 0;
                let mut try_pos = if num_probe == 1 { pos } else { min_try };
                loop {
                    col.to_site(seq.start_position() + try_pos, seq.end_position())?;
                    let (delta, num_genomes, min_seq_len) = self.evaluate_column(aln, &col)?;
                    if Self::better_column(
                        probe_step as u64,
                        delta,
                        num_genomes,
                        min_seq_len,
                        max_delta,
                        max_num_genomes,
                        max_min_seq_len,
                    ) {
                        best_pos = Some(try_pos);
                        max_delta = delta;
                        max_num_genomes = num_genomes;
                        max_min_seq_len = min_seq_len;
                    }
                    try_pos += probe_step;
                    if col.last_column() || try_pos >= max_try {
                        break;
                    }
                }

                if let Some(best) = best_pos {
                    col.to_site(seq.start_position() + best, seq.end_position())?;
                    self.create_column(aln, &col);
                    last_sampled = seq.start_position() + best;
                }
                pos += self.step as i64;
            }
        }
        Ok(())
    }

    /// Score a candidate column: distance to already-sampled neighbours,
    /// number of distinct genomes, and shortest involved sequence. A column
    /// touching a disappeared parent contig or an already-sampled position
    /// scores zero.
    fn evaluate_column(&self, aln: &Alignment, col: &ColumnIter) -> Result<(u64, u64, u64)> {
        let mut delta_max: u64 = 0;
        let mut min_seq_len = u64::MAX;
        let mut genomes = rustc_hash::FxHashSet::default();
        for entry in col.column().entries() {
            let genome = aln.genome_by_id(entry.genome);
            let seq = genome.sequence(entry.sequence);
            if seq.length() <= self.min_seq_len {
                if entry.genome == self.parent {
                    // never align two leaves through a vanishing parent contig
                    return Ok((0, 0, 0));
                }
                continue;
            }
            min_seq_len = min_seq_len.min(seq.length());
            if !entry.positions.is_empty() {
                genomes.insert(entry.genome);
            }
            if let Some(set) = self.seq_map.get(&(entry.genome, entry.sequence)) {
                for &(pos, _) in &entry.positions {
                    if set.contains_key(&pos) {
                        return Ok((0, genomes.len() as u64, 0));
                    }
                    let right = set.range(pos + 1..).next().map(|(&p, _)| p);
                    let left = set.range(..pos).next_back().map(|(&p, _)| p);
                    let delta = match (left, right) {
                        (_, None) => u64::MAX,
                        (Some(l), Some(r)) => {
                            self.step.min((r - pos) as u64) + (pos - l) as u64
                        }
                        (None, Some(r)) => self.step.min((r - pos) as u64) * 2,
                    };
                    delta_max = delta_max.max(delta);
                }
            }
        }
        if min_seq_len == u64::MAX {
            min_seq_len = 0;
        }
        Ok((delta_max, genomes.len() as u64, min_seq_len))
    }

    fn better_column(
        probe_step: u64,
        delta: u64,
        num_genomes: u64,
        min_seq_len: u64,
        max_delta: u64,
        max_num_genomes: u64,
        max_min_seq_len: u64,
    ) -> bool {
        if delta <= probe_step {
            return false;
        }
        if num_genomes > max_num_genomes {
            return true;
        }
        if num_genomes == max_num_genomes {
            if min_seq_len > max_min_seq_len {
                return true;
            }
            if min_seq_len == max_min_seq_len {
                return num_genomes > 1 && delta > max_delta;
            }
        }
        false
    }

    fn add_telomeres(&mut self, genome: usize, seq_idx: usize, start: i64, end: i64) {
        let key = (genome, seq_idx);
        let set = self.seq_map.entry(key).or_default();
        for pos in [start - 1, end + 1] {
            let id = self.arena.len();
            self.arena
                .push(LodSegment::new(TELOMERE_BLOCK, key, pos, false));
            self.telomeres.push(id);
            set.insert(pos, id);
        }
    }

    fn create_column(&mut self, aln: &Alignment, col: &ColumnIter) {
        let block_id = self.blocks.len();
        let mut block = Vec::new();
        for entry in col.column().entries() {
            let genome = aln.genome_by_id(entry.genome);
            if genome.sequence(entry.sequence).length() <= self.min_seq_len {
                continue;
            }
            let key = (entry.genome, entry.sequence);
            for &(pos, reversed) in &entry.positions {
                let id = self.arena.len();
                self.arena.push(LodSegment::new(block_id, key, pos, reversed));
                block.push(id);
                self.seq_map.entry(key).or_default().insert(pos, id);
            }
        }
        debug_assert!(!block.is_empty());
        self.blocks.push(block);
    }

    fn compute_adjacencies(&mut self) {
        for set in self.seq_map.values() {
            let ids: Vec<SegId> = set.values().copied().collect();
            for pair in ids.windows(2) {
                debug_assert!(!self.arena[pair[0]].overlaps(&self.arena[pair[1]]));
                add_edge_right_to_left(&mut self.arena, pair[0], pair[1]);
            }
        }
    }

    // ------------------------------------------------------------------
    // optimization

    /// Bigger blocks carry more alignment signal, so they extend first:
    /// pass one grows every multi-segment block halfway into its
    /// adjacencies, pass two greedily finishes everything off.
    fn optimize_by_extension(&mut self) {
        let mut order: Vec<usize> = (0..self.blocks.len()).collect();
        order.sort_by_key(|&b| std::cmp::Reverse(self.blocks[b].len()));
        for &b in &order {
            if self.blocks[b].len() <= 1 {
                break;
            }
            self.extend_block(b, 0.5);
        }
        for &b in &order {
            self.extend_block(b, 1.0);
        }
    }

    fn extend_block(&mut self, block: usize, max_frac: f64) {
        let tail_ext = (max_frac * self.max_tail_extension(block) as f64).ceil() as u64;
        for i in 0..self.blocks[block].len() {
            let id = self.blocks[block][i];
            self.arena[id].extend_tail(tail_ext);
        }
        let head_ext = (max_frac * self.max_head_extension(block) as f64).ceil() as u64;
        for i in 0..self.blocks[block].len() {
            let id = self.blocks[block][i];
            self.arena[id].extend_head(head_ext);
        }
    }

    /// Minimum tail adjacency over the block; an adjacency between two
    /// members of the same block gets eaten from both directions, so it
    /// only counts for half.
    fn max_tail_extension(&self, block: usize) -> u64 {
        let mut min_tail = u64::MAX;
        let mut seen = rustc_hash::FxHashSet::default();
        for &id in &self.blocks[block] {
            let mut adj_len = tail_adj_len(&self.arena, id);
            if !tail_to_head(&self.arena, id) && seen.contains(&self.arena[id].tail_adj.unwrap()) {
                adj_len /= 2;
            }
            min_tail = min_tail.min(adj_len);
            seen.insert(id);
        }
        if min_tail == u64::MAX {
            0
        } else {
            min_tail
        }
    }

    fn max_head_extension(&self, block: usize) -> u64 {
        let mut min_head = u64::MAX;
        let mut seen = rustc_hash::FxHashSet::default();
        for &id in &self.blocks[block] {
            let mut adj_len = head_adj_len(&self.arena, id);
            if !head_to_tail(&self.arena, id) && seen.contains(&self.arena[id].head_adj.unwrap()) {
                adj_len /= 2;
            }
            min_head = min_head.min(adj_len);
            seen.insert(id);
        }
        if min_head == u64::MAX {
            0
        } else {
            min_head
        }
    }

    fn optimize_by_merging(&mut self) {
        for b in 0..self.blocks.len() {
            if let Some(partner) = self.head_merge_partner(b) {
                for i in 0..self.blocks[b].len() {
                    let id = self.blocks[b][i];
                    merge_head(&mut self.arena, id);
                }
                self.blocks[partner].clear();
            }
        }
        // merged-away blocks stay as empty slots; writeback skips them
    }

    /// The head merge partner exists when every segment's head has a
    /// zero-length head-to-tail adjacency into the same other non-telomere
    /// block of equal size.
    fn head_merge_partner(&self, block: usize) -> Option<usize> {
        if self.blocks[block].is_empty() {
            return None;
        }
        let mut partner: Option<usize> = None;
        for &id in &self.blocks[block] {
            let seg = &self.arena[id];
            if seg.dead {
                return None;
            }
            let head_adj = seg.head_adj?;
            let adj = &self.arena[head_adj];
            if adj.block == TELOMERE_BLOCK
                || adj.head_adj.is_none()
                || head_adj_len(&self.arena, id) != 0
                || !head_to_tail(&self.arena, id)
            {
                return None;
            }
            match partner {
                None => {
                    if adj.block != block
                        && self.blocks[adj.block].len() == self.blocks[block].len()
                    {
                        partner = Some(adj.block);
                    } else {
                        return None;
                    }
                }
                Some(p) => {
                    if adj.block != p {
                        return None;
                    }
                }
            }
        }
        partner
    }

    /// Fill every remaining adjacency with new blocks until all lengths
    /// are zero. Freshly created blocks are appended and processed in the
    /// same sweep.
    fn optimize_by_insertion(&mut self) {
        let mut b = 0;
        while b < self.blocks.len() {
            self.insert_neighbours(b);
            b += 1;
        }
    }

    fn insert_neighbours(&mut self, block: usize) {
        loop {
            let max_len = self.max_tail_insertion(block);
            if max_len == 0 {
                break;
            }
            let new_block_id = self.blocks.len();
            let mut new_block = Vec::new();
            for i in 0..self.blocks[block].len() {
                let id = self.blocks[block][i];
                if tail_adj_len(&self.arena, id) >= max_len {
                    new_block.push(insert_new_tail_adj(&mut self.arena, id, new_block_id, max_len));
                }
            }
            self.blocks.push(new_block);
        }
        loop {
            let max_len = self.max_head_insertion(block);
            if max_len == 0 {
                break;
            }
            let new_block_id = self.blocks.len();
            let mut new_block = Vec::new();
            for i in 0..self.blocks[block].len() {
                let id = self.blocks[block][i];
                if head_adj_len(&self.arena, id) >= max_len {
                    new_block.push(insert_new_head_adj(&mut self.arena, id, new_block_id, max_len));
                }
            }
            self.blocks.push(new_block);
        }
    }

    /// Smallest nonzero tail adjacency, or zero when none remain.
    fn max_tail_insertion(&self, block: usize) -> u64 {
        let mut min_nz = u64::MAX;
        for &id in &self.blocks[block] {
            let len = tail_adj_len(&self.arena, id);
            if len > 0 {
                min_nz = min_nz.min(len);
            }
        }
        if min_nz == u64::MAX {
            0
        } else {
            min_nz
        }
    }

    fn max_head_insertion(&self, block: usize) -> u64 {
        let mut min_nz = u64::MAX;
        for &id in &self.blocks[block] {
            let len = head_adj_len(&self.arena, id);
            if len > 0 {
                min_nz = min_nz.min(len);
            }
        }
        if min_nz == u64::MAX {
            0
        } else {
            min_nz
        }
    }

    // ------------------------------------------------------------------
    // verification

    /// Every base of every sampled sequence must be covered exactly once,
    /// and all adjacencies must have zero length.
    fn check_coverage(&self, aln: &Alignment) -> Result<()> {
        let mut coverage: FxHashMap<usize, Vec<bool>> = FxHashMap::default();
        for &gid in &self.genomes {
            coverage.insert(
                gid,
                vec![false; aln.genome_by_id(gid).sequence_length() as usize],
            );
        }
        for block in &self.blocks {
            for &id in block {
                let seg = &self.arena[id];
                if seg.dead {
                    continue;
                }
                if seg.head_adj.is_some() && head_adj_len(&self.arena, id) != 0 {
                    return Err(StrataError::Invariant(format!(
                        "nonzero head adjacency left on segment {}",
                        id
                    )));
                }
                if seg.tail_adj.is_some() && tail_adj_len(&self.arena, id) != 0 {
                    return Err(StrataError::Invariant(format!(
                        "nonzero tail adjacency left on segment {}",
                        id
                    )));
                }
                let bits = coverage.get_mut(&seg.seq.0).unwrap();
                for pos in seg.left_pos()..=seg.right_pos() {
                    if bits[pos as usize] {
                        return Err(StrataError::Invariant(format!(
                            "duplicate coverage at position {} of genome '{}'",
                            pos,
                            aln.genome_by_id(seg.seq.0).name()
                        )));
                    }
                    bits[pos as usize] = true;
                }
            }
        }
        for &gid in &self.genomes {
            let genome = aln.genome_by_id(gid);
            let bits = &coverage[&gid];
            for seq in genome.sequences() {
                if seq.is_empty() {
                    continue;
                }
                let covered = (seq.start_position()..=seq.end_position())
                    .filter(|&p| bits[p as usize])
                    .count() as u64;
                if covered != 0 && covered != seq.length() {
                    return Err(StrataError::Invariant(format!(
                        "{} of {} bases covered for sequence '{}' of '{}'",
                        covered,
                        seq.length(),
                        seq.name(),
                        genome.name()
                    )));
                }
                if covered == 0 && self.all_sequences {
                    return Err(StrataError::Invariant(format!(
                        "sequence '{}' of '{}' left uncovered",
                        seq.name(),
                        genome.name()
                    )));
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // writeback support

    /// Live (non-telomere) segments per sequence, sorted by position;
    /// sequences with telomeres but no live segments are present with an
    /// empty list so the writeback can emit their single covering segment.
    pub(crate) fn live_segments_by_sequence(&self) -> FxHashMap<SeqKey, Vec<SegId>> {
        let mut out: FxHashMap<SeqKey, Vec<SegId>> = FxHashMap::default();
        for key in self.seq_map.keys() {
            out.insert(*key, Vec::new());
        }
        for block in &self.blocks {
            for &id in block {
                if !self.arena[id].dead {
                    out.entry(self.arena[id].seq).or_default().push(id);
                }
            }
        }
        for ids in out.values_mut() {
            ids.sort_by_key(|&id| self.arena[id].left_pos());
        }
        out
    }

    /// Segment count per sequence in the output level (unsampled non-empty
    /// sequences count one covering segment).
    pub(crate) fn segment_counts(&self, aln: &Alignment) -> FxHashMap<SeqKey, u64> {
        let mut counts = FxHashMap::default();
        for (key, ids) in self.live_segments_by_sequence() {
            let n = if ids.is_empty() {
                let genome = aln.genome_by_id(key.0);
                if genome.sequence(key.1).is_empty() {
                    continue;
                }
                1
            } else {
                ids.len() as u64
            };
            counts.insert(key, n);
        }
        counts
    }

    #[inline]
    pub(crate) fn parent(&self) -> usize {
        self.parent
    }
}
