//! Genome handle: sequence catalog, segment arrays, and packed DNA.
//!
//! A genome is one group inside an alignment container directory. It owns
//! five paged-array datasets (`sequences_idx`, `sequences_name`, `dna`,
//! `top`, `bottom`) plus its position in the tree. Writing follows a strict
//! order: declare dimensions, write DNA, write top segments, write bottom
//! segments, then [`Genome::fix_parse_info`].
//!
//! The page caches sit behind `RefCell`: a handle serves one thread;
//! concurrent readers each open their own handle.

use std::cell::RefCell;
use std::path::PathBuf;

use rustc_hash::FxHashMap;

use crate::dna;
use crate::error::{Result, StrataError};
use crate::segment::{
    bottom_record_size, child_index_offset, child_reversed_offset, BottomSegment,
    BottomSegmentSpec, TopSegment, TopSegmentSpec, BOTTOM_START_OFFSET, BOTTOM_TOP_PARSE_OFFSET,
    NULL_INDEX, TOP_BOTTOM_PARSE_OFFSET, TOP_PARALOGY_OFFSET, TOP_PARENT_OFFSET,
    TOP_PARENT_REVERSED_OFFSET, TOP_RECORD_SIZE, TOP_START_OFFSET,
};
use crate::sequence::{
    Sequence, SequenceInfo, SEQ_BOTTOM_INDEX_OFFSET, SEQ_LENGTH_OFFSET, SEQ_NUM_BOTTOM_OFFSET,
    SEQ_NUM_TOP_OFFSET, SEQ_RECORD_SIZE, SEQ_START_OFFSET, SEQ_TOP_INDEX_OFFSET,
};
use crate::store::PagedArray;

/// Records held in the resident chunk of each dataset.
const DEFAULT_CHUNK_RECORDS: u64 = 2048;

pub struct Genome {
    pub(crate) id: usize,
    pub(crate) name: String,
    pub(crate) parent: Option<usize>,
    pub(crate) children: Vec<usize>,
    pub(crate) branch_length: f64,
    dir: PathBuf,
    sequences: Vec<Sequence>,
    seq_by_name: FxHashMap<String, usize>,
    total_length: u64,
    num_top: u64,
    num_bottom: u64,
    top: RefCell<Option<PagedArray>>,
    bottom: RefCell<Option<PagedArray>>,
    dna: RefCell<Option<PagedArray>>,
    seq_idx: RefCell<Option<PagedArray>>,
    seq_name: RefCell<Option<PagedArray>>,
}

impl Genome {
    pub(crate) fn new_writable(
        dir: PathBuf,
        name: String,
        id: usize,
        parent: Option<usize>,
        branch_length: f64,
    ) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            id,
            name,
            parent,
            children: Vec::new(),
            branch_length,
            dir,
            sequences: Vec::new(),
            seq_by_name: FxHashMap::default(),
            total_length: 0,
            num_top: 0,
            num_bottom: 0,
            top: RefCell::new(None),
            bottom: RefCell::new(None),
            dna: RefCell::new(None),
            seq_idx: RefCell::new(None),
            seq_name: RefCell::new(None),
        })
    }

    pub(crate) fn open(
        dir: PathBuf,
        name: String,
        id: usize,
        parent: Option<usize>,
        children: Vec<usize>,
        branch_length: f64,
    ) -> Result<Self> {
        let mut seq_idx = PagedArray::load(dir.join("sequences_idx"))?;
        let mut seq_name = PagedArray::load(dir.join("sequences_name"))?;
        if seq_idx.record_size() != SEQ_RECORD_SIZE {
            return Err(StrataError::Schema(format!(
                "genome '{}': bad sequence record size {}",
                name,
                seq_idx.record_size()
            )));
        }
        if seq_idx.len() != seq_name.len() {
            return Err(StrataError::Schema(format!(
                "genome '{}': sequence index and name arrays disagree",
                name
            )));
        }
        let mut sequences = Vec::with_capacity(seq_idx.len() as usize);
        let mut seq_by_name = FxHashMap::default();
        for i in 0..seq_idx.len() as i64 {
            let raw = seq_name.get(i)?;
            let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            let sname = String::from_utf8_lossy(&raw[..end]).into_owned();
            let seq = Sequence {
                index: i as usize,
                name: sname.clone(),
                start: seq_idx.read_u64(i, SEQ_START_OFFSET)? as i64,
                length: seq_idx.read_u64(i, SEQ_LENGTH_OFFSET)?,
                num_top_segments: seq_idx.read_u64(i, SEQ_NUM_TOP_OFFSET)?,
                num_bottom_segments: seq_idx.read_u64(i, SEQ_NUM_BOTTOM_OFFSET)?,
                top_array_index: seq_idx.read_u64(i, SEQ_TOP_INDEX_OFFSET)? as i64,
                bottom_array_index: seq_idx.read_u64(i, SEQ_BOTTOM_INDEX_OFFSET)? as i64,
            };
            if seq_by_name.insert(sname, i as usize).is_some() {
                return Err(StrataError::Duplicate(format!(
                    "genome '{}': sequence '{}'",
                    name, seq.name
                )));
            }
            sequences.push(seq);
        }
        let total_length: u64 = sequences.iter().map(|s| s.length).sum();
        let num_top: u64 = sequences.iter().map(|s| s.num_top_segments).sum();
        let num_bottom: u64 = sequences.iter().map(|s| s.num_bottom_segments).sum();

        let top = PagedArray::load(dir.join("top"))?;
        let bottom = PagedArray::load(dir.join("bottom"))?;
        let dna_arr = PagedArray::load(dir.join("dna"))?;
        let expect_top = if num_top > 0 { num_top + 1 } else { 0 };
        let expect_bottom = if num_bottom > 0 { num_bottom + 1 } else { 0 };
        if top.len() != expect_top || bottom.len() != expect_bottom {
            return Err(StrataError::Schema(format!(
                "genome '{}': segment array sizes disagree with catalog",
                name
            )));
        }
        if num_bottom > 0 && bottom.record_size() != bottom_record_size(children.len()) {
            return Err(StrataError::Schema(format!(
                "genome '{}': bottom record size {} does not match {} children",
                name,
                bottom.record_size(),
                children.len()
            )));
        }

        Ok(Self {
            id,
            name,
            parent,
            children,
            branch_length,
            dir,
            sequences,
            seq_by_name,
            total_length,
            num_top,
            num_bottom,
            top: RefCell::new(Some(top)),
            bottom: RefCell::new(Some(bottom)),
            dna: RefCell::new(Some(dna_arr)),
            seq_idx: RefCell::new(Some(seq_idx)),
            seq_name: RefCell::new(Some(seq_name)),
        })
    }

    // ------------------------------------------------------------------
    // identity and tree position

    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn parent_id(&self) -> Option<usize> {
        self.parent
    }

    #[inline]
    pub fn child_ids(&self) -> &[usize] {
        &self.children
    }

    #[inline]
    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    #[inline]
    pub fn branch_length(&self) -> f64 {
        self.branch_length
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    // ------------------------------------------------------------------
    // catalog

    #[inline]
    pub fn num_sequences(&self) -> usize {
        self.sequences.len()
    }

    /// Total base count (sum of sequence lengths).
    #[inline]
    pub fn sequence_length(&self) -> u64 {
        self.total_length
    }

    #[inline]
    pub fn num_top_segments(&self) -> u64 {
        self.num_top
    }

    #[inline]
    pub fn num_bottom_segments(&self) -> u64 {
        self.num_bottom
    }

    /// Sequences in storage order.
    pub fn sequences(&self) -> std::slice::Iter<'_, Sequence> {
        self.sequences.iter()
    }

    pub fn sequence(&self, index: usize) -> &Sequence {
        &self.sequences[index]
    }

    pub fn sequence_by_name(&self, name: &str) -> Result<&Sequence> {
        self.seq_by_name
            .get(name)
            .map(|&i| &self.sequences[i])
            .ok_or_else(|| {
                StrataError::NotFound(format!("sequence '{}' in genome '{}'", name, self.name))
            })
    }

    /// Binary search by start position for the sequence containing `pos`.
    pub fn sequence_by_site(&self, pos: i64) -> Result<&Sequence> {
        if pos < 0 || pos as u64 >= self.total_length {
            return Err(StrataError::out_of_range(pos, self.total_length));
        }
        let i = self
            .sequences
            .partition_point(|s| s.start <= pos)
            .saturating_sub(1);
        let seq = &self.sequences[i];
        if seq.contains_site(pos) {
            Ok(seq)
        } else {
            Err(StrataError::Invariant(format!(
                "genome '{}': position {} not tiled by any sequence",
                self.name, pos
            )))
        }
    }

    // ------------------------------------------------------------------
    // write path

    /// Declare every sequence of this genome and create the backing
    /// datasets. Must run once, after all children have been added to the
    /// alignment (the bottom record layout depends on the child count).
    pub fn set_dimensions(&mut self, infos: &[SequenceInfo]) -> Result<()> {
        if self.dna.borrow().is_some() {
            return Err(StrataError::InvalidArgument(format!(
                "genome '{}': dimensions already set",
                self.name
            )));
        }
        let mut sequences = Vec::with_capacity(infos.len());
        let mut seq_by_name = FxHashMap::default();
        let mut start: i64 = 0;
        let mut top_at: i64 = 0;
        let mut bottom_at: i64 = 0;
        let mut max_name = 1usize;
        for (i, info) in infos.iter().enumerate() {
            if info.name.is_empty() || info.name.chars().any(|c| matches!(c, '\t' | '\n')) {
                return Err(StrataError::InvalidArgument(format!(
                    "bad sequence name '{}'",
                    info.name
                )));
            }
            if seq_by_name.insert(info.name.clone(), i).is_some() {
                return Err(StrataError::Duplicate(format!(
                    "genome '{}': sequence '{}'",
                    self.name, info.name
                )));
            }
            max_name = max_name.max(info.name.len() + 1);
            sequences.push(Sequence {
                index: i,
                name: info.name.clone(),
                start,
                length: info.length,
                num_top_segments: info.num_top_segments,
                num_bottom_segments: info.num_bottom_segments,
                top_array_index: top_at,
                bottom_array_index: bottom_at,
            });
            start += info.length as i64;
            top_at += info.num_top_segments as i64;
            bottom_at += info.num_bottom_segments as i64;
        }
        self.sequences = sequences;
        self.seq_by_name = seq_by_name;
        self.total_length = start as u64;
        self.num_top = top_at as u64;
        self.num_bottom = bottom_at as u64;

        self.create_catalog_arrays(max_name)?;
        self.create_top_array()?;
        self.create_bottom_array()?;
        let dna_bytes = (self.total_length + 1) / 2;
        *self.dna.borrow_mut() = Some(PagedArray::create(
            self.dir.join("dna"),
            1,
            dna_bytes,
            DEFAULT_CHUNK_RECORDS,
        )?);
        Ok(())
    }

    /// Re-declare only the bottom-segment counts. Used when a genome written
    /// earlier as a child later becomes the parent of a conversion pass.
    pub fn update_bottom_dimensions(&mut self, updates: &[(String, u64)]) -> Result<()> {
        let mut by_name: FxHashMap<&str, u64> = FxHashMap::default();
        for (name, count) in updates {
            by_name.insert(name.as_str(), *count);
        }
        let mut bottom_at: i64 = 0;
        for seq in self.sequences.iter_mut() {
            if let Some(&count) = by_name.get(seq.name.as_str()) {
                seq.num_bottom_segments = count;
            }
            seq.bottom_array_index = bottom_at;
            bottom_at += seq.num_bottom_segments as i64;
        }
        self.num_bottom = bottom_at as u64;
        let max_name = self
            .sequences
            .iter()
            .map(|s| s.name.len() + 1)
            .max()
            .unwrap_or(1);
        self.create_catalog_arrays(max_name)?;
        self.create_bottom_array()
    }

    fn create_catalog_arrays(&self, max_name: usize) -> Result<()> {
        let n = self.sequences.len() as u64;
        let mut idx = PagedArray::create(
            self.dir.join("sequences_idx"),
            SEQ_RECORD_SIZE,
            n,
            DEFAULT_CHUNK_RECORDS,
        )?;
        let mut names = PagedArray::create(
            self.dir.join("sequences_name"),
            max_name,
            n,
            DEFAULT_CHUNK_RECORDS,
        )?;
        for (i, seq) in self.sequences.iter().enumerate() {
            let i = i as i64;
            idx.write_u64(i, SEQ_START_OFFSET, seq.start as u64)?;
            idx.write_u64(i, SEQ_LENGTH_OFFSET, seq.length)?;
            idx.write_u64(i, SEQ_NUM_TOP_OFFSET, seq.num_top_segments)?;
            idx.write_u64(i, SEQ_NUM_BOTTOM_OFFSET, seq.num_bottom_segments)?;
            idx.write_u64(i, SEQ_TOP_INDEX_OFFSET, seq.top_array_index as u64)?;
            idx.write_u64(i, SEQ_BOTTOM_INDEX_OFFSET, seq.bottom_array_index as u64)?;
            let rec = names.get_update(i)?;
            rec.fill(0);
            rec[..seq.name.len()].copy_from_slice(seq.name.as_bytes());
        }
        idx.flush()?;
        names.flush()?;
        *self.seq_idx.borrow_mut() = Some(idx);
        *self.seq_name.borrow_mut() = Some(names);
        Ok(())
    }

    fn create_top_array(&self) -> Result<()> {
        let count = if self.num_top > 0 { self.num_top + 1 } else { 0 };
        let mut arr = PagedArray::create(
            self.dir.join("top"),
            TOP_RECORD_SIZE,
            count,
            DEFAULT_CHUNK_RECORDS,
        )?;
        for i in 0..count as i64 {
            arr.write_i64(i, TOP_PARENT_OFFSET, NULL_INDEX)?;
            arr.write_i64(i, TOP_PARALOGY_OFFSET, NULL_INDEX)?;
            arr.write_i64(i, TOP_BOTTOM_PARSE_OFFSET, NULL_INDEX)?;
        }
        if count > 0 {
            arr.write_i64(count as i64 - 1, TOP_START_OFFSET, self.total_length as i64)?;
        }
        *self.top.borrow_mut() = Some(arr);
        Ok(())
    }

    fn create_bottom_array(&self) -> Result<()> {
        let count = if self.num_bottom > 0 {
            self.num_bottom + 1
        } else {
            0
        };
        let rec = bottom_record_size(self.children.len());
        let mut arr =
            PagedArray::create(self.dir.join("bottom"), rec, count, DEFAULT_CHUNK_RECORDS)?;
        for i in 0..count as i64 {
            arr.write_i64(i, BOTTOM_TOP_PARSE_OFFSET, NULL_INDEX)?;
            for c in 0..self.children.len() {
                arr.write_i64(i, child_index_offset(c), NULL_INDEX)?;
            }
        }
        if count > 0 {
            arr.write_i64(
                count as i64 - 1,
                BOTTOM_START_OFFSET,
                self.total_length as i64,
            )?;
        }
        *self.bottom.borrow_mut() = Some(arr);
        Ok(())
    }

    pub fn set_top_segment(&self, index: i64, spec: &TopSegmentSpec) -> Result<()> {
        self.set_top_coordinates(index, spec.start, spec.length)?;
        self.with_top(|a| {
            a.write_i64(index, TOP_PARENT_OFFSET, spec.parent)?;
            a.write_u8(index, TOP_PARENT_REVERSED_OFFSET, spec.parent_reversed as u8)?;
            a.write_i64(index, TOP_PARALOGY_OFFSET, spec.next_paralogy)?;
            a.write_i64(index, TOP_BOTTOM_PARSE_OFFSET, spec.bottom_parse)
        })
    }

    pub fn set_bottom_segment(&self, index: i64, spec: &BottomSegmentSpec) -> Result<()> {
        if spec.children.len() != self.children.len() {
            return Err(StrataError::InvalidArgument(format!(
                "genome '{}': bottom segment carries {} child slots, genome has {}",
                self.name,
                spec.children.len(),
                self.children.len()
            )));
        }
        self.set_bottom_coordinates(index, spec.start, spec.length)?;
        self.with_bottom(|a| {
            a.write_i64(index, BOTTOM_TOP_PARSE_OFFSET, spec.top_parse)?;
            for (slot, &(child, reversed)) in spec.children.iter().enumerate() {
                a.write_i64(index, child_index_offset(slot), child)?;
                a.write_u8(index, child_reversed_offset(slot), reversed as u8)?;
            }
            Ok(())
        })
    }

    /// Set a top segment's start and, through the next record's start
    /// sentinel, its length.
    pub fn set_top_coordinates(&self, index: i64, start: i64, length: u64) -> Result<()> {
        if index < 0 || index as u64 >= self.num_top {
            return Err(StrataError::out_of_range(index, self.num_top));
        }
        self.with_top(|a| {
            a.write_i64(index, TOP_START_OFFSET, start)?;
            a.write_i64(index + 1, TOP_START_OFFSET, start + length as i64)
        })
    }

    pub fn set_bottom_coordinates(&self, index: i64, start: i64, length: u64) -> Result<()> {
        if index < 0 || index as u64 >= self.num_bottom {
            return Err(StrataError::out_of_range(index, self.num_bottom));
        }
        self.with_bottom(|a| {
            a.write_i64(index, BOTTOM_START_OFFSET, start)?;
            a.write_i64(index + 1, BOTTOM_START_OFFSET, start + length as i64)
        })
    }

    pub fn set_top_parent(&self, index: i64, parent: i64, reversed: bool) -> Result<()> {
        self.with_top(|a| {
            a.write_i64(index, TOP_PARENT_OFFSET, parent)?;
            a.write_u8(index, TOP_PARENT_REVERSED_OFFSET, reversed as u8)
        })
    }

    pub fn set_top_paralogy(&self, index: i64, next: i64) -> Result<()> {
        self.with_top(|a| a.write_i64(index, TOP_PARALOGY_OFFSET, next))
    }

    pub fn set_top_parse(&self, index: i64, bottom_parse: i64) -> Result<()> {
        self.with_top(|a| a.write_i64(index, TOP_BOTTOM_PARSE_OFFSET, bottom_parse))
    }

    pub fn set_bottom_child(
        &self,
        index: i64,
        slot: usize,
        child: i64,
        reversed: bool,
    ) -> Result<()> {
        self.with_bottom(|a| {
            a.write_i64(index, child_index_offset(slot), child)?;
            a.write_u8(index, child_reversed_offset(slot), reversed as u8)
        })
    }

    pub fn set_bottom_parse(&self, index: i64, top_parse: i64) -> Result<()> {
        self.with_bottom(|a| a.write_i64(index, BOTTOM_TOP_PARSE_OFFSET, top_parse))
    }

    // ------------------------------------------------------------------
    // DNA

    pub fn dna_base(&self, pos: i64) -> Result<u8> {
        if pos < 0 || pos as u64 >= self.total_length {
            return Err(StrataError::out_of_range(pos, self.total_length));
        }
        let byte = self.with_dna(|a| a.read_u8(pos / 2, 0))?;
        Ok(dna::unpack(pos, byte))
    }

    pub fn set_dna_base(&self, pos: i64, c: u8) -> Result<()> {
        if pos < 0 || pos as u64 >= self.total_length {
            return Err(StrataError::out_of_range(pos, self.total_length));
        }
        self.with_dna(|a| {
            let mut byte = a.read_u8(pos / 2, 0)?;
            dna::pack(c, pos, &mut byte);
            a.write_u8(pos / 2, 0, byte)
        })
    }

    /// Write the entire genome's bases in one pass; the string length must
    /// equal the declared total length.
    pub fn set_dna(&self, bases: &[u8]) -> Result<()> {
        if bases.len() as u64 != self.total_length {
            return Err(StrataError::InvalidArgument(format!(
                "genome '{}': DNA string length {} != genome length {}",
                self.name,
                bases.len(),
                self.total_length
            )));
        }
        self.with_dna(|a| {
            for (i, pair) in bases.chunks(2).enumerate() {
                let mut byte = 0u8;
                dna::pack(pair[0], 0, &mut byte);
                if pair.len() > 1 {
                    dna::pack(pair[1], 1, &mut byte);
                }
                a.write_u8(i as i64, 0, byte)?;
            }
            Ok(())
        })
    }

    /// Write the bases of one sequence.
    pub fn set_sequence_dna(&self, seq_index: usize, bases: &[u8]) -> Result<()> {
        let seq = &self.sequences[seq_index];
        if bases.len() as u64 != seq.length {
            return Err(StrataError::InvalidArgument(format!(
                "sequence '{}': DNA string length {} != sequence length {}",
                seq.name,
                bases.len(),
                seq.length
            )));
        }
        let start = seq.start;
        for (i, &c) in bases.iter().enumerate() {
            self.set_dna_base(start + i as i64, c)?;
        }
        Ok(())
    }

    pub fn sequence_dna(&self, seq_index: usize) -> Result<Vec<u8>> {
        let seq = &self.sequences[seq_index];
        self.dna_substring(seq.start, seq.length, false)
    }

    /// Read `length` bases starting at genome position `start`; reversed
    /// reads return the reverse complement.
    pub fn dna_substring(&self, start: i64, length: u64, reversed: bool) -> Result<Vec<u8>> {
        if start < 0 || start as u64 + length > self.total_length {
            return Err(StrataError::out_of_range(start, self.total_length));
        }
        let mut out = Vec::with_capacity(length as usize);
        self.with_dna(|a| {
            for pos in start..start + length as i64 {
                let byte = a.read_u8(pos / 2, 0)?;
                out.push(dna::unpack(pos, byte));
            }
            Ok(())
        })?;
        if reversed {
            dna::reverse_complement(&mut out);
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // segment access

    pub fn top_segment(&self, index: i64) -> TopSegment<'_> {
        TopSegment::new(self, index)
    }

    pub fn bottom_segment(&self, index: i64) -> BottomSegment<'_> {
        BottomSegment::new(self, index)
    }

    /// Index of the top segment containing genome position `pos`.
    pub fn top_segment_at(&self, pos: i64) -> Result<i64> {
        self.segment_at(pos, true)
    }

    /// Index of the bottom segment containing genome position `pos`.
    pub fn bottom_segment_at(&self, pos: i64) -> Result<i64> {
        self.segment_at(pos, false)
    }

    fn segment_at(&self, pos: i64, top: bool) -> Result<i64> {
        let count = if top { self.num_top } else { self.num_bottom };
        if pos < 0 || pos as u64 >= self.total_length || count == 0 {
            return Err(StrataError::out_of_range(pos, self.total_length));
        }
        let read = |i: i64| -> Result<i64> {
            if top {
                self.with_top(|a| a.read_i64(i, TOP_START_OFFSET))
            } else {
                self.with_bottom(|a| a.read_i64(i, BOTTOM_START_OFFSET))
            }
        };
        // largest index whose start <= pos
        let (mut lo, mut hi) = (0i64, count as i64 - 1);
        while lo < hi {
            let mid = (lo + hi + 1) / 2;
            if read(mid)? <= pos {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        Ok(lo)
    }

    /// Fill in the top/bottom parse cross-links by scanning both arrays in
    /// parallel and linking each record to the counterpart covering its
    /// leftmost base. A no-op for genomes that lack either array.
    pub fn fix_parse_info(&self) -> Result<()> {
        if self.num_top == 0 || self.num_bottom == 0 {
            return Ok(());
        }
        let mut b: i64 = 0;
        let mut t: i64 = 0;
        while (b as u64) < self.num_bottom && (t as u64) < self.num_top {
            let bseg = self.bottom_segment(b);
            let tseg = self.top_segment(t);
            let bstart = bseg.start_position()?;
            let bend = bstart + bseg.length()? as i64;
            let tstart = tseg.start_position()?;
            let tend = tstart + tseg.length()? as i64;

            if bstart >= tstart && bstart < tend {
                self.set_bottom_parse(b, t)?;
            }
            let bright = bend <= tend || bstart == bend;
            if tstart >= bstart && tstart < bend {
                self.set_top_parse(t, b)?;
            }
            let tright = tend <= bend || tstart == tend;
            if !bright && !tright {
                return Err(StrataError::Invariant(format!(
                    "genome '{}': parse scan stalled at bottom {} top {}",
                    self.name, b, t
                )));
            }
            if bright {
                b += 1;
            }
            if tright {
                t += 1;
            }
        }
        Ok(())
    }

    /// Write back all dirty pages.
    pub fn flush(&self) -> Result<()> {
        for cell in [
            &self.top,
            &self.bottom,
            &self.dna,
            &self.seq_idx,
            &self.seq_name,
        ] {
            if let Some(arr) = cell.borrow_mut().as_mut() {
                arr.flush()?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // dataset plumbing

    pub(crate) fn with_top<R>(&self, f: impl FnOnce(&mut PagedArray) -> Result<R>) -> Result<R> {
        let mut guard = self.top.borrow_mut();
        let arr = guard.as_mut().ok_or_else(|| self.no_dims())?;
        f(arr)
    }

    pub(crate) fn with_bottom<R>(&self, f: impl FnOnce(&mut PagedArray) -> Result<R>) -> Result<R> {
        let mut guard = self.bottom.borrow_mut();
        let arr = guard.as_mut().ok_or_else(|| self.no_dims())?;
        f(arr)
    }

    pub(crate) fn with_dna<R>(&self, f: impl FnOnce(&mut PagedArray) -> Result<R>) -> Result<R> {
        let mut guard = self.dna.borrow_mut();
        let arr = guard.as_mut().ok_or_else(|| self.no_dims())?;
        f(arr)
    }

    fn no_dims(&self) -> StrataError {
        StrataError::Schema(format!("genome '{}': dimensions not set", self.name))
    }
}

#[cfg(test)]
mod tests {
    use crate::alignment::Alignment;
    use crate::error::StrataError;
    use crate::segment::{BottomSegmentSpec, TopSegmentSpec, NULL_INDEX};
    use crate::sequence::SequenceInfo;
    use tempfile::tempdir;

    #[test]
    fn test_dimension_errors() {
        let dir = tempdir().unwrap();
        let mut aln = Alignment::create(dir.path()).unwrap();
        aln.add_root_genome("g").unwrap();
        let g = aln.genome_mut("g").unwrap();
        assert!(matches!(
            g.set_dimensions(&[
                SequenceInfo::new("chr1", 10, 0, 0),
                SequenceInfo::new("chr1", 10, 0, 0),
            ]),
            Err(StrataError::Duplicate(_))
        ));
        g.set_dimensions(&[
            SequenceInfo::new("chr1", 10, 0, 0),
            SequenceInfo::new("chr2", 6, 0, 0),
        ])
        .unwrap();
        assert!(matches!(
            g.set_dimensions(&[SequenceInfo::new("chr1", 10, 0, 0)]),
            Err(StrataError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_sequence_lookup() {
        let dir = tempdir().unwrap();
        let mut aln = Alignment::create(dir.path()).unwrap();
        aln.add_root_genome("g").unwrap();
        aln.genome_mut("g")
            .unwrap()
            .set_dimensions(&[
                SequenceInfo::new("chr1", 10, 0, 0),
                SequenceInfo::new("chr2", 6, 0, 0),
            ])
            .unwrap();
        let g = aln.genome("g").unwrap();
        assert_eq!(g.sequence_length(), 16);
        assert_eq!(g.sequence_by_name("chr2").unwrap().start_position(), 10);
        assert!(g.sequence_by_name("chr3").is_err());
        assert_eq!(g.sequence_by_site(9).unwrap().name(), "chr1");
        assert_eq!(g.sequence_by_site(10).unwrap().name(), "chr2");
        assert!(g.sequence_by_site(16).is_err());
        assert!(g.sequence_by_site(-1).is_err());
    }

    #[test]
    fn test_dna_read_write() {
        let dir = tempdir().unwrap();
        let mut aln = Alignment::create(dir.path()).unwrap();
        aln.add_root_genome("g").unwrap();
        aln.genome_mut("g")
            .unwrap()
            .set_dimensions(&[SequenceInfo::new("chr", 5, 0, 0)])
            .unwrap();
        let g = aln.genome("g").unwrap();
        assert!(g.set_dna(b"ACGT").is_err());
        g.set_dna(b"AcGtN").unwrap();
        assert_eq!(g.dna_substring(0, 5, false).unwrap(), b"AcGtN");
        assert_eq!(g.dna_substring(0, 5, true).unwrap(), b"NaCgT");
        g.set_dna_base(3, b'g').unwrap();
        assert_eq!(g.dna_base(3).unwrap(), b'g');
        assert_eq!(g.dna_base(2).unwrap(), b'G');
        assert!(g.dna_base(5).is_err());
    }

    #[test]
    fn test_fix_parse_info_links_leftmost_overlap() {
        let dir = tempdir().unwrap();
        let mut aln = Alignment::create(dir.path()).unwrap();
        aln.add_root_genome("g").unwrap();
        aln.add_leaf_genome("child", "g", 1.0).unwrap();
        aln.genome_mut("g")
            .unwrap()
            .set_dimensions(&[SequenceInfo::new("chr", 10, 2, 3)])
            .unwrap();
        let g = aln.genome("g").unwrap();
        for (i, (s, l)) in [(0i64, 5u64), (5, 5)].iter().enumerate() {
            g.set_top_segment(
                i as i64,
                &TopSegmentSpec {
                    start: *s,
                    length: *l,
                    ..Default::default()
                },
            )
            .unwrap();
        }
        for (i, (s, l)) in [(0i64, 3u64), (3, 4), (7, 3)].iter().enumerate() {
            g.set_bottom_segment(i as i64, &BottomSegmentSpec::new(*s, *l, 1))
                .unwrap();
        }
        g.fix_parse_info().unwrap();

        assert_eq!(g.top_segment(0).bottom_parse_index().unwrap(), 0);
        assert_eq!(g.top_segment(1).bottom_parse_index().unwrap(), 1);
        assert_eq!(g.bottom_segment(0).top_parse_index().unwrap(), 0);
        assert_eq!(g.bottom_segment(1).top_parse_index().unwrap(), 0);
        assert_eq!(g.bottom_segment(2).top_parse_index().unwrap(), 1);
        assert_ne!(g.top_segment(0).bottom_parse_index().unwrap(), NULL_INDEX);
    }
}
