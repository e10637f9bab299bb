//! Liftover: map BED intervals between two genomes of one alignment.

use std::io::{Read, Write};

use rustc_hash::FxHashSet;

use crate::alignment::Alignment;
use crate::bed::{BedLine, BedScanner, BedWriter};
use crate::error::Result;
use crate::mapped::{coalesce, cut_fragment, mapped_segments, MappedSegment, SegmentSlice};

/// Options and state for one liftover run.
pub struct LiftoverCommand {
    /// Branch across paralogy rings while mapping.
    pub traverse_dupes: bool,
    /// Emit PSL lines instead of BED.
    pub out_psl: bool,
    /// Map through this ancestor instead of turning at the MRCA.
    pub coalescence_limit: Option<String>,
}

impl Default for LiftoverCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl LiftoverCommand {
    pub fn new() -> Self {
        Self {
            traverse_dupes: true,
            out_psl: false,
            coalescence_limit: None,
        }
    }

    pub fn with_no_dupes(mut self, no_dupes: bool) -> Self {
        self.traverse_dupes = !no_dupes;
        self
    }

    pub fn with_psl(mut self, psl: bool) -> Self {
        self.out_psl = psl;
        self
    }

    pub fn with_coalescence_limit(mut self, genome: Option<String>) -> Self {
        self.coalescence_limit = genome;
        self
    }

    /// Map every interval of `input` from `src_name` onto `tgt_name`.
    pub fn run<R: Read, W: Write>(
        &self,
        aln: &Alignment,
        src_name: &str,
        input: R,
        tgt_name: &str,
        output: W,
    ) -> Result<()> {
        let src = aln.genome(src_name)?;
        let tgt = aln.genome(tgt_name)?;
        let via = match &self.coalescence_limit {
            Some(name) => Some(aln.genome_id(name)?),
            None => None,
        };
        let mut scanner = BedScanner::new(input);
        let mut writer = BedWriter::new(output);
        let mut missed: FxHashSet<String> = FxHashSet::default();

        while let Some(line) = scanner.next_line()? {
            let seq = match src.sequence_by_name(&line.chrom) {
                Ok(seq) => seq,
                Err(_) => {
                    if missed.insert(line.chrom.clone()) {
                        eprintln!(
                            "Unable to find sequence {} in genome {}",
                            line.chrom, src_name
                        );
                    }
                    continue;
                }
            };
            if line.end as u64 > seq.length() {
                eprintln!(
                    "Skipping interval with endpoint {} because sequence {} has length {}",
                    line.end,
                    line.chrom,
                    seq.length()
                );
                continue;
            }
            if line.end == line.start {
                continue;
            }
            let source = SegmentSlice::new(
                src.id(),
                seq.start_position() + line.start,
                (line.end - line.start) as u64,
            );
            let mut frags = mapped_segments(aln, source, tgt.id(), self.traverse_dupes, via)?;
            coalesce(&mut frags);
            frags.sort_by_key(|f| (f.source.start, f.target.start));
            for frag in &frags {
                self.write_fragment(aln, &line, frag, &mut writer)?;
            }
        }
        writer.flush()
    }

    fn write_fragment<W: Write>(
        &self,
        aln: &Alignment,
        in_line: &BedLine,
        frag: &MappedSegment,
        writer: &mut BedWriter<W>,
    ) -> Result<()> {
        let tgt = aln.genome_by_id(frag.target.genome);
        // a coalesced run can straddle a sequence boundary; emit per piece
        let mut at = frag.target.start;
        while at <= frag.target.end() {
            let seq = tgt.sequence_by_site(at)?;
            let piece_end = frag.target.end().min(seq.end_position());
            let piece = cut_fragment(frag, at, piece_end);
            let mut out = in_line.clone();
            out.chrom = seq.name().to_string();
            out.start = piece.target.start - seq.start_position();
            out.end = out.start + piece.target.length as i64;
            out.strand = if in_line.strand == '.' {
                '.'
            } else {
                let flipped = piece.target.reversed != (in_line.strand == '-');
                if flipped {
                    '-'
                } else {
                    '+'
                }
            };
            if self.out_psl {
                self.write_psl(aln, &piece, &out, writer)?;
            } else {
                writer.write_line(&out)?;
            }
            at = piece_end + 1;
        }
        Ok(())
    }

    /// One PSL line per mapped piece: a single block whose query is the
    /// source slice and whose target is the mapped slice.
    fn write_psl<W: Write>(
        &self,
        aln: &Alignment,
        piece: &MappedSegment,
        out: &BedLine,
        writer: &mut BedWriter<W>,
    ) -> Result<()> {
        let src = aln.genome_by_id(piece.source.genome);
        let src_seq = src.sequence_by_site(piece.source.start)?;
        let tgt = aln.genome_by_id(piece.target.genome);
        let tgt_seq = tgt.sequence_by_site(piece.target.start)?;
        let q_start = piece.source.start - src_seq.start_position();
        let strand = if out.strand == '-' { '-' } else { '+' };
        let len = piece.target.length;
        // block starts are strand-relative in PSL
        let q_block = if strand == '-' {
            src_seq.length() as i64 - (q_start + len as i64)
        } else {
            q_start
        };
        let line = format!(
            "{}\t0\t0\t0\t0\t0\t0\t0\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t1\t{},\t{},\t{},\n",
            len,
            strand,
            src_seq.name(),
            src_seq.length(),
            q_start,
            q_start + len as i64,
            tgt_seq.name(),
            tgt_seq.length(),
            out.start,
            out.end,
            len,
            q_block,
            out.start,
        );
        writer.write_raw(line.as_bytes())
    }
}
