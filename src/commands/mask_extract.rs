//! Extract soft-masked (lower-case) intervals of a genome as BED.

use std::io::Write;

use crate::alignment::Alignment;
use crate::bed::BedWriter;
use crate::dna::{is_masked, DnaIter};
use crate::error::{Result, StrataError};

pub struct MaskExtractCommand {
    /// Pad each masked run by this many bases.
    pub extend: u64,
    /// Pad each masked run by this fraction of its length.
    pub extend_pct: f64,
}

impl Default for MaskExtractCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl MaskExtractCommand {
    pub fn new() -> Self {
        Self {
            extend: 0,
            extend_pct: 0.0,
        }
    }

    pub fn with_extend(mut self, extend: u64) -> Self {
        self.extend = extend;
        self
    }

    pub fn with_extend_pct(mut self, pct: f64) -> Self {
        self.extend_pct = pct;
        self
    }

    pub fn run<W: Write>(&self, aln: &Alignment, genome_name: &str, out: W) -> Result<()> {
        if self.extend > 0 && self.extend_pct > 0.0 {
            return Err(StrataError::InvalidArgument(
                "--extend and --extend-pct are mutually exclusive".to_string(),
            ));
        }
        let genome = aln.genome(genome_name)?;
        let mut writer = BedWriter::new(out);
        for seq in genome.sequences() {
            if seq.is_empty() {
                continue;
            }
            let mut runs = self.masked_runs(genome, seq.start_position(), seq.end_position())?;
            self.pad_runs(&mut runs, seq.start_position(), seq.end_position());
            for (start, end) in merge_runs(runs) {
                writer.write_bed3(
                    seq.name(),
                    start - seq.start_position(),
                    end + 1 - seq.start_position(),
                )?;
            }
        }
        writer.flush()
    }

    /// Maximal runs of masked bases inside `[start, end]`, inclusive
    /// genome-global coordinates.
    fn masked_runs(
        &self,
        genome: &crate::genome::Genome,
        start: i64,
        end: i64,
    ) -> Result<Vec<(i64, i64)>> {
        let mut runs = Vec::new();
        let mut run_start: Option<i64> = None;
        let mut dna = DnaIter::new(genome, start);
        while dna.array_index() <= end {
            let masked = is_masked(dna.base()?);
            match (masked, run_start) {
                (true, None) => run_start = Some(dna.array_index()),
                (false, Some(s)) => {
                    runs.push((s, dna.array_index() - 1));
                    run_start = None;
                }
                _ => {}
            }
            dna.to_right();
        }
        if let Some(s) = run_start {
            runs.push((s, end));
        }
        Ok(runs)
    }

    fn pad_runs(&self, runs: &mut [(i64, i64)], seq_start: i64, seq_end: i64) {
        if self.extend == 0 && self.extend_pct == 0.0 {
            return;
        }
        for run in runs.iter_mut() {
            let len = run.1 - run.0 + 1;
            let pad = if self.extend > 0 {
                self.extend as i64
            } else {
                (self.extend_pct * len as f64) as i64
            };
            run.0 = (run.0 - pad).max(seq_start);
            run.1 = (run.1 + pad).min(seq_end);
        }
    }
}

/// Collapse overlapping or touching runs; input is position-sorted.
fn merge_runs(runs: Vec<(i64, i64)>) -> Vec<(i64, i64)> {
    let mut merged: Vec<(i64, i64)> = Vec::with_capacity(runs.len());
    for run in runs {
        match merged.last_mut() {
            Some(last) if run.0 <= last.1 + 1 => last.1 = last.1.max(run.1),
            _ => merged.push(run),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::Alignment;
    use crate::sequence::SequenceInfo;
    use tempfile::tempdir;

    fn masked_genome(dir: &std::path::Path) -> Alignment {
        let mut aln = Alignment::create(dir).unwrap();
        aln.add_root_genome("root").unwrap();
        aln.genome_mut("root")
            .unwrap()
            .set_dimensions(&[SequenceInfo::new("chr", 20, 0, 0)])
            .unwrap();
        aln.genome("root")
            .unwrap()
            .set_dna(b"ACGTacgtACGTacgtACGT")
            .unwrap();
        aln
    }

    #[test]
    fn test_masked_intervals() {
        let dir = tempdir().unwrap();
        let aln = masked_genome(dir.path());
        let mut out = Vec::new();
        MaskExtractCommand::new()
            .run(&aln, "root", &mut out)
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "chr\t4\t8\nchr\t12\t16\n"
        );
    }

    #[test]
    fn test_extension_merges_runs() {
        let dir = tempdir().unwrap();
        let aln = masked_genome(dir.path());
        let mut out = Vec::new();
        MaskExtractCommand::new()
            .with_extend(2)
            .run(&aln, "root", &mut out)
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "chr\t2\t18\n");
    }

    #[test]
    fn test_conflicting_pad_options() {
        let dir = tempdir().unwrap();
        let aln = masked_genome(dir.path());
        let cmd = MaskExtractCommand::new().with_extend(2).with_extend_pct(0.5);
        assert!(cmd.run(&aln, "root", Vec::new()).is_err());
    }
}
