//! Alignment metadata reports.

use std::io::Write;

use crate::alignment::Alignment;
use crate::error::Result;

/// What `strata stats` prints.
#[derive(Debug, Clone, PartialEq)]
pub enum StatsMode {
    /// Tree plus one CSV row per genome.
    Summary,
    /// Genome names only.
    Genomes,
    /// Sequence names of one genome.
    Sequences(String),
    /// Per-sequence dimension rows for one genome.
    SequenceStats(String),
    /// Newick tree only.
    Tree,
    /// Every branch with its length.
    Branches,
    /// Genomes on the spanning tree of a pair.
    Span(String, String),
}

#[derive(Default)]
pub struct StatsCommand;

impl StatsCommand {
    pub fn new() -> Self {
        Self
    }

    pub fn run<W: Write>(&self, aln: &Alignment, mode: &StatsMode, out: &mut W) -> Result<()> {
        match mode {
            StatsMode::Summary => self.print_summary(aln, out),
            StatsMode::Genomes => {
                for genome in aln.genomes() {
                    writeln!(out, "{}", genome.name())?;
                }
                Ok(())
            }
            StatsMode::Sequences(name) => {
                for seq in aln.genome(name)?.sequences() {
                    writeln!(out, "{}", seq.name())?;
                }
                Ok(())
            }
            StatsMode::SequenceStats(name) => {
                writeln!(out, "SequenceName, Length, NumTopSegments, NumBottomSegments")?;
                for seq in aln.genome(name)?.sequences() {
                    writeln!(
                        out,
                        "{}, {}, {}, {}",
                        seq.name(),
                        seq.length(),
                        seq.num_top_segments(),
                        seq.num_bottom_segments()
                    )?;
                }
                Ok(())
            }
            StatsMode::Tree => {
                writeln!(out, "{}", aln.newick()?)?;
                Ok(())
            }
            StatsMode::Branches => {
                let mut ryu_buf = ryu::Buffer::new();
                for genome in aln.genomes() {
                    if let Some(parent) = genome.parent_id() {
                        writeln!(
                            out,
                            "{}\t{}\t{}",
                            aln.genome_by_id(parent).name(),
                            genome.name(),
                            ryu_buf.format(genome.branch_length())
                        )?;
                    }
                }
                Ok(())
            }
            StatsMode::Span(a, b) => {
                let span = aln.spanning_set(&[aln.genome_id(a)?, aln.genome_id(b)?]);
                // report in creation order for a stable listing
                for genome in aln.genomes() {
                    if span.contains(&genome.id()) {
                        writeln!(out, "{}", genome.name())?;
                    }
                }
                Ok(())
            }
        }
    }

    fn print_summary<W: Write>(&self, aln: &Alignment, out: &mut W) -> Result<()> {
        writeln!(out, "{}\n", aln.newick()?)?;
        writeln!(
            out,
            "GenomeName, NumChildren, Length, NumSequences, NumTopSegments, NumBottomSegments"
        )?;
        for genome in aln.genomes() {
            writeln!(
                out,
                "{}, {}, {}, {}, {}, {}",
                genome.name(),
                genome.num_children(),
                genome.sequence_length(),
                genome.num_sequences(),
                genome.num_top_segments(),
                genome.num_bottom_segments()
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::Alignment;
    use crate::sequence::SequenceInfo;
    use tempfile::tempdir;

    fn two_genome(dir: &std::path::Path) -> Alignment {
        let mut aln = Alignment::create(dir).unwrap();
        aln.add_root_genome("anc").unwrap();
        aln.add_leaf_genome("species", "anc", 0.25).unwrap();
        aln.genome_mut("anc")
            .unwrap()
            .set_dimensions(&[SequenceInfo::new("chrA", 8, 0, 1)])
            .unwrap();
        aln.genome_mut("species")
            .unwrap()
            .set_dimensions(&[
                SequenceInfo::new("chrA", 8, 1, 0),
                SequenceInfo::new("chrB", 4, 1, 0),
            ])
            .unwrap();
        aln
    }

    fn render(aln: &Alignment, mode: StatsMode) -> String {
        let mut out = Vec::new();
        StatsCommand::new().run(aln, &mode, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_summary_rows() {
        let dir = tempdir().unwrap();
        let aln = two_genome(dir.path());
        let text = render(&aln, StatsMode::Summary);
        assert!(text.starts_with("(species:0.25)anc;\n"));
        assert!(text.contains("anc, 1, 8, 1, 0, 1"));
        assert!(text.contains("species, 0, 12, 2, 2, 0"));
    }

    #[test]
    fn test_listings() {
        let dir = tempdir().unwrap();
        let aln = two_genome(dir.path());
        assert_eq!(render(&aln, StatsMode::Genomes), "anc\nspecies\n");
        assert_eq!(
            render(&aln, StatsMode::Sequences("species".to_string())),
            "chrA\nchrB\n"
        );
        assert_eq!(render(&aln, StatsMode::Tree), "(species:0.25)anc;\n");
        assert_eq!(
            render(&aln, StatsMode::Branches),
            "anc\tspecies\t0.25\n"
        );
        let span = render(
            &aln,
            StatsMode::Span("anc".to_string(), "species".to_string()),
        );
        assert_eq!(span, "anc\nspecies\n");
    }
}
