//! STRATA command-line interface.
//!
//! Usage: strata <COMMAND> [OPTIONS]

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use strata_genomics::alignment::Alignment;
use strata_genomics::commands::{
    LiftoverCommand, LodCommand, MaskExtractCommand, MutationsCommand, StatsCommand, StatsMode,
    ValidateCommand,
};
use strata_genomics::error::{Result, StrataError};
use strata_genomics::lod::LodParams;

#[derive(Parser)]
#[command(name = "strata")]
#[command(version)]
#[command(about = "STRATA: hierarchical whole-genome alignment storage and queries", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print alignment metadata
    Stats {
        /// Alignment container path
        path: PathBuf,

        /// Print only the genome names
        #[arg(long)]
        genomes: bool,

        /// Print the sequence names of the given genome
        #[arg(long)]
        sequences: Option<String>,

        /// Print per-sequence dimensions of the given genome
        #[arg(long = "sequence-stats")]
        sequence_stats: Option<String>,

        /// Print only the Newick tree
        #[arg(long)]
        tree: bool,

        /// Print every branch with its length
        #[arg(long)]
        branches: bool,

        /// Print the genomes spanning a pair, as A,B
        #[arg(long)]
        span: Option<String>,
    },

    /// Check the structural invariants of a container
    Validate {
        /// Alignment container path
        path: PathBuf,

        /// Validate only this genome
        #[arg(long)]
        genome: Option<String>,
    },

    /// Map BED intervals between genomes
    Liftover {
        /// Alignment container path
        path: PathBuf,

        /// Source genome name
        src_genome: String,

        /// Input BED file (use - for stdin)
        src_bed: String,

        /// Target genome name
        tgt_genome: String,

        /// Output BED file (use - for stdout)
        tgt_bed: String,

        /// Do not map through duplications
        #[arg(long = "no-dupes")]
        no_dupes: bool,

        /// Write PSL instead of BED
        #[arg(long = "out-psl")]
        out_psl: bool,

        /// Map through this ancestor instead of the MRCA
        #[arg(long = "coalescence-limit")]
        coalescence_limit: Option<String>,
    },

    /// Write soft-masked intervals of a genome as BED
    MaskExtract {
        /// Alignment container path
        path: PathBuf,

        /// Genome to scan
        genome: String,

        /// Output BED file (stdout when omitted)
        #[arg(long = "mask-file")]
        mask_file: Option<PathBuf>,

        /// Extend masked intervals by this many bases
        #[arg(long)]
        extend: Option<u64>,

        /// Extend masked intervals by this fraction of their length
        #[arg(long = "extend-pct")]
        extend_pct: Option<f64>,
    },

    /// Print a per-branch mutation summary table
    SummarizeMutations {
        /// Alignment container path
        path: PathBuf,

        /// Analyze only the subtree below this genome
        #[arg(long = "root-genome")]
        root_genome: Option<String>,

        /// Restrict rows to these child genomes, comma separated
        #[arg(long = "target-genomes")]
        target_genomes: Option<String>,

        /// Indels smaller than this are gaps, not rearrangements
        #[arg(long = "max-gap", default_value = "10")]
        max_gap: u64,

        /// Skip segments whose N fraction exceeds this
        #[arg(long = "max-n-fraction", default_value = "1.0")]
        max_n_fraction: f64,

        /// Count substitutions only
        #[arg(long = "just-subs")]
        just_subs: bool,
    },

    /// Build a coarsened (level-of-detail) copy of an alignment
    Lod {
        /// Input alignment container path
        in_path: PathBuf,

        /// Output alignment container path
        out_path: PathBuf,

        /// Step scale relative to the mean block size
        #[arg(long, default_value = "10.0")]
        scale: f64,

        /// Convert only the subtree below this genome
        #[arg(long)]
        root: Option<String>,

        /// Copy DNA into the output
        #[arg(long = "keep-sequences")]
        keep_sequences: bool,

        /// Sample every sequence regardless of length
        #[arg(long = "all-sequences")]
        all_sequences: bool,

        /// Fraction of each probe window to probe
        #[arg(long = "probe-frac", default_value = "0.035")]
        probe_frac: f64,

        /// Skip sequences shorter than this fraction of the step
        #[arg(long = "min-seq-frac", default_value = "0.5")]
        min_seq_frac: f64,
    },
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Stats {
            path,
            genomes,
            sequences,
            sequence_stats,
            tree,
            branches,
            span,
        } => run_stats(path, genomes, sequences, sequence_stats, tree, branches, span),
        Commands::Validate { path, genome } => ValidateCommand::new(path, genome).run(),
        Commands::Liftover {
            path,
            src_genome,
            src_bed,
            tgt_genome,
            tgt_bed,
            no_dupes,
            out_psl,
            coalescence_limit,
        } => run_liftover(
            path,
            src_genome,
            src_bed,
            tgt_genome,
            tgt_bed,
            no_dupes,
            out_psl,
            coalescence_limit,
        ),
        Commands::MaskExtract {
            path,
            genome,
            mask_file,
            extend,
            extend_pct,
        } => run_mask_extract(path, genome, mask_file, extend, extend_pct),
        Commands::SummarizeMutations {
            path,
            root_genome,
            target_genomes,
            max_gap,
            max_n_fraction,
            just_subs,
        } => run_mutations(
            path,
            root_genome,
            target_genomes,
            max_gap,
            max_n_fraction,
            just_subs,
        ),
        Commands::Lod {
            in_path,
            out_path,
            scale,
            root,
            keep_sequences,
            all_sequences,
            probe_frac,
            min_seq_frac,
        } => {
            let params = LodParams {
                scale,
                root,
                keep_sequences,
                all_sequences,
                probe_frac,
                min_seq_frac,
            };
            Alignment::open(in_path).and_then(|aln| LodCommand::new(out_path, params).run(&aln))
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run_stats(
    path: PathBuf,
    genomes: bool,
    sequences: Option<String>,
    sequence_stats: Option<String>,
    tree: bool,
    branches: bool,
    span: Option<String>,
) -> Result<()> {
    let aln = Alignment::open(path)?;
    let mode = if genomes {
        StatsMode::Genomes
    } else if let Some(g) = sequences {
        StatsMode::Sequences(g)
    } else if let Some(g) = sequence_stats {
        StatsMode::SequenceStats(g)
    } else if tree {
        StatsMode::Tree
    } else if branches {
        StatsMode::Branches
    } else if let Some(pair) = span {
        let (a, b) = pair.split_once(',').ok_or_else(|| {
            StrataError::InvalidArgument("--span takes two genome names as A,B".to_string())
        })?;
        StatsMode::Span(a.to_string(), b.to_string())
    } else {
        StatsMode::Summary
    };
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    StatsCommand::new().run(&aln, &mode, &mut handle)
}

fn run_liftover(
    path: PathBuf,
    src_genome: String,
    src_bed: String,
    tgt_genome: String,
    tgt_bed: String,
    no_dupes: bool,
    out_psl: bool,
    coalescence_limit: Option<String>,
) -> Result<()> {
    let aln = Alignment::open(path)?;
    let cmd = LiftoverCommand::new()
        .with_no_dupes(no_dupes)
        .with_psl(out_psl)
        .with_coalescence_limit(coalescence_limit);

    let input: Box<dyn Read> = if src_bed == "-" {
        Box::new(io::stdin())
    } else {
        Box::new(File::open(&src_bed)?)
    };
    let output: Box<dyn Write> = if tgt_bed == "-" {
        Box::new(io::stdout())
    } else {
        Box::new(File::create(&tgt_bed)?)
    };
    cmd.run(&aln, &src_genome, input, &tgt_genome, output)
}

fn run_mask_extract(
    path: PathBuf,
    genome: String,
    mask_file: Option<PathBuf>,
    extend: Option<u64>,
    extend_pct: Option<f64>,
) -> Result<()> {
    let aln = Alignment::open(path)?;
    let mut cmd = MaskExtractCommand::new();
    if let Some(extend) = extend {
        cmd = cmd.with_extend(extend);
    }
    if let Some(pct) = extend_pct {
        cmd = cmd.with_extend_pct(pct);
    }
    match mask_file {
        Some(file) => cmd.run(&aln, &genome, File::create(file)?),
        None => cmd.run(&aln, &genome, io::stdout().lock()),
    }
}

fn run_mutations(
    path: PathBuf,
    root_genome: Option<String>,
    target_genomes: Option<String>,
    max_gap: u64,
    max_n_fraction: f64,
    just_subs: bool,
) -> Result<()> {
    let aln = Alignment::open(path)?;
    let cmd = MutationsCommand {
        max_gap,
        max_n_fraction,
        just_subs,
        root: root_genome,
        targets: target_genomes.map(|t| t.split(',').map(|s| s.trim().to_string()).collect()),
    };
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    cmd.run(&aln, &mut handle)
}
