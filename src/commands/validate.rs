//! Validation front end: run the invariant battery over a container.

use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::alignment::Alignment;
use crate::error::Result;
use crate::validate::validate_genome;

/// Validate one genome or the whole container.
pub struct ValidateCommand {
    path: PathBuf,
    genome: Option<String>,
}

impl ValidateCommand {
    pub fn new<P: AsRef<Path>>(path: P, genome: Option<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            genome,
        }
    }

    pub fn run(&self) -> Result<()> {
        let aln = Alignment::open(&self.path)?;
        if let Some(name) = &self.genome {
            let gid = aln.genome_id(name)?;
            return validate_genome(&aln, gid);
        }
        let names: Vec<String> = aln.genomes().map(|g| g.name().to_string()).collect();
        drop(aln);
        // one container handle per worker; a handle's page caches are
        // single-threaded by design
        names
            .par_iter()
            .map(|name| {
                let aln = Alignment::open(&self.path)?;
                validate_genome(&aln, aln.genome_id(name)?)
            })
            .collect::<Result<Vec<()>>>()?;
        Ok(())
    }
}
