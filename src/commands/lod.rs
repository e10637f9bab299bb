//! Level-of-detail front end: write a coarsened copy of an alignment.

use std::path::{Path, PathBuf};

use crate::alignment::Alignment;
use crate::error::Result;
use crate::lod::{interpolate_alignment, LodParams};

pub struct LodCommand {
    out_path: PathBuf,
    params: LodParams,
}

impl LodCommand {
    pub fn new<P: AsRef<Path>>(out_path: P, params: LodParams) -> Self {
        Self {
            out_path: out_path.as_ref().to_path_buf(),
            params,
        }
    }

    pub fn run(&self, input: &Alignment) -> Result<()> {
        interpolate_alignment(input, &self.out_path, &self.params)?;
        Ok(())
    }
}
