//! Alignment container: a rooted tree of genomes on disk.
//!
//! One alignment is one directory. A `tree` file at the top records each
//! genome's name, parent and branch length in creation order (parents before
//! children); every genome lives in its own sub-directory of paged-array
//! datasets. Genomes form an arena indexed by creation order, so tree walks
//! are plain index lookups.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{Result, StrataError};
use crate::genome::Genome;

const TREE_FILE: &str = "tree";

/// One hop of a path through the alignment tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeStep {
    /// Move to the parent genome.
    Up,
    /// Move to the child genome with this arena id.
    Down(usize),
}

pub struct Alignment {
    dir: PathBuf,
    writable: bool,
    genomes: Vec<Genome>,
    by_name: FxHashMap<String, usize>,
}

impl Alignment {
    /// Create a new, empty container directory.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        fs::create_dir_all(path.as_ref())?;
        Ok(Self {
            dir: path.as_ref().to_path_buf(),
            writable: true,
            genomes: Vec::new(),
            by_name: FxHashMap::default(),
        })
    }

    /// Open an existing container read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let dir = path.as_ref().to_path_buf();
        let tree_text = fs::read_to_string(dir.join(TREE_FILE)).map_err(|e| {
            StrataError::Schema(format!(
                "{}: cannot read alignment tree: {}",
                dir.display(),
                e
            ))
        })?;
        let mut entries: Vec<(String, Option<String>, f64)> = Vec::new();
        for (lineno, line) in tree_text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split('\t');
            let name = fields.next().unwrap_or_default().to_string();
            let parent = fields.next().unwrap_or_default();
            let branch: f64 = fields
                .next()
                .unwrap_or("0")
                .parse()
                .map_err(|_| StrataError::Schema(format!("tree line {}: bad branch", lineno + 1)))?;
            if name.is_empty() {
                return Err(StrataError::Schema(format!(
                    "tree line {}: empty genome name",
                    lineno + 1
                )));
            }
            let parent = if parent == "-" {
                None
            } else {
                Some(parent.to_string())
            };
            entries.push((name, parent, branch));
        }

        let mut by_name: FxHashMap<String, usize> = FxHashMap::default();
        for (i, (name, _, _)) in entries.iter().enumerate() {
            if by_name.insert(name.clone(), i).is_some() {
                return Err(StrataError::Duplicate(format!("genome '{}'", name)));
            }
        }
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); entries.len()];
        let mut parents: Vec<Option<usize>> = vec![None; entries.len()];
        for (i, (name, parent, _)) in entries.iter().enumerate() {
            if let Some(pname) = parent {
                let p = *by_name.get(pname).ok_or_else(|| {
                    StrataError::Schema(format!("genome '{}': unknown parent '{}'", name, pname))
                })?;
                parents[i] = Some(p);
                children[p].push(i);
            }
        }

        let mut genomes = Vec::with_capacity(entries.len());
        for (i, (name, _, branch)) in entries.iter().enumerate() {
            genomes.push(Genome::open(
                dir.join(name),
                name.clone(),
                i,
                parents[i],
                std::mem::take(&mut children[i]),
                *branch,
            )?);
        }

        Ok(Self {
            dir,
            writable: false,
            genomes,
            by_name,
        })
    }

    fn check_name(&self, name: &str) -> Result<()> {
        if name.is_empty()
            || name.chars().any(|c| matches!(c, '\t' | '\n' | '/'))
            || name == "."
            || name == ".."
        {
            return Err(StrataError::InvalidArgument(format!(
                "bad genome name '{}'",
                name
            )));
        }
        if self.by_name.contains_key(name) {
            return Err(StrataError::Duplicate(format!("genome '{}'", name)));
        }
        Ok(())
    }

    /// Add the root genome; the container must be empty.
    pub fn add_root_genome(&mut self, name: &str) -> Result<usize> {
        if !self.writable {
            return Err(StrataError::InvalidArgument(
                "alignment opened read-only".to_string(),
            ));
        }
        if !self.genomes.is_empty() {
            return Err(StrataError::InvalidArgument(
                "alignment already has a root".to_string(),
            ));
        }
        self.check_name(name)?;
        let id = 0;
        self.genomes.push(Genome::new_writable(
            self.dir.join(name),
            name.to_string(),
            id,
            None,
            0.0,
        )?);
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    /// Add a leaf genome below an existing parent.
    pub fn add_leaf_genome(&mut self, name: &str, parent: &str, branch_length: f64) -> Result<usize> {
        if !self.writable {
            return Err(StrataError::InvalidArgument(
                "alignment opened read-only".to_string(),
            ));
        }
        self.check_name(name)?;
        let pid = self.genome_id(parent)?;
        let id = self.genomes.len();
        self.genomes.push(Genome::new_writable(
            self.dir.join(name),
            name.to_string(),
            id,
            Some(pid),
            branch_length,
        )?);
        self.by_name.insert(name.to_string(), id);
        self.genomes[pid].children.push(id);
        Ok(id)
    }

    // ------------------------------------------------------------------
    // lookups

    #[inline]
    pub fn num_genomes(&self) -> usize {
        self.genomes.len()
    }

    pub fn genome_id(&self, name: &str) -> Result<usize> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| StrataError::NotFound(format!("genome '{}'", name)))
    }

    pub fn genome(&self, name: &str) -> Result<&Genome> {
        Ok(&self.genomes[self.genome_id(name)?])
    }

    pub fn genome_mut(&mut self, name: &str) -> Result<&mut Genome> {
        let id = self.genome_id(name)?;
        Ok(&mut self.genomes[id])
    }

    #[inline]
    pub fn genome_by_id(&self, id: usize) -> &Genome {
        &self.genomes[id]
    }

    pub fn genome_by_id_mut(&mut self, id: usize) -> &mut Genome {
        &mut self.genomes[id]
    }

    pub fn root(&self) -> Result<&Genome> {
        self.genomes
            .first()
            .ok_or_else(|| StrataError::NotFound("alignment has no genomes".to_string()))
    }

    /// Genomes in creation order (parents before children).
    pub fn genomes(&self) -> std::slice::Iter<'_, Genome> {
        self.genomes.iter()
    }

    pub fn branch_length(&self, child: &str) -> Result<f64> {
        Ok(self.genome(child)?.branch_length())
    }

    /// Position of `child` in `parent`'s child list.
    pub fn child_slot(&self, parent: usize, child: usize) -> Result<usize> {
        self.genomes[parent]
            .children
            .iter()
            .position(|&c| c == child)
            .ok_or_else(|| {
                StrataError::InvalidArgument(format!(
                    "'{}' is not a child of '{}'",
                    self.genomes[child].name(),
                    self.genomes[parent].name()
                ))
            })
    }

    // ------------------------------------------------------------------
    // tree walks

    fn depth(&self, mut id: usize) -> usize {
        let mut d = 0;
        while let Some(p) = self.genomes[id].parent {
            id = p;
            d += 1;
        }
        d
    }

    /// Most recent common ancestor of two genomes.
    pub fn mrca(&self, a: usize, b: usize) -> usize {
        let (mut a, mut b) = (a, b);
        let (mut da, mut db) = (self.depth(a), self.depth(b));
        while da > db {
            a = self.genomes[a].parent.unwrap();
            da -= 1;
        }
        while db > da {
            b = self.genomes[b].parent.unwrap();
            db -= 1;
        }
        while a != b {
            a = self.genomes[a].parent.unwrap();
            b = self.genomes[b].parent.unwrap();
        }
        a
    }

    /// Steps from `src` to `tgt`, optionally detouring through `via` (an
    /// ancestor of the MRCA) instead of turning at the MRCA itself.
    pub fn tree_path(&self, src: usize, tgt: usize, via: Option<usize>) -> Result<Vec<TreeStep>> {
        let mut turn = self.mrca(src, tgt);
        if let Some(v) = via {
            if self.mrca(v, turn) != v {
                return Err(StrataError::InvalidArgument(format!(
                    "'{}' is not an ancestor of the common ancestor '{}'",
                    self.genomes[v].name(),
                    self.genomes[turn].name()
                )));
            }
            turn = v;
        }
        let mut steps = Vec::new();
        let mut cur = src;
        while cur != turn {
            steps.push(TreeStep::Up);
            cur = self.genomes[cur].parent.unwrap();
        }
        // collect the downward leg from the target back to the turn point
        let mut down = Vec::new();
        let mut cur = tgt;
        while cur != turn {
            down.push(TreeStep::Down(cur));
            cur = self.genomes[cur].parent.unwrap();
        }
        steps.extend(down.into_iter().rev());
        Ok(steps)
    }

    /// Every genome on a path between two members of `targets` (the spanning
    /// tree of the target set).
    pub fn spanning_set(&self, targets: &[usize]) -> FxHashSet<usize> {
        let mut span = FxHashSet::default();
        for &t in targets {
            span.insert(t);
        }
        for (i, &a) in targets.iter().enumerate() {
            for &b in targets.iter().skip(i + 1) {
                let m = self.mrca(a, b);
                let mut cur = a;
                while cur != m {
                    span.insert(cur);
                    cur = self.genomes[cur].parent.unwrap();
                }
                let mut cur = b;
                while cur != m {
                    span.insert(cur);
                    cur = self.genomes[cur].parent.unwrap();
                }
                span.insert(m);
            }
        }
        span
    }

    /// Render the tree in Newick notation.
    pub fn newick(&self) -> Result<String> {
        let root = self.root()?;
        let mut out = String::new();
        self.newick_node(root.id(), &mut out);
        out.push(';');
        Ok(out)
    }

    fn newick_node(&self, id: usize, out: &mut String) {
        let g = &self.genomes[id];
        if !g.children.is_empty() {
            out.push('(');
            for (i, &c) in g.children.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                self.newick_node(c, out);
            }
            out.push(')');
        }
        out.push_str(g.name());
        if g.parent.is_some() {
            let _ = write!(out, ":{}", g.branch_length());
        }
    }

    /// Write the tree metadata and every genome's dirty pages.
    pub fn flush(&self) -> Result<()> {
        if self.writable {
            let mut text = String::new();
            for g in &self.genomes {
                let parent = match g.parent {
                    Some(p) => self.genomes[p].name(),
                    None => "-",
                };
                let _ = writeln!(text, "{}\t{}\t{}", g.name(), parent, g.branch_length());
            }
            fs::write(self.dir.join(TREE_FILE), text)?;
        }
        for g in &self.genomes {
            g.flush()?;
        }
        Ok(())
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.dir
    }
}
