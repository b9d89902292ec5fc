//! Content from a plain text file
//!
//! Paragraphs (separated by blank lines) are posts. Each line inside a
//! paragraph is an alternative wording of the same post, longest preferred
//! by the backend when it fits.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use libchorus::ContentGenerator;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

pub struct LineFileGenerator {
    source: PathBuf,
    posts: Vec<Vec<String>>,
    rng: StdRng,
}

impl LineFileGenerator {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read content file {}", path.display()))?;
        let posts = parse_paragraphs(&text);
        debug!(path = %path.display(), posts = posts.len(), "Loaded content file");

        Ok(Self {
            source: path.to_path_buf(),
            posts,
            rng: StdRng::from_entropy(),
        })
    }

    /// Use a fixed seed so picks are reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn source(&self) -> &Path {
        &self.source
    }
}

#[async_trait]
impl ContentGenerator for LineFileGenerator {
    async fn generate(&mut self) -> libchorus::Result<Option<Vec<String>>> {
        Ok(self.posts.choose(&mut self.rng).cloned())
    }
}

fn parse_paragraphs(text: &str) -> Vec<Vec<String>> {
    let mut posts = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !current.is_empty() {
                posts.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line.to_string());
        }
    }
    if !current.is_empty() {
        posts.push(current);
    }

    posts
}
