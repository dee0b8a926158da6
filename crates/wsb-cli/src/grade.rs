//! Scoring of bridge responses against a reference transcript.

use anyhow::{bail, Context, Result};
use std::path::Path;

/// Score printed for a fully matching run.
pub const FULL_SCORE: u32 = 100;

/// Load the reference transcript: one expected response per line.
pub fn load_reference(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read reference {}", path.display()))?;
    let lines: Vec<String> = content
        .lines()
        .map(|line| line.trim_end_matches('\r').to_string())
        .collect();
    if lines.is_empty() {
        bail!("reference {} is empty", path.display());
    }
    Ok(lines)
}

/// First difference found between a client's transcript and the reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub client: usize,
    pub index: usize,
    pub got: Option<String>,
    pub expected: Option<String>,
}

/// Outcome of grading one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grade {
    pub score: u32,
    pub mismatch: Option<Mismatch>,
}

impl Grade {
    pub fn passed(&self) -> bool {
        self.mismatch.is_none()
    }
}

/// Every client must reproduce the reference exactly, response by response.
pub fn grade(transcripts: &[Vec<String>], reference: &[String]) -> Grade {
    for (client, transcript) in transcripts.iter().enumerate() {
        let len = transcript.len().max(reference.len());
        for index in 0..len {
            let got = transcript.get(index);
            let expected = reference.get(index);
            if got != expected {
                return Grade {
                    score: 0,
                    mismatch: Some(Mismatch {
                        client,
                        index,
                        got: got.cloned(),
                        expected: expected.cloned(),
                    }),
                };
            }
        }
    }
    Grade {
        score: FULL_SCORE,
        mismatch: None,
    }
}
