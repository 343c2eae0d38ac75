//! Corpus loading.
//!
//! The corpus directory holds one reference source per unit
//! (`<unit>.py`, unit id = file stem). Each candidate directory holds
//! alternate sources with the same file names, either directly or in
//! per-variant subdirectories (`<dir>/<variant>/<unit>.py`).
//!
//! # Requirements
//!
//! - A missing corpus or candidate directory aborts the run.
//! - A reference whose signature cannot be extracted is skipped and
//!   listed, never fatal.
//! - The loaded repository is read-only and shared across workers.

use crate::config::Granularity;
use crate::error::{HarnessError, HarnessResult};
use crate::sandbox::ExecRequest;
use crate::signature::{Signature, SignatureCache};
use crate::synth::CallPlan;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// One implementation of a unit: the reference or a candidate.
#[derive(Debug, Clone)]
pub struct Unit {
    /// Unit id (file stem).
    pub id: String,
    /// Source text.
    pub source: String,
    /// Path the source was read from.
    pub origin: PathBuf,
    /// File name shown in tracebacks.
    pub filename: String,
    /// Class under test.
    pub class_name: String,
    /// Signature extracted from the reference.
    pub signature: Arc<Signature>,
}

impl Unit {
    /// Build a unit from its parts.
    pub fn new(id: impl Into<String>, source: String, origin: PathBuf, signature: Arc<Signature>) -> Self {
        let filename = origin
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| origin.display().to_string());
        Self {
            id: id.into(),
            source,
            class_name: signature.class_name.clone(),
            filename,
            origin,
            signature,
        }
    }

    /// Alternate implementation sharing this unit's id, class and signature.
    pub fn with_source(&self, source: String, origin: PathBuf) -> Self {
        Self::new(self.id.clone(), source, origin, Arc::clone(&self.signature))
    }

    /// Execution request for `plan` against this implementation.
    pub fn request<'a>(&'a self, plan: &'a CallPlan) -> ExecRequest<'a> {
        ExecRequest {
            unit_id: &self.id,
            source: &self.source,
            filename: &self.filename,
            class_name: &self.class_name,
            plan,
        }
    }
}

/// A reference that could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedUnit {
    /// Unit id.
    pub unit_id: String,
    /// Why it was skipped.
    pub reason: String,
}

/// Where one candidate's sources live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSource {
    /// Candidate id (directory name).
    pub candidate_id: String,
    /// Docstring variant subdirectory, if any.
    pub variant: Option<String>,
    /// Directory holding `<unit>.py` files.
    pub root: PathBuf,
}

impl CandidateSource {
    /// Report key under the given granularity.
    pub fn key(&self, granularity: Granularity) -> String {
        match (granularity, &self.variant) {
            (Granularity::PerVariant, Some(variant)) => format!("{}/{variant}", self.candidate_id),
            _ => self.candidate_id.clone(),
        }
    }

    /// Expected path of a unit's source.
    pub fn path_for(&self, unit_id: &str) -> PathBuf {
        self.root.join(format!("{unit_id}.py"))
    }
}

/// Read-only corpus: references, their signatures and the candidate layout.
#[derive(Debug, Default)]
pub struct Repository {
    units: BTreeMap<String, Arc<Unit>>,
    skipped: Vec<SkippedUnit>,
    signatures: SignatureCache,
    candidates: Vec<CandidateSource>,
}

impl Repository {
    /// Load the corpus and discover candidate layouts.
    pub fn load(corpus_dir: &Path, candidate_dirs: &[PathBuf]) -> HarnessResult<Self> {
        let mut repo = Self::default();
        for path in python_files(corpus_dir)? {
            if let Err(e) = repo.add_reference(&path) {
                if e.is_fatal() {
                    return Err(e);
                }
                repo.skip(stem(&path), e.to_string());
            }
        }
        for dir in candidate_dirs {
            repo.add_candidate_dir(dir)?;
        }
        info!(
            units = repo.units.len(),
            skipped = repo.skipped.len(),
            candidates = repo.candidates.len(),
            "corpus loaded"
        );
        Ok(repo)
    }

    fn add_reference(&mut self, path: &Path) -> HarnessResult<()> {
        let id = stem(path);
        let bytes = fs::read(path).map_err(|e| HarnessError::io(path, e))?;
        let source = match String::from_utf8(bytes) {
            Ok(source) => source,
            Err(_) => {
                self.skip(id, "source is not valid UTF-8".to_string());
                return Ok(());
            }
        };
        let signature = self.signatures.load(&id, &source)?;
        let unit = Unit::new(id.clone(), source, path.to_path_buf(), signature);
        self.units.insert(id, Arc::new(unit));
        Ok(())
    }

    fn skip(&mut self, unit_id: String, reason: String) {
        warn!(unit = %unit_id, %reason, "skipping unit");
        self.skipped.push(SkippedUnit { unit_id, reason });
    }

    fn add_candidate_dir(&mut self, dir: &Path) -> HarnessResult<()> {
        if !dir.is_dir() {
            return Err(HarnessError::CorpusMissing(dir.to_path_buf()));
        }
        let mut candidate_id = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());
        if self.candidates.iter().any(|c| c.candidate_id == candidate_id) {
            candidate_id = dir.display().to_string();
        }

        if !python_files(dir)?.is_empty() {
            self.candidates.push(CandidateSource {
                candidate_id: candidate_id.clone(),
                variant: None,
                root: dir.to_path_buf(),
            });
        }
        for sub in subdirectories(dir)? {
            if python_files(&sub)?.is_empty() {
                continue;
            }
            let variant = sub
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.candidates.push(CandidateSource {
                candidate_id: candidate_id.clone(),
                variant: Some(variant),
                root: sub,
            });
        }
        Ok(())
    }

    /// References in id order.
    pub fn units(&self) -> impl Iterator<Item = &Arc<Unit>> {
        self.units.values()
    }

    /// Look up a reference.
    pub fn unit(&self, id: &str) -> Option<&Arc<Unit>> {
        self.units.get(id)
    }

    /// Number of usable references.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether no reference was usable.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// References that could not be used.
    pub fn skipped(&self) -> &[SkippedUnit] {
        &self.skipped
    }

    /// Candidate layouts in discovery order.
    pub fn candidates(&self) -> &[CandidateSource] {
        &self.candidates
    }

    /// Shared signature cache.
    pub fn signatures(&self) -> &SignatureCache {
        &self.signatures
    }

    /// Read a candidate's implementation of `unit`; `Ok(None)` when absent.
    pub fn load_candidate(&self, unit: &Unit, candidate: &CandidateSource) -> HarnessResult<Option<Unit>> {
        let path = candidate.path_for(&unit.id);
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = fs::read(&path).map_err(|e| HarnessError::io(&path, e))?;
        let source = String::from_utf8_lossy(&bytes).into_owned();
        Ok(Some(unit.with_source(source, path)))
    }
}

/// `*.py` files directly inside `dir`, sorted, excluding generated tests
/// and package markers.
fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn python_files(dir: &Path) -> HarnessResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(HarnessError::CorpusMissing(dir.to_path_buf()));
    }
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| HarnessError::io(dir, e))?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "py"))
        .filter(|path| {
            path.file_stem()
                .map(|s| s.to_string_lossy())
                .is_some_and(|stem| !stem.starts_with("test_") && !stem.starts_with("__"))
        })
        .collect();
    files.sort();
    Ok(files)
}

fn subdirectories(dir: &Path) -> HarnessResult<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| HarnessError::io(dir, e))?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, text: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(name), text).unwrap();
    }

    const COUNTER: &str = "class Counter:\n    def increment(self) -> int:\n        return 1\n";

    #[test]
    fn test_load_references_and_skip_unparsable() {
        let tmp = tempfile::tempdir().unwrap();
        let corpus = tmp.path().join("corpus");
        write(&corpus, "counter.py", COUNTER);
        write(&corpus, "broken.py", "class Broken(:\n    pass\n");
        write(&corpus, "test_counter_seed_1.py", "import unittest\n");
        write(&corpus, "notes.txt", "ignored");

        let repo = Repository::load(&corpus, &[]).unwrap();
        assert_eq!(repo.len(), 1);
        let unit = repo.unit("counter").unwrap();
        assert_eq!(unit.class_name, "Counter");
        assert_eq!(unit.filename, "counter.py");
        assert_eq!(repo.skipped().len(), 1);
        assert_eq!(repo.skipped()[0].unit_id, "broken");
        assert_eq!(repo.signatures().len(), 1);
    }

    #[test]
    fn test_missing_corpus_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Repository::load(&tmp.path().join("nope"), &[]).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_candidate_layouts() {
        let tmp = tempfile::tempdir().unwrap();
        let corpus = tmp.path().join("corpus");
        write(&corpus, "counter.py", COUNTER);
        let flat = tmp.path().join("engine_a");
        write(&flat, "counter.py", COUNTER);
        let variants = tmp.path().join("engine_b");
        write(&variants.join("full_docstring"), "counter.py", COUNTER);
        write(&variants.join("no_docstring"), "other.py", COUNTER);

        let repo = Repository::load(&corpus, &[flat, variants]).unwrap();
        let keys: Vec<String> = repo
            .candidates()
            .iter()
            .map(|c| c.key(Granularity::PerVariant))
            .collect();
        assert_eq!(keys, vec!["engine_a", "engine_b/full_docstring", "engine_b/no_docstring"]);
        assert_eq!(repo.candidates()[2].key(Granularity::PerUnit), "engine_b");

        let unit = repo.unit("counter").unwrap();
        let found = repo.load_candidate(unit, &repo.candidates()[1]).unwrap();
        assert!(found.is_some());
        let missing = repo.load_candidate(unit, &repo.candidates()[2]).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_missing_candidate_dir_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let corpus = tmp.path().join("corpus");
        write(&corpus, "counter.py", COUNTER);
        let err = Repository::load(&corpus, &[tmp.path().join("ghost")]).unwrap_err();
        assert!(matches!(err, HarnessError::CorpusMissing(_)));
    }
}
