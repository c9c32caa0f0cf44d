//! SHA-256 checksums of produced files.
//!
//! Only the artifacts a build reports are hashed, so files left in the root
//! by an earlier build never enter `meta/checksums.json`. Of those, files
//! under `meta/`, `data/` and `videos/` are hashed in 64 KiB chunks.
//! `meta/checksums.json` and `meta/manifest.json` are excluded: both are
//! rewritten after the checksums are taken. Keys are root-relative paths
//! with `/` separators, sorted.

use crate::error::Result;
use datakit_storage::layout::{CHECKSUMS_FILE, DATA_DIR, MANIFEST_FILE, META_DIR, VIDEOS_DIR};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

const CHUNK_SIZE: usize = 64 * 1024;

/// Path to hex digest.
pub type Checksums = BTreeMap<String, String>;

/// Hex SHA-256 of a file, read in fixed-size chunks.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn in_scope(relative: &str) -> bool {
    [META_DIR, DATA_DIR, VIDEOS_DIR]
        .iter()
        .any(|dir| relative.strip_prefix(dir).is_some_and(|rest| rest.starts_with('/')))
}

fn excluded(relative: &str) -> bool {
    relative == CHECKSUMS_FILE || relative == MANIFEST_FILE || relative.ends_with(".tmp")
}

/// Hash the root-relative `artifacts` of one build. A listed artifact that
/// cannot be read is an error.
pub fn compute_checksums(root: &Path, artifacts: &[String]) -> Result<Checksums> {
    let mut sums = Checksums::new();
    for rel in artifacts {
        let rel = rel.replace('\\', "/");
        if !in_scope(&rel) || excluded(&rel) {
            continue;
        }
        let digest = sha256_file(&root.join(&rel))?;
        sums.insert(rel, digest);
    }
    debug!(files = sums.len(), "Computed checksums");
    Ok(sums)
}

/// Write `meta/checksums.json`.
pub fn write_checksums(root: &Path, sums: &Checksums) -> Result<PathBuf> {
    let path = root.join(CHECKSUMS_FILE);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, serde_json::to_string_pretty(sums)?)?;
    Ok(path)
}

/// Re-hash the files listed in `meta/checksums.json`. Returns one message
/// per missing or modified file; empty means the dataset is intact.
pub fn verify_checksums(root: &Path) -> Result<Vec<String>> {
    let recorded: Checksums = serde_json::from_str(&fs::read_to_string(root.join(CHECKSUMS_FILE))?)?;
    let mut problems = Vec::new();
    for (rel, expected) in &recorded {
        let path = root.join(rel);
        if !path.is_file() {
            problems.push(format!("{rel}: missing"));
            continue;
        }
        let actual = sha256_file(&path)?;
        if &actual != expected {
            problems.push(format!("{rel}: checksum mismatch"));
        }
    }
    Ok(problems)
}
