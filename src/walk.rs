//! File discovery under a root, skipping the tool's own artifacts

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::DedupeError;
use crate::format::{ENCODED_SUFFIX, METADATA_FILE, REPORT_FILE, TMP_SUFFIX};

/// Recursively collect every regular file under `root`, sorted for stable
/// ordering. Symlinks and other special entries are left alone.
pub fn collect_files(root: &Path) -> Result<Vec<PathBuf>, DedupeError> {
    let mut files = Vec::new();
    collect_into(root, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_into(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), DedupeError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_into(&entry.path(), files)?;
        } else if file_type.is_file() {
            files.push(entry.path());
        }
    }
    Ok(())
}

/// True for files a dedupe pass must never rewrite: already-encoded outputs,
/// in-flight temporaries, the metadata record, the run report, and anything
/// matching a user-supplied suffix. Names that are not UTF-8 are skipped as
/// well since their encoded names could not be derived.
pub fn is_artifact(path: &Path, extra_suffixes: &[String]) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name,
        None => return true,
    };
    name == METADATA_FILE
        || name == REPORT_FILE
        || name.ends_with(ENCODED_SUFFIX)
        || name.ends_with(TMP_SUFFIX)
        || extra_suffixes.iter().any(|suffix| name.ends_with(suffix))
}

/// Candidate inputs for a dedupe pass.
pub fn dedupe_targets(root: &Path, extra_suffixes: &[String]) -> Result<Vec<PathBuf>, DedupeError> {
    Ok(collect_files(root)?
        .into_iter()
        .filter(|path| !is_artifact(path, extra_suffixes))
        .collect())
}

/// Encoded files awaiting restoration.
pub fn undedupe_targets(root: &Path) -> Result<Vec<PathBuf>, DedupeError> {
    Ok(collect_files(root)?
        .into_iter()
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(ENCODED_SUFFIX))
        })
        .collect())
}

/// Sum of on-disk sizes, for before and after accounting.
pub fn total_size(files: &[PathBuf]) -> Result<u64, DedupeError> {
    let mut total = 0;
    for file in files {
        total += fs::metadata(file)?.len();
    }
    Ok(total)
}
