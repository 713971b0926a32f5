//! Session orchestration: whole-tree dedupe and restore passes
//!
//! Every rewrite is committed per file: encode or decode into a temporary
//! next to the target, rename onto the final name, then delete the source.
//! A failed file keeps its original form and the rest of the batch carries
//! on. The dictionary record is written before the first rewrite and, on
//! restore, deleted only after the whole tree is back.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::DedupeConfig;
use crate::decoder::{self, DecodeStats};
use crate::dictionary::{Dictionary, InverseDictionary};
use crate::encoder::{self, EncodeStats};
use crate::error::DedupeError;
use crate::estimator;
use crate::format::{self, ENCODED_SUFFIX, METADATA_FILE, REPORT_FILE};
use crate::metadata::{self, Metadata};
use crate::optimizer::{self, SearchResult};
use crate::scanner;
use crate::walk;

/// One file the pass could not rewrite, with the reason it was skipped.
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of a dedupe pass, also written to the tree as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct DedupeReport {
    pub block_size: usize,
    pub files_encoded: usize,
    pub failures: Vec<FileFailure>,
    pub bytes_before: u64,
    pub bytes_after: u64,
    /// Present only when a fresh block-size search ran.
    pub search: Option<SearchResult>,
}

impl DedupeReport {
    /// Tree size relative to before the pass, 1.0 for an empty tree.
    pub fn ratio(&self) -> f64 {
        if self.bytes_before == 0 {
            1.0
        } else {
            self.bytes_after as f64 / self.bytes_before as f64
        }
    }
}

impl fmt::Display for DedupeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "encoded {} files at block size {} ({} failed)",
            self.files_encoded,
            self.block_size,
            self.failures.len()
        )?;
        if let Some(search) = &self.search {
            writeln!(
                f,
                "estimated savings: {}",
                format_bytes(search.estimated_savings)
            )?;
        }
        writeln!(
            f,
            "memory saved: {}",
            format_bytes(self.bytes_before as i64 - self.bytes_after as i64)
        )?;
        write!(f, "compression ratio: {:.4}%", self.ratio() * 100.0)
    }
}

/// Outcome of a whole-tree restore pass.
#[derive(Debug, Clone, Serialize)]
pub struct UndedupeReport {
    pub files_restored: usize,
    pub failures: Vec<FileFailure>,
    pub bytes_encoded: u64,
    pub bytes_restored: u64,
}

impl fmt::Display for UndedupeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "restored {} files ({} failed): {} -> {}",
            self.files_restored,
            self.failures.len(),
            format_bytes(self.bytes_encoded as i64),
            format_bytes(self.bytes_restored as i64)
        )
    }
}

/// Human-readable byte count with binary units, negative values allowed.
pub fn format_bytes(bytes: i64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value.abs() > 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

/// Deduplicates a whole tree: picks a block size (unless a previous run left
/// its dictionary behind), persists the dictionary, then rewrites files
/// concurrently.
pub struct DedupeSession {
    root: PathBuf,
    config: DedupeConfig,
}

impl DedupeSession {
    pub fn new(root: impl Into<PathBuf>, config: DedupeConfig) -> Result<Self, DedupeError> {
        config.validate()?;
        Ok(Self {
            root: root.into(),
            config,
        })
    }

    /// Run the full pass and return its report. Per-file failures are
    /// collected in the report; only corpus-level problems abort the run.
    pub async fn run(&self) -> Result<DedupeReport, DedupeError> {
        let bytes_before = walk::total_size(&walk::collect_files(&self.root)?)?;
        let targets = walk::dedupe_targets(&self.root, &self.config.excluded_suffixes)?;
        info!(
            root = %self.root.display(),
            files = targets.len(),
            "dedupe pass starting"
        );

        let metadata_path = self.root.join(METADATA_FILE);
        let (metadata, block_size, search) = if metadata_path.is_file() {
            info!("reusing dictionary from a previous run");
            let metadata = Metadata::load(&metadata_path)?;
            let block_size = metadata.dictionary.block_size().ok_or_else(|| {
                DedupeError::CorruptDictionary("persisted dictionary has no entries".to_string())
            })?;
            (metadata, block_size, None)
        } else {
            let search = self.search(&targets).await?;
            info!(
                block_size = search.block_size,
                estimated_savings = search.estimated_savings,
                converged = search.converged,
                "block size chosen"
            );

            let table =
                scanner::scan_corpus(&targets, search.block_size, self.config.max_workers).await?;
            let dictionary = Dictionary::build(&table, search.block_size);
            if dictionary.is_empty() {
                info!("nothing recurs at the chosen block size, leaving the tree unchanged");
                let report = DedupeReport {
                    block_size: search.block_size,
                    files_encoded: 0,
                    failures: Vec::new(),
                    bytes_before,
                    bytes_after: bytes_before,
                    search: Some(search),
                };
                self.write_report(&report);
                return Ok(report);
            }

            let metadata = Metadata::new(self.config.prefix_len, dictionary);
            // The record must exist before the first rewrite, or a crash
            // could leave encoded files with no way to decode them.
            metadata.save(&self.root)?;
            (metadata, search.block_size, Some(search))
        };

        let Metadata {
            prefix_len,
            dictionary,
        } = metadata;
        let dictionary = Arc::new(dictionary);

        let semaphore = Arc::new(Semaphore::new(self.config.max_workers));
        let mut tasks = JoinSet::new();
        for path in targets {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(DedupeError::worker)?;
            let dictionary = Arc::clone(&dictionary);
            tasks.spawn(async move {
                let _permit = permit;
                tokio::task::spawn_blocking(move || {
                    let result = encode_one(&path, &dictionary, block_size, prefix_len);
                    (path, result)
                })
                .await
            });
        }

        let mut files_encoded = 0;
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (path, result) = joined
                .and_then(|inner| inner)
                .map_err(DedupeError::worker)?;
            match result {
                Ok(stats) => {
                    files_encoded += 1;
                    debug!(path = %path.display(), ratio = stats.ratio(), "file encoded");
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "file left unchanged");
                    failures.push(FileFailure {
                        path,
                        reason: err.to_string(),
                    });
                }
            }
        }

        let bytes_after = walk::total_size(&walk::collect_files(&self.root)?)?;
        let report = DedupeReport {
            block_size,
            files_encoded,
            failures,
            bytes_before,
            bytes_after,
            search,
        };
        self.write_report(&report);
        if !report.failures.is_empty() {
            warn!(failed = report.failures.len(), "some files were left unchanged");
        }
        Ok(report)
    }

    async fn search(&self, files: &[PathBuf]) -> Result<SearchResult, DedupeError> {
        let files: Arc<[PathBuf]> = files.to_vec().into();
        let prefix_len = self.config.prefix_len;
        let max_workers = self.config.max_workers;
        optimizer::search_block_size(
            self.config.block_size,
            self.config.search_step,
            self.config.search_iterations,
            move |size| {
                let files = Arc::clone(&files);
                async move {
                    let table = scanner::scan_corpus(&files, size, max_workers).await?;
                    Ok(estimator::estimated_savings(&table, size, prefix_len))
                }
            },
        )
        .await
    }

    fn write_report(&self, report: &DedupeReport) {
        let path = self.root.join(REPORT_FILE);
        match serde_json::to_vec_pretty(report) {
            Ok(bytes) => {
                if let Err(err) = fs::write(&path, bytes) {
                    warn!(path = %path.display(), error = %err, "could not write run report");
                }
            }
            Err(err) => warn!(error = %err, "could not serialize run report"),
        }
    }
}

/// Restores encoded files using the dictionary found at or above the start
/// directory.
pub struct UndedupeSession {
    start: PathBuf,
    max_workers: usize,
}

impl UndedupeSession {
    /// `start` seeds the upward metadata search and bounds the restore walk.
    pub fn new(start: impl Into<PathBuf>, max_workers: usize) -> Self {
        Self {
            start: start.into(),
            max_workers: max_workers.max(1),
        }
    }

    /// Restore every encoded file under the start directory. The metadata
    /// record is deleted only when no file failed, so a partial restore can
    /// always be retried.
    pub async fn run_all(&self) -> Result<UndedupeReport, DedupeError> {
        let metadata_path = metadata::find_upward(&self.start)?;
        let Metadata {
            prefix_len,
            dictionary,
        } = Metadata::load(&metadata_path)?;
        let inverse = Arc::new(dictionary.invert()?);

        let targets = walk::undedupe_targets(&self.start)?;
        let bytes_encoded = walk::total_size(&targets)?;
        info!(
            root = %self.start.display(),
            files = targets.len(),
            "restore pass starting"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut tasks = JoinSet::new();
        for path in targets {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(DedupeError::worker)?;
            let inverse = Arc::clone(&inverse);
            tasks.spawn(async move {
                let _permit = permit;
                tokio::task::spawn_blocking(move || {
                    let result = decode_one(&path, &inverse, prefix_len);
                    (path, result)
                })
                .await
            });
        }

        let mut files_restored = 0;
        let mut bytes_restored = 0;
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (path, result) = joined
                .and_then(|inner| inner)
                .map_err(DedupeError::worker)?;
            match result {
                Ok(stats) => {
                    files_restored += 1;
                    bytes_restored += stats.output_bytes;
                    debug!(path = %path.display(), "file restored");
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "file left encoded");
                    failures.push(FileFailure {
                        path,
                        reason: err.to_string(),
                    });
                }
            }
        }

        if failures.is_empty() {
            fs::remove_file(&metadata_path)?;
        } else {
            warn!(
                failed = failures.len(),
                "keeping the metadata record for a retry"
            );
        }
        Ok(UndedupeReport {
            files_restored,
            failures,
            bytes_encoded,
            bytes_restored,
        })
    }

    /// Restore one file, leaving the metadata record in place for the rest
    /// of the tree.
    pub async fn run_single(&self, file: &Path) -> Result<DecodeStats, DedupeError> {
        let metadata_path = metadata::find_upward(&self.start)?;
        let Metadata {
            prefix_len,
            dictionary,
        } = Metadata::load(&metadata_path)?;
        let inverse = dictionary.invert()?;
        let file = file.to_path_buf();
        tokio::task::spawn_blocking(move || decode_one(&file, &inverse, prefix_len))
            .await
            .map_err(DedupeError::worker)?
    }
}

/// Encode one file in place: write the temporary, rename onto the encoded
/// name, copy permissions, delete the source. Any failure removes the
/// temporary and leaves the source untouched.
fn encode_one(
    path: &Path,
    dictionary: &Dictionary,
    block_size: usize,
    prefix_len: u8,
) -> Result<EncodeStats, DedupeError> {
    let encoded = format::encoded_path(path);
    let tmp = format::tmp_path(&encoded);
    let result =
        encoder::encode_file(path, &tmp, dictionary, block_size, prefix_len).and_then(|stats| {
            fs::rename(&tmp, &encoded)?;
            Ok(stats)
        });
    match result {
        Ok(stats) => {
            copy_permissions(path, &encoded);
            fs::remove_file(path)?;
            Ok(stats)
        }
        Err(err) => {
            let _ = fs::remove_file(&tmp);
            Err(err)
        }
    }
}

/// Inverse of [`encode_one`] with the same commit discipline.
fn decode_one(
    path: &Path,
    inverse: &InverseDictionary,
    prefix_len: u8,
) -> Result<DecodeStats, DedupeError> {
    let restored = format::strip_encoded_suffix(path).ok_or_else(|| {
        DedupeError::MetadataMismatch(format!(
            "{} does not carry the {ENCODED_SUFFIX} suffix",
            path.display()
        ))
    })?;
    let tmp = format::tmp_path(&restored);
    let result = decoder::decode_file(path, &tmp, inverse, prefix_len).and_then(|stats| {
        fs::rename(&tmp, &restored)?;
        Ok(stats)
    });
    match result {
        Ok(stats) => {
            copy_permissions(path, &restored);
            fs::remove_file(path)?;
            Ok(stats)
        }
        Err(err) => {
            let _ = fs::remove_file(&tmp);
            Err(err)
        }
    }
}

/// Best-effort permission copy from a source onto its replacement.
fn copy_permissions(from: &Path, to: &Path) {
    if let Err(err) =
        fs::metadata(from).and_then(|meta| fs::set_permissions(to, meta.permissions()))
    {
        debug!(from = %from.display(), error = %err, "could not copy permissions");
    }
}
