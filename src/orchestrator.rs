//! Main orchestration logic for uploading files.

use crate::error::UploadError;
use crate::extract::StagingBuffer;
use crate::part::{send_part, PartContext};
use crate::plan::ChunkPlan;
use crate::progress::BatchProgress;
use crate::transport::Transport;
use crate::treehash::hash_file;
use crate::types::{UploadConfig, UploadReport, UploadSession};
use indicatif::HumanBytes;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info};

/// Steps a single file upload goes through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    Planning,
    Hashing,
    Initiating,
    Transferring,
    Committing,
    Done,
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadPhase::Planning => "planning",
            UploadPhase::Hashing => "hashing",
            UploadPhase::Initiating => "initiating",
            UploadPhase::Transferring => "transferring",
            UploadPhase::Committing => "committing",
            UploadPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Description the archive is stored under: the base name, or the path relative
/// to the working directory when `with_path` is set.
pub fn archive_description(work_dir: &Path, file: &Path, with_path: bool) -> String {
    let name = if with_path {
        file.strip_prefix(work_dir).unwrap_or(file).as_os_str()
    } else {
        file.file_name().unwrap_or(file.as_os_str())
    };
    name.to_string_lossy().into_owned()
}

/// Uploads one local file as one archive.
///
/// Runs plan, hash, initiate, every part in ascending order, then commit. Any failure
/// is fatal for the file; the remote upload is left abandoned and nothing is committed.
///
/// # Arguments
///
/// * `transport` - Remote vault calls
/// * `config` - Upload configuration
/// * `file` - Path of the local file
/// * `staging` - Scratch buffer reused for every part
/// * `progress` - Batch-wide progress, advanced per verified part
pub async fn upload_file<T: Transport + ?Sized>(
    transport: &T,
    config: &UploadConfig,
    file: &Path,
    staging: &mut StagingBuffer,
    progress: &mut BatchProgress,
) -> Result<UploadReport, UploadError> {
    let name = archive_description(&config.work_dir, file, config.with_path);
    let phase = |phase: UploadPhase| debug!("{}: {}", name, phase);

    phase(UploadPhase::Planning);
    let size = match tokio::fs::metadata(file).await {
        Ok(metadata) => metadata.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            error!("File {} does not exist", file.display());
            return Err(UploadError::NotFound(file.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };
    progress.start_file(size);
    let plan = ChunkPlan::for_size(size, config.max_parts);
    debug!(
        "Using part size of {} based on size ({}) of the file we're uploading",
        HumanBytes(plan.part_size()),
        HumanBytes(size)
    );

    phase(UploadPhase::Hashing);
    let tree = hash_file(file, &plan).await.inspect_err(|e| {
        error!("Unable to hash file {}: {}", file.display(), e);
    })?;

    phase(UploadPhase::Initiating);
    let initiated = transport
        .initiate_upload(&config.vault, &name, plan.part_size())
        .await
        .map_err(|e| UploadError::InitiateFailed {
            name: name.clone(),
            reason: e.to_string(),
        })?;
    // AwsCliTransport already rejects this; other Transport impls may not.
    if initiated.upload_id.is_empty() {
        return Err(UploadError::InitiateFailed {
            name,
            reason: "response has no upload id".to_string(),
        });
    }

    let started = Instant::now();
    let mut session = UploadSession::new(initiated.upload_id, plan, tree, size);

    phase(UploadPhase::Transferring);
    let ctx = PartContext {
        transport,
        config,
        source: file,
        name: &name,
    };
    for part_index in 0..session.part_count() {
        send_part(&ctx, &mut session, staging, progress, part_index).await?;
    }

    phase(UploadPhase::Committing);
    let tree_hash = session.tree.root_hex();
    let receipt = transport
        .complete_upload(&config.vault, &session.upload_id, &tree_hash, size)
        .await
        .map_err(|e| {
            error!("Failed to upload {}: {}", file.display(), e);
            UploadError::CommitFailed {
                name: name.clone(),
                reason: e.to_string(),
            }
        })?;

    let elapsed = started.elapsed();
    let seconds = elapsed.as_secs().max(1);
    debug!("{} @ {}/s", file.display(), HumanBytes(size / seconds));
    phase(UploadPhase::Done);

    Ok(UploadReport {
        name,
        size,
        part_size: plan.part_size(),
        parts: session.parts_completed,
        tree_hash,
        archive_id: receipt.archive_id,
        elapsed,
    })
}

/// Uploads files one after another, stopping at the first failure.
///
/// Relative paths are resolved against `config.work_dir`. Files after a failed one
/// are not attempted. The staging buffer is removed on return, success or not.
///
/// # Arguments
///
/// * `transport` - Remote vault calls
/// * `config` - Upload configuration
/// * `files` - Files to upload, in order
/// * `bytes_total` - Total size of the batch, for progress percentages
///
/// # Example
///
/// ```no_run
/// use glaceon::{upload_batch, AwsCliTransport, UploadConfig};
/// use std::path::PathBuf;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = UploadConfig {
///     vault: "backups".to_string(),
///     ..UploadConfig::default()
/// };
/// let transport = AwsCliTransport::new(&config);
/// let files = vec![PathBuf::from("2024.tar")];
/// upload_batch(&transport, &config, &files, 1024).await?;
/// # Ok(())
/// # }
/// ```
pub async fn upload_batch<T: Transport + ?Sized>(
    transport: &T,
    config: &UploadConfig,
    files: &[PathBuf],
    bytes_total: u64,
) -> Result<Vec<UploadReport>, UploadError> {
    info!(
        "Uploading {} files ({}) to vault {}, this may take a while",
        files.len(),
        HumanBytes(bytes_total),
        config.vault
    );

    let mut staging = StagingBuffer::new()?;
    let mut progress = BatchProgress::new(bytes_total);
    let mut reports = Vec::with_capacity(files.len());

    for (index, relative) in files.iter().enumerate() {
        let file = config.work_dir.join(relative);
        let label = format!(
            "({} of {}) {}",
            index + 1,
            files.len(),
            archive_description(&config.work_dir, &file, config.with_path)
        );
        progress.set_label(label);

        match upload_file(transport, config, &file, &mut staging, &mut progress).await {
            Ok(report) => {
                info!(
                    "✅ Uploaded {} ({}, {} parts)",
                    report.name,
                    HumanBytes(report.size),
                    report.parts
                );
                reports.push(report);
            }
            Err(e) => {
                error!("❌ Upload of {} failed: {}", file.display(), e);
                progress.abandon();
                return Err(e);
            }
        }
    }

    progress.finish();
    Ok(reports)
}
