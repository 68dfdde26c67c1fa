//! Single part transfer with checksum verification and retry.

use crate::error::{PartAttemptError, UploadError};
use crate::extract::StagingBuffer;
use crate::plan::ByteRange;
use crate::progress::BatchProgress;
use crate::transport::{Transport, TransportError, TransportErrorKind};
use crate::types::{UploadConfig, UploadSession};
use indicatif::HumanBytes;
use std::path::Path;
use tokio_retry2::{Retry, RetryError};
use tracing::{debug, error, warn};

impl From<TransportError> for PartAttemptError {
    fn from(e: TransportError) -> Self {
        match e.kind {
            TransportErrorKind::Timeout => PartAttemptError::Timeout(e.message),
            TransportErrorKind::MissingField => PartAttemptError::MissingChecksum(e.message),
            TransportErrorKind::Failed => PartAttemptError::Transport(e.message),
        }
    }
}

/// Everything about the current file that stays fixed while its parts are sent.
pub struct PartContext<'a, T: Transport + ?Sized> {
    pub transport: &'a T,
    pub config: &'a UploadConfig,
    /// Local file being uploaded.
    pub source: &'a Path,
    /// Archive description, used in diagnostics.
    pub name: &'a str,
}

/// One upload attempt: send the staged body and check the vault's checksum.
async fn attempt_part<T: Transport + ?Sized>(
    ctx: &PartContext<'_, T>,
    upload_id: &str,
    range: ByteRange,
    staging: &StagingBuffer,
    expected: &str,
) -> Result<(), PartAttemptError> {
    let actual = ctx
        .transport
        .upload_part(&ctx.config.vault, upload_id, range, staging.path())
        .await?;

    if !actual.eq_ignore_ascii_case(expected) {
        return Err(PartAttemptError::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

fn log_failed_attempt<T: Transport + ?Sized>(
    ctx: &PartContext<'_, T>,
    range: ByteRange,
    part_size: u64,
    attempt: u32,
    err: &PartAttemptError,
) {
    match err {
        PartAttemptError::Timeout(message) => warn!("Timeout: {}", message),
        PartAttemptError::ChecksumMismatch { expected, actual } => error!(
            "Hash does not match for {} @ {}, expected {} got {}.",
            ctx.name, range.start, expected, actual
        ),
        PartAttemptError::MissingChecksum(message) => error!(
            "No checksum returned for {} @ {}: {}",
            ctx.name, range.start, message
        ),
        PartAttemptError::Transport(message) => debug!("Result was: {}", message),
    }

    let policy = &ctx.config.retry;
    if let Some(delay) = policy.delay_after(attempt) {
        warn!(
            "{} @ {} failed to upload, retrying in {}. {} tries left",
            HumanBytes(part_size),
            range.start,
            humantime::format_duration(delay),
            policy.max_attempts - attempt
        );
    }
}

/// Uploads part `part_index` of the session's file.
///
/// The part is extracted into `staging` once, then sent up to `retry.max_attempts`
/// times with linear backoff. Every attempt, retries included, must return the
/// expected leaf checksum to count. On success the session and batch progress
/// advance by the part length; an exhausted budget is returned as
/// [`UploadError::TransferFailed`] and leaves both untouched.
pub async fn send_part<T: Transport + ?Sized>(
    ctx: &PartContext<'_, T>,
    session: &mut UploadSession,
    staging: &mut StagingBuffer,
    progress: &mut BatchProgress,
    part_index: u64,
) -> Result<(), UploadError> {
    let out_of_range = || UploadError::PartOutOfRange {
        name: ctx.name.to_string(),
        index: part_index,
        parts: session.part_count(),
    };
    let range = session
        .plan
        .part_range(session.size, part_index)
        .ok_or_else(&out_of_range)?;
    let expected = usize::try_from(part_index)
        .ok()
        .and_then(|i| session.tree.leaf_hex(i))
        .ok_or_else(&out_of_range)?;

    staging.extract_part(ctx.source, range).await?;

    let part_size = session.plan.part_size();
    let upload_id = session.upload_id.as_str();
    let staged: &StagingBuffer = staging;
    let expected = expected.as_str();
    let mut attempt = 0u32;

    let result = Retry::spawn(ctx.config.retry.delays(), || {
        attempt += 1;
        let current = attempt;

        async move {
            match attempt_part(ctx, upload_id, range, staged, expected).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    log_failed_attempt(ctx, range, part_size, current, &e);
                    RetryError::to_transient(e)
                }
            }
        }
    })
    .await;

    match result {
        Ok(()) => {
            session.advance(range.len);
            progress.advance(range.len, session.offset, session.size);
            Ok(())
        }
        Err(last) => {
            error!(
                "Unable to upload {} at offset {} of {}",
                HumanBytes(part_size),
                range.start,
                ctx.name
            );
            Err(UploadError::TransferFailed {
                name: ctx.name.to_string(),
                offset: range.start,
                attempts: attempt,
                last,
            })
        }
    }
}
