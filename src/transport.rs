//! Remote calls to the archival vault.
//!
//! The upload engine only depends on the [`Transport`] trait. [`AwsCliTransport`]
//! drives the `aws glacier` command line tool and is what the binary uses.

use crate::plan::ByteRange;
use crate::types::UploadConfig;
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Marker the vault puts in its error output when a request times out.
const TIMEOUT_MARKER: &str = "RequestTimeoutException";

/// Broad class of a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The vault timed out the request.
    Timeout,
    /// The call succeeded but a required field was absent from the response.
    MissingField,
    /// Any other failure.
    Failed,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::MissingField => "missing field",
            TransportErrorKind::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A failed remote call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Failed, message)
    }

    pub fn missing_field(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::MissingField, message)
    }
}

/// A multipart upload the vault has accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiatedUpload {
    pub upload_id: String,
    pub location: Option<String>,
}

/// What the vault returns once an archive is assembled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveReceipt {
    pub archive_id: Option<String>,
    pub location: Option<String>,
}

/// The three remote operations a multipart upload needs.
///
/// Calls are not assumed idempotent: callers must verify the checksum returned by
/// every [`Transport::upload_part`] attempt, retries included.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Starts a multipart upload for an archive described by `description`.
    async fn initiate_upload(
        &self,
        vault: &str,
        description: &str,
        part_size: u64,
    ) -> Result<InitiatedUpload, TransportError>;

    /// Uploads the bytes stored in `body` as `range` of the archive.
    ///
    /// Returns the hex tree hash the vault computed for the part.
    async fn upload_part(
        &self,
        vault: &str,
        upload_id: &str,
        range: ByteRange,
        body: &Path,
    ) -> Result<String, TransportError>;

    /// Assembles the uploaded parts into an archive.
    async fn complete_upload(
        &self,
        vault: &str,
        upload_id: &str,
        checksum_hex: &str,
        archive_size: u64,
    ) -> Result<ArchiveReceipt, TransportError>;
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct InitiateOutput {
    upload_id: Option<String>,
    location: Option<String>,
}

#[derive(Deserialize, Debug)]
struct PartOutput {
    checksum: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CompleteOutput {
    archive_id: Option<String>,
    location: Option<String>,
}

fn parse_initiate(stdout: &[u8]) -> Result<InitiatedUpload, TransportError> {
    let output: InitiateOutput = serde_json::from_slice(stdout)
        .map_err(|e| TransportError::missing_field(format!("unparsable response: {}", e)))?;
    match output.upload_id {
        Some(upload_id) if !upload_id.is_empty() => Ok(InitiatedUpload {
            upload_id,
            location: output.location,
        }),
        _ => Err(TransportError::missing_field("response has no uploadId")),
    }
}

fn parse_part(stdout: &[u8]) -> Result<String, TransportError> {
    let output: PartOutput = serde_json::from_slice(stdout)
        .map_err(|e| TransportError::missing_field(format!("unparsable response: {}", e)))?;
    output
        .checksum
        .ok_or_else(|| TransportError::missing_field("response has no checksum"))
}

fn parse_complete(stdout: &[u8]) -> ArchiveReceipt {
    // The archive is already assembled once the command succeeds; the body is informational.
    match serde_json::from_slice::<CompleteOutput>(stdout) {
        Ok(output) => ArchiveReceipt {
            archive_id: output.archive_id,
            location: output.location,
        },
        Err(_) => ArchiveReceipt::default(),
    }
}

fn classify_failure(stderr: &str) -> TransportErrorKind {
    if stderr.contains(TIMEOUT_MARKER) {
        TransportErrorKind::Timeout
    } else {
        TransportErrorKind::Failed
    }
}

/// Runs `aws --output json glacier ...` for every remote call.
#[derive(Debug, Clone)]
pub struct AwsCliTransport {
    binary: String,
    account_id: String,
    work_dir: PathBuf,
}

impl AwsCliTransport {
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            binary: config.aws_binary.clone(),
            account_id: config.account_id.clone(),
            work_dir: config.work_dir.clone(),
        }
    }

    fn command_args(&self, args: Vec<String>) -> Vec<String> {
        let mut full = vec!["--output".to_string(), "json".to_string(), "glacier".to_string()];
        full.extend(args);
        full.push("--account-id".to_string());
        full.push(self.account_id.clone());
        full
    }

    async fn run(&self, args: Vec<String>) -> Result<Vec<u8>, TransportError> {
        let args = self.command_args(args);
        debug!("AWS command: {} {:?}", self.binary, args);

        let output = Command::new(&self.binary)
            .args(&args)
            .current_dir(&self.work_dir)
            .output()
            .await
            .map_err(|e| TransportError::failed(format!("failed to run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TransportError::new(
                classify_failure(&stderr),
                format!("{} exited with {}: {}", self.binary, output.status, stderr.trim()),
            ));
        }

        Ok(output.stdout)
    }
}

fn initiate_args(vault: &str, description: &str, part_size: u64) -> Vec<String> {
    vec![
        "initiate-multipart-upload".to_string(),
        "--vault-name".to_string(),
        vault.to_string(),
        "--archive-description".to_string(),
        description.to_string(),
        "--part-size".to_string(),
        part_size.to_string(),
    ]
}

fn upload_part_args(vault: &str, upload_id: &str, range: ByteRange, body: &Path) -> Vec<String> {
    vec![
        "upload-multipart-part".to_string(),
        "--vault-name".to_string(),
        vault.to_string(),
        "--upload-id".to_string(),
        upload_id.to_string(),
        "--body".to_string(),
        body.to_string_lossy().into_owned(),
        "--range".to_string(),
        range.to_string(),
    ]
}

fn complete_args(vault: &str, upload_id: &str, checksum_hex: &str, archive_size: u64) -> Vec<String> {
    vec![
        "complete-multipart-upload".to_string(),
        "--vault-name".to_string(),
        vault.to_string(),
        "--upload-id".to_string(),
        upload_id.to_string(),
        "--checksum".to_string(),
        checksum_hex.to_string(),
        "--archive-size".to_string(),
        archive_size.to_string(),
    ]
}

#[async_trait]
impl Transport for AwsCliTransport {
    async fn initiate_upload(
        &self,
        vault: &str,
        description: &str,
        part_size: u64,
    ) -> Result<InitiatedUpload, TransportError> {
        let stdout = self.run(initiate_args(vault, description, part_size)).await?;
        parse_initiate(&stdout)
    }

    async fn upload_part(
        &self,
        vault: &str,
        upload_id: &str,
        range: ByteRange,
        body: &Path,
    ) -> Result<String, TransportError> {
        let stdout = self
            .run(upload_part_args(vault, upload_id, range, body))
            .await?;
        parse_part(&stdout)
    }

    async fn complete_upload(
        &self,
        vault: &str,
        upload_id: &str,
        checksum_hex: &str,
        archive_size: u64,
    ) -> Result<ArchiveReceipt, TransportError> {
        let stdout = self
            .run(complete_args(vault, upload_id, checksum_hex, archive_size))
            .await?;
        Ok(parse_complete(&stdout))
    }
}

/// Scripted in-memory vault for exercising the upload engine.
#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use crate::treehash::tree_hash_bytes;
    use std::collections::{HashSet, VecDeque};
    use std::sync::Mutex;

    /// What the next `upload_part` call should do.
    #[derive(Debug, Clone)]
    pub(crate) enum PartOutcome {
        /// Behave like a healthy vault: return the tree hash of the body.
        Echo,
        /// Return this checksum regardless of the body.
        Checksum(String),
        /// Fail the call.
        Error(TransportError),
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Call {
        Initiate {
            description: String,
            part_size: u64,
        },
        Part {
            description: String,
            range: ByteRange,
            body: Vec<u8>,
        },
        Complete {
            description: String,
            checksum: String,
            size: u64,
        },
    }

    #[derive(Default)]
    struct State {
        calls: Vec<Call>,
        part_outcomes: VecDeque<PartOutcome>,
        corrupt: HashSet<String>,
        fail_initiate: Option<TransportError>,
        blank_upload_id: bool,
        fail_complete: Option<TransportError>,
    }

    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        state: Mutex<State>,
    }

    impl ScriptedTransport {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// Queues outcomes for the next part uploads; once drained, parts echo.
        pub(crate) fn script_parts(&self, outcomes: impl IntoIterator<Item = PartOutcome>) {
            self.state.lock().unwrap().part_outcomes.extend(outcomes);
        }

        /// Every part of the archive named `description` comes back with a bad checksum.
        pub(crate) fn corrupt_archive(&self, description: &str) {
            self.state
                .lock()
                .unwrap()
                .corrupt
                .insert(description.to_string());
        }

        pub(crate) fn fail_initiate(&self, error: TransportError) {
            self.state.lock().unwrap().fail_initiate = Some(error);
        }

        /// Initiation succeeds but hands back an empty upload id.
        pub(crate) fn blank_upload_id(&self) {
            self.state.lock().unwrap().blank_upload_id = true;
        }

        pub(crate) fn fail_complete(&self, error: TransportError) {
            self.state.lock().unwrap().fail_complete = Some(error);
        }

        pub(crate) fn calls(&self) -> Vec<Call> {
            self.state.lock().unwrap().calls.clone()
        }

        pub(crate) fn part_calls(&self) -> Vec<(ByteRange, Vec<u8>)> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    Call::Part { range, body, .. } => Some((range, body)),
                    _ => None,
                })
                .collect()
        }
    }

    fn description_of(upload_id: &str) -> String {
        upload_id.trim_start_matches("upload-").to_string()
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn initiate_upload(
            &self,
            _vault: &str,
            description: &str,
            part_size: u64,
        ) -> Result<InitiatedUpload, TransportError> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::Initiate {
                description: description.to_string(),
                part_size,
            });
            match state.fail_initiate.clone() {
                Some(error) => Err(error),
                None if state.blank_upload_id => Ok(InitiatedUpload {
                    upload_id: String::new(),
                    location: None,
                }),
                None => Ok(InitiatedUpload {
                    upload_id: format!("upload-{}", description),
                    location: None,
                }),
            }
        }

        async fn upload_part(
            &self,
            _vault: &str,
            upload_id: &str,
            range: ByteRange,
            body: &Path,
        ) -> Result<String, TransportError> {
            let bytes = std::fs::read(body).map_err(|e| TransportError::failed(e.to_string()))?;
            let description = description_of(upload_id);
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::Part {
                description: description.clone(),
                range,
                body: bytes.clone(),
            });

            if state.corrupt.contains(&description) {
                return Ok("00".repeat(32));
            }
            match state.part_outcomes.pop_front().unwrap_or(PartOutcome::Echo) {
                PartOutcome::Echo => Ok(hex::encode(tree_hash_bytes(&bytes))),
                PartOutcome::Checksum(checksum) => Ok(checksum),
                PartOutcome::Error(error) => Err(error),
            }
        }

        async fn complete_upload(
            &self,
            _vault: &str,
            upload_id: &str,
            checksum_hex: &str,
            archive_size: u64,
        ) -> Result<ArchiveReceipt, TransportError> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::Complete {
                description: description_of(upload_id),
                checksum: checksum_hex.to_string(),
                size: archive_size,
            });
            match state.fail_complete.clone() {
                Some(error) => Err(error),
                None => Ok(ArchiveReceipt {
                    archive_id: Some(format!("archive-{}", description_of(upload_id))),
                    location: None,
                }),
            }
        }
    }
}
