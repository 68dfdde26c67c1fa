//! Data structures for upload operations.

use crate::error::UploadError;
use crate::plan::{ChunkPlan, MAX_PARTS};
use crate::treehash::TreeHash;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Retry budget for a single part.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetryPolicy {
    /// Total attempts per part, the first one included (default: 10).
    pub max_attempts: u32,
    /// Delay unit; attempt `n` failing waits `n * base_delay` (default: 30s).
    #[serde(deserialize_with = "deserialize_duration")]
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt `attempt` (1-based), or `None` when no attempts remain.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        (attempt < self.max_attempts).then(|| self.base_delay * attempt)
    }

    /// Linear backoff schedule: `base, 2*base, ...`, one entry per retry.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let base = self.base_delay;
        (1..self.max_attempts.max(1)).map(move |n| base * n)
    }
}

fn deserialize_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}

/// Configuration for uploading files to a vault.
///
/// Passed explicitly to every component; nothing reads ambient state.
///
/// # Example
///
/// ```
/// use glaceon::UploadConfig;
///
/// let config = UploadConfig {
///     vault: "backups".to_string(),
///     work_dir: "/srv/prep".into(),
///     ..UploadConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Deserialize, Debug, Clone)]
#[serde(default, rename_all = "kebab-case")]
pub struct UploadConfig {
    /// Vault receiving the archives.
    pub vault: String,
    /// Directory that relative file paths are resolved against.
    pub work_dir: PathBuf,
    /// Account owning the vault; `-` means the credentials' own account.
    pub account_id: String,
    /// Path or name of the `aws` executable.
    pub aws_binary: String,
    /// Use the path relative to `work_dir` as archive description instead of the base name.
    pub with_path: bool,
    /// Maximum number of parts the vault accepts per upload (default: 10000).
    pub max_parts: u64,
    /// Per-part retry budget.
    pub retry: RetryPolicy,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            vault: String::new(),
            work_dir: PathBuf::from("."),
            account_id: "-".to_string(),
            aws_binary: "aws".to_string(),
            with_path: false,
            max_parts: MAX_PARTS,
            retry: RetryPolicy::default(),
        }
    }
}

impl UploadConfig {
    /// Loads a JSON configuration file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, UploadError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn validate(&self) -> Result<(), UploadError> {
        if self.vault.trim().is_empty() {
            return Err(UploadError::InvalidConfig("vault name is empty".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(UploadError::InvalidConfig(
                "retry.max-attempts must be at least 1".to_string(),
            ));
        }
        if self.max_parts == 0 {
            return Err(UploadError::InvalidConfig(
                "max-parts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// State of one in-flight multipart upload.
///
/// Lives only as long as the upload of its file; nothing is persisted.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub upload_id: String,
    pub plan: ChunkPlan,
    pub tree: TreeHash,
    /// Total size of the file being uploaded.
    pub size: u64,
    /// Bytes confirmed by the vault so far.
    pub offset: u64,
    pub parts_completed: u64,
}

impl UploadSession {
    pub fn new(upload_id: String, plan: ChunkPlan, tree: TreeHash, size: u64) -> Self {
        Self {
            upload_id,
            plan,
            tree,
            size,
            offset: 0,
            parts_completed: 0,
        }
    }

    pub fn part_count(&self) -> u64 {
        self.plan.part_count(self.size)
    }

    /// Records a verified part of `len` bytes.
    pub(crate) fn advance(&mut self, len: u64) {
        self.offset += len;
        self.parts_completed += 1;
    }
}

/// Outcome of a successful file upload.
#[derive(Debug, Clone)]
pub struct UploadReport {
    /// Archive description used for the upload.
    pub name: String,
    pub size: u64,
    pub part_size: u64,
    pub parts: u64,
    /// Hex tree hash root sent on completion.
    pub tree_hash: String,
    pub archive_id: Option<String>,
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_retry_schedule_is_linear() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = policy.delays().map(|d| d.as_secs()).collect();
        assert_eq!(delays, vec![30, 60, 90, 120, 150, 180, 210, 240, 270]);
        assert_eq!(policy.delay_after(1), Some(Duration::from_secs(30)));
        assert_eq!(policy.delay_after(10), None);
    }

    #[test]
    fn test_config_from_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut file,
            br#"{"vault": "photos", "work-dir": "/srv/prep", "retry": {"base-delay": "1m 30s"}}"#,
        )
        .unwrap();

        let config = UploadConfig::from_file(file.path()).unwrap();
        assert_eq!(config.vault, "photos");
        assert_eq!(config.work_dir, PathBuf::from("/srv/prep"));
        assert_eq!(config.retry.base_delay, Duration::from_secs(90));
        assert_eq!(config.retry.max_attempts, 10);
        assert_eq!(config.max_parts, MAX_PARTS);
        assert_eq!(config.account_id, "-");
    }

    #[test]
    fn test_bad_duration_is_rejected() {
        let parsed: Result<UploadConfig, _> =
            serde_json::from_str(r#"{"retry": {"base-delay": "soon"}}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_validate() {
        assert!(matches!(
            UploadConfig::default().validate(),
            Err(UploadError::InvalidConfig(_))
        ));

        let mut config = UploadConfig {
            vault: "v".to_string(),
            ..UploadConfig::default()
        };
        assert!(config.validate().is_ok());

        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }
}
