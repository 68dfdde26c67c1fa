//! Glaceon - reliable, tree-hash verified multipart uploads to archival vaults
//!
//! This library uploads large local files to an archival vault as multipart uploads,
//! proving end-to-end integrity with the vault's SHA-256 tree hash.
//!
//! # Features
//!
//! - **Part Planning**: Power-of-two part sizes that respect the vault's 10,000 part cap
//! - **Tree Hash Verification**: Every part is checked against its locally computed leaf
//! - **Automatic Retry**: Linear backoff on timeouts, transport errors and checksum mismatches
//! - **Batch Uploads**: Files are uploaded in order; the batch stops at the first failure
//! - **Progress Tracking**: Per-file and per-batch percentages on a terminal
//!
//! # Example
//!
//! ```no_run
//! use glaceon::{upload_batch, AwsCliTransport, UploadConfig};
//! use std::path::PathBuf;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = UploadConfig {
//!     vault: "backups".to_string(),
//!     work_dir: PathBuf::from("/srv/prep"),
//!     ..UploadConfig::default()
//! };
//! let transport = AwsCliTransport::new(&config);
//!
//! upload_batch(&transport, &config, &[PathBuf::from("photos.tar")], 4096).await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod extract;
mod orchestrator;
mod part;
mod plan;
mod pool;
mod progress;
mod transport;
mod treehash;
mod types;

pub use error::{PartAttemptError, UploadError};
pub use extract::StagingBuffer;
pub use orchestrator::{archive_description, upload_batch, upload_file, UploadPhase};
pub use part::{send_part, PartContext};
pub use plan::{ByteRange, ChunkPlan, BLOCK_SIZE, MAX_PARTS};
pub use pool::WorkerPool;
pub use progress::{percent, BatchProgress};
pub use transport::{
    ArchiveReceipt, AwsCliTransport, InitiatedUpload, Transport, TransportError,
    TransportErrorKind,
};
pub use treehash::{hash_file, tree_hash_bytes, tree_hash_reader, Digest, TreeHash};
pub use types::{RetryPolicy, UploadConfig, UploadReport, UploadSession};
