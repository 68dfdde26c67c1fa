//! SHA-256 tree hashing of local files.
//!
//! Files are read in fixed 1 MiB blocks. Block digests are combined pairwise,
//! level by level, until a single root remains; an odd trailing node is carried
//! to the next level unpaired. The level whose nodes cover exactly one part is
//! kept as the per-part leaves, so each uploaded part can be checked against
//! the checksum the vault computes for it.

use crate::error::UploadError;
use crate::plan::{ChunkPlan, BLOCK_SIZE};
use sha2::{Digest as _, Sha256};
use std::io::{self, Read};
use std::path::Path;
use tracing::debug;

/// A SHA-256 digest.
pub type Digest = [u8; 32];

/// Tree hash of one file at a given part granularity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeHash {
    leaves: Vec<Digest>,
    root: Digest,
}

impl TreeHash {
    /// Per-part digests. `leaves()[i]` covers part `i` of the plan used to build the tree.
    pub fn leaves(&self) -> &[Digest] {
        &self.leaves
    }

    pub fn root(&self) -> &Digest {
        &self.root
    }

    /// Root digest, hex encoded as the vault expects it on completion.
    pub fn root_hex(&self) -> String {
        hex::encode(self.root)
    }

    pub fn leaf_hex(&self, index: usize) -> Option<String> {
        self.leaves.get(index).map(hex::encode)
    }
}

fn sha256(data: &[u8]) -> Digest {
    Sha256::digest(data).into()
}

fn combine(level: &[Digest]) -> Vec<Digest> {
    level
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => {
                let mut hasher = Sha256::new();
                hasher.update(left);
                hasher.update(right);
                hasher.finalize().into()
            }
            [single] => *single,
            _ => unreachable!("chunks(2) yields one or two nodes"),
        })
        .collect()
}

/// Builds the tree from block digests, capturing the level whose nodes span `part_size` bytes.
fn build(blocks: Vec<Digest>, part_size: u64) -> TreeHash {
    let mut level = blocks;
    let mut node_size = BLOCK_SIZE;
    let mut leaves = None;

    loop {
        if leaves.is_none() && node_size >= part_size {
            leaves = Some(level.clone());
        }
        if level.len() == 1 {
            break;
        }
        level = combine(&level);
        node_size *= 2;
    }

    let root = level[0];
    // A file smaller than one part collapses before reaching the part level;
    // its single part is then covered by the root.
    TreeHash {
        leaves: leaves.unwrap_or_else(|| vec![root]),
        root,
    }
}

/// Reads `reader` to the end in 1 MiB blocks and digests each block.
///
/// An empty input yields one digest of the empty string.
fn block_digests<R: Read>(mut reader: R) -> io::Result<Vec<Digest>> {
    let mut blocks = Vec::new();
    let mut buffer = Vec::with_capacity(BLOCK_SIZE as usize);

    loop {
        buffer.clear();
        let n = reader.by_ref().take(BLOCK_SIZE).read_to_end(&mut buffer)?;
        if n == 0 {
            break;
        }
        blocks.push(sha256(&buffer));
    }

    if blocks.is_empty() {
        blocks.push(sha256(b""));
    }
    Ok(blocks)
}

/// Computes the tree hash of everything readable from `reader`.
pub fn tree_hash_reader<R: Read>(reader: R, plan: &ChunkPlan) -> io::Result<TreeHash> {
    let blocks = block_digests(reader)?;
    let block_count = blocks.len();
    let tree = build(blocks, plan.part_size());
    debug!(
        "Hashes = {}, leaves = {} (will differ if part size != 1 MiB)",
        block_count,
        tree.leaves.len()
    );
    Ok(tree)
}

/// Tree hash root of an in-memory byte slice.
///
/// This is the checksum a vault reports for an uploaded part holding `data`.
pub fn tree_hash_bytes(data: &[u8]) -> Digest {
    let blocks = if data.is_empty() {
        vec![sha256(b"")]
    } else {
        data.chunks(BLOCK_SIZE as usize).map(sha256).collect()
    };
    build(blocks, BLOCK_SIZE).root
}

/// Computes the tree hash of a local file at the plan's part granularity.
///
/// Hashing runs on the blocking pool so the runtime is never stalled by file reads.
pub async fn hash_file(path: &Path, plan: &ChunkPlan) -> Result<TreeHash, UploadError> {
    match tokio::fs::metadata(path).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(UploadError::NotFound(path.to_path_buf()));
        }
        Err(source) => {
            return Err(UploadError::HashFailed {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    let owned_path = path.to_path_buf();
    let plan = *plan;

    let result = tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&owned_path)?;
        let reader = std::io::BufReader::with_capacity(BLOCK_SIZE as usize, file);
        tree_hash_reader(reader, &plan)
    })
    .await
    .map_err(|e| UploadError::IoError(io::Error::other(format!("Task join error: {}", e))))?;

    result.map_err(|source| UploadError::HashFailed {
        path: path.to_path_buf(),
        source,
    })
}
