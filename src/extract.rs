//! Part extraction into the staging buffer.

use crate::error::UploadError;
use crate::plan::ByteRange;
use std::io;
use std::path::Path;
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufWriter};

/// Scratch file holding the body of the part currently being uploaded.
///
/// One buffer serves a whole batch and is overwritten for every part. The file is
/// removed when the buffer is dropped, including when a batch stops early.
#[derive(Debug)]
pub struct StagingBuffer {
    file: NamedTempFile,
}

impl StagingBuffer {
    /// Creates an empty staging file in the system temporary directory.
    pub fn new() -> Result<Self, UploadError> {
        Ok(Self {
            file: NamedTempFile::new()?,
        })
    }

    /// Path the transport reads the part body from.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Copies exactly `range` of `source` into the buffer, replacing its previous content.
    ///
    /// The buffer is sized to the range, so a short final part never reads past the end
    /// of the source. Fails if the source ends before the range does.
    pub async fn extract_part(&mut self, source: &Path, range: ByteRange) -> Result<(), UploadError> {
        let mut input = tokio::fs::File::open(source).await?;
        input.seek(io::SeekFrom::Start(range.start)).await?;

        let output = tokio::fs::File::create(self.file.path()).await?;
        let mut writer = BufWriter::new(output);
        let copied = tokio::io::copy(&mut input.take(range.len), &mut writer).await?;
        writer.flush().await?;

        if copied != range.len {
            return Err(UploadError::IoError(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "Short read from {}: expected {} bytes at offset {}, got {}",
                    source.display(),
                    range.len,
                    range.start,
                    copied
                ),
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn source_file(data: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(data).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn test_extract_overwrites_previous_part() {
        let data: Vec<u8> = (0..100u8).collect();
        let source = source_file(&data);
        let mut staging = StagingBuffer::new().unwrap();

        staging
            .extract_part(source.path(), ByteRange { start: 0, len: 60 })
            .await
            .unwrap();
        assert_eq!(std::fs::read(staging.path()).unwrap(), &data[..60]);

        staging
            .extract_part(source.path(), ByteRange { start: 60, len: 40 })
            .await
            .unwrap();
        assert_eq!(std::fs::read(staging.path()).unwrap(), &data[60..]);
    }

    #[tokio::test]
    async fn test_extract_past_end_fails() {
        let source = source_file(b"short");
        let mut staging = StagingBuffer::new().unwrap();

        let result = staging
            .extract_part(source.path(), ByteRange { start: 2, len: 10 })
            .await;
        assert!(matches!(result, Err(UploadError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn test_buffer_is_removed_on_drop() {
        let staging = StagingBuffer::new().unwrap();
        let path = staging.path().to_path_buf();
        assert!(path.exists());
        drop(staging);
        assert!(!path.exists());
    }
}
