//! Byte-Stream Source
//!
//! Feeds an already reassembled, ordered byte stream (a capture replay file
//! or standard input) into a stream processor as [`StreamChunk`]s. Capturing
//! and reassembling live traffic happens upstream of this process.

use std::fmt;
use std::path::PathBuf;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::application::ports::StreamChunk;

/// Source failure.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Input could not be opened.
    #[error("failed to open input {path}: {message}")]
    Open {
        /// Input path.
        path: String,
        /// Underlying error.
        message: String,
    },

    /// Read failed mid-stream.
    #[error("failed to read input: {0}")]
    Read(String),
}

/// Where the byte stream comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// Standard input.
    Stdin,
    /// A replay file.
    File(PathBuf),
}

impl InputSource {
    /// Parse a config value; `-` means standard input.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "" | "-" => Self::Stdin,
            path => Self::File(PathBuf::from(path)),
        }
    }
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdin => f.write_str("stdin"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Reads the input in fixed-size chunks.
#[derive(Debug, Clone)]
pub struct ByteStreamSource {
    input: InputSource,
    chunk_size: usize,
}

impl ByteStreamSource {
    /// Create a source.
    #[must_use]
    pub fn new(input: InputSource, chunk_size: usize) -> Self {
        Self {
            input,
            chunk_size: chunk_size.max(1),
        }
    }

    async fn open(&self) -> Result<Box<dyn AsyncRead + Send + Unpin>, SourceError> {
        match &self.input {
            InputSource::Stdin => Ok(Box::new(tokio::io::stdin())),
            InputSource::File(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .map_err(|e| SourceError::Open {
                        path: path.display().to_string(),
                        message: e.to_string(),
                    })?;
                Ok(Box::new(file))
            }
        }
    }

    /// Read until end of input or cancellation, then send [`StreamChunk::End`].
    ///
    /// Returns the number of bytes forwarded. Stops quietly if the receiver
    /// is gone.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the input cannot be opened or read. No end
    /// marker is sent in that case.
    pub async fn run(
        self,
        chunks: mpsc::Sender<StreamChunk>,
        cancel: CancellationToken,
    ) -> Result<u64, SourceError> {
        let mut reader = self.open().await?;
        info!(input = %self.input, chunk_size = self.chunk_size, "Reading byte stream");

        let mut total = 0u64;
        let mut buf = BytesMut::with_capacity(self.chunk_size);
        loop {
            buf.reserve(self.chunk_size);
            let read = tokio::select! {
                () = cancel.cancelled() => {
                    debug!(bytes = total, "Source cancelled");
                    return Ok(total);
                }
                read = reader.read_buf(&mut buf) => read.map_err(|e| SourceError::Read(e.to_string()))?,
            };

            if read == 0 {
                info!(bytes = total, "Input exhausted");
                let _ = chunks.send(StreamChunk::End).await;
                return Ok(total);
            }

            total += read as u64;
            if chunks.send(StreamChunk::Data(buf.split().freeze())).await.is_err() {
                debug!("Stream processor gone, stopping source");
                return Ok(total);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn dash_means_stdin() {
        assert_eq!(InputSource::parse("-"), InputSource::Stdin);
        assert_eq!(InputSource::parse(""), InputSource::Stdin);
        assert_eq!(
            InputSource::parse("capture.bin"),
            InputSource::File(PathBuf::from("capture.bin"))
        );
    }

    #[tokio::test]
    async fn forwards_file_then_end() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        file.write_all(&data).unwrap();

        let (tx, mut rx) = mpsc::channel(64);
        let source = ByteStreamSource::new(InputSource::File(file.path().to_path_buf()), 64);
        let total = source.run(tx, CancellationToken::new()).await.unwrap();
        assert_eq!(total, 1000);

        let mut received = Vec::new();
        let mut ended = false;
        while let Some(chunk) = rx.recv().await {
            match chunk {
                StreamChunk::Data(bytes) => received.extend_from_slice(&bytes),
                StreamChunk::End => ended = true,
            }
        }
        assert!(ended);
        assert_eq!(received, data);
    }

    #[tokio::test]
    async fn missing_file_is_open_error() {
        let (tx, _rx) = mpsc::channel(1);
        let source = ByteStreamSource::new(InputSource::File("/nonexistent/capture.bin".into()), 64);
        let err = source.run(tx, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SourceError::Open { .. }));
    }
}
