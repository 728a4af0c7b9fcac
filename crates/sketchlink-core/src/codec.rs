//! Share token codec.
//!
//! A share token is the canonical JSON of a [`CanvasDocument`], zlib
//! compressed, turned into a binary string (one char per byte) and base64
//! encoded with the standard padded alphabet. The result carries no newlines
//! and can be placed verbatim in a URL fragment.

use crate::canvas::{CanvasDocument, DocumentError};
use base64::{Engine, engine::general_purpose::STANDARD};
use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Write};
use thiserror::Error;

/// Default zlib compression level.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Default limit for inflated document text (8 MiB).
pub const DEFAULT_MAX_DECODED_BYTES: usize = 8 * 1024 * 1024;

/// Output buffer growth step while inflating.
const INFLATE_CHUNK: usize = 32 * 1024;

/// Message shown to users for any decode failure.
pub const DECODE_USER_MESSAGE: &str = "Could not load shared drawing";

/// Where decoding stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStage {
    Base64,
    Decompress,
    Document,
}

impl fmt::Display for DecodeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DecodeStage::Base64 => "base64",
            DecodeStage::Decompress => "decompress",
            DecodeStage::Document => "document",
        })
    }
}

/// Errors turning a share token back into a document.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Share token is empty")]
    Empty,
    #[error("Invalid base64 in share token: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Binary string contains {0:?}, which is outside U+0000..=U+00FF")]
    NonLatin1(char),
    #[error("Corrupt compressed data: {0}")]
    Decompress(#[source] io::Error),
    #[error("Decompressed document exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("Decompressed data is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("Malformed document JSON: {0}")]
    Json(#[source] serde_json::Error),
    #[error("Invalid document: {0}")]
    InvalidDocument(#[source] DocumentError),
}

impl DecodeError {
    /// The pipeline stage that failed.
    pub fn stage(&self) -> DecodeStage {
        match self {
            DecodeError::Empty | DecodeError::Base64(_) | DecodeError::NonLatin1(_) => {
                DecodeStage::Base64
            }
            DecodeError::Decompress(_) | DecodeError::TooLarge { .. } => DecodeStage::Decompress,
            DecodeError::Utf8(_) | DecodeError::Json(_) | DecodeError::InvalidDocument(_) => {
                DecodeStage::Document
            }
        }
    }

    /// Uniform text for end users.
    pub fn user_message(&self) -> &'static str {
        DECODE_USER_MESSAGE
    }
}

impl From<DocumentError> for DecodeError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::Json(e) => DecodeError::Json(e),
            other => DecodeError::InvalidDocument(other),
        }
    }
}

/// Errors producing a share token.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Failed to compress document: {0}")]
    Compress(#[from] io::Error),
    #[error("Binary string contains {0:?}, which is outside U+0000..=U+00FF")]
    NonLatin1(char),
}

/// Result type for decoding.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Result type for encoding.
pub type EncodeResult<T> = Result<T, EncodeError>;

/// Codec tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecOptions {
    /// zlib level, 0..=9.
    pub compression_level: u32,
    /// Upper bound on inflated document text.
    pub max_decoded_bytes: usize,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            max_decoded_bytes: DEFAULT_MAX_DECODED_BYTES,
        }
    }
}

/// Encodes documents to share tokens and back.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShareCodec {
    options: CodecOptions,
}

impl ShareCodec {
    pub fn new(options: CodecOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    /// Encode a document as a share token.
    pub fn encode(&self, document: &CanvasDocument) -> EncodeResult<String> {
        let json = document.to_json()?;
        let compressed = self.compress(json.as_bytes())?;
        let binary = bytes_to_binary_string(&compressed);
        btoa(&binary).map_err(EncodeError::NonLatin1)
    }

    /// Decode a share token. A leading `#` and surrounding whitespace are ignored.
    pub fn decode(&self, token: &str) -> DecodeResult<CanvasDocument> {
        let token = token.trim().trim_start_matches('#');
        if token.is_empty() {
            return Err(DecodeError::Empty);
        }
        let binary = atob(token)?;
        let compressed = binary_string_to_bytes(&binary).map_err(DecodeError::NonLatin1)?;
        let json = self.decompress(&compressed)?;
        Ok(CanvasDocument::from_json(&json)?)
    }

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let level = Compression::new(self.options.compression_level.min(9));
        let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), level);
        encoder.write_all(data)?;
        encoder.finish()
    }

    fn decompress(&self, data: &[u8]) -> DecodeResult<String> {
        let limit = self.options.max_decoded_bytes;
        let mut inflater = Decompress::new(true);
        let mut out = Vec::new();

        loop {
            if out.len() > limit {
                return Err(DecodeError::TooLarge { limit });
            }
            if out.len() == out.capacity() {
                // Never grow more than one byte past the limit.
                let room = limit.saturating_add(1).saturating_sub(out.len());
                out.reserve_exact(room.min(INFLATE_CHUNK));
            }

            let (in_before, out_before) = (inflater.total_in(), inflater.total_out());
            let input = &data[in_before as usize..];
            let status = inflater
                .decompress_vec(input, &mut out, FlushDecompress::Finish)
                .map_err(|e| DecodeError::Decompress(io::Error::new(io::ErrorKind::InvalidData, e)))?;

            match status {
                Status::StreamEnd => break,
                Status::Ok | Status::BufError => {
                    let stalled = inflater.total_in() == in_before && inflater.total_out() == out_before;
                    if stalled && out.len() < out.capacity() {
                        return Err(DecodeError::Decompress(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "compressed stream ended early",
                        )));
                    }
                }
            }
        }

        if out.len() > limit {
            return Err(DecodeError::TooLarge { limit });
        }
        Ok(String::from_utf8(out)?)
    }
}

/// Encode a document with default options.
pub fn encode(document: &CanvasDocument) -> EncodeResult<String> {
    ShareCodec::default().encode(document)
}

/// Decode a share token with default options.
pub fn decode(token: &str) -> DecodeResult<CanvasDocument> {
    ShareCodec::default().decode(token)
}

/// Map each byte to the char with the same code point (0..=255).
pub fn bytes_to_binary_string(bytes: &[u8]) -> String {
    bytes.iter().copied().map(char::from).collect()
}

/// Inverse of [`bytes_to_binary_string`]. Fails on the first char above U+00FF.
pub fn binary_string_to_bytes(binary: &str) -> Result<Vec<u8>, char> {
    binary
        .chars()
        .map(|c| u8::try_from(c).map_err(|_| c))
        .collect()
}

/// Base64-encode a binary string, one byte per char.
pub fn btoa(binary: &str) -> Result<String, char> {
    Ok(STANDARD.encode(binary_string_to_bytes(binary)?))
}

/// Decode standard padded base64 into a binary string.
pub fn atob(encoded: &str) -> Result<String, base64::DecodeError> {
    Ok(bytes_to_binary_string(&STANDARD.decode(encoded)?))
}
