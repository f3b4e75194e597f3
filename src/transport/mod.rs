//! Credential transport codec.
//!
//! Encodes the raw credential file into a portable, self-describing base64
//! blob for out-of-band transmission (typically environment injection into
//! a fresh deployment), and decodes such blobs back while auto-detecting
//! among the container formats seen in the wild: plain JSON, a gzipped tar
//! archive, and a bare gzip stream wrapping a JSON envelope.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

use crate::utils;

/// Canonical name of the credential entry inside archive containers.
pub const CREDS_ENTRY: &str = "creds.json";

/// Errors raised while building a transport blob.
///
/// Decoding never errors; an unrecognized blob is `None`.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The credential source file could not be read.
    #[error("failed to read credential file: {0}")]
    SourceUnreadable(String),

    /// The archive container could not be assembled.
    #[error("failed to build credential archive: {0}")]
    ArchiveFailed(String),
}

/// The ordered decoding strategies. Each is self-contained: failure of one
/// never prevents trying the next, and none is attempted twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeStrategy {
    /// The decoded bytes are already a JSON document.
    PlainJson,
    /// A gzipped tar archive holding a [`CREDS_ENTRY`] entry.
    Archive,
    /// A bare gzip stream wrapping a JSON envelope around the payload.
    GzipJson,
}

const STRATEGIES: &[DecodeStrategy] = &[
    DecodeStrategy::PlainJson,
    DecodeStrategy::Archive,
    DecodeStrategy::GzipJson,
];

/// Read the raw credential file at `source` and encode it as the single
/// [`CREDS_ENTRY`] entry of a gzipped tar archive, returned base64-encoded.
pub async fn encode(source: &Path) -> Result<String, CodecError> {
    let raw = utils::timed("read credential file", fs::read(source))
        .await
        .map_err(|e| CodecError::SourceUnreadable(format!("{}: {}", source.display(), e)))?;

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let mut header = tar::Header::new_gnu();
    header.set_size(raw.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, CREDS_ENTRY, raw.as_slice())
        .map_err(|e| CodecError::ArchiveFailed(e.to_string()))?;

    let encoder = builder
        .into_inner()
        .map_err(|e| CodecError::ArchiveFailed(e.to_string()))?;
    let compressed = encoder
        .finish()
        .map_err(|e| CodecError::ArchiveFailed(e.to_string()))?;

    debug!(
        source = %source.display(),
        raw_bytes = raw.len(),
        compressed_bytes = compressed.len(),
        "credential file encoded for transport"
    );

    Ok(STANDARD.encode(compressed))
}

/// Decode a transport blob back into the raw credential payload string.
///
/// Runs the strategy chain in order, stopping at the first success.
/// Returns `None` when every strategy fails; the caller falls back to a
/// fresh pairing.
pub fn decode(blob: &str) -> Option<String> {
    let bytes = match STANDARD.decode(blob.trim()) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "transport blob is not valid base64");
            return None;
        }
    };

    for strategy in STRATEGIES {
        if let Some(payload) = try_strategy(*strategy, &bytes) {
            debug!(strategy = ?strategy, "transport blob decoded");
            return Some(payload);
        }
    }

    warn!(
        tried = ?STRATEGIES,
        "transport blob matched no known container format"
    );
    None
}

fn try_strategy(strategy: DecodeStrategy, bytes: &[u8]) -> Option<String> {
    match strategy {
        DecodeStrategy::PlainJson => {
            let text = std::str::from_utf8(bytes).ok()?;
            serde_json::from_str::<serde_json::Value>(text).ok()?;
            Some(text.to_string())
        }
        DecodeStrategy::Archive => {
            let mut archive = tar::Archive::new(GzDecoder::new(Cursor::new(bytes)));
            for entry in archive.entries().ok()? {
                let mut entry = entry.ok()?;
                if &*entry.path().ok()? == Path::new(CREDS_ENTRY) {
                    let mut payload = String::new();
                    entry.read_to_string(&mut payload).ok()?;
                    return Some(payload);
                }
            }
            None
        }
        DecodeStrategy::GzipJson => {
            let mut decoder = GzDecoder::new(Cursor::new(bytes));
            let mut text = String::new();
            decoder.read_to_string(&mut text).ok()?;
            let envelope: serde_json::Value = serde_json::from_str(&text).ok()?;
            unwrap_payload(&envelope)
        }
    }
}

/// Unwrap a `{"payload": ...}` or `{"creds.json": ...}` envelope into the
/// raw payload string.
fn unwrap_payload(envelope: &serde_json::Value) -> Option<String> {
    let object = envelope.as_object()?;
    let inner = object.get("payload").or_else(|| object.get(CREDS_ENTRY))?;
    match inner {
        serde_json::Value::String(payload) => Some(payload.clone()),
        other => Some(other.to_string()),
    }
}
