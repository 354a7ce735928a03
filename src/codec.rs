//! Vector codec: converting between in-memory `Vec<f32>` and storage representations.
//!
//! The storage layer accepts and returns vectors in two shapes:
//!
//! - **Text**: bracketed, comma-separated, fixed 6 decimal places, e.g.
//!   `[0.123456,-0.654321]`. This is what we hand to sqlite-vec on writes;
//!   fixed-precision formatting bounds payload size and avoids any
//!   locale-dependent float rendering.
//! - **Blob**: little-endian f32 components, which is how sqlite-vec hands
//!   vector columns back on reads.
//!
//! Incoming values are wrapped in [`StoredVector`] at the storage boundary
//! and resolved to a plain `Vec<f32>` immediately, so nothing above the
//! storage layer ever branches on representation.
//!
//! Round-trip contract: `decode(encode(v))` matches `v` within 1e-6 per
//! component. The 6-decimal truncation is the only intentional precision
//! loss.

use crate::error::{Result, ServiceError};

/// A vector as it came back from the storage driver.
#[derive(Debug, Clone)]
pub enum StoredVector {
    /// Bracketed text form, e.g. `[0.1,0.2]`.
    Text(String),
    /// Raw little-endian f32 bytes.
    Blob(Vec<u8>),
}

impl StoredVector {
    /// Resolve into the canonical in-memory vector type.
    pub fn resolve(self) -> Result<Vec<f32>> {
        match self {
            StoredVector::Text(s) => decode_text(&s),
            StoredVector::Blob(b) => decode_blob(&b),
        }
    }
}

/// Encode a vector as bracketed fixed-6-decimal text.
pub fn encode(v: &[f32]) -> String {
    let mut out = String::with_capacity(2 + v.len() * 10);
    out.push('[');
    for (i, x) in v.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&format!("{x:.6}"));
    }
    out.push(']');
    out
}

/// Decode the bracketed text form.
pub fn decode_text(s: &str) -> Result<Vec<f32>> {
    let inner = s
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| ServiceError::Storage(format!("malformed vector text: {s:.32}")))?;
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .map(|tok| {
            tok.trim()
                .parse::<f32>()
                .map_err(|e| ServiceError::Storage(format!("bad vector component {tok:?}: {e}")))
        })
        .collect()
}

/// Decode the driver's native little-endian f32 blob.
pub fn decode_blob(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(ServiceError::Storage(format!(
            "vector blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}
