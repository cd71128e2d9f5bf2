//! On-disk snapshot format.
//!
//! A stored snapshot is one JSON document:
//!
//! ```text
//! { "format": "bizdash-snapshot", "formatVersion": 1,
//!   "snapshotVersion": 42, "savedAt": "...", "slices": { "revenue": {...}, ... } }
//! ```

use bizdash_core::{BizdashError, Result, StateSnapshot};
use serde::{Deserialize, Serialize};

pub const SNAPSHOT_FORMAT: &str = "bizdash-snapshot";
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotEnvelope {
    format: String,
    format_version: u32,
    #[serde(flatten)]
    snapshot: StateSnapshot,
}

/// Serializes a snapshot into its stored form.
pub fn encode_snapshot(snapshot: &StateSnapshot) -> Result<Vec<u8>> {
    let envelope = SnapshotEnvelope {
        format: SNAPSHOT_FORMAT.to_string(),
        format_version: SNAPSHOT_FORMAT_VERSION,
        snapshot: snapshot.clone(),
    };
    Ok(serde_json::to_vec_pretty(&envelope)?)
}

/// Parses and validates stored bytes.
///
/// Anything that is not a well-formed, structurally valid snapshot yields
/// `Corrupt` carrying the original bytes. No partial reconstruction is tried.
pub fn decode_snapshot(bytes: &[u8]) -> Result<StateSnapshot> {
    let envelope: SnapshotEnvelope = serde_json::from_slice(bytes)
        .map_err(|e| BizdashError::corrupt(format!("unparseable snapshot: {}", e), bytes.to_vec()))?;

    if envelope.format != SNAPSHOT_FORMAT {
        return Err(BizdashError::corrupt(
            format!("unexpected format tag '{}'", envelope.format),
            bytes.to_vec(),
        ));
    }
    if envelope.format_version > SNAPSHOT_FORMAT_VERSION {
        return Err(BizdashError::corrupt(
            format!("unsupported format version {}", envelope.format_version),
            bytes.to_vec(),
        ));
    }

    envelope
        .snapshot
        .validate()
        .map_err(|reason| BizdashError::corrupt(reason, bytes.to_vec()))?;

    Ok(envelope.snapshot)
}
