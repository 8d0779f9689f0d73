//! Wire protocol shared by the master and the workers.
//!
//! The inter-node surface is deliberately plain: query-string parameters,
//! multipart bodies for blob transfer, and short prefixed text acks. The
//! constants and response shapes below are the entire contract; anything a
//! worker replies that does not match one of the prefixes is treated as
//! unknown by the master and surfaced as such.

use serde::{Deserialize, Serialize};

// --- Text ack prefixes ---

/// Successful store/verify ack, followed by the 8-hex-digit CRC32.
pub const OK_PREFIX: &str = "OK:";
/// Verify failure ack, followed by the checksum actually found on disk.
pub const MISMATCH_PREFIX: &str = "CHECKSUM_MISMATCH:";
/// Verify failure when the worker has the blob but no sidecar to compare to.
pub const NO_CHECKSUM_FILE: &str = "NO_CHECKSUM_FILE";
/// Bare delete ack. Deletes are idempotent, so this is also the answer for
/// a blob the worker never had.
pub const DELETE_ACK: &str = "OK";

// --- Multipart field names ---

/// Field carrying blob bytes on the master→worker and fixer→worker path.
pub const FIELD_FILE: &str = "file";
/// Field carrying blob bytes on the client→master upload.
pub const FIELD_MOVIE: &str = "movie";
/// Field carrying the admin token on privileged master endpoints.
pub const FIELD_SECRET: &str = "secret";

// --- Placeholders in verify reports ---

/// Stands in for a checksum when the replica could not be reached at all.
pub const CHECKSUM_ERROR: &str = "ERROR";
/// Stands in for a checksum when the replica answered something unparseable.
pub const CHECKSUM_UNKNOWN: &str = "UNKNOWN";

// --- Response shapes ---

/// One replica's row in the `/verify` fan-out report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyEntry {
    /// Worker address the probe was sent to.
    pub node: String,
    /// Checksum the worker computed, or one of the placeholders above.
    pub checksum: String,
    /// True iff the worker answered `OK:<hex>`.
    pub valid: bool,
}

/// Coordinator counters served at `/stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub active_nodes: usize,
    pub total_files: usize,
    pub total_checksums: usize,
    pub ring_size: usize,
}
