//! Storage Node Module
//!
//! A worker owns one directory of blobs and nothing else. It is the
//! durability and integrity boundary the master relies on:
//!
//! - **Atomic puts**: Incoming bytes stream into `<name>.tmp` while a CRC32
//!   accumulator runs alongside; only a successful write is renamed over the
//!   final name, and the digest lands in a `<name>.checksum` sidecar.
//! - **Verification**: Checksums can be recomputed from disk at any time and
//!   compared against the sidecar or a caller-supplied value.
//! - **Block reports**: A heartbeat loop announces the directory contents to
//!   the master every few seconds; that report is the only way coordinator
//!   state ever gets rebuilt.
//!
//! Workers keep no in-memory index and know nothing about replication; the
//! master orchestrates everything across the plain HTTP surface in
//! [`handlers`].

pub mod handlers;
pub mod heartbeat;
pub mod range;
pub mod store;
