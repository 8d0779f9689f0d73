//! MDFS, a small distributed store for large, immutable binary blobs.
//!
//! This library crate defines the core modules shared by the two binaries
//! (`master` and `worker`).
//!
//! ## Architecture Modules
//! The system is composed of loosely coupled subsystems:
//!
//! - **`ring`**: Consistent-hash ring with virtual nodes. Maps a blob name to
//!   an ordered list of distinct worker addresses (the replica preference).
//! - **`master`**: The coordinator. Owns the in-memory membership, file,
//!   checksum and tombstone indexes, fans uploads/deletes/verifies out to
//!   workers, and runs the background repair loops. Holds no persistent
//!   state; everything is rebuilt from worker block reports after a restart.
//! - **`worker`**: The storage node. Owns a local directory of blobs with
//!   CRC32 sidecar checksums (the durability and integrity boundary) and
//!   advertises its holdings to the master every few seconds.
//! - **`protocol`**: Wire-level constants and response shapes both sides
//!   agree on.
//! - **`config`** / **`mime`**: Environment-driven settings and the
//!   extension tables.

pub mod config;
pub mod master;
pub mod mime;
pub mod protocol;
pub mod ring;
pub mod worker;
