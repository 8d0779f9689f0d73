//! On-disk blob store.
//!
//! Layout per instance: one flat directory holding, for each blob X, the
//! file `X`, a sidecar `X.checksum` (8 lowercase hex digits, no newline) and
//! a transient `X.tmp` while a write is in flight. A blob without a sidecar
//! is possible only if the process died between rename and sidecar write;
//! verification tolerates it.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const READ_BUF: usize = 64 * 1024;

/// Whether `name` is safe to use as a directory entry.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

/// Result of recomputing a blob's checksum against a reference value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// On-disk bytes hash to the reference value.
    Match(String),
    /// On-disk bytes hash to something else; carries the actual digest.
    Mismatch(String),
    /// No such blob.
    MissingBlob,
    /// Blob exists but there is no sidecar and no caller-supplied value.
    MissingChecksum,
}

pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Opens (creating if needed) the data directory. Failure here is the
    /// one startup error a worker cannot recover from.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("creating data directory {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, name: &str) -> Result<PathBuf> {
        if !is_valid_name(name) {
            bail!("invalid blob name {:?}", name);
        }
        Ok(self.root.join(name))
    }

    fn checksum_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.checksum", name))
    }

    /// Starts an atomic put. Bytes appended to the returned writer go to the
    /// tempfile; nothing is visible under the final name until `finish`.
    pub async fn writer(&self, name: &str) -> Result<BlobWriter> {
        let final_path = self.blob_path(name)?;
        let tmp_path = self.root.join(format!("{}.tmp", name));
        let file = File::create(&tmp_path)
            .await
            .with_context(|| format!("creating tempfile for {}", name))?;
        Ok(BlobWriter {
            tmp_path,
            final_path,
            checksum_path: self.checksum_path(name),
            file: Some(file),
            hasher: crc32fast::Hasher::new(),
        })
    }

    /// Opens a blob for streaming. `None` if it does not exist.
    pub async fn open(&self, name: &str) -> Result<Option<(File, u64)>> {
        let path = self.blob_path(name)?;
        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("opening {}", path.display())),
        };
        let len = file
            .metadata()
            .await
            .with_context(|| format!("stat of {}", path.display()))?
            .len();
        Ok(Some((file, len)))
    }

    /// Removes the blob and its sidecar. A missing blob is success; the
    /// master retries deletes and replays them on tombstoned block reports,
    /// so this must be idempotent.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let path = self.blob_path(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => tracing::info!("deleted blob {}", name),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("delete of absent blob {} treated as success", name);
            }
            Err(e) => return Err(e).with_context(|| format!("deleting {}", path.display())),
        }

        match fs::remove_file(self.checksum_path(name)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).with_context(|| format!("deleting sidecar of {}", name)),
        }
        Ok(())
    }

    /// Recomputes the CRC32 of the on-disk bytes and compares it against
    /// `expected`, falling back to the sidecar when none is supplied.
    pub async fn verify(&self, name: &str, expected: Option<&str>) -> Result<VerifyOutcome> {
        let path = self.blob_path(name)?;
        let mut file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(VerifyOutcome::MissingBlob)
            }
            Err(e) => return Err(e).with_context(|| format!("opening {}", path.display())),
        };

        let mut hasher = crc32fast::Hasher::new();
        let mut buf = vec![0u8; READ_BUF];
        loop {
            let n = file
                .read(&mut buf)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        let actual = format!("{:08x}", hasher.finalize());

        let reference = match expected {
            Some(value) => value.to_string(),
            None => match self.stored_checksum(name).await? {
                Some(stored) => stored,
                None => return Ok(VerifyOutcome::MissingChecksum),
            },
        };

        if actual == reference {
            Ok(VerifyOutcome::Match(actual))
        } else {
            Ok(VerifyOutcome::Mismatch(actual))
        }
    }

    /// Sidecar contents, trimmed. `None` if there is no sidecar.
    pub async fn stored_checksum(&self, name: &str) -> Result<Option<String>> {
        self.blob_path(name)?;
        match fs::read_to_string(self.checksum_path(name)).await {
            Ok(contents) => Ok(Some(contents.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading sidecar of {}", name)),
        }
    }

    /// Names for the block report: every regular file that is neither a
    /// sidecar nor an in-flight tempfile.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.root)
            .await
            .with_context(|| format!("scanning {}", self.root.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                continue;
            }
            let file_name = entry.file_name();
            let name = match file_name.to_str() {
                Some(name) => name,
                None => continue,
            };
            if name.ends_with(".checksum") || name.ends_with(".tmp") {
                continue;
            }
            names.push(name.to_string());
        }
        names.sort();
        Ok(names)
    }

    /// (blob count, total blob bytes) for `/metrics`.
    pub async fn usage(&self) -> Result<(usize, u64)> {
        let names = self.list().await?;
        let mut total = 0u64;
        for name in &names {
            if let Ok(meta) = fs::metadata(self.root.join(name)).await {
                total += meta.len();
            }
        }
        Ok((names.len(), total))
    }
}

/// In-flight atomic put: tempfile plus running CRC32.
pub struct BlobWriter {
    tmp_path: PathBuf,
    final_path: PathBuf,
    checksum_path: PathBuf,
    file: Option<File>,
    hasher: crc32fast::Hasher,
}

impl BlobWriter {
    pub async fn append(&mut self, chunk: &[u8]) -> Result<()> {
        self.hasher.update(chunk);
        match self.file.as_mut() {
            Some(file) => file
                .write_all(chunk)
                .await
                .context("writing blob tempfile")?,
            None => bail!("writer already finished"),
        }
        Ok(())
    }

    /// Seals the blob: flush, rename over the final name, sidecar write.
    /// Returns the 8-hex-digit CRC32 of everything appended. On failure the
    /// tempfile is gone either way.
    pub async fn finish(mut self) -> Result<String> {
        let digest = format!("{:08x}", std::mem::take(&mut self.hasher).finalize());
        match self.seal(&digest).await {
            Ok(()) => Ok(digest),
            Err(e) => {
                let _ = fs::remove_file(&self.tmp_path).await;
                Err(e)
            }
        }
    }

    async fn seal(&mut self, digest: &str) -> Result<()> {
        let mut file = self.file.take().context("writer already finished")?;
        file.flush().await.context("flushing blob tempfile")?;
        drop(file);
        fs::rename(&self.tmp_path, &self.final_path)
            .await
            .context("renaming tempfile into place")?;
        fs::write(&self.checksum_path, digest)
            .await
            .context("writing checksum sidecar")?;
        Ok(())
    }

    /// Drops the tempfile. Used when the incoming stream dies mid-write.
    pub async fn abort(mut self) {
        self.file.take();
        let _ = fs::remove_file(&self.tmp_path).await;
    }
}

impl Drop for BlobWriter {
    /// A writer dropped without `finish` or `abort` must not leave an orphan
    /// tempfile behind.
    fn drop(&mut self) {
        if self.file.take().is_some() {
            let _ = std::fs::remove_file(&self.tmp_path);
        }
    }
}
