use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Destination for the raw DER bytes of stored certificates, keyed by
/// certificate id.
#[async_trait]
pub trait CertificateBlobStore: Send + Sync {
    async fn store(&self, cert_id: i64, raw: &[u8]) -> std::io::Result<()>;
}

/// Writes each certificate to `<root>/<id / 1000>/<id>.der`, so no single
/// directory grows past a thousand files.
#[derive(Debug, Clone)]
pub struct FolderBlobStore {
    root: PathBuf,
}

impl FolderBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, cert_id: i64) -> PathBuf {
        self.root
            .join((cert_id / 1000).to_string())
            .join(format!("{cert_id}.der"))
    }
}

#[async_trait]
impl CertificateBlobStore for FolderBlobStore {
    async fn store(&self, cert_id: i64, raw: &[u8]) -> std::io::Result<()> {
        let path = self.path_for(cert_id);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&path, raw).await
    }
}
