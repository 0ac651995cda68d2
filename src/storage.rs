use async_trait::async_trait;
use rand::RngCore;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_EXTENSIONS: &[&str] = &["pptx", "docx", "xlsx"];

#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("not_found")]
    NotFound,
    #[error("other: {0}")]
    Other(String),
}

/// Byte-blob storage addressed by `(storage_key, extension)`. The store never
/// sees user-supplied filenames.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn save(&self, storage_key: &str, extension: &str, bytes: &[u8]) -> Result<(), FileStoreError>;
    async fn load(&self, storage_key: &str, extension: &str) -> Result<Vec<u8>, FileStoreError>;
    async fn remove(&self, storage_key: &str, extension: &str) -> Result<(), FileStoreError>;
}

/// Local-filesystem store: one file per blob under the upload directory.
pub struct FsFileStore {
    root: PathBuf,
}

impl FsFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_env() -> Self {
        let root = std::env::var("FILEDROP_UPLOAD_DIR")
            .unwrap_or_else(|_| DEFAULT_UPLOAD_DIR.to_string());
        Self::new(root)
    }

    fn blob_path(&self, storage_key: &str, extension: &str) -> PathBuf {
        self.root.join(format!("{storage_key}.{extension}"))
    }
}

#[async_trait]
impl FileStore for FsFileStore {
    async fn save(&self, storage_key: &str, extension: &str, bytes: &[u8]) -> Result<(), FileStoreError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| FileStoreError::Other(e.to_string()))?;
        tokio::fs::write(self.blob_path(storage_key, extension), bytes)
            .await
            .map_err(|e| FileStoreError::Other(e.to_string()))
    }

    async fn load(&self, storage_key: &str, extension: &str) -> Result<Vec<u8>, FileStoreError> {
        match tokio::fs::read(self.blob_path(storage_key, extension)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(FileStoreError::NotFound),
            Err(e) => Err(FileStoreError::Other(e.to_string())),
        }
    }

    async fn remove(&self, storage_key: &str, extension: &str) -> Result<(), FileStoreError> {
        match tokio::fs::remove_file(self.blob_path(storage_key, extension)).await {
            Ok(()) => Ok(()),
            // removing an absent blob is fine
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FileStoreError::Other(e.to_string())),
        }
    }
}

/// 128 bits of OS randomness as 32 lowercase hex chars. Independent of file
/// content and of the client filename.
pub fn generate_storage_key() -> String {
    let mut buf = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Trailing `.`-segment of a filename, lowercased. `None` when there is no
/// usable extension.
pub fn extension_of(filename: &str) -> Option<String> {
    match filename.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => Some(ext.to_ascii_lowercase()),
        _ => None,
    }
}

/// Upload extension allowlist, fixed at startup.
pub struct ExtensionPolicy {
    allowed: Vec<String>,
}

impl ExtensionPolicy {
    pub fn new(allowed: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { allowed: allowed.into_iter().map(Into::into).collect() }
    }

    /// Comma-separated override via FILEDROP_ALLOWED_EXTENSIONS.
    pub fn from_env() -> Self {
        match std::env::var("FILEDROP_ALLOWED_EXTENSIONS") {
            Ok(csv) => Self::new(
                csv.split(',')
                    .map(|s| s.trim().to_ascii_lowercase())
                    .filter(|s| !s.is_empty()),
            ),
            Err(_) => Self::new(DEFAULT_EXTENSIONS.iter().copied()),
        }
    }

    pub fn permits(&self, extension: &str) -> bool {
        self.allowed.iter().any(|a| a == extension)
    }
}

pub fn build_file_store() -> Arc<dyn FileStore> {
    Arc::new(FsFileStore::from_env())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_keys_are_hex_and_unique() {
        let a = generate_storage_key();
        let b = generate_storage_key();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn extension_of_takes_the_trailing_segment() {
        assert_eq!(extension_of("report.xlsx"), Some("xlsx".into()));
        assert_eq!(extension_of("archive.tar.GZ"), Some("gz".into()));
        assert_eq!(extension_of("REPORT.XLSX"), Some("xlsx".into()));
        assert_eq!(extension_of("noextension"), None);
        assert_eq!(extension_of("trailing."), None);
    }

    #[test]
    fn default_allowlist_is_office_formats() {
        let p = ExtensionPolicy::new(DEFAULT_EXTENSIONS.iter().copied());
        assert!(p.permits("pptx"));
        assert!(p.permits("docx"));
        assert!(p.permits("xlsx"));
        assert!(!p.permits("exe"));
        assert!(!p.permits("pdf"));
    }
}
