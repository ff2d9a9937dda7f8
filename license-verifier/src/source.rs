//! Where license bytes come from.

use async_trait::async_trait;
use std::io;
use std::path::PathBuf;

/// A location the license is re-read from on every verification attempt.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Human-readable location, used in errors and logs.
    fn location(&self) -> String;

    /// Reads the current license bytes.
    async fn read(&self) -> io::Result<Vec<u8>>;
}

/// A license stored in a file, typically a mounted secret.
#[derive(Debug, Clone)]
pub struct LicenseFile {
    path: PathBuf,
}

impl LicenseFile {
    /// Creates a source for the file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CredentialSource for LicenseFile {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    async fn read(&self) -> io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }
}
