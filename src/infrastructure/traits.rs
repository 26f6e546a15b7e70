//! I/O boundary traits for testability
//!
//! These traits abstract external I/O operations, allowing services
//! to be tested with mock implementations.

use std::io;
use std::path::Path;

/// Filesystem abstraction for testability.
pub trait FileSystem: Send + Sync {
    /// Read file contents to string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Check if path is a file.
    fn is_file(&self, path: &Path) -> bool;
}

/// Real filesystem implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn given_tally_file_when_reading_then_content_returned() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tally.toml");
        std::fs::write(&path, "[[proportional_elections]]").unwrap();
        let fs = RealFileSystem;

        assert!(fs.is_file(&path));
        assert!(!fs.is_file(temp.path()));
        assert_eq!(fs.read_to_string(&path).unwrap(), "[[proportional_elections]]");
    }
}
