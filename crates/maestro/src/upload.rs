//! Per-request scratch storage for uploaded files.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const DEFAULT_UPLOAD_NAME: &str = "upload.mid";

/// Reduce a client-supplied filename to a safe single path component.
///
/// Whitespace becomes `_`, anything outside `[A-Za-z0-9._-]` is dropped, and
/// leading or trailing dots and underscores are trimmed. Returns `None` when
/// nothing usable is left.
pub fn sanitize_filename(name: &str) -> Option<String> {
    // Clients on Windows send full paths
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);

    let cleaned: String = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// An uploaded file written into its own temporary directory. The directory
/// and everything in it is removed when this value is dropped.
#[derive(Debug)]
pub struct ScratchUpload {
    _dir: TempDir,
    path: PathBuf,
}

impl ScratchUpload {
    /// Write `bytes` into a fresh `maestro-*` directory under `root`.
    pub fn write(root: &Path, filename: &str, bytes: &[u8]) -> std::io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("maestro-").tempdir_in(root)?;
        let name = sanitize_filename(filename).unwrap_or_else(|| DEFAULT_UPLOAD_NAME.to_string());
        let path = dir.path().join(name);
        std::fs::write(&path, bytes)?;
        Ok(Self { _dir: dir, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_like_a_form_upload() {
        assert_eq!(sanitize_filename("My Song.mid").as_deref(), Some("My_Song.mid"));
        assert_eq!(sanitize_filename("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(
            sanitize_filename("C:\\Users\\me\\fugue (1).MID").as_deref(),
            Some("fugue_1.MID")
        );
        assert_eq!(sanitize_filename("..."), None);
        assert_eq!(sanitize_filename("ñ"), None);
    }

    #[test]
    fn scratch_dir_is_removed_on_drop() {
        let root = TempDir::new().unwrap();
        let upload = ScratchUpload::write(root.path(), "..", b"MThd").unwrap();
        let path = upload.path().to_path_buf();
        assert!(path.ends_with(DEFAULT_UPLOAD_NAME));
        assert!(path.starts_with(root.path()));
        assert_eq!(std::fs::read(&path).unwrap(), b"MThd");

        let dir = path.parent().unwrap().to_path_buf();
        drop(upload);
        assert!(!dir.exists());
    }
}
