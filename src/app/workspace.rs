//! Timestamped working directory for a clone run.
//!
//! Every document the run fetches or receives is written here, along with
//! the downloaded code archive. The directory is left in place afterwards so
//! the operator can inspect what was sent and received.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::ZipArchive;

pub const SOURCE_DESCRIPTOR_FILE: &str = "source-function.json";
pub const CODE_ARCHIVE_FILE: &str = "code.zip";
pub const CREATE_RESPONSE_FILE: &str = "create-function.json";
pub const UPDATE_CODE_RESPONSE_FILE: &str = "update-function-code.json";
pub const UPDATE_CONFIGURATION_RESPONSE_FILE: &str = "update-function-configuration.json";
pub const TARGET_DESCRIPTOR_FILE: &str = "target-function.json";
pub const PLAN_FILE: &str = "clone-plan.json";
pub const COMMANDS_FILE: &str = "commands.txt";

const MAX_NAME_ATTEMPTS: u32 = 100;

#[derive(Debug, Clone)]
pub struct Workspace {
    dir: PathBuf,
}

impl Workspace {
    /// Create `<root>/lambda-clone-<source>-to-<target>-<timestamp>`.
    ///
    /// Never reuses a directory: a second run in the same second gets a
    /// `-2`, `-3`... suffix.
    pub fn create(
        root: &Path,
        source_name: &str,
        target_name: &str,
        started_at: DateTime<Local>,
    ) -> Result<Self> {
        let dir_name = format!(
            "lambda-clone-{}-to-{}-{}",
            sanitize(source_name),
            sanitize(target_name),
            started_at.format("%Y%m%d-%H%M%S")
        );
        fs::create_dir_all(root)
            .with_context(|| format!("Failed to create {}", root.display()))?;

        for attempt in 1..=MAX_NAME_ATTEMPTS {
            let dir = if attempt == 1 {
                root.join(&dir_name)
            } else {
                root.join(format!("{}-{}", dir_name, attempt))
            };
            match fs::create_dir(&dir) {
                Ok(()) => {
                    info!("Working directory: {}", dir.display());
                    return Ok(Self { dir });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!("{} already exists", dir.display());
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to create working directory {}", dir.display())
                    })
                }
            }
        }

        bail!(
            "Could not find a free working directory name for {} under {}",
            dir_name,
            root.display()
        )
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn write_json<T: Serialize>(&self, name: &str, document: &T) -> Result<PathBuf> {
        let path = self.file(name);
        let json = serde_json::to_string_pretty(document)
            .with_context(|| format!("Failed to serialize {}", name))?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        debug!("Wrote {}", path.display());
        Ok(path)
    }

    pub fn write_bytes(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.file(name);
        fs::write(&path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
        debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    pub fn write_text(&self, name: &str, text: &str) -> Result<PathBuf> {
        self.write_bytes(name, text.as_bytes())
    }

    pub fn read_json(&self, name: &str) -> Result<serde_json::Value> {
        let path = self.file(name);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

/// Keep directory names portable when functions are given by ARN.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Shape of a downloaded code archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub entries: usize,
    pub uncompressed_bytes: u64,
}

/// Open a zip archive in memory and total its entries.
///
/// Fails if the bytes are not a readable zip, which catches an expired
/// presigned URL that returned an error page instead of the package.
pub fn summarize_archive(bytes: &[u8]) -> Result<ArchiveSummary> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).context("Code package is not a valid zip archive")?;

    let mut uncompressed_bytes = 0u64;
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .context("Failed to access zip entry")?;
        uncompressed_bytes += entry.size();
    }

    Ok(ArchiveSummary {
        entries: archive.len(),
        uncompressed_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in files {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_workspace_directory_name() {
        let root = tempfile::tempdir().unwrap();
        let started = Local.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        let workspace = Workspace::create(root.path(), "orders-api", "orders:copy", started).unwrap();

        let name = workspace.path().file_name().unwrap().to_string_lossy().to_string();
        assert_eq!(name, "lambda-clone-orders-api-to-orders_copy-20260304-050607");
        assert!(workspace.path().is_dir());
    }

    #[test]
    fn test_same_second_runs_get_separate_directories() {
        let root = tempfile::tempdir().unwrap();
        let started = Local.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();

        let first = Workspace::create(root.path(), "a", "b", started).unwrap();
        first.write_text(COMMANDS_FILE, "first\n").unwrap();
        let second = Workspace::create(root.path(), "a", "b", started).unwrap();

        assert_ne!(first.path(), second.path());
        assert_eq!(
            second.path().file_name().unwrap().to_string_lossy(),
            "lambda-clone-a-to-b-20260304-050607-2"
        );
        assert!(!second.file(COMMANDS_FILE).exists());
        assert_eq!(
            fs::read_to_string(first.file(COMMANDS_FILE)).unwrap(),
            "first\n"
        );
    }

    #[test]
    fn test_write_and_read_json() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(root.path(), "a", "b", Local::now()).unwrap();

        let path = workspace
            .write_json(SOURCE_DESCRIPTOR_FILE, &serde_json::json!({ "Configuration": {} }))
            .unwrap();
        assert!(path.ends_with(SOURCE_DESCRIPTOR_FILE));

        let value = workspace.read_json(SOURCE_DESCRIPTOR_FILE).unwrap();
        assert!(value.get("Configuration").is_some());
    }

    #[test]
    fn test_summarize_archive() {
        let bytes = zip_bytes(&[("app.py", "print('hi')"), ("lib/util.py", "x = 1")]);
        let summary = summarize_archive(&bytes).unwrap();
        assert_eq!(summary.entries, 2);
        assert_eq!(summary.uncompressed_bytes, 16);
    }

    #[test]
    fn test_summarize_rejects_non_zip() {
        let err = summarize_archive(b"<Error><Code>AccessDenied</Code></Error>").unwrap_err();
        assert!(err.to_string().contains("not a valid zip"));
    }
}
