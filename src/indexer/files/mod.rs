
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use glob::Pattern;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::IndexingConfig;
use crate::embeddings::chunking::Metadata;
use crate::{RagError, Result, UnreadableReason};

const BINARY_EXTENSIONS: &[&str] = &[
    "png",
    "jpg",
    "jpeg",
    "gif",
    "bmp",
    "ico",
    "icns",
    "pdf",
    "zip",
    "tar",
    "gz",
    "dmg",
    "app",
    "xcodeproj",
    "xcworkspace",
    "xcassets",
];
const LANGUAGE_EXTENSIONS: &[&str] = &["swift", "py", "js", "ts", "java", "cpp", "c", "rs"];
const BINARY_SNIFF_BYTES: usize = 1024;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Decides which files of a repository get indexed
#[derive(Debug, Clone)]
pub struct FileFilter {
    extensions: Vec<String>,
    excludes: Vec<(Pattern, Pattern)>,
}

impl FileFilter {
    #[inline]
    pub fn new(config: &IndexingConfig) -> Result<Self> {
        let extensions = config
            .supported_extensions
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .collect();

        let excludes = config
            .exclude_patterns
            .iter()
            .map(|raw| {
                let compile = |pattern: &str| {
                    Pattern::new(pattern).map_err(|e| {
                        RagError::Configuration(format!("Invalid exclude pattern '{raw}': {e}"))
                    })
                };
                Ok((compile(raw)?, compile(&format!("*/{raw}"))?))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            extensions,
            excludes,
        })
    }

    /// Supported extension and no exclude pattern matching the relative path
    #[inline]
    pub fn is_eligible(&self, relative_path: &str) -> bool {
        let Some(extension) = extension_of(Path::new(relative_path)) else {
            return false;
        };
        if !self.extensions.contains(&extension) {
            return false;
        }

        !self
            .excludes
            .iter()
            .any(|(whole, nested)| whole.matches(relative_path) || nested.matches(relative_path))
    }

    /// Eligible files under `root`, sorted; hidden directories and `__pycache__` are not entered.
    ///
    /// Only an unreadable `root` is an error. Entries below it that cannot be
    /// walked are logged and listed in [`Discovery::unwalkable`].
    #[inline]
    pub fn discover(&self, root: &Path) -> Result<Discovery> {
        let mut discovery = Discovery::default();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_skipped_dir(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(RagError::Io(std::io::Error::other(format!(
                        "Failed to walk {}: {e}",
                        root.display()
                    ))));
                }
                Err(e) => {
                    let relative = e
                        .path()
                        .map(|path| relative_path(root, path))
                        .unwrap_or_default();
                    warn!("Cannot walk {}: {}", relative, e);
                    discovery.unwalkable.push((relative, e.to_string()));
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = relative_path(root, entry.path());
            if self.is_eligible(&relative) {
                discovery.files.push(entry.into_path());
            }
        }

        discovery.files.sort();
        debug!(
            "Discovered {} eligible files in {} ({} unwalkable)",
            discovery.files.len(),
            root.display(),
            discovery.unwalkable.len()
        );
        Ok(discovery)
    }
}

/// Result of walking a repository
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    /// Eligible files, sorted
    pub files: Vec<PathBuf>,
    /// (relative path, error) for entries the walk could not enter
    pub unwalkable: Vec<(String, String)>,
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.') || name == "__pycache__")
}

/// Lower-cased extension without the dot
fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}

/// `path` relative to `root` with forward slashes
#[inline]
pub fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// A file's decoded text and extracted metadata
#[derive(Debug, Clone, PartialEq)]
pub struct FileContent {
    pub text: String,
    pub metadata: Metadata,
}

/// Reads repository files safely
#[derive(Debug, Clone, Copy)]
pub struct FileProcessor {
    max_file_size_mb: u64,
}

impl FileProcessor {
    #[inline]
    pub const fn new(max_file_size_mb: u64) -> Self {
        Self { max_file_size_mb }
    }

    /// Binary by extension, or by a NUL byte among the first 1024 bytes
    #[inline]
    pub fn is_binary(path: &Path) -> Result<bool> {
        if extension_of(path).is_some_and(|ext| BINARY_EXTENSIONS.contains(&ext.as_str())) {
            return Ok(true);
        }

        let mut head = Vec::with_capacity(BINARY_SNIFF_BYTES);
        fs::File::open(path)?
            .take(BINARY_SNIFF_BYTES as u64)
            .read_to_end(&mut head)?;
        Ok(head.contains(&0))
    }

    /// Read `path` as text after the size and binary checks.
    ///
    /// Invalid UTF-8 is decoded as Latin-1.
    #[inline]
    pub fn read(&self, path: &Path) -> Result<FileContent> {
        let unreadable = |reason: UnreadableReason| RagError::FileUnreadable {
            path: path.to_path_buf(),
            reason,
        };
        let io_error = |e: std::io::Error| unreadable(UnreadableReason::Io(e.to_string()));

        let size_mb = fs::metadata(path).map_err(io_error)?.len() as f64 / BYTES_PER_MB;
        if size_mb > self.max_file_size_mb as f64 {
            return Err(unreadable(UnreadableReason::TooLarge {
                size_mb,
                limit_mb: self.max_file_size_mb,
            }));
        }

        if Self::is_binary(path).map_err(|e| unreadable(UnreadableReason::Io(e.to_string())))? {
            return Err(unreadable(UnreadableReason::Binary));
        }

        let bytes = fs::read(path).map_err(io_error)?;
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                debug!("{} is not UTF-8, decoding as Latin-1", path.display());
                e.into_bytes().iter().map(|&byte| char::from(byte)).collect()
            }
        };

        let metadata = extract_metadata(path, &text);
        Ok(FileContent { text, metadata })
    }
}

/// Per-file metadata attached to every chunk of the file
#[inline]
pub fn extract_metadata(path: &Path, content: &str) -> Metadata {
    let mut metadata = Metadata::new();

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_string());

    metadata.insert("file_name".to_string(), file_name.into());
    metadata.insert(
        "file_extension".to_string(),
        extension
            .as_deref()
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default()
            .into(),
    );
    metadata.insert("file_size".to_string(), content.chars().count().into());
    metadata.insert(
        "line_count".to_string(),
        (content.matches('\n').count() + 1).into(),
    );

    if let Some(ext) = extension.as_deref() {
        if LANGUAGE_EXTENSIONS.contains(&ext) {
            metadata.insert("language".to_string(), ext.into());
        }
        if ext == "md" {
            if let Some(title) = content
                .lines()
                .find_map(|line| line.strip_prefix("# "))
            {
                metadata.insert("title".to_string(), title.trim().into());
            }
        }
    }

    metadata
}
