// Temporary file lifecycle
//
// Every request that downloads anything owns a TempSlot: a unique file-name
// stem under the process temp directory. Backends write `<stem>.<ext>` or
// `<stem>_<n>.<ext>`; dropping the slot deletes every file carrying the stem,
// so no exit path (early return, `?`, panic unwinding) leaks files.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use super::models::{DownloadOutcome, MediaArtifact, Platform};
use super::utils::{mime_category, sniff_category};

/// Extensions yt-dlp and friends use for in-flight files
const PARTIAL_EXTENSIONS: &[&str] = &["part", "ytdl", "temp", "tmp"];

lazy_static! {
    /// Names `allocate` can produce, with or without an item suffix
    static ref SLOT_NAME: Regex =
        Regex::new(r"^(youtube|instagram|tiktok|twitter)_\d+_\d+-[0-9a-f]{8}[._]").unwrap();
}

/// Process-scoped temp directory with collision-free naming
#[derive(Debug)]
pub struct TempFiles {
    root: PathBuf,
    max_bytes: u64,
    seq: AtomicU64,
    ready: AtomicBool,
}

impl TempFiles {
    pub fn new(root: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            root: root.into(),
            max_bytes,
            seq: AtomicU64::new(0),
            ready: AtomicBool::new(false),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    fn ensure_dir(&self) -> io::Result<()> {
        if !self.ready.load(Ordering::Acquire) {
            // create_dir_all tolerates a concurrent creator
            fs::create_dir_all(&self.root)?;
            self.ready.store(true, Ordering::Release);
        }
        Ok(())
    }

    /// Reserve a unique stem: `<platform>_<unix millis>_<seq>-<random>`
    pub fn allocate(&self, platform: Platform) -> io::Result<TempSlot> {
        self.ensure_dir()?;

        let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let random = Uuid::new_v4().simple().to_string();
        let stem = format!("{}_{}_{}-{}", platform.as_str(), millis, seq, &random[..8]);

        debug!(target: "files", stem = %stem, "allocated temp slot");
        Ok(TempSlot {
            root: self.root.clone(),
            stem,
            max_bytes: self.max_bytes,
            released: false,
        })
    }

    /// True iff the file exists and fits the transport ceiling
    pub fn validate_size(&self, path: &Path) -> bool {
        validate_size(path, self.max_bytes)
    }

    /// Idempotent delete; failures are logged, never returned
    pub fn dispose(&self, path: &Path) -> bool {
        dispose(path)
    }

    /// Remove slot files left by a previous run; anything else in the
    /// directory is left alone
    pub fn purge_stale(&self) -> usize {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(_) => return 0,
        };
        entries
            .flatten()
            .filter(|e| e.file_name().to_str().map_or(false, |n| SLOT_NAME.is_match(n)))
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .filter(|p| dispose(p))
            .count()
    }
}

/// A reserved file-name stem owned by one request
#[derive(Debug)]
pub struct TempSlot {
    root: PathBuf,
    stem: String,
    max_bytes: u64,
    released: bool,
}

impl TempSlot {
    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// Transport ceiling every produced file is checked against
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// `<root>/<stem>`, without extension
    pub fn path(&self) -> PathBuf {
        self.root.join(&self.stem)
    }

    pub fn path_with_ext(&self, ext: &str) -> PathBuf {
        self.root.join(format!("{}.{}", self.stem, ext))
    }

    /// Path of the `index`-th item (1-based) of a multi-item post
    pub fn item_path(&self, index: usize, ext: &str) -> PathBuf {
        self.root.join(format!("{}_{}.{}", self.stem, index, ext))
    }

    /// yt-dlp output template for this slot
    pub fn output_template(&self, per_item: bool) -> String {
        let name = if per_item {
            format!("{}_%(playlist_index|1)s.%(ext)s", self.stem)
        } else {
            format!("{}.%(ext)s", self.stem)
        };
        self.root.join(name).to_string_lossy().into_owned()
    }

    fn owns(&self, name: &str) -> bool {
        name.strip_prefix(self.stem.as_str())
            .and_then(|rest| rest.chars().next())
            .map_or(false, |c| c == '.' || c == '_')
    }

    /// Every file currently carrying this stem, sorted by name
    pub fn produced_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = match fs::read_dir(&self.root) {
            Ok(entries) => entries
                .flatten()
                .filter(|e| e.file_name().to_str().map_or(false, |n| self.owns(n)))
                .map(|e| e.path())
                .collect(),
            Err(_) => Vec::new(),
        };
        files.sort();
        files
    }

    /// Produced files minus in-flight leftovers
    pub fn finished_files(&self) -> Vec<PathBuf> {
        self.produced_files()
            .into_iter()
            .filter(|p| !is_partial(p))
            .collect()
    }

    /// The finished file for item `index` (1-based), whatever its extension.
    /// yt-dlp zero-pads the index to the width of the entry count.
    pub fn find_item(&self, index: usize) -> Option<PathBuf> {
        self.finished_files()
            .into_iter()
            .find(|p| self.item_index(p) == Some(index))
    }

    fn item_index(&self, path: &Path) -> Option<usize> {
        let name = path.file_name()?.to_str()?;
        let rest = name.strip_prefix(self.stem.as_str())?.strip_prefix('_')?;
        let (digits, _ext) = rest.split_once('.')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    pub fn validate_size(&self, path: &Path) -> bool {
        validate_size(path, self.max_bytes)
    }

    pub fn dispose(&self, path: &Path) -> bool {
        dispose(path)
    }

    /// Delete every file carrying the stem; returns how many were removed
    pub fn sweep(&self) -> usize {
        self.produced_files().iter().filter(|p| dispose(p)).count()
    }

    /// Size-check and classify a produced file
    pub fn outcome_for(&self, path: &Path) -> DownloadOutcome {
        let size_bytes = match fs::metadata(path) {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => return DownloadOutcome::failed("produced file is missing"),
        };

        if size_bytes == 0 {
            return DownloadOutcome::failed("produced file is empty");
        }

        if size_bytes > self.max_bytes {
            return DownloadOutcome::TooLarge {
                path: path.to_path_buf(),
                size_bytes,
            };
        }

        let category = mime_category(path).or_else(|| read_head(path).and_then(|h| sniff_category(&h)));
        match category {
            Some(mime_category) => DownloadOutcome::Success(MediaArtifact {
                local_path: path.to_path_buf(),
                size_bytes,
                mime_category,
            }),
            None => DownloadOutcome::failed(format!("unrecognised media type: {}", path.display())),
        }
    }

    /// Explicit release; dropping the slot does the same
    pub fn release(mut self) -> usize {
        self.released = true;
        self.sweep()
    }
}

impl Drop for TempSlot {
    fn drop(&mut self) {
        if !self.released {
            let removed = self.sweep();
            if removed > 0 {
                debug!(target: "files", stem = %self.stem, removed, "swept temp slot");
            }
        }
    }
}

fn validate_size(path: &Path, max_bytes: u64) -> bool {
    match fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.len() <= max_bytes,
        Err(_) => false,
    }
}

/// Returns true when a file was actually removed
fn dispose(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(target: "files", path = %path.display(), "cleaned up");
            true
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!(target: "files", path = %path.display(), error = %e, "cleanup failed");
            false
        }
    }
}

fn is_partial(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| PARTIAL_EXTENSIONS.contains(&e))
}

fn read_head(path: &Path) -> Option<Vec<u8>> {
    let mut buf = vec![0u8; 16];
    let n = fs::File::open(path).and_then(|mut f| f.read(&mut buf)).ok()?;
    buf.truncate(n);
    Some(buf)
}
