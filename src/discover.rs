//! Source-tree discovery.
//!
//! Walks the content root looking for candidate images, producing the sorted
//! path list the pipeline works through. The walk is recursive and flat: no
//! album semantics, every matching file anywhere under the root is a
//! candidate.
//!
//! ```text
//! content/
//! ├── pixlift.toml
//! ├── hero.jpg
//! ├── posts/
//! │   ├── 2024-trip/
//! │   │   ├── beach.jpg
//! │   │   └── notes.txt        # ignored, extension not in the allowlist
//! │   └── drafts/              # skipped via discovery.exclude_dirs
//! └── .pixlift/                # hidden, always skipped
//!     └── mapping.json
//! ```
//!
//! Matching is by lowercased file extension against the configured allowlist,
//! so `PHOTO.JPG` and `photo.jpg` are both picked up. Hidden files and
//! directories (leading dot) are always skipped, which keeps the state
//! directory and VCS internals out of the candidate set.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::config::DiscoveryConfig;

/// Recursively collect candidate images under `root`, sorted by path.
///
/// Returns an error if the root is missing or any directory in the tree is
/// unreadable; discovery is all-or-nothing.
pub fn discover_images(root: &Path, config: &DiscoveryConfig) -> io::Result<Vec<PathBuf>> {
    let mut images = Vec::new();

    let walker = WalkDir::new(root)
        .into_iter()
        // Depth 0 is the root itself, which must always be entered even when
        // its own name starts with a dot.
        .filter_entry(|e| e.depth() == 0 || !is_skipped(e, &config.exclude_dirs));

    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() && has_matching_extension(entry.path(), &config.extensions) {
            images.push(entry.into_path());
        }
    }

    images.sort();
    Ok(images)
}

fn is_skipped(entry: &DirEntry, exclude_dirs: &[String]) -> bool {
    let name = entry.file_name().to_string_lossy();
    if name.starts_with('.') {
        return true;
    }
    entry.file_type().is_dir() && exclude_dirs.iter().any(|d| d == name.as_ref())
}

fn has_matching_extension(path: &Path, extensions: &[String]) -> bool {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    extensions.iter().any(|e| *e == ext)
}

/// Filename with extension, the identity images are tracked under.
///
/// Directories are deliberately ignored: `posts/beach.jpg` and `old/beach.jpg`
/// share the identity `beach.jpg`.
pub fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// The set of basenames for a discovered path list, as fed to store
/// reconciliation.
pub fn basenames(paths: &[PathBuf]) -> BTreeSet<String> {
    paths.iter().map(|p| basename(p)).collect()
}
