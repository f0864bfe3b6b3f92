//! Discovery of the frame files that make up a clip.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::Error;

const FRAME_EXTS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// Return `true` if `path` has a frame extension we can decode.
#[must_use]
pub fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            FRAME_EXTS.iter().any(|e| *e == ext)
        })
}

/// List the frames of the clip stored in `dir`, ordered by file name.
/// Hidden files are skipped and subdirectories are not descended into.
///
/// # Errors
/// Returns [`Error::BadClipDir`] if `dir` is not a directory and
/// [`Error::EmptyClip`] if it holds no frames.
pub fn discover_frames(dir: &Path) -> Result<Vec<PathBuf>, Error> {
    if !dir.is_dir() {
        return Err(Error::BadClipDir(dir.to_path_buf()));
    }

    let frames: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .flatten()
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            !entry
                .file_name()
                .to_str()
                .is_some_and(|n| n.starts_with('.'))
        })
        .map(walkdir::DirEntry::into_path)
        .filter(|path| is_frame_file(path))
        .collect();

    if frames.is_empty() {
        return Err(Error::EmptyClip(dir.to_path_buf()));
    }
    Ok(frames)
}
