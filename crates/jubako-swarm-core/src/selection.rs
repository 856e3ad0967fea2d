//! Playable-file selection.

use crate::model::SwarmFile;

/// File extensions treated as playable video, lowercase with the leading dot.
pub const VIDEO_EXTENSIONS: &[&str] = &[".mkv", ".mp4"];

/// Whether a path ends in a playable video extension, ignoring case.
#[must_use]
pub fn is_playable(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    VIDEO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Pick the largest playable file; the first one seen wins a length tie.
#[must_use]
pub fn select_playable(files: &[SwarmFile]) -> Option<&SwarmFile> {
    files
        .iter()
        .filter(|file| is_playable(&file.path))
        .fold(None, |best: Option<&SwarmFile>, file| match best {
            Some(current) if current.length >= file.length => Some(current),
            _ => Some(file),
        })
}
