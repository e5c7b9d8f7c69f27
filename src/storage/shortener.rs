//! Deterministic shortening of over-long output paths.

use std::collections::HashMap;
use std::sync::Mutex;

/// Longest full output path the filesystem is assumed to accept.
pub const MAX_PATH_LEN: usize = 260;

/// Room kept free for the `...(n)` suffix.
const SUFFIX_SLACK: usize = 7;

/// Clips long paths and numbers the collisions.
///
/// Two different paths that clip to the same prefix get distinct numbers.
/// The same path always maps to the same shortened path for the lifetime of
/// the shortener.
#[derive(Debug)]
pub struct PathShortener {
    max_len: usize,
    assigned: Mutex<HashMap<String, HashMap<String, usize>>>,
}

impl Default for PathShortener {
    fn default() -> Self {
        Self::new(MAX_PATH_LEN)
    }
}

impl PathShortener {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            assigned: Mutex::new(HashMap::new()),
        }
    }

    fn budget(&self, extension: &str) -> usize {
        // One extra character for the dot before the extension.
        self.max_len.saturating_sub(extension.chars().count() + 1 + SUFFIX_SLACK)
    }

    /// Whether `path` must be shortened before it can be written.
    pub fn needs_shortening(&self, path: &str) -> bool {
        path.chars().count() >= self.budget(extension(path))
    }

    /// Return `path` unchanged when it fits, otherwise its shortened form
    /// `<clipped>...(<n>).<ext>`.
    pub fn shorten(&self, path: &str) -> String {
        if !self.needs_shortening(path) {
            return path.to_string();
        }

        let ext = extension(path);
        let clipped: String = path.chars().take(self.budget(ext)).collect();

        let number = {
            let mut assigned = self.assigned.lock().unwrap_or_else(|p| p.into_inner());
            let paths = assigned.entry(clipped.clone()).or_default();
            let next = paths.len() + 1;
            *paths.entry(path.to_string()).or_insert(next)
        };

        if ext.is_empty() {
            format!("{clipped}...({number})")
        } else {
            format!("{clipped}...({number}).{ext}")
        }
    }
}

/// Extension of the last path component, without the dot.
fn extension(path: &str) -> &str {
    let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    match file_name.rfind('.') {
        Some(dot) if dot > 0 => &file_name[dot + 1..],
        _ => "",
    }
}
