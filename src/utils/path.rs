// src/utils/path.rs

//! Mapping of archived URLs to relative output file paths.

use url::Url;

use crate::error::Result;

const DEFAULT_STEM: &str = "index";
const EXTENSION: &str = ".html";

/// Characters that cannot appear in a file name on any supported platform.
fn is_invalid_file_name_char(c: char) -> bool {
    matches!(c, '"' | '<' | '>' | '|' | ':' | '*' | '?' | '\\' | '/') || (c as u32) < 32
}

/// Map `url` to a relative, filesystem-safe path ending in `.html`.
///
/// The URL path keeps its directory structure; the query is decoded and
/// appended to the file stem. Characters that are illegal in a file name are
/// replaced with `_` in the file name part only. Fails only when `url` is
/// not a valid absolute URL.
pub fn normalize_path(url: &str) -> Result<String> {
    let parsed = Url::parse(url)?;

    let path = parsed.path();
    let path = path.strip_prefix('/').unwrap_or(path);

    let query = match parsed.query() {
        Some(q) if !q.is_empty() => format!("?{}", decode(q)),
        _ => String::new(),
    };

    let (dir, file_name) = path.rsplit_once('/').unwrap_or(("", path));
    let stem = match file_name.rfind('.') {
        Some(dot) => &file_name[..dot],
        None => file_name,
    };
    let stem = if stem.is_empty() { DEFAULT_STEM } else { stem };

    let dir = if dir.chars().any(|c| c != '/' && c != '\\') {
        format!("{}/", dir.replace('\\', "/"))
    } else {
        String::new()
    };

    let name: String = format!("{stem}{query}")
        .chars()
        .map(|c| if is_invalid_file_name_char(c) { '_' } else { c })
        .collect();

    Ok(format!("{dir}{name}{EXTENSION}"))
}

fn decode(query: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(query.as_bytes())).into_owned()
}
