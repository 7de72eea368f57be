use sha2::{Digest, Sha256};

/// Content-derived identifier: `prefix` followed by the hex SHA-256 of
/// `content`. Identical content always yields the same id.
pub fn compute_mdhash_id(content: impl AsRef<[u8]>, prefix: &str) -> String {
    let digest = Sha256::digest(content.as_ref());
    format!("{prefix}{digest:x}")
}

pub fn sanitize_text(input: &str) -> String {
    input.replace('\r', "").trim().to_string()
}

pub fn normalize_extension(ext: &str) -> String {
    ext.strip_prefix('.').unwrap_or(ext).to_ascii_lowercase()
}

/// First `max_chars` characters of `content`, with an ellipsis when cut.
pub fn summarize_content(content: &str, max_chars: usize) -> String {
    let trimmed = content.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}
