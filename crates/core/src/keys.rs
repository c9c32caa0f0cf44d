//! Observation key conventions.
//!
//! Keys are dotted paths. Camera streams live under `observation.images.<cam>`,
//! depth under `observation.depth.<cam>`. Columnar storage replaces dots with
//! underscores.

/// Path separator
pub const SEPARATOR: char = '.';
/// Prefix of RGB camera streams
pub const IMAGE_PREFIX: &str = "observation.images.";
/// Prefix of depth streams
pub const DEPTH_PREFIX: &str = "observation.depth.";
/// Proprioceptive state vector
pub const STATE_KEY: &str = "observation.state";
/// Natural-language instruction
pub const LANGUAGE_KEY: &str = "observation.language";
/// Camera name written by camera selection
pub const CANONICAL_CAMERA: &str = "canonical";

/// True for RGB camera keys.
pub fn is_image_key(key: &str) -> bool {
    key.starts_with(IMAGE_PREFIX)
}

/// True for depth keys.
pub fn is_depth_key(key: &str) -> bool {
    key.starts_with(DEPTH_PREFIX)
}

/// Camera name of an image or depth key (its last segment).
pub fn camera_name(key: &str) -> Option<&str> {
    if is_image_key(key) || is_depth_key(key) {
        key.rsplit(SEPARATOR).next()
    } else {
        None
    }
}

/// `observation.images.<camera>`
pub fn make_image_key(camera: &str) -> String {
    format!("{}{}", IMAGE_PREFIX, camera)
}

/// Lowercase, map `/` and `-` to the separator, drop empty segments.
pub fn normalize_key(key: &str) -> String {
    key.to_lowercase()
        .replace(['/', '-'], ".")
        .split(SEPARATOR)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

/// Parquet column name for an observation key.
pub fn column_name(key: &str) -> String {
    key.replace(SEPARATOR, "_")
}
