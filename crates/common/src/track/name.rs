// Track name validation: traversal rejection, extension enforcement.

use thiserror::Error;

/// Every track stored under the tracks root carries this extension.
pub const TRACK_EXTENSION: &str = ".strudel";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackNameError {
    #[error("track name is empty")]
    Empty,

    #[error("track name contains a backslash")]
    Backslash,

    #[error("track name contains a traversal sequence")]
    Traversal,

    #[error("track name is absolute")]
    Absolute,

    #[error("track name must end with `{TRACK_EXTENSION}`")]
    MissingExtension,
}

/// Check a relative track name before it touches storage.
///
/// Rules:
/// - Reject empty names
/// - Reject any backslash
/// - Reject any `..` substring (covers `../x`, `a/../b` and `a..b`)
/// - Reject a leading `/`
/// - Require the `.strudel` extension
pub fn validate_name(name: &str) -> Result<(), TrackNameError> {
    if name.is_empty() {
        return Err(TrackNameError::Empty);
    }
    if name.contains('\\') {
        return Err(TrackNameError::Backslash);
    }
    if name.contains("..") {
        return Err(TrackNameError::Traversal);
    }
    if name.starts_with('/') {
        return Err(TrackNameError::Absolute);
    }
    if !name.ends_with(TRACK_EXTENSION) {
        return Err(TrackNameError::MissingExtension);
    }
    Ok(())
}

/// Whether a bare file name is stored as a track. Case-sensitive, and the
/// same suffix rule [`validate_name`] applies to full names.
pub fn is_track_file_name(file_name: &str) -> bool {
    file_name.ends_with(TRACK_EXTENSION)
}

/// Boolean form of [`validate_name`].
pub fn validate(name: &str) -> bool {
    validate_name(name).is_ok()
}

/// Normalize a user-supplied name for creation: append the extension when
/// missing, then validate.
pub fn normalize_new_name(requested: &str) -> Result<String, TrackNameError> {
    if requested.is_empty() {
        return Err(TrackNameError::Empty);
    }
    let name = if requested.ends_with(TRACK_EXTENSION) {
        requested.to_string()
    } else {
        format!("{requested}{TRACK_EXTENSION}")
    };
    validate_name(&name)?;
    Ok(name)
}

/// Starter payload for a freshly created track: a comment naming it.
pub fn starter_content(name: &str) -> String {
    let file_name = name.rsplit('/').next().unwrap_or(name);
    let base = file_name.strip_suffix(TRACK_EXTENSION).unwrap_or(file_name);
    format!("// {base}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_nested_track() {
        assert!(validate("folder/song.strudel"));
        assert!(validate("song.strudel"));
    }

    #[test]
    fn rejects_parent_traversal() {
        assert_eq!(validate_name("../escape.strudel"), Err(TrackNameError::Traversal));
        assert_eq!(validate_name("a/../../b.strudel"), Err(TrackNameError::Traversal));
    }

    #[test]
    fn rejects_absolute() {
        assert_eq!(validate_name("/abs.strudel"), Err(TrackNameError::Absolute));
    }

    #[test]
    fn rejects_backslash() {
        assert_eq!(validate_name("a\\b.strudel"), Err(TrackNameError::Backslash));
    }

    #[test]
    fn rejects_missing_extension() {
        assert_eq!(validate_name("noext"), Err(TrackNameError::MissingExtension));
        assert_eq!(validate_name("song.strudel.bak"), Err(TrackNameError::MissingExtension));
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(validate_name(""), Err(TrackNameError::Empty));
    }

    #[test]
    fn double_dot_inside_file_name_is_rejected() {
        // The rule is substring based, not component based.
        assert!(!validate("my..song.strudel"));
    }

    #[test]
    fn file_name_rule_agrees_with_validation() {
        for file_name in ["song.strudel", ".strudel", "song.STRUDEL", "song.strudel.swp", "x"] {
            assert_eq!(is_track_file_name(file_name), validate(file_name), "{file_name}");
        }
    }

    #[test]
    fn normalize_appends_extension() {
        assert_eq!(normalize_new_name("a/song").unwrap(), "a/song.strudel");
        assert_eq!(normalize_new_name("beat.strudel").unwrap(), "beat.strudel");
    }

    #[test]
    fn normalize_still_validates() {
        assert_eq!(normalize_new_name("../up"), Err(TrackNameError::Traversal));
        assert_eq!(normalize_new_name(""), Err(TrackNameError::Empty));
        assert_eq!(normalize_new_name("/root"), Err(TrackNameError::Absolute));
    }

    #[test]
    fn starter_names_the_track() {
        assert_eq!(starter_content("a/song.strudel"), "// song\n");
        assert_eq!(starter_content("beat.strudel"), "// beat\n");
    }
}
