//! Path validation for storage keys.
//!
//! Every backend resolves keys relative to its own root. Keys reaching a
//! backend come from digests and principal identifiers, which callers
//! validate first, but the backend still refuses anything that could escape
//! the root.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates and normalizes a relative storage path.
///
/// `.` components and repeated or trailing separators are dropped, `..`
/// components are resolved as long as they never climb above the root.
/// Null bytes, Windows prefixes and paths that normalize to nothing are
/// rejected with [`InvalidPath`](crate::error::ErrorKind::InvalidPath).
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use hashcloud_storage::validate_path;
///
/// assert!(validate_path("data/2cf24dba5fb0a30e").is_ok());
/// assert!(validate_path("../data/2cf24dba5fb0a30e").is_err());
/// assert!(validate_path("data\0").is_err());
/// assert_eq!(validate_path("./data//blob/").unwrap(), Path::new("data/blob"));
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let mut components = Vec::new();
    for component in original.components() {
        match component {
            Component::Normal(s) => {
                // Null bytes survive Path::components() on Unix but truncate
                // C-based syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
                }
                components.push(s);
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(original.to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
                }
            },
        }
    }
    if components.is_empty() {
        exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
    }
    Ok(components.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("data/abc", "data/abc")]
    #[case("data//abc", "data/abc")]
    #[case("./data/./abc", "data/abc")]
    #[case("data/abc/", "data/abc")]
    #[case("/data/abc", "data/abc")]
    #[case("data/tmp/../abc", "data/abc")]
    fn test_valid(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(validate(input).unwrap(), Path::new(expected));
    }

    #[rstest]
    #[case("")]
    #[case(".")]
    #[case("./.")]
    #[case("//")]
    #[case("..")]
    #[case("../data/abc")]
    #[case("data/../../abc")]
    #[case("data/a\0b")]
    fn test_invalid(#[case] input: &str) {
        let err = validate(input).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }
}
