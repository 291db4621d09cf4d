//! Type definitions for pointers.

use std::fmt;

use crate::{format_json_pointer, format_pointer, parse_pointer, validate_path, validate_pointer, JsonPointerError};

/// A single unescaped path segment. Array indices are kept as strings.
pub type PathStep = String;

/// A sequence of path segments from a document root.
pub type Path = Vec<PathStep>;

/// A parsed `$ref` pointer.
///
/// `#/a/b` is local to the referencing document. Anything with a non-empty
/// part before `#` (or no `#` at all) names another document by URL or file
/// path, optionally followed by a fragment into it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Pointer {
    Local(Path),
    External { location: String, path: Path },
}

impl Pointer {
    /// Parses a `$ref` string.
    ///
    /// # Errors
    ///
    /// - `JsonPointerError::PointerInvalid` for an empty string or a fragment
    ///   that is not a path (`#name`).
    /// - `JsonPointerError::PointerTooLong` past [`crate::MAX_POINTER_LENGTH`].
    /// - `JsonPointerError::PathTooLong` past [`crate::MAX_PATH_LENGTH`] segments.
    ///
    /// ```
    /// use json_magic_pointer::Pointer;
    ///
    /// assert_eq!(Pointer::parse("#/a").unwrap(), Pointer::Local(vec!["a".into()]));
    /// assert_eq!(
    ///     Pointer::parse("user.json#/properties").unwrap(),
    ///     Pointer::External { location: "user.json".into(), path: vec!["properties".into()] },
    /// );
    /// ```
    pub fn parse(pointer: &str) -> Result<Self, JsonPointerError> {
        validate_pointer(pointer)?;
        let (location, fragment) = match pointer.split_once('#') {
            Some(parts) => parts,
            None => (pointer, ""),
        };
        let path = parse_pointer(fragment);
        validate_path(&path)?;
        if location.is_empty() {
            Ok(Pointer::Local(path))
        } else {
            Ok(Pointer::External {
                location: location.to_string(),
                path,
            })
        }
    }

    pub fn path(&self) -> &[String] {
        match self {
            Pointer::Local(path) => path,
            Pointer::External { path, .. } => path,
        }
    }

    pub fn location(&self) -> Option<&str> {
        match self {
            Pointer::Local(_) => None,
            Pointer::External { location, .. } => Some(location),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Pointer::Local(_))
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pointer::Local(path) => f.write_str(&format_pointer(path)),
            Pointer::External { location, path } if path.is_empty() => f.write_str(location),
            Pointer::External { location, path } => {
                write!(f, "{}#{}", location, format_json_pointer(path))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_local() {
        assert_eq!(Pointer::parse("#").unwrap(), Pointer::Local(vec![]));
        assert_eq!(
            Pointer::parse("#/components/schemas/User").unwrap().path(),
            &["components", "schemas", "User"]
        );
    }

    #[test]
    fn test_parse_external_without_fragment() {
        let pointer = Pointer::parse("https://example.com/user.json").unwrap();
        assert_eq!(pointer.location(), Some("https://example.com/user.json"));
        assert!(pointer.path().is_empty());
        assert!(!pointer.is_local());
    }

    #[test]
    fn test_parse_rejects_anchor_fragment() {
        assert_eq!(Pointer::parse("#anchor"), Err(JsonPointerError::PointerInvalid));
        assert_eq!(Pointer::parse(""), Err(JsonPointerError::PointerInvalid));
    }

    #[test]
    fn test_parse_rejects_deep_paths() {
        use crate::MAX_PATH_LENGTH;

        let deep = format!("#{}", "/a".repeat(MAX_PATH_LENGTH + 1));
        assert_eq!(Pointer::parse(&deep), Err(JsonPointerError::PathTooLong));
        let limit = format!("other.json#{}", "/a".repeat(MAX_PATH_LENGTH));
        assert_eq!(Pointer::parse(&limit).unwrap().path().len(), MAX_PATH_LENGTH);
    }

    #[test]
    fn test_display() {
        for input in ["#", "#/a~1b/c", "other.yaml", "other.yaml#/x"] {
            assert_eq!(Pointer::parse(input).unwrap().to_string(), input);
        }
    }
}
