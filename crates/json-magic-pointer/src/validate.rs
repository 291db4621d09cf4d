//! Validation functions for pointers.

use crate::JsonPointerError;

/// Maximum allowed pointer string length.
pub const MAX_POINTER_LENGTH: usize = 1024;

/// Maximum allowed path depth.
pub const MAX_PATH_LENGTH: usize = 256;

/// Validates a `$ref` pointer string.
///
/// The part after `#`, when present and non-empty, must start with `/`.
///
/// ```
/// use json_magic_pointer::validate_pointer;
///
/// validate_pointer("#").unwrap();
/// validate_pointer("#/a/b").unwrap();
/// validate_pointer("schemas/user.json").unwrap();
/// validate_pointer("#a").unwrap_err();
/// ```
pub fn validate_pointer(pointer: &str) -> Result<(), JsonPointerError> {
    if pointer.is_empty() {
        return Err(JsonPointerError::PointerInvalid);
    }
    if pointer.len() > MAX_POINTER_LENGTH {
        return Err(JsonPointerError::PointerTooLong);
    }
    if let Some((_, fragment)) = pointer.split_once('#') {
        if !fragment.is_empty() && !fragment.starts_with('/') {
            return Err(JsonPointerError::PointerInvalid);
        }
    }
    Ok(())
}

/// Validates path depth.
pub fn validate_path(path: &[String]) -> Result<(), JsonPointerError> {
    if path.len() > MAX_PATH_LENGTH {
        return Err(JsonPointerError::PathTooLong);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_local_pointer() {
        assert!(validate_pointer("#").is_ok());
        assert!(validate_pointer("#/").is_ok());
        assert!(validate_pointer("#/foo/bar").is_ok());
    }

    #[test]
    fn test_validate_external_pointer() {
        assert!(validate_pointer("./a.yaml").is_ok());
        assert!(validate_pointer("https://example.com/a.json#/b").is_ok());
        assert!(validate_pointer("a.json#").is_ok());
    }

    #[test]
    fn test_validate_bad_fragment() {
        assert_eq!(validate_pointer("#foo"), Err(JsonPointerError::PointerInvalid));
        assert_eq!(validate_pointer("a.json#foo"), Err(JsonPointerError::PointerInvalid));
    }

    #[test]
    fn test_validate_long_pointer() {
        let long_pointer = "#/".to_string() + &"a".repeat(2000);
        assert_eq!(validate_pointer(&long_pointer), Err(JsonPointerError::PointerTooLong));
    }

    #[test]
    fn test_validate_path_depth() {
        let path: Vec<String> = (0..256).map(|i| i.to_string()).collect();
        assert!(validate_path(&path).is_ok());
        let path: Vec<String> = (0..300).map(|i| i.to_string()).collect();
        assert_eq!(validate_path(&path), Err(JsonPointerError::PathTooLong));
    }
}
