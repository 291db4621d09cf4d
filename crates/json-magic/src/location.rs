//! Document locations: URLs and file paths.
//!
//! External `$ref` targets are written relative to the document that contains
//! them. [`resolve_reference_path`] turns such a target into an absolute
//! location, and [`to_relative_path`] goes the other way.

use url::Url;

/// Returns `true` for `http:` and `https:` URLs.
pub fn is_remote_url(value: &str) -> bool {
    Url::parse(value)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Returns `true` for pointers into the current document (`#...`).
pub fn is_local_ref(value: &str) -> bool {
    value.starts_with('#')
}

/// Makes a document location absolute: URLs are kept, file paths are
/// normalized and anchored at the current working directory.
pub fn absolute_location(location: &str) -> String {
    if is_remote_url(location) {
        location.to_string()
    } else {
        absolute_local(location)
    }
}

/// Resolves `relative` against the location of the document that refers to it.
///
/// The directory of `base` is its parent when the last component has a file
/// extension, otherwise `base` itself. Remote bases resolve with URL rules
/// (scheme, host and port are kept); local bases resolve with file-path rules,
/// relative local bases are taken from the current working directory, and
/// backslashes are treated as `/`. Absolute targets come back unchanged.
///
/// ```
/// use json_magic::location::resolve_reference_path;
///
/// assert_eq!(
///     resolve_reference_path("https://example.com/api/v1/openapi.json", "../schemas/user.json"),
///     "https://example.com/api/schemas/user.json",
/// );
/// assert_eq!(
///     resolve_reference_path("/path/to/openapi.json", "user.json"),
///     "/path/to/user.json",
/// );
/// ```
pub fn resolve_reference_path(base: &str, relative: &str) -> String {
    if is_remote_url(relative) {
        return relative.to_string();
    }

    if is_remote_url(base) {
        if let Ok(mut url) = Url::parse(base) {
            let merged = if relative.starts_with('/') {
                normalize(relative)
            } else {
                normalize(&join(directory_of(url.path()), relative))
            };
            url.set_path(&merged);
            return url.to_string();
        }
    }

    let relative = relative.replace('\\', "/");
    if is_absolute_local(&relative) {
        return relative;
    }
    let base = absolute_local(base);
    normalize(&join(directory_of(&base), &relative))
}

/// Computes a path from the directory of `base` to `target`.
///
/// URLs on a different origin, and mixes of URLs and file paths, have no
/// relative form; `target` is returned unchanged for those.
///
/// ```
/// use json_magic::location::to_relative_path;
///
/// assert_eq!(to_relative_path("/a/schemas/user.json", "/a/b/openapi.json"), "../schemas/user.json");
/// assert_eq!(
///     to_relative_path("https://example.com/a/user.json", "https://other.com/a/openapi.json"),
///     "https://example.com/a/user.json",
/// );
/// ```
pub fn to_relative_path(target: &str, base: &str) -> String {
    match (is_remote_url(target), is_remote_url(base)) {
        (true, true) => {
            let (Ok(target_url), Ok(base_url)) = (Url::parse(target), Url::parse(base)) else {
                return target.to_string();
            };
            if target_url.origin() != base_url.origin() {
                return target.to_string();
            }
            let mut relative = relative_between(directory_of(base_url.path()), target_url.path());
            if let Some(query) = target_url.query() {
                relative.push('?');
                relative.push_str(query);
            }
            relative
        }
        (false, false) => {
            let target = absolute_local(target);
            let base = absolute_local(base);
            relative_between(directory_of(&base), &target)
        }
        _ => target.to_string(),
    }
}

fn has_extension(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rfind('.') {
        Some(idx) => idx > 0 && idx + 1 < name.len(),
        None => false,
    }
}

fn directory_of(path: &str) -> &str {
    if has_extension(path) {
        match path.rfind('/') {
            Some(idx) => &path[..idx],
            None => "",
        }
    } else {
        path
    }
}

fn join(dir: &str, relative: &str) -> String {
    if dir.is_empty() {
        relative.to_string()
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), relative)
    }
}

fn is_drive_path(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'/'
}

fn is_absolute_local(path: &str) -> bool {
    path.starts_with('/') || is_drive_path(path)
}

fn absolute_local(path: &str) -> String {
    let path = path.replace('\\', "/");
    if is_absolute_local(&path) {
        return normalize(&path);
    }
    let cwd = std::env::current_dir()
        .map(|dir| dir.to_string_lossy().replace('\\', "/"))
        .unwrap_or_else(|_| "/".to_string());
    normalize(&join(&cwd, &path))
}

/// Collapses `.`, `..` and repeated separators, and drops a trailing `/`.
fn normalize(path: &str) -> String {
    let (prefix, rest) = if let Some(rest) = path.strip_prefix('/') {
        ("/", rest)
    } else if is_drive_path(path) {
        (&path[..3], &path[3..])
    } else {
        ("", path)
    };

    let mut parts: Vec<&str> = Vec::new();
    for segment in rest.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if prefix.is_empty() {
                    parts.push("..");
                }
            }
            segment => parts.push(segment),
        }
    }

    let joined = parts.join("/");
    if prefix.is_empty() && joined.is_empty() {
        ".".to_string()
    } else {
        format!("{prefix}{joined}")
    }
}

fn relative_between(from_dir: &str, to: &str) -> String {
    let from: Vec<&str> = from_dir.split('/').filter(|s| !s.is_empty()).collect();
    let to: Vec<&str> = to.split('/').filter(|s| !s.is_empty()).collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut parts: Vec<&str> = vec![".."; from.len() - common];
    parts.extend(&to[common..]);
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cwd() -> String {
        std::env::current_dir().unwrap().to_string_lossy().replace('\\', "/")
    }

    #[test]
    fn test_is_remote_url() {
        assert!(is_remote_url("https://example.com/openapi.json"));
        assert!(is_remote_url("http://localhost:3000/a.yaml"));
        assert!(!is_remote_url("file:///tmp/a.json"));
        assert!(!is_remote_url("./a.json"));
        assert!(!is_remote_url("#/a"));
    }

    #[test]
    fn test_is_local_ref() {
        assert!(is_local_ref("#/components"));
        assert!(!is_local_ref("a.json#/components"));
    }

    #[test]
    fn test_remote_relative_paths() {
        let base = "https://example.com/api/v1/openapi.json";
        assert_eq!(resolve_reference_path(base, "schemas/user.json"), "https://example.com/api/v1/schemas/user.json");
        assert_eq!(resolve_reference_path(base, "../schemas/user.json"), "https://example.com/api/schemas/user.json");
        assert_eq!(resolve_reference_path(base, "./user.json"), "https://example.com/api/v1/user.json");
    }

    #[test]
    fn test_remote_root_relative_path() {
        assert_eq!(
            resolve_reference_path("https://example.com/api/v1/openapi.json", "/schemas/user.json"),
            "https://example.com/schemas/user.json"
        );
    }

    #[test]
    fn test_remote_absolute_target_unchanged() {
        assert_eq!(
            resolve_reference_path("https://example.com/openapi.json", "https://other.com/user.json"),
            "https://other.com/user.json"
        );
        assert_eq!(
            resolve_reference_path("/local/openapi.json", "https://other.com/user.json"),
            "https://other.com/user.json"
        );
    }

    #[test]
    fn test_remote_keeps_port_and_scheme() {
        assert_eq!(
            resolve_reference_path("http://localhost:3000/api/openapi.json", "user.json"),
            "http://localhost:3000/api/user.json"
        );
    }

    #[test]
    fn test_remote_base_without_extension_is_a_directory() {
        assert_eq!(
            resolve_reference_path("https://example.com/api/v1", "user.json"),
            "https://example.com/api/v1/user.json"
        );
    }

    #[test]
    fn test_local_paths() {
        assert_eq!(resolve_reference_path("/path/to/openapi.json", "user.json"), "/path/to/user.json");
        assert_eq!(resolve_reference_path("/path/to/openapi.json", "./schemas/user.json"), "/path/to/schemas/user.json");
        assert_eq!(resolve_reference_path("/path/to/openapi.json", "../"), "/path");
        assert_eq!(resolve_reference_path("/path/to/openapi.json", "./"), "/path/to");
        assert_eq!(resolve_reference_path("/path/to", "user.json"), "/path/to/user.json");
    }

    #[test]
    fn test_local_absolute_target_unchanged() {
        assert_eq!(resolve_reference_path("/path/to/openapi.json", "/schemas/user.json"), "/schemas/user.json");
    }

    #[test]
    fn test_local_relative_base_uses_cwd() {
        assert_eq!(
            resolve_reference_path("api/openapi.json", "../schemas/user.json"),
            format!("{}/schemas/user.json", cwd())
        );
    }

    #[test]
    fn test_windows_separators() {
        assert_eq!(
            resolve_reference_path("C:\\path\\to\\openapi.json", "schemas\\user.json"),
            "C:/path/to/schemas/user.json"
        );
        assert_eq!(resolve_reference_path("C:\\path\\to\\openapi.json", "\\schemas\\user.json"), "/schemas/user.json");
    }

    #[test]
    fn test_resolution_composes() {
        for base in ["https://example.com/api/openapi.yaml", "/srv/specs/openapi.yaml"] {
            let step = resolve_reference_path(base, "components/schemas/user.json");
            assert_eq!(
                resolve_reference_path(&step, "../responses/error.json"),
                resolve_reference_path(base, "components/schemas/../responses/error.json")
            );
        }
    }

    #[test]
    fn test_to_relative_path() {
        assert_eq!(to_relative_path("/a/b/user.json", "/a/b/openapi.json"), "user.json");
        assert_eq!(to_relative_path("/a/schemas/user.json", "/a/b/openapi.json"), "../schemas/user.json");
        assert_eq!(
            to_relative_path("https://example.com/api/schemas/user.json", "https://example.com/api/v1/openapi.json"),
            "../schemas/user.json"
        );
        assert_eq!(to_relative_path("https://example.com/user.json", "/a/openapi.json"), "https://example.com/user.json");
    }

    #[test]
    fn test_relative_roundtrip() {
        let base = "/srv/specs/v1/openapi.yaml";
        let target = "/srv/specs/shared/pet.yaml";
        assert_eq!(resolve_reference_path(base, &to_relative_path(target, base)), target);
    }

    #[test]
    fn test_absolute_location() {
        assert_eq!(absolute_location("https://example.com/a.json"), "https://example.com/a.json");
        assert_eq!(absolute_location("/srv/./a.json"), "/srv/a.json");
        assert_eq!(absolute_location("specs/a.json"), format!("{}/specs/a.json", cwd()));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/a/./b/../c/"), "/a/c");
        assert_eq!(normalize("a/../../b"), "../b");
        assert_eq!(normalize("/.."), "/");
        assert_eq!(normalize("C:/a/../b"), "C:/b");
    }
}
