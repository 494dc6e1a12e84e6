//! Bidirectional mapping between URLs and cache directories.
//!
//! A URL `scheme://host[:port]/a/b/` lives at `<root>/scheme/host[:port]/a/b`.
//! Mapping is pure string work; nothing here touches the filesystem.

use std::path::{Path, PathBuf};

use url::Url;

use crate::Error;

const SEPARATOR: char = '/';

/// Collapse a path to its canonical `/`-separated form.
///
/// Both `/` and `\` count as separators. Empty and `.` segments are dropped,
/// `..` removes the previous segment (never climbing above the root marker),
/// and any trailing separator is removed.
///
/// # Errors
///
/// Returns `Error::InvalidPath` for an empty or relative path.
pub fn normalize(path: &str) -> Result<String, Error> {
    if path.is_empty() {
        return Err(Error::InvalidPath("empty path".into()));
    }

    let unified = path.replace('\\', "/");
    if !unified.starts_with(SEPARATOR) {
        return Err(Error::InvalidPath(format!("path is not absolute: {path}")));
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.split(SEPARATOR) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    Ok(format!("{SEPARATOR}{}", segments.join("/")))
}

/// Maps URLs to directories under one cache root and back.
#[derive(Debug, Clone)]
pub struct PathCodec {
    root: String,
}

impl PathCodec {
    /// Create a codec for the given absolute cache root.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPath` if the root is relative or not valid UTF-8.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, Error> {
        let root = root.as_ref();
        let root = root
            .to_str()
            .ok_or_else(|| Error::InvalidPath(format!("cache root is not UTF-8: {}", root.display())))?;
        Ok(Self { root: normalize(root)? })
    }

    /// The normalized cache root.
    pub fn root(&self) -> &Path {
        Path::new(&self.root)
    }

    /// Resolve the directory holding cache files for `url`.
    ///
    /// The query string and fragment do not take part in the mapping.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUrl` if the URL does not parse, has no host,
    /// or would resolve outside the cache root.
    pub fn encode(&self, url: &str) -> Result<PathBuf, Error> {
        let parsed = Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
        let host = match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(Error::InvalidUrl(format!("{url}: missing host"))),
        };

        self.join_checked(parsed.scheme(), &host, parsed.path()).map(PathBuf::from)
    }

    /// Reconstruct the URL a cache directory was created for.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPath` if the path is outside the root or does not
    /// contain both a scheme and a host segment.
    pub fn decode(&self, path: &Path) -> Result<String, Error> {
        let raw = path
            .to_str()
            .ok_or_else(|| Error::InvalidPath(format!("path is not UTF-8: {}", path.display())))?;
        let normalized = normalize(raw)?;
        let relative = self
            .strip_root(&normalized)
            .ok_or_else(|| Error::InvalidPath(format!("{normalized} is outside {}", self.root)))?;

        match relative.split_once(SEPARATOR) {
            Some((scheme, rest)) if !scheme.is_empty() && !rest.is_empty() => Ok(format!("{scheme}://{rest}")),
            _ => Err(Error::InvalidPath(format!("{normalized} has no scheme and host"))),
        }
    }

    fn join_checked(&self, scheme: &str, host: &str, path: &str) -> Result<String, Error> {
        let joined = format!("{}/{scheme}/{host}/{path}", self.root);
        let normalized = normalize(&joined).map_err(|e| Error::InvalidUrl(e.to_string()))?;

        // the path may not climb out of its own scheme and host directories
        let mut segments = self.strip_root(&normalized).into_iter().flat_map(|rest| rest.splitn(3, SEPARATOR));
        if segments.next() == Some(scheme) && segments.next() == Some(host) {
            Ok(normalized)
        } else {
            Err(Error::InvalidUrl(format!("{scheme}://{host}{path} escapes its host directory")))
        }
    }

    /// The part of `normalized` below the root, or `None` if it is the root
    /// itself or not below it.
    fn strip_root<'a>(&self, normalized: &'a str) -> Option<&'a str> {
        let rest = if self.root == "/" {
            normalized.strip_prefix(SEPARATOR)?
        } else {
            normalized.strip_prefix(self.root.as_str())?.strip_prefix(SEPARATOR)?
        };
        if rest.is_empty() { None } else { Some(rest) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> PathCodec {
        PathCodec::new("/var/cache/pages").unwrap()
    }

    #[test]
    fn test_normalize_examples() {
        assert_eq!(normalize("/\\/").unwrap(), "/");
        assert_eq!(normalize("//path/with/empty//segments").unwrap(), "/path/with/empty/segments");
        assert_eq!(
            normalize("/ignore-me/../path/with/ignore-me-too/../dots-segments").unwrap(),
            "/path/with/dots-segments"
        );
        assert_eq!(normalize("/trailing/separator/").unwrap(), "/trailing/separator");
    }

    #[test]
    fn test_normalize_windows_separators() {
        assert_eq!(normalize("\\cache\\example.com\\.\\page").unwrap(), "/cache/example.com/page");
    }

    #[test]
    fn test_normalize_does_not_climb_above_root() {
        assert_eq!(normalize("/../../etc").unwrap(), "/etc");
        assert_eq!(normalize("/a/../..").unwrap(), "/");
    }

    #[test]
    fn test_normalize_idempotent() {
        for input in ["/", "/a//b/", "/x/./y/../z", "\\a\\b", "/a/b/c"] {
            let once = normalize(input).unwrap();
            assert_eq!(normalize(&once).unwrap(), once, "input: {input}");
        }
    }

    #[test]
    fn test_normalize_rejects_empty_and_relative() {
        assert!(matches!(normalize(""), Err(Error::InvalidPath(_))));
        assert!(matches!(normalize("relative/path"), Err(Error::InvalidPath(_))));
        assert!(matches!(normalize("./here"), Err(Error::InvalidPath(_))));
    }

    #[test]
    fn test_new_rejects_relative_root() {
        assert!(matches!(PathCodec::new("page-cache"), Err(Error::InvalidPath(_))));
        assert_eq!(PathCodec::new("/var/cache/pages/").unwrap().root(), Path::new("/var/cache/pages"));
    }

    #[test]
    fn test_encode_layout() {
        let path = codec().encode("https://example.com/blog/post/").unwrap();
        assert_eq!(path, PathBuf::from("/var/cache/pages/https/example.com/blog/post"));
    }

    #[test]
    fn test_encode_keeps_port_and_drops_query() {
        let path = codec().encode("http://example.com:8080/shop?page=2#top").unwrap();
        assert_eq!(path, PathBuf::from("/var/cache/pages/http/example.com:8080/shop"));
    }

    #[test]
    fn test_encode_resolves_dot_segments_inside_host() {
        let path = codec().encode("https://example.com/a/../../../../etc").unwrap();
        assert_eq!(path, PathBuf::from("/var/cache/pages/https/example.com/etc"));
    }

    #[test]
    fn test_encode_rejects_missing_host() {
        assert!(matches!(codec().encode("mailto:someone@example.com"), Err(Error::InvalidUrl(_))));
        assert!(matches!(codec().encode("not a url"), Err(Error::InvalidUrl(_))));
        assert!(matches!(codec().encode("/relative/only"), Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_join_checked_rejects_escape() {
        let codec = codec();
        assert!(matches!(codec.join_checked("https", "..", "/"), Err(Error::InvalidUrl(_))));
        assert!(matches!(codec.join_checked("..", "..", "/x"), Err(Error::InvalidUrl(_))));
        assert!(codec.join_checked("https", "example.com", "/a/../b").is_ok());
    }

    #[test]
    fn test_encode_rejects_backslash_climb_into_other_host() {
        let codec = codec();
        let url = "foo://a.example/x\\..\\..\\b.example\\page";
        assert!(matches!(codec.encode(url), Err(Error::InvalidUrl(_))));
        assert!(matches!(codec.join_checked("https", "a.example", "/../b.example/page"), Err(Error::InvalidUrl(_))));
        assert!(codec.encode("foo://a.example/x\\page").is_ok());
    }

    #[test]
    fn test_round_trip_canonical_shapes() {
        let codec = codec();
        let cases = [
            ("https://example.com", "https://example.com"),
            ("https://example.com/", "https://example.com"),
            ("https://example.com/dir", "https://example.com/dir"),
            ("https://example.com/dir/", "https://example.com/dir"),
            ("https://example.com/file.html", "https://example.com/file.html"),
            ("https://example.com/file.html/", "https://example.com/file.html"),
        ];
        for (url, expected) in cases {
            let path = codec.encode(url).unwrap();
            assert_eq!(codec.decode(&path).unwrap(), expected, "url: {url}");
        }
    }

    #[test]
    fn test_round_trip_directory_form_is_exact() {
        let codec = codec();
        for url in ["https://example.com", "http://example.com:8080/a/b", "https://example.com/caf%C3%A9"] {
            let path = codec.encode(url).unwrap();
            assert_eq!(codec.decode(&path).unwrap(), url);
        }
    }

    #[test]
    fn test_decode_rejects_short_paths() {
        let codec = codec();
        assert!(matches!(codec.decode(Path::new("/var/cache/pages")), Err(Error::InvalidPath(_))));
        assert!(matches!(codec.decode(Path::new("/var/cache/pages/https")), Err(Error::InvalidPath(_))));
        assert!(matches!(codec.decode(Path::new("/elsewhere/https/example.com")), Err(Error::InvalidPath(_))));
    }

    #[test]
    fn test_root_codec() {
        let codec = PathCodec::new("/").unwrap();
        let path = codec.encode("https://example.com/a").unwrap();
        assert_eq!(path, PathBuf::from("/https/example.com/a"));
        assert_eq!(codec.decode(&path).unwrap(), "https://example.com/a");
    }
}
