//! Extension tables: the upload allow-list and the MIME lookup used when
//! serving blobs.

/// Default upload allow-list (lowercase, without the dot).
pub const ALLOWED_EXTENSIONS: &[&str] =
    &["mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v"];

/// Lowercased extension of `name`, without the dot.
pub fn extension(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Whether `name` carries one of the `allowed` extensions.
pub fn is_allowed(name: &str, allowed: &[String]) -> bool {
    match extension(name) {
        Some(ext) => allowed.iter().any(|candidate| *candidate == ext),
        None => false,
    }
}

/// Content type by extension; `application/octet-stream` for anything unknown.
pub fn content_type_for(name: &str) -> &'static str {
    match extension(name).as_deref() {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("mkv") => "video/x-matroska",
        Some("avi") => "video/x-msvideo",
        Some("mov") => "video/quicktime",
        Some("wmv") => "video/x-ms-wmv",
        Some("flv") => "video/x-flv",
        Some("webm") => "video/webm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed() -> Vec<String> {
        ALLOWED_EXTENSIONS.iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(extension("Movie.MP4").as_deref(), Some("mp4"));
        assert_eq!(extension("archive.tar.mkv").as_deref(), Some("mkv"));
        assert_eq!(extension("noext"), None);
        assert_eq!(extension(".hidden"), None);
    }

    #[test]
    fn allow_list_filters_by_extension() {
        assert!(is_allowed("a.mp4", &allowed()));
        assert!(is_allowed("a.WebM", &allowed()));
        assert!(!is_allowed("a.exe", &allowed()));
        assert!(!is_allowed("mp4", &allowed()));
    }

    #[test]
    fn content_type_falls_back_to_octet_stream() {
        assert_eq!(content_type_for("a.mp4"), "video/mp4");
        assert_eq!(content_type_for("a.m4v"), "video/mp4");
        assert_eq!(content_type_for("a.bin"), "application/octet-stream");
    }
}
