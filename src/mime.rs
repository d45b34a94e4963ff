/// 静态文件类型白名单与 MIME 映射
use std::path::Path;

/// 允许提供的扩展名及其 Content-Type
const MIME_TABLE: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("txt", "text/plain"),
    ("gif", "image/gif"),
    ("jpeg", "image/jpeg"),
    ("jpg", "image/jpeg"),
    ("css", "text/css"),
];

/// 根据路径扩展名查询 Content-Type，不在白名单内返回 None
///
/// 扩展名按 ASCII 忽略大小写匹配
pub fn lookup(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?;
    MIME_TABLE
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(ext))
        .map(|(_, mime)| *mime)
}

/// 白名单内的全部扩展名（带前导点）
pub fn supported_extensions() -> impl Iterator<Item = String> {
    MIME_TABLE.iter().map(|(ext, _)| format!(".{}", ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_extensions() {
        assert_eq!(lookup(Path::new("index.html")), Some("text/html"));
        assert_eq!(lookup(Path::new("a/b/notes.txt")), Some("text/plain"));
        assert_eq!(lookup(Path::new("cat.gif")), Some("image/gif"));
        assert_eq!(lookup(Path::new("photo.jpeg")), Some("image/jpeg"));
        assert_eq!(lookup(Path::new("photo.jpg")), Some("image/jpeg"));
        assert_eq!(lookup(Path::new("site.css")), Some("text/css"));
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(lookup(Path::new("INDEX.HTML")), Some("text/html"));
    }

    #[test]
    fn test_rejected_extensions() {
        assert_eq!(lookup(Path::new("x.exe")), None);
        assert_eq!(lookup(Path::new("README")), None);
        assert_eq!(lookup(Path::new("archive.tar.gz")), None);
        assert_eq!(lookup(Path::new(".html")), None);
    }

    #[test]
    fn test_supported_extensions() {
        let exts: Vec<String> = supported_extensions().collect();
        assert_eq!(exts.len(), 6);
        assert!(exts.contains(&".jpg".to_string()));
    }
}
