// Recognizing Google Docs links

/// Substring every Google Docs document URL carries
pub const GOOGLE_DOCS_MARKER: &str = "docs.google.com/document";

pub fn is_google_doc(url: &str) -> bool {
    url.contains(GOOGLE_DOCS_MARKER)
}

/// Document id: the path segment after `/d/`
///
/// `https://docs.google.com/document/d/<id>/edit?usp=sharing` yields `<id>`.
pub fn doc_id(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("/d/")?;
    let id = rest
        .split(|c: char| matches!(c, '/' | '?' | '#'))
        .next()
        .unwrap_or_default();

    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}
