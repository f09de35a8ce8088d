//! Content classification
//!
//! Decides whether a snapshot is worth keeping and what kind of item it is.
//! Precedence: file list, image, URL-shaped text, rich text, plain text.

use tracing::{debug, warn};
use url::Url;

use super::snapshot::ClipboardSnapshot;
use super::types::ContentKind;

/// Schemes that make a single-line text a URL item.
const URL_SCHEMES: &[&str] = &["http", "https", "file", "ftp", "mailto"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierLimits {
    /// Maximum text length in bytes. `usize::MAX` means unlimited.
    pub max_text_len: usize,
}

impl Default for ClassifierLimits {
    fn default() -> Self {
        Self {
            max_text_len: usize::MAX,
        }
    }
}

/// Payload of an accepted snapshot, normalized per kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedContent {
    pub kind: ContentKind,
    pub concealed: bool,
    pub generation: i64,
    /// Plain text, trimmed URL, or newline-joined file paths.
    pub text: Option<String>,
    pub html: Option<String>,
    pub rtf: Option<Vec<u8>>,
    /// Raw image bytes (image items only).
    pub image: Option<Vec<u8>>,
}

impl ClassifiedContent {
    pub fn byte_size(&self) -> usize {
        self.text.as_ref().map_or(0, |t| t.len())
            + self.html.as_ref().map_or(0, |h| h.len())
            + self.rtf.as_ref().map_or(0, |r| r.len())
            + self.image.as_ref().map_or(0, |i| i.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Transient,
    Empty,
    TooLarge { len: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Accepted(ClassifiedContent),
    Rejected(RejectReason),
}

/// Classify a snapshot. Consumes it so image bytes move instead of copying.
pub fn classify(snapshot: ClipboardSnapshot, limits: &ClassifierLimits) -> Classification {
    if snapshot.transient {
        debug!(generation = snapshot.generation, "Skipping transient clipboard content");
        return Classification::Rejected(RejectReason::Transient);
    }

    let ClipboardSnapshot {
        generation,
        text,
        html,
        rtf,
        url,
        file_list,
        image,
        concealed,
        ..
    } = snapshot;

    let accepted = |kind: ContentKind,
                    text: Option<String>,
                    html: Option<String>,
                    rtf: Option<Vec<u8>>,
                    image: Option<Vec<u8>>| {
        Classification::Accepted(ClassifiedContent {
            kind,
            concealed,
            generation,
            text,
            html,
            rtf,
            image,
        })
    };

    if let Some(files) = file_list {
        let paths: Vec<String> = files
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if !paths.is_empty() {
            return accepted(ContentKind::File, Some(paths.join("\n")), None, None, None);
        }
    }

    if let Some(bytes) = image {
        if !bytes.is_empty() {
            return accepted(ContentKind::Image, None, None, None, Some(bytes));
        }
    }

    let text = text.filter(|t| !t.trim().is_empty());
    let html = html.filter(|h| !h.trim().is_empty());
    let rtf = rtf.filter(|r| !r.is_empty());

    if let Some(t) = &text {
        if t.len() > limits.max_text_len {
            warn!(
                len = t.len(),
                max = limits.max_text_len,
                "Clipboard text exceeds max length, skipping"
            );
            return Classification::Rejected(RejectReason::TooLarge {
                len: t.len(),
                max: limits.max_text_len,
            });
        }
    }

    let url_candidate = url
        .as_deref()
        .filter(|u| is_url_shaped(u))
        .or_else(|| text.as_deref().filter(|t| is_url_shaped(t)));
    if let Some(candidate) = url_candidate {
        return accepted(
            ContentKind::Url,
            Some(candidate.trim().to_string()),
            None,
            None,
            None,
        );
    }

    if html.is_some() || rtf.is_some() {
        return accepted(ContentKind::RichText, text, html, rtf, None);
    }

    match text {
        Some(t) => accepted(ContentKind::Text, Some(t), None, None, None),
        None => {
            debug!(generation, "Nothing usable on clipboard");
            Classification::Rejected(RejectReason::Empty)
        }
    }
}

/// True when the whole trimmed text is one absolute URL with an allowed scheme.
///
/// A URL embedded in prose is not URL-shaped.
pub fn is_url_shaped(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.contains(char::is_whitespace) {
        return false;
    }

    let Ok(parsed) = Url::parse(trimmed) else {
        return false;
    };
    let scheme = parsed.scheme();
    if !URL_SCHEMES.contains(&scheme) {
        return false;
    }

    match scheme {
        // The url crate normalizes "http:foo" into "http://foo/", require the
        // authority to be spelled out.
        "http" | "https" | "ftp" => {
            trimmed[scheme.len()..].starts_with("://") && parsed.host_str().is_some()
        }
        "file" => trimmed[scheme.len()..].starts_with("://"),
        "mailto" => !parsed.path().is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accept(snapshot: ClipboardSnapshot) -> ClassifiedContent {
        match classify(snapshot, &ClassifierLimits::default()) {
            Classification::Accepted(c) => c,
            Classification::Rejected(r) => panic!("expected accepted, got {:?}", r),
        }
    }

    #[test]
    fn test_plain_text() {
        let c = accept(ClipboardSnapshot::text(1, "hello"));
        assert_eq!(c.kind, ContentKind::Text);
        assert_eq!(c.text.as_deref(), Some("hello"));
        assert!(!c.concealed);
    }

    #[test]
    fn test_url_detection_whole_text_only() {
        let c = accept(ClipboardSnapshot::text(1, "  https://example.com/a?b=c \n"));
        assert_eq!(c.kind, ContentKind::Url);
        assert_eq!(c.text.as_deref(), Some("https://example.com/a?b=c"));

        let c = accept(ClipboardSnapshot::text(1, "see https://example.com for more"));
        assert_eq!(c.kind, ContentKind::Text, "URL in prose is text");
    }

    #[test]
    fn test_url_schemes() {
        assert!(is_url_shaped("mailto:someone@example.com"));
        assert!(is_url_shaped("ftp://files.example.com/pub"));
        assert!(is_url_shaped("file:///Users/me/notes.txt"));
        assert!(!is_url_shaped("javascript:alert(1)"));
        assert!(!is_url_shaped("http:example"));
        assert!(!is_url_shaped("example.com"));
        assert!(!is_url_shaped("https://a.com\nhttps://b.com"));
    }

    #[test]
    fn test_precedence_file_list_over_image_and_text() {
        let snapshot = ClipboardSnapshot {
            generation: 3,
            text: Some("/tmp/a.txt".into()),
            image: Some(vec![1, 2, 3]),
            file_list: Some(vec!["/tmp/a.txt".into(), "/tmp/b.txt".into()]),
            ..Default::default()
        };
        let c = accept(snapshot);
        assert_eq!(c.kind, ContentKind::File);
        assert_eq!(c.text.as_deref(), Some("/tmp/a.txt\n/tmp/b.txt"));
    }

    #[test]
    fn test_precedence_image_over_url() {
        let snapshot = ClipboardSnapshot {
            text: Some("https://example.com/cat.png".into()),
            image: Some(vec![0x89, b'P', b'N', b'G']),
            ..Default::default()
        };
        assert_eq!(accept(snapshot).kind, ContentKind::Image);
    }

    #[test]
    fn test_url_beats_rich_text() {
        let snapshot = ClipboardSnapshot {
            text: Some("https://example.com".into()),
            html: Some("<a href=\"https://example.com\">https://example.com</a>".into()),
            ..Default::default()
        };
        let c = accept(snapshot);
        assert_eq!(c.kind, ContentKind::Url);
        assert!(c.html.is_none());
    }

    #[test]
    fn test_rich_text_keeps_all_representations() {
        let snapshot = ClipboardSnapshot {
            text: Some("bold".into()),
            html: Some("<b>bold</b>".into()),
            rtf: Some(b"{\\rtf1 \\b bold}".to_vec()),
            ..Default::default()
        };
        let c = accept(snapshot);
        assert_eq!(c.kind, ContentKind::RichText);
        assert!(c.text.is_some() && c.html.is_some() && c.rtf.is_some());
    }

    #[test]
    fn test_markup_only_rich_text() {
        let snapshot = ClipboardSnapshot {
            html: Some("<i>x</i>".into()),
            ..Default::default()
        };
        let c = accept(snapshot);
        assert_eq!(c.kind, ContentKind::RichText);
        assert!(c.text.is_none());
    }

    #[test]
    fn test_rejections() {
        let limits = ClassifierLimits::default();

        let mut transient = ClipboardSnapshot::text(1, "otp 123456");
        transient.transient = true;
        assert_eq!(
            classify(transient, &limits),
            Classification::Rejected(RejectReason::Transient)
        );

        assert_eq!(
            classify(ClipboardSnapshot::text(1, "   \n\t"), &limits),
            Classification::Rejected(RejectReason::Empty)
        );

        let empty_files = ClipboardSnapshot {
            file_list: Some(vec![]),
            ..Default::default()
        };
        assert_eq!(
            classify(empty_files, &limits),
            Classification::Rejected(RejectReason::Empty)
        );

        assert_eq!(
            classify(ClipboardSnapshot::image(1, vec![]), &limits),
            Classification::Rejected(RejectReason::Empty)
        );
    }

    #[test]
    fn test_max_text_length() {
        let limits = ClassifierLimits { max_text_len: 4 };
        assert_eq!(
            classify(ClipboardSnapshot::text(1, "hello"), &limits),
            Classification::Rejected(RejectReason::TooLarge { len: 5, max: 4 })
        );
        assert!(matches!(
            classify(ClipboardSnapshot::text(1, "hey"), &limits),
            Classification::Accepted(_)
        ));
    }

    #[test]
    fn test_concealment_passes_through() {
        let mut snapshot = ClipboardSnapshot::text(9, "hunter2");
        snapshot.concealed = true;
        let c = accept(snapshot);
        assert!(c.concealed);
        assert_eq!(c.generation, 9);
    }
}
