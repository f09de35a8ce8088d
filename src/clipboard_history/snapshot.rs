//! Clipboard snapshots and write requests
//!
//! A snapshot is everything one poll read off the clipboard. A write is the
//! ordered list of representations the paste-back path puts on it.

/// One read of the system clipboard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClipboardSnapshot {
    pub generation: i64,
    pub text: Option<String>,
    pub html: Option<String>,
    pub rtf: Option<Vec<u8>>,
    /// Explicit URL-typed representation, if the source app provided one.
    pub url: Option<String>,
    pub file_list: Option<Vec<String>>,
    /// Encoded image bytes (PNG, TIFF, JPEG...) as found on the clipboard.
    pub image: Option<Vec<u8>>,
    /// Source marked the content as transient/auto-generated.
    pub transient: bool,
    /// Source marked the content as concealed (password managers).
    pub concealed: bool,
}

impl ClipboardSnapshot {
    pub fn text(generation: i64, text: impl Into<String>) -> Self {
        Self {
            generation,
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn image(generation: i64, bytes: Vec<u8>) -> Self {
        Self {
            generation,
            image: Some(bytes),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none()
            && self.html.is_none()
            && self.rtf.is_none()
            && self.url.is_none()
            && self.file_list.is_none()
            && self.image.is_none()
    }
}

/// A single clipboard representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Representation {
    Rtf(Vec<u8>),
    Html(String),
    Url(String),
    Text(String),
    Image(Vec<u8>),
    FileList(Vec<String>),
}

impl Representation {
    pub fn type_name(&self) -> &'static str {
        match self {
            Representation::Rtf(_) => "rtf",
            Representation::Html(_) => "html",
            Representation::Url(_) => "url",
            Representation::Text(_) => "text",
            Representation::Image(_) => "image",
            Representation::FileList(_) => "file_list",
        }
    }
}

/// Representations to put on the clipboard in one write, richest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClipboardWrite {
    pub representations: Vec<Representation>,
}

impl ClipboardWrite {
    pub fn new(representations: Vec<Representation>) -> Self {
        Self { representations }
    }

    pub fn plain_text(&self) -> Option<&str> {
        self.representations.iter().find_map(|r| match r {
            Representation::Text(t) => Some(t.as_str()),
            _ => None,
        })
    }

    pub fn type_names(&self) -> Vec<&'static str> {
        self.representations.iter().map(|r| r.type_name()).collect()
    }
}
