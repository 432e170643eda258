/// Media type sniffed from the leading bytes of a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaKind {
    pub mime_type: String,
    /// Default extension for the type, without a dot. Empty when unknown.
    pub extension: String,
}

impl MediaKind {
    pub fn new(mime_type: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            extension: extension.into(),
        }
    }

    pub fn octet_stream() -> Self {
        Self::new(mime::APPLICATION_OCTET_STREAM.as_ref(), "")
    }

    pub fn plain_text() -> Self {
        Self::new(mime::TEXT_PLAIN.as_ref(), "txt")
    }

    /// Types that say nothing useful about the content.
    pub fn is_generic(&self) -> bool {
        match self.mime_type.parse::<mime::Mime>() {
            Ok(m) => {
                m.essence_str() == mime::APPLICATION_OCTET_STREAM.essence_str()
                    || m.essence_str() == mime::TEXT_PLAIN.essence_str()
            }
            Err(_) => true,
        }
    }
}

/// Trait for content sniffing implementations
pub trait MediaClassifier: Send + Sync {
    /// Classify a bounded prefix of the file. Errors mean the content could
    /// not be classified and the file must be dropped.
    fn classify(&self, prefix: &[u8]) -> Result<MediaKind, String>;
}

/// Magic-number classifier backed by `infer`.
///
/// Content `infer` does not recognize is reported as `text/plain` when the
/// prefix is valid UTF-8 without NUL bytes (this includes empty files), and
/// as `application/octet-stream` otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct InferClassifier;

impl MediaClassifier for InferClassifier {
    fn classify(&self, prefix: &[u8]) -> Result<MediaKind, String> {
        if let Some(kind) = infer::get(prefix) {
            return Ok(MediaKind::new(kind.mime_type(), kind.extension()));
        }

        if looks_like_text(prefix) {
            Ok(MediaKind::plain_text())
        } else {
            Ok(MediaKind::octet_stream())
        }
    }
}

fn looks_like_text(prefix: &[u8]) -> bool {
    if prefix.contains(&0) {
        return false;
    }
    match std::str::from_utf8(prefix) {
        Ok(_) => true,
        // A multi-byte sequence cut off by the prefix boundary is still text
        Err(e) => e.error_len().is_none(),
    }
}

/// Classifier that rejects everything (for testing)
#[cfg(test)]
pub struct RejectingClassifier;

#[cfg(test)]
impl MediaClassifier for RejectingClassifier {
    fn classify(&self, _prefix: &[u8]) -> Result<MediaKind, String> {
        Err("unrecognized content".to_string())
    }
}
