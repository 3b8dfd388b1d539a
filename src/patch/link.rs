//! Link text detection
//!
//! A span whose text is a URL or an e-mail address was a link in the
//! source. When the replacement is also a URL or address it stays one:
//! it is underlined, and a bare URL drawn in default black turns
//! [`Rgb::LINK_BLUE`](crate::document::Rgb::LINK_BLUE).

use regex::Regex;

const URL_PATTERN: &str = r"https?://[^\s<>]+";
const EMAIL_PATTERN: &str = r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Url,
    Email,
}

/// URL and e-mail matcher
#[derive(Debug, Clone)]
pub struct LinkDetector {
    url: Option<Regex>,
    email: Option<Regex>,
}

impl Default for LinkDetector {
    fn default() -> Self {
        Self {
            url: compile(URL_PATTERN),
            email: compile(EMAIL_PATTERN),
        }
    }
}

impl LinkDetector {
    /// The kind of link `text` contains. A URL wins over an address.
    pub fn detect(&self, text: &str) -> Option<LinkKind> {
        let matches = |re: &Option<Regex>| re.as_ref().map_or(false, |re| re.is_match(text));
        if matches(&self.url) {
            Some(LinkKind::Url)
        } else if matches(&self.email) {
            Some(LinkKind::Email)
        } else {
            None
        }
    }

    /// The link kind the replacement keeps, if the original was a link
    /// and the new text still is one
    pub fn preserved(&self, original: Option<&str>, new_text: &str) -> Option<LinkKind> {
        self.detect(original?)?;
        self.detect(new_text)
    }
}

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::error!(pattern, error = %e, "Link pattern rejected, detection disabled");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect() {
        let links = LinkDetector::default();
        assert_eq!(links.detect("see https://example.com/a?b=1"), Some(LinkKind::Url));
        assert_eq!(links.detect("http://x.org"), Some(LinkKind::Url));
        assert_eq!(links.detect("mail jane.doe+pdf@example.co.uk"), Some(LinkKind::Email));
        assert_eq!(links.detect("https://a.io or bob@a.io"), Some(LinkKind::Url));
        assert_eq!(links.detect("www.example.com"), None);
        assert_eq!(links.detect("name@host"), None);
        assert_eq!(links.detect("Hello world"), None);
    }

    #[test]
    fn test_preserved_needs_both_sides() {
        let links = LinkDetector::default();
        assert_eq!(
            links.preserved(Some("https://old.example"), "https://new.example"),
            Some(LinkKind::Url)
        );
        assert_eq!(
            links.preserved(Some("a@old.com"), "b@new.com"),
            Some(LinkKind::Email)
        );
        assert_eq!(links.preserved(Some("https://old.example"), "plain text"), None);
        assert_eq!(links.preserved(Some("plain text"), "https://new.example"), None);
        assert_eq!(links.preserved(None, "https://new.example"), None);
    }
}
