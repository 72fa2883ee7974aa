//! MIME body-part tree and plain-text extraction.
//!
//! `mail-parser` does the RFC 5322/2045 work (transfer decoding, charsets).
//! Its flat part list is converted into an owned [`BodyPart`] tree so the
//! extraction rule is a pure function over plain data.

use mail_parser::{HeaderName, Message, MessageParser, MessagePart, MimeHeaders, PartType};

/// Content type assumed for parts that declare none.
const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// One node of an email's content tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyPart {
    /// A part with a decoded payload.
    Leaf {
        content_type: String,
        payload: String,
    },
    /// A multipart container or an attached message.
    Multipart {
        content_type: String,
        parts: Vec<BodyPart>,
    },
}

impl BodyPart {
    pub fn leaf(content_type: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::Leaf {
            content_type: content_type.into(),
            payload: payload.into(),
        }
    }

    pub fn multipart(content_type: impl Into<String>, parts: Vec<BodyPart>) -> Self {
        Self::Multipart {
            content_type: content_type.into(),
            parts,
        }
    }

    /// Lowercased `type/subtype`.
    pub fn content_type(&self) -> &str {
        match self {
            Self::Leaf { content_type, .. } | Self::Multipart { content_type, .. } => content_type,
        }
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self, Self::Multipart { .. })
    }
}

/// Extract the plain-text body of a message tree.
///
/// A single-part message yields its only payload whatever its type. A
/// multipart message yields the first `text/plain` leaf in depth-first
/// order, or `None` when there is none.
pub fn extract_plain_text(tree: &BodyPart) -> Option<&str> {
    match tree {
        BodyPart::Leaf { payload, .. } => Some(payload),
        BodyPart::Multipart { .. } => first_plain_leaf(tree),
    }
}

fn first_plain_leaf(part: &BodyPart) -> Option<&str> {
    match part {
        BodyPart::Leaf {
            content_type,
            payload,
        } if content_type == DEFAULT_CONTENT_TYPE => Some(payload),
        BodyPart::Leaf { .. } => None,
        BodyPart::Multipart { parts, .. } => parts.iter().find_map(first_plain_leaf),
    }
}

/// Header fields reproduced in review mail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginalHeaders {
    pub from: Option<String>,
    pub date: Option<String>,
    pub to: Option<String>,
    pub subject: Option<String>,
}

/// A parsed inbound email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEmail {
    pub headers: OriginalHeaders,
    pub body: BodyPart,
}

impl ParsedEmail {
    /// Plain-text body, empty when a multipart message has no text part.
    pub fn plain_text(&self) -> String {
        extract_plain_text(&self.body)
            .map(str::to_string)
            .unwrap_or_default()
    }
}

/// Parse raw RFC 822 text. Returns `None` if `mail-parser` rejects it.
pub fn parse_email(raw: &str) -> Option<ParsedEmail> {
    let message = MessageParser::default().parse(raw.as_bytes())?;
    let body = message_tree(&message)?;

    Some(ParsedEmail {
        headers: OriginalHeaders {
            from: raw_header(&message, HeaderName::From),
            date: raw_header(&message, HeaderName::Date),
            to: raw_header(&message, HeaderName::To),
            subject: raw_header(&message, HeaderName::Subject),
        },
        body,
    })
}

/// Header value as written in the message, without surrounding whitespace.
fn raw_header<'x>(message: &Message<'x>, name: HeaderName<'x>) -> Option<String> {
    message
        .header_raw(name)
        .map(|v| v.trim().to_string())
}

fn message_tree(message: &Message<'_>) -> Option<BodyPart> {
    let root = message.parts.first()?;
    Some(part_tree(message, root))
}

fn part_tree(message: &Message<'_>, part: &MessagePart<'_>) -> BodyPart {
    let content_type = content_type_of(part);
    match &part.body {
        PartType::Text(text) | PartType::Html(text) => BodyPart::leaf(content_type, text.as_ref()),
        PartType::Binary(bytes) | PartType::InlineBinary(bytes) => {
            BodyPart::leaf(content_type, String::from_utf8_lossy(bytes))
        }
        PartType::Message(nested) => {
            let parts = message_tree(nested).into_iter().collect();
            BodyPart::multipart(content_type, parts)
        }
        PartType::Multipart(ids) => {
            let parts = ids
                .iter()
                .filter_map(|id| message.parts.get(*id as usize))
                .map(|child| part_tree(message, child))
                .collect();
            BodyPart::multipart(content_type, parts)
        }
    }
}

fn content_type_of(part: &MessagePart<'_>) -> String {
    part.content_type()
        .map(|ct| match ct.subtype() {
            Some(sub) => format!("{}/{}", ct.ctype(), sub),
            None => ct.ctype().to_string(),
        })
        .map(|ct| ct.to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTIPART_EMAIL: &str = "From: Alice Smith <alice@example.com>\r\n\
To: hr@example.com\r\n\
Date: Mon, 3 Jun 2024 09:15:00 +0000\r\n\
Subject: PTO question\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"outer\"\r\n\
\r\n\
--outer\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>Need PTO policy</p>\r\n\
--outer\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Need PTO policy\r\n\
--outer\r\n\
Content-Type: application/pdf\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQK\r\n\
--outer--\r\n";

    // ── Pure tree extraction ────────────────────────────────────────

    #[test]
    fn single_leaf_yields_payload_regardless_of_type() {
        let tree = BodyPart::leaf("text/html", "<b>hi</b>");
        assert_eq!(extract_plain_text(&tree), Some("<b>hi</b>"));
    }

    #[test]
    fn multipart_picks_plain_part() {
        let tree = BodyPart::multipart(
            "multipart/mixed",
            vec![
                BodyPart::leaf("text/html", "<p>html</p>"),
                BodyPart::leaf("text/plain", "plain"),
                BodyPart::leaf("application/pdf", "%PDF"),
            ],
        );
        assert_eq!(extract_plain_text(&tree), Some("plain"));
    }

    #[test]
    fn multipart_search_is_depth_first() {
        let tree = BodyPart::multipart(
            "multipart/mixed",
            vec![
                BodyPart::multipart(
                    "multipart/alternative",
                    vec![
                        BodyPart::leaf("text/html", "<p>nested</p>"),
                        BodyPart::leaf("text/plain", "nested plain"),
                    ],
                ),
                BodyPart::leaf("text/plain", "later plain"),
            ],
        );
        assert_eq!(extract_plain_text(&tree), Some("nested plain"));
    }

    #[test]
    fn multipart_without_plain_part_yields_none() {
        let tree = BodyPart::multipart(
            "multipart/mixed",
            vec![
                BodyPart::leaf("text/html", "<p>only html</p>"),
                BodyPart::multipart("multipart/related", vec![]),
            ],
        );
        assert_eq!(extract_plain_text(&tree), None);
    }

    // ── Parsing through mail-parser ─────────────────────────────────

    #[test]
    fn parse_multipart_extracts_plain_text_part() {
        let parsed = parse_email(MULTIPART_EMAIL).unwrap();
        assert!(parsed.body.is_multipart());
        assert_eq!(parsed.plain_text().trim_end(), "Need PTO policy");
    }

    #[test]
    fn parse_multipart_builds_typed_tree() {
        let parsed = parse_email(MULTIPART_EMAIL).unwrap();
        let BodyPart::Multipart {
            content_type,
            parts,
        } = &parsed.body
        else {
            panic!("expected multipart root");
        };
        assert_eq!(content_type, "multipart/mixed");
        let types: Vec<&str> = parts.iter().map(BodyPart::content_type).collect();
        assert_eq!(types, vec!["text/html", "text/plain", "application/pdf"]);
    }

    #[test]
    fn parse_reads_original_headers() {
        let parsed = parse_email(MULTIPART_EMAIL).unwrap();
        assert_eq!(
            parsed.headers.from.as_deref(),
            Some("Alice Smith <alice@example.com>")
        );
        assert_eq!(parsed.headers.to.as_deref(), Some("hr@example.com"));
        assert_eq!(
            parsed.headers.date.as_deref(),
            Some("Mon, 3 Jun 2024 09:15:00 +0000")
        );
        assert_eq!(parsed.headers.subject.as_deref(), Some("PTO question"));
    }

    #[test]
    fn parse_keeps_encoded_words_as_written() {
        let raw = "From: =?UTF-8?Q?Ren=C3=A9?= <rene@example.com>\r\n\
Subject: =?UTF-8?Q?Cong=C3=A9s?=\r\n\
\r\n\
Combien de jours?\r\n";
        let parsed = parse_email(raw).unwrap();
        assert_eq!(
            parsed.headers.from.as_deref(),
            Some("=?UTF-8?Q?Ren=C3=A9?= <rene@example.com>")
        );
        assert_eq!(
            parsed.headers.subject.as_deref(),
            Some("=?UTF-8?Q?Cong=C3=A9s?=")
        );
    }

    #[test]
    fn parse_single_part_uses_sole_payload() {
        let raw = "From: bob@example.com\r\n\
Subject: Benefits\r\n\
\r\n\
When does open enrollment start?\r\n";
        let parsed = parse_email(raw).unwrap();
        assert!(!parsed.body.is_multipart());
        assert_eq!(
            parsed.plain_text().trim_end(),
            "When does open enrollment start?"
        );
        assert!(parsed.headers.to.is_none());
    }

    #[test]
    fn parse_decodes_base64_plain_part() {
        let raw = "From: carol@example.com\r\n\
Subject: Encoded\r\n\
Content-Type: multipart/alternative; boundary=\"b\"\r\n\
\r\n\
--b\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
SGVsbG8gSFI=\r\n\
--b--\r\n";
        let parsed = parse_email(raw).unwrap();
        assert_eq!(parsed.plain_text().trim_end(), "Hello HR");
    }

    #[test]
    fn parse_multipart_without_plain_text_is_empty() {
        let raw = "From: dan@example.com\r\n\
Subject: HTML only\r\n\
Content-Type: multipart/alternative; boundary=\"b\"\r\n\
\r\n\
--b\r\n\
Content-Type: text/html\r\n\
\r\n\
<p>hello</p>\r\n\
--b--\r\n";
        let parsed = parse_email(raw).unwrap();
        assert_eq!(parsed.plain_text(), "");
    }
}
