//! Email I/O: MIME parsing of inbound mail and outbound delivery.

pub mod email;
pub mod mime;

pub use email::{Mailer, OutboundEmail, SendReceipt, SmtpMailer};
pub use mime::{BodyPart, OriginalHeaders, ParsedEmail, extract_plain_text, parse_email};
