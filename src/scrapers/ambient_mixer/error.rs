//! Parse errors for ambient-mixer pages.

use thiserror::Error;

use crate::models::FieldError;

/// A page or manifest that cannot produce a record.
///
/// Always fatal for the one record being built, never for the crawl.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("missing element: {0}")]
    MissingElement(&'static str),
    #[error("invalid audio id in details link: {0:?}")]
    InvalidAudioId(String),
    #[error("malformed manifest XML: {0}")]
    Xml(String),
    #[error("manifest has no <audio_template> root")]
    MissingRoot,
    #[error("channel {channel}: {source}")]
    Channel { channel: String, source: FieldError },
}

impl From<quick_xml::Error> for ParseError {
    fn from(e: quick_xml::Error) -> Self {
        ParseError::Xml(e.to_string())
    }
}
