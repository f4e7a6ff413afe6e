use crate::ports::PortError;
use thiserror::Error;

/// Reasons a single response could not be turned into records.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("frame #{index} has no {attribute} attribute")]
    MissingAttribute { index: usize, attribute: &'static str },

    #[error("frame {gml_id} has no <{element}> element")]
    MissingElement { gml_id: String, element: &'static str },

    #[error("response ended inside frame {gml_id}")]
    Truncated { gml_id: String },

    #[error("frame {gml_id} has malformed position {text:?}, expected \"<lat> <lon>\"")]
    MalformedPosition { gml_id: String, text: String },
}

/// Fatal outcome of an ingestion run. Every variant aborts the run before
/// `last_run` moves.
#[derive(Debug, Error)]
pub enum Error {
    #[error("stored last_run {value:?} is not a timestamp: {reason}")]
    InvalidLastRun { value: String, reason: String },

    #[error("fetching features failed")]
    Fetch(#[source] PortError),

    #[error("parsing feature response failed")]
    Parse(#[from] ParseError),

    #[error("storage failed")]
    Storage(#[source] PortError),
}

pub type Result<T> = std::result::Result<T, Error>;
