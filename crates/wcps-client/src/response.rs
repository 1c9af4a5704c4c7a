//! Decoding of WCPS response bodies.

use crate::Result;
use wcps_core::{Error, OutputFormat};

/// Decoded result of an executed query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// Numbers parsed from a comma-separated body (CSV or unset format)
    Values(Vec<f64>),
    /// Raw image bytes (PNG or JPEG)
    Image(Vec<u8>),
}

impl QueryResult {
    /// Decode `body` according to the format the query was compiled with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DecodeError`] if a numeric body cannot be parsed.
    pub fn decode(format: Option<OutputFormat>, body: Vec<u8>) -> Result<Self> {
        match format {
            Some(format) if format.is_image() => Ok(Self::Image(body)),
            _ => decode_values(&body).map(Self::Values),
        }
    }

    /// Borrow the numeric values, if this is a numeric result.
    #[must_use]
    pub fn as_values(&self) -> Option<&[f64]> {
        match self {
            Self::Values(values) => Some(values),
            Self::Image(_) => None,
        }
    }

    /// Take the numeric values, if this is a numeric result.
    #[must_use]
    pub fn into_values(self) -> Option<Vec<f64>> {
        match self {
            Self::Values(values) => Some(values),
            Self::Image(_) => None,
        }
    }

    /// Take the image bytes, if this is an image result.
    #[must_use]
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Self::Image(bytes) => Some(bytes),
            Self::Values(_) => None,
        }
    }
}

/// Parse a UTF-8 body of comma-separated numbers.
///
/// Surrounding whitespace of each field is ignored.
///
/// # Errors
///
/// Returns [`Error::DecodeError`] if the body is not UTF-8 or any field is
/// not a number.
pub fn decode_values(body: &[u8]) -> Result<Vec<f64>> {
    let text = std::str::from_utf8(body)
        .map_err(|err| Error::DecodeError(format!("Response body is not UTF-8: {err}")))?;

    text.split(',')
        .map(|field| {
            let field = field.trim();
            field.parse::<f64>().map_err(|err| {
                Error::DecodeError(format!("Failed to parse `{field}` as a number: {err}"))
            })
        })
        .collect()
}
