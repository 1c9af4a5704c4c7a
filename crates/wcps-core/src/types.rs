//! Closed domain types used when compiling WCPS queries.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output format requested from the service.
///
/// Determines the media type passed to `encode(...)` and how the response
/// body is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutputFormat {
    /// Portable Network Graphics image
    Png,
    /// Comma-separated numeric values
    Csv,
    /// JPEG image
    Jpeg,
}

impl OutputFormat {
    /// Get the format name as accepted by [`FromStr`].
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Png => "PNG",
            Self::Csv => "CSV",
            Self::Jpeg => "JPEG",
        }
    }

    /// Media type passed to the WCPS `encode` function.
    #[must_use]
    pub const fn media_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Csv => "text/csv",
            Self::Jpeg => "image/jpeg",
        }
    }

    /// Returns true if responses in this format are returned as raw bytes.
    #[must_use]
    pub const fn is_image(&self) -> bool {
        matches!(self, Self::Png | Self::Jpeg)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PNG" => Ok(Self::Png),
            "CSV" => Ok(Self::Csv),
            "JPEG" => Ok(Self::Jpeg),
            other => Err(Error::InvalidFormat(format!(
                "`{other}` is not one of PNG, CSV, JPEG"
            ))),
        }
    }
}

/// Reducing operation applied to the return expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregationKind {
    /// Minimum value
    Min,
    /// Maximum value
    Max,
    /// Arithmetic mean
    Avg,
    /// Sum of values
    Sum,
    /// Number of cells
    Count,
}

impl AggregationKind {
    /// WCPS function name emitted in the compiled query.
    #[must_use]
    pub const fn function_name(&self) -> &'static str {
        match self {
            Self::Min => "min",
            Self::Max => "max",
            Self::Avg => "avg",
            Self::Sum => "sum",
            Self::Count => "count",
        }
    }
}

impl fmt::Display for AggregationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.function_name())
    }
}

/// An aggregation together with the expression it reduces.
///
/// A `None` condition aggregates over every declared variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregation {
    /// Aggregation function
    pub kind: AggregationKind,
    /// Expression to aggregate over
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl Aggregation {
    /// Create an aggregation.
    #[must_use]
    pub const fn new(kind: AggregationKind, condition: Option<String>) -> Self {
        Self { kind, condition }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parse() {
        assert_eq!("PNG".parse::<OutputFormat>().unwrap(), OutputFormat::Png);
        assert_eq!("CSV".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);
        assert_eq!("JPEG".parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
    }

    #[test]
    fn test_output_format_rejects_unknown() {
        let err = "TIFF".parse::<OutputFormat>().unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));

        // names are case sensitive
        assert!("png".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_media_types() {
        assert_eq!(OutputFormat::Png.media_type(), "image/png");
        assert_eq!(OutputFormat::Jpeg.media_type(), "image/jpeg");
        assert_eq!(OutputFormat::Csv.media_type(), "text/csv");
    }

    #[test]
    fn test_is_image() {
        assert!(OutputFormat::Png.is_image());
        assert!(OutputFormat::Jpeg.is_image());
        assert!(!OutputFormat::Csv.is_image());
    }

    #[test]
    fn test_display_matches_parse() {
        for format in [OutputFormat::Png, OutputFormat::Csv, OutputFormat::Jpeg] {
            assert_eq!(format.to_string().parse::<OutputFormat>().unwrap(), format);
        }
    }

    #[test]
    fn test_aggregation_function_names() {
        assert_eq!(AggregationKind::Min.function_name(), "min");
        assert_eq!(AggregationKind::Max.function_name(), "max");
        assert_eq!(AggregationKind::Avg.function_name(), "avg");
        assert_eq!(AggregationKind::Sum.function_name(), "sum");
        assert_eq!(AggregationKind::Count.to_string(), "count");
    }

    #[test]
    fn test_aggregation_serialization() {
        let aggregation = Aggregation::new(AggregationKind::Avg, None);
        let json = serde_json::to_string(&aggregation).unwrap();
        assert_eq!(json, r#"{"kind":"AVG"}"#);
    }
}
