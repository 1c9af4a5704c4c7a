//! WCPS client and fluent datacube query builder.
//!
//! Provides an asynchronous HTTP client for WCPS endpoints and a [`Datacube`]
//! builder that accumulates variable declarations, subsets, filters and
//! aggregations into a single WCPS query.
//!
//! ```no_run
//! use wcps_client::{Datacube, QueryResult, WcpsClient};
//!
//! # async fn run() -> wcps_client::Result<()> {
//! let client = WcpsClient::new("https://ows.rasdaman.org/rasdaman/ows")?;
//! let mut cube = Datacube::new(client);
//! let result = cube
//!     .declare_variable("$c in (AvgLandTemp)")?
//!     .attach_subset("$c", r#"Lat(53.08), Long(8.80), ansi("2014-01":"2014-12")"#)?
//!     .set_format("CSV")?
//!     .execute()
//!     .await?;
//! if let QueryResult::Values(values) = result {
//!     println!("{values:?}");
//! }
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

pub mod client;
pub mod datacube;
pub mod response;
pub mod variables;

pub use client::{RawResponse, Transport, WcpsClient, WcpsClientBuilder};
pub use datacube::Datacube;
pub use response::{decode_values, QueryResult};
pub use variables::{extract_variable_names, substitute_tokens};
pub use wcps_core::{Aggregation, AggregationKind, Error, OutputFormat};

/// Convenient result alias that reuses the shared WCPS error type.
pub type Result<T> = wcps_core::Result<T>;
