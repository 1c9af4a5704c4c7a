//! Fluent builder that compiles datacube operations into a WCPS query.
//!
//! A [`Datacube`] accumulates variable declarations, subsets, a filter, and a
//! return expression. [`Datacube::execute`] compiles them into one query of
//! the form
//!
//! ```text
//! for $v1 in (cov1)
//! $v2 in (cov2)
//! where <predicate>
//! return
//! <aggFn>(<expr>) | encode(<expr>, "<media-type>") | <expr>
//! ```
//!
//! sends it through the bound [`Transport`], and resets the builder so it can
//! be reused for the next query.

use crate::client::{Transport, WcpsClient};
use crate::response::QueryResult;
use crate::variables::{extract_variable_names, normalize_whitespace, substitute_tokens};
use crate::Result;
use tracing::{debug, warn};
use wcps_core::{Aggregation, AggregationKind, Error, OutputFormat};

/// Everything cleared by [`Datacube::reset`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct QueryState {
    declarations: Vec<String>,
    variable_names: Vec<String>,
    // index-aligned with `variable_names`
    subsets: Vec<Option<String>>,
    filter_condition: Option<String>,
    aggregation: Option<Aggregation>,
    transformation: Option<String>,
    encoding: Option<String>,
    format: Option<OutputFormat>,
}

/// Chainable WCPS query builder bound to one transport.
///
/// Every setter validates its input and leaves the builder untouched on
/// failure. Expressions may only reference variables declared beforehand.
#[derive(Debug, Clone)]
pub struct Datacube<T = WcpsClient> {
    transport: T,
    state: QueryState,
}

impl<T> Datacube<T> {
    /// Create an empty builder that sends its queries through `transport`.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: QueryState::default(),
        }
    }

    /// Access the bound transport.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Declare a variable bound to a coverage, e.g. `$c in (AvgLandTemp)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedDeclaration`] if the declaration does not
    /// start with `$`, contain ` in (` and end with `)`, and
    /// [`Error::DuplicateVariable`] if the name is already declared.
    pub fn declare_variable(&mut self, declaration: &str) -> Result<&mut Self> {
        if !(declaration.starts_with('$')
            && declaration.contains(" in (")
            && declaration.ends_with(')'))
        {
            return Err(Error::MalformedDeclaration(format!(
                "`{declaration}` is not of the form `$name in (coverage)`"
            )));
        }

        let name = extract_variable_names(declaration)
            .and_then(|names| names.into_iter().next())
            .ok_or_else(|| Error::MalformedDeclaration(declaration.to_string()))?;

        if self.position_of(&name).is_some() {
            return Err(Error::DuplicateVariable(name));
        }

        debug!(variable = %name, "declared WCPS variable");
        self.state.declarations.push(declaration.to_string());
        self.state.variable_names.push(name);
        self.state.subsets.push(None);
        Ok(self)
    }

    /// Restrict a declared variable to a spatial/temporal subset, e.g.
    /// `Lat(53.08), Long(8.80), ansi("2014-01":"2014-12")`.
    ///
    /// Attaching a second subset to the same variable replaces the first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownVariable`] if `name` is not declared and
    /// [`Error::InvalidArgument`] if the subset is blank.
    pub fn attach_subset(&mut self, name: &str, subset: &str) -> Result<&mut Self> {
        let index = self
            .position_of(name)
            .ok_or_else(|| Error::UnknownVariable(name.to_string()))?;
        let subset = non_blank(subset, "subset")?;

        debug!(variable = %name, %subset, "attached WCPS subset");
        self.state.subsets[index] = Some(subset.to_string());
        Ok(self)
    }

    /// Set the `where` predicate, e.g. `$c > 15`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UndeclaredVariable`] if the predicate references no
    /// variables or undeclared ones.
    pub fn filter(&mut self, condition: &str) -> Result<&mut Self> {
        let condition = non_blank(condition, "filter condition")?;
        self.assert_variables_exist(condition)?;
        self.state.filter_condition = Some(condition.to_string());
        Ok(self)
    }

    /// Aggregate the return value, replacing any previous aggregation.
    ///
    /// Without a condition (or with a blank one) every declared variable is
    /// aggregated, with its subset applied.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UndeclaredVariable`] if the condition references
    /// undeclared variables or none at all.
    pub fn aggregate(
        &mut self,
        kind: AggregationKind,
        condition: Option<&str>,
    ) -> Result<&mut Self> {
        let condition = condition.filter(|text| !text.trim().is_empty());
        if let Some(condition) = condition {
            self.assert_variables_exist(condition)?;
        }

        self.state.aggregation = Some(Aggregation::new(kind, condition.map(str::to_string)));
        Ok(self)
    }

    /// Shorthand for [`Datacube::aggregate`] with [`AggregationKind::Min`].
    ///
    /// # Errors
    ///
    /// See [`Datacube::aggregate`].
    pub fn min(&mut self, condition: Option<&str>) -> Result<&mut Self> {
        self.aggregate(AggregationKind::Min, condition)
    }

    /// Shorthand for [`Datacube::aggregate`] with [`AggregationKind::Max`].
    ///
    /// # Errors
    ///
    /// See [`Datacube::aggregate`].
    pub fn max(&mut self, condition: Option<&str>) -> Result<&mut Self> {
        self.aggregate(AggregationKind::Max, condition)
    }

    /// Shorthand for [`Datacube::aggregate`] with [`AggregationKind::Avg`].
    ///
    /// # Errors
    ///
    /// See [`Datacube::aggregate`].
    pub fn avg(&mut self, condition: Option<&str>) -> Result<&mut Self> {
        self.aggregate(AggregationKind::Avg, condition)
    }

    /// Shorthand for [`Datacube::aggregate`] with [`AggregationKind::Sum`].
    ///
    /// # Errors
    ///
    /// See [`Datacube::aggregate`].
    pub fn sum(&mut self, condition: Option<&str>) -> Result<&mut Self> {
        self.aggregate(AggregationKind::Sum, condition)
    }

    /// Shorthand for [`Datacube::aggregate`] with [`AggregationKind::Count`].
    ///
    /// # Errors
    ///
    /// See [`Datacube::aggregate`].
    pub fn count(&mut self, condition: Option<&str>) -> Result<&mut Self> {
        self.aggregate(AggregationKind::Count, condition)
    }

    /// Apply an expression to the return value, e.g. `$c * 2`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UndeclaredVariable`] if the expression references no
    /// variables or undeclared ones.
    pub fn transform(&mut self, operation: &str) -> Result<&mut Self> {
        let operation = non_blank(operation, "transformation")?;
        self.assert_variables_exist(operation)?;
        self.state.transformation = Some(operation.to_string());
        Ok(self)
    }

    /// Set the expression to encode, e.g. a `switch` colour mapping.
    ///
    /// Takes precedence over [`Datacube::transform`]. Constant expressions
    /// without variables are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UndeclaredVariable`] if the expression references
    /// undeclared variables.
    pub fn encode(&mut self, operation: &str) -> Result<&mut Self> {
        let operation = non_blank(operation, "encoding")?;
        if extract_variable_names(operation).is_some() {
            self.assert_variables_exist(operation)?;
        }
        self.state.encoding = Some(operation.to_string());
        Ok(self)
    }

    /// Set the output format by name: `PNG`, `CSV` or `JPEG`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFormat`] for any other name.
    pub fn set_format(&mut self, format: &str) -> Result<&mut Self> {
        self.state.format = Some(format.parse()?);
        Ok(self)
    }

    /// Clear every accumulated operation. The transport is kept.
    pub fn reset(&mut self) -> &mut Self {
        debug!("reset WCPS datacube");
        self.state = QueryState::default();
        self
    }

    /// Check that every `$name` in `text` is declared.
    ///
    /// Line breaks and tabs are treated as spaces.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UndeclaredVariable`] if `text` references no variables
    /// or any undeclared one.
    pub fn assert_variables_exist(&self, text: &str) -> Result<()> {
        let text = normalize_whitespace(text);
        let names = extract_variable_names(&text).ok_or_else(|| {
            Error::UndeclaredVariable(format!("`{text}` does not reference any variable"))
        })?;

        let mut missing: Vec<&str> = Vec::new();
        for name in &names {
            if self.position_of(name).is_none() && !missing.contains(&name.as_str()) {
                missing.push(name);
            }
        }

        if missing.is_empty() {
            return Ok(());
        }

        Err(Error::UndeclaredVariable(missing.join(", ")))
    }

    /// Apply the attached subsets.
    ///
    /// With `text`, every whole-token reference to a subsetted variable
    /// becomes `$name[subset]`. Without it, all declared variables are joined
    /// by spaces in declaration order, subsetted where a subset exists.
    #[must_use]
    pub fn substitute_subsets(&self, text: Option<&str>) -> String {
        match text {
            Some(text) => substitute_tokens(text, |name| self.subset_of(name)),
            None => self
                .state
                .variable_names
                .iter()
                .zip(&self.state.subsets)
                .map(|(name, subset)| match subset {
                    Some(subset) => format!("{name}[{subset}]"),
                    None => name.clone(),
                })
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    /// Compile the accumulated operations into WCPS query text.
    ///
    /// An aggregation, when set, is the whole return expression; format,
    /// encoding and transformation are then ignored.
    #[must_use]
    pub fn compile(&self) -> String {
        let state = &self.state;
        let mut query = String::from("for ");
        for declaration in &state.declarations {
            query.push_str(declaration);
            query.push('\n');
        }

        if let Some(condition) = &state.filter_condition {
            query.push_str(&format!("where {condition}\n"));
        }
        query.push_str("return \n");

        if let Some(aggregation) = &state.aggregation {
            let expression = self.substitute_subsets(aggregation.condition.as_deref());
            query.push_str(&format!("{}({expression})", aggregation.kind.function_name()));
            return query;
        }

        let explicit = state.encoding.as_deref().or(state.transformation.as_deref());
        let payload = self.substitute_subsets(explicit);

        match (state.format, explicit) {
            (Some(format), _) => {
                query.push_str(&format!("encode({payload}, \"{}\")", format.media_type()));
            }
            (None, Some(_)) => {
                query.push_str(&format!(
                    "encode({payload}, \"{}\")",
                    OutputFormat::Csv.media_type()
                ));
            }
            (None, None) => query.push_str(&payload),
        }

        query
    }

    /// Declared variable names, in declaration order.
    #[must_use]
    pub fn variable_names(&self) -> &[String] {
        &self.state.variable_names
    }

    /// Raw declarations, in declaration order.
    #[must_use]
    pub fn declarations(&self) -> &[String] {
        &self.state.declarations
    }

    /// Subsets, index-aligned with [`Datacube::variable_names`].
    #[must_use]
    pub fn subsets(&self) -> &[Option<String>] {
        &self.state.subsets
    }

    /// The `where` predicate, if set.
    #[must_use]
    pub fn filter_condition(&self) -> Option<&str> {
        self.state.filter_condition.as_deref()
    }

    /// The active aggregation, if any.
    #[must_use]
    pub fn aggregation(&self) -> Option<&Aggregation> {
        self.state.aggregation.as_ref()
    }

    /// The transformation expression, if set.
    #[must_use]
    pub fn transformation(&self) -> Option<&str> {
        self.state.transformation.as_deref()
    }

    /// The encoding expression, if set.
    #[must_use]
    pub fn encoding(&self) -> Option<&str> {
        self.state.encoding.as_deref()
    }

    /// The output format, if set.
    #[must_use]
    pub fn format(&self) -> Option<OutputFormat> {
        self.state.format
    }

    /// Returns true if nothing has been accumulated since the last reset.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state == QueryState::default()
    }

    fn position_of(&self, name: &str) -> Option<usize> {
        self.state.variable_names.iter().position(|known| known == name)
    }

    fn subset_of(&self, name: &str) -> Option<&str> {
        self.position_of(name)
            .and_then(|index| self.state.subsets[index].as_deref())
    }
}

impl<T: Transport> Datacube<T> {
    /// Compile, send and decode the query, then reset the builder.
    ///
    /// The builder is reset once the query is compiled, so it is empty
    /// afterwards whether or not the request succeeds. CSV and unset formats
    /// decode to [`QueryResult::Values`]; PNG and JPEG return the raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueryRejected`] or [`Error::TransportFailure`] from
    /// the transport and [`Error::DecodeError`] if a numeric body cannot be
    /// parsed.
    pub async fn execute(&mut self) -> Result<QueryResult> {
        let query = self.compile();
        let format = self.state.format;
        self.reset();

        let result = match self.transport.send(&query).await {
            Ok(response) => QueryResult::decode(format, response.body),
            Err(err) => Err(err),
        };

        if let Err(err) = &result {
            warn!(code = err.error_code(), "WCPS query failed: {err}");
        }
        result
    }
}

fn non_blank<'a>(text: &'a str, what: &str) -> Result<&'a str> {
    if text.trim().is_empty() {
        Err(Error::InvalidArgument(format!("{what} must not be blank")))
    } else {
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MockTransport, RawResponse};

    const AVG_LAND_TEMP: &str = "$c in (AvgLandTemp)";
    const BREMEN: &str = "Lat(53.08), Long(8.80)";

    fn cube() -> Datacube<MockTransport> {
        Datacube::new(MockTransport::new())
    }

    fn declared_cube() -> Datacube<MockTransport> {
        let mut cube = cube();
        cube.declare_variable(AVG_LAND_TEMP).unwrap();
        cube
    }

    #[test]
    fn new_cube_is_empty() {
        let cube = cube();
        assert!(cube.is_empty());
        assert!(cube.variable_names().is_empty());
        assert_eq!(cube.format(), None);
    }

    #[test]
    fn declare_variable_appends_name() {
        let mut cube = declared_cube();
        cube.declare_variable("$d in (S2_L2A)").unwrap();

        assert_eq!(cube.variable_names(), ["$c", "$d"]);
        assert_eq!(cube.declarations(), [AVG_LAND_TEMP, "$d in (S2_L2A)"]);
        assert_eq!(cube.subsets(), [None, None]);
    }

    #[test]
    fn declare_variable_rejects_malformed_declarations() {
        let mut cube = cube();
        for declaration in [
            "$cin(AvgLandTemp)",
            "c in (AvgLandTemp)",
            "$c in (AvgLandTemp",
            "$c in AvgLandTemp",
            "",
        ] {
            let err = cube.declare_variable(declaration).unwrap_err();
            assert!(
                matches!(err, Error::MalformedDeclaration(_)),
                "{declaration:?}"
            );
        }
        assert!(cube.is_empty());
    }

    #[test]
    fn declare_variable_rejects_duplicates() {
        let mut cube = declared_cube();
        let err = cube.declare_variable("$c in (OtherCoverage)").unwrap_err();
        assert_eq!(err, Error::DuplicateVariable("$c".to_string()));
        assert_eq!(cube.declarations(), [AVG_LAND_TEMP]);
    }

    #[test]
    fn attach_subset_to_declared_variable() {
        let mut cube = declared_cube();
        cube.attach_subset("$c", "Lat(1)").unwrap();
        assert_eq!(cube.subsets(), [Some("Lat(1)".to_string())]);
        assert_eq!(cube.substitute_subsets(None), "$c[Lat(1)]");
    }

    #[test]
    fn attach_subset_last_write_wins() {
        let mut cube = declared_cube();
        cube.attach_subset("$c", "Lat(1)")
            .unwrap()
            .attach_subset("$c", "Long(2)")
            .unwrap();
        assert_eq!(cube.substitute_subsets(None), "$c[Long(2)]");
    }

    #[test]
    fn attach_subset_rejects_unknown_variable() {
        let mut cube = declared_cube();
        let err = cube.attach_subset("$t", "Lat(1)").unwrap_err();
        assert_eq!(err, Error::UnknownVariable("$t".to_string()));
    }

    #[test]
    fn attach_subset_rejects_blank_subset() {
        let mut cube = declared_cube();
        let err = cube.attach_subset("$c", "  ").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn filter_requires_declared_variables() {
        let mut cube = cube();
        let err = cube.filter("$t > 1").unwrap_err();
        assert!(matches!(err, Error::UndeclaredVariable(_)));

        let mut cube = declared_cube();
        cube.filter("$c > 1").unwrap();
        assert_eq!(cube.filter_condition(), Some("$c > 1"));
    }

    #[test]
    fn filter_without_variables_is_rejected() {
        let mut cube = declared_cube();
        let err = cube.filter("1 > 0").unwrap_err();
        assert!(matches!(err, Error::UndeclaredVariable(_)));
        assert_eq!(cube.filter_condition(), None);
    }

    #[test]
    fn assert_variables_exist_tolerates_line_breaks() {
        let mut cube = declared_cube();
        cube.declare_variable("$d in (S2_L2A)").unwrap();
        cube.assert_variables_exist("$c\n>\t$d").unwrap();
    }

    #[test]
    fn assert_variables_exist_names_missing_variables() {
        let cube = declared_cube();
        let err = cube.assert_variables_exist("$c + $x + $y - $x").unwrap_err();
        assert_eq!(err, Error::UndeclaredVariable("$x, $y".to_string()));
    }

    #[test]
    fn aggregation_replaces_previous_aggregation() {
        let mut cube = declared_cube();
        cube.min(Some("$c")).unwrap().count(None).unwrap();
        assert_eq!(
            cube.aggregation(),
            Some(&Aggregation::new(AggregationKind::Count, None))
        );
    }

    #[test]
    fn aggregation_treats_blank_condition_as_absent() {
        let mut cube = declared_cube();
        cube.sum(Some("")).unwrap();
        assert_eq!(
            cube.aggregation(),
            Some(&Aggregation::new(AggregationKind::Sum, None))
        );
    }

    #[test]
    fn aggregation_condition_is_validated() {
        let mut cube = declared_cube();
        let err = cube.max(Some("$t > 3")).unwrap_err();
        assert!(matches!(err, Error::UndeclaredVariable(_)));
        assert!(cube.aggregation().is_none());
    }

    #[test]
    fn transform_requires_declared_variables() {
        let mut cube = declared_cube();
        assert!(matches!(
            cube.transform("$t * 2"),
            Err(Error::UndeclaredVariable(_))
        ));
        assert!(matches!(cube.transform(""), Err(Error::InvalidArgument(_))));

        cube.transform("$c * 2").unwrap();
        assert_eq!(cube.transformation(), Some("$c * 2"));
    }

    #[test]
    fn encode_accepts_constant_expressions() {
        let mut cube = declared_cube();
        cube.encode("{red: 255; green: 0; blue: 0}").unwrap();
        assert_eq!(cube.encoding(), Some("{red: 255; green: 0; blue: 0}"));

        let err = cube.encode("$t = 99999").unwrap_err();
        assert!(matches!(err, Error::UndeclaredVariable(_)));
    }

    #[test]
    fn set_format_accepts_closed_set() {
        let mut cube = cube();
        for (name, format) in [
            ("PNG", OutputFormat::Png),
            ("CSV", OutputFormat::Csv),
            ("JPEG", OutputFormat::Jpeg),
        ] {
            cube.set_format(name).unwrap();
            assert_eq!(cube.format(), Some(format));
        }

        let err = cube.set_format("TIFF").unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
        assert_eq!(cube.format(), Some(OutputFormat::Jpeg));
    }

    #[test]
    fn substitute_subsets_joins_all_variables() {
        let mut cube = declared_cube();
        cube.declare_variable("$d in (S2_L2A)").unwrap();
        cube.declare_variable("$e in (S1_GRD)").unwrap();
        cube.attach_subset("$d", "Lat(1)").unwrap();

        assert_eq!(cube.substitute_subsets(None), "$c $d[Lat(1)] $e");
    }

    #[test]
    fn substitute_subsets_only_rewrites_whole_tokens() {
        let mut cube = declared_cube();
        cube.declare_variable("$cc in (Other)").unwrap();
        cube.attach_subset("$c", "Lat(1)").unwrap();

        assert_eq!(
            cube.substitute_subsets(Some("$c + $cc")),
            "$c[Lat(1)] + $cc"
        );
    }

    #[test]
    fn compile_aggregation_round_trip() {
        let mut cube = declared_cube();
        cube.attach_subset("$c", BREMEN)
            .unwrap()
            .set_format("CSV")
            .unwrap()
            .avg(None)
            .unwrap();

        assert_eq!(
            cube.compile(),
            "for $c in (AvgLandTemp)\nreturn \navg($c[Lat(53.08), Long(8.80)])"
        );
    }

    #[test]
    fn compile_aggregation_ignores_encoding_and_format() {
        let mut cube = declared_cube();
        cube.encode("$c * 2")
            .unwrap()
            .set_format("PNG")
            .unwrap()
            .max(Some("$c - 1"))
            .unwrap();

        assert_eq!(
            cube.compile(),
            "for $c in (AvgLandTemp)\nreturn \nmax($c - 1)"
        );
    }

    #[test]
    fn compile_with_format_wraps_in_encode() {
        let mut cube = declared_cube();
        cube.set_format("PNG").unwrap();
        assert_eq!(
            cube.compile(),
            "for $c in (AvgLandTemp)\nreturn \nencode($c, \"image/png\")"
        );

        cube.set_format("JPEG").unwrap();
        assert!(cube.compile().ends_with("encode($c, \"image/jpeg\")"));
    }

    #[test]
    fn compile_bare_return_without_format() {
        let mut cube = declared_cube();
        cube.attach_subset("$c", BREMEN).unwrap();
        assert_eq!(
            cube.compile(),
            "for $c in (AvgLandTemp)\nreturn \n$c[Lat(53.08), Long(8.80)]"
        );
    }

    #[test]
    fn compile_transformation_defaults_to_csv() {
        let mut cube = declared_cube();
        cube.attach_subset("$c", "Lat(1)")
            .unwrap()
            .transform("$c * 2")
            .unwrap();
        assert_eq!(
            cube.compile(),
            "for $c in (AvgLandTemp)\nreturn \nencode($c[Lat(1)] * 2, \"text/csv\")"
        );
    }

    #[test]
    fn compile_encoding_takes_precedence_over_transformation() {
        let mut cube = declared_cube();
        cube.transform("$c * 2")
            .unwrap()
            .encode("$c + 1")
            .unwrap()
            .set_format("CSV")
            .unwrap();
        assert_eq!(
            cube.compile(),
            "for $c in (AvgLandTemp)\nreturn \nencode($c + 1, \"text/csv\")"
        );
    }

    #[test]
    fn compile_with_filter_and_several_variables() {
        let mut cube = declared_cube();
        cube.declare_variable("$d in (S2_L2A)")
            .unwrap()
            .filter("$c > 20")
            .unwrap()
            .attach_subset("$d", "ansi(\"2020-01\")")
            .unwrap();

        assert_eq!(
            cube.compile(),
            "for $c in (AvgLandTemp)\n$d in (S2_L2A)\nwhere $c > 20\nreturn \n$c $d[ansi(\"2020-01\")]"
        );
    }

    #[test]
    fn compile_is_idempotent() {
        let mut cube = declared_cube();
        cube.attach_subset("$c", BREMEN)
            .unwrap()
            .filter("$c > 0")
            .unwrap()
            .set_format("PNG")
            .unwrap();

        assert_eq!(cube.compile(), cube.compile());
        assert!(!cube.is_empty());
    }

    #[test]
    fn reset_clears_everything() {
        let mut cube = declared_cube();
        cube.attach_subset("$c", BREMEN)
            .unwrap()
            .filter("$c > 0")
            .unwrap()
            .transform("$c * 2")
            .unwrap()
            .encode("$c")
            .unwrap()
            .avg(None)
            .unwrap()
            .set_format("PNG")
            .unwrap();

        cube.reset();
        assert!(cube.is_empty());
        assert_eq!(cube.compile(), "for return \n");
    }

    #[tokio::test]
    async fn execute_decodes_csv_and_resets() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .withf(|query: &str| {
                query == "for $c in (AvgLandTemp)\nreturn \navg($c[Lat(53.08), Long(8.80)])"
            })
            .times(1)
            .returning(|_| Ok(RawResponse::ok("1.5,2.5")));

        let mut cube = Datacube::new(transport);
        let result = cube
            .declare_variable(AVG_LAND_TEMP)
            .unwrap()
            .attach_subset("$c", BREMEN)
            .unwrap()
            .set_format("CSV")
            .unwrap()
            .avg(None)
            .unwrap()
            .execute()
            .await
            .unwrap();

        assert_eq!(result, QueryResult::Values(vec![1.5, 2.5]));
        assert!(cube.is_empty());
    }

    #[tokio::test]
    async fn execute_returns_image_bytes() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .withf(|query: &str| query.ends_with("encode($c, \"image/png\")"))
            .times(1)
            .returning(|_| Ok(RawResponse::ok(vec![0x89, b'P', b'N', b'G'])));

        let mut cube = Datacube::new(transport);
        let result = cube
            .declare_variable(AVG_LAND_TEMP)
            .unwrap()
            .set_format("PNG")
            .unwrap()
            .execute()
            .await
            .unwrap();

        assert_eq!(result.into_bytes(), Some(vec![0x89, b'P', b'N', b'G']));
    }

    #[tokio::test]
    async fn execute_resets_after_rejected_query() {
        let mut transport = MockTransport::new();
        transport.expect_send().times(1).returning(|_| {
            Err(Error::QueryRejected {
                status: 400,
                message: "Syntax error".to_string(),
            })
        });

        let mut cube = Datacube::new(transport);
        cube.declare_variable(AVG_LAND_TEMP).unwrap();
        let err = cube.execute().await.unwrap_err();

        assert!(matches!(err, Error::QueryRejected { status: 400, .. }));
        assert!(cube.is_empty());
    }

    #[tokio::test]
    async fn execute_resets_after_decode_error() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_| Ok(RawResponse::ok("<html>")));

        let mut cube = Datacube::new(transport);
        cube.declare_variable(AVG_LAND_TEMP)
            .unwrap()
            .filter("$c > 0")
            .unwrap();
        let err = cube.execute().await.unwrap_err();

        assert!(matches!(err, Error::DecodeError(_)));
        assert!(cube.is_empty());
        assert!(cube.variable_names().is_empty());
    }

    #[tokio::test]
    async fn builder_is_reusable_after_execute() {
        let mut transport = MockTransport::new();
        let mut sequence = mockall::Sequence::new();
        transport
            .expect_send()
            .withf(|query: &str| query.ends_with("count($c)"))
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(RawResponse::ok("12")));
        transport
            .expect_send()
            .withf(|query: &str| query.starts_with("for $d in (S2_L2A)\n"))
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(RawResponse::ok("3")));

        let mut cube = Datacube::new(transport);
        let first = cube
            .declare_variable(AVG_LAND_TEMP)
            .unwrap()
            .count(None)
            .unwrap()
            .execute()
            .await
            .unwrap();
        let second = cube
            .declare_variable("$d in (S2_L2A)")
            .unwrap()
            .execute()
            .await
            .unwrap();

        assert_eq!(first.into_values(), Some(vec![12.0]));
        assert_eq!(second.into_values(), Some(vec![3.0]));
    }
}
