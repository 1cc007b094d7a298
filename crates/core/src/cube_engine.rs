//! Slicedice — in-memory slice-and-dice aggregation engine.
//!
//! The core primitive is a [`FactTable`]: a flat, immutable sequence of
//! [`FactRecord`]s annotated with a [`CubeDescriptor`] (dimension domains,
//! the numeric fact field, observed date bounds). On top of it the engine
//! derives filter axes, time-bucket options and chart-ready series:
//!
//! - [`period`] buckets record dates into day/month/year keys and
//!   enumerates the selectable period options for a date range.
//! - [`FilterState`] evaluates per-dimension equality constraints, where
//!   [`Selection::All`] is the "no constraint" wildcard.
//! - [`aggregate`] groups filtered records by a key and sums the fact
//!   field, preserving first-seen group order.
//!
//! # Quick start
//!
//! ```rust
//! use slicedice::{parse_records, CubeDescriptor, FactTable, FilterState, Granularity};
//!
//! let descriptor: CubeDescriptor = serde_json::from_str(
//!     r#"{"dimensions": {"Region": ["North", "South"]},
//!         "fact": "Amount",
//!         "min_date": "2024-01-05", "max_date": "2024-03-20"}"#,
//! ).unwrap();
//!
//! let records = parse_records(
//!     r#"[{"Region": "North", "Data": "2024-01-10", "Amount": 5},
//!         {"Region": "South", "Data": "2024-01-12", "Amount": 3}]"#,
//!     "Data",
//! ).unwrap();
//!
//! let table = FactTable::new(descriptor, records).unwrap();
//! let filters = FilterState::unconstrained(table.descriptor());
//! let series = slicedice::line_series(&table, &filters, Granularity::Month).unwrap();
//! assert_eq!(series.len(), 1);
//! assert_eq!(series[0].key, "2024-01");
//! assert_eq!(series[0].value, 8.0);
//! ```

pub mod period;

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SliceDiceError {
    /// The cube descriptor contradicts itself or the records it describes.
    #[error("malformed descriptor: {0}")]
    MalformedDescriptor(String),
    /// A record's fact field is missing or non-numeric. The engine fails
    /// fast rather than coercing to zero or letting NaN poison a group sum.
    #[error("invalid fact value for `{field}` in record {index}: {reason}")]
    InvalidFactValue {
        field: String,
        index: usize,
        reason: String,
    },
    /// A registry operation addressed a chart id that does not exist (or
    /// does not name a chart of the addressed kind).
    #[error("unknown chart instance: {0}")]
    UnknownInstance(u64),
    /// Fetching or decoding a new fact table failed. The previously loaded
    /// table is left untouched.
    #[error("ingestion failed: {0}")]
    IngestionFailure(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SliceDiceError>;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// The cell type of a flat record: dimension values are text, fact values
/// are numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// A numeric value (candidate fact field).
    Number(f64),
    /// A text string (candidate dimension value).
    Text(String),
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}
impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}
impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Text(s) => write!(f, "{s}"),
            FieldValue::Number(n) => write!(f, "{n}"),
        }
    }
}

/// One row of the fact table: a calendar date plus named dimension and
/// fact fields. Immutable once ingested; identity is positional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRecord {
    /// The record's date, already truncated to calendar-day precision.
    pub date: NaiveDate,
    /// Dimension values and fact values, keyed by field name.
    pub fields: BTreeMap<String, FieldValue>,
}

impl FactRecord {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field insertion, mostly for tests and fixtures.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// The record's value for a dimension, if present and textual.
    pub fn dimension(&self, name: &str) -> Option<&str> {
        match self.fields.get(name) {
            Some(FieldValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// The record's value for a numeric fact field, if present and numeric.
    pub fn fact(&self, field: &str) -> Option<f64> {
        match self.fields.get(field) {
            Some(FieldValue::Number(n)) => Some(*n),
            _ => None,
        }
    }
}

/// Metadata describing a fact table: which fields are dimensions (and
/// their observed domains), which field is the summable fact, and the
/// observed date bounds.
///
/// `dimensions` keeps declaration order — the first-declared dimension is
/// the deterministic default grouping axis for new pie charts. This is a
/// declared invariant, not an accident of map iteration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CubeDescriptor {
    /// Dimension name → distinct observed values, in declaration order.
    pub dimensions: IndexMap<String, Vec<String>>,
    /// Name of the numeric field to be summed.
    pub fact: String,
    /// Earliest record date observed across the table.
    pub min_date: NaiveDate,
    /// Latest record date observed across the table.
    pub max_date: NaiveDate,
}

impl CubeDescriptor {
    /// The first-declared dimension, the default pie grouping axis.
    pub fn first_dimension(&self) -> Option<&str> {
        self.dimensions.keys().next().map(String::as_str)
    }

    /// Whether the observed date bounds are ordered. Inverted bounds are
    /// tolerated everywhere downstream: they degrade to empty period
    /// options and empty series instead of failing a recompute.
    pub fn date_bounds_valid(&self) -> bool {
        self.min_date <= self.max_date
    }
}

/// Time-bucket granularity for line-chart grouping and period options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Month,
    Year,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::Month => "month",
            Granularity::Year => "year",
        }
    }
}

/// Dashboards open at day granularity.
impl Default for Granularity {
    fn default() -> Self {
        Granularity::Day
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Granularity {
    type Err = SliceDiceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "day" => Ok(Granularity::Day),
            "month" => Ok(Granularity::Month),
            "year" => Ok(Granularity::Year),
            other => Err(SliceDiceError::MalformedDescriptor(format!(
                "unknown granularity `{other}`"
            ))),
        }
    }
}

/// A filter or period choice: either the `"all"` wildcard or one concrete
/// value from the relevant domain.
///
/// At the wire boundary the wildcard is the literal string `"all"`, the
/// token dashboard UIs send from their select inputs. Serialization round-trips that
/// token; the typed API has no such ambiguity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// No constraint.
    All,
    /// Exact-match constraint on one concrete value.
    Value(String),
}

impl Selection {
    pub fn is_all(&self) -> bool {
        matches!(self, Selection::All)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Selection::All => "all",
            Selection::Value(v) => v,
        }
    }
}

impl From<&str> for Selection {
    fn from(s: &str) -> Self {
        if s == "all" {
            Selection::All
        } else {
            Selection::Value(s.to_string())
        }
    }
}

impl Serialize for Selection {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Selection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Selection::from(s.as_str()))
    }
}

/// Chart-ready output: one point per distinct group after summation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedPoint {
    /// Bucket label (line charts) or dimension value (pie charts).
    pub key: String,
    /// Sum of the fact field over all filtered records sharing `key`.
    pub value: f64,
}

// ---------------------------------------------------------------------------
// Fact table
// ---------------------------------------------------------------------------

/// An immutable fact table: records plus the descriptor that explains them.
///
/// Construction validates the fail-fast invariants up front (see
/// [`FactTable::new`]); after that every read is infallible and the table
/// is shared read-only by all chart instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactTable {
    descriptor: CubeDescriptor,
    records: Vec<FactRecord>,
}

impl FactTable {
    /// Build a table, validating the descriptor against the records:
    ///
    /// - every record must carry a numeric value for the fact field
    ///   ([`SliceDiceError::InvalidFactValue`] otherwise — this is the
    ///   fail-fast side of the fact-value policy);
    /// - every dimension value appearing on a record must be a member of
    ///   that dimension's declared domain
    ///   ([`SliceDiceError::MalformedDescriptor`] otherwise).
    ///
    /// Inverted date bounds are deliberately *not* rejected here: they
    /// degrade to empty period options and empty series at recompute time.
    pub fn new(descriptor: CubeDescriptor, records: Vec<FactRecord>) -> Result<Self> {
        for (index, record) in records.iter().enumerate() {
            match record.fields.get(&descriptor.fact) {
                Some(FieldValue::Number(_)) => {}
                Some(FieldValue::Text(_)) => {
                    return Err(SliceDiceError::InvalidFactValue {
                        field: descriptor.fact.clone(),
                        index,
                        reason: "non-numeric value".to_string(),
                    });
                }
                None => {
                    return Err(SliceDiceError::InvalidFactValue {
                        field: descriptor.fact.clone(),
                        index,
                        reason: "field missing".to_string(),
                    });
                }
            }
            for (dim, domain) in &descriptor.dimensions {
                if let Some(value) = record.dimension(dim) {
                    if !domain.iter().any(|v| v == value) {
                        return Err(SliceDiceError::MalformedDescriptor(format!(
                            "record {index}: value `{value}` not in domain of dimension `{dim}`"
                        )));
                    }
                }
            }
        }
        Ok(Self {
            descriptor,
            records,
        })
    }

    pub fn descriptor(&self) -> &CubeDescriptor {
        &self.descriptor
    }

    pub fn records(&self) -> &[FactRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Decode the ingestion handoff shape — an array of flat objects keyed by
/// dimension names, a date field and the fact field — into records.
///
/// Date values may carry a time suffix (`"2024-01-10T00:00:00"`); anything
/// after `T` is truncated to calendar-day precision. Structural problems
/// (missing date, non-scalar cell) surface as
/// [`SliceDiceError::IngestionFailure`].
pub fn parse_records(json: &str, date_field: &str) -> Result<Vec<FactRecord>> {
    let rows: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_str(json)?;
    let mut records = Vec::with_capacity(rows.len());

    for (index, row) in rows.into_iter().enumerate() {
        let raw_date = match row.get(date_field) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(_) => {
                return Err(SliceDiceError::IngestionFailure(format!(
                    "record {index}: date field `{date_field}` is not a string"
                )));
            }
            None => {
                return Err(SliceDiceError::IngestionFailure(format!(
                    "record {index}: date field `{date_field}` missing"
                )));
            }
        };
        let day_part = raw_date.split('T').next().unwrap_or(&raw_date);
        let date: NaiveDate = day_part.parse().map_err(|e| {
            SliceDiceError::IngestionFailure(format!(
                "record {index}: bad date `{raw_date}`: {e}"
            ))
        })?;

        let mut record = FactRecord::new(date);
        for (name, value) in row {
            if name == date_field {
                continue;
            }
            let field = match value {
                serde_json::Value::String(s) => FieldValue::Text(s),
                serde_json::Value::Number(n) => match n.as_f64() {
                    Some(f) => FieldValue::Number(f),
                    None => {
                        return Err(SliceDiceError::IngestionFailure(format!(
                            "record {index}: field `{name}` is not representable as f64"
                        )));
                    }
                },
                other => {
                    return Err(SliceDiceError::IngestionFailure(format!(
                        "record {index}: field `{name}` has unsupported type {other}"
                    )));
                }
            };
            record.fields.insert(name, field);
        }
        records.push(record);
    }

    Ok(records)
}

// ---------------------------------------------------------------------------
// Filter engine
// ---------------------------------------------------------------------------

/// Per-dimension equality constraints for one line chart.
///
/// Dimensions absent from the state are unconstrained; present ones must
/// either be [`Selection::All`] or equal the record's value exactly. No
/// prefix or partial matching.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterState(BTreeMap<String, Selection>);

impl FilterState {
    /// The default state once cube info is available: `All` for every
    /// declared dimension.
    pub fn unconstrained(descriptor: &CubeDescriptor) -> Self {
        Self(
            descriptor
                .dimensions
                .keys()
                .map(|dim| (dim.clone(), Selection::All))
                .collect(),
        )
    }

    pub fn set(&mut self, dimension: impl Into<String>, selection: Selection) {
        self.0.insert(dimension.into(), selection);
    }

    pub fn get(&self, dimension: &str) -> &Selection {
        self.0.get(dimension).unwrap_or(&Selection::All)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Selection)> {
        self.0.iter().map(|(d, s)| (d.as_str(), s))
    }

    /// Does the record satisfy every constrained dimension?
    ///
    /// A concrete constraint on a dimension the record has no value for
    /// fails; evaluation order over dimensions is irrelevant to the
    /// outcome. O(D) in the number of constrained dimensions.
    pub fn matches(&self, record: &FactRecord) -> bool {
        self.0.iter().all(|(dim, selection)| match selection {
            Selection::All => true,
            Selection::Value(want) => record.dimension(dim) == Some(want.as_str()),
        })
    }
}

/// Period predicate for pie charts: `All` passes everything, otherwise the
/// record's bucket key under the active granularity must equal the
/// selected period key exactly.
pub fn period_matches(record: &FactRecord, period: &Selection, granularity: Granularity) -> bool {
    match period {
        Selection::All => true,
        Selection::Value(key) => period::bucket_key(record.date, granularity) == *key,
    }
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

/// Group records by `key_fn` and sum `fact_field` within each group.
///
/// Group output order is first-seen order of each key in the input — the
/// natural chronological/insertion order of the table — not sorted order.
/// Records for which `key_fn` returns `None` are skipped; a group with no
/// records never appears (no zero-filled gaps).
///
/// Fact-value policy: fail fast. A record whose fact field is missing or
/// non-numeric yields [`SliceDiceError::InvalidFactValue`] with the
/// record's position in the (possibly filtered) input sequence.
pub fn aggregate<'a, I, F>(records: I, key_fn: F, fact_field: &str) -> Result<Vec<AggregatedPoint>>
where
    I: IntoIterator<Item = &'a FactRecord>,
    F: Fn(&FactRecord) -> Option<String>,
{
    let mut points: Vec<AggregatedPoint> = Vec::new();
    let mut slot_by_key: HashMap<String, usize> = HashMap::new();

    for (index, record) in records.into_iter().enumerate() {
        let Some(key) = key_fn(record) else {
            continue;
        };
        let value = match record.fields.get(fact_field) {
            Some(FieldValue::Number(n)) => *n,
            Some(FieldValue::Text(_)) => {
                return Err(SliceDiceError::InvalidFactValue {
                    field: fact_field.to_string(),
                    index,
                    reason: "non-numeric value".to_string(),
                });
            }
            None => {
                return Err(SliceDiceError::InvalidFactValue {
                    field: fact_field.to_string(),
                    index,
                    reason: "field missing".to_string(),
                });
            }
        };
        match slot_by_key.get(&key) {
            Some(&slot) => points[slot].value += value,
            None => {
                slot_by_key.insert(key.clone(), points.len());
                points.push(AggregatedPoint { key, value });
            }
        }
    }

    Ok(points)
}

/// Line-chart series: filter by `filters`, group by time bucket, sum.
///
/// Inverted descriptor date bounds short-circuit to an empty series.
pub fn line_series(
    table: &FactTable,
    filters: &FilterState,
    granularity: Granularity,
) -> Result<Vec<AggregatedPoint>> {
    if !table.descriptor().date_bounds_valid() {
        return Ok(Vec::new());
    }
    aggregate(
        table.records().iter().filter(|r| filters.matches(r)),
        |r| Some(period::bucket_key(r.date, granularity)),
        &table.descriptor().fact,
    )
}

/// Pie-chart series: filter by period selection, group by the chosen
/// dimension's value, sum.
///
/// `dimension == None` (no dimensions declared) and inverted descriptor
/// date bounds both yield an empty series. Records lacking a value for the
/// chosen dimension contribute to no slice.
pub fn pie_series(
    table: &FactTable,
    dimension: Option<&str>,
    period: &Selection,
    granularity: Granularity,
) -> Result<Vec<AggregatedPoint>> {
    if !table.descriptor().date_bounds_valid() {
        return Ok(Vec::new());
    }
    let Some(dim) = dimension else {
        return Ok(Vec::new());
    };
    aggregate(
        table
            .records()
            .iter()
            .filter(|r| period_matches(r, period, granularity)),
        |r| r.dimension(dim).map(str::to_string),
        &table.descriptor().fact,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn region_descriptor() -> CubeDescriptor {
        serde_json::from_str(
            r#"{"dimensions": {"Region": ["North", "South"]},
                "fact": "Amount",
                "min_date": "2024-01-05", "max_date": "2024-03-20"}"#,
        )
        .unwrap()
    }

    fn region_records() -> Vec<FactRecord> {
        vec![
            FactRecord::new(d("2024-01-10"))
                .with_field("Region", "North")
                .with_field("Amount", 5.0),
            FactRecord::new(d("2024-01-12"))
                .with_field("Region", "South")
                .with_field("Amount", 3.0),
            FactRecord::new(d("2024-02-01"))
                .with_field("Region", "North")
                .with_field("Amount", 2.0),
        ]
    }

    fn region_table() -> FactTable {
        FactTable::new(region_descriptor(), region_records()).unwrap()
    }

    #[test]
    fn descriptor_decodes_wire_shape_in_declaration_order() {
        let descriptor: CubeDescriptor = serde_json::from_str(
            r#"{"dimensions": {"Zeta": ["z"], "Alpha": ["a"]},
                "fact": "Amount",
                "min_date": "2024-01-01", "max_date": "2024-12-31"}"#,
        )
        .unwrap();
        let names: Vec<&str> = descriptor.dimensions.keys().map(String::as_str).collect();
        assert_eq!(names, ["Zeta", "Alpha"], "declaration order must survive");
        assert_eq!(descriptor.first_dimension(), Some("Zeta"));
    }

    #[test]
    fn selection_round_trips_the_all_token() {
        let all: Selection = serde_json::from_str("\"all\"").unwrap();
        assert_eq!(all, Selection::All);
        let north: Selection = serde_json::from_str("\"North\"").unwrap();
        assert_eq!(north, Selection::Value("North".to_string()));
        assert_eq!(serde_json::to_string(&Selection::All).unwrap(), "\"all\"");
    }

    #[test]
    fn granularity_round_trips_ui_tokens() {
        for (token, g) in [
            ("day", Granularity::Day),
            ("month", Granularity::Month),
            ("year", Granularity::Year),
        ] {
            assert_eq!(token.parse::<Granularity>().unwrap(), g);
            assert_eq!(g.to_string(), token);
        }
        assert!("week".parse::<Granularity>().is_err());
    }

    #[test]
    fn fact_table_rejects_missing_fact_field() {
        let records = vec![FactRecord::new(d("2024-01-10")).with_field("Region", "North")];
        let err = FactTable::new(region_descriptor(), records).unwrap_err();
        match err {
            SliceDiceError::InvalidFactValue { field, index, .. } => {
                assert_eq!(field, "Amount");
                assert_eq!(index, 0);
            }
            other => panic!("expected InvalidFactValue, got {other:?}"),
        }
    }

    #[test]
    fn fact_table_rejects_textual_fact_value() {
        let records = vec![FactRecord::new(d("2024-01-10"))
            .with_field("Region", "North")
            .with_field("Amount", "five")];
        assert!(matches!(
            FactTable::new(region_descriptor(), records),
            Err(SliceDiceError::InvalidFactValue { .. })
        ));
    }

    #[test]
    fn fact_table_rejects_out_of_domain_dimension_value() {
        let records = vec![FactRecord::new(d("2024-01-10"))
            .with_field("Region", "West")
            .with_field("Amount", 1.0)];
        assert!(matches!(
            FactTable::new(region_descriptor(), records),
            Err(SliceDiceError::MalformedDescriptor(_))
        ));
    }

    #[test]
    fn fact_table_tolerates_inverted_date_bounds() {
        let mut descriptor = region_descriptor();
        descriptor.min_date = d("2024-03-20");
        descriptor.max_date = d("2024-01-05");
        let table = FactTable::new(descriptor, region_records()).unwrap();
        assert!(!table.descriptor().date_bounds_valid());
        // Recomputes degrade to empty output instead of failing.
        let filters = FilterState::unconstrained(table.descriptor());
        let series = line_series(&table, &filters, Granularity::Month).unwrap();
        assert!(series.is_empty());
    }

    #[test]
    fn parse_records_decodes_flat_objects() {
        let records = parse_records(
            r#"[{"Region": "North", "Data": "2024-01-10", "Amount": 5},
                {"Region": "South", "Data": "2024-01-12T00:00:00", "Amount": 3}]"#,
            "Data",
        )
        .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].date, d("2024-01-10"));
        assert_eq!(records[0].dimension("Region"), Some("North"));
        assert_eq!(records[0].fact("Amount"), Some(5.0));
        // Time suffix truncated to day precision.
        assert_eq!(records[1].date, d("2024-01-12"));
    }

    #[test]
    fn parse_records_rejects_missing_or_malformed_dates() {
        assert!(matches!(
            parse_records(r#"[{"Amount": 5}]"#, "Data"),
            Err(SliceDiceError::IngestionFailure(_))
        ));
        assert!(matches!(
            parse_records(r#"[{"Data": "01/10/2024", "Amount": 5}]"#, "Data"),
            Err(SliceDiceError::IngestionFailure(_))
        ));
    }

    #[test]
    fn filter_matches_wildcard_and_exact_value() {
        let record = FactRecord::new(d("2024-01-10"))
            .with_field("Region", "North")
            .with_field("Amount", 5.0);

        let mut filters = FilterState::default();
        assert!(filters.matches(&record), "empty state is unconstrained");

        filters.set("Region", Selection::All);
        assert!(filters.matches(&record), "wildcard never constrains");

        filters.set("Region", Selection::Value("North".to_string()));
        assert!(filters.matches(&record));

        filters.set("Region", Selection::Value("South".to_string()));
        assert!(!filters.matches(&record));
    }

    #[test]
    fn filter_concrete_constraint_fails_on_absent_dimension() {
        let record = FactRecord::new(d("2024-01-10")).with_field("Amount", 5.0);
        let mut filters = FilterState::default();
        filters.set("Region", Selection::Value("North".to_string()));
        assert!(!filters.matches(&record));
    }

    #[test]
    fn period_predicate_uses_bucket_keys() {
        let record = FactRecord::new(d("2024-01-10")).with_field("Amount", 5.0);
        let jan = Selection::Value("2024-01".to_string());
        let feb = Selection::Value("2024-02".to_string());
        assert!(period_matches(&record, &Selection::All, Granularity::Month));
        assert!(period_matches(&record, &jan, Granularity::Month));
        assert!(!period_matches(&record, &feb, Granularity::Month));
        let y2024 = Selection::Value("2024".to_string());
        assert!(period_matches(&record, &y2024, Granularity::Year));
    }

    #[test]
    fn aggregate_preserves_first_seen_group_order() {
        let records = region_records();
        let points = aggregate(
            records.iter(),
            |r| r.dimension("Region").map(str::to_string),
            "Amount",
        )
        .unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].key, "North");
        assert_eq!(points[0].value, 7.0);
        assert_eq!(points[1].key, "South");
        assert_eq!(points[1].value, 3.0);
    }

    #[test]
    fn aggregate_group_sums_are_permutation_invariant() {
        let mut records = region_records();
        records.reverse();
        let points = aggregate(
            records.iter(),
            |r| r.dimension("Region").map(str::to_string),
            "Amount",
        )
        .unwrap();
        // Output order tracks the permuted input, sums do not change.
        assert_eq!(points[0].key, "North");
        assert_eq!(points[0].value, 2.0 + 5.0);
        assert_eq!(points[1].key, "South");
        assert_eq!(points[1].value, 3.0);
    }

    #[test]
    fn aggregate_skips_records_without_a_group_key() {
        let records = vec![
            FactRecord::new(d("2024-01-10"))
                .with_field("Region", "North")
                .with_field("Amount", 5.0),
            FactRecord::new(d("2024-01-11")).with_field("Amount", 4.0),
        ];
        let points = aggregate(
            records.iter(),
            |r| r.dimension("Region").map(str::to_string),
            "Amount",
        )
        .unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, 5.0);
    }

    #[test]
    fn aggregate_fails_fast_on_bad_fact_value() {
        let records = vec![FactRecord::new(d("2024-01-10"))
            .with_field("Region", "North")
            .with_field("Amount", "oops")];
        let err = aggregate(
            records.iter(),
            |r| r.dimension("Region").map(str::to_string),
            "Amount",
        )
        .unwrap_err();
        assert!(matches!(err, SliceDiceError::InvalidFactValue { .. }));
    }

    #[test]
    fn line_series_by_month_matches_reference_scenario() {
        let table = region_table();
        let filters = FilterState::unconstrained(table.descriptor());
        let series = line_series(&table, &filters, Granularity::Month).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!((series[0].key.as_str(), series[0].value), ("2024-01", 8.0));
        assert_eq!((series[1].key.as_str(), series[1].value), ("2024-02", 2.0));
    }

    #[test]
    fn line_series_respects_dimension_filter() {
        let table = region_table();
        let mut filters = FilterState::unconstrained(table.descriptor());
        filters.set("Region", Selection::Value("North".to_string()));
        let series = line_series(&table, &filters, Granularity::Month).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!((series[0].key.as_str(), series[0].value), ("2024-01", 5.0));
        assert_eq!((series[1].key.as_str(), series[1].value), ("2024-02", 2.0));
    }

    #[test]
    fn line_series_by_day_buckets_each_record_date() {
        let table = region_table();
        let filters = FilterState::unconstrained(table.descriptor());
        let series = line_series(&table, &filters, Granularity::Day).unwrap();
        let keys: Vec<&str> = series.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, ["2024-01-10", "2024-01-12", "2024-02-01"]);
    }

    #[test]
    fn pie_series_by_region_matches_reference_scenario() {
        let table = region_table();
        let series = pie_series(&table, Some("Region"), &Selection::All, Granularity::Month)
            .unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!((series[0].key.as_str(), series[0].value), ("North", 7.0));
        assert_eq!((series[1].key.as_str(), series[1].value), ("South", 3.0));
    }

    #[test]
    fn pie_series_with_period_selection_restricts_records() {
        let table = region_table();
        let jan = Selection::Value("2024-01".to_string());
        let series =
            pie_series(&table, Some("Region"), &jan, Granularity::Month).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!((series[0].key.as_str(), series[0].value), ("North", 5.0));
        assert_eq!((series[1].key.as_str(), series[1].value), ("South", 3.0));
    }

    #[test]
    fn pie_series_without_dimension_is_empty() {
        let table = region_table();
        let series =
            pie_series(&table, None, &Selection::All, Granularity::Month).unwrap();
        assert!(series.is_empty());
    }

    #[test]
    fn unfiltered_aggregation_round_trips_the_total() {
        // All-wildcard filtering must reproduce the table-wide fact sum,
        // partitioned only by the grouping key.
        let table = region_table();
        let total: f64 = table
            .records()
            .iter()
            .map(|r| r.fact("Amount").unwrap())
            .sum();

        let filters = FilterState::unconstrained(table.descriptor());
        let line_sum: f64 = line_series(&table, &filters, Granularity::Year)
            .unwrap()
            .iter()
            .map(|p| p.value)
            .sum();
        let pie_sum: f64 =
            pie_series(&table, Some("Region"), &Selection::All, Granularity::Month)
                .unwrap()
                .iter()
                .map(|p| p.value)
                .sum();

        assert!((line_sum - total).abs() < 1e-9);
        assert!((pie_sum - total).abs() < 1e-9);
    }
}
