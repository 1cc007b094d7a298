//! Chart instance registry and dashboard controller built on `slicedice`.
//!
//! A [`Dashboard`] owns the one shared [`FactTable`] plus the current
//! period [`Granularity`], and a list of independently configured chart
//! instances (line and pie). Every instance's series is a pure function of
//! `(fact table, granularity, that instance's own selections)` — editing
//! one chart never changes another's output.
//!
//! # Usage
//!
//! ```rust
//! use slicedice::{parse_records, CubeDescriptor, FactTable, Granularity};
//! use slicedice_dashboard::Dashboard;
//!
//! let descriptor: CubeDescriptor = serde_json::from_str(
//!     r#"{"dimensions": {"Region": ["North", "South"]},
//!         "fact": "Amount",
//!         "min_date": "2024-01-05", "max_date": "2024-03-20"}"#,
//! ).unwrap();
//! let records = parse_records(
//!     r#"[{"Region": "North", "Data": "2024-01-10", "Amount": 5}]"#,
//!     "Data",
//! ).unwrap();
//!
//! let mut dash = Dashboard::new();
//! dash.set_granularity(Granularity::Month).unwrap();
//!
//! // Ingestion is ticketed: the last-issued ticket wins.
//! let ticket = dash.begin_ingestion();
//! dash.complete_ingestion(ticket, FactTable::new(descriptor, records))
//!     .unwrap();
//!
//! let id = dash.add_line_chart("Sales").unwrap();
//! assert_eq!(dash.chart(id).unwrap().series()[0].key, "2024-01");
//! ```

use serde::{Deserialize, Serialize};
use slicedice::period::derive_periods;
use slicedice::{
    line_series, pie_series, AggregatedPoint, CubeDescriptor, FactTable, FilterState, Granularity,
    Selection,
};

pub use slicedice::SliceDiceError as Error;
pub type Result<T> = std::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// Chart instances
// ---------------------------------------------------------------------------

/// Stable identifier for a chart instance.
///
/// Assigned monotonically at creation and never reused, so an edit issued
/// against an instance can never land on a different one after the list
/// shifts. All registry operations address instances by id, never by
/// position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChartId(u64);

impl ChartId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ChartId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Line,
    Pie,
}

/// Kind-specific selection state for one chart instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChartConfig {
    /// One equality constraint (or wildcard) per dimension; groups by
    /// time bucket.
    Line { filters: FilterState },
    /// One grouping dimension plus an optional period restriction; groups
    /// by dimension value.
    Pie {
        dimension: Option<String>,
        period: Selection,
    },
}

/// One independently configured chart: id, editable title, selection state
/// and the cached output series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartInstance {
    id: ChartId,
    title: String,
    config: ChartConfig,
    series: Vec<AggregatedPoint>,
}

impl ChartInstance {
    pub fn id(&self) -> ChartId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn kind(&self) -> ChartKind {
        match self.config {
            ChartConfig::Line { .. } => ChartKind::Line,
            ChartConfig::Pie { .. } => ChartKind::Pie,
        }
    }

    pub fn config(&self) -> &ChartConfig {
        &self.config
    }

    pub fn series(&self) -> &[AggregatedPoint] {
        &self.series
    }

    /// Replace the cached series from the shared table and this instance's
    /// own state. With no table loaded the series is empty.
    fn recompute(&mut self, table: Option<&FactTable>, granularity: Granularity) -> Result<()> {
        self.series = match (table, &self.config) {
            (None, _) => Vec::new(),
            (Some(table), ChartConfig::Line { filters }) => {
                line_series(table, filters, granularity)?
            }
            (Some(table), ChartConfig::Pie { dimension, period }) => {
                pie_series(table, dimension.as_deref(), period, granularity)?
            }
        };
        Ok(())
    }
}

/// Render handoff shape for one chart: everything the drawing layer needs,
/// nothing it doesn't.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartView {
    pub id: ChartId,
    pub title: String,
    pub kind: ChartKind,
    pub series: Vec<AggregatedPoint>,
}

/// Export handoff shape: the instance list and titles only. The capture
/// mechanism itself lives outside this crate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportEntry {
    pub id: ChartId,
    pub title: String,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Owns the list of chart instances and addresses them by stable id.
#[derive(Debug, Clone, Default)]
pub struct ChartRegistry {
    charts: Vec<ChartInstance>,
    next_id: u64,
}

impl ChartRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_id(&mut self) -> ChartId {
        self.next_id += 1;
        ChartId(self.next_id)
    }

    /// Append a line chart with an all-wildcard filter state.
    pub fn add_line(
        &mut self,
        title: impl Into<String>,
        descriptor: Option<&CubeDescriptor>,
    ) -> ChartId {
        let id = self.fresh_id();
        self.charts.push(ChartInstance {
            id,
            title: title.into(),
            config: ChartConfig::Line {
                filters: descriptor.map(FilterState::unconstrained).unwrap_or_default(),
            },
            series: Vec::new(),
        });
        id
    }

    /// Append a pie chart grouping on the first-declared dimension with no
    /// period restriction.
    pub fn add_pie(
        &mut self,
        title: impl Into<String>,
        descriptor: Option<&CubeDescriptor>,
    ) -> ChartId {
        let id = self.fresh_id();
        self.charts.push(ChartInstance {
            id,
            title: title.into(),
            config: ChartConfig::Pie {
                dimension: descriptor
                    .and_then(CubeDescriptor::first_dimension)
                    .map(str::to_string),
                period: Selection::All,
            },
            series: Vec::new(),
        });
        id
    }

    pub fn remove(&mut self, id: ChartId) -> Result<()> {
        let position = self
            .charts
            .iter()
            .position(|c| c.id == id)
            .ok_or(Error::UnknownInstance(id.raw()))?;
        self.charts.remove(position);
        Ok(())
    }

    /// Retitle in place. Empty titles are accepted.
    pub fn rename(&mut self, id: ChartId, title: impl Into<String>) -> Result<()> {
        self.instance_mut(id)?.title = title.into();
        Ok(())
    }

    /// Update one dimension constraint of a line chart. A pie id here is
    /// reported as unknown: no chart of the addressed kind has that id.
    pub fn set_filter(
        &mut self,
        id: ChartId,
        dimension: impl Into<String>,
        selection: Selection,
    ) -> Result<()> {
        match &mut self.instance_mut(id)?.config {
            ChartConfig::Line { filters } => {
                filters.set(dimension, selection);
                Ok(())
            }
            ChartConfig::Pie { .. } => Err(Error::UnknownInstance(id.raw())),
        }
    }

    /// Change a pie chart's grouping dimension.
    pub fn set_dimension(&mut self, id: ChartId, dimension: impl Into<String>) -> Result<()> {
        match &mut self.instance_mut(id)?.config {
            ChartConfig::Pie { dimension: dim, .. } => {
                *dim = Some(dimension.into());
                Ok(())
            }
            ChartConfig::Line { .. } => Err(Error::UnknownInstance(id.raw())),
        }
    }

    /// Change a pie chart's period restriction.
    pub fn set_period(&mut self, id: ChartId, selection: Selection) -> Result<()> {
        match &mut self.instance_mut(id)?.config {
            ChartConfig::Pie { period, .. } => {
                *period = selection;
                Ok(())
            }
            ChartConfig::Line { .. } => Err(Error::UnknownInstance(id.raw())),
        }
    }

    pub fn get(&self, id: ChartId) -> Option<&ChartInstance> {
        self.charts.iter().find(|c| c.id == id)
    }

    fn instance_mut(&mut self, id: ChartId) -> Result<&mut ChartInstance> {
        self.charts
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(Error::UnknownInstance(id.raw()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChartInstance> {
        self.charts.iter()
    }

    pub fn len(&self) -> usize {
        self.charts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.charts.is_empty()
    }

    /// Reset every instance to its post-ingestion default: all-wildcard
    /// filters for line charts, first-declared dimension and no period
    /// restriction for pie charts. Old selections reference the previous
    /// dataset's domains and are not guaranteed valid against a new one.
    fn reset_selections(&mut self, descriptor: Option<&CubeDescriptor>) {
        for chart in &mut self.charts {
            match &mut chart.config {
                ChartConfig::Line { filters } => {
                    *filters = descriptor.map(FilterState::unconstrained).unwrap_or_default();
                }
                ChartConfig::Pie { dimension, period } => {
                    *dimension = descriptor
                        .and_then(CubeDescriptor::first_dimension)
                        .map(str::to_string);
                    *period = Selection::All;
                }
            }
        }
    }

    /// Reapply filter + aggregation for every instance against the shared
    /// table, replacing each cached series.
    pub fn recompute_all(
        &mut self,
        table: Option<&FactTable>,
        granularity: Granularity,
    ) -> Result<()> {
        for chart in &mut self.charts {
            chart.recompute(table, granularity)?;
        }
        log::debug!(
            "recomputed {} chart instance(s) at {granularity} granularity",
            self.charts.len()
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Dashboard controller
// ---------------------------------------------------------------------------

/// Ticket for one in-flight ingestion. Issuing a newer ticket supersedes
/// all earlier ones; a superseded completion is discarded, so the
/// last-issued request's result always wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestionTicket(u64);

impl IngestionTicket {
    /// Raw conversions for callers that must carry the ticket across a
    /// foreign boundary (the wasm bindings pass tickets as strings).
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// What happened to a completed ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The table was replaced and every instance recomputed.
    Applied,
    /// A newer ingestion was begun in the meantime; this result was
    /// discarded and nothing changed.
    Superseded,
}

/// Top-level orchestrator: the shared fact table, the current granularity,
/// the derived period options and the chart registry.
///
/// Every mutation here is synchronous and non-reentrant; the asynchronous
/// part of ingestion (fetching and decoding) happens outside and hands its
/// result in through [`Dashboard::complete_ingestion`].
#[derive(Debug, Default)]
pub struct Dashboard {
    table: Option<FactTable>,
    granularity: Granularity,
    period_options: Vec<String>,
    registry: ChartRegistry,
    controls_hidden: bool,
    ingest_seq: u64,
}

impl Dashboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Change the time-bucket granularity.
    ///
    /// This invalidates every instance's period-derived state: all
    /// selections reset to their defaults, the period options are
    /// re-derived and every series is recomputed.
    pub fn set_granularity(&mut self, granularity: Granularity) -> Result<()> {
        self.granularity = granularity;
        self.refresh_derived_state()
    }

    /// The selectable period options for the current table and
    /// granularity. Empty with no table loaded, at `Day` granularity, or
    /// with inverted descriptor date bounds.
    pub fn period_options(&self) -> &[String] {
        &self.period_options
    }

    pub fn table(&self) -> Option<&FactTable> {
        self.table.as_ref()
    }

    fn descriptor(&self) -> Option<&CubeDescriptor> {
        self.table.as_ref().map(FactTable::descriptor)
    }

    // -- ingestion ---------------------------------------------------------

    /// Issue a ticket for an ingestion the caller is about to perform.
    pub fn begin_ingestion(&mut self) -> IngestionTicket {
        self.ingest_seq += 1;
        IngestionTicket(self.ingest_seq)
    }

    /// Hand in the result of an ingestion.
    ///
    /// A stale ticket (any ticket issued before the most recent
    /// [`begin_ingestion`]) is discarded without touching any state. A
    /// failed result leaves the shared table unchanged and surfaces the
    /// error. A fresh successful result atomically replaces the table,
    /// resets every instance's selections and recomputes everything.
    ///
    /// [`begin_ingestion`]: Dashboard::begin_ingestion
    pub fn complete_ingestion(
        &mut self,
        ticket: IngestionTicket,
        outcome: Result<FactTable>,
    ) -> Result<IngestOutcome> {
        if ticket.0 != self.ingest_seq {
            log::warn!(
                "discarding superseded ingestion result (ticket {}, current {})",
                ticket.0,
                self.ingest_seq
            );
            return Ok(IngestOutcome::Superseded);
        }
        let table = outcome.inspect_err(|e| {
            log::warn!("ingestion failed, keeping previous table: {e}");
        })?;
        self.table = Some(table);
        self.refresh_derived_state()?;
        Ok(IngestOutcome::Applied)
    }

    /// Re-derive period options, reset all selections and recompute all
    /// series. Runs after every table replacement or granularity change.
    fn refresh_derived_state(&mut self) -> Result<()> {
        self.period_options = match self.descriptor() {
            Some(d) => derive_periods(d.min_date, d.max_date, self.granularity),
            None => Vec::new(),
        };
        let descriptor = self.table.as_ref().map(FactTable::descriptor);
        self.registry.reset_selections(descriptor);
        self.registry
            .recompute_all(self.table.as_ref(), self.granularity)
    }

    // -- chart instance operations ----------------------------------------

    pub fn add_line_chart(&mut self, title: impl Into<String>) -> Result<ChartId> {
        let descriptor = self.table.as_ref().map(FactTable::descriptor);
        let id = self.registry.add_line(title, descriptor);
        self.recompute_one(id)?;
        Ok(id)
    }

    pub fn add_pie_chart(&mut self, title: impl Into<String>) -> Result<ChartId> {
        let descriptor = self.table.as_ref().map(FactTable::descriptor);
        let id = self.registry.add_pie(title, descriptor);
        self.recompute_one(id)?;
        Ok(id)
    }

    pub fn remove_chart(&mut self, id: ChartId) -> Result<()> {
        self.registry.remove(id)
    }

    pub fn rename_chart(&mut self, id: ChartId, title: impl Into<String>) -> Result<()> {
        self.registry.rename(id, title)
    }

    /// Update one dimension constraint of a line chart and recompute only
    /// that chart.
    pub fn set_line_filter(
        &mut self,
        id: ChartId,
        dimension: impl Into<String>,
        selection: Selection,
    ) -> Result<()> {
        self.registry.set_filter(id, dimension, selection)?;
        self.recompute_one(id)
    }

    /// Change a pie chart's grouping dimension and recompute only that
    /// chart.
    pub fn set_pie_dimension(&mut self, id: ChartId, dimension: impl Into<String>) -> Result<()> {
        self.registry.set_dimension(id, dimension)?;
        self.recompute_one(id)
    }

    /// Change a pie chart's period restriction and recompute only that
    /// chart.
    pub fn set_pie_period(&mut self, id: ChartId, selection: Selection) -> Result<()> {
        self.registry.set_period(id, selection)?;
        self.recompute_one(id)
    }

    fn recompute_one(&mut self, id: ChartId) -> Result<()> {
        let table = self.table.as_ref();
        let granularity = self.granularity;
        self.registry.instance_mut(id)?.recompute(table, granularity)
    }

    // -- render / export surface ------------------------------------------

    pub fn chart(&self, id: ChartId) -> Option<&ChartInstance> {
        self.registry.get(id)
    }

    pub fn charts(&self) -> impl Iterator<Item = &ChartInstance> {
        self.registry.iter()
    }

    pub fn chart_count(&self) -> usize {
        self.registry.len()
    }

    /// The render handoff: id, title, kind and series for every instance,
    /// in list order.
    pub fn chart_views(&self) -> Vec<ChartView> {
        self.registry
            .iter()
            .map(|c| ChartView {
                id: c.id(),
                title: c.title().to_string(),
                kind: c.kind(),
                series: c.series().to_vec(),
            })
            .collect()
    }

    /// The export handoff: instance ids and titles only.
    pub fn export_manifest(&self) -> Vec<ExportEntry> {
        self.registry
            .iter()
            .map(|c| ExportEntry {
                id: c.id(),
                title: c.title().to_string(),
            })
            .collect()
    }

    /// Hide interactive controls while the export layer captures chart
    /// output. Pure UI flag; no aggregation impact.
    pub fn set_controls_hidden(&mut self, hidden: bool) {
        self.controls_hidden = hidden;
    }

    pub fn controls_hidden(&self) -> bool {
        self.controls_hidden
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
