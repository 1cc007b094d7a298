//! Slicedice WASM — the browser-facing dashboard surface.
//!
//! This crate wraps [`slicedice_dashboard::Dashboard`] for WebAssembly
//! environments. All state lives in memory; payloads cross the boundary as
//! JSON strings and chart ids as decimal strings, so the JavaScript
//! rendering layer stays free of wasm-specific types.
//!
//! # Usage (JavaScript)
//!
//! ```js
//! import init, { WasmDashboard } from 'slicedice-wasm';
//!
//! await init();
//! const dash = new WasmDashboard();
//! dash.set_granularity("month");
//!
//! const ticket = dash.begin_ingestion();
//! const resp = await fetch("/get_cube_data/");      // out-of-scope glue
//! dash.complete_ingestion(ticket, infoJson, dataJson, "Data");
//!
//! const id = dash.add_line_chart("Sales");
//! const charts = JSON.parse(dash.charts());
//! ```

use slicedice::{parse_records, CubeDescriptor, FactTable, Granularity, Selection};
use slicedice_dashboard::{ChartId, Dashboard, IngestOutcome, IngestionTicket};
use wasm_bindgen::prelude::*;

// ---------------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------------

/// Convert an engine error to a JsValue for wasm-bindgen.
fn to_js_err(e: slicedice_dashboard::Error) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn parse_chart_id(id: &str) -> Result<ChartId, JsValue> {
    id.parse::<u64>()
        .map(ChartId::from_raw)
        .map_err(|_| JsValue::from_str(&format!("malformed chart id `{id}`")))
}

fn parse_ticket(ticket: &str) -> Result<IngestionTicket, JsValue> {
    ticket
        .parse::<u64>()
        .map(IngestionTicket::from_raw)
        .map_err(|_| JsValue::from_str(&format!("malformed ingestion ticket `{ticket}`")))
}

// ---------------------------------------------------------------------------
// WasmDashboard — the public API
// ---------------------------------------------------------------------------

/// An in-memory slice-and-dice dashboard for browser environments.
///
/// All data is lost when the instance is dropped; the host page is
/// expected to re-fetch and re-ingest the uploaded dataset on load.
#[wasm_bindgen]
pub struct WasmDashboard {
    inner: Dashboard,
}

impl Default for WasmDashboard {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl WasmDashboard {
    /// Create an empty dashboard (no fact table loaded, day granularity).
    #[wasm_bindgen(constructor)]
    pub fn new() -> WasmDashboard {
        WasmDashboard {
            inner: Dashboard::new(),
        }
    }

    /// The current granularity token: `"day"`, `"month"` or `"year"`.
    pub fn granularity(&self) -> String {
        self.inner.granularity().to_string()
    }

    /// Set the time-bucket granularity from its UI token. Resets every
    /// chart's selections and recomputes all series.
    pub fn set_granularity(&mut self, token: &str) -> Result<(), JsValue> {
        let granularity: Granularity = token.parse().map_err(to_js_err)?;
        self.inner.set_granularity(granularity).map_err(to_js_err)
    }

    /// The selectable period options for the current table and
    /// granularity, as a JSON array of strings.
    pub fn period_options(&self) -> Result<String, JsValue> {
        serde_json::to_string(self.inner.period_options())
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    // -- ingestion ---------------------------------------------------------

    /// Issue a ticket before starting a fetch. If several fetches overlap,
    /// only the one holding the most recent ticket can replace the table.
    pub fn begin_ingestion(&mut self) -> String {
        self.inner.begin_ingestion().raw().to_string()
    }

    /// Resolve a ticket with fetched cube info and cube data.
    ///
    /// `descriptor_json` is the cube-info shape
    /// (`{dimensions, fact, min_date, max_date}`); `records_json` is the
    /// array of flat record objects; `date_field` names the record date
    /// column. Returns `true` if the table was replaced, `false` if a
    /// newer ingestion superseded this one. Decode and validation
    /// failures leave the previously loaded table untouched.
    pub fn complete_ingestion(
        &mut self,
        ticket: &str,
        descriptor_json: &str,
        records_json: &str,
        date_field: &str,
    ) -> Result<bool, JsValue> {
        let ticket = parse_ticket(ticket)?;
        let table = decode_table(descriptor_json, records_json, date_field);
        let outcome = self
            .inner
            .complete_ingestion(ticket, table)
            .map_err(to_js_err)?;
        Ok(outcome == IngestOutcome::Applied)
    }

    /// Resolve a ticket as failed (network error, bad response). Surfaces
    /// the failure unless a newer ingestion already superseded the ticket,
    /// in which case it returns `false` quietly.
    pub fn fail_ingestion(&mut self, ticket: &str, message: &str) -> Result<bool, JsValue> {
        let ticket = parse_ticket(ticket)?;
        let outcome = self
            .inner
            .complete_ingestion(
                ticket,
                Err(slicedice_dashboard::Error::IngestionFailure(
                    message.to_string(),
                )),
            )
            .map_err(to_js_err)?;
        Ok(outcome == IngestOutcome::Applied)
    }

    // -- chart instances ---------------------------------------------------

    /// Append a line chart; returns its stable id as a decimal string.
    pub fn add_line_chart(&mut self, title: &str) -> Result<String, JsValue> {
        self.inner
            .add_line_chart(title)
            .map(|id| id.to_string())
            .map_err(to_js_err)
    }

    /// Append a pie chart; returns its stable id as a decimal string.
    pub fn add_pie_chart(&mut self, title: &str) -> Result<String, JsValue> {
        self.inner
            .add_pie_chart(title)
            .map(|id| id.to_string())
            .map_err(to_js_err)
    }

    pub fn remove_chart(&mut self, id: &str) -> Result<(), JsValue> {
        let id = parse_chart_id(id)?;
        self.inner.remove_chart(id).map_err(to_js_err)
    }

    pub fn rename_chart(&mut self, id: &str, title: &str) -> Result<(), JsValue> {
        let id = parse_chart_id(id)?;
        self.inner.rename_chart(id, title).map_err(to_js_err)
    }

    /// Set one dimension filter of a line chart. `"all"` is the wildcard.
    pub fn set_line_filter(
        &mut self,
        id: &str,
        dimension: &str,
        value: &str,
    ) -> Result<(), JsValue> {
        let id = parse_chart_id(id)?;
        self.inner
            .set_line_filter(id, dimension, Selection::from(value))
            .map_err(to_js_err)
    }

    /// Change a pie chart's grouping dimension.
    pub fn set_pie_dimension(&mut self, id: &str, dimension: &str) -> Result<(), JsValue> {
        let id = parse_chart_id(id)?;
        self.inner
            .set_pie_dimension(id, dimension)
            .map_err(to_js_err)
    }

    /// Change a pie chart's period restriction. `"all"` is the wildcard;
    /// any other value must be one of the derived period options.
    pub fn set_pie_period(&mut self, id: &str, value: &str) -> Result<(), JsValue> {
        let id = parse_chart_id(id)?;
        self.inner
            .set_pie_period(id, Selection::from(value))
            .map_err(to_js_err)
    }

    // -- render / export surface ------------------------------------------

    /// Every chart instance as `{id, title, kind, series}`, JSON-encoded,
    /// in list order. The renderer draws from this and nothing else.
    pub fn charts(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.inner.chart_views())
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// Instance ids and titles only, JSON-encoded, for the export layer.
    pub fn export_manifest(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.inner.export_manifest())
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// Hide interactive controls while charts are captured for export.
    pub fn set_controls_hidden(&mut self, hidden: bool) {
        self.inner.set_controls_hidden(hidden);
    }

    pub fn controls_hidden(&self) -> bool {
        self.inner.controls_hidden()
    }

    pub fn chart_count(&self) -> usize {
        self.inner.chart_count()
    }
}

/// Decode the two fetched payloads into a validated fact table, funnelling
/// every decode problem into the engine's error type so the controller's
/// keep-previous-table policy applies uniformly.
fn decode_table(
    descriptor_json: &str,
    records_json: &str,
    date_field: &str,
) -> slicedice_dashboard::Result<FactTable> {
    let descriptor: CubeDescriptor = serde_json::from_str(descriptor_json)?;
    let records = parse_records(records_json, date_field)?;
    FactTable::new(descriptor, records)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const INFO: &str = r#"{"dimensions": {"Region": ["North", "South"]},
                           "fact": "Amount",
                           "min_date": "2024-01-05", "max_date": "2024-03-20"}"#;
    const DATA: &str = r#"[{"Region": "North", "Data": "2024-01-10", "Amount": 5},
                           {"Region": "South", "Data": "2024-01-12", "Amount": 3},
                           {"Region": "North", "Data": "2024-02-01", "Amount": 2}]"#;

    fn loaded() -> WasmDashboard {
        let mut dash = WasmDashboard::new();
        dash.set_granularity("month").unwrap();
        let ticket = dash.begin_ingestion();
        let applied = dash.complete_ingestion(&ticket, INFO, DATA, "Data").unwrap();
        assert!(applied);
        dash
    }

    #[test]
    fn wasm_dashboard_line_chart_flow() {
        let mut dash = loaded();
        let id = dash.add_line_chart("Sales").unwrap();

        let charts = dash.charts().unwrap();
        assert!(charts.contains("\"title\":\"Sales\""));
        assert!(charts.contains("\"2024-01\""));

        dash.set_line_filter(&id, "Region", "North").unwrap();
        let charts = dash.charts().unwrap();
        assert!(charts.contains("\"value\":5.0") || charts.contains("\"value\":5"));

        dash.set_line_filter(&id, "Region", "all").unwrap();
        dash.rename_chart(&id, "All regions").unwrap();
        assert!(dash.charts().unwrap().contains("All regions"));
    }

    #[test]
    fn wasm_dashboard_pie_chart_flow() {
        let mut dash = loaded();
        let id = dash.add_pie_chart("Mix").unwrap();

        let charts = dash.charts().unwrap();
        assert!(charts.contains("\"kind\":\"pie\""));
        assert!(charts.contains("North"));

        dash.set_pie_period(&id, "2024-01").unwrap();
        let charts = dash.charts().unwrap();
        assert!(!charts.contains("2024-02"), "february records filtered out");
    }

    #[test]
    fn wasm_dashboard_period_options_follow_granularity() {
        let mut dash = loaded();
        let options = dash.period_options().unwrap();
        assert_eq!(options, r#"["2024-01","2024-02","2024-03"]"#);

        dash.set_granularity("year").unwrap();
        assert_eq!(dash.period_options().unwrap(), r#"["2024"]"#);

        dash.set_granularity("day").unwrap();
        assert_eq!(dash.period_options().unwrap(), "[]");
    }

    #[test]
    fn wasm_dashboard_superseded_ingestion_returns_false() {
        let mut dash = WasmDashboard::new();
        let stale = dash.begin_ingestion();
        let fresh = dash.begin_ingestion();

        assert!(dash.complete_ingestion(&fresh, INFO, DATA, "Data").unwrap());
        let applied = dash.complete_ingestion(&stale, INFO, "[]", "Data").unwrap();
        assert!(!applied, "stale ticket must be discarded");
        assert_eq!(dash.charts().unwrap(), "[]");
    }

    #[test]
    fn wasm_dashboard_remove_keeps_other_instances() {
        let mut dash = loaded();
        let a = dash.add_line_chart("keep me").unwrap();
        let b = dash.add_pie_chart("drop me").unwrap();
        assert_ne!(a, b);

        dash.remove_chart(&b).unwrap();
        assert_eq!(dash.chart_count(), 1);
        let charts = dash.charts().unwrap();
        assert!(charts.contains("keep me"));
        assert!(!charts.contains("drop me"));
    }

    #[test]
    fn wasm_dashboard_export_surface() {
        let mut dash = loaded();
        dash.add_line_chart("Sales").unwrap();
        dash.add_pie_chart("Mix").unwrap();

        let manifest = dash.export_manifest().unwrap();
        assert!(manifest.contains("Sales"));
        assert!(manifest.contains("Mix"));
        assert!(!manifest.contains("series"), "manifest carries titles only");

        assert!(!dash.controls_hidden());
        dash.set_controls_hidden(true);
        assert!(dash.controls_hidden());
        assert_eq!(dash.chart_count(), 2);
    }
}
