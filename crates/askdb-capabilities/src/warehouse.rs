//! SQL execution against a REST warehouse.
//!
//! Three layers:
//! - [`validate_query`]: fence stripping, trailing-semicolon trim, and a
//!   forbidden-keyword check. Only read queries pass.
//! - [`Warehouse`] / [`RestWarehouse`]: the query transport. The REST
//!   client targets the BigQuery v2 `queries` endpoint.
//! - [`ExecuteSql`]: the capability. Validates, runs, persists the full
//!   result set as a labeled CSV, and returns a table payload (the
//!   transcript preview is applied at render time).

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use askdb_core::descriptor::{CapabilityDescriptor, ParameterSchema};
use askdb_core::outcome::{CapabilityPayload, FailureKind};
use askdb_core::text::strip_code_fence;

use crate::errors::CapabilityError;
use crate::traits::{require_str, Capability, InvocationContext};

/// Statement keywords that mutate data or schema. Queries containing
/// any of these (word-bounded, case-insensitive) are rejected.
const FORBIDDEN_KEYWORDS: [&str; 5] = ["INSERT", "ALTER", "UPDATE", "DROP", "DELETE"];

fn forbidden_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let alternation = FORBIDDEN_KEYWORDS.join("|");
        Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).unwrap()
    })
}

/// Validate and normalize a generated query.
///
/// Strips a surrounding Markdown fence, trims whitespace and trailing
/// semicolons, then rejects empty queries and queries containing
/// forbidden statement keywords.
pub fn validate_query(raw: &str) -> Result<String, CapabilityError> {
    let query = strip_code_fence(raw).trim_end_matches(';').trim();
    if query.is_empty() {
        return Err(CapabilityError::Validation {
            message: "query is empty".into(),
        });
    }
    if let Some(found) = forbidden_pattern().find(query) {
        return Err(CapabilityError::Validation {
            message: format!(
                "query contains forbidden keyword `{}`",
                found.as_str().to_uppercase()
            ),
        });
    }
    Ok(query.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Warehouse transport
// ─────────────────────────────────────────────────────────────────────────────

/// Tabular results of one query.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryResults {
    /// Column names, in result order.
    pub columns: Vec<String>,
    /// Result rows, stringified cell by cell.
    pub rows: Vec<Vec<String>>,
}

/// Query transport. [`ExecuteSql`] holds this behind `Arc`, so tests
/// substitute an in-memory implementation.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Run a validated read query.
    async fn run_query(&self, sql: &str) -> Result<QueryResults, CapabilityError>;
}

/// REST warehouse configuration.
#[derive(Clone, Debug)]
pub struct RestWarehouseConfig {
    /// Base URL of the warehouse REST API.
    pub api_base: String,
    /// Billing project ID.
    pub project: String,
    /// Warehouse location (e.g. `EU`).
    pub location: String,
    /// Per-query timeout.
    pub timeout: Duration,
    /// Maximum rows fetched per query.
    pub max_result_rows: usize,
    /// Bearer token, if the endpoint requires one.
    pub auth_token: Option<String>,
}

/// Warehouse client over the BigQuery v2 `queries` REST endpoint.
pub struct RestWarehouse {
    config: RestWarehouseConfig,
    client: reqwest::Client,
}

/// Response body of the `queries` endpoint, reduced to what we read.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueriesResponse {
    #[serde(default)]
    schema: Option<ResponseSchema>,
    #[serde(default)]
    rows: Vec<ResponseRow>,
    #[serde(default)]
    errors: Vec<ResponseError>,
    #[serde(default)]
    job_complete: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ResponseSchema {
    #[serde(default)]
    fields: Vec<ResponseField>,
}

#[derive(Debug, Deserialize)]
struct ResponseField {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ResponseRow {
    #[serde(default)]
    f: Vec<ResponseCell>,
}

#[derive(Debug, Deserialize)]
struct ResponseCell {
    #[serde(default)]
    v: Value,
}

#[derive(Debug, Deserialize)]
struct ResponseError {
    #[serde(default)]
    message: String,
}

impl RestWarehouse {
    /// Create a REST warehouse client.
    pub fn new(config: RestWarehouseConfig) -> Result<Self, CapabilityError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(CapabilityError::Http)?;
        Ok(Self { config, client })
    }

    fn query_url(&self) -> String {
        format!(
            "{}/bigquery/v2/projects/{}/queries",
            self.config.api_base.trim_end_matches('/'),
            self.config.project
        )
    }
}

#[async_trait]
impl Warehouse for RestWarehouse {
    #[instrument(skip_all, fields(project = %self.config.project))]
    async fn run_query(&self, sql: &str) -> Result<QueryResults, CapabilityError> {
        let body = serde_json::json!({
            "query": sql,
            "useLegacySql": false,
            "location": self.config.location,
            "maxResults": self.config.max_result_rows,
            "timeoutMs": self.config.timeout.as_millis() as u64,
        });

        let mut request = self.client.post(self.query_url()).json(&body);
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(CapabilityError::Http)?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CapabilityError::Query {
                message: format!("warehouse returned {status}: {text}"),
            });
        }

        let parsed: QueriesResponse = response.json().await.map_err(CapabilityError::Http)?;
        if let Some(err) = parsed.errors.first() {
            return Err(CapabilityError::Query {
                message: err.message.clone(),
            });
        }
        if parsed.job_complete == Some(false) {
            return Err(CapabilityError::Query {
                message: "query did not complete within the warehouse timeout".into(),
            });
        }

        let columns: Vec<String> = parsed
            .schema
            .map(|s| s.fields.into_iter().map(|f| f.name).collect())
            .unwrap_or_default();
        let rows: Vec<Vec<String>> = parsed
            .rows
            .into_iter()
            .map(|row| row.f.into_iter().map(|cell| render_cell(&cell.v)).collect())
            .collect();

        debug!(columns = columns.len(), rows = rows.len(), "query completed");
        Ok(QueryResults { columns, rows })
    }
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CSV persistence
// ─────────────────────────────────────────────────────────────────────────────

/// Persist full results as `<label>.csv` under `dir`, returning the
/// written path. The label is sanitized to a safe file name.
pub fn persist_csv(dir: &Path, label: &str, results: &QueryResults) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.csv", sanitize_label(label)));
    let mut out = String::new();
    write_csv_row(&mut out, &results.columns);
    for row in &results.rows {
        write_csv_row(&mut out, row);
    }
    std::fs::write(&path, out)?;
    Ok(path)
}

fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "results".to_string()
    } else {
        cleaned
    }
}

fn write_csv_row(out: &mut String, cells: &[String]) {
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        if cell.contains(['"', ',', '\n']) {
            out.push('"');
            out.push_str(&cell.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(cell);
        }
    }
    out.push('\n');
}

// ─────────────────────────────────────────────────────────────────────────────
// Capability
// ─────────────────────────────────────────────────────────────────────────────

/// The `execute_sql` capability.
pub struct ExecuteSql {
    warehouse: std::sync::Arc<dyn Warehouse>,
    /// Directory where full result sets land as CSV.
    results_dir: PathBuf,
    timeout_ms: u64,
}

impl ExecuteSql {
    /// Create the capability over the given transport.
    #[must_use]
    pub fn new(
        warehouse: std::sync::Arc<dyn Warehouse>,
        results_dir: impl Into<PathBuf>,
        timeout_ms: u64,
    ) -> Self {
        Self {
            warehouse,
            results_dir: results_dir.into(),
            timeout_ms,
        }
    }
}

#[async_trait]
impl Capability for ExecuteSql {
    fn name(&self) -> &str {
        "execute_sql"
    }

    fn failure_kind(&self) -> FailureKind {
        FailureKind::Query
    }

    fn timeout_ms(&self) -> Option<u64> {
        Some(self.timeout_ms)
    }

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor {
            name: "execute_sql".into(),
            description: "Run a read-only SQL query against the warehouse and \
                          return the resulting rows."
                .into(),
            parameters: ParameterSchema::object(&[
                ("query", "string", "The SQL query to execute"),
                (
                    "result_label",
                    "string",
                    "Short description of what the rows contain",
                ),
            ]),
        }
    }

    #[instrument(skip_all, fields(request_id = %ctx.request_id))]
    async fn invoke(
        &self,
        arguments: &Map<String, Value>,
        ctx: &InvocationContext,
    ) -> Result<CapabilityPayload, CapabilityError> {
        let raw = require_str(arguments, "query")?;
        let label = arguments
            .get("result_label")
            .and_then(Value::as_str)
            .unwrap_or("query results")
            .to_string();

        let query = validate_query(raw)?;
        let results = self.warehouse.run_query(&query).await?;
        metrics::counter!("askdb_warehouse_queries_total").increment(1);

        match persist_csv(&self.results_dir, &label, &results) {
            Ok(path) => debug!(path = %path.display(), "results persisted"),
            // A failed CSV write must not fail the query itself.
            Err(err) => warn!(%err, "failed to persist results CSV"),
        }

        Ok(CapabilityPayload::Table {
            label,
            columns: results.columns,
            rows: results.rows,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // ── validate_query ──────────────────────────────────────────────

    #[test]
    fn validate_accepts_plain_select() {
        assert_eq!(
            validate_query("SELECT id FROM orders").unwrap(),
            "SELECT id FROM orders"
        );
    }

    #[test]
    fn validate_strips_fence_and_semicolon() {
        let raw = "```sql\nSELECT id FROM orders;\n```";
        assert_eq!(validate_query(raw).unwrap(), "SELECT id FROM orders");
    }

    #[test]
    fn validate_rejects_forbidden_keywords() {
        for query in [
            "DROP TABLE orders",
            "delete from orders",
            "SELECT 1; UPDATE orders SET x = 1",
            "INSERT INTO orders VALUES (1)",
            "ALTER TABLE orders ADD COLUMN x INT",
        ] {
            let err = validate_query(query).unwrap_err();
            assert_matches!(err, CapabilityError::Validation { .. }, "query: {query}");
        }
    }

    #[test]
    fn validate_allows_keywords_inside_identifiers() {
        // `updated_at` must not trip the UPDATE check.
        let query = "SELECT updated_at, dropped FROM orders";
        assert!(validate_query(query).is_ok());
    }

    #[test]
    fn validate_rejects_empty_query() {
        assert_matches!(
            validate_query("  ;  ").unwrap_err(),
            CapabilityError::Validation { .. }
        );
    }

    // ── CSV persistence ─────────────────────────────────────────────

    #[test]
    fn persist_csv_quotes_special_cells() {
        let dir = tempfile::tempdir().unwrap();
        let results = QueryResults {
            columns: vec!["name".into(), "note".into()],
            rows: vec![vec!["acme, inc".into(), "said \"hi\"".into()]],
        };
        let path = persist_csv(dir.path(), "vendors list", &results).unwrap();
        assert!(path.ends_with("vendors_list.csv"));
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content, "name,note\n\"acme, inc\",\"said \"\"hi\"\"\"\n");
    }

    #[test]
    fn sanitize_label_handles_empty_and_symbols() {
        assert_eq!(sanitize_label("  "), "results");
        assert_eq!(sanitize_label("q1: revenue/by-month"), "q1__revenue_by_month");
    }

    // ── RestWarehouse ───────────────────────────────────────────────

    fn rest_config(api_base: String) -> RestWarehouseConfig {
        RestWarehouseConfig {
            api_base,
            project: "acme-dw".into(),
            location: "EU".into(),
            timeout: Duration::from_secs(5),
            max_result_rows: 100,
            auth_token: None,
        }
    }

    #[tokio::test]
    async fn rest_warehouse_parses_schema_and_rows() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bigquery/v2/projects/acme-dw/queries"))
            .and(body_partial_json(serde_json::json!({
                "useLegacySql": false,
                "location": "EU"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jobComplete": true,
                "schema": {"fields": [{"name": "month"}, {"name": "revenue"}]},
                "rows": [
                    {"f": [{"v": "2024-01"}, {"v": "1200"}]},
                    {"f": [{"v": "2024-02"}, {"v": null}]}
                ]
            })))
            .mount(&server)
            .await;

        let warehouse = RestWarehouse::new(rest_config(server.uri())).unwrap();
        let results = warehouse.run_query("SELECT 1").await.unwrap();
        assert_eq!(results.columns, vec!["month", "revenue"]);
        assert_eq!(results.rows[0], vec!["2024-01", "1200"]);
        assert_eq!(results.rows[1][1], "");
    }

    #[tokio::test]
    async fn rest_warehouse_surfaces_query_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jobComplete": true,
                "errors": [{"message": "table not found: orders"}]
            })))
            .mount(&server)
            .await;

        let warehouse = RestWarehouse::new(rest_config(server.uri())).unwrap();
        let err = warehouse.run_query("SELECT 1").await.unwrap_err();
        assert_matches!(err, CapabilityError::Query { message } if message.contains("orders"));
    }

    #[tokio::test]
    async fn rest_warehouse_rejects_http_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let warehouse = RestWarehouse::new(rest_config(server.uri())).unwrap();
        let err = warehouse.run_query("SELECT 1").await.unwrap_err();
        assert_matches!(err, CapabilityError::Query { message } if message.contains("403"));
    }

    // ── ExecuteSql capability ───────────────────────────────────────

    struct FixedWarehouse {
        fail: bool,
    }

    #[async_trait]
    impl Warehouse for FixedWarehouse {
        async fn run_query(&self, _sql: &str) -> Result<QueryResults, CapabilityError> {
            if self.fail {
                Err(CapabilityError::Query {
                    message: "syntax error".into(),
                })
            } else {
                Ok(QueryResults {
                    columns: vec!["n".into()],
                    rows: vec![vec!["42".into()]],
                })
            }
        }
    }

    fn args(query: &str, label: &str) -> Map<String, Value> {
        let mut args = Map::new();
        let _ = args.insert("query".into(), serde_json::json!(query));
        let _ = args.insert("result_label".into(), serde_json::json!(label));
        args
    }

    #[tokio::test]
    async fn execute_sql_returns_table_and_persists_csv() {
        let dir = tempfile::tempdir().unwrap();
        let cap = ExecuteSql::new(
            Arc::new(FixedWarehouse { fail: false }),
            dir.path(),
            60_000,
        );

        let payload = cap
            .invoke(&args("SELECT count(*) AS n FROM orders", "order count"), &InvocationContext::for_tests())
            .await
            .unwrap();
        assert_matches!(
            payload,
            CapabilityPayload::Table { ref label, ref rows, .. }
                if label == "order count" && rows[0][0] == "42"
        );
        assert!(dir.path().join("order_count.csv").exists());
    }

    #[tokio::test]
    async fn execute_sql_rejects_forbidden_query_without_transport_call() {
        let dir = tempfile::tempdir().unwrap();
        let cap = ExecuteSql::new(Arc::new(FixedWarehouse { fail: false }), dir.path(), 60_000);

        let err = cap
            .invoke(&args("DROP TABLE orders", "x"), &InvocationContext::for_tests())
            .await
            .unwrap_err();
        assert_matches!(err, CapabilityError::Validation { .. });
        // Nothing was persisted for a rejected query.
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn execute_sql_propagates_warehouse_failure() {
        let dir = tempfile::tempdir().unwrap();
        let cap = ExecuteSql::new(Arc::new(FixedWarehouse { fail: true }), dir.path(), 60_000);

        let err = cap
            .invoke(&args("SELECT 1", "x"), &InvocationContext::for_tests())
            .await
            .unwrap_err();
        assert_matches!(err, CapabilityError::Query { .. });
    }
}
