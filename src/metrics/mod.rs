//! Metrics
//!
//! Counters and histograms emitted through the `metrics` facade. Nothing is
//! recorded unless the application installs a recorder
//! (e.g. `metrics-exporter-prometheus`).

/// Metric and label names
pub mod labels {
    /// Label key: authentication plugin
    pub const PLUGIN: &str = "plugin";

    /// Label key: outcome of an operation (`success`, `error`, ...)
    pub const OUTCOME: &str = "outcome";

    /// Label key: failure reason
    pub const REASON: &str = "reason";

    /// Outcome value for a successful operation
    pub const OUTCOME_SUCCESS: &str = "success";

    /// Outcome value for an operation rejected by the server
    pub const OUTCOME_SERVER_ERROR: &str = "server_error";

    /// Outcome value for an operation that failed on the connection
    pub const OUTCOME_CONNECTION_ERROR: &str = "connection_error";

    /// Outcome value for an operation that timed out
    pub const OUTCOME_TIMEOUT: &str = "timeout";
}

/// Counters
pub mod counters {
    use super::labels;

    /// A connection finished authentication
    pub fn connection_opened() {
        metrics::counter!("mariadb_wire_connections_opened_total").increment(1);
    }

    /// A connection was closed explicitly
    pub fn connection_closed() {
        metrics::counter!("mariadb_wire_connections_closed_total").increment(1);
    }

    /// Opening a connection failed
    pub fn connection_failed(reason: &'static str) {
        metrics::counter!(
            "mariadb_wire_connections_failed_total",
            labels::REASON => reason
        )
        .increment(1);
    }

    /// An auth plugin was used
    pub fn auth_attempted(plugin: &'static str) {
        metrics::counter!(
            "mariadb_wire_auth_attempted_total",
            labels::PLUGIN => plugin
        )
        .increment(1);
    }

    /// Authentication succeeded
    pub fn auth_successful(plugin: &'static str) {
        metrics::counter!(
            "mariadb_wire_auth_successful_total",
            labels::PLUGIN => plugin
        )
        .increment(1);
    }

    /// Authentication failed
    pub fn auth_failed(plugin: &'static str, reason: &'static str) {
        metrics::counter!(
            "mariadb_wire_auth_failed_total",
            labels::PLUGIN => plugin,
            labels::REASON => reason
        )
        .increment(1);
    }

    /// A command finished
    pub fn query_completed(outcome: &'static str) {
        metrics::counter!(
            "mariadb_wire_queries_total",
            labels::OUTCOME => outcome
        )
        .increment(1);
    }
}

/// Histograms
pub mod histograms {
    use super::labels;

    /// Time from TCP connect to authenticated, in milliseconds
    pub fn connect_duration(duration_ms: u64) {
        metrics::histogram!("mariadb_wire_connect_duration_ms").record(duration_ms as f64);
    }

    /// Time spent in the authentication exchange, in milliseconds
    pub fn auth_duration(plugin: &'static str, duration_ms: u64) {
        metrics::histogram!(
            "mariadb_wire_auth_duration_ms",
            labels::PLUGIN => plugin
        )
        .record(duration_ms as f64);
    }

    /// Time for one command round trip, in milliseconds
    pub fn query_duration(duration_ms: u64) {
        metrics::histogram!("mariadb_wire_query_duration_ms").record(duration_ms as f64);
    }

    /// Rows returned by one query
    pub fn rows_returned(rows: usize) {
        metrics::histogram!("mariadb_wire_rows_returned").record(rows as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        counters::connection_opened();
        counters::connection_failed("io");
        counters::auth_attempted("mysql_native_password");
        counters::auth_failed("mysql_native_password", labels::OUTCOME_SERVER_ERROR);
        counters::query_completed(labels::OUTCOME_SUCCESS);
        histograms::connect_duration(12);
        histograms::auth_duration("caching_sha2_password", 3);
        histograms::query_duration(1);
        histograms::rows_returned(1);
        counters::connection_closed();
    }
}
