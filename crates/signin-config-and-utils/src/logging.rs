//! Logging initialization for the sign-in workers.
//!
//! Every worker writes structured JSONL to `~/.rewards-signin/logs/worker.jsonl`
//! through the observability crate, with sensitive fields redacted.

/// Service name stamped on every log line.
const SERVICE_NAME: &str = "signin-worker";

/// Initialize the logging system for a worker.
///
/// Sets up tracing with:
/// - Structured JSONL output to `~/.rewards-signin/logs/worker.jsonl`
/// - Log level from RUST_LOG env var or the provided default
/// - A compact stderr mirror for foreground runs
///
/// ```ignore
/// init_logging("info");
/// tracing::info!(stage = "WORKER", "worker started");
/// ```
pub fn init_logging(level: &str) {
    init_logging_for_service(SERVICE_NAME, level);
}

/// Initialize logging with a custom service name.
///
/// Use this when several worker shards share the central log stream.
pub fn init_logging_for_service(service_name: &str, level: &str) {
    observability::init_with_config(observability::LogConfig {
        service_name: service_name.into(),
        default_level: parse_level(level).to_string().to_ascii_lowercase(),
        also_stderr: true,
        ..Default::default()
    });
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_level_all_variants() {
        assert_eq!(parse_level("trace"), tracing::Level::TRACE);
        assert_eq!(parse_level("debug"), tracing::Level::DEBUG);
        assert_eq!(parse_level("info"), tracing::Level::INFO);
        assert_eq!(parse_level("warn"), tracing::Level::WARN);
        assert_eq!(parse_level("warning"), tracing::Level::WARN);
        assert_eq!(parse_level("error"), tracing::Level::ERROR);
    }

    #[test]
    fn parse_level_case_insensitive() {
        assert_eq!(parse_level("Debug"), tracing::Level::DEBUG);
        assert_eq!(parse_level("WARNING"), tracing::Level::WARN);
    }

    #[test]
    fn parse_level_unknown_defaults_to_info() {
        assert_eq!(parse_level(""), tracing::Level::INFO);
        assert_eq!(parse_level("verbose"), tracing::Level::INFO);
    }

    #[test]
    fn level_renders_as_filter_directive() {
        assert_eq!(parse_level("WARNING").to_string().to_ascii_lowercase(), "warn");
    }
}
