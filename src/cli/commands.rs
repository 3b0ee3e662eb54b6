//! CLI command implementations
//!
//! Each command loads configuration, builds the type registry, evaluates a
//! single query script and writes one JSON response to stdout.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value as JsonValue};

use crate::config::EngineConfig;
use crate::observability::Logger;
use crate::query::{EntityStore, RequestContext};
use crate::remote::MemoryChannel;
use crate::types::TypeRegistry;

use super::args::{Command, QueryArgs};
use super::errors::{CliError, CliResult};
use super::io::{read_json_file, write_error, write_response};
use super::script::QueryScript;

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    match run_command(cli.command) {
        Ok(data) => write_response(data),
        Err(e) => {
            write_error(e.code(), &e.to_string())?;
            Err(e)
        }
    }
}

/// Runs one command and returns its response payload
pub fn run_command(cmd: Command) -> CliResult<JsonValue> {
    match cmd {
        Command::Run { query, data } => run_script(&query, &data),
        Command::Explain { query } => explain(&query),
    }
}

/// Evaluates the query script against the rows in `data`
pub fn run_script(args: &QueryArgs, data: &Path) -> CliResult<JsonValue> {
    let config = load_config(args.config.as_deref())?;
    let registry = load_registry(&args.descriptors)?;
    let script: QueryScript = read_json_file(&args.query)?;

    let tables: BTreeMap<String, Vec<JsonValue>> = read_json_file(data)?;
    let channel = MemoryChannel::new();
    for (entity, rows) in tables {
        channel.insert_rows(entity, rows);
    }

    let store = EntityStore::new(Arc::new(channel), registry).with_policy(config.pushdown);
    let ctx = RequestContext::new("RUN", args.query.display().to_string());

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::Io(format!("Failed to create tokio runtime: {}", e)))?;
    let result = runtime.block_on(script.evaluate(&store, &ctx))?;

    let request_id = ctx.request_id.to_string();
    let duration_ms = ctx.elapsed_ms().to_string();
    Logger::info(
        "CLI_RUN_COMPLETE",
        &[("request_id", &request_id), ("duration_ms", &duration_ms)],
    );

    Ok(json!({
        "result": result,
        "metrics": store.metrics().snapshot(),
    }))
}

/// Builds the chain and reports its remote/local split without opening
/// anything
pub fn explain(args: &QueryArgs) -> CliResult<JsonValue> {
    let config = load_config(args.config.as_deref())?;
    let registry = load_registry(&args.descriptors)?;
    let script: QueryScript = read_json_file(&args.query)?;

    let store = EntityStore::new(Arc::new(MemoryChannel::new()), registry)
        .with_policy(config.pushdown);
    let cursor = script.build(&store)?;
    let plan = cursor.explain()?;

    Ok(json!({
        "chain": cursor.node_count(),
        "plan": plan.to_json(),
    }))
}

fn load_config(path: Option<&Path>) -> CliResult<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    config.apply_logging()?;
    Ok(config)
}

fn load_registry(path: &Path) -> CliResult<Arc<TypeRegistry>> {
    let mut registry = TypeRegistry::new();
    if path.is_dir() {
        registry.load_dir(path)?;
    } else {
        registry.load_file(path)?;
    }
    Ok(registry.into_shared()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        args: QueryArgs,
        data: PathBuf,
    }

    fn fixture(script: JsonValue) -> Fixture {
        let dir = TempDir::new().unwrap();
        let descriptors = dir.path().join("descriptors.json");
        fs::write(
            &descriptors,
            json!({
                "name": "Foo",
                "fields": [
                    {"name": "status", "type": "string"},
                    {"name": "rank", "type": "number", "isOptional": true}
                ]
            })
            .to_string(),
        )
        .unwrap();

        let data = dir.path().join("data.json");
        fs::write(
            &data,
            json!({"Foo": [
                {"id": "a", "status": "active", "rank": 2},
                {"id": "b", "status": "idle", "rank": 5},
                {"id": "c", "status": "active", "rank": 7}
            ]})
            .to_string(),
        )
        .unwrap();

        let query = dir.path().join("query.json");
        fs::write(&query, script.to_string()).unwrap();

        Fixture {
            args: QueryArgs {
                descriptors,
                query,
                config: None,
            },
            data,
            _dir: dir,
        }
    }

    #[test]
    fn test_run_reports_result_and_metrics() {
        let fx = fixture(json!({
            "entity": "Foo",
            "steps": [{"filter": {"status": "active"}}, {"take": 1}]
        }));
        let out = run_script(&fx.args, &fx.data).unwrap();
        assert_eq!(out["result"][0]["id"], "a");
        assert_eq!(out["result"].as_array().unwrap().len(), 1);
        assert_eq!(out["metrics"]["remote_queries"], 1);
        assert_eq!(out["metrics"]["rows_returned"], 1);
    }

    #[test]
    fn test_explain_does_not_need_data() {
        let fx = fixture(json!({
            "entity": "Foo",
            "steps": [{"take": 0}, {"filter": {"status": "idle"}}]
        }));
        let out = explain(&fx.args).unwrap();
        assert_eq!(out["chain"], 3);
        assert_eq!(out["plan"]["shortCircuit"], true);
    }

    #[test]
    fn test_unknown_entity_is_query_error() {
        let fx = fixture(json!({"entity": "Bar"}));
        let err = run_script(&fx.args, &fx.data).unwrap_err();
        assert_eq!(err.code(), "ENTIQ_UNKNOWN_ENTITY");
    }

    #[test]
    fn test_missing_script_is_input_error() {
        let mut fx = fixture(json!({"entity": "Foo"}));
        fx.args.query = PathBuf::from("/nonexistent/query.json");
        let err = explain(&fx.args).unwrap_err();
        assert_eq!(err.code(), "ENTIQ_CLI_INPUT");
    }
}
