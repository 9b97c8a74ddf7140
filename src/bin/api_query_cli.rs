//! api-query CLI：查询编排层的命令行演示工具
//!
//! Usage:
//!   api-query-cli fetch <base-url> <path> [--method M] [--input JSON] [--repeat N]
//!   api-query-cli key <path> <method> [JSON]
//!   api-query-cli config [--yaml <file>]

use anyhow::{anyhow, bail, Context};
use api_query::{
    HttpTransport, Method, OrchestratorConfig, Registry, Response, Transport,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let result = match args[1].as_str() {
        "fetch" => cmd_fetch(&args[2..]).await,
        "key" => cmd_key(&args[2..]),
        "config" => cmd_config(&args[2..]),
        "version" | "--version" | "-V" => {
            println!("api-query-cli {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn print_usage() {
    println!(
        r#"api-query-cli: request orchestration demo

USAGE:
    api-query-cli <COMMAND> [OPTIONS]

COMMANDS:
    fetch <base-url> <path>     Issue concurrent requests through one query
        --method <M>            HTTP method (default GET)
        --input <JSON>          Query input (default {{}})
        --repeat <N>            Concurrent callers (default 3)
    key <path> <method> [JSON]  Print the cache and batch keys for an input
    config [--yaml <file>]      Print the effective configuration
    version                     Show version information
    help                        Show this help message

ENVIRONMENT:
    API_QUERY_*                 Configuration overrides (see `config`)
    API_QUERY_BEARER_TOKEN      Bearer token for HTTP requests
    RUST_LOG                    Log filter, e.g. api_query=debug"#
    );
}

/// Counts transport calls so the demo can show deduplication.
struct Counting {
    inner: HttpTransport,
    calls: AtomicUsize,
}

#[async_trait]
impl Transport for Counting {
    async fn request(&self, path: &str, method: &Method, input: &Value) -> api_query::Result<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.request(path, method, input).await
    }
}

fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn parse_method(raw: &str) -> anyhow::Result<Method> {
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
        .map_err(|_| anyhow!("invalid HTTP method: {raw}"))
}

fn parse_input(raw: Option<&str>) -> anyhow::Result<Value> {
    match raw {
        Some(s) => serde_json::from_str(s).context("input is not valid JSON"),
        None => Ok(Value::Object(Default::default())),
    }
}

async fn cmd_fetch(args: &[String]) -> anyhow::Result<()> {
    let (base_url, path) = match args {
        [base, path, ..] => (base.as_str(), path.as_str()),
        _ => bail!("usage: fetch <base-url> <path> [--method M] [--input JSON] [--repeat N]"),
    };
    let method = parse_method(flag(args, "--method").unwrap_or("GET"))?;
    let input = parse_input(flag(args, "--input"))?;
    let repeat: usize = flag(args, "--repeat")
        .map(str::parse::<usize>)
        .transpose()
        .context("--repeat must be a number")?
        .unwrap_or(3);

    let transport = Arc::new(Counting {
        inner: HttpTransport::new(base_url)?,
        calls: AtomicUsize::new(0),
    });
    let registry = Registry::builder()
        .transport(transport.clone())
        .config(OrchestratorConfig::from_env())
        .build()?;

    let query = registry.query(path, method, &input)?;
    let results = futures::future::join_all((0..repeat.max(1)).map(|_| query.request())).await;
    for (i, r) in results.iter().enumerate() {
        match r {
            Ok(resp) => println!("caller {i}: HTTP {} ok={}", resp.status, resp.ok),
            Err(e) => println!("caller {i}: error: {e}"),
        }
    }

    // Served from the cache while fresh.
    query.request().await?;

    println!("status: {}", query.status());
    if let Some(data) = query.data() {
        println!("data: {}", serde_json::to_string_pretty(&data)?);
    }
    if let Some(err) = query.error_data() {
        println!("error_data: {}", serde_json::to_string_pretty(&err)?);
    }
    println!(
        "transport calls: {} for {} callers",
        transport.calls.load(Ordering::SeqCst),
        repeat.max(1) + 1
    );
    Ok(())
}

fn cmd_key(args: &[String]) -> anyhow::Result<()> {
    let (path, method) = match args {
        [path, method, ..] => (path.as_str(), parse_method(method)?),
        _ => bail!("usage: key <path> <method> [JSON]"),
    };
    let input = parse_input(args.get(2).map(String::as_str))?;
    let endpoint = api_query::Endpoint::new(path, method);
    println!("batch key: {}", endpoint.batch_key());
    println!("cache key: {}", endpoint.cache_key(&input));
    Ok(())
}

fn cmd_config(args: &[String]) -> anyhow::Result<()> {
    let cfg = match flag(args, "--yaml") {
        Some(file) => {
            let raw = std::fs::read_to_string(file).with_context(|| format!("reading {file}"))?;
            OrchestratorConfig::from_yaml_str(&raw)?.with_overrides(|k| std::env::var(k).ok())
        }
        None => OrchestratorConfig::from_env(),
    };
    println!("{}", serde_yaml::to_string(&cfg)?);
    Ok(())
}
