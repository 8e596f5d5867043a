use std::env;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use blocktail::runtime::networks::{load_env_file, DEFAULT_ENV_PATH, DEFAULT_NETWORKS_PATH};
use blocktail::{JsonStdoutSink, NetworkRegistry, Runner, TailerConfig};

const DEFAULT_NETWORK: &str = "base_mainnet";
const DEFAULT_WORKER_COUNT: usize = 16;
const DEFAULT_LOG_DIRECTIVE: &str = "info";

#[tokio::main]
async fn main() -> Result<()> {
    load_env_file(DEFAULT_ENV_PATH)?;
    init_demo_tracing();

    let network = env::args()
        .nth(1)
        .unwrap_or_else(|| read_env_or_default("BLOCKTAIL_NETWORK", DEFAULT_NETWORK));
    let registry_path = read_env_or_default("BLOCKTAIL_NETWORKS", DEFAULT_NETWORKS_PATH);
    let worker_count =
        parse_env_with_default::<usize>("BLOCKTAIL_WORKERS", DEFAULT_WORKER_COUNT)?;
    ensure!(worker_count > 0, "BLOCKTAIL_WORKERS must be greater than 0");

    let registry = NetworkRegistry::load(&registry_path)?;
    let entry = registry.resolve(&network)?;
    let config = TailerConfig::for_network(entry)
        .worker_count(worker_count)
        .build()?;

    let runner = Runner::from_config(config, Arc::new(JsonStdoutSink::new()))?;
    runner.run_until_ctrl_c().await?;
    eprintln!("Monitoring stopped.");
    Ok(())
}

fn init_demo_tracing() {
    if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", DEFAULT_LOG_DIRECTIVE);
    }
    blocktail::init_tracing();
}

fn read_env_or_default(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_owned())
}

fn parse_env_with_default<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("failed to parse {key}")),
        _ => Ok(default),
    }
}
