//! Daemon configuration
//!
//! Everything is read from the environment once at startup. Empty values
//! count as unset so `FOO=` behaves like a missing credential.

use anyhow::{bail, Context, Result};
use perfscope_core::application::constants::{
    DEFAULT_BROWSER_POOL_SIZE, DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT, DEFAULT_PRIMARY_METRIC,
};
use perfscope_core::application::ExecutionMode;
use perfscope_core::port::Viewport;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_DB_PATH: &str = "~/.perfscope/jobs.db";
const DEFAULT_REPORTS_DIR: &str = "~/.perfscope/reports";
const DEFAULT_SCREENSHOTS_DIR: &str = "~/.perfscope/screenshots";
const DEFAULT_CHROMIUM: &str = "chromium";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    Sqlite(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct WebPageTestConfig {
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct GtMetrixConfig {
    pub base_url: String,
    pub username: Option<String>,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_format: LogFormat,
    pub store: StoreKind,
    pub rpc_host: String,
    pub rpc_port: u16,
    pub execution_mode: ExecutionMode,
    pub primary_metric: String,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub browser_pool_size: usize,
    pub max_body_bytes: usize,
    pub screenshots: bool,
    pub viewports: Vec<Viewport>,
    pub chromium_binary: PathBuf,
    pub reports_dir: PathBuf,
    pub screenshots_dir: PathBuf,
    pub webpagetest: Option<WebPageTestConfig>,
    pub gtmetrix: Option<GtMetrixConfig>,
    pub openai: Option<OpenAiConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (tests pass a map)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let log_format = match get("PERFSCOPE_LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => bail!("PERFSCOPE_LOG_FORMAT must be json or pretty, got {}", other),
        };

        let store = match get("PERFSCOPE_STORE").as_deref() {
            Some("memory") => StoreKind::Memory,
            None | Some("sqlite") => StoreKind::Sqlite(expand(
                &get("PERFSCOPE_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            )),
            Some(other) => bail!("PERFSCOPE_STORE must be memory or sqlite, got {}", other),
        };

        let execution_mode = match get("PERFSCOPE_EXECUTION_MODE") {
            Some(raw) => ExecutionMode::from_str(&raw).context("PERFSCOPE_EXECUTION_MODE")?,
            None => ExecutionMode::Parallel,
        };

        let viewports = match get("PERFSCOPE_VIEWPORTS") {
            Some(raw) => raw
                .split(',')
                .map(|spec| {
                    Viewport::parse(spec)
                        .with_context(|| format!("invalid viewport '{}' (name:WIDTHxHEIGHT)", spec))
                })
                .collect::<Result<Vec<_>>>()?,
            None => Viewport::defaults(),
        };

        let browser_pool_size = parse_or(&get, "PERFSCOPE_BROWSER_POOL_SIZE", DEFAULT_BROWSER_POOL_SIZE)?;
        if browser_pool_size == 0 {
            bail!("PERFSCOPE_BROWSER_POOL_SIZE must be at least 1");
        }

        let webpagetest = get("WEBPAGETEST_API_KEY").map(|api_key| WebPageTestConfig {
            base_url: get("PERFSCOPE_WEBPAGETEST_URL").unwrap_or_else(|| {
                perfscope_infra_providers::webpagetest::DEFAULT_BASE_URL.to_string()
            }),
            api_key,
        });
        let gtmetrix = get("GTMETRIX_API_KEY").map(|api_key| GtMetrixConfig {
            base_url: get("PERFSCOPE_GTMETRIX_URL").unwrap_or_else(|| {
                perfscope_infra_providers::gtmetrix::DEFAULT_BASE_URL.to_string()
            }),
            username: get("GTMETRIX_API_USERNAME"),
            api_key,
        });
        let openai = get("OPENAI_API_KEY").map(|api_key| OpenAiConfig {
            base_url: get("PERFSCOPE_OPENAI_BASE_URL").unwrap_or_else(|| {
                perfscope_infra_providers::openai_recommender::DEFAULT_BASE_URL.to_string()
            }),
            api_key,
            model: get("PERFSCOPE_OPENAI_MODEL").unwrap_or_else(|| {
                perfscope_infra_providers::openai_recommender::DEFAULT_MODEL.to_string()
            }),
        });

        Ok(Self {
            log_format,
            store,
            rpc_host: get("PERFSCOPE_RPC_HOST")
                .unwrap_or_else(|| perfscope_api_rpc::server::DEFAULT_RPC_HOST.to_string()),
            rpc_port: parse_or(&get, "PERFSCOPE_RPC_PORT", perfscope_api_rpc::server::DEFAULT_RPC_PORT)?,
            execution_mode,
            primary_metric: get("PERFSCOPE_PRIMARY_METRIC")
                .unwrap_or_else(|| DEFAULT_PRIMARY_METRIC.to_string()),
            poll_interval: Duration::from_secs(parse_or(
                &get,
                "PERFSCOPE_POLL_INTERVAL_SECS",
                DEFAULT_POLL_INTERVAL.as_secs(),
            )?),
            poll_timeout: Duration::from_secs(parse_or(
                &get,
                "PERFSCOPE_POLL_TIMEOUT_SECS",
                DEFAULT_POLL_TIMEOUT.as_secs(),
            )?),
            browser_pool_size,
            max_body_bytes: parse_or(
                &get,
                "PERFSCOPE_MAX_BODY_BYTES",
                perfscope_infra_providers::http_probe::DEFAULT_MAX_BODY_BYTES,
            )?,
            screenshots: parse_or(&get, "PERFSCOPE_SCREENSHOTS", true)?,
            viewports,
            chromium_binary: expand(
                &get("PERFSCOPE_CHROMIUM").unwrap_or_else(|| DEFAULT_CHROMIUM.to_string()),
            ),
            reports_dir: expand(
                &get("PERFSCOPE_REPORTS_DIR").unwrap_or_else(|| DEFAULT_REPORTS_DIR.to_string()),
            ),
            screenshots_dir: expand(
                &get("PERFSCOPE_SCREENSHOTS_DIR")
                    .unwrap_or_else(|| DEFAULT_SCREENSHOTS_DIR.to_string()),
            ),
            webpagetest,
            gtmetrix,
            openai,
        })
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: '{}'", key, raw)),
        None => Ok(default),
    }
}
