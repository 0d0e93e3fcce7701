//! Perfscope CLI - Command-line interface for the Perfscope daemon

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9527";
const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "perfscope")]
#[command(about = "Website performance analysis CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "PERFSCOPE_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,

    /// Print raw JSON instead of tables
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an analysis job
    Analyze {
        /// Main site URL
        url: String,

        /// Competitor URL (repeatable, up to 5)
        #[arg(short, long = "competitor")]
        competitors: Vec<String>,

        /// Wait for the job to finish and print its results
        #[arg(short, long)]
        wait: bool,
    },

    /// Show job progress
    Status {
        /// Job ID
        job_id: String,
    },

    /// Show the results of a finished job
    Results {
        /// Job ID
        job_id: String,
    },

    /// Download the rendered report of a finished job
    Report {
        /// Job ID
        job_id: String,

        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Cancel (if running) and delete a job
    Delete {
        /// Job ID
        job_id: String,
    },

    /// Check the daemon
    Health,
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Deserialize, Tabled)]
struct StatusRow {
    job_id: String,
    status: String,
    progress: u8,
    current_step: String,
}

#[derive(Tabled)]
struct RankingRow {
    rank: usize,
    url: String,
    score: String,
}

#[derive(Tabled)]
struct RecommendationRow {
    priority: String,
    category: String,
    title: String,
    impact: String,
}

#[derive(Tabled)]
struct ErrorRow {
    adapter: String,
    target: String,
    error: String,
}

struct RpcClient {
    url: String,
    http: reqwest::Client,
}

impl RpcClient {
    fn new(url: String) -> Self {
        Self {
            url,
            http: reqwest::Client::new(),
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: 1,
        };

        let response: JsonRpcResponse = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .context("Failed to connect to daemon")?
            .json()
            .await
            .context("Failed to parse response")?;

        if let Some(error) = response.error {
            anyhow::bail!("RPC error ({}): {}", error.code, error.message);
        }

        response
            .result
            .ok_or_else(|| anyhow::anyhow!("No result in response"))
    }
}

fn status_label(status: &str) -> colored::ColoredString {
    match status {
        "COMPLETED" => status.green().bold(),
        "FAILED" => status.red().bold(),
        "RUNNING" => status.cyan(),
        _ => status.yellow(),
    }
}

fn ranking_rows(results: &Value) -> Vec<RankingRow> {
    results["aggregated"]["ranking"]
        .as_array()
        .map(|ranking| {
            ranking
                .iter()
                .map(|entry| RankingRow {
                    rank: entry["rank"].as_u64().unwrap_or(0) as usize,
                    url: entry["target"].as_str().unwrap_or_default().to_string(),
                    score: entry["score"]
                        .as_f64()
                        .map(|s| format!("{:.1}", s))
                        .unwrap_or_else(|| "-".to_string()),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn recommendation_rows(results: &Value) -> Vec<RecommendationRow> {
    results["recommendations"]
        .as_array()
        .map(|recs| {
            recs.iter()
                .map(|r| RecommendationRow {
                    priority: r["priority"].as_str().unwrap_or_default().to_uppercase(),
                    category: r["category"].as_str().unwrap_or_default().to_string(),
                    title: r["title"].as_str().unwrap_or_default().to_string(),
                    impact: r["impact"].as_str().unwrap_or_default().to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn error_rows(results: &Value) -> Vec<ErrorRow> {
    results["errors"]
        .as_array()
        .map(|errors| {
            errors
                .iter()
                .map(|e| ErrorRow {
                    adapter: e["source"].as_str().unwrap_or_default().to_string(),
                    target: e["target"].as_str().unwrap_or_default().to_string(),
                    error: e["message"].as_str().unwrap_or_default().to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn print_results(results: &Value) {
    let status = results["status"].as_str().unwrap_or_default();
    println!(
        "{} {} {}",
        "Job".bold(),
        results["job_id"].as_str().unwrap_or_default(),
        status_label(status)
    );
    if let Some(reason) = results["failure_reason"].as_str() {
        println!("  {} {}", "Failure:".bold(), reason.red());
    }

    let summary = &results["aggregated"]["summary"];
    if summary.is_object() {
        println!();
        println!("  {} {}", "Overall:".bold(), summary["overall"].as_str().unwrap_or_default());
        println!("  {} {}", "Ranking:".bold(), summary["ranking"].as_str().unwrap_or_default());
        println!("  {} {}", "Key metrics:".bold(), summary["key_metrics"].as_str().unwrap_or_default());
    }

    let ranking = ranking_rows(results);
    if !ranking.is_empty() {
        println!();
        println!("{}", "Ranking".cyan().bold());
        println!("{}", Table::new(ranking));
    }

    let recommendations = recommendation_rows(results);
    if !recommendations.is_empty() {
        println!();
        println!("{}", "Recommendations".cyan().bold());
        println!("{}", Table::new(recommendations));
    }

    let errors = error_rows(results);
    if !errors.is_empty() {
        println!();
        println!("{}", format!("Adapter errors ({})", errors.len()).yellow().bold());
        println!("{}", Table::new(errors));
    }

    if let Some(location) = results["report"]["location"].as_str() {
        println!();
        println!("  {} {}", "Report:".bold(), location);
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Report body as written to disk: pretty JSON, or the raw text
fn report_text(report: &Value) -> Result<String> {
    match &report["document"] {
        Value::String(text) if report["format"] != "json" => Ok(text.clone()),
        Value::Null => anyhow::bail!("No document in report response"),
        document => Ok(serde_json::to_string_pretty(document)?),
    }
}

async fn wait_for(client: &RpcClient, job_id: &str) -> Result<()> {
    let mut last_progress = None;
    loop {
        let status = client
            .call("analysis.status.v1", json!({ "job_id": job_id }))
            .await?;
        let row: StatusRow = serde_json::from_value(status)?;
        if last_progress != Some(row.progress) {
            println!("  [{:>3}%] {}", row.progress, row.current_step);
            last_progress = Some(row.progress);
        }
        if row.status == "COMPLETED" || row.status == "FAILED" {
            return Ok(());
        }
        tokio::time::sleep(WAIT_POLL_INTERVAL).await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = RpcClient::new(cli.rpc_url.clone());

    match cli.command {
        Commands::Analyze {
            url,
            competitors,
            wait,
        } => {
            let params = json!({
                "main_url": url,
                "competitor_urls": competitors,
            });
            let created = client.call("analysis.create.v1", params).await?;
            let job_id = created["job_id"]
                .as_str()
                .context("No job_id in response")?
                .to_string();

            if !wait {
                if cli.json {
                    return print_json(&created);
                }
                println!("{}", "✓ Analysis started".green().bold());
                println!("  {} {}", "Job ID:".bold(), job_id);
                return Ok(());
            }

            if !cli.json {
                println!("{} {}", "Analyzing".cyan().bold(), url);
            }
            wait_for(&client, &job_id).await?;
            let results = client
                .call("analysis.results.v1", json!({ "job_id": job_id }))
                .await?;
            if cli.json {
                print_json(&results)?;
            } else {
                println!();
                print_results(&results);
            }
        }

        Commands::Status { job_id } => {
            let status = client
                .call("analysis.status.v1", json!({ "job_id": job_id }))
                .await?;
            if cli.json {
                return print_json(&status);
            }
            let row: StatusRow = serde_json::from_value(status)?;
            println!("{}", Table::new(vec![row]));
        }

        Commands::Results { job_id } => {
            let results = client
                .call("analysis.results.v1", json!({ "job_id": job_id }))
                .await?;
            if cli.json {
                return print_json(&results);
            }
            print_results(&results);
        }

        Commands::Report { job_id, output } => {
            let report = client
                .call("analysis.report.v1", json!({ "job_id": job_id }))
                .await?;
            let text = report_text(&report)?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, text.as_bytes())
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!(
                        "{}",
                        format!("✓ Report saved to {}", path.display()).green().bold()
                    );
                }
                None => println!("{}", text),
            }
        }

        Commands::Delete { job_id } => {
            client
                .call("analysis.delete.v1", json!({ "job_id": job_id }))
                .await?;
            println!("{}", format!("✓ Job {} deleted", job_id).green().bold());
        }

        Commands::Health => match client.call("admin.health.v1", json!({})).await {
            Ok(health) => {
                if cli.json {
                    return print_json(&health);
                }
                println!("  {} {}", "RPC URL:".bold(), cli.rpc_url);
                println!("  {} {}", "Status:".bold(), "ONLINE".green());
                println!("  {} {}", "Version:".bold(), health["version"]);
                println!("  {} {}", "Active jobs:".bold(), health["active_jobs"]);
            }
            Err(e) => {
                println!("  {} {}", "Status:".bold(), "ERROR".red());
                println!("  {} {}", "Error:".bold(), e);
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_analyze_collects_competitors() {
        let cli = Cli::try_parse_from([
            "perfscope",
            "analyze",
            "https://a.example",
            "-c",
            "https://b.example",
            "--competitor",
            "https://c.example",
            "--wait",
        ])
        .unwrap();
        match cli.command {
            Commands::Analyze {
                url,
                competitors,
                wait,
            } => {
                assert_eq!(url, "https://a.example");
                assert_eq!(competitors.len(), 2);
                assert!(wait);
            }
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn test_rows_from_results() {
        let results = json!({
            "aggregated": {"ranking": [
                {"rank": 1, "target": "https://c.example", "score": 95.0},
                {"rank": 2, "target": "https://a.example", "score": 80.0}
            ]},
            "recommendations": [
                {"priority": "high", "category": "Images", "title": "Serve AVIF", "impact": "LCP -30%"}
            ],
            "errors": []
        });
        let ranking = ranking_rows(&results);
        assert_eq!(ranking.len(), 2);
        assert_eq!(ranking[0].url, "https://c.example");
        assert_eq!(ranking[1].score, "80.0");

        let recs = recommendation_rows(&results);
        assert_eq!(recs[0].priority, "HIGH");
        assert!(error_rows(&results).is_empty());
        assert!(ranking_rows(&json!({})).is_empty());
    }

    #[test]
    fn test_report_output_flag() {
        let cli =
            Cli::try_parse_from(["perfscope", "report", "job-1", "-o", "report.json"]).unwrap();
        match cli.command {
            Commands::Report { job_id, output } => {
                assert_eq!(job_id, "job-1");
                assert_eq!(output, Some(PathBuf::from("report.json")));
            }
            _ => panic!("expected report"),
        }
    }

    #[test]
    fn test_report_text() {
        let json_report = json!({"format": "json", "document": {"job": {"id": "job-1"}}});
        let text = report_text(&json_report).unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["job"]["id"], "job-1");

        let html_report = json!({"format": "html", "document": "<html></html>"});
        assert_eq!(report_text(&html_report).unwrap(), "<html></html>");

        assert!(report_text(&json!({"format": "json"})).is_err());
    }
}
