use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Command-line client for the memory gateway", long_about = None)]
struct Cli {
    #[arg(short, long, env = "GATEWAY_URL", default_value = "http://127.0.0.1:8008")]
    url: String,

    /// Bearer token; not needed from loopback.
    #[arg(short, long, env = "API_KEY")]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway liveness
    Health,
    /// List available tools
    Tools,
    /// Call a tool with JSON arguments
    Call {
        /// Tool name, e.g. memory_search
        name: String,
        /// Arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(key) = cli.key.as_deref().filter(|k| !k.is_empty()) {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {key}"))?);
    }

    match cli.command {
        Commands::Health => {
            let res = client
                .get(format!("{}/health", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Tools => {
            let res = rpc(&client, &cli.url, headers, "tools/list", json!({})).await?;
            let Some(reply) = read_json(res).await? else {
                return Ok(());
            };
            for tool in reply["result"]["tools"].as_array().into_iter().flatten() {
                println!(
                    "{:<20} {}",
                    tool["name"].as_str().unwrap_or_default(),
                    tool["description"].as_str().unwrap_or_default()
                );
            }
        }
        Commands::Call { name, args } => {
            let arguments: Value = serde_json::from_str(&args)?;
            let params = json!({ "name": name, "arguments": arguments });
            let res = rpc(&client, &cli.url, headers, "tools/call", params).await?;
            let Some(reply) = read_json(res).await? else {
                return Ok(());
            };

            if let Some(error) = reply.get("error") {
                eprintln!("RPC error: {}", serde_json::to_string_pretty(error)?);
                std::process::exit(1);
            }
            let result = &reply["result"];
            println!("{}", result["content"][0]["text"].as_str().unwrap_or_default());
            if result["isError"].as_bool().unwrap_or(false) {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

async fn rpc(
    client: &reqwest::Client,
    url: &str,
    headers: HeaderMap,
    method: &str,
    params: Value,
) -> Result<reqwest::Response, reqwest::Error> {
    client
        .post(format!("{url}/mcp"))
        .headers(headers)
        .json(&json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params }))
        .send()
        .await
}

/// Body as JSON, or `None` after reporting a non-success status.
async fn read_json(res: reqwest::Response) -> Result<Option<Value>, Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(None);
    }
    Ok(Some(res.json().await?))
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(json) = read_json(res).await? {
        println!("{}", serde_json::to_string_pretty(&json)?);
    }
    Ok(())
}
