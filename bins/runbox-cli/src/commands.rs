// CLI commands for talking to a runbox deployment
use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use std::path::Path;

/// Submit a script file through the gateway and print the outcome.
pub async fn run(file: &Path, gateway: &str) -> Result<()> {
    let code = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let client = reqwest::Client::new();
    // `scrpit` is the gateway's versioned wire field (historic misspelling)
    let response = client
        .post(format!("{}/execute", gateway.trim_end_matches('/')))
        .json(&json!({ "scrpit": code }))
        .send()
        .await
        .context("Failed to reach gateway")?;

    let status = response.status();
    let body: Value = response
        .json()
        .await
        .context("Gateway returned invalid JSON")?;

    if status.is_success() {
        println!(
            "return: {}",
            serde_json::to_string_pretty(&body["return"]).unwrap_or_else(|_| "null".to_string())
        );
        if let Some(stdout) = body["stdout"].as_str() {
            if !stdout.is_empty() {
                println!("stdout:");
                println!("{}", stdout);
            }
        }
        Ok(())
    } else {
        let error = body["error"].as_str().unwrap_or("unknown error");
        eprintln!("✗ Execution failed ({}): {}", status.as_u16(), error);
        if let Some(stdout) = body["stdout"].as_str() {
            if !stdout.is_empty() {
                eprintln!("stdout:");
                eprintln!("{}", stdout);
            }
        }
        bail!("execution failed");
    }
}

/// Hit the gateway's liveness endpoint.
pub async fn health(gateway: &str) -> Result<()> {
    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/health", gateway.trim_end_matches('/')))
        .send()
        .await
        .context("Failed to reach gateway")?;

    if response.status().is_success() {
        println!("✓ Gateway healthy");
        Ok(())
    } else {
        bail!("Gateway returned status {}", response.status().as_u16());
    }
}
