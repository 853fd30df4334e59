use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Management CLI for scoped-proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    /// Admin API key, if the proxy requires one.
    #[arg(short, long)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check proxy status
    Status,
    /// List plugin and rule factories
    Catalog,
    /// List instances with their scopes
    Instances,
    /// Create an instance
    CreateInstance {
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// Remove an instance and everything in it
    RemoveInstance { instance: String },
    /// List the scopes of an instance
    Scopes { instance: String },
    /// Create a scope in an instance
    CreateScope { instance: String, name: String },
    /// Remove a scope
    RemoveScope { instance: String, scope: String },
    /// List the plugins of a scope
    Plugins { instance: String, scope: String },
    /// Attach a plugin to a scope
    AddPlugin {
        instance: String,
        scope: String,
        /// Factory name, see `catalog`
        name: String,
        /// JSON configuration object
        #[arg(short, long, default_value = "{}")]
        config: String,
        /// JSON metadata object
        #[arg(short, long, default_value = "{}")]
        metadata: String,
    },
    /// Enable a plugin
    EnablePlugin { instance: String, scope: String, plugin: String },
    /// Disable a plugin without removing it
    DisablePlugin { instance: String, scope: String, plugin: String },
    /// Remove a plugin
    RemovePlugin { instance: String, scope: String, plugin: String },
    /// List the rules of a scope
    Rules { instance: String, scope: String },
    /// Add a rule to a scope
    AddRule {
        instance: String,
        scope: String,
        /// Factory name, see `catalog`
        name: String,
        /// JSON configuration object
        #[arg(short, long, default_value = "{}")]
        config: String,
    },
    /// Remove a rule
    RemoveRule { instance: String, scope: String, rule: String },
}

fn scope_path(instance: &str, scope: &str) -> String {
    format!("/instances/{instance}/scopes/{scope}")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {key}"))?);
    }

    let (method, path, body) = match cli.command {
        Commands::Status => (Method::GET, "/".to_string(), None),
        Commands::Catalog => (Method::GET, "/catalog".to_string(), None),
        Commands::Instances => (Method::GET, "/instances".to_string(), None),
        Commands::CreateInstance { name, description } => (
            Method::POST,
            "/instances".to_string(),
            Some(json!({ "name": name, "description": description })),
        ),
        Commands::RemoveInstance { instance } => {
            (Method::DELETE, format!("/instances/{instance}"), None)
        }
        Commands::Scopes { instance } => {
            (Method::GET, format!("/instances/{instance}/scopes"), None)
        }
        Commands::CreateScope { instance, name } => (
            Method::POST,
            format!("/instances/{instance}/scopes"),
            Some(json!({ "name": name })),
        ),
        Commands::RemoveScope { instance, scope } => {
            (Method::DELETE, scope_path(&instance, &scope), None)
        }
        Commands::Plugins { instance, scope } => (
            Method::GET,
            format!("{}/plugins", scope_path(&instance, &scope)),
            None,
        ),
        Commands::AddPlugin {
            instance,
            scope,
            name,
            config,
            metadata,
        } => {
            let config: Value = serde_json::from_str(&config)?;
            let metadata: Value = serde_json::from_str(&metadata)?;
            (
                Method::POST,
                format!("{}/plugins", scope_path(&instance, &scope)),
                Some(json!({ "name": name, "config": config, "metadata": metadata })),
            )
        }
        Commands::EnablePlugin {
            instance,
            scope,
            plugin,
        } => (
            Method::PATCH,
            format!("{}/plugins/{plugin}", scope_path(&instance, &scope)),
            Some(json!({ "enabled": true })),
        ),
        Commands::DisablePlugin {
            instance,
            scope,
            plugin,
        } => (
            Method::PATCH,
            format!("{}/plugins/{plugin}", scope_path(&instance, &scope)),
            Some(json!({ "enabled": false })),
        ),
        Commands::RemovePlugin {
            instance,
            scope,
            plugin,
        } => (
            Method::DELETE,
            format!("{}/plugins/{plugin}", scope_path(&instance, &scope)),
            None,
        ),
        Commands::Rules { instance, scope } => (
            Method::GET,
            format!("{}/rules", scope_path(&instance, &scope)),
            None,
        ),
        Commands::AddRule {
            instance,
            scope,
            name,
            config,
        } => {
            let config: Value = serde_json::from_str(&config)?;
            (
                Method::POST,
                format!("{}/rules", scope_path(&instance, &scope)),
                Some(json!({ "name": name, "config": config })),
            )
        }
        Commands::RemoveRule {
            instance,
            scope,
            rule,
        } => (
            Method::DELETE,
            format!("{}/rules/{rule}", scope_path(&instance, &scope)),
            None,
        ),
    };

    let mut request = client
        .request(method, format!("{}{}", cli.url.trim_end_matches('/'), path))
        .headers(headers);
    if let Some(body) = body {
        request = request.json(&body);
    }
    print_response(request.send().await?).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }
    if status == reqwest::StatusCode::NO_CONTENT {
        println!("OK");
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
