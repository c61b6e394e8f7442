use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "storefront-cli")]
#[command(about = "Management CLI for the Storefront API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Bearer token from `POST /api/auth/signin`.
    #[arg(short, long)]
    token: Option<String>,

    /// Value for `x-health-check-token`.
    #[arg(long)]
    health_token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check service and store health
    Health,
    /// List products (admin view)
    Products {
        #[arg(long, default_value_t = 1)]
        page: u64,
        #[arg(long, default_value_t = 20)]
        limit: u64,
    },
    /// List categories with product counts
    Categories,
    /// Delete a product by id
    DeleteProduct { id: i64 },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(token) = &cli.token {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}"))?);
    }
    if let Some(token) = &cli.health_token {
        headers.insert("x-health-check-token", HeaderValue::from_str(token)?);
    }

    let request = match cli.command {
        Commands::Health => client.get(format!("{}/api/health", cli.url)),
        Commands::Products { page, limit } => client
            .get(format!("{}/api/admin/products", cli.url))
            .query(&[("page", page), ("limit", limit)]),
        Commands::Categories => client.get(format!("{}/api/categories", cli.url)),
        Commands::DeleteProduct { id } => {
            client.delete(format!("{}/api/admin/products/{id}", cli.url))
        }
    };

    print_response(request.headers(headers).send().await?).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Storefront API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
