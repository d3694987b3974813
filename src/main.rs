/// main.rs — `volctl`: CLI driver for the volatility service core
///
/// FLOW:
///   1. Load config from .env (ALPHA_API_KEY, DB_PATH, MODEL_DIR)
///   2. Open the SQLite bar store
///   3. `fit`     — wrangle → fit → dump, print the response payload
///      `predict` — load → forecast, print the response payload
///
/// Responses are the same `{success, message, ...}` structures a transport
/// layer would serve, printed as pretty JSON.
use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vol_engine::config::AppConfig;
use vol_engine::service::{FitRequest, PredictRequest, ServiceFacade};
use vol_engine::store::BarStore;

#[derive(Parser)]
#[command(name = "volctl", about = "Fit and serve GARCH volatility models")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fit a GARCH(p,q) model for a ticker and persist the artifact
    Fit {
        #[arg(long)]
        ticker: String,
        /// Fetch a fresh daily history and replace the stored table
        #[arg(long)]
        fresh: bool,
        /// Window of most recent observations to train on
        #[arg(long, default_value_t = 1000)]
        n_observations: u32,
        #[arg(short, default_value_t = 1)]
        p: usize,
        #[arg(short, default_value_t = 1)]
        q: usize,
    },
    /// Forecast volatility from the most recently fitted model
    Predict {
        #[arg(long)]
        ticker: String,
        /// Number of business days to forecast
        #[arg(long, default_value_t = 5)]
        horizon: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let store = BarStore::connect(&config.db_path).await?;
    let facade = ServiceFacade::new(store, config);

    match cli.command {
        Command::Fit {
            ticker,
            fresh,
            n_observations,
            p,
            q,
        } => {
            let response = facade
                .wrangle_then_fit(FitRequest {
                    ticker,
                    use_fresh_data: fresh,
                    n_observations,
                    p,
                    q,
                })
                .await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Predict { ticker, horizon } => {
            let response = facade
                .load_then_predict(PredictRequest { ticker, horizon })
                .await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}
