/// service.rs — Service-facing operations over the engine
///
/// Translates plain fit/predict requests into engine lifecycle calls and
/// every `EngineError` into a `{success: false, message}` payload. The
/// response echoes the request fields, so transport layers can return it
/// as-is. Nothing in here panics or crashes the process.
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::AppConfig;
use crate::data::AlphaVantageClient;
use crate::engine::{ForecastPoint, VolatilityEngine};
use crate::error::Result;
use crate::optimize::NelderMeadOptimizer;
use crate::store::BarStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitRequest {
    pub ticker: String,
    pub use_fresh_data: bool,
    pub n_observations: u32,
    pub p: usize,
    pub q: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResponse {
    pub ticker: String,
    pub use_fresh_data: bool,
    pub n_observations: u32,
    pub p: usize,
    pub q: usize,
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub ticker: String,
    pub horizon: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub ticker: String,
    pub horizon: u32,
    pub forecast: Vec<ForecastPoint>,
    pub success: bool,
    pub message: String,
}

pub struct ServiceFacade {
    store: BarStore,
    config: AppConfig,
}

impl ServiceFacade {
    pub fn new(store: BarStore, config: AppConfig) -> Self {
        Self { store, config }
    }

    /// One engine per request and ticker, sharing the pooled store handle.
    fn engine(&self, ticker: &str) -> VolatilityEngine {
        let fetcher = AlphaVantageClient::new(
            &self.config.alpha_base_url,
            &self.config.alpha_api_key,
            &self.config.output_size,
        );
        VolatilityEngine::new(ticker, self.store.clone(), fetcher, &self.config.model_dir)
            .with_optimizer(Box::new(NelderMeadOptimizer::new(self.config.max_fit_iters)))
    }

    /// Wrangle → fit → dump. A successful response names the artifact;
    /// any failure along the path becomes `{success: false, message}`.
    pub async fn wrangle_then_fit(&self, request: FitRequest) -> FitResponse {
        let engine = self.engine(&request.ticker);
        let outcome: Result<String> = async {
            let series = engine
                .wrangle_data(request.n_observations, request.use_fresh_data)
                .await?;
            let model = engine.fit(&series, request.p, request.q)?;
            let path = engine.dump(&model)?;
            Ok(format!("trained and saved '{}'", path.display()))
        }
        .await;

        let (success, message) = match outcome {
            Ok(message) => (true, message),
            Err(e) => {
                warn!(ticker = %request.ticker, error = %e, "fit request failed");
                (false, e.to_string())
            }
        };
        FitResponse {
            ticker: request.ticker,
            use_fresh_data: request.use_fresh_data,
            n_observations: request.n_observations,
            p: request.p,
            q: request.q,
            success,
            message,
        }
    }

    /// Load the most recent fitted model and forecast volatility. On
    /// failure the forecast is empty and the message says why.
    pub async fn load_then_predict(&self, request: PredictRequest) -> PredictResponse {
        let engine = self.engine(&request.ticker);
        let outcome: Result<Vec<ForecastPoint>> = (|| {
            let model = engine.load()?;
            engine.predict_volatility(&model, request.horizon)
        })();

        let (forecast, success, message) = match outcome {
            Ok(forecast) => (forecast, true, String::new()),
            Err(e) => {
                warn!(ticker = %request.ticker, error = %e, "predict request failed");
                (Vec::new(), false, e.to_string())
            }
        };
        PredictResponse {
            ticker: request.ticker,
            horizon: request.horizon,
            forecast,
            success,
            message,
        }
    }
}
