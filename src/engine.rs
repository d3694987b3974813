/// engine.rs — Volatility model lifecycle manager
///
/// Owns the full path from raw price history to a fitted GARCH model to
/// multi-step forecasts, plus the artifact persistence that lets a fitted
/// model survive process restarts:
///
///   wrangle_data → fit → dump          (train path)
///   load → predict_volatility          (serve path)
///
/// One engine instance per request and ticker; the store handle is passed
/// in per invocation so the core holds no global mutable state.
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate, NaiveDateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::data::{percentage_returns, AlphaVantageClient, ReturnSeries};
use crate::error::{EngineError, Result};
use crate::models::garch::{self, FittedModel};
use crate::optimize::{NelderMeadOptimizer, Optimizer};
use crate::store::{BarStore, ConflictPolicy};

/// Timestamp encoding inside artifact filenames: sortable to millisecond
/// precision, e.g. `AAPL_20240105T143000123.json`.
const ARTIFACT_TS_FORMAT: &str = "%Y%m%dT%H%M%S%3f";

/// One forecast step: forward business date and predicted conditional
/// standard deviation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub sigma: f64,
}

pub struct VolatilityEngine {
    ticker: String,
    store: BarStore,
    fetcher: AlphaVantageClient,
    model_dir: PathBuf,
    optimizer: Box<dyn Optimizer + Send + Sync>,
}

impl VolatilityEngine {
    pub fn new(
        ticker: impl Into<String>,
        store: BarStore,
        fetcher: AlphaVantageClient,
        model_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            store,
            fetcher,
            model_dir: model_dir.into(),
            optimizer: Box::new(NelderMeadOptimizer::default()),
        }
    }

    pub fn with_optimizer(mut self, optimizer: Box<dyn Optimizer + Send + Sync>) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Produce the percentage-return series for the engine's ticker.
    ///
    /// With `use_fresh_data` the provider is queried and the stored table
    /// replaced — destructive and unconditional. Either way the most
    /// recent `n_observations` bars are windowed, ascending, and fewer
    /// than 2 bars fail with `InsufficientData`.
    pub async fn wrangle_data(
        &self,
        n_observations: u32,
        use_fresh_data: bool,
    ) -> Result<ReturnSeries> {
        if use_fresh_data {
            let bars = self.fetcher.fetch_daily(&self.ticker).await?;
            self.store
                .insert_bars(&self.ticker, &bars, ConflictPolicy::Replace)
                .await?;
        }
        let bars = self.store.read_bars(&self.ticker, Some(n_observations)).await?;
        percentage_returns(&bars)
    }

    /// Fit a GARCH(p,q) model to a wrangled return series. The result is
    /// not persisted until `dump` is called.
    pub fn fit(&self, series: &ReturnSeries, p: usize, q: usize) -> Result<FittedModel> {
        let estimate = garch::fit(&series.values, p, q, self.optimizer.as_ref())?;
        info!(
            ticker = %self.ticker, p, q,
            persistence = estimate.params.persistence(),
            "fitted GARCH model"
        );
        Ok(FittedModel {
            ticker: self.ticker.clone(),
            p,
            q,
            params: estimate.params,
            residuals: series.values.clone(),
            sigma2: estimate.sigma2,
            last_date: series.last_date,
            fitted_at: Utc::now(),
        })
    }

    /// Persist a fitted model snapshot, returning the artifact path.
    ///
    /// The filename encodes ticker and fit timestamp so later fits never
    /// overwrite earlier ones; the write goes through a temp name and a
    /// rename so a concurrent `load` never sees a partial file.
    pub fn dump(&self, model: &FittedModel) -> Result<PathBuf> {
        fs::create_dir_all(&self.model_dir)?;

        let path = self.model_dir.join(artifact_filename(model));
        if path.exists() {
            return Err(EngineError::Io(format!(
                "artifact '{}' already exists, refusing to overwrite",
                path.display()
            )));
        }

        let tmp = path.with_extension("json.tmp");
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp)?;
        serde_json::to_writer(file, model)?;
        fs::rename(&tmp, &path)?;

        info!(ticker = %self.ticker, path = %path.display(), "dumped model artifact");
        Ok(path)
    }

    /// Restore the most recent persisted snapshot for the engine's ticker.
    ///
    /// Selection uses an explicit comparator over the timestamp parsed out
    /// of each candidate filename, not lexical path order. No candidates,
    /// a timestamp tie, or a malformed winning artifact all fail with
    /// `ModelNotFound` — the caller should fit a model first.
    pub fn load(&self) -> Result<FittedModel> {
        let not_found = || EngineError::ModelNotFound(self.ticker.clone());

        let entries = fs::read_dir(&self.model_dir).map_err(|_| not_found())?;
        let mut best: Option<(NaiveDateTime, PathBuf)> = None;
        let mut tied = false;
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(ts) = parse_artifact_name(&path, &self.ticker) else {
                continue;
            };
            match &best {
                Some((best_ts, _)) if *best_ts > ts => {}
                Some((best_ts, _)) if *best_ts == ts => tied = true,
                _ => {
                    best = Some((ts, path));
                    tied = false;
                }
            }
        }

        if tied {
            warn!(ticker = %self.ticker, "timestamp tie between artifacts");
            return Err(not_found());
        }
        let (_, path) = best.ok_or_else(not_found)?;

        let bytes = fs::read(&path)?;
        let model: FittedModel = serde_json::from_slice(&bytes).map_err(|e| {
            warn!(path = %path.display(), error = %e, "malformed model artifact");
            not_found()
        })?;
        info!(ticker = %self.ticker, path = %path.display(), "loaded model artifact");
        Ok(model)
    }

    /// Forecast conditional volatility `horizon` business days ahead.
    /// Pure function of the fitted state — no persisted side effects.
    pub fn predict_volatility(
        &self,
        model: &FittedModel,
        horizon: u32,
    ) -> Result<Vec<ForecastPoint>> {
        if horizon < 1 {
            return Err(EngineError::InvalidInput(
                "forecast horizon must be at least 1".into(),
            ));
        }
        let variances = model.forecast_variances(horizon as usize);
        let dates = business_days_after(model.last_date, horizon as usize);
        Ok(dates
            .into_iter()
            .zip(variances)
            .map(|(date, var)| ForecastPoint {
                date,
                sigma: var.sqrt(),
            })
            .collect())
    }
}

fn artifact_filename(model: &FittedModel) -> String {
    format!(
        "{}_{}.json",
        model.ticker,
        model.fitted_at.format(ARTIFACT_TS_FORMAT)
    )
}

/// Parse `<TICKER>_<timestamp>.json` back into its fit timestamp,
/// returning `None` for foreign tickers and unrelated files.
fn parse_artifact_name(path: &Path, ticker: &str) -> Option<NaiveDateTime> {
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let (name, ts) = stem.rsplit_once('_')?;
    if name != ticker {
        return None;
    }
    NaiveDateTime::parse_from_str(ts, ARTIFACT_TS_FORMAT).ok()
}

/// The next `n` business days strictly after `start`, skipping weekends.
fn business_days_after(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    let mut out = Vec::with_capacity(n);
    let mut day = start;
    while out.len() < n {
        day = day.succ_opt().expect("date overflow");
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            out.push(day);
        }
    }
    out
}
