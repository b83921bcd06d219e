// ⚙️ Configuration - config/normalizer.toml, every field defaulted
//
// Lookup order for the file: explicit path (--config), NORMALIZER_CONFIG,
// then config/normalizer.toml if it exists. NORMALIZER_DB overrides the
// database path after loading.

use crate::db::Store;
use crate::entities::{Currency, ReportingPeriod};
use crate::fx::RateTable;
use crate::ingest::Ingestor;
use crate::pipeline::NormalizationPipeline;
use crate::query::DisplayRates;
use crate::reconciliation::ReconciliationChecker;
use crate::taxonomy::TaxonomyRegistry;
use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "config/normalizer.toml";
pub const CONFIG_ENV: &str = "NORMALIZER_CONFIG";
pub const DATABASE_ENV: &str = "NORMALIZER_DB";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_path: PathBuf,
    /// Currency of record for every stored point
    pub target_currency: Currency,
    /// Period used when a filename carries none
    pub default_period: String,
    /// Reconciliation tolerance in percent
    pub tolerance_pct: f64,
    pub display_rates: DisplayRates,
    /// JSON taxonomy revision replacing the built-in one
    pub taxonomy_path: Option<PathBuf>,
    /// CSV rate table replacing the built-in one
    pub fx_rates_path: Option<PathBuf>,
    pub server_addr: String,
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: PathBuf::from("data/normalizer.db"),
            target_currency: Currency::HKD,
            default_period: "2025 1H".to_string(),
            tolerance_pct: 2.0,
            display_rates: DisplayRates::default(),
            taxonomy_path: None,
            fx_rates_path: None,
            server_addr: "127.0.0.1:3000".to_string(),
            log_json: false,
        }
    }
}

impl Config {
    /// Resolve the config file, load it and apply environment overrides
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);

        let mut config = match (explicit, from_env) {
            (Some(path), _) => Self::from_file(path)?,
            (None, Some(path)) => Self::from_file(&path)?,
            (None, None) if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_file(DEFAULT_CONFIG_PATH)?,
            (None, None) => Config::default(),
        };

        config.override_database(std::env::var(DATABASE_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config = Self::from_toml(&content)
            .with_context(|| format!("Invalid config file: {:?}", path.as_ref()))?;
        info!(path = ?path.as_ref(), "config loaded");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn override_database(&mut self, path: Option<String>) {
        if let Some(path) = path.filter(|p| !p.trim().is_empty()) {
            self.database_path = PathBuf::from(path);
        }
    }

    fn validate(&self) -> Result<()> {
        if self.default_period.parse::<ReportingPeriod>().is_err() {
            bail!("default_period {:?} is not a reporting period", self.default_period);
        }
        if !self.tolerance_pct.is_finite() || self.tolerance_pct < 0.0 {
            bail!("tolerance_pct must be a non-negative number, got {}", self.tolerance_pct);
        }
        Ok(())
    }

    // ========================================================================
    // BUILDERS
    // ========================================================================

    pub fn tolerance(&self) -> Result<Decimal> {
        Decimal::try_from(self.tolerance_pct)
            .with_context(|| format!("tolerance_pct {} is not representable", self.tolerance_pct))
    }

    pub fn checker(&self) -> Result<ReconciliationChecker> {
        Ok(ReconciliationChecker::with_tolerance(self.tolerance()?))
    }

    pub fn taxonomy(&self) -> Result<TaxonomyRegistry> {
        match &self.taxonomy_path {
            Some(path) => TaxonomyRegistry::from_file(path),
            None => Ok(TaxonomyRegistry::hong_kong_default()),
        }
    }

    pub fn rates(&self) -> Result<RateTable> {
        match &self.fx_rates_path {
            Some(path) => RateTable::from_csv(path),
            None => Ok(RateTable::hong_kong_default()),
        }
    }

    pub fn pipeline(&self) -> Result<NormalizationPipeline> {
        Ok(NormalizationPipeline::new(
            Arc::new(self.taxonomy()?),
            Arc::new(self.rates()?),
            self.target_currency,
        ))
    }

    /// Open the database, creating its directory if needed
    pub fn open_store(&self) -> Result<Arc<Store>> {
        if let Some(parent) = self.database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
        }
        let store = Store::open(&self.database_path)
            .with_context(|| format!("Failed to open database: {:?}", self.database_path))?;
        Ok(Arc::new(store))
    }

    pub fn ingestor(&self, store: Arc<Store>) -> Result<Ingestor> {
        Ok(Ingestor::new(store, self.pipeline()?, self.checker()?, &self.default_period))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.tolerance().unwrap(), Decimal::TWO);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = Config::from_toml(
            r#"
            default_period = "2024 2H"
            tolerance_pct = 0.5

            [display_rates]
            base = "HKD"
            rates = { USD = "0.13" }
            "#,
        )
        .unwrap();

        assert_eq!(config.default_period, "2024 2H");
        assert_eq!(config.tolerance().unwrap(), Decimal::new(5, 1));
        assert_eq!(config.display_rates.rate(Currency::USD).unwrap(), Decimal::new(13, 2));
        assert!(config.display_rates.rate(Currency::GBP).is_err());
        assert_eq!(config.target_currency, Currency::HKD);
        assert_eq!(config.server_addr, "127.0.0.1:3000");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Config::from_toml("default_period = \"sometime\"").is_err());
        assert!(Config::from_toml("tolerance_pct = -1.0").is_err());
        assert!(Config::from_toml("target_currency = \"EUR\"").is_err());
    }

    #[test]
    fn test_database_override() {
        let mut config = Config::default();
        config.override_database(Some("/tmp/other.db".to_string()));
        assert_eq!(config.database_path, PathBuf::from("/tmp/other.db"));

        config.override_database(Some("  ".to_string()));
        assert_eq!(config.database_path, PathBuf::from("/tmp/other.db"));
    }

    #[test]
    fn test_from_file_builds_working_ingestor() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("normalizer.db");
        let config_path = dir.path().join("normalizer.toml");

        let mut file = fs::File::create(&config_path).unwrap();
        writeln!(file, "database_path = {:?}", db_path.to_string_lossy()).unwrap();
        writeln!(file, "default_period = \"2024 1H\"").unwrap();

        let config = Config::load(Some(&config_path)).unwrap();
        let store = config.open_store().unwrap();
        let ingestor = config.ingestor(store).unwrap();
        let report = ingestor.ingest(b"", "hang seng results.pdf").unwrap();

        assert_eq!(report.document.period, "2024 1H");
        assert!(db_path.exists());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let err = Config::from_file("/nonexistent/normalizer.toml").unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read config file"));
    }
}
