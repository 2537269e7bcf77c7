//! Service configuration.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use credit_ledger_core::{Credits, PaymentSettings, PricingConfig};

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// PostgreSQL connection string (default: `postgres://localhost/credit_ledger`).
    pub database_url: String,

    /// Maximum pool size (default: 10).
    pub database_max_connections: u32,

    /// Seconds between free credit refill runs (default: 3600).
    pub refill_interval_seconds: u64,

    /// Payment switch, fee percentages and new-account defaults.
    pub payment: PaymentSettings,

    /// Skill price catalogue.
    pub pricing: PricingConfig,
}

impl ServiceConfig {
    /// Load configuration from environment variables and the skill pricing file.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = PaymentSettings::default();

        let payment = PaymentSettings {
            payment_enabled: env_or("PAYMENT_ENABLED", defaults.payment_enabled),
            fee_platform_percentage: env_or(
                "FEE_PLATFORM_PERCENTAGE",
                defaults.fee_platform_percentage,
            ),
            fee_dev_percentage: env_or("FEE_DEV_PERCENTAGE", defaults.fee_dev_percentage),
            default_free_quota: env_or::<Credits>("DEFAULT_FREE_QUOTA", defaults.default_free_quota),
            default_refill_amount: env_or::<Credits>(
                "DEFAULT_REFILL_AMOUNT",
                defaults.default_refill_amount,
            ),
        };

        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/credit_ledger".into()),
            database_max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10),
            refill_interval_seconds: env_or("REFILL_INTERVAL_SECONDS", 3600),
            payment,
            pricing: load_skill_pricing(),
        }
    }

    /// Interval between refill runs.
    #[must_use]
    pub fn refill_interval(&self) -> Duration {
        Duration::from_secs(self.refill_interval_seconds.max(1))
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/credit_ledger".into(),
            database_max_connections: 10,
            refill_interval_seconds: 3600,
            payment: PaymentSettings::default(),
            pricing: PricingConfig::default(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Load skill prices from `SKILL_PRICING_PATH` or the first pricing file found.
fn load_skill_pricing() -> PricingConfig {
    let explicit = std::env::var("SKILL_PRICING_PATH").ok();
    let fallback_paths = [
        "config/skill_pricing.json",
        "credit-ledger/config/skill_pricing.json",
        "../config/skill_pricing.json",
        ".secrets/skill_pricing.json",
    ];

    for path in explicit.iter().map(String::as_str).chain(fallback_paths) {
        match load_pricing_file(path) {
            Ok(pricing) => {
                tracing::info!(path = %path, skills = pricing.len(), "Loaded skill pricing from file");
                return pricing;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Ignoring unreadable skill pricing file");
            }
        }
    }

    tracing::debug!("Skill pricing file not found, starting with an empty catalogue");
    PricingConfig::default()
}

/// Load a skill pricing file.
fn load_pricing_file(path: &str) -> Result<PricingConfig, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Skill pricing file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    PricingConfig::from_json(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}
