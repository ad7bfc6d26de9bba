//! Configuration loading
//!
//! Settings are loaded once at process start into an immutable value.
//! Resolution priority for every key:
//! 1. Environment variable
//! 2. TOML config file (`$EVA_CONFIG`, else `~/.config/eva/config.toml`)
//! 3. Compiled default
//!
//! Secrets (API keys, gateway URLs with tokens) only ever come from the
//! environment and are never logged.

use crate::{Error, Result};
use std::path::PathBuf;

/// Store access configuration.
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    /// Path to the shared SQLite database file.
    pub path: PathBuf,
    pub pool_min: u32,
    pub pool_max: u32,
}

/// Hard gate thresholds for the confidence scorer.
///
/// Phase 0 defaults; production targets tighten these via environment.
#[derive(Debug, Clone, Copy)]
pub struct GateSettings {
    pub intent: f64,
    pub suppression: f64,
    pub spread: f64,
}

/// Band classification thresholds.
#[derive(Debug, Clone, Copy)]
pub struct BandSettings {
    pub high: f64,
    pub watchlist: f64,
}

/// External search-interest validator configuration.
#[derive(Debug, Clone)]
pub struct TrendsSettings {
    pub enabled: bool,
    pub cache_hours: u64,
    pub min_confidence: f64,
    pub base_url: String,
    /// Global minimum delay between provider requests.
    pub min_request_delay_ms: u64,
}

/// Language-model provider configuration for the extraction primary path.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// No key means the model-backed path is disabled and extraction is
    /// heuristic-only.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

/// Push gateway configuration for the notifier.
#[derive(Debug, Clone)]
pub struct NotifySettings {
    pub gateway_url: String,
    pub topic: String,
    pub timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub max_attempts: i64,
}

/// Market data provider (ticker lookup and quotes).
#[derive(Debug, Clone)]
pub struct MarketSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Minimum delay between lookup calls.
    pub rate_limit_ms: u64,
}

/// Scoring cadence and window.
#[derive(Debug, Clone)]
pub struct ScoringSettings {
    /// How many days of candidates each scoring run covers.
    pub lookback_days: i64,
    pub interval_hours: u64,
}

/// Worker loop tuning and artifact output.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub batch_size: i64,
    pub idle_sleep_secs: u64,
    pub reco_output_dir: PathBuf,
}

/// Admission endpoint bind address.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub bind_addr: String,
}

/// Immutable process-wide settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub gates: GateSettings,
    pub bands: BandSettings,
    pub trends: TrendsSettings,
    pub llm: LlmSettings,
    pub notify: NotifySettings,
    pub market: MarketSettings,
    pub scoring: ScoringSettings,
    pub worker: WorkerSettings,
    pub api: ApiSettings,
}

impl Settings {
    /// Load and validate settings from the environment plus the optional
    /// config file.
    pub fn load() -> Result<Self> {
        let file = load_config_file();
        let lookup = Lookup { file };

        let settings = Settings {
            database: DatabaseSettings {
                path: PathBuf::from(lookup.string("EVA_DB_PATH", "database.path", "eva.db")),
                pool_min: lookup.u64("EVA_DB_POOL_MIN", "database.pool_min", 2)? as u32,
                pool_max: lookup.u64("EVA_DB_POOL_MAX", "database.pool_max", 10)? as u32,
            },
            gates: GateSettings {
                intent: lookup.f64("EVA_GATE_INTENT", "gates.intent", 0.50)?,
                suppression: lookup.f64("EVA_GATE_SUPPRESSION", "gates.suppression", 0.40)?,
                spread: lookup.f64("EVA_GATE_SPREAD", "gates.spread", 0.25)?,
            },
            bands: BandSettings {
                high: lookup.f64("EVA_BAND_HIGH", "bands.high", 0.60)?,
                watchlist: lookup.f64("EVA_BAND_WATCHLIST", "bands.watchlist", 0.50)?,
            },
            trends: TrendsSettings {
                enabled: lookup.bool("TRENDS_ENABLED", "trends.enabled", true)?,
                cache_hours: lookup.u64("TRENDS_CACHE_HOURS", "trends.cache_hours", 24)?,
                min_confidence: lookup.f64("TRENDS_MIN_CONFIDENCE", "trends.min_confidence", 0.60)?,
                base_url: lookup.string(
                    "TRENDS_BASE_URL",
                    "trends.base_url",
                    "https://trends.googleapis.example/v1",
                ),
                min_request_delay_ms: lookup.u64(
                    "TRENDS_MIN_REQUEST_DELAY_MS",
                    "trends.min_request_delay_ms",
                    1000,
                )?,
            },
            llm: LlmSettings {
                api_key: env_opt("EVA_LLM_API_KEY"),
                base_url: lookup.string(
                    "EVA_LLM_BASE_URL",
                    "llm.base_url",
                    "https://api.openai.com/v1",
                ),
                model: lookup.string("EVA_LLM_MODEL", "llm.model", "gpt-4o-mini"),
                timeout_secs: lookup.u64("EVA_LLM_TIMEOUT_SECS", "llm.timeout_secs", 30)?,
            },
            notify: NotifySettings {
                gateway_url: lookup.string(
                    "EVA_NTFY_URL",
                    "notify.gateway_url",
                    "http://localhost:8090",
                ),
                topic: lookup.string("EVA_NTFY_TOPIC", "notify.topic", "eva-recommendations"),
                timeout_secs: lookup.u64("EVA_NTFY_TIMEOUT_SECS", "notify.timeout_secs", 10)?,
                poll_interval_secs: lookup.u64(
                    "EVA_NOTIFY_POLL_INTERVAL_SECS",
                    "notify.poll_interval_secs",
                    60,
                )?,
                max_attempts: lookup.u64("EVA_NOTIFY_MAX_ATTEMPTS", "notify.max_attempts", 5)?
                    as i64,
            },
            market: MarketSettings {
                base_url: lookup.string(
                    "EVA_MARKET_BASE_URL",
                    "market.base_url",
                    "https://financialmodelingprep.com/stable",
                ),
                api_key: env_opt("EVA_MARKET_API_KEY"),
                rate_limit_ms: lookup.u64("EVA_MARKET_RATE_LIMIT_MS", "market.rate_limit_ms", 500)?,
            },
            scoring: ScoringSettings {
                lookback_days: lookup.u64("EVA_SCORE_LOOKBACK_DAYS", "scoring.lookback_days", 7)?
                    as i64,
                interval_hours: lookup.u64("EVA_SCORE_INTERVAL_HOURS", "scoring.interval_hours", 24)?,
            },
            worker: WorkerSettings {
                batch_size: lookup.u64("EVA_WORKER_BATCH_SIZE", "worker.batch_size", 20)? as i64,
                idle_sleep_secs: lookup.u64("EVA_WORKER_IDLE_SLEEP_SECS", "worker.idle_sleep_secs", 10)?,
                reco_output_dir: PathBuf::from(lookup.string(
                    "EVA_RECO_OUTPUT_DIR",
                    "worker.reco_output_dir",
                    "output/recommendations",
                )),
            },
            api: ApiSettings {
                bind_addr: lookup.string("EVA_BIND_ADDR", "api.bind_addr", "127.0.0.1:9080"),
            },
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("EVA_GATE_INTENT", self.gates.intent),
            ("EVA_GATE_SUPPRESSION", self.gates.suppression),
            ("EVA_GATE_SPREAD", self.gates.spread),
            ("EVA_BAND_HIGH", self.bands.high),
            ("EVA_BAND_WATCHLIST", self.bands.watchlist),
            ("TRENDS_MIN_CONFIDENCE", self.trends.min_confidence),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(Error::Config(format!("{name} must be in [0,1], got {v}")));
            }
        }
        if self.bands.watchlist > self.bands.high {
            return Err(Error::Config(format!(
                "EVA_BAND_WATCHLIST ({}) must not exceed EVA_BAND_HIGH ({})",
                self.bands.watchlist, self.bands.high
            )));
        }
        if self.database.pool_min > self.database.pool_max {
            return Err(Error::Config(
                "EVA_DB_POOL_MIN must not exceed EVA_DB_POOL_MAX".to_string(),
            ));
        }
        if self.notify.max_attempts < 1 {
            return Err(Error::Config(
                "EVA_NOTIFY_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Locate and parse the optional TOML config file.
fn load_config_file() -> Option<toml::Value> {
    let path = match env_opt("EVA_CONFIG") {
        Some(p) => PathBuf::from(p),
        None => dirs::config_dir()?.join("eva").join("config.toml"),
    };
    let content = std::fs::read_to_string(&path).ok()?;
    match toml::from_str(&content) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring unparseable config file");
            None
        }
    }
}

/// Keyed lookup over environment, config file, default.
struct Lookup {
    file: Option<toml::Value>,
}

impl Lookup {
    fn file_value(&self, dotted: &str) -> Option<&toml::Value> {
        let mut cur = self.file.as_ref()?;
        for part in dotted.split('.') {
            cur = cur.get(part)?;
        }
        Some(cur)
    }

    fn string(&self, env: &str, file_key: &str, default: &str) -> String {
        if let Some(v) = env_opt(env) {
            return v;
        }
        if let Some(v) = self.file_value(file_key).and_then(|v| v.as_str()) {
            return v.to_string();
        }
        default.to_string()
    }

    fn f64(&self, env: &str, file_key: &str, default: f64) -> Result<f64> {
        if let Some(v) = env_opt(env) {
            return v
                .parse()
                .map_err(|_| Error::Config(format!("{env} must be a number, got {v:?}")));
        }
        if let Some(v) = self.file_value(file_key).and_then(|v| v.as_float()) {
            return Ok(v);
        }
        Ok(default)
    }

    fn u64(&self, env: &str, file_key: &str, default: u64) -> Result<u64> {
        if let Some(v) = env_opt(env) {
            return v
                .parse()
                .map_err(|_| Error::Config(format!("{env} must be an integer, got {v:?}")));
        }
        if let Some(v) = self.file_value(file_key).and_then(|v| v.as_integer()) {
            return Ok(v as u64);
        }
        Ok(default)
    }

    fn bool(&self, env: &str, file_key: &str, default: bool) -> Result<bool> {
        if let Some(v) = env_opt(env) {
            return match v.to_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(true),
                "false" | "0" | "no" => Ok(false),
                _ => Err(Error::Config(format!("{env} must be a boolean, got {v:?}"))),
            };
        }
        if let Some(v) = self.file_value(file_key).and_then(|v| v.as_bool()) {
            return Ok(v);
        }
        Ok(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_with(file: &str) -> Lookup {
        Lookup {
            file: Some(toml::from_str(file).unwrap()),
        }
    }

    #[test]
    fn file_values_resolve_dotted_keys() {
        let l = lookup_with("[gates]\nintent = 0.65\n");
        assert_eq!(l.f64("EVA_TEST_UNSET_GATE", "gates.intent", 0.5).unwrap(), 0.65);
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let l = Lookup { file: None };
        assert_eq!(l.f64("EVA_TEST_UNSET_A", "a.b", 0.25).unwrap(), 0.25);
        assert_eq!(l.string("EVA_TEST_UNSET_B", "a.c", "x"), "x");
        assert!(l.bool("EVA_TEST_UNSET_C", "a.d", true).unwrap());
    }

    #[test]
    fn band_ordering_is_validated() {
        let mut s = test_settings();
        s.bands.watchlist = 0.9;
        s.bands.high = 0.6;
        assert!(s.validate().is_err());
    }

    #[test]
    fn gate_range_is_validated() {
        let mut s = test_settings();
        s.gates.intent = 1.5;
        assert!(s.validate().is_err());
    }

    fn test_settings() -> Settings {
        Settings {
            database: DatabaseSettings {
                path: PathBuf::from(":memory:"),
                pool_min: 2,
                pool_max: 10,
            },
            gates: GateSettings {
                intent: 0.50,
                suppression: 0.40,
                spread: 0.25,
            },
            bands: BandSettings {
                high: 0.60,
                watchlist: 0.50,
            },
            trends: TrendsSettings {
                enabled: true,
                cache_hours: 24,
                min_confidence: 0.60,
                base_url: "http://localhost".into(),
                min_request_delay_ms: 0,
            },
            llm: LlmSettings {
                api_key: None,
                base_url: "http://localhost".into(),
                model: "test".into(),
                timeout_secs: 5,
            },
            notify: NotifySettings {
                gateway_url: "http://localhost".into(),
                topic: "t".into(),
                timeout_secs: 10,
                poll_interval_secs: 60,
                max_attempts: 5,
            },
            market: MarketSettings {
                base_url: "http://localhost".into(),
                api_key: None,
                rate_limit_ms: 0,
            },
            scoring: ScoringSettings {
                lookback_days: 7,
                interval_hours: 24,
            },
            worker: WorkerSettings {
                batch_size: 20,
                idle_sleep_secs: 10,
                reco_output_dir: PathBuf::from("out"),
            },
            api: ApiSettings {
                bind_addr: "127.0.0.1:0".into(),
            },
        }
    }
}
