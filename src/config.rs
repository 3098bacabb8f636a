//! Configuration management for netprune.
//!
//! Values are layered: built-in defaults, then a TOML file, then `NETPRUNE_*`
//! environment variables. CLI flags are applied last by the caller.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use crate::scheduler::DelayRange;

/// Name of the optional config file inside the data directory.
pub const CONFIG_FILENAME: &str = "netprune.toml";
/// Entity store file name.
pub const DATABASE_FILENAME: &str = "connections.db";
/// Saved browser cookies.
pub const COOKIES_FILENAME: &str = "cookies.json";
/// Default crawl export.
pub const PROFILES_FILENAME: &str = "profiles.csv";
/// Default identifier import.
pub const URLS_FILENAME: &str = "urls_to_remove.csv";

const ENV_PREFIX: &str = "NETPRUNE_";

/// Upper bound for any configured delay, timeout or deadline (one day).
pub const MAX_DURATION_SECS: f64 = 86_400.0;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// A `[min, max]` interval in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SecondsRange {
    pub min: f64,
    pub max: f64,
}

impl SecondsRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn to_delay(self) -> DelayRange {
        DelayRange::new(
            Duration::from_secs_f64(self.min),
            Duration::from_secs_f64(self.max),
        )
    }
}

/// Human-pacing knobs for the scheduler and crawler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingSettings {
    /// Pause after small interactions (opening a menu, scrolling).
    pub action_delay: SecondsRange,
    /// Pause between result pages while crawling.
    pub page_delay: SecondsRange,
    /// Pause between entities during removal.
    pub removal_delay: SecondsRange,
    /// Pause between batches during removal.
    pub batch_cooldown: SecondsRange,
    pub batch_size: usize,
    pub camouflage_probability: f64,
}

impl Default for PacingSettings {
    fn default() -> Self {
        Self {
            action_delay: SecondsRange::new(1.0, 3.0),
            page_delay: SecondsRange::new(3.0, 6.0),
            removal_delay: SecondsRange::new(5.0, 10.0),
            batch_cooldown: SecondsRange::new(120.0, 180.0),
            batch_size: 10,
            camouflage_probability: 0.3,
        }
    }
}

/// Timeouts and deadlines, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub navigation: f64,
    pub selector: f64,
    pub short_selector: f64,
    pub verification: f64,
    /// Hard wall-clock limit for processing one entity.
    pub entity_deadline: f64,
    /// Hard wall-clock limit for extracting one results page.
    pub page_deadline: f64,
    pub login_wait: f64,
    pub login_poll: f64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            navigation: 30.0,
            selector: 10.0,
            short_selector: 2.0,
            verification: 3.0,
            entity_deadline: 20.0,
            page_deadline: 30.0,
            login_wait: 300.0,
            login_poll: 2.0,
        }
    }
}

impl TimeoutSettings {
    pub fn navigation(&self) -> Duration {
        Duration::from_secs_f64(self.navigation)
    }

    pub fn selector(&self) -> Duration {
        Duration::from_secs_f64(self.selector)
    }

    pub fn short_selector(&self) -> Duration {
        Duration::from_secs_f64(self.short_selector)
    }

    pub fn verification(&self) -> Duration {
        Duration::from_secs_f64(self.verification)
    }

    pub fn entity_deadline(&self) -> Duration {
        Duration::from_secs_f64(self.entity_deadline)
    }

    pub fn page_deadline(&self) -> Duration {
        Duration::from_secs_f64(self.page_deadline)
    }

    pub fn login_wait(&self) -> Duration {
        Duration::from_secs_f64(self.login_wait)
    }

    pub fn login_poll(&self) -> Duration {
        Duration::from_secs_f64(self.login_poll)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay: f64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: 1.0,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_secs_f64(self.initial_delay),
            self.backoff_multiplier,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlSettings {
    pub max_pages: u32,
    /// Search results URL used when `crawl` is run without `--search-url`.
    pub search_url: Option<String>,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            max_pages: 100,
            search_url: None,
        }
    }
}

/// Browser launch options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub locale: String,
    pub user_agent: String,
    /// Proxy server URL (e.g., "socks5://127.0.0.1:9050").
    pub proxy: Option<String>,
    /// Remote DevTools endpoint to attach to instead of launching Chrome.
    pub remote_url: Option<String>,
    /// Extra Chrome command-line arguments.
    pub chrome_args: Vec<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: false,
            viewport_width: 1920,
            viewport_height: 1080,
            locale: "en-US".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy: None,
            remote_url: None,
            chrome_args: Vec::new(),
        }
    }
}

/// Application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding the database, cookies and CSV files.
    pub data_dir: PathBuf,
    pub pacing: PacingSettings,
    pub timeouts: TimeoutSettings,
    pub retry: RetrySettings,
    pub crawl: CrawlSettings,
    pub browser: BrowserSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            pacing: PacingSettings::default(),
            timeouts: TimeoutSettings::default(),
            retry: RetrySettings::default(),
            crawl: CrawlSettings::default(),
            browser: BrowserSettings::default(),
        }
    }
}

/// Where to look for configuration.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file (`--config`). Must exist when given.
    pub config_path: Option<PathBuf>,
    /// Data directory override (`--data-dir`).
    pub data_dir: Option<PathBuf>,
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("netprune"))
        .unwrap_or_else(|| PathBuf::from("./data"))
}

/// Expand `~` in a user-supplied path.
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(raw.as_ref()).as_ref())
}

impl Settings {
    /// Load settings from file and process environment, then validate.
    pub fn load(options: &LoadOptions) -> Result<Self, ConfigError> {
        Self::load_with_env(options, |key| std::env::var(key).ok())
    }

    /// Like [`Settings::load`] with an injectable environment lookup.
    pub fn load_with_env<F>(options: &LoadOptions, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = options
            .data_dir
            .as_deref()
            .map(expand_path)
            .or_else(|| env_string(&lookup, "DATA_DIR").map(|s| expand_path(Path::new(&s))));

        let config_file = match &options.config_path {
            Some(path) => Some(expand_path(path)),
            None => {
                let dir = data_dir.clone().unwrap_or_else(default_data_dir);
                let candidate = dir.join(CONFIG_FILENAME);
                candidate.exists().then_some(candidate)
            }
        };

        let mut settings = match config_file {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        settings.apply_env(&lookup)?;

        // --data-dir wins over both file and environment
        if let Some(dir) = options.data_dir.as_deref() {
            settings.data_dir = expand_path(dir);
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Parse a TOML config file. Missing keys fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut settings: Settings =
            toml::from_str(&content).map_err(|source| ConfigError::Toml {
                path: path.display().to_string(),
                source,
            })?;
        settings.data_dir = expand_path(&settings.data_dir);
        tracing::debug!("Loaded config from {}", path.display());
        Ok(settings)
    }

    /// Apply `NETPRUNE_*` overrides.
    pub fn apply_env<F>(&mut self, lookup: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = env_string(lookup, "DATA_DIR") {
            self.data_dir = expand_path(Path::new(&dir));
        }

        let pacing = &mut self.pacing;
        env_range(lookup, "ACTION_DELAY", &mut pacing.action_delay)?;
        env_range(lookup, "PAGE_DELAY", &mut pacing.page_delay)?;
        env_range(lookup, "REMOVAL_DELAY", &mut pacing.removal_delay)?;
        env_range(lookup, "BATCH_COOLDOWN", &mut pacing.batch_cooldown)?;
        if let Some(v) = env_u64(lookup, "BATCH_SIZE", 1)? {
            pacing.batch_size = v as usize;
        }
        if let Some(v) = env_f64(lookup, "CAMOUFLAGE_PROBABILITY", 0.0)? {
            pacing.camouflage_probability = v;
        }

        let timeouts = &mut self.timeouts;
        for (name, slot) in [
            ("NAVIGATION_TIMEOUT", &mut timeouts.navigation),
            ("SELECTOR_TIMEOUT", &mut timeouts.selector),
            ("SHORT_SELECTOR_TIMEOUT", &mut timeouts.short_selector),
            ("VERIFICATION_TIMEOUT", &mut timeouts.verification),
            ("ENTITY_DEADLINE", &mut timeouts.entity_deadline),
            ("PAGE_DEADLINE", &mut timeouts.page_deadline),
            ("LOGIN_TIMEOUT", &mut timeouts.login_wait),
        ] {
            if let Some(v) = env_f64(lookup, name, 0.0)? {
                *slot = v;
            }
        }

        if let Some(v) = env_u64(lookup, "MAX_ATTEMPTS", 1)? {
            self.retry.max_attempts = v as u32;
        }
        if let Some(v) = env_f64(lookup, "RETRY_DELAY", 0.0)? {
            self.retry.initial_delay = v;
        }
        if let Some(v) = env_f64(lookup, "BACKOFF", 1.0)? {
            self.retry.backoff_multiplier = v;
        }

        if let Some(v) = env_u64(lookup, "MAX_PAGES", 1)? {
            self.crawl.max_pages = v as u32;
        }
        if let Some(url) = env_string(lookup, "SEARCH_URL") {
            self.crawl.search_url = Some(url);
        }

        if let Some(v) = env_bool(lookup, "HEADLESS")? {
            self.browser.headless = v;
        }
        if let Some(v) = env_string(lookup, "USER_AGENT") {
            self.browser.user_agent = v;
        }
        if let Some(v) = env_string(lookup, "PROXY") {
            self.browser.proxy = Some(v);
        }
        if let Some(v) = env_string(lookup, "REMOTE_URL") {
            self.browser.remote_url = Some(v);
        }

        Ok(())
    }

    /// Check bounds and range ordering.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.pacing;
        check_range("pacing.action_delay", p.action_delay)?;
        check_range("pacing.page_delay", p.page_delay)?;
        check_range("pacing.removal_delay", p.removal_delay)?;
        check_range("pacing.batch_cooldown", p.batch_cooldown)?;
        check_min("pacing.batch_size", p.batch_size as f64, 1.0)?;
        check_min("pacing.camouflage_probability", p.camouflage_probability, 0.0)?;
        check_max("pacing.camouflage_probability", p.camouflage_probability, 1.0)?;

        let t = &self.timeouts;
        for (name, value) in [
            ("timeouts.navigation", t.navigation),
            ("timeouts.selector", t.selector),
            ("timeouts.short_selector", t.short_selector),
            ("timeouts.verification", t.verification),
            ("timeouts.entity_deadline", t.entity_deadline),
            ("timeouts.page_deadline", t.page_deadline),
            ("timeouts.login_wait", t.login_wait),
            ("timeouts.login_poll", t.login_poll),
        ] {
            check_duration(name, value)?;
        }

        check_min("retry.max_attempts", self.retry.max_attempts as f64, 1.0)?;
        check_duration("retry.initial_delay", self.retry.initial_delay)?;
        check_min("retry.backoff_multiplier", self.retry.backoff_multiplier, 1.0)?;
        check_min("crawl.max_pages", self.crawl.max_pages as f64, 1.0)?;
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILENAME)
    }

    pub fn cookies_path(&self) -> PathBuf {
        self.data_dir.join(COOKIES_FILENAME)
    }

    pub fn profiles_csv_path(&self) -> PathBuf {
        self.data_dir.join(PROFILES_FILENAME)
    }

    pub fn urls_csv_path(&self) -> PathBuf {
        self.data_dir.join(URLS_FILENAME)
    }
}

fn env_string<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(&format!("{ENV_PREFIX}{name}")).filter(|s| !s.trim().is_empty())
}

fn env_f64<F>(lookup: &F, name: &str, min: f64) -> Result<Option<f64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = env_string(lookup, name) else {
        return Ok(None);
    };
    let key = format!("{ENV_PREFIX}{name}");
    let value: f64 = raw.trim().parse().map_err(|_| ConfigError::Parse {
        name: key.clone(),
        value: raw.clone(),
    })?;
    if !value.is_finite() {
        return Err(ConfigError::Parse { name: key, value: raw });
    }
    check_min(&key, value, min)?;
    Ok(Some(value))
}

fn env_u64<F>(lookup: &F, name: &str, min: u64) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = env_string(lookup, name) else {
        return Ok(None);
    };
    let key = format!("{ENV_PREFIX}{name}");
    let value: u64 = raw.trim().parse().map_err(|_| ConfigError::Parse {
        name: key.clone(),
        value: raw.clone(),
    })?;
    check_min(&key, value as f64, min as f64)?;
    Ok(Some(value))
}

fn env_bool<F>(lookup: &F, name: &str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = env_string(lookup, name) else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(ConfigError::Parse {
            name: format!("{ENV_PREFIX}{name}"),
            value: raw,
        }),
    }
}

/// Reads `<NAME>_MIN` / `<NAME>_MAX`; ordering is checked in `validate`.
fn env_range<F>(lookup: &F, name: &str, range: &mut SecondsRange) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(min) = env_f64(lookup, &format!("{name}_MIN"), 0.0)? {
        range.min = min;
    }
    if let Some(max) = env_f64(lookup, &format!("{name}_MAX"), 0.0)? {
        range.max = max;
    }
    Ok(())
}

fn check_min(name: &str, value: f64, min: f64) -> Result<(), ConfigError> {
    if value < min || value.is_nan() {
        return Err(ConfigError::BelowMinimum {
            name: name.to_string(),
            min,
            value,
        });
    }
    Ok(())
}

fn check_max(name: &str, value: f64, max: f64) -> Result<(), ConfigError> {
    if value > max {
        return Err(ConfigError::AboveMaximum {
            name: name.to_string(),
            max,
            value,
        });
    }
    Ok(())
}

/// A seconds value must convert to a `Duration` without panicking.
fn check_duration(name: &str, value: f64) -> Result<(), ConfigError> {
    check_min(name, value, 0.0)?;
    check_max(name, value, MAX_DURATION_SECS)
}

fn check_range(name: &str, range: SecondsRange) -> Result<(), ConfigError> {
    check_duration(&format!("{name}.min"), range.min)?;
    check_duration(&format!("{name}.max"), range.max)?;
    if range.min > range.max {
        return Err(ConfigError::InvertedRange {
            name: name.to_string(),
            min: range.min,
            max: range.max,
        });
    }
    Ok(())
}
