//! Server configuration parsed from environment variables.
//!
//! Every setting has a default, so an empty environment yields a working
//! 100x100 canvas on `0.0.0.0:9090`. The admin import endpoint stays
//! disabled until `ADMIN_PASSWORD` is set.

use std::path::PathBuf;
use std::time::Duration;

use crate::rate_limit::DEFAULT_MIN_INTERVAL_MS;
use crate::services::palette::{
    DEFAULT_BASE_COLOR, DEFAULT_COLORS, DEFAULT_SECRET_COLORS, Palette, PaletteError,
};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9090;
pub const DEFAULT_GRID_WIDTH: u16 = 100;
pub const DEFAULT_GRID_HEIGHT: u16 = 100;
pub const DEFAULT_FLAG_MESSAGE: &str = "flag{h1dden_c0lors_are_1337}";
pub const DEFAULT_PERSIST_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_PERSIST_RETENTION: usize = 20;
pub const DEFAULT_STATES_DIR: &str = "states";
pub const DEFAULT_ADMIN_IMPORT_PATH: &str = "/import_v5dr6bft7ngy";
pub const DEFAULT_STATIC_DIR: &str = "static";
pub const DEFAULT_CLIENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
    #[error("grid dimensions must be non-zero (got {width}x{height})")]
    EmptyGrid { width: u16, height: u16 },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("ADMIN_IMPORT_PATH must start with '/': {0:?}")]
    AdminPath(String),
    #[error("palette: {0}")]
    Palette(#[from] PaletteError),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub grid_width: u16,
    pub grid_height: u16,
    pub palette: Palette,
    /// Text of the flag sent to a connection that places a secret color.
    pub flag_message: String,
    pub rate_limit_interval: Duration,
    pub persist_interval: Duration,
    /// Number of snapshot files kept after each save.
    pub persist_retention: usize,
    pub states_dir: PathBuf,
    /// `None` disables the admin import endpoint.
    pub admin_password: Option<String>,
    pub admin_import_path: String,
    pub static_dir: PathBuf,
    pub client_channel_capacity: usize,
}

impl Config {
    /// Build config from the process environment.
    ///
    /// Optional:
    /// - `HOST`, `PORT`: listen address (default `0.0.0.0:9090`)
    /// - `GRID_WIDTH`, `GRID_HEIGHT`: canvas size (default 100x100)
    /// - `GRID_PALETTE`, `GRID_SECRET_COLORS`: comma-separated color names
    /// - `GRID_DEFAULT_COLOR`: base color (default `black`)
    /// - `FLAG_MESSAGE`
    /// - `RATE_LIMIT_INTERVAL_MS`: default 100
    /// - `PERSIST_INTERVAL_SECS`: default 10
    /// - `PERSIST_RETENTION`: default 20
    /// - `STATES_DIR`: default `states`
    /// - `ADMIN_PASSWORD`: unset or empty disables the import endpoint
    /// - `ADMIN_IMPORT_PATH`: default `/import_v5dr6bft7ngy`
    /// - `STATIC_DIR`: default `static`
    /// - `CLIENT_CHANNEL_CAPACITY`: default 1024
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for unparsable numbers or an inconsistent
    /// palette.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let grid_width = parse_var(&lookup, "GRID_WIDTH", DEFAULT_GRID_WIDTH)?;
        let grid_height = parse_var(&lookup, "GRID_HEIGHT", DEFAULT_GRID_HEIGHT)?;
        if grid_width == 0 || grid_height == 0 {
            return Err(ConfigError::EmptyGrid { width: grid_width, height: grid_height });
        }

        let colors = list_var(&lookup, "GRID_PALETTE").unwrap_or_else(|| to_owned_list(DEFAULT_COLORS));
        let secrets = list_var(&lookup, "GRID_SECRET_COLORS").unwrap_or_else(|| to_owned_list(DEFAULT_SECRET_COLORS));
        let base = lookup("GRID_DEFAULT_COLOR").unwrap_or_else(|| DEFAULT_BASE_COLOR.to_owned());
        let palette = Palette::new(colors, secrets, base.trim())?;

        let persist_interval_secs = parse_var(&lookup, "PERSIST_INTERVAL_SECS", DEFAULT_PERSIST_INTERVAL_SECS)?;
        if persist_interval_secs == 0 {
            return Err(ConfigError::Zero("PERSIST_INTERVAL_SECS"));
        }
        let persist_retention = parse_var(&lookup, "PERSIST_RETENTION", DEFAULT_PERSIST_RETENTION)?;
        if persist_retention == 0 {
            return Err(ConfigError::Zero("PERSIST_RETENTION"));
        }
        let client_channel_capacity =
            parse_var(&lookup, "CLIENT_CHANNEL_CAPACITY", DEFAULT_CLIENT_CHANNEL_CAPACITY)?;
        if client_channel_capacity == 0 {
            return Err(ConfigError::Zero("CLIENT_CHANNEL_CAPACITY"));
        }

        let admin_import_path = lookup("ADMIN_IMPORT_PATH").unwrap_or_else(|| DEFAULT_ADMIN_IMPORT_PATH.to_owned());
        if !admin_import_path.starts_with('/') {
            return Err(ConfigError::AdminPath(admin_import_path));
        }

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_owned()),
            port: parse_var(&lookup, "PORT", DEFAULT_PORT)?,
            grid_width,
            grid_height,
            palette,
            flag_message: lookup("FLAG_MESSAGE").unwrap_or_else(|| DEFAULT_FLAG_MESSAGE.to_owned()),
            rate_limit_interval: Duration::from_millis(parse_var(
                &lookup,
                "RATE_LIMIT_INTERVAL_MS",
                DEFAULT_MIN_INTERVAL_MS,
            )?),
            persist_interval: Duration::from_secs(persist_interval_secs),
            persist_retention,
            states_dir: lookup("STATES_DIR").map_or_else(|| PathBuf::from(DEFAULT_STATES_DIR), PathBuf::from),
            admin_password: lookup("ADMIN_PASSWORD").filter(|p| !p.is_empty()),
            admin_import_path,
            static_dir: lookup("STATIC_DIR").map_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR), PathBuf::from),
            client_channel_capacity,
        })
    }

    /// `host:port` for the listener.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            grid_width: DEFAULT_GRID_WIDTH,
            grid_height: DEFAULT_GRID_HEIGHT,
            palette: Palette::default(),
            flag_message: DEFAULT_FLAG_MESSAGE.to_owned(),
            rate_limit_interval: Duration::from_millis(DEFAULT_MIN_INTERVAL_MS),
            persist_interval: Duration::from_secs(DEFAULT_PERSIST_INTERVAL_SECS),
            persist_retention: DEFAULT_PERSIST_RETENTION,
            states_dir: PathBuf::from(DEFAULT_STATES_DIR),
            admin_password: None,
            admin_import_path: DEFAULT_ADMIN_IMPORT_PATH.to_owned(),
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
            client_channel_capacity: DEFAULT_CLIENT_CHANNEL_CAPACITY,
        }
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Parse `key` if present. Unlike a silent fallback, a present but
/// unparsable value is an error.
fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { var: key, value: raw }),
    }
}

fn list_var(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Vec<String>> {
    let raw = lookup(key)?;
    Some(
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect(),
    )
}

fn to_owned_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
