//! Configuration management for the Los Libros reader

use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::annotations::OverlayRemovalPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub reader: ReaderConfig,
    pub viewport: ViewportConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReaderConfig {
    /// Break-points in the location index used for percentages
    pub location_break_points: usize,
    /// Mark clicks within this window after creating a highlight are ignored
    pub suppression_window_ms: u64,
    /// Delay between a style change and overlay replay
    pub settle_delay_ms: u64,
    /// Colour stored on newly created highlights
    pub highlight_color: String,
    pub overlay_removal_policy: OverlayRemovalPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewportConfig {
    pub width: u32,
    pub height: u32,
}

impl ReaderConfig {
    pub fn suppression_window(&self) -> Duration {
        Duration::from_millis(self.suppression_window_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            location_break_points: 1000,
            suppression_window_ms: 300,
            settle_delay_ms: 50,
            highlight_color: "#ffeb3b".to_string(),
            overlay_removal_policy: OverlayRemovalPolicy::Tolerate,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database: DatabaseConfig {
                url: "sqlite:./libros-reader.db".to_string(),
            },
            reader: ReaderConfig::default(),
            viewport: ViewportConfig {
                width: 600,
                height: 800,
            },
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Read configuration from the environment, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Config::default();

        Config {
            database: DatabaseConfig {
                url: env::var("READER_DATABASE_URL").unwrap_or(defaults.database.url),
            },
            reader: ReaderConfig {
                location_break_points: env_or(
                    "READER_LOCATION_BREAK_POINTS",
                    defaults.reader.location_break_points,
                )
                .max(1),
                suppression_window_ms: env_or(
                    "READER_SUPPRESSION_WINDOW_MS",
                    defaults.reader.suppression_window_ms,
                ),
                settle_delay_ms: env_or("READER_SETTLE_DELAY_MS", defaults.reader.settle_delay_ms),
                highlight_color: env::var("READER_HIGHLIGHT_COLOR")
                    .unwrap_or(defaults.reader.highlight_color),
                overlay_removal_policy: match env::var("READER_OVERLAY_REMOVAL_POLICY")
                    .unwrap_or_default()
                    .to_lowercase()
                    .as_str()
                {
                    "abort" => OverlayRemovalPolicy::Abort,
                    _ => OverlayRemovalPolicy::Tolerate,
                },
            },
            viewport: ViewportConfig {
                width: env_or("READER_VIEWPORT_WIDTH", defaults.viewport.width),
                height: env_or("READER_VIEWPORT_HEIGHT", defaults.viewport.height),
            },
        }
    }
}
