//! Configuration and color scheme management.
//!
//! This module provides:
//! - TOML configuration file loading from `~/.vtcore/config.toml`
//! - Built-in color schemes (default, solarized-dark, nord, monokai)
//! - A process-wide load-once cache with an explicit reload entrypoint
//!
//! # Configuration File
//!
//! ```toml
//! # Color scheme: default, solarized-dark, nord, monokai
//! color_scheme = "nord"
//!
//! [terminal]
//! scrollback_lines = 10000
//!
//! [selection]
//! # Extra characters treated as part of a word besides alphanumerics
//! word_chars = "_-./\\:@"
//! ```
//!
//! Per-instance state (palette overrides, mode flags) is never global; only
//! the parsed configuration file is cached process-wide.

use std::fs;
use std::path::PathBuf;
use std::sync::{OnceLock, RwLock};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::TermError;
use crate::palette::Rgb;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Color scheme name
    pub color_scheme: String,
    /// Terminal settings
    pub terminal: TerminalConfig,
    /// Selection settings
    pub selection: SelectionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            color_scheme: "default".to_string(),
            terminal: TerminalConfig::default(),
            selection: SelectionConfig::default(),
        }
    }
}

/// Terminal settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Maximum scrollback lines
    pub scrollback_lines: usize,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            scrollback_lines: 10000,
        }
    }
}

/// Selection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Characters treated as word characters besides alphanumerics
    pub word_chars: String,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            word_chars: "_-./\\:@".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults.
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            if path.exists() {
                match fs::read_to_string(&path) {
                    Ok(content) => match toml::from_str(&content) {
                        Ok(config) => return config,
                        Err(e) => warn!("ignoring malformed config: {e}"),
                    },
                    Err(e) => warn!("could not read config: {e}"),
                }
            }
        }
        Self::default()
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, TermError> {
        Ok(toml::from_str(content)?)
    }

    /// Config file path
    fn config_path() -> Option<PathBuf> {
        let home = home_dir()?;
        Some(home.join(".vtcore").join("config.toml"))
    }

    /// Resolve the configured color scheme.
    pub fn scheme(&self) -> ColorScheme {
        ColorScheme::by_name(&self.color_scheme)
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// The process-wide configuration, loaded from disk on first access.
pub fn config() -> Config {
    CONFIG
        .get_or_init(|| RwLock::new(Config::load()))
        .read()
        .map(|c| c.clone())
        .unwrap_or_default()
}

/// Re-read the configuration file, replacing the cached copy.
pub fn reload_config() -> Config {
    let fresh = Config::load();
    if let Some(lock) = CONFIG.get() {
        if let Ok(mut guard) = lock.write() {
            *guard = fresh.clone();
        }
    } else {
        let _ = CONFIG.set(RwLock::new(fresh.clone()));
    }
    fresh
}

/// Color scheme: the base-16 ANSI palette plus named defaults.
#[derive(Debug, Clone)]
pub struct ColorScheme {
    pub name: &'static str,
    pub ansi: [Rgb; 16],
    pub foreground: Rgb,
    pub background: Rgb,
    pub cursor: Rgb,
    pub selection_fg: Rgb,
    pub selection_bg: Rgb,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self::default_scheme()
    }
}

impl ColorScheme {
    /// Look up a scheme by name; unknown names fall back to the default.
    pub fn by_name(name: &str) -> Self {
        match name {
            "solarized-dark" => Self::solarized_dark(),
            "nord" => Self::nord(),
            "monokai" => Self::monokai(),
            _ => Self::default_scheme(),
        }
    }

    /// Classic terminal colors
    pub fn default_scheme() -> Self {
        Self {
            name: "default",
            ansi: [
                Rgb::new(0, 0, 0),
                Rgb::new(205, 49, 49),
                Rgb::new(13, 188, 121),
                Rgb::new(229, 229, 16),
                Rgb::new(36, 114, 200),
                Rgb::new(188, 63, 188),
                Rgb::new(17, 168, 205),
                Rgb::new(229, 229, 229),
                Rgb::new(102, 102, 102),
                Rgb::new(241, 76, 76),
                Rgb::new(35, 209, 139),
                Rgb::new(245, 245, 67),
                Rgb::new(59, 142, 234),
                Rgb::new(214, 112, 214),
                Rgb::new(41, 184, 219),
                Rgb::new(255, 255, 255),
            ],
            foreground: Rgb::new(204, 204, 204),
            background: Rgb::new(12, 12, 12),
            cursor: Rgb::new(255, 255, 255),
            selection_fg: Rgb::new(0, 0, 0),
            selection_bg: Rgb::new(255, 255, 255),
        }
    }

    /// Ethan Schoonover's Solarized, dark variant
    pub fn solarized_dark() -> Self {
        Self {
            name: "solarized-dark",
            ansi: [
                Rgb::new(7, 54, 66),
                Rgb::new(220, 50, 47),
                Rgb::new(133, 153, 0),
                Rgb::new(181, 137, 0),
                Rgb::new(38, 139, 210),
                Rgb::new(211, 54, 130),
                Rgb::new(42, 161, 152),
                Rgb::new(238, 232, 213),
                Rgb::new(0, 43, 54),
                Rgb::new(203, 75, 22),
                Rgb::new(88, 110, 117),
                Rgb::new(101, 123, 131),
                Rgb::new(131, 148, 150),
                Rgb::new(108, 113, 196),
                Rgb::new(147, 161, 161),
                Rgb::new(253, 246, 227),
            ],
            foreground: Rgb::new(131, 148, 150),
            background: Rgb::new(0, 43, 54),
            cursor: Rgb::new(131, 148, 150),
            selection_fg: Rgb::new(0, 43, 54),
            selection_bg: Rgb::new(238, 232, 213),
        }
    }

    /// Arctic, bluish color palette
    pub fn nord() -> Self {
        Self {
            name: "nord",
            ansi: [
                Rgb::new(59, 66, 82),
                Rgb::new(191, 97, 106),
                Rgb::new(163, 190, 140),
                Rgb::new(235, 203, 139),
                Rgb::new(129, 161, 193),
                Rgb::new(180, 142, 173),
                Rgb::new(136, 192, 208),
                Rgb::new(229, 233, 240),
                Rgb::new(76, 86, 106),
                Rgb::new(191, 97, 106),
                Rgb::new(163, 190, 140),
                Rgb::new(235, 203, 139),
                Rgb::new(129, 161, 193),
                Rgb::new(180, 142, 173),
                Rgb::new(143, 188, 187),
                Rgb::new(236, 239, 244),
            ],
            foreground: Rgb::new(216, 222, 233),
            background: Rgb::new(46, 52, 64),
            cursor: Rgb::new(216, 222, 233),
            selection_fg: Rgb::new(46, 52, 64),
            selection_bg: Rgb::new(136, 192, 208),
        }
    }

    /// Sublime Text inspired
    pub fn monokai() -> Self {
        Self {
            name: "monokai",
            ansi: [
                Rgb::new(39, 40, 34),
                Rgb::new(249, 38, 114),
                Rgb::new(166, 226, 46),
                Rgb::new(244, 191, 117),
                Rgb::new(102, 217, 239),
                Rgb::new(174, 129, 255),
                Rgb::new(161, 239, 228),
                Rgb::new(248, 248, 242),
                Rgb::new(117, 113, 94),
                Rgb::new(249, 38, 114),
                Rgb::new(166, 226, 46),
                Rgb::new(244, 191, 117),
                Rgb::new(102, 217, 239),
                Rgb::new(174, 129, 255),
                Rgb::new(161, 239, 228),
                Rgb::new(249, 248, 245),
            ],
            foreground: Rgb::new(248, 248, 242),
            background: Rgb::new(39, 40, 34),
            cursor: Rgb::new(248, 248, 240),
            selection_fg: Rgb::new(39, 40, 34),
            selection_bg: Rgb::new(73, 72, 62),
        }
    }
}
