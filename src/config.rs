//! Configuration management for the annotation engine

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::annotations::{ResolutionStrategy, StorageKeys, DEFAULT_CONTEXT_WORDS};
use crate::gateway::DEFAULT_PALETTE;
use crate::html::OverlayConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub anchoring: AnchoringConfig,
    pub overlay: OverlayConfig,
    /// Highlight colors a selection may request
    pub palette: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory used by the file backend
    pub dir: PathBuf,
    pub keys: StorageKeys,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnchoringConfig {
    /// Words of context recorded on each side of a quote
    pub context_words: usize,
    pub strategy: ResolutionStrategy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage: StorageConfig {
                dir: PathBuf::from("./annotations"),
                keys: StorageKeys::default(),
            },
            anchoring: AnchoringConfig {
                context_words: DEFAULT_CONTEXT_WORDS,
                strategy: ResolutionStrategy::default(),
            },
            overlay: OverlayConfig::default(),
            palette: DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl Config {
    /// Load `.env` if present, then read the environment
    pub fn from_dotenv() -> Self {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!("No .env loaded: {}", e);
        }
        Self::from_env()
    }

    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    ///
    /// Missing variables keep their defaults; unparseable ones are logged and
    /// also keep their defaults.
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        Config {
            storage: StorageConfig {
                dir: lookup("ANNOTATIONS_STORE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.dir),
                keys: StorageKeys {
                    highlights: lookup("ANNOTATIONS_HIGHLIGHTS_KEY")
                        .unwrap_or(defaults.storage.keys.highlights),
                    notes: lookup("ANNOTATIONS_NOTES_KEY").unwrap_or(defaults.storage.keys.notes),
                },
            },
            anchoring: AnchoringConfig {
                context_words: parse_var(
                    &lookup,
                    "ANNOTATIONS_CONTEXT_WORDS",
                    defaults.anchoring.context_words,
                ),
                strategy: parse_var(&lookup, "ANNOTATIONS_RESOLUTION", defaults.anchoring.strategy),
            },
            overlay: OverlayConfig {
                class_prefix: lookup("ANNOTATIONS_CLASS_PREFIX")
                    .unwrap_or(defaults.overlay.class_prefix),
                include_inline_styles: lookup("ANNOTATIONS_INLINE_STYLES")
                    .and_then(|v| parse_flag("ANNOTATIONS_INLINE_STYLES", &v))
                    .unwrap_or(defaults.overlay.include_inline_styles),
                ..defaults.overlay
            },
            palette: lookup("ANNOTATIONS_PALETTE")
                .and_then(|v| parse_palette(&v))
                .unwrap_or(defaults.palette),
        }
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|e| {
            tracing::warn!("Invalid {}={:?}: {}, using default", key, raw, e);
            default
        }),
        None => default,
    }
}

fn parse_flag(key: &str, raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!("Invalid {}={:?}, using default", key, raw);
            None
        }
    }
}

fn parse_palette(raw: &str) -> Option<Vec<String>> {
    let colors: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();

    if colors.is_empty() {
        tracing::warn!("Empty ANNOTATIONS_PALETTE, using default");
        return None;
    }
    Some(colors)
}
