//! Configuration system for Trellis.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $TRELLIS_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/trellis/config.toml
//!   3. ~/.config/trellis/config.toml

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::DEFAULT_FORWARD_HOPS;
use crate::ring::DEFAULT_POINTS_PER_NODE;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub placement: PlacementConfig,
    pub delivery: DeliveryConfig,
}

/// Which point hasher the cluster agreed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HasherKind {
    Blake3,
    Crc32,
}

/// Which ring variant to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RingKind {
    /// Snapshot-swapping ring; reads never wait on each other.
    Shared,
    /// Single-mutex ring; simplest form.
    Locked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    /// Virtual points per physical node.
    pub points_per_node: u32,
    /// Passive backups placed per actor (ring successors after the owner).
    pub standby_count: usize,
    /// Point hash function. All nodes must agree.
    pub hasher: HasherKind,
    /// Ring concurrency variant. Local choice; does not affect placement.
    pub ring: RingKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Max forward hops before a bouncing deliver is dropped.
    pub forward_hop_limit: u8,
    /// Seconds a buffered payload stays pinned for an unreachable node.
    pub retention_secs: u64,
    /// Seconds between retainer expiry sweeps.
    pub sweep_secs: u64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            placement: PlacementConfig::default(),
            delivery: DeliveryConfig::default(),
        }
    }
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            points_per_node: DEFAULT_POINTS_PER_NODE,
            standby_count: 1,
            hasher: HasherKind::Blake3,
            ring: RingKind::Shared,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            forward_hop_limit: DEFAULT_FORWARD_HOPS,
            retention_secs: 20,
            sweep_secs: 5,
        }
    }
}

impl DeliveryConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_secs)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("trellis")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl GridConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            GridConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("TRELLIS_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&GridConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply TRELLIS_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("TRELLIS_PLACEMENT__POINTS_PER_NODE") {
            if let Ok(n) = v.parse() {
                self.placement.points_per_node = n;
            }
        }
        if let Ok(v) = std::env::var("TRELLIS_PLACEMENT__STANDBY_COUNT") {
            if let Ok(n) = v.parse() {
                self.placement.standby_count = n;
            }
        }
        if let Ok(v) = std::env::var("TRELLIS_PLACEMENT__HASHER") {
            match v.as_str() {
                "blake3" => self.placement.hasher = HasherKind::Blake3,
                "crc32" => self.placement.hasher = HasherKind::Crc32,
                _ => {}
            }
        }
        if let Ok(v) = std::env::var("TRELLIS_PLACEMENT__RING") {
            match v.as_str() {
                "shared" => self.placement.ring = RingKind::Shared,
                "locked" => self.placement.ring = RingKind::Locked,
                _ => {}
            }
        }
        if let Ok(v) = std::env::var("TRELLIS_DELIVERY__FORWARD_HOP_LIMIT") {
            if let Ok(n) = v.parse() {
                self.delivery.forward_hop_limit = n;
            }
        }
        if let Ok(v) = std::env::var("TRELLIS_DELIVERY__RETENTION_SECS") {
            if let Ok(n) = v.parse() {
                self.delivery.retention_secs = n;
            }
        }
        if let Ok(v) = std::env::var("TRELLIS_DELIVERY__SWEEP_SECS") {
            if let Ok(n) = v.parse() {
                self.delivery.sweep_secs = n;
            }
        }
    }
}
