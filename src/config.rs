// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Engine configuration
//!
//! Loaded from a TOML file, then overridden by environment variables.

use crate::error::{MeshError, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ENV_THREADS: &str = "MESHINTERSECT_THREADS";
pub const ENV_HOLE_TOLERANT: &str = "MESHINTERSECT_HOLE_TOLERANT";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IntersectConfig {
    /// Worker threads; `None` runs on the global rayon pool
    pub threads: Option<usize>,
    /// Intersect triangles of the same operand with each other
    pub use_self: bool,
    /// Classify every triangle separately in booleans
    pub hole_tolerant: bool,
}

impl IntersectConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| MeshError::io(path, e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| MeshError::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| MeshError::Config(e.to_string()))
    }

    /// Optional file, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Apply `MESHINTERSECT_THREADS` and `MESHINTERSECT_HOLE_TOLERANT`
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(
            std::env::var(ENV_THREADS).ok().as_deref(),
            std::env::var(ENV_HOLE_TOLERANT).ok().as_deref(),
        )
    }

    fn apply_overrides(&mut self, threads: Option<&str>, hole_tolerant: Option<&str>) -> Result<()> {
        if let Some(threads) = threads {
            let n: usize = threads
                .trim()
                .parse()
                .map_err(|_| MeshError::Config(format!("{ENV_THREADS}={threads} is not a count")))?;
            self.threads = (n > 0).then_some(n);
        }
        if let Some(flag) = hole_tolerant {
            self.hole_tolerant = match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                other => {
                    return Err(MeshError::Config(format!("{ENV_HOLE_TOLERANT}={other} is not a flag")))
                }
            };
        }
        Ok(())
    }

    /// Run `op` with the configured worker count
    pub fn install<R, F>(&self, op: F) -> Result<R>
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        match self.threads {
            None => Ok(op()),
            Some(n) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| MeshError::Config(e.to_string()))?;
                debug!("running on a pool of {n} threads");
                Ok(pool.install(op))
            }
        }
    }
}
