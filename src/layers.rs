// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Custom-data layer registry
//!
//! Describes the per-element data layers stored next to a mesh in an
//! external data file. Only the layer table is modelled; layer payloads are
//! opaque byte counts.

use crate::error::{MeshError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Longest layer name in bytes
pub const LAYER_NAME_MAX: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LayerFileType {
    #[default]
    Mesh,
    Image,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerInfo {
    pub layer_type: i32,
    pub name: String,
    /// Payload size in bytes
    pub datasize: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LayerFile {
    pub file_type: LayerFileType,
    pub layers: Vec<LayerInfo>,
}

/// Cut `name` to at most [`LAYER_NAME_MAX`] bytes on a char boundary
fn truncate_name(name: &str) -> String {
    if name.len() <= LAYER_NAME_MAX {
        return name.to_string();
    }
    let mut end = LAYER_NAME_MAX;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

impl LayerFile {
    pub fn new(file_type: LayerFileType) -> Self {
        Self {
            file_type,
            layers: Vec::new(),
        }
    }

    pub fn totlayer(&self) -> usize {
        self.layers.len()
    }

    /// Sum of all layer payload sizes
    pub fn total_datasize(&self) -> u64 {
        self.layers.iter().map(|l| l.datasize).sum()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| MeshError::io(path, e))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| MeshError::io(path, e))?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Append a layer. Earlier layers are left untouched.
pub fn cdf_layer_add<'a>(cdf: &'a mut LayerFile, layer_type: i32, name: &str, datasize: u64) -> &'a LayerInfo {
    cdf.layers.push(LayerInfo {
        layer_type,
        name: truncate_name(name),
        datasize,
    });
    &cdf.layers[cdf.layers.len() - 1]
}

/// First layer with the given type and name. Lookup names are truncated
/// the same way stored names are.
pub fn cdf_layer_find<'a>(cdf: &'a LayerFile, layer_type: i32, name: &str) -> Option<&'a LayerInfo> {
    let name = truncate_name(name);
    cdf.layers
        .iter()
        .find(|l| l.layer_type == layer_type && l.name == name)
}
