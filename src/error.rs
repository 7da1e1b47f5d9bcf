// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Error types for the file and configuration layers

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("STL error: {0}")]
    Stl(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("face {face} has {size} vertices, expected a triangle")]
    NonTriangle { face: usize, size: usize },
}

impl MeshError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MeshError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        MeshError::Parse {
            line,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MeshError>;
