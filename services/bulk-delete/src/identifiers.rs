//! Identifier file loading
//!
//! The file holds a JSON array of documents as the store lists them:
//! `[{"id": "a", "_rid": "...", "partitionKey": "pk"}, ...]`. Extra fields are
//! ignored, so a raw query export can be passed straight through.

use std::path::Path;

use docstore::DocumentIdentifier;

use crate::error::{Error, Result};

pub fn load(path: &Path) -> Result<Vec<DocumentIdentifier>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::Identifiers(format!("failed to read {}: {e}", path.display())))?;
    parse(&contents).map_err(|e| Error::Identifiers(format!("{}: {e}", path.display())))
}

fn parse(contents: &str) -> common::Result<Vec<DocumentIdentifier>> {
    Ok(serde_json::from_str(contents)?)
}
