//! DTC descriptions with configurable overrides

use std::collections::HashMap;

use cansim_core::{describe, DtcCode};

/// Built-in DTC descriptions plus entries from the vehicle configuration
#[derive(Debug, Clone, Default)]
pub struct DtcCatalog {
    overrides: HashMap<DtcCode, String>,
}

impl DtcCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_description(mut self, code: DtcCode, description: impl Into<String>) -> Self {
        self.overrides.insert(code, description.into());
        self
    }

    pub fn describe(&self, code: &DtcCode) -> String {
        match self.overrides.get(code) {
            Some(description) => description.clone(),
            None => describe(code).to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}
