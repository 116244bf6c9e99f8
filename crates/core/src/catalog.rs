//! Read-through cache of the model and quality lists offered in the render
//! dropdowns. The owner fetches and hands the result to [`ModelCatalog::apply`];
//! applying is idempotent and a failed fetch keeps what was loaded before.

use tracing::{debug, warn};

use crate::backend::CatalogListing;
use crate::errors::BackendError;
use crate::models::Quality;

#[derive(Debug, Clone, PartialEq)]
pub struct ModelCatalog {
    models: Vec<String>,
    qualities: Vec<Quality>,
    loaded: bool,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            qualities: Quality::ALL.to_vec(),
            loaded: false,
        }
    }
}

impl ModelCatalog {
    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn qualities(&self) -> &[Quality] {
        &self.qualities
    }

    /// Whether at least one refresh succeeded.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Apply a fetch result. An empty quality list from the server keeps the
    /// built-in tiers.
    pub fn apply(&mut self, result: Result<CatalogListing, BackendError>) -> Result<(), BackendError> {
        match result {
            Ok(listing) => {
                debug!(
                    models = listing.models.len(),
                    qualities = listing.qualities.len(),
                    "model catalog refreshed"
                );
                self.models = listing.models;
                if !listing.qualities.is_empty() {
                    self.qualities = listing.qualities;
                }
                self.loaded = true;
                Ok(())
            }
            Err(e) => {
                warn!(
                    kind = e.kind(),
                    error = %e,
                    "model catalog refresh failed, keeping previous lists"
                );
                Err(e)
            }
        }
    }
}
