//! Note detail retrieval with malformed-payload capture.

use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{DetailRecord, Note};
use crate::services::source::{AuthContext, NoteSource};
use crate::storage::DatasetStorage;
use crate::utils::log::Logger;

/// Fetches and parses note details, keeping malformed payloads in the error store.
#[derive(Clone)]
pub struct DetailFetcher {
    source: Arc<dyn NoteSource>,
    storage: Arc<dyn DatasetStorage>,
    logger: Logger,
}

impl DetailFetcher {
    pub fn new(source: Arc<dyn NoteSource>, storage: Arc<dyn DatasetStorage>, logger: Logger) -> Self {
        Self {
            source,
            storage,
            logger,
        }
    }

    pub async fn fetch(&self, note: &Note, auth: &AuthContext) -> Result<DetailRecord> {
        let result = match self.source.fetch_detail(&note.id, &note.token, auth).await {
            Ok(payload) => DetailRecord::from_payload(&note.id, &payload),
            Err(e) => Err(e),
        };

        if let Err(AppError::Malformed { kind, raw, .. }) = &result {
            match self.storage.save_error_payload(&note.id, kind, raw).await {
                Ok(path) => self.logger.warn(&format!(
                    "Malformed detail for {} saved to {}",
                    note.id,
                    path.display()
                )),
                Err(e) => self.logger.error(&format!(
                    "Could not save malformed detail for {}: {}",
                    note.id, e
                )),
            }
        }

        result
    }
}
