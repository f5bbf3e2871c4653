use finsight_core::UploadBatchResult;
use log::{info, warn};
use tokio::sync::watch;

use crate::error::{ClientError, Result};
use crate::mutations::{MutationCoordinator, TRANSACTION_REGIONS};
use crate::services::TransactionsApi;
use crate::uploads::UploadFile;

#[derive(Debug, Clone, PartialEq)]
pub enum ImportState {
    Idle,
    Uploading,
    Succeeded(UploadBatchResult),
    Failed(ClientError),
}

impl ImportState {
    pub fn is_uploading(&self) -> bool {
        matches!(self, ImportState::Uploading)
    }
}

/// One bulk spreadsheet import interaction. The upload is a single
/// irreversible request; a failed one is retried only by uploading again.
pub struct BulkImport {
    transactions: TransactionsApi,
    mutations: MutationCoordinator,
    state: watch::Sender<ImportState>,
}

impl BulkImport {
    pub fn new(transactions: TransactionsApi, mutations: MutationCoordinator) -> Self {
        let (state, _) = watch::channel(ImportState::Idle);
        Self {
            transactions,
            mutations,
            state,
        }
    }

    pub fn state(&self) -> ImportState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ImportState> {
        self.state.subscribe()
    }

    pub async fn upload(&self, file: UploadFile) -> Result<UploadBatchResult> {
        let started = self.state.send_if_modified(|state| {
            if state.is_uploading() {
                false
            } else {
                *state = ImportState::Uploading;
                true
            }
        });
        if !started {
            return Err(ClientError::Busy("an import is already uploading".to_string()));
        }

        info!("importing {} ({} bytes)", file.file_name, file.bytes.len());
        match self.transactions.upload_excel(file).await {
            Ok(batch) => {
                info!("backend imported {} transactions", batch.imported_count);
                self.mutations.invalidate(&TRANSACTION_REGIONS);
                self.state.send_replace(ImportState::Succeeded(batch.clone()));
                Ok(batch)
            }
            Err(err) => {
                warn!("import failed: {}", err);
                self.state.send_replace(ImportState::Failed(err.clone()));
                Err(err)
            }
        }
    }

    /// Back to `Idle` after a result was shown. Ignored while uploading.
    pub fn reset(&self) {
        self.state.send_if_modified(|state| match state {
            ImportState::Uploading | ImportState::Idle => false,
            _ => {
                *state = ImportState::Idle;
                true
            }
        });
    }
}
