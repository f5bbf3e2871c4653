use std::sync::atomic::{AtomicU64, Ordering};

use finsight_core::{OcrDraft, OcrExtraction, Transaction, TransactionDraft, TransactionType};
use log::{info, warn};
use tokio::sync::watch;

use crate::error::{ClientError, Result};
use crate::mutations::MutationCoordinator;
use crate::services::MlApi;
use crate::uploads::UploadFile;
use crate::util::time::today;

pub const DEFAULT_CATEGORY: &str = "Other";
pub const DEFAULT_DESCRIPTION: &str = "Receipt upload";

/// An extraction held for the user to check. Edits touch `draft` only;
/// `extraction` keeps what OCR returned.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptReview {
    pub extraction: OcrExtraction,
    pub draft: OcrDraft,
}

impl ReceiptReview {
    pub fn new(extraction: OcrExtraction) -> Self {
        let draft = extraction.draft_transaction.clone();
        Self { extraction, draft }
    }

    pub fn raw_text(&self) -> &str {
        &self.extraction.raw_text
    }

    /// Confirm needs an amount. Zero counts as present.
    pub fn can_confirm(&self) -> bool {
        self.draft.amount.is_some()
    }

    /// The transaction confirm would create, with defaults filled in.
    pub fn resolved(&self, today: &str) -> TransactionDraft {
        TransactionDraft {
            amount: self.draft.amount.unwrap_or(0.0),
            kind: self.draft.kind.unwrap_or(TransactionType::Expense),
            category: Some(
                non_blank(&self.draft.category)
                    .unwrap_or(DEFAULT_CATEGORY)
                    .to_string(),
            ),
            description: non_blank(&self.draft.description)
                .unwrap_or(DEFAULT_DESCRIPTION)
                .to_string(),
            date: non_blank(&self.draft.date)
                .map(str::to_string)
                .unwrap_or_else(|| today.to_string()),
        }
    }

    /// Names of the fields `resolved` would fill with a default.
    pub fn defaulted_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.draft.amount.is_none() {
            fields.push("amount");
        }
        if self.draft.kind.is_none() {
            fields.push("type");
        }
        if non_blank(&self.draft.category).is_none() {
            fields.push("category");
        }
        if non_blank(&self.draft.description).is_none() {
            fields.push("description");
        }
        if non_blank(&self.draft.date).is_none() {
            fields.push("date");
        }
        fields
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReceiptState {
    Idle,
    Extracting,
    Reviewing(ReceiptReview),
    Confirming(ReceiptReview),
    Confirmed(Transaction),
    Abandoned,
    Failed(ClientError),
}

/// Receipt OCR interaction: extract, review, then an explicit confirm.
/// Extraction never writes; confirm creates at most one transaction.
pub struct ReceiptScan {
    ml: MlApi,
    mutations: MutationCoordinator,
    state: watch::Sender<ReceiptState>,
    /// Bumped by every extract and abandon; stale extraction results compare unequal.
    run: AtomicU64,
}

impl ReceiptScan {
    pub fn new(ml: MlApi, mutations: MutationCoordinator) -> Self {
        let (state, _) = watch::channel(ReceiptState::Idle);
        Self {
            ml,
            mutations,
            state,
            run: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> ReceiptState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ReceiptState> {
        self.state.subscribe()
    }

    /// Starts a new extraction, discarding any draft under review. Returns
    /// `None` when the run was abandoned or superseded before OCR answered.
    pub async fn extract(&self, file: UploadFile) -> Result<Option<ReceiptReview>> {
        let mut run = None;
        self.state.send_if_modified(|state| {
            if matches!(state, ReceiptState::Confirming(_)) {
                return false;
            }
            run = Some(self.run.fetch_add(1, Ordering::SeqCst) + 1);
            *state = ReceiptState::Extracting;
            true
        });
        let run = run.ok_or_else(|| ClientError::Busy("a receipt is being confirmed".to_string()))?;

        info!("extracting receipt {}", file.file_name);
        let mut guard = ExtractionGuard {
            scan: self,
            run,
            armed: true,
        };
        let outcome = self.ml.ocr(file).await;
        guard.armed = false;

        let mut result = Ok(None);
        self.state.send_if_modified(|state| {
            if self.run.load(Ordering::SeqCst) != run {
                info!("discarding extraction for an abandoned receipt");
                return false;
            }
            match &outcome {
                Ok(extraction) => {
                    let review = ReceiptReview::new(extraction.clone());
                    *state = ReceiptState::Reviewing(review.clone());
                    result = Ok(Some(review));
                }
                Err(err) => {
                    warn!("receipt extraction failed: {}", err);
                    *state = ReceiptState::Failed(err.clone());
                    result = Err(err.clone());
                }
            }
            true
        });
        result
    }

    /// Applies `change` to the draft under review and returns the result.
    pub fn edit(&self, change: impl FnOnce(&mut OcrDraft)) -> Result<ReceiptReview> {
        let mut edited = None;
        self.state.send_if_modified(|state| match state {
            ReceiptState::Reviewing(review) => {
                change(&mut review.draft);
                edited = Some(review.clone());
                true
            }
            _ => false,
        });
        edited.ok_or_else(|| ClientError::Validation("no receipt under review".to_string()))
    }

    pub fn can_confirm(&self) -> bool {
        matches!(&*self.state.borrow(), ReceiptState::Reviewing(review) if review.can_confirm())
    }

    /// Creates the transaction for the reviewed draft. The move to
    /// `Confirming` is atomic, so a repeated confirm gets `Busy`.
    pub async fn confirm(&self) -> Result<Transaction> {
        let mut taken = Err(ClientError::Validation("no receipt to confirm".to_string()));
        self.state.send_if_modified(|state| match state {
            ReceiptState::Reviewing(review) if review.can_confirm() => {
                let review = review.clone();
                taken = Ok(review.clone());
                *state = ReceiptState::Confirming(review);
                true
            }
            ReceiptState::Reviewing(_) => {
                taken = Err(ClientError::Validation("receipt amount is missing".to_string()));
                false
            }
            ReceiptState::Confirming(_) => {
                taken = Err(ClientError::Busy("receipt confirm already in flight".to_string()));
                false
            }
            _ => false,
        });
        let review = taken?;

        let draft = review.resolved(&today());
        match self.mutations.create_transaction(&draft).await {
            Ok(transaction) => {
                self.state
                    .send_replace(ReceiptState::Confirmed(transaction.clone()));
                Ok(transaction)
            }
            Err(err) => {
                warn!("receipt confirm failed: {}", err);
                self.state.send_replace(ReceiptState::Failed(err.clone()));
                Err(err)
            }
        }
    }

    /// Drops the draft or pending extraction. No request is made. Returns
    /// false while a confirm is in flight, since that cannot be taken back.
    pub fn abandon(&self) -> bool {
        let mut abandoned = false;
        self.state.send_if_modified(|state| match state {
            ReceiptState::Confirming(_) => false,
            _ => {
                self.run.fetch_add(1, Ordering::SeqCst);
                *state = ReceiptState::Abandoned;
                abandoned = true;
                true
            }
        });
        abandoned
    }
}

/// Puts a dropped extraction back to `Idle` so subscribers are not left
/// waiting on a request nobody is polling.
struct ExtractionGuard<'a> {
    scan: &'a ReceiptScan,
    run: u64,
    armed: bool,
}

impl Drop for ExtractionGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.scan.state.send_if_modified(|state| {
            if self.scan.run.load(Ordering::SeqCst) != self.run
                || !matches!(state, ReceiptState::Extracting)
            {
                return false;
            }
            info!("receipt extraction cancelled");
            *state = ReceiptState::Idle;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(draft: OcrDraft) -> ReceiptReview {
        ReceiptReview::new(OcrExtraction {
            draft_transaction: draft,
            raw_text: "TOTAL 12.00".to_string(),
        })
    }

    #[test]
    fn resolved_fills_every_missing_field() {
        let review = review(OcrDraft {
            amount: Some(12.0),
            description: Some("  ".to_string()),
            ..OcrDraft::default()
        });

        let draft = review.resolved("2025-06-01");

        assert_eq!(draft.amount, 12.0);
        assert_eq!(draft.kind, TransactionType::Expense);
        assert_eq!(draft.category.as_deref(), Some("Other"));
        assert_eq!(draft.description, "Receipt upload");
        assert_eq!(draft.date, "2025-06-01");
        assert_eq!(
            review.defaulted_fields(),
            vec!["type", "category", "description", "date"]
        );
    }

    #[test]
    fn zero_amount_can_be_confirmed() {
        assert!(review(OcrDraft {
            amount: Some(0.0),
            ..OcrDraft::default()
        })
        .can_confirm());
        assert!(!review(OcrDraft::default()).can_confirm());
    }
}
