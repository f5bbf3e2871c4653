use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use finsight_core::{TaxSettings, Transaction, TransactionDraft, TransactionPatch, TransactionType};
use log::{debug, info};

use crate::cache::QueryCache;
use crate::error::{ClientError, Result};
use crate::services::ApiServices;
use crate::services::resources::{
    DASHBOARD_BREAKDOWN, DASHBOARD_CASHFLOW, DASHBOARD_SUMMARY, TAX_ESTIMATE, TAX_SETTINGS,
    TRANSACTIONS,
};
use crate::util::time::{normalize_date, today};

/// Regions refreshed after any transaction write, bulk imports included.
pub const TRANSACTION_REGIONS: [&str; 4] = [
    TRANSACTIONS,
    DASHBOARD_SUMMARY,
    DASHBOARD_BREAKDOWN,
    DASHBOARD_CASHFLOW,
];

pub const TAX_SETTINGS_REGIONS: [&str; 2] = [TAX_SETTINGS, TAX_ESTIMATE];

/// Runs writes against the backend and invalidates what they affect.
/// Nothing is applied to the cache before the backend confirms.
#[derive(Clone)]
pub struct MutationCoordinator {
    api: ApiServices,
    cache: QueryCache,
}

impl MutationCoordinator {
    pub fn new(api: ApiServices, cache: QueryCache) -> Self {
        Self { api, cache }
    }

    pub async fn create_transaction(&self, draft: &TransactionDraft) -> Result<Transaction> {
        let created = self.api.transactions.create(draft).await?;
        info!("created transaction {}", created.id);
        self.invalidate(&TRANSACTION_REGIONS);
        Ok(created)
    }

    pub async fn update_transaction(
        &self,
        id: i64,
        patch: &TransactionPatch,
    ) -> Result<Transaction> {
        if patch.is_empty() {
            return Err(ClientError::Validation("nothing to update".to_string()));
        }
        let updated = self.api.transactions.update(id, patch).await?;
        info!("updated transaction {}", id);
        self.invalidate(&TRANSACTION_REGIONS);
        Ok(updated)
    }

    pub async fn delete_transaction(&self, id: i64) -> Result<()> {
        self.api.transactions.delete(id).await?;
        info!("deleted transaction {}", id);
        self.invalidate(&TRANSACTION_REGIONS);
        Ok(())
    }

    pub async fn save_tax_settings(&self, settings: &TaxSettings) -> Result<TaxSettings> {
        let saved = self.api.tax.save_settings(settings).await?;
        self.invalidate(&TAX_SETTINGS_REGIONS);
        Ok(saved)
    }

    pub(crate) fn invalidate(&self, regions: &[&str]) {
        let count = self.cache.invalidate_all(regions);
        debug!("mutation invalidated {} entries", count);
    }
}

/// Raw form input for a transaction, before advisory validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionForm {
    pub amount: String,
    pub kind: String,
    pub category: String,
    pub description: String,
    pub date: String,
}

impl TransactionForm {
    /// Only the amount is checked strictly. A blank type means expense and
    /// a blank date means today; everything else is left to the backend.
    pub fn to_draft(&self) -> Result<TransactionDraft> {
        let amount = parse_amount(&self.amount)?;
        let kind = if self.kind.trim().is_empty() {
            TransactionType::default()
        } else {
            self.kind.parse().map_err(ClientError::Validation)?
        };
        let date = if self.date.trim().is_empty() {
            today()
        } else {
            normalize_date(&self.date)?
        };
        let category = Some(self.category.trim())
            .filter(|category| !category.is_empty())
            .map(str::to_string);
        Ok(TransactionDraft {
            amount,
            kind,
            category,
            description: self.description.trim().to_string(),
            date,
        })
    }
}

pub fn parse_amount(raw: &str) -> Result<f64> {
    let amount: f64 = raw
        .trim()
        .parse()
        .map_err(|_| ClientError::Validation(format!("amount must be a number, got {:?}", raw)))?;
    if !amount.is_finite() {
        return Err(ClientError::Validation("amount must be finite".to_string()));
    }
    Ok(amount)
}

/// Disables one submit control while its own request is pending. Separate
/// controls hold separate instances and never block each other.
#[derive(Debug, Clone, Default)]
pub struct SubmitControl {
    pending: Arc<AtomicBool>,
}

impl SubmitControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    pub async fn run<T, F>(&self, submit: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self
            .pending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ClientError::Busy("already submitting".to_string()));
        }
        let _guard = PendingGuard(&self.pending);
        submit.await
    }
}

struct PendingGuard<'a>(&'a AtomicBool);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_requires_numeric_amount() {
        let form = TransactionForm {
            amount: "12,50".to_string(),
            ..TransactionForm::default()
        };
        assert!(matches!(form.to_draft(), Err(ClientError::Validation(_))));
        assert!(parse_amount("inf").is_err());
        assert_eq!(parse_amount(" -500 ").expect("amount"), -500.0);
    }

    #[test]
    fn form_fills_defaults() {
        let form = TransactionForm {
            amount: "42.5".to_string(),
            kind: "Income".to_string(),
            category: "  ".to_string(),
            description: " Invoice 12 ".to_string(),
            date: "2025-03-01".to_string(),
        };
        let draft = form.to_draft().expect("draft");
        assert_eq!(draft.amount, 42.5);
        assert_eq!(draft.kind, TransactionType::Income);
        assert_eq!(draft.category, None);
        assert_eq!(draft.description, "Invoice 12");
        assert_eq!(draft.date, "2025-03-01");
    }

    #[tokio::test]
    async fn submit_control_rejects_overlapping_runs() {
        let control = SubmitControl::new();
        let (release, wait) = tokio::sync::oneshot::channel::<()>();

        let first = control.run(async move {
            wait.await.ok();
            Ok(1)
        });
        let second = async {
            tokio::task::yield_now().await;
            assert!(control.is_pending());
            let result = control.run(async { Ok(2) }).await;
            release.send(()).ok();
            result
        };
        let (first, second) = tokio::join!(first, second);

        assert_eq!(first.expect("first"), 1);
        assert!(matches!(second, Err(ClientError::Busy(_))));
        assert!(!control.is_pending());
        assert_eq!(control.run(async { Ok(3) }).await.expect("third"), 3);
    }
}
