use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Local, NaiveDate};
use rand::RngCore;

use finsight_core::{
    RegisterRequest, TaxSettings, Transaction, TransactionDraft, TransactionFilter,
    TransactionPatch, TransactionSource, TransactionType, UserProfile,
};

use crate::errors::StubError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub bearer: Option<String>,
}

#[derive(Debug, Clone)]
struct StubUser {
    profile: UserProfile,
    password: String,
}

#[derive(Debug, Default)]
struct StubData {
    users: Vec<StubUser>,
    tokens: HashMap<String, i64>,
    queued_tokens: VecDeque<String>,
    transactions: Vec<Transaction>,
    tax_settings: HashMap<i64, TaxSettings>,
    requests: Vec<RecordedRequest>,
    next_user_id: i64,
    next_transaction_id: i64,
}

/// In-memory backend state shared by every handler.
#[derive(Clone, Default)]
pub struct StubState {
    data: Arc<Mutex<StubData>>,
}

impl StubState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next issued access token `token` instead of a random one.
    pub fn queue_token(&self, token: impl Into<String>) {
        self.lock().queued_tokens.push_back(token.into());
    }

    pub fn seed_user(&self, email: &str, password: &str) -> i64 {
        let mut data = self.lock();
        data.next_user_id += 1;
        let id = data.next_user_id;
        data.users.push(StubUser {
            profile: UserProfile {
                id,
                first_name: "Test".to_string(),
                last_name: "User".to_string(),
                email: Some(email.to_string()),
                phone: None,
            },
            password: password.to_string(),
        });
        id
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub fn requests_to(&self, method: &str, path: &str) -> Vec<RecordedRequest> {
        self.lock()
            .requests
            .iter()
            .filter(|request| request.method == method && request.path == path)
            .cloned()
            .collect()
    }

    pub fn transaction_count(&self, user_id: i64) -> usize {
        self.lock()
            .transactions
            .iter()
            .filter(|transaction| transaction.user_id == user_id)
            .count()
    }

    pub(crate) fn record(&self, request: RecordedRequest) {
        self.lock().requests.push(request);
    }

    pub(crate) fn user_for_token(&self, token: &str) -> Option<i64> {
        self.lock().tokens.get(token).copied()
    }

    pub(crate) fn register(&self, request: RegisterRequest) -> Result<String, StubError> {
        if request.email.trim().is_empty() || request.password.is_empty() {
            return Err(StubError::bad_request("email and password are required"));
        }
        let mut data = self.lock();
        if data.users.iter().any(|user| {
            user.profile.email.as_deref() == Some(request.email.trim())
        }) {
            return Err(StubError::conflict("user already exists"));
        }
        data.next_user_id += 1;
        let id = data.next_user_id;
        data.users.push(StubUser {
            profile: UserProfile {
                id,
                first_name: request.first_name,
                last_name: request.last_name,
                email: Some(request.email.trim().to_string()),
                phone: request.phone,
            },
            password: request.password,
        });
        Ok(issue_token(&mut data, id))
    }

    pub(crate) fn login(&self, identifier: &str, password: &str) -> Result<String, StubError> {
        let mut data = self.lock();
        let user_id = data
            .users
            .iter()
            .find(|user| {
                let identifier = Some(identifier.trim());
                (user.profile.email.as_deref() == identifier
                    || user.profile.phone.as_deref() == identifier)
                    && user.password == password
            })
            .map(|user| user.profile.id)
            .ok_or_else(|| StubError::unauthorized("invalid credentials"))?;
        Ok(issue_token(&mut data, user_id))
    }

    pub(crate) fn profile(&self, user_id: i64) -> Result<UserProfile, StubError> {
        self.lock()
            .users
            .iter()
            .find(|user| user.profile.id == user_id)
            .map(|user| user.profile.clone())
            .ok_or_else(|| StubError::not_found("user not found"))
    }

    /// Matching rows, newest first, plus the total before paging.
    pub(crate) fn list(&self, user_id: i64, filter: &TransactionFilter) -> (Vec<Transaction>, u64) {
        let data = self.lock();
        let mut rows: Vec<Transaction> = data
            .transactions
            .iter()
            .filter(|row| row.user_id == user_id)
            .filter(|row| filter.kind.is_none_or(|kind| row.kind == kind))
            .filter(|row| {
                filter
                    .category
                    .as_deref()
                    .is_none_or(|category| row.category.eq_ignore_ascii_case(category))
            })
            .filter(|row| {
                filter
                    .date_from
                    .as_deref()
                    .is_none_or(|from| row.date.as_str() >= from)
            })
            .filter(|row| filter.date_to.as_deref().is_none_or(|to| row.date.as_str() <= to))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
        let total = rows.len() as u64;
        let page = filter.page.unwrap_or(1).max(1) as usize;
        let page_size = filter.page_size.unwrap_or(20).clamp(1, 100) as usize;
        let rows = rows
            .into_iter()
            .skip((page - 1) * page_size)
            .take(page_size)
            .collect();
        (rows, total)
    }

    pub(crate) fn create(
        &self,
        user_id: i64,
        draft: TransactionDraft,
        source: TransactionSource,
    ) -> Result<Transaction, StubError> {
        let date = NaiveDate::parse_from_str(draft.date.trim(), "%Y-%m-%d")
            .map(|date| date.format("%Y-%m-%d").to_string())
            .map_err(|_| StubError::bad_request("invalid date format, use YYYY-MM-DD"))?;
        if draft.amount <= 0.0 {
            return Err(StubError::bad_request("amount must be positive"));
        }
        let category = draft
            .category
            .filter(|category| !category.trim().is_empty())
            .unwrap_or_else(|| suggest_category(&draft.description, draft.kind).to_string());
        let row = NewRow {
            amount: draft.amount,
            kind: draft.kind,
            category,
            description: draft.description,
            date,
        };
        Ok(insert(&mut self.lock(), user_id, row, source))
    }

    pub(crate) fn update(
        &self,
        user_id: i64,
        id: i64,
        patch: TransactionPatch,
    ) -> Result<Transaction, StubError> {
        let date = patch
            .date
            .as_deref()
            .map(|raw| parse_date(raw).ok_or_else(|| StubError::bad_request("invalid date format")))
            .transpose()?;
        let mut data = self.lock();
        let row = data
            .transactions
            .iter_mut()
            .find(|row| row.id == id && row.user_id == user_id)
            .ok_or_else(|| StubError::bad_request("transaction not found"))?;
        if let Some(amount) = patch.amount {
            row.amount = amount;
        }
        if let Some(kind) = patch.kind {
            row.kind = kind;
        }
        if let Some(category) = patch.category {
            row.category = category;
        }
        if let Some(description) = patch.description {
            row.description = description;
        }
        if let Some(date) = date {
            row.date = date;
        }
        Ok(row.clone())
    }

    pub(crate) fn delete(&self, user_id: i64, id: i64) {
        self.lock()
            .transactions
            .retain(|row| !(row.id == id && row.user_id == user_id));
    }

    pub(crate) fn import(&self, user_id: i64, rows: Vec<NewRow>) -> Vec<Transaction> {
        let mut data = self.lock();
        rows.into_iter()
            .map(|row| insert(&mut data, user_id, row, TransactionSource::Excel))
            .collect()
    }

    pub(crate) fn transactions_for(&self, user_id: i64) -> Vec<Transaction> {
        self.lock()
            .transactions
            .iter()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect()
    }

    pub(crate) fn tax_settings(&self, user_id: i64) -> Option<TaxSettings> {
        self.lock().tax_settings.get(&user_id).cloned()
    }

    pub(crate) fn save_tax_settings(&self, user_id: i64, mut settings: TaxSettings) -> TaxSettings {
        settings.id = Some(user_id);
        self.lock().tax_settings.insert(user_id, settings.clone());
        settings
    }

    fn lock(&self) -> MutexGuard<'_, StubData> {
        self.data.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

/// A validated row ready to insert.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NewRow {
    pub amount: f64,
    pub kind: TransactionType,
    pub category: String,
    pub description: String,
    pub date: String,
}

fn insert(data: &mut StubData, user_id: i64, row: NewRow, source: TransactionSource) -> Transaction {
    data.next_transaction_id += 1;
    let transaction = Transaction {
        id: data.next_transaction_id,
        user_id,
        amount: row.amount,
        kind: row.kind,
        category: row.category,
        description: row.description,
        date: row.date,
        source,
        created_at: Local::now().to_rfc3339(),
    };
    data.transactions.push(transaction.clone());
    transaction
}

fn issue_token(data: &mut StubData, user_id: i64) -> String {
    let token = data
        .queued_tokens
        .pop_front()
        .unwrap_or_else(generate_token);
    data.tokens.insert(token.clone(), user_id);
    token
}

pub fn generate_token() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|byte| format!("{:02x}", byte)).collect()
}

pub(crate) fn parse_date(raw: &str) -> Option<String> {
    ["%Y-%m-%d", "%d.%m.%Y", "%m/%d/%Y", "%Y/%m/%d"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw.trim(), format).ok())
        .map(|date| date.format("%Y-%m-%d").to_string())
}

/// Keyword stand-in for the classifier model.
pub(crate) fn suggest_category(description: &str, kind: TransactionType) -> &'static str {
    if kind == TransactionType::Income {
        return "Sales";
    }
    let description = description.to_ascii_lowercase();
    const RULES: [(&str, &[&str]); 5] = [
        ("Food", &["coffee", "lunch", "restaurant", "cafe", "grocery"]),
        ("Transport", &["taxi", "uber", "fuel", "bus", "parking"]),
        ("Rent", &["rent", "lease", "office"]),
        ("Utilities", &["electric", "water", "internet", "phone"]),
        ("Marketing", &["ads", "advert", "marketing", "promo"]),
    ];
    RULES
        .iter()
        .find(|(_, words)| words.iter().any(|word| description.contains(word)))
        .map(|(category, _)| *category)
        .unwrap_or("Other")
}
