use finsight_core::{OcrDraft, OcrExtraction, TransactionType};

use crate::errors::StubError;
use crate::state::{NewRow, parse_date, suggest_category};

const COLUMN_ALIASES: [(&str, &[&str]); 5] = [
    ("date", &["date"]),
    ("amount", &["amount", "sum"]),
    ("type", &["type"]),
    ("description", &["description", "desc", "note", "notes"]),
    ("category", &["category"]),
];

/// Reads an uploaded sheet. The stub accepts sheets exported as
/// comma-separated text with a header row; `date` and `amount` are required.
pub(crate) fn parse_sheet(bytes: &[u8]) -> Result<Vec<NewRow>, StubError> {
    let text = String::from_utf8_lossy(bytes);
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());
    let header: Vec<String> = lines
        .next()
        .map(split_row)
        .unwrap_or_default()
        .into_iter()
        .map(|cell| cell.to_ascii_lowercase())
        .collect();
    let column = |name: &str| {
        COLUMN_ALIASES
            .iter()
            .find(|(key, _)| *key == name)
            .and_then(|(_, aliases)| {
                aliases
                    .iter()
                    .find_map(|alias| header.iter().position(|cell| cell == alias))
            })
    };
    let (Some(date_col), Some(amount_col)) = (column("date"), column("amount")) else {
        return Err(StubError::bad_request(
            "excel file must have 'date' and 'amount' columns",
        ));
    };
    let type_col = column("type");
    let description_col = column("description");
    let category_col = column("category");

    let mut rows = Vec::new();
    for (index, line) in lines.enumerate() {
        let cells = split_row(line);
        let cell = |col: Option<usize>| {
            col.and_then(|col| cells.get(col))
                .map(|value| value.trim().to_string())
                .unwrap_or_default()
        };
        let raw_amount = cell(Some(amount_col)).replace(' ', "");
        if raw_amount.is_empty() {
            continue;
        }
        let mut amount: f64 = raw_amount.parse().map_err(|_| {
            StubError::bad_request(format!("row {}: invalid amount '{}'", index + 2, raw_amount))
        })?;
        let raw_date = cell(Some(date_col));
        let date = parse_date(&raw_date).ok_or_else(|| {
            StubError::bad_request(format!("row {}: invalid date '{}'", index + 2, raw_date))
        })?;

        let type_text = cell(type_col).to_ascii_lowercase();
        let mut kind = if type_text.contains("income") || (amount > 0.0 && type_text.is_empty()) {
            TransactionType::Income
        } else {
            TransactionType::Expense
        };
        if amount < 0.0 {
            amount = -amount;
            kind = TransactionType::Expense;
        }
        let description = cell(description_col);
        let mut category = cell(category_col);
        if category.is_empty() {
            category = suggest_category(&description, kind).to_string();
        }
        rows.push(NewRow {
            amount,
            kind,
            category,
            description,
            date,
        });
    }
    if rows.is_empty() {
        return Err(StubError::bad_request(
            "excel file must have a header row and at least one data row",
        ));
    }
    Ok(rows)
}

fn split_row(line: &str) -> Vec<String> {
    line.split(',').map(|cell| cell.trim().to_string()).collect()
}

/// Stand-in for the OCR model: reads receipt text and guesses a draft.
/// A line starting with `total` gives the amount; the first line is the
/// merchant. Fields it cannot find stay empty.
pub(crate) fn extract_receipt(bytes: &[u8]) -> OcrExtraction {
    let raw_text = String::from_utf8_lossy(bytes).trim().to_string();
    let amount = raw_text.lines().find_map(|line| {
        let lower = line.trim().to_ascii_lowercase();
        let rest = lower.strip_prefix("total")?;
        rest.trim_start_matches([':', ' '])
            .replace(',', ".")
            .parse::<f64>()
            .ok()
    });
    let date = raw_text
        .split_whitespace()
        .find_map(parse_date);
    let description = raw_text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .filter(|line| !line.to_ascii_lowercase().starts_with("total"))
        .map(str::to_string);
    let category = description
        .as_deref()
        .map(|description| suggest_category(description, TransactionType::Expense))
        .filter(|category| *category != "Other")
        .map(str::to_string);
    OcrExtraction {
        draft_transaction: OcrDraft {
            amount,
            kind: amount.map(|_| TransactionType::Expense),
            category,
            description,
            date,
        },
        raw_text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sheet_rows_follow_sign_rules() {
        let sheet = b"Date,Amount,Description\n2025-01-02,1500,Invoice 7\n02.01.2025,-40,Taxi home\n2025-01-03,,skipped\n";

        let rows = parse_sheet(sheet).expect("rows");

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].kind, TransactionType::Income);
        assert_eq!(rows[1].kind, TransactionType::Expense);
        assert_eq!(rows[1].amount, 40.0);
        assert_eq!(rows[1].category, "Transport");
        assert_eq!(rows[1].date, "2025-01-02");
    }

    #[test]
    fn sheet_without_amount_column_is_rejected() {
        let err = parse_sheet(b"date,note\n2025-01-02,x\n").expect_err("rejected");
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn receipt_total_becomes_amount() {
        let extraction = extract_receipt(b"Corner Cafe\n2025-05-04\nTOTAL: 12,50\n");
        let draft = extraction.draft_transaction;
        assert_eq!(draft.amount, Some(12.5));
        assert_eq!(draft.description.as_deref(), Some("Corner Cafe"));
        assert_eq!(draft.category.as_deref(), Some("Food"));
        assert_eq!(draft.date.as_deref(), Some("2025-05-04"));
    }

    #[test]
    fn unreadable_receipt_has_no_amount() {
        let extraction = extract_receipt(b"\x89PNG");
        assert_eq!(extraction.draft_transaction.amount, None);
        assert_eq!(extraction.draft_transaction.kind, None);
    }
}
