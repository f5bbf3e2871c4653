use std::collections::BTreeMap;

use chrono::{Datelike, Local, NaiveDate};

use finsight_core::{
    CashFlowPoint, CategoryBreakdown, ClassifyResponse, DashboardSummary, ForecastMonth,
    ForecastResponse, Granularity, QuarterlyPayment, TaxEstimate, TaxSettings, Transaction,
    TransactionType,
};

use crate::state::suggest_category;

/// Inclusive `YYYY-MM-DD` bounds; the default window is the last month.
#[derive(Debug, Clone)]
pub(crate) struct Window {
    pub from: String,
    pub to: String,
}

impl Window {
    pub fn new(from: Option<&str>, to: Option<&str>) -> Self {
        let today = Local::now().date_naive();
        let default_from = today
            .checked_sub_months(chrono::Months::new(1))
            .unwrap_or(today);
        Self {
            from: from
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| default_from.format("%Y-%m-%d").to_string()),
            to: to
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| today.format("%Y-%m-%d").to_string()),
        }
    }

    fn contains(&self, transaction: &Transaction) -> bool {
        transaction.date >= self.from && transaction.date <= self.to
    }
}

pub(crate) fn default_tax_settings() -> TaxSettings {
    TaxSettings {
        id: None,
        tax_rate: 20.0,
        business_type: "general".to_string(),
        quarterly_start_month: 1,
    }
}

pub(crate) fn sanitize_tax_settings(mut settings: TaxSettings) -> TaxSettings {
    if settings.tax_rate <= 0.0 || settings.tax_rate > 100.0 {
        settings.tax_rate = 20.0;
    }
    if !(1..=12).contains(&settings.quarterly_start_month) {
        settings.quarterly_start_month = 1;
    }
    if settings.business_type.trim().is_empty() {
        settings.business_type = "general".to_string();
    }
    settings
}

fn totals<'a>(rows: impl Iterator<Item = &'a Transaction>) -> (f64, f64) {
    rows.fold((0.0, 0.0), |(income, expense), row| match row.kind {
        TransactionType::Income => (income + row.amount, expense),
        TransactionType::Expense => (income, expense + row.amount),
    })
}

pub(crate) fn summary(rows: &[Transaction], window: &Window) -> DashboardSummary {
    let (income, expenses) = totals(rows.iter().filter(|row| window.contains(row)));
    DashboardSummary {
        total_income: income,
        total_expenses: expenses,
        profit: income - expenses,
        period: format!("{} - {}", window.from, window.to),
    }
}

pub(crate) fn breakdown(
    rows: &[Transaction],
    window: &Window,
    kind: TransactionType,
) -> Vec<CategoryBreakdown> {
    let mut by_category: BTreeMap<String, (f64, u64)> = BTreeMap::new();
    for row in rows
        .iter()
        .filter(|row| row.kind == kind && window.contains(row))
    {
        let slot = by_category.entry(row.category.clone()).or_default();
        slot.0 += row.amount;
        slot.1 += 1;
    }
    let total: f64 = by_category.values().map(|(amount, _)| amount).sum();
    let mut items: Vec<CategoryBreakdown> = by_category
        .into_iter()
        .map(|(category, (amount, count))| CategoryBreakdown {
            category,
            amount,
            count,
            percent: if total > 0.0 { amount / total * 100.0 } else { 0.0 },
        })
        .collect();
    items.sort_by(|a, b| b.amount.total_cmp(&a.amount));
    items
}

fn bucket(date: &str, granularity: Granularity) -> String {
    let Ok(parsed) = NaiveDate::parse_from_str(date, "%Y-%m-%d") else {
        return date.to_string();
    };
    let start = match granularity {
        Granularity::Day => parsed,
        Granularity::Week => {
            parsed - chrono::Duration::days(i64::from(parsed.weekday().num_days_from_monday()))
        }
        Granularity::Month => parsed.with_day(1).unwrap_or(parsed),
    };
    start.format("%Y-%m-%d").to_string()
}

pub(crate) fn cashflow(
    rows: &[Transaction],
    window: &Window,
    granularity: Granularity,
) -> Vec<CashFlowPoint> {
    let mut by_bucket: BTreeMap<String, (f64, f64)> = BTreeMap::new();
    for row in rows.iter().filter(|row| window.contains(row)) {
        let slot = by_bucket.entry(bucket(&row.date, granularity)).or_default();
        match row.kind {
            TransactionType::Income => slot.0 += row.amount,
            TransactionType::Expense => slot.1 += row.amount,
        }
    }
    let mut balance = 0.0;
    by_bucket
        .into_iter()
        .map(|(date, (income, expense))| {
            balance += income - expense;
            CashFlowPoint {
                date,
                income,
                expense,
                balance,
            }
        })
        .collect()
}

/// Projects the average of past months forward three months.
pub(crate) fn forecast(rows: &[Transaction]) -> ForecastResponse {
    let mut by_month: BTreeMap<String, (f64, f64)> = BTreeMap::new();
    for row in rows {
        let month = row.date.get(..7).unwrap_or(&row.date).to_string();
        let slot = by_month.entry(month).or_default();
        match row.kind {
            TransactionType::Income => slot.0 += row.amount,
            TransactionType::Expense => slot.1 += row.amount,
        }
    }
    let history_months = by_month.len() as u32;
    if history_months == 0 {
        return ForecastResponse {
            method: "insufficient_data".to_string(),
            forecast: Vec::new(),
            history_months,
        };
    }
    let (income_sum, expense_sum) = by_month
        .values()
        .fold((0.0, 0.0), |(i, e), (income, expense)| (i + income, e + expense));
    let income = income_sum / f64::from(history_months);
    let expense = expense_sum / f64::from(history_months);

    let today = Local::now().date_naive();
    let forecast = (1..=3)
        .map(|offset| {
            let month = today
                .with_day(1)
                .and_then(|first| first.checked_add_months(chrono::Months::new(offset)))
                .unwrap_or(today);
            ForecastMonth {
                month: month.format("%Y-%m").to_string(),
                predicted_income: income,
                predicted_expense: expense,
                predicted_profit: income - expense,
                income_lower: income * 0.9,
                income_upper: income * 1.1,
                expense_lower: expense * 0.9,
                expense_upper: expense * 1.1,
                negative_cash_flow_risk: expense > income,
            }
        })
        .collect();
    ForecastResponse {
        method: "moving_average".to_string(),
        forecast,
        history_months,
    }
}

pub(crate) fn tax_estimate(rows: &[Transaction], settings: &TaxSettings, year: i32) -> TaxEstimate {
    let prefix = format!("{}-", year);
    let (income, expenses) = totals(rows.iter().filter(|row| row.date.starts_with(&prefix)));
    let taxable_income = (income - expenses).max(0.0);
    let estimated_tax = taxable_income * settings.tax_rate / 100.0;

    let start = settings.quarterly_start_month.clamp(1, 12);
    let quarterly_payments = (0..4)
        .map(|quarter| {
            let month = (start - 1 + quarter * 3) % 12 + 1;
            let pay_year = if month < start { year + 1 } else { year };
            let due = NaiveDate::from_ymd_opt(pay_year, month, 15)
                .and_then(|date| date.checked_add_months(chrono::Months::new(1)))
                .map(|date| date.format("%Y-%m-%d").to_string())
                .unwrap_or_default();
            QuarterlyPayment {
                quarter: quarter + 1,
                due_date: due,
                amount: estimated_tax / 4.0,
            }
        })
        .collect();

    let expense_ratio = if income > 0.0 {
        expenses / income * 100.0
    } else {
        0.0
    };
    let mut optimization_tips = Vec::new();
    if expense_ratio < 30.0 {
        optimization_tips.push(
            "Your expense ratio is low. Reinvesting profits can reduce taxable income.".to_string(),
        );
    }
    if expense_ratio > 80.0 {
        optimization_tips
            .push("High expense ratio detected. Review recurring costs.".to_string());
    }
    optimization_tips.push("Keep all receipts and invoices for deductible expenses.".to_string());

    TaxEstimate {
        taxable_income,
        tax_rate: settings.tax_rate,
        estimated_tax,
        net_profit: taxable_income - estimated_tax,
        quarterly_payments,
        optimization_tips,
    }
}

pub(crate) fn current_year() -> i32 {
    Local::now().year()
}

pub(crate) fn classify(description: &str) -> ClassifyResponse {
    let category = suggest_category(description, TransactionType::Expense);
    let confidence = if category == "Other" { 0.3 } else { 0.85 };
    let mut scores = BTreeMap::new();
    scores.insert(category.to_string(), confidence);
    ClassifyResponse {
        category: category.to_string(),
        confidence,
        scores,
    }
}

pub(crate) fn chat_reply(message: &str, rows: &[Transaction]) -> String {
    let (income, expenses) = totals(rows.iter());
    format!(
        "You asked: \"{}\". Across {} transactions you earned {:.2} and spent {:.2}.",
        message.trim(),
        rows.len(),
        income,
        expenses
    )
}

#[cfg(test)]
mod tests {
    use finsight_core::TransactionSource;

    use super::*;

    fn row(id: i64, kind: TransactionType, amount: f64, date: &str, category: &str) -> Transaction {
        Transaction {
            id,
            user_id: 1,
            amount,
            kind,
            category: category.to_string(),
            description: String::new(),
            date: date.to_string(),
            source: TransactionSource::Manual,
            created_at: String::new(),
        }
    }

    #[test]
    fn breakdown_shares_add_up() {
        let rows = vec![
            row(1, TransactionType::Expense, 30.0, "2025-01-02", "Food"),
            row(2, TransactionType::Expense, 10.0, "2025-01-03", "Transport"),
            row(3, TransactionType::Income, 99.0, "2025-01-03", "Sales"),
        ];
        let window = Window::new(Some("2025-01-01"), Some("2025-01-31"));

        let items = breakdown(&rows, &window, TransactionType::Expense);

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].category, "Food");
        assert_eq!(items[0].percent, 75.0);
        assert_eq!(summary(&rows, &window).profit, 59.0);
    }

    #[test]
    fn cashflow_accumulates_balance_per_month() {
        let rows = vec![
            row(1, TransactionType::Income, 100.0, "2025-01-02", "Sales"),
            row(2, TransactionType::Expense, 40.0, "2025-02-10", "Rent"),
        ];
        let window = Window::new(Some("2025-01-01"), Some("2025-12-31"));

        let points = cashflow(&rows, &window, Granularity::Month);

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].date, "2025-01-01");
        assert_eq!(points[1].balance, 60.0);
    }

    #[test]
    fn quarterly_schedule_follows_start_month() {
        let rows = vec![row(1, TransactionType::Income, 1000.0, "2025-03-01", "Sales")];
        let estimate = tax_estimate(&rows, &default_tax_settings(), 2025);

        assert_eq!(estimate.estimated_tax, 200.0);
        let due: Vec<&str> = estimate
            .quarterly_payments
            .iter()
            .map(|payment| payment.due_date.as_str())
            .collect();
        assert_eq!(due, vec!["2025-02-15", "2025-05-15", "2025-08-15", "2025-11-15"]);
    }
}
