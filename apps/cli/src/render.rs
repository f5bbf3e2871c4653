use finsight_client::uploads::ReceiptReview;
use finsight_core::{
    CashFlowPoint, CategoryBreakdown, ClassifyResponse, DashboardSummary, ForecastResponse,
    TaxEstimate, TaxSettings, Transaction, TransactionPage, TransactionType, UserProfile,
};

pub fn money(amount: f64) -> String {
    format!("{:.2}", amount)
}

fn signed(kind: TransactionType, amount: f64) -> String {
    match kind {
        TransactionType::Income => format!("+{}", money(amount)),
        TransactionType::Expense => format!("-{}", money(amount)),
    }
}

pub fn profile(profile: &UserProfile) {
    let contact = profile
        .email
        .as_deref()
        .or(profile.phone.as_deref())
        .unwrap_or("-");
    println!(
        "Signed in as {} {} ({})",
        profile.first_name, profile.last_name, contact
    );
}

pub fn transaction(transaction: &Transaction) {
    println!(
        "{:>6}  {}  {:>12}  {:<14}  {}",
        transaction.id,
        transaction.date,
        signed(transaction.kind, transaction.amount),
        transaction.category,
        transaction.description
    );
}

pub fn transactions(page: &TransactionPage, page_number: u32) {
    if page.is_empty() {
        println!("No transactions yet. Add one with `finsight add` or import a spreadsheet.");
        return;
    }
    println!(
        "{:>6}  {:<10}  {:>12}  {:<14}  {}",
        "ID", "DATE", "AMOUNT", "CATEGORY", "DESCRIPTION"
    );
    for row in &page.data {
        transaction(row);
    }
    println!("\nPage {} · {} transactions in total", page_number, page.total);
}

pub fn summary(summary: &DashboardSummary) {
    if !summary.period.is_empty() {
        println!("Period: {}", summary.period);
    }
    println!("Income:   {:>12}", money(summary.total_income));
    println!("Expenses: {:>12}", money(summary.total_expenses));
    println!("Profit:   {:>12}", money(summary.profit));
}

pub fn breakdown(rows: &[CategoryBreakdown]) {
    println!("\nExpenses by category");
    if rows.is_empty() {
        println!("  nothing in this period");
        return;
    }
    for row in rows {
        println!(
            "  {:<14} {:>12}  {:>5.1}%  ({} items)",
            row.category,
            money(row.amount),
            row.percent,
            row.count
        );
    }
}

pub fn cashflow(points: &[CashFlowPoint]) {
    println!("\nCash flow");
    if points.is_empty() {
        println!("  nothing in this period");
        return;
    }
    for point in points {
        println!(
            "  {}  in {:>10}  out {:>10}  balance {:>12}",
            point.date,
            money(point.income),
            money(point.expense),
            money(point.balance)
        );
    }
}

pub fn forecast(forecast: &ForecastResponse) {
    if forecast.forecast.is_empty() {
        println!(
            "Not enough history for a forecast yet ({} months recorded).",
            forecast.history_months
        );
        return;
    }
    println!(
        "Forecast ({}, based on {} months)",
        forecast.method, forecast.history_months
    );
    for month in &forecast.forecast {
        let risk = if month.negative_cash_flow_risk {
            "  ! negative cash flow risk"
        } else {
            ""
        };
        println!(
            "  {}  income {:>12}  expense {:>12}{}",
            month.month,
            money(month.predicted_income),
            money(month.predicted_expense),
            risk
        );
    }
}

pub fn classification(result: &ClassifyResponse) {
    println!(
        "Suggested category: {} ({:.0}% confidence)",
        result.category,
        result.confidence * 100.0
    );
}

pub fn tax_settings(settings: Option<&TaxSettings>) {
    match settings {
        None => println!("No tax settings saved yet. Use `finsight tax set`."),
        Some(settings) => {
            println!("Tax rate:          {}%", settings.tax_rate);
            println!("Business type:     {}", settings.business_type);
            println!("Quarter starts in: month {}", settings.quarterly_start_month);
        }
    }
}

pub fn tax_estimate(estimate: &TaxEstimate) {
    println!("Taxable income: {:>12}", money(estimate.taxable_income));
    println!("Net profit:     {:>12}", money(estimate.net_profit));
    println!(
        "Estimated tax:  {:>12}  at {}%",
        money(estimate.estimated_tax),
        estimate.tax_rate
    );
    if !estimate.quarterly_payments.is_empty() {
        println!("\nQuarterly payments");
        for payment in &estimate.quarterly_payments {
            println!(
                "  Q{}  due {}  {:>12}",
                payment.quarter,
                payment.due_date,
                money(payment.amount)
            );
        }
    }
    if !estimate.optimization_tips.is_empty() {
        println!("\nTips");
        for tip in &estimate.optimization_tips {
            println!("  - {}", tip);
        }
    }
}

pub fn receipt(review: &ReceiptReview) {
    let draft = &review.draft;
    let or_default = |value: Option<&str>| value.unwrap_or("(default)").to_string();
    println!("Extracted from receipt:");
    println!(
        "  amount:      {}",
        draft.amount.map(money).unwrap_or_else(|| "(missing)".to_string())
    );
    println!(
        "  type:        {}",
        or_default(draft.kind.as_ref().map(TransactionType::as_str))
    );
    println!("  category:    {}", or_default(draft.category.as_deref()));
    println!("  description: {}", or_default(draft.description.as_deref()));
    println!("  date:        {}", or_default(draft.date.as_deref()));
    let lines = recognized_lines(review.raw_text());
    if !lines.is_empty() {
        println!("Recognized text:");
        for line in lines {
            println!("  | {}", line);
        }
    }
    let defaulted = review.defaulted_fields();
    if !defaulted.is_empty() {
        println!("Defaults will be used for: {}", defaulted.join(", "));
    }
}

const RECOGNIZED_LINES: usize = 8;

fn recognized_lines(raw: &str) -> Vec<&str> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(RECOGNIZED_LINES)
        .collect()
}
