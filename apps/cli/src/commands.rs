use std::path::Path;

use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Password, Select};
use finsight_client::mutations::parse_amount;
use finsight_client::session::Bootstrap;
use finsight_client::util::time::normalize_date;
use finsight_client::{
    ClientError, ClientState, TransactionForm, UploadFile, UploadKind, uploads::ReceiptReview,
};
use finsight_core::{
    OcrDraft, RegisterRequest, TaxSettings, TransactionPatch, TransactionType,
};

use crate::args::{Command, TaxCommand, TransactionFields};
use crate::render;

const PASSWORD_ENV: &str = "FINSIGHT_PASSWORD";

type CommandResult = Result<(), String>;

pub async fn run(state: &ClientState, bootstrap: Bootstrap, command: Command) -> CommandResult {
    match command {
        Command::Help => {
            crate::args::print_help();
            Ok(())
        }
        Command::Login { identifier } => login(state, identifier).await,
        Command::Register => register(state).await,
        Command::Logout => {
            state.logout();
            println!("Signed out.");
            Ok(())
        }
        Command::Status => status(state, bootstrap).await,
        protected => {
            signed_in(state)?;
            run_protected(state, protected).await
        }
    }
}

async fn run_protected(state: &ClientState, command: Command) -> CommandResult {
    match command {
        Command::Transactions(filter) => {
            let page = check(
                state,
                state.api.transactions.list_query(&filter).get(&state.cache).await,
            )?;
            render::transactions(&page, filter.page.unwrap_or(1).max(1));
            Ok(())
        }
        Command::Add(fields) => add(state, fields).await,
        Command::Edit { id, fields } => edit(state, id, fields).await,
        Command::Delete { id, yes } => delete(state, id, yes).await,
        Command::Import(path) => import(state, &path).await,
        Command::Scan(path) => scan(state, &path).await,
        Command::Dashboard { range, granularity } => {
            let dashboard = &state.api.dashboard;
            let summary = dashboard.summary_query(&range);
            let breakdown = dashboard.breakdown_query(&range, Some(TransactionType::Expense));
            let cashflow = dashboard.cashflow_query(&range, granularity);
            let (summary, breakdown, cashflow) = tokio::join!(
                summary.get(&state.cache),
                breakdown.get(&state.cache),
                cashflow.get(&state.cache)
            );
            render::summary(&check(state, summary)?);
            render::breakdown(&check(state, breakdown)?);
            render::cashflow(&check(state, cashflow)?);
            Ok(())
        }
        Command::Forecast => {
            let forecast = check(state, state.api.ml.forecast_query().get(&state.cache).await)?;
            render::forecast(&forecast);
            Ok(())
        }
        Command::Classify(description) => {
            let result = check(state, state.api.ml.classify(&description).await)?;
            render::classification(&result);
            Ok(())
        }
        Command::Tax(command) => tax(state, command).await,
        Command::Chat => chat(state).await,
        Command::Help
        | Command::Login { .. }
        | Command::Register
        | Command::Logout
        | Command::Status => Ok(()),
    }
}

fn signed_in(state: &ClientState) -> CommandResult {
    state
        .require_session()
        .map_err(|_| "You are not signed in. Run `finsight login` first.".to_string())
}

/// Unwraps a client result, signing out on a rejected credential.
fn check<T>(state: &ClientState, result: finsight_client::Result<T>) -> Result<T, String> {
    state.observe(result).map_err(|err| describe(&err))
}

fn describe(err: &ClientError) -> String {
    match err {
        ClientError::Auth(message) => {
            format!("{}. Your session has ended; run `finsight login` to continue.", message)
        }
        ClientError::TransientNetwork(message) => {
            format!("Could not reach the FinSight backend: {}", message)
        }
        other => other.to_string(),
    }
}

fn prompt_error(err: dialoguer::Error) -> String {
    format!("read input: {}", err)
}

fn prompt(label: &str, initial: Option<&str>, allow_empty: bool) -> Result<String, String> {
    let theme = ColorfulTheme::default();
    let mut input = Input::<String>::with_theme(&theme)
        .with_prompt(label)
        .allow_empty(allow_empty);
    if let Some(initial) = initial {
        input = input.with_initial_text(initial);
    }
    input.interact_text().map_err(prompt_error)
}

fn password(confirm: bool) -> Result<String, String> {
    if let Ok(value) = std::env::var(PASSWORD_ENV)
        && !value.is_empty()
    {
        return Ok(value);
    }
    let theme = ColorfulTheme::default();
    let mut input = Password::with_theme(&theme).with_prompt("Password");
    if confirm {
        input = input.with_confirmation("Repeat password", "Passwords do not match");
    }
    input.interact().map_err(prompt_error)
}

async fn login(state: &ClientState, identifier: Option<String>) -> CommandResult {
    let identifier = match identifier {
        Some(identifier) => identifier,
        None => prompt("Email or phone", None, false)?,
    };
    let password = password(false)?;
    state
        .login(&identifier, &password)
        .await
        .map_err(|err| describe(&err))?;
    println!("Signed in.");
    Ok(())
}

async fn register(state: &ClientState) -> CommandResult {
    let first_name = prompt("First name", None, false)?;
    let last_name = prompt("Last name", None, false)?;
    let email = prompt("Email", None, false)?;
    let phone = prompt("Phone (optional)", None, true)?;
    let password = password(true)?;
    let request = RegisterRequest {
        first_name: first_name.trim().to_string(),
        last_name: last_name.trim().to_string(),
        email: email.trim().to_string(),
        phone: Some(phone.trim().to_string()).filter(|phone| !phone.is_empty()),
        password,
    };
    state
        .register(&request)
        .await
        .map_err(|err| describe(&err))?;
    println!("Account created. You are signed in.");
    Ok(())
}

async fn status(state: &ClientState, bootstrap: Bootstrap) -> CommandResult {
    let session = bootstrap.settled().await;
    if !session.authenticated {
        println!("Not signed in (backend {}).", state.config.api_url);
        return Ok(());
    }
    let profile = check(state, state.api.auth.me().await)?;
    render::profile(&profile);
    println!("Backend: {}", state.config.api_url);
    Ok(())
}

async fn add(state: &ClientState, fields: TransactionFields) -> CommandResult {
    let amount = match fields.amount {
        Some(amount) => amount,
        None => prompt("Amount", None, false)?,
    };
    let description = match fields.description {
        Some(description) => description,
        None => prompt("Description", None, true)?,
    };
    let form = TransactionForm {
        amount,
        kind: fields.kind.unwrap_or_default(),
        category: fields.category.unwrap_or_default(),
        description,
        date: fields.date.unwrap_or_default(),
    };
    let draft = form.to_draft().map_err(|err| err.to_string())?;
    let created = check(state, state.mutations.create_transaction(&draft).await)?;
    println!("Added transaction {}.", created.id);
    render::transaction(&created);
    Ok(())
}

fn patch_from(fields: TransactionFields) -> Result<TransactionPatch, String> {
    let amount = fields
        .amount
        .as_deref()
        .map(parse_amount)
        .transpose()
        .map_err(|err| err.to_string())?;
    let kind = fields
        .kind
        .as_deref()
        .map(str::parse::<TransactionType>)
        .transpose()?;
    let date = fields
        .date
        .as_deref()
        .map(normalize_date)
        .transpose()
        .map_err(|err| err.to_string())?;
    Ok(TransactionPatch {
        amount,
        kind,
        category: fields.category,
        description: fields.description,
        date,
    })
}

async fn edit(state: &ClientState, id: i64, fields: TransactionFields) -> CommandResult {
    let patch = patch_from(fields)?;
    let updated = check(state, state.mutations.update_transaction(id, &patch).await)?;
    println!("Updated transaction {}.", updated.id);
    render::transaction(&updated);
    Ok(())
}

async fn delete(state: &ClientState, id: i64, yes: bool) -> CommandResult {
    if !yes {
        let proceed = Confirm::new()
            .with_prompt(format!("Delete transaction {}?", id))
            .default(false)
            .interact()
            .map_err(prompt_error)?;
        if !proceed {
            println!("Kept transaction {}.", id);
            return Ok(());
        }
    }
    check(state, state.mutations.delete_transaction(id).await)?;
    println!("Deleted transaction {}.", id);
    Ok(())
}

async fn import(state: &ClientState, path: &Path) -> CommandResult {
    let file =
        UploadFile::from_path(path, UploadKind::Spreadsheet).map_err(|err| err.to_string())?;
    println!("Uploading {}...", file.file_name);
    let batch = check(state, state.bulk_import().upload(file).await)?;
    println!("Imported {} transactions.", batch.imported_count);
    for row in &batch.items {
        render::transaction(row);
    }
    Ok(())
}

const SCAN_ACTIONS: [&str; 7] = [
    "Confirm",
    "Edit amount",
    "Edit type",
    "Edit category",
    "Edit description",
    "Edit date",
    "Abandon",
];

async fn scan(state: &ClientState, path: &Path) -> CommandResult {
    let file =
        UploadFile::from_path(path, UploadKind::ReceiptImage).map_err(|err| err.to_string())?;
    let scan = state.receipt_scan();
    println!("Reading {}...", file.file_name);
    let Some(mut review) = check(state, scan.extract(file).await)? else {
        println!("Receipt discarded.");
        return Ok(());
    };

    let theme = ColorfulTheme::default();
    loop {
        println!();
        render::receipt(&review);
        let choice = Select::with_theme(&theme)
            .with_prompt("Review")
            .items(&SCAN_ACTIONS)
            .default(0)
            .interact()
            .map_err(prompt_error)?;
        match SCAN_ACTIONS[choice] {
            "Confirm" => {
                if !scan.can_confirm() {
                    println!("An amount is required before the receipt can be saved.");
                    continue;
                }
                let created = check(state, scan.confirm().await)?;
                println!("Saved transaction {}.", created.id);
                render::transaction(&created);
                return Ok(());
            }
            "Abandon" => {
                scan.abandon();
                println!("Receipt discarded. Nothing was saved.");
                return Ok(());
            }
            action => {
                let change = edit_receipt_field(&review, action)?;
                review = scan.edit(change).map_err(|err| err.to_string())?;
            }
        }
    }
}

type DraftChange = Box<dyn FnOnce(&mut OcrDraft)>;

fn edit_receipt_field(review: &ReceiptReview, action: &str) -> Result<DraftChange, String> {
    let draft = &review.draft;
    let text = |value: &Option<String>| value.as_deref().unwrap_or("").to_string();
    let optional = |value: String| Some(value.trim().to_string()).filter(|value| !value.is_empty());
    let change: DraftChange = match action {
        "Edit amount" => {
            let current = draft.amount.map(render::money);
            let raw = prompt("Amount", current.as_deref(), true)?;
            let amount = if raw.trim().is_empty() {
                None
            } else {
                Some(parse_amount(&raw).map_err(|err| err.to_string())?)
            };
            Box::new(move |draft: &mut OcrDraft| draft.amount = amount)
        }
        "Edit type" => {
            let kinds = [TransactionType::Expense, TransactionType::Income];
            let current = usize::from(draft.kind == Some(TransactionType::Income));
            let choice = Select::with_theme(&ColorfulTheme::default())
                .with_prompt("Type")
                .items(&["expense", "income"])
                .default(current)
                .interact()
                .map_err(prompt_error)?;
            let kind = kinds[choice];
            Box::new(move |draft: &mut OcrDraft| draft.kind = Some(kind))
        }
        "Edit category" => {
            let value = optional(prompt("Category", Some(text(&draft.category).as_str()), true)?);
            Box::new(move |draft: &mut OcrDraft| draft.category = value)
        }
        "Edit description" => {
            let value = optional(prompt("Description", Some(text(&draft.description).as_str()), true)?);
            Box::new(move |draft: &mut OcrDraft| draft.description = value)
        }
        _ => {
            let raw = prompt("Date (YYYY-MM-DD)", Some(text(&draft.date).as_str()), true)?;
            let value = match optional(raw) {
                Some(date) => Some(normalize_date(&date).map_err(|err| err.to_string())?),
                None => None,
            };
            Box::new(move |draft: &mut OcrDraft| draft.date = value)
        }
    };
    Ok(change)
}

async fn tax(state: &ClientState, command: TaxCommand) -> CommandResult {
    match command {
        TaxCommand::Show => {
            let settings = check(state, state.api.tax.settings_query().get(&state.cache).await)?;
            render::tax_settings(settings.as_ref());
            Ok(())
        }
        TaxCommand::Set {
            rate,
            business_type,
            start_month,
        } => {
            let current = check(state, state.api.tax.settings_query().get(&state.cache).await)?;
            let mut settings = current.unwrap_or_else(default_tax_settings);
            let interactive = rate.is_none() && business_type.is_none() && start_month.is_none();
            if interactive {
                settings = prompt_tax_settings(settings)?;
            } else {
                if let Some(rate) = rate {
                    settings.tax_rate = rate;
                }
                if let Some(business_type) = business_type {
                    settings.business_type = business_type;
                }
                if let Some(month) = start_month {
                    settings.quarterly_start_month = month;
                }
            }
            validate_tax_settings(&settings)?;
            let saved = check(state, state.mutations.save_tax_settings(&settings).await)?;
            println!("Tax settings saved.");
            render::tax_settings(Some(&saved));
            Ok(())
        }
        TaxCommand::Estimate { year } => {
            let estimate = check(state, state.api.tax.estimate_query(year).get(&state.cache).await)?;
            render::tax_estimate(&estimate);
            Ok(())
        }
    }
}

fn default_tax_settings() -> TaxSettings {
    TaxSettings {
        id: None,
        tax_rate: 20.0,
        business_type: "general".to_string(),
        quarterly_start_month: 1,
    }
}

fn validate_tax_settings(settings: &TaxSettings) -> CommandResult {
    if !(0.0..=100.0).contains(&settings.tax_rate) {
        return Err("tax rate must be between 0 and 100".to_string());
    }
    if !(1..=12).contains(&settings.quarterly_start_month) {
        return Err("quarter start month must be between 1 and 12".to_string());
    }
    Ok(())
}

fn prompt_tax_settings(mut settings: TaxSettings) -> Result<TaxSettings, String> {
    let theme = ColorfulTheme::default();
    settings.tax_rate = Input::<f64>::with_theme(&theme)
        .with_prompt("Tax rate (%)")
        .default(settings.tax_rate)
        .interact_text()
        .map_err(prompt_error)?;
    settings.business_type = Input::<String>::with_theme(&theme)
        .with_prompt("Business type")
        .default(settings.business_type)
        .interact_text()
        .map_err(prompt_error)?;
    settings.quarterly_start_month = Input::<u32>::with_theme(&theme)
        .with_prompt("Quarter start month (1-12)")
        .default(settings.quarterly_start_month)
        .interact_text()
        .map_err(prompt_error)?;
    Ok(settings)
}

async fn chat(state: &ClientState) -> CommandResult {
    let session = state.chat();
    for message in session.messages() {
        println!("FinSight: {}\n", message.content);
    }
    println!("Type `exit` to leave.");
    let theme = ColorfulTheme::default();
    loop {
        let Ok(question) = Input::<String>::with_theme(&theme)
            .with_prompt("You")
            .allow_empty(true)
            .interact_text()
        else {
            return Ok(());
        };
        let question = question.trim();
        if matches!(question, "exit" | "quit") {
            return Ok(());
        }
        if let Some(reply) = session.send(question).await {
            println!("FinSight: {}\n", reply.content);
        }
    }
}
