use std::env;
use std::path::PathBuf;

use finsight_core::{DateRange, Granularity, TransactionFilter, TransactionType};

#[derive(Debug, Default, PartialEq)]
pub struct CliArgs {
    pub api_url: Option<String>,
    pub command: Command,
}

#[derive(Debug, Default, PartialEq)]
pub enum Command {
    #[default]
    Help,
    Login {
        identifier: Option<String>,
    },
    Register,
    Logout,
    Status,
    Transactions(TransactionFilter),
    Add(TransactionFields),
    Edit {
        id: i64,
        fields: TransactionFields,
    },
    Delete {
        id: i64,
        yes: bool,
    },
    Import(PathBuf),
    Scan(PathBuf),
    Dashboard {
        range: DateRange,
        granularity: Granularity,
    },
    Forecast,
    Classify(String),
    Tax(TaxCommand),
    Chat,
}

/// Transaction fields given as flags. Unset fields are prompted for by
/// `add` and left untouched by `edit`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TransactionFields {
    pub amount: Option<String>,
    pub kind: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
}

impl TransactionFields {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, PartialEq)]
pub enum TaxCommand {
    Show,
    Set {
        rate: Option<f64>,
        business_type: Option<String>,
        start_month: Option<u32>,
    },
    Estimate {
        year: Option<i32>,
    },
}

pub fn parse_args() -> Result<CliArgs, String> {
    parse_from(env::args().skip(1))
}

pub fn parse_from(args: impl IntoIterator<Item = String>) -> Result<CliArgs, String> {
    let mut args = args.into_iter();
    let mut parsed = CliArgs::default();
    let mut rest = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--api-url" => {
                parsed.api_url = Some(value_for(&mut args, "--api-url")?);
            }
            "--help" | "-h" => {
                parsed.command = Command::Help;
                return Ok(parsed);
            }
            _ => rest.push(arg),
        }
    }

    let mut rest = rest.into_iter();
    let Some(name) = rest.next() else {
        return Ok(parsed);
    };
    parsed.command = match name.as_str() {
        "help" => Command::Help,
        "login" => Command::Login {
            identifier: rest.next(),
        },
        "register" => no_more(rest, Command::Register)?,
        "logout" => no_more(rest, Command::Logout)?,
        "status" => no_more(rest, Command::Status)?,
        "transactions" | "ls" => Command::Transactions(parse_filter(rest)?),
        "add" => Command::Add(parse_fields(rest)?),
        "edit" => {
            let id = parse_id(rest.next())?;
            let fields = parse_fields(rest)?;
            if fields.is_empty() {
                return Err("edit needs at least one field to change".to_string());
            }
            Command::Edit { id, fields }
        }
        "delete" => {
            let id = parse_id(rest.next())?;
            let yes = match rest.next().as_deref() {
                None => false,
                Some("--yes" | "-y") => true,
                Some(other) => return Err(format!("unknown argument: {other}")),
            };
            Command::Delete { id, yes }
        }
        "import" => Command::Import(single_path(rest, "import")?),
        "scan" => Command::Scan(single_path(rest, "scan")?),
        "dashboard" => parse_dashboard(rest)?,
        "forecast" => no_more(rest, Command::Forecast)?,
        "classify" => {
            let description = rest.collect::<Vec<_>>().join(" ");
            if description.trim().is_empty() {
                return Err("classify needs a description".to_string());
            }
            Command::Classify(description)
        }
        "tax" => Command::Tax(parse_tax(rest)?),
        "chat" => no_more(rest, Command::Chat)?,
        other => return Err(format!("unknown command: {other}")),
    };
    Ok(parsed)
}

fn value_for(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, String> {
    args.next()
        .ok_or_else(|| format!("missing value for {flag}"))
}

fn no_more(mut rest: impl Iterator<Item = String>, command: Command) -> Result<Command, String> {
    match rest.next() {
        Some(arg) => Err(format!("unknown argument: {arg}")),
        None => Ok(command),
    }
}

fn parse_id(value: Option<String>) -> Result<i64, String> {
    let value = value.ok_or_else(|| "missing transaction id".to_string())?;
    value
        .parse::<i64>()
        .map_err(|_| format!("invalid transaction id: {value}"))
}

fn single_path(mut rest: impl Iterator<Item = String>, command: &str) -> Result<PathBuf, String> {
    let path = rest
        .next()
        .ok_or_else(|| format!("{command} needs a file path"))?;
    no_more(rest, Command::Help)?;
    Ok(PathBuf::from(path))
}

fn parse_kind(value: &str) -> Result<TransactionType, String> {
    value.parse::<TransactionType>()
}

fn parse_filter(mut rest: impl Iterator<Item = String>) -> Result<TransactionFilter, String> {
    let mut filter = TransactionFilter::default();
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--type" => filter.kind = Some(parse_kind(&value_for(&mut rest, "--type")?)?),
            "--category" => filter.category = Some(value_for(&mut rest, "--category")?),
            "--from" => filter.date_from = Some(value_for(&mut rest, "--from")?),
            "--to" => filter.date_to = Some(value_for(&mut rest, "--to")?),
            "--page" => filter.page = Some(parse_number(&mut rest, "--page")?),
            "--page-size" => filter.page_size = Some(parse_number(&mut rest, "--page-size")?),
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(filter)
}

fn parse_fields(mut rest: impl Iterator<Item = String>) -> Result<TransactionFields, String> {
    let mut fields = TransactionFields::default();
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--amount" => fields.amount = Some(value_for(&mut rest, "--amount")?),
            "--type" => fields.kind = Some(value_for(&mut rest, "--type")?),
            "--category" => fields.category = Some(value_for(&mut rest, "--category")?),
            "--description" => fields.description = Some(value_for(&mut rest, "--description")?),
            "--date" => fields.date = Some(value_for(&mut rest, "--date")?),
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(fields)
}

fn parse_dashboard(mut rest: impl Iterator<Item = String>) -> Result<Command, String> {
    let mut range = DateRange::default();
    let mut granularity = Granularity::default();
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--from" => range.from = Some(value_for(&mut rest, "--from")?),
            "--to" => range.to = Some(value_for(&mut rest, "--to")?),
            "--granularity" => {
                granularity = value_for(&mut rest, "--granularity")?.parse::<Granularity>()?
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(Command::Dashboard { range, granularity })
}

fn parse_tax(mut rest: impl Iterator<Item = String>) -> Result<TaxCommand, String> {
    match rest.next().as_deref() {
        None | Some("show") => {
            no_more(rest, Command::Help)?;
            Ok(TaxCommand::Show)
        }
        Some("set") => {
            let (mut rate, mut business_type, mut start_month) = (None, None, None);
            while let Some(arg) = rest.next() {
                match arg.as_str() {
                    "--rate" => rate = Some(parse_number(&mut rest, "--rate")?),
                    "--business-type" => {
                        business_type = Some(value_for(&mut rest, "--business-type")?)
                    }
                    "--start-month" => start_month = Some(parse_number(&mut rest, "--start-month")?),
                    other => return Err(format!("unknown argument: {other}")),
                }
            }
            Ok(TaxCommand::Set {
                rate,
                business_type,
                start_month,
            })
        }
        Some("estimate") => {
            let year = match rest.next().as_deref() {
                None => None,
                Some("--year") => Some(parse_number(&mut rest, "--year")?),
                Some(other) => return Err(format!("unknown argument: {other}")),
            };
            Ok(TaxCommand::Estimate { year })
        }
        Some(other) => Err(format!("unknown tax command: {other}")),
    }
}

fn parse_number<T: std::str::FromStr>(
    args: &mut impl Iterator<Item = String>,
    flag: &str,
) -> Result<T, String> {
    let value = value_for(args, flag)?;
    value
        .trim()
        .parse::<T>()
        .map_err(|_| format!("invalid value for {flag}: {value}"))
}

pub fn print_help() {
    println!(
        "FinSight CLI\n\n\
Usage:\n  finsight [--api-url <url>] <command> [options]\n\n\
Commands:\n  login [email|phone]         Sign in and store the credential\n  register                    Create an account\n  logout                      Forget the stored credential\n  status                      Show who is signed in\n  transactions [filters]      List transactions (--type, --category, --from, --to, --page, --page-size)\n  add [fields]                Add a transaction (--amount, --type, --category, --description, --date)\n  edit <id> [fields]          Change fields of a transaction\n  delete <id> [--yes]         Delete a transaction\n  import <file.xlsx>          Bulk import a spreadsheet\n  scan <receipt image>        Extract a receipt, review it, then confirm or abandon\n  dashboard [--from] [--to] [--granularity day|week|month]\n  forecast                    Income and expense forecast\n  classify <description>      Suggest a category\n  tax [show|set|estimate]     Tax settings and estimate\n  chat                        Talk to the assistant\n\n\
Options:\n  --api-url <url>  Override the configured backend for this run only\n  -h, --help       Show this help message\n"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<CliArgs, String> {
        parse_from(line.split_whitespace().map(str::to_string))
    }

    #[test]
    fn no_arguments_show_help() {
        assert_eq!(parse("").expect("args").command, Command::Help);
    }

    #[test]
    fn api_url_flag_is_accepted_anywhere() {
        let args = parse("status --api-url http://10.0.0.2:8080").expect("args");
        assert_eq!(args.api_url.as_deref(), Some("http://10.0.0.2:8080"));
        assert_eq!(args.command, Command::Status);
    }

    #[test]
    fn transaction_filters() {
        let args = parse("transactions --type income --from 2025-01-01 --page 2").expect("args");
        let Command::Transactions(filter) = args.command else {
            panic!("expected transactions");
        };
        assert_eq!(filter.kind, Some(TransactionType::Income));
        assert_eq!(filter.date_from.as_deref(), Some("2025-01-01"));
        assert_eq!(filter.page, Some(2));
    }

    #[test]
    fn edit_needs_a_field() {
        assert!(parse("edit 4").is_err());
        let args = parse("edit 4 --amount 10").expect("args");
        assert_eq!(
            args.command,
            Command::Edit {
                id: 4,
                fields: TransactionFields {
                    amount: Some("10".to_string()),
                    ..TransactionFields::default()
                },
            }
        );
    }

    #[test]
    fn tax_subcommands() {
        assert_eq!(parse("tax").expect("args").command, Command::Tax(TaxCommand::Show));
        assert_eq!(
            parse("tax estimate --year 2024").expect("args").command,
            Command::Tax(TaxCommand::Estimate { year: Some(2024) })
        );
        assert!(parse("tax set --start-month x").is_err());
    }

    #[test]
    fn rejects_unknown_input() {
        assert!(parse("frobnicate").is_err());
        assert!(parse("logout now").is_err());
        assert!(parse("dashboard --granularity year").is_err());
        assert!(parse("delete abc").is_err());
    }
}
