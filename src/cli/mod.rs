use std::fs::File;
use std::io::{self, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::application::{
    ClientError, DepartmentView, ExpenditureView, ExpenseEntry, LedgerClient, Submitted,
};
use crate::config::{
    DEFAULT_CONTRACT, DEFAULT_ENDPOINT, DEFAULT_PAGE_SIZE, LedgerClientConfig, SigningCredential,
};
use crate::domain::{Authorization, DepartmentId, ExpenditureId, SpendRequest};
use crate::io::{Exporter, write_expenses_csv};

/// Allowance - departmental budgets on a blockchain ledger
#[derive(Parser)]
#[command(name = "allowance")]
#[command(about = "Inspect department allowances and spend against them on the ledger")]
#[command(version)]
pub struct Cli {
    /// Node HTTP endpoint
    #[arg(long, env = "ALLOWANCE_ENDPOINT", default_value = DEFAULT_ENDPOINT, global = true)]
    pub endpoint: String,

    /// Chain id forwarded to the signing relay
    #[arg(long, env = "ALLOWANCE_CHAIN_ID", global = true)]
    pub chain_id: Option<String>,

    /// Account the budget contract is deployed to
    #[arg(long, env = "ALLOWANCE_CONTRACT", default_value = DEFAULT_CONTRACT, global = true)]
    pub contract: String,

    /// Credential for the signing relay (needed for anything that writes)
    #[arg(long, env = "ALLOWANCE_CREDENTIAL", hide_env_values = true, global = true)]
    pub credential: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value = "10", global = true)]
    pub timeout: u64,

    /// Rows requested per table page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE, global = true)]
    pub page_size: u32,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the token the contract is denominated in
    Token,

    /// Show a department's allowance, expenditures and recent expenses
    Dashboard {
        /// Department id
        department: DepartmentId,

        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Show one expenditure and its expense history
    Expenditure {
        /// Department id
        department: DepartmentId,

        /// Expenditure id
        expenditure: ExpenditureId,

        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// List expenses, most recent first
    History {
        /// Department id
        department: DepartmentId,

        /// Limit to one expenditure
        #[arg(long)]
        expenditure: Option<ExpenditureId>,

        /// Output format: table, json, csv
        #[arg(long, default_value = "table")]
        format: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Spend from an expenditure
    Spend {
        /// Department id
        department: DepartmentId,

        /// Expenditure id
        expenditure: ExpenditureId,

        /// Amount to spend (e.g., "12.5" or "12.5000")
        amount: String,

        /// Memo recorded with the expense
        #[arg(short, long, default_value = "")]
        memo: String,

        /// Authorizing principal, account@permission
        #[arg(long)]
        auth: String,
    },

    /// Apply to change a department's monthly allowance
    ApplyLimit {
        /// Department id
        department: DepartmentId,

        /// Requested monthly allowance
        amount: String,

        /// Authorizing principal, account@permission
        #[arg(long)]
        auth: String,
    },

    /// Allocate part of a department's allowance to a new expenditure
    AddExpenditure {
        /// Department id
        department: DepartmentId,

        /// Expenditure name
        name: String,

        /// Account receiving payments
        recipient: String,

        /// Monthly allowance of the expenditure
        amount: String,

        /// Authorizing principal, account@permission
        #[arg(long)]
        auth: String,
    },

    /// Remove an expenditure (its history stays readable)
    RemoveExpenditure {
        /// Department id
        department: DepartmentId,

        /// Expenditure id
        expenditure: ExpenditureId,

        /// Authorizing principal, account@permission
        #[arg(long)]
        auth: String,
    },

    /// List allowance change applications
    Applications,

    /// Export a department dashboard as a JSON snapshot
    Export {
        /// Department id
        department: DepartmentId,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Install the stderr subscriber. Call once, at startup; `RUST_LOG` wins over `--verbose`.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .init();
}

impl Cli {
    fn client_config(&self) -> LedgerClientConfig {
        let mut config = LedgerClientConfig::new(&self.endpoint)
            .with_contract(&self.contract)
            .with_timeout(Duration::from_secs(self.timeout))
            .with_page_size(self.page_size);
        if let Some(chain_id) = &self.chain_id {
            config = config.with_chain_id(chain_id);
        }
        if let Some(credential) = &self.credential {
            config = config.with_credential(SigningCredential::new(credential));
        }
        config
    }

    pub async fn run(self) -> Result<()> {
        let client = LedgerClient::connect(&self.client_config())
            .context("Failed to set up ledger client")?;

        match self.command {
            Commands::Token => {
                let token = client.token().await?;
                println!("{} ({} decimals)", token.name, token.precision);
            }

            Commands::Dashboard { department, format } => {
                let view = client.load_department(department).await?;
                match format.as_str() {
                    "json" => print_json(&view)?,
                    _ => print_department(&view),
                }
            }

            Commands::Expenditure {
                department,
                expenditure,
                format,
            } => {
                let view = client.load_expenditure(department, expenditure).await?;
                match format.as_str() {
                    "json" => print_json(&view)?,
                    _ => print_expenditure(&view),
                }
            }

            Commands::History {
                department,
                expenditure,
                format,
                output,
            } => {
                run_history_command(&client, department, expenditure, &format, output).await?;
            }

            Commands::Spend {
                department,
                expenditure,
                amount,
                memo,
                auth,
            } => {
                let request = SpendRequest {
                    department_id: department,
                    expenditure_id: expenditure,
                    amount,
                    memo,
                    authorization: parse_auth(&auth)?,
                };

                let spend = client.prepare_spend(&request).await.map_err(explain)?;
                if spend.exceeds_cached_remaining {
                    eprintln!("Note: this exceeds the remaining allowance last reported; the ledger will decide.");
                }

                let submitted = client
                    .submit_spend(spend, &request.authorization)
                    .await
                    .map_err(explain)?;
                report_submission(&submitted);
                if let Ok(view) = &submitted.reconciled {
                    println!(
                        "{}: used {} of {} {} ({}%), {} left",
                        view.name,
                        view.allowance_used,
                        view.monthly_allowance,
                        view.token,
                        view.percent_used,
                        view.remaining
                    );
                }
            }

            Commands::ApplyLimit {
                department,
                amount,
                auth,
            } => {
                let submitted = client
                    .apply_allowance_change(department, &amount, &parse_auth(&auth)?)
                    .await
                    .map_err(explain)?;
                report_submission(&submitted);
                if let Ok(view) = &submitted.reconciled {
                    if let Some(app) = &view.pending_application {
                        println!(
                            "Pending application #{}: {} -> {} {}",
                            app.id, app.from_allowance, app.to_allowance, view.token
                        );
                    }
                }
            }

            Commands::AddExpenditure {
                department,
                name,
                recipient,
                amount,
                auth,
            } => {
                let submitted = client
                    .add_expenditure(department, &name, &recipient, &amount, &parse_auth(&auth)?)
                    .await
                    .map_err(explain)?;
                report_submission(&submitted);
                if let Ok(view) = &submitted.reconciled {
                    println!(
                        "Allocated {} of {} {}",
                        view.allowance_allocated, view.monthly_allowance, view.token
                    );
                }
            }

            Commands::RemoveExpenditure {
                department,
                expenditure,
                auth,
            } => {
                let submitted = client
                    .remove_expenditure(department, expenditure, &parse_auth(&auth)?)
                    .await
                    .map_err(explain)?;
                report_submission(&submitted);
            }

            Commands::Applications => {
                let applications = client.list_applications().await?;
                if applications.is_empty() {
                    println!("No applications found.");
                } else {
                    println!(
                        "{:<6} {:<6} {:>16} {:>16} {:<10}",
                        "ID", "DEPT", "FROM", "TO", "STATUS"
                    );
                    println!("{}", "-".repeat(58));
                    for app in applications {
                        println!(
                            "{:<6} {:<6} {:>16} {:>16} {:<10}",
                            app.id, app.department_id, app.from_allowance, app.to_allowance, app.status.as_str()
                        );
                    }
                }
            }

            Commands::Export { department, output } => {
                let exporter = Exporter::new(&client);
                let writer = open_output(output.as_deref())?;
                exporter.export_department_json(department, writer).await?;
                if let Some(path) = output {
                    eprintln!("Exported department {} to {}", department, path);
                }
            }
        }

        Ok(())
    }
}

fn parse_auth(auth: &str) -> Result<Authorization> {
    auth.parse::<Authorization>()
        .map_err(ClientError::from)
        .context("Invalid --auth, expected account@permission")
}

/// Lead with the short, user-facing reading of a client error.
fn explain(err: ClientError) -> anyhow::Error {
    let message = err.user_message();
    anyhow::Error::new(err).context(message)
}

fn report_submission<V>(submitted: &Submitted<V>) {
    println!(
        "Submitted {} ({})",
        submitted.action.name(),
        submitted.receipt.transaction_id.as_deref().unwrap_or("no transaction id")
    );
    if let Err(err) = &submitted.reconciled {
        eprintln!("Could not reload from the ledger ({}); refresh to see the result.", err);
    }
}

fn open_output(path: Option<&str>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("Cannot create output file '{}'", path))?,
        ),
        None => Box::new(io::stdout()),
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_department(view: &DepartmentView) {
    let status = if view.enabled { "" } else { " (suspended)" };
    println!("{} Department{}", view.name, status);
    println!();
    println!("Monthly allowance:   {} {}", view.monthly_allowance, view.token);
    println!("Allowance used:      {} {}", view.allowance_used, view.token);
    println!("Allowance allocated: {} {}", view.allowance_allocated, view.token);
    if let Some(app) = &view.pending_application {
        println!(
            "Pending change:      {} -> {} {} (application #{})",
            app.from_allowance, app.to_allowance, view.token, app.id
        );
    }
    println!();

    if view.expenditures.is_empty() {
        println!("No expenditures.");
    } else {
        println!(
            "{:<5} {:<20} {:<14} {:>14} {:>14} {:>5}",
            "ID", "EXPENDITURE", "RECIPIENT", "USED", "TOTAL", "%"
        );
        println!("{}", "-".repeat(77));
        for exp in &view.expenditures {
            println!(
                "{:<5} {:<20} {:<14} {:>14} {:>14} {:>5}",
                exp.id,
                truncate(&exp.name, 20),
                truncate(&exp.recipient, 14),
                exp.used,
                exp.total,
                exp.percent_used
            );
        }
    }
    println!();

    print_expenses(&view.expenses, &view.token, 10);
}

fn print_expenditure(view: &ExpenditureView) {
    let status = if view.removed { " (removed)" } else { "" };
    println!("{} Expenditure{}", view.name, status);
    println!();
    println!("Recipient:  {}", view.recipient);
    println!("Allowance:  {} {}", view.monthly_allowance, view.token);
    println!("Used:       {} {} ({}%)", view.allowance_used, view.token, view.percent_used);
    println!("Left:       {} {}", view.remaining, view.token);
    println!();

    print_expenses(&view.expenses, &view.token, usize::MAX);
}

fn print_expenses(expenses: &[ExpenseEntry], token: &str, limit: usize) {
    if expenses.is_empty() {
        println!("No expenses found.");
        return;
    }

    println!(
        "{:<20} {:<20} {:>16} MEMO",
        "TIME", "EXPENDITURE", "AMOUNT"
    );
    println!("{}", "-".repeat(70));
    for expense in expenses.iter().take(limit) {
        println!(
            "{:<20} {:<20} {:>16} {}",
            expense.time.format("%Y-%m-%d %H:%M:%S").to_string(),
            truncate(expense.expenditure.as_deref().unwrap_or("?"), 20),
            format!("- {} {}", expense.amount, token),
            truncate(&expense.memo, 30)
        );
    }
}

async fn run_history_command(
    client: &LedgerClient,
    department: DepartmentId,
    expenditure: Option<ExpenditureId>,
    format: &str,
    output: Option<String>,
) -> Result<()> {
    if format == "csv" {
        let writer = open_output(output.as_deref())?;
        let count = Exporter::new(client)
            .export_history_csv(department, expenditure, writer)
            .await?;
        if output.is_some() {
            eprintln!("Exported {} expenses", count);
        }
        return Ok(());
    }

    let (expenses, token) = match expenditure {
        Some(id) => {
            let view = client.load_expenditure(department, id).await?;
            (view.expenses, view.token)
        }
        None => {
            let view = client.load_department(department).await?;
            (view.expenses, view.token)
        }
    };

    match format {
        "json" => {
            let mut writer = open_output(output.as_deref())?;
            writeln!(writer, "{}", serde_json::to_string_pretty(&expenses)?)?;
        }
        _ => {
            if output.is_some() {
                let writer = open_output(output.as_deref())?;
                write_expenses_csv(&expenses, &token, writer)?;
            } else {
                print_expenses(&expenses, &token, usize::MAX);
            }
        }
    }
    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_installs_global_subscriber() {
        init_tracing(true);
        assert!(tracing::dispatcher::has_been_set());
    }

    #[test]
    fn test_global_options_build_config() {
        let cli = Cli::try_parse_from([
            "allowance",
            "--endpoint",
            "http://node:8888/",
            "--contract",
            "budgets",
            "--page-size",
            "25",
            "spend",
            "1",
            "2",
            "12.5",
            "--auth",
            "hr@active",
        ])
        .unwrap();

        let config = cli.client_config();
        assert_eq!(config.endpoint, "http://node:8888");
        assert_eq!(config.contract, "budgets");
        assert_eq!(config.page_size, 25);
        assert!(matches!(
            cli.command,
            Commands::Spend { department: 1, expenditure: 2, .. }
        ));
        assert!(parse_auth("team9@active").is_err());
    }
}
