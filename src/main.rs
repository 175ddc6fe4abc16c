use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use goal_allocation::store::{insert_account, insert_goal, set_account_active};
use goal_allocation::{
    read_allocations_csv, write_allocations_csv, Account, AccountSource, AccountType,
    AllocationEditor, AllocationError, Config, Goal, GoalSettings, GoalSource, SaveOutcome,
    SqliteStore, ValidationReport,
};

#[derive(Parser)]
#[command(
    name = "goal-allocation",
    version,
    about = "Distribute account contributions across savings goals"
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,

    /// Register a funding account
    AddAccount {
        name: String,
        currency: String,
        /// SECURITIES, CASH or CRYPTOCURRENCY
        #[arg(long, default_value = "CASH")]
        account_type: String,
        #[arg(long)]
        inactive: bool,
    },

    /// Mark an account inactive (its allocations are kept and flagged)
    DeactivateAccount { account: String },

    /// Mark an account active again
    ActivateAccount { account: String },

    /// Register a goal
    AddGoal { title: String, target: f64 },

    /// Mark a goal achieved (by id or title)
    AchieveGoal { goal: String },

    /// Print the allocation matrix and its validation state
    Show,

    /// Set one allocation (account and goal by id or name) and save
    Set {
        account: String,
        goal: String,
        percent: f64,
    },

    /// Replace all allocations with the rows of a CSV file and save
    Import { file: PathBuf },

    /// Write the stored allocations to a CSV file
    Export { file: PathBuf },

    /// Delete a goal and its allocation column
    DeleteGoal { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    let config = Config::load(cli.config.as_deref())?;
    let store = SqliteStore::open(&config.database_path, config.validator())?;
    let settings = GoalSettings::new(store.clone(), config.validator());

    match cli.command {
        Commands::Init => {
            println!("✓ Database ready: {}", config.database_path.display());
        }
        Commands::AddAccount {
            name,
            currency,
            account_type,
            inactive,
        } => {
            let account_type = AccountType::parse(&account_type)
                .ok_or_else(|| anyhow!("Unknown account type: {}", account_type))?;
            let mut account = Account::new(&name, account_type, &currency);
            if inactive {
                account.deactivate();
            }
            store.with_connection(|conn| insert_account(conn, &account))?;
            println!("✓ Account {} ({})", account.label(), account.id);
        }
        Commands::DeactivateAccount { account } => {
            set_active(&store, &settings, &account, false).await?;
        }
        Commands::ActivateAccount { account } => {
            set_active(&store, &settings, &account, true).await?;
        }
        Commands::AddGoal { title, target } => {
            let goal = Goal::new(&title, target);
            store.with_connection(|conn| insert_goal(conn, &goal))?;
            println!("✓ Goal {} ({})", goal.title, goal.id);
        }
        Commands::AchieveGoal { goal } => {
            let goal_id = resolve_goal(&store, &goal).await?;
            let mut stored = store
                .list_goals()
                .await?
                .into_iter()
                .find(|g| g.id == goal_id)
                .ok_or_else(|| AllocationError::UnknownGoal(goal_id.clone()))?;
            stored.mark_achieved();
            store.with_connection(|conn| insert_goal(conn, &stored))?;
            println!("🏁 Goal {} achieved", stored.title);

            let editor = settings.open_editor().await?;
            print_report(&editor.validate());
        }
        Commands::Show => {
            let editor = settings.open_editor().await?;
            print_matrix(&store, &editor).await?;
            print_report(&editor.validate());
        }
        Commands::Set {
            account,
            goal,
            percent,
        } => {
            let account_id = resolve_account(&store, &account).await?;
            let goal_id = resolve_goal(&store, &goal).await?;

            let editor = settings.open_editor().await?;
            let report = editor.set_cell(&account_id, &goal_id, percent)?;
            print_report(&report);
            submit(&editor).await?;
        }
        Commands::Import { file } => {
            let rows = read_allocations_csv(&file)?;
            let editor = settings.open_editor().await?;
            let load = editor.load(&rows);

            println!("📂 Read {} row(s) from {}", rows.len(), file.display());
            for key in &load.dropped_unknown {
                println!("   ⚠️  skipped unknown account/goal: {}", key);
            }
            print_report(&editor.validate());
            submit(&editor).await?;
        }
        Commands::Export { file } => {
            let editor = settings.open_editor().await?;
            let allocations = editor.allocations();
            write_allocations_csv(&file, &allocations)?;
            println!("✓ Wrote {} allocation(s) to {}", allocations.len(), file.display());
        }
        Commands::DeleteGoal { id } => {
            settings.delete_goal(&id).await?;
            println!("✓ Goal {} deleted", id);
        }
    }

    Ok(())
}

async fn set_active(
    store: &SqliteStore,
    settings: &GoalSettings<SqliteStore>,
    account: &str,
    active: bool,
) -> Result<()> {
    let account_id = resolve_account(store, account).await?;
    store.with_connection(|conn| set_account_active(conn, &account_id, active))?;
    println!(
        "✓ Account {} {}",
        account,
        if active { "activated" } else { "deactivated" }
    );

    // Allocations on an inactive account are kept; show the resulting warnings
    let editor = settings.open_editor().await?;
    print_report(&editor.validate());
    Ok(())
}

async fn submit(editor: &AllocationEditor<SqliteStore>) -> Result<()> {
    if !editor.is_dirty() {
        println!("✓ Nothing to save");
        return Ok(());
    }

    match editor.submit().await {
        Ok(SaveOutcome {
            submitted, diff, ..
        }) => {
            println!(
                "💾 Saved {} allocation(s): {}",
                submitted.len(),
                diff.summary()
            );
            Ok(())
        }
        Err(AllocationError::SubmissionBlocked(errors)) => {
            println!("❌ Not saved, fix these first:");
            for error in &errors {
                println!("   - {}", error);
            }
            Err(anyhow!("{} validation error(s)", errors.len()))
        }
        Err(e) => Err(e.into()),
    }
}

async fn resolve_account(store: &SqliteStore, key: &str) -> Result<String> {
    let accounts = store.list_accounts().await?;
    accounts
        .iter()
        .find(|a| a.id == key)
        .or_else(|| accounts.iter().find(|a| a.name.eq_ignore_ascii_case(key)))
        .map(|a| a.id.clone())
        .ok_or_else(|| AllocationError::UnknownAccount(key.to_string()).into())
}

async fn resolve_goal(store: &SqliteStore, key: &str) -> Result<String> {
    let goals = store.list_goals().await?;
    goals
        .iter()
        .find(|g| g.id == key)
        .or_else(|| goals.iter().find(|g| g.title.eq_ignore_ascii_case(key)))
        .map(|g| g.id.clone())
        .ok_or_else(|| AllocationError::UnknownGoal(key.to_string()).into())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

async fn print_matrix(store: &SqliteStore, editor: &AllocationEditor<SqliteStore>) -> Result<()> {
    let accounts = store.list_accounts().await?;
    let goals = store.list_goals().await?;
    let report = editor.validate();

    if goals.is_empty() {
        println!("No goals yet. Add one with: goal-allocation add-goal <title> <target>");
        return Ok(());
    }

    let mut header = format!("{:<24}", "Account");
    for goal in &goals {
        header.push_str(&format!(" {:>12}", truncate(&goal.title, 12)));
    }
    header.push_str(&format!(" {:>8}", "Total"));
    println!("{}", header);
    println!("{}", "━".repeat(header.chars().count()));

    editor.with_matrix(|matrix| {
        for account in &accounts {
            let mut line = format!("{:<24}", truncate(&account.label(), 24));
            for goal in &goals {
                let percent = matrix.cell(&account.id, &goal.id);
                let cell = if percent == 0.0 {
                    "-".to_string()
                } else {
                    format!("{:.2}%", percent)
                };
                line.push_str(&format!(" {:>12}", cell));
            }

            let flag = if !report.row_errors(&account.id).is_empty() {
                " ❌"
            } else if !account.is_active {
                " ⚠️"
            } else {
                ""
            };
            line.push_str(&format!(" {:>7.2}%{}", matrix.row_sum(&account.id), flag));
            println!("{}", line);
        }
    });

    Ok(())
}

fn print_report(report: &ValidationReport) {
    for error in &report.errors {
        println!("❌ {}", error);
    }
    for warning in &report.warnings {
        println!("⚠️  {}", warning.message());
    }
    if report.is_submittable() {
        println!("✅ Allocations valid ({})", report.summary());
    }
}
