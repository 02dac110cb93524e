//! Deliverytrack CLI - bulk CSV import of delivery projects
//!
//! # Main Commands
//!
//! ```bash
//! deliverytrack serve                     # Start HTTP server (port 3000)
//! deliverytrack preview projects.csv      # Validate and match, write nothing
//! deliverytrack import projects.csv       # Preview, confirm, then commit
//! deliverytrack export projects           # Projects as CSV
//! ```
//!
//! # Admin Commands
//!
//! ```bash
//! deliverytrack users add am@example.com --name "Ann Manager"
//! deliverytrack users list
//! deliverytrack accounts list
//! deliverytrack audit --action UPDATE
//! ```

use clap::{Parser, Subcommand};
use deliverytrack::{
    audit_csv, commit, preview_file, projects_csv, Actor, AuditAction, AuditQuery,
    CommitRequest, Config, JsonStore, Outcome, PreviewResponse, ProjectFilter, Stage, Status,
    UserDirectory, Vocabulary,
};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "deliverytrack")]
#[command(about = "Bulk CSV import and reconciliation of delivery projects", long_about = None)]
struct Cli {
    /// Data directory (default: $DELIVERYTRACK_DATA_DIR or .deliverytrack)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start HTTP server
    Serve {
        /// Port to listen on (default: $DELIVERYTRACK_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Validate, resolve and match a CSV without writing projects
    Preview {
        /// Input CSV file
        input: PathBuf,

        /// Write the full preview JSON to a file (default: summary only)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Preview a CSV, then commit its valid rows
    Import {
        /// Input CSV file
        input: PathBuf,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,

        /// Email of the user the changes are recorded for
        #[arg(long)]
        user: Option<String>,
    },

    /// Manage users
    Users {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Manage account names
    Accounts {
        #[command(subcommand)]
        action: AccountAction,
    },

    /// Show audit log entries
    Audit {
        /// CREATE, UPDATE or DELETE
        #[arg(long)]
        action: Option<String>,

        /// Only entries about this project id
        #[arg(long)]
        project: Option<String>,

        /// Only entries recorded by this user id
        #[arg(long)]
        user: Option<String>,
    },

    /// Export data as CSV
    Export {
        #[command(subcommand)]
        what: ExportTarget,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Register a user
    Add {
        email: String,
        #[arg(short, long)]
        name: Option<String>,
    },
    /// List users
    List,
}

#[derive(Subcommand)]
enum AccountAction {
    /// List account names
    List,
}

#[derive(Subcommand)]
enum ExportTarget {
    /// Projects
    Projects {
        #[arg(long)]
        stage: Option<String>,
        #[arg(long)]
        status: Option<String>,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Audit log
    Audit {
        #[arg(long)]
        action: Option<String>,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = Config::from_env().with_data_dir(cli.data_dir);

    let result = match cli.command {
        Commands::Serve { port } => cmd_serve(config.with_port(port)).await,

        Commands::Preview { input, output } => cmd_preview(&config, &input, output.as_deref()),

        Commands::Import { input, yes, user } => cmd_import(&config, &input, yes, user.as_deref()),

        Commands::Users { action } => cmd_users(&config, action),

        Commands::Accounts { action } => cmd_accounts(&config, action),

        Commands::Audit { action, project, user } => cmd_audit(&config, action, project, user),

        Commands::Export { what } => cmd_export(&config, what),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn cmd_serve(config: Config) -> CliResult {
    deliverytrack::server::start_server(config).await
}

fn open_store(config: &Config) -> Result<JsonStore, Box<dyn std::error::Error>> {
    Ok(JsonStore::open(&config.data_dir)?)
}

fn cmd_preview(config: &Config, input: &Path, output: Option<&Path>) -> CliResult {
    let store = open_store(config)?;
    let preview = preview_file(input, &store)?;

    print_preview(&preview);

    if let Some(path) = output {
        fs::write(path, serde_json::to_string_pretty(&preview)?)?;
        eprintln!("💾 Preview written to: {}", path.display());
    }
    Ok(())
}

fn cmd_import(config: &Config, input: &Path, yes: bool, user: Option<&str>) -> CliResult {
    let store = open_store(config)?;
    let actor = match user {
        Some(email) => {
            let id = store
                .find_user_by_email(email)?
                .ok_or_else(|| format!("User not found: {}", email))?;
            let label = store
                .user(&id)?
                .map(|u| u.display_name().to_string())
                .unwrap_or_else(|| email.to_string());
            Actor { id, label }
        }
        None => config.default_actor(),
    };

    let preview = preview_file(input, &store)?;
    print_preview(&preview);

    let request = CommitRequest::from_preview(&preview);
    if request.rows.is_empty() {
        eprintln!("\n⚠️  No valid rows to import.");
        return Ok(());
    }

    if !yes && !confirm(&format!("Import {} rows as {}?", request.rows.len(), actor.label))? {
        eprintln!("Aborted.");
        return Ok(());
    }

    let result = commit(&request, &actor, &store);

    eprintln!("\n📊 Results: {} created, {} updated, {} failed", result.created, result.updated, result.failed);
    for failure in &result.errors {
        eprintln!("   ❌ Row {}: {}", failure.row_number, failure.error);
    }
    for outcome in result.outcomes.iter().filter(|o| o.outcome != Outcome::Failed) {
        if let Some(id) = &outcome.record_id {
            println!("{}\t{:?}\t{}", outcome.row_number, outcome.outcome, id);
        }
    }

    if result.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn print_preview(preview: &PreviewResponse) {
    if let Some(info) = &preview.csv_info {
        eprintln!("   Encoding: {}", info.encoding);
        eprintln!("   Delimiter: '{}'", info.delimiter);
        eprintln!("   Columns: {}", info.headers.join(", "));
    }

    eprintln!("\n✔️  Preview:");
    eprintln!("   Rows: {}", preview.total_rows);
    eprintln!("   ✅ Valid: {}", preview.valid_rows);
    eprintln!("   🔁 Updates existing: {}", preview.duplicate_rows);
    if preview.invalid_rows > 0 {
        eprintln!("   ❌ Invalid: {}", preview.invalid_rows);
        for row in preview.rows.iter().filter(|r| !r.is_valid).take(10) {
            eprintln!("\n   Row {}:", row.row_number);
            for err in &row.validation_errors {
                eprintln!("     - {}: {}", err.field, err.message);
            }
        }
    }
    for row in preview.rows.iter().filter(|r| !r.warnings.is_empty()) {
        for warning in &row.warnings {
            eprintln!("   ⚠️  Row {}: {}", row.row_number, warning.message);
        }
    }
}

fn confirm(question: &str) -> io::Result<bool> {
    eprint!("\n{} [y/N] ", question);
    io::stderr().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn cmd_users(config: &Config, action: UserAction) -> CliResult {
    let store = open_store(config)?;

    match action {
        UserAction::Add { email, name } => {
            let id = store.add_user(&email, name.as_deref())?;
            eprintln!("✅ User saved with ID: {}", id);
        }
        UserAction::List => {
            let users = store.users()?;
            if users.is_empty() {
                eprintln!("📋 No users yet.");
                eprintln!("   Use 'deliverytrack users add <email>' to add one.");
                return Ok(());
            }
            eprintln!("📋 Users ({}):\n", users.len());
            for u in users {
                println!("  {}\t{}\t{}", u.id, u.email, u.name.as_deref().unwrap_or("-"));
            }
        }
    }
    Ok(())
}

fn cmd_accounts(config: &Config, action: AccountAction) -> CliResult {
    let store = open_store(config)?;

    match action {
        AccountAction::List => {
            let accounts = store.account_names()?;
            eprintln!("📋 Account names ({}):\n", accounts.len());
            for a in accounts {
                println!("  {}\t{}", a.id, a.name);
            }
        }
    }
    Ok(())
}

fn cmd_audit(
    config: &Config,
    action: Option<String>,
    project: Option<String>,
    user: Option<String>,
) -> CliResult {
    let store = open_store(config)?;
    let query = AuditQuery {
        action: parse_flag::<AuditAction>("action", action.as_deref())?,
        project_id: project,
        user_id: user,
        ..AuditQuery::default()
    };

    let entries = query.apply(store.audit_entries()?);
    eprintln!("📜 Audit entries ({}):\n", entries.len());
    for e in entries {
        println!(
            "  {}  {:<6} {}  {}  {}",
            e.timestamp.format("%Y-%m-%d %H:%M:%S"),
            e.action.as_str(),
            e.subject_record_id,
            e.actor_label,
            e.new_value.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

fn cmd_export(config: &Config, what: ExportTarget) -> CliResult {
    let store = open_store(config)?;

    match what {
        ExportTarget::Projects { stage, status, output } => {
            let filter = ProjectFilter {
                stage: parse_flag::<Stage>("stage", stage.as_deref())?,
                status: parse_flag::<Status>("status", status.as_deref())?,
                ..ProjectFilter::default()
            };
            write_output(&projects_csv(&store, &filter)?, output.as_deref())
        }
        ExportTarget::Audit { action, output } => {
            let query = AuditQuery {
                action: parse_flag::<AuditAction>("action", action.as_deref())?,
                ..AuditQuery::default()
            };
            write_output(&audit_csv(&store, &query)?, output.as_deref())
        }
    }
}

fn parse_flag<V: Vocabulary>(name: &str, value: Option<&str>) -> Result<Option<V>, String> {
    match value {
        None => Ok(None),
        Some(v) => V::parse(v)
            .map(Some)
            .ok_or_else(|| format!("Invalid {}: {}. Must be one of: {}", name, v, V::listing())),
    }
}

fn write_output(content: &str, path: Option<&Path>) -> CliResult {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            print!("{}", content);
        }
    }
    Ok(())
}
