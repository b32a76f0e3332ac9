use anyhow::Context;

use inbox_rules::config::AppConfig;
use inbox_rules::mail::{self, GmailClient};
use inbox_rules::rules::{RulesEngine, load_rules};
use inbox_rules::store::LibSqlBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Fetch, then process.
    Run,
    Fetch,
    Process,
}

impl Command {
    fn parse(arg: Option<&str>) -> Option<Self> {
        match arg {
            None | Some("run") => Some(Self::Run),
            Some("fetch") => Some(Self::Fetch),
            Some("process") => Some(Self::Process),
            Some(_) => None,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let arg = std::env::args().nth(1);
    let Some(command) = Command::parse(arg.as_deref()) else {
        eprintln!("Usage: inbox-rules [run|fetch|process]");
        std::process::exit(1);
    };

    if let Err(e) = execute(command).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn execute(command: Command) -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;

    eprintln!("📬 Inbox Rules v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Label: {}", config.gmail_label);

    // Rules load before any message is touched; a bad rule file halts the run.
    let engine = match command {
        Command::Fetch => None,
        Command::Run | Command::Process => {
            eprintln!("   Rules: {}", config.rules_path.display());
            let rules = load_rules(&config.rules_path)?;
            Some(RulesEngine::new(rules))
        }
    };

    let store = LibSqlBackend::new_local(&config.db_path)
        .await
        .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?;
    let client = GmailClient::new(config.gmail_config());

    if matches!(command, Command::Run | Command::Fetch) {
        let fetched = mail::fetch_messages(&client, &store).await?;
        eprintln!("   Fetched {} message(s)", fetched.len());
    }

    if let Some(engine) = engine {
        let report = mail::process_messages(&engine, &client, &store).await?;
        eprintln!(
            "   Processed {} message(s): {} rule match(es), {} action(s) dispatched, {} failed",
            report.messages_evaluated,
            report.rules_matched,
            report.actions_dispatched,
            report.failures.len()
        );
        for failure in &report.failures {
            eprintln!(
                "   ✗ {} rule #{} {}: {}",
                failure.message_id,
                failure.rule_index,
                failure.action.label(),
                failure.error
            );
        }
    }

    Ok(())
}
