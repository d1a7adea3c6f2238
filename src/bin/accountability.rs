//! accountability CLI: operator interface to the case engine.

use accountability_rs::config::Config;
use accountability_rs::db::Db;
use accountability_rs::directory::InMemoryDirectory;
use accountability_rs::engine::{Engine, resolve_level};
use accountability_rs::model::{
    Case, CaseId, LevelSet, MessageId, MessageType, NewCase, NewResponse, Priority, WorkerId,
};
use accountability_rs::telemetry::{TelemetryConfig, init_telemetry};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "accountability", about = "Hierarchy-aware accountability cases")]
struct Cli {
    /// TOML file with `[[worker]]` entries
    #[arg(long, global = true, default_value = "workers.toml")]
    directory: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply database migrations
    Migrate,
    /// Show the hierarchy level a role title resolves to
    Level {
        /// Free-text role title
        role: String,
    },
    /// Case operations
    Case {
        #[command(subcommand)]
        action: CaseAction,
    },
    /// Case counts visible to a worker
    Stats {
        /// Acting worker id
        #[arg(long = "as")]
        actor: i64,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum CaseAction {
    /// Open a new case
    Create {
        #[arg(long = "as")]
        actor: i64,
        /// Worker the case is about
        #[arg(long)]
        subject: i64,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        #[arg(long, default_value = "medium")]
        priority: String,
        #[arg(long)]
        category: Option<String>,
        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<NaiveDate>,
        #[arg(long)]
        confidential: bool,
    },
    /// List cases visible to a worker
    List {
        #[arg(long = "as")]
        actor: i64,
    },
    /// Show a case with the messages the worker may see
    Show {
        /// Case id, id prefix, or code
        case: String,
        #[arg(long = "as")]
        actor: i64,
    },
    /// Post a message to the narrowest audience
    Message {
        case: String,
        #[arg(long = "as")]
        actor: i64,
        content: String,
        #[arg(long = "type", default_value = "question")]
        message_type: String,
    },
    /// Respond with an explicit audience
    Respond {
        case: String,
        #[arg(long = "as")]
        actor: i64,
        content: String,
        #[arg(long = "type", default_value = "response")]
        message_type: String,
        /// Audience levels, e.g. "1,2"
        #[arg(long, default_value = "1,2,3,4")]
        visible: String,
        #[arg(long)]
        reply_to: Option<i64>,
        #[arg(long)]
        confidential: bool,
    },
    /// Raise a case one level
    Escalate {
        case: String,
        #[arg(long = "as")]
        actor: i64,
        #[arg(long)]
        reason: String,
    },
    /// Close a resolved case
    Close {
        case: String,
        #[arg(long = "as")]
        actor: i64,
    },
    /// Reopen a resolved or closed case
    Reopen {
        case: String,
        #[arg(long = "as")]
        actor: i64,
        #[arg(long)]
        reason: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Command::Level { role } = &cli.command {
        let level = resolve_level(role);
        println!("{} ({})", level.number(), level.name());
        return Ok(());
    }

    let config = Config::from_env()?;
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "accountability".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let db = Db::connect(config.database_url.expose_secret())
        .await?
        .with_retry_policy(config.retry_policy());
    db.migrate().await?;

    match cli.command {
        Command::Migrate => {
            println!("Migrations applied.");
            Ok(())
        }
        Command::Level { .. } => Ok(()),
        Command::Case { action } => {
            let engine = open_engine(db, &cli.directory)?;
            cmd_case(&engine, action).await
        }
        Command::Stats { actor, json } => {
            let engine = open_engine(db, &cli.directory)?;
            cmd_stats(&engine, WorkerId(actor), json).await
        }
    }
}

fn open_engine(db: Db, directory: &std::path::Path) -> anyhow::Result<Engine> {
    let directory = InMemoryDirectory::load_from_file(directory)?;
    Ok(Engine::new(db, Arc::new(directory)))
}

async fn cmd_case(engine: &Engine, action: CaseAction) -> anyhow::Result<()> {
    match action {
        CaseAction::Create {
            actor,
            subject,
            title,
            description,
            priority,
            category,
            due,
            confidential,
        } => {
            let priority: Priority = priority.parse()?;
            let mut new = NewCase::new(title, description, WorkerId(subject))
                .priority(priority)
                .confidential(confidential);
            if let Some(category) = category {
                new = new.category(category);
            }
            if let Some(due) = due {
                new = new.due(due);
            }
            let case = engine.create_case(WorkerId(actor), new).await?;
            println!(
                "Created: {} {} (level {}, assigned to {})",
                case.code,
                case.id.0,
                case.escalation_level.number(),
                worker_or_dash(case.assigned_to)
            );
            Ok(())
        }
        CaseAction::List { actor } => cmd_case_list(engine, WorkerId(actor)).await,
        CaseAction::Show { case, actor } => {
            let case = find_case(engine, &case).await?;
            cmd_case_show(engine, &case, WorkerId(actor)).await
        }
        CaseAction::Message {
            case,
            actor,
            content,
            message_type,
        } => {
            let case = find_case(engine, &case).await?;
            let message_type: MessageType = message_type.parse()?;
            let message = engine
                .post_message(case.id, WorkerId(actor), &content, message_type)
                .await?;
            println!("Posted message {} (visible to {})", message.id, message.visible_to);
            Ok(())
        }
        CaseAction::Respond {
            case,
            actor,
            content,
            message_type,
            visible,
            reply_to,
            confidential,
        } => {
            let case = find_case(engine, &case).await?;
            let visible: LevelSet = visible.parse()?;
            let mut response = NewResponse::new(message_type.parse()?, content, visible)
                .confidential(confidential);
            if let Some(reply_to) = reply_to {
                response = response.reply_to(MessageId(reply_to));
            }
            let message = engine.respond(case.id, WorkerId(actor), response).await?;
            let case = engine.get_case(case.id).await?;
            println!("Posted message {} (case now {})", message.id, case.status);
            Ok(())
        }
        CaseAction::Escalate {
            case,
            actor,
            reason,
        } => {
            let case = find_case(engine, &case).await?;
            let case = engine.escalate(case.id, WorkerId(actor), &reason).await?;
            println!(
                "Escalated {} to level {} ({}), assigned to {}",
                case.code,
                case.escalation_level.number(),
                case.escalation_level.name(),
                worker_or_dash(case.assigned_to)
            );
            Ok(())
        }
        CaseAction::Close { case, actor } => {
            let case = find_case(engine, &case).await?;
            let case = engine.close(case.id, WorkerId(actor)).await?;
            println!("{}: {}", case.code, case.status);
            Ok(())
        }
        CaseAction::Reopen {
            case,
            actor,
            reason,
        } => {
            let case = find_case(engine, &case).await?;
            let case = engine.reopen(case.id, WorkerId(actor), &reason).await?;
            println!("{}: {}", case.code, case.status);
            Ok(())
        }
    }
}

async fn cmd_case_list(engine: &Engine, actor: WorkerId) -> anyhow::Result<()> {
    let cases = engine.visible_cases(actor).await?;
    if cases.is_empty() {
        println!("No cases found.");
        return Ok(());
    }

    println!(
        "{:<20}  {:<10}  {:<8}  {:<3}  {:<8}  {:<30}  CREATED",
        "CODE", "STATUS", "PRIORITY", "LVL", "SUBJECT", "TITLE"
    );
    println!("{}", "-".repeat(110));

    for case in &cases {
        let title: String = case.title.chars().take(30).collect();
        println!(
            "{:<20}  {:<10}  {:<8}  {:<3}  {:<8}  {:<30}  {}",
            case.code,
            case.status,
            case.priority,
            case.escalation_level.number(),
            case.subject,
            title,
            case.created_at.format("%Y-%m-%d %H:%M")
        );
    }

    println!("\n{} case(s)", cases.len());
    Ok(())
}

async fn cmd_case_show(engine: &Engine, case: &Case, actor: WorkerId) -> anyhow::Result<()> {
    if !engine.can_view_case(case.id, actor).await? {
        anyhow::bail!("case {} is not visible to {actor}", case.code);
    }

    println!("Code:        {}", case.code);
    println!("ID:          {}", case.id.0);
    println!("Title:       {}", case.title);
    println!("Status:      {}", case.status);
    println!("Priority:    {}", case.priority);
    println!(
        "Level:       {} ({})",
        case.escalation_level.number(),
        case.escalation_level.name()
    );
    println!("Subject:     {}", case.subject);
    println!("Created By:  {}", case.created_by);
    println!("Assigned To: {}", worker_or_dash(case.assigned_to));
    println!("Category:    {}", case.category);
    println!("Occurred:    {}", case.occurrence_date);
    if let Some(due) = case.due_date {
        println!("Due:         {due}");
    }
    if case.is_confidential {
        println!("Confidential");
    }
    if let Some(next) = engine.next_escalation_level_name(case.id, actor).await? {
        println!("Can escalate to {next}");
    }
    println!("---");
    println!("{}", case.description);

    let messages = engine.visible_messages(case.id, actor).await?;
    if !messages.is_empty() {
        println!("--- messages");
    }
    for message in &messages {
        println!(
            "[{}] {} {} ({}) to {{{}}}: {}",
            message.id,
            message.sent_at.format("%Y-%m-%d %H:%M"),
            message.sender,
            message.message_type,
            message.visible_to,
            message.content
        );
    }

    let actions = engine.case_actions(case.id).await?;
    if !actions.is_empty() {
        println!("--- history");
    }
    for action in &actions {
        println!(
            "{} {} {}: {}",
            action.acted_at.format("%Y-%m-%d %H:%M"),
            action.actor,
            action.action_type,
            action.description
        );
    }
    Ok(())
}

async fn cmd_stats(engine: &Engine, actor: WorkerId, json: bool) -> anyhow::Result<()> {
    let stats = engine.statistics(actor).await?;
    let dashboard = engine.dashboard_counts(actor).await?;
    if json {
        let out = serde_json::json!({ "statistics": stats, "dashboard": dashboard });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }
    println!("Total:          {}", stats.total);
    println!("Open:           {}", stats.open);
    println!("In Progress:    {}", stats.in_progress);
    println!("Escalated:      {}", stats.escalated);
    println!("Resolved:       {}", stats.resolved);
    println!("Closed:         {}", stats.closed);
    println!("Overdue:        {}", stats.overdue);
    println!("Created by me:  {}", stats.created_by_me);
    println!("Assigned to me: {}", stats.assigned_to_me);
    println!("About me:       {}", stats.subject_is_me);
    println!("---");
    println!("Open:                {}", dashboard.total);
    println!("Open assigned to me: {}", dashboard.assigned_to_me);
    println!("My feedback:         {}", dashboard.my_feedback);
    println!("Open overdue:        {}", dashboard.overdue);
    Ok(())
}

/// Look a case up by code, full id, or unique id prefix.
async fn find_case(engine: &Engine, reference: &str) -> anyhow::Result<Case> {
    if reference.starts_with("AC-") {
        return Ok(engine.get_case_by_code(reference).await?);
    }
    if let Ok(uuid) = uuid::Uuid::parse_str(reference) {
        return Ok(engine.get_case(CaseId(uuid)).await?);
    }

    let cases = engine.db().list_active_cases().await?;
    let mut matches = cases
        .into_iter()
        .filter(|case| case.id.0.to_string().starts_with(reference));
    match (matches.next(), matches.next()) {
        (Some(case), None) => Ok(case),
        (None, _) => anyhow::bail!("no case matching '{reference}'"),
        (Some(_), Some(_)) => anyhow::bail!("several cases match '{reference}'; be more specific"),
    }
}

fn worker_or_dash(worker: Option<WorkerId>) -> String {
    worker.map_or_else(|| "-".to_string(), |w| w.to_string())
}
