use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use requisition_core::{
    auth::AuthUser,
    config::{self, AppConfig},
    events::{self, EventHandler, LoggingEventHandler},
    repositories::HttpRequisitionRepository,
    services::{
        budget::DraftLine,
        evaluation::{EvaluationSession, LineView},
        requisitions::{MaterialRequest, RequisitionService},
    },
    LockState, UnlockOutcome,
};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize()?;

    match cli.command {
        Commands::Show(args) => handle_show(&context, args, cli.json).await?,
        Commands::CheckBudget(args) => handle_check_budget(&context, args, cli.json).await?,
        Commands::Unlock(args) => handle_unlock(&context, args, cli.json).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(
    name = "requisition-cli",
    about = "Inspect requisitions, check budgets and unlock blocked requisitions",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a requisition with its reconciled lines
    Show(ShowArgs),
    /// Check a material quantity against a project's budget
    CheckBudget(CheckBudgetArgs),
    /// Unlock a blocked requisition (administrators only)
    Unlock(UnlockArgs),
}

#[derive(Args)]
struct ShowArgs {
    #[arg(help = "Requisition id")]
    id: Uuid,
}

#[derive(Args)]
struct CheckBudgetArgs {
    #[arg(long, help = "Project id")]
    project: Uuid,
    #[arg(long, help = "Material id")]
    material: Uuid,
    #[arg(long, help = "Requested quantity")]
    qty: Decimal,
    #[arg(long, default_value = "", help = "Material description for messages")]
    description: String,
    #[arg(long, default_value = "", help = "Unit of measure")]
    unit: String,
}

#[derive(Args)]
struct UnlockArgs {
    #[arg(help = "Requisition id")]
    id: Uuid,
    #[arg(long, help = "User performing the unlock")]
    user: String,
    #[arg(long, help = "Role of the user (admin, warehouse, requester)")]
    role: String,
}

struct CliContext {
    service: RequisitionService,
}

impl CliContext {
    fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        Ok(Self {
            service: build_service(&config)?,
        })
    }
}

fn build_service(config: &AppConfig) -> Result<RequisitionService> {
    let repository = HttpRequisitionRepository::from_config(config)
        .context("failed to build requisition backend client")?;

    let (event_sender, event_rx) = events::channel(config.event_channel_capacity);
    let handlers: Vec<Arc<dyn EventHandler>> = vec![Arc::new(LoggingEventHandler)];
    tokio::spawn(events::process_events(event_rx, handlers));

    Ok(RequisitionService::from_config(
        Arc::new(repository),
        event_sender,
        config,
    ))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ShowOutput<'a> {
    lock: &'a LockState,
    session: &'a EvaluationSession,
}

async fn handle_show(context: &CliContext, args: ShowArgs, json: bool) -> Result<()> {
    let requisition = context
        .service
        .get_requisition(args.id)
        .await
        .with_context(|| format!("failed to load requisition {}", args.id))?;
    let lock = LockState::from_requisition(&requisition);
    let session = EvaluationSession::from_requisition(requisition);

    if json {
        return print_json(&ShowOutput {
            lock: &lock,
            session: &session,
        });
    }

    match &lock {
        LockState::Unlocked => println!("Requisition {} • open", args.id),
        LockState::Locked { reasons } => {
            println!("Requisition {} • LOCKED", args.id);
            for reason in reasons.as_list() {
                println!("  ! {}", reason);
            }
        }
    }
    for view in session.lines() {
        render_line(view);
    }

    Ok(())
}

async fn handle_check_budget(context: &CliContext, args: CheckBudgetArgs, json: bool) -> Result<()> {
    let request = MaterialRequest {
        material_id: args.material,
        description: args.description,
        unit: args.unit,
        requested_qty: args.qty,
    };
    let line = context
        .service
        .assess_draft_line(args.project, request)
        .await
        .context("failed to check budget")?;

    if json {
        print_json(&line)
    } else {
        render_draft_line(&line);
        Ok(())
    }
}

async fn handle_unlock(context: &CliContext, args: UnlockArgs, json: bool) -> Result<()> {
    let user = AuthUser::new(args.user, &[args.role.as_str()]);
    let outcome = context
        .service
        .unlock(args.id, &user)
        .await
        .with_context(|| format!("failed to unlock requisition {}", args.id))?;

    if json {
        return print_json(&outcome);
    }

    match &outcome {
        UnlockOutcome::StillLocked { reasons } => {
            println!("Requisition {}: {}", args.id, outcome.message());
            for reason in reasons.as_list() {
                println!("  ! {}", reason);
            }
        }
        _ => println!("Requisition {}: {}", args.id, outcome.message()),
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_line(view: &LineView) {
    let line = view.line();
    let reconciled = view.reconciled();
    let editability = view.editability();

    println!(
        "- {} • requested {} {} • delivered {} • status {}",
        line.description, line.requested_qty, line.unit, reconciled.delivered_qty, line.status
    );
    println!("  {}", reconciled.message);
    if reconciled.send_to_procurement {
        println!(
            "  → procurement {} {}",
            reconciled.procurement_suggested_qty, line.unit
        );
    }
    if let Some(legend) = editability.legend {
        println!("  ({})", legend);
    }
}

fn render_draft_line(line: &DraftLine) {
    let blocking = if line.check.is_blocking() {
        "BLOCKS"
    } else {
        "ok"
    };
    println!(
        "- {} x {} {} • {} • {}",
        line.requested_qty,
        line.description,
        line.unit,
        blocking,
        line.check.message()
    );
    if line.check.route_to_procurement() {
        println!("  stock is short, line will be pre-flagged for procurement");
    }
}
