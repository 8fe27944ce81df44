//! Task commands.

use super::{Context, SessionArgs};
use crate::output::{self, OutputFormat};
use anyhow::{anyhow, Result};
use backing_store::{BackingStore, RepositoryRef};
use std::sync::Arc;
use task_orchestrator::{
    CreateTaskOptions, Estimator, FunctionsInvoker, Notification, NotificationLevel, ParallelSummary,
    TaskOrchestrator,
};
use tokio::sync::broadcast;

/// Task options as given on the command line.
pub struct TaskOptionArgs {
    pub repo: Option<String>,
    pub branch: Option<String>,
    pub context: Option<String>,
    pub auto_apply: bool,
}

fn parse_repository(repo: Option<String>, branch: Option<String>) -> Result<Option<RepositoryRef>> {
    let Some(slug) = repo else {
        return Ok(None);
    };
    let mut repository =
        RepositoryRef::parse(&slug).ok_or_else(|| anyhow!("repository must look like owner/name, got {:?}", slug))?;
    repository.branch = branch;
    Ok(Some(repository))
}

fn orchestrator(ctx: &Context, session: &SessionArgs) -> (TaskOrchestrator, Arc<dyn BackingStore>) {
    let client = ctx.supabase(session.session().as_ref());
    let invoker = FunctionsInvoker::new(Arc::clone(&client), ctx.config.process_function.clone());
    let store: Arc<dyn BackingStore> = client;
    let orchestrator = TaskOrchestrator::new(
        Arc::clone(&store),
        Arc::new(invoker),
        Estimator::new(ctx.config.estimation.clone()),
    );
    (orchestrator, store)
}

/// Prints every warning or error raised while the command ran.
fn report_notifications(rx: &mut broadcast::Receiver<Notification>, format: &OutputFormat) {
    while let Ok(notification) = rx.try_recv() {
        let text = format!("{}: {}", notification.title, notification.message);
        match notification.level {
            NotificationLevel::Warning | NotificationLevel::Error => output::print_warning(&text, format),
            NotificationLevel::Info | NotificationLevel::Success => {}
        }
    }
}

pub async fn task_create(ctx: &Context, session: &SessionArgs, instruction: &str, args: TaskOptionArgs) -> Result<()> {
    let mut options = CreateTaskOptions::default();
    if let Some(repository) = parse_repository(args.repo, args.branch)? {
        options = options.with_repository(repository);
    }
    if let Some(context) = args.context {
        options = options.with_context(context);
    }
    if args.auto_apply {
        options = options.with_auto_apply(true);
    }

    let (orchestrator, store) = orchestrator(ctx, session);
    let mut notifications = orchestrator.notifier().subscribe();
    let auth = ctx.auth(session.session().as_ref(), store).await?;

    let task = orchestrator.create_task(auth.as_ref(), instruction, options).await?;
    report_notifications(&mut notifications, &ctx.format);

    match ctx.format {
        OutputFormat::Text => {
            output::print_heading("Task created");
            output::print_row("ID", &task.id);
            output::print_row("Status", task.status.as_str());
            output::print_row("Instruction", &task.instruction);
            if let Some(repository) = &task.metadata.repository {
                output::print_row("Repository", &repository.full_name());
            }
        }
        OutputFormat::Json => output::print_json(&task)?,
    }
    Ok(())
}

pub async fn task_parallel(
    ctx: &Context,
    session: &SessionArgs,
    instruction: &str,
    agents: usize,
    repo: Option<String>,
    branch: Option<String>,
    token: Option<String>,
) -> Result<()> {
    let repository = parse_repository(repo, branch)?;
    let (orchestrator, store) = orchestrator(ctx, session);
    let mut notifications = orchestrator.notifier().subscribe();
    let auth = ctx.auth(session.session().as_ref(), store).await?;

    let summary = orchestrator
        .execute_parallel(auth.as_ref(), instruction, agents, repository, token)
        .await?;
    report_notifications(&mut notifications, &ctx.format);

    match ctx.format {
        OutputFormat::Text => print_summary(&summary),
        OutputFormat::Json => output::print_json(&summary)?,
    }
    Ok(())
}

fn print_summary(summary: &ParallelSummary) {
    println!(
        "{:<6} {:<10} {:>8} {:>6} {:>8} {:>8} {:>10}",
        "Agent", "Status", "Progress", "Files", "Added", "Removed", "Cost"
    );
    println!("{}", "-".repeat(64));
    let mut runs = summary.runs.clone();
    runs.sort_by_key(|run| run.agent_index);
    for run in &runs {
        println!(
            "{:<6} {:<10} {:>7}% {:>6} {:>8} {:>8} {:>10}",
            run.agent_index,
            run.status.as_str(),
            run.progress,
            run.files_changed,
            run.lines_added,
            run.lines_removed,
            format!("${:.4}", run.cost())
        );
        if let Some(error) = &run.error {
            println!("       {}", error);
        }
    }
    println!(
        "\n{} completed, {} failed, total ${:.4}",
        summary.completed, summary.failed, summary.total_cost
    );
}
