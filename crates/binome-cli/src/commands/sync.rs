use binome_core::sync::{CollectionReport, DeleteReason, MatchKind, SyncPlan, SyncRecord};
use serde::Serialize;

use crate::cli::SyncCommands;
use crate::commands::common::Context;
use crate::error::CliError;

pub async fn run_sync(context: &Context, command: Option<SyncCommands>) -> Result<(), CliError> {
    match command.unwrap_or(SyncCommands::Run) {
        SyncCommands::Run => run_cycle(context).await,
        SyncCommands::Plan { json } => run_plan(context, json).await,
        SyncCommands::Status => run_status(context),
    }
}

async fn run_cycle(context: &Context) -> Result<(), CliError> {
    let session = context.session()?;
    let engine = context.engine(&session)?;
    let report = engine.run_cycle().await?;

    print_collection("Visits", &report.distributions);
    print_collection("Zones", &report.zones);
    if report.is_clean() {
        println!("Sync completed");
    } else {
        println!(
            "Sync completed with {} failed operations; they will be retried next cycle",
            report.failed()
        );
    }
    Ok(())
}

fn print_collection(label: &str, report: &CollectionReport) {
    println!(
        "{label:<7} created={} updated={} deleted={} failed={}",
        report.created, report.updated, report.deleted, report.failed
    );
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanItem {
    pub action: &'static str,
    pub local_id: Option<String>,
    pub remote_id: Option<String>,
    pub detail: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct PlanOutput {
    pub distributions: Vec<PlanItem>,
    pub zones: Vec<PlanItem>,
}

pub fn plan_items<R: SyncRecord>(plan: &SyncPlan<R>) -> Vec<PlanItem> {
    let deletes = plan.to_delete.iter().map(|delete| PlanItem {
        action: "delete",
        local_id: delete.local_id.clone(),
        remote_id: Some(delete.remote_id.clone()),
        detail: Some(match delete.reason {
            DeleteReason::Orphaned => "orphaned",
            DeleteReason::Duplicate => "duplicate",
            DeleteReason::Replaced => "replaced",
        }),
    });
    let updates = plan.to_update.iter().map(|update| PlanItem {
        action: "update",
        local_id: Some(update.record.record_id().to_string()),
        remote_id: Some(update.remote_id.clone()),
        detail: Some(match update.matched_by {
            MatchKind::LocalId => "local id",
            MatchKind::Fallback => "adopted by address",
        }),
    });
    let creates = plan.to_create.iter().map(|record| PlanItem {
        action: "create",
        local_id: Some(record.record_id().to_string()),
        remote_id: None,
        detail: None,
    });
    deletes.chain(updates).chain(creates).collect()
}

async fn run_plan(context: &Context, as_json: bool) -> Result<(), CliError> {
    let session = context.session()?;
    let engine = context.engine(&session)?;
    let output = PlanOutput {
        distributions: plan_items(&engine.plan_distributions().await?),
        zones: plan_items(&engine.plan_zones().await?),
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if output.distributions.is_empty() && output.zones.is_empty() {
        println!("Remote tables are up to date.");
        return Ok(());
    }
    for (label, items) in [("visit", &output.distributions), ("zone", &output.zones)] {
        for item in items {
            println!(
                "{:<6} {label:<5} local={} remote={}{}",
                item.action,
                item.local_id.as_deref().unwrap_or("-"),
                item.remote_id.as_deref().unwrap_or("-"),
                item.detail.map(|detail| format!(" ({detail})")).unwrap_or_default()
            );
        }
    }
    Ok(())
}

fn run_status(context: &Context) -> Result<(), CliError> {
    let settings = &context.settings;
    match settings.api_url.as_deref() {
        Some(url) => {
            let auth = if settings.proxied {
                "proxied"
            } else {
                "bearer token"
            };
            println!("Remote:        {url} ({auth})");
        }
        None => println!("Remote:        not configured (offline)"),
    }
    println!(
        "Tables:        {} / {}",
        settings.tables.distributions, settings.tables.zones
    );
    println!("Debounce:      {} ms", settings.debounce.as_millis());

    println!("Local visits:  {}", context.store.distributions()?.len());
    println!("Local zones:   {}", context.store.zones()?.len());
    match context.sessions.restore()? {
        Some(session) => println!(
            "Session:       {}{}",
            session.user_id,
            if session.is_admin { " (admin)" } else { "" }
        ),
        None => println!("Session:       none"),
    }
    Ok(())
}
