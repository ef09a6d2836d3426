use binome_core::access::{distributions_in_zone, visible_distributions};
use binome_core::store::DistributionEdit;
use binome_core::{Distribution, LatLng, Session, VisitStatus};
use chrono::Utc;

use crate::cli::VisitCommands;
use crate::commands::common::{
    format_visit_lines, resolve_by_id_prefix, resolve_zone, visit_to_list_item, Context,
    VisitListItem,
};
use crate::error::CliError;

pub async fn run_visit(
    context: &mut Context,
    command: VisitCommands,
    sync_after: bool,
) -> Result<(), CliError> {
    let session = context.session()?;
    if sync_after && !matches!(command, VisitCommands::List { .. }) {
        context.enable_auto_sync(&session)?;
    }

    match command {
        VisitCommands::Add {
            address,
            lat,
            lng,
            status,
            amount,
            payment,
            notes,
            owner,
        } => {
            let mut visit = Distribution::new(
                address.join(" "),
                LatLng::new(lat, lng),
                resolve_owner(&session, owner)?,
                status,
            );
            visit.amount = amount.unwrap_or_default();
            visit.payment_method = payment;
            visit.notes = notes.unwrap_or_default();
            let created = context.store.create_distribution(visit)?;
            println!("{}", created.id);
        }
        VisitCommands::List {
            zone,
            status,
            limit,
            json,
        } => run_list(context, &session, zone.as_deref(), status, limit, json)?,
        VisitCommands::Edit {
            id,
            address,
            lat,
            lng,
            status,
            amount,
            payment,
            notes,
        } => {
            let edit = DistributionEdit {
                address,
                point: lat.zip(lng).map(|(lat, lng)| LatLng::new(lat, lng)),
                status,
                amount,
                payment_method: payment,
                notes,
            };
            run_edit(context, &session, &id, edit)?;
        }
        VisitCommands::Delete { id } => {
            let visits = context.store.distributions()?;
            let visible = visible_distributions(&session, &visits);
            let target = resolve_by_id_prefix(&id, &visible, |visit| visit.id.as_str(), "visit")?;
            let removed = context.store.delete_distribution(&target.id)?;
            println!("{}", removed.id);
        }
    }

    context.finish().await;
    Ok(())
}

fn resolve_owner(session: &Session, owner: Option<String>) -> Result<String, CliError> {
    match owner {
        Some(owner) if owner.trim() != session.user_id => {
            Context::require_admin(session, "record visits for another team")?;
            Ok(owner)
        }
        _ => Ok(session.user_id.clone()),
    }
}

fn run_list(
    context: &Context,
    session: &Session,
    zone: Option<&str>,
    status: Option<VisitStatus>,
    limit: usize,
    as_json: bool,
) -> Result<(), CliError> {
    let visits = context.store.distributions()?;
    let zones;
    let mut selected = match zone {
        Some(query) => {
            zones = context.store.zones()?;
            let zone = resolve_zone(session, query, &zones)?;
            distributions_in_zone(session, zone, &visits)
        }
        None => visible_distributions(session, &visits),
    };
    if let Some(status) = status {
        selected.retain(|visit| visit.status == status);
    }
    selected.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    selected.truncate(limit);

    if as_json {
        let now_ms = Utc::now().timestamp_millis();
        let items = selected
            .iter()
            .map(|visit| visit_to_list_item(visit, now_ms))
            .collect::<Vec<VisitListItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if selected.is_empty() {
        println!("No visits.");
    } else {
        for line in format_visit_lines(&selected) {
            println!("{line}");
        }
        print_totals(&selected);
    }
    Ok(())
}

fn print_totals(visits: &[&Distribution]) {
    let collected: f64 = visits
        .iter()
        .filter(|visit| visit.status.takes_payment())
        .map(|visit| visit.amount)
        .sum();
    let done = visits
        .iter()
        .filter(|visit| visit.status == VisitStatus::Done)
        .count();
    println!(
        "{} visits, {done} done, {collected:.2} collected",
        visits.len()
    );
}

fn run_edit(
    context: &Context,
    session: &Session,
    id: &str,
    edit: DistributionEdit,
) -> Result<(), CliError> {
    if edit.is_empty() {
        return Err(CliError::InvalidArgument(
            "Nothing to change; pass at least one field option".to_string(),
        ));
    }
    if edit.payment_method.is_some() && edit.status.is_some_and(|status| !status.takes_payment()) {
        return Err(CliError::InvalidArgument(format!(
            "A payment method only applies to {} visits",
            VisitStatus::Done
        )));
    }

    let visits = context.store.distributions()?;
    let visible = visible_distributions(session, &visits);
    let target = resolve_by_id_prefix(id, &visible, |visit| visit.id.as_str(), "visit")?;
    let updated = context.store.update_distribution(&target.id, edit)?;
    println!("{}", updated.id);
    Ok(())
}
