use binome_core::access::{visible_zones, zones_for_point};
use binome_core::{Shape, Zone};

use crate::cli::{ZoneCommands, ZoneOptions};
use crate::commands::common::{format_zone_line, resolve_zone, Context};
use crate::error::CliError;

pub async fn run_zone(
    context: &mut Context,
    command: ZoneCommands,
    sync_after: bool,
) -> Result<(), CliError> {
    let session = context.session()?;
    let mutates = matches!(
        command,
        ZoneCommands::AddCircle { .. }
            | ZoneCommands::AddPolygon { .. }
            | ZoneCommands::AddRectangle { .. }
            | ZoneCommands::Delete { .. }
    );
    if mutates {
        Context::require_admin(&session, "change zones")?;
        if sync_after {
            context.enable_auto_sync(&session)?;
        }
    }

    match command {
        ZoneCommands::AddCircle {
            name,
            center,
            radius,
            options,
        } => add_zone(
            context,
            name,
            Shape::Circle {
                center,
                radius_meters: radius,
            },
            options,
        )?,
        ZoneCommands::AddPolygon {
            name,
            vertices,
            options,
        } => add_zone(context, name, Shape::Polygon { vertices }, options)?,
        ZoneCommands::AddRectangle {
            name,
            south_west,
            north_east,
            options,
        } => add_zone(
            context,
            name,
            Shape::Rectangle {
                south_west,
                north_east,
            },
            options,
        )?,
        ZoneCommands::List { json } => {
            let zones = context.store.zones()?;
            let visible = visible_zones(&session, &zones);
            if json {
                println!("{}", serde_json::to_string_pretty(&visible)?);
            } else if visible.is_empty() {
                println!("No zones.");
            } else {
                for zone in visible {
                    println!("{}", format_zone_line(zone));
                }
            }
        }
        ZoneCommands::Delete { zone } => {
            let zones = context.store.zones()?;
            let target = resolve_zone(&session, &zone, &zones)?;
            let removed = context.store.delete_zone(&target.id)?;
            println!("{}", removed.id);
        }
        ZoneCommands::Locate { point } => {
            let zones = context.store.zones()?;
            let containing = zones_for_point(&session, point, &zones);
            if containing.is_empty() {
                println!("No visible zone contains {}, {}", point.lat, point.lng);
            } else {
                for zone in containing {
                    println!("{}", format_zone_line(zone));
                }
            }
        }
    }

    context.finish().await;
    Ok(())
}

fn add_zone(
    context: &Context,
    name: String,
    shape: Shape,
    options: ZoneOptions,
) -> Result<(), CliError> {
    let mut zone = Zone::new(name, shape);
    if let Some(color) = options.color {
        zone.color = color;
    }
    zone.owner_team_id = options.team;
    let created = context.store.create_zone(zone)?;
    println!("{}", created.id);
    Ok(())
}
