use binome_core::auth::Credentials;

use crate::commands::common::{format_timestamp, Context};
use crate::error::CliError;

pub fn run_login(
    context: &Context,
    user: String,
    name: Option<String>,
    zone: Option<String>,
    admin: bool,
) -> Result<(), CliError> {
    let session = context.sessions.login(Credentials {
        user_id: user,
        display_name: name,
        assigned_zone: zone,
        is_admin: admin,
    })?;

    let role = if session.is_admin { "admin" } else { "team" };
    println!(
        "Signed in as {} ({role}), expires {}",
        session.display_name,
        format_timestamp(session.expires_at)
    );
    Ok(())
}

pub fn run_logout(context: &Context) -> Result<(), CliError> {
    context.sessions.logout()?;
    println!("Signed out");
    Ok(())
}

pub fn run_whoami(context: &Context, as_json: bool) -> Result<(), CliError> {
    let Some(session) = context.sessions.restore()? else {
        if as_json {
            println!("null");
        } else {
            println!("Not signed in.");
        }
        return Ok(());
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&session)?);
        return Ok(());
    }

    println!("User:    {} ({})", session.display_name, session.user_id);
    println!(
        "Zone:    {}",
        session.assigned_zone.as_deref().unwrap_or("(none)")
    );
    println!("Admin:   {}", if session.is_admin { "yes" } else { "no" });
    println!("Expires: {}", format_timestamp(session.expires_at));
    Ok(())
}
