use binome_core::util::is_http_url;

use crate::cli::ConfigCommands;
use crate::commands::common::load_settings;
use crate::config_profiles::{normalize_text_option, CliProfilesConfig};
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            api_url,
            api_token,
            proxied,
            distributions_table,
            zones_table,
            no_activate,
        } => {
            let update = ProfileUpdate {
                api_url: normalize_text_option(api_url),
                api_token: normalize_text_option(api_token),
                proxied,
                distributions_table: normalize_text_option(distributions_table),
                zones_table: normalize_text_option(zones_table),
            };
            run_config_init(profile.as_deref().or(global_profile), update, no_activate)
        }
        ConfigCommands::Show => run_config_show(global_profile),
    }
}

/// Values passed to `config init`; `None` keeps what the profile holds.
#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub api_url: Option<String>,
    pub api_token: Option<String>,
    pub proxied: bool,
    pub distributions_table: Option<String>,
    pub zones_table: Option<String>,
}

pub fn apply_profile_update(
    config: &mut CliProfilesConfig,
    profile_name: &str,
    update: ProfileUpdate,
    activate: bool,
) -> Result<(), CliError> {
    if let Some(url) = update.api_url.as_deref() {
        if !is_http_url(url) {
            return Err(CliError::InvalidArgument(format!(
                "API URL must start with http:// or https://, got '{url}'"
            )));
        }
    }

    let profile = config.profile_mut_or_default(profile_name);
    if update.api_url.is_some() {
        profile.table_api_url = update.api_url;
    }
    if update.api_token.is_some() {
        profile.table_api_token = update.api_token;
        profile.table_proxied = None;
    }
    if update.proxied {
        profile.table_proxied = Some(true);
    }
    if update.distributions_table.is_some() {
        profile.distributions_table = update.distributions_table;
    }
    if update.zones_table.is_some() {
        profile.zones_table = update.zones_table;
    }

    if activate {
        config.active_profile = Some(profile_name.to_string());
    }
    Ok(())
}

fn run_config_init(
    profile_name: Option<&str>,
    update: ProfileUpdate,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Profile)?;
    let profile_name = config.resolve_profile_name(profile_name);
    apply_profile_update(&mut config, &profile_name, update, !no_activate)?;
    let path = config.save().map_err(CliError::Profile)?;

    println!("Saved profile '{profile_name}' to {}", path.display());
    if !no_activate {
        println!("Active profile: {profile_name}");
    }
    Ok(())
}

fn run_config_show(global_profile: Option<&str>) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Profile)?;
    let profile_name = config.resolve_profile_name(global_profile);
    let settings = load_settings(Some(&profile_name))?;

    println!("Profile: {profile_name}");
    println!("{settings:#?}");
    Ok(())
}
