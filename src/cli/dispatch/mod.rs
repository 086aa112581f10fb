use crate::{cli::actions::Action, server::ServeOptions, tls::MinVersion};
use anyhow::{Context, Result, anyhow, bail};
use clap::ArgMatches;
use std::{net::IpAddr, path::PathBuf, time::Duration};

fn path(matches: &ArgMatches, id: &str) -> Result<PathBuf> {
    matches
        .get_one::<String>(id)
        .map(PathBuf::from)
        .with_context(|| format!("--{id} is required"))
}

fn common_name(matches: &ArgMatches) -> Result<String> {
    let name = matches
        .get_one::<String>("common-name")
        .context("--common-name is required")?
        .trim();

    if name.is_empty() {
        bail!("--common-name must not be empty");
    }

    Ok(name.to_string())
}

fn dispatch_serve(matches: &ArgMatches) -> Result<Action> {
    // Extract and validate listen address
    let listen = matches
        .get_one::<String>("listen")
        .map(|addr| {
            addr.parse::<IpAddr>()
                .with_context(|| format!("Invalid IP address: {addr}"))
        })
        .transpose()?;

    let min_version = matches
        .get_one::<String>("tls-policy")
        .map_or(Ok(MinVersion::default()), |policy| policy.parse::<MinVersion>())
        .map_err(|e| anyhow!(e))?;

    let sniff_timeout_ms = matches
        .get_one::<u64>("sniff-timeout-ms")
        .copied()
        .unwrap_or(1000);

    Ok(Action::Serve(ServeOptions {
        listen,
        port: matches.get_one::<u16>("port").copied().unwrap_or(9443),
        cert: path(matches, "cert")?,
        key: path(matches, "key")?,
        common_name: common_name(matches)?,
        lifetime_days: matches.get_one::<u32>("lifetime-days").copied().unwrap_or(365),
        renew_within_days: matches
            .get_one::<u32>("renew-within-days")
            .copied()
            .unwrap_or(30),
        min_version,
        sniff_timeout: Duration::from_millis(sniff_timeout_ms),
    }))
}

fn dispatch_generate(matches: &ArgMatches) -> Result<Action> {
    Ok(Action::Generate {
        cert: path(matches, "cert")?,
        key: path(matches, "key")?,
        common_name: common_name(matches)?,
        lifetime_days: matches.get_one::<u32>("lifetime-days").copied().unwrap_or(365),
    })
}

/// Convert `ArgMatches` into typed Action enum with validation
///
/// # Errors
///
/// Returns an error if a required parameter is missing or invalid
pub fn dispatch(matches: &ArgMatches) -> Result<Action> {
    match matches.subcommand() {
        Some(("serve", sub)) => dispatch_serve(sub),
        Some(("generate", sub)) => dispatch_generate(sub),
        Some((other, _)) => bail!("Unknown command: {other}"),
        None => bail!("No command given"),
    }
}
