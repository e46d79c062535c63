use crate::cli::globals::{Config, DEFAULT_REGION};
use anyhow::{bail, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_API_ENDPOINT: &str = "api-endpoint";
pub const ARG_API_KEY: &str = "api-key";
pub const ARG_LIVENESS_ENDPOINT: &str = "liveness-endpoint";
pub const ARG_REGION: &str = "region";
pub const ARG_USER_POOL_ID: &str = "user-pool-id";
pub const ARG_USER_POOL_CLIENT_ID: &str = "user-pool-client-id";
pub const ARG_IDENTITY_POOL_ID: &str = "identity-pool-id";
pub const ARG_ALLOW_GUEST_ACCESS: &str = "allow-guest-access";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_API_ENDPOINT)
                .long(ARG_API_ENDPOINT)
                .help("Base URL of the face authentication API, example: https://api.example.com/prod")
                .env("FACEAUTH_API_ENDPOINT")
                .global(true),
        )
        .arg(
            Arg::new(ARG_API_KEY)
                .long(ARG_API_KEY)
                .help("API key sent as x-api-key")
                .env("FACEAUTH_API_KEY")
                .hide_env_values(true)
                .global(true),
        )
        .arg(
            Arg::new(ARG_LIVENESS_ENDPOINT)
                .long(ARG_LIVENESS_ENDPOINT)
                .help("Base URL of the liveness session API (defaults to --api-endpoint)")
                .env("FACEAUTH_LIVENESS_ENDPOINT")
                .global(true),
        )
        .arg(
            Arg::new(ARG_REGION)
                .long(ARG_REGION)
                .help("Cloud region of the identity pools")
                .env("FACEAUTH_REGION")
                .default_value(DEFAULT_REGION)
                .global(true),
        )
        .arg(
            Arg::new(ARG_USER_POOL_ID)
                .long(ARG_USER_POOL_ID)
                .help("User pool id")
                .env("FACEAUTH_USER_POOL_ID")
                .global(true),
        )
        .arg(
            Arg::new(ARG_USER_POOL_CLIENT_ID)
                .long(ARG_USER_POOL_CLIENT_ID)
                .help("User pool client id")
                .env("FACEAUTH_USER_POOL_CLIENT_ID")
                .global(true),
        )
        .arg(
            Arg::new(ARG_IDENTITY_POOL_ID)
                .long(ARG_IDENTITY_POOL_ID)
                .help("Identity pool id")
                .env("FACEAUTH_IDENTITY_POOL_ID")
                .global(true),
        )
        .arg(
            Arg::new(ARG_ALLOW_GUEST_ACCESS)
                .long(ARG_ALLOW_GUEST_ACCESS)
                .help("Allow unauthenticated identities")
                .env("FACEAUTH_ALLOW_GUEST_ACCESS")
                .action(ArgAction::SetTrue)
                .global(true),
        )
}

/// Backend settings for actions that call the API.
///
/// # Errors
/// Returns an error if the API endpoint is missing or not an http(s) URL.
pub fn parse(matches: &ArgMatches) -> Result<Config> {
    let get_non_empty = |name: &str| -> Option<String> {
        matches
            .get_one::<String>(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    let Some(api_endpoint) = get_non_empty(ARG_API_ENDPOINT) else {
        bail!("missing required argument: --{ARG_API_ENDPOINT}");
    };
    check_url(ARG_API_ENDPOINT, &api_endpoint)?;

    let liveness_endpoint = get_non_empty(ARG_LIVENESS_ENDPOINT);
    if let Some(url) = &liveness_endpoint {
        check_url(ARG_LIVENESS_ENDPOINT, url)?;
    }

    let mut config = Config::new(api_endpoint);
    config.api_key = get_non_empty(ARG_API_KEY).map(SecretString::from);
    config.liveness_base_url = liveness_endpoint;
    if let Some(region) = get_non_empty(ARG_REGION) {
        config.region = region;
    }
    config.user_pool_id = get_non_empty(ARG_USER_POOL_ID);
    config.user_pool_client_id = get_non_empty(ARG_USER_POOL_CLIENT_ID);
    config.identity_pool_id = get_non_empty(ARG_IDENTITY_POOL_ID);
    config.allow_guest_access = matches.get_flag(ARG_ALLOW_GUEST_ACCESS);

    Ok(config)
}

fn check_url(name: &str, value: &str) -> Result<()> {
    match url::Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        Ok(url) => bail!("--{name} must be an http(s) URL, got scheme '{}'", url.scheme()),
        Err(e) => bail!("invalid --{name} '{value}': {e}"),
    }
}
