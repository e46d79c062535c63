use crate::edge::AllowEntry;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;

pub const ARG_ALLOW_CIDR: &str = "allow-cidr";
pub const ARG_ALLOW_COUNTRY: &str = "allow-country";
pub const ARG_PORT: &str = "port";
pub const ARG_STATIC_DIR: &str = "static-dir";
pub const ARG_TRUST_FORWARDED_FOR: &str = "trust-forwarded-for";
pub const ARG_IP: &str = "ip";

pub const CMD_GATE: &str = "gate";
pub const CMD_CHECK_IP: &str = "check-ip";

/// Allow-list arguments, shared by every subcommand that evaluates requests.
#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ALLOW_CIDR)
                .long(ARG_ALLOW_CIDR)
                .help("IPv4 range allowed through the gate, repeat or comma separate")
                .env("FACEAUTH_ALLOW_CIDR")
                .value_delimiter(',')
                .action(ArgAction::Append)
                .default_value("210.128.54.64/27")
                .value_parser(clap::value_parser!(AllowEntry))
                .global(true),
        )
        .arg(
            Arg::new(ARG_ALLOW_COUNTRY)
                .long(ARG_ALLOW_COUNTRY)
                .help("ISO country code allowed regardless of address, repeat or comma separate")
                .env("FACEAUTH_ALLOW_COUNTRY")
                .value_delimiter(',')
                .action(ArgAction::Append)
                .global(true),
        )
}

#[must_use]
pub fn gate() -> Command {
    Command::new(CMD_GATE)
        .about("Serve the web client behind the allow-list")
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("FACEAUTH_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_STATIC_DIR)
                .long(ARG_STATIC_DIR)
                .help("Directory with the built web client")
                .default_value("dist")
                .env("FACEAUTH_STATIC_DIR")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new(ARG_TRUST_FORWARDED_FOR)
                .long(ARG_TRUST_FORWARDED_FOR)
                .help("Take the client address from X-Forwarded-For (only behind a trusted proxy)")
                .env("FACEAUTH_TRUST_FORWARDED_FOR")
                .action(ArgAction::SetTrue),
        )
}

#[must_use]
pub fn check_ip() -> Command {
    Command::new(CMD_CHECK_IP)
        .about("Evaluate addresses against the allow-list")
        .arg(
            Arg::new(ARG_IP)
                .help("IPv4 address to check")
                .required(true)
                .num_args(1..),
        )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub allow_list: Vec<AllowEntry>,
    pub allowed_countries: Vec<String>,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let allow_list = matches
            .get_many::<AllowEntry>(ARG_ALLOW_CIDR)
            .map(|entries| entries.copied().collect())
            .unwrap_or_default();
        let allowed_countries = matches
            .get_many::<String>(ARG_ALLOW_COUNTRY)
            .map(|countries| countries.cloned().collect())
            .unwrap_or_default();

        Self {
            allow_list,
            allowed_countries,
        }
    }
}
