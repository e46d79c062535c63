use crate::{
    flow::{FlowKind, FlowOptions},
    shell::AuthMode,
};
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;
use std::path::PathBuf;

pub const ARG_FACE: &str = "face";
pub const ARG_ID_CARD: &str = "id-card";
pub const ARG_PASSWORD: &str = "password";
pub const ARG_DEBUG: &str = "debug";
pub const ARG_QUERY: &str = "query";
pub const ARG_NO_LIVENESS: &str = "no-liveness";
pub const ARG_NO_COUNTDOWN: &str = "no-countdown";

pub const CMD_LOGIN: &str = "login";
pub const CMD_ENROLL: &str = "enroll";
pub const CMD_EMERGENCY: &str = "emergency";
pub const CMD_RE_ENROLL: &str = "re-enroll";

/// Subcommand name for each shell mode.
#[must_use]
pub const fn command_name(mode: AuthMode) -> &'static str {
    match mode {
        AuthMode::Login => CMD_LOGIN,
        AuthMode::Enroll => CMD_ENROLL,
        AuthMode::Emergency => CMD_EMERGENCY,
        AuthMode::ReEnroll => CMD_RE_ENROLL,
    }
}

#[must_use]
pub fn mode_from_command(name: &str) -> Option<AuthMode> {
    [
        AuthMode::Login,
        AuthMode::Enroll,
        AuthMode::Emergency,
        AuthMode::ReEnroll,
    ]
    .into_iter()
    .find(|mode| command_name(*mode) == name)
}

/// One subcommand per flow; only the image arguments the flow uses are offered.
#[must_use]
pub fn subcommands() -> Vec<Command> {
    vec![
        flow_command(AuthMode::Login, "Authenticate with liveness and a face image"),
        flow_command(AuthMode::Enroll, "Register a face against an ID card"),
        flow_command(
            AuthMode::Emergency,
            "Authenticate with an ID card and password when face login fails",
        ),
        flow_command(
            AuthMode::ReEnroll,
            "Replace the registered face of an enrolled employee",
        ),
    ]
}

fn flow_command(mode: AuthMode, about: &'static str) -> Command {
    let kind = mode.flow_kind();
    let steps = kind.steps(true);
    let mut command = Command::new(command_name(mode))
        .about(about)
        .arg(
            Arg::new(ARG_DEBUG)
                .long(ARG_DEBUG)
                .help("Print captured artifacts and raw responses as JSON")
                .env("FACEAUTH_DEBUG")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_QUERY)
                .long(ARG_QUERY)
                .help("Page query string, debug=true turns on --debug")
                .env("FACEAUTH_QUERY")
                .value_name("QUERY"),
        )
        .arg(
            Arg::new(ARG_NO_COUNTDOWN)
                .long(ARG_NO_COUNTDOWN)
                .help("Capture immediately instead of counting down")
                .action(ArgAction::SetTrue),
        );

    if kind.liveness_subject().is_some() {
        command = command.arg(
            Arg::new(ARG_NO_LIVENESS)
                .long(ARG_NO_LIVENESS)
                .help("Skip the liveness step")
                .action(ArgAction::SetTrue),
        );
    }

    if steps.contains(&crate::flow::Step::IdCardCapture) {
        command = command.arg(
            Arg::new(ARG_ID_CARD)
                .long(ARG_ID_CARD)
                .help("ID card image (JPEG or PNG)")
                .env("FACEAUTH_ID_CARD_IMAGE")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf)),
        );
    }

    if steps.contains(&crate::flow::Step::FaceCapture) {
        command = command.arg(
            Arg::new(ARG_FACE)
                .long(ARG_FACE)
                .help("Face image (JPEG or PNG)")
                .env("FACEAUTH_FACE_IMAGE")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf)),
        );
    }

    if kind == FlowKind::Emergency {
        command = command.arg(
            Arg::new(ARG_PASSWORD)
                .long(ARG_PASSWORD)
                .help("Emergency password, prompted for when omitted")
                .env("FACEAUTH_EMERGENCY_PASSWORD")
                .hide_env_values(true),
        );
    }

    command
}

#[derive(Debug)]
pub struct Options {
    pub mode: AuthMode,
    pub face: Option<PathBuf>,
    pub id_card: Option<PathBuf>,
    pub password: Option<SecretString>,
    pub debug: bool,
    pub include_liveness: bool,
    pub countdown: bool,
}

impl Options {
    /// `matches` are the flow subcommand's own matches.
    #[must_use]
    pub fn parse(mode: AuthMode, matches: &ArgMatches) -> Self {
        let flag = |name: &str| {
            matches
                .try_get_one::<bool>(name)
                .ok()
                .flatten()
                .copied()
                .unwrap_or(false)
        };
        let path = |name: &str| matches.try_get_one::<PathBuf>(name).ok().flatten().cloned();

        Self {
            mode,
            face: path(ARG_FACE),
            id_card: path(ARG_ID_CARD),
            password: matches
                .try_get_one::<String>(ARG_PASSWORD)
                .ok()
                .flatten()
                .map(|password| SecretString::from(password.clone())),
            debug: flag(ARG_DEBUG)
                || matches
                    .try_get_one::<String>(ARG_QUERY)
                    .ok()
                    .flatten()
                    .is_some_and(|query| FlowOptions::from_query(query).debug),
            include_liveness: mode.flow_kind().liveness_subject().is_some()
                && !flag(ARG_NO_LIVENESS),
            countdown: !flag(ARG_NO_COUNTDOWN),
        }
    }
}
