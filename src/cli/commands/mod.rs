pub mod backend;
pub mod edge;
pub mod flow;
pub mod logging;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const CMD_STATUS: &str = "status";
pub const ARG_SESSION_ID: &str = "session-id";

#[must_use]
pub fn status() -> Command {
    Command::new(CMD_STATUS)
        .about("Query the state of an authentication session")
        .arg(
            Arg::new(ARG_SESSION_ID)
                .help("Session id returned by a previous authentication")
                .required(true),
        )
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("faceauth")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(edge::gate())
        .subcommand(edge::check_ip())
        .subcommand(status())
        .subcommands(flow::subcommands());

    let command = backend::with_args(command);
    let command = edge::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "faceauth");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some(env!("CARGO_PKG_DESCRIPTION").to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_subcommands() {
        let root = new();
        let names: Vec<&str> = root.get_subcommands().map(Command::get_name).collect();
        assert_eq!(
            names,
            vec![
                "gate",
                "check-ip",
                "status",
                "login",
                "enroll",
                "emergency",
                "re-enroll"
            ]
        );
    }

    #[test]
    fn test_subcommand_required() {
        assert!(new().try_get_matches_from(vec!["faceauth"]).is_err());
    }

    #[test]
    fn test_global_args_after_subcommand() {
        temp_env::with_vars(
            [
                ("FACEAUTH_API_ENDPOINT", None::<&str>),
                ("FACEAUTH_LOG_LEVEL", None),
            ],
            || {
                let matches = new().get_matches_from(vec![
                    "faceauth",
                    "status",
                    "01J9ZQ",
                    "--api-endpoint",
                    "https://api.example.com",
                    "-vv",
                ]);
                assert_eq!(
                    matches.get_one::<String>(backend::ARG_API_ENDPOINT).cloned(),
                    Some("https://api.example.com".to_string())
                );
                assert_eq!(matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(), Some(2));

                let status = matches.subcommand_matches(CMD_STATUS).unwrap();
                assert_eq!(
                    status.get_one::<String>(ARG_SESSION_ID).cloned(),
                    Some("01J9ZQ".to_string())
                );
            },
        );
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("FACEAUTH_API_ENDPOINT", Some("https://api.example.com")),
                ("FACEAUTH_LOG_LEVEL", Some("info")),
            ],
            || {
                let matches = new().get_matches_from(vec!["faceauth", "check-ip", "10.0.0.1"]);
                assert_eq!(
                    matches.get_one::<String>(backend::ARG_API_ENDPOINT).cloned(),
                    Some("https://api.example.com".to_string())
                );
                assert_eq!(matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(), Some(2));
            },
        );
    }
}
