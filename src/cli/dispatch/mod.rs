use crate::cli::{
    actions::{check_ip, flow, gate, status, Action},
    commands::{self, backend, edge},
};
use crate::edge::EdgePolicy;
use anyhow::{bail, Context, Result};
use std::path::PathBuf;

/// Turn parsed arguments into an [`Action`].
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let edge_options = edge::Options::parse(matches);
    let policy = EdgePolicy::new(edge_options.allow_list, edge_options.allowed_countries);

    match matches.subcommand() {
        Some((edge::CMD_GATE, sub_m)) => Ok(Action::Gate(gate::Args {
            port: sub_m.get_one::<u16>(edge::ARG_PORT).copied().unwrap_or(8080),
            static_dir: sub_m
                .get_one::<PathBuf>(edge::ARG_STATIC_DIR)
                .cloned()
                .context("missing required argument: --static-dir")?,
            trust_forwarded_for: sub_m.get_flag(edge::ARG_TRUST_FORWARDED_FOR),
            policy,
        })),
        Some((edge::CMD_CHECK_IP, sub_m)) => Ok(Action::CheckIp(check_ip::Args {
            ips: sub_m
                .get_many::<String>(edge::ARG_IP)
                .map(|ips| ips.cloned().collect())
                .unwrap_or_default(),
            policy,
        })),
        Some((commands::CMD_STATUS, sub_m)) => {
            let mut config = backend::parse(matches)?;
            config.allow_list = policy.allow_list;
            config.allowed_countries = policy.allowed_countries;

            Ok(Action::Status(status::Args {
                config,
                session_id: sub_m
                    .get_one::<String>(commands::ARG_SESSION_ID)
                    .cloned()
                    .context("missing required argument: <session-id>")?,
            }))
        }
        Some((name, sub_m)) => {
            let Some(mode) = commands::flow::mode_from_command(name) else {
                bail!("unknown command: {name}");
            };

            let mut config = backend::parse(matches)?;
            config.allow_list = policy.allow_list;
            config.allowed_countries = policy.allowed_countries;

            Ok(Action::Flow(flow::Args {
                config,
                options: commands::flow::Options::parse(mode, sub_m),
            }))
        }
        None => bail!("no command given, see --help"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::AuthMode;

    fn dispatch(args: &[&str]) -> Result<Action> {
        let matches = commands::new().try_get_matches_from(args)?;
        handler(&matches)
    }

    fn clean<F: FnOnce()>(f: F) {
        temp_env::with_vars(
            [
                ("FACEAUTH_API_ENDPOINT", None::<&str>),
                ("FACEAUTH_API_KEY", None),
                ("FACEAUTH_LIVENESS_ENDPOINT", None),
                ("FACEAUTH_ALLOW_CIDR", None),
                ("FACEAUTH_ALLOW_COUNTRY", None),
                ("FACEAUTH_PORT", None),
                ("FACEAUTH_STATIC_DIR", None),
                ("FACEAUTH_FACE_IMAGE", None),
                ("FACEAUTH_ID_CARD_IMAGE", None),
                ("FACEAUTH_LOG_LEVEL", None),
            ],
            f,
        );
    }

    #[test]
    fn test_gate() {
        clean(|| {
            let action = dispatch(&[
                "faceauth",
                "--allow-country",
                "jp",
                "gate",
                "-p",
                "9000",
            ])
            .unwrap();
            let Action::Gate(args) = action else {
                panic!("expected gate action");
            };
            assert_eq!(args.port, 9000);
            assert_eq!(args.static_dir, PathBuf::from("dist"));
            assert!(!args.trust_forwarded_for);
            assert_eq!(args.policy.allowed_countries, vec!["JP".to_string()]);
        });
    }

    #[test]
    fn test_check_ip() {
        clean(|| {
            let action = dispatch(&["faceauth", "check-ip", "1.1.1.1", "2.2.2.2"]).unwrap();
            let Action::CheckIp(args) = action else {
                panic!("expected check-ip action");
            };
            assert_eq!(args.ips, vec!["1.1.1.1", "2.2.2.2"]);
        });
    }

    #[test]
    fn test_status_requires_endpoint() {
        clean(|| {
            assert!(dispatch(&["faceauth", "status", "abc"]).is_err());

            let action = dispatch(&[
                "faceauth",
                "--api-endpoint",
                "https://api.example.com",
                "status",
                "abc",
            ])
            .unwrap();
            let Action::Status(args) = action else {
                panic!("expected status action");
            };
            assert_eq!(args.session_id, "abc");
            assert_eq!(args.config.api_base_url, "https://api.example.com");
        });
    }

    #[test]
    fn test_flow() {
        clean(|| {
            let action = dispatch(&[
                "faceauth",
                "--api-endpoint",
                "https://api.example.com",
                "enroll",
                "--face",
                "face.jpg",
                "--id-card",
                "card.jpg",
            ])
            .unwrap();
            let Action::Flow(args) = action else {
                panic!("expected flow action");
            };
            assert_eq!(args.options.mode, AuthMode::Enroll);
            assert_eq!(args.options.face, Some(PathBuf::from("face.jpg")));
            assert!(args.options.include_liveness);
        });
    }

    #[test]
    fn test_invalid_cidr_is_a_startup_error() {
        clean(|| {
            assert!(dispatch(&[
                "faceauth",
                "--allow-cidr",
                "10.0.0/8",
                "check-ip",
                "1.1.1.1",
            ])
            .is_err());
        });
    }
}
