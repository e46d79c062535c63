use crate::edge::{ip_in_cidr, EdgePolicy};
use anyhow::{bail, Result};
use std::io::{self, Write};

#[derive(Debug)]
pub struct Args {
    pub ips: Vec<String>,
    pub policy: EdgePolicy,
}

/// One output line per address: `<ip> allow|deny [matching range]`.
#[must_use]
pub fn verdicts(args: &Args) -> Vec<(String, bool)> {
    args.ips
        .iter()
        .map(|ip| {
            match args
                .policy
                .allow_list
                .iter()
                .find(|entry| ip_in_cidr(ip, entry))
            {
                Some(entry) => {
                    let (first, last) = entry.range();
                    (format!("{ip} allow {entry} ({first} - {last})"), true)
                }
                None => (format!("{ip} deny"), false),
            }
        })
        .collect()
}

/// Execute the check-ip action.
/// # Errors
/// Returns an error if any address is denied.
pub fn execute(args: &Args) -> Result<()> {
    let verdicts = verdicts(args);
    let mut stdout = io::stdout().lock();
    for (line, _) in &verdicts {
        writeln!(stdout, "{line}")?;
    }

    let denied = verdicts.iter().filter(|(_, allowed)| !allowed).count();
    if denied > 0 {
        bail!("{denied} of {} addresses denied", verdicts.len());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(ips: &[&str]) -> Args {
        Args {
            ips: ips.iter().map(ToString::to_string).collect(),
            policy: EdgePolicy::default(),
        }
    }

    #[test]
    fn test_verdicts() {
        let verdicts = verdicts(&args(&["210.128.54.70", "210.128.54.96", "1.2.3"]));
        assert_eq!(
            verdicts,
            vec![
                (
                    "210.128.54.70 allow 210.128.54.64/27 (210.128.54.64 - 210.128.54.95)"
                        .to_string(),
                    true
                ),
                ("210.128.54.96 deny".to_string(), false),
                ("1.2.3 deny".to_string(), false),
            ]
        );
    }

    #[test]
    fn test_execute_fails_on_denied() {
        assert!(execute(&args(&["210.128.54.65"])).is_ok());
        let err = execute(&args(&["210.128.54.65", "8.8.8.8"])).unwrap_err();
        assert_eq!(err.to_string(), "1 of 2 addresses denied");
    }
}
