use crate::{
    api::ApiClient,
    camera::{file::FileCamera, CaptureTrigger},
    cli::{commands::flow::Options, globals::Config},
    flow::{
        DebugEntry, FlowController, FlowError, FlowOptions, FlowOutcome, FlowRunner,
        PasswordPrompt, TriggerFactory,
    },
    liveness::{client::LivenessClient, terminal::TerminalWidget},
    shell::{AppShell, AuthMode},
};
use anyhow::{anyhow, bail, Result};
use secrecy::SecretString;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug)]
pub struct Args {
    pub config: Config,
    pub options: Options,
}

/// Emergency password from the command line, or typed on the console.
struct ConsolePassword<'a> {
    console: &'a TerminalWidget,
    preset: Option<SecretString>,
}

impl PasswordPrompt for ConsolePassword<'_> {
    async fn password(&self, cancel: &CancellationToken) -> Option<SecretString> {
        if let Some(password) = &self.preset {
            return Some(password.clone());
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            answer = self.console.ask("Emergency password: ") => {
                answer.ok().flatten().map(SecretString::from)
            }
        }
    }
}

/// What the operator wants after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
enum NextStep {
    Retry,
    Back,
    Emergency(PathBuf),
    Login,
    Quit,
}

/// Choices offered after a failure besides retry and quit.
#[derive(Debug, Clone, Copy, Default)]
struct Offers {
    back: bool,
    emergency: bool,
    login: bool,
}

impl Offers {
    fn prompt(self) -> String {
        let mut choices = vec!["[r]etry"];
        if self.back {
            choices.push("[b]ack");
        }
        if self.emergency {
            choices.push("[e]mergency authentication");
        }
        if self.login {
            choices.push("[l]ogin");
        }
        format!("{} or [q]uit? ", choices.join(", "))
    }
}

fn trigger(countdown: bool) -> TriggerFactory {
    if countdown {
        Box::new(|purpose| {
            let (mut ticks, trigger) = CaptureTrigger::countdown_observed();
            tokio::spawn(async move {
                while let Some(n) = ticks.recv().await {
                    eprintln!("{purpose}: {n}");
                }
            });
            trigger
        })
    } else {
        Box::new(|_| {
            let (fire, trigger) = CaptureTrigger::manual();
            let _ = fire.send(());
            trigger
        })
    }
}

/// Debug entries added since the last call; `printed` moves past them.
fn new_debug_entries<'a>(flow: &'a FlowController, printed: &mut usize) -> &'a [DebugEntry] {
    let entries = flow
        .debug_panel()
        .map_or(&[][..], |panel| panel.entries.as_slice());
    let fresh = entries.get(*printed..).unwrap_or(entries);
    *printed = entries.len();
    fresh
}

fn print_debug_entries(flow: &FlowController, printed: &mut usize) -> Result<()> {
    let fresh = new_debug_entries(flow, printed);
    if !fresh.is_empty() {
        eprintln!("{}", serde_json::to_string_pretty(fresh)?);
    }
    Ok(())
}

async fn ask_path<R, W>(
    console: &TerminalWidget<R, W>,
    prompt: &str,
    what: &str,
) -> Result<PathBuf>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    console
        .ask(prompt)
        .await?
        .map(|path| path.trim().to_string())
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("{what} is required"))
}

async fn next_step<R, W>(console: &TerminalWidget<R, W>, offers: Offers) -> Result<NextStep>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let Some(answer) = console.ask(&offers.prompt()).await? else {
        return Ok(NextStep::Quit);
    };

    match answer.trim() {
        "r" | "R" => Ok(NextStep::Retry),
        "b" | "B" if offers.back => Ok(NextStep::Back),
        "e" | "E" if offers.emergency => {
            let path = ask_path(console, "ID card image: ", "an ID card image").await?;
            Ok(NextStep::Emergency(path))
        }
        "l" | "L" if offers.login => Ok(NextStep::Login),
        _ => Ok(NextStep::Quit),
    }
}

/// Execute a flow action. Every retry is asked for; nothing is retried on its own.
/// # Errors
/// Returns an error if a client cannot be built, the flow is cancelled or the
/// operator gives up after a failure.
pub async fn execute(args: Args) -> Result<()> {
    let Args { config, options } = args;
    debug!(
        region = %config.region,
        user_pool_id = config.user_pool_id.as_deref().unwrap_or(""),
        identity_pool_id = config.identity_pool_id.as_deref().unwrap_or(""),
        allow_guest_access = config.allow_guest_access,
        "backend configuration"
    );

    let api = ApiClient::new(&config)?;
    let liveness = LivenessClient::new(&config)?;
    let console = TerminalWidget::stdio();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let mut shell = AppShell::new(FlowOptions {
        include_liveness: options.include_liveness,
        debug: options.debug,
    });
    shell.select_mode(options.mode);

    let mut id_card = options.id_card;
    let mut face = options.face;
    let mut flow = shell.controller();
    let mut printed = 0;

    loop {
        let runner = FlowRunner::new(
            FileCamera::new(face.clone(), id_card.clone()),
            liveness.clone(),
            &console,
            ConsolePassword {
                console: &console,
                preset: options.password.clone(),
            },
            api.clone(),
        )
        .with_trigger(trigger(options.countdown));

        let outcome = runner.run(&mut flow, &mut shell, &cancel).await;
        print_debug_entries(&flow, &mut printed)?;

        match outcome {
            Ok(FlowOutcome::Completed) => {
                let response = shell
                    .authenticated()
                    .ok_or_else(|| anyhow!("flow completed without a response"))?;
                println!("{}", serde_json::to_string_pretty(response)?);
                info!(mode = %shell.mode(), "authentication complete");
                return Ok(());
            }
            Ok(FlowOutcome::Failed { step, message }) => {
                eprintln!("{}", flow.error().unwrap_or(&message));
                debug!(%step, attempts = flow.failed_attempts(), "attempt failed");

                let offers = Offers {
                    back: flow.back_target().is_some(),
                    emergency: flow.emergency_offer_visible(),
                    login: shell.mode() == AuthMode::Emergency,
                };
                match next_step(&console, offers).await? {
                    NextStep::Retry => {}
                    NextStep::Back => {
                        let step = flow.back()?;
                        debug!(%step, "stepped back");
                    }
                    NextStep::Emergency(path) => {
                        id_card = Some(path);
                        shell.request_emergency();
                        flow = shell.controller();
                        printed = 0;
                    }
                    NextStep::Login => {
                        if face.is_none() {
                            face = Some(ask_path(&console, "Face image: ", "a face image").await?);
                        }
                        shell.back_to_login();
                        flow = shell.controller();
                        printed = 0;
                    }
                    NextStep::Quit => bail!("{message}"),
                }
            }
            Err(FlowError::Cancelled) => bail!("{} cancelled", shell.mode()),
            Err(err) => return Err(err.into()),
        }
    }
}
