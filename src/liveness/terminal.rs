use super::{LivenessSession, LivenessWidget, WidgetError};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Widget for the command-line host.
///
/// The check itself happens on another device bound to the printed session
/// id; the operator confirms completion with Enter, or aborts with `q`.
#[derive(Debug)]
pub struct TerminalWidget<R = BufReader<Stdin>, W = Stdout> {
    input: Mutex<R>,
    output: Mutex<W>,
}

impl TerminalWidget {
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> TerminalWidget<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(input: R, output: W) -> Self {
        Self {
            input: Mutex::new(input),
            output: Mutex::new(output),
        }
    }

    /// Write `prompt` and read one line; `None` once input is closed.
    ///
    /// # Errors
    /// Returns an error if the terminal cannot be written or read
    pub async fn ask(&self, prompt: &str) -> std::io::Result<Option<String>> {
        let mut output = self.output.lock().await;
        output.write_all(prompt.as_bytes()).await?;
        output.flush().await?;
        drop(output);

        let mut line = String::new();
        let read = self.input.lock().await.read_line(&mut line).await?;
        if read == 0 {
            return Ok(None);
        }

        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    async fn prompt(&self, session: &LivenessSession) -> Result<(), WidgetError> {
        let text = format!(
            "Liveness session {} (expires {})\nComplete the check, then press Enter (q to abort): ",
            session.session_id, session.expires_at
        );

        let answer = self
            .ask(&text)
            .await
            .map_err(|e| WidgetError::message(e.to_string()))?;

        match answer.as_deref().map(str::trim) {
            None => Err(WidgetError::state("INPUT_CLOSED")),
            Some("q" | "Q") => Err(WidgetError::state("USER_CANCELLED")),
            Some(_) => Ok(()),
        }
    }
}

impl<R, W> LivenessWidget for TerminalWidget<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn run(
        &self,
        session: &LivenessSession,
        cancel: &CancellationToken,
    ) -> Result<(), WidgetError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(WidgetError::state("CANCELLED")),
            done = self.prompt(session) => done,
        }
    }
}
