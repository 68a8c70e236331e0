use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use debrief_core::domain::deal::DealId;
use debrief_core::flows::InterviewPhase;

use crate::api::HttpInterviewApi;
use crate::commands::CommandResult;
use crate::console::{ConsoleCapture, ConsoleVoice};
use crate::controller::InterviewController;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3001";

const HELP: &str = "Type each answer on one line. `/end` stops the interview early, `/quit` leaves.";

pub fn run(deal_id: &str, server_url: &str, streaming: bool) -> CommandResult {
    if deal_id.trim().is_empty() {
        return CommandResult::failure("interview", "invalid_argument", "deal id is required", 2);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "interview",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let api = match HttpInterviewApi::new(server_url, streaming) {
        Ok(api) => api,
        Err(error) => return CommandResult::failure("interview", "client_init", error.to_string(), 3),
    };
    let controller = InterviewController::new(
        Arc::new(api),
        Arc::new(ConsoleCapture::default()),
        Arc::new(ConsoleVoice::new(tokio::io::stdout())),
    );

    let outcome = runtime.block_on(async {
        let input = BufReader::new(tokio::io::stdin());
        drive(&controller, DealId(deal_id.trim().to_string()), input, tokio::io::stdout()).await
    });

    match outcome {
        Ok(Outcome::Reported(report)) => CommandResult::success("interview", report),
        Ok(Outcome::Quit) => CommandResult::failure(
            "interview",
            "aborted",
            "interview left before a report was produced",
            4,
        ),
        Ok(Outcome::StartFailed(message)) => {
            CommandResult::failure("interview", "session_start", message, 5)
        }
        Err(error) => CommandResult::failure("interview", "console_io", format!("{error:#}"), 6),
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Report JSON.
    Reported(String),
    Quit,
    StartFailed(String),
}

/// Runs one interview to completion, reading the rep's turns from `input`.
pub async fn drive<R, W>(
    controller: &InterviewController,
    deal_id: DealId,
    input: R,
    mut out: W,
) -> anyhow::Result<Outcome>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    print_line(&mut out, HELP).await?;
    controller.start(deal_id).await.context("start interview")?;

    loop {
        let state = controller.state();
        if let Some(error) = &state.error {
            print_line(&mut out, &format!("! {error}")).await?;
        }

        match state.phase {
            InterviewPhase::Complete => {
                let report = serde_json::to_string_pretty(&state.report)
                    .context("serialize report")?;
                return Ok(Outcome::Reported(report));
            }
            InterviewPhase::Idle => {
                let message = state.error.unwrap_or_else(|| "session did not start".to_string());
                return Ok(Outcome::StartFailed(message));
            }
            InterviewPhase::Summarizing => {
                // Only reachable here when report generation failed.
                print_line(&mut out, "press enter to retry the report, or /quit").await?;
                let Some(line) = lines.next_line().await.context("read input")? else {
                    return Ok(Outcome::Quit);
                };
                if line.trim() == "/quit" {
                    return Ok(Outcome::Quit);
                }
                controller.request_report().await.context("retry report")?;
            }
            _ => {
                if state.error.is_some() {
                    controller.dismiss_error().await.context("dismiss error")?;
                }
                out.write_all(b"you> ").await.context("write prompt")?;
                out.flush().await.context("flush prompt")?;

                let Some(line) = lines.next_line().await.context("read input")? else {
                    return Ok(Outcome::Quit);
                };
                match line.trim() {
                    "/quit" => return Ok(Outcome::Quit),
                    "/end" => controller.end_interview().await.context("end interview")?,
                    spoken => {
                        controller.finish_speaking(spoken).await.context("send turn")?;
                    }
                }
            }
        }
    }
}

async fn print_line<W: AsyncWrite + Unpin>(out: &mut W, line: &str) -> anyhow::Result<()> {
    out.write_all(format!("{line}\n").as_bytes()).await.context("write output")?;
    out.flush().await.context("flush output")
}
