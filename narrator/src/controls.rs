//! Line-oriented transport commands read while narrating.

use std::str::FromStr;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::Narrator;

/// One transport command. Part indices are zero-based, as printed by
/// `narrator segment`.
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    Stop,
    /// Play from the given part, or from the active one.
    Play(Option<usize>),
    Seek(usize),
    Rate(f32),
    Status,
    Quit,
}

#[derive(Debug, Error, PartialEq)]
pub enum ControlError {
    #[error("empty command")]
    Empty,
    #[error("unknown command `{0}`")]
    Unknown(String),
    #[error("`{command}` expects {expected}")]
    BadArgument {
        command: &'static str,
        expected: &'static str,
    },
}

impl FromStr for Control {
    type Err = ControlError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let command = words.next().ok_or(ControlError::Empty)?;
        let arg = words.next();
        if words.next().is_some() {
            return Err(ControlError::Unknown(line.trim().to_string()));
        }
        let index = |command: &'static str| {
            arg.and_then(|a| a.parse::<usize>().ok())
                .ok_or(ControlError::BadArgument {
                    command,
                    expected: "a part number",
                })
        };
        match (command.to_ascii_lowercase().as_str(), arg) {
            ("stop", None) => Ok(Control::Stop),
            ("play", None) => Ok(Control::Play(None)),
            ("play", Some(_)) => index("play").map(|i| Control::Play(Some(i))),
            ("seek", _) => index("seek").map(Control::Seek),
            ("rate", _) => arg
                .and_then(|a| a.parse::<f32>().ok())
                .filter(|r| r.is_finite() && *r > 0.0)
                .map(Control::Rate)
                .ok_or(ControlError::BadArgument {
                    command: "rate",
                    expected: "a positive number",
                }),
            ("status", None) => Ok(Control::Status),
            ("quit" | "exit", None) => Ok(Control::Quit),
            _ => Err(ControlError::Unknown(line.trim().to_string())),
        }
    }
}

/// Apply `control` and describe the outcome.
pub async fn apply(narrator: &Narrator, control: &Control) -> String {
    let outcome = match control {
        Control::Stop => {
            narrator.cancel();
            Ok(String::from("stopped"))
        }
        Control::Play(index) => {
            let index = index
                .or(narrator.progress().active_index)
                .unwrap_or(0);
            narrator
                .seek(index)
                .await
                .map(|_| format!("playing from {index}"))
        }
        Control::Seek(index) => narrator
            .seek(*index)
            .await
            .map(|_| format!("playing from {index}")),
        Control::Rate(rate) => narrator.set_rate(*rate).map(|_| format!("rate {rate}x")),
        Control::Status => Ok(narrator.progress().to_string()),
        Control::Quit => {
            narrator.cancel();
            Ok(String::from("bye"))
        }
    };
    outcome.unwrap_or_else(|e| format!("error: {e}"))
}

/// Read commands from `input` until `quit` or end of input.
///
/// Returns `true` if the user quit.
pub async fn run_controls<R, W>(narrator: &Narrator, input: R, mut output: W) -> std::io::Result<bool>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = match line.parse::<Control>() {
            Ok(control) => {
                debug!(?control, "transport command");
                let reply = apply(narrator, &control).await;
                if control == Control::Quit {
                    output.write_all(format!("{reply}\n").as_bytes()).await?;
                    output.flush().await?;
                    return Ok(true);
                }
                reply
            }
            Err(e) => format!("error: {e}"),
        };
        output.write_all(format!("{reply}\n").as_bytes()).await?;
        output.flush().await?;
    }
    Ok(false)
}
