//! # Console Commands
//!
//! The clock can be steered while it runs by typing commands on stdin:
//!
//! | Command                           | Effect                                   |
//! |-----------------------------------|------------------------------------------|
//! | `display <text>`                  | show `<text>` on the text info panel     |
//! | `align <TOP\|BOTTOM> <LEFT\|RIGHT>` | move the clock to another corner       |
//! | `background [file.bmp]`           | fixed background, or slideshow if empty  |
//! | `set-panel <kind>`                | choose the visible info panel            |
//! | `panels` / `banners`              | describe the configured panels           |
//! | `help`                            | list the commands                        |
//! | `exit` / `quit`                   | clear the display and stop               |
//!
//! The console never touches the frame itself. Each parsed [`Command`] is sent
//! to the render loop together with a reply channel, and the loop applies it
//! between two ticks.

use crate::assets::AssetError;
use crate::config::InfoKind;
use crate::{Alignment, ParseAlignmentError};
use std::io;
use std::str::FromStr;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

pub const HELP: &str = "\
Commands:
  display <text>                 show text on the text panel
  align <TOP|BOTTOM> <LEFT|RIGHT> move the clock
  background [file.bmp]          set a fixed background, or the slideshow without a file
  set-panel <text|date|weather|activity>
                                 choose the info panel next to the clock
  panels                         describe the info panels
  banners                        describe the banner panels
  help                           show this help
  exit                           clear the display and quit";

/// A request to change or query the running clock.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    SetText(String),
    Align(Alignment),
    /// `None` switches to the slideshow
    Background(Option<String>),
    SetPanel(InfoKind),
    Panels,
    Banners,
    Help,
    Shutdown,
}

/// Rejected command. Reported back to the console, never fatal.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown command '{0}', type 'help' for the list of commands")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error(transparent)]
    Alignment(#[from] ParseAlignmentError),

    #[error("unknown panel '{0}'")]
    UnknownPanel(String),

    #[error("no text panel is enabled")]
    NoTextPanel,

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error("{0}")]
    Invalid(String),

    /// The render loop is gone
    #[error("the clock is not running")]
    Closed,
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match word.to_ascii_lowercase().as_str() {
            "display" if rest.is_empty() => Err(CommandError::Usage("display <text>")),
            "display" => Ok(Command::SetText(rest.to_string())),
            "align" if rest.is_empty() => {
                Err(CommandError::Usage("align <TOP|BOTTOM> <LEFT|RIGHT>"))
            }
            "align" => Ok(Command::Align(rest.parse()?)),
            "background" => Ok(Command::Background(
                (!rest.is_empty()).then(|| rest.to_string()),
            )),
            "set-panel" if rest.is_empty() => Err(CommandError::Usage(
                "set-panel <text|date|weather|activity>",
            )),
            "set-panel" => InfoKind::from_name(rest)
                .map(Command::SetPanel)
                .ok_or_else(|| CommandError::UnknownPanel(rest.to_string())),
            "panels" => Ok(Command::Panels),
            "banners" => Ok(Command::Banners),
            "help" => Ok(Command::Help),
            "exit" | "quit" => Ok(Command::Shutdown),
            _ => Err(CommandError::Unknown(word.to_string())),
        }
    }
}

/// A command on its way to the render loop.
#[derive(Debug)]
pub struct Request {
    pub command: Command,
    pub reply: oneshot::Sender<Result<String, CommandError>>,
}

/// Cloneable handle for submitting commands.
#[derive(Clone, Debug)]
pub struct CommandSender {
    sender: mpsc::Sender<Request>,
}

impl CommandSender {
    /// Submit `command` and wait for the loop's answer.
    pub async fn send(&self, command: Command) -> Result<String, CommandError> {
        let (reply, answer) = oneshot::channel();
        self.sender
            .send(Request { command, reply })
            .await
            .map_err(|_| CommandError::Closed)?;
        answer.await.map_err(|_| CommandError::Closed)?
    }
}

pub fn channel(capacity: usize) -> (CommandSender, mpsc::Receiver<Request>) {
    let (sender, receiver) = mpsc::channel(capacity);
    (CommandSender { sender }, receiver)
}

/// Read commands line by line until `exit` or end of input.
///
/// End of input only stops the reader; the clock keeps running.
pub async fn run_console<R, W>(input: R, mut output: W, sender: CommandSender) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(err) => {
                output.write_all(format!("Error: {}\n", err).as_bytes()).await?;
                output.flush().await?;
                continue;
            }
        };

        let shutdown = command == Command::Shutdown;
        let reply = match sender.send(command).await {
            Ok(message) => format!("{}\n", message),
            Err(err) => format!("Error: {}\n", err),
        };
        output.write_all(reply.as_bytes()).await?;
        output.flush().await?;

        if shutdown {
            break;
        }
    }
    debug!("Console input closed");
    Ok(())
}
