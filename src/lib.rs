pub mod config;
pub mod endpoint;
pub mod error;
pub mod lifecycle;
pub mod logger;
pub mod monitor;
pub mod pairing;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod utils;

pub use config::Config;
pub use endpoint::{Endpoint, EndpointHandle, SessionSnapshot};
pub use error::{Error, Result};
pub use monitor::{Status, StatusLevel};
pub use session::Role;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::peer::media::NoMedia;

/// Line commands accepted on stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Generate,
    Join(String),
    HangUp,
    Quit,
}

pub fn parse_action(line: &str) -> Option<Action> {
    let line = line.trim();
    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    match word {
        "generate" | "g" => Some(Action::Generate),
        "join" | "j" => Some(Action::Join(rest.trim().to_string())),
        "hangup" | "h" => Some(Action::HangUp),
        "quit" | "q" | "exit" => Some(Action::Quit),
        _ => None,
    }
}

/// Run an endpoint against the configured relay, driven by stdin.
pub async fn run() -> Result<()> {
    logger::init();
    let config = Config::load()?;

    let (endpoint, handle, channel_task) = Endpoint::connect(&config, NoMedia);
    let loop_task = tokio::spawn(endpoint.run());

    let mut statuses = handle.subscribe_status();
    let printer = tokio::spawn(async move {
        while let Ok(status) = statuses.recv().await {
            match status.level {
                StatusLevel::Info => println!("{}", status.message),
                StatusLevel::Error => eprintln!("error: {}", status.message),
            }
        }
    });

    println!("commands: generate | join <code> | hangup | quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                match parse_action(&line) {
                    Some(Action::Generate) => handle.generate_code()?,
                    Some(Action::Join(code)) => handle.join_code(code)?,
                    Some(Action::HangUp) => handle.hang_up()?,
                    Some(Action::Quit) => break,
                    None => warn!(%line, "unknown command"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    handle.shutdown()?;
    let _ = loop_task.await;
    channel_task.abort();
    printer.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_line_commands() {
        assert_eq!(parse_action("generate"), Some(Action::Generate));
        assert_eq!(parse_action("  join  482913 "), Some(Action::Join("482913".into())));
        assert_eq!(parse_action("join"), Some(Action::Join(String::new())));
        assert_eq!(parse_action("h"), Some(Action::HangUp));
        assert_eq!(parse_action("quit"), Some(Action::Quit));
        assert_eq!(parse_action("dance"), None);
    }
}
