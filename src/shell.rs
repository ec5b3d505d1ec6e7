//! Interactive menu driving a [`FileClient`] from stdin.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

use crate::error::{FerryError, FerryResult};
use crate::network::{FileClient, RemoteListing, TransferReport};
use crate::utils::format_size;

const PROMPT: &str = "Cli# ";

/// One line typed at the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    ListLocal,
    ListRemote,
    Send(String),
    Receive(String),
    DeleteLocal(String),
    DeleteRemote(String),
    Quit,
}

impl ShellCommand {
    /// Parse a menu line; the verb is case-insensitive and everything after
    /// the first space is the file name
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(' ') {
            Some((verb, rest)) => (verb, Some(rest.trim()).filter(|r| !r.is_empty())),
            None => (line, None),
        };

        match (verb.to_lowercase().as_str(), rest) {
            ("q", _) => Some(Self::Quit),
            ("lc", _) => Some(Self::ListLocal),
            ("lr", _) => Some(Self::ListRemote),
            ("s", Some(name)) => Some(Self::Send(name.to_string())),
            ("r", Some(name)) => Some(Self::Receive(name.to_string())),
            ("dl", Some(name)) => Some(Self::DeleteLocal(name.to_string())),
            ("dr", Some(name)) => Some(Self::DeleteRemote(name.to_string())),
            _ => None,
        }
    }
}

pub fn menu() -> String {
    [
        "",
        "Choose from one of the following options and push Enter:",
        "1. lc (list local folder)",
        "2. lr (list remote folder)",
        "3. s <file_name> (send file to server)",
        "4. r <file_name> (receive file from server)",
        "5. dl <file_name> (delete local file)",
        "6. dr <file_name> (delete remote file)",
        "7. q (exit)",
    ]
    .iter()
    .map(|line| format!("{}{}\n", PROMPT, line))
    .collect()
}

/// Render a directory listing, one file per line
pub fn render_listing(title: &str, files: &BTreeMap<String, String>) -> String {
    let mut out = format!("{}\n", title);
    if files.is_empty() {
        out.push_str("  (empty)\n");
    }
    for (name, size) in files {
        let _ = writeln!(out, "  {:<40} {:>10}", name, size);
    }
    out
}

pub fn render_local_listing(files: &BTreeMap<String, u64>) -> String {
    let files = files
        .iter()
        .map(|(name, size)| (name.clone(), format_size(*size)))
        .collect();
    render_listing("Local folder:", &files)
}

pub fn render_remote_listing(listing: &RemoteListing) -> String {
    render_listing("Remote folder:", &listing.files)
}

pub fn render_transfer(verb: &str, report: &TransferReport) -> String {
    let mut out = format!(
        "{} '{}': {} in {} chunks, {:.2?} (md5 {})",
        verb,
        report.file_name,
        format_size(report.bytes),
        report.chunks,
        report.elapsed,
        report.checksum
    );
    if let Some(message) = &report.remote_message {
        let _ = write!(out, "\nServer: {}", message);
    }
    out
}

/// Run the menu until `q` or end of input
pub async fn run(client: &FileClient) -> FerryResult<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let greeting = format!(
        "{}Incoming files will be stored into {}\n",
        PROMPT,
        client.config().local_dir.display()
    );
    stdout.write_all(greeting.as_bytes()).await?;

    loop {
        stdout.write_all(menu().as_bytes()).await?;
        stdout.write_all(PROMPT.as_bytes()).await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let Some(command) = ShellCommand::parse(&line) else {
            stdout
                .write_all(format!("{}Unknown command. Try again.\n", PROMPT).as_bytes())
                .await?;
            continue;
        };
        if command == ShellCommand::Quit {
            break;
        }

        debug!(?command, "shell command");
        let text = match execute(client, &command).await {
            Ok(text) => text,
            // A broken working directory ends the shell like it ends the server session
            Err(e @ FerryError::LocalDirectory(_)) => {
                stdout.write_all(format!("{}{}\n", PROMPT, e).as_bytes()).await?;
                return Err(e);
            }
            Err(e) => format!("{}\nPlease try again.", e),
        };
        for line in text.lines() {
            stdout.write_all(format!("{}{}\n", PROMPT, line).as_bytes()).await?;
        }
    }
    stdout.flush().await?;
    Ok(())
}

/// Run one command and describe the result
pub async fn execute(client: &FileClient, command: &ShellCommand) -> FerryResult<String> {
    let text = match command {
        ShellCommand::ListLocal => render_local_listing(&client.list_local().await?),
        ShellCommand::ListRemote => render_remote_listing(&client.list_remote().await?),
        ShellCommand::Send(name) => render_transfer("Sent", &client.upload(name).await?),
        ShellCommand::Receive(name) => render_transfer("Received", &client.download(name).await?),
        ShellCommand::DeleteLocal(name) => {
            client.delete_local(name).await?;
            format!("Local file '{}' deleted.", name)
        }
        ShellCommand::DeleteRemote(name) => client.delete_remote(name).await?.message,
        ShellCommand::Quit => String::new(),
    };
    Ok(text)
}
