//! Command-line interface for LumeAI
//!
//! Argument parsing and the line commands typed during a session.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use lumeai_lib::session::Control;
use lumeai_lib::state::Persona;

/// LumeAI - voice chat with a streaming assistant
#[derive(Parser, Debug)]
#[command(name = "lumeai")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Debug-level logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Use this settings file instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stream a conversation: Enter starts/stops a turn, `q` quits
    Stream {
        /// Persona for this run
        #[arg(short, long)]
        persona: Option<Persona>,
    },
    /// Record a turn, upload it, play the reply
    Upload,
    /// Show or edit the settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// List audio devices
    Devices,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the settings with keys masked
    Show,
    /// Set one value, e.g. `api.gemini_key` or `server.base_url`
    Set { key: String, value: String },
    /// Set API keys together; refuses to save without the required ones
    Keys {
        #[arg(long)]
        assembly: Option<String>,
        #[arg(long)]
        gemini: Option<String>,
        #[arg(long)]
        murf: Option<String>,
        #[arg(long)]
        weather: Option<String>,
        #[arg(long)]
        news: Option<String>,
        #[arg(long)]
        tmdb: Option<String>,
    },
    /// Print the settings file path
    Path,
    /// Restore the defaults
    Reset,
}

/// Interpret a line typed during a streaming session
pub fn parse_line(line: &str) -> Result<Control, String> {
    let line = line.trim();
    let mut words = line.split_whitespace();

    match words.next() {
        None => Ok(Control::Toggle),
        Some("q" | "quit" | "exit") => Ok(Control::Shutdown),
        Some("start") => Ok(Control::Start),
        Some("stop") => Ok(Control::Stop),
        Some("persona") => {
            let name = words
                .next()
                .ok_or_else(|| format!("usage: persona <{}>", persona_names()))?;
            name.parse::<Persona>().map(Control::SetPersona)
        }
        Some(other) => Err(format!("unknown command: {}", other)),
    }
}

/// Persona ids joined with `|`
pub fn persona_names() -> String {
    Persona::ALL
        .iter()
        .map(|p| p.id())
        .collect::<Vec<_>>()
        .join("|")
}
