//! CLI module for Quicktube.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use crate::config::SummaryStyle;
use clap::{Parser, Subcommand};

/// Quicktube - YouTube video summaries from captions
///
/// Fetches a video's captions, summarizes them with a language model and
/// keeps the result so the next request for the same video is instant.
#[derive(Parser, Debug)]
#[command(name = "quicktube")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "QUICKTUBE_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Summarize a video, reusing the stored summary when there is one
    Summarize {
        /// YouTube URL or video ID
        input: String,

        /// Regenerate even if a summary is already stored
        #[arg(short, long)]
        force: bool,

        /// Summary layout: structured, bullets or paragraph (defaults to the configured one)
        #[arg(short, long)]
        style: Option<SummaryStyle>,
    },

    /// Show the stored summary for a video
    Show {
        /// YouTube URL or video ID
        input: String,
    },

    /// List stored summaries
    List,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write a default configuration file if none exists
    Init,
}
