use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pixshare")]
#[command(author, version, about = "Image hosting with share links that unfurl in chat apps")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run the upload encoder on a file and report the chosen tier
    Encode {
        /// Image to encode
        #[arg(required = true)]
        input: PathBuf,

        /// Where to write the stored payload
        #[arg(required = true)]
        output: PathBuf,
    },

    /// Create an account directly in the database
    CreateUser {
        username: String,

        password: String,

        /// Grant admin rights
        #[arg(long)]
        admin: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
