use clap::{Parser, Subcommand};

/// tokengate — encrypted bearer tokens for the quote and image services
#[derive(Parser)]
#[command(name = "tokengate", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to bind (defaults to TOKENGATE_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print a fresh base64 key for TOKENGATE_CIPHER_KEY
    Keygen,

    /// Issue a token against the configured store and print the response
    Issue {
        /// Space-delimited scopes, e.g. "image quote"
        #[arg(long)]
        scope: Option<String>,
    },

    /// Decrypt a token with the configured key and show its contents
    Inspect {
        token: String,
    },
}
