//! Command-line interface of the `liquid-otc` binary.
//!
//! RFQs and quotes travel between client and dealers as JSON files; each
//! subcommand reads and writes those files.
use std::path::PathBuf;

use clap::{ArgGroup, Parser, Subcommand};

use crate::config::DEFAULT_CONFIG_FILE;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the JSON config file. A missing file means defaults.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create and sign an RFQ from the configured client address.
    CreateRfq {
        /// Asset to sell: hex asset id or `lbtc`.
        #[arg(long)]
        sell: String,
        /// Asset to buy: hex asset id or `lbtc`.
        #[arg(long)]
        buy: String,
        /// Approximate amount of the sell asset.
        #[arg(long)]
        amount: String,
        /// Lifetime in seconds (defaults to `rfq_ttl_secs`).
        #[arg(long)]
        ttl: Option<u64>,
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Answer an RFQ as one of the configured dealers.
    Quote {
        #[arg(long)]
        rfq: PathBuf,
        #[arg(long)]
        dealer: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Check the signature and expiry of an RFQ or a quote.
    #[command(group(ArgGroup::new("message").required(true).args(["rfq", "quote"])))]
    Verify {
        #[arg(long)]
        rfq: Option<PathBuf>,
        #[arg(long)]
        quote: Option<PathBuf>,
    },

    /// Pick the best quote for an RFQ and settle it on chain.
    Settle {
        #[arg(long)]
        rfq: PathBuf,
        #[arg(long, num_args = 1.., required = true)]
        quote: Vec<PathBuf>,
        /// Print the settlement plan without signing or broadcasting.
        #[arg(long)]
        dry_run: bool,
    },

    /// End-to-end run against a regtest node.
    Demo,
}
