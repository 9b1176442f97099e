pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

use chrono::Utc;
use clap::Parser;
use otc_sdk::{ElementsRpcClient, Quote, Rfq};

use cli::{Cli, Command};
use commands::{CreateRfqRequest, read_json, write_json};
use config::AppConfig;
pub use error::AppError;

fn now() -> i64 {
    Utc::now().timestamp()
}

/// Default level `info`; the HTTP stack and LWK only speak up on warnings.
/// `RUST_LOG` overrides both.
pub fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .filter_module("reqwest", log::LevelFilter::Warn)
        .filter_module("lwk_wollet", log::LevelFilter::Warn)
        .filter_module("rustls", log::LevelFilter::Warn)
        .parse_default_env()
        .init();
}

pub fn run() -> Result<(), AppError> {
    init_logger();
    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;
    log::debug!("network {}, rpc {}", config.network, config.rpc.url);

    let rpc = ElementsRpcClient::new(config.rpc_config())?;
    let output = match cli.command {
        Command::CreateRfq {
            sell,
            buy,
            amount,
            ttl,
            out,
        } => {
            let ledger = client_ledger(&rpc, &config);
            let request = CreateRfqRequest {
                sell: &sell,
                buy: &buy,
                amount: &amount,
                ttl_secs: ttl,
            };
            let rfq = commands::create_rfq_command(&ledger, &config, &request, now())?;
            write_json(&rfq, out.as_deref())?
        }
        Command::Quote { rfq, dealer, out } => {
            let rfq: Rfq = read_json(&rfq)?;
            let wallet = &config.dealer_config(&dealer)?.wallet;
            let ledger = rpc.for_wallet(wallet.as_str());
            match commands::quote_command(&ledger, &config, &rfq, &dealer, now())? {
                Some(quote) => write_json(&quote, out.as_deref())?,
                None => {
                    log::warn!("{dealer} declined rfq {}", rfq.id);
                    "null".to_string()
                }
            }
        }
        Command::Verify { rfq, quote } => {
            let response = match (rfq, quote) {
                (Some(path), _) => {
                    let rfq: Rfq = read_json(&path)?;
                    commands::verify_rfq_command(&rpc, &rfq, now())?
                }
                (None, Some(path)) => {
                    let quote: Quote = read_json(&path)?;
                    commands::verify_quote_command(&rpc, &quote, now())?
                }
                (None, None) => {
                    return Err(AppError::InvalidArgument(
                        "verify needs --rfq or --quote".into(),
                    ))
                }
            };
            write_json(&response, None)?
        }
        Command::Settle {
            rfq,
            quote,
            dry_run,
        } => {
            let rfq: Rfq = read_json(&rfq)?;
            let quotes = quote
                .iter()
                .map(|path| read_json(path))
                .collect::<Result<Vec<Quote>, _>>()?;
            let ledger = client_ledger(&rpc, &config);
            let response =
                commands::settle_command(&ledger, &config, &rfq, &quotes, dry_run, now())?;
            write_json(&response, None)?
        }
        Command::Demo => match commands::demo_command(&rpc, &config, now) {
            Ok(report) => write_json(&report, None)?,
            Err(e) => {
                log::error!("demo failed: {e}");
                log::error!("a fresh regtest chain or a re-run usually clears UTXO conflicts");
                return Err(e);
            }
        },
    };
    println!("{output}");
    Ok(())
}

/// The node routes `/wallet/` (empty name) to its default wallet.
fn client_ledger(rpc: &ElementsRpcClient, config: &AppConfig) -> ElementsRpcClient {
    rpc.for_wallet(config.client.wallet.as_str())
}
