//! Offline wallet utilities.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use sero_exchange::{confirm_out, render_error, Error};
use sero_wallet_core::{Id32, SealedOut, SoftwareCrypto};

#[derive(Parser)]
#[command(name = "sero-cli", about = "Offline SERO wallet utilities", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Trial-decrypt a sealed output with an explicit key.
    ///
    /// Prints the decrypted output as JSON on success; failures are
    /// reported as a tagged error on stderr.
    Confirm {
        /// Decryption key: exactly 32 bytes of hex, `0x` prefix optional.
        key: String,
        /// The sealed output as JSON.
        out: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Confirm { key, out } => match run_confirm(&key, &out) {
            Ok(rendered) => {
                println!("{rendered}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}", render_error(&e));
                ExitCode::FAILURE
            }
        },
    }
}

fn run_confirm(key: &str, out: &str) -> Result<String, Error> {
    let key = parse_key(key)?;
    let sealed: SealedOut = serde_json::from_str(out)
        .map_err(|e| Error::InputMalformed(format!("sealed output JSON: {e}")))?;
    let confirmed = confirm_out(&SoftwareCrypto, &key, &sealed)?;
    serde_json::to_string_pretty(&confirmed)
        .map_err(|e| Error::InputMalformed(format!("render: {e}")))
}

/// Parse a 32-byte hex key, accepting `0x`-prefixed or bare input.
fn parse_key(input: &str) -> Result<Id32, Error> {
    let trimmed = input.trim().trim_matches('\'');
    let raw = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes =
        hex::decode(raw).map_err(|e| Error::InputMalformed(format!("hex decode: {e}")))?;
    if bytes.len() != 32 {
        return Err(Error::InputMalformed(format!(
            "key must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    Id32::from_slice(&bytes).map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sero_wallet_core::{Id64, InfoDesc, SubAddr};

    #[test]
    fn test_parse_key_accepts_both_hex_forms() {
        let hex32 = "11".repeat(32);
        assert!(parse_key(&hex32).is_ok());
        assert!(parse_key(&format!("0x{hex32}")).is_ok());
        assert!(parse_key(&format!("'{hex32}'")).is_ok());
    }

    #[test]
    fn test_parse_key_rejects_bad_input() {
        assert!(parse_key("zz").is_err());
        assert!(parse_key(&"11".repeat(31)).is_err());
        assert!(parse_key(&"11".repeat(33)).is_err());
    }

    #[test]
    fn test_run_confirm_round_trip() {
        let crypto = SoftwareCrypto;
        let key = Id32([7u8; 32]);
        let pkr = SubAddr::bare(&Id64([1u8; 64]));
        let info = InfoDesc {
            currency: sero_wallet_core::currency_id("SERO"),
            value: Id32::from_index(42),
            category: Id32::default(),
            tkt_value: Id32::default(),
            memo: Id64::default(),
        };
        let sealed = SealedOut {
            pkr,
            rpk: Id64([2u8; 64]),
            einfo: crypto.seal_info(&key, true, &info),
            out_cm: crypto.seal_commitment(&pkr, &info),
        };
        let out_json = serde_json::to_string(&sealed).unwrap();

        let rendered = run_confirm(&format!("0x{}", hex::encode(key.0)), &out_json).unwrap();
        assert!(rendered.contains("\"42\""));

        let wrong = run_confirm(&"22".repeat(32), &out_json).unwrap_err();
        assert_eq!(wrong.tag(), "CRYPTO_ERROR");
    }
}
