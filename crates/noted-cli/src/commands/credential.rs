use clap::Subcommand;
use noted_core::credentials;

use super::{App, CmdResult};

#[derive(Subcommand)]
pub enum CredentialAction {
    /// Check and store the summarization API key
    Set {
        /// API key (starts with "sk-")
        key: String,
    },
    /// Remove the stored API key
    Clear,
    /// Show whether a validated key is available
    Status,
}

pub fn run(action: CredentialAction) -> CmdResult {
    let app = App::open()?;
    match action {
        CredentialAction::Set { key } => {
            credentials::store_api_key(&app.store, &key)?;
            println!("API key saved");
        }
        CredentialAction::Clear => {
            credentials::clear_api_key(&app.store)?;
            println!("API key removed");
        }
        CredentialAction::Status => {
            let validated = app.store.credential_valid();
            println!(
                "{}",
                if validated { "validated" } else { "not validated" }
            );
            if validated {
                match credentials::api_key() {
                    Ok(Some(_)) => {}
                    Ok(None) => eprintln!("warning: no key found in the keyring"),
                    Err(e) => eprintln!("warning: keyring unavailable ({e})"),
                }
            }
        }
    }
    Ok(())
}
