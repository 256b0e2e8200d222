use std::io::Read;
use std::path::PathBuf;

use clap::Args;
use noted_core::{credentials, ClipError, Clipper};

use super::{App, CmdResult};

#[derive(Args)]
pub struct ClipArgs {
    /// Article title
    #[arg(long)]
    pub title: String,
    /// Article URL
    #[arg(long)]
    pub url: String,
    /// Read article text from this file instead of stdin
    #[arg(long)]
    pub file: Option<PathBuf>,
}

pub async fn run(args: ClipArgs) -> CmdResult {
    let app = App::open()?;
    let raw = match &args.file {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let clipper = Clipper::new(app.reconciler.clone(), app.relay.clone(), &app.config);
    let article = clipper.article(&args.title, &args.url, &raw)?;
    let api_key = credentials::api_key()?
        .ok_or("no API key stored; run `noted credential set <key>` first")?;

    match clipper.clip(&article, &api_key).await {
        Ok(clipped) => {
            println!("Saved to {} ({})", clipped.page_url, clipped.category);
            println!();
            println!("{}", clipped.summary);
            Ok(())
        }
        Err(ClipError::LinkLost) => {
            Err("your workspace link was revoked; run `noted link start` to link again".into())
        }
        Err(e) => Err(e.into()),
    }
}
