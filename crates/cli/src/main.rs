//! Binary entry point for the subtitle downloader.

use anyhow::{anyhow, Context, Result};
use bilisub_core::{
    BiliClient, CredentialSource, Error, Format, MemoryCache, Outcome, Pipeline,
};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command line options for the binary.
#[derive(Parser)]
struct Cli {
    /// Output format: txt, srt, vtt or lrc.
    #[arg(long, default_value = "srt")]
    format: String,

    /// Inline cookie header copied from the browser.
    #[arg(long)]
    cookie: Option<String>,

    /// Path to a browser cookie-export JSON file.
    #[arg(long)]
    cookie_file: Option<PathBuf>,

    /// Where to write the subtitle file; defaults to `<video id>.<format>`.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Preferred subtitle language when several AI tracks exist.
    #[arg(long)]
    lang: Option<String>,

    /// Enable verbose debug and trace logs.
    #[arg(long)]
    debug: bool,

    /// Video URL or bare identifier to fetch subtitles for.
    input: String,
}

/// Application entry point which parses CLI args and runs the pipeline.
/// This function should initialize logging and delegate to the core library.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let filter = if cli.debug {
        EnvFilter::default()
            .add_directive("bilisub=trace".parse().unwrap())
            .add_directive("bilisub_core=trace".parse().unwrap())
            .add_directive("info".parse().unwrap())
    } else {
        EnvFilter::default()
            .add_directive("bilisub=info".parse().unwrap())
            .add_directive("bilisub_core=info".parse().unwrap())
            .add_directive("warn".parse().unwrap())
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let format = Format::from_str(&cli.format)?;
    let source = CredentialSource {
        inline_cookie: cli.cookie.clone(),
        cookie_file: cli.cookie_file.clone(),
    };
    let bundle = source.load().map_err(|err| match err {
        Error::AuthConfig(_) => anyhow!(
            "{err}\nexport your bilibili.com cookies and pass them with \
             --cookie or --cookie-file"
        ),
        other => other.into(),
    })?;

    let client = BiliClient::new(bundle)?;
    let mut pipeline =
        Pipeline::new(client, MemoryCache::new()).with_preferred_lang(cli.lang.clone());

    match pipeline.run(&cli.input, format).await? {
        Outcome::NoSubtitles { video } => {
            println!("no subtitles available for {} ({})", video.bvid, video.title);
        }
        Outcome::Subtitle(output) => {
            info!(
                "selected track {} ({}) of {}",
                output.track.id, output.track.lan_doc, output.video.bvid
            );
            let path = cli.output.unwrap_or_else(|| {
                PathBuf::from(format!("{}.{}", output.video.bvid, format))
            });
            fs::write(&path, &output.rendered)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("wrote {}", path.display());
        }
    }
    Ok(())
}
