//! BLUR GOD VIEW director console.
//!
//! A line-oriented front end over `blur-core`: `#` lines change the scene,
//! participants and relationships; any other line is a director command that
//! runs one generation round.
//!
//! ```bash
//! cargo run -p blur -- --model gemini-2.5-flash --save blur_save.json
//! ```

mod headless;
mod prompt;
mod render;

use blur_core::SessionConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Logs go to stderr so stdout stays a clean transcript
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let config = parse_config_from_args(&args)?;
    tracing::info!(model = ?config.model, "starting director console");

    headless::run(config).await
}

/// Build the session config from the environment, then command line overrides.
fn parse_config_from_args(args: &[String]) -> anyhow::Result<SessionConfig> {
    let mut config = SessionConfig::from_env();

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match (args[i].as_str(), value) {
            ("--model", Some(model)) => config = config.with_model(model),
            ("--save", Some(path)) => config = config.with_save_path(path),
            ("--language", Some(language)) => config.settings.language = language.clone(),
            ("--limit", Some(limit)) => {
                let limit: usize = limit
                    .parse()
                    .map_err(|_| anyhow::anyhow!("--limit expects a number, got {limit}"))?;
                config = config.with_persona_limit(limit);
            }
            ("--manual", _) => {
                config.settings.autonomous = false;
                i += 1;
                continue;
            }
            (flag, _) => anyhow::bail!("unknown or incomplete argument: {flag}"),
        }
        i += 2;
    }

    Ok(config)
}

fn print_help() {
    println!("BLUR GOD VIEW director console");
    println!();
    println!("Usage: blur [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --model <name>      Gemini model (default: BLUR_MODEL or the client default)");
    println!("  --save <path>       Default save file (default: BLUR_SAVE_PATH)");
    println!("  --language <text>   Narrative language");
    println!("  --limit <n>         Personas described per round");
    println!("  --manual            Don't let the story advance on its own");
    println!("  -h, --help          Show this help");
    println!();
    println!("Environment:");
    println!("  GEMINI_API_KEY / API_KEY   Credential; prompted for when missing");
    println!("  RUST_LOG                   Log filter (logs go to stderr)");
}
