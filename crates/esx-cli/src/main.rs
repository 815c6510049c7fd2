//! 🚀 esx-cli — the front door, the bouncer, the maitre d' of esx.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 This binary crate is the thin CLI wrapper that loads config, sets up logging,
//! points the pipeline at a file (or stdin), and prints the damage report at the end.
//! Like a manager. 🦆
//!
//! Usage: `esx-cli [config.toml] [input.ndjson | -]`

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// 🚀 main() — where it all begins. The "I pressed F5 and held my breath" moment.
///
/// 🔧 Steps:
/// 1. Init tracing (so we can see what goes wrong, and when)
/// 2. Parse args (or don't, we're not picky)
/// 3. Load config (the moment of truth)
/// 4. Run the thing (send it and pray 🙏)
/// 5. Handle errors (cry)
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config_arg = args.get(1).map(String::as_str).unwrap_or("esx.toml");
    let input_arg = args.get(2).map(String::as_str).unwrap_or("-");

    // 🔒 Validate the config file exists before we get too emotionally attached
    let config_file = Path::new(config_arg);
    let config_file_path_which_is_validated_to_exist = match config_file.try_exists()
        .context(format!("💀 Configuration file may not exist, couldn't find it. Double check that it exists, or maybe, it's an issue with pwd/cwd and relative paths. Was checking here: '{}'", config_file.display()))?
    {
        true => Some(config_file),
        // 💤 Not there. Env vars only, then. Like my motivation on Mondays.
        false => None,
    };

    let app_config = esx::app_config::load_config(config_file_path_which_is_validated_to_exist)
        .context("💀 In esx-cli, main, we couldn't load the config file, take a look at the file, make sure it's correct. Make sure you didn't forget something obvious")?;

    let started = Instant::now();
    let result = if input_arg == "-" {
        esx::run(app_config, tokio::io::stdin()).await
    } else {
        match tokio::fs::File::open(input_arg).await.with_context(|| {
            format!(
                "💀 The door to '{}' would not budge. We knocked. We pleaded. The file remains unopened.",
                input_arg
            )
        }) {
            Ok(file) => esx::run(app_config, tokio::io::BufReader::new(file)).await,
            Err(err) => Err(err),
        }
    };

    match result {
        Ok(stats) => {
            eprintln!("{}", stats.render(started.elapsed()));
            if stats.failed_docs > 0 {
                error!(
                    failed = stats.failed_docs,
                    "💀 some documents never made it. Scroll up for the flush errors."
                );
                std::process::exit(2);
            }
        }
        Err(err) => {
            error!("💀 error: {}", err);
            // -- 🧅 peel the onion of sadness, one tear-jerking layer at a time
            let mut the_vibes_are_giving_connection_issues = false;
            for cause in err.chain().skip(1) {
                error!("⚠️  cause: {}", cause);
                let cause_str = cause.to_string();
                if cause_str.contains("error sending request")
                    || cause_str.contains("connection refused")
                    || cause_str.contains("Connection refused")
                    || cause_str.contains("tcp connect error")
                    || cause_str.contains("dns error")
                {
                    the_vibes_are_giving_connection_issues = true;
                }
            }

            if the_vibes_are_giving_connection_issues {
                error!(
                    "🔧 hint: looks like Elasticsearch isn't reachable. \
                    Double-check that the cluster is actually running and the URLs in [backend] are right. \
                    If you're using Docker, try `docker ps` to see what's up. ☕"
                );
            }

            // 🗑️ Exit with prejudice. Process exitus maximus.
            std::process::exit(1);
        }
    }

    Ok(())
}
