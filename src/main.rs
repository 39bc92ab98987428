use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use blogscribe::cli::{Cli, Commands, OutputFormat};
use blogscribe::config::Config;
use blogscribe::locator::{is_search_path_fallback, FfmpegLocator};
use blogscribe::pipeline::{validate_link, ArticlePipeline, GenerationRequest};
use blogscribe::store::ArticleStore;
use blogscribe::{output, server, store, utils};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Serve { bind } => {
            let config = Config::load(config_path).await?;
            warn_missing_dependencies(&config).await;
            server::serve(&config, bind.as_deref()).await?;
        }
        Commands::Generate {
            url,
            user,
            output,
            format,
        } => {
            let config = Config::load(config_path).await?;
            warn_missing_dependencies(&config).await;
            generate(&config, &url, &user, output, format, cli.quiet).await?;
        }
        Commands::Articles { user } => {
            let config = Config::load_unvalidated(config_path).await?;
            let store = store::from_config(config.storage.articles_path.as_deref())?;
            let articles = store.list_for_owner(&user).await?;
            if articles.is_empty() {
                println!("No articles for {}", user);
            }
            for article in &articles {
                println!("{}", output::summary_line(article));
            }
        }
        Commands::Config { show } => {
            let config = Config::load_unvalidated(config_path).await?;
            if show {
                config.display();
                if let Err(e) = config.validate() {
                    println!();
                    println!("Configuration is incomplete: {}", e);
                }
            } else {
                let path = match config_path {
                    Some(path) => path.to_path_buf(),
                    None => Config::config_path()?,
                };
                println!("Config file: {}", path.display());
            }
        }
        Commands::Doctor => {
            let config = Config::load_unvalidated(config_path).await?;
            let ffmpeg = FfmpegLocator::new(&config.ffmpeg).resolve();
            if is_search_path_fallback(&ffmpeg) {
                println!("ffmpeg: relying on PATH lookup");
            } else {
                println!("ffmpeg: {}", ffmpeg.display());
            }

            let missing = utils::check_dependencies(&config.yt_dlp.binary, &ffmpeg).await;
            if missing.is_empty() {
                println!("All external tools are available.");
            } else {
                for dep in &missing {
                    println!("missing: {}", dep);
                }
                anyhow::bail!("{} external tool(s) unavailable", missing.len());
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose {
        "blogscribe=debug,tower_http=debug"
    } else {
        "blogscribe=info,tower_http=info"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    // stdout is reserved for command output
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

async fn warn_missing_dependencies(config: &Config) {
    let ffmpeg = FfmpegLocator::new(&config.ffmpeg).resolve();
    let missing = utils::check_dependencies(&config.yt_dlp.binary, &ffmpeg).await;
    if !missing.is_empty() {
        eprintln!("⚠️  Dependency check warnings:");
        for dep in missing {
            eprintln!("   • {}", dep);
        }
        eprintln!("   (Continuing anyway - tools may be available)");
    }
}

async fn generate(
    config: &Config,
    url: &str,
    user: &str,
    output_path: Option<PathBuf>,
    format: OutputFormat,
    quiet: bool,
) -> Result<()> {
    let link = validate_link(url).map_err(|e| anyhow::anyhow!(e.client_message()))?;

    let store = store::from_config(config.storage.articles_path.as_deref())?;
    let pipeline = ArticlePipeline::from_config(config, store.clone()).await?;

    let spinner = if quiet {
        ProgressBar::hidden()
    } else {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .context("Invalid progress template")?,
        );
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner
    };
    spinner.set_message(format!("Generating article for {}", link));

    let started = Instant::now();
    let result = pipeline
        .run(GenerationRequest {
            user: user.to_string(),
            link,
        })
        .await;
    spinner.finish_and_clear();

    let result = result.map_err(|e| {
        anyhow::anyhow!("{} (HTTP {})", e.client_message(), e.status_code().as_u16())
    })?;

    let article = store
        .get(result.article_id)
        .await?
        .context("Stored article could not be read back")?;

    match output_path {
        Some(path) => {
            output::save_to_file(&article, &path, format).await?;
            println!("Article saved to: {}", path.display());
        }
        None => output::print_to_console(&article, format)?,
    }

    if !quiet {
        eprintln!(
            "Generated \"{}\" in {}",
            result.title,
            utils::format_duration(started.elapsed())
        );
    }

    Ok(())
}
