//! Attraction Crawler CLI
//!
//! Local execution entry point.

use std::path::PathBuf;
use std::sync::Arc;

use attraction_crawler::{
    error::{AppError, Result},
    models::{AttractionList, Config},
    pipeline::{AttractionPipeline, BatchRunner, Enricher, StatsReporter},
    services::{
        ArkClient, AuthContext, CachingNoteSource, DetailFetcher, HttpNoteSource, MemoryCache,
        NoteSource, RelevanceAnalyzer, RelevanceClassifier,
    },
    storage::{DatasetStorage, LocalStorage},
    utils::log::{FacadeSink, FileSink, LogLevel, Logger},
};
use clap::{Parser, Subcommand};

/// Attraction Crawler - RedNote notes filtered for relevance
#[derive(Parser, Debug)]
#[command(
    name = "crawler",
    version,
    about = "Search, classify and enrich RedNote notes about attractions"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run search, classification and enrichment for one attraction
    Run {
        #[arg(short, long)]
        keyword: String,

        /// Attraction id; also names the output files
        #[arg(short, long)]
        id: String,

        /// Session cookie string
        #[arg(long, env = "XHS_COOKIE", hide_env_values = true)]
        cookie: String,
    },

    /// Run the pipeline for every attraction in a TOML list
    Batch {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long, env = "XHS_COOKIE", hide_env_values = true)]
        cookie: String,
    },

    /// Classify previously searched notes
    Classify {
        #[arg(short, long)]
        id: String,

        #[arg(short, long)]
        keyword: String,
    },

    /// Enrich the relevant notes of a classified dataset
    Enrich {
        #[arg(short, long)]
        id: String,

        #[arg(long, env = "XHS_COOKIE", hide_env_values = true)]
        cookie: String,
    },

    /// Summarise relevance scores for every classified attraction
    Stats,

    /// Validate the configuration file
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool, config: &Config) -> Logger {
    let level = if verbose { "debug" } else { config.logging.level.as_str() };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();

    let logger = Logger::new(LogLevel::from_str(level)).with_sink(Arc::new(FacadeSink));
    if !config.logging.file {
        return logger;
    }

    match FileSink::create(&config.paths.log_dir, "crawler") {
        Ok(sink) => {
            log::info!("Writing log file {}", sink.path().display());
            logger.with_sink(Arc::new(sink))
        }
        Err(e) => {
            log::warn!("Log file disabled: {}", e);
            logger
        }
    }
}

fn note_source(config: &Config) -> Result<Arc<dyn NoteSource>> {
    let http = Arc::new(HttpNoteSource::new(&config.platform, &config.search)?);
    Ok(Arc::new(CachingNoteSource::new(http, Arc::new(MemoryCache::new()))))
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config);
    let logger = init_logging(cli.verbose, &config);

    logger.info(&format!("Loaded configuration from {}", cli.config.display()));

    let storage: Arc<dyn DatasetStorage> =
        Arc::new(LocalStorage::from_paths(&config.paths).with_logger(logger.clone()));

    match cli.command {
        Command::Run { keyword, id, cookie } => {
            config.validate()?;
            let completion = Arc::new(ArkClient::from_config(&config.classifier)?);
            let pipeline = AttractionPipeline::new(
                &config,
                note_source(&config)?,
                completion,
                storage,
                logger.clone(),
            );

            let report = pipeline
                .run(&keyword, &id, &AuthContext::from_cookie(&cookie))
                .await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.success {
                return Err(AppError::validation(
                    report.error.unwrap_or_else(|| "run failed".into()),
                ));
            }
        }

        Command::Batch { input, cookie } => {
            config.validate()?;
            let (entries, rejected) = AttractionList::load(&input)?.entries();
            for reason in &rejected {
                logger.warn(&format!("Skipping {}", reason));
            }
            if entries.is_empty() {
                return Err(AppError::config(format!(
                    "no valid attractions in {}",
                    input.display()
                )));
            }

            let completion = Arc::new(ArkClient::from_config(&config.classifier)?);
            let pipeline = AttractionPipeline::new(
                &config,
                note_source(&config)?,
                completion,
                storage.clone(),
                logger.clone(),
            );
            let runner = BatchRunner::new(
                pipeline,
                storage,
                config.batch.item_delay(),
                logger.clone(),
            );
            runner.run(&entries, &AuthContext::from_cookie(&cookie)).await;
        }

        Command::Classify { id, keyword } => {
            let notes = storage.load_raw(&id).await?;
            if notes.is_empty() {
                return Err(AppError::config(format!("no search results stored for {}", id)));
            }

            let completion = Arc::new(ArkClient::from_config(&config.classifier)?);
            let classifier = RelevanceClassifier::new(completion, &config.classifier, logger.clone());
            let analyzer =
                RelevanceAnalyzer::new(classifier, storage, &config.classifier, logger.clone());

            let outcome = analyzer.analyze(&id, &notes, &keyword).await?;
            logger.summary(
                "Classification",
                &[
                    ("rows", outcome.rows.len().to_string()),
                    ("relevant", outcome.relevant().len().to_string()),
                    ("classified", outcome.classified_count.to_string()),
                    ("reused", outcome.cached_count.to_string()),
                ],
            );
        }

        Command::Enrich { id, cookie } => {
            let data = storage
                .load_classified(&id)
                .await?
                .ok_or_else(|| AppError::config(format!("no classified dataset for {}", id)))?;

            let relevant: Vec<_> = data
                .rows
                .into_iter()
                .map(|mut row| {
                    row.apply_threshold(config.classifier.threshold);
                    row
                })
                .filter(|row| row.is_relevant())
                .collect();

            let fetcher = DetailFetcher::new(note_source(&config)?, storage.clone(), logger.clone());
            let enricher = Enricher::new(fetcher, storage, config.enrichment.clone(), logger.clone());
            let summary = enricher
                .enrich(&id, relevant, &AuthContext::from_cookie(&cookie))
                .await?;
            logger.success(&format!(
                "Detail store {} holds {} records",
                summary.detail_file.display(),
                summary.store_size
            ));
        }

        Command::Stats => {
            let (stats, _) = StatsReporter::new(storage, logger.clone()).run().await?;
            if stats.is_empty() {
                logger.warn("No classified datasets found");
            }
        }

        Command::Validate => {
            logger.info("Validating configuration...");

            if let Err(e) = config.validate() {
                logger.error(&format!("Config validation failed: {}", e));
                return Err(e);
            }
            logger.success("Config OK");
        }
    }

    logger.info("Done!");

    Ok(())
}
