//! Command-line driver for the Lazarus offline cache agent.
//!
//! Runs the agent's handlers against a real network and a cache store on
//! disk, so a shell can be precached once and then served offline.
//!
//! ## Usage
//!
//! ```bash
//! # Precache the app shell and drop caches from older versions
//! lazarus-agent install --scope https://lazarus.local/app/ --store .lazarus
//!
//! # Fetch through the agent (cache-first)
//! lazarus-agent fetch https://lazarus.local/app/manifest.json --store .lazarus
//!
//! # List stored caches and their URLs
//! lazarus-agent caches --store .lazarus
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use lazarus_common::{init_logging, LogConfig, LogFormat};
use lazarus_core::AgentConfig;
use lazarus_net::{Fetcher, HttpFetcher, LoaderConfig, Request};
use lazarus_sw::{
    CacheStorage, FetchDecision, FetchResponse, FileCacheStorage, OfflineAgent, ResponseSource,
};
use tracing::{error, info};
use url::Url;

#[derive(Parser)]
#[command(name = "lazarus-agent")]
#[command(about = "Offline cache agent for the Lazarus web app")]
struct Cli {
    /// Log output format (pretty, compact, json)
    #[arg(long, default_value = "pretty", global = true)]
    log_format: LogFormat,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Precache the app shell, then activate (delete stale caches)
    Install {
        /// Scope the precache paths resolve against
        #[arg(short, long)]
        scope: Url,
        /// Agent configuration (JSON); built-in defaults when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Cache store directory
        #[arg(long, default_value = ".lazarus")]
        store: PathBuf,
    },

    /// Fetch URLs through the agent
    Fetch {
        /// URLs to fetch
        #[arg(required = true)]
        urls: Vec<Url>,
        /// Treat the requests as page navigations
        #[arg(short, long)]
        navigate: bool,
        /// Scope the agent was installed for
        #[arg(short, long, default_value = "https://lazarus.local/")]
        scope: Url,
        /// Agent configuration (JSON); built-in defaults when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Cache store directory
        #[arg(long, default_value = ".lazarus")]
        store: PathBuf,
    },

    /// List stored caches and the URLs they hold
    Caches {
        /// Cache store directory
        #[arg(long, default_value = ".lazarus")]
        store: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    init_logging(LogConfig::new(cli.log_format).verbose(cli.verbose));

    match cli.command {
        Commands::Install {
            scope,
            config,
            store,
        } => {
            let (agent, _) = build_agent(scope, config.as_deref(), &store).await?;

            let installed = agent.install().await?;
            let activated = agent.activate().await?;

            println!("Installed {}", agent.version());
            println!("  Precached:     {}", installed.precached);
            println!("  Stale deleted: {}", activated.deleted.len());
            for name in &activated.deleted {
                println!("    - {name}");
            }
        }

        Commands::Fetch {
            urls,
            navigate,
            scope,
            config,
            store,
        } => {
            let (agent, network) = build_agent(scope, config.as_deref(), &store).await?;

            for url in urls {
                let request = if navigate {
                    Request::navigate(url)
                } else {
                    Request::get(url)
                };

                let fetched = match agent.handle_fetch(&request).await? {
                    FetchDecision::Respond(response) => response,
                    FetchDecision::Passthrough(reason) => {
                        info!(url = %request.url, ?reason, "Passthrough to network");
                        FetchResponse {
                            response: network.fetch(&request).await?,
                            source: ResponseSource::Network,
                        }
                    }
                };

                println!(
                    "{} {} [{:?}] {} bytes",
                    fetched.response.status,
                    request.url,
                    fetched.source,
                    fetched.response.body().len()
                );
            }
        }

        Commands::Caches { store } => {
            let storage = FileCacheStorage::load(&store).await?;
            let names = storage.keys().await?;
            if names.is_empty() {
                println!("No caches in {}", storage.path().display());
            }
            for name in names {
                let urls = storage.cached_urls(&name).await?;
                println!("{name} ({} entries)", urls.len());
                for url in urls {
                    println!("  {url}");
                }
            }
        }
    }

    Ok(())
}

async fn build_agent(
    scope: Url,
    config: Option<&Path>,
    store: &Path,
) -> Result<(OfflineAgent, Arc<dyn Fetcher>), Box<dyn std::error::Error>> {
    let config = match config {
        Some(path) => AgentConfig::load(path).map_err(|e| {
            error!(category = e.category(), error = %e, "Failed to load agent config");
            e
        })?,
        None => AgentConfig::default(),
    };
    let storage: Arc<dyn CacheStorage> = Arc::new(FileCacheStorage::load(store).await?);
    let network: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(LoaderConfig::default())?);

    let agent = OfflineAgent::new(scope, config, storage, Arc::clone(&network))?;
    Ok((agent, network))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_install() {
        let cli = Cli::try_parse_from([
            "lazarus-agent",
            "install",
            "--scope",
            "https://lazarus.local/app/",
            "--store",
            "/tmp/store",
        ])
        .unwrap();
        match cli.command {
            Commands::Install {
                scope,
                config,
                store,
            } => {
                assert_eq!(scope.as_str(), "https://lazarus.local/app/");
                assert!(config.is_none());
                assert_eq!(store, PathBuf::from("/tmp/store"));
            }
            _ => panic!("expected install"),
        }
    }

    #[test]
    fn test_parse_fetch_with_global_flags() {
        let cli = Cli::try_parse_from([
            "lazarus-agent",
            "fetch",
            "--navigate",
            "https://lazarus.local/app/settings",
            "--log-format",
            "json",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.log_format, LogFormat::Json);
        match cli.command {
            Commands::Fetch { urls, navigate, .. } => {
                assert!(navigate);
                assert_eq!(urls.len(), 1);
            }
            _ => panic!("expected fetch"),
        }
    }

    #[test]
    fn test_fetch_requires_a_url() {
        assert!(Cli::try_parse_from(["lazarus-agent", "fetch"]).is_err());
    }

    #[test]
    fn test_unknown_log_format_is_rejected() {
        assert!(Cli::try_parse_from([
            "lazarus-agent",
            "--log-format",
            "xml",
            "caches",
        ])
        .is_err());
    }
}
