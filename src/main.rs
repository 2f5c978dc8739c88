use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use app_catalog::cache::{VersionCache, from_slot_config};
use app_catalog::catalog::{AppsListOptions, Catalog, Space};
use app_catalog::config::{self, CatalogConfig};
use app_catalog::store::{DocumentStore, SqliteStore};
use app_catalog::version::Channel;

#[derive(Parser)]
#[command(name = "app-catalog")]
#[command(version, about = "Query the app catalog of a registry")]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Space to query, the first configured one by default
    #[arg(long, global = true)]
    space: Option<String>,

    /// Log to stderr instead of the log file
    #[arg(long, global = true)]
    log_stderr: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List apps, one page at a time
    Apps {
        /// Page size (default 50, at most 200)
        #[arg(long, default_value_t = 0)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        cursor: usize,
        /// slug, type, editor or created_at; prefix with '-' to reverse
        #[arg(long, default_value = "", allow_hyphen_values = true)]
        sort: String,
        /// Filter as name=value; tags and locales take comma-separated lists
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, String)>,
        #[arg(long, default_value = "stable")]
        channel: Channel,
    },
    /// Show one app with its versions
    App {
        slug: String,
        #[arg(long, default_value = "stable")]
        channel: Channel,
    },
    /// Show the latest version of an app
    Latest {
        slug: String,
        #[arg(long, default_value = "stable")]
        channel: Channel,
    },
    /// Show the last minors of the last majors of an app
    Last {
        slug: String,
        #[arg(long, default_value = "stable")]
        channel: Channel,
        #[arg(long, default_value_t = 2)]
        majors: usize,
        #[arg(long, default_value_t = 2)]
        minors: usize,
    },
    /// List versions awaiting publication
    Pending,
    /// List apps in maintenance
    Maintenance,
}

fn parse_filter(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected name=value, got {:?}", s))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => CatalogConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path))?,
        None => CatalogConfig::default(),
    };
    let _guard = init_logging(cli.log_stderr, cli.log_json)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(cli, config))
}

fn init_logging(to_stderr: bool, json: bool) -> anyhow::Result<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (writer, guard) = if to_stderr {
        tracing_appender::non_blocking(std::io::stderr())
    } else {
        let data_dir = config::data_dir();
        std::fs::create_dir_all(&data_dir)?;
        tracing_appender::non_blocking(tracing_appender::rolling::never(
            data_dir,
            config::LOG_FILE_NAME,
        ))
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(guard)
}

async fn run(cli: Cli, config: CatalogConfig) -> anyhow::Result<()> {
    let space_config = config
        .space(cli.space.as_deref())
        .with_context(|| format!("Unknown space {:?}", cli.space.as_deref().unwrap_or("")))?;

    if let Some(parent) = config.store.path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::open(&config.store.path)?);
    let cache = VersionCache::new(
        from_slot_config(&config.cache.versions_latest)?,
        from_slot_config(&config.cache.versions_list)?,
    );
    let catalog = Catalog::new(cache);
    let space = Space::new(&space_config.name, &space_config.prefix, store);

    catalog.prepare_space(&space).await?;
    info!("Serving space {:?} from {:?}", space.name(), config.store.path);

    let output = match cli.command {
        Command::Apps {
            limit,
            cursor,
            sort,
            filters,
            channel,
        } => {
            let options = AppsListOptions {
                limit,
                cursor,
                sort,
                filters: filters.into_iter().collect(),
                latest_version_channel: channel,
                versions_channel: channel,
            };
            let (next, apps) = catalog.list_apps(&space, &options).await?;
            json!({ "cursor": next, "apps": apps })
        }
        Command::App { slug, channel } => {
            serde_json::to_value(catalog.find_app(&space, &slug, channel).await?)?
        }
        Command::Latest { slug, channel } => {
            serde_json::to_value(catalog.find_latest_version(&space, &slug, channel).await?)?
        }
        Command::Last {
            slug,
            channel,
            majors,
            minors,
        } => serde_json::to_value(
            catalog
                .find_last_n_versions(&space, &slug, channel, majors, minors)
                .await?,
        )?,
        Command::Pending => serde_json::to_value(catalog.get_pending_versions(&space).await?)?,
        Command::Maintenance => {
            serde_json::to_value(catalog.get_apps_in_maintenance(&space).await?)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
