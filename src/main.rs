//! shelfish CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use shelfish::{
    catalog::{
        BookUpdate, Catalog, ListOptions, OwnedStatus, Page, ReadStatus, SortBy, SortOrder,
        StatusChange, StatusFilter,
    },
    commands::{
        cmd_activity, cmd_add, cmd_edit, cmd_enqueue_enrichment, cmd_enqueue_feed_syncs,
        cmd_init, cmd_jobs_count, cmd_jobs_list, cmd_list_books, cmd_mark, cmd_run_next,
        cmd_search, cmd_serve, cmd_show, cmd_status, cmd_sync, print_activity, print_book_detail,
        print_books, print_init, print_job_counts, print_jobs, print_run_outcome, print_status,
        print_sync_report,
    },
    config::Config,
    error::Result,
    feed::{FeedImporter, FeedName},
    jobs::JobQueue,
    scrape::Scraper,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "shelfish")]
#[command(version, about = "Personal book catalog fed by reading-list RSS feeds", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize shelfish configuration and database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Import the reading-list feeds
    Sync {
        /// Only sync this list (read, toread, reading)
        #[arg(long)]
        feed: Option<FeedName>,
    },

    /// List books
    Books {
        /// Only books with this read status (read, not-read, reading)
        #[arg(long)]
        read: Option<ReadStatus>,

        /// Only books with this owned status (owned, not-owned, on-loan, wanted)
        #[arg(long)]
        owned: Option<OwnedStatus>,

        /// Sort by the latest read or owned event
        #[arg(long, default_value = "read")]
        sort: SortBy,

        /// Sort order (asc, desc)
        #[arg(long, default_value = "desc")]
        order: SortOrder,

        /// Maximum number of books
        #[arg(short, long, default_value = "50")]
        limit: i64,

        /// Books to skip
        #[arg(long, default_value = "0")]
        offset: i64,

        /// List every matching book, ignoring --limit and --offset
        #[arg(long)]
        all: bool,
    },

    /// Search books by title
    Search {
        /// Title fragment
        query: String,
    },

    /// Show a book and its history
    Show {
        /// Book ID
        id: i64,
    },

    /// Record a read or owned status change
    Mark {
        /// Book ID
        id: i64,

        /// New read status
        #[arg(long, conflicts_with = "owned", required_unless_present = "owned")]
        read: Option<ReadStatus>,

        /// New owned status
        #[arg(long)]
        owned: Option<OwnedStatus>,
    },

    /// Edit book fields (omitted fields are left unchanged)
    Edit {
        /// Book ID
        id: i64,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        author: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        image_url: Option<String>,

        #[arg(long)]
        isbn: Option<String>,

        #[arg(long)]
        isbn13: Option<String>,

        #[arg(long)]
        asin: Option<String>,

        #[arg(long)]
        oku_id: Option<String>,

        #[arg(long)]
        goodreads_id: Option<String>,

        #[arg(long)]
        amazon_id: Option<String>,
    },

    /// Look up a book by ISBN and add it to the catalog
    Add {
        /// ISBN or other identifier accepted by the book site search
        identifier: String,

        /// Initial read status
        #[arg(long, default_value = "not-read")]
        read: ReadStatus,

        /// Initial owned status
        #[arg(long, default_value = "not-owned")]
        owned: OwnedStatus,
    },

    /// Show recent status events
    Activity {
        /// Include events setting this read status
        #[arg(long)]
        read: Option<ReadStatus>,

        /// Include events setting this owned status
        #[arg(long)]
        owned: Option<OwnedStatus>,

        /// Maximum number of events
        #[arg(short, long, default_value = "20")]
        limit: i64,

        /// Events to skip
        #[arg(long, default_value = "0")]
        offset: i64,
    },

    /// Show catalog and job queue statistics
    Status,

    /// Inspect and drive the job queue
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },

    /// Sync feeds, then run the background job worker until Ctrl-C
    Serve,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum JobsAction {
    /// List all jobs
    List,

    /// Count jobs per status
    Count,

    /// Replace pending enrichment jobs with one per unenriched book
    Enqueue,

    /// Replace pending feed sync jobs with one per list
    EnqueueFeeds,

    /// Run the oldest pending job
    RunNext,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Handle init command specially (doesn't need existing config)
    if let Commands::Init { force } = cli.command {
        let base_dir = cli.config.as_deref().map(config_base_dir);
        let info = cmd_init(base_dir, force).await?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&info)?);
        } else {
            print_init(&info);
        }
        return Ok(());
    }

    // Handle completions command (doesn't need config/db)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "shelfish", &mut std::io::stdout());
        return Ok(());
    }

    // Load configuration
    let config = load_config(cli.config.as_deref())?;

    // Initialize components
    let catalog = Catalog::connect(&config).await?;
    let scraper = Scraper::new(&config.scrape)?;
    let importer = FeedImporter::new(catalog.clone(), config.feed.clone())?;
    let queue = JobQueue::new(catalog.clone(), Arc::new(scraper.clone()))
        .with_importer(importer.clone());

    // Handle commands
    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Sync { feed } => {
            let report = cmd_sync(&importer, feed).await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_sync_report(&report);
            }
        }

        Commands::Books {
            read,
            owned,
            sort,
            order,
            limit,
            offset,
            all,
        } => {
            let options = ListOptions {
                filter: StatusFilter { read, owned },
                sort_by: sort,
                order,
                page: (!all).then_some(Page { limit, offset }),
            };
            let books = cmd_list_books(&catalog, &options).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&books)?);
            } else {
                print_books(&books);
            }
        }

        Commands::Search { query } => {
            let books = cmd_search(&catalog, &query).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&books)?);
            } else {
                print_books(&books);
            }
        }

        Commands::Show { id } => {
            let detail = cmd_show(&catalog, id).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&detail)?);
            } else {
                print_book_detail(&detail);
            }
        }

        Commands::Mark { id, read, owned } => {
            let book = cmd_mark(&catalog, id, StatusChange { read, owned }).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&book)?);
            } else {
                println!(
                    "✓ '{}' is now {} / {}",
                    book.title, book.status_read, book.status_owned
                );
            }
        }

        Commands::Edit {
            id,
            title,
            author,
            description,
            image_url,
            isbn,
            isbn13,
            asin,
            oku_id,
            goodreads_id,
            amazon_id,
        } => {
            let update = BookUpdate {
                title,
                author,
                description,
                image_url,
                isbn,
                isbn13,
                asin,
                oku_id,
                goodreads_id,
                amazon_id,
            };
            let book = cmd_edit(&catalog, id, &update).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&book)?);
            } else {
                println!("✓ Updated book {}: {}", book.id, book.title);
            }
        }

        Commands::Add {
            identifier,
            read,
            owned,
        } => {
            let book = cmd_add(&catalog, &scraper, &identifier, read, owned).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&book)?);
            } else {
                println!("✓ Added book {}: {}", book.id, book.title);
            }
        }

        Commands::Activity {
            read,
            owned,
            limit,
            offset,
        } => {
            let entries =
                cmd_activity(&catalog, StatusFilter { read, owned }, Page { limit, offset })
                    .await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                print_activity(&entries);
            }
        }

        Commands::Status => {
            let status = cmd_status(&config, &catalog, &queue).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }

        Commands::Jobs { action } => {
            handle_jobs_action(&queue, action, cli.json).await?;
        }

        Commands::Serve => {
            cmd_serve(&config, &importer, queue).await?;
        }
    }

    catalog.close().await;
    Ok(())
}

async fn handle_jobs_action(queue: &JobQueue, action: JobsAction, json: bool) -> Result<()> {
    match action {
        JobsAction::List => {
            let jobs = cmd_jobs_list(queue).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&jobs)?);
            } else {
                print_jobs(&jobs);
            }
        }
        JobsAction::Count => {
            let counts = cmd_jobs_count(queue).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&counts)?);
            } else {
                print_job_counts(&counts);
            }
        }
        JobsAction::Enqueue => {
            let count = cmd_enqueue_enrichment(queue).await?;
            if json {
                println!(r#"{{"queued": {}}}"#, count);
            } else {
                println!("✓ Queued {} enrichment job(s)", count);
            }
        }
        JobsAction::EnqueueFeeds => {
            let count = cmd_enqueue_feed_syncs(queue).await?;
            if json {
                println!(r#"{{"queued": {}}}"#, count);
            } else {
                println!("✓ Queued {} feed sync job(s)", count);
            }
        }
        JobsAction::RunNext => {
            let outcome = cmd_run_next(queue).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_run_outcome(&outcome);
            }
        }
    }

    Ok(())
}

/// Base directory for `init`: the parent of a `.toml` path, or the path itself
fn config_base_dir(path: &std::path::Path) -> PathBuf {
    if path.extension().map_or(false, |e| e == "toml") {
        path.parent()
            .map(PathBuf::from)
            .unwrap_or_else(Config::default_base_dir)
    } else {
        path.to_path_buf()
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        eprintln!(
            "Config file not found: {}\nRun 'shelfish init' first.",
            config_path.display()
        );
        std::process::exit(1);
    }

    Config::load(&config_path)
}
