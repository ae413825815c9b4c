mod cli;

use cinesync::config::{self, Config};
use cinesync::sync::{SyncEngine, SyncEvent, ViewFilter, ViewSpec};
use cinesync::tmdb::{CatalogSource, TmdbClient};
use cinesync_common::{ExternalId, QueryKind, SortField, SortSpec, UserId};
use cinesync_db::models::CatalogEntity;
use cinesync_db::pool::init_pool;
use cinesync_db::store::CatalogStore;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, UserArgs};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "cinesync=trace,cinesync_db=debug,cinesync_common=debug".to_string()
        } else {
            "cinesync=warn,cinesync_db=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("cinesync {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        command => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let db_path = cli
                .database
                .clone()
                .unwrap_or_else(|| config.database.path.clone());
            let store = open_store(&db_path)?;
            run_command(command, config, store)
        }
    }
}

fn run_command(command: Commands, config: Config, store: CatalogStore) -> Result<()> {
    match command {
        Commands::Sync { query, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_sync(config, store, query, json))
        }
        Commands::List {
            genre,
            search,
            sort,
            user,
            json,
        } => list_movies(&store, genre, search, &sort, user.as_deref(), json),
        Commands::Genres => {
            for genre in store.distinct_genres()? {
                println!("{}", genre);
            }
            Ok(())
        }
        Commands::Register { username, password } => {
            let user = store.register_user(&username, &password)?;
            println!("Registered user {} (id {})", user.username, user.id);
            Ok(())
        }
        Commands::Favorite { user, id } => {
            let user_id = authenticate(&store, &user)?;
            let on = store.toggle_favorite(user_id, ExternalId::new(id))?;
            println!(
                "Movie {} {} favorites",
                id,
                if on { "added to" } else { "removed from" }
            );
            Ok(())
        }
        Commands::Watch { user, id } => {
            let user_id = authenticate(&store, &user)?;
            let on = store.toggle_watchlist(user_id, ExternalId::new(id))?;
            println!(
                "Movie {} {} watchlist",
                id,
                if on { "added to" } else { "removed from" }
            );
            Ok(())
        }
        Commands::Favorites { user } => {
            let user_id = authenticate(&store, &user)?;
            print_movies(&store.favorites(user_id, SortSpec::by(SortField::Title))?, false)
        }
        Commands::Watchlist { user } => {
            let user_id = authenticate(&store, &user)?;
            print_movies(&store.watchlist(user_id, SortSpec::by(SortField::Title))?, false)
        }
        Commands::Rate { id, rating } => {
            let local_id = store
                .local_id(ExternalId::new(id))?
                .with_context(|| format!("Movie {} is not in the catalog", id))?;
            let average = store.record_rating(local_id, rating)?;
            println!("Movie {} now rated {:.1}", id, average);
            Ok(())
        }
        Commands::Info { id } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(show_info(&config, ExternalId::new(id)))
        }
        Commands::Validate { .. } | Commands::Version => Ok(()),
    }
}

fn open_store(path: &Path) -> Result<CatalogStore> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
    }
    tracing::debug!("Opening catalog database at {}", path.display());
    let pool = init_pool(&path.to_string_lossy())?;
    Ok(CatalogStore::new(pool))
}

fn authenticate(store: &CatalogStore, args: &UserArgs) -> Result<UserId> {
    let user = store
        .verify_user(&args.user, &args.password)?
        .context("Invalid username or password")?;
    Ok(user.id)
}

fn tmdb_client(config: &Config) -> Result<TmdbClient> {
    let client = TmdbClient::new(&config.tmdb);
    if !client.has_api_key() {
        anyhow::bail!(
            "TMDb API key is not set; add [tmdb].api_key to the config file or set {}",
            config::API_KEY_ENV
        );
    }
    Ok(client)
}

async fn run_sync(
    config: Config,
    store: CatalogStore,
    query: Option<String>,
    json: bool,
) -> Result<()> {
    let client = tmdb_client(&config)?;
    let query = QueryKind::from_text(query.as_deref().unwrap_or_default());

    let mut sync_config = config.sync.clone();
    sync_config.autoload = false;

    tracing::info!(query = %query, "Starting sync");
    let (engine, handle) = SyncEngine::new(
        sync_config,
        config.tmdb.image_base_url.clone(),
        Arc::new(client),
        store.clone(),
    );
    let mut events = handle.subscribe();
    handle.load_catalog(query).await?;
    let task = engine.spawn();

    let mut started = false;
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event consumer fell behind");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        if json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            print_event(&event);
        }

        match event {
            SyncEvent::LoadStarted { .. } => started = true,
            SyncEvent::Idle if started => break,
            _ => {}
        }
    }

    handle.shutdown().await?;
    task.await?;

    if !json {
        println!("{} movies in catalog", store.count()?);
    }
    Ok(())
}

fn print_event(event: &SyncEvent) {
    match event {
        SyncEvent::Status { message } => println!("{}", message),
        SyncEvent::Progress { persisted, target } => {
            println!("Loaded {}/{} movies", persisted, target)
        }
        SyncEvent::Error { message } => eprintln!("Error: {}", message),
        SyncEvent::BulkComplete { persisted } => {
            println!("Bulk load complete: {} movies", persisted)
        }
        _ => {}
    }
}

fn list_movies(
    store: &CatalogStore,
    genre: Option<String>,
    search: Option<String>,
    sort: &str,
    user: Option<&str>,
    json: bool,
) -> Result<()> {
    let field: SortField = sort.parse().map_err(anyhow::Error::msg)?;
    let user = match user {
        Some(name) => Some(
            store
                .user_id(name)?
                .with_context(|| format!("Unknown user: {}", name))?,
        ),
        None => None,
    };

    let filter = match (genre, search) {
        (Some(genre), _) => ViewFilter::Genre(genre),
        (None, Some(text)) => ViewFilter::Search(text),
        (None, None) => ViewFilter::All,
    };

    let view = ViewSpec {
        filter,
        sort: SortSpec::by(field),
        user,
    };
    print_movies(&view.rebuild(store)?, json)
}

fn print_movies(movies: &[CatalogEntity], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(movies)?);
        return Ok(());
    }

    if movies.is_empty() {
        println!("No movies found");
        return Ok(());
    }

    for movie in movies {
        let year = match movie.release_year {
            0 => "----".to_string(),
            y => y.to_string(),
        };
        let runtime = match movie.runtime_minutes {
            0 => "-".to_string(),
            m => format!("{}m", m),
        };
        let mut flags = String::new();
        if movie.is_favorite {
            flags.push('F');
        }
        if movie.is_in_watchlist {
            flags.push('W');
        }
        println!(
            "{:>8}  {:<40} {}  {:>4.1}  {:>5}  {:<2} {}",
            movie.external_id.get(),
            movie.title,
            year,
            movie.rating_average,
            runtime,
            flags,
            movie.genres.join(", ")
        );
    }

    Ok(())
}

async fn show_info(config: &Config, id: ExternalId) -> Result<()> {
    let client = tmdb_client(config)?;

    let (detail, credits, trailer) =
        futures::join!(client.movie_detail(id), client.credits(id), client.trailer(id));
    let detail = detail?;

    println!("{} ({})", detail.title.as_deref().unwrap_or("Untitled"), id);
    if let Some(date) = &detail.release_date {
        println!("Released: {}", date);
    }
    if let Some(runtime) = detail.runtime.filter(|m| *m > 0) {
        println!("Runtime: {} minutes", runtime);
    }
    if let Some(rating) = detail.vote_average {
        println!("Rating: {:.1}", rating);
    }
    if let Some(genres) = &detail.genres {
        let names: Vec<_> = genres.iter().map(|g| g.name.as_str()).collect();
        println!("Genres: {}", names.join(", "));
    }

    match credits {
        Ok(credits) => {
            let crew = [
                ("Directed by", &credits.directors),
                ("Written by", &credits.writers),
                ("Produced by", &credits.producers),
                ("Cinematography", &credits.cinematographers),
                ("Music", &credits.composers),
            ];
            for (label, names) in crew {
                if !names.is_empty() {
                    println!("{}: {}", label, names.join(", "));
                }
            }
            if !credits.cast.is_empty() {
                println!("\nCast:");
                for member in credits.cast.iter().take(10) {
                    if member.character.is_empty() {
                        println!("  {}", member.name);
                    } else {
                        println!("  {} as {}", member.name, member.character);
                    }
                }
            }
        }
        Err(e) => tracing::warn!(error = %e, "Failed to fetch credits"),
    }

    match trailer {
        Ok(Some(url)) => println!("\nTrailer: {}", url),
        Ok(None) => println!("\nNo trailer available"),
        Err(e) => tracing::warn!(error = %e, "Failed to find trailer"),
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::load_config_or_default(None)?
        }
    };

    println!("  TMDb: {} ({})", config.tmdb.base_url, config.tmdb.language);
    println!(
        "  API key: {}",
        if config.tmdb.api_key.is_empty() {
            "not set"
        } else {
            "set"
        }
    );
    println!("  Database: {}", config.database.path.display());
    println!("  Target: {} movies", config.sync.target_count);
    println!(
        "  Pages: {} browse, {} search, {} per batch",
        config.sync.browse_pages, config.sync.search_pages, config.sync.batch_pages
    );
    println!(
        "  Detail concurrency: {}",
        config.sync.max_concurrent_details
    );

    Ok(())
}
