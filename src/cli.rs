use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cinesync")]
#[command(author, version, about = "TMDb movie catalog synchronization")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the catalog database (overrides the config file)
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Credentials for commands that act on a user's lists.
#[derive(Args, Debug, Clone)]
pub struct UserArgs {
    /// Username
    #[arg(short, long)]
    pub user: String,

    /// Password
    #[arg(short, long)]
    pub password: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Pull movies from TMDb into the local catalog
    Sync {
        /// Search text; browses popular movies when omitted
        #[arg(short, long)]
        query: Option<String>,

        /// Print engine events as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// List movies in the local catalog
    List {
        /// Only movies with this genre
        #[arg(short, long, conflicts_with = "search")]
        genre: Option<String>,

        /// Only movies whose title contains this text
        #[arg(short, long)]
        search: Option<String>,

        /// Sort by title, year, rating or runtime
        #[arg(long, default_value = "year")]
        sort: String,

        /// Show favorite/watchlist flags for this user
        #[arg(long)]
        user: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the genres present in the local catalog
    Genres,

    /// Create a user account
    Register {
        /// Username
        username: String,

        /// Password
        #[arg(short, long)]
        password: String,
    },

    /// Toggle a movie in a user's favorites
    Favorite {
        #[command(flatten)]
        user: UserArgs,

        /// TMDb movie id
        id: i64,
    },

    /// Toggle a movie in a user's watchlist
    Watch {
        #[command(flatten)]
        user: UserArgs,

        /// TMDb movie id
        id: i64,
    },

    /// Show a user's favorites
    Favorites {
        #[command(flatten)]
        user: UserArgs,
    },

    /// Show a user's watchlist
    Watchlist {
        #[command(flatten)]
        user: UserArgs,
    },

    /// Rate a movie from 0 to 10
    Rate {
        /// TMDb movie id
        id: i64,

        /// Rating between 0 and 10
        rating: f64,
    },

    /// Show details, cast, and trailer for one movie
    Info {
        /// TMDb movie id
        id: i64,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
