pub mod init;
pub mod migrate;
pub mod seed;
pub mod serve;
pub mod user;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "jotter")]
#[command(version)]
#[command(about = "A small blog content service", long_about = None)]
pub struct Cli {
    #[arg(short, long, default_value = "jotter.toml", env = "JOTTER_CONFIG")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a config file and data directory
    Init {
        #[arg(default_value = ".")]
        path: PathBuf,
        #[arg(long)]
        name: Option<String>,
    },
    /// Run the JSON API server
    Serve {
        /// Overrides `server.host` from the config file
        #[arg(short = 'H', long)]
        host: Option<String>,
        /// Overrides `server.port` from the config file
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Apply pending database migrations
    Migrate,
    /// Manage user accounts
    User {
        #[command(subcommand)]
        command: UserCommand,
    },
    /// Insert a few sample posts
    Seed {
        /// Username the sample posts are attributed to
        #[arg(long)]
        author: String,
    },
}

#[derive(Subcommand)]
pub enum UserCommand {
    Add {
        #[arg(long)]
        username: String,
        #[arg(long, default_value = "")]
        email: String,
        /// Staff accounts may create, edit and delete posts
        #[arg(long)]
        staff: bool,
        #[arg(long)]
        password: Option<String>,
    },
    List,
    Remove {
        username: String,
    },
    Passwd {
        username: String,
    },
}
