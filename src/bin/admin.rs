//! Tally Admin CLI
//!
//! Administration tool for managing accounts and tokens against the
//! server database.
//!
//! # Usage
//!
//! ```bash
//! tally-admin user add alice alice@example.com --password secret
//! tally-admin user list
//! tally-admin token issue alice
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use tally::config::Config;
use tally::db::{init_db, UserRepository};
use tally::server::TokenStore;

#[derive(Parser)]
#[command(name = "tally-admin")]
#[command(version)]
#[command(about = "Tally server administration tool")]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage users
    User(UserCommand),
    /// Manage login tokens
    Token(TokenCommand),
}

#[derive(Args)]
struct UserCommand {
    #[command(subcommand)]
    command: UserSubcommand,
}

#[derive(Subcommand)]
enum UserSubcommand {
    /// Add a new user
    Add {
        /// Username
        username: String,
        /// Email address
        email: String,
        /// Login password
        #[arg(long, short)]
        password: String,
    },
    /// List all users
    List,
}

#[derive(Args)]
struct TokenCommand {
    #[command(subcommand)]
    command: TokenSubcommand,
}

#[derive(Subcommand)]
enum TokenSubcommand {
    /// Issue a login token for a user
    Issue {
        /// Username
        username: String,
        /// Token lifetime in days (defaults to the configured TTL)
        #[arg(long)]
        ttl_days: Option<i64>,
    },
    /// Delete expired tokens
    Cleanup,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::load(cli.config)?;
    let pool = init_db(Some(config.database_path.clone())).await?;

    match cli.command {
        Commands::User(user_cmd) => match user_cmd.command {
            UserSubcommand::Add {
                username,
                email,
                password,
            } => {
                let users = UserRepository::new(pool);
                let user = users.create(&username, &email, &password).await?;
                println!("Added user: {}", user.username);
                println!("  Id: {}", user.id);
                println!("  Email: {}", user.email);
            }
            UserSubcommand::List => {
                let users = UserRepository::new(pool);
                let all = users.list().await?;

                if all.is_empty() {
                    println!("No users registered.");
                    return Ok(());
                }

                println!("{:<38} {:<20} {:<30}", "ID", "USERNAME", "EMAIL");
                println!("{}", "-".repeat(88));
                for user in &all {
                    println!("{:<38} {:<20} {:<30}", user.id, user.username, user.email);
                }
                println!();
                println!("Total: {} user(s)", all.len());
            }
        },
        Commands::Token(token_cmd) => match token_cmd.command {
            TokenSubcommand::Issue { username, ttl_days } => {
                let users = UserRepository::new(pool.clone());
                let user = users
                    .get_by_username(&username)
                    .await?
                    .ok_or_else(|| format!("User '{}' not found", username))?;

                let ttl_days = ttl_days.unwrap_or(config.token_ttl_days);
                let tokens = TokenStore::new(pool, ttl_days);
                let token = tokens.issue(user.id).await?;

                println!("Issued token for {} (valid {} days):", username, ttl_days);
                println!("{}", token);
            }
            TokenSubcommand::Cleanup => {
                let tokens = TokenStore::new(pool, config.token_ttl_days);
                let removed = tokens.cleanup_expired().await?;
                println!("Removed {} expired token(s)", removed);
            }
        },
    }

    Ok(())
}
