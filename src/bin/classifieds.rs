//! Command-line access to the classifieds marketplace API.
//!
//! # Usage
//!
//! ```bash
//! # List categories
//! classifieds categories
//!
//! # Search listings by title
//! classifieds search rower
//!
//! # Show one listing
//! classifieds ad 3f2c9d
//!
//! # Sign in first, then show the signed-in user and their favorites
//! classifieds --email jan@example.com --password secret me
//! classifieds --email jan@example.com --password secret favorites
//! ```
//!
//! Results are printed as JSON.  Set `RUST_LOG=classifieds=debug` (or pass `--verbose`) to see
//! session refresh activity.

use arrrg::CommandLine;
use tracing_subscriber::EnvFilter;

use classifieds::{AdSearchParams, ClientArgs, ClientConfig, LoginRequest, Marketplace};

/// What to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Categories,
    Search(Option<String>),
    Ad(String),
    Me,
    Favorites,
    Chats,
}

impl Command {
    fn parse(free: &[String]) -> Result<Self, String> {
        let Some((name, rest)) = free.split_first() else {
            return Err("missing command".to_string());
        };
        match (name.as_str(), rest) {
            ("categories", []) => Ok(Command::Categories),
            ("search", []) => Ok(Command::Search(None)),
            ("search", terms) => Ok(Command::Search(Some(terms.join(" ")))),
            ("ad", [id]) => Ok(Command::Ad(id.clone())),
            ("me", []) => Ok(Command::Me),
            ("favorites", []) => Ok(Command::Favorites),
            ("chats", []) => Ok(Command::Chats),
            _ => Err(format!(
                "invalid command: {}. Valid commands: categories, search [TITLE], ad ID, me, favorites, chats",
                free.join(" ")
            )),
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("classifieds=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    // A second initialization is harmless; keep whichever subscriber won.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, free) = ClientArgs::from_command_line_relaxed("classifieds [OPTIONS] <COMMAND>");
    init_tracing(args.verbose);

    let command = match Command::parse(&free) {
        Ok(command) => command,
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    };

    let config = ClientConfig::from_args(&args)?;
    let marketplace = Marketplace::new(&config)?;

    match (&args.email, &args.password) {
        (Some(email), Some(password)) => {
            marketplace
                .login(&LoginRequest::new(email.clone(), password.clone()))
                .await?;
        }
        (Some(_), None) | (None, Some(_)) => {
            eprintln!("Error: --email and --password must be given together");
            std::process::exit(1);
        }
        (None, None) => {}
    }

    match command {
        Command::Categories => print_json(&marketplace.categories().await?)?,
        Command::Search(title) => {
            let mut params = AdSearchParams::new();
            if let Some(title) = title {
                params = params.with_title(title);
            }
            print_json(&marketplace.search_advertisements(&params).await?)?
        }
        Command::Ad(id) => print_json(&marketplace.advertisement(&id).await?)?,
        Command::Me => print_json(&marketplace.current_user().await?)?,
        Command::Favorites => print_json(&marketplace.favorites().await?)?,
        Command::Chats => print_json(&marketplace.chat_summaries().await?)?,
    }

    if args.email.is_some() {
        marketplace.logout().await;
    }
    Ok(())
}
