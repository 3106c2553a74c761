//! grid-paint CLI tool
//!
//! Paint on a grid hosted by a grid-node.
//!
//! Usage:
//!   grid-paint keygen
//!   grid-paint identity
//!   grid-paint status
//!   grid-paint show [--json]
//!   grid-paint paint <row> <column> <color>
//!   grid-paint request-access <email>
//!   grid-paint watch

use tessera_client::{
    generate_key_file, read_key_file_identity, ClientConfig, EditError, RemoteLedger,
    RemoteSession,
};
use tessera_core::{Cell, Color, PALETTE};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type BoxError = Box<dyn std::error::Error>;

fn print_usage() {
    eprintln!("grid-paint - Paint on a Tessera grid");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  grid-paint keygen                        Create a signing key file");
    eprintln!("  grid-paint identity                      Show the identity of the key file");
    eprintln!("  grid-paint status                        Show grid policy and own access");
    eprintln!("  grid-paint show [--json]                 Print the grid");
    eprintln!("  grid-paint paint <row> <column> <color>  Paint one cell");
    eprintln!("  grid-paint request-access <email>        Ask the owner for access");
    eprintln!("  grid-paint watch                         Print edits as they are committed");
    eprintln!();
    eprintln!("Colors are #rrggbb, or p<N> for entry N of the default palette.");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  GRID_LEDGER_ADDR  Native wire address of the grid-node (default: 127.0.0.1:9100)");
    eprintln!("  GRID_ADDRESS      Grid id in hex, or \"latest\" (required)");
    eprintln!("  GRID_KEY_FILE     Signing key file (default: ./grid-key)");
    eprintln!("  GRID_RESYNC_MS    Full resync period in milliseconds (default: 1000)");
}

fn parse_color(arg: &str) -> Result<Color, String> {
    if let Some(index) = arg.strip_prefix('p') {
        let index: usize = index
            .parse()
            .map_err(|_| format!("Invalid palette index: {}", arg))?;
        return tessera_core::palette::lookup(index)
            .ok_or_else(|| format!("Palette has {} colors", PALETTE.len()));
    }
    arg.parse().map_err(|e| format!("{}", e))
}

fn parse_cell(row: &str, column: &str) -> Result<Cell, String> {
    let row = row.parse().map_err(|_| format!("Invalid row: {}", row))?;
    let column = column
        .parse()
        .map_err(|_| format!("Invalid column: {}", column))?;
    Ok(Cell::new(row, column))
}

fn describe(error: &EditError) -> &'static str {
    match error {
        EditError::EnvironmentMissing => "no signing key; run `grid-paint keygen` first",
        EditError::CapabilityDenied => "the signing key could not be used",
        EditError::AccessDenied => "this identity is not whitelisted; try `grid-paint request-access`",
        EditError::Inactive => "the grid is paused",
        EditError::UserRejectedSubmission => "the submission was cancelled",
        EditError::NetworkOrLedgerFailure(_) => "the ledger could not be reached",
        EditError::NoOp => "the cell already has that color",
    }
}

async fn show(config: &ClientConfig, json: bool) -> Result<(), BoxError> {
    let session = RemoteSession::connect(config).await?;
    let rows = session.display_rows().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("Grid {} ({})", session.grid_id(), session.dimensions());
    for row in rows {
        let line: Vec<String> = row.iter().map(|color| color.to_string()).collect();
        println!("{}", line.join(" "));
    }
    Ok(())
}

async fn status(config: &ClientConfig) -> Result<(), BoxError> {
    let ledger = RemoteLedger::new(config.ledger_addr);
    let policy = ledger.policy().await?;

    println!("Grid:          {}", policy.grid_id);
    println!("Owner:         {}", policy.owner);
    println!("Initialized:   {}", policy.initialized);
    println!("Active:        {}", policy.active);
    println!("Access checks: {}", policy.requires_access_checks);

    if let Ok(identity) = read_key_file_identity(&config.key_file) {
        let allowed = ledger.has_access(identity).await?;
        println!("Identity:      {}", identity);
        println!("Whitelisted:   {}", allowed);
    }
    Ok(())
}

async fn paint(config: &ClientConfig, cell: Cell, color: Color) -> Result<(), BoxError> {
    let session = RemoteSession::connect(config).await?;
    let edit = match session.paint(cell, color).await {
        Ok(edit) => edit,
        Err(e) => return Err(format!("{}: {}", describe(&e), e).into()),
    };
    println!("Painting {} {} ...", cell, color);

    tokio::select! {
        resolution = edit.resolution() => match resolution {
            Ok(confirmed) => {
                println!(
                    "Committed {} {} at sequence {}",
                    confirmed.cell, confirmed.color, confirmed.sequence
                );
                Ok(())
            }
            Err(e) => Err(format!("{}: {}", describe(&e), e).into()),
        },
        _ = tokio::signal::ctrl_c() => {
            println!("Stopped waiting; the edit may still be committed");
            Ok(())
        }
    }
}

async fn request_access(config: &ClientConfig, email: &str) -> Result<(), BoxError> {
    let session = RemoteSession::connect(config).await?;
    let message = format!("My email address is {}", email);
    if let Err(e) = session.request_access(&message).await {
        return Err(format!("{}: {}", describe(&e), e).into());
    }
    println!("Access request sent");
    Ok(())
}

async fn watch(config: &ClientConfig) -> Result<(), BoxError> {
    let session = RemoteSession::connect(config).await?;
    let mut events = session.engine().replica().observe();
    println!("Watching grid {}", session.grid_id());

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => println!(
                    "#{} {} {} by {}",
                    event.sequence, event.cell, event.color, event.signer
                ),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    println!("... {} edits skipped", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return Ok(()),
            },
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

async fn run(args: &[String]) -> Result<(), BoxError> {
    let command = args[1].as_str();

    if command == "keygen" {
        let path = std::env::var("GRID_KEY_FILE").unwrap_or_else(|_| "./grid-key".into());
        let identity = generate_key_file(&path)?;
        println!("Created {} for identity {}", path, identity);
        return Ok(());
    }

    let config = ClientConfig::from_env()?;

    match command {
        "identity" => println!("{}", read_key_file_identity(&config.key_file)?),
        "status" => status(&config).await?,
        "show" => show(&config, args.get(2).map(String::as_str) == Some("--json")).await?,
        "paint" => {
            if args.len() < 5 {
                return Err("paint requires <row> <column> <color>".into());
            }
            let cell = parse_cell(&args[2], &args[3])?;
            let color = parse_color(&args[4])?;
            paint(&config, cell, color).await?;
        }
        "request-access" => {
            let email = args.get(2).ok_or("request-access requires an <email>")?;
            request_access(&config, email).await?;
        }
        "watch" => watch(&config).await?,
        _ => return Err(format!("Unknown command: {}", command).into()),
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "grid_paint=warn,tessera_client=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args[1] == "-h" || args[1] == "--help" {
        print_usage();
        std::process::exit(1);
    }

    if let Err(e) = run(&args).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
