//! grid-admin CLI tool
//!
//! Owner operations for a running grid-node.
//!
//! Usage:
//!   grid-admin init-column <column> <color>
//!   grid-admin finish-init
//!   grid-admin grant <identity>
//!   grid-admin revoke <identity>
//!   grid-admin pause
//!   grid-admin resume
//!   grid-admin access-checks <on|off>
//!   grid-admin whitelist
//!   grid-admin has-access <identity>
//!   grid-admin requests
//!   grid-admin status
//!   grid-admin ping

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use tessera_ledger::admin_socket::AdminResponse;

fn print_usage() {
    eprintln!("grid-admin - Owner operations for a grid-node");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  grid-admin init-column <column> <color>  Paint a whole column during initialization");
    eprintln!("  grid-admin finish-init                   Close the initialization phase");
    eprintln!("  grid-admin grant <identity>              Add an identity to the whitelist");
    eprintln!("  grid-admin revoke <identity>             Remove an identity from the whitelist");
    eprintln!("  grid-admin pause                         Reject all edits");
    eprintln!("  grid-admin resume                        Accept edits again");
    eprintln!("  grid-admin access-checks <on|off>        Toggle whitelist enforcement");
    eprintln!("  grid-admin whitelist                     List whitelisted identities");
    eprintln!("  grid-admin has-access <identity>         Check if an identity is whitelisted");
    eprintln!("  grid-admin requests                      List access requests");
    eprintln!("  grid-admin status                        Show grid status");
    eprintln!("  grid-admin ping                          Check if daemon is running");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  GRID_SOCKET  Path to admin socket (default: ./grid-data/admin.sock)");
}

fn get_socket_path() -> PathBuf {
    std::env::var("GRID_SOCKET")
        .map(PathBuf::from)
        .unwrap_or_else(|_| tessera_ledger::admin_socket::default_socket_path())
}

fn send_command(cmd: Value) -> Result<AdminResponse, String> {
    let socket_path = get_socket_path();

    let mut stream = UnixStream::connect(&socket_path).map_err(|e| {
        format!(
            "Failed to connect to grid-node at {:?}: {}\n\
             Is the grid-node running?",
            socket_path, e
        )
    })?;

    // Send command
    writeln!(stream, "{}", cmd).map_err(|e| e.to_string())?;

    // Read response
    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .map_err(|e| e.to_string())?;

    serde_json::from_str(&response_line).map_err(|e| format!("Invalid response: {}", e))
}

fn required<'a>(args: &'a [String], index: usize, what: &str) -> &'a str {
    match args.get(index) {
        Some(arg) => arg,
        None => {
            eprintln!("Error: {} requires a {} argument", args[1], what);
            std::process::exit(1);
        }
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    // The socket validates identities and colors; the CLI only shapes the JSON.
    let cmd = match args[1].as_str() {
        "init-column" => {
            let column: u32 = match required(&args, 2, "column").parse() {
                Ok(column) => column,
                Err(_) => {
                    eprintln!("Error: column must be a number");
                    std::process::exit(1);
                }
            };
            let color = required(&args, 3, "color");
            json!({ "cmd": "init_column", "column": column, "color": color })
        }
        "finish-init" => json!({ "cmd": "finish_init" }),
        "grant" => json!({ "cmd": "grant_access", "identity": required(&args, 2, "identity") }),
        "revoke" => json!({ "cmd": "revoke_access", "identity": required(&args, 2, "identity") }),
        "pause" => json!({ "cmd": "pause" }),
        "resume" => json!({ "cmd": "resume" }),
        "access-checks" => {
            let enabled = match required(&args, 2, "on|off") {
                "on" | "true" => true,
                "off" | "false" => false,
                other => {
                    eprintln!("Error: expected on or off, got {}", other);
                    std::process::exit(1);
                }
            };
            json!({ "cmd": "set_access_checks", "enabled": enabled })
        }
        "whitelist" => json!({ "cmd": "list_whitelist" }),
        "has-access" => json!({ "cmd": "has_access", "identity": required(&args, 2, "identity") }),
        "requests" => json!({ "cmd": "list_access_requests" }),
        "status" => json!({ "cmd": "status" }),
        "ping" => json!({ "cmd": "ping" }),
        "-h" | "--help" | "help" => {
            print_usage();
            std::process::exit(0);
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(1);
        }
    };

    match send_command(cmd) {
        Ok(response) => match response {
            AdminResponse::Ok { message } => {
                println!("{}", message);
            }
            AdminResponse::Error { error } => {
                eprintln!("Error: {}", error);
                std::process::exit(1);
            }
            AdminResponse::List { items } => {
                if items.is_empty() {
                    println!("(none)");
                } else {
                    for item in items {
                        println!("{}", item);
                    }
                }
            }
            AdminResponse::Bool { value } => {
                println!("{}", value);
                if !value {
                    std::process::exit(1);
                }
            }
            AdminResponse::Pong => {
                println!("pong - grid-node is running");
            }
        },
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
