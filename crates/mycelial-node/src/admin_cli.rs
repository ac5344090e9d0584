//! strike-admin CLI tool
//!
//! Steward commands for a running strike-node.
//!
//! Usage:
//!   strike-admin cancel-strike <strike_id> <steward> <reason>
//!   strike-admin cancel-alert <alert_id> <steward> <reason>
//!   strike-admin adjust-severity <strike_id> <severity> <steward> <reason>
//!   strike-admin whitelist <user_id> <steward> <reason> [abuse_type] [days|permanent]
//!   strike-admin enforce <alert_id> <steward> <reason>
//!   strike-admin set-trust <fingerprint> <score>
//!   strike-admin review-queue
//!   strike-admin status <user_id>
//!   strike-admin fingerprint
//!   strike-admin ping

use mycelial_node::admin_socket::default_socket_path;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

/// Admin command sent over the socket.
#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum AdminCommand {
    Override {
        strike_id: String,
        steward: String,
        action: Value,
        reason: String,
    },
    Whitelist {
        user_id: String,
        steward: String,
        reason: String,
        abuse_type: Option<String>,
        permanent: bool,
        days: Option<u32>,
    },
    CancelAlert {
        alert_id: String,
        steward: String,
        reason: String,
    },
    EnforceAlert {
        alert_id: String,
        steward: String,
        reason: String,
    },
    SetTrust {
        fingerprint: String,
        score: f64,
    },
    ReviewQueue,
    Status {
        user_id: String,
    },
    Fingerprint,
    Ping,
}

/// Response from admin command.
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum AdminResponse {
    Ok { message: String },
    Error { error: String },
    List { items: Vec<String> },
    Report { report: Value },
    Pong,
}

fn print_usage() {
    eprintln!("strike-admin - Steward commands for a Mycelial Strike node");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  strike-admin cancel-strike <strike_id> <steward> <reason>       End a strike");
    eprintln!("  strike-admin cancel-alert <alert_id> <steward> <reason>         Cancel an alert and its strikes");
    eprintln!("  strike-admin adjust-severity <strike_id> <1-10> <steward> <reason>");
    eprintln!("  strike-admin whitelist <user_id> <steward> <reason> [abuse_type] [days|permanent]");
    eprintln!("  strike-admin enforce <alert_id> <steward> <reason>              Strike from a held alert");
    eprintln!("  strike-admin set-trust <fingerprint> <score>                    Set a node's trust (0-1)");
    eprintln!("  strike-admin review-queue                                       List held alerts");
    eprintln!("  strike-admin status <user_id>                                   Show a user's strike status");
    eprintln!("  strike-admin fingerprint                                        Show this node's fingerprint");
    eprintln!("  strike-admin ping                                               Check if daemon is running");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  STRIKE_SOCKET  Path to admin socket (default: $STRIKE_DATA_DIR/admin.sock)");
}

fn get_socket_path() -> PathBuf {
    std::env::var("STRIKE_SOCKET")
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_socket_path())
}

fn send_command(cmd: AdminCommand) -> Result<AdminResponse, String> {
    let socket_path = get_socket_path();

    let mut stream = UnixStream::connect(&socket_path).map_err(|e| {
        format!(
            "Failed to connect to strike-node at {:?}: {}\n\
             Is the strike-node running?",
            socket_path, e
        )
    })?;

    let cmd_json = serde_json::to_string(&cmd).map_err(|e| e.to_string())?;
    writeln!(stream, "{}", cmd_json).map_err(|e| e.to_string())?;

    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .map_err(|e| e.to_string())?;

    serde_json::from_str(&response_line).map_err(|e| format!("Invalid response: {}", e))
}

/// Arguments from index `from` on, or exit with a usage error.
fn require(args: &[String], from: usize, count: usize, usage: &str) -> Vec<String> {
    if args.len() < from + count {
        eprintln!("Error: usage: strike-admin {}", usage);
        std::process::exit(1);
    }
    args[from..].to_vec()
}

fn parse_command(args: &[String]) -> AdminCommand {
    match args[1].as_str() {
        "cancel-strike" => {
            let a = require(args, 2, 3, "cancel-strike <strike_id> <steward> <reason>");
            AdminCommand::Override {
                strike_id: a[0].clone(),
                steward: a[1].clone(),
                action: json!({ "action": "cancel-strike" }),
                reason: a[2..].join(" "),
            }
        }
        "cancel-alert" => {
            let a = require(args, 2, 3, "cancel-alert <alert_id> <steward> <reason>");
            AdminCommand::CancelAlert {
                alert_id: a[0].clone(),
                steward: a[1].clone(),
                reason: a[2..].join(" "),
            }
        }
        "adjust-severity" => {
            let a = require(args, 2, 4, "adjust-severity <strike_id> <1-10> <steward> <reason>");
            let severity: u8 = a[1].parse().unwrap_or_else(|_| {
                eprintln!("Error: severity must be a number from 1 to 10");
                std::process::exit(1);
            });
            AdminCommand::Override {
                strike_id: a[0].clone(),
                steward: a[2].clone(),
                action: json!({ "action": "adjust-severity", "severity": severity }),
                reason: a[3..].join(" "),
            }
        }
        "whitelist" => {
            let a = require(args, 2, 3, "whitelist <user_id> <steward> <reason> [abuse_type] [days|permanent]");
            let abuse_type = a.get(3).cloned().filter(|t| t != "all");
            let (permanent, days) = match a.get(4).map(String::as_str) {
                Some("permanent") => (true, None),
                Some(days) => match days.parse() {
                    Ok(d) => (false, Some(d)),
                    Err(_) => {
                        eprintln!("Error: expected a number of days or 'permanent', got {}", days);
                        std::process::exit(1);
                    }
                },
                None => (false, None),
            };
            AdminCommand::Whitelist {
                user_id: a[0].clone(),
                steward: a[1].clone(),
                reason: a[2].clone(),
                abuse_type,
                permanent,
                days,
            }
        }
        "enforce" => {
            let a = require(args, 2, 3, "enforce <alert_id> <steward> <reason>");
            AdminCommand::EnforceAlert {
                alert_id: a[0].clone(),
                steward: a[1].clone(),
                reason: a[2..].join(" "),
            }
        }
        "set-trust" => {
            let a = require(args, 2, 2, "set-trust <fingerprint> <score>");
            let score: f64 = a[1].parse().unwrap_or_else(|_| {
                eprintln!("Error: score must be a number between 0 and 1");
                std::process::exit(1);
            });
            AdminCommand::SetTrust {
                fingerprint: a[0].clone(),
                score,
            }
        }
        "review-queue" => AdminCommand::ReviewQueue,
        "status" => {
            let a = require(args, 2, 1, "status <user_id>");
            AdminCommand::Status { user_id: a[0].clone() }
        }
        "fingerprint" => AdminCommand::Fingerprint,
        "ping" => AdminCommand::Ping,
        "-h" | "--help" | "help" => {
            print_usage();
            std::process::exit(0);
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
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

    let cmd = parse_command(&args);

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
            AdminResponse::Report { report } => match serde_json::to_string_pretty(&report) {
                Ok(text) => println!("{}", text),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            },
            AdminResponse::Pong => {
                println!("pong - strike-node is running");
            }
        },
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
