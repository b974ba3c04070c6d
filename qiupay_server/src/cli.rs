use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // Any argument at all prints the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Secrets are never printed
    const DISPLAY_ENVS: [&str; 12] = [
        "RUST_LOG",
        "QPG_HOST",
        "QPG_PORT",
        "QPG_DATABASE_URL",
        "QPG_ORDER_TIMEOUT",
        "QPG_POLL_INTERVAL",
        "QPG_POLL_MAX_BACKOFF",
        "QPG_BILL_SOURCE_URL",
        "QPG_BILL_SOURCE_TIMEOUT",
        "QPG_CALLBACK_TIMEOUT",
        "QPG_CALLBACK_INTERVAL",
        "QPG_ADMIN_HMAC_CHECKS",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
