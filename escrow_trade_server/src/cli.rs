use std::{env, env::VarError};

/// The server takes no arguments. Passing any prints the help text and the current configuration.
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
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
    // ETG_CALLER_HMAC_SECRET is deliberately absent
    const DISPLAY_ENVS: [&str; 13] = [
        "RUST_LOG",
        "ETG_HOST",
        "ETG_PORT",
        "ETG_DATABASE_URL",
        "ETG_ESCROW_ADDRESS",
        "ETG_ASSET_CODE",
        "ETG_ASSET_DECIMALS",
        "ETG_ORACLE_URL",
        "ETG_RELEASE_URL",
        "ETG_UPSTREAM_TIMEOUT_SECS",
        "ETG_DEPOSIT_POLL_INTERVAL_SECS",
        "ETG_CALLER_HMAC_CHECKS",
        "ETG_MAX_MESSAGE_BYTES",
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
