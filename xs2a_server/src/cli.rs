use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
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
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets. XS2A_SERVER_KEY is
    // deliberately absent.
    const DISPLAY_ENVS: [&str; 13] = [
        "RUST_LOG",
        "XS2A_HOST",
        "XS2A_PORT",
        "XS2A_DATABASE_URL",
        "XS2A_TRUSTED_ROOTS",
        "XS2A_TRUSTED_INTERMEDIATES",
        "XS2A_BLOCKED_CERTIFICATES",
        "XS2A_SIGNING_BASKET_SUPPORTED",
        "XS2A_AUTHORISATION_TTL",
        "XS2A_EXPIRY_CHECK_INTERVAL",
        "XS2A_QWAC_HEADER",
        "XS2A_USE_X_FORWARDED_FOR",
        "XS2A_USE_FORWARDED",
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
