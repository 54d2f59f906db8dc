//! Rule text validation CLI tool
//!
//! Checks a sysblock rule file the same way a save is gated, then prints
//! the rules the service would enforce.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let text = match args.get(1).map(String::as_str) {
        Some("-") => {
            let mut buf = String::new();
            if let Err(e) = std::io::stdin().read_to_string(&mut buf) {
                eprintln!("Error: failed to read stdin: {}", e);
                return ExitCode::from(1);
            }
            buf
        }
        Some(path) => {
            let path = PathBuf::from(path);
            match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    eprintln!("Error: cannot read {}: {}", path.display(), e);
                    return ExitCode::from(1);
                }
            }
        }
        None => {
            eprintln!("Usage: validate-config <rule-file | ->");
            eprintln!();
            eprintln!("Validates sysblock rule text. Use '-' to read from stdin.");
            eprintln!();
            eprintln!("Template:");
            for line in sysblock_config::default_config_text().lines() {
                eprintln!("  {}", line);
            }
            return ExitCode::from(2);
        }
    };

    match sysblock_config::validate_rules(&text) {
        Ok(summary) => {
            let config = sysblock_config::parse_rules(&text);

            println!("✓ Rules are valid");
            println!();
            println!("Summary:");
            println!("  Master switch: {}", if config.master_switch { "on" } else { "off" });
            println!(
                "  Uninstall protection: {}",
                if summary.has_uninstall_protection { "on" } else { "off" }
            );
            println!(
                "  Session options: {}",
                config
                    .session_options
                    .iter()
                    .map(|s| format!("{}m", s / 60))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            println!("  Rules: {}", summary.rule_count);

            if !config.rules.is_empty() {
                println!();
                for rule in config.rules.values() {
                    println!(
                        "  - {} [{}]: {} min/day",
                        rule.package_id,
                        if rule.strict_mode { "strict" } else { "advisory" },
                        rule.daily_limit_minutes
                    );
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Rules rejected");
            eprintln!();
            eprintln!("  Line {}: {}", e.line, e.message);
            if let Some(source) = text.lines().nth(e.line.saturating_sub(1)) {
                eprintln!("    | {}", source.trim());
            }
            ExitCode::from(1)
        }
    }
}
