use colored::Colorize;

fn prefix() -> String {
    "[proxgate]".bold().cyan().to_string()
}

/// Print an informational message: [proxgate] message
pub fn info(msg: &str) {
    println!("{} {}", prefix(), msg);
}

/// Print an error message to stderr: [proxgate] message (in red)
pub fn error(msg: &str) {
    eprintln!("{} {}", "[proxgate]".bold().red(), msg.red());
}

/// Print a warning to stderr in yellow.
pub fn warn(msg: &str) {
    eprintln!("{} {}", prefix(), msg.yellow());
}

/// Color a run state for table cells.
pub fn state(value: &str) -> String {
    match value {
        "running" | "online" | "OK" => value.green().to_string(),
        "stopped" | "offline" => value.yellow().to_string(),
        "unknown" | "-" => value.dimmed().to_string(),
        v if v.starts_with("WARNINGS") => v.yellow().to_string(),
        v => v.to_string(),
    }
}
