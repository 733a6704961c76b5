//! Console command parser and handlers.
//!
//! Each command maps onto one supervisor operation and renders the outcome as
//! lines of text.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::script::{ReloadOutcome, RunResult, ScriptKind, Supervisor, SCRIPT_EXTENSION};

/// Entries shown per page by `list`.
pub const LIST_PAGE_SIZE: usize = 15;

/// A parsed console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Load a script (name ends in `.lua`) or project.
    Load(String),
    /// Unload a loaded script or project.
    Unload(String),
    /// Unload if loaded, then load again.
    Reload(String),
    /// List scripts and projects on disk, one page at a time.
    List(usize),
    /// Show details of a loaded script.
    Info(String),
    /// Unload everything and load the startup batch again.
    ReloadAll,
    /// Run a command registered by a script.
    Run { name: String, args: Vec<String> },
    /// Fire an event at script listeners.
    Emit { event: String, args: Vec<String> },
    /// Show help.
    Help,
    /// A known command given without its required argument.
    Usage(&'static str),
    /// Blank input.
    Empty,
    /// Unknown command.
    Unknown(String),
}

impl ConsoleCommand {
    /// Get the command name.
    pub fn name(&self) -> &str {
        match self {
            ConsoleCommand::Load(_) => "load",
            ConsoleCommand::Unload(_) => "unload",
            ConsoleCommand::Reload(_) => "reload",
            ConsoleCommand::List(_) => "list",
            ConsoleCommand::Info(_) => "info",
            ConsoleCommand::ReloadAll => "reloadall",
            ConsoleCommand::Run { .. } => "run",
            ConsoleCommand::Emit { .. } => "emit",
            ConsoleCommand::Help => "help",
            ConsoleCommand::Usage(_) => "usage",
            ConsoleCommand::Empty => "",
            ConsoleCommand::Unknown(cmd) => cmd,
        }
    }
}

impl fmt::Display for ConsoleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleCommand::Load(name) => write!(f, "load {name}"),
            ConsoleCommand::Unload(name) => write!(f, "unload {name}"),
            ConsoleCommand::Reload(name) => write!(f, "reload {name}"),
            ConsoleCommand::List(page) => write!(f, "list {page}"),
            ConsoleCommand::Info(name) => write!(f, "info {name}"),
            ConsoleCommand::ReloadAll => write!(f, "reloadall"),
            ConsoleCommand::Run { name, args } => write!(f, "run {name} {}", args.join(" ")),
            ConsoleCommand::Emit { event, args } => write!(f, "emit {event} {}", args.join(" ")),
            ConsoleCommand::Help => write!(f, "help"),
            ConsoleCommand::Usage(syntax) => write!(f, "{syntax}"),
            ConsoleCommand::Empty => Ok(()),
            ConsoleCommand::Unknown(cmd) => write!(f, "{cmd}"),
        }
    }
}

/// Parse a console input line.
pub fn parse_command(input: &str) -> ConsoleCommand {
    let mut words = input.split_whitespace();
    let Some(cmd) = words.next() else {
        return ConsoleCommand::Empty;
    };
    let rest: Vec<String> = words.map(str::to_string).collect();
    let first = rest.first().cloned();

    match cmd.to_lowercase().as_str() {
        "load" | "start" => first.map_or(ConsoleCommand::Usage("load <name>"), ConsoleCommand::Load),
        "unload" | "stop" => {
            first.map_or(ConsoleCommand::Usage("unload <name>"), ConsoleCommand::Unload)
        }
        "reload" | "restart" => {
            first.map_or(ConsoleCommand::Usage("reload <name>"), ConsoleCommand::Reload)
        }
        "list" | "ls" => {
            let page = first.and_then(|p| p.parse().ok()).unwrap_or(1);
            ConsoleCommand::List(page)
        }
        "info" => first.map_or(ConsoleCommand::Usage("info <name>"), ConsoleCommand::Info),
        "reloadall" => ConsoleCommand::ReloadAll,
        "run" => match rest.split_first() {
            Some((name, args)) => ConsoleCommand::Run {
                name: name.clone(),
                args: args.to_vec(),
            },
            None => ConsoleCommand::Usage("run <command> [args...]"),
        },
        "emit" => match rest.split_first() {
            Some((event, args)) => ConsoleCommand::Emit {
                event: event.clone(),
                args: args.to_vec(),
            },
            None => ConsoleCommand::Usage("emit <event> [args...]"),
        },
        "help" | "h" | "?" => ConsoleCommand::Help,
        _ => ConsoleCommand::Unknown(cmd.to_string()),
    }
}

/// Console command information for help display.
pub struct CommandInfo {
    pub syntax: &'static str,
    pub description: &'static str,
}

/// Get all available command information.
pub fn command_help() -> Vec<CommandInfo> {
    vec![
        CommandInfo {
            syntax: "load <name>",
            description: "Load a script (name.lua) or a project (folder name)",
        },
        CommandInfo {
            syntax: "unload <name>",
            description: "Unload a loaded script or project",
        },
        CommandInfo {
            syntax: "reload <name>",
            description: "Unload and load a script or project again",
        },
        CommandInfo {
            syntax: "list [page]",
            description: "List scripts and projects on disk",
        },
        CommandInfo {
            syntax: "info <name>",
            description: "Show details about a loaded script or project",
        },
        CommandInfo {
            syntax: "reloadall",
            description: "Unload everything, re-read configuration and load again",
        },
        CommandInfo {
            syntax: "run <command> [args...]",
            description: "Run a command registered by a script",
        },
        CommandInfo {
            syntax: "emit <event> [args...]",
            description: "Fire an event at script listeners",
        },
        CommandInfo {
            syntax: "help",
            description: "Show this help",
        },
    ]
}

/// Format the help message for display.
pub fn format_help() -> Vec<String> {
    let mut lines = vec!["=== Commands ===".to_string()];
    for info in command_help() {
        lines.push(format!("  {:<24} {}", info.syntax, info.description));
    }
    lines
}

/// Execute a parsed command against the supervisor.
pub fn execute(supervisor: &Supervisor, command: &ConsoleCommand) -> Vec<String> {
    match command {
        ConsoleCommand::Load(name) => vec![load(supervisor, name)],
        ConsoleCommand::Unload(name) => vec![unload(supervisor, name)],
        ConsoleCommand::Reload(name) => vec![reload(supervisor, name)],
        ConsoleCommand::List(page) => list(supervisor, *page),
        ConsoleCommand::Info(name) => info(supervisor, name),
        ConsoleCommand::ReloadAll => {
            let count = supervisor.reload_all();
            vec![format!("Reloaded all scripts; {count} loaded.")]
        }
        ConsoleCommand::Run { name, args } => {
            match supervisor.services().commands.execute(name, "console", args) {
                Some(true) => vec![],
                Some(false) => vec![format!("Command '{name}' failed. See the log for details.")],
                None => vec![format!("No script command named '{name}'.")],
            }
        }
        ConsoleCommand::Emit { event, args } => {
            let ran = supervisor.services().listeners.dispatch(event, args);
            vec![format!("Event '{event}' handled by {ran} listener(s).")]
        }
        ConsoleCommand::Help => format_help(),
        ConsoleCommand::Usage(syntax) => vec![format!("Usage: {syntax}")],
        ConsoleCommand::Empty => vec![],
        ConsoleCommand::Unknown(cmd) => {
            vec![format!("Unknown command '{cmd}'. Type 'help' for a list of commands.")]
        }
    }
}

fn kind_of(name: &str) -> ScriptKind {
    let is_file = Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(SCRIPT_EXTENSION));
    if is_file {
        ScriptKind::Single
    } else {
        ScriptKind::Project
    }
}

/// Message for a load outcome, worded for scripts or projects.
pub fn describe_result(kind: ScriptKind, name: &str, result: RunResult) -> String {
    match (result, kind) {
        (RunResult::Success, _) => format!("Loaded and ran {kind} '{name}'."),
        (RunResult::FailDisabled, ScriptKind::Single) => {
            format!("Script '{name}' is disabled in the script options file and was not run.")
        }
        (RunResult::FailDisabled, ScriptKind::Project) => {
            format!("Project '{name}' is disabled in its project options and was not run.")
        }
        (RunResult::FailPluginDependency, _) => format!(
            "The {kind} '{name}' was not run because plugin dependencies are missing. See the log for details."
        ),
        (RunResult::FailError, _) => {
            format!("The {kind} '{name}' failed while running. See the log for details.")
        }
        (RunResult::FailDuplicate, _) => {
            format!("A {kind} named '{name}' is already loaded.")
        }
        (RunResult::FailScriptNotFound, ScriptKind::Single) => {
            format!("No script named '{name}' in the scripts folder.")
        }
        (RunResult::FailScriptNotFound, ScriptKind::Project) => {
            format!("No project named '{name}' in the projects folder.")
        }
        (RunResult::FailNoMain, _) => {
            format!("Project '{name}' was not run because its main file is missing.")
        }
    }
}

fn load(supervisor: &Supervisor, name: &str) -> String {
    let kind = kind_of(name);
    if supervisor.is_loaded(name) {
        return describe_result(kind, name, RunResult::FailDuplicate);
    }
    let result = match kind {
        ScriptKind::Single => supervisor.load_script_by_name(name),
        ScriptKind::Project => supervisor.load_project_by_name(name),
    };
    match result {
        Ok(result) => describe_result(kind, name, result),
        Err(e) => {
            tracing::error!("Error when loading {kind} '{name}': {e}");
            format!("The {kind} '{name}' could not be loaded. See the log for details.")
        }
    }
}

fn unload(supervisor: &Supervisor, name: &str) -> String {
    let kind = supervisor
        .script(name)
        .map(|s| s.kind())
        .unwrap_or_else(|| kind_of(name));
    match supervisor.unload_by_name(name) {
        Some(true) => format!("Unloaded {kind} '{name}'."),
        Some(false) => {
            format!("The {kind} '{name}' was unloaded with errors. See the log for details.")
        }
        None => format!("No loaded {kind} named '{name}'."),
    }
}

fn reload(supervisor: &Supervisor, name: &str) -> String {
    let kind = supervisor
        .script(name)
        .map(|s| s.kind())
        .unwrap_or_else(|| kind_of(name));
    match supervisor.reload_by_name(name) {
        Ok(ReloadOutcome::Reloaded(RunResult::Success)) => format!("Reloaded {kind} '{name}'."),
        Ok(ReloadOutcome::Reloaded(result)) => describe_result(kind, name, result),
        Ok(ReloadOutcome::UnloadFailed) => format!(
            "The {kind} '{name}' did not stop cleanly and was not loaded again. See the log for details."
        ),
        Err(e) => {
            tracing::error!("Error when reloading {kind} '{name}': {e}");
            format!("The {kind} '{name}' could not be reloaded. See the log for details.")
        }
    }
}

fn list(supervisor: &Supervisor, page: usize) -> Vec<String> {
    let mut names: Vec<String> = supervisor
        .all_script_paths()
        .iter()
        .chain(supervisor.all_project_paths().iter())
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .collect();
    names.sort();
    names.dedup();

    let pages = names.len().div_ceil(LIST_PAGE_SIZE).max(1);
    let page = page.clamp(1, pages);
    let mut lines = vec![format!("=== Scripts (page {page}/{pages}) ===")];
    if names.is_empty() {
        lines.push("  (none)".to_string());
        return lines;
    }
    for name in names.iter().skip((page - 1) * LIST_PAGE_SIZE).take(LIST_PAGE_SIZE) {
        let marker = if supervisor.is_loaded(name) { "loaded" } else { "unloaded" };
        lines.push(format!("  {name} [{marker}]"));
    }
    lines
}

fn info(supervisor: &Supervisor, name: &str) -> Vec<String> {
    let Some(script) = supervisor.script(name) else {
        return vec![format!("No loaded script or project named '{name}'.")];
    };
    let services = supervisor.services();
    let mut lines = vec![format!("=== {} ===", script.name())];
    lines.push(format!("Type: {}", script.kind()));
    lines.push(format!("Location: {}", script.path().display()));
    if script.is_project() {
        lines.push(format!("Main: {}", script.main_path().display()));
        lines.push(format!("Modules: {}", script.modules().len()));
    }
    lines.push(format!("State: {}", script.state()));
    lines.push(format!(
        "Uptime: {}",
        script.uptime().map(format_uptime).unwrap_or_else(|| "-".to_string())
    ));
    lines.push(format!("Commands: {}", join_or_none(&services.commands.commands_of(name))));
    lines.push(format!("Listeners: {}", join_or_none(&services.listeners.events_of(name))));
    lines.push(format!("Tasks: {}", services.tasks.tasks_of(name).len()));
    lines.push(format!(
        "Databases: {}",
        join_or_none(&services.databases.connections_of(name))
    ));
    lines.push(format!(
        "Clients: {}",
        join_or_none(&services.clients.connections_of(name))
    ));
    lines.push(format!(
        "Permissions: {}",
        join_or_none(&services.permissions.permissions_of(name))
    ));
    lines.push(format!("Options: {}", script.options()));
    lines
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

/// Render a duration as `1h 2m 3s`, omitting leading zero units.
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m}m {s}s")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}
