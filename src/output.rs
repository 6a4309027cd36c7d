//! Shared output formatting for dayplan CLI commands.
//!
//! Every command prints either a JSON envelope or a human block:
//!
//! ```text
//! Day plan for 2024-01-15
//!   instances  3
//!   done       1
//!
//! 8:00-12:00
//!   done    08:10-08:40 Walk (3f2a9c01)
//! ```

use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

pub const SCHEMA_VERSION: &str = "dayplan.v1";

const DETAILS: &str = "Details";
const WARNINGS: &str = "Warnings";
const NEXT_STEPS: &str = "Next steps";

#[derive(Debug, Clone, Copy, Default)]
pub struct OutputOptions {
    pub json: bool,
    pub quiet: bool,
}

/// Titled list of lines in a human block
#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    title: String,
    items: Vec<String>,
}

/// Human rendering of a command result, built up by the command.
#[derive(Debug, Clone)]
pub struct HumanOutput {
    header: String,
    summary: Vec<(String, String)>,
    sections: Vec<Section>,
    warnings: Vec<String>,
    next_steps: Vec<String>,
}

impl HumanOutput {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            summary: Vec::new(),
            sections: Vec::new(),
            warnings: Vec::new(),
            next_steps: Vec::new(),
        }
    }

    pub fn push_summary(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.summary.push((key.into(), value.into()));
    }

    pub fn push_detail(&mut self, value: impl Into<String>) {
        self.push_item(DETAILS, value);
    }

    /// Append a line under `title`; sections print in first-use order.
    pub fn push_item(&mut self, title: &str, value: impl Into<String>) {
        let value = value.into();
        match self.sections.iter_mut().find(|section| section.title == title) {
            Some(section) => section.items.push(value),
            None => self.sections.push(Section {
                title: title.to_string(),
                items: vec![value],
            }),
        }
    }

    pub fn push_warning(&mut self, value: impl Into<String>) {
        self.warnings.push(value.into());
    }

    pub fn push_next_step(&mut self, value: impl Into<String>) {
        self.next_steps.push(value.into());
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    code: i32,
    kind: &'static str,
}

/// The one JSON shape every command prints.
#[derive(Serialize)]
struct Envelope<'a> {
    schema_version: &'static str,
    command: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
    #[serde(skip_serializing_if = "no_lines")]
    warnings: &'a [String],
    #[serde(skip_serializing_if = "no_lines")]
    next_steps: &'a [String],
}

fn no_lines(lines: &&[String]) -> bool {
    lines.is_empty()
}

fn print_envelope(envelope: &Envelope<'_>) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(envelope)?);
    Ok(())
}

pub fn emit_success<T: Serialize>(
    options: OutputOptions,
    command: &str,
    data: &T,
    human: Option<&HumanOutput>,
) -> Result<()> {
    if options.json {
        return print_envelope(&Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "success",
            data: Some(serde_json::to_value(data)?),
            error: None,
            warnings: human.map(|h| h.warnings.as_slice()).unwrap_or_default(),
            next_steps: human.map(|h| h.next_steps.as_slice()).unwrap_or_default(),
        });
    }

    match human {
        // Warnings still reach stderr when quiet.
        Some(human) if options.quiet => {
            for warning in &human.warnings {
                eprintln!("warning: {warning}");
            }
        }
        Some(human) => println!("{}", format_human(human)),
        None => {}
    }
    Ok(())
}

pub fn emit_error(command: &str, err: &Error, json: bool) -> Result<()> {
    let next_steps = error_next_steps(err);
    if json {
        return print_envelope(&Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "error",
            data: None,
            error: Some(ErrorBody {
                message: err.to_string(),
                code: err.exit_code(),
                kind: error_kind(err),
            }),
            warnings: &[],
            next_steps: &next_steps,
        });
    }

    eprintln!("error: {err}");
    if let Some(hint) = next_steps.first() {
        eprintln!("hint: {hint}");
    }
    Ok(())
}

pub fn format_human(output: &HumanOutput) -> String {
    let mut lines = vec![output.header.clone()];

    let width = output
        .summary
        .iter()
        .map(|(key, _)| key.chars().count())
        .max()
        .unwrap_or(0);
    for (key, value) in &output.summary {
        if value.is_empty() {
            lines.push(format!("  {key}"));
        } else {
            lines.push(format!("  {key:<width$}  {value}"));
        }
    }

    for section in &output.sections {
        push_block(&mut lines, &section.title, &section.items);
    }
    push_block(&mut lines, WARNINGS, &output.warnings);
    push_block(&mut lines, NEXT_STEPS, &output.next_steps);

    lines.join("\n")
}

fn push_block(lines: &mut Vec<String>, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    lines.push(String::new());
    lines.push(title.to_string());
    lines.extend(items.iter().map(|item| format!("  {item}")));
}

/// First non-flag argument, used to label error envelopes.
pub fn infer_command_name_from_args() -> String {
    command_name_from(std::env::args().skip(1))
}

fn command_name_from(args: impl IntoIterator<Item = String>) -> String {
    let mut expects_value = false;
    for arg in args {
        if expects_value {
            expects_value = false;
            continue;
        }
        if arg.starts_with('-') {
            expects_value = matches!(arg.as_str(), "--vault" | "--date");
            continue;
        }
        return arg;
    }
    "dayplan".to_string()
}

fn error_kind(err: &Error) -> &'static str {
    match err.exit_code() {
        2 => "user_error",
        3 => "policy_blocked",
        _ => "operation_failed",
    }
}

fn error_next_steps(err: &Error) -> Vec<String> {
    let step = match err {
        Error::InstanceNotFound(_) => "dayplan show",
        Error::TaskNotFound(_) => "check the note exists in the task folder",
        Error::MoveRejected(_) => "place the instance below the slot's done and running work",
        Error::VaultNotFound(_) => "pass --vault <dir> or set DAYPLAN_VAULT",
        Error::InvalidConfig(_) => "fix .dayplan.toml then retry",
        Error::LockFailed(_) => "retry once the other dayplan process finishes",
        _ => return Vec::new(),
    };
    vec![step.to_string()]
}
