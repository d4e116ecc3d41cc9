use std::time::Duration;

use axonbot_core::{EntityKind, FieldSelection, Row};
use chrono::{DateTime, Utc};

/// What a command sends back into the conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    /// `results` are remembered for the thread once the upload succeeds.
    File { filename: String, content: String, results: Option<ResultSet> },
}

/// Rows the user received in a file, kept for follow-up label commands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultSet {
    pub kind: EntityKind,
    pub rows: Vec<Row>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Serializes `rows` as indented JSON under a timestamped file name.
    pub fn rows_file(
        kind: EntityKind,
        rows: Vec<Row>,
        at: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::File {
            filename: result_file_name(kind, at),
            content: serde_json::to_string_pretty(&rows)?,
            results: Some(ResultSet { kind, rows }),
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::File { .. } => "file",
        }
    }
}

pub fn result_file_name(kind: EntityKind, at: DateTime<Utc>) -> String {
    format!("{}_{}.json", kind.plural(), at.format("%Y%m%d-%H%M%S"))
}

pub fn fields_listing(kind: EntityKind, fields: &FieldSelection) -> String {
    let mut lines = vec![format!("Current fields for {kind}:")];
    for (adapter, names) in fields.iter() {
        lines.push(format!("\tAdapter: *{adapter}*"));
        lines.extend(names.into_iter().map(|name| format!("\t\t{name}")));
        lines.push(String::new());
    }
    lines.join("\n")
}

pub fn thread_usage() -> String {
    [
        "Thread commands:",
        "\t*labels add* label1,label2,label3",
        "\t*labels delete* label1,label2,label3",
    ]
    .join("\n")
}

pub fn hello(uptime: Duration, instance_url: &str) -> String {
    [
        format!("Version: *{}*", env!("CARGO_PKG_VERSION")),
        format!("Platform: *{}-{}*", std::env::consts::OS, std::env::consts::ARCH),
        format!("Uptime: *{}*", format_uptime(uptime)),
        format!("<{instance_url}|Inventory instance at '{instance_url}'>"),
    ]
    .join("\n")
}

/// `H:MM:SS`, prefixed with whole days once the bot has run that long.
pub fn format_uptime(uptime: Duration) -> String {
    let total = uptime.as_secs();
    let (days, rest) = (total / 86_400, total % 86_400);
    let clock = format!("{}:{:02}:{:02}", rest / 3_600, (rest % 3_600) / 60, rest % 60);
    match days {
        0 => clock,
        1 => format!("1 day, {clock}"),
        days => format!("{days} days, {clock}"),
    }
}
