//! Ordered command table and router.
//!
//! Every pattern is anchored at both ends and keyed on a distinct leading
//! phrase, so no text can match two entries. The table is compiled once and
//! shared by every in-flight message.

use async_trait::async_trait;
use axonbot_core::{EntityKind, FieldLookup, GENERIC_ADAPTER};
use regex::{Captures, Regex};

use crate::replies::{self, Reply, ResultSet};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Hello,
    Help,
    Count { kind: EntityKind },
    FieldsShow { kind: EntityKind },
    FieldsAdd { kind: EntityKind, adapter: String, field: String },
    FieldsDelete { kind: EntityKind, adapter: String, field: String },
    GetByQuery { kind: EntityKind, filter: String },
    GetByField { key: LookupKey, value: String },
    SavedQueryList { kind: EntityKind },
    SavedQueryFetch { kind: EntityKind, name: String },
    Labels { args: String },
}

/// Fixed fetch-by-field lookups, each bound to one generic field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupKey {
    Hostname,
    Mac,
    Ip,
    Username,
    Email,
}

impl LookupKey {
    fn parse(keyword: &str) -> Option<Self> {
        match keyword {
            "hostname" => Some(Self::Hostname),
            "mac" => Some(Self::Mac),
            "ip" => Some(Self::Ip),
            "username" => Some(Self::Username),
            "email" => Some(Self::Email),
            _ => None,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Hostname | Self::Mac | Self::Ip => EntityKind::Device,
            Self::Username | Self::Email => EntityKind::User,
        }
    }

    pub fn field(&self) -> &'static str {
        match self {
            Self::Hostname => "hostname",
            Self::Mac => "network_interfaces.mac",
            Self::Ip => "network_interfaces.ips",
            Self::Username => "username",
            Self::Email => "mail",
        }
    }

    /// Human name used in "no results" and error replies.
    pub fn value_name(&self) -> &'static str {
        match self {
            Self::Hostname => "hostname",
            Self::Mac => "MAC Address",
            Self::Ip => "IP Address",
            Self::Username => "username",
            Self::Email => "email",
        }
    }

    pub fn lookup(&self, raw_value: &str) -> FieldLookup {
        FieldLookup::from_raw_value(GENERIC_ADAPTER, self.field(), raw_value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandId {
    Hello,
    Help,
    Count,
    FieldsShow,
    FieldsAdd,
    FieldsDelete,
    GetByQuery,
    GetDeviceByField,
    GetUserByField,
    SavedQueryList,
    SavedQueryFetch,
    Labels,
}

struct CommandPattern {
    id: CommandId,
    regex: Regex,
    usage: &'static str,
    summary: &'static str,
}

const PATTERNS: &[(CommandId, &str, &str, &str)] = &[
    (CommandId::Hello, r"^hello$", "hello", "Bot version, uptime, and inventory instance"),
    (CommandId::Help, r"^help$", "help", "This command list"),
    (
        CommandId::Count,
        r"^count (device|user)$",
        "count device|user",
        "Count of all devices or users in the inventory",
    ),
    (
        CommandId::FieldsShow,
        r"^fields (device|user)$",
        "fields device|user",
        "Fields returned in device or user results",
    ),
    (
        CommandId::FieldsAdd,
        r"^fields (device|user) add (\S+) (\S+)$",
        "fields device|user add [adapter] [field]",
        "Add an adapter field to device or user results",
    ),
    (
        CommandId::FieldsDelete,
        r"^fields (device|user) delete (\S+) (\S+)$",
        "fields device|user delete [adapter] [field]",
        "Remove an adapter field from device or user results",
    ),
    (
        CommandId::GetByQuery,
        r"(?s)^get (device|user) query ```(.*)```$",
        "get device|user query ```[query]```",
        "Fetch by an inventory query, fenced with triple backticks",
    ),
    (
        CommandId::GetDeviceByField,
        r"^get device (hostname|mac|ip) (\S+)$",
        "get device hostname|mac|ip [value]",
        "Fetch devices by hostname, MAC, or IP (prefix value with *re=* to use regex)",
    ),
    (
        CommandId::GetUserByField,
        r"^get user (username|email) (\S+)$",
        "get user username|email [value]",
        "Fetch users by username or email (prefix value with *re=* to use regex)",
    ),
    (
        CommandId::SavedQueryList,
        r"^saved query (devices|users)$",
        "saved query devices|users",
        "List saved queries",
    ),
    (
        CommandId::SavedQueryFetch,
        r"^saved query (devices|users) (\S.*)$",
        "saved query devices|users [name]",
        "Fetch everything a saved query returns",
    ),
    (
        CommandId::Labels,
        r"(?s)^labels\s+(.*)$",
        "labels add|delete label1,label2",
        "In a result thread: label every object of the last fetch",
    ),
];

pub struct CommandTable {
    patterns: Vec<CommandPattern>,
}

impl CommandTable {
    pub fn new() -> Result<Self, regex::Error> {
        let patterns = PATTERNS
            .iter()
            .map(|(id, pattern, usage, summary)| {
                Ok(CommandPattern { id: *id, regex: Regex::new(pattern)?, usage, summary })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { patterns })
    }

    /// First matching entry wins; `None` means no command applies.
    pub fn classify(&self, text: &str) -> Option<Command> {
        self.patterns.iter().find_map(|pattern| {
            let captures = pattern.regex.captures(text)?;
            build_command(pattern.id, &captures)
        })
    }

    /// Every entry whose pattern accepts `text`.
    pub fn matching(&self, text: &str) -> Vec<CommandId> {
        self.patterns
            .iter()
            .filter(|pattern| pattern.regex.is_match(text))
            .map(|pattern| pattern.id)
            .collect()
    }

    pub fn help_text(&self) -> String {
        let mut lines = vec!["Commands:".to_owned()];
        lines.extend(
            self.patterns
                .iter()
                .map(|pattern| format!("\t*{}*: {}", pattern.usage, pattern.summary)),
        );
        lines.join("\n")
    }
}

fn build_command(id: CommandId, captures: &Captures<'_>) -> Option<Command> {
    let text = |index: usize| captures.get(index).map(|group| group.as_str());
    let kind = || text(1).and_then(EntityKind::parse);

    let command = match id {
        CommandId::Hello => Command::Hello,
        CommandId::Help => Command::Help,
        CommandId::Count => Command::Count { kind: kind()? },
        CommandId::FieldsShow => Command::FieldsShow { kind: kind()? },
        CommandId::FieldsAdd => Command::FieldsAdd {
            kind: kind()?,
            adapter: text(2)?.to_owned(),
            field: text(3)?.to_owned(),
        },
        CommandId::FieldsDelete => Command::FieldsDelete {
            kind: kind()?,
            adapter: text(2)?.to_owned(),
            field: text(3)?.to_owned(),
        },
        CommandId::GetByQuery => {
            Command::GetByQuery { kind: kind()?, filter: text(2)?.trim().to_owned() }
        }
        CommandId::GetDeviceByField | CommandId::GetUserByField => Command::GetByField {
            key: LookupKey::parse(text(1)?)?,
            value: unwrap_slack_link(text(2)?).to_owned(),
        },
        CommandId::SavedQueryList => Command::SavedQueryList { kind: kind()? },
        CommandId::SavedQueryFetch => {
            Command::SavedQueryFetch { kind: kind()?, name: text(2)?.trim_end().to_owned() }
        }
        CommandId::Labels => Command::Labels { args: text(1)?.trim().to_owned() },
    };
    Some(command)
}

/// Slack rewrites emails and host-like values as `<mailto:a@b|a@b>`; keep
/// only the text the user typed.
fn unwrap_slack_link(value: &str) -> &str {
    value
        .strip_prefix('<')
        .and_then(|inner| inner.strip_suffix('>'))
        .map(|inner| inner.rsplit_once('|').map_or(inner, |(_, label)| label))
        .unwrap_or(value)
}

/// One addressed message, reduced to what command handling needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandRequest {
    pub text: String,
    pub channel_id: String,
    pub thread_key: String,
    pub in_thread: bool,
    pub correlation_id: String,
}

#[async_trait]
pub trait CommandService: Send + Sync {
    async fn hello(&self, request: &CommandRequest) -> Reply;

    async fn count(&self, kind: EntityKind, request: &CommandRequest) -> Reply;

    async fn show_fields(&self, kind: EntityKind, request: &CommandRequest) -> Reply;

    async fn add_field(
        &self,
        kind: EntityKind,
        adapter: &str,
        field: &str,
        request: &CommandRequest,
    ) -> Reply;

    async fn delete_field(
        &self,
        kind: EntityKind,
        adapter: &str,
        field: &str,
        request: &CommandRequest,
    ) -> Reply;

    async fn fetch_by_query(
        &self,
        kind: EntityKind,
        filter: &str,
        request: &CommandRequest,
    ) -> Reply;

    async fn fetch_by_field(&self, key: LookupKey, value: &str, request: &CommandRequest)
        -> Reply;

    async fn list_saved_queries(&self, kind: EntityKind, request: &CommandRequest) -> Reply;

    async fn fetch_saved_query(
        &self,
        kind: EntityKind,
        name: &str,
        request: &CommandRequest,
    ) -> Reply;

    async fn change_labels(&self, args: &str, request: &CommandRequest) -> Reply;

    /// Called once a file reply carrying `results` reached the user.
    async fn results_delivered(&self, _request: &CommandRequest, _results: ResultSet) {}
}

pub struct CommandRouter<S> {
    table: CommandTable,
    service: S,
}

impl<S> CommandRouter<S>
where
    S: CommandService,
{
    pub fn new(service: S) -> Result<Self, regex::Error> {
        Ok(Self { table: CommandTable::new()?, service })
    }

    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub async fn route(&self, request: &CommandRequest) -> Reply {
        let Some(command) = self.table.classify(&request.text) else {
            return if request.in_thread {
                Reply::text(replies::thread_usage())
            } else {
                Reply::text(self.table.help_text())
            };
        };

        let service = &self.service;
        match command {
            Command::Hello => service.hello(request).await,
            Command::Help => Reply::text(self.table.help_text()),
            Command::Count { kind } => service.count(kind, request).await,
            Command::FieldsShow { kind } => service.show_fields(kind, request).await,
            Command::FieldsAdd { kind, adapter, field } => {
                service.add_field(kind, &adapter, &field, request).await
            }
            Command::FieldsDelete { kind, adapter, field } => {
                service.delete_field(kind, &adapter, &field, request).await
            }
            Command::GetByQuery { kind, filter } => {
                service.fetch_by_query(kind, &filter, request).await
            }
            Command::GetByField { key, value } => {
                service.fetch_by_field(key, &value, request).await
            }
            Command::SavedQueryList { kind } => service.list_saved_queries(kind, request).await,
            Command::SavedQueryFetch { kind, name } => {
                service.fetch_saved_query(kind, &name, request).await
            }
            Command::Labels { args } => service.change_labels(&args, request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use axonbot_core::EntityKind;

    use super::{Command, CommandId, CommandRequest, CommandRouter, CommandTable, LookupKey, PATTERNS};
    use crate::replies::Reply;
    use crate::test_support::RecordingService;

    fn table() -> CommandTable {
        CommandTable::new().expect("patterns compile")
    }

    /// At least one sample per entry plus near misses.
    const SAMPLES: &[&str] = &[
        "hello",
        "help",
        "count device",
        "count user",
        "fields device",
        "fields user",
        "fields device add aws aws_device_type",
        "fields user delete generic mail",
        "get device query ```(generic:hostname == \"web\")```",
        "get user query ```(generic:username == \"ana\")```",
        "get device hostname web-01",
        "get device mac re=00:1a",
        "get device ip 10.0.0.1",
        "get user username ana",
        "get user email <mailto:ana@example.com|ana@example.com>",
        "saved query devices",
        "saved query users",
        "saved query devices Unmanaged Windows",
        "labels add vip, test",
        "labels delete vip",
        "get device query hostname web-01",
        "get device username ana",
        "get user hostname web-01",
        "fields device add aws",
        "fields device list",
        "saved query devices ",
        "count devices",
        "Hello",
        "labels",
        "labelsadd vip",
        "hello there",
        "",
    ];

    #[test]
    fn patterns_are_mutually_exclusive() {
        let table = table();
        for sample in SAMPLES {
            let matches = table.matching(sample);
            assert!(matches.len() <= 1, "{sample:?} matched {matches:?}");
        }
    }

    #[test]
    fn every_entry_is_reachable() {
        let table = table();
        let reached = SAMPLES
            .iter()
            .flat_map(|sample| table.matching(sample))
            .collect::<HashSet<_>>();
        assert_eq!(reached.len(), PATTERNS.len());
    }

    #[test]
    fn command_keyword_is_case_sensitive() {
        let table = table();
        assert_eq!(table.classify("Count device"), None);
        assert_eq!(table.classify("count DEVICE"), None);
        assert_eq!(table.classify("count device"), Some(Command::Count { kind: EntityKind::Device }));
    }

    #[test]
    fn field_commands_capture_adapter_and_field() {
        assert_eq!(
            table().classify("fields user add active_directory last_bad_logon"),
            Some(Command::FieldsAdd {
                kind: EntityKind::User,
                adapter: "active_directory".to_owned(),
                field: "last_bad_logon".to_owned(),
            })
        );
    }

    #[test]
    fn fenced_query_may_span_lines() {
        assert_eq!(
            table().classify("get device query ```(a == 1)\nand (b == 2)```"),
            Some(Command::GetByQuery {
                kind: EntityKind::Device,
                filter: "(a == 1)\nand (b == 2)".to_owned(),
            })
        );
    }

    #[test]
    fn lookup_values_lose_slack_link_markup() {
        assert_eq!(
            table().classify("get user email <mailto:ana@example.com|ana@example.com>"),
            Some(Command::GetByField { key: LookupKey::Email, value: "ana@example.com".to_owned() })
        );
        assert_eq!(
            table().classify("get device hostname <http://web.example.com|web.example.com>"),
            Some(Command::GetByField {
                key: LookupKey::Hostname,
                value: "web.example.com".to_owned()
            })
        );
    }

    #[test]
    fn lookup_keys_bind_generic_fields() {
        let lookup = LookupKey::Mac.lookup("RE=^00:1a");
        assert_eq!(lookup.adapter, "generic");
        assert_eq!(lookup.field, "network_interfaces.mac");
        assert!(lookup.is_regex);
        assert_eq!(LookupKey::Email.kind(), EntityKind::User);
        assert_eq!(LookupKey::Email.field(), "mail");
    }

    #[test]
    fn saved_query_names_may_contain_spaces() {
        assert_eq!(
            table().classify("saved query users Disabled Accounts"),
            Some(Command::SavedQueryFetch {
                kind: EntityKind::User,
                name: "Disabled Accounts".to_owned()
            })
        );
    }

    #[test]
    fn help_lists_every_entry() {
        let help = table().help_text();
        for (_, _, usage, _) in PATTERNS {
            assert!(help.contains(usage), "help is missing {usage}");
        }
    }

    fn request(text: &str, in_thread: bool) -> CommandRequest {
        CommandRequest {
            text: text.to_owned(),
            channel_id: "C1".to_owned(),
            thread_key: "1730000000.0001".to_owned(),
            in_thread,
            correlation_id: "env-1".to_owned(),
        }
    }

    #[tokio::test]
    async fn router_dispatches_to_matching_service_method() {
        let router = CommandRouter::new(RecordingService::default()).expect("router");

        let reply = router.route(&request("labels add vip, test", true)).await;
        assert_eq!(reply, Reply::Text("labels add vip, test".to_owned()));

        let reply = router.route(&request("get device ip re=10\\..*", false)).await;
        assert_eq!(reply, Reply::Text("by network_interfaces.ips re=10\\..*".to_owned()));
    }

    #[tokio::test]
    async fn unmatched_thread_text_gets_usage_hint_without_service_call() {
        let router = CommandRouter::new(RecordingService::default()).expect("router");

        let Reply::Text(text) = router.route(&request("thanks!", true)).await else {
            panic!("expected text reply");
        };
        assert!(text.starts_with("Thread commands:"));

        let Reply::Text(text) = router.route(&request("what can you do", false)).await else {
            panic!("expected text reply");
        };
        assert!(text.starts_with("Commands:"));
        assert!(router.service.calls().is_empty());
    }

    #[test]
    fn command_ids_are_unique_in_table() {
        let ids = PATTERNS.iter().map(|(id, _, _, _)| *id).collect::<HashSet<CommandId>>();
        assert_eq!(ids.len(), PATTERNS.len());
    }
}
