//! In-memory collaborators shared by this crate's unit tests.

use std::sync::Mutex;

use async_trait::async_trait;
use axonbot_core::EntityKind;

use crate::commands::{CommandRequest, CommandService, LookupKey};
use crate::replies::Reply;
use crate::web::{ChatClient, ChatError};

#[derive(Default)]
pub(crate) struct RecordingService {
    calls: Mutex<Vec<String>>,
}

impl RecordingService {
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn record(&self, call: String) -> Reply {
        self.calls.lock().expect("calls lock").push(call.clone());
        Reply::Text(call)
    }
}

#[async_trait]
impl CommandService for RecordingService {
    async fn hello(&self, _request: &CommandRequest) -> Reply {
        self.record("hello".to_owned())
    }

    async fn count(&self, kind: EntityKind, _request: &CommandRequest) -> Reply {
        self.record(format!("count {kind}"))
    }

    async fn show_fields(&self, kind: EntityKind, _request: &CommandRequest) -> Reply {
        self.record(format!("fields {kind}"))
    }

    async fn add_field(
        &self,
        kind: EntityKind,
        adapter: &str,
        field: &str,
        _request: &CommandRequest,
    ) -> Reply {
        self.record(format!("add {kind} {adapter} {field}"))
    }

    async fn delete_field(
        &self,
        kind: EntityKind,
        adapter: &str,
        field: &str,
        _request: &CommandRequest,
    ) -> Reply {
        self.record(format!("delete {kind} {adapter} {field}"))
    }

    async fn fetch_by_query(
        &self,
        kind: EntityKind,
        filter: &str,
        _request: &CommandRequest,
    ) -> Reply {
        self.record(format!("query {kind} {filter}"));
        Reply::File {
            filename: format!("{kind}_test.json"),
            content: "[]".to_owned(),
            results: None,
        }
    }

    async fn fetch_by_field(
        &self,
        key: LookupKey,
        value: &str,
        _request: &CommandRequest,
    ) -> Reply {
        self.record(format!("by {} {value}", key.field()))
    }

    async fn list_saved_queries(&self, kind: EntityKind, _request: &CommandRequest) -> Reply {
        self.record(format!("saved {kind}"))
    }

    async fn fetch_saved_query(
        &self,
        kind: EntityKind,
        name: &str,
        _request: &CommandRequest,
    ) -> Reply {
        self.record(format!("saved {kind} {name}"))
    }

    async fn change_labels(&self, args: &str, _request: &CommandRequest) -> Reply {
        self.record(format!("labels {args}"))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Posted {
    Text { channel_id: String, thread_ts: Option<String>, text: String },
    File { channel_id: String, thread_ts: Option<String>, filename: String },
}

#[derive(Default)]
pub(crate) struct RecordingChat {
    posted: Mutex<Vec<Posted>>,
    fail: bool,
    fail_uploads: bool,
}

impl RecordingChat {
    pub(crate) fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    /// Text replies work; every file upload is rejected.
    pub(crate) fn failing_uploads() -> Self {
        Self { fail_uploads: true, ..Self::default() }
    }

    pub(crate) fn posted(&self) -> Vec<Posted> {
        self.posted.lock().expect("posted lock").clone()
    }

    fn push(&self, posted: Posted) -> Result<(), ChatError> {
        if self.fail {
            return Err(ChatError::Api {
                method: "chat.postMessage".to_owned(),
                error: "not_in_channel".to_owned(),
            });
        }
        self.posted.lock().expect("posted lock").push(posted);
        Ok(())
    }
}

#[async_trait]
impl ChatClient for RecordingChat {
    async fn reply(
        &self,
        channel_id: &str,
        thread_ts: Option<&str>,
        text: &str,
    ) -> Result<(), ChatError> {
        self.push(Posted::Text {
            channel_id: channel_id.to_owned(),
            thread_ts: thread_ts.map(str::to_owned),
            text: text.to_owned(),
        })
    }

    async fn upload_file(
        &self,
        channel_id: &str,
        thread_ts: Option<&str>,
        filename: &str,
        _content: &str,
    ) -> Result<(), ChatError> {
        if self.fail_uploads {
            return Err(ChatError::Api {
                method: "files.getUploadURLExternal".to_owned(),
                error: "missing_scope".to_owned(),
            });
        }
        self.push(Posted::File {
            channel_id: channel_id.to_owned(),
            thread_ts: thread_ts.map(str::to_owned),
            filename: filename.to_owned(),
        })
    }
}
