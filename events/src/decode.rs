/*
 * Copyright 2020 Nikhil Marathe <nsm.nikhil@gmail.com>
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{Map, Value};
use thiserror::Error;
use chrono::DateTime;
use tracing::{debug, trace};

use crate::event::*;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("event has no id")]
    MissingId,
    #[error("event id is not an object keyed by the event kind")]
    MalformedId,
    #[error("malformed '{kind}' event: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A JSON event split into its kind, its id body and its remaining top level fields.
#[derive(Debug)]
pub struct RawEvent {
    kind: String,
    id: Value,
    last_message: bool,
    fields: Map<String, Value>,
}

impl RawEvent {
    pub fn from_value(value: Value) -> Result<RawEvent, DecodeError> {
        let mut fields = match value {
            Value::Object(fields) => fields,
            _ => return Err(DecodeError::MalformedId),
        };
        let id = fields.remove("id").ok_or(DecodeError::MissingId)?;
        // The id is a oneof, so JSON renders it as an object with exactly one key: the kind.
        let (kind, id) = match id {
            Value::Object(id) if id.len() == 1 => {
                id.into_iter().next().ok_or(DecodeError::MalformedId)?
            }
            _ => return Err(DecodeError::MalformedId),
        };
        let last_message = fields
            .remove("lastMessage")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        Ok(RawEvent {
            kind,
            id,
            last_message,
            fields,
        })
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn last_message(&self) -> bool {
        self.last_message
    }

    /// Deserializes the body of the id, e.g. `{"id": "3"}` for a named set.
    pub fn id_as<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        T::deserialize(&self.id).map_err(|source| self.payload_error(source))
    }

    /// Deserializes a top level payload field, if present.
    pub fn payload<T: DeserializeOwned>(&self, field: &str) -> Result<Option<T>, DecodeError> {
        match self.fields.get(field) {
            Some(value) => T::deserialize(value)
                .map(Some)
                .map_err(|source| self.payload_error(source)),
            None => Ok(None),
        }
    }

    fn payload_or_default<T: DeserializeOwned + Default>(
        &self,
        field: &str,
    ) -> Result<T, DecodeError> {
        Ok(self.payload(field)?.unwrap_or_default())
    }

    fn payload_error(&self, source: serde_json::Error) -> DecodeError {
        DecodeError::Payload {
            kind: self.kind.clone(),
            source,
        }
    }
}

pub type DecodeFn =
    Box<dyn Fn(&RawEvent) -> Result<Option<EventPayload>, DecodeError> + Send + Sync>;

/// Turns JSON events into `BuildEvent`s.
///
/// Decoders are tried newest first and the first one to return a payload wins. The built-in
/// decoder sits at the bottom; events nobody claims become `EventPayload::Other`.
pub struct EventDecoder {
    decoders: Vec<DecodeFn>,
}

impl std::fmt::Debug for EventDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EventDecoder{{ decoders: {} }}", self.decoders.len())
    }
}

impl Default for EventDecoder {
    fn default() -> Self {
        EventDecoder::new()
    }
}

impl EventDecoder {
    pub fn new() -> EventDecoder {
        let standard: DecodeFn = Box::new(decode_standard);
        EventDecoder {
            decoders: vec![standard],
        }
    }

    /// Registers a decoder that takes priority over every decoder registered before it.
    pub fn register<F>(&mut self, decoder: F)
    where
        F: Fn(&RawEvent) -> Result<Option<EventPayload>, DecodeError> + Send + Sync + 'static,
    {
        self.decoders.insert(0, Box::new(decoder));
    }

    pub fn decode_str(&self, json: &str) -> Result<BuildEvent, DecodeError> {
        let value: Value = serde_json::from_str(json)?;
        self.decode_value(value)
    }

    pub fn decode_value(&self, value: Value) -> Result<BuildEvent, DecodeError> {
        let raw = RawEvent::from_value(value)?;
        for decoder in &self.decoders {
            if let Some(payload) = decoder(&raw)? {
                return Ok(BuildEvent {
                    last_message: raw.last_message,
                    payload,
                });
            }
        }
        trace!(kind = raw.kind(), "no decoder for build event kind");
        Ok(BuildEvent {
            last_message: raw.last_message,
            payload: EventPayload::Other(raw.kind),
        })
    }
}

// Wire shapes. proto3 JSON uses camelCase and omits default values, hence `default` everywhere.

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireStarted {
    uuid: Option<String>,
    start_time_millis: Option<Value>,
    start_time: Option<String>,
    command: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireWorkspaceInfo {
    local_exec_root: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct WireId {
    id: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireConfiguration {
    mnemonic: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireFile {
    name: String,
    uri: Option<String>,
    path_prefix: Vec<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireNamedSet {
    files: Vec<WireFile>,
    file_sets: Vec<WireId>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct WireTargetCompletedId {
    label: String,
    configuration: Option<WireId>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireOutputGroup {
    name: String,
    file_sets: Vec<WireId>,
    incomplete: bool,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireCompleted {
    success: bool,
    output_group: Vec<WireOutputGroup>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct WireExitCode {
    name: Option<String>,
    code: i32,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireFinished {
    exit_code: Option<WireExitCode>,
}

// int64 fields arrive as strings in proto3 JSON, but hand written streams use numbers.
fn int64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

// Older streams only carry the millis field, newer ones only the RFC 3339 timestamp.
fn start_time_millis(started: &WireStarted) -> Option<i64> {
    if let Some(millis) = started.start_time_millis.as_ref().and_then(int64) {
        return Some(millis);
    }
    let start_time = started.start_time.as_ref()?;
    match DateTime::parse_from_rfc3339(start_time) {
        Ok(time) => Some(time.timestamp_millis()),
        Err(e) => {
            debug!(start_time = %start_time, error = %e, "ignoring unparseable start time");
            None
        }
    }
}

fn ids(ids: Vec<WireId>) -> Vec<String> {
    ids.into_iter().map(|i| i.id).collect()
}

/// The built-in decoder for the kinds the output resolver consumes.
pub fn decode_standard(raw: &RawEvent) -> Result<Option<EventPayload>, DecodeError> {
    let payload = match raw.kind() {
        kinds::STARTED => {
            let started: WireStarted = raw.payload_or_default("started")?;
            EventPayload::Started(Started {
                uuid: started.uuid.clone().filter(|uuid| !uuid.is_empty()),
                start_time_millis: start_time_millis(&started),
                command: started.command,
            })
        }
        kinds::WORKSPACE => {
            let info: WireWorkspaceInfo = raw.payload_or_default("workspaceInfo")?;
            EventPayload::Workspace(WorkspaceInfo {
                local_exec_root: info.local_exec_root,
            })
        }
        kinds::CONFIGURATION => {
            let id: WireId = raw.id_as()?;
            let configuration: WireConfiguration = raw.payload_or_default("configuration")?;
            EventPayload::Configuration(Configuration {
                id: id.id,
                mnemonic: configuration.mnemonic,
            })
        }
        kinds::NAMED_SET => {
            let id: WireId = raw.id_as()?;
            let set: WireNamedSet = raw.payload_or_default("namedSetOfFiles")?;
            EventPayload::NamedSet(NamedSetOfFiles {
                id: id.id,
                files: set
                    .files
                    .into_iter()
                    .map(|f| File {
                        name: f.name,
                        uri: f.uri,
                        path_prefix: f.path_prefix,
                    })
                    .collect(),
                file_sets: ids(set.file_sets),
            })
        }
        kinds::TARGET_COMPLETED => {
            let id: WireTargetCompletedId = raw.id_as()?;
            // An aborted target carries "aborted" instead of "completed" and has no outputs.
            let completed: WireCompleted = raw.payload_or_default("completed")?;
            EventPayload::TargetCompleted(TargetCompleted {
                label: id.label,
                configuration_id: id.configuration.map(|c| c.id).filter(|c| !c.is_empty()),
                success: completed.success,
                output_groups: completed
                    .output_group
                    .into_iter()
                    .map(|g| OutputGroup {
                        name: g.name,
                        file_sets: ids(g.file_sets),
                        incomplete: g.incomplete,
                    })
                    .collect(),
            })
        }
        kinds::BUILD_FINISHED => {
            let finished: WireFinished = raw.payload_or_default("finished")?;
            let exit_code = finished.exit_code.unwrap_or_default();
            EventPayload::BuildFinished(BuildFinished {
                exit_code: exit_code.code,
                exit_code_name: exit_code.name,
            })
        }
        _ => return Ok(None),
    };
    Ok(Some(payload))
}
