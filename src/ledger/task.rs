use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, WorkerError};

/// Task status as observed on the ledger. The worker never changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Open,
    /// Enough submissions arrived, the contract is verifying them
    Claimed,
    Completed,
    Failed,
    Unknown,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Open => write!(f, "open"),
            TaskStatus::Claimed => write!(f, "claimed"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Unknown => write!(f, "unknown"),
        }
    }
}

impl TaskStatus {
    /// Map the contract enum discriminant (`Open, InVerification, Completed, Failed`).
    pub fn from_discriminant(index: u64) -> Self {
        match index {
            0 => TaskStatus::Open,
            1 => TaskStatus::Claimed,
            2 => TaskStatus::Completed,
            3 => TaskStatus::Failed,
            _ => TaskStatus::Unknown,
        }
    }

    /// Parse the reply of a `getTaskStatus` query.
    ///
    /// The ledger CLI prints a JSON array of return values; the first one
    /// carries the top-encoded enum, where `Open` (discriminant 0) encodes
    /// to an empty buffer. Plain-text replies naming the variant are
    /// accepted as well.
    pub fn from_query_reply(reply: &str) -> Self {
        if let Some(index) = first_return_value(reply).and_then(|v| discriminant(&v)) {
            return Self::from_discriminant(index);
        }

        let reply = reply.trim();
        for (token, status) in [
            ("InVerification", TaskStatus::Claimed),
            ("Completed", TaskStatus::Completed),
            ("Failed", TaskStatus::Failed),
            ("Open", TaskStatus::Open),
        ] {
            if reply.contains(token) {
                return status;
            }
        }
        TaskStatus::Unknown
    }
}

/// Snapshot of a task handed to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub status: TaskStatus,
    pub image: String,
    pub input: String,
}

impl Task {
    pub fn new(id: u64, image: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            id,
            status: TaskStatus::Open,
            image: image.into(),
            input: input.into(),
        }
    }
}

/// Decoded `getTask` view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDetails {
    pub creator: [u8; 32],
    pub image_uri: String,
    pub input_uri: String,
    /// Big-endian unsigned magnitude
    pub reward: Vec<u8>,
    pub max_workers: u32,
    pub submissions_count: u32,
    pub status: TaskStatus,
}

impl TaskDetails {
    /// Parse the reply of a `getTask` query.
    pub fn from_query_reply(reply: &str) -> Result<Self> {
        let value = first_return_value(reply)
            .ok_or_else(|| WorkerError::Decode("getTask reply has no return value".into()))?;
        let hex_str = match &value {
            Value::Object(map) => map.get("hex").and_then(Value::as_str),
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
        .ok_or_else(|| WorkerError::Decode("getTask reply is not hex encoded".into()))?;

        let bytes = hex::decode(hex_str).map_err(|e| WorkerError::Decode(e.to_string()))?;
        Self::decode(&bytes)
    }

    /// Decode the contract's top-encoded `Task` struct.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);

        let mut creator = [0u8; 32];
        creator.copy_from_slice(reader.take(32)?);
        let image_uri = reader.string()?;
        let input_uri = reader.string()?;
        let reward = reader.buffer()?.to_vec();
        let max_workers = reader.u32()?;
        let submissions_count = reader.u32()?;
        let status = TaskStatus::from_discriminant(u64::from(reader.take(1)?[0]));

        if !reader.is_empty() {
            return Err(WorkerError::Decode(format!(
                "{} trailing bytes after task",
                reader.remaining()
            )));
        }

        Ok(Self {
            creator,
            image_uri,
            input_uri,
            reward,
            max_workers,
            submissions_count,
            status,
        })
    }

    pub fn into_task(self, id: u64) -> Task {
        Task {
            id,
            status: self.status,
            image: self.image_uri,
            input: self.input_uri,
        }
    }
}

fn first_return_value(reply: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(reply.trim()).ok()? {
        Value::Array(mut values) if !values.is_empty() => Some(values.swap_remove(0)),
        _ => None,
    }
}

fn discriminant(value: &Value) -> Option<u64> {
    match value {
        Value::Object(map) => {
            if let Some(n) = map.get("number").and_then(Value::as_u64) {
                return Some(n);
            }
            map.get("hex").and_then(Value::as_str).and_then(hex_to_u64)
        }
        Value::String(s) => hex_to_u64(s),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

fn hex_to_u64(s: &str) -> Option<u64> {
    let bytes = hex::decode(s).ok()?;
    if bytes.len() > 8 {
        return None;
    }
    Some(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                WorkerError::Decode(format!(
                    "need {} bytes at offset {}, have {}",
                    n,
                    self.pos,
                    self.remaining()
                ))
            })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32> {
        let raw = self.take(4)?;
        Ok(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn buffer(&mut self) -> Result<&'a [u8]> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    fn string(&mut self) -> Result<String> {
        let raw = self.buffer()?;
        String::from_utf8(raw.to_vec()).map_err(|e| WorkerError::Decode(e.to_string()))
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }
}
