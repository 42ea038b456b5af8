//! Wire message catalogue.
//!
//! Every frame carries an [`Envelope`]: a numeric type tag, an optional
//! target node and the payload. The tag table below is the single place that
//! maps tags to payload types; both ends dispatch on [`Message`] variants.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ColumnSet, Comparison, DecodeError, PhaseStats};

pub type NodeId = u32;

pub type Tag = u16;

/// Base result shared by every reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub is_success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Outcome {
    pub fn ok() -> Self {
        Self {
            is_success: true,
            error_message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            is_success: false,
            error_message: Some(message.into()),
        }
    }

    pub fn message(&self) -> &str {
        self.error_message.as_deref().unwrap_or("unspecified failure")
    }
}

impl Default for Outcome {
    fn default() -> Self {
        Self::ok()
    }
}

// Requests

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitPool {
    pub node_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitColumns {
    pub columns: ColumnSet,
    pub rows: usize,
    pub rhs: Vec<f64>,
    /// Set on the worker that owns the last column; only it keeps the
    /// right-hand side current during elimination.
    pub owns_rhs: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GetColumn {
    pub column: usize,
    pub from_row: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwapRows {
    pub row1: usize,
    pub row2: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Eliminate {
    pub pivot_row: usize,
    pub pivot_value: f64,
    /// Pivot column values for rows `pivot_row..rows`, after any swap.
    pub pivot_column: Vec<f64>,
    pub pivot_rhs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sync {
    pub stage: usize,
    pub is_complete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GetElement {
    pub row: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Complete;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveMode {
    Solve,
    Compare,
}

/// Size announcement that opens a matrix transfer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolveRequest {
    pub size: usize,
    pub mode: SolveMode,
}

/// One block of a column-major bulk transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnBlock {
    pub start_column: usize,
    pub column_count: usize,
    pub data: Vec<f64>,
    /// Right-hand side; present on the first block only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constants: Option<Vec<f64>>,
    pub is_last_block: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GetRow {
    pub row: usize,
    pub from_column: usize,
}

// Replies

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceReady {
    #[serde(flatten)]
    pub outcome: Outcome,
    pub columns: ColumnSet,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnValues {
    #[serde(flatten)]
    pub outcome: Outcome,
    pub column: usize,
    pub from_row: usize,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementValue {
    #[serde(flatten)]
    pub outcome: Outcome,
    pub row: usize,
    pub column: usize,
    pub value: f64,
}

/// Explicit answer for a query about a column the worker does not hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotOwned {
    #[serde(flatten)]
    pub outcome: Outcome,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowSegment {
    #[serde(flatten)]
    pub outcome: Outcome,
    pub row: usize,
    /// `(global column, value)` pairs in ascending column order.
    pub entries: Vec<(usize, f64)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rhs: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synced {
    #[serde(flatten)]
    pub outcome: Outcome,
    pub stage: usize,
    pub is_complete: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolReady {
    #[serde(flatten)]
    pub outcome: Outcome,
    pub active_node_count: usize,
}

impl PoolReady {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::failed(message),
            active_node_count: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    #[serde(flatten)]
    pub outcome: Outcome,
    #[serde(default)]
    pub solution: Vec<f64>,
    #[serde(default)]
    pub stats: BTreeMap<String, PhaseStats>,
    /// Unix timestamp in milliseconds.
    #[serde(default)]
    pub finished_at: i64,
}

impl Solution {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::failed(message),
            ..Self::default()
        }
    }
}

macro_rules! catalogue {
    ($($tag:literal => $variant:ident($payload:ty),)*) => {
        /// Every command and result that can travel in a frame.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Message {
            $($variant($payload),)*
        }

        impl Message {
            pub fn tag(&self) -> Tag {
                match self {
                    $(Message::$variant(_) => $tag,)*
                }
            }

            pub fn name(&self) -> &'static str {
                match self {
                    $(Message::$variant(_) => stringify!($variant),)*
                }
            }

            fn payload(&self) -> serde_json::Result<Value> {
                match self {
                    $(Message::$variant(p) => serde_json::to_value(p),)*
                }
            }

            fn from_payload(tag: Tag, payload: Value) -> Result<Self, DecodeError> {
                match tag {
                    $($tag => Ok(Message::$variant(serde_json::from_value(payload)?)),)*
                    other => Err(DecodeError::UnknownTag(other)),
                }
            }
        }

        $(
            impl From<$payload> for Message {
                fn from(payload: $payload) -> Self {
                    Message::$variant(payload)
                }
            }

            impl TryFrom<Message> for $payload {
                type Error = Message;

                fn try_from(message: Message) -> Result<Self, Message> {
                    match message {
                        Message::$variant(payload) => Ok(payload),
                        other => Err(other),
                    }
                }
            }
        )*
    };
}

catalogue! {
    0 => InitPool(InitPool),
    1 => InitColumns(InitColumns),
    2 => GetColumn(GetColumn),
    3 => SwapRows(SwapRows),
    4 => Eliminate(Eliminate),
    5 => Sync(Sync),
    6 => GetElement(GetElement),
    7 => Complete(Complete),
    8 => SolveRequest(SolveRequest),
    9 => ColumnBlock(ColumnBlock),
    10 => GetRow(GetRow),
    100 => Ack(Outcome),
    101 => SliceReady(SliceReady),
    102 => ColumnValues(ColumnValues),
    103 => ElementValue(ElementValue),
    104 => NotOwned(NotOwned),
    105 => RowSegment(RowSegment),
    106 => Synced(Synced),
    107 => PoolReady(PoolReady),
    108 => Solution(Solution),
    109 => Comparison(Comparison),
}

impl Message {
    pub fn ack() -> Self {
        Message::Ack(Outcome::ok())
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Message::Ack(Outcome::failed(message))
    }

    /// Dispatches on the envelope tag to the matching payload type.
    pub fn from_envelope(envelope: Envelope) -> Result<Self, DecodeError> {
        Self::from_payload(envelope.kind, envelope.payload)
    }

    pub fn is_reply(&self) -> bool {
        self.tag() >= 100
    }

    /// Base result of a reply; `None` for requests.
    pub fn outcome(&self) -> Option<&Outcome> {
        match self {
            Message::Ack(o) => Some(o),
            Message::SliceReady(r) => Some(&r.outcome),
            Message::ColumnValues(r) => Some(&r.outcome),
            Message::ElementValue(r) => Some(&r.outcome),
            Message::NotOwned(r) => Some(&r.outcome),
            Message::RowSegment(r) => Some(&r.outcome),
            Message::Synced(r) => Some(&r.outcome),
            Message::PoolReady(r) => Some(&r.outcome),
            Message::Solution(r) => Some(&r.outcome),
            Message::Comparison(r) => Some(&r.outcome),
            _ => None,
        }
    }
}

/// Tagged frame body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: Tag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeId>,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    pub fn wrap(message: &Message, node: Option<NodeId>) -> serde_json::Result<Self> {
        Ok(Self {
            kind: message.tag(),
            node,
            payload: message.payload()?,
        })
    }

    pub fn into_message(self) -> Result<Message, DecodeError> {
        Message::from_envelope(self)
    }

    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
