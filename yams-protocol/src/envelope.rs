//! Request/response envelope and the payload catalogue.
//!
//! Every frame payload is one JSON-encoded [`Envelope`]. The payload is an
//! adjacently tagged union: `{"case": "search_request", "value": {...}}`.
//! Only `request_id` and the payload case matter to the transport; the
//! shapes themselves belong to the daemon.

use crate::error::{ErrorCode, ProtocolError};
use crate::frame::{encode_frame, FrameFlags};
use crate::PROTOCOL_VERSION;
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Message envelope carried by every frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Correlates a response with the request that caused it.
    pub request_id: u64,

    /// Envelope schema version.
    pub version: u32,

    /// Version string of the sending side.
    #[serde(default)]
    pub client_version: String,

    pub payload: Payload,
}

impl Envelope {
    pub fn new(request_id: u64, client_version: impl Into<String>, payload: Payload) -> Self {
        Self {
            request_id,
            version: PROTOCOL_VERSION,
            client_version: client_version.into(),
            payload,
        }
    }

    /// Serializes the envelope into a frame payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserializes an envelope from a frame payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serializes the envelope and wraps it in a frame.
    pub fn encode_frame(&self, flags: FrameFlags) -> Result<BytesMut, ProtocolError> {
        encode_frame(&self.to_bytes()?, flags)
    }

    pub fn case(&self) -> PayloadCase {
        self.payload.case()
    }
}

/// Payload discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadCase {
    PingRequest,
    StatusRequest,
    AddDocumentRequest,
    CatRequest,
    SearchRequest,
    ListRequest,
    GrepRequest,
    UpdateDocumentRequest,
    GraphQueryRequest,
    SwitchSessionRequest,
    PingResponse,
    StatusResponse,
    AddDocumentResponse,
    CatResponse,
    SearchResponse,
    ListResponse,
    GrepResponse,
    UpdateDocumentResponse,
    GraphQueryResponse,
    SwitchSessionResponse,
    Error,
}

impl PayloadCase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadCase::PingRequest => "ping_request",
            PayloadCase::StatusRequest => "status_request",
            PayloadCase::AddDocumentRequest => "add_document_request",
            PayloadCase::CatRequest => "cat_request",
            PayloadCase::SearchRequest => "search_request",
            PayloadCase::ListRequest => "list_request",
            PayloadCase::GrepRequest => "grep_request",
            PayloadCase::UpdateDocumentRequest => "update_document_request",
            PayloadCase::GraphQueryRequest => "graph_query_request",
            PayloadCase::SwitchSessionRequest => "switch_session_request",
            PayloadCase::PingResponse => "ping_response",
            PayloadCase::StatusResponse => "status_response",
            PayloadCase::AddDocumentResponse => "add_document_response",
            PayloadCase::CatResponse => "cat_response",
            PayloadCase::SearchResponse => "search_response",
            PayloadCase::ListResponse => "list_response",
            PayloadCase::GrepResponse => "grep_response",
            PayloadCase::UpdateDocumentResponse => "update_document_response",
            PayloadCase::GraphQueryResponse => "graph_query_response",
            PayloadCase::SwitchSessionResponse => "switch_session_response",
            PayloadCase::Error => "error",
        }
    }
}

impl fmt::Display for PayloadCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Envelope payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "case", content = "value", rename_all = "snake_case")]
pub enum Payload {
    PingRequest(PingRequest),
    StatusRequest(StatusRequest),
    AddDocumentRequest(AddDocumentRequest),
    CatRequest(CatRequest),
    SearchRequest(SearchRequest),
    ListRequest(ListRequest),
    GrepRequest(GrepRequest),
    UpdateDocumentRequest(UpdateDocumentRequest),
    GraphQueryRequest(GraphQueryRequest),
    SwitchSessionRequest(SwitchSessionRequest),
    PingResponse(PingResponse),
    StatusResponse(StatusResponse),
    AddDocumentResponse(AddDocumentResponse),
    CatResponse(CatResponse),
    SearchResponse(SearchResponse),
    ListResponse(ListResponse),
    GrepResponse(GrepResponse),
    UpdateDocumentResponse(UpdateDocumentResponse),
    GraphQueryResponse(GraphQueryResponse),
    SwitchSessionResponse(SwitchSessionResponse),
    Error(ErrorResponse),
}

impl Payload {
    pub fn case(&self) -> PayloadCase {
        match self {
            Payload::PingRequest(_) => PayloadCase::PingRequest,
            Payload::StatusRequest(_) => PayloadCase::StatusRequest,
            Payload::AddDocumentRequest(_) => PayloadCase::AddDocumentRequest,
            Payload::CatRequest(_) => PayloadCase::CatRequest,
            Payload::SearchRequest(_) => PayloadCase::SearchRequest,
            Payload::ListRequest(_) => PayloadCase::ListRequest,
            Payload::GrepRequest(_) => PayloadCase::GrepRequest,
            Payload::UpdateDocumentRequest(_) => PayloadCase::UpdateDocumentRequest,
            Payload::GraphQueryRequest(_) => PayloadCase::GraphQueryRequest,
            Payload::SwitchSessionRequest(_) => PayloadCase::SwitchSessionRequest,
            Payload::PingResponse(_) => PayloadCase::PingResponse,
            Payload::StatusResponse(_) => PayloadCase::StatusResponse,
            Payload::AddDocumentResponse(_) => PayloadCase::AddDocumentResponse,
            Payload::CatResponse(_) => PayloadCase::CatResponse,
            Payload::SearchResponse(_) => PayloadCase::SearchResponse,
            Payload::ListResponse(_) => PayloadCase::ListResponse,
            Payload::GrepResponse(_) => PayloadCase::GrepResponse,
            Payload::UpdateDocumentResponse(_) => PayloadCase::UpdateDocumentResponse,
            Payload::GraphQueryResponse(_) => PayloadCase::GraphQueryResponse,
            Payload::SwitchSessionResponse(_) => PayloadCase::SwitchSessionResponse,
            Payload::Error(_) => PayloadCase::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Payload::Error(_))
    }
}

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PingRequest {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusRequest {
    #[serde(default)]
    pub detailed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddDocumentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub recursive: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub limit: u32,
    #[serde(default)]
    pub fuzzy: bool,
    #[serde(default)]
    pub similarity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListRequest {
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub recent_first: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GrepRequest {
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,
    #[serde(default)]
    pub ignore_case: bool,
    #[serde(default)]
    pub context_lines: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_matches: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateDocumentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphQueryRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_name: Option<String>,
    pub max_depth: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relation_filters: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwitchSessionRequest {
    pub name: String,
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PingResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_time_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusResponse {
    pub running: bool,
    pub ready: bool,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub uptime_seconds: u64,
    #[serde(default)]
    pub requests_processed: u64,
    #[serde(default)]
    pub active_connections: u64,
    #[serde(default)]
    pub memory_usage_mb: f64,
    #[serde(default)]
    pub cpu_usage_percent: f64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub details: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddDocumentResponse {
    pub hash: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub documents_added: u64,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatResponse {
    pub hash: String,
    #[serde(default)]
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SearchResult>,
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListEntry {
    pub hash: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListResponse {
    #[serde(default)]
    pub items: Vec<ListEntry>,
    #[serde(default)]
    pub total_count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GrepMatch {
    pub file: String,
    pub line_number: u64,
    pub line: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context_before: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context_after: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GrepResponse {
    #[serde(default)]
    pub matches: Vec<GrepMatch>,
    #[serde(default)]
    pub total_matches: u64,
    #[serde(default)]
    pub files_searched: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateDocumentResponse {
    pub hash: String,
    #[serde(default)]
    pub content_updated: bool,
    #[serde(default)]
    pub tags_updated: bool,
    #[serde(default)]
    pub metadata_updated: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub distance: u32,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphQueryResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<GraphNode>,
    #[serde(default)]
    pub connected_nodes: Vec<GraphNode>,
    #[serde(default)]
    pub total_nodes_found: u64,
    #[serde(default)]
    pub max_depth_reached: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwitchSessionResponse {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
}

/// Error details returned by the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Numeric error code, see [`ErrorCode`].
    pub code: u32,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.as_u32(),
            message: message.into(),
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        ErrorCode::from_u32(self.code)
    }
}
