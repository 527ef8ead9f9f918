//! Protobuf messages of the upstream chat service (package `cursor`).

/// Request container sent to the chat endpoint.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChatMessage {
    #[prost(message, repeated, tag = "2")]
    pub messages: Vec<UserMessage>,
    #[prost(message, optional, tag = "4")]
    pub instructions: Option<Instructions>,
    #[prost(string, tag = "5")]
    pub project_path: String,
    #[prost(message, optional, tag = "7")]
    pub model: Option<Model>,
    #[prost(string, tag = "9")]
    pub request_id: String,
    #[prost(string, tag = "11")]
    pub summary: String,
    #[prost(string, tag = "15")]
    pub conversation_id: String,
}

/// One conversation turn. `role` is 1 for user turns and 2 for everything else.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UserMessage {
    #[prost(string, tag = "1")]
    pub content: String,
    #[prost(int32, tag = "2")]
    pub role: i32,
    #[prost(string, tag = "13")]
    pub message_id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Instructions {
    #[prost(string, tag = "1")]
    pub instruction: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Model {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "4")]
    pub empty: String,
}

/// One streamed response message.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ResMessage {
    #[prost(string, tag = "1")]
    pub msg: String,
}

pub const ROLE_USER: i32 = 1;
pub const ROLE_OTHER: i32 = 2;
