use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnswerReply {
    pub answer: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorReply {
    pub error: String,
}
