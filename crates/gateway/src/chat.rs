//! Streaming chat events.

use hypercli_protocol::EventFrame;

/// A normalized chat-stream event, projected from the raw `chat.*` event
/// frames emitted while a `chat.send` request is outstanding.
///
/// Event names the mapping does not recognize pass through as [`Other`]
/// with the raw name attached.
///
/// [`Other`]: ChatEvent::Other
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    Content { text: String },
    Thinking { text: String },
    ToolCall { data: serde_json::Value },
    ToolResult { data: serde_json::Value },
    /// Generation finished; the stream ends after this.
    Done { data: serde_json::Value },
    /// Generation failed; the stream ends after this.
    Error { message: String },
    Status { text: String },
    Other { event: String, data: serde_json::Value },
}

impl ChatEvent {
    pub fn from_frame(frame: &EventFrame) -> Self {
        let payload = frame.payload_or_null();
        let text_field = |key: &str| {
            payload
                .get(key)
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        match frame.event.as_str() {
            "chat.content" => Self::Content {
                text: text_field("text"),
            },
            "chat.thinking" => Self::Thinking {
                text: text_field("text"),
            },
            "chat.tool_call" => Self::ToolCall { data: payload },
            "chat.tool_result" => Self::ToolResult { data: payload },
            "chat.done" => Self::Done { data: payload },
            "chat.error" => Self::Error {
                message: text_field("message"),
            },
            "chat.status" => Self::Status {
                text: text_field("status"),
            },
            other => Self::Other {
                event: other.to_string(),
                data: payload,
            },
        }
    }

    /// Whether this event ends the chat stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(event: &str, payload: serde_json::Value) -> EventFrame {
        EventFrame::new(event, payload)
    }

    #[test]
    fn content_and_thinking_carry_text() {
        let ev = ChatEvent::from_frame(&frame("chat.content", serde_json::json!({"text": "Hi"})));
        assert_eq!(ev, ChatEvent::Content { text: "Hi".into() });

        let ev = ChatEvent::from_frame(&frame("chat.thinking", serde_json::json!({"text": "hm"})));
        assert_eq!(ev, ChatEvent::Thinking { text: "hm".into() });
    }

    #[test]
    fn tool_events_carry_full_payload() {
        let payload = serde_json::json!({"tool": "exec", "args": {"cmd": "ls"}});
        let ev = ChatEvent::from_frame(&frame("chat.tool_call", payload.clone()));
        assert_eq!(ev, ChatEvent::ToolCall { data: payload });
    }

    #[test]
    fn done_and_error_are_terminal() {
        let done = ChatEvent::from_frame(&frame("chat.done", serde_json::json!({"tokens": 12})));
        assert!(done.is_terminal());

        let err = ChatEvent::from_frame(&frame("chat.error", serde_json::json!({"message": "boom"})));
        assert!(err.is_terminal());
        assert_eq!(
            err,
            ChatEvent::Error {
                message: "boom".into()
            }
        );

        let status = ChatEvent::from_frame(&frame("chat.status", serde_json::json!({"status": "thinking"})));
        assert!(!status.is_terminal());
    }

    #[test]
    fn unrecognized_names_pass_through() {
        let ev = ChatEvent::from_frame(&frame("chat.usage", serde_json::json!({"tokens": 3})));
        assert_eq!(
            ev,
            ChatEvent::Other {
                event: "chat.usage".into(),
                data: serde_json::json!({"tokens": 3}),
            }
        );
    }

    #[test]
    fn missing_text_fields_default_to_empty() {
        let ev = ChatEvent::from_frame(&frame("chat.content", serde_json::json!({})));
        assert_eq!(ev, ChatEvent::Content { text: String::new() });
    }
}
