//! Typed operation wrappers over the generic RPC primitives.
//!
//! Each method shapes parameters into the expected object and unwraps the
//! expected payload key. No state, no extra validation; errors propagate
//! unchanged from [`GatewayClient::call`].

use std::time::Duration;

use {
    async_stream::try_stream,
    futures::{Stream, StreamExt},
    serde_json::{Value, json},
};

use crate::{
    chat::ChatEvent,
    client::{CHAT_TIMEOUT, GatewayClient},
    error::Result,
};

/// Config writes trigger a gateway restart and can outlive the default
/// deadline.
const CONFIG_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

fn array_field(payload: &Value, key: &str) -> Vec<Value> {
    payload
        .get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

impl GatewayClient {
    // ── Config ───────────────────────────────────────────────────────────

    /// Current gateway configuration.
    pub async fn config_get(&self) -> Result<Value> {
        let payload = self.call("config.get", None).await?;
        // Servers differ on whether they wrap the config object.
        Ok(payload.get("config").cloned().unwrap_or(payload))
    }

    /// JSON schema + uiHints for the config.
    pub async fn config_schema(&self) -> Result<Value> {
        self.call("config.schema", None).await
    }

    /// Patch the configuration (merges with existing). The gateway restarts
    /// after applying.
    pub async fn config_patch(&self, patch: Value) -> Result<Value> {
        self.call_with_timeout("config.patch", Some(json!({ "patch": patch })), CONFIG_WRITE_TIMEOUT)
            .await
    }

    /// Replace the entire configuration. The gateway restarts after
    /// applying.
    pub async fn config_apply(&self, config: Value) -> Result<Value> {
        self.call_with_timeout("config.apply", Some(json!({ "config": config })), CONFIG_WRITE_TIMEOUT)
            .await
    }

    // ── Status / models / agents ─────────────────────────────────────────

    pub async fn status(&self) -> Result<Value> {
        self.call("status", None).await
    }

    pub async fn models_list(&self) -> Result<Vec<Value>> {
        let payload = self.call("models.list", None).await?;
        Ok(array_field(&payload, "models"))
    }

    pub async fn agents_list(&self) -> Result<Vec<Value>> {
        let payload = self.call("agents.list", None).await?;
        Ok(array_field(&payload, "agents"))
    }

    pub async fn agent_get(&self, agent_id: &str) -> Result<Value> {
        self.call("agents.get", Some(json!({ "agentId": agent_id })))
            .await
    }

    // ── Workspace files ──────────────────────────────────────────────────

    /// List workspace files for an agent (usually `"main"`).
    pub async fn files_list(&self, agent_id: &str) -> Result<Vec<Value>> {
        let payload = self
            .call("agents.files.list", Some(json!({ "agentId": agent_id })))
            .await?;
        Ok(array_field(&payload, "files"))
    }

    /// Read a workspace file (e.g. `"SOUL.md"`).
    pub async fn file_get(&self, agent_id: &str, name: &str) -> Result<String> {
        let payload = self
            .call(
                "agents.files.get",
                Some(json!({ "agentId": agent_id, "name": name })),
            )
            .await?;
        Ok(payload
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    /// Write a workspace file.
    pub async fn file_set(&self, agent_id: &str, name: &str, content: &str) -> Result<Value> {
        self.call(
            "agents.files.set",
            Some(json!({ "agentId": agent_id, "name": name, "content": content })),
        )
        .await
    }

    // ── Chat / sessions ──────────────────────────────────────────────────

    pub async fn sessions_list(&self, limit: Option<u64>) -> Result<Vec<Value>> {
        let payload = self
            .call("sessions.list", Some(json!({ "limit": limit.unwrap_or(20) })))
            .await?;
        Ok(array_field(&payload, "sessions"))
    }

    pub async fn chat_history(
        &self,
        session_key: Option<&str>,
        limit: Option<u64>,
    ) -> Result<Vec<Value>> {
        let mut params = serde_json::Map::new();
        params.insert("limit".into(), json!(limit.unwrap_or(50)));
        if let Some(key) = session_key {
            params.insert("sessionKey".into(), json!(key));
        }
        let payload = self.call("chat.history", Some(Value::Object(params))).await?;
        Ok(array_field(&payload, "messages"))
    }

    /// Send a chat message and stream the agent's response as
    /// [`ChatEvent`]s. The stream ends at `chat.done` or `chat.error`.
    pub fn chat_send(
        &self,
        message: impl Into<String>,
        session_key: Option<String>,
        agent_id: Option<String>,
    ) -> impl Stream<Item = Result<ChatEvent>> + '_ {
        let mut params = serde_json::Map::new();
        params.insert("message".into(), json!(message.into()));
        if let Some(key) = session_key {
            params.insert("sessionKey".into(), json!(key));
        }
        if let Some(id) = agent_id {
            params.insert("agentId".into(), json!(id));
        }
        try_stream! {
            let inner = self.call_streaming(
                "chat.send",
                Value::Object(params),
                Some("chat.".into()),
                CHAT_TIMEOUT,
            );
            futures::pin_mut!(inner);
            while let Some(ev) = inner.next().await {
                let chat = ChatEvent::from_frame(&ev?);
                let terminal = chat.is_terminal();
                yield chat;
                if terminal {
                    break;
                }
            }
        }
    }

    /// Abort the current chat generation.
    pub async fn chat_abort(&self, session_key: Option<&str>) -> Result<Value> {
        let params = session_key.map(|key| json!({ "sessionKey": key }));
        self.call("chat.abort", params).await
    }

    // ── Cron ─────────────────────────────────────────────────────────────

    pub async fn cron_list(&self) -> Result<Vec<Value>> {
        let payload = self.call("cron.list", None).await?;
        Ok(array_field(&payload, "jobs"))
    }

    pub async fn cron_add(&self, job: Value) -> Result<Value> {
        self.call("cron.add", Some(json!({ "job": job }))).await
    }

    pub async fn cron_remove(&self, job_id: &str) -> Result<Value> {
        self.call("cron.remove", Some(json!({ "jobId": job_id })))
            .await
    }

    /// Trigger a cron job immediately.
    pub async fn cron_run(&self, job_id: &str) -> Result<Value> {
        self.call("cron.run", Some(json!({ "jobId": job_id }))).await
    }

    // ── Exec approvals ───────────────────────────────────────────────────

    pub async fn exec_approve(&self, exec_id: &str) -> Result<Value> {
        self.call("exec.approve", Some(json!({ "execId": exec_id })))
            .await
    }

    pub async fn exec_deny(&self, exec_id: &str) -> Result<Value> {
        self.call("exec.deny", Some(json!({ "execId": exec_id })))
            .await
    }
}
