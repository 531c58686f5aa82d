//! Engine.IO long-polling transport.
//!
//! Used when the WebSocket cannot be opened. The Socket.IO session is the
//! same; packets travel in plain HTTP bodies instead:
//!
//! ```text
//! GET  {push_url}/socket.io/?EIO=4&transport=polling           -> open packet
//! GET  {push_url}/socket.io/?EIO=4&transport=polling&sid=<sid> -> queued packets
//! POST {push_url}/socket.io/?EIO=4&transport=polling&sid=<sid> <- client packets
//! ```
//!
//! Calls block; the push task runs them on the blocking pool.

use std::time::Duration;

use url::Url;

use crate::error::SyncError;
use crate::frame::{decode_payload, encode_payload, EnginePacket};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct PollingClient {
    agent: ureq::Agent,
    url: Url,
}

impl PollingClient {
    pub fn new(url: Url) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .build();
        Self { agent, url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Client bound to the session id from the `open` packet.
    pub fn with_sid(&self, sid: &str) -> Self {
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair("sid", sid);
        Self {
            agent: self.agent.clone(),
            url,
        }
    }

    /// Wait for the next batch of server packets.
    pub fn poll(&self) -> Result<Vec<EnginePacket>, SyncError> {
        let response = self
            .agent
            .get(self.url.as_str())
            .call()
            .map_err(|err| request_error(&self.url, err))?;
        let body = response
            .into_string()
            .map_err(|err| SyncError::Connection(format!("reading poll response failed: {err}")))?;
        Ok(decode_payload(&body)?)
    }

    pub fn send(&self, packets: &[EnginePacket]) -> Result<(), SyncError> {
        if packets.is_empty() {
            return Ok(());
        }
        let body = encode_payload(packets)?;
        self.agent
            .post(self.url.as_str())
            .set("Content-Type", "text/plain;charset=UTF-8")
            .send_string(&body)
            .map_err(|err| request_error(&self.url, err))?;
        tracing::trace!(count = packets.len(), "posted engine packets");
        Ok(())
    }
}

fn request_error(url: &Url, err: ureq::Error) -> SyncError {
    match err {
        ureq::Error::Status(code, _) => {
            SyncError::Connection(format!("{url} answered HTTP {code}"))
        }
        ureq::Error::Transport(transport) => {
            SyncError::Connection(format!("request to {url} failed: {transport}"))
        }
    }
}
