#![forbid(unsafe_code)]

//! Outbound HTTP seam.
//!
//! Providers only ever exchange small JSON payloads, so the trait stays at
//! the "send JSON, get JSON" level. Tests substitute canned responses; the
//! relay uses a shared [`ureq::Agent`].

use anyhow::{Context, Result};
use serde_json::Value;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub trait HttpTransport: Send + Sync {
    fn post_json(&self, url: &str, body: &Value) -> Result<Value>;
    fn get_json(&self, url: &str) -> Result<Value>;
}

pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl HttpTransport for UreqTransport {
    fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        let request = self.agent.post(url).set("Accept", "application/json");
        match request.send_json(body) {
            Ok(response) => response
                .into_json()
                .with_context(|| format!("decoding response from {url}")),
            // Some providers report their own failures with a 4xx status but
            // still attach a JSON body; surface that body to the caller.
            Err(ureq::Error::Status(_, response)) => response
                .into_json()
                .with_context(|| format!("decoding error body from {url}")),
            Err(err) => Err(err).with_context(|| format!("requesting {url}")),
        }
    }

    fn get_json(&self, url: &str) -> Result<Value> {
        let request = self.agent.get(url).set("Accept", "application/json");
        match request.call() {
            Ok(response) => response
                .into_json()
                .with_context(|| format!("decoding response from {url}")),
            Err(ureq::Error::Status(_, response)) => response
                .into_json()
                .with_context(|| format!("decoding error body from {url}")),
            Err(err) => Err(err).with_context(|| format!("requesting {url}")),
        }
    }
}
