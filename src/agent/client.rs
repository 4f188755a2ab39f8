//! Agent side of the control protocol.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use crate::error::TransportError;
use crate::model::{Command, Hostname};
use crate::protocol::{ClientInfo, ClientsResponse, CommandReply, RegisterRequest, ReportRequest};

/// The four calls an agent makes against the aggregation server.
pub trait ControlPlane: Send + Sync {
    fn register(&self, request: &RegisterRequest) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn get_commands(
        &self,
        hostname: &Hostname,
    ) -> impl Future<Output = Result<Option<Command>, TransportError>> + Send;

    fn get_clients(
        &self,
    ) -> impl Future<Output = Result<BTreeMap<Hostname, ClientInfo>, TransportError>> + Send;

    fn report_results(&self, request: &ReportRequest) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// `reqwest`-backed client for a real server.
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpControlPlane {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("meshprobe/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Connect(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn map_err(&self, e: reqwest::Error) -> TransportError {
        TransportError::from_reqwest(e, self.timeout)
    }
}

impl ControlPlane for HttpControlPlane {
    async fn register(&self, request: &RegisterRequest) -> Result<(), TransportError> {
        self.client
            .post(self.url("register"))
            .json(request)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| self.map_err(e))?;
        Ok(())
    }

    async fn get_commands(&self, hostname: &Hostname) -> Result<Option<Command>, TransportError> {
        let reply: CommandReply = self
            .client
            .get(self.url("get_commands"))
            .query(&[("hostname", hostname.as_str())])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| self.map_err(e))?
            .json()
            .await
            .map_err(|e| self.map_err(e))?;
        Ok(reply.command)
    }

    async fn get_clients(&self) -> Result<BTreeMap<Hostname, ClientInfo>, TransportError> {
        let response: ClientsResponse = self
            .client
            .get(self.url("get_clients"))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| self.map_err(e))?
            .json()
            .await
            .map_err(|e| self.map_err(e))?;
        Ok(response.clients)
    }

    async fn report_results(&self, request: &ReportRequest) -> Result<(), TransportError> {
        self.client
            .post(self.url("report_results"))
            .json(request)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| self.map_err(e))?;
        Ok(())
    }
}
