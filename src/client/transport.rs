//! # RPC Transport
//!
//! Issues exactly one deadline-bounded unary call per invocation.
//!
//! Every call opens its own TCP connection to the discovery service, writes a
//! single request frame, reads a single reply frame and closes the connection.
//! Connections are never pooled: the [`Connection`] is owned by the call and is
//! released on every exit path, including when the deadline fires and the
//! in-flight future is dropped.
//!
//! The deadline bounds the whole exchange, connect included.
//!
//! Traffic is plaintext.

use log::{debug, info, warn};
use std::time::Duration;
use tokio::net::TcpStream;

use crate::common::connection::Connection;
use crate::common::error::{DiscoveryError, Result};
use crate::common::messages::{
    CloudletResponse, DiscoveryRequest, FindStatus, GpsLocationStatus, Message,
};

/// One-shot RPC client for the discovery service at `host:port`.
#[derive(Debug, Clone)]
pub struct RpcTransport {
    host: String,
    port: u16,
}

impl RpcTransport {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Ask for the nearest cloudlet able to serve `request.app_id`.
    ///
    /// # Errors
    /// - `InvalidRequest` if the request has no version or application id (nothing is sent)
    /// - `Transport` on connect or I/O failure
    /// - `DeadlineExceeded` if no reply arrives within `deadline`
    /// - `NoCloudlet` if the service found nothing
    /// - `MalformedReply` / `Rejected` for unusable replies
    pub async fn find_cloudlet(
        &self,
        request: &DiscoveryRequest,
        deadline: Duration,
    ) -> Result<CloudletResponse> {
        validate(request)?;
        let reply = self
            .call(
                Message::FindCloudlet {
                    request: request.clone(),
                },
                deadline,
            )
            .await?;
        cloudlet_from_reply(reply)
    }

    /// Ask the service whether the request's GPS location matches the carrier's view.
    ///
    /// `Ok(false)` means the service explicitly said no. Every failure to get a
    /// clear answer is an `Err`.
    pub async fn verify_location(
        &self,
        request: &DiscoveryRequest,
        deadline: Duration,
    ) -> Result<bool> {
        validate(request)?;
        let reply = self
            .call(
                Message::VerifyLocation {
                    request: request.clone(),
                },
                deadline,
            )
            .await?;
        verification_from_reply(reply)
    }

    async fn call(&self, message: Message, deadline: Duration) -> Result<Message> {
        let address = self.address();
        info!("📤 {} → {} (deadline {:?})", message.name(), address, deadline);

        match tokio::time::timeout(deadline, exchange(&address, &message)).await {
            Ok(Ok(reply)) => {
                info!("📨 {} ← {}", reply.name(), address);
                Ok(reply)
            }
            Ok(Err(e)) => {
                warn!("{} to {} failed: {}", message.name(), address, e);
                Err(e)
            }
            Err(_) => {
                warn!(
                    "⏱️  {} to {} timed out after {:?}",
                    message.name(),
                    address,
                    deadline
                );
                Err(DiscoveryError::DeadlineExceeded(deadline))
            }
        }
    }
}

/// Connect, send one frame, read one frame, close.
async fn exchange(address: &str, message: &Message) -> Result<Message> {
    let stream = TcpStream::connect(address)
        .await
        .map_err(|e| DiscoveryError::Transport(format!("connect to {} failed: {}", address, e)))?;
    let mut conn = Connection::new(stream);

    let outcome = round_trip(&mut conn, message).await;
    conn.close().await;
    debug!("Closed connection to {}", address);

    outcome?.ok_or_else(|| {
        DiscoveryError::Transport(format!("{} closed the connection before replying", address))
    })
}

async fn round_trip(conn: &mut Connection, message: &Message) -> Result<Option<Message>> {
    conn.write_message(message).await?;
    conn.read_message().await
}

fn validate(request: &DiscoveryRequest) -> Result<()> {
    if request.ver == 0 {
        return Err(DiscoveryError::InvalidRequest(
            "protocol version is not set".to_string(),
        ));
    }
    if request.app_id.is_empty() {
        return Err(DiscoveryError::InvalidRequest(
            "application identifier is not set".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn cloudlet_from_reply(reply: Message) -> Result<CloudletResponse> {
    match reply {
        Message::CloudletReply {
            status: FindStatus::Found,
            server,
            service,
            ..
        } => {
            if server.is_empty() {
                return Err(DiscoveryError::MalformedReply(
                    "cloudlet found but no server named".to_string(),
                ));
            }
            Ok(CloudletResponse { server, service })
        }
        Message::CloudletReply {
            status: FindStatus::NotFound,
            ..
        } => Err(DiscoveryError::NoCloudlet),
        Message::CloudletReply {
            status: FindStatus::Unknown,
            ..
        } => Err(DiscoveryError::MalformedReply(
            "cloudlet reply has unknown status".to_string(),
        )),
        Message::Error { message } => Err(DiscoveryError::Rejected(message)),
        other => Err(DiscoveryError::MalformedReply(format!(
            "expected CloudletReply, got {}",
            other.name()
        ))),
    }
}

pub(crate) fn verification_from_reply(reply: Message) -> Result<bool> {
    match reply {
        Message::VerifyReply {
            gps_location_status,
            ..
        } => match gps_location_status {
            GpsLocationStatus::Verified | GpsLocationStatus::RoamingCountryMatch => Ok(true),
            GpsLocationStatus::MismatchSameCountry
            | GpsLocationStatus::MismatchOtherCountry
            | GpsLocationStatus::RoamingCountryMismatch => Ok(false),
            GpsLocationStatus::Unknown => Err(DiscoveryError::MalformedReply(
                "verification status unknown".to_string(),
            )),
            GpsLocationStatus::ErrorUnauthorized | GpsLocationStatus::ErrorOther => Err(
                DiscoveryError::Rejected(format!("verification failed: {:?}", gps_location_status)),
            ),
        },
        Message::Error { message } => Err(DiscoveryError::Rejected(message)),
        other => Err(DiscoveryError::MalformedReply(format!(
            "expected VerifyReply, got {}",
            other.name()
        ))),
    }
}
