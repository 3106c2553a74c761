//! Native wire server for Rust clients.
//!
//! Every TCP connection starts with one [`WireRequest`] line. Submissions
//! stay open until the transaction is confirmed or rejected; subscriptions
//! stay open until either side hangs up. A subscriber that falls behind the
//! broadcast buffer is disconnected so that it resubscribes with a fresh
//! snapshot.

use std::net::SocketAddr;
use std::sync::Arc;

use tessera_core::wire::{decode_line, encode_line};
use tessera_core::{WireRequest, WireResponse};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::ledger::Ledger;

/// TCP listener serving the native wire protocol.
pub struct WireServer {
    listener: TcpListener,
    ledger: Arc<Ledger>,
}

impl WireServer {
    pub async fn bind(addr: SocketAddr, ledger: Arc<Ledger>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, ledger })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self) -> Result<()> {
        info!("Wire server listening on {}", self.local_addr()?);

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let ledger = Arc::clone(&self.ledger);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, ledger).await {
                            debug!("Wire connection {} closed: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept wire connection: {}", e);
                }
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, ledger: Arc<Ledger>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    if reader.read_line(&mut line).await? == 0 {
        return Ok(());
    }

    let request = match decode_line::<WireRequest>(&line) {
        Ok(request) => request,
        Err(e) => {
            let error = WireResponse::Error {
                error: format!("Invalid request: {}", e),
            };
            return send(&mut writer, &error).await;
        }
    };

    match request {
        WireRequest::Snapshot => {
            let response = match ledger.snapshot().await {
                Ok(snapshot) => WireResponse::Snapshot { snapshot },
                Err(e) => WireResponse::Error {
                    error: e.to_string(),
                },
            };
            send(&mut writer, &response).await
        }

        WireRequest::Policy => {
            let policy = ledger.policy().await;
            send(&mut writer, &WireResponse::Policy { policy }).await
        }

        WireRequest::HasAccess { identity } => {
            let value = ledger.has_access(&identity).await;
            send(&mut writer, &WireResponse::Bool { value }).await
        }

        WireRequest::RequestAccess { request } => {
            let response = match ledger.record_access_request(&request) {
                Ok(_) => WireResponse::Accepted,
                Err(e) => WireResponse::Error {
                    error: e.to_string(),
                },
            };
            send(&mut writer, &response).await
        }

        WireRequest::Submit { tx } => {
            let submitted = match ledger.submit(tx).await {
                Ok(submitted) => submitted,
                Err(e) => {
                    let rejected = WireResponse::Rejected {
                        code: e.reject_code(),
                        reason: e.to_string(),
                    };
                    return send(&mut writer, &rejected).await;
                }
            };

            let correlation = submitted.correlation;
            send(&mut writer, &WireResponse::Acknowledged { correlation }).await?;

            let response = match submitted.outcome().await {
                Ok(receipt) => WireResponse::Confirmed { receipt },
                Err(e) => WireResponse::Rejected {
                    code: e.reject_code(),
                    reason: e.to_string(),
                },
            };
            send(&mut writer, &response).await
        }

        WireRequest::Subscribe => {
            let mut events = ledger.subscribe();
            send(&mut writer, &WireResponse::Subscribed).await?;
            debug!("Wire subscriber attached");

            loop {
                line.clear();
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(event) => {
                            send(&mut writer, &WireResponse::Event { event }).await?;
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("Wire subscriber lagged by {} events, disconnecting", skipped);
                            return Ok(());
                        }
                        Err(RecvError::Closed) => return Ok(()),
                    },
                    read = reader.read_line(&mut line) => {
                        // Subscribers only listen; any EOF or error ends the stream
                        if read.unwrap_or(0) == 0 {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

async fn send(writer: &mut OwnedWriteHalf, response: &WireResponse) -> Result<()> {
    let line = encode_line(response)?;
    writer.write_all(line.as_bytes()).await?;
    Ok(())
}
