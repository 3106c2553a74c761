//! Ledger node access over the native wire, and a key-file capability.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use ed25519_dalek::SigningKey;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::StreamExt;
use tessera_core::wire::{decode_line, encode_line};
use tessera_core::{
    message_signing_bytes, AccessRequest, GridSnapshot, Identity, PolicySnapshot, SetColor,
    Signature, SignedSetColor, WireRequest, WireResponse,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::capability::{
    Capability, CapabilityProvider, RawFailure, SubmissionSignal, SubmissionStream,
};
use crate::error::{ClientError, EditError, Result};
use crate::ledger::{ChangeStream, LedgerConnection};

/// One request on its own TCP connection.
struct Exchange {
    reader: BufReader<OwnedReadHalf>,
    // Dropping the write half would end a subscription on the node side
    _writer: OwnedWriteHalf,
    line: String,
}

impl Exchange {
    async fn open(addr: SocketAddr, request: &WireRequest) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (reader, mut writer) = stream.into_split();
        writer.write_all(encode_line(request)?.as_bytes()).await?;

        Ok(Self {
            reader: BufReader::new(reader),
            _writer: writer,
            line: String::new(),
        })
    }

    /// Next response, `None` once the node closes the connection.
    async fn next(&mut self) -> Result<Option<WireResponse>> {
        self.line.clear();
        if self.reader.read_line(&mut self.line).await? == 0 {
            return Ok(None);
        }
        Ok(Some(decode_line(&self.line)?))
    }

    async fn expect_one(mut self) -> Result<WireResponse> {
        match self.next().await? {
            Some(WireResponse::Error { error }) => Err(ClientError::Protocol(error)),
            Some(WireResponse::Rejected { code, reason }) => {
                Err(ClientError::Rejected { code, reason })
            }
            Some(response) => Ok(response),
            None => Err(ClientError::Protocol("connection closed".into())),
        }
    }
}

fn unexpected(response: WireResponse) -> ClientError {
    ClientError::Protocol(format!("unexpected response: {:?}", response))
}

/// A ledger node reached over the native wire.
#[derive(Debug, Clone)]
pub struct RemoteLedger {
    addr: SocketAddr,
}

impl RemoteLedger {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn policy(&self) -> Result<PolicySnapshot> {
        match Exchange::open(self.addr, &WireRequest::Policy)
            .await?
            .expect_one()
            .await?
        {
            WireResponse::Policy { policy } => Ok(policy),
            other => Err(unexpected(other)),
        }
    }

    pub async fn has_access(&self, identity: Identity) -> Result<bool> {
        match Exchange::open(self.addr, &WireRequest::HasAccess { identity })
            .await?
            .expect_one()
            .await?
        {
            WireResponse::Bool { value } => Ok(value),
            other => Err(unexpected(other)),
        }
    }

    /// Submit a signed transaction and report its lifecycle as signals.
    pub fn submit(&self, tx: SignedSetColor) -> SubmissionStream {
        let (signals, stream) = unbounded();
        let addr = self.addr;

        tokio::spawn(async move {
            if let Err(e) = forward_submission(addr, tx, &signals).await {
                let _ = signals.unbounded_send(SubmissionSignal::Failed(RawFailure::transport(
                    e.to_string(),
                )));
            }
        });

        stream.boxed()
    }
}

async fn forward_submission(
    addr: SocketAddr,
    tx: SignedSetColor,
    signals: &UnboundedSender<SubmissionSignal>,
) -> Result<()> {
    let mut exchange = Exchange::open(addr, &WireRequest::Submit { tx }).await?;

    while let Some(response) = exchange.next().await? {
        let (signal, terminal) = match response {
            WireResponse::Acknowledged { correlation } => {
                (SubmissionSignal::Acknowledged(correlation), false)
            }
            WireResponse::Confirmed { receipt } => (SubmissionSignal::Succeeded(receipt), true),
            WireResponse::Rejected { code, reason } => {
                (SubmissionSignal::Failed(RawFailure::ledger(code, reason)), true)
            }
            WireResponse::Error { error } => {
                (SubmissionSignal::Failed(RawFailure::transport(error)), true)
            }
            other => return Err(unexpected(other)),
        };
        if signals.unbounded_send(signal).is_err() || terminal {
            break;
        }
    }
    Ok(())
}

impl LedgerConnection for RemoteLedger {
    async fn snapshot(&self) -> Result<GridSnapshot> {
        match Exchange::open(self.addr, &WireRequest::Snapshot)
            .await?
            .expect_one()
            .await?
        {
            WireResponse::Snapshot { snapshot } => Ok(snapshot),
            other => Err(unexpected(other)),
        }
    }

    async fn subscribe(&self) -> Result<ChangeStream> {
        let mut exchange = Exchange::open(self.addr, &WireRequest::Subscribe).await?;
        match exchange.next().await? {
            Some(WireResponse::Subscribed) => {}
            Some(other) => return Err(unexpected(other)),
            None => return Err(ClientError::Protocol("connection closed".into())),
        }
        debug!("Subscribed to change events at {}", self.addr);

        let events = futures::stream::unfold(exchange, |mut exchange| async move {
            loop {
                match exchange.next().await {
                    Ok(Some(WireResponse::Event { event })) => return Some((event, exchange)),
                    Ok(Some(other)) => debug!("Ignoring {:?} on subscription", other),
                    Ok(None) => return None,
                    Err(e) => {
                        warn!("Subscription failed: {}", e);
                        return None;
                    }
                }
            }
        });
        Ok(events.boxed())
    }

    async fn request_access(&self, request: AccessRequest) -> Result<()> {
        Exchange::open(self.addr, &WireRequest::RequestAccess { request })
            .await?
            .expect_one()
            .await?;
        Ok(())
    }
}

/// Capabilities backed by an ed25519 key stored in a file.
///
/// The file holds the 32-byte secret as hex. A missing file means there is
/// no signing environment; an unreadable one counts as a refusal.
#[derive(Debug, Clone)]
pub struct KeyFileProvider {
    path: PathBuf,
    ledger: RemoteLedger,
}

impl KeyFileProvider {
    pub fn new(path: impl AsRef<Path>, ledger: RemoteLedger) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ledger,
        }
    }
}

impl CapabilityProvider for KeyFileProvider {
    type Capability = KeyCapability;

    async fn connect(&self) -> std::result::Result<KeyCapability, EditError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                warn!("Key file {:?} is not readable", self.path);
                return Err(EditError::CapabilityDenied);
            }
            Err(e) => {
                warn!("No key file at {:?}: {}", self.path, e);
                return Err(EditError::EnvironmentMissing);
            }
        };

        let key = parse_secret(&text).ok_or_else(|| {
            warn!("Key file {:?} does not hold a 32-byte hex secret", self.path);
            EditError::EnvironmentMissing
        })?;

        info!("Signing as {}", Identity::of(&key));
        Ok(KeyCapability {
            key,
            ledger: self.ledger.clone(),
        })
    }
}

fn parse_secret(text: &str) -> Option<SigningKey> {
    let mut secret = [0u8; 32];
    hex::decode_to_slice(text.trim(), &mut secret).ok()?;
    Some(SigningKey::from_bytes(&secret))
}

/// Identity of the key stored in a key file.
pub fn read_key_file_identity(path: impl AsRef<Path>) -> Result<Identity> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let key = parse_secret(&text).ok_or_else(|| {
        ClientError::Config(format!("{:?} does not hold a 32-byte hex secret", path))
    })?;
    Ok(Identity::of(&key))
}

/// Generate a new key file. Refuses to overwrite an existing one.
pub fn generate_key_file(path: impl AsRef<Path>) -> Result<Identity> {
    let path = path.as_ref();
    if path.exists() {
        return Err(ClientError::Config(format!("{:?} already exists", path)));
    }

    let key = SigningKey::generate(&mut rand::thread_rng());
    std::fs::write(path, hex::encode(key.to_bytes()) + "\n")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(Identity::of(&key))
}

/// A connected signer submitting through a [`RemoteLedger`].
pub struct KeyCapability {
    key: SigningKey,
    ledger: RemoteLedger,
}

impl Capability for KeyCapability {
    fn identities(&self) -> Vec<Identity> {
        vec![Identity::of(&self.key)]
    }

    async fn sign_message(&self, message: &str) -> std::result::Result<Signature, RawFailure> {
        Ok(Signature::sign(
            &self.key,
            &message_signing_bytes(message.as_bytes()),
        ))
    }

    fn submit(&self, payload: SetColor) -> SubmissionStream {
        self.ledger.submit(SignedSetColor::sign(payload, &self.key))
    }
}
