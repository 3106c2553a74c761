//! Harness for end-to-end tests: a ledger node on an ephemeral port and
//! painting clients signing with their own key files.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tessera_client::{generate_key_file, ClientConfig, GridSelector, RemoteSession};
use tessera_core::{Color, GridDimensions, Identity};
use tessera_ledger::{Genesis, Ledger, Storage, WireServer};
use tokio::task::JoinHandle;

pub const DEFAULT_COLOR: Color = Color::from_u32(0xfcfcfc);

/// A running ledger node with only its wire server exposed.
pub struct TestNode {
    pub ledger: Arc<Ledger>,
    pub addr: std::net::SocketAddr,
    dir: TempDir,
    tasks: Vec<JoinHandle<()>>,
}

impl TestNode {
    pub async fn start(requires_access_checks: bool) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let storage = Arc::new(Storage::open(dir.path().join("ledger")).expect("storage"));
        let genesis = Genesis {
            dimensions: GridDimensions::new(16, 16),
            default_color: DEFAULT_COLOR,
            requires_access_checks,
            auto_initialize: true,
        };
        let ledger = Arc::new(Ledger::open(storage, &genesis).expect("ledger"));

        let server = WireServer::bind("127.0.0.1:0".parse().unwrap(), Arc::clone(&ledger))
            .await
            .expect("bind");
        let addr = server.local_addr().expect("local addr");

        let commits = tokio::spawn(Arc::clone(&ledger).run());
        let wire = tokio::spawn(async move {
            let _ = server.run().await;
        });

        Self {
            ledger,
            addr,
            dir,
            tasks: vec![commits, wire],
        }
    }

    /// Create a key file for a new painter and return its client config.
    pub fn painter(&self, name: &str) -> (ClientConfig, Identity) {
        let key_file = self.dir.path().join(format!("{}.key", name));
        let identity = generate_key_file(&key_file).expect("key file");
        let config = ClientConfig {
            ledger_addr: self.addr,
            grid: GridSelector::Latest,
            resync_interval: Duration::from_millis(200),
            key_file,
        };
        (config, identity)
    }

    /// A painter with no key file at all.
    pub fn anonymous(&self) -> ClientConfig {
        ClientConfig {
            ledger_addr: self.addr,
            grid: GridSelector::Latest,
            resync_interval: Duration::from_millis(200),
            key_file: self.dir.path().join("missing.key"),
        }
    }

    pub async fn session(&self, config: &ClientConfig) -> RemoteSession {
        RemoteSession::connect(config).await.expect("session")
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
