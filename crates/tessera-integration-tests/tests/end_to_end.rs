//! Painting against a real ledger node over the native wire.

use std::time::Duration;

use tessera_client::EditError;
use tessera_core::{Cell, Color};
use tessera_integration_tests::{TestNode, DEFAULT_COLOR};
use tokio::time::timeout;

const RED: Color = Color::from_u32(0xf83800);
const GREEN: Color = Color::from_u32(0x00b800);

async fn settle<T>(future: impl std::future::Future<Output = T>) -> T {
    timeout(Duration::from_secs(10), future)
        .await
        .expect("timed out")
}

#[tokio::test]
async fn whitelisted_painter_commits() {
    let node = TestNode::start(true).await;
    let (config, identity) = node.painter("alice");
    node.ledger.grant_access(identity).await.unwrap();

    let session = node.session(&config).await;
    let cell = Cell::new(4, 9);

    let edit = session.paint(cell, RED).await.unwrap();
    // Shown before the ledger commits anything
    assert_eq!(session.display_color(cell).await, Some(RED));

    let confirmed = settle(edit.resolution()).await.unwrap();
    assert_eq!(confirmed.cell, cell);
    assert_eq!(confirmed.color, RED);

    assert_eq!(node.ledger.get_color(cell).await.unwrap(), RED);
    assert_eq!(session.display_color(cell).await, Some(RED));
    assert!(!session.engine().is_pending(cell).await);
}

#[tokio::test]
async fn painter_outside_whitelist_is_denied() {
    let node = TestNode::start(true).await;
    let (config, _identity) = node.painter("mallory");

    let session = node.session(&config).await;
    let cell = Cell::new(0, 0);

    let edit = session.paint(cell, RED).await.unwrap();
    assert_eq!(
        settle(edit.resolution()).await.err(),
        Some(EditError::AccessDenied)
    );

    // The optimistic color is rolled back
    assert_eq!(session.display_color(cell).await, Some(DEFAULT_COLOR));
    assert_eq!(node.ledger.get_color(cell).await.unwrap(), DEFAULT_COLOR);
}

#[tokio::test]
async fn open_grid_accepts_anyone() {
    let node = TestNode::start(false).await;
    let (config, _identity) = node.painter("bob");

    let session = node.session(&config).await;
    let edit = session.paint(Cell::new(15, 15), GREEN).await.unwrap();
    settle(edit.resolution()).await.unwrap();
}

#[tokio::test]
async fn paused_grid_reports_inactive() {
    let node = TestNode::start(false).await;
    let (config, _identity) = node.painter("carol");
    node.ledger.pause().await.unwrap();

    let session = node.session(&config).await;
    let edit = session.paint(Cell::new(1, 1), RED).await.unwrap();
    assert_eq!(
        settle(edit.resolution()).await.err(),
        Some(EditError::Inactive)
    );

    node.ledger.resume().await.unwrap();
    let edit = session.paint(Cell::new(1, 1), RED).await.unwrap();
    settle(edit.resolution()).await.unwrap();
}

#[tokio::test]
async fn repainting_the_same_color_is_a_no_op() {
    let node = TestNode::start(false).await;
    let (config, _identity) = node.painter("dave");

    let session = node.session(&config).await;
    assert_eq!(
        session.paint(Cell::new(2, 2), DEFAULT_COLOR).await.err(),
        Some(EditError::NoOp)
    );
    assert_eq!(session.engine().pending_count().await, 0);
}

#[tokio::test]
async fn missing_key_file_fails_before_submitting() {
    let node = TestNode::start(false).await;
    let session = node.session(&node.anonymous()).await;
    let before = node.ledger.sequence().await;

    assert_eq!(
        session.paint(Cell::new(2, 2), RED).await.err(),
        Some(EditError::EnvironmentMissing)
    );
    assert_eq!(node.ledger.sequence().await, before);
}

#[tokio::test]
async fn other_painters_see_the_edit() {
    let node = TestNode::start(false).await;
    let (alice, _) = node.painter("alice");
    let (bob, _) = node.painter("bob");

    let painter = node.session(&alice).await;
    let watcher = node.session(&bob).await;
    let mut observed = watcher.engine().replica().observe();

    let cell = Cell::new(7, 3);
    let edit = painter.paint(cell, GREEN).await.unwrap();
    let confirmed = settle(edit.resolution()).await.unwrap();

    let event = settle(async {
        loop {
            let event = observed.recv().await.unwrap();
            if event.cell == cell {
                return event;
            }
        }
    })
    .await;
    assert_eq!(event.sequence, confirmed.sequence);
    assert_eq!(watcher.display_color(cell).await, Some(GREEN));
}

#[tokio::test]
async fn access_request_reaches_the_owner() {
    let node = TestNode::start(true).await;
    let (config, identity) = node.painter("erin");

    let session = node.session(&config).await;
    session
        .request_access("My email address is erin@example.com")
        .await
        .unwrap();

    let requests = node.ledger.access_requests().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].identity, identity);
    assert_eq!(requests[0].message, "My email address is erin@example.com");
}

#[tokio::test]
async fn fixed_grid_id_must_match() {
    let node = TestNode::start(false).await;
    let (mut config, _) = node.painter("frank");

    config.grid = tessera_client::GridSelector::Fixed(node.ledger.grid_id().await);
    node.session(&config).await;

    config.grid = tessera_client::GridSelector::Fixed(tessera_core::GridId::from_bytes([9; 32]));
    assert!(tessera_client::RemoteSession::connect(&config).await.is_err());
}
