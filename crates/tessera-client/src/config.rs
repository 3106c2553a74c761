//! Client configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tessera_core::GridId;

use crate::error::{ClientError, Result};

/// Which grid the client expects the ledger to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridSelector {
    /// Exactly this grid; anything else is a ledger failure.
    Fixed(GridId),
    /// Whatever grid the ledger most recently deployed.
    Latest,
}

impl GridSelector {
    /// Check a grid id reported by the ledger.
    pub fn check(&self, actual: &GridId) -> Result<()> {
        match self {
            GridSelector::Fixed(expected) if expected != actual => Err(ClientError::WrongGrid {
                expected: expected.to_hex(),
                actual: actual.to_hex(),
            }),
            _ => Ok(()),
        }
    }
}

impl FromStr for GridSelector {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "latest" => Ok(GridSelector::Latest),
            id => id
                .parse()
                .map(GridSelector::Fixed)
                .map_err(|e| ClientError::Config(format!("Invalid GRID_ADDRESS: {}", e))),
        }
    }
}

/// Configuration for a painting client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Native wire address of the ledger node
    pub ledger_addr: SocketAddr,

    /// Grid the client paints on
    pub grid: GridSelector,

    /// Full resync period for the read replica
    pub resync_interval: Duration,

    /// Signing key location
    pub key_file: PathBuf,
}

impl ClientConfig {
    /// Create config from environment variables.
    ///
    /// `GRID_ADDRESS` has no default and must be set explicitly.
    pub fn from_env() -> Result<Self> {
        let ledger_addr = parse_env("GRID_LEDGER_ADDR", "127.0.0.1:9100")?;

        let grid = std::env::var("GRID_ADDRESS")
            .map_err(|_| ClientError::Config("GRID_ADDRESS is not set".into()))?
            .parse()?;

        let resync_ms: u64 = parse_env("GRID_RESYNC_MS", "1000")?;
        if resync_ms == 0 {
            return Err(ClientError::Config("GRID_RESYNC_MS must be positive".into()));
        }

        let key_file = PathBuf::from(env_or("GRID_KEY_FILE", "./grid-key"));

        Ok(Self {
            ledger_addr,
            grid,
            resync_interval: Duration::from_millis(resync_ms),
            key_file,
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(name: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_or(name, default)
        .parse()
        .map_err(|e| ClientError::Config(format!("Invalid {}: {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_parsing() {
        assert_eq!("latest".parse::<GridSelector>().unwrap(), GridSelector::Latest);

        let id = GridId::from_bytes([5; 32]);
        assert_eq!(
            id.to_hex().parse::<GridSelector>().unwrap(),
            GridSelector::Fixed(id)
        );
        assert!("most-recent".parse::<GridSelector>().is_err());
    }

    #[test]
    fn fixed_selector_rejects_other_grids() {
        let id = GridId::from_bytes([5; 32]);
        let other = GridId::from_bytes([6; 32]);

        assert!(GridSelector::Fixed(id).check(&id).is_ok());
        assert!(matches!(
            GridSelector::Fixed(id).check(&other),
            Err(ClientError::WrongGrid { .. })
        ));
        assert!(GridSelector::Latest.check(&other).is_ok());
    }
}
