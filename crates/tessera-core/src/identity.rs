//! Identities, signatures and opaque hash tokens.
//!
//! All of these are fixed-size byte strings with a lowercase hex text form,
//! which is also how they travel over the wire.

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

macro_rules! hex_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr, $what:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name([u8; $len]);

        impl $name {
            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                // Short form keeps logs readable
                write!(f, "{}({}…)", stringify!($name), &self.to_hex()[..8])
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self> {
                let mut bytes = [0u8; $len];
                hex::decode_to_slice(s.trim(), &mut bytes).map_err(|e| CoreError::InvalidHex {
                    what: $what,
                    reason: e.to_string(),
                })?;
                Ok(Self(bytes))
            }
        }

        impl TryFrom<String> for $name {
            type Error = CoreError;

            fn try_from(value: String) -> Result<Self> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.to_hex()
            }
        }
    };
}

hex_bytes!(
    /// A participant identity: an ed25519 verifying key.
    Identity,
    32,
    "identity"
);

hex_bytes!(
    /// An ed25519 signature.
    Signature,
    64,
    "signature"
);

hex_bytes!(
    /// Ledger transaction id, used to match an observed change event to the
    /// submission that caused it.
    CorrelationToken,
    32,
    "correlation token"
);

hex_bytes!(
    /// Identifier of one grid deployment.
    GridId,
    32,
    "grid id"
);

impl Identity {
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        Self(key.to_bytes())
    }

    /// The identity belonging to a signing key.
    pub fn of(key: &SigningKey) -> Self {
        Self::from_verifying_key(&key.verifying_key())
    }

    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_bytes(&self.0).map_err(|e| CoreError::InvalidIdentity(e.to_string()))
    }

    /// Verify that `signature` over `message` was made by this identity.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<()> {
        let key = self.verifying_key()?;
        let signature = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
        key.verify(message, &signature)
            .map_err(|_| CoreError::InvalidSignature)
    }
}

impl Signature {
    pub fn sign(key: &SigningKey, message: &[u8]) -> Self {
        Self(key.sign(message).to_bytes())
    }
}

impl CorrelationToken {
    pub fn digest(bytes: &[u8]) -> Self {
        Self(*blake3::hash(bytes).as_bytes())
    }
}

impl GridId {
    /// Derive the id of a deployment from its owner and a deployment nonce.
    pub fn derive(owner: &Identity, nonce: u64) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"tessera/grid-id/v1");
        hasher.update(owner.as_bytes());
        hasher.update(&nonce.to_be_bytes());
        Self(*hasher.finalize().as_bytes())
    }
}
