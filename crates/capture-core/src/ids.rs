use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Address of the top-level frame's controller endpoint.
pub const TOP_ADDRESS: &str = "top";
/// Broadcast address matching every frame agent in a tab.
pub const ALL_FRAMES_ADDRESS: &str = "*";
/// Address of the background controller.
pub const CONTROLLER_ADDRESS: &str = "background";

/// Session-unique identity of one frame agent.
///
/// A UUIDv4 string built from a cryptographically secure generator. Created
/// once when the agent starts and used as the source address of every
/// outbound message.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameIdentity(String);

impl FrameIdentity {
    /// Generate a fresh identity from the operating system's CSPRNG.
    pub fn new() -> Self {
        Self::generate(&mut OsRng)
    }

    /// Generate an identity from a caller-supplied CSPRNG.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 16];
        rng.fill_bytes(&mut bytes);
        let uuid = uuid::Builder::from_random_bytes(bytes).into_uuid();
        Self(uuid.hyphenated().to_string())
    }

    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for FrameIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FrameIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for FrameIdentity {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

impl AsRef<str> for FrameIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Routing address carried in the `targetFrameIdentity` field of a message.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Address {
    Top,
    AllFrames,
    Controller,
    Frame(FrameIdentity),
}

impl Address {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Top => TOP_ADDRESS,
            Self::AllFrames => ALL_FRAMES_ADDRESS,
            Self::Controller => CONTROLLER_ADDRESS,
            Self::Frame(id) => id.as_str(),
        }
    }

    /// Whether a message sent to this address should be handled by `frame`.
    pub fn matches(&self, frame: &FrameIdentity) -> bool {
        match self {
            Self::AllFrames => true,
            Self::Frame(id) => id == frame,
            Self::Top | Self::Controller => false,
        }
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        match s.as_str() {
            TOP_ADDRESS => Self::Top,
            ALL_FRAMES_ADDRESS => Self::AllFrames,
            CONTROLLER_ADDRESS => Self::Controller,
            _ => Self::Frame(FrameIdentity(s)),
        }
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.as_str().to_owned()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
