pub mod config;
pub mod error;
pub mod face;
pub mod hash;
pub mod name;
pub mod packet;

// Name and hashing exports
pub use name::{Name, NameParseError};
pub use hash::{hash_name, hash_prefixes, NameHash, PrefixHashes, MAX_PREFIX_COMPONENTS};

// Packet model exports
pub use packet::{
    DropReason, ForwardingDecision, MsgType, NakCode, ParsedPacket, PktType, DEFAULT_HOP_LIMIT,
};

// Face registry exports
pub use face::{FaceAddr, FaceId, FaceRegistry, FaceState};

// Configuration exports
pub use config::{ConfigError, ForwarderConfig, HelloConfig};

// Error exports
pub use error::{ForwardError, ParseError};
