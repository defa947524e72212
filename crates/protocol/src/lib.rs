//! Wire protocol for the VibeLink relay.
//!
//! A deliberately small WebSocket subset (single-frame text messages, close
//! frames, no extensions) plus the JSON command convention spoken between the
//! host and the generator tools.

pub mod command;
pub mod constants;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod scene;

// Re-export primary types for convenience.
pub use command::{CommandEnvelope, NatureKind, Response, ToolCommand};
pub use error::{FrameError, HandshakeError};
pub use frame::{Decoded, Frame, Opcode};
pub use scene::{ObjectDump, SceneDump, SceneNode, Vec3};
