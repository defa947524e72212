use std::time::Duration;

/// Default TCP port the host listens on.
pub const DEFAULT_PORT: u16 = 8085;

/// GUID appended to the client key when computing `Sec-WebSocket-Accept`
/// (RFC 6455 §4.2.2).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Largest payload a single inbound frame may declare (16 MB).
///
/// Scene dumps and generator commands are small JSON documents; anything
/// bigger than this is treated as a corrupt frame.
pub const MAX_FRAME_PAYLOAD: usize = 16 * 1024 * 1024;

/// Upper bound on the size of an HTTP upgrade request (headers included).
pub const MAX_HANDSHAKE_SIZE: usize = 8 * 1024;

/// Time a freshly accepted socket has to complete the upgrade handshake.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Marker that selects the local hierarchy dump command.
pub const CMD_DUMP_HIERARCHY: &str = "dump_hierarchy";

/// Marker that selects the local liveness check.
pub const CMD_PING: &str = "ping";

/// Relay command: build a house model in the generator tool.
pub const CMD_GENERATE_HOUSE: &str = "generate_house";

/// Relay command: build a tree or rock model in the generator tool.
pub const CMD_GENERATE_NATURE: &str = "generate_nature";

/// Relay command: build a rigged humanoid in the generator tool.
pub const CMD_GENERATE_HUMANOID: &str = "generate_humanoid";

/// Scene name reported when the host has no scene loaded.
pub const NO_ACTIVE_SCENE: &str = "No Active Scene";
