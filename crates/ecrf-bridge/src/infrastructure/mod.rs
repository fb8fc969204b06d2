//! Infrastructure layer: serial device session, sample queue, streamer, and
//! the RTL-TCP server.

pub mod chunk_queue;
pub mod device_session;
pub mod server;
pub mod streamer;

pub use chunk_queue::{ChunkQueue, SampleChunk};
pub use device_session::{DeviceError, DeviceSession};
pub use server::{BridgeError, BridgeServer};
