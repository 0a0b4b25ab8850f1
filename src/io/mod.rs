//! I/O layer - process management and framed transport
//!
//! Fundamental I/O building blocks with no knowledge of the protocol layer:
//!
//! - **Process**: language-server child process lifecycle with stdio wiring
//! - **Transport**: framed payload exchange over the child's stdin/stdout

pub mod process;
pub mod transport;

// Re-export main types for convenience
pub use process::{
    ChildProcessManager, ProcessError, ProcessExitEvent, ProcessExitHandler, ProcessState,
    StopMode,
};
pub use transport::{FrameCodec, FrameError, StdioTransport, Transport};

#[cfg(test)]
pub use transport::{MockTransport, MockTransportHandle};
