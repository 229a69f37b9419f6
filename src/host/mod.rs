//! Host module for the persistent metadata worker process

pub mod framing;
pub mod process_channel;

pub use framing::{FrameError, RawRecord, ResponseFramer, READY_SENTINEL};
pub use process_channel::{
    ChannelError, ChannelOptions, ChannelState, ProcessChannel, Response, ResponseKind,
    EXECUTE_MARKER, STOP_COMMAND,
};

#[cfg(test)]
pub(crate) mod testing;
