//! Channel buffer shared between collaborators and the transmit thread

pub mod buffer;

pub use buffer::{clamp_level, create_shared_buffer, ChannelBuffer, SharedChannelBuffer};
