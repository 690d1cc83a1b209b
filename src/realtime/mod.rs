//! Push channel: who is connected, what they listen to, and how events
//! reach them.

pub mod broadcaster;
pub mod events;
pub mod registry;
pub mod socket;

pub use broadcaster::{EventSink, LocalBroadcaster};
pub use events::{Event, Topic};
pub use registry::{ChannelId, ConnectionRegistry};
