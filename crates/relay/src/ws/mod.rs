// WebSocket transport: one task per connection bridging frames to the relay
// dispatcher.

mod handler;
pub mod protocol;

pub use handler::router;
