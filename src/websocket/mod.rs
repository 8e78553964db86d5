//! WebSocket Real-Time Streaming
//!
//! Relays device events to dashboard viewers.
//!
//! ## Architecture
//!
//! - **BroadcastHub**: single loop owning every viewer connection
//! - **Handler**: WebSocket upgrade plus per-connection writer and reader
//! - **Messages**: JSON envelopes sent to viewers
//!
//! Viewers connect to `/ws` and receive every event; there is no
//! subscription protocol.
//!
//! ```javascript
//! const ws = new WebSocket('ws://localhost:8080/ws');
//! ws.onmessage = (event) => console.log(JSON.parse(event.data));
//! ```

mod handler;
mod hub;
mod messages;

pub use handler::websocket_handler;
pub use hub::{BroadcastHub, Frame, HubConfig, HubError, HubHandle, Viewer, ViewerId, ViewerState};
pub use messages::ViewerEnvelope;
