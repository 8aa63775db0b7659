//! WebSocket fan-out module.
//!
//! This module pushes workflow state changes to live subscribers:
//! - Connection registry tracking every socket and its filter
//! - A single hub task draining merge outcomes into per-subscriber queues
//! - Heartbeat mechanism for connection health
//!
//! # Ordering
//!
//! All broadcasts flow through one hub task and each subscriber has one
//! FIFO queue, so the versions a subscriber observes for any single key
//! never decrease. A slow subscriber whose queue overflows is dropped
//! rather than allowed to stall or reorder everyone else.
//!
//! # Subscription
//!
//! A connection receives nothing until it sends a `subscribe` message
//! carrying its filter. Sending `subscribe` again replaces the filter.
//!
//! ```javascript
//! const ws = new WebSocket('ws://localhost:8080/ws');
//!
//! ws.onopen = () => {
//!     ws.send(JSON.stringify({
//!         type: 'subscribe',
//!         filter: { time_range: 'current_day', status: 'failure' },
//!         utc_offset: new Date().getTimezoneOffset()
//!     }));
//! };
//!
//! ws.onmessage = (event) => {
//!     const msg = JSON.parse(event.data);
//!     if (msg.type === 'workflow_update') {
//!         console.log('Workflow:', msg.data);
//!     }
//! };
//! ```

pub mod config;
pub mod connection;
pub mod handler;
pub mod hub;
pub mod message;

pub use config::WsConfig;
pub use connection::{ConnectionId, ConnectionRegistry, ConnectionState, SubscriberPhase};
pub use handler::ws_handler;
pub use hub::FanoutHub;
pub use message::{ClientMessage, ServerMessage};
