//! Server side of the real-time alert channel.
//!
//! Clients connect to `/ws/alerts/` and join the `alerts_stream` group.
//! Alerts and integration status updates published through the [`AlertHub`]
//! reach every connected client; client `ping` and `subscribe` frames are
//! answered in place.

pub mod auth;
pub mod consumer;
pub mod error;
pub mod hub;
pub mod server;

pub use auth::{Claims, TokenValidator};
pub use consumer::{Reply, reply_to};
pub use error::{AuthError, Result, StreamError};
pub use hub::{ALERTS_GROUP, AlertHub, IntegrationRef, IntegrationState};
pub use server::{ALERTS_WS_PATH, AlertStreamServer, HEALTH_PATH, StreamServerConfig};
