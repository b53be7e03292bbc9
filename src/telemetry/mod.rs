//! # Telemetry connection
//!
//! Everything that talks to the simulation engine's property server.
//!
//! ```text
//! telemetry/
//! ├── property_codec.rs - wire values into typed, comparable values
//! ├── registry.rs       - reference-counted subscriptions and value cache
//! ├── client.rs         - reconnecting connection task and public client
//! └── error.rs          - TelemetryError
//! ```
//!
//! Wire protocol (ASCII, CRLF terminated):
//!
//! | Direction | Message |
//! |---|---|
//! | S→C | `<banner prefix> ...` once per connection |
//! | C→S | `subscribe <name>` / `unsubscribe <name>` |
//! | C→S | `trigger-input-pressed <name>` / `trigger-input-released <name>` |
//! | S→C | `Property <name> <type> <value\|(null)>` |
//! | C→S | `controlmapper-role-pressed/-released <ownerId> <roleName>` on a side connection |

pub mod client;
pub mod error;
pub mod property_codec;
pub mod registry;

pub use client::{ClientSettings, ConnectionClient, ConnectionState};
pub use error::TelemetryError;
pub use property_codec::{PropertyType, PropertyValue, TypedValue};
pub use registry::{property_key, PropertyReceiver, PropertyUpdate};
