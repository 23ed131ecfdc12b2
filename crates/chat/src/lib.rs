//! Chat side of recarga: everything between the transport and the stores.
//!
//! - **Transport** (`transport`) - adapter trait and the reconnecting runner
//! - **Connection** (`connection`) - shared connection state and pairing code
//! - **Events** (`events`) - inbound/outbound types and the per-identity dispatcher
//! - **Funnel** (`funnel`) - end-user conversation from catalog to pending order
//! - **Dialogs** (`dialogs`) - operator dialogs and command handling
//! - **Commands** (`commands`) - operator slash-command grammar and router
//! - **Messages** (`messages`) - text rendering
//!
//! ```text
//! ChatTransport → TransportRunner → EventDispatcher ─┬→ OperatorService → CommandRouter
//!                        ↑                           └→ FunnelService
//!                   Outbound texts ←─────────────────────────┘
//! ```

pub mod commands;
pub mod connection;
pub mod dialogs;
pub mod events;
pub mod funnel;
pub mod messages;
pub mod stores;
pub mod transport;

pub use connection::{ConnectionHandle, ConnectionSnapshot, ConnectionState};
pub use events::{Attachment, EventDispatcher, InboundMessage, Outbound};
pub use stores::Stores;
pub use transport::{ChatTransport, NoopTransport, ReconnectPolicy, TransportError, TransportRunner};
