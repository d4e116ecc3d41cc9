//! Slack front end for the inventory bot.
//!
//! - **Socket Mode** (`socket`) - websocket connection to Slack, no public URL needed
//! - **Events** (`events`) - envelope parsing, addressing rules, dispatch
//! - **Commands** (`commands`) - the ordered command table and router
//! - **Handlers** (`handlers`) - commands executed against the bot session
//! - **Web API** (`web`) - replies and file uploads
//!
//! ```text
//! Socket Mode → EventDispatcher → MessageHandler → CommandRouter → InventoryCommandService
//!                                       ↓
//!                      ChatClient (thread reply or file upload)
//! ```

pub mod commands;
pub mod events;
pub mod handlers;
pub mod replies;
pub mod socket;
pub mod web;

#[cfg(test)]
mod test_support;

pub use commands::{CommandRequest, CommandRouter, CommandService, CommandTable};
pub use events::{EventDispatcher, MessageHandler};
pub use handlers::InventoryCommandService;
pub use replies::{Reply, ResultSet};
pub use socket::{ReconnectPolicy, SlackSocketTransport, SocketModeRunner};
pub use web::{ChatClient, ChatError, SlackWebClient};
