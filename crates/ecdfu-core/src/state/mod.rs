//! Update protocol state machine.
//!
//! - `handshake`: flush, start request and session negotiation
//! - `block`: block transfer engine
//! - `sections`: section iteration and completion signal
//! - `mode`: bootloader/runtime transitions

pub mod block;
pub mod handshake;
pub mod machine;
pub mod mode;
pub mod sections;

pub use block::{TransferOptions, transfer_block, transfer_section};
pub use handshake::negotiate;
pub use machine::{HandshakeMachine, HandshakeState};
pub use mode::{DeviceMode, ModeCommands, ModeFlags, attach, detach};
pub use sections::{send_done, write_sections};
