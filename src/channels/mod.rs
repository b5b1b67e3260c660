//! Channel abstraction for message I/O.

pub mod channel;
pub mod cli;
pub mod qr;
pub mod whatsapp;

pub use channel::*;
pub use cli::CliChannel;
pub use qr::render_pairing_qr;
pub use whatsapp::WhatsAppChannel;
