//! Event & DCP queues (C9): two single-producer-multi-consumer mailboxes
//! running on the main thread — the inbound UI event queue and the
//! outbound DCP transaction queue talking to the display peer over a pair
//! of named pipes.

mod event;
mod queue;
mod transport;

pub use event::{EventQueue, UiEvent};
pub use queue::{DcpQueue, TransactionOutcome};
pub use transport::{Ack, DcpError, DcpTransport, PipeTransport};
