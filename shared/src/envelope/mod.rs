mod envelope;
mod packet;

pub use envelope::Envelope;
pub use packet::{Packet, Reliability};
