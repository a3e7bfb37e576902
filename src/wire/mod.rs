//! Wire formats: fragment headers, discovery replies, outbound commands.

pub mod command;
pub mod discovery;
pub mod fragment;

pub use command::{encode_command, CommandArg};
pub use discovery::{parse_reply, DiscoveryReply};
pub use fragment::{Packet as FragmentPacket, Repr as FragmentRepr};
