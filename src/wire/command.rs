//! OSC-style control command encoding.
//!
//! Every outbound command, including zero-argument probes like
//! `/discovery` and `/getState`, is framed as an OSC 1.0 message: a
//! null-padded address string, a null-padded type-tag string prefixed
//! with `,`, then the argument bytes themselves, each block padded out
//! to a 4-byte boundary.

use std::fmt;

/// A single OSC argument.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandArg {
    Int(i32),
    Float(f32),
    Str(String),
    /// Encoded as an `i` (int32) argument of `0` or `1`, matching the
    /// device firmware's OSC dialect rather than the `T`/`F` no-payload
    /// type tags of the full OSC spec. Control-port callers follow this
    /// with a trailing zero-int pad argument (see
    /// `DeviceController::send_control`), a protocol convention this
    /// encoder itself is agnostic to.
    Bool(bool),
}

impl fmt::Display for CommandArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandArg::Int(v) => write!(f, "{v}"),
            CommandArg::Float(v) => write!(f, "{v}"),
            CommandArg::Str(v) => write!(f, "{v}"),
            CommandArg::Bool(v) => write!(f, "{v}"),
        }
    }
}

fn pad_to_multiple_of_4(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

fn push_osc_string(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
    pad_to_multiple_of_4(buf);
}

/// Encode an OSC message addressed to `path` carrying `args`.
pub fn encode_command(path: &str, args: &[CommandArg]) -> Vec<u8> {
    let mut buf = Vec::new();
    push_osc_string(&mut buf, path);

    let mut type_tags = String::from(",");
    for arg in args {
        type_tags.push(match arg {
            CommandArg::Int(_) | CommandArg::Bool(_) => 'i',
            CommandArg::Float(_) => 'f',
            CommandArg::Str(_) => 's',
        });
    }
    push_osc_string(&mut buf, &type_tags);

    for arg in args {
        match arg {
            CommandArg::Int(v) => buf.extend_from_slice(&v.to_be_bytes()),
            CommandArg::Bool(v) => buf.extend_from_slice(&(*v as i32).to_be_bytes()),
            CommandArg::Float(v) => buf.extend_from_slice(&v.to_be_bytes()),
            CommandArg::Str(v) => push_osc_string(&mut buf, v),
        }
    }

    buf
}
