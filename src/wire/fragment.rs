//! Fragment header wire format.
//!
//! A fragmented state datagram is a 4-byte header followed by a raw
//! payload slice:
//!
//! ```text
//! +---------+------------------+------------------+----------+
//! | marker  | total_fragments  | fragment_index    | group_id |
//! | 1 byte  | 1 byte           | 1 byte            | 1 byte   |
//! +---------+------------------+------------------+----------+
//! ```
//!
//! All fields are single bytes, so there is no endianness to worry
//! about. `Packet` is a thin, zero-copy accessor over a byte buffer;
//! `Repr` is the validated, owned representation used once a datagram
//! has been accepted.

use std::fmt;

/// Value of the marker byte identifying a fragment header.
pub const MARKER: u8 = 0x46;

mod field {
    use std::ops::Range;

    pub const MARKER: usize = 0;
    pub const TOTAL_FRAGMENTS: usize = 1;
    pub const FRAGMENT_INDEX: usize = 2;
    pub const GROUP_ID: usize = 3;
    pub const PAYLOAD: Range<usize> = 4..usize::MAX;
}

/// A view over a byte buffer believed to hold a fragment header.
#[derive(Debug)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

/// Errors recognizing a fragment header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    TooShort,
    BadMarker,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TooShort => write!(f, "datagram shorter than the fragment header"),
            Error::BadMarker => write!(f, "marker byte does not match a fragment header"),
        }
    }
}

impl std::error::Error for Error {}

impl<T: AsRef<[u8]>> Packet<T> {
    pub fn new_unchecked(buffer: T) -> Packet<T> {
        Packet { buffer }
    }

    pub fn new_checked(buffer: T) -> Result<Packet<T>, Error> {
        let packet = Self::new_unchecked(buffer);
        packet.check_len()?;
        Ok(packet)
    }

    fn check_len(&self) -> Result<(), Error> {
        let data = self.buffer.as_ref();
        if data.len() < field::PAYLOAD.start {
            return Err(Error::TooShort);
        }
        if data[field::MARKER] != MARKER {
            return Err(Error::BadMarker);
        }
        Ok(())
    }

    pub fn marker(&self) -> u8 {
        self.buffer.as_ref()[field::MARKER]
    }

    pub fn total_fragments(&self) -> u8 {
        self.buffer.as_ref()[field::TOTAL_FRAGMENTS]
    }

    pub fn fragment_index(&self) -> u8 {
        self.buffer.as_ref()[field::FRAGMENT_INDEX]
    }

    pub fn group_id(&self) -> u8 {
        self.buffer.as_ref()[field::GROUP_ID]
    }

    pub fn payload(&self) -> &[u8] {
        let data = self.buffer.as_ref();
        &data[field::PAYLOAD.start..]
    }
}

/// The validated, owned representation of a fragment header plus its
/// payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repr {
    pub total_fragments: u8,
    pub fragment_index: u8,
    pub group_id: u8,
    pub payload: Vec<u8>,
}

impl Repr {
    pub fn parse<T: AsRef<[u8]>>(packet: &Packet<T>) -> Result<Repr, Error> {
        packet.check_len()?;
        Ok(Repr {
            total_fragments: packet.total_fragments(),
            fragment_index: packet.fragment_index(),
            group_id: packet.group_id(),
            payload: packet.payload().to_vec(),
        })
    }

    pub fn buffer_len(&self) -> usize {
        field::PAYLOAD.start + self.payload.len()
    }

    pub fn emit<T: AsRef<[u8]> + AsMut<[u8]>>(&self, packet: &mut Packet<T>) {
        let buffer = packet.buffer.as_mut();
        buffer[field::MARKER] = MARKER;
        buffer[field::TOTAL_FRAGMENTS] = self.total_fragments;
        buffer[field::FRAGMENT_INDEX] = self.fragment_index;
        buffer[field::GROUP_ID] = self.group_id;
        buffer[field::PAYLOAD.start..].copy_from_slice(&self.payload);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = vec![0u8; self.buffer_len()];
        let mut packet = Packet::new_unchecked(&mut buffer[..]);
        self.emit(&mut packet);
        buffer
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fragment {}/{} group={} ({} bytes)",
            self.fragment_index + 1,
            self.total_fragments,
            self.group_id,
            self.payload.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let repr = Repr {
            total_fragments: 3,
            fragment_index: 1,
            group_id: 7,
            payload: vec![1, 2, 3, 4],
        };
        let bytes = repr.to_bytes();
        let packet = Packet::new_checked(&bytes[..]).unwrap();
        let parsed = Repr::parse(&packet).unwrap();
        assert_eq!(parsed, repr);
    }

    #[test]
    fn rejects_short_buffer() {
        let bytes = [MARKER, 1, 0];
        assert_eq!(Packet::new_checked(&bytes[..]).unwrap_err(), Error::TooShort);
    }

    #[test]
    fn rejects_wrong_marker() {
        let bytes = [0x00, 1, 0, 0];
        assert_eq!(Packet::new_checked(&bytes[..]).unwrap_err(), Error::BadMarker);
    }

    #[test]
    fn single_fragment_group() {
        let repr = Repr {
            total_fragments: 1,
            fragment_index: 0,
            group_id: 0,
            payload: b"hello".to_vec(),
        };
        let bytes = repr.to_bytes();
        let packet = Packet::new_checked(&bytes[..]).unwrap();
        assert_eq!(packet.total_fragments(), 1);
        assert_eq!(packet.payload(), b"hello");
    }
}
