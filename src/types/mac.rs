//! MAC address normalization.
//!
//! Accepts colon-separated, hyphen-separated, and unseparated hex forms
//! and canonicalizes to lowercase, colon-separated. Any other length or
//! a non-hex character is rejected.

use std::fmt;

use crate::error::Error;

/// A MAC address in canonical lowercase colon-separated form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Parse and normalize a MAC address in any of the three accepted forms.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let stripped: String = input
            .chars()
            .filter(|c| *c != ':' && *c != '-')
            .collect();

        if stripped.len() != 12 || !stripped.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidMac(input.to_string()));
        }

        let mut octets = [0u8; 6];
        for (i, octet) in octets.iter_mut().enumerate() {
            let byte_str = &stripped[i * 2..i * 2 + 2];
            *octet = u8::from_str_radix(byte_str, 16).map_err(|_| Error::InvalidMac(input.to_string()))?;
        }

        Ok(MacAddress(octets))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}
