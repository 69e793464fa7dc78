//! Certificate serial numbers
//!
//! Serials are 160 random bits from the OS CSPRNG. They are not derived from
//! the clock or a counter, so two certificates issued in the same second (or
//! by two operator replicas) cannot collide in practice.

use rand::rngs::OsRng;
use rand::RngCore;
use rcgen::SerialNumber;

/// Length of a serial in octets, the RFC 5280 maximum
pub const SERIAL_LEN: usize = 20;

/// Source of certificate serial numbers
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialNumberSource;

impl SerialNumberSource {
    pub fn new() -> Self {
        Self
    }

    /// Draw a fresh serial.
    ///
    /// The top bit is cleared so the DER INTEGER is positive without a
    /// padding octet, and the first octet is never zero so the encoding keeps
    /// its full 20 octets.
    pub fn next(&self) -> SerialNumber {
        SerialNumber::from_slice(&self.next_bytes())
    }

    fn next_bytes(&self) -> [u8; SERIAL_LEN] {
        let mut bytes = [0u8; SERIAL_LEN];
        OsRng.fill_bytes(&mut bytes);
        bytes[0] &= 0x7f;
        if bytes[0] == 0 {
            bytes[0] = 0x01;
        }
        bytes
    }
}
