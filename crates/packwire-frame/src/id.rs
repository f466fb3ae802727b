use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

use crate::error::{FrameError, Result};

/// Request ids are exactly this many ASCII characters.
pub const REQUEST_ID_LEN: usize = 11;

/// Id the server uses for errors not tied to any request.
pub const BROADCAST_ID: &str = "xxxxxxxxxxx";

// Random digits mixed into every id (16 decimal digits).
const FRACTION_SPACE: u64 = 10_000_000_000_000_000;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Fixed-width request id correlating a response with its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId([u8; REQUEST_ID_LEN]);

impl RequestId {
    /// Generate a fresh id from random digits and the current time.
    pub fn generate() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let fraction = rand::rng().random_range(1..FRACTION_SPACE);
        Self::from_parts(fraction, millis)
    }

    /// Build an id from its two digit sources.
    ///
    /// The decimal digits of `fraction` and `millis` are concatenated, read as
    /// one number and rendered in base 36; the result is cut (or right-padded
    /// with `'0'`) to [`REQUEST_ID_LEN`] characters.
    pub fn from_parts(fraction: u64, millis: u128) -> Self {
        let digits = format!("{fraction}{millis}");
        // 20 + 39 digits can exceed u128; keep the leading ones.
        let number: u128 = digits
            .get(..38)
            .unwrap_or(digits.as_str())
            .parse()
            .unwrap_or_default();

        let mut base36 = Vec::with_capacity(25);
        let mut rest = number;
        loop {
            base36.push(BASE36[(rest % 36) as usize]);
            rest /= 36;
            if rest == 0 {
                break;
            }
        }
        base36.reverse();

        let mut id = [b'0'; REQUEST_ID_LEN];
        for (slot, digit) in id.iter_mut().zip(base36) {
            *slot = digit;
        }
        RequestId(id)
    }

    /// Parse an id received on the wire.
    ///
    /// Accepts exactly 11 printable ASCII bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let id: [u8; REQUEST_ID_LEN] = bytes
            .try_into()
            .map_err(|_| FrameError::InvalidRequestId(String::from_utf8_lossy(bytes).into_owned()))?;
        if !id.iter().all(u8::is_ascii_graphic) {
            return Err(FrameError::InvalidRequestId(
                String::from_utf8_lossy(bytes).into_owned(),
            ));
        }
        Ok(RequestId(id))
    }

    pub fn parse(s: &str) -> Result<Self> {
        Self::from_bytes(s.as_bytes())
    }

    /// The broadcast error id `xxxxxxxxxxx`.
    pub fn broadcast() -> Self {
        RequestId([b'x'; REQUEST_ID_LEN])
    }

    pub fn is_broadcast(&self) -> bool {
        self.0 == [b'x'; REQUEST_ID_LEN]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        // Construction only admits ASCII.
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestId {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
