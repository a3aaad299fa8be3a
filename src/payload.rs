//! Fixed-size payload encoding.
//!
//! The tree stores a trivially-copyable value alongside every key. The source
//! expresses this with a C++ template parameter and a raw memory copy; here the
//! same contract is an explicit trait so the node layout can reserve exactly
//! `Payload::SIZE` bytes per slot and never touch anything wider.

use crate::err;
use crate::error::Error;
use bincode::config::{self, Configuration, Fixint, LittleEndian};

/// Byte-exact fixed-size encoding, required so a `Node` image is always exactly
/// `page_size` bytes regardless of which values happen to be stored in it.
fn payload_config() -> Configuration<LittleEndian, Fixint> {
    config::standard()
        .with_little_endian()
        .with_fixed_int_encoding()
}

/// A trivially-copyable, fixed-size value that can live in a leaf slot.
pub trait Payload: Copy {
    const SIZE: usize;

    fn encode_fixed(&self, out: &mut [u8]) -> Result<(), Error>;
    fn decode_fixed(buf: &[u8]) -> Result<Self, Error>
    where
        Self: Sized;
}

macro_rules! impl_fixed_payload {
    ($($t:ty => $size:expr),* $(,)?) => {
        $(
            impl Payload for $t {
                const SIZE: usize = $size;

                fn encode_fixed(&self, out: &mut [u8]) -> Result<(), Error> {
                    bincode::encode_into_slice(*self, out, payload_config())
                        .map_err(|e| err!(Encoding, "failed to encode payload: {}", e))?;
                    Ok(())
                }

                fn decode_fixed(buf: &[u8]) -> Result<Self, Error> {
                    let (value, _) = bincode::decode_from_slice(buf, payload_config())
                        .map_err(|e| err!(Encoding, "failed to decode payload: {}", e))?;
                    Ok(value)
                }
            }
        )*
    };
}

impl_fixed_payload! {
    u8 => 1,
    i8 => 1,
    i16 => 2,
    i32 => 4,
    i64 => 8,
    u64 => 8,
}
