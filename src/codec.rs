//! Element serialization boundary.

use std::convert::Infallible;
use std::error::Error;
use std::marker::PhantomData;
use std::string::FromUtf8Error;

/// Byte codec for run elements. The engine calls [`encode`](Codec::encode)
/// exactly once per element before it is written to a run and
/// [`decode`](Codec::decode) exactly once per element read back. `encode`
/// must be deterministic within a single sort and its output must fit a
/// `u32` length prefix.
pub trait Codec<T> {
    type EncodeError: Error + Send + Sync + 'static;
    type DecodeError: Error + Send + Sync + 'static;

    /// Appends the encoded form of `item` to `buf`.
    fn encode(&self, item: &T, buf: &mut Vec<u8>) -> Result<(), Self::EncodeError>;

    /// Decodes one element from a full frame payload.
    fn decode(&self, frame: &[u8]) -> Result<T, Self::DecodeError>;
}

/// RMP (Rust MessagePack) codec. The default for any type that implements
/// `serde` serialization/deserialization. For more information see
/// https://msgpack.org/.
pub struct RmpCodec<T> {
    item_type: PhantomData<T>,
}

impl<T> RmpCodec<T> {
    pub fn new() -> Self {
        RmpCodec { item_type: PhantomData }
    }
}

impl<T> Default for RmpCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Codec<T> for RmpCodec<T>
where
    T: serde::ser::Serialize + serde::de::DeserializeOwned,
{
    type EncodeError = rmp_serde::encode::Error;
    type DecodeError = rmp_serde::decode::Error;

    fn encode(&self, item: &T, buf: &mut Vec<u8>) -> Result<(), Self::EncodeError> {
        rmp_serde::encode::write(buf, item)
    }

    fn decode(&self, frame: &[u8]) -> Result<T, Self::DecodeError> {
        rmp_serde::decode::from_slice(frame)
    }
}

/// UTF-8 byte-string codec backing the string sorter facade.
#[derive(Clone, Copy, Default)]
pub struct StringCodec;

impl Codec<String> for StringCodec {
    type EncodeError = Infallible;
    type DecodeError = FromUtf8Error;

    fn encode(&self, item: &String, buf: &mut Vec<u8>) -> Result<(), Self::EncodeError> {
        buf.extend_from_slice(item.as_bytes());
        Ok(())
    }

    fn decode(&self, frame: &[u8]) -> Result<String, Self::DecodeError> {
        String::from_utf8(frame.to_vec())
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::{Codec, RmpCodec, StringCodec};

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Record {
        key: i64,
        value: String,
    }

    #[rstest]
    #[case(Record { key: 0, value: "".into() })]
    #[case(Record { key: -42, value: "hello".into() })]
    #[case(Record { key: i64::MAX, value: "x".repeat(1000) })]
    fn test_rmp_round_trip(#[case] record: Record) {
        let codec = RmpCodec::new();

        let mut buf = Vec::new();
        codec.encode(&record, &mut buf).unwrap();
        let restored = codec.decode(&buf).unwrap();

        assert_eq!(restored, record);
    }

    #[test]
    fn test_rmp_decode_garbage() {
        let codec: RmpCodec<Record> = RmpCodec::new();
        assert!(codec.decode(&[0xc1, 0xff, 0x00]).is_err());
    }

    #[test]
    fn test_string_round_trip() {
        let codec = StringCodec;

        let mut buf = Vec::new();
        codec.encode(&"zebra".to_string(), &mut buf).unwrap();
        assert_eq!(buf, b"zebra");
        assert_eq!(codec.decode(&buf).unwrap(), "zebra");
    }

    #[test]
    fn test_string_decode_invalid_utf8() {
        let codec = StringCodec;
        assert!(codec.decode(&[0xff, 0xfe]).is_err());
    }
}
