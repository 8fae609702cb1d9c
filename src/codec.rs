use bytes::{Buf, Bytes, BytesMut};
use std::io;
use tokio_util::codec::Decoder;

/// Decodes a byte stream in a legacy charset into UTF-8 chunks.
/// Multi-byte sequences split across reads are carried in the decoder state.
pub(crate) struct Utf8Transcoder {
    decoder: encoding_rs::Decoder,
    finished: bool,
}

impl Utf8Transcoder {
    pub(crate) fn new(encoding: &'static encoding_rs::Encoding) -> Self {
        Self {
            decoder: encoding.new_decoder(),
            finished: false,
        }
    }

    fn transcode(&mut self, src: &mut BytesMut, last: bool) -> io::Result<Option<Bytes>> {
        let capacity = self
            .decoder
            .max_utf8_buffer_length(src.len())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "chunk too large"))?;
        let mut out = vec![0u8; capacity];
        let (_result, read, written, _replaced) = self.decoder.decode_to_utf8(src, &mut out, last);
        src.advance(read);

        if written == 0 {
            return Ok(None);
        }
        out.truncate(written);
        Ok(Some(Bytes::from(out)))
    }
}

impl Decoder for Utf8Transcoder {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        self.transcode(src, false)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.finished {
            src.clear();
            return Ok(None);
        }
        self.finished = true;
        self.transcode(src, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcodes_windows_1252() {
        let mut codec = Utf8Transcoder::new(encoding_rs::WINDOWS_1252);
        let mut src = BytesMut::from(&b"caf\xe9,1\n"[..]);
        let out = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(std::str::from_utf8(&out).unwrap(), "café,1\n");
        assert!(src.is_empty());
        assert!(codec.decode_eof(&mut src).unwrap().is_none());
    }

    #[test]
    fn split_utf16_unit_is_carried() {
        let mut codec = Utf8Transcoder::new(encoding_rs::UTF_16LE);
        // "a" then half of "b"
        let mut src = BytesMut::from(&b"a\x00b"[..]);
        let first = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(&first[..], b"a");
        src.extend_from_slice(b"\x00");
        let second = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(&second[..], b"b");
    }
}
