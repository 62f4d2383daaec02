// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Format flags carried in the `object` / `response_format` strings.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::errors::UnitError;

pub fn is_stream_format(format: &str) -> bool {
    format.contains("stream")
}

pub fn is_base64_format(format: &str) -> bool {
    format.contains("base64")
}

/// `format` with its stream flag matching how the data is actually framed.
///
/// Receivers only reassemble when the object says `stream`, so a channel that
/// streams a plain format (or sends a stream format unframed) must say so.
pub fn framed_object(format: &str, streaming: bool) -> String {
    match (streaming, is_stream_format(format)) {
        (true, false) if format.is_empty() => "stream".to_string(),
        (true, false) => format!("{}.stream", format),
        (false, true) => format
            .split('.')
            .filter(|part| *part != "stream")
            .collect::<Vec<_>>()
            .join("."),
        _ => format.to_string(),
    }
}

/// Turns a reassembled data-plane body into job bytes.
///
/// Base64 decoding applies when `object` asks for it. An empty result is
/// rejected either way.
pub fn decode_payload(object: &str, body: Vec<u8>) -> Result<Vec<u8>, UnitError> {
    let bytes = decode_chunk(object, body)?;
    if bytes.is_empty() {
        return Err(UnitError::EmptyInput);
    }
    Ok(bytes)
}

/// Decodes one stream delta. Each base64 chunk is encoded on its own (with its
/// own padding), so chunks are decoded before they are concatenated. Empty
/// deltas are allowed.
pub fn decode_chunk(object: &str, body: Vec<u8>) -> Result<Vec<u8>, UnitError> {
    if !is_base64_format(object) {
        return Ok(body);
    }
    let trimmed: Vec<u8> = body.into_iter().filter(|b| !b.is_ascii_whitespace()).collect();
    STANDARD
        .decode(trimmed)
        .map_err(|e| UnitError::Base64Decode(e.to_string()))
}

pub(crate) fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_flags() {
        assert!(is_stream_format("yolo.box.stream"));
        assert!(!is_stream_format("yolo.box"));
        assert!(is_base64_format("image.jpeg.base64.stream"));
    }

    #[test]
    fn test_decode_base64_object() {
        let bytes = decode_payload("image.jpeg.base64", b"aGVs\nbG8=".to_vec()).unwrap();
        assert_eq!(bytes, b"hello".to_vec());
    }

    #[test]
    fn test_raw_object_passes_through() {
        assert_eq!(decode_payload("kws.text", b"hi".to_vec()).unwrap(), b"hi".to_vec());
    }

    #[test]
    fn test_bad_base64_is_reported() {
        let err = decode_payload("x.base64", b"%%%".to_vec()).unwrap_err();
        assert_eq!(err.code(), -23);
    }

    #[test]
    fn test_empty_body_is_rejected() {
        assert_eq!(decode_payload("x.raw", Vec::new()), Err(UnitError::EmptyInput));
        assert_eq!(decode_payload("x.base64", Vec::new()), Err(UnitError::EmptyInput));
    }

    #[test]
    fn test_framed_object_follows_stream_flag() {
        assert_eq!(framed_object("camera.raw", true), "camera.raw.stream");
        assert_eq!(framed_object("llm.utf-8.stream", true), "llm.utf-8.stream");
        assert_eq!(framed_object("tts.pcm.stream.base64", false), "tts.pcm.base64");
        assert_eq!(framed_object("kws.text", false), "kws.text");
        assert_eq!(framed_object("", true), "stream");
    }

    #[test]
    fn test_padded_chunks_decode_separately() {
        let first = decode_chunk("tts.pcm.base64.stream", b"aGk=".to_vec()).unwrap();
        let second = decode_chunk("tts.pcm.base64.stream", b"IQ==".to_vec()).unwrap();
        assert_eq!([first, second].concat(), b"hi!".to_vec());
        assert_eq!(decode_chunk("x.base64.stream", Vec::new()).unwrap(), Vec::<u8>::new());
    }
}
