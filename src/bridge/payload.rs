//! Payload marshalling.
//!
//! Native callers use one convention for both directions: a non-negative
//! length means "binary, exactly this many bytes", a negative length means
//! "NUL-terminated UTF-8 text". Inside the crate that convention is a
//! [`Payload`]; it is only re-derived at the C boundary.

use std::ffi::{CStr, c_char};
use std::ptr;

use crate::error::{BridgeError, Result};

/// Length reported for text deliveries: "read up to the terminator".
pub const TEXT_LENGTH: i32 = -1;

/// A single frame's worth of data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    /// Read a caller buffer using the dual-mode length convention.
    ///
    /// Text is decoded lossily, the same way the browser decodes heap strings.
    ///
    /// # Safety
    ///
    /// For `length >= 0`, `data` must be valid for reads of `length` bytes
    /// (it may be null only when `length == 0`). For `length < 0`, `data`
    /// must point to a NUL-terminated buffer.
    pub unsafe fn from_raw(data: *const u8, length: i32) -> Result<Self> {
        if data.is_null() {
            return match length {
                0 => Ok(Payload::Binary(Vec::new())),
                _ => Err(BridgeError::InvalidArgument(
                    "null buffer with non-zero length".to_string(),
                )),
            };
        }

        if length >= 0 {
            let bytes = unsafe { std::slice::from_raw_parts(data, length as usize) };
            Ok(Payload::Binary(bytes.to_vec()))
        } else {
            let text = unsafe { CStr::from_ptr(data as *const c_char) };
            Ok(Payload::Text(text.to_string_lossy().into_owned()))
        }
    }

    /// Bytes put on the wire, not counting any terminator.
    pub fn encoded_len(&self) -> usize {
        match self {
            Payload::Text(text) => text.len(),
            Payload::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Payload::Text(_))
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Binary(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload::Binary(bytes.to_vec())
    }
}

/// Memory owned for exactly one inbound delivery.
///
/// Dropping it releases the allocation, so the buffer is gone on every exit
/// path out of the callback, unwinding included.
#[derive(Debug)]
pub struct ScratchBuffer {
    bytes: Box<[u8]>,
    text: bool,
}

impl ScratchBuffer {
    /// Encode `text` as UTF-8 followed by a single NUL.
    ///
    /// Anything after an interior NUL is cut, since a terminator-driven reader
    /// would never see it.
    pub fn for_text(text: &str) -> Self {
        let visible = match text.find('\0') {
            Some(end) => &text[..end],
            None => text,
        };
        let mut bytes = Vec::with_capacity(visible.len() + 1);
        bytes.extend_from_slice(visible.as_bytes());
        bytes.push(0);
        Self {
            bytes: bytes.into_boxed_slice(),
            text: true,
        }
    }

    /// Copy `data` into a buffer of exactly its length.
    pub fn for_binary(data: &[u8]) -> Self {
        Self {
            bytes: data.into(),
            text: false,
        }
    }

    /// Content bytes, without the text terminator.
    pub fn as_bytes(&self) -> &[u8] {
        if self.text {
            &self.bytes[..self.bytes.len() - 1]
        } else {
            &self.bytes
        }
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.bytes.as_ptr()
    }

    pub fn is_text(&self) -> bool {
        self.text
    }
}

impl Drop for ScratchBuffer {
    fn drop(&mut self) {
        log::trace!("Releasing scratch buffer ({} bytes)", self.bytes.len());
    }
}

/// What a message callback is handed: a frame, or end-of-stream.
#[derive(Debug, Clone, Copy)]
pub enum Frame<'a> {
    Text(&'a ScratchBuffer),
    Binary(&'a ScratchBuffer),
    /// The connection closed. Delivered as a null pointer with length 0.
    Closed,
}

impl<'a> Frame<'a> {
    pub(crate) fn from_scratch(buffer: &'a ScratchBuffer) -> Self {
        if buffer.is_text() {
            Frame::Text(buffer)
        } else {
            Frame::Binary(buffer)
        }
    }

    /// Pointer handed to native code; null for [`Frame::Closed`].
    pub fn as_ptr(&self) -> *const u8 {
        match self {
            Frame::Text(buffer) | Frame::Binary(buffer) => buffer.as_ptr(),
            Frame::Closed => ptr::null(),
        }
    }

    /// Length handed to native code: [`TEXT_LENGTH`] for text, the byte count
    /// for binary, 0 for close.
    pub fn length(&self) -> i32 {
        match self {
            Frame::Text(_) => TEXT_LENGTH,
            Frame::Binary(buffer) => i32::try_from(buffer.as_bytes().len()).unwrap_or(i32::MAX),
            Frame::Closed => 0,
        }
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        match self {
            Frame::Text(buffer) | Frame::Binary(buffer) => buffer.as_bytes(),
            Frame::Closed => &[],
        }
    }

    /// Text content, for text frames.
    pub fn as_text(&self) -> Option<&'a str> {
        match self {
            Frame::Text(buffer) => std::str::from_utf8(buffer.as_bytes()).ok(),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Frame::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_scratch_is_nul_terminated() {
        let buffer = ScratchBuffer::for_text("héllo");
        assert_eq!(buffer.as_bytes(), "héllo".as_bytes());
        let raw = unsafe { CStr::from_ptr(buffer.as_ptr() as *const c_char) };
        assert_eq!(raw.to_str(), Ok("héllo"));
    }

    #[test]
    fn test_text_scratch_cuts_at_interior_nul() {
        let buffer = ScratchBuffer::for_text("abc\0def");
        assert_eq!(buffer.as_bytes(), b"abc");
        assert_eq!(Frame::from_scratch(&buffer).as_text(), Some("abc"));
    }

    #[test]
    fn test_binary_scratch_has_exact_length() {
        let buffer = ScratchBuffer::for_binary(&[0x00, 0x7F, 0xFF]);
        let frame = Frame::from_scratch(&buffer);
        assert_eq!(frame.length(), 3);
        assert_eq!(frame.as_bytes(), &[0x00, 0x7F, 0xFF]);
        assert_eq!(frame.as_text(), None);
    }

    #[test]
    fn test_closed_frame_is_null_and_empty() {
        let frame = Frame::Closed;
        assert!(frame.as_ptr().is_null());
        assert_eq!(frame.length(), 0);
        assert!(frame.as_bytes().is_empty());
        assert!(frame.is_closed());
    }

    #[test]
    fn test_text_frame_reports_sentinel_length() {
        let buffer = ScratchBuffer::for_text("");
        let frame = Frame::from_scratch(&buffer);
        assert_eq!(frame.length(), TEXT_LENGTH);
        assert!(!frame.as_ptr().is_null());
        assert_eq!(frame.as_text(), Some(""));
    }

    #[test]
    fn test_from_raw_binary_uses_explicit_length() {
        let data = [1u8, 0, 2, 0];
        let payload = unsafe { Payload::from_raw(data.as_ptr(), 3) }.unwrap();
        assert_eq!(payload, Payload::Binary(vec![1, 0, 2]));
        assert_eq!(payload.encoded_len(), 3);
    }

    #[test]
    fn test_from_raw_text_reads_to_terminator() {
        let data = b"hello\0ignored";
        let payload = unsafe { Payload::from_raw(data.as_ptr(), -1) }.unwrap();
        assert_eq!(payload, Payload::Text("hello".to_string()));
        assert_eq!(payload.encoded_len(), 5);
    }

    #[test]
    fn test_from_raw_text_replaces_invalid_utf8() {
        let data = [b'a', 0xFF, b'b', 0];
        let payload = unsafe { Payload::from_raw(data.as_ptr(), -5) }.unwrap();
        assert_eq!(payload, Payload::Text("a\u{FFFD}b".to_string()));
        assert_eq!(payload.encoded_len(), 5);
    }

    #[test]
    fn test_from_raw_null() {
        let empty = unsafe { Payload::from_raw(std::ptr::null(), 0) }.unwrap();
        assert_eq!(empty, Payload::Binary(Vec::new()));

        let err = unsafe { Payload::from_raw(std::ptr::null(), -1) }.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument(_)));
    }
}
