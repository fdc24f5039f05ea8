//! `Content-Length` framing over a byte stream.

use std::io::{self, BufRead, Write};

use crate::{Error, Result};

/// Reads one framed payload. Returns `Ok(None)` on clean EOF at a frame
/// boundary; EOF inside a frame is an error.
pub fn read_frame(reader: &mut dyn BufRead) -> Result<Option<Vec<u8>>> {
	let mut content_length: Option<usize> = None;
	let mut line = String::new();
	loop {
		line.clear();
		let n = reader.read_line(&mut line)?;
		if n == 0 {
			return if content_length.is_none() {
				Ok(None)
			} else {
				Err(Error::Malformed("eof inside frame header".into()))
			};
		}
		let trimmed = line.trim_end_matches(['\r', '\n']);
		if trimmed.is_empty() {
			// Blank line terminates the header block.
			if content_length.is_some() {
				break;
			}
			// Stray blank line before any header; keep scanning.
			continue;
		}
		let Some((name, value)) = trimmed.split_once(':') else {
			return Err(Error::Malformed(format!("header without colon: {trimmed:?}")));
		};
		if name.eq_ignore_ascii_case("Content-Length") {
			let len = value
				.trim()
				.parse::<usize>()
				.map_err(|_| Error::Malformed(format!("bad Content-Length: {value:?}")))?;
			content_length = Some(len);
		}
		// Content-Type and any unknown headers are skipped.
	}

	let len = content_length.expect("loop breaks only with a length");
	let mut buf = vec![0u8; len];
	reader.read_exact(&mut buf).map_err(|e| {
		if e.kind() == io::ErrorKind::UnexpectedEof {
			Error::Malformed("eof inside frame body".into())
		} else {
			Error::Io(e)
		}
	})?;
	Ok(Some(buf))
}

/// Writes one framed payload and flushes. The caller holds the writer lock
/// for the whole call, so the frame is never split.
pub fn write_frame(writer: &mut dyn Write, payload: &[u8]) -> Result<()> {
	write!(writer, "Content-Length: {}\r\n\r\n", payload.len())?;
	writer.write_all(payload)?;
	writer.flush()?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use std::io::BufReader;

	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn frame_round_trip() {
		let mut wire = Vec::new();
		write_frame(&mut wire, b"{\"x\":1}").unwrap();
		assert_eq!(wire, b"Content-Length: 7\r\n\r\n{\"x\":1}");

		let mut reader = BufReader::new(&wire[..]);
		let payload = read_frame(&mut reader).unwrap().unwrap();
		assert_eq!(payload, b"{\"x\":1}");
		assert!(read_frame(&mut reader).unwrap().is_none());
	}

	#[test]
	fn unknown_headers_are_skipped() {
		let wire = b"Content-Type: application/json\r\nContent-Length: 2\r\n\r\n{}";
		let mut reader = BufReader::new(&wire[..]);
		assert_eq!(read_frame(&mut reader).unwrap().unwrap(), b"{}");
	}

	#[test]
	fn missing_length_is_malformed() {
		let wire = b"Content-Type: application/json\r\n\r\n{}";
		let mut reader = BufReader::new(&wire[..]);
		assert!(read_frame(&mut reader).is_err());
	}

	#[test]
	fn truncated_body_is_malformed() {
		let wire = b"Content-Length: 10\r\n\r\n{}";
		let mut reader = BufReader::new(&wire[..]);
		assert!(read_frame(&mut reader).is_err());
	}
}
