// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decodes framed device replies. The codec only establishes shape --
//! status byte, ASCII body, comma-separated fields -- it never validates
//! semantics; that's the driver's job.

use crate::error::DriverError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    SyntaxError,
    NotReady,
    Ack,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    fields: Vec<String>,
}

impl Response {
    /// Decode a raw reply buffer. Byte 0 is the status code; on `Ok`, bytes
    /// up to the first NUL (or the end of the buffer) are the ASCII body,
    /// split on commas. Anything past the first NUL is trailing garbage and
    /// is ignored.
    pub fn decode(bytes: &[u8]) -> Result<Response, DriverError> {
        let status_byte = *bytes.first().ok_or_else(|| DriverError::ResponseSyntaxError {
            field_name: "status".to_string(),
            reason: "empty response".to_string(),
        })?;

        let status = match status_byte {
            0x01 => Status::Ok,
            0x02 => Status::SyntaxError,
            0xFE => Status::NotReady,
            0xFF => Status::Ack,
            other => {
                return Err(DriverError::ResponseSyntaxError {
                    field_name: "status".to_string(),
                    reason: format!("unrecognised status byte {other:#04x}"),
                })
            }
        };

        let fields = if status == Status::Ok {
            let body = &bytes[1..];
            let end = body.iter().position(|&b| b == 0).unwrap_or(body.len());
            let ascii = &body[..end];
            if !ascii.is_ascii() {
                return Err(DriverError::ResponseSyntaxError {
                    field_name: "body".to_string(),
                    reason: "non-ASCII payload".to_string(),
                });
            }
            let text = std::str::from_utf8(ascii).expect("already checked is_ascii");
            if text.is_empty() {
                Vec::new()
            } else {
                text.split(',').map(str::to_string).collect()
            }
        } else {
            Vec::new()
        };

        Ok(Response { status, fields })
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn get_field(&self, name: &str, index: usize) -> Result<&str, DriverError> {
        self.fields
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| DriverError::ResponseSyntaxError {
                field_name: name.to_string(),
                reason: format!(
                    "field index {index} out of range (response has {} field(s))",
                    self.fields.len()
                ),
            })
    }

    pub fn get_fields(&self, name: &str, start: usize, end: usize) -> Result<&[String], DriverError> {
        if start > end || end > self.fields.len() {
            return Err(DriverError::ResponseSyntaxError {
                field_name: name.to_string(),
                reason: format!(
                    "field range {start}..{end} out of range (response has {} field(s))",
                    self.fields.len()
                ),
            });
        }
        Ok(&self.fields[start..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_with_empty_body_has_no_fields() {
        let r = Response::decode(&[0x01, 0x00]).unwrap();
        assert_eq!(r.status, Status::Ok);
        assert_eq!(r.field_count(), 0);
    }

    #[test]
    fn ok_splits_body_on_commas() {
        let r = Response::decode(b"\x01?i,pH,1.98\x00").unwrap();
        assert_eq!(r.get_field("leading", 0).unwrap(), "?i");
        assert_eq!(r.get_field("type", 1).unwrap(), "pH");
        assert_eq!(r.get_field("version", 2).unwrap(), "1.98");
    }

    #[test]
    fn trailing_bytes_past_nul_are_ignored() {
        let r = Response::decode(b"\x019.560\x00garbage-left-in-the-buffer").unwrap();
        assert_eq!(r.get_field("value", 0).unwrap(), "9.560");
    }

    #[test]
    fn non_ok_status_parses_no_fields() {
        let not_ready = Response::decode(&[0xFE, 0x00]).unwrap();
        assert_eq!(not_ready.status, Status::NotReady);
        assert_eq!(not_ready.field_count(), 0);

        let syntax_error = Response::decode(&[0x02, 0x00]).unwrap();
        assert_eq!(syntax_error.status, Status::SyntaxError);

        let ack = Response::decode(&[0xFF]).unwrap();
        assert_eq!(ack.status, Status::Ack);
    }

    #[test]
    fn empty_buffer_is_a_syntax_error() {
        assert!(Response::decode(&[]).is_err());
    }

    #[test]
    fn sentinel_no_units_body_yields_empty_fields() {
        let r = Response::decode(b"\x01?O\x00").unwrap();
        assert_eq!(r.get_fields("units", 1, 1).unwrap().len(), 0);
    }
}
