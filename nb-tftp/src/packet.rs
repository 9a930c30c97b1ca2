//! TFTP wire format (RFC 1350) plus the option extensions PXE firmware
//! actually negotiates (RFC 2347/2348: `blksize`, `tsize`, OACK).

use std::collections::HashMap;
use thiserror::Error;

pub const OPCODE_RRQ: u16 = 1;
pub const OPCODE_WRQ: u16 = 2;
pub const OPCODE_DATA: u16 = 3;
pub const OPCODE_ACK: u16 = 4;
pub const OPCODE_ERROR: u16 = 5;
pub const OPCODE_OACK: u16 = 6;

pub const ERROR_NOT_DEFINED: u16 = 0;
pub const ERROR_FILE_NOT_FOUND: u16 = 1;
pub const ERROR_ACCESS_VIOLATION: u16 = 2;
pub const ERROR_ILLEGAL_OPERATION: u16 = 4;

pub const DEFAULT_BLOCK_SIZE: usize = 512;
pub const MIN_BLOCK_SIZE: usize = 8;
pub const MAX_BLOCK_SIZE: usize = 65464;

#[derive(Error, Debug)]
pub enum TftpParseError {
    #[error("packet too short to carry an opcode")]
    TooShort,
    #[error("unrecognized opcode {0}")]
    UnknownOpcode(u16),
    #[error("request missing a NUL-terminated filename/mode")]
    MalformedRequest,
    #[error("ack/data header truncated")]
    TruncatedHeader,
}

#[derive(Debug, Clone)]
pub struct ReadRequest {
    pub filename: String,
    pub mode: String,
    pub options: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub enum TftpPacket {
    Read(ReadRequest),
    Write(ReadRequest),
    Data { block: u16, data: Vec<u8> },
    Ack { block: u16 },
    Error { code: u16, message: String },
    Oack { options: HashMap<String, String> },
}

impl TftpPacket {
    pub fn parse(buf: &[u8]) -> Result<Self, TftpParseError> {
        if buf.len() < 2 {
            return Err(TftpParseError::TooShort);
        }
        let opcode = u16::from_be_bytes([buf[0], buf[1]]);
        let body = &buf[2..];

        match opcode {
            OPCODE_RRQ => Ok(TftpPacket::Read(parse_request(body)?)),
            OPCODE_WRQ => Ok(TftpPacket::Write(parse_request(body)?)),
            OPCODE_DATA => {
                if body.len() < 2 {
                    return Err(TftpParseError::TruncatedHeader);
                }
                let block = u16::from_be_bytes([body[0], body[1]]);
                Ok(TftpPacket::Data { block, data: body[2..].to_vec() })
            }
            OPCODE_ACK => {
                if body.len() < 2 {
                    return Err(TftpParseError::TruncatedHeader);
                }
                let block = u16::from_be_bytes([body[0], body[1]]);
                Ok(TftpPacket::Ack { block })
            }
            OPCODE_ERROR => {
                if body.len() < 2 {
                    return Err(TftpParseError::TruncatedHeader);
                }
                let code = u16::from_be_bytes([body[0], body[1]]);
                let message = nul_terminated_str(&body[2..]).unwrap_or_default();
                Ok(TftpPacket::Error { code, message })
            }
            OPCODE_OACK => Ok(TftpPacket::Oack { options: parse_options(body, 0) }),
            other => Err(TftpParseError::UnknownOpcode(other)),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            TftpPacket::Read(req) => {
                buf.extend_from_slice(&OPCODE_RRQ.to_be_bytes());
                encode_request(&mut buf, req);
            }
            TftpPacket::Write(req) => {
                buf.extend_from_slice(&OPCODE_WRQ.to_be_bytes());
                encode_request(&mut buf, req);
            }
            TftpPacket::Data { block, data } => {
                buf.extend_from_slice(&OPCODE_DATA.to_be_bytes());
                buf.extend_from_slice(&block.to_be_bytes());
                buf.extend_from_slice(data);
            }
            TftpPacket::Ack { block } => {
                buf.extend_from_slice(&OPCODE_ACK.to_be_bytes());
                buf.extend_from_slice(&block.to_be_bytes());
            }
            TftpPacket::Error { code, message } => {
                buf.extend_from_slice(&OPCODE_ERROR.to_be_bytes());
                buf.extend_from_slice(&code.to_be_bytes());
                buf.extend_from_slice(message.as_bytes());
                buf.push(0);
            }
            TftpPacket::Oack { options } => {
                buf.extend_from_slice(&OPCODE_OACK.to_be_bytes());
                for (k, v) in options {
                    buf.extend_from_slice(k.as_bytes());
                    buf.push(0);
                    buf.extend_from_slice(v.as_bytes());
                    buf.push(0);
                }
            }
        }
        buf
    }
}

fn nul_terminated_str(buf: &[u8]) -> Option<String> {
    let end = buf.iter().position(|&b| b == 0)?;
    std::str::from_utf8(&buf[..end]).ok().map(|s| s.to_string())
}

fn parse_request(body: &[u8]) -> Result<ReadRequest, TftpParseError> {
    let parts: Vec<&[u8]> = body.split(|&b| b == 0).collect();
    if parts.len() < 2 {
        return Err(TftpParseError::MalformedRequest);
    }
    let filename = std::str::from_utf8(parts[0])
        .map_err(|_| TftpParseError::MalformedRequest)?
        .to_string();
    let mode = std::str::from_utf8(parts[1])
        .map_err(|_| TftpParseError::MalformedRequest)?
        .to_lowercase();

    let options = parse_options_from_parts(&parts[2..]);
    Ok(ReadRequest { filename, mode, options })
}

fn parse_options_from_parts(parts: &[&[u8]]) -> HashMap<String, String> {
    let mut options = HashMap::new();
    let mut i = 0;
    while i + 1 < parts.len() {
        if let (Ok(name), Ok(value)) = (std::str::from_utf8(parts[i]), std::str::from_utf8(parts[i + 1])) {
            if !name.is_empty() {
                options.insert(name.to_lowercase(), value.to_string());
            }
        }
        i += 2;
    }
    options
}

fn parse_options(body: &[u8], skip_leading: usize) -> HashMap<String, String> {
    let parts: Vec<&[u8]> = body.split(|&b| b == 0).collect();
    parse_options_from_parts(&parts[skip_leading.min(parts.len())..])
}

fn encode_request(buf: &mut Vec<u8>, req: &ReadRequest) {
    buf.extend_from_slice(req.filename.as_bytes());
    buf.push(0);
    buf.extend_from_slice(req.mode.as_bytes());
    buf.push(0);
    for (k, v) in &req.options {
        buf.extend_from_slice(k.as_bytes());
        buf.push(0);
        buf.extend_from_slice(v.as_bytes());
        buf.push(0);
    }
}

/// Clamp a client's requested `blksize` into the RFC 2348 range.
pub fn negotiate_block_size(options: &HashMap<String, String>) -> usize {
    options
        .get("blksize")
        .and_then(|v| v.parse::<usize>().ok())
        .map(|v| v.clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE))
        .unwrap_or(DEFAULT_BLOCK_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_read_request_with_options() {
        let mut buf = vec![0u8, OPCODE_RRQ as u8];
        buf.extend_from_slice(b"undionly.kpxe\0octet\0blksize\01024\0");
        let pkt = TftpPacket::parse(&buf).unwrap();
        match pkt {
            TftpPacket::Read(req) => {
                assert_eq!(req.filename, "undionly.kpxe");
                assert_eq!(req.mode, "octet");
                assert_eq!(req.options.get("blksize"), Some(&"1024".to_string()));
            }
            _ => panic!("expected Read"),
        }
    }

    #[test]
    fn round_trips_a_data_packet() {
        let pkt = TftpPacket::Data { block: 7, data: vec![1, 2, 3] };
        let bytes = pkt.encode();
        let parsed = TftpPacket::parse(&bytes).unwrap();
        match parsed {
            TftpPacket::Data { block, data } => {
                assert_eq!(block, 7);
                assert_eq!(data, vec![1, 2, 3]);
            }
            _ => panic!("expected Data"),
        }
    }

    #[test]
    fn negotiates_block_size_within_rfc_2348_bounds() {
        let mut opts = HashMap::new();
        opts.insert("blksize".to_string(), "99999".to_string());
        assert_eq!(negotiate_block_size(&opts), MAX_BLOCK_SIZE);

        opts.insert("blksize".to_string(), "4".to_string());
        assert_eq!(negotiate_block_size(&opts), MIN_BLOCK_SIZE);

        assert_eq!(negotiate_block_size(&HashMap::new()), DEFAULT_BLOCK_SIZE);
    }
}
