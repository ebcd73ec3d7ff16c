//! SNMPv2c OID query channel. The "command" sent over this channel is a
//! dotted OID string; the response text is the varbind value rendered as a
//! string, so the layers above treat it like any other raw device output.
//!
//! The wire format is a hand-rolled subset of BER: exactly what a v2c
//! GetRequest/GetResponse exchange needs, nothing more.

use async_trait::async_trait;
use tokio::net::UdpSocket;

use super::Channel;
use crate::error::{OltError, Result};

const SNMP_VERSION_2C: i64 = 1;

const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_NULL: u8 = 0x05;
const TAG_OID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_IP_ADDRESS: u8 = 0x40;
const TAG_COUNTER32: u8 = 0x41;
const TAG_GAUGE32: u8 = 0x42;
const TAG_TIMETICKS: u8 = 0x43;
const TAG_GET_REQUEST: u8 = 0xa0;
const TAG_GET_RESPONSE: u8 = 0xa2;

pub struct SnmpChannel {
    host: String,
    port: u16,
    community: String,
    socket: Option<UdpSocket>,
    request_id: i64,
}

impl SnmpChannel {
    pub fn new(host: &str, port: u16, community: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            community: community.to_string(),
            socket: None,
            request_id: 0,
        }
    }
}

#[async_trait]
impl Channel for SnmpChannel {
    async fn connect(&mut self) -> Result<()> {
        if self.socket.is_some() {
            return Ok(());
        }

        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| OltError::Connection(format!("failed to bind UDP socket: {e}")))?;
        socket
            .connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| OltError::Connection(format!("UDP connect failed: {e}")))?;

        self.socket = Some(socket);
        tracing::info!("SNMP channel ready for {}:{}", self.host, self.port);
        Ok(())
    }

    async fn send(&mut self, oid: &str) -> Result<String> {
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| OltError::Connection("SNMP channel is not connected".into()))?;

        self.request_id = self.request_id.wrapping_add(1);
        let request = encode_get_request(&self.community, self.request_id, oid)?;

        socket
            .send(&request)
            .await
            .map_err(|e| OltError::Connection(format!("SNMP send failed: {e}")))?;

        let mut buf = [0u8; 4096];
        let n = socket
            .recv(&mut buf)
            .await
            .map_err(|e| OltError::Connection(format!("SNMP receive failed: {e}")))?;

        decode_get_response(&buf[..n])
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.socket = None;
        Ok(())
    }
}

// ========== BER encoding ==========

fn encode_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
}

fn encode_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    encode_length(&mut out, content.len());
    out.extend_from_slice(content);
    out
}

fn encode_integer(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    // Drop redundant leading bytes while keeping the sign bit intact
    while start < 7
        && ((bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
            || (bytes[start] == 0xff && bytes[start + 1] & 0x80 != 0))
    {
        start += 1;
    }
    encode_tlv(TAG_INTEGER, &bytes[start..])
}

fn encode_oid(oid: &str) -> Result<Vec<u8>> {
    let arcs: Vec<u64> = oid
        .trim_start_matches('.')
        .split('.')
        .map(|p| p.parse::<u64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| OltError::validation(format!("invalid OID: {oid}")))?;
    if arcs.len() < 2 || arcs[0] > 2 || arcs[1] > 39 {
        return Err(OltError::validation(format!("invalid OID: {oid}")));
    }

    let mut content = vec![(arcs[0] * 40 + arcs[1]) as u8];
    for &arc in &arcs[2..] {
        let mut chunk = [0u8; 10];
        let mut i = chunk.len();
        let mut v = arc;
        loop {
            i -= 1;
            chunk[i] = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                break;
            }
        }
        for (j, b) in chunk[i..].iter().enumerate() {
            let last = j == chunk.len() - i - 1;
            content.push(if last { *b } else { *b | 0x80 });
        }
    }
    Ok(encode_tlv(TAG_OID, &content))
}

fn encode_get_request(community: &str, request_id: i64, oid: &str) -> Result<Vec<u8>> {
    let varbind = {
        let mut inner = encode_oid(oid)?;
        inner.extend_from_slice(&encode_tlv(TAG_NULL, &[]));
        encode_tlv(TAG_SEQUENCE, &inner)
    };
    let varbind_list = encode_tlv(TAG_SEQUENCE, &varbind);

    let mut pdu = encode_integer(request_id);
    pdu.extend_from_slice(&encode_integer(0)); // error-status
    pdu.extend_from_slice(&encode_integer(0)); // error-index
    pdu.extend_from_slice(&varbind_list);
    let pdu = encode_tlv(TAG_GET_REQUEST, &pdu);

    let mut message = encode_integer(SNMP_VERSION_2C);
    message.extend_from_slice(&encode_tlv(TAG_OCTET_STRING, community.as_bytes()));
    message.extend_from_slice(&pdu);
    Ok(encode_tlv(TAG_SEQUENCE, &message))
}

// ========== BER decoding ==========

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn read_tlv(&mut self) -> Result<(u8, &'a [u8])> {
        let err = || OltError::Command("malformed SNMP response".into());

        let tag = *self.data.get(self.pos).ok_or_else(err)?;
        self.pos += 1;

        let first = *self.data.get(self.pos).ok_or_else(err)?;
        self.pos += 1;
        let len = if first & 0x80 == 0 {
            first as usize
        } else {
            let count = (first & 0x7f) as usize;
            if count == 0 || count > 4 {
                return Err(err());
            }
            let mut len = 0usize;
            for _ in 0..count {
                len = (len << 8) | *self.data.get(self.pos).ok_or_else(err)? as usize;
                self.pos += 1;
            }
            len
        };

        let end = self.pos.checked_add(len).ok_or_else(err)?;
        if end > self.data.len() {
            return Err(err());
        }
        let content = &self.data[self.pos..end];
        self.pos = end;
        Ok((tag, content))
    }

    fn read_integer(&mut self) -> Result<i64> {
        let (tag, content) = self.read_tlv()?;
        if tag != TAG_INTEGER || content.is_empty() || content.len() > 8 {
            return Err(OltError::Command("malformed SNMP integer".into()));
        }
        let mut value: i64 = if content[0] & 0x80 != 0 { -1 } else { 0 };
        for b in content {
            value = (value << 8) | *b as i64;
        }
        Ok(value)
    }
}

fn decode_unsigned(content: &[u8]) -> u64 {
    content.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64)
}

/// Pull the first varbind value out of a GetResponse and render it as text.
fn decode_get_response(packet: &[u8]) -> Result<String> {
    let mut outer = Reader::new(packet);
    let (tag, message) = outer.read_tlv()?;
    if tag != TAG_SEQUENCE {
        return Err(OltError::Command("malformed SNMP response".into()));
    }

    let mut message = Reader::new(message);
    let _version = message.read_integer()?;
    let (_, _community) = message.read_tlv()?;

    let (tag, pdu) = message.read_tlv()?;
    if tag != TAG_GET_RESPONSE {
        return Err(OltError::Command(format!("unexpected SNMP PDU tag {tag:#x}")));
    }

    let mut pdu = Reader::new(pdu);
    let _request_id = pdu.read_integer()?;
    let error_status = pdu.read_integer()?;
    let error_index = pdu.read_integer()?;
    if error_status != 0 {
        return Err(OltError::Command(format!(
            "SNMP error status {error_status} at index {error_index}"
        )));
    }

    let (_, varbind_list) = pdu.read_tlv()?;
    let mut varbind_list = Reader::new(varbind_list);
    if varbind_list.is_empty() {
        return Err(OltError::Command("SNMP response carried no varbinds".into()));
    }
    let (_, varbind) = varbind_list.read_tlv()?;

    let mut varbind = Reader::new(varbind);
    let (_, _oid) = varbind.read_tlv()?;
    let (tag, value) = varbind.read_tlv()?;

    match tag {
        TAG_INTEGER => {
            let mut v: i64 = if value.first().is_some_and(|b| b & 0x80 != 0) { -1 } else { 0 };
            for b in value {
                v = (v << 8) | *b as i64;
            }
            Ok(v.to_string())
        }
        TAG_OCTET_STRING => Ok(String::from_utf8_lossy(value).to_string()),
        TAG_NULL => Ok(String::new()),
        TAG_IP_ADDRESS if value.len() == 4 => {
            Ok(format!("{}.{}.{}.{}", value[0], value[1], value[2], value[3]))
        }
        TAG_COUNTER32 | TAG_GAUGE32 | TAG_TIMETICKS => Ok(decode_unsigned(value).to_string()),
        0x80 | 0x81 | 0x82 => Err(OltError::Command("no such object or instance".into())),
        other => Err(OltError::Command(format!("unsupported SNMP value tag {other:#x}"))),
    }
}
