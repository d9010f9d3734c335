//! SNMP session client
//!
//! SNMP v1 or v2c over a connected tokio UDP socket. Each batch goes out as
//! a single GetRequest carrying every OID of the batch; the `snmp` crate only
//! builds single-OID requests, so the request is encoded here and the
//! response is read back with the crate's `AsnReader`.
//!
//! Error handling for a response:
//! - per-varbind `noSuchObject`, `noSuchInstance`, `endOfMibView` (v2c) read
//!   as absent values
//! - `noSuchName` (v1, or v2c agents answering v1-style) marks the named
//!   varbind absent and the rest of the batch is asked for again
//! - any other error status fails the batch

use async_trait::async_trait;
use snmp::{asn1, snmp as proto, AsnReader, ObjIdBuf, SnmpError, Value};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::trace;

use super::traits::{RawValue, Session, SessionClient};
use crate::core::oid::Oid;
use crate::error::{Result, UpsSrvError};

/// Agent port used when the target address carries none
pub const DEFAULT_SNMP_PORT: u16 = 161;

/// Largest datagram a response can arrive in
const MAX_DATAGRAM: usize = 65_535;

const NO_SUCH_OBJECT: u8 = asn1::CLASS_CONTEXTSPECIFIC;
const NO_SUCH_INSTANCE: u8 = asn1::CLASS_CONTEXTSPECIFIC | 1;
const END_OF_MIB_VIEW: u8 = asn1::CLASS_CONTEXTSPECIFIC | 2;

/// Protocol version put on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnmpVersion {
    #[default]
    V1,
    V2c,
}

impl SnmpVersion {
    fn wire(self) -> i64 {
        match self {
            SnmpVersion::V1 => 0,
            SnmpVersion::V2c => proto::VERSION_2,
        }
    }
}

impl FromStr for SnmpVersion {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "v1" => Ok(SnmpVersion::V1),
            "2c" | "v2c" => Ok(SnmpVersion::V2c),
            other => Err(format!("'{}' is not a supported SNMP version (1, 2c)", other)),
        }
    }
}

impl fmt::Display for SnmpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnmpVersion::V1 => f.write_str("1"),
            SnmpVersion::V2c => f.write_str("2c"),
        }
    }
}

/// Append the default agent port unless the address already has one
///
/// Bare IPv6 literals are bracketed first.
pub fn socket_address(address: &str) -> String {
    let address = address.trim();
    if let Some(rest) = address.strip_prefix('[') {
        return if rest.contains("]:") {
            address.to_string()
        } else {
            format!("{}:{}", address, DEFAULT_SNMP_PORT)
        };
    }
    match address.matches(':').count() {
        0 => format!("{}:{}", address, DEFAULT_SNMP_PORT),
        1 => address.to_string(),
        _ => format!("[{}]:{}", address, DEFAULT_SNMP_PORT),
    }
}

/// Numeric view of a varbind; anything else counts as absent
fn integer_value(value: &Value<'_>) -> RawValue {
    match *value {
        Value::Integer(v) => Some(v),
        Value::Counter32(v) | Value::Unsigned32(v) | Value::Timeticks(v) => Some(i64::from(v)),
        Value::Counter64(v) => i64::try_from(v).ok(),
        _ => None,
    }
}

// BER encoding of a GetRequest

fn push_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    out.push(0x80 | (bytes.len() - skip) as u8);
    out.extend_from_slice(&bytes[skip..]);
}

fn tlv(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 4);
    out.push(tag);
    push_length(&mut out, body.len());
    out.extend_from_slice(body);
    out
}

/// Shortest two's-complement form
fn integer(n: i64) -> Vec<u8> {
    let bytes = n.to_be_bytes();
    let mut start = 0;
    while start < bytes.len() - 1 {
        let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
            || (bytes[start] == 0xff && bytes[start + 1] & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    tlv(asn1::TYPE_INTEGER, &bytes[start..])
}

fn push_subidentifier(out: &mut Vec<u8>, mut value: u32) {
    let mut septets = [0u8; 5];
    let mut start = septets.len();
    loop {
        start -= 1;
        septets[start] = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            break;
        }
    }
    let last = septets.len() - 1;
    for septet in &mut septets[start..last] {
        *septet |= 0x80;
    }
    out.extend_from_slice(&septets[start..]);
}

fn object_identifier(oid: &Oid) -> Vec<u8> {
    let arcs = oid.as_slice();
    let (head, tail) = match arcs {
        [first, second, rest @ ..] => (first.saturating_mul(40).saturating_add(*second), rest),
        [first] => (first.saturating_mul(40), &[][..]),
        [] => (0, &[][..]),
    };
    let mut body = Vec::with_capacity(arcs.len() + 4);
    push_subidentifier(&mut body, head);
    for arc in tail {
        push_subidentifier(&mut body, *arc);
    }
    tlv(asn1::TYPE_OBJECTIDENTIFIER, &body)
}

fn encode_get_request(
    version: SnmpVersion,
    community: &[u8],
    request_id: i32,
    oids: &[&Oid],
) -> Vec<u8> {
    let mut varbinds = Vec::new();
    for oid in oids {
        let mut varbind = object_identifier(oid);
        varbind.extend_from_slice(&[asn1::TYPE_NULL, 0]);
        varbinds.extend(tlv(asn1::TYPE_SEQUENCE, &varbind));
    }

    let mut pdu = integer(i64::from(request_id));
    pdu.extend(integer(0)); // error status
    pdu.extend(integer(0)); // error index
    pdu.extend(tlv(asn1::TYPE_SEQUENCE, &varbinds));

    let mut message = integer(version.wire());
    message.extend(tlv(asn1::TYPE_OCTETSTRING, community));
    message.extend(tlv(proto::MSG_GET, &pdu));
    tlv(asn1::TYPE_SEQUENCE, &message)
}

/// What a response says about one request
#[derive(Debug, PartialEq, Eq)]
enum Reply {
    /// One value per requested OID, in request order
    Values(Vec<RawValue>),
    /// The agent rejected the OID at this position
    NoSuchName(usize),
}

fn malformed(err: SnmpError) -> String {
    format!("malformed response: {:?}", err)
}

/// Decode a response datagram
///
/// `Ok(None)` means the datagram answers some other request (a late reply
/// to an earlier, timed-out one) and should be skipped.
fn decode_response(
    datagram: &[u8],
    version: SnmpVersion,
    request_id: i32,
    community: &[u8],
    requested: &[&Oid],
) -> std::result::Result<Option<Reply>, String> {
    let mut message = AsnReader::from_bytes(
        AsnReader::from_bytes(datagram)
            .read_raw(asn1::TYPE_SEQUENCE)
            .map_err(malformed)?,
    );
    let wire_version = message.read_asn_integer().map_err(malformed)?;
    if wire_version != version.wire() {
        return Err(format!(
            "response carries version field {} instead of {}",
            wire_version,
            version.wire()
        ));
    }
    if message.read_asn_octetstring().map_err(malformed)? != community {
        return Ok(None);
    }

    let mut pdu = AsnReader::from_bytes(message.read_raw(proto::MSG_RESPONSE).map_err(malformed)?);
    if pdu.read_asn_integer().map_err(malformed)? != i64::from(request_id) {
        return Ok(None);
    }
    let error_status = pdu.read_asn_integer().map_err(malformed)?;
    let error_index = pdu.read_asn_integer().map_err(malformed)?;
    match error_status {
        0 => {}
        status if status == i64::from(proto::ERRSTATUS_NOSUCHNAME) => {
            // error index is 1-based
            return usize::try_from(error_index)
                .ok()
                .filter(|index| (1..=requested.len()).contains(index))
                .map(|index| Some(Reply::NoSuchName(index - 1)))
                .ok_or_else(|| format!("noSuchName at invalid index {}", error_index));
        }
        status => {
            return Err(format!(
                "agent returned error status {} at index {}",
                status, error_index
            ))
        }
    }

    let mut varbinds = AsnReader::from_bytes(pdu.read_raw(asn1::TYPE_SEQUENCE).map_err(malformed)?);
    let mut values = Vec::with_capacity(requested.len());
    let mut name_buf: ObjIdBuf = [0; 128];
    while varbinds.peek_byte().is_ok() {
        let mut pair =
            AsnReader::from_bytes(varbinds.read_raw(asn1::TYPE_SEQUENCE).map_err(malformed)?);
        let name = pair.read_asn_objectidentifier().map_err(malformed)?;
        let name = name.read_name(&mut name_buf).map_err(malformed)?;

        let expected = requested.get(values.len()).ok_or_else(|| {
            format!("response carries more than {} values", requested.len())
        })?;
        if name != expected.as_slice() {
            return Err(format!(
                "response names {} where {} was requested",
                Oid::from_slice(name),
                expected
            ));
        }

        let value = match pair.peek_byte().map_err(malformed)? {
            NO_SUCH_OBJECT | NO_SUCH_INSTANCE | END_OF_MIB_VIEW => None,
            _ => pair.next().as_ref().and_then(integer_value),
        };
        values.push(value);
    }

    if values.len() != requested.len() {
        return Err(format!(
            "response carries {} values for {} registers",
            values.len(),
            requested.len()
        ));
    }
    Ok(Some(Reply::Values(values)))
}

/// Send one request and wait for its response, skipping unrelated datagrams
async fn exchange(
    socket: &UdpSocket,
    buffer: &mut [u8],
    version: SnmpVersion,
    request_id: i32,
    community: &[u8],
    batch: &[&Oid],
) -> std::result::Result<Reply, String> {
    let request = encode_get_request(version, community, request_id, batch);
    socket
        .send(&request)
        .await
        .map_err(|e| format!("send failed: {}", e))?;

    loop {
        let len = socket
            .recv(buffer)
            .await
            .map_err(|e| format!("receive failed: {}", e))?;
        match decode_response(&buffer[..len], version, request_id, community, batch)? {
            Some(reply) => return Ok(reply),
            None => trace!(request_id, "Skipping unrelated SNMP datagram"),
        }
    }
}

async fn connect_socket(destination: &str) -> std::io::Result<UdpSocket> {
    let remote = tokio::net::lookup_host(destination)
        .await?
        .next()
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                "address resolved to nothing",
            )
        })?;
    let local: SocketAddr = if remote.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(remote).await?;
    Ok(socket)
}

/// SNMP client speaking one protocol version to every target
#[derive(Debug, Clone, Default)]
pub struct SnmpClient {
    version: SnmpVersion,
}

impl SnmpClient {
    pub fn new(version: SnmpVersion) -> Self {
        Self { version }
    }
}

#[async_trait]
impl SessionClient for SnmpClient {
    async fn open(
        &self,
        address: &str,
        community: &str,
        timeout: Duration,
    ) -> Result<Box<dyn Session>> {
        let destination = socket_address(address);
        let socket = tokio::time::timeout(timeout, connect_socket(&destination))
            .await
            .map_err(|_| UpsSrvError::connect(address, "address lookup timed out"))?
            .map_err(|e| UpsSrvError::connect(address, e.to_string()))?;

        Ok(Box::new(SnmpSession {
            address: address.to_string(),
            version: self.version,
            community: community.as_bytes().to_vec(),
            timeout,
            socket: Some(socket),
            request_id: 0,
            buffer: vec![0; MAX_DATAGRAM],
        }))
    }
}

/// One UDP socket connected to one agent
pub struct SnmpSession {
    address: String,
    version: SnmpVersion,
    community: Vec<u8>,
    timeout: Duration,
    socket: Option<UdpSocket>,
    request_id: i32,
    buffer: Vec<u8>,
}

impl SnmpSession {
    /// One GetRequest for `batch`, bounded by the session timeout
    async fn get(&mut self, batch: &[&Oid]) -> Result<Reply> {
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| UpsSrvError::transport(&self.address, "session is closed"))?;
        self.request_id = self.request_id.wrapping_add(1);

        let exchange = exchange(
            socket,
            &mut self.buffer,
            self.version,
            self.request_id,
            &self.community,
            batch,
        );
        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(reply) => reply.map_err(|reason| UpsSrvError::transport(&self.address, reason)),
            Err(_) => Err(UpsSrvError::transport(
                &self.address,
                format!("no response within {} ms", self.timeout.as_millis()),
            )),
        }
    }
}

#[async_trait]
impl Session for SnmpSession {
    async fn read_registers(&mut self, oids: &[Oid]) -> Result<Vec<RawValue>> {
        let mut values = vec![None; oids.len()];
        // positions in `oids` still to be asked for
        let mut pending: Vec<usize> = (0..oids.len()).collect();

        while !pending.is_empty() {
            let batch: Vec<&Oid> = pending.iter().map(|&i| &oids[i]).collect();
            match self.get(&batch).await? {
                Reply::Values(reply) => {
                    for (&i, value) in pending.iter().zip(reply) {
                        values[i] = value;
                    }
                    break;
                }
                Reply::NoSuchName(position) => {
                    pending.remove(position);
                }
            }
        }

        trace!(address = %self.address, registers = values.len(), "SNMP batch read");
        Ok(values)
    }

    async fn close(&mut self) {
        self.socket = None;
    }
}
