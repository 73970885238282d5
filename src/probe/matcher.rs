//! Correlation of inbound ICMP error reports with outstanding probes.
//!
//! An ICMP error quotes the original IPv4 header plus at least 8 bytes of
//! the transport header (RFC 792). [`probe_match`] re-reads the probe
//! identity from that quote and explains any difference from the expected
//! probe, checking TTL, then protocol, then flow/identifier.

use std::net::Ipv4Addr;

use pnet::packet::Packet;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::{CodecConfig, IPPROTO_ICMP};
use crate::error::ParseError;
use crate::probe::codec::ProbeArgs;
use crate::probe::cursor::Cursor;
use crate::probe::header::{Ethernet, IcmpError, TRANSPORT_PREFIX_LEN, TransportPrefix};

// ICMPv4 error types that quote the offending datagram
const ICMP_DEST_UNREACHABLE: u8 = 3;
const ICMP_TIME_EXCEEDED: u8 = 11;
const ICMP_PARAMETER_PROBLEM: u8 = 12;

/// Fragmentation Needed code of Destination Unreachable
const ICMP_FRAG_NEEDED: u8 = 4;

/// Why a reply does not belong to the expected probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Mismatch {
    None = 0,
    Ttl = 1,
    Protocol = 2,
    Flow = 3,
}

impl Mismatch {
    /// Stable code for logs and shared maps
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Ttl),
            2 => Some(Self::Protocol),
            3 => Some(Self::Flow),
            _ => None,
        }
    }

    pub fn is_match(self) -> bool {
        self == Self::None
    }
}

/// Which structure the embedded headers have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EchoLayout {
    /// Quote of our own request: every identity field is valid
    Request,
    /// Direct reply from the target: ports are swapped, TTL and
    /// identification are the responder's own and are not compared
    Reply,
}

impl EchoLayout {
    pub fn from_is_request(is_request: bool) -> Self {
        if is_request {
            Self::Request
        } else {
            Self::Reply
        }
    }
}

/// Compare the probe quoted at the cursor against `expected`.
///
/// The cursor must sit at the embedded IPv4 header. Returns `Err` when the
/// quote is too short to decide; that is not the same as "not ours".
pub fn probe_match<B: AsRef<[u8]>>(
    cursor: &mut Cursor<B>,
    expected: &ProbeArgs,
    layout: EchoLayout,
    config: &CodecConfig,
) -> Result<Mismatch, ParseError> {
    let ip = cursor.parse_ipv4().inspect_err(|e| {
        trace!(error = %e, "quoted IPv4 header truncated");
    })?;
    let (ttl, protocol, identification) = {
        let view = cursor.view(ip)?;
        (
            view.get_ttl(),
            view.get_next_level_protocol().0,
            view.get_identification(),
        )
    };

    let result = if layout == EchoLayout::Request && ttl != expected.ttl {
        Mismatch::Ttl
    } else if protocol != expected.protocol {
        Mismatch::Protocol
    } else if let Some(field) = config.flow_field(protocol) {
        let transport = cursor.parse::<TransportPrefix>().inspect_err(|e| {
            trace!(error = %e, "quoted transport header truncated");
        })?;
        let prefix = cursor.view(transport)?;
        let raw = read_slot(prefix, transport.offset(), field.slot.offset(layout))?;
        let flow = field.decode(raw);

        let identifier_ok =
            layout == EchoLayout::Reply || identification == expected.id.identifier;
        if identifier_ok && flow == expected.id.flow & field.mask() {
            Mismatch::None
        } else {
            Mismatch::Flow
        }
    } else {
        // No probe of ours can carry a protocol without a flow slot
        Mismatch::Flow
    };

    if !result.is_match() {
        debug!(
            ?result,
            ttl,
            protocol,
            identification,
            expected_ttl = expected.ttl,
            expected_protocol = expected.protocol,
            "quoted probe does not match"
        );
    }
    Ok(result)
}

/// Big-endian 16-bit slot at `offset` within a quoted transport prefix
/// that starts at `base` in the buffer
fn read_slot(
    prefix: &[u8; TRANSPORT_PREFIX_LEN],
    base: usize,
    offset: usize,
) -> Result<u16, ParseError> {
    match prefix.get(offset..offset.saturating_add(2)) {
        Some(&[hi, lo]) => Ok(u16::from_be_bytes([hi, lo])),
        _ => Err(ParseError::Truncated {
            offset: base.saturating_add(offset),
            needed: 2,
            available: TRANSPORT_PREFIX_LEN.saturating_sub(offset),
        }),
    }
}

/// Kind of ICMP error that carries a quoted probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportKind {
    TimeExceeded(u8),
    DestUnreachable(u8),
    ParameterProblem(u8),
}

/// Outer headers of an inbound ICMP error report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub kind: ReportKind,
    /// Source of the outer IPv4 header, i.e. the hop that answered
    pub responder: Ipv4Addr,
    /// Original datagram length from the RFC 4884 length field, if set
    pub quoted_len: Option<usize>,
    /// Next-hop MTU from Fragmentation Needed
    pub mtu: Option<u16>,
}

/// Walk the link layer, outer IPv4 header and ICMP error header of an
/// inbound frame, leaving the cursor at the quoted probe.
///
/// Returns `Ok(None)` for frames that are not ICMP error reports.
pub fn enter_error_report<B: AsRef<[u8]>>(
    cursor: &mut Cursor<B>,
) -> Result<Option<ErrorReport>, ParseError> {
    cursor.parse::<Ethernet>()?;
    let outer = cursor.parse_ipv4()?;
    let (protocol, responder) = {
        let view = cursor.view(outer)?;
        (view.get_next_level_protocol().0, view.get_source())
    };
    if protocol != IPPROTO_ICMP {
        return Ok(None);
    }

    let icmp = cursor.parse::<IcmpError>()?;
    let view = cursor.view(icmp)?;
    let code = view.get_icmp_code().0;
    // Rest of header: [0] unused, [1] RFC 4884 length, [2..4] MTU
    let rest = view.payload();

    let kind = match view.get_icmp_type().0 {
        ICMP_TIME_EXCEEDED => ReportKind::TimeExceeded(code),
        ICMP_DEST_UNREACHABLE => ReportKind::DestUnreachable(code),
        ICMP_PARAMETER_PROBLEM => ReportKind::ParameterProblem(code),
        other => {
            trace!(icmp_type = other, "ICMP message is not an error report");
            return Ok(None);
        }
    };

    let quoted_len = match rest.get(1) {
        Some(&words) if words > 0 => Some(usize::from(words) * 4),
        _ => None,
    };
    let mtu = match (kind, rest.get(2..4)) {
        (ReportKind::DestUnreachable(ICMP_FRAG_NEEDED), Some(&[hi, lo])) => {
            Some(u16::from_be_bytes([hi, lo])).filter(|&mtu| mtu > 0)
        }
        _ => None,
    };

    Ok(Some(ErrorReport {
        kind,
        responder,
        quoted_len,
        mtu,
    }))
}
