//! Probe identity encoding for outbound packets.
//!
//! The identifier goes into the IPv4 identification field and the flow tag
//! into the transport field the protocol's [`FlowSlot`] names. Both are
//! fields routers leave alone and ICMP errors quote back.
//!
//! [`FlowSlot`]: crate::config::FlowSlot

use pnet::packet::ip::IpNextHeaderProtocol;
use pnet::packet::ipv4;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::CodecConfig;
use crate::error::{ParseError, ProbeError};
use crate::probe::cursor::{Cursor, Span};
use crate::probe::header::{Ethernet, Ipv4, TransportPrefix};
use crate::probe::matcher::EchoLayout;

/// Hidden identity carried by a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ProbeId {
    /// Disambiguates concurrent probe streams (ECMP paths)
    pub flow: u16,
    /// Disambiguates probes within a flow
    pub identifier: u16,
}

impl ProbeId {
    pub fn new(flow: u16, identifier: u16) -> Self {
        Self { flow, identifier }
    }
}

/// Values a probe is sent with, or expected to have been sent with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProbeArgs {
    pub ttl: u8,
    pub protocol: u8,
    pub id: ProbeId,
}

impl ProbeArgs {
    pub fn new(ttl: u8, protocol: u8, id: ProbeId) -> Self {
        Self { ttl, protocol, id }
    }
}

/// Headers located by [`probe_create`], for further tweaks by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeHeaders {
    pub eth: Span<Ethernet>,
    pub ip: Span<Ipv4>,
    pub transport: Span<TransportPrefix>,
}

/// Write a probe identity into an outbound packet skeleton.
///
/// The skeleton must hold an Ethernet header, an IPv4 header (options are
/// skipped) and at least the first 8 bytes of the transport header. All
/// headers are located before anything is written, so a failed call leaves
/// the buffer untouched and the probe must not be sent.
pub fn probe_create<B>(
    cursor: &mut Cursor<B>,
    args: &ProbeArgs,
    config: &CodecConfig,
) -> Result<ProbeHeaders, ProbeError>
where
    B: AsRef<[u8]> + AsMut<[u8]>,
{
    let field = *config.flow_field(args.protocol).ok_or_else(|| {
        debug!(protocol = args.protocol, "no flow field for probe protocol");
        ProbeError::UnsupportedProtocol(args.protocol)
    })?;

    let headers = locate_headers(cursor).inspect_err(|e| {
        debug!(error = %e, "probe skeleton rejected");
    })?;

    let mut ip = cursor.view_mut(headers.ip)?;
    ip.set_ttl(args.ttl);
    ip.set_next_level_protocol(IpNextHeaderProtocol::new(args.protocol));
    ip.set_identification(args.id.identifier);

    let offset = field.slot.offset(EchoLayout::Request);
    let raw = field.encode(args.id.flow);
    let transport = cursor.view_mut(headers.transport)?;
    let slot = transport
        .get_mut(offset..offset + 2)
        .ok_or(ParseError::Truncated {
            offset: headers.transport.offset() + offset,
            needed: 2,
            available: headers.transport.len().saturating_sub(offset),
        })?;
    slot.copy_from_slice(&raw.to_be_bytes());

    trace!(
        ttl = args.ttl,
        protocol = args.protocol,
        flow = args.id.flow,
        identifier = args.id.identifier,
        "probe identity written"
    );
    Ok(headers)
}

fn locate_headers<B: AsRef<[u8]>>(cursor: &mut Cursor<B>) -> Result<ProbeHeaders, ParseError> {
    let eth = cursor.parse::<Ethernet>()?;
    let ip = cursor.parse_ipv4()?;
    let transport = cursor.parse::<TransportPrefix>()?;
    Ok(ProbeHeaders { eth, ip, transport })
}

/// Recompute the IPv4 header checksum after the identity (and any caller
/// tweaks such as the destination address) has been written
pub fn probe_finalize<B>(cursor: &mut Cursor<B>, headers: &ProbeHeaders) -> Result<(), ParseError>
where
    B: AsRef<[u8]> + AsMut<[u8]>,
{
    let mut ip = cursor.view_mut(headers.ip)?;
    let checksum = ipv4::checksum(&ip.to_immutable());
    ip.set_checksum(checksum);
    Ok(())
}
