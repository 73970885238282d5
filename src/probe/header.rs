use pnet::packet::ethernet::{EthernetPacket, MutableEthernetPacket};
use pnet::packet::icmp::{IcmpPacket, MutableIcmpPacket};
use pnet::packet::ipv4::{Ipv4Packet, MutableIpv4Packet};

use crate::error::ParseError;
use crate::probe::cursor::{Cursor, Span};

/// Ethernet II header size
pub const ETHERNET_HEADER_LEN: usize = 14;
/// IPv4 header size without options
pub const IPV4_HEADER_LEN: usize = 20;
/// ICMP error header: type, code, checksum, 4 bytes rest-of-header
pub const ICMP_ERROR_HEADER_LEN: usize = 8;
/// Transport bytes an ICMP error is guaranteed to quote (RFC 792)
pub const TRANSPORT_PREFIX_LEN: usize = 8;

/// A header with a known fixed size that can be projected over buffer bytes
pub trait Header {
    const SIZE: usize;

    type View<'a>;
    type ViewMut<'a>;

    fn view(bytes: &[u8]) -> Option<Self::View<'_>>;
    fn view_mut(bytes: &mut [u8]) -> Option<Self::ViewMut<'_>>;
}

/// Link-layer header
pub enum Ethernet {}

/// Address header; the fixed portion is [`Header::SIZE`], options follow
pub enum Ipv4 {}

/// Fixed header of an ICMP error report
pub enum IcmpError {}

/// First 8 bytes of a UDP, TCP or ICMP header: ports or type/code/id
pub enum TransportPrefix {}

impl Header for Ethernet {
    const SIZE: usize = ETHERNET_HEADER_LEN;

    type View<'a> = EthernetPacket<'a>;
    type ViewMut<'a> = MutableEthernetPacket<'a>;

    fn view(bytes: &[u8]) -> Option<Self::View<'_>> {
        EthernetPacket::new(bytes)
    }

    fn view_mut(bytes: &mut [u8]) -> Option<Self::ViewMut<'_>> {
        MutableEthernetPacket::new(bytes)
    }
}

impl Header for Ipv4 {
    const SIZE: usize = IPV4_HEADER_LEN;

    type View<'a> = Ipv4Packet<'a>;
    type ViewMut<'a> = MutableIpv4Packet<'a>;

    fn view(bytes: &[u8]) -> Option<Self::View<'_>> {
        Ipv4Packet::new(bytes)
    }

    fn view_mut(bytes: &mut [u8]) -> Option<Self::ViewMut<'_>> {
        MutableIpv4Packet::new(bytes)
    }
}

impl Header for IcmpError {
    const SIZE: usize = ICMP_ERROR_HEADER_LEN;

    type View<'a> = IcmpPacket<'a>;
    type ViewMut<'a> = MutableIcmpPacket<'a>;

    fn view(bytes: &[u8]) -> Option<Self::View<'_>> {
        IcmpPacket::new(bytes)
    }

    fn view_mut(bytes: &mut [u8]) -> Option<Self::ViewMut<'_>> {
        MutableIcmpPacket::new(bytes)
    }
}

impl Header for TransportPrefix {
    const SIZE: usize = TRANSPORT_PREFIX_LEN;

    type View<'a> = &'a [u8; TRANSPORT_PREFIX_LEN];
    type ViewMut<'a> = &'a mut [u8; TRANSPORT_PREFIX_LEN];

    fn view(bytes: &[u8]) -> Option<Self::View<'_>> {
        bytes.get(..TRANSPORT_PREFIX_LEN)?.try_into().ok()
    }

    fn view_mut(bytes: &mut [u8]) -> Option<Self::ViewMut<'_>> {
        bytes.get_mut(..TRANSPORT_PREFIX_LEN)?.try_into().ok()
    }
}

impl<B: AsRef<[u8]>> Cursor<B> {
    /// Fixed parse: locate `H::SIZE` bytes at the current position and step over them.
    ///
    /// On failure the position is unchanged.
    pub fn parse<H: Header>(&mut self) -> Result<Span<H>, ParseError> {
        let offset = self.consume(H::SIZE)?;
        Ok(Span::new(offset, H::SIZE))
    }

    /// Variable-length parse of an IPv4 header including its options.
    ///
    /// The fixed 20 bytes are consumed first, then the options declared by the
    /// IHL field. If the options do not fit, the cursor stays just past the
    /// fixed portion; it is not rolled back to where the parse started.
    pub fn parse_ipv4(&mut self) -> Result<Span<Ipv4>, ParseError> {
        let fixed = self.parse::<Ipv4>()?;
        let ihl = self.view(fixed)?.get_header_length();

        let header_len = usize::from(ihl) * 4;
        if header_len < IPV4_HEADER_LEN {
            return Err(ParseError::BadHeaderLength {
                offset: fixed.offset(),
                ihl,
            });
        }

        self.consume(header_len - IPV4_HEADER_LEN)?;
        Ok(Span::new(fixed.offset(), header_len))
    }

    /// Read-only view of a previously parsed header
    pub fn view<H: Header>(&self, span: Span<H>) -> Result<H::View<'_>, ParseError> {
        let bytes = self.span_bytes(span)?;
        H::view(bytes).ok_or(ParseError::Truncated {
            offset: span.offset(),
            needed: H::SIZE,
            available: bytes.len(),
        })
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> Cursor<B> {
    /// Write-through view of a previously parsed header
    pub fn view_mut<H: Header>(&mut self, span: Span<H>) -> Result<H::ViewMut<'_>, ParseError> {
        let bytes = self.span_bytes_mut(span)?;
        let available = bytes.len();
        H::view_mut(bytes).ok_or(ParseError::Truncated {
            offset: span.offset(),
            needed: H::SIZE,
            available,
        })
    }
}
