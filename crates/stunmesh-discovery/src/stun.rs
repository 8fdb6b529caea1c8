//! STUN message codec (RFC 5389)
//!
//! Only what endpoint discovery needs: Binding requests and responses, the
//! address-carrying attributes, SOFTWARE and ERROR-CODE. Anything else is
//! kept as [`StunAttribute::Unknown`].

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use rand::RngCore;

/// STUN magic cookie (0x2112A442)
pub const MAGIC_COOKIE: u32 = 0x2112_A442;

/// STUN message header size (20 bytes)
pub const HEADER_SIZE: usize = 20;

/// Transaction ID length (96 bits)
pub const TRANSACTION_ID_SIZE: usize = 12;

const ATTR_MAPPED_ADDRESS: u16 = 0x0001;
const ATTR_ERROR_CODE: u16 = 0x0009;
const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;
const ATTR_SOFTWARE: u16 = 0x8022;
const ATTR_OTHER_ADDRESS: u16 = 0x802c;

const FAMILY_IPV4: u8 = 0x01;
const FAMILY_IPV6: u8 = 0x02;

/// STUN wire decoding errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StunError {
    /// Fewer bytes than a STUN header
    #[error("STUN message too short")]
    MessageTooShort,

    /// Magic cookie mismatch
    #[error("invalid STUN magic cookie")]
    InvalidMagicCookie,

    /// Method other than Binding, or top bits set
    #[error("invalid STUN message type {0:#06x}")]
    InvalidMessageType(u16),

    /// Declared length runs past the buffer
    #[error("STUN message length {declared} exceeds {available} available bytes")]
    LengthMismatch {
        /// Length field value
        declared: usize,
        /// Bytes after the header
        available: usize,
    },

    /// Attribute value malformed
    #[error("invalid STUN attribute {0:#06x}")]
    InvalidAttribute(u16),
}

/// STUN message class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StunMessageClass {
    /// Request message
    Request,
    /// Success response
    SuccessResponse,
    /// Error response
    ErrorResponse,
    /// Indication (no response expected)
    Indication,
}

impl StunMessageClass {
    /// Encode a Binding message type for this class.
    ///
    /// RFC 5389 Section 6 interleaves the class bits C0/C1 at bits 4 and 8
    /// of the method; for Binding (method 0x001) that leaves:
    ///
    /// ```text
    /// Request 0x0001  Indication 0x0011  Success 0x0101  Error 0x0111
    /// ```
    #[must_use]
    pub fn binding_type(self) -> u16 {
        let class_bits: u16 = match self {
            Self::Request => 0b00,
            Self::Indication => 0b01,
            Self::SuccessResponse => 0b10,
            Self::ErrorResponse => 0b11,
        };
        0x0001 | ((class_bits & 0x01) << 4) | ((class_bits & 0x02) << 7)
    }

    fn from_binding_type(msg_type: u16) -> Result<Self, StunError> {
        if msg_type & 0xC000 != 0 {
            return Err(StunError::InvalidMessageType(msg_type));
        }
        let method = (msg_type & 0x000F) | ((msg_type >> 1) & 0x0070) | ((msg_type >> 2) & 0x0F80);
        if method != 0x0001 {
            return Err(StunError::InvalidMessageType(msg_type));
        }
        Ok(match ((msg_type >> 4) & 0x01) | (((msg_type >> 8) & 0x01) << 1) {
            0b00 => Self::Request,
            0b01 => Self::Indication,
            0b10 => Self::SuccessResponse,
            _ => Self::ErrorResponse,
        })
    }
}

/// STUN attributes understood by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StunAttribute {
    /// MAPPED-ADDRESS (0x0001), plain form used by RFC 3489 servers
    MappedAddress(SocketAddr),
    /// XOR-MAPPED-ADDRESS (0x0020)
    XorMappedAddress(SocketAddr),
    /// OTHER-ADDRESS (0x802c), the server's alternate address
    OtherAddress(SocketAddr),
    /// SOFTWARE (0x8022)
    Software(String),
    /// ERROR-CODE (0x0009)
    ErrorCode {
        /// Three-digit error code
        code: u16,
        /// Reason phrase
        reason: String,
    },
    /// Any other attribute
    Unknown(u16, Vec<u8>),
}

fn encode_address(addr: &SocketAddr) -> Vec<u8> {
    let mut value = vec![0];
    match addr.ip() {
        IpAddr::V4(ip) => {
            value.push(FAMILY_IPV4);
            value.extend_from_slice(&addr.port().to_be_bytes());
            value.extend_from_slice(&ip.octets());
        }
        IpAddr::V6(ip) => {
            value.push(FAMILY_IPV6);
            value.extend_from_slice(&addr.port().to_be_bytes());
            value.extend_from_slice(&ip.octets());
        }
    }
    value
}

fn decode_address(attr_type: u16, value: &[u8]) -> Result<SocketAddr, StunError> {
    let invalid = || StunError::InvalidAttribute(attr_type);
    let header = value.get(..4).ok_or_else(invalid)?;
    let port = u16::from_be_bytes([header[2], header[3]]);
    let ip = match header[1] {
        FAMILY_IPV4 => {
            let octets: [u8; 4] = value.get(4..8).ok_or_else(invalid)?.try_into().map_err(|_| invalid())?;
            IpAddr::V4(Ipv4Addr::from(octets))
        }
        FAMILY_IPV6 => {
            let octets: [u8; 16] = value.get(4..20).ok_or_else(invalid)?.try_into().map_err(|_| invalid())?;
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        _ => return Err(invalid()),
    };
    Ok(SocketAddr::new(ip, port))
}

/// XOR (un)masking is its own inverse: port with the top half of the cookie,
/// address with the cookie (IPv4) or cookie || transaction ID (IPv6).
fn xor_address(addr: &SocketAddr, transaction_id: &[u8; TRANSACTION_ID_SIZE]) -> SocketAddr {
    let port = addr.port() ^ (MAGIC_COOKIE >> 16) as u16;
    let mut key = [0u8; 16];
    key[..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
    key[4..].copy_from_slice(transaction_id);

    let ip = match addr.ip() {
        IpAddr::V4(ip) => {
            let mut octets = ip.octets();
            octets.iter_mut().zip(key).for_each(|(b, k)| *b ^= k);
            IpAddr::V4(Ipv4Addr::from(octets))
        }
        IpAddr::V6(ip) => {
            let mut octets = ip.octets();
            octets.iter_mut().zip(key).for_each(|(b, k)| *b ^= k);
            IpAddr::V6(Ipv6Addr::from(octets))
        }
    };
    SocketAddr::new(ip, port)
}

impl StunAttribute {
    fn attr_type(&self) -> u16 {
        match self {
            Self::MappedAddress(_) => ATTR_MAPPED_ADDRESS,
            Self::ErrorCode { .. } => ATTR_ERROR_CODE,
            Self::XorMappedAddress(_) => ATTR_XOR_MAPPED_ADDRESS,
            Self::Software(_) => ATTR_SOFTWARE,
            Self::OtherAddress(_) => ATTR_OTHER_ADDRESS,
            Self::Unknown(t, _) => *t,
        }
    }

    fn encode_value(&self, transaction_id: &[u8; TRANSACTION_ID_SIZE]) -> Vec<u8> {
        match self {
            Self::MappedAddress(addr) | Self::OtherAddress(addr) => encode_address(addr),
            Self::XorMappedAddress(addr) => encode_address(&xor_address(addr, transaction_id)),
            Self::Software(s) => s.as_bytes().to_vec(),
            Self::ErrorCode { code, reason } => {
                let mut value = vec![0, 0, (code / 100) as u8, (code % 100) as u8];
                value.extend_from_slice(reason.as_bytes());
                value
            }
            Self::Unknown(_, data) => data.clone(),
        }
    }

    fn encode(&self, transaction_id: &[u8; TRANSACTION_ID_SIZE], out: &mut Vec<u8>) {
        let value = self.encode_value(transaction_id);
        out.extend_from_slice(&self.attr_type().to_be_bytes());
        out.extend_from_slice(&(value.len() as u16).to_be_bytes());
        out.extend_from_slice(&value);
        let padding = (4 - (value.len() % 4)) % 4;
        out.extend(std::iter::repeat_n(0, padding));
    }

    fn decode(
        attr_type: u16,
        value: &[u8],
        transaction_id: &[u8; TRANSACTION_ID_SIZE],
    ) -> Result<Self, StunError> {
        match attr_type {
            ATTR_MAPPED_ADDRESS => decode_address(attr_type, value).map(Self::MappedAddress),
            ATTR_OTHER_ADDRESS => decode_address(attr_type, value).map(Self::OtherAddress),
            ATTR_XOR_MAPPED_ADDRESS => decode_address(attr_type, value)
                .map(|masked| Self::XorMappedAddress(xor_address(&masked, transaction_id))),
            ATTR_SOFTWARE => Ok(Self::Software(String::from_utf8_lossy(value).into_owned())),
            ATTR_ERROR_CODE => {
                let header = value.get(..4).ok_or(StunError::InvalidAttribute(attr_type))?;
                let code = u16::from(header[2] & 0x07) * 100 + u16::from(header[3]);
                Ok(Self::ErrorCode {
                    code,
                    reason: String::from_utf8_lossy(&value[4..]).into_owned(),
                })
            }
            _ => Ok(Self::Unknown(attr_type, value.to_vec())),
        }
    }
}

/// STUN Binding message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StunMessage {
    /// Message class
    pub class: StunMessageClass,
    /// Transaction ID (96 bits)
    pub transaction_id: [u8; TRANSACTION_ID_SIZE],
    /// Message attributes
    pub attributes: Vec<StunAttribute>,
}

impl StunMessage {
    /// Create a Binding Request with a fresh random transaction ID.
    #[must_use]
    pub fn binding_request() -> Self {
        let mut transaction_id = [0u8; TRANSACTION_ID_SIZE];
        rand::thread_rng().fill_bytes(&mut transaction_id);
        Self {
            class: StunMessageClass::Request,
            transaction_id,
            attributes: Vec::new(),
        }
    }

    /// Create a Binding Success Response echoing `transaction_id`.
    #[must_use]
    pub fn binding_success(transaction_id: [u8; TRANSACTION_ID_SIZE], attributes: Vec<StunAttribute>) -> Self {
        Self {
            class: StunMessageClass::SuccessResponse,
            transaction_id,
            attributes,
        }
    }

    /// Encode message to bytes
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE + 32);
        bytes.extend_from_slice(&self.class.binding_type().to_be_bytes());
        bytes.extend_from_slice(&[0u8; 2]);
        bytes.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        bytes.extend_from_slice(&self.transaction_id);

        for attr in &self.attributes {
            attr.encode(&self.transaction_id, &mut bytes);
        }

        let length = (bytes.len() - HEADER_SIZE) as u16;
        bytes[2..4].copy_from_slice(&length.to_be_bytes());
        bytes
    }

    /// Transaction ID of a raw message, without decoding attributes.
    #[must_use]
    pub fn peek_transaction_id(bytes: &[u8]) -> Option<[u8; TRANSACTION_ID_SIZE]> {
        bytes.get(8..HEADER_SIZE)?.try_into().ok()
    }

    /// Decode message from bytes
    ///
    /// Attributes whose values are malformed make the whole message invalid;
    /// truncated trailing attribute headers are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, StunError> {
        if bytes.len() < HEADER_SIZE {
            return Err(StunError::MessageTooShort);
        }

        let msg_type = u16::from_be_bytes([bytes[0], bytes[1]]);
        let length = usize::from(u16::from_be_bytes([bytes[2], bytes[3]]));
        let cookie = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if cookie != MAGIC_COOKIE {
            return Err(StunError::InvalidMagicCookie);
        }
        let class = StunMessageClass::from_binding_type(msg_type)?;

        let available = bytes.len() - HEADER_SIZE;
        if length > available {
            return Err(StunError::LengthMismatch {
                declared: length,
                available,
            });
        }

        let mut transaction_id = [0u8; TRANSACTION_ID_SIZE];
        transaction_id.copy_from_slice(&bytes[8..HEADER_SIZE]);

        let body = &bytes[HEADER_SIZE..HEADER_SIZE + length];
        let mut attributes = Vec::new();
        let mut offset = 0;
        while offset + 4 <= body.len() {
            let attr_type = u16::from_be_bytes([body[offset], body[offset + 1]]);
            let attr_len = usize::from(u16::from_be_bytes([body[offset + 2], body[offset + 3]]));
            offset += 4;

            let value = body
                .get(offset..offset + attr_len)
                .ok_or(StunError::InvalidAttribute(attr_type))?;
            attributes.push(StunAttribute::decode(attr_type, value, &transaction_id)?);
            offset += attr_len + (4 - attr_len % 4) % 4;
        }

        Ok(Self {
            class,
            transaction_id,
            attributes,
        })
    }

    /// XOR-MAPPED-ADDRESS, if present.
    #[must_use]
    pub fn xor_mapped_address(&self) -> Option<SocketAddr> {
        self.attributes.iter().find_map(|attr| match attr {
            StunAttribute::XorMappedAddress(addr) => Some(*addr),
            _ => None,
        })
    }

    /// MAPPED-ADDRESS, if present.
    #[must_use]
    pub fn mapped_address(&self) -> Option<SocketAddr> {
        self.attributes.iter().find_map(|attr| match attr {
            StunAttribute::MappedAddress(addr) => Some(*addr),
            _ => None,
        })
    }

    /// OTHER-ADDRESS, if present.
    #[must_use]
    pub fn other_address(&self) -> Option<SocketAddr> {
        self.attributes.iter().find_map(|attr| match attr {
            StunAttribute::OtherAddress(addr) => Some(*addr),
            _ => None,
        })
    }

    /// SOFTWARE, if present.
    #[must_use]
    pub fn software(&self) -> Option<&str> {
        self.attributes.iter().find_map(|attr| match attr {
            StunAttribute::Software(s) => Some(s.as_str()),
            _ => None,
        })
    }

    /// ERROR-CODE, if present.
    #[must_use]
    pub fn error_code(&self) -> Option<(u16, &str)> {
        self.attributes.iter().find_map(|attr| match attr {
            StunAttribute::ErrorCode { code, reason } => Some((*code, reason.as_str())),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_type_encoding() {
        assert_eq!(StunMessageClass::Request.binding_type(), 0x0001);
        assert_eq!(StunMessageClass::Indication.binding_type(), 0x0011);
        assert_eq!(StunMessageClass::SuccessResponse.binding_type(), 0x0101);
        assert_eq!(StunMessageClass::ErrorResponse.binding_type(), 0x0111);

        for class in [
            StunMessageClass::Request,
            StunMessageClass::Indication,
            StunMessageClass::SuccessResponse,
            StunMessageClass::ErrorResponse,
        ] {
            assert_eq!(StunMessageClass::from_binding_type(class.binding_type()), Ok(class));
        }
    }

    #[test]
    fn test_rejects_other_methods() {
        // Allocate request (TURN)
        assert_eq!(
            StunMessageClass::from_binding_type(0x0003),
            Err(StunError::InvalidMessageType(0x0003))
        );
    }

    #[test]
    fn test_binding_request_layout() {
        let request = StunMessage::binding_request();
        let bytes = request.encode();

        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[0..2], &[0x00, 0x01]);
        assert_eq!(&bytes[2..4], &[0x00, 0x00]);
        assert_eq!(&bytes[4..8], &MAGIC_COOKIE.to_be_bytes());
        assert_eq!(&bytes[8..20], &request.transaction_id);
        assert_eq!(StunMessage::peek_transaction_id(&bytes), Some(request.transaction_id));
    }

    #[test]
    fn test_fresh_transaction_ids() {
        assert_ne!(
            StunMessage::binding_request().transaction_id,
            StunMessage::binding_request().transaction_id
        );
    }

    #[test]
    fn test_rfc5769_ipv4_response() {
        // RFC 5769 Section 2.2, with MESSAGE-INTEGRITY and FINGERPRINT dropped
        let transaction_id = [0xb7, 0xe7, 0xa7, 0x01, 0xbc, 0x34, 0xd6, 0x86, 0xfa, 0x87, 0xdf, 0xae];
        let mut bytes = vec![0x01, 0x01, 0x00, 0x1c, 0x21, 0x12, 0xa4, 0x42];
        bytes.extend_from_slice(&transaction_id);
        bytes.extend_from_slice(&[
            0x80, 0x22, 0x00, 0x0b, 0x74, 0x65, 0x73, 0x74, 0x20, 0x76, 0x65, 0x63, 0x74, 0x6f, 0x72, 0x20,
            0x00, 0x20, 0x00, 0x08, 0x00, 0x01, 0xa1, 0x47, 0xe1, 0x12, 0xa6, 0x43,
        ]);

        let message = StunMessage::decode(&bytes).unwrap();
        assert_eq!(message.class, StunMessageClass::SuccessResponse);
        assert_eq!(message.software(), Some("test vector"));
        assert_eq!(
            message.xor_mapped_address(),
            Some("192.0.2.1:32853".parse().unwrap())
        );
    }

    #[test]
    fn test_rfc5769_ipv6_response() {
        // RFC 5769 Section 2.3, with MESSAGE-INTEGRITY and FINGERPRINT dropped
        let transaction_id = [0xb7, 0xe7, 0xa7, 0x01, 0xbc, 0x34, 0xd6, 0x86, 0xfa, 0x87, 0xdf, 0xae];
        let mut bytes = vec![0x01, 0x01, 0x00, 0x28, 0x21, 0x12, 0xa4, 0x42];
        bytes.extend_from_slice(&transaction_id);
        bytes.extend_from_slice(&[
            0x80, 0x22, 0x00, 0x0b, 0x74, 0x65, 0x73, 0x74, 0x20, 0x76, 0x65, 0x63, 0x74, 0x6f, 0x72, 0x20,
            0x00, 0x20, 0x00, 0x14, 0x00, 0x02, 0xa1, 0x47, 0x01, 0x13, 0xa9, 0xfa, 0xa5, 0xd3, 0xf1, 0x79,
            0xbc, 0x25, 0xf4, 0xb5, 0xbe, 0xd2, 0xb9, 0xd9,
        ]);

        let message = StunMessage::decode(&bytes).unwrap();
        assert_eq!(
            message.xor_mapped_address(),
            Some("[2001:db8:1234:5678:11:2233:4455:6677]:32853".parse().unwrap())
        );
    }

    #[test]
    fn test_diagnostic_attributes() {
        let response = StunMessage::binding_success(
            [7u8; 12],
            vec![
                StunAttribute::MappedAddress("198.51.100.7:40000".parse().unwrap()),
                StunAttribute::XorMappedAddress("198.51.100.7:40000".parse().unwrap()),
                StunAttribute::OtherAddress("[2001:db8::2]:3479".parse().unwrap()),
                StunAttribute::Software("stund".into()),
            ],
        );
        let decoded = StunMessage::decode(&response.encode()).unwrap();

        assert_eq!(decoded, response);
        assert_eq!(decoded.mapped_address(), decoded.xor_mapped_address());
        assert_eq!(decoded.other_address(), Some("[2001:db8::2]:3479".parse().unwrap()));
    }

    #[test]
    fn test_error_code_attribute() {
        let response = StunMessage {
            class: StunMessageClass::ErrorResponse,
            transaction_id: [1u8; 12],
            attributes: vec![StunAttribute::ErrorCode {
                code: 420,
                reason: "Unknown Attribute".into(),
            }],
        };
        let decoded = StunMessage::decode(&response.encode()).unwrap();
        assert_eq!(decoded.error_code(), Some((420, "Unknown Attribute")));
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(StunMessage::decode(&[0u8; 10]), Err(StunError::MessageTooShort));

        let mut bad_cookie = StunMessage::binding_request().encode();
        bad_cookie[4] = 0;
        assert_eq!(StunMessage::decode(&bad_cookie), Err(StunError::InvalidMagicCookie));

        let mut long = StunMessage::binding_request().encode();
        long[3] = 8;
        assert_eq!(
            StunMessage::decode(&long),
            Err(StunError::LengthMismatch { declared: 8, available: 0 })
        );
    }

    #[test]
    fn test_malformed_address_attribute() {
        let mut bytes = StunMessage::binding_success([0u8; 12], vec![]).encode();
        bytes.extend_from_slice(&[0x00, 0x20, 0x00, 0x04, 0x00, 0x01, 0x00, 0x00]);
        bytes[3] = 8;
        assert_eq!(StunMessage::decode(&bytes), Err(StunError::InvalidAttribute(0x0020)));
    }

    #[test]
    fn test_unknown_attribute_kept() {
        let message = StunMessage::binding_success([0u8; 12], vec![StunAttribute::Unknown(0x8055, vec![1, 2, 3])]);
        let decoded = StunMessage::decode(&message.encode()).unwrap();
        assert_eq!(decoded.attributes, vec![StunAttribute::Unknown(0x8055, vec![1, 2, 3])]);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..128)) {
                let _ = StunMessage::decode(&bytes);
                let _ = StunMessage::peek_transaction_id(&bytes);
            }

            #[test]
            fn xor_mapped_roundtrip(ip in any::<[u8; 16]>(), port in any::<u16>(), tid in any::<[u8; 12]>()) {
                let addr = SocketAddr::from((std::net::Ipv6Addr::from(ip), port));
                let message = StunMessage::binding_success(tid, vec![StunAttribute::XorMappedAddress(addr)]);
                let decoded = StunMessage::decode(&message.encode()).unwrap();
                prop_assert_eq!(decoded.xor_mapped_address(), Some(addr));
            }
        }
    }
}
