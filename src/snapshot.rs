//! Binary snapshot form of parsed rules.
//!
//! Layout: `"URF1"` magic, a sequence of `(tag, listID, body)` records,
//! then a little-endian CRC32 over all record bytes. Integers are unsigned
//! LEB128; strings are length-prefixed UTF-8.
//!
//! Host rules serialize their parsed fields (IP + hostnames) and get a
//! canonical text line back on load. Network and cosmetic rules serialize
//! their original text: the parsed form is a pure function of text and
//! list id, so re-parsing on load is lossless and keeps the decoder in
//! lockstep with the parser.

use std::net::IpAddr;

use crate::error::FilterError;
use crate::hash::crc32;
use crate::rules::{CosmeticRule, HostRule, NetworkRule, Rule};
use crate::types::FilterListId;

/// Magic bytes: "URF1"
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"URF1";

const TAG_HOST: u8 = 1;
const TAG_NETWORK: u8 = 2;
const TAG_COSMETIC: u8 = 3;

// =============================================================================
// Varint
// =============================================================================

/// Encode an unsigned LEB128 varint.
pub fn encode_varint(buf: &mut Vec<u8>, value: u32) {
    let mut rest = value;
    while rest >= 0x80 {
        buf.push(rest as u8 | 0x80);
        rest >>= 7;
    }
    buf.push(rest as u8);
}

/// Decode a single unsigned LEB128 varint, advancing the input.
pub fn decode_varint(data: &mut &[u8]) -> Result<u32, FilterError> {
    let mut value: u32 = 0;
    let mut shift = 0u32;
    while shift <= 28 {
        let (&byte, rest) = data.split_first().ok_or(FilterError::Truncated)?;
        *data = rest;
        value |= u32::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
    // A u32 never takes more than five continuation bytes
    Err(FilterError::Truncated)
}

fn read_u8(data: &mut &[u8]) -> Result<u8, FilterError> {
    let (&byte, rest) = data.split_first().ok_or(FilterError::Truncated)?;
    *data = rest;
    Ok(byte)
}

fn read_bytes<'a>(data: &mut &'a [u8], len: usize) -> Result<&'a [u8], FilterError> {
    if data.len() < len {
        return Err(FilterError::Truncated);
    }
    let (bytes, rest) = data.split_at(len);
    *data = rest;
    Ok(bytes)
}

fn read_string(data: &mut &[u8]) -> Result<String, FilterError> {
    let len = decode_varint(data)? as usize;
    let bytes = read_bytes(data, len)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| FilterError::Truncated)
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    encode_varint(buf, s.len() as u32);
    buf.extend_from_slice(s.as_bytes());
}

// =============================================================================
// Per-rule records
// =============================================================================

/// Append one rule record. Returns the number of bytes written.
pub fn serialize_rule(rule: &Rule, buf: &mut Vec<u8>) -> usize {
    let start = buf.len();
    match rule {
        Rule::Host(host) => {
            buf.push(TAG_HOST);
            encode_varint(buf, host.filter_list_id() as u32);
            match host.ip() {
                IpAddr::V4(ip) => {
                    buf.push(4);
                    buf.extend_from_slice(&ip.octets());
                }
                IpAddr::V6(ip) => {
                    buf.push(16);
                    buf.extend_from_slice(&ip.octets());
                }
            }
            encode_varint(buf, host.hostnames().len() as u32);
            for hostname in host.hostnames() {
                write_string(buf, hostname);
            }
        }
        Rule::Network(network) => {
            buf.push(TAG_NETWORK);
            encode_varint(buf, network.filter_list_id() as u32);
            write_string(buf, network.text());
        }
        Rule::Cosmetic(cosmetic) => {
            buf.push(TAG_COSMETIC);
            encode_varint(buf, cosmetic.filter_list_id() as u32);
            write_string(buf, cosmetic.text());
        }
    }
    buf.len() - start
}

/// Decode one rule record, advancing the input.
pub fn deserialize_rule(data: &mut &[u8]) -> Result<Rule, FilterError> {
    let tag = read_u8(data)?;
    let list_id = decode_varint(data)? as FilterListId;

    match tag {
        TAG_HOST => {
            let ip_len = read_u8(data)?;
            let ip: IpAddr = match ip_len {
                4 => {
                    let octets: [u8; 4] = read_bytes(data, 4)?
                        .try_into()
                        .map_err(|_| FilterError::Truncated)?;
                    octets.into()
                }
                16 => {
                    let octets: [u8; 16] = read_bytes(data, 16)?
                        .try_into()
                        .map_err(|_| FilterError::Truncated)?;
                    octets.into()
                }
                _ => return Err(FilterError::Truncated),
            };
            let count = decode_varint(data)? as usize;
            let mut hostnames = Vec::with_capacity(count);
            for _ in 0..count {
                hostnames.push(read_string(data)?);
            }
            if hostnames.is_empty() {
                return Err(FilterError::Truncated);
            }
            Ok(Rule::Host(HostRule::from_parts(list_id, ip, hostnames)))
        }
        TAG_NETWORK => {
            let text = read_string(data)?;
            NetworkRule::new(&text, list_id).map(Rule::Network)
        }
        TAG_COSMETIC => {
            let text = read_string(data)?;
            CosmeticRule::new(&text, list_id).map(Rule::Cosmetic)
        }
        other => Err(FilterError::UnknownTag(other)),
    }
}

// =============================================================================
// Whole snapshots
// =============================================================================

/// Serialize rules into a self-checking snapshot.
pub fn write_snapshot<'a>(rules: impl IntoIterator<Item = &'a Rule>) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&SNAPSHOT_MAGIC);
    for rule in rules {
        serialize_rule(rule, &mut buf);
    }
    let checksum = crc32(&buf[SNAPSHOT_MAGIC.len()..]);
    buf.extend_from_slice(&checksum.to_le_bytes());
    buf
}

/// Load a snapshot, validating magic and checksum.
pub fn read_snapshot(data: &[u8]) -> Result<Vec<Rule>, FilterError> {
    if data.len() < SNAPSHOT_MAGIC.len() + 4 {
        return Err(FilterError::Truncated);
    }
    if data[..SNAPSHOT_MAGIC.len()] != SNAPSHOT_MAGIC {
        return Err(FilterError::InvalidMagic);
    }

    let records = &data[SNAPSHOT_MAGIC.len()..data.len() - 4];
    let stored = data[data.len() - 4..]
        .try_into()
        .map(u32::from_le_bytes)
        .map_err(|_| FilterError::Truncated)?;
    let computed = crc32(records);
    if stored != computed {
        return Err(FilterError::Crc32Mismatch { stored, computed });
    }

    let mut rules = Vec::new();
    let mut cursor = records;
    while !cursor.is_empty() {
        rules.push(deserialize_rule(&mut cursor)?);
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(rule: &Rule) -> Rule {
        let mut buf = Vec::new();
        let written = serialize_rule(rule, &mut buf);
        assert_eq!(written, buf.len());

        let mut cursor = buf.as_slice();
        let decoded = deserialize_rule(&mut cursor).unwrap();
        assert!(cursor.is_empty());
        decoded
    }

    #[test]
    fn test_host_rule_round_trip() {
        let rule = Rule::Host(
            HostRule::new("127.0.1.1       thishost.mydomain.org  thishost", -1).unwrap(),
        );
        assert_eq!(round_trip(&rule), rule);

        let rule = Rule::Host(HostRule::new("::1 localhost ip6-localhost", 3).unwrap());
        assert_eq!(round_trip(&rule), rule);

        let rule = Rule::Host(HostRule::new("example.org", 1).unwrap());
        assert_eq!(round_trip(&rule), rule);
    }

    #[test]
    fn test_network_rule_round_trip() {
        for text in [
            "||example.org^",
            "@@||example.org^$third-party,script",
            "/^stats?\\./",
            "||example.org^$domain=a.com|~b.a.com,important",
        ] {
            let rule = Rule::Network(NetworkRule::new(text, 42).unwrap());
            assert_eq!(round_trip(&rule), rule);
        }
    }

    #[test]
    fn test_cosmetic_rule_round_trip() {
        let rule =
            Rule::Cosmetic(CosmeticRule::new("example.org,~sub.example.org##banner", 2).unwrap());
        assert_eq!(round_trip(&rule), rule);
    }

    #[test]
    fn test_negative_list_id_round_trips() {
        let rule = Rule::Network(NetworkRule::new("||example.org^", -1).unwrap());
        let decoded = round_trip(&rule);
        assert_eq!(decoded.filter_list_id(), -1);
    }

    #[test]
    fn test_varint_round_trip() {
        for value in [0u32, 1, 127, 128, 300, 16_384, u32::MAX] {
            let mut buf = Vec::new();
            encode_varint(&mut buf, value);
            let mut cursor = buf.as_slice();
            assert_eq!(decode_varint(&mut cursor).unwrap(), value);
            assert!(cursor.is_empty());
        }
    }

    #[test]
    fn test_snapshot_round_trip() {
        let rules = vec![
            Rule::Network(NetworkRule::new("||example.org^$important", 1).unwrap()),
            Rule::Host(HostRule::new("0.0.0.0 example.com", 2).unwrap()),
            Rule::Cosmetic(CosmeticRule::new("##banner", 1).unwrap()),
        ];
        let data = write_snapshot(&rules);
        assert_eq!(read_snapshot(&data).unwrap(), rules);
    }

    #[test]
    fn test_snapshot_bad_magic() {
        let rules = [Rule::Host(HostRule::new("0.0.0.0 example.com", 1).unwrap())];
        let mut data = write_snapshot(&rules);
        data[0] = b'X';
        assert_eq!(read_snapshot(&data), Err(FilterError::InvalidMagic));
    }

    #[test]
    fn test_snapshot_crc_mismatch() {
        let rules = [Rule::Host(HostRule::new("0.0.0.0 example.com", 1).unwrap())];
        let mut data = write_snapshot(&rules);
        let flip = data.len() - 6;
        data[flip] ^= 0xff;
        assert!(matches!(
            read_snapshot(&data),
            Err(FilterError::Crc32Mismatch { .. })
        ));
    }

    #[test]
    fn test_snapshot_truncated() {
        assert_eq!(read_snapshot(b"URF1"), Err(FilterError::Truncated));
        assert_eq!(read_snapshot(b"UR"), Err(FilterError::Truncated));
    }

    #[test]
    fn test_unknown_tag() {
        let mut record = vec![9u8];
        encode_varint(&mut record, 1);
        let mut cursor = record.as_slice();
        assert_eq!(
            deserialize_rule(&mut cursor),
            Err(FilterError::UnknownTag(9))
        );
    }
}
