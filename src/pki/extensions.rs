//! DER encoding of the X.509 v3 extensions we put on certificates.
//!
//! rcgen writes its built-in extensions in a fixed internal order (SAN before
//! key usage, basic constraints last). The webhook certificates need
//! basicConstraints first, so every extension is emitted as a
//! [`CustomExtension`] in the order the caller pushes them, and rcgen's own
//! extension fields are left empty.

use rcgen::CustomExtension;
use yasna::models::ObjectIdentifier;
use yasna::Tag;

pub const OID_SUBJECT_KEY_IDENTIFIER: &[u64] = &[2, 5, 29, 14];
pub const OID_KEY_USAGE: &[u64] = &[2, 5, 29, 15];
pub const OID_SUBJECT_ALT_NAME: &[u64] = &[2, 5, 29, 17];
pub const OID_BASIC_CONSTRAINTS: &[u64] = &[2, 5, 29, 19];
pub const OID_AUTHORITY_KEY_IDENTIFIER: &[u64] = &[2, 5, 29, 35];
pub const OID_EXTENDED_KEY_USAGE: &[u64] = &[2, 5, 29, 37];
pub const OID_KP_SERVER_AUTH: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 3, 1];

/// Bits of the KeyUsage BIT STRING (RFC 5280 4.2.1.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUsage {
    DigitalSignature = 0,
    KeyEncipherment = 2,
    KeyCertSign = 5,
    CrlSign = 6,
}

/// `basicConstraints`, critical. `cA=FALSE` is the DER default and is
/// therefore encoded as an empty SEQUENCE.
pub fn basic_constraints(is_ca: bool) -> CustomExtension {
    let content = yasna::construct_der(|writer| {
        writer.write_sequence(|writer| {
            if is_ca {
                writer.next().write_bool(true);
            }
        })
    });
    critical(OID_BASIC_CONSTRAINTS, content)
}

/// `subjectKeyIdentifier`
pub fn subject_key_identifier(key_id: &[u8]) -> CustomExtension {
    let content = yasna::construct_der(|writer| writer.write_bytes(key_id));
    non_critical(OID_SUBJECT_KEY_IDENTIFIER, content)
}

/// `authorityKeyIdentifier` carrying only the `keyIdentifier` field
pub fn authority_key_identifier(key_id: &[u8]) -> CustomExtension {
    let content = yasna::construct_der(|writer| {
        writer.write_sequence(|writer| {
            writer
                .next()
                .write_tagged_implicit(Tag::context(0), |writer| writer.write_bytes(key_id));
        })
    });
    non_critical(OID_AUTHORITY_KEY_IDENTIFIER, content)
}

/// `keyUsage`, critical
pub fn key_usage(usages: &[KeyUsage]) -> CustomExtension {
    let (bytes, bit_len) = key_usage_bits(usages);
    let content = yasna::construct_der(|writer| writer.write_bitvec_bytes(&bytes, bit_len));
    critical(OID_KEY_USAGE, content)
}

/// `extendedKeyUsage` with only `id-kp-serverAuth`
pub fn server_auth_extended_key_usage() -> CustomExtension {
    let content = yasna::construct_der(|writer| {
        writer.write_sequence(|writer| {
            writer
                .next()
                .write_oid(&ObjectIdentifier::from_slice(OID_KP_SERVER_AUTH));
        })
    });
    non_critical(OID_EXTENDED_KEY_USAGE, content)
}

/// `subjectAltName` with a single `dNSName`
pub fn dns_subject_alt_name(dns_name: &str) -> CustomExtension {
    let content = yasna::construct_der(|writer| {
        writer.write_sequence(|writer| {
            writer
                .next()
                .write_tagged_implicit(Tag::context(2), |writer| writer.write_ia5_string(dns_name));
        })
    });
    non_critical(OID_SUBJECT_ALT_NAME, content)
}

/// Named bit list in DER form: trailing zero bits dropped.
fn key_usage_bits(usages: &[KeyUsage]) -> (Vec<u8>, usize) {
    let bit_len = usages.iter().map(|u| *u as usize + 1).max().unwrap_or(0);
    let mut bytes = vec![0u8; bit_len.div_ceil(8)];
    for usage in usages {
        let bit = *usage as usize;
        bytes[bit / 8] |= 0x80 >> (bit % 8);
    }
    (bytes, bit_len)
}

fn critical(oid: &[u64], content: Vec<u8>) -> CustomExtension {
    let mut ext = CustomExtension::from_oid_content(oid, content);
    ext.set_criticality(true);
    ext
}

fn non_critical(oid: &[u64], content: Vec<u8>) -> CustomExtension {
    let mut ext = CustomExtension::from_oid_content(oid, content);
    ext.set_criticality(false);
    ext
}
