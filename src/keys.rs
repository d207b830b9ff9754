//! Per-sector key derivation from the tag UID (HKDF-SHA256 extract + per-sector HMAC).
//!
//! `PRK = HMAC-SHA256(MASTER_SECRET, uid)`, then for sector `i`:
//! `key[i] = HMAC-SHA256(PRK, CONTEXT || (i + 1))[..6]`.
//!
//! Derivation is deterministic; cached key sets depend on the exact byte layout.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::KeyDerivationError;
use crate::types::{DerivedKeySet, SectorKey, TagUid, SECTOR_COUNT, SECTOR_KEY_LENGTH};

type HmacSha256 = Hmac<Sha256>;

/// Fixed 16-byte extract salt. Build-time constant, not runtime secret material.
pub const MASTER_SECRET: [u8; 16] = [
    0x9a, 0x75, 0x9c, 0xf2, 0xc4, 0xf7, 0xca, 0xff, 0x22, 0x2c, 0xb9, 0x76, 0x9b, 0x41, 0xbc, 0x96,
];

/// Expand context, null-terminated.
pub const CONTEXT: &[u8; 7] = b"RFID-A\0";

pub const MIN_UID_LENGTH: usize = 4;
pub const MAX_UID_LENGTH: usize = 10;

/// Derive the 16 sector keys for `uid`.
///
/// # Errors
/// Returns `InvalidUidLength` unless the UID is 4-10 bytes.
pub fn derive_keys(uid: &TagUid) -> Result<DerivedKeySet, KeyDerivationError> {
    derive_keys_from_bytes(uid.as_bytes())
}

pub fn derive_keys_from_bytes(uid: &[u8]) -> Result<DerivedKeySet, KeyDerivationError> {
    if !(MIN_UID_LENGTH..=MAX_UID_LENGTH).contains(&uid.len()) {
        return Err(KeyDerivationError::InvalidUidLength { len: uid.len() });
    }

    let (prk, _) = Hkdf::<Sha256>::extract(Some(&MASTER_SECRET[..]), uid);
    let mut prk_bytes = [0u8; 32];
    prk_bytes.copy_from_slice(&prk);

    let mut keys = [SectorKey([0u8; SECTOR_KEY_LENGTH]); SECTOR_COUNT];
    for (i, slot) in keys.iter_mut().enumerate() {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&prk_bytes)
            .expect("HMAC accepts keys of any length");
        mac.update(CONTEXT);
        mac.update(&[(i + 1) as u8]);
        let mut t = mac.finalize().into_bytes();
        slot.0.copy_from_slice(&t[..SECTOR_KEY_LENGTH]);
        t.as_mut_slice().zeroize();
    }
    prk_bytes.zeroize();

    Ok(DerivedKeySet::new(keys))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn uid(bytes: &[u8]) -> TagUid {
        TagUid::new(bytes.to_vec())
    }

    #[test]
    fn deterministic() {
        let u = uid(&[0x04, 0x5a, 0x12, 0x9f]);
        let a = derive_keys(&u).unwrap();
        let b = derive_keys(&u).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.keys().iter().all(|k| k.as_bytes().len() == 6));
    }

    #[test]
    fn rejects_short_and_long_uids() {
        assert_eq!(
            derive_keys_from_bytes(&[1, 2, 3]),
            Err(KeyDerivationError::InvalidUidLength { len: 3 })
        );
        assert_eq!(
            derive_keys_from_bytes(&[0u8; 11]),
            Err(KeyDerivationError::InvalidUidLength { len: 11 })
        );
        assert!(derive_keys_from_bytes(&[]).is_err());
    }

    #[test]
    fn accepts_boundary_lengths() {
        assert!(derive_keys_from_bytes(&[0xAA; 4]).is_ok());
        assert!(derive_keys_from_bytes(&[0xAA; 7]).is_ok());
        assert!(derive_keys_from_bytes(&[0xAA; 10]).is_ok());
    }

    #[test]
    fn sector_keys_differ_within_a_set() {
        let keys = derive_keys(&uid(&[0xde, 0xad, 0xbe, 0xef])).unwrap();
        let distinct: HashSet<_> = keys.keys().iter().map(|k| k.0).collect();
        assert_eq!(distinct.len(), 16);
    }

    #[test]
    fn distinct_uids_yield_distinct_key_sets() {
        let mut seen = HashSet::new();
        for a in 0u8..=255 {
            for b in [0x00u8, 0x7f, 0xff] {
                let keys = derive_keys_from_bytes(&[0x04, a, b, 0x80]).unwrap();
                assert!(seen.insert(keys.to_hex_vec()), "collision for {a:02x}{b:02x}");
            }
        }
    }

    #[test]
    fn first_key_matches_standard_hkdf_expand() {
        let u = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77];
        let hk = Hkdf::<Sha256>::new(Some(&MASTER_SECRET[..]), &u);
        let mut okm = [0u8; 6];
        hk.expand(CONTEXT, &mut okm).unwrap();
        let keys = derive_keys_from_bytes(&u).unwrap();
        assert_eq!(keys.key(0).unwrap().0, okm);
    }

    #[test]
    fn sector_key_matches_manual_hmac() {
        let u = [0x04, 0x01, 0x02, 0x03];
        let mut extract = <HmacSha256 as Mac>::new_from_slice(&MASTER_SECRET).unwrap();
        extract.update(&u);
        let prk = extract.finalize().into_bytes();

        let mut expand = <HmacSha256 as Mac>::new_from_slice(&prk).unwrap();
        expand.update(b"RFID-A\0");
        expand.update(&[6u8]);
        let t = expand.finalize().into_bytes();

        let keys = derive_keys_from_bytes(&u).unwrap();
        assert_eq!(&keys.key(5).unwrap().0[..], &t[..6]);
    }
}
