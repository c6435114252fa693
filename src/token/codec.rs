//! Token wire codec.
//!
//! Plaintext layout (TAB separated, fixed order):
//!
//! ```text
//! nonce \t scope \t expiration \t hex(HMAC-SHA256(nonce \t scope \t expiration))
//! ```
//!
//! Wire form: `hex(iv) + "," + base64(AES-256-CBC(key, iv, plaintext))`,
//! with a fresh random 16-byte IV per call.

use aes::Aes256;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::{CipherKey, KeyLoader, TokenError, TokenPayload, FIELD_DELIMITER};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type HmacSha256 = Hmac<Sha256>;

const IV_LEN: usize = 16;

/// Separator between the hex IV and the base64 ciphertext.
const WIRE_SEPARATOR: char = ',';

pub struct TokenCodec {
    keys: KeyLoader,
}

impl TokenCodec {
    pub fn new(keys: KeyLoader) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &KeyLoader {
        &self.keys
    }

    /// Fixed-order serialization of the payload fields, without the tag.
    pub fn serialize(nonce: &str, scope: &str, expiration: i64) -> Result<String, TokenError> {
        for (name, value) in [("nonce", nonce), ("scope", scope)] {
            if value.contains(FIELD_DELIMITER) {
                return Err(TokenError::Format(format!(
                    "{} must not contain a tab character",
                    name
                )));
            }
        }
        Ok(format!(
            "{nonce}{d}{scope}{d}{expiration}",
            d = FIELD_DELIMITER
        ))
    }

    /// Lowercase hex HMAC-SHA256 over the exact serialized bytes.
    pub fn compute_tag(&self, serialized: &str) -> Result<String, TokenError> {
        let key = self.keys.get()?;
        tag_bytes(key, serialized.as_bytes()).map(hex::encode)
    }

    pub fn encode(&self, nonce: &str, scope: &str, expiration: i64) -> Result<String, TokenError> {
        let serialized = Self::serialize(nonce, scope, expiration)?;
        self.seal(&serialized)
    }

    /// Append the tag to `serialized` and encrypt under a fresh IV.
    fn seal(&self, serialized: &str) -> Result<String, TokenError> {
        let key = self.keys.get()?;
        let tag = hex::encode(tag_bytes(key, serialized.as_bytes())?);
        let plaintext = format!("{}{}{}", serialized, FIELD_DELIMITER, tag);

        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new_from_slices(key.enc_key(), &iv)
            .map_err(|e| TokenError::Key(format!("invalid key length: {:?}", e)))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        Ok(format!(
            "{}{}{}",
            hex::encode(iv),
            WIRE_SEPARATOR,
            STANDARD.encode(ciphertext)
        ))
    }

    pub fn decode(&self, encoded: &str) -> Result<TokenPayload, TokenError> {
        let mut parts = encoded.split(WIRE_SEPARATOR);
        let (iv_hex, ciphertext_b64) = match (parts.next(), parts.next(), parts.next()) {
            (Some(iv), Some(ct), None) => (iv, ct),
            _ => {
                return Err(TokenError::Format(
                    "expected <iv>,<ciphertext>".to_string(),
                ))
            }
        };

        let key = self.keys.get()?;
        let plaintext = decrypt(key, iv_hex, ciphertext_b64)?;

        // Authenticate before looking at any field.
        let split = plaintext
            .iter()
            .rposition(|b| *b == FIELD_DELIMITER as u8)
            .ok_or(TokenError::Integrity)?;
        let (body, provided_tag) = (&plaintext[..split], &plaintext[split + 1..]);
        let expected_tag = hex::encode(tag_bytes(key, body)?);
        if provided_tag.ct_eq(expected_tag.as_bytes()).unwrap_u8() != 1 {
            return Err(TokenError::Integrity);
        }

        let body = std::str::from_utf8(body)
            .map_err(|_| TokenError::Format("payload is not valid UTF-8".to_string()))?;
        let fields: Vec<&str> = body.split(FIELD_DELIMITER).collect();
        if fields.len() != 3 {
            return Err(TokenError::Format(format!(
                "expected 4 fields, found {}",
                fields.len() + 1
            )));
        }

        let expiration = fields[2]
            .parse::<i64>()
            .map_err(|_| TokenError::Format("expiration is not numeric".to_string()))?;

        Ok(TokenPayload {
            nonce: fields[0].to_string(),
            scope: fields[1].to_string(),
            expiration,
        })
    }
}

fn tag_bytes(key: &CipherKey, data: &[u8]) -> Result<Vec<u8>, TokenError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key.mac_key())
        .map_err(|e| TokenError::Key(format!("invalid mac key length: {:?}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Any failure here, including undecodable IV or ciphertext text, is a
/// decryption failure. The IV must be in the lowercase form `seal` writes.
fn decrypt(key: &CipherKey, iv_hex: &str, ciphertext_b64: &str) -> Result<Vec<u8>, TokenError> {
    let iv = hex::decode(iv_hex).map_err(|_| TokenError::Decrypt)?;
    if iv.len() != IV_LEN || hex::encode(&iv) != iv_hex {
        return Err(TokenError::Decrypt);
    }
    let ciphertext = STANDARD
        .decode(ciphertext_b64)
        .map_err(|_| TokenError::Decrypt)?;

    Aes256CbcDec::new_from_slices(key.enc_key(), &iv)
        .map_err(|_| TokenError::Decrypt)?
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| TokenError::Decrypt)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=";

    fn codec() -> TokenCodec {
        TokenCodec::new(KeyLoader::new(KEY))
    }

    fn split_wire(encoded: &str) -> (Vec<u8>, Vec<u8>) {
        let (iv, ct) = encoded.split_once(',').unwrap();
        (hex::decode(iv).unwrap(), STANDARD.decode(ct).unwrap())
    }

    fn join_wire(iv: &[u8], ct: &[u8]) -> String {
        format!("{},{}", hex::encode(iv), STANDARD.encode(ct))
    }

    #[test]
    fn test_serialize_field_order() {
        let s = TokenCodec::serialize("n0n0n0n0", "image quote", 1_700_000_000_000).unwrap();
        assert_eq!(s, "n0n0n0n0\timage quote\t1700000000000");
    }

    #[test]
    fn test_serialize_rejects_delimiter_in_field() {
        assert!(matches!(
            TokenCodec::serialize("abc\tdefg", "", 1),
            Err(TokenError::Format(_))
        ));
        assert!(matches!(
            codec().encode("abcdefgh", "quote\timage", 1),
            Err(TokenError::Format(_))
        ));
    }

    #[test]
    fn test_roundtrip() {
        let codec = codec();
        for (nonce, scope, exp) in [
            ("abcdefgh", "quote", 1_700_000_600_000i64),
            ("0123~\u{7f}zz", "", 0),
            ("ZZZZZZZZ", "image quote", -5),
        ] {
            let encoded = codec.encode(nonce, scope, exp).unwrap();
            let payload = codec.decode(&encoded).unwrap();
            assert_eq!(payload.nonce, nonce);
            assert_eq!(payload.scope, scope);
            assert_eq!(payload.expiration, exp);
        }
    }

    #[test]
    fn test_fresh_iv_per_encode() {
        let codec = codec();
        let a = codec.encode("abcdefgh", "quote", 42).unwrap();
        let b = codec.encode("abcdefgh", "quote", 42).unwrap();
        assert_ne!(a, b);
        assert_ne!(a.split(',').next(), b.split(',').next());
        assert_eq!(a.split(',').next().unwrap().len(), 32);
    }

    #[test]
    fn test_tag_is_deterministic_keyed_hex() {
        let codec = codec();
        let t1 = codec.compute_tag("abcdefgh\tquote\t42").unwrap();
        let t2 = codec.compute_tag("abcdefgh\tquote\t42").unwrap();
        assert_eq!(t1, t2);
        assert_eq!(t1.len(), 64);
        assert!(t1.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

        let other = TokenCodec::new(KeyLoader::from_key(CipherKey::generate().unwrap()));
        assert_ne!(other.compute_tag("abcdefgh\tquote\t42").unwrap(), t1);
    }

    #[test]
    fn test_tampered_iv_or_ciphertext_never_decodes() {
        let codec = codec();
        let encoded = codec.encode("abcdefgh", "image quote", 1_700_000_600_000).unwrap();
        let (iv, ct) = split_wire(&encoded);

        for i in 0..iv.len() {
            let mut bad = iv.clone();
            bad[i] ^= 0x01;
            let err = codec.decode(&join_wire(&bad, &ct)).unwrap_err();
            assert!(
                matches!(err, TokenError::Decrypt | TokenError::Integrity),
                "iv byte {} gave {:?}",
                i,
                err
            );
        }
        for i in 0..ct.len() {
            let mut bad = ct.clone();
            bad[i] ^= 0x80;
            let err = codec.decode(&join_wire(&iv, &bad)).unwrap_err();
            assert!(
                matches!(err, TokenError::Decrypt | TokenError::Integrity),
                "ciphertext byte {} gave {:?}",
                i,
                err
            );
        }
    }

    #[test]
    fn test_single_character_edits_of_wire_text_never_decode() {
        let codec = codec();
        let encoded = codec.encode("abcdefgh", "quote", 1_700_000_600_000).unwrap();
        let separator = encoded.find(',').unwrap();

        for pos in (0..encoded.len()).filter(|p| *p != separator) {
            for mask in [0x01u8, 0x20] {
                let mut bytes = encoded.clone().into_bytes();
                bytes[pos] ^= mask;
                let edited = String::from_utf8(bytes).unwrap();
                let err = codec.decode(&edited).unwrap_err();
                assert!(
                    matches!(err, TokenError::Decrypt | TokenError::Integrity),
                    "{:?} at {} gave {:?}",
                    edited,
                    pos,
                    err
                );
            }
        }
    }

    #[test]
    fn test_uppercase_iv_hex_rejected() {
        let codec = codec();
        let encoded = codec.encode("abcdefgh", "quote", 1).unwrap();
        let (iv, ct) = encoded.split_once(',').unwrap();
        let upper = format!("{},{}", iv.to_uppercase(), ct);
        if upper != encoded {
            assert!(matches!(codec.decode(&upper), Err(TokenError::Decrypt)));
        }
    }

    #[test]
    fn test_wrong_key_rejected() {
        let encoded = codec().encode("abcdefgh", "quote", 1).unwrap();
        let other = TokenCodec::new(KeyLoader::from_key(CipherKey::generate().unwrap()));
        assert!(matches!(
            other.decode(&encoded),
            Err(TokenError::Decrypt | TokenError::Integrity)
        ));
    }

    #[test]
    fn test_wire_shape_errors() {
        let codec = codec();
        assert!(matches!(
            codec.decode("not-a-valid-token-string"),
            Err(TokenError::Format(_))
        ));
        assert!(matches!(codec.decode("a,b,c"), Err(TokenError::Format(_))));
        assert!(matches!(codec.decode("zz,AAAA"), Err(TokenError::Decrypt)));
        assert!(matches!(
            codec.decode("00112233,AAAAAAAAAAAAAAAAAAAAAA=="),
            Err(TokenError::Decrypt)
        ));
        assert!(matches!(
            codec.decode("00112233445566778899aabbccddeeff,%%%"),
            Err(TokenError::Decrypt)
        ));
    }

    #[test]
    fn test_malformed_wire_skips_key_import() {
        let codec = TokenCodec::new(KeyLoader::new(KEY));
        let _ = codec.decode("no-separator-here");
        assert!(!codec.keys().is_loaded());
    }

    #[test]
    fn test_authentic_payload_with_wrong_field_count() {
        let codec = codec();
        let sealed = codec.seal("abcdefgh\tquote").unwrap();
        assert!(matches!(codec.decode(&sealed), Err(TokenError::Format(_))));

        let sealed = codec.seal("abcdefgh\tquote\t1\textra").unwrap();
        assert!(matches!(codec.decode(&sealed), Err(TokenError::Format(_))));
    }

    #[test]
    fn test_non_numeric_expiration() {
        let codec = codec();
        let sealed = codec.seal("abcdefgh\tquote\tsoon").unwrap();
        match codec.decode(&sealed) {
            Err(TokenError::Format(msg)) => assert!(msg.contains("numeric")),
            other => panic!("expected format error, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_key_material_surfaces_as_key_error() {
        let codec = TokenCodec::new(KeyLoader::new("c2hvcnQ="));
        assert!(matches!(
            codec.encode("abcdefgh", "quote", 1),
            Err(TokenError::Key(_))
        ));
    }
}
