use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use once_cell::sync::OnceCell;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::TokenError;

/// Label for deriving the MAC key from the cipher key.
const MAC_KEY_LABEL: &[u8] = b"tokengate/v1/payload-mac";

/// Imported symmetric key: the AES-256 key plus a MAC key derived from it.
/// Both are wiped on drop.
pub struct CipherKey {
    enc: Zeroizing<[u8; 32]>,
    mac: Zeroizing<[u8; 32]>,
}

impl CipherKey {
    /// Import base64 key material. Must decode to exactly 32 bytes.
    pub fn from_base64(material: &str) -> Result<Self, TokenError> {
        let bytes = Zeroizing::new(
            STANDARD
                .decode(material.trim())
                .map_err(|e| TokenError::Key(format!("key material is not valid base64: {}", e)))?,
        );
        if bytes.len() != 32 {
            return Err(TokenError::Key(format!(
                "key material must decode to 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut enc = Zeroizing::new([0u8; 32]);
        enc.copy_from_slice(&bytes);
        Self::from_bytes(enc)
    }

    /// Fresh random key from the OS RNG.
    pub fn generate() -> Result<Self, TokenError> {
        let mut enc = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut enc[..]);
        Self::from_bytes(enc)
    }

    fn from_bytes(enc: Zeroizing<[u8; 32]>) -> Result<Self, TokenError> {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(&enc[..])
            .map_err(|e| TokenError::Key(format!("invalid key length: {:?}", e)))?;
        mac.update(MAC_KEY_LABEL);
        let mut mac_key = Zeroizing::new([0u8; 32]);
        mac_key.copy_from_slice(&mac.finalize().into_bytes());
        Ok(Self { enc, mac: mac_key })
    }

    /// Base64 export of the AES key, in the format `from_base64` accepts.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.enc[..])
    }

    pub(crate) fn enc_key(&self) -> &[u8; 32] {
        &self.enc
    }

    pub(crate) fn mac_key(&self) -> &[u8; 32] {
        &self.mac
    }
}

impl std::fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CipherKey(****)")
    }
}

/// Holds configured key material and imports it on first use.
///
/// The imported key is cached for the life of the process and is read-only
/// afterwards, so concurrent readers need no further synchronisation.
pub struct KeyLoader {
    material: Zeroizing<String>,
    key: OnceCell<CipherKey>,
}

impl KeyLoader {
    pub fn new(material: impl Into<String>) -> Self {
        Self {
            material: Zeroizing::new(material.into()),
            key: OnceCell::new(),
        }
    }

    /// Loader that is already initialised with `key`.
    pub fn from_key(key: CipherKey) -> Self {
        Self {
            material: Zeroizing::new(key.to_base64()),
            key: OnceCell::with_value(key),
        }
    }

    pub fn get(&self) -> Result<&CipherKey, TokenError> {
        self.key.get_or_try_init(|| {
            tracing::debug!("importing cipher key");
            CipherKey::from_base64(&self.material)
        })
    }

    pub fn is_loaded(&self) -> bool {
        self.key.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=";

    #[test]
    fn test_key_import_roundtrip() {
        let key = CipherKey::from_base64(KEY).unwrap();
        assert_eq!(key.to_base64(), KEY);
        assert_eq!(key.enc_key()[31], 31);
        assert_ne!(key.enc_key(), key.mac_key());
    }

    #[test]
    fn test_key_rejects_wrong_length() {
        let short = STANDARD.encode([0u8; 16]);
        let err = CipherKey::from_base64(&short).unwrap_err();
        assert!(matches!(err, TokenError::Key(_)));
        assert!(err.to_string().contains("32 bytes"));
    }

    #[test]
    fn test_key_rejects_garbage() {
        assert!(matches!(
            CipherKey::from_base64("not base64 !!"),
            Err(TokenError::Key(_))
        ));
    }

    #[test]
    fn test_loader_is_lazy_and_cached() {
        let loader = KeyLoader::new(KEY);
        assert!(!loader.is_loaded());
        let first = loader.get().unwrap() as *const CipherKey;
        assert!(loader.is_loaded());
        let second = loader.get().unwrap() as *const CipherKey;
        assert_eq!(first, second);
    }

    #[test]
    fn test_loader_reports_bad_material_on_use() {
        let loader = KeyLoader::new("AAAA");
        assert!(matches!(loader.get(), Err(TokenError::Key(_))));
        assert!(!loader.is_loaded());
    }

    #[test]
    fn test_debug_does_not_leak() {
        let key = CipherKey::generate().unwrap();
        assert_eq!(format!("{:?}", key), "CipherKey(****)");
    }
}
