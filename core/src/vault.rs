//! Session vault (C1): AEAD encryption of opaque session bytes, plus
//! normalization of the two on-disk MTProto session shapes into one
//! canonical string-session form.
//!
//! Grounded on the Fernet-based `SessionEncryption` in
//! `src/utils/crypto.py` for the encrypt/decrypt contract (opaque bytes in,
//! opaque bytes out) — re-expressed here with `aes-gcm`, the AEAD crate
//! already used elsewhere in the pack for at-rest secrets.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use rand::RngCore;

use crate::error::VaultError;

const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";
const NONCE_LEN: usize = 12;
const AUTH_KEY_LEN: usize = 256;

/// A normalized MTProto session: the four fields every string-session needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringSession {
    pub dc_id: u8,
    pub server_address: String,
    pub port: u16,
    pub auth_key: Vec<u8>,
}

impl StringSession {
    /// Canonical textual form: base64 of `dc_id | port(LE,2) | addr_len(1) |
    /// addr | auth_key(256)`. Not wire-compatible with any particular
    /// upstream client — it only needs to round-trip within this crate.
    pub fn encode(&self) -> String {
        let addr = self.server_address.as_bytes();
        let mut buf = Vec::with_capacity(4 + addr.len() + self.auth_key.len());
        buf.push(self.dc_id);
        buf.extend_from_slice(&self.port.to_le_bytes());
        buf.push(addr.len() as u8);
        buf.extend_from_slice(addr);
        buf.extend_from_slice(&self.auth_key);
        base64::engine::general_purpose::STANDARD.encode(buf)
    }

    pub fn decode(s: &str) -> Result<Self, VaultError> {
        let buf = base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(|e| VaultError::Malformed(e.to_string()))?;
        if buf.len() < 4 {
            return Err(VaultError::Truncated);
        }
        let dc_id = buf[0];
        let port = u16::from_le_bytes([buf[1], buf[2]]);
        let addr_len = buf[3] as usize;
        let addr_start = 4;
        let addr_end = addr_start + addr_len;
        if buf.len() < addr_end + AUTH_KEY_LEN {
            return Err(VaultError::Truncated);
        }
        let server_address = String::from_utf8_lossy(&buf[addr_start..addr_end]).into_owned();
        let auth_key = buf[addr_end..addr_end + AUTH_KEY_LEN].to_vec();
        Ok(Self {
            dc_id,
            server_address,
            port,
            auth_key,
        })
    }
}

/// Parses the legacy SQLite-format session (Telethon-style `sessions` table)
/// into a `StringSession`. The vault loads the blob into a scratch in-memory
/// SQLite connection rather than assuming a fixed byte offset, since the
/// page layout SQLite writes is not something we should hand-parse.
pub fn normalize_sqlite_session(bytes: &[u8]) -> Result<StringSession, VaultError> {
    if bytes.len() < 16 || &bytes[0..16] != SQLITE_HEADER {
        return Err(VaultError::Malformed("missing SQLite header".into()));
    }
    let scratch_path =
        std::env::temp_dir().join(format!("fleetcore-session-{}.sqlite", uuid::Uuid::new_v4()));
    std::fs::write(&scratch_path, bytes).map_err(|e| VaultError::Malformed(e.to_string()))?;
    let conn = rusqlite::Connection::open(&scratch_path)
        .map_err(|e| VaultError::Malformed(e.to_string()));
    let _ = std::fs::remove_file(&scratch_path);
    let conn = conn?;
    let mut stmt = conn
        .prepare("SELECT dc_id, server_address, port, auth_key FROM sessions LIMIT 1")
        .map_err(|e| VaultError::Malformed(e.to_string()))?;
    let row = stmt
        .query_row([], |row| {
            let dc_id: i64 = row.get(0)?;
            let server_address: String = row.get(1)?;
            let port: i64 = row.get(2)?;
            let auth_key: Vec<u8> = row.get(3)?;
            Ok((dc_id, server_address, port, auth_key))
        })
        .map_err(|e| VaultError::Malformed(e.to_string()))?;
    if row.3.len() != AUTH_KEY_LEN {
        return Err(VaultError::BadAuthKeyLen(row.3.len()));
    }
    Ok(StringSession {
        dc_id: row.0 as u8,
        server_address: row.1,
        port: row.2 as u16,
        auth_key: row.3,
    })
}

/// Accepts either session shape and always returns the canonical string form.
pub fn normalize_session(bytes: &[u8]) -> Result<StringSession, VaultError> {
    if bytes.len() >= 16 && &bytes[0..16] == SQLITE_HEADER {
        normalize_sqlite_session(bytes)
    } else {
        let text = std::str::from_utf8(bytes).map_err(|e| VaultError::Malformed(e.to_string()))?;
        StringSession::decode(text.trim())
    }
}

/// Symmetric AEAD vault over a fixed 256-bit key. `encrypt`/`decrypt` work on
/// arbitrary opaque bytes — the vault doesn't know or care that callers
/// happen to pass session blobs.
pub struct SessionVault {
    cipher: Aes256Gcm,
}

impl SessionVault {
    pub fn new(key: &[u8; 32]) -> Self {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        Self { cipher }
    }

    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, VaultError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, data)
            .map_err(|e| VaultError::Crypto(e.to_string()))?;
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, VaultError> {
        if data.len() < NONCE_LEN {
            return Err(VaultError::Truncated);
        }
        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| VaultError::Crypto(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_vault() -> SessionVault {
        SessionVault::new(&[7u8; 32])
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let vault = test_vault();
        let data = b"opaque mtproto session bytes";
        let encrypted = vault.encrypt(data).unwrap();
        assert_ne!(encrypted, data);
        let decrypted = vault.decrypt(&encrypted).unwrap();
        assert_eq!(decrypted, data);
    }

    #[test]
    fn string_session_round_trips_through_encode_decode() {
        let session = StringSession {
            dc_id: 2,
            server_address: "149.154.167.51".into(),
            port: 443,
            auth_key: vec![9u8; AUTH_KEY_LEN],
        };
        let encoded = session.encode();
        let decoded = StringSession::decode(&encoded).unwrap();
        assert_eq!(session, decoded);
    }

    #[test]
    fn decrypt_rejects_truncated_input() {
        let vault = test_vault();
        assert!(vault.decrypt(&[1, 2, 3]).is_err());
    }
}
