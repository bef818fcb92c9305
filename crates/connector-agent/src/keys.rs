//! Key material for managed instance registration
//!
//! The companion agent authenticates with an RSA key pair generated at
//! registration time. The public key is sent to the activation service as
//! base64 DER (SubjectPublicKeyInfo); the private key is stored as base64
//! DER (PKCS#1), which is what the agent loads from its vault.

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::EncodePublicKey;
use rsa::RsaPrivateKey;

use connector_common::{Error, Result};

/// Key algorithm tag understood by the activation service and the agent
pub const KEY_TYPE: &str = "Rsa";

/// RSA modulus size in bits
pub const KEY_SIZE: usize = 2048;

/// RSA key pair generated for a single registration.
pub struct KeyPair {
    private_key: RsaPrivateKey,
}

impl KeyPair {
    /// Generate a fresh 2048-bit key pair from the OS CSPRNG.
    ///
    /// This is CPU heavy; call it from a blocking context.
    pub fn generate() -> Result<Self> {
        let private_key = RsaPrivateKey::new(&mut OsRng, KEY_SIZE)
            .map_err(|e| Error::key_material(format!("failed to generate RSA key: {}", e)))?;
        Ok(Self { private_key })
    }

    /// Public key as base64 DER SubjectPublicKeyInfo
    pub fn encode_public_key(&self) -> Result<String> {
        let der = self
            .private_key
            .to_public_key()
            .to_public_key_der()
            .map_err(|e| Error::key_material(format!("failed to encode public key: {}", e)))?;
        Ok(STANDARD.encode(der.as_bytes()))
    }

    /// Private key as base64 DER PKCS#1
    pub fn encode_private_key(&self) -> Result<String> {
        let der = self
            .private_key
            .to_pkcs1_der()
            .map_err(|e| Error::key_material(format!("failed to encode private key: {}", e)))?;
        Ok(STANDARD.encode(der.as_bytes()))
    }
}

/// Generate a random (version 4) UUID fingerprint.
pub fn generate_fingerprint() -> Result<String> {
    let mut bytes = [0u8; 16];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| Error::key_material(format!("failed to read random bytes: {}", e)))?;
    Ok(uuid::Builder::from_random_bytes(bytes)
        .into_uuid()
        .to_string())
}
