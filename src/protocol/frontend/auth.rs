//! Authentication messages.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::protocol::codec::MessageBuilder;

/// Write a PasswordMessage (cleartext or MD5 hashed password).
pub fn write_password(buf: &mut Vec<u8>, password: &str) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::PASSWORD);
    msg.write_cstr(password);
    msg.finish();
}

/// Compute MD5 password hash.
///
/// PostgreSQL MD5 password format: "md5" + md5(md5(password + username) + salt)
pub fn md5_password(username: &str, password: &str, salt: &[u8; 4]) -> String {
    use md5::Md5;

    let mut hasher = Md5::new();
    hasher.update(password.as_bytes());
    hasher.update(username.as_bytes());
    let first_hash_hex = format!("{:x}", hasher.finalize());

    let mut hasher = Md5::new();
    hasher.update(first_hash_hex.as_bytes());
    hasher.update(salt);

    format!("md5{:x}", hasher.finalize())
}

/// Write a SASLInitialResponse message.
///
/// mechanism: SASL mechanism name (e.g., "SCRAM-SHA-256")
/// initial_response: Client-first-message for SCRAM
pub fn write_sasl_initial_response(buf: &mut Vec<u8>, mechanism: &str, initial_response: &[u8]) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::PASSWORD);
    msg.write_cstr(mechanism);
    msg.write_i32(initial_response.len() as i32);
    msg.write_bytes(initial_response);
    msg.finish();
}

/// Write a SASLResponse message.
pub fn write_sasl_response(buf: &mut Vec<u8>, response: &[u8]) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::PASSWORD);
    msg.write_bytes(response);
    msg.finish();
}

/// SCRAM-SHA-256 mechanism name.
pub const SCRAM_SHA_256: &str = "SCRAM-SHA-256";

/// GS2 header without channel binding.
const GS2_HEADER: &str = "n,,";

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<[u8; 32]> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key)
        .map_err(|e| Error::Auth(format!("HMAC error: {}", e)))?;
    mac.update(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// SCRAM-SHA-256 client implementation (no channel binding).
pub struct ScramClient {
    nonce: String,
    password: String,
    /// Auth message for signature verification
    auth_message: Option<String>,
    /// Salted password for server signature verification
    salted_password: Option<[u8; 32]>,
}

impl ScramClient {
    /// Create a new SCRAM client with a random 24-byte nonce.
    pub fn new(password: &str) -> Self {
        use rand::Rng;

        let mut nonce_bytes = [0u8; 24];
        rand::rng().fill(&mut nonce_bytes);
        Self::with_nonce(password, STANDARD.encode(nonce_bytes))
    }

    /// Create a SCRAM client with a caller-chosen nonce.
    pub fn with_nonce(password: &str, nonce: String) -> Self {
        Self {
            nonce,
            password: password.to_string(),
            auth_message: None,
            salted_password: None,
        }
    }

    /// Generate the client-first-message.
    ///
    /// The username is empty because PostgreSQL takes it from the startup packet.
    pub fn client_first_message(&self) -> String {
        format!("{}{}", GS2_HEADER, self.client_first_message_bare())
    }

    fn client_first_message_bare(&self) -> String {
        format!("n=,r={}", self.nonce)
    }

    /// Process server-first-message and generate client-final-message.
    pub fn process_server_first(&mut self, server_first: &str) -> Result<String> {
        let mut combined_nonce = None;
        let mut salt_b64 = None;
        let mut iterations = None;

        for part in server_first.split(',') {
            if let Some(value) = part.strip_prefix("r=") {
                combined_nonce = Some(value);
            } else if let Some(value) = part.strip_prefix("s=") {
                salt_b64 = Some(value);
            } else if let Some(value) = part.strip_prefix("i=") {
                iterations = value.parse::<u32>().ok();
            }
        }

        let missing = |what: &str| Error::Auth(format!("Missing {} in server-first-message", what));
        let combined_nonce = combined_nonce.ok_or_else(|| missing("nonce"))?;
        let salt_b64 = salt_b64.ok_or_else(|| missing("salt"))?;
        let iterations = iterations.ok_or_else(|| missing("iterations"))?;

        if !combined_nonce.starts_with(&self.nonce) {
            return Err(Error::Auth(
                "Server nonce doesn't start with client nonce".into(),
            ));
        }

        let salt = STANDARD
            .decode(salt_b64)
            .map_err(|e| Error::Auth(format!("Invalid salt: {}", e)))?;

        // SaltedPassword = Hi(password, salt, iterations)
        let mut salted_password = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(
            self.password.as_bytes(),
            &salt,
            iterations,
            &mut salted_password,
        );

        let client_key = hmac_sha256(&salted_password, b"Client Key")?;
        let stored_key = Sha256::digest(client_key);

        let client_final_without_proof =
            format!("c={},r={}", STANDARD.encode(GS2_HEADER), combined_nonce);

        let auth_message = format!(
            "{},{},{}",
            self.client_first_message_bare(),
            server_first,
            client_final_without_proof
        );

        let client_signature = hmac_sha256(&stored_key, auth_message.as_bytes())?;

        // ClientProof = ClientKey XOR ClientSignature
        let mut client_proof = [0u8; 32];
        for (proof, (key, sig)) in client_proof
            .iter_mut()
            .zip(client_key.iter().zip(client_signature.iter()))
        {
            *proof = key ^ sig;
        }

        self.salted_password = Some(salted_password);
        self.auth_message = Some(auth_message);

        Ok(format!(
            "{},p={}",
            client_final_without_proof,
            STANDARD.encode(client_proof)
        ))
    }

    /// Verify server-final-message.
    pub fn verify_server_final(&self, server_final: &str) -> Result<()> {
        if let Some(err) = server_final.strip_prefix("e=") {
            return Err(Error::Auth(format!("SCRAM server error: {}", err)));
        }

        let server_signature_b64 = server_final
            .strip_prefix("v=")
            .ok_or_else(|| Error::Auth("Invalid server-final-message format".into()))?;

        let server_signature = STANDARD
            .decode(server_signature_b64)
            .map_err(|e| Error::Auth(format!("Invalid server signature: {}", e)))?;

        let (Some(salted_password), Some(auth_message)) =
            (&self.salted_password, &self.auth_message)
        else {
            return Err(Error::Auth(
                "server-final-message before server-first-message".into(),
            ));
        };

        let server_key = hmac_sha256(salted_password, b"Server Key")?;
        let expected_signature = hmac_sha256(&server_key, auth_message.as_bytes())?;

        if server_signature.as_slice() != expected_signature.as_slice() {
            return Err(Error::Auth("Server signature verification failed".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_password() {
        let result = md5_password("alice", "secret", &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(result, "md598a0412b9c31436fc53776e863350083");
        assert_ne!(result, md5_password("alice", "secret", &[4, 3, 2, 1]));
    }

    #[test]
    fn test_password_message() {
        let mut buf = Vec::new();
        write_password(&mut buf, "secret");

        assert_eq!(buf[0], b'p');
        assert_eq!(&buf[5..], b"secret\0");
    }

    fn server_signature(password: &str, salt: &[u8], iterations: u32, auth_message: &str) -> String {
        let mut salted = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut salted);
        let server_key = hmac_sha256(&salted, b"Server Key").unwrap();
        STANDARD.encode(hmac_sha256(&server_key, auth_message.as_bytes()).unwrap())
    }

    #[test]
    fn scram_exchange() {
        let mut client = ScramClient::with_nonce("pencil", "rOprNGfwEbeRWgbNEkqO".into());
        assert_eq!(client.client_first_message(), "n,,n=,r=rOprNGfwEbeRWgbNEkqO");

        let salt = b"0123456789abcdef";
        let server_first = format!(
            "r=rOprNGfwEbeRWgbNEkqOsrv,s={},i=16",
            STANDARD.encode(salt)
        );
        let client_final = client.process_server_first(&server_first).unwrap();
        assert!(client_final.starts_with("c=biws,r=rOprNGfwEbeRWgbNEkqOsrv,p="));

        let without_proof = "c=biws,r=rOprNGfwEbeRWgbNEkqOsrv";
        let auth_message = format!("n=,r=rOprNGfwEbeRWgbNEkqO,{},{}", server_first, without_proof);
        let signature = server_signature("pencil", salt, 16, &auth_message);

        client
            .verify_server_final(&format!("v={}", signature))
            .unwrap();
        assert!(client.verify_server_final("v=AAAA").is_err());
    }

    #[test]
    fn scram_rejects_foreign_nonce() {
        let mut client = ScramClient::with_nonce("pencil", "abc".into());
        let err = client
            .process_server_first("r=xyz,s=c2FsdA==,i=4096")
            .unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }
}
