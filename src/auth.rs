//! Pluggable authentication.

use crate::error::{Error, Result};
use crate::protocol::backend::AuthenticationMessage;
use crate::protocol::frontend::FrontendMessage;
use crate::protocol::frontend::auth::{SCRAM_SHA_256, ScramClient, md5_password};

/// Answers authentication challenges during startup.
///
/// `respond` is called for every Authentication message except
/// AuthenticationOk. Returning `Ok(None)` sends nothing and waits for the next
/// server message; returning an error aborts the handshake.
pub trait AuthenticationHandler: Send {
    fn respond(&mut self, challenge: &AuthenticationMessage) -> Result<Option<FrontendMessage>>;
}

/// Password-based authentication: cleartext, MD5 and SCRAM-SHA-256.
pub struct PasswordAuthenticator {
    user: String,
    password: Option<String>,
    scram: Option<ScramClient>,
}

impl PasswordAuthenticator {
    pub fn new(user: impl Into<String>, password: Option<String>) -> Self {
        Self {
            user: user.into(),
            password,
            scram: None,
        }
    }

    fn password(&self) -> Result<&str> {
        self.password
            .as_deref()
            .ok_or_else(|| Error::Auth("Password required but not provided".into()))
    }

    fn scram(&mut self) -> Result<&mut ScramClient> {
        self.scram
            .as_mut()
            .ok_or_else(|| Error::Protocol("SASL message before SASL negotiation".into()))
    }
}

impl AuthenticationHandler for PasswordAuthenticator {
    fn respond(&mut self, challenge: &AuthenticationMessage) -> Result<Option<FrontendMessage>> {
        match challenge {
            AuthenticationMessage::CleartextPassword => {
                let password = self.password()?;
                Ok(Some(FrontendMessage::Password(password.to_string())))
            }
            AuthenticationMessage::Md5Password { salt } => {
                let hashed = md5_password(&self.user, self.password()?, salt);
                Ok(Some(FrontendMessage::Password(hashed)))
            }
            AuthenticationMessage::Sasl { mechanisms } => {
                if !mechanisms.iter().any(|m| m == SCRAM_SHA_256) {
                    return Err(Error::Unsupported(format!(
                        "No supported SASL mechanism. Server offers: {:?}",
                        mechanisms
                    )));
                }

                let scram = ScramClient::new(self.password()?);
                let client_first = scram.client_first_message();
                self.scram = Some(scram);

                Ok(Some(FrontendMessage::SaslInitialResponse {
                    mechanism: SCRAM_SHA_256.to_string(),
                    data: client_first.into_bytes(),
                }))
            }
            AuthenticationMessage::SaslContinue { data } => {
                let server_first = simdutf8::compat::from_utf8(data)
                    .map_err(|e| Error::Auth(format!("Invalid server-first-message: {}", e)))?;
                let client_final = self.scram()?.process_server_first(server_first)?;
                Ok(Some(FrontendMessage::SaslResponse(client_final.into_bytes())))
            }
            AuthenticationMessage::SaslFinal { data } => {
                let server_final = simdutf8::compat::from_utf8(data)
                    .map_err(|e| Error::Auth(format!("Invalid server-final-message: {}", e)))?;
                self.scram()?.verify_server_final(server_final)?;
                Ok(None)
            }
            AuthenticationMessage::Ok => Ok(None),
            other => Err(Error::Unsupported(format!(
                "Unsupported authentication method: {:?}",
                other
            ))),
        }
    }
}
