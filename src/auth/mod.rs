//! Authentication plugins
//!
//! The server names a plugin in its greeting (and may switch to another one
//! with an AuthSwitchRequest). Each supported plugin turns the password and
//! the server nonce into the bytes sent back to the server.

mod scramble;

pub use scramble::{scramble_caching_sha2, scramble_native};

use crate::protocol::constants::{caching_sha2, plugins};
use crate::{Error, Result};

/// Supported authentication plugins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPlugin {
    /// `mysql_native_password` (SHA1 challenge/response)
    NativePassword,
    /// `caching_sha2_password` (SHA256 challenge/response, cleartext fallback)
    CachingSha2Password,
    /// `sha256_password` (cleartext over a secure transport)
    Sha256Password,
    /// `mysql_clear_password` (cleartext over a secure transport)
    ClearPassword,
}

/// Next step after a `caching_sha2_password` AuthMoreData packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoreDataStep {
    /// The server accepted the scramble; an OK packet follows
    AwaitResult,
    /// The server wants the cleartext password
    Send(Vec<u8>),
}

impl AuthPlugin {
    /// Look up a plugin by the name the server sent
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            plugins::NATIVE_PASSWORD => Ok(Self::NativePassword),
            plugins::CACHING_SHA2_PASSWORD => Ok(Self::CachingSha2Password),
            plugins::SHA256_PASSWORD => Ok(Self::Sha256Password),
            plugins::CLEAR_PASSWORD => Ok(Self::ClearPassword),
            other => Err(Error::Authentication(format!(
                "unsupported authentication plugin '{}'",
                other
            ))),
        }
    }

    /// Plugin used for the first HandshakeResponse
    ///
    /// Cleartext plugins and unknown plugins are never answered up front:
    /// the client answers with `mysql_native_password` and lets the server
    /// switch if the account needs something else.
    pub fn for_handshake(server_default: Option<&str>) -> Self {
        match server_default {
            Some(plugins::CACHING_SHA2_PASSWORD) => Self::CachingSha2Password,
            _ => Self::NativePassword,
        }
    }

    /// Wire name
    pub fn name(&self) -> &'static str {
        match self {
            Self::NativePassword => plugins::NATIVE_PASSWORD,
            Self::CachingSha2Password => plugins::CACHING_SHA2_PASSWORD,
            Self::Sha256Password => plugins::SHA256_PASSWORD,
            Self::ClearPassword => plugins::CLEAR_PASSWORD,
        }
    }

    /// Whether the plugin sends the password in cleartext
    pub fn sends_cleartext(&self) -> bool {
        matches!(self, Self::Sha256Password | Self::ClearPassword)
    }

    /// Build the auth response for `nonce`
    ///
    /// `secure` is true when the transport is TLS or a Unix socket.
    pub fn respond(&self, password: &str, nonce: &[u8], secure: bool) -> Result<Vec<u8>> {
        match self {
            Self::NativePassword => Ok(scramble_native(password.as_bytes(), nonce)),
            Self::CachingSha2Password => Ok(scramble_caching_sha2(password.as_bytes(), nonce)),
            Self::Sha256Password | Self::ClearPassword => {
                if !secure {
                    return Err(Error::Authentication(format!(
                        "{} sends the password in cleartext and requires TLS or a Unix socket",
                        self.name()
                    )));
                }
                Ok(null_terminated(password))
            }
        }
    }

    /// Handle an AuthMoreData packet
    pub fn more_data(&self, data: &[u8], password: &str, secure: bool) -> Result<MoreDataStep> {
        if *self != Self::CachingSha2Password {
            return Err(Error::Protocol(format!(
                "unexpected AuthMoreData for plugin {}",
                self.name()
            )));
        }

        match data.first() {
            Some(&caching_sha2::FAST_AUTH_SUCCESS) => Ok(MoreDataStep::AwaitResult),
            Some(&caching_sha2::PERFORM_FULL_AUTHENTICATION) => {
                if !secure {
                    return Err(Error::Authentication(
                        "caching_sha2_password full authentication requires TLS or a Unix socket"
                            .into(),
                    ));
                }
                Ok(MoreDataStep::Send(null_terminated(password)))
            }
            Some(other) => Err(Error::Protocol(format!(
                "unexpected caching_sha2_password status byte: 0x{:02X}",
                other
            ))),
            None => Err(Error::Protocol("empty AuthMoreData packet".into())),
        }
    }
}

impl std::fmt::Display for AuthPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn null_terminated(password: &str) -> Vec<u8> {
    let mut data = Vec::with_capacity(password.len() + 1);
    data.extend_from_slice(password.as_bytes());
    data.push(0);
    data
}
