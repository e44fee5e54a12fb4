//! SAML bindings used by the service provider.
//!
//! - **HTTP-Redirect** carries our `AuthnRequest` and `LogoutRequest`
//!   messages to the IdP (DEFLATE + base64 + URL encoding).
//! - **HTTP-POST** carries the IdP's `Response` back to our ACS (base64).

pub mod post;
pub mod redirect;

pub use post::decode_post_message;
pub use redirect::{decode_redirect_message, encode_redirect_url};

/// SAML message type for binding operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamlMessageType {
    /// Request message (`AuthnRequest`, `LogoutRequest`).
    Request,
    /// Response message.
    Response,
}

impl SamlMessageType {
    /// Returns the query/form parameter name for this message type.
    #[must_use]
    pub const fn param_name(&self) -> &'static str {
        match self {
            Self::Request => "SAMLRequest",
            Self::Response => "SAMLResponse",
        }
    }
}
