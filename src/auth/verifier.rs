//! Verification of SSO tokens signed with the shared secret.

use jsonwebtoken::{DecodingKey, Validation, decode, decode_header, errors::ErrorKind};

use super::claims::{IdProblem, RawClaims, UserClaims};
use crate::config::{JwtAlgorithm, JwtConfig};

/// Why a token was rejected.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token is malformed: {0}")]
    Malformed(String),

    #[error("token has expired")]
    Expired,

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token audience is invalid")]
    InvalidAudience,

    #[error("token algorithm {0:?} is not accepted")]
    UnsupportedAlgorithm(jsonwebtoken::Algorithm),

    #[error("token has no usable id claim")]
    MissingId,

    #[error("failed to encode token: {0}")]
    Encoding(#[source] jsonwebtoken::errors::Error),
}

impl TokenError {
    /// Short machine-readable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            TokenError::Malformed(_) => "malformed",
            TokenError::Expired => "expired",
            TokenError::InvalidSignature => "invalid_signature",
            TokenError::InvalidAudience => "invalid_audience",
            TokenError::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            TokenError::MissingId => "missing_id",
            TokenError::Encoding(_) => "encoding",
        }
    }
}

/// Verifies tokens issued by the main application.
pub struct TokenVerifier {
    algorithm: JwtAlgorithm,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(config: &JwtConfig) -> Self {
        let mut validation = Validation::new(config.algorithm.to_jwt_algorithm());
        validation.set_audience(&[&config.audience]);
        validation.set_required_spec_claims(&["exp", "aud"]);
        validation.leeway = config.leeway_secs;

        Self {
            algorithm: config.algorithm,
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
        }
    }

    /// Verify `token` and return its claims with defaults applied.
    ///
    /// Every rejection is logged here; callers decide whether to surface it.
    pub fn verify(&self, token: &str) -> Result<UserClaims, TokenError> {
        self.verify_inner(token).inspect_err(|e| {
            tracing::warn!(reason = e.kind(), error = %e, "SSO token rejected");
        })
    }

    fn verify_inner(&self, token: &str) -> Result<UserClaims, TokenError> {
        let header = decode_header(token).map_err(|e| TokenError::Malformed(e.to_string()))?;

        // Only the configured HMAC algorithm; never "none" or an asymmetric one.
        if !self.algorithm.matches(header.alg) {
            return Err(TokenError::UnsupportedAlgorithm(header.alg));
        }

        let data = decode::<RawClaims>(token, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::InvalidAudience => TokenError::InvalidAudience,
                ErrorKind::MissingRequiredClaim(claim) if claim == "aud" => {
                    TokenError::InvalidAudience
                }
                ErrorKind::InvalidAlgorithm => TokenError::UnsupportedAlgorithm(header.alg),
                _ => TokenError::Malformed(e.to_string()),
            },
        )?;

        data.claims.into_user_claims().map_err(|problem| match problem {
            IdProblem::Missing => TokenError::MissingId,
            IdProblem::WrongType => TokenError::Malformed("id must be a string or number".into()),
        })
    }
}
