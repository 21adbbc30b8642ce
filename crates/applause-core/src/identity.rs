//! Member identity from platform bearer tokens.
//!
//! The blogging platform hands signed-in readers a compact three-segment token
//! (`header.payload.signature`). The payload is base64url JSON carrying the
//! `aud`, `iss`, `exp` and `sub` claims. Only the claims are checked here: the
//! signature segment is never verified, so the resulting identity is claimed
//! rather than proven.
//!
//! Failing to extract an identity is a normal outcome (anonymous readers), so
//! [`IdentityExtractor::extract`] returns `Option` and logs the reason at
//! debug level instead of returning an error.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::error::{Error, Result};

/// Path of the platform's member API, relative to the platform base URL.
pub const MEMBER_API_PATH: &str = "/members/api";

/// Actor type recorded for every membership row.
pub const MEMBER_ACTOR_TYPE: &str = "member";

/// A member identity: the lowercased `sub` claim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActorId(String);

impl ActorId {
    /// Build an actor id, normalizing case.
    pub fn new(subject: &str) -> Self {
        Self(subject.to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a token was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    MissingBearer,
    Malformed(&'static str),
    AudienceMismatch,
    IssuerMismatch,
    Expired { exp: i64, now: i64 },
    InvalidExpiry,
    MissingSubject,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingBearer => f.write_str("no bearer token"),
            Self::Malformed(what) => write!(f, "malformed token: {what}"),
            Self::AudienceMismatch => f.write_str("audience mismatch"),
            Self::IssuerMismatch => f.write_str("issuer mismatch"),
            Self::Expired { exp, now } => write!(f, "token expired at {exp} (now {now})"),
            Self::InvalidExpiry => f.write_str("exp claim is not a number"),
            Self::MissingSubject => f.write_str("sub claim missing or not a string"),
        }
    }
}

/// Claims read from the token payload. Values stay untyped so that a claim of
/// the wrong JSON type is a mismatch rather than a decode failure.
#[derive(Debug, Default, Deserialize)]
struct MemberClaims {
    #[serde(default)]
    aud: Value,
    #[serde(default)]
    iss: Value,
    #[serde(default)]
    exp: Value,
    #[serde(default)]
    sub: Value,
}

/// Extracts member identities from `Authorization` header values.
#[derive(Debug, Clone)]
pub struct IdentityExtractor {
    member_api_url: String,
}

impl IdentityExtractor {
    /// Create an extractor expecting `aud` and `iss` to equal `member_api_url`.
    pub fn new(member_api_url: impl Into<String>) -> Self {
        Self {
            member_api_url: member_api_url.into(),
        }
    }

    /// Create an extractor for a platform base URL (e.g. `https://blog.example`).
    ///
    /// The member API URL is resolved against the base the same way a browser
    /// would, so any path on the base URL is replaced.
    pub fn for_platform(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let member_api = base
            .join(MEMBER_API_PATH)
            .map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self::new(member_api.as_str()))
    }

    /// The URL that `aud` and `iss` must match.
    pub fn member_api_url(&self) -> &str {
        &self.member_api_url
    }

    /// Extract the member identity from a header value, if it carries one.
    pub fn extract(&self, authorization: Option<&str>) -> Option<ActorId> {
        let now = chrono::Utc::now().timestamp();
        match self.verify(authorization, now) {
            Ok(actor) => Some(actor),
            Err(Rejection::MissingBearer) => None,
            Err(reason) => {
                tracing::debug!(%reason, "bearer token rejected");
                None
            }
        }
    }

    /// Check a header value against the claim rules at time `now` (Unix seconds).
    pub fn verify(
        &self,
        authorization: Option<&str>,
        now: i64,
    ) -> std::result::Result<ActorId, Rejection> {
        let token = authorization
            .and_then(|h| h.strip_prefix("Bearer "))
            .ok_or(Rejection::MissingBearer)?;

        let claims = decode_claims(token)?;

        if claims.aud.as_str() != Some(self.member_api_url.as_str()) {
            return Err(Rejection::AudienceMismatch);
        }
        if claims.iss.as_str() != Some(self.member_api_url.as_str()) {
            return Err(Rejection::IssuerMismatch);
        }

        match &claims.exp {
            Value::Null => {}
            Value::Number(n) => {
                let exp = n.as_f64().ok_or(Rejection::InvalidExpiry)?;
                // exp == 0 counts as "no expiry"
                if exp != 0.0 && exp < now as f64 {
                    return Err(Rejection::Expired {
                        exp: exp as i64,
                        now,
                    });
                }
            }
            _ => return Err(Rejection::InvalidExpiry),
        }

        claims
            .sub
            .as_str()
            .map(ActorId::new)
            .ok_or(Rejection::MissingSubject)
    }
}

fn decode_claims(token: &str) -> std::result::Result<MemberClaims, Rejection> {
    let segments: Vec<&str> = token.split('.').collect();
    let [_header, payload, _signature] = segments.as_slice() else {
        return Err(Rejection::Malformed("expected three segments"));
    };

    let payload = payload.trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| STANDARD_NO_PAD.decode(payload))
        .map_err(|_| Rejection::Malformed("payload is not base64"))?;

    serde_json::from_slice(&bytes).map_err(|_| Rejection::Malformed("payload is not a JSON object"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const API: &str = "https://blog.example/members/api";
    const NOW: i64 = 1_700_000_000;

    fn token(payload: &Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS512","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("Bearer {header}.{body}.c2lnbmF0dXJl")
    }

    fn valid_claims() -> Value {
        json!({ "aud": API, "iss": API, "exp": NOW + 600, "sub": "Reader@X.com" })
    }

    fn extractor() -> IdentityExtractor {
        IdentityExtractor::new(API)
    }

    #[test]
    fn test_for_platform_resolves_member_api() {
        let ext = IdentityExtractor::for_platform("https://blog.example").unwrap();
        assert_eq!(ext.member_api_url(), API);

        // A path on the base URL is replaced, not appended to.
        let ext = IdentityExtractor::for_platform("https://blog.example/ghost/").unwrap();
        assert_eq!(ext.member_api_url(), API);

        assert!(IdentityExtractor::for_platform("blog.example").is_err());
    }

    #[test]
    fn test_valid_token_yields_lowercased_subject() {
        let header = token(&valid_claims());
        let actor = extractor().verify(Some(&header), NOW).unwrap();
        assert_eq!(actor.as_str(), "reader@x.com");
    }

    #[test]
    fn test_missing_or_non_bearer_header() {
        assert_eq!(extractor().verify(None, NOW), Err(Rejection::MissingBearer));
        assert_eq!(
            extractor().verify(Some("Basic dXNlcjpwYXNz"), NOW),
            Err(Rejection::MissingBearer)
        );
        let lower = token(&valid_claims()).replacen("Bearer", "bearer", 1);
        assert_eq!(extractor().verify(Some(&lower), NOW), Err(Rejection::MissingBearer));
    }

    #[test]
    fn test_wrong_segment_count() {
        for header in ["Bearer abc", "Bearer a.b", "Bearer a.b.c.d", "Bearer "] {
            assert!(
                matches!(extractor().verify(Some(header), NOW), Err(Rejection::Malformed(_))),
                "{header:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_payload_not_json() {
        let body = URL_SAFE_NO_PAD.encode("not json");
        let header = format!("Bearer e30.{body}.sig");
        assert!(matches!(
            extractor().verify(Some(&header), NOW),
            Err(Rejection::Malformed(_))
        ));

        let header = "Bearer e30.!!!.sig";
        assert!(matches!(
            extractor().verify(Some(header), NOW),
            Err(Rejection::Malformed(_))
        ));
    }

    #[test]
    fn test_padded_and_standard_alphabet_payloads_accepted() {
        let claims = valid_claims().to_string();
        let padded = base64::engine::general_purpose::STANDARD.encode(&claims);
        let header = format!("Bearer e30.{padded}.sig");
        assert!(extractor().verify(Some(&header), NOW).is_ok());
    }

    #[test]
    fn test_audience_must_match_exactly() {
        let mut claims = valid_claims();
        claims["aud"] = json!("https://blog.example/members/api/");
        assert_eq!(
            extractor().verify(Some(&token(&claims)), NOW),
            Err(Rejection::AudienceMismatch)
        );

        claims["aud"] = json!([API]);
        assert_eq!(
            extractor().verify(Some(&token(&claims)), NOW),
            Err(Rejection::AudienceMismatch)
        );
    }

    #[test]
    fn test_issuer_must_match_exactly() {
        let mut claims = valid_claims();
        claims["iss"] = json!("https://evil.example/members/api");
        assert_eq!(
            extractor().verify(Some(&token(&claims)), NOW),
            Err(Rejection::IssuerMismatch)
        );

        claims.as_object_mut().unwrap().remove("iss");
        assert_eq!(
            extractor().verify(Some(&token(&claims)), NOW),
            Err(Rejection::IssuerMismatch)
        );
    }

    #[test]
    fn test_expired_token_rejected() {
        let mut claims = valid_claims();
        claims["exp"] = json!(NOW - 1);
        assert_eq!(
            extractor().verify(Some(&token(&claims)), NOW),
            Err(Rejection::Expired { exp: NOW - 1, now: NOW })
        );
    }

    #[test]
    fn test_expiry_boundary_and_absence() {
        let mut claims = valid_claims();
        claims["exp"] = json!(NOW);
        assert!(extractor().verify(Some(&token(&claims)), NOW).is_ok());

        claims.as_object_mut().unwrap().remove("exp");
        assert!(extractor().verify(Some(&token(&claims)), NOW).is_ok());

        claims["exp"] = json!(0);
        assert!(extractor().verify(Some(&token(&claims)), NOW).is_ok());

        claims["exp"] = Value::Null;
        assert!(extractor().verify(Some(&token(&claims)), NOW).is_ok());
    }

    #[test]
    fn test_non_numeric_expiry_rejected() {
        let mut claims = valid_claims();
        claims["exp"] = json!("tomorrow");
        assert_eq!(
            extractor().verify(Some(&token(&claims)), NOW),
            Err(Rejection::InvalidExpiry)
        );
    }

    #[test]
    fn test_subject_must_be_string() {
        let mut claims = valid_claims();
        claims["sub"] = json!(42);
        assert_eq!(
            extractor().verify(Some(&token(&claims)), NOW),
            Err(Rejection::MissingSubject)
        );

        claims.as_object_mut().unwrap().remove("sub");
        assert_eq!(
            extractor().verify(Some(&token(&claims)), NOW),
            Err(Rejection::MissingSubject)
        );
    }

    #[test]
    fn test_signature_is_not_checked() {
        let header = token(&valid_claims());
        let forged = format!("{}.forged", header.rsplit_once('.').unwrap().0);
        assert!(extractor().verify(Some(&forged), NOW).is_ok());
    }

    #[test]
    fn test_extract_uses_wall_clock() {
        let mut claims = valid_claims();
        claims.as_object_mut().unwrap().remove("exp");
        assert_eq!(
            extractor().extract(Some(&token(&claims))),
            Some(ActorId::new("reader@x.com"))
        );

        claims["exp"] = json!(1);
        assert_eq!(extractor().extract(Some(&token(&claims))), None);
        assert_eq!(extractor().extract(None), None);
    }
}
