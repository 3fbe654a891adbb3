//! Authentication and per-request identity binding.
//!
//! Three modes: Basic against configured credentials (single-tenant), Basic
//! with the backend credential embedded in the password (proxy), and Digest
//! (single-tenant only; the combination with proxy is refused at server
//! construction). Successful authentication binds a [`PerUserState`] to the
//! request. Failures never reveal which credential was wrong, and raw
//! credentials are never logged.

use crate::config::{AuthMode, Tenancy};
use crate::error::{WebDavError, WebDavResult};
use crate::state::{PerUserState, UserRegistry};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hyper::header::{HeaderMap, AUTHORIZATION};
use hyper::Method;
use md5::{Digest, Md5};
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

const REALM: &str = "Default realm";

/// Constant-time string equality.
fn ct_eq(a: &str, b: &str) -> bool {
    bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

fn md5_hex(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

fn random_hex_16() -> String {
    let mut buf = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Decoded `Authorization: Basic` credentials.
fn parse_basic(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ").or_else(|| value.strip_prefix("basic "))?;
    let decoded = BASE64.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, pass) = text.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

/// `Authorization: Digest` parameters as a lowercase-keyed map.
fn parse_digest(headers: &HeaderMap) -> Option<HashMap<String, String>> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let params = value.strip_prefix("Digest ").or_else(|| value.strip_prefix("digest "))?;
    let mut out = HashMap::new();
    for piece in params.split(',') {
        let Some((key, raw)) = piece.split_once('=') else { continue };
        let key = key.trim().to_ascii_lowercase();
        let val = raw.trim().trim_matches('"').to_string();
        out.insert(key, val);
    }
    Some(out)
}

/// Proxy-mode password payload: `password=<secret>[&twoFactorAuthentication=<otp>]`.
fn parse_proxy_password(password: &str) -> Option<(String, Option<String>)> {
    let rest = password.strip_prefix("password=")?;
    match rest.split_once("&twoFactorAuthentication=") {
        Some((secret, otp)) => Some((secret.to_string(), Some(otp.to_string()))),
        None => Some((rest.to_string(), None)),
    }
}

/// Authenticates requests and binds them to per-user state.
pub struct Authenticator {
    mode: AuthMode,
    tenancy: Tenancy,
    registry: Arc<UserRegistry>,
}

impl Authenticator {
    pub fn new(mode: AuthMode, tenancy: Tenancy, registry: Arc<UserRegistry>) -> Self {
        Self {
            mode,
            tenancy,
            registry,
        }
    }

    /// The `WWW-Authenticate` challenge for a 401 response. Digest nonces
    /// are fresh per challenge and not tracked server-side.
    pub fn challenge(&self) -> String {
        match self.mode {
            AuthMode::Basic => format!("Basic realm=\"{REALM}\", charset=\"UTF-8\""),
            AuthMode::Digest => format!(
                "Digest realm=\"{REALM}\", qop=\"auth\", nonce=\"{}\", opaque=\"{}\"",
                random_hex_16(),
                random_hex_16()
            ),
        }
    }

    /// Username claimed by the request, for `key=username` rate limiting.
    /// Extraction only; no verification happens here.
    pub fn claimed_username(&self, headers: &HeaderMap) -> Option<String> {
        match self.mode {
            AuthMode::Basic => parse_basic(headers).map(|(user, _)| user),
            AuthMode::Digest => parse_digest(headers)?.remove("username"),
        }
    }

    /// Authenticate a request and return the bound user state.
    pub async fn authenticate(
        &self,
        method: &Method,
        headers: &HeaderMap,
    ) -> WebDavResult<Arc<PerUserState>> {
        match (self.mode, &self.tenancy) {
            (AuthMode::Basic, Tenancy::Single {
                username, password, ..
            }) => {
                let (user, pass) =
                    parse_basic(headers).ok_or(WebDavError::Unauthenticated)?;
                let user_ok = ct_eq(&user, username);
                let pass_ok = ct_eq(&pass, password);
                if !(user_ok && pass_ok) {
                    return Err(WebDavError::Unauthenticated);
                }
                self.registry
                    .get(username)
                    .ok_or(WebDavError::Unauthenticated)
            }
            (AuthMode::Basic, Tenancy::Proxy { login }) => {
                let (user, raw_password) =
                    parse_basic(headers).ok_or(WebDavError::Unauthenticated)?;
                if !user.contains('@') {
                    return Err(WebDavError::Unauthenticated);
                }
                let (secret, otp) =
                    parse_proxy_password(&raw_password).ok_or(WebDavError::Unauthenticated)?;

                // Fast path: an existing session authed with this exact
                // credential string.
                if let Some(state) = self.registry.get(&user) {
                    if state
                        .authed_password()
                        .is_some_and(|cached| ct_eq(&cached, &raw_password))
                    {
                        return Ok(state);
                    }
                }

                // Serialize first login per username.
                let lock = self.registry.login_lock(&user);
                let _guard = lock.lock().await;

                if let Some(state) = self.registry.get(&user) {
                    if state
                        .authed_password()
                        .is_some_and(|cached| ct_eq(&cached, &raw_password))
                    {
                        return Ok(state);
                    }
                }

                match login.login(&user, &secret, otp.as_deref()).await {
                    Ok(client) => {
                        let state = PerUserState::new(user.clone(), client);
                        state.set_authed_password(&raw_password);
                        self.registry.insert(Arc::clone(&state));
                        debug!(username = %user, "proxy login succeeded");
                        Ok(state)
                    }
                    Err(e) => {
                        warn!(username = %user, error = %e, "proxy login failed");
                        self.registry.evict(&user);
                        Err(WebDavError::Unauthenticated)
                    }
                }
            }
            (AuthMode::Digest, Tenancy::Single {
                username, password, ..
            }) => {
                let params = parse_digest(headers).ok_or(WebDavError::Unauthenticated)?;
                let get = |key: &str| -> WebDavResult<&str> {
                    params
                        .get(key)
                        .map(String::as_str)
                        .ok_or(WebDavError::Unauthenticated)
                };
                let user = get("username")?;
                if !ct_eq(user, username) {
                    return Err(WebDavError::Unauthenticated);
                }

                let realm = get("realm")?;
                let uri = get("uri")?;
                let nonce = get("nonce")?;
                let nc = get("nc")?;
                let cnonce = get("cnonce")?;
                let qop = get("qop")?;
                let response = get("response")?;

                let ha1 = md5_hex(&format!("{user}:{realm}:{password}"));
                let ha2 = md5_hex(&format!("{method}:{uri}"));
                let expected = md5_hex(&format!("{ha1}:{nonce}:{nc}:{cnonce}:{qop}:{ha2}"));
                if !ct_eq(&expected, &response.to_ascii_lowercase()) {
                    return Err(WebDavError::Unauthenticated);
                }
                self.registry
                    .get(username)
                    .ok_or(WebDavError::Unauthenticated)
            }
            // Refused at construction; unreachable in a validated server.
            (AuthMode::Digest, Tenancy::Proxy { .. }) => Err(WebDavError::Unauthenticated),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::memory::{MemoryClient, MemoryLogin};
    use hyper::header::HeaderValue;

    fn basic_header(user: &str, pass: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let encoded = BASE64.encode(format!("{user}:{pass}"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {encoded}")).unwrap(),
        );
        headers
    }

    fn single_authenticator(mode: AuthMode) -> (Authenticator, Arc<UserRegistry>) {
        let registry = UserRegistry::new();
        let client = MemoryClient::new("admin");
        registry.insert(PerUserState::new("admin", client));
        let tenancy = Tenancy::Single {
            username: "admin".into(),
            password: "secret".into(),
            client: MemoryClient::new("admin"),
        };
        (
            Authenticator::new(mode, tenancy, Arc::clone(&registry)),
            registry,
        )
    }

    #[tokio::test]
    async fn test_basic_single_tenant_accepts_exact_match_only() {
        let (auth, _) = single_authenticator(AuthMode::Basic);

        let ok = auth
            .authenticate(&Method::GET, &basic_header("admin", "secret"))
            .await;
        assert!(ok.is_ok());

        for (user, pass) in [
            ("admin", "secres"),
            ("admim", "secret"),
            ("admin", "secret "),
            ("", ""),
        ] {
            let err = auth
                .authenticate(&Method::GET, &basic_header(user, pass))
                .await;
            assert!(err.is_err(), "accepted {user}:{pass}");
        }
    }

    #[tokio::test]
    async fn test_missing_header_is_unauthenticated() {
        let (auth, _) = single_authenticator(AuthMode::Basic);
        let err = auth.authenticate(&Method::GET, &HeaderMap::new()).await;
        assert!(matches!(err, Err(WebDavError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_proxy_login_caches_raw_password() {
        let login = MemoryLogin::new();
        login.register("a@x.y", "pw", Some("123456"));
        let registry = UserRegistry::new();
        let auth = Authenticator::new(
            AuthMode::Basic,
            Tenancy::Proxy {
                login: Arc::clone(&login) as Arc<dyn crate::sdk::FilenLogin>,
            },
            Arc::clone(&registry),
        );

        let headers = basic_header("a@x.y", "password=pw&twoFactorAuthentication=123456");
        auth.authenticate(&Method::GET, &headers).await.unwrap();
        auth.authenticate(&Method::GET, &headers).await.unwrap();
        assert_eq!(login.login_count(), 1, "second request must hit the cache");

        let bad = basic_header("a@x.y", "password=wrong");
        assert!(auth.authenticate(&Method::GET, &bad).await.is_err());
    }

    #[tokio::test]
    async fn test_proxy_requires_email_and_password_prefix() {
        let login = MemoryLogin::new();
        login.register("a@x.y", "pw", None);
        let registry = UserRegistry::new();
        let auth = Authenticator::new(
            AuthMode::Basic,
            Tenancy::Proxy { login },
            registry,
        );

        // No '@' in the username.
        let headers = basic_header("local", "password=pw");
        assert!(auth.authenticate(&Method::GET, &headers).await.is_err());

        // Password without the marker prefix.
        let headers = basic_header("a@x.y", "pw");
        assert!(auth.authenticate(&Method::GET, &headers).await.is_err());
    }

    #[tokio::test]
    async fn test_digest_round_trip() {
        let (auth, _) = single_authenticator(AuthMode::Digest);

        let nonce = "abcdef0123456789";
        let nc = "00000001";
        let cnonce = "deadbeef";
        let uri = "/file.txt";
        let ha1 = md5_hex(&format!("admin:{REALM}:secret"));
        let ha2 = md5_hex(&format!("GET:{uri}"));
        let response = md5_hex(&format!("{ha1}:{nonce}:{nc}:{cnonce}:auth:{ha2}"));

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!(
                "Digest username=\"admin\", realm=\"{REALM}\", uri=\"{uri}\", \
                 nonce=\"{nonce}\", nc={nc}, cnonce=\"{cnonce}\", qop=auth, \
                 response=\"{response}\""
            ))
            .unwrap(),
        );
        assert!(auth.authenticate(&Method::GET, &headers).await.is_ok());

        // A response computed over the wrong password must fail.
        let bad_ha1 = md5_hex(&format!("admin:{REALM}:wrong"));
        let bad = md5_hex(&format!("{bad_ha1}:{nonce}:{nc}:{cnonce}:auth:{ha2}"));
        let mut bad_headers = HeaderMap::new();
        bad_headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!(
                "Digest username=\"admin\", realm=\"{REALM}\", uri=\"{uri}\", \
                 nonce=\"{nonce}\", nc={nc}, cnonce=\"{cnonce}\", qop=auth, \
                 response=\"{bad}\""
            ))
            .unwrap(),
        );
        assert!(auth.authenticate(&Method::GET, &bad_headers).await.is_err());
    }

    #[tokio::test]
    async fn test_challenge_shapes() {
        let (basic, _) = single_authenticator(AuthMode::Basic);
        assert_eq!(
            basic.challenge(),
            "Basic realm=\"Default realm\", charset=\"UTF-8\""
        );

        let (digest, _) = single_authenticator(AuthMode::Digest);
        let challenge = digest.challenge();
        assert!(challenge.starts_with("Digest realm=\"Default realm\", qop=\"auth\", nonce=\""));
        assert!(challenge.contains("opaque=\""));
    }

    #[test]
    fn test_parse_proxy_password() {
        assert_eq!(
            parse_proxy_password("password=s3cret"),
            Some(("s3cret".into(), None))
        );
        assert_eq!(
            parse_proxy_password("password=s3cret&twoFactorAuthentication=000111"),
            Some(("s3cret".into(), Some("000111".into())))
        );
        assert_eq!(parse_proxy_password("s3cret"), None);
    }
}
