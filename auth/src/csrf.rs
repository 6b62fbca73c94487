// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CSRF state-token protocol binding an outbound authentication request to
//! its inbound callback
//!
//! At init time we mint a random state token and hand the raw value to the
//! caller for embedding in the relay parameter; the browser only ever sees
//! the token's SHA-256 digest, inside an HttpOnly cookie.  At callback time
//! the value echoed back by the IdP is hashed again and compared against the
//! cookie.  The cookie is destroyed on the first verification attempt,
//! success or failure, so a state token can never be replayed:
//!
//!   NoToken -> TokenIssued (cookie set) -> Consumed (cookie cleared)
//!
//! Two concurrent login attempts from one browser race on the cookie and
//! only the most recent one can succeed.  That is accepted, not a bug.

use cookie::Cookie;
use cookie::CookieJar;
use http::header::HeaderMap;
use http::header::HeaderValue;
use rand::{RngCore, SeedableRng, rngs::StdRng};
use sha2::Digest;
use sha2::Sha256;

/// Fixed, well-known name of the CSRF state cookie.
pub const CSRF_STATE_COOKIE_NAME: &str = "OAUTHSTATE";

// 17 bytes = 136 bits of entropy, above the 130-bit floor required of the
// state token.
const STATE_TOKEN_BYTES: usize = 17;

const BASE32_ALPHABET: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";

#[derive(Clone, Debug, thiserror::Error, PartialEq)]
pub enum StateError {
    /// No state cookie came back with the callback.  Either no login was
    /// initiated from this browser or the state was already consumed.
    #[error("Cookie 'OAUTHSTATE' is missing")]
    MissingCookie,

    /// The relay value was absent, empty, or does not hash to the digest
    /// stored in the cookie.
    #[error("CSRF state value is invalid")]
    InvalidState,
}

impl From<StateError> for gatehouse_common::Error {
    fn from(error: StateError) -> Self {
        gatehouse_common::Error::Unauthorized { reason: error.to_string() }
    }
}

/// Result of a [`verify_state`] call.
///
/// The clearing Set-Cookie must reach the browser whenever it is present,
/// even when verification failed; single-use semantics live in that header.
#[derive(Debug)]
pub struct StateVerification {
    /// Set-Cookie header destroying the state cookie.  `None` only when
    /// there was no cookie to destroy.
    pub clear_cookie: Option<HeaderValue>,
    pub result: Result<(), StateError>,
}

/// A freshly minted state token along with the Set-Cookie header that
/// stores its digest in the browser.
#[derive(Debug)]
pub struct GeneratedState {
    /// Raw token, for embedding in the outbound relay parameter.  Never log
    /// this value.
    pub token: String,
    pub set_cookie: HeaderValue,
}

/// Mint a state token and the cookie that will verify its echo.
///
/// The cookie holds only the token's lowercase-hex SHA-256 digest, is scoped
/// to the whole site, is invisible to scripts, and lives for the browser
/// session.  `Secure` is set only when the deployment terminates TLS.
pub fn generate_state(tls_enabled: bool) -> GeneratedState {
    let token = generate_state_token();
    let cookie = Cookie::build((CSRF_STATE_COOKIE_NAME, state_digest(&token)))
        .path("/")
        .http_only(true)
        .secure(tls_enabled)
        .build();
    GeneratedState { token, set_cookie: cookie_header_value(&cookie) }
}

/// Verify the state value echoed back by the IdP against the cookie digest.
///
/// The cookie is unconditionally consumed before the comparison outcome is
/// known.  The comparison is digest-to-digest; the raw token is hashed, never
/// written into a response.
pub fn verify_state(
    headers: &HeaderMap,
    returned_state: Option<&str>,
    tls_enabled: bool,
) -> StateVerification {
    let cookies = parse_cookies(headers);
    let hash_in_cookie = match cookies.get(CSRF_STATE_COOKIE_NAME) {
        Some(cookie) => cookie.value().to_owned(),
        None => {
            return StateVerification {
                clear_cookie: None,
                result: Err(StateError::MissingCookie),
            };
        }
    };

    let clear_cookie = clear_state_cookie_header_value(tls_enabled);

    let result = match returned_state {
        Some(state)
            if !state.is_empty() && state_digest(state) == hash_in_cookie =>
        {
            Ok(())
        }
        _ => Err(StateError::InvalidState),
    };

    StateVerification { clear_cookie: Some(clear_cookie), result }
}

/// Set-Cookie header value that destroys the state cookie: empty value,
/// expiring immediately.
pub fn clear_state_cookie_header_value(tls_enabled: bool) -> HeaderValue {
    let cookie = Cookie::build((CSRF_STATE_COOKIE_NAME, ""))
        .path("/")
        .http_only(true)
        .secure(tls_enabled)
        .max_age(cookie::time::Duration::ZERO)
        .build();
    cookie_header_value(&cookie)
}

fn cookie_header_value(cookie: &Cookie<'_>) -> HeaderValue {
    // Cookie names, hex digests, and the fixed attributes are all visible
    // ASCII.
    HeaderValue::from_str(&cookie.to_string())
        .expect("cookie header value was not visible ASCII")
}

fn generate_state_token() -> String {
    let mut rng = StdRng::from_os_rng();
    let mut random_bytes: [u8; STATE_TOKEN_BYTES] = [0; STATE_TOKEN_BYTES];
    rng.fill_bytes(&mut random_bytes);
    to_base32(&random_bytes)
}

fn state_digest(state: &str) -> String {
    hex::encode(Sha256::digest(state.as_bytes()))
}

// Render bytes 5 bits at a time, most significant bits first, final chunk
// zero-padded.  The digit set (0-9a-v) keeps tokens cookie- and URL-safe.
fn to_base32(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 8 / 5 + 1);
    let mut buffer: u32 = 0;
    let mut bits: u32 = 0;
    for byte in bytes {
        buffer = (buffer << 8) | u32::from(*byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[(buffer >> bits) as usize & 0x1f] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[(buffer << (5 - bits)) as usize & 0x1f] as char);
    }
    out
}

fn parse_cookies(headers: &HeaderMap) -> CookieJar {
    let mut cookies = CookieJar::new();
    for header in headers.get_all(http::header::COOKIE) {
        let raw_str = match header.to_str() {
            Ok(string) => string,
            Err(_) => continue,
        };
        for chunk in raw_str.split(';').map(|s| s.trim()) {
            if let Ok(cookie) = Cookie::parse(chunk) {
                cookies.add_original(cookie.into_owned());
            }
        }
    }
    cookies
}

#[cfg(test)]
mod test {
    use super::*;
    use http::header::COOKIE;

    fn headers_with_cookie(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, value.parse().unwrap());
        headers
    }

    fn set_cookie_to_request_headers(set_cookie: &HeaderValue) -> HeaderMap {
        let cookie =
            Cookie::parse(set_cookie.to_str().unwrap().to_owned()).unwrap();
        headers_with_cookie(&format!("{}={}", cookie.name(), cookie.value()))
    }

    #[test]
    fn test_generate_state_sets_hashed_session_cookie() {
        let generated = generate_state(false);
        assert!(!generated.token.is_empty());
        // 136 bits rendered 5 bits per character
        assert_eq!(generated.token.len(), 28);
        assert!(generated
            .token
            .bytes()
            .all(|b| BASE32_ALPHABET.contains(&b)));

        let cookie = Cookie::parse(
            generated.set_cookie.to_str().unwrap().to_owned(),
        )
        .unwrap();
        assert_eq!(cookie.name(), CSRF_STATE_COOKIE_NAME);
        assert_eq!(cookie.value(), state_digest(&generated.token));
        assert_ne!(cookie.value(), generated.token);
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_ne!(cookie.secure(), Some(true));
        // session cookie: no Max-Age on issue
        assert_eq!(cookie.max_age(), None);
    }

    #[test]
    fn test_generate_state_marks_cookie_secure_under_tls() {
        let generated = generate_state(true);
        let cookie = Cookie::parse(
            generated.set_cookie.to_str().unwrap().to_owned(),
        )
        .unwrap();
        assert_eq!(cookie.secure(), Some(true));
    }

    #[test]
    fn test_generated_tokens_are_unique() {
        assert_ne!(generate_state(false).token, generate_state(false).token);
    }

    #[test]
    fn test_verify_state_accepts_echoed_token_and_clears_cookie() {
        let generated = generate_state(false);
        let headers = set_cookie_to_request_headers(&generated.set_cookie);

        let verification =
            verify_state(&headers, Some(&generated.token), false);
        assert_eq!(verification.result, Ok(()));

        let cleared = Cookie::parse(
            verification.clear_cookie.unwrap().to_str().unwrap().to_owned(),
        )
        .unwrap();
        assert_eq!(cleared.name(), CSRF_STATE_COOKIE_NAME);
        assert_eq!(cleared.value(), "");
        assert_eq!(cleared.path(), Some("/"));
        assert_eq!(cleared.max_age(), Some(cookie::time::Duration::ZERO));
    }

    #[test]
    fn test_verify_state_fails_once_browser_honors_the_clearing_cookie() {
        let generated = generate_state(false);
        let headers = set_cookie_to_request_headers(&generated.set_cookie);

        let first = verify_state(&headers, Some(&generated.token), false);
        assert_eq!(first.result, Ok(()));

        // the clearing cookie removed the digest from the browser
        let headers = HeaderMap::new();
        let second = verify_state(&headers, Some(&generated.token), false);
        assert_eq!(second.result, Err(StateError::MissingCookie));
        assert!(second.clear_cookie.is_none());
    }

    #[test]
    fn test_verify_state_rejects_a_different_token() {
        let cookie_value =
            format!("{}={}", CSRF_STATE_COOKIE_NAME, state_digest("state"));
        let headers = headers_with_cookie(&cookie_value);

        let verification = verify_state(&headers, Some("other value"), false);
        assert_eq!(verification.result, Err(StateError::InvalidState));
        // the cookie is consumed even though verification failed
        assert!(verification.clear_cookie.is_some());
    }

    #[test]
    fn test_verify_state_rejects_empty_and_absent_relay_values() {
        let cookie_value =
            format!("{}={}", CSRF_STATE_COOKIE_NAME, state_digest("state"));

        for returned_state in [Some(""), None] {
            let headers = headers_with_cookie(&cookie_value);
            let verification =
                verify_state(&headers, returned_state, false);
            assert_eq!(verification.result, Err(StateError::InvalidState));
        }
    }

    #[test]
    fn test_verify_state_rejects_raw_token_stored_in_cookie() {
        // a forged cookie holding the raw token instead of its digest must
        // not verify; the comparison is digest-to-digest
        let headers = headers_with_cookie(&format!(
            "{}={}",
            CSRF_STATE_COOKIE_NAME, "state"
        ));
        let verification = verify_state(&headers, Some("state"), false);
        assert_eq!(verification.result, Err(StateError::InvalidState));
    }

    #[test]
    fn test_verify_state_names_the_missing_cookie() {
        let headers = HeaderMap::new();
        let verification = verify_state(&headers, Some("state"), false);
        let error = verification.result.unwrap_err();
        assert_eq!(error, StateError::MissingCookie);
        assert_eq!(error.to_string(), "Cookie 'OAUTHSTATE' is missing");
        assert!(verification.clear_cookie.is_none());
    }

    #[test]
    fn test_parse_cookies_spans_multiple_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, "cookie1=abc; cookie2=def".parse().unwrap());
        headers.append(COOKIE, "cookie3=ghi".parse().unwrap());

        let cookies = parse_cookies(&headers);
        assert_eq!(cookies.iter().count(), 3);
        assert_eq!(cookies.get("cookie2").unwrap().value(), "def");
        assert_eq!(cookies.get("cookie3").unwrap().value(), "ghi");
    }

    #[test]
    fn test_parse_cookies_last_value_wins_for_duplicate_names() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, "cookie=abc".parse().unwrap());
        headers.append(COOKIE, "cookie=def".parse().unwrap());

        let cookies = parse_cookies(&headers);
        assert_eq!(cookies.iter().count(), 1);
        assert_eq!(cookies.get("cookie").unwrap().value(), "def");
    }

    #[test]
    fn test_base32_rendering() {
        assert_eq!(to_base32(&[]), "");
        assert_eq!(to_base32(&[0x00]), "00");
        assert_eq!(to_base32(&[0xff]), "vs");
        assert_eq!(to_base32(&[0xde, 0xad, 0xbe, 0xef]), "rqmrtro");
    }
}
