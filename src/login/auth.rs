use axum::http::HeaderMap;
use base64::{Engine, engine::general_purpose};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "gallery_session";

/// Sessions last a week.
pub const SESSION_MAX_AGE_SECS: i64 = 7 * 24 * 60 * 60;

pub fn create_signed_cookie(secret: &str, value: &str) -> Result<String, String> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| "Invalid secret key")?;
    mac.update(value.as_bytes());
    let signature = mac.finalize().into_bytes();
    let signature_b64 = general_purpose::URL_SAFE_NO_PAD.encode(signature);
    Ok(format!("{}:{}", value, signature_b64))
}

/// The signed value, if the signature checks out.
pub fn verify_signed_cookie<'a>(secret: &str, signed_value: &'a str) -> Option<&'a str> {
    if let Some((value, signature_b64)) = signed_value.split_once(':')
        && let Ok(signature) = general_purpose::URL_SAFE_NO_PAD.decode(signature_b64)
        && let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes())
    {
        mac.update(value.as_bytes());
        if mac.verify_slice(&signature).is_ok() {
            return Some(value);
        }
    }
    None
}

pub fn get_cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all("cookie")
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .find_map(|cookie| {
            let (key, value) = cookie.trim().split_once('=')?;
            (key.trim() == name).then(|| value.trim().to_string())
        })
}

/// `Set-Cookie` value for a new session issued at `issued_at` (unix seconds).
pub fn session_cookie(secret: &str, issued_at: i64) -> Result<String, String> {
    let signed_value = create_signed_cookie(secret, &issued_at.to_string())?;
    Ok(format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        SESSION_COOKIE, signed_value, SESSION_MAX_AGE_SECS
    ))
}

pub fn clear_session_cookie() -> String {
    format!("{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax", SESSION_COOKIE)
}

/// Whether the request carries a validly signed, unexpired session cookie.
pub fn is_authenticated(headers: &HeaderMap, secret: &str) -> bool {
    let Some(signed_value) = get_cookie_value(headers, SESSION_COOKIE) else {
        return false;
    };
    let Some(issued_at) = verify_signed_cookie(secret, &signed_value)
        .and_then(|value| value.parse::<i64>().ok())
    else {
        return false;
    };

    let age = chrono::Utc::now().timestamp() - issued_at;
    (0..=SESSION_MAX_AGE_SECS).contains(&age)
}

/// Compare a submitted password with the configured one without an early exit.
pub fn password_matches(expected: &str, given: &str) -> bool {
    let (expected, given) = (expected.as_bytes(), given.as_bytes());
    if expected.is_empty() || expected.len() != given.len() {
        return false;
    }
    expected
        .iter()
        .zip(given)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// A random per-process signing secret.
pub fn generate_secret() -> String {
    use rand::{Rng, rng};

    general_purpose::URL_SAFE_NO_PAD.encode(rng().random::<[u8; 32]>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_cookie(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_str(cookie).unwrap());
        headers
    }

    #[test]
    fn test_signed_cookie_roundtrip() {
        let signed = create_signed_cookie("secret", "12345").unwrap();
        assert_eq!(verify_signed_cookie("secret", &signed), Some("12345"));
        assert_eq!(verify_signed_cookie("other", &signed), None);
        assert_eq!(verify_signed_cookie("secret", "12345:AAAA"), None);
        assert_eq!(verify_signed_cookie("secret", "garbage"), None);
    }

    #[test]
    fn test_session_cookie_authenticates() {
        let now = chrono::Utc::now().timestamp();
        let set_cookie = session_cookie("s3cret", now).unwrap();
        assert!(set_cookie.starts_with("gallery_session="));
        assert!(set_cookie.contains("HttpOnly"));

        let pair = set_cookie.split(';').next().unwrap();
        let headers = headers_with_cookie(&format!("theme=dark; {}", pair));
        assert!(is_authenticated(&headers, "s3cret"));
        assert!(!is_authenticated(&headers, "different"));
    }

    #[test]
    fn test_expired_session_rejected() {
        let issued = chrono::Utc::now().timestamp() - SESSION_MAX_AGE_SECS - 10;
        let set_cookie = session_cookie("s3cret", issued).unwrap();
        let headers = headers_with_cookie(set_cookie.split(';').next().unwrap());
        assert!(!is_authenticated(&headers, "s3cret"));
    }

    #[test]
    fn test_missing_cookie_rejected() {
        assert!(!is_authenticated(&HeaderMap::new(), "s3cret"));
        assert!(!is_authenticated(&headers_with_cookie("gallery_session=true"), "s3cret"));
    }

    #[test]
    fn test_password_matches() {
        assert!(password_matches("hunter2", "hunter2"));
        assert!(!password_matches("hunter2", "hunter3"));
        assert!(!password_matches("hunter2", "hunter"));
        assert!(!password_matches("", ""));
    }

    #[test]
    fn test_generated_secrets_differ() {
        assert_ne!(generate_secret(), generate_secret());
        assert_eq!(generate_secret().len(), 43);
    }
}
