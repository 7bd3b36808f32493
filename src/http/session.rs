//! Session cookie handling.
//!
//! A session id is a UUID carried in the `chatrelay_session` cookie. Requests
//! without a parseable id get a fresh one plus a `Set-Cookie` header.

use axum::http::{HeaderMap, HeaderValue, header};
use uuid::Uuid;

use crate::conversation::SessionId;

pub const SESSION_COOKIE: &str = "chatrelay_session";

/// Session id for this request, and the `Set-Cookie` value when it is new.
pub fn resolve(headers: &HeaderMap) -> (SessionId, Option<HeaderValue>) {
    if let Some(id) = from_cookies(headers) {
        return (id, None);
    }
    let id = SessionId::generate();
    (id.clone(), set_cookie(&id))
}

fn from_cookies(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
        .map(|uuid| SessionId::new(uuid.to_string()))
}

fn set_cookie(id: &SessionId) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax"
    ))
    .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(cookie: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        h
    }

    #[test]
    fn existing_cookie_is_reused() {
        let id = "6f1c2d7e-58f4-4a0e-9d3b-2a1f0c9e8b7a";
        let (session, set) = resolve(&headers(&format!("theme=dark; {SESSION_COOKIE}={id}")));
        assert_eq!(session.as_str(), id);
        assert!(set.is_none());
    }

    #[test]
    fn missing_cookie_issues_new_session() {
        let (session, set) = resolve(&HeaderMap::new());
        assert!(Uuid::parse_str(session.as_str()).is_ok());
        let set = set.unwrap();
        let set = set.to_str().unwrap();
        assert!(set.starts_with(&format!("{SESSION_COOKIE}={session}")));
        assert!(set.contains("HttpOnly"));
    }

    #[test]
    fn malformed_cookie_is_replaced() {
        let (session, set) = resolve(&headers(&format!("{SESSION_COOKIE}=../../etc/passwd")));
        assert_ne!(session.as_str(), "../../etc/passwd");
        assert!(set.is_some());
    }
}
