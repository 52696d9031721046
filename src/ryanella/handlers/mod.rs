pub mod health;
pub use self::health::health;

pub mod login;
pub use self::login::login;

pub mod forgot_password;
pub use self::forgot_password::forgot_password;

pub mod reset_password;
pub use self::reset_password::reset_password;

pub mod users;
pub use self::users::{create_user, list_users, update_user};

// common functions for the handlers
use axum::http::HeaderMap;
use regex::Regex;

pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").map_or(false, |re| re.is_match(email))
}

/// Canonical form for every stored or looked-up email: trimmed, lowercased.
/// Login, account creation, and password recovery all go through this, so an
/// address matches regardless of how the caller cased it.
pub(crate) fn canonical_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Client IP for the activity trail, taken from common proxy headers.
pub(crate) fn client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn canonical_email_is_trimmed_and_lowercased() {
        assert_eq!(canonical_email(" Admin@Shop.com "), "admin@shop.com");
        assert_eq!(canonical_email("admin@shop.com"), "admin@shop.com");
    }

    #[test]
    fn client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));

        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn client_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));

        assert_eq!(client_ip(&headers).as_deref(), Some("10.0.0.2"));
        assert_eq!(client_ip(&HeaderMap::new()), None);
    }
}
