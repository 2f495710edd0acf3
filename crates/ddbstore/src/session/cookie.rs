//! Request `Cookie` parsing and response `Set-Cookie` rendering.

use cookie::time::{Duration, OffsetDateTime};
use cookie::Cookie;
use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderValue};

use super::{SameSite, SessionOptions};
use crate::error::SessionError;

/// Value of the first request cookie called `name`.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|c| c.name() == name)
        .map(|c| c.value().to_string())
}

/// Render a `Set-Cookie` value. A max-age `<= 0` produces an already-expired
/// cookie so the client drops it.
pub fn build_cookie(name: &str, value: &str, options: &SessionOptions) -> Cookie<'static> {
    let mut builder = Cookie::build((name.to_string(), value.to_string()))
        .path(options.path.clone())
        .secure(options.secure)
        .http_only(options.http_only);

    if let Some(domain) = &options.domain {
        builder = builder.domain(domain.clone());
    }
    if let Some(same_site) = options.same_site {
        builder = builder.same_site(match same_site {
            SameSite::Strict => cookie::SameSite::Strict,
            SameSite::Lax => cookie::SameSite::Lax,
            SameSite::None => cookie::SameSite::None,
        });
    }

    if options.max_age > 0 {
        let max_age = Duration::seconds(options.max_age);
        builder = builder
            .max_age(max_age)
            .expires(OffsetDateTime::now_utc() + max_age);
    } else {
        builder = builder
            .max_age(Duration::ZERO)
            .expires(OffsetDateTime::UNIX_EPOCH);
    }

    builder.build()
}

/// Append a `Set-Cookie` header to a response.
pub fn write_cookie(
    headers: &mut HeaderMap,
    name: &str,
    value: &str,
    options: &SessionOptions,
) -> Result<(), SessionError> {
    let rendered = build_cookie(name, value, options).to_string();
    let header = HeaderValue::from_str(&rendered)
        .map_err(|e| SessionError::InvalidHeader(format!("{name}: {e}")))?;
    headers.append(SET_COOKIE, header);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("a=1; sid=abc; b=2"));
        assert_eq!(read_cookie(&headers, "sid").as_deref(), Some("abc"));
        assert_eq!(read_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_read_cookie_across_headers() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("a=1"));
        headers.append(COOKIE, HeaderValue::from_static("sid=xyz"));
        assert_eq!(read_cookie(&headers, "sid").as_deref(), Some("xyz"));
    }

    #[test]
    fn test_build_cookie_attributes() {
        let options = SessionOptions {
            domain: Some("example.com".into()),
            secure: true,
            max_age: 600,
            ..Default::default()
        };
        let cookie = build_cookie("sid", "token", &options);
        assert_eq!(cookie.name(), "sid");
        assert_eq!(cookie.value(), "token");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.domain(), Some("example.com"));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(cookie::SameSite::Lax));
        assert_eq!(cookie.max_age(), Some(Duration::seconds(600)));
    }

    #[test]
    fn test_build_expired_cookie() {
        let options = SessionOptions {
            max_age: -1,
            ..Default::default()
        };
        let cookie = build_cookie("sid", "", &options);
        assert_eq!(cookie.max_age(), Some(Duration::ZERO));
        let rendered = cookie.to_string();
        assert!(rendered.contains("Max-Age=0"));
        assert!(rendered.contains("1970"));
    }

    #[test]
    fn test_write_cookie_appends() {
        let mut headers = HeaderMap::new();
        write_cookie(&mut headers, "a", "1", &SessionOptions::default()).unwrap();
        write_cookie(&mut headers, "b", "2", &SessionOptions::default()).unwrap();
        assert_eq!(headers.get_all(SET_COOKIE).iter().count(), 2);
    }
}
