//! Supabase session cookies.
//!
//! Current clients store the session under `sb-<project-ref>-auth-token`,
//! optionally split across `.0`, `.1`, ... chunks and optionally encoded as
//! `base64-<payload>`. Older clients used a bare `sb-access-token`.

use base64::{engine::general_purpose, Engine as _};
use serde_json::Value;
use url::Url;

const LEGACY_ACCESS_COOKIE: &str = "sb-access-token";
const LEGACY_REFRESH_COOKIE: &str = "sb-refresh-token";
const BASE64_PREFIX: &str = "base64-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// `https://abcd.supabase.co` -> `abcd`
pub fn project_ref_from_url(supabase_url: &str) -> Option<String> {
    let url = Url::parse(supabase_url).ok()?;
    let host = url.host_str()?;
    let first = host.split('.').next()?;
    if first.is_empty() {
        None
    } else {
        Some(first.to_string())
    }
}

fn parse_cookies(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}

fn cookie<'a>(cookies: &'a [(String, String)], name: &str) -> Option<&'a str> {
    cookies
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

/// Value of `name`, reassembling `.0`, `.1`, ... chunks when present.
fn combined_cookie(cookies: &[(String, String)], name: &str) -> Option<String> {
    if let Some(value) = cookie(cookies, name) {
        return Some(value.to_string());
    }
    let mut combined = String::new();
    let mut index = 0;
    while let Some(chunk) = cookie(cookies, &format!("{}.{}", name, index)) {
        combined.push_str(chunk);
        index += 1;
    }
    if index == 0 {
        None
    } else {
        Some(combined)
    }
}

fn decode_value(raw: &str) -> Option<String> {
    let raw = urlencoding::decode(raw).ok()?.into_owned();
    match raw.strip_prefix(BASE64_PREFIX) {
        Some(encoded) => {
            let trimmed = encoded.trim_end_matches('=');
            let bytes = general_purpose::URL_SAFE_NO_PAD
                .decode(trimmed)
                .or_else(|_| general_purpose::STANDARD.decode(encoded))
                .ok()?;
            String::from_utf8(bytes).ok()
        }
        None => Some(raw),
    }
}

fn tokens_from_json(value: &Value) -> Option<SessionTokens> {
    match value {
        Value::Object(map) => {
            let access_token = map.get("access_token")?.as_str()?.to_string();
            let refresh_token = map
                .get("refresh_token")
                .and_then(Value::as_str)
                .map(str::to_string);
            Some(SessionTokens {
                access_token,
                refresh_token,
            })
        }
        // Older helpers stored `[access_token, refresh_token, ...]`.
        Value::Array(items) => {
            let access_token = items.first()?.as_str()?.to_string();
            let refresh_token = items.get(1).and_then(Value::as_str).map(str::to_string);
            Some(SessionTokens {
                access_token,
                refresh_token,
            })
        }
        _ => None,
    }
}

/// Pull the session tokens out of a `Cookie` header.
///
/// With `project_ref` set only that project's cookie is considered;
/// otherwise the first `sb-*-auth-token` cookie wins.
pub fn extract_session(cookie_header: &str, project_ref: Option<&str>) -> Option<SessionTokens> {
    let cookies = parse_cookies(cookie_header);

    let name = match project_ref {
        Some(project_ref) => Some(format!("sb-{}-auth-token", project_ref)),
        None => cookies.iter().find_map(|(key, _)| {
            let base = key.split('.').next().unwrap_or(key);
            (base.starts_with("sb-") && base.ends_with("-auth-token")).then(|| base.to_string())
        }),
    };

    if let Some(name) = name {
        if let Some(raw) = combined_cookie(&cookies, &name) {
            if let Some(decoded) = decode_value(&raw) {
                if let Ok(json) = serde_json::from_str::<Value>(&decoded) {
                    if let Some(tokens) = tokens_from_json(&json) {
                        return Some(tokens);
                    }
                }
            }
        }
    }

    let access_token = cookie(&cookies, LEGACY_ACCESS_COOKIE)?;
    if access_token.is_empty() {
        return None;
    }
    Some(SessionTokens {
        access_token: access_token.to_string(),
        refresh_token: cookie(&cookies, LEGACY_REFRESH_COOKIE).map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_ref_from_url() {
        assert_eq!(
            project_ref_from_url("https://abcd.supabase.co"),
            Some("abcd".to_string())
        );
        assert_eq!(project_ref_from_url("not a url"), None);
    }

    #[test]
    fn test_plain_json_cookie() {
        let value = urlencoding::encode(r#"{"access_token":"at","refresh_token":"rt"}"#);
        let header = format!("theme=dark; sb-abcd-auth-token={}", value);
        let tokens = extract_session(&header, Some("abcd")).unwrap();
        assert_eq!(tokens.access_token, "at");
        assert_eq!(tokens.refresh_token.as_deref(), Some("rt"));
    }

    #[test]
    fn test_chunked_base64_cookie() {
        let encoded = general_purpose::URL_SAFE_NO_PAD
            .encode(r#"{"access_token":"chunked-token","refresh_token":"r"}"#);
        let (first, second) = encoded.split_at(10);
        let header = format!(
            "sb-abcd-auth-token.0={}{}; sb-abcd-auth-token.1={}",
            BASE64_PREFIX, first, second
        );
        let tokens = extract_session(&header, None).unwrap();
        assert_eq!(tokens.access_token, "chunked-token");
    }

    #[test]
    fn test_array_cookie() {
        let value = urlencoding::encode(r#"["at","rt",null,null]"#);
        let header = format!("sb-abcd-auth-token={}", value);
        let tokens = extract_session(&header, None).unwrap();
        assert_eq!(tokens.access_token, "at");
    }

    #[test]
    fn test_legacy_cookie() {
        let tokens = extract_session("sb-access-token=legacy; sb-refresh-token=r", None).unwrap();
        assert_eq!(tokens.access_token, "legacy");
        assert_eq!(tokens.refresh_token.as_deref(), Some("r"));
    }

    #[test]
    fn test_other_project_ignored() {
        let value = urlencoding::encode(r#"{"access_token":"at"}"#);
        let header = format!("sb-other-auth-token={}", value);
        assert_eq!(extract_session(&header, Some("abcd")), None);
    }

    #[test]
    fn test_no_cookie() {
        assert_eq!(extract_session("", None), None);
    }
}
