//! Parsing and validating the body of `POST /-/load`.

use serde_json::Value;
use url::Url;

use super::ApiError;

/// Longest accepted database name.
pub const MAX_NAME_LEN: usize = 64;

/// A validated load request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub url: String,
    pub name: String,
}

impl LoadRequest {
    /// Parses `{"url": ..., "name": ...}`. Missing, empty or non-string
    /// fields are reported together.
    pub fn from_body(body: &[u8]) -> Result<Self, ApiError> {
        let data: Value = serde_json::from_slice(body)
            .map_err(|e| ApiError::Validation(format!("Invalid JSON: {}", e)))?;
        let field = |key: &str| {
            data.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        match (field("url"), field("name")) {
            (Some(url), Some(name)) => Ok(LoadRequest { url, name }),
            _ => Err(ApiError::Validation(
                "Missing required parameters: url or name".to_string(),
            )),
        }
    }

    /// Applies the URL scheme and database name policies.
    pub fn validate(&self, allowed_schemes: &[String]) -> Result<(), ApiError> {
        validate_url(&self.url, allowed_schemes)?;
        validate_name(&self.name)
    }
}

pub fn validate_url(raw: &str, allowed_schemes: &[String]) -> Result<Url, ApiError> {
    let url = Url::parse(raw).map_err(|e| ApiError::Validation(format!("Invalid URL: {}", e)))?;
    if !allowed_schemes
        .iter()
        .any(|s| s.eq_ignore_ascii_case(url.scheme()))
    {
        return Err(ApiError::Validation(format!(
            "URL scheme \"{}\" is not allowed",
            url.scheme()
        )));
    }
    Ok(url)
}

/// Names become file names: `[A-Za-z0-9][A-Za-z0-9_-]*`, at most 64 chars.
pub fn validate_name(name: &str) -> Result<(), ApiError> {
    let mut chars = name.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_alphanumeric());
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if first_ok && rest_ok && name.len() <= MAX_NAME_LEN {
        Ok(())
    } else {
        Err(ApiError::Validation("Invalid database name".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schemes() -> Vec<String> {
        vec!["http".to_string(), "https".to_string()]
    }

    fn message(err: ApiError) -> String {
        err.to_string()
    }

    #[test]
    fn parses_valid_body() {
        let req =
            LoadRequest::from_body(br#"{"url": "https://example.test/x.db", "name": "tils"}"#)
                .unwrap();
        assert_eq!(req.url, "https://example.test/x.db");
        assert_eq!(req.name, "tils");
        assert!(req.validate(&schemes()).is_ok());
    }

    #[test]
    fn invalid_json() {
        let err = LoadRequest::from_body(b"{not json").unwrap_err();
        assert!(message(err).starts_with("Invalid JSON: "));
    }

    #[test]
    fn missing_or_empty_fields() {
        for body in [
            r#"{"url": "https://example.test/x.db"}"#,
            r#"{"name": "tils"}"#,
            r#"{"url": "", "name": "tils"}"#,
            r#"{"url": "https://example.test/x.db", "name": "   "}"#,
            r#"{"url": 5, "name": "tils"}"#,
            r#"["https://example.test/x.db", "tils"]"#,
        ] {
            let err = LoadRequest::from_body(body.as_bytes()).unwrap_err();
            assert_eq!(message(err), "Missing required parameters: url or name", "{body}");
        }
    }

    #[test]
    fn scheme_policy() {
        assert!(validate_url("http://example.test/a.db", &schemes()).is_ok());
        assert!(validate_url("HTTPS://example.test/a.db", &schemes()).is_ok());
        assert_eq!(
            message(validate_url("ftp://example.test/a.db", &schemes()).unwrap_err()),
            "URL scheme \"ftp\" is not allowed"
        );
        assert_eq!(
            message(validate_url("file:///etc/passwd", &schemes()).unwrap_err()),
            "URL scheme \"file\" is not allowed"
        );
        assert!(message(validate_url("not a url", &schemes()).unwrap_err())
            .starts_with("Invalid URL: "));
    }

    #[test]
    fn name_policy() {
        for ok in ["tils", "from_zip", "db-2024", "A1", "a".repeat(64).as_str()] {
            assert!(validate_name(ok).is_ok(), "{ok}");
        }
        for bad in ["", "_x", "-x", "../etc", "a/b", "a.db", "naïve", "a".repeat(65).as_str()] {
            assert!(validate_name(bad).is_err(), "{bad}");
        }
    }
}
