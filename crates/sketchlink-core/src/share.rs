//! Share links: the token travels in the URL fragment.

use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ShareError {
    #[error("Invalid share URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Share URL has no drawing in its fragment")]
    MissingFragment,
}

pub type ShareResult<T> = Result<T, ShareError>;

/// Build `base#token`, replacing any fragment already on `base`.
pub fn share_url(base: &str, token: &str) -> ShareResult<Url> {
    let mut url = Url::parse(base)?;
    url.set_fragment(Some(token));
    Ok(url)
}

/// Extract the token from a share URL, or accept a bare token (with or
/// without a leading `#`).
pub fn token_from_url(input: &str) -> ShareResult<String> {
    let input = input.trim();
    match Url::parse(input) {
        Ok(url) => url
            .fragment()
            .filter(|fragment| !fragment.is_empty())
            .map(str::to_string)
            .ok_or(ShareError::MissingFragment),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let token = input.strip_prefix('#').unwrap_or(input);
            if token.is_empty() {
                Err(ShareError::MissingFragment)
            } else {
                Ok(token.to_string())
            }
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_share_url_sets_fragment() {
        let url = share_url("https://draw.example.com/app#old", "eJzT0yMAAGTvBe8=").unwrap();
        assert_eq!(url.as_str(), "https://draw.example.com/app#eJzT0yMAAGTvBe8=");
    }

    #[test]
    fn test_token_from_url() {
        let token = token_from_url("https://draw.example.com/#eJwrSS0u0c1IzcnJBwAT8ARQ").unwrap();
        assert_eq!(token, "eJwrSS0u0c1IzcnJBwAT8ARQ");
    }

    #[test]
    fn test_bare_token() {
        assert_eq!(token_from_url("#abc+/=").unwrap(), "abc+/=");
        assert_eq!(token_from_url("abc+/=").unwrap(), "abc+/=");
    }

    #[test]
    fn test_missing_fragment() {
        assert!(matches!(token_from_url("https://draw.example.com/"), Err(ShareError::MissingFragment)));
        assert!(matches!(token_from_url("#"), Err(ShareError::MissingFragment)));
    }

    #[test]
    fn test_invalid_base() {
        assert!(matches!(share_url("not a url", "abc"), Err(ShareError::InvalidUrl(_))));
    }
}
