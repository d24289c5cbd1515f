//! URL utilities for consistent URL handling
//!
//! This module provides utilities for normalizing URLs to prevent issues
//! with trailing slashes when constructing API endpoints.

/// Normalize a base URL by removing trailing slashes
///
/// This ensures consistent URL construction when appending endpoints,
/// preventing double slashes in the final URLs.
///
/// # Examples
///
/// ```
/// use gaod::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("https://api.example.com/v1"), "https://api.example.com/v1");
/// assert_eq!(normalize_base_url("https://api.example.com/v1/"), "https://api.example.com/v1");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Construct a complete API endpoint URL from a base URL and endpoint path
///
/// Normalizes the base URL and safely appends the endpoint so there are no
/// double slashes in the result.
///
/// # Examples
///
/// ```
/// use gaod::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://api.openai.com/v1", "chat/completions"),
///     "https://api.openai.com/v1/chat/completions"
/// );
/// assert_eq!(
///     construct_api_url("https://api.openai.com/v1/", "/chat/completions"),
///     "https://api.openai.com/v1/chat/completions"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("https://db.example.com/"),
            "https://db.example.com"
        );
        assert_eq!(
            normalize_base_url("https://db.example.com///"),
            "https://db.example.com"
        );
        assert_eq!(normalize_base_url(""), "");
    }

    #[test]
    fn test_construct_api_url() {
        assert_eq!(
            construct_api_url("https://api.openai.com/v1", "images/generations"),
            "https://api.openai.com/v1/images/generations"
        );
        assert_eq!(
            construct_api_url("https://db.example.com/", "/rest/v1/kv"),
            "https://db.example.com/rest/v1/kv"
        );
        assert_eq!(
            construct_api_url(
                "https://generativelanguage.googleapis.com",
                "v1beta/models/gemini-2.5-flash-lite:streamGenerateContent"
            ),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash-lite:streamGenerateContent"
        );
    }
}
