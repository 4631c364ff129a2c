//! Speech synthesis requests.

use std::time::Duration;

use reqwest::Url;

use super::SpeechError;

/// Text type used for every prefetched instruction.
pub const SSML_TEXT_TYPE: &str = "ssml";

/// Audio format requested from the speech endpoint.
pub const OUTPUT_FORMAT: &str = "mp3";

/// Cache directives attached to a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    /// Accept a stored response this far past its freshness lifetime.
    pub max_stale: Option<Duration>,
}

impl CacheControl {
    /// Directives accepting responses up to `max_stale` past freshness.
    pub fn max_stale(max_stale: Duration) -> Self {
        Self {
            max_stale: Some(max_stale),
        }
    }
}

/// A request for one synthesized instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechRequest {
    /// Exact instruction text sent to the endpoint.
    pub instruction: String,
    /// Text type of `instruction`.
    pub text_type: String,
    /// Announcement language.
    pub language: String,
    /// Canonical request URL, also the cache key.
    pub url: String,
    /// Cache directives.
    pub cache_control: CacheControl,
}

/// Builds canonical speech requests for one session.
///
/// The URL has the form
/// `{base}/voice/v1/speak/{instruction}?textType=ssml&language={lang}&outputFormat=mp3&access_token={token}`.
#[derive(Debug, Clone)]
pub struct SpeechRequestBuilder {
    base_url: Url,
    language: String,
    access_token: String,
}

impl SpeechRequestBuilder {
    /// Create a builder for the given endpoint.
    ///
    /// # Errors
    ///
    /// Returns `SpeechError::InvalidUrl` if `base_url` cannot be parsed or
    /// cannot carry path segments.
    pub fn new(
        base_url: &str,
        language: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self, SpeechError> {
        let base_url =
            Url::parse(base_url).map_err(|e| SpeechError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(SpeechError::InvalidUrl(base_url.to_string()));
        }

        Ok(Self {
            base_url,
            language: language.into(),
            access_token: access_token.into(),
        })
    }

    /// Announcement language of built requests.
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Canonical URL for `instruction`.
    pub fn url_for(&self, instruction: &str) -> Result<String, SpeechError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SpeechError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["voice", "v1", "speak", instruction]);
        url.query_pairs_mut()
            .clear()
            .append_pair("textType", SSML_TEXT_TYPE)
            .append_pair("language", &self.language)
            .append_pair("outputFormat", OUTPUT_FORMAT)
            .append_pair("access_token", &self.access_token);
        Ok(url.into())
    }

    /// Build the request for `instruction`.
    pub fn build(&self, instruction: &str) -> Result<SpeechRequest, SpeechError> {
        Ok(SpeechRequest {
            instruction: instruction.to_string(),
            text_type: SSML_TEXT_TYPE.to_string(),
            language: self.language.clone(),
            url: self.url_for(instruction)?,
            cache_control: CacheControl::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> SpeechRequestBuilder {
        SpeechRequestBuilder::new("https://api.example.com", "en-US", "tok").unwrap()
    }

    #[test]
    fn test_url_form() {
        let url = builder().url_for("Turn left").unwrap();
        assert_eq!(
            url,
            "https://api.example.com/voice/v1/speak/Turn%20left?textType=ssml&language=en-US&outputFormat=mp3&access_token=tok"
        );
    }

    #[test]
    fn test_url_is_deterministic() {
        let b = builder();
        let ssml = "<speak><amazon:effect name=\"drc\">Head north</amazon:effect></speak>";
        assert_eq!(b.url_for(ssml).unwrap(), b.url_for(ssml).unwrap());
        assert_ne!(b.url_for(ssml).unwrap(), b.url_for("Head south").unwrap());
    }

    #[test]
    fn test_base_with_trailing_slash() {
        let b = SpeechRequestBuilder::new("https://api.example.com/", "de", "tok").unwrap();
        assert!(b
            .url_for("Links")
            .unwrap()
            .starts_with("https://api.example.com/voice/v1/speak/Links?"));
    }

    #[test]
    fn test_slash_in_instruction_stays_in_one_segment() {
        let url = builder().url_for("A/B").unwrap();
        assert!(url.contains("/speak/A%2FB?"));
    }

    #[test]
    fn test_build_sets_ssml_type() {
        let request = builder().build("<speak>Go</speak>").unwrap();
        assert_eq!(request.text_type, "ssml");
        assert_eq!(request.language, "en-US");
        assert_eq!(request.instruction, "<speak>Go</speak>");
        assert_eq!(request.cache_control.max_stale, None);
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            SpeechRequestBuilder::new("not a url", "en", "tok"),
            Err(SpeechError::InvalidUrl(_))
        ));
        assert!(matches!(
            SpeechRequestBuilder::new("mailto:someone@example.com", "en", "tok"),
            Err(SpeechError::InvalidUrl(_))
        ));
    }
}
