//! Audio stream options serialized into the connect URL.
//!
//! Every option is optional; only explicitly set fields appear in the query
//! string. Integer options reject zero at the setter, so a built value is
//! always serializable to a valid URL.

use url::form_urlencoded;

use crate::error::{DeepgramError, DeepgramResult};

/// Query-string options for a real-time transcription stream.
///
/// ```
/// use deepgram_pool::websocket::AudioStreamOptions;
///
/// let options = AudioStreamOptions::new()
///     .with_encoding("linear16")
///     .with_sample_rate(16000)?
///     .with_channels(1)?
///     .with_model("nova-2");
/// assert!(options.to_query_string().starts_with('?'));
/// # Ok::<(), deepgram_pool::DeepgramError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioStreamOptions {
    encoding: Option<String>,
    sample_rate: Option<u32>,
    channels: Option<u32>,
    language: Option<String>,
    model: Option<String>,
    punctuate: Option<bool>,
    interim_results: Option<bool>,
    diarize: Option<bool>,
    tier: Option<String>,
    version: Option<String>,
}

impl AudioStreamOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Audio encoding of the binary frames, e.g. `"linear16"`, `"opus"`.
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    /// Sample rate in Hz. Zero is rejected.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> DeepgramResult<Self> {
        if sample_rate == 0 {
            return Err(DeepgramError::InvalidArgument(
                "Sample rate must be positive".to_string(),
            ));
        }
        self.sample_rate = Some(sample_rate);
        Ok(self)
    }

    /// Number of audio channels. Zero is rejected.
    pub fn with_channels(mut self, channels: u32) -> DeepgramResult<Self> {
        if channels == 0 {
            return Err(DeepgramError::InvalidArgument(
                "Number of channels must be positive".to_string(),
            ));
        }
        self.channels = Some(channels);
        Ok(self)
    }

    /// Language code, e.g. `"en-US"`.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Model name, e.g. `"nova-2"`.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_punctuate(mut self, punctuate: bool) -> Self {
        self.punctuate = Some(punctuate);
        self
    }

    pub fn with_interim_results(mut self, interim_results: bool) -> Self {
        self.interim_results = Some(interim_results);
        self
    }

    pub fn with_diarize(mut self, diarize: bool) -> Self {
        self.diarize = Some(diarize);
        self
    }

    pub fn with_tier(mut self, tier: impl Into<String>) -> Self {
        self.tier = Some(tier.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    pub fn channels(&self) -> Option<u32> {
        self.channels
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn punctuate(&self) -> Option<bool> {
        self.punctuate
    }

    pub fn interim_results(&self) -> Option<bool> {
        self.interim_results
    }

    pub fn diarize(&self) -> Option<bool> {
        self.diarize
    }

    pub fn tier(&self) -> Option<&str> {
        self.tier.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(encoding) = &self.encoding {
            pairs.push(("encoding", encoding.clone()));
        }
        if let Some(sample_rate) = self.sample_rate {
            pairs.push(("sample_rate", sample_rate.to_string()));
        }
        if let Some(channels) = self.channels {
            pairs.push(("channels", channels.to_string()));
        }
        if let Some(language) = &self.language {
            pairs.push(("language", language.clone()));
        }
        if let Some(model) = &self.model {
            pairs.push(("model", model.clone()));
        }
        if let Some(punctuate) = self.punctuate {
            pairs.push(("punctuate", punctuate.to_string()));
        }
        if let Some(interim_results) = self.interim_results {
            pairs.push(("interim_results", interim_results.to_string()));
        }
        if let Some(diarize) = self.diarize {
            pairs.push(("diarize", diarize.to_string()));
        }
        if let Some(tier) = &self.tier {
            pairs.push(("tier", tier.clone()));
        }
        if let Some(version) = &self.version {
            pairs.push(("version", version.clone()));
        }
        pairs
    }

    /// Serialize to a `?key=value&…` query string, or an empty string when no
    /// option is set.
    pub fn to_query_string(&self) -> String {
        let pairs = self.query_pairs();
        if pairs.is_empty() {
            return String::new();
        }

        let joined = pairs
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("?{joined}")
    }

    /// Append the serialized options to `base_url`, respecting any query the
    /// base already carries.
    pub fn append_to_url(&self, base_url: &str) -> String {
        let pairs = self.query_pairs();
        if pairs.is_empty() {
            return base_url.to_string();
        }

        let joined = pairs
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");

        let separator = if !base_url.contains('?') {
            "?"
        } else if base_url.ends_with('?') || base_url.ends_with('&') {
            ""
        } else {
            "&"
        };
        format!("{base_url}{separator}{joined}")
    }

    /// Parse a query string (with or without the leading `?`) produced by
    /// [`to_query_string`](Self::to_query_string) back into options.
    pub fn from_query_string(query: &str) -> DeepgramResult<Self> {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut options = Self::new();
        if query.is_empty() {
            return Ok(options);
        }

        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            options = match key.as_ref() {
                "encoding" => options.with_encoding(value.as_ref()),
                "sample_rate" => options.with_sample_rate(parse_int(&key, &value)?)?,
                "channels" => options.with_channels(parse_int(&key, &value)?)?,
                "language" => options.with_language(value.as_ref()),
                "model" => options.with_model(value.as_ref()),
                "punctuate" => options.with_punctuate(parse_bool(&key, &value)?),
                "interim_results" => options.with_interim_results(parse_bool(&key, &value)?),
                "diarize" => options.with_diarize(parse_bool(&key, &value)?),
                "tier" => options.with_tier(value.as_ref()),
                "version" => options.with_version(value.as_ref()),
                other => {
                    return Err(DeepgramError::InvalidArgument(format!(
                        "Unrecognized stream option: {other}"
                    )));
                }
            };
        }
        Ok(options)
    }
}

fn parse_int(key: &str, value: &str) -> DeepgramResult<u32> {
    value.parse().map_err(|_| {
        DeepgramError::InvalidArgument(format!("Invalid integer for {key}: {value}"))
    })
}

fn parse_bool(key: &str, value: &str) -> DeepgramResult<bool> {
    value.parse().map_err(|_| {
        DeepgramError::InvalidArgument(format!("Invalid boolean for {key}: {value}"))
    })
}
