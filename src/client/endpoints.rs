//! URL construction for the measurement server's endpoint family

use crate::error::{AppError, Result};
use crate::models::ProgressiveSettings;
use url::Url;

/// Endpoint URLs relative to one server base
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base: Url,
}

impl Endpoints {
    /// Parse the base URL; a trailing slash is added so relative joins keep the path
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base = Url::parse(base_url)
            .map_err(|e| AppError::config(format!("Invalid server URL '{}': {}", base_url, e)))?;

        if base.cannot_be_a_base() {
            return Err(AppError::config(format!("Server URL cannot be used as a base: {}", base_url)));
        }

        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.set_query(None);
        base.set_fragment(None);

        Ok(Self { base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn join(&self, relative: &str) -> Result<Url> {
        self.base.join(relative).map_err(AppError::from)
    }

    pub fn warmup(&self) -> Result<Url> {
        self.join("warmup")
    }

    /// `ping?t=<client-ms>&seq=<n>`
    pub fn ping(&self, client_millis: i64, sequence: u32) -> Result<Url> {
        let mut url = self.join("ping")?;
        url.query_pairs_mut()
            .append_pair("t", &client_millis.to_string())
            .append_pair("seq", &sequence.to_string());
        Ok(url)
    }

    pub fn download_adaptive(&self, settings: &ProgressiveSettings) -> Result<Url> {
        let mut url = self.join("download-adaptive")?;
        url.query_pairs_mut()
            .append_pair("initial", &settings.initial_mb.to_string())
            .append_pair("max", &settings.max_mb.to_string())
            .append_pair("duration", &settings.duration_secs.to_string())
            .append_pair("pattern", &settings.pattern);
        Ok(url)
    }

    /// `download/<sizeMB>?pattern=random&connections=<n>`
    pub fn download(&self, size_mb: u32, connections: u32) -> Result<Url> {
        let mut url = self.join(&format!("download/{}", size_mb))?;
        url.query_pairs_mut()
            .append_pair("pattern", "random")
            .append_pair("connections", &connections.to_string());
        Ok(url)
    }

    pub fn upload(&self) -> Result<Url> {
        self.join("upload")
    }

    pub fn upload_multi(&self) -> Result<Url> {
        self.join("upload-multi")
    }

    pub fn info(&self) -> Result<Url> {
        self.join("info")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_without_trailing_slash_keeps_path() {
        let endpoints = Endpoints::new("https://speedserver.onrender.com/api").unwrap();
        assert_eq!(endpoints.warmup().unwrap().as_str(), "https://speedserver.onrender.com/api/warmup");
        assert_eq!(endpoints.upload_multi().unwrap().as_str(), "https://speedserver.onrender.com/api/upload-multi");
    }

    #[test]
    fn test_base_with_trailing_slash() {
        let endpoints = Endpoints::new("http://127.0.0.1:8080/").unwrap();
        assert_eq!(endpoints.info().unwrap().as_str(), "http://127.0.0.1:8080/info");
    }

    #[test]
    fn test_ping_query() {
        let endpoints = Endpoints::new("https://example.com/api").unwrap();
        let url = endpoints.ping(1700000000000, 3).unwrap();
        assert_eq!(url.as_str(), "https://example.com/api/ping?t=1700000000000&seq=3");
    }

    #[test]
    fn test_adaptive_download_query() {
        let endpoints = Endpoints::new("https://example.com/api").unwrap();
        let url = endpoints.download_adaptive(&ProgressiveSettings::default()).unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.com/api/download-adaptive?initial=1&max=10&duration=8&pattern=random"
        );
    }

    #[test]
    fn test_sized_download_query() {
        let endpoints = Endpoints::new("https://example.com/api").unwrap();
        let url = endpoints.download(5, 4).unwrap();
        assert_eq!(url.as_str(), "https://example.com/api/download/5?pattern=random&connections=4");
    }

    #[test]
    fn test_base_query_is_dropped() {
        let endpoints = Endpoints::new("https://example.com/api?token=abc").unwrap();
        assert_eq!(endpoints.upload().unwrap().as_str(), "https://example.com/api/upload");
    }

    #[test]
    fn test_invalid_base() {
        assert!(Endpoints::new("not a url").is_err());
        assert!(Endpoints::new("mailto:someone@example.com").is_err());
    }
}
