//! URL syntax validation

use url::Url;

use crate::traits::UrlValidator;

/// Accepts absolute `http`/`https` URLs with a host
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlSyntaxValidator;

impl UrlValidator for UrlSyntaxValidator {
    fn validate(&self, url: &str) -> Result<(), String> {
        let parsed = Url::parse(url).map_err(|e| e.to_string())?;

        match parsed.scheme() {
            "http" | "https" => {}
            other => return Err(format!("unsupported scheme: {other}")),
        }

        if parsed.host_str().is_none_or(str::is_empty) {
            return Err("missing host".to_string());
        }

        Ok(())
    }
}
