//! Remote manifest retrieval.
//!
//! Manifests stored on the service are addressed by path and served by the
//! content store's byte-retrieval endpoint; the bytes are parsed by the
//! caller ([`crate::manifest::ManifestStore::initialize`]).

use std::io::Read;

use crate::error::ManifestError;

/// Source of manifest bytes on the remote service.
pub trait ManifestFetcher {
    /// Download the resource at `remote_path` (e.g.
    /// `/dxconfig/manifests/release.json`).
    fn fetch(&self, remote_path: &str) -> Result<Vec<u8>, ManifestError>;
}

/// [`ManifestFetcher`] over the delivery `resources` endpoint.
#[derive(Debug, Clone)]
pub struct HttpManifestFetcher {
    base_url: String,
    bearer_token: Option<String>,
    agent: ureq::Agent,
}

impl HttpManifestFetcher {
    /// `base_url` is the tenant API root, e.g.
    /// `https://content.example.com/api/<tenant>`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            bearer_token: None,
            agent: ureq::AgentBuilder::new().build(),
        }
    }

    /// Token obtained by the (external) login flow.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn resources_url(&self) -> String {
        format!(
            "{}/delivery/v1/resources",
            self.base_url.trim_end_matches('/')
        )
    }
}

impl ManifestFetcher for HttpManifestFetcher {
    fn fetch(&self, remote_path: &str) -> Result<Vec<u8>, ManifestError> {
        let mut request = self
            .agent
            .get(&self.resources_url())
            .query("path", remote_path);
        if let Some(token) = &self.bearer_token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }

        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(404, _)) => {
                return Err(ManifestError::NotFound {
                    location: remote_path.to_owned(),
                })
            }
            Err(err) => {
                return Err(ManifestError::Fetch {
                    location: remote_path.to_owned(),
                    reason: err.to_string(),
                })
            }
        };

        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| ManifestError::Fetch {
                location: remote_path.to_owned(),
                reason: e.to_string(),
            })?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resources_url_trims_trailing_slash() {
        let fetcher = HttpManifestFetcher::new("https://content.example.com/api/t1/");
        assert_eq!(
            fetcher.resources_url(),
            "https://content.example.com/api/t1/delivery/v1/resources"
        );
    }

    #[test]
    fn unreachable_host_is_a_fetch_error() {
        let fetcher = HttpManifestFetcher::new("http://127.0.0.1:9");
        match fetcher.fetch("/dxconfig/manifests/x.json") {
            Err(ManifestError::Fetch { location, .. }) => {
                assert_eq!(location, "/dxconfig/manifests/x.json")
            }
            other => panic!("expected fetch error, got {other:?}"),
        }
    }
}
