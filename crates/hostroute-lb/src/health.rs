use hostroute_core::{Candidate, ConfigurationError, PoolConfig};
use std::time::Duration;
use url::Url;

pub struct HealthCheckConfig {
    pub path: String,
    pub timeout: Duration,
    pub accept_invalid_certs: bool,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            path: "/card".to_string(),
            timeout: Duration::from_secs(3),
            accept_invalid_certs: false,
        }
    }
}

impl From<&PoolConfig> for HealthCheckConfig {
    fn from(cfg: &PoolConfig) -> Self {
        Self {
            path: cfg.probe_path.clone(),
            timeout: cfg.probe_timeout(),
            accept_invalid_certs: cfg.accept_invalid_certs,
        }
    }
}

/// Validate a candidate's URL before any network call is made to it.
pub fn candidate_url(candidate: &Candidate) -> Result<Url, ConfigurationError> {
    let raw = match candidate.url.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => raw,
        _ => {
            return Err(ConfigurationError::MissingUrl {
                candidate: candidate.name.clone(),
            })
        }
    };

    let url = Url::parse(raw).map_err(|e| ConfigurationError::InvalidUrl {
        candidate: candidate.name.clone(),
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ConfigurationError::UnsupportedScheme {
                candidate: candidate.name.clone(),
                url: raw.to_string(),
                scheme: other.to_string(),
            })
        }
    }

    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(ConfigurationError::InvalidUrl {
            candidate: candidate.name.clone(),
            url: raw.to_string(),
            reason: "missing host".to_string(),
        });
    }

    Ok(url)
}

/// `{base}{path}` with exactly one slash between them.
pub fn join_path(base: &Url, path: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(url: Option<&str>) -> Candidate {
        Candidate {
            name: "W1".into(),
            agent_id: "id-1".into(),
            url: url.map(str::to_string),
            score: 0.9,
            version: "1.0".into(),
            description: None,
        }
    }

    #[test]
    fn accepts_http_and_https() {
        assert!(candidate_url(&candidate(Some("http://h1:9000"))).is_ok());
        assert!(candidate_url(&candidate(Some("https://h1/agent"))).is_ok());
    }

    #[test]
    fn rejects_missing_and_blank_urls() {
        assert!(matches!(
            candidate_url(&candidate(None)),
            Err(ConfigurationError::MissingUrl { .. })
        ));
        assert!(matches!(
            candidate_url(&candidate(Some("   "))),
            Err(ConfigurationError::MissingUrl { .. })
        ));
    }

    #[test]
    fn rejects_other_schemes_and_garbage() {
        assert!(matches!(
            candidate_url(&candidate(Some("ftp://h1/x"))),
            Err(ConfigurationError::UnsupportedScheme { ref scheme, .. }) if scheme == "ftp"
        ));
        assert!(matches!(
            candidate_url(&candidate(Some("not a url"))),
            Err(ConfigurationError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn join_path_normalises_slashes() {
        let base = Url::parse("http://h1:9000/agent/").unwrap();
        assert_eq!(join_path(&base, "/card"), "http://h1:9000/agent/card");
        let root = Url::parse("http://h1:9000").unwrap();
        assert_eq!(join_path(&root, "messages"), "http://h1:9000/messages");
    }
}
