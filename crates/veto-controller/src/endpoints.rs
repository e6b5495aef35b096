use crate::error::ControllerError;
use url::Url;

/// Builds backend URLs from a single base, keeping any path prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base: Url,
}

impl Endpoints {
    pub fn new(base: Url) -> Result<Self, ControllerError> {
        match base.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ControllerError::InvalidUrl(format!(
                    "unsupported scheme '{other}' in {base}"
                )))
            }
        }
        if base.cannot_be_a_base() {
            return Err(ControllerError::InvalidUrl(base.to_string()));
        }
        Ok(Self { base })
    }

    pub fn parse(raw: &str) -> Result<Self, ControllerError> {
        let base = Url::parse(raw.trim())
            .map_err(|err| ControllerError::InvalidUrl(format!("{raw}: {err}")))?;
        Self::new(base)
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn health(&self) -> Result<Url, ControllerError> {
        self.join(&["api", "health"])
    }

    pub fn create_session(&self) -> Result<Url, ControllerError> {
        self.join(&["api", "session"])
    }

    pub fn approve(&self, session_id: &str, approval_id: &str) -> Result<Url, ControllerError> {
        self.join(&["api", "session", session_id, "approve", approval_id])
    }

    pub fn stop(&self, session_id: &str) -> Result<Url, ControllerError> {
        self.join(&["api", "session", session_id, "stop"])
    }

    /// Realtime channel URL; `https` backends upgrade to `wss`.
    pub fn channel(&self, session_id: &str) -> Result<Url, ControllerError> {
        let mut url = self.join(&["ws", session_id])?;
        let scheme = if self.base.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| ControllerError::InvalidUrl(format!("cannot use {scheme} for {url}")))?;
        Ok(url)
    }

    fn join(&self, segments: &[&str]) -> Result<Url, ControllerError> {
        let mut url = self.base.clone();
        url.set_query(None);
        url.set_fragment(None);
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ControllerError::InvalidUrl(self.base.to_string()))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_backend_routes() {
        let endpoints = Endpoints::parse("http://127.0.0.1:8000").expect("endpoints");
        assert_eq!(
            endpoints.create_session().expect("create").as_str(),
            "http://127.0.0.1:8000/api/session"
        );
        assert_eq!(
            endpoints.approve("s-1", "ap-9").expect("approve").as_str(),
            "http://127.0.0.1:8000/api/session/s-1/approve/ap-9"
        );
        assert_eq!(
            endpoints.stop("s-1").expect("stop").as_str(),
            "http://127.0.0.1:8000/api/session/s-1/stop"
        );
        assert_eq!(
            endpoints.health().expect("health").as_str(),
            "http://127.0.0.1:8000/api/health"
        );
    }

    #[test]
    fn channel_scheme_follows_backend_security() {
        let plain = Endpoints::parse("http://localhost:8000/").expect("plain");
        assert_eq!(
            plain.channel("abc").expect("ws").as_str(),
            "ws://localhost:8000/ws/abc"
        );
        let secure = Endpoints::parse("https://demo.runveto.com/console/").expect("secure");
        assert_eq!(
            secure.channel("abc").expect("wss").as_str(),
            "wss://demo.runveto.com/console/ws/abc"
        );
    }

    #[test]
    fn ids_are_percent_encoded_as_path_segments() {
        let endpoints = Endpoints::parse("http://localhost:8000").expect("endpoints");
        assert_eq!(
            endpoints.approve("s 1", "a/b").expect("approve").as_str(),
            "http://localhost:8000/api/session/s%201/approve/a%2Fb"
        );
    }

    #[test]
    fn rejects_non_http_base() {
        assert!(matches!(
            Endpoints::parse("ftp://example.com"),
            Err(ControllerError::InvalidUrl(_))
        ));
        assert!(Endpoints::parse("not a url").is_err());
    }
}
