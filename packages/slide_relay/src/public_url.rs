//! Externally reachable URLs handed to hosts for their QR codes.

use crate::config::PublicUrlConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicUrl {
    base: String,
}

impl PublicUrl {
    /// Pick the base URL a phone should open.
    ///
    /// Production on Vercel uses the deployment host over https, then an
    /// explicit base URL wins, then production falls back to this server's
    /// own port and development to the frontend dev server.
    pub fn resolve(config: &PublicUrlConfig, port: u16) -> Self {
        let base = match (config.production, &config.vercel_url, &config.base_url) {
            (true, Some(vercel), _) => format!("https://{}", vercel.trim_start_matches("https://")),
            (_, _, Some(base)) => base.clone(),
            (true, None, None) => format!("http://localhost:{port}"),
            (false, _, None) => config.dev_frontend_url.clone(),
        };
        Self::from_base(base)
    }

    pub fn from_base(base: impl Into<String>) -> Self {
        let base: String = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// The remote-control page for a session.
    pub fn remote_url(&self, session_id: &str) -> String {
        format!("{}/remote/{}", self.base, session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(production: bool, base: Option<&str>, vercel: Option<&str>) -> PublicUrlConfig {
        PublicUrlConfig {
            production,
            base_url: base.map(String::from),
            vercel_url: vercel.map(String::from),
            dev_frontend_url: "http://localhost:5173".into(),
        }
    }

    #[test]
    fn test_vercel_wins_in_production() {
        let url = PublicUrl::resolve(
            &config(true, Some("https://slides.example"), Some("slides.vercel.app")),
            3001,
        );
        assert_eq!(url.base(), "https://slides.vercel.app");
    }

    #[test]
    fn test_vercel_ignored_in_development() {
        let url = PublicUrl::resolve(&config(false, None, Some("slides.vercel.app")), 3001);
        assert_eq!(url.base(), "http://localhost:5173");
    }

    #[test]
    fn test_explicit_base_url() {
        let url = PublicUrl::resolve(&config(false, Some("http://10.0.0.5:3001/"), None), 3001);
        assert_eq!(url.remote_url("abc12345"), "http://10.0.0.5:3001/remote/abc12345");
    }

    #[test]
    fn test_production_falls_back_to_own_port() {
        let url = PublicUrl::resolve(&config(true, None, None), 8080);
        assert_eq!(url.base(), "http://localhost:8080");
    }
}
