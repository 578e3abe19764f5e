//! Wiki-host repository: raw-content URLs of the shape
//! `https://raw.<host>/<author>/<name>/<version>/<file-path>`, grounded on
//! `repository/github-repository.c`. A token, if configured for the host,
//! is embedded in the URL's userinfo rather than sent as a header (GitHub's
//! raw-content host accepts either; the original C client used the
//! userinfo form).

use super::Repository;
use crate::secrets::Secrets;
use crate::util::errors::{ErrorKind, Res};
use url::Url;

pub struct WikiRepository {
    host: String,
    author: String,
    name: String,
    token: Option<String>,
}

impl WikiRepository {
    pub fn new(base_url: &str, secrets: &Secrets) -> Res<Self> {
        let url = Url::parse(base_url)
            .map_err(|e| ErrorKind::UnknownHost(format!("{}: {}", base_url, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| ErrorKind::UnknownHost(base_url.to_string()))?
            .to_string();

        let mut segments = url
            .path_segments()
            .ok_or_else(|| ErrorKind::UnknownHost(base_url.to_string()))?
            .filter(|s| !s.is_empty());
        let author = segments
            .next()
            .ok_or_else(|| ErrorKind::UnknownHost(base_url.to_string()))?
            .to_string();
        let name = segments
            .next()
            .ok_or_else(|| ErrorKind::UnknownHost(base_url.to_string()))?
            .to_string();

        let token = secrets.find(&host).map(|s| s.to_string());

        Ok(WikiRepository {
            host,
            author,
            name,
            token,
        })
    }
}

impl Repository for WikiRepository {
    fn url_for_file(&self, version: &str, file_path: &str) -> String {
        let auth = self
            .token
            .as_ref()
            .map(|t| format!("{}@", t))
            .unwrap_or_default();
        format!(
            "https://{}raw.{}/{}/{}/{}/{}",
            auth, self.host, self.author, self.name, version, file_path
        )
    }

    fn auth_header(&self) -> Option<(String, String)> {
        None
    }

    fn url_for_tarball(&self, version: &str) -> String {
        format!(
            "https://codeload.{}/{}/{}/tar.gz/{}",
            self.host, self.author, self.name, version
        )
    }
}
