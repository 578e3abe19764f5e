//! Forge-host repository: URL-encoded file path into a GitLab-style REST
//! API, `https://<host>/api/v4/<project-path>/repository/files/<url-encoded
//! file-path>/raw?ref=<version>`. Authentication uses the `PRIVATE-TOKEN`
//! header (grounded on `registry/gitlab-registry.c`'s
//! `gitlab_registry_fetch`, which builds exactly this header, not an
//! `Authorization: Bearer` one).

use super::Repository;
use crate::secrets::Secrets;
use crate::util::errors::{ErrorKind, Res};
use url::Url;

pub struct ForgeRepository {
    host: String,
    project_path: String,
    token: Option<String>,
}

impl ForgeRepository {
    pub fn new(base_url: &str, secrets: &Secrets) -> Res<Self> {
        let url = Url::parse(base_url)
            .map_err(|e| ErrorKind::UnknownHost(format!("{}: {}", base_url, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| ErrorKind::UnknownHost(base_url.to_string()))?
            .to_string();

        let project_path = url
            .path_segments()
            .ok_or_else(|| ErrorKind::UnknownHost(base_url.to_string()))?
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        if project_path.is_empty() {
            return Err(ErrorKind::UnknownHost(base_url.to_string()).into());
        }

        let token = secrets.find(&host).map(|s| s.to_string());

        Ok(ForgeRepository {
            host,
            project_path,
            token,
        })
    }

    fn encoded_project_path(&self) -> String {
        url::form_urlencoded::byte_serialize(self.project_path.as_bytes()).collect()
    }
}

impl Repository for ForgeRepository {
    fn url_for_file(&self, version: &str, file_path: &str) -> String {
        let encoded_file: String =
            url::form_urlencoded::byte_serialize(file_path.as_bytes()).collect();
        format!(
            "https://{}/api/v4/{}/repository/files/{}/raw?ref={}",
            self.host,
            self.encoded_project_path(),
            encoded_file,
            version
        )
    }

    fn auth_header(&self) -> Option<(String, String)> {
        self.token
            .as_ref()
            .map(|t| ("PRIVATE-TOKEN".to_string(), t.clone()))
    }

    fn url_for_tarball(&self, version: &str) -> String {
        format!(
            "https://{}/api/v4/{}/repository/archive.tar.gz?sha={}",
            self.host,
            self.encoded_project_path(),
            version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_rest_api_raw_url() {
        let secrets = Secrets::empty();
        let repo = ForgeRepository::new("https://gitlab.example.com/someorg/case", &secrets)
            .unwrap();
        assert_eq!(
            repo.url_for_file("0.1.0", "src/foo.c"),
            "https://gitlab.example.com/api/v4/someorg%2Fcase/repository/files/src%2Ffoo.c/raw?ref=0.1.0"
        );
    }

    #[test]
    fn sends_private_token_header_when_secret_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.json");
        std::fs::write(&path, r#"{"gitlab.example.com": "TOKEN"}"#).unwrap();
        let secrets = Secrets::load(&path).unwrap();

        let repo = ForgeRepository::new("https://gitlab.example.com/someorg/case", &secrets)
            .unwrap();
        assert_eq!(
            repo.auth_header(),
            Some(("PRIVATE-TOKEN".to_string(), "TOKEN".to_string()))
        );
    }

    #[test]
    fn no_header_without_secret() {
        let secrets = Secrets::empty();
        let repo = ForgeRepository::new("https://gitlab.example.com/someorg/case", &secrets)
            .unwrap();
        assert_eq!(repo.auth_header(), None);
    }
}
