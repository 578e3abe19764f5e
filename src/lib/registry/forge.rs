//! Forge backend: an authenticated GET of a markdown listing file, parsed
//! line by line for `"## <category>"` headings and
//! `"- [<name>](<url>) - <description>"` items.
//!
//! Grounded on `registry/gitlab-registry.c`'s `gitlab_registry_parse`: a
//! plain line-oriented scan (no real markdown semantics needed), category
//! lines recognized by a leading `##`, item lines by a leading `-`. Unlike
//! the wiki backend's category names, the original does not lowercase or
//! trim the gitlab category text; this crate trims it for hygiene but
//! otherwise preserves the distinction.
//!
//! Unlike `repository::forge`, which sends a token only "if present",
//! `gitlab_registry_fetch` refuses to fetch at all when no secret is
//! configured for the host (`if (secret == NULL) { return NULL; }`) — this
//! backend carries that same unconditional-auth requirement forward.

use super::{PackageRecord, Registry};
use crate::http::HttpClient;
use crate::secrets::Secrets;
use crate::util::errors::{ErrorKind, Res};
use nom::{
    bytes::complete::{tag, take_until},
    character::complete::{char, space0},
    sequence::delimited,
    IResult,
};

pub struct ForgeRegistry {
    url: String,
    host: String,
    token: Option<String>,
    records: Vec<PackageRecord>,
    raw_body: Option<String>,
}

impl ForgeRegistry {
    pub fn new(url: &str, secrets: &Secrets) -> Self {
        let host = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|s| s.to_string()))
            .unwrap_or_default();
        let token = secrets.find(&host).map(|s| s.to_string());

        ForgeRegistry {
            url: url.to_string(),
            host,
            token,
            records: Vec::new(),
            raw_body: None,
        }
    }
}

impl Registry for ForgeRegistry {
    fn fetch(&mut self, http: &HttpClient) -> Res<()> {
        if !self.records.is_empty() {
            return Ok(());
        }

        let token = self
            .token
            .as_ref()
            .ok_or_else(|| ErrorKind::MissingSecret(self.host.clone()))?;
        let headers = vec![("PRIVATE-TOKEN".to_string(), token.clone())];

        let resp = http.get_body(&self.url, &headers)?;
        if !resp.ok {
            return Err(ErrorKind::Http(format!(
                "{}: status {}",
                self.url, resp.status
            ))
            .into());
        }

        self.records = parse_markdown_listing(&resp.body);
        self.raw_body = Some(resp.body);
        Ok(())
    }

    fn iterate(&self) -> &[PackageRecord] {
        &self.records
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn raw_body(&self) -> Option<&str> {
        self.raw_body.as_deref()
    }

    fn load_cached(&mut self, body: &str) {
        self.records = parse_markdown_listing(body);
        self.raw_body = Some(body.to_string());
    }
}

/// `"- [name](url) - description"`, leading whitespace allowed.
fn item_line(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, _) = space0(input)?;
    let (input, _) = char('-')(input)?;
    let (input, _) = space0(input)?;
    let (input, name) = delimited(char('['), take_until("]"), char(']'))(input)?;
    let (input, url) = delimited(char('('), take_until(")"), char(')'))(input)?;
    let (input, _) = space0(input)?;
    let (input, _) = tag("-")(input)?;
    let (input, _) = space0(input)?;
    Ok((input, (name, url)))
}

fn parse_markdown_listing(body: &str) -> Vec<PackageRecord> {
    let mut out = Vec::new();
    let mut category = "unknown".to_string();

    for line in body.lines() {
        let trimmed = line.trim_start();

        if let Some(rest) = trimmed.strip_prefix("##") {
            category = rest.trim().to_string();
            continue;
        }

        if let Ok((description, (id, href))) = item_line(line) {
            let id = id.trim().to_string();
            let href = href.trim().to_string();
            let description = description.trim().to_string();
            if id.is_empty() || href.is_empty() {
                continue;
            }
            out.push(PackageRecord {
                id,
                href,
                description,
                category: category.clone(),
            });
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_categories_and_items() {
        let body = "\
## Data structures
- [clibs/list](https://gitlab.example.com/clibs/list) - A generic linked list
- [clibs/hash](https://gitlab.example.com/clibs/hash) - A hash table

## Strings
- [clibs/trim](https://gitlab.example.com/clibs/trim) - Trim whitespace
";
        let records = parse_markdown_listing(body);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].id, "clibs/list");
        assert_eq!(records[0].category, "Data structures");
        assert_eq!(records[2].category, "Strings");
        assert_eq!(records[1].href, "https://gitlab.example.com/clibs/hash");
    }

    #[test]
    fn items_before_any_heading_get_unknown_category() {
        let body = "- [a/b](https://x/a/b) - desc\n";
        let records = parse_markdown_listing(body);
        assert_eq!(records[0].category, "unknown");
    }

    #[test]
    fn fetch_without_a_secret_refuses_to_hit_the_network() {
        let mut reg = ForgeRegistry::new("https://gitlab.example.com/clibs/registry", &Secrets::empty());
        let err = reg.fetch(&HttpClient::new()).unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::MissingSecret("gitlab.example.com".to_string()));
    }
}
