//! Wiki backend: an unauthenticated GET of a wiki page, parsed for its
//! `#wiki-body` element, walking `<h2>` category headings and the `<li>`
//! items of the list that immediately follows each one.
//!
//! Grounded on `registry/github-registry.c`'s `wiki_registry_parse`: the
//! body id (`wiki-body`), the `h2` category headings, and the
//! `"<repo-slug> - <description>"` item grammar are all taken verbatim from
//! that function. A heading with no following `<ul>` yields an empty
//! category rather than an error, matching the original's `continue`.

use super::{PackageRecord, Registry};
use crate::http::HttpClient;
use crate::util::errors::{ErrorKind, Res};
use scraper::{ElementRef, Html, Selector};

pub struct WikiRegistry {
    url: String,
    records: Vec<PackageRecord>,
    raw_body: Option<String>,
}

impl WikiRegistry {
    pub fn new(url: &str) -> Self {
        WikiRegistry {
            url: url.to_string(),
            records: Vec::new(),
            raw_body: None,
        }
    }
}

impl Registry for WikiRegistry {
    fn fetch(&mut self, http: &HttpClient) -> Res<()> {
        if !self.records.is_empty() {
            return Ok(());
        }

        let resp = http.get_body(&self.url, &[])?;
        if !resp.ok {
            return Err(ErrorKind::Http(format!(
                "{}: status {}",
                self.url, resp.status
            ))
            .into());
        }

        self.records = parse_wiki_body(&resp.body);
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
        self.records = parse_wiki_body(body);
        self.raw_body = Some(body.to_string());
    }
}

fn parse_wiki_body(html: &str) -> Vec<PackageRecord> {
    let document = Html::parse_document(html);
    let body_sel = Selector::parse("#wiki-body").unwrap();
    let h2_sel = Selector::parse("h2").unwrap();
    let li_sel = Selector::parse("li").unwrap();

    let mut out = Vec::new();

    let body = match document.select(&body_sel).next() {
        Some(body) => body,
        None => return out,
    };

    for heading in body.select(&h2_sel) {
        let category = heading.text().collect::<String>().trim().to_lowercase();

        let ul = heading
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "ul");
        let ul = match ul {
            Some(ul) => ul,
            None => continue,
        };

        for li in ul.select(&li_sel) {
            let text: String = li.text().collect();
            if let Some(idx) = text.find(" - ") {
                let id = text[..idx].trim().to_string();
                let description = text[idx + 3..].trim().to_string();
                if id.is_empty() || description.is_empty() {
                    continue;
                }
                let href = format!("https://github.com/{}", id);
                out.push(PackageRecord {
                    id,
                    href,
                    description,
                    category: category.clone(),
                });
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_headings_and_list_items() {
        let html = r#"
            <html><body>
            <div id="wiki-body">
                <h2>Data structures</h2>
                <ul>
                    <li>clibs/list - A generic linked list</li>
                    <li>clibs/hash - A hash table</li>
                </ul>
                <h2>Empty category</h2>
                <p>no list here</p>
                <h2>Strings</h2>
                <ul>
                    <li>clibs/trim - Trim whitespace</li>
                </ul>
            </div>
            </body></html>
        "#;

        let records = parse_wiki_body(html);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].id, "clibs/list");
        assert_eq!(records[0].description, "A generic linked list");
        assert_eq!(records[0].category, "data structures");
        assert_eq!(records[0].href, "https://github.com/clibs/list");
        assert_eq!(records[2].category, "strings");
    }

    #[test]
    fn missing_wiki_body_yields_no_records() {
        let records = parse_wiki_body("<html><body>nothing here</body></html>");
        assert!(records.is_empty());
    }
}
