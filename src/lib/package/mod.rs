//! §3 data model: `PackageId`, `VersionRef`/slug parsing, and the runtime
//! `Package` entity built from a fetched manifest.
//!
//! Slug parsing below mirrors `parse-repo.c`'s `parse_repo_owner`/
//! `parse_repo_name`/`parse_repo_version` field-for-field: a name is
//! everything between an optional `<author>/` prefix and an optional
//! `@<version>` suffix; a missing author defaults to [`DEFAULT_AUTHOR`]
//! unless the slug has no `/` *and* starts with `@` (a slug with no name at
//! all); a missing or `*` version defaults to [`DEFAULT_BRANCH`].

pub mod manifest;

use self::manifest::Manifest;
use crate::util::errors::{ErrorKind, Res};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub const DEFAULT_AUTHOR: &str = "clibs";
pub const DEFAULT_BRANCH: &str = "master";

fn parse_owner(slug: &str, fallback: &str) -> Option<String> {
    if slug.is_empty() {
        return None;
    }
    if let Some(idx) = slug.find('/') {
        if idx == 0 {
            return None;
        }
        return Some(slug[..idx].to_string());
    }
    if !slug.starts_with('@') {
        Some(fallback.to_string())
    } else {
        None
    }
}

fn parse_name(slug: &str) -> Option<String> {
    if slug.is_empty() {
        return None;
    }
    let core = match slug.find('@') {
        Some(idx) => &slug[..idx],
        None => slug,
    };
    let name = if let Some(idx) = core.find('/') {
        if idx == 0 {
            return None;
        }
        &core[idx + 1..]
    } else {
        core
    };
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn parse_version(slug: &str, fallback: &str) -> Option<String> {
    if slug.is_empty() {
        return None;
    }
    match slug.find('@') {
        Some(idx) => {
            let v = &slug[idx + 1..];
            if v.is_empty() {
                None
            } else if v.starts_with('*') {
                Some(DEFAULT_BRANCH.to_string())
            } else {
                Some(v.to_string())
            }
        }
        None => Some(fallback.to_string()),
    }
}

/// `(author, name)`, both non-empty. Canonical string form `"<author>/<name>"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId {
    author: String,
    name: String,
}

impl PackageId {
    pub fn new(author: String, name: String) -> Self {
        PackageId { author, name }
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn as_str(&self) -> String {
        format!("{}/{}", self.author, self.name)
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.author, self.name)
    }
}

impl FromStr for PackageId {
    type Err = crate::util::errors::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = parse_name(s).ok_or_else(|| ErrorKind::InvalidSlug(s.to_string()))?;
        let author =
            parse_owner(s, DEFAULT_AUTHOR).ok_or_else(|| ErrorKind::InvalidSlug(s.to_string()))?;
        Ok(PackageId::new(author, name))
    }
}

/// `"<author>/<name>@<version>"`, tolerantly parsed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Slug {
    pub id: PackageId,
    pub version: String,
}

impl Slug {
    /// True iff the slug text carried an explicit, non-wildcard version —
    /// this is exactly the condition `clib_package.c` uses to decide
    /// whether a fetched manifest's own `version` field should be
    /// overridden (testable property 5).
    pub fn has_explicit_version(raw: &str) -> bool {
        match raw.find('@') {
            Some(idx) => {
                let v = &raw[idx + 1..];
                !v.is_empty() && !v.starts_with('*')
            }
            None => false,
        }
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}

impl FromStr for Slug {
    type Err = crate::util::errors::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = parse_name(s).ok_or_else(|| ErrorKind::InvalidSlug(s.to_string()))?;
        let author =
            parse_owner(s, DEFAULT_AUTHOR).ok_or_else(|| ErrorKind::InvalidSlug(s.to_string()))?;
        let version = parse_version(s, DEFAULT_BRANCH)
            .ok_or_else(|| ErrorKind::InvalidSlug(s.to_string()))?;
        Ok(Slug {
            id: PackageId::new(author, name),
            version,
        })
    }
}

/// The runtime package entity: a parsed manifest plus resolution metadata.
/// Shared via `Arc` across the resolver's visited set and in-flight
/// download tasks (DESIGN NOTES: "an arena of Packages indexed by name").
#[derive(Debug)]
pub struct Package {
    /// The raw JSON text of the manifest, preserved verbatim so it can be
    /// re-serialized byte-for-byte onto disk (testable property: "a
    /// byte-identical copy of the manifest fetched by the resolver").
    pub raw: String,
    pub manifest: Manifest,
    pub id: PackageId,
    pub version: String,
    /// The base URL this package's files were resolved from.
    pub base_url: String,
    /// Either `clib.json` or `package.json` — whichever the manifest-fetch
    /// loop actually found (spec.md §6).
    pub manifest_filename: &'static str,
}

impl Package {
    /// Builds a `Package` from a freshly fetched manifest, forcing
    /// `version`/`author` to match the slug by which it was requested.
    /// Mirrors `clib_package_new`'s post-parse forcing exactly: the
    /// version is overridden only when the slug carried an explicit,
    /// non-wildcard version; the author is always forced to the slug's
    /// author.
    pub fn new(
        raw: String,
        manifest: Manifest,
        slug_raw: &str,
        slug: &Slug,
        base_url: String,
        manifest_filename: &'static str,
    ) -> Arc<Package> {
        let version = if Slug::has_explicit_version(slug_raw) {
            slug.version.clone()
        } else {
            manifest
                .version
                .clone()
                .unwrap_or_else(|| slug.version.clone())
        };

        Arc::new(Package {
            raw,
            manifest,
            id: slug.id.clone(),
            version,
            base_url,
            manifest_filename,
        })
    }

    pub fn name(&self) -> &str {
        self.id.name()
    }

    pub fn author(&self) -> &str {
        self.id.author()
    }

    /// True for a meta/header-only package: no `src` list to download.
    pub fn is_meta(&self) -> bool {
        self.manifest.src.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_round_trip_full() {
        let slug: Slug = "someorg/case@0.1.0".parse().unwrap();
        assert_eq!(slug.id.author(), "someorg");
        assert_eq!(slug.id.name(), "case");
        assert_eq!(slug.version, "0.1.0");
    }

    #[test]
    fn slug_star_normalizes_to_default_branch() {
        let slug: Slug = "a/b@*".parse().unwrap();
        assert_eq!(slug.version, DEFAULT_BRANCH);
    }

    #[test]
    fn slug_missing_version_normalizes_to_default_branch() {
        let slug: Slug = "a/b".parse().unwrap();
        assert_eq!(slug.version, DEFAULT_BRANCH);
    }

    #[test]
    fn slug_missing_author_defaults() {
        let slug: Slug = "case@0.1.0".parse().unwrap();
        assert_eq!(slug.id.author(), DEFAULT_AUTHOR);
        assert_eq!(slug.id.name(), "case");
    }

    #[test]
    fn slug_leading_at_suppresses_default_author() {
        let err = "@0.1.0".parse::<Slug>().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidSlug(_)));
    }

    #[test]
    fn has_explicit_version_detection() {
        assert!(Slug::has_explicit_version("a/b@1.2.3"));
        assert!(!Slug::has_explicit_version("a/b@*"));
        assert!(!Slug::has_explicit_version("a/b"));
    }
}
