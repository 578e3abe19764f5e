//! §3 `Manifest`: the JSON document describing a package, read from
//! whichever of `clib.json`/`package.json` the repository layer found.

use crate::util::errors::{ErrorKind, Res};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use std::str::FromStr;

#[derive(Deserialize, Debug, Clone)]
pub struct Manifest {
    pub name: String,
    pub version: Option<String>,
    pub repo: Option<String>,
    pub license: Option<String>,
    pub description: Option<String>,

    /// Absent for header-only/meta packages (spec.md §3).
    pub src: Option<Vec<String>>,

    #[serde(default)]
    pub dependencies: IndexMap<String, String>,
    #[serde(default)]
    pub development: IndexMap<String, String>,

    pub install: Option<String>,
    pub configure: Option<String>,
    pub makefile: Option<String>,
    pub prefix: Option<String>,

    #[serde(default, deserialize_with = "string_or_vec", alias = "cflags")]
    pub flags: Vec<String>,

    #[serde(default)]
    pub registries: Vec<String>,
}

/// `flags`/`cflags` accepts either a bare string or a list of strings.
fn string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrVec {
        String(String),
        Vec(Vec<String>),
        None,
    }

    match Option::<StringOrVec>::deserialize(deserializer)? {
        Some(StringOrVec::String(s)) => Ok(s.split_whitespace().map(String::from).collect()),
        Some(StringOrVec::Vec(v)) => Ok(v),
        Some(StringOrVec::None) | None => Ok(Vec::new()),
    }
}

impl Manifest {
    /// Returns the manifest's declared `repo`, or the inferred
    /// `"<author>/<name>"` form when absent (spec.md §3: "`repo` may be
    /// absent (inferred from `author/name`)").
    pub fn repo_or(&self, author: &str) -> String {
        self.repo
            .clone()
            .unwrap_or_else(|| format!("{}/{}", author, self.name))
    }
}

impl FromStr for Manifest {
    type Err = crate::util::errors::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(raw).map_err(|e| ErrorKind::InvalidManifest(e.to_string()).into())
    }
}

/// Parses a manifest, treating a missing `name`/`version` as a recoverable
/// warning (spec.md §7) rather than a hard failure, by substituting a
/// caller-supplied fallback for `name` before deserializing strictly.
pub fn parse_lenient(raw: &str, fallback_name: &str) -> Res<(Manifest, Vec<&'static str>)> {
    let mut value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| ErrorKind::InvalidManifest(e.to_string()))?;

    let mut warnings = Vec::new();
    let obj = value
        .as_object_mut()
        .ok_or_else(|| ErrorKind::InvalidManifest("manifest is not a JSON object".to_string()))?;

    if obj.get("name").and_then(|v| v.as_str()).is_none() {
        warnings.push("missing required manifest field: name");
        obj.insert(
            "name".to_string(),
            serde_json::Value::String(fallback_name.to_string()),
        );
    }
    if obj.get("version").and_then(|v| v.as_str()).is_none() {
        warnings.push("missing required manifest field: version");
    }

    let manifest: Manifest = serde_json::from_value(value)
        .map_err(|e| ErrorKind::InvalidManifest(e.to_string()))?;

    Ok((manifest, warnings))
}
