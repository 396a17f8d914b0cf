//! Application declarations inside YAML declaration files.
//!
//! Documents are held as ordered YAML mappings so keys this crate does not
//! understand survive a rewrite in their original order.

use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};

use crate::error::{PromoteError, Result};

/// Field names of one declaration format.
#[derive(Debug)]
pub(crate) struct Schema {
    /// Top-level key holding the declaration list.
    pub list_key: &'static str,
    /// Entry key naming the application or chart.
    pub name_key: &'static str,
    /// Entry key distinguishing several instances of one application.
    pub alias_key: &'static str,
    /// Entry key for the target namespace, if the format has one.
    pub namespace_key: Option<&'static str>,
    /// Whether every entry carries the alias key, so its absence cannot mark
    /// the default instance.
    pub alias_always_set: bool,
}

pub(crate) static HELMFILE_SCHEMA: Schema = Schema {
    list_key: "releases",
    name_key: "chart",
    alias_key: "name",
    namespace_key: Some("namespace"),
    alias_always_set: true,
};

pub(crate) static JX_APPS_SCHEMA: Schema = Schema {
    list_key: "apps",
    name_key: "name",
    alias_key: "alias",
    namespace_key: Some("namespace"),
    alias_always_set: false,
};

pub(crate) static REQUIREMENTS_SCHEMA: Schema = Schema {
    list_key: "dependencies",
    name_key: "name",
    alias_key: "alias",
    namespace_key: None,
    alias_always_set: false,
};

/// One application's entry in a declaration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationDeclaration {
    pub name: String,
    pub version: Option<String>,
    pub namespace: Option<String>,
    pub alias: Option<String>,
}

impl ApplicationDeclaration {
    /// Application name without its chart repository prefix.
    pub fn short_name(&self) -> &str {
        short_name(&self.name)
    }
}

pub(crate) fn short_name(name: &str) -> &str {
    name.rsplit_once('/').map(|(_, n)| n).unwrap_or(name)
}

pub(crate) fn key(name: &str) -> Value {
    Value::String(name.to_string())
}

/// Render a scalar as a string; versions are sometimes parsed as numbers.
pub(crate) fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A parsed declaration file.
#[derive(Debug)]
pub(crate) struct DeclarationDocument {
    path: PathBuf,
    root: Mapping,
    schema: &'static Schema,
    exists: bool,
}

impl DeclarationDocument {
    /// Parse the file at `path`.
    pub fn load(path: &Path, schema: &'static Schema) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let value: Value =
            serde_yaml::from_str(&content).map_err(|e| malformed(path, e.to_string()))?;

        let root = match value {
            Value::Null => Mapping::new(),
            Value::Mapping(m) => m,
            _ => return Err(malformed(path, "top level is not a mapping")),
        };

        let doc = Self {
            path: path.to_path_buf(),
            root,
            schema,
            exists: true,
        };
        doc.check()?;
        Ok(doc)
    }

    /// A document that does not exist on disk yet.
    pub fn new_file(path: &Path, schema: &'static Schema, root: Mapping) -> Self {
        Self {
            path: path.to_path_buf(),
            root,
            schema,
            exists: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn root(&self) -> &Mapping {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Mapping {
        &mut self.root
    }

    fn check(&self) -> Result<()> {
        for (idx, entry) in self.entries()?.iter().enumerate() {
            let Value::Mapping(map) = entry else {
                return Err(malformed(
                    &self.path,
                    format!("{}[{}] is not a mapping", self.schema.list_key, idx),
                ));
            };
            if map.get(self.schema.name_key).and_then(scalar).is_none() {
                return Err(malformed(
                    &self.path,
                    format!(
                        "{}[{}] has no '{}'",
                        self.schema.list_key, idx, self.schema.name_key
                    ),
                ));
            }
        }
        Ok(())
    }

    fn entries(&self) -> Result<&[Value]> {
        match self.root.get(self.schema.list_key) {
            None | Some(Value::Null) => Ok(&[]),
            Some(Value::Sequence(seq)) => Ok(seq),
            Some(_) => Err(malformed(
                &self.path,
                format!("'{}' is not a list", self.schema.list_key),
            )),
        }
    }

    fn entries_mut(&mut self) -> Result<&mut Vec<Value>> {
        let list_key = key(self.schema.list_key);
        let slot = self
            .root
            .entry(list_key)
            .or_insert_with(|| Value::Sequence(Vec::new()));
        if slot.is_null() {
            *slot = Value::Sequence(Vec::new());
        }
        match slot {
            Value::Sequence(seq) => Ok(seq),
            _ => Err(malformed(
                &self.path,
                format!("'{}' is not a list", self.schema.list_key),
            )),
        }
    }

    fn field(&self, entry: &Value, name: &str) -> Option<String> {
        entry.get(name).and_then(scalar)
    }

    /// Every declaration in file order.
    pub fn declarations(&self) -> Result<Vec<ApplicationDeclaration>> {
        Ok(self
            .entries()?
            .iter()
            .map(|entry| ApplicationDeclaration {
                name: self.field(entry, self.schema.name_key).unwrap_or_default(),
                version: self.field(entry, "version"),
                namespace: self
                    .schema
                    .namespace_key
                    .and_then(|k| self.field(entry, k)),
                alias: self.field(entry, self.schema.alias_key),
            })
            .collect())
    }

    /// Index of the declaration for `application`, if any.
    ///
    /// A bare application name also matches prefixed entries
    /// (`myapp` matches `dev/myapp`). Without an alias, only entries whose
    /// alias is absent or equal to the application name match. Formats that
    /// name every entry (helmfile releases) match on the chart alone, falling
    /// back to the entry named after the application when several share it.
    /// More than one match breaks the one-declaration-per-application rule and
    /// is reported as a malformed file.
    pub fn find(&self, application: &str, alias: Option<&str>) -> Result<Option<usize>> {
        let bare = !application.contains('/');
        let default_name = short_name(application);
        let candidates: Vec<(usize, ApplicationDeclaration)> = self
            .declarations()?
            .into_iter()
            .enumerate()
            .filter(|(_, decl)| {
                decl.name == application || (bare && decl.short_name() == application)
            })
            .collect();

        let is_default = |decl: &ApplicationDeclaration| {
            decl.alias.as_deref().is_none_or(|a| a == default_name)
        };
        let matches: Vec<usize> = match alias {
            Some(alias) => candidates
                .iter()
                .filter(|(_, decl)| decl.alias.as_deref() == Some(alias))
                .map(|(idx, _)| *idx)
                .collect(),
            None if self.schema.alias_always_set => {
                let named: Vec<usize> = candidates
                    .iter()
                    .filter(|(_, decl)| is_default(decl))
                    .map(|(idx, _)| *idx)
                    .collect();
                if candidates.len() > 1 && !named.is_empty() {
                    named
                } else {
                    candidates.iter().map(|(idx, _)| *idx).collect()
                }
            }
            None => candidates
                .iter()
                .filter(|(_, decl)| is_default(decl))
                .map(|(idx, _)| *idx)
                .collect(),
        };

        match matches.as_slice() {
            [] => Ok(None),
            [idx] => Ok(Some(*idx)),
            _ => Err(malformed(
                &self.path,
                format!("'{}' is declared {} times", application, matches.len()),
            )),
        }
    }

    pub fn version_at(&self, idx: usize) -> Option<String> {
        self.entries()
            .ok()
            .and_then(|e| e.get(idx))
            .and_then(|entry| self.field(entry, "version"))
    }

    /// Replace the version of the entry at `idx`, leaving every other key alone.
    pub fn set_version(&mut self, idx: usize, version: &str) -> Result<()> {
        let path = self.path.clone();
        let entry = self
            .entries_mut()?
            .get_mut(idx)
            .and_then(Value::as_mapping_mut)
            .ok_or_else(|| malformed(&path, format!("no declaration at index {}", idx)))?;
        entry.insert(key("version"), Value::String(version.to_string()));
        Ok(())
    }

    /// Add a new entry, keeping the list sorted if it already was.
    pub fn insert(&mut self, entry: Mapping) -> Result<usize> {
        let name_key = self.schema.name_key;
        let new_name = entry.get(name_key).and_then(scalar).unwrap_or_default();
        let names: Vec<String> = self
            .entries()?
            .iter()
            .map(|e| self.field(e, name_key).unwrap_or_default())
            .collect();

        let sorted = names.windows(2).all(|w| w[0] <= w[1]);
        let idx = if sorted {
            names.partition_point(|n| *n <= new_name)
        } else {
            names.len()
        };

        self.entries_mut()?.insert(idx, Value::Mapping(entry));
        Ok(idx)
    }

    /// Serialise deterministically.
    pub fn render(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&Value::Mapping(self.root.clone()))?)
    }
}

pub(crate) fn malformed(path: &Path, message: impl Into<String>) -> PromoteError {
    PromoteError::MalformedDeclaration {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn load(content: &str, schema: &'static Schema) -> (TempDir, Result<DeclarationDocument>) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("decl.yaml");
        std::fs::write(&path, content).unwrap();
        let doc = DeclarationDocument::load(&path, schema);
        (dir, doc)
    }

    #[test]
    fn test_reads_declarations() {
        let (_dir, doc) = load(
            "apps:\n- name: jenkins-x/lighthouse\n  version: 0.0.900\n- name: dev/myapp\n  version: 1.0.0\n  namespace: jx-staging\n",
            &JX_APPS_SCHEMA,
        );
        let decls = doc.unwrap().declarations().unwrap();
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[1].short_name(), "myapp");
        assert_eq!(decls[1].namespace.as_deref(), Some("jx-staging"));
    }

    #[test]
    fn test_numeric_version_is_read_as_string() {
        let (_dir, doc) = load(
            "dependencies:\n- name: myapp\n  version: 1.2\n",
            &REQUIREMENTS_SCHEMA,
        );
        let doc = doc.unwrap();
        assert_eq!(doc.version_at(0).as_deref(), Some("1.2"));
    }

    #[test]
    fn test_bare_name_matches_prefixed_entry() {
        let (_dir, doc) = load(
            "apps:\n- name: dev/myapp\n  version: 1.0.0\n- name: dev/other\n",
            &JX_APPS_SCHEMA,
        );
        let doc = doc.unwrap();
        assert_eq!(doc.find("myapp", None).unwrap(), Some(0));
        assert_eq!(doc.find("dev/myapp", None).unwrap(), Some(0));
        assert_eq!(doc.find("acme/myapp", None).unwrap(), None);
    }

    #[test]
    fn test_alias_distinguishes_instances() {
        let (_dir, doc) = load(
            "dependencies:\n- name: myapp\n  version: 1.0.0\n- name: myapp\n  alias: myapp-blue\n  version: 1.0.0\n",
            &REQUIREMENTS_SCHEMA,
        );
        let doc = doc.unwrap();
        assert_eq!(doc.find("myapp", None).unwrap(), Some(0));
        assert_eq!(doc.find("myapp", Some("myapp-blue")).unwrap(), Some(1));
        assert_eq!(doc.find("myapp", Some("myapp-green")).unwrap(), None);
    }

    #[test]
    fn test_helmfile_release_matches_by_chart_whatever_its_name() {
        let (_dir, doc) = load(
            "releases:\n- chart: dev/myapp\n  version: 1.0.0\n  name: myapp-svc\n",
            &HELMFILE_SCHEMA,
        );
        let doc = doc.unwrap();
        assert_eq!(doc.find("myapp", None).unwrap(), Some(0));
        assert_eq!(doc.find("myapp", Some("myapp-canary")).unwrap(), None);
    }

    #[test]
    fn test_helmfile_default_release_wins_over_aliased_one() {
        let (_dir, doc) = load(
            "releases:\n- chart: dev/myapp\n  name: myapp-canary\n- chart: dev/myapp\n  name: myapp\n",
            &HELMFILE_SCHEMA,
        );
        let doc = doc.unwrap();
        assert_eq!(doc.find("myapp", None).unwrap(), Some(1));
        assert_eq!(doc.find("myapp", Some("myapp-canary")).unwrap(), Some(0));
    }

    #[test]
    fn test_helmfile_releases_sharing_a_chart_are_ambiguous() {
        let (_dir, doc) = load(
            "releases:\n- chart: dev/myapp\n  name: myapp-blue\n- chart: dev/myapp\n  name: myapp-green\n",
            &HELMFILE_SCHEMA,
        );
        let err = doc.unwrap().find("myapp", None).unwrap_err();
        assert!(matches!(err, PromoteError::MalformedDeclaration { .. }));
    }

    #[test]
    fn test_duplicate_declaration_is_malformed() {
        let (_dir, doc) = load(
            "apps:\n- name: dev/myapp\n- name: acme/myapp\n",
            &JX_APPS_SCHEMA,
        );
        let err = doc.unwrap().find("myapp", None).unwrap_err();
        assert!(matches!(err, PromoteError::MalformedDeclaration { .. }));
    }

    #[test]
    fn test_rejects_malformed_documents() {
        for content in [
            "- just\n- a list\n",
            "apps: not-a-list\n",
            "apps:\n- plain string\n",
            "apps:\n- version: 1.0.0\n",
            "apps: [unclosed\n",
        ] {
            let (_dir, doc) = load(content, &JX_APPS_SCHEMA);
            assert!(
                matches!(doc, Err(PromoteError::MalformedDeclaration { .. })),
                "{content:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_insert_keeps_sorted_lists_sorted() {
        let (_dir, doc) = load(
            "apps:\n- name: dev/alpha\n- name: dev/charlie\n",
            &JX_APPS_SCHEMA,
        );
        let mut doc = doc.unwrap();
        let mut entry = Mapping::new();
        entry.insert(key("name"), key("dev/bravo"));
        assert_eq!(doc.insert(entry).unwrap(), 1);
    }

    #[test]
    fn test_insert_appends_to_unsorted_lists() {
        let (_dir, doc) = load(
            "apps:\n- name: dev/charlie\n- name: dev/alpha\n",
            &JX_APPS_SCHEMA,
        );
        let mut doc = doc.unwrap();
        let mut entry = Mapping::new();
        entry.insert(key("name"), key("dev/bravo"));
        assert_eq!(doc.insert(entry).unwrap(), 2);
    }

    #[test]
    fn test_render_preserves_unknown_keys_in_order() {
        let (_dir, doc) = load(
            "defaultNamespace: jx\napps:\n- name: dev/myapp\n  phase: system\n  version: 1.0.0\n  values:\n  - values.yaml\n",
            &JX_APPS_SCHEMA,
        );
        let mut doc = doc.unwrap();
        doc.set_version(0, "1.1.0").unwrap();
        let rendered = doc.render().unwrap();
        assert_eq!(
            rendered,
            "defaultNamespace: jx\napps:\n- name: dev/myapp\n  phase: system\n  version: 1.1.0\n  values:\n  - values.yaml\n"
        );
    }
}
