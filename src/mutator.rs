//! Rewriting declaration files to pin an application version.
//!
//! [`VersionMutator`] dispatches on the [`LayoutKind`] found by
//! [`crate::layout::detect`]. Every file it touches is parsed before anything
//! is written, so a malformed or unsupported repository is left untouched.

use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::PromoteConfig;
use crate::diff::{DiffSummary, unified_diff};
use crate::error::{PromoteError, Result};
use crate::layout::declaration::{key, malformed, scalar, short_name};
use crate::layout::{self, ApplicationDeclaration, DeclarationDocument, LayoutKind};

/// What to pin, and where.
#[derive(Debug, Clone, Copy)]
pub struct MutationRequest<'a> {
    pub application: &'a str,
    pub version: &'a str,
    /// Namespace written into new declarations.
    pub namespace: &'a str,
    pub alias: Option<&'a str>,
}

/// Result of a mutation.
#[derive(Debug, Clone, Serialize)]
pub struct MutationOutcome {
    /// Whether any file was rewritten.
    pub changed: bool,
    pub layout: LayoutKind,
    /// Repository-relative path of the file holding the declaration.
    pub file: PathBuf,
    /// Version pinned before the mutation, `None` for a new declaration.
    pub previous_version: Option<String>,
    /// Unified diff of every rewritten file.
    pub diff: String,
    #[serde(skip)]
    pub summary: DiffSummary,
}

/// Pins application versions in a working copy.
#[derive(Debug, Clone)]
pub struct VersionMutator {
    chart_repo_prefix: String,
    chart_repository_url: String,
}

impl Default for VersionMutator {
    fn default() -> Self {
        Self::from_config(&PromoteConfig::default())
    }
}

impl VersionMutator {
    pub fn new(chart_repo_prefix: impl Into<String>, chart_repository_url: impl Into<String>) -> Self {
        Self {
            chart_repo_prefix: chart_repo_prefix.into(),
            chart_repository_url: chart_repository_url.into(),
        }
    }

    pub fn from_config(config: &PromoteConfig) -> Self {
        Self::new(&config.chart_repo_prefix, &config.chart_repository_url)
    }

    /// `<prefix>/<app>` unless the application already carries a prefix.
    fn qualified(&self, application: &str) -> String {
        if application.contains('/') {
            application.to_string()
        } else {
            format!("{}/{}", self.chart_repo_prefix, application)
        }
    }

    /// Pin `request.application` to `request.version` in the working copy at `root`.
    ///
    /// Re-pinning the version already declared reports `changed = false` and
    /// writes nothing.
    pub fn mutate(
        &self,
        root: &Path,
        layout: LayoutKind,
        request: &MutationRequest<'_>,
    ) -> Result<MutationOutcome> {
        self.apply(root, layout, request, true)
    }

    /// Compute what [`mutate`](Self::mutate) would change without writing.
    pub fn preview(
        &self,
        root: &Path,
        layout: LayoutKind,
        request: &MutationRequest<'_>,
    ) -> Result<MutationOutcome> {
        self.apply(root, layout, request, false)
    }

    fn apply(
        &self,
        root: &Path,
        layout: LayoutKind,
        request: &MutationRequest<'_>,
        write: bool,
    ) -> Result<MutationOutcome> {
        let schema = layout.schema().ok_or_else(|| PromoteError::UnsupportedLayout {
            path: root.to_path_buf(),
        })?;

        let mut docs = self.open_documents(root, layout, request.namespace)?;
        let mut changed = docs.iter().any(|d| d.touched);
        let target = docs.last_mut().ok_or_else(|| PromoteError::UnsupportedLayout {
            path: root.to_path_buf(),
        })?;

        let previous_version = match target.doc.find(request.application, request.alias)? {
            Some(idx) => {
                let previous = target.doc.version_at(idx);
                if previous.as_deref() != Some(request.version) {
                    target.doc.set_version(idx, request.version)?;
                    target.touched = true;
                    changed = true;
                }
                previous
            }
            None => {
                let entry = self.new_entry(layout, request);
                let idx = target.doc.insert(entry)?;
                debug!(
                    application = request.application,
                    index = idx,
                    "added new declaration"
                );
                target.touched = true;
                changed = true;
                None
            }
        };

        let file = relative(root, target.doc.path());
        if !changed {
            debug!(
                application = request.application,
                version = request.version,
                file = %file.display(),
                "declaration already at desired version"
            );
            return Ok(MutationOutcome {
                changed: false,
                layout,
                file,
                previous_version,
                diff: String::new(),
                summary: DiffSummary::default(),
            });
        }

        // Render everything before writing anything.
        let mut rendered = Vec::new();
        for open in docs.iter().filter(|d| d.touched) {
            let original = if open.doc.exists() {
                Some(std::fs::read_to_string(open.doc.path())?)
            } else {
                None
            };
            rendered.push((open.doc.path().to_path_buf(), original, open.doc.render()?));
        }

        let mut diff = String::new();
        let mut summary = DiffSummary::default();
        for (path, original, content) in &rendered {
            if write {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, content)?;
            }
            diff.push_str(&unified_diff(original.as_deref(), content, &relative(root, path)));
            summary.merge(&DiffSummary::from_diff(
                original.as_deref().unwrap_or(""),
                content,
            ));
        }

        info!(
            dry_run = !write,
            application = request.application,
            version = request.version,
            previous = previous_version.as_deref().unwrap_or("none"),
            file = %file.display(),
            layout = %layout,
            schema = schema.list_key,
            "pinned application version"
        );

        Ok(MutationOutcome {
            changed: true,
            layout,
            file,
            previous_version,
            diff,
            summary,
        })
    }

    /// Read the declarations the layout keeps for `namespace`.
    pub fn read(
        &self,
        root: &Path,
        layout: LayoutKind,
        namespace: &str,
    ) -> Result<Vec<ApplicationDeclaration>> {
        if layout == LayoutKind::Unknown {
            return Err(PromoteError::UnsupportedLayout {
                path: root.to_path_buf(),
            });
        }
        let docs = self.open_documents(root, layout, namespace)?;
        match docs.last() {
            Some(open) => open.doc.declarations(),
            None => Ok(Vec::new()),
        }
    }

    /// Documents involved in a mutation; the last one holds the declarations.
    fn open_documents(
        &self,
        root: &Path,
        layout: LayoutKind,
        namespace: &str,
    ) -> Result<Vec<OpenDocument>> {
        let (Some(schema), Some(marker)) = (layout.schema(), layout.marker()) else {
            return Err(PromoteError::UnsupportedLayout {
                path: root.to_path_buf(),
            });
        };
        let marker_doc = DeclarationDocument::load(&root.join(marker), schema)?;

        if layout != LayoutKind::TemplatedValues || !has_nested_helmfiles(&marker_doc) {
            return Ok(vec![OpenDocument::untouched(marker_doc)]);
        }

        let nested_rel = format!("helmfiles/{}/helmfile.yaml", namespace);
        let mut parent = OpenDocument::untouched(marker_doc);
        parent.touched = reference_helmfile(&mut parent.doc, &nested_rel)?;

        let nested_path = root.join(&nested_rel);
        let nested = if nested_path.is_file() {
            DeclarationDocument::load(&nested_path, schema)?
        } else {
            let mut skeleton = Mapping::new();
            skeleton.insert(key("namespace"), key(namespace));
            skeleton.insert(key(schema.list_key), Value::Sequence(Vec::new()));
            DeclarationDocument::new_file(&nested_path, schema, skeleton)
        };

        Ok(vec![parent, OpenDocument::untouched(nested)])
    }

    fn new_entry(&self, layout: LayoutKind, request: &MutationRequest<'_>) -> Mapping {
        let mut entry = Mapping::new();
        match layout {
            LayoutKind::TemplatedValues => {
                entry.insert(key("chart"), key(&self.qualified(request.application)));
                entry.insert(key("version"), key(request.version));
                entry.insert(
                    key("name"),
                    key(request
                        .alias
                        .unwrap_or_else(|| short_name(request.application))),
                );
                entry.insert(key("namespace"), key(request.namespace));
            }
            LayoutKind::FlatManifestList => {
                entry.insert(key("name"), key(&self.qualified(request.application)));
                entry.insert(key("version"), key(request.version));
                entry.insert(key("namespace"), key(request.namespace));
                if let Some(alias) = request.alias {
                    entry.insert(key("alias"), key(alias));
                }
            }
            LayoutKind::PinnedVersionFile => {
                entry.insert(key("name"), key(short_name(request.application)));
                entry.insert(key("repository"), key(&self.chart_repository_url));
                entry.insert(key("version"), key(request.version));
                if let Some(alias) = request.alias {
                    entry.insert(key("alias"), key(alias));
                }
            }
            LayoutKind::Unknown => {}
        }
        entry
    }
}

struct OpenDocument {
    doc: DeclarationDocument,
    touched: bool,
}

impl OpenDocument {
    fn untouched(doc: DeclarationDocument) -> Self {
        Self {
            doc,
            touched: false,
        }
    }
}

fn has_nested_helmfiles(doc: &DeclarationDocument) -> bool {
    doc.root().get("helmfiles").is_some_and(|v| !v.is_null())
}

/// Make sure the root helmfile lists `rel`. Returns whether it was added.
fn reference_helmfile(doc: &mut DeclarationDocument, rel: &str) -> Result<bool> {
    let path = doc.path().to_path_buf();
    let Some(Value::Sequence(list)) = doc.root_mut().get_mut("helmfiles") else {
        return Err(malformed(&path, "'helmfiles' is not a list"));
    };

    let referenced = list.iter().any(|item| {
        let listed = match item {
            Value::Mapping(m) => m.get("path").and_then(scalar),
            other => scalar(other),
        };
        listed.as_deref() == Some(rel)
    });
    if referenced {
        return Ok(false);
    }

    let mut item = Mapping::new();
    item.insert(key("path"), key(rel));
    list.push(Value::Mapping(item));
    Ok(true)
}

fn relative(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}

/// Detect the layout of `root` and read `application`'s pinned version.
pub fn read_pinned_version(
    root: &Path,
    application: &str,
    namespace: &str,
) -> Result<Option<String>> {
    let layout = layout::detect(root);
    let decls = VersionMutator::default().read(root, layout, namespace)?;
    let bare = !application.contains('/');
    Ok(decls
        .into_iter()
        .find(|d| d.name == application || (bare && d.short_name() == application))
        .and_then(|d| d.version))
}
