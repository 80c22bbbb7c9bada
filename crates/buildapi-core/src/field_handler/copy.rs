//! Filesystem-copying [`PathFieldTranslator`].

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use super::{PathFieldTranslator, PathsIn, Result, SandboxDescriptor, TranslateError};
use crate::message::{Message, PathRole};

/// Wire shape of a sandbox descriptor field.
#[derive(Debug, Default, Deserialize)]
struct SandboxField {
    #[serde(default)]
    path: Option<PathBuf>,
    #[serde(default)]
    cache_dir: Option<PathBuf>,
    #[serde(default)]
    env: std::collections::BTreeMap<String, String>,
}

/// Copies path-field targets into and out of the sandbox.
#[derive(Debug, Clone)]
pub struct CopyingTranslator {
    default_root: PathBuf,
}

impl CopyingTranslator {
    /// `default_root` is used when a request carries no sandbox path.
    pub fn new(default_root: impl Into<PathBuf>) -> Self {
        Self {
            default_root: default_root.into(),
        }
    }
}

impl PathFieldTranslator for CopyingTranslator {
    fn extract_sandbox(&self, request: &Message) -> Result<SandboxDescriptor> {
        let field = match request.schema().sandbox_field() {
            Some(name) => request
                .get(name)
                .map(|value| {
                    SandboxField::deserialize(value).map_err(|source| {
                        TranslateError::InvalidSandbox {
                            field: name.to_string(),
                            source,
                        }
                    })
                })
                .transpose()?
                .unwrap_or_default(),
            None => SandboxField::default(),
        };

        let root = field
            .path
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| self.default_root.clone());
        let cache_dir = field
            .cache_dir
            .filter(|p| !p.as_os_str().is_empty())
            .map(absolute)
            .transpose()?;

        // Copies land under an absolute temp dir, so the root must be
        // absolute for sandbox-relative rewriting to work.
        Ok(SandboxDescriptor {
            root: absolute(root)?,
            cache_dir,
            env: field.env,
        })
    }

    fn copy_paths_in<'a>(
        &self,
        request: &'a mut Message,
        temp_root: &Path,
        prefix: &Path,
    ) -> Result<PathsIn<'a>> {
        let pending: Vec<(Vec<String>, PathBuf)> = request
            .path_locations(PathRole::Input)
            .into_iter()
            .filter_map(|field| {
                let source = PathBuf::from(request.lookup_str(&field)?);
                Some((field, source))
            })
            .collect();

        if pending.is_empty() {
            return Ok(PathsIn::new(request, None));
        }

        fs::create_dir_all(temp_root)?;
        let copies = tempfile::Builder::new()
            .prefix("paths-in-")
            .tempdir_in(temp_root)?;
        let copies_dir = copies.path().to_path_buf();
        let mut guard = PathsIn::new(request, Some(copies));

        for (index, (field, source)) in pending.into_iter().enumerate() {
            let dotted = field.join(".");
            if !source.exists() {
                return Err(TranslateError::MissingSource {
                    field: dotted,
                    path: source,
                });
            }
            let Some(name) = source.file_name() else {
                return Err(TranslateError::NoFileName {
                    field: dotted,
                    path: source,
                });
            };

            // One directory per field keeps same-named files apart.
            let slot = copies_dir.join(index.to_string());
            fs::create_dir_all(&slot)?;
            let dest = slot.join(name);
            copy_tree(&source, &dest)?;

            let relative = dest
                .strip_prefix(prefix)
                .map_err(|_| TranslateError::OutsideSandbox {
                    path: dest.clone(),
                    root: prefix.to_path_buf(),
                })?;
            let rewritten = format!("/{}", relative.to_string_lossy());
            debug!(
                field = %dotted,
                from = %source.display(),
                to = %rewritten,
                "Copied path into sandbox"
            );
            guard.rewrite(field, rewritten);
        }

        Ok(guard)
    }

    fn extract_results(
        &self,
        original_request: &Message,
        response: &mut Message,
        sandbox: &SandboxDescriptor,
    ) -> Result<()> {
        let destination = original_request
            .schema()
            .result_dir_field()
            .and_then(|name| original_request.lookup_str(&[name]))
            .map(PathBuf::from);

        for field in response.path_locations(PathRole::Output) {
            let Some(inside) = response.lookup_str(&field).map(str::to_string) else {
                continue;
            };
            let source = sandbox.to_host_path(&inside)?;

            let host = match &destination {
                Some(dir) => {
                    let Some(name) = source.file_name() else {
                        return Err(TranslateError::NoFileName {
                            field: field.join("."),
                            path: source,
                        });
                    };
                    fs::create_dir_all(dir)?;
                    let target = dir.join(name);
                    copy_tree(&source, &target)?;
                    info!(
                        field = %field.join("."),
                        to = %target.display(),
                        "Extracted result from sandbox"
                    );
                    target
                }
                None => source,
            };
            response.set_at(&field, host.to_string_lossy().into_owned());
        }
        Ok(())
    }
}

fn absolute(path: PathBuf) -> Result<PathBuf> {
    std::path::absolute(&path).map_err(|source| TranslateError::Unresolved { path, source })
}

/// Copy a file, or a directory recursively, to `to`.
fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    let copy_err = |source| TranslateError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    if from.is_dir() {
        fs::create_dir_all(to).map_err(copy_err)?;
        for entry in fs::read_dir(from).map_err(copy_err)? {
            let entry = entry.map_err(copy_err)?;
            copy_tree(&entry.path(), &to.join(entry.file_name()))?;
        }
    } else {
        fs::copy(from, to).map_err(copy_err)?;
    }
    Ok(())
}
