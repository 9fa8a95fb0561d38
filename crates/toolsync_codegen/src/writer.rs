//! Writing generated artifacts to the output tree.
//!
//! A service directory is always rebuilt from scratch: sources are written to
//! a sibling staging directory which then replaces the old one, so a reader
//! never sees a mix of old and new operation files.

use crate::catalog::Catalog;
use crate::emit::ServiceArtifacts;
use crate::ident::IdentifierAllocator;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Catalog file name in the output root
pub const CATALOG_FILE: &str = "catalog.json";
/// Top-level index file name
pub const ROOT_INDEX_FILE: &str = "index.ts";
/// Client shim file name
pub const CLIENT_FILE: &str = "client.ts";

const CLIENT_SOURCE: &str = r#"// Created by toolsync. Safe to edit: this file is never overwritten.

export type ToolCaller = (service: string, operation: string, input: unknown) => Promise<unknown>;

let caller: ToolCaller | undefined;

/** Register the function generated wrappers use to reach their services. */
export function setToolCaller(next: ToolCaller): void {
  caller = next;
}

export async function callTool(
  service: string,
  operation: string,
  input: unknown,
): Promise<unknown> {
  if (caller === undefined) {
    throw new Error("toolsync: no tool caller registered; call setToolCaller() first");
  }
  return caller(service, operation, input);
}
"#;

/// Result type for artifact writing
pub type CodegenResult<T> = Result<T, CodegenError>;

/// Artifact writing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodegenError {
    /// Filesystem failure
    #[error("I/O error at {path}: {reason}")]
    Io {
        /// Path involved
        path: String,
        /// Underlying error
        reason: String,
    },

    /// Existing catalog could not be read back
    #[error("Invalid catalog {path}: {reason}")]
    Catalog {
        /// Path involved
        path: String,
        /// Decoder message
        reason: String,
    },
}

impl CodegenError {
    fn io(path: &Path, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }
}

/// Writes generated sources under an output root
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    root: PathBuf,
}

impl ArtifactWriter {
    /// Writer for `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Output root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a service's sources
    #[must_use]
    pub fn service_dir(&self, artifacts: &ServiceArtifacts) -> PathBuf {
        self.root.join(artifacts.slug.as_str())
    }

    /// Replace a service's directory with freshly generated sources
    ///
    /// # Errors
    ///
    /// Returns error if any file or directory operation fails
    pub fn write_service(&self, artifacts: &ServiceArtifacts) -> CodegenResult<PathBuf> {
        let target = self.service_dir(artifacts);
        let staging = self.root.join(format!(".{}.staging", artifacts.slug.as_str()));

        remove_dir_if_exists(&staging)?;
        fs::create_dir_all(&staging).map_err(|e| CodegenError::io(&staging, &e))?;
        for file in &artifacts.files {
            let path = staging.join(&file.path);
            fs::write(&path, &file.contents).map_err(|e| CodegenError::io(&path, &e))?;
        }

        remove_dir_if_exists(&target)?;
        fs::rename(&staging, &target).map_err(|e| CodegenError::io(&target, &e))?;

        tracing::info!(
            service = %artifacts.slug,
            files = artifacts.files.len(),
            dir = %target.display(),
            "wrote generated sources"
        );
        Ok(target)
    }

    /// Read the current catalog, empty if none has been written
    ///
    /// # Errors
    ///
    /// Returns error if the catalog exists but cannot be read or decoded
    pub fn read_catalog(&self) -> CodegenResult<Catalog> {
        let path = self.root.join(CATALOG_FILE);
        match fs::read(&path) {
            Ok(bytes) => Catalog::from_json(&bytes).map_err(|e| CodegenError::Catalog {
                path: path.display().to_string(),
                reason: e.to_string(),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Catalog::new()),
            Err(e) => Err(CodegenError::io(&path, &e)),
        }
    }

    /// Merge processed services into the catalog and rewrite the shared
    /// outputs: `catalog.json`, the top-level index and, if absent, the
    /// client shim.
    ///
    /// # Errors
    ///
    /// Returns error if the catalog cannot be read or any write fails
    pub fn finalize(&self, processed: &[ServiceArtifacts]) -> CodegenResult<Catalog> {
        fs::create_dir_all(&self.root).map_err(|e| CodegenError::io(&self.root, &e))?;

        let mut catalog = self.read_catalog()?;
        for artifacts in processed {
            catalog.replace_service(artifacts.slug.clone(), artifacts.catalog.clone());
        }

        let catalog_path = self.root.join(CATALOG_FILE);
        let json = catalog.to_json().map_err(|e| CodegenError::Catalog {
            path: catalog_path.display().to_string(),
            reason: e.to_string(),
        })?;
        write_if_changed(&catalog_path, &json)?;
        write_if_changed(&self.root.join(ROOT_INDEX_FILE), &render_root_index(&catalog))?;

        let client = self.root.join(CLIENT_FILE);
        if !client.exists() {
            fs::write(&client, CLIENT_SOURCE).map_err(|e| CodegenError::io(&client, &e))?;
        }

        tracing::info!(
            services = catalog.services().count(),
            operations = catalog.entries().len(),
            "updated catalog"
        );
        Ok(catalog)
    }
}

/// Top-level index re-exporting every catalogued service as a namespace.
///
/// Slugs that map to the same namespace are told apart with `__N` suffixes
/// in slug order.
#[must_use]
pub fn render_root_index(catalog: &Catalog) -> String {
    let mut out = String::from("// Generated by toolsync. Do not edit by hand.\n\n");
    out.push_str("export * from \"./client.js\";\n");
    let mut namespaces = IdentifierAllocator::new();
    for slug in catalog.services() {
        let namespace = namespaces.allocate(&slug.to_camel_case());
        out.push_str(&format!(
            "export * as {} from \"./{}/index.js\";\n",
            namespace,
            slug.as_str()
        ));
    }
    out
}

fn remove_dir_if_exists(path: &Path) -> CodegenResult<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CodegenError::io(path, &e)),
    }
}

fn write_if_changed(path: &Path, contents: &str) -> CodegenResult<()> {
    if fs::read_to_string(path).is_ok_and(|existing| existing == contents) {
        return Ok(());
    }
    fs::write(path, contents).map_err(|e| CodegenError::io(path, &e))
}
