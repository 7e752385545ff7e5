/*
 * Copyright 2020 Nikhil Marathe <nsm.nikhil@gmail.com>
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Decides whether a file reference is a build output or a source file.
//!
//! The protocol does not say which is which. The rule is: two or more output-root prefix
//! segments mean a build output; otherwise the file is an output only if it lives under the
//! known output directory, and a source file in every other case.

use std::{
    borrow::Cow,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{debug, warn};
use url::Url;

use crate::{
    artifact::{LocalArtifact, OutputArtifact, SourceArtifact},
    store::FileRef,
};

/// Name of the output root below the execution root.
pub const OUTPUT_ROOT: &str = "bazel-out";

/// Directories reported by the build tool (`bazel info`), supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildRoots {
    pub execution_root: Option<PathBuf>,
    pub output_base: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
}

impl BuildRoots {
    pub fn new() -> BuildRoots {
        BuildRoots::default()
    }

    pub fn with_execution_root<P: Into<PathBuf>>(mut self, root: P) -> BuildRoots {
        self.execution_root = Some(root.into());
        self
    }

    pub fn with_output_base<P: Into<PathBuf>>(mut self, root: P) -> BuildRoots {
        self.output_base = Some(root.into());
        self
    }

    pub fn with_output_path<P: Into<PathBuf>>(mut self, root: P) -> BuildRoots {
        self.output_path = Some(root.into());
        self
    }

    /// The build output directory: explicit, or `<execution_root>/bazel-out`.
    pub fn output_path(&self) -> Option<Cow<'_, Path>> {
        match (&self.output_path, &self.execution_root) {
            (Some(output), _) => Some(Cow::Borrowed(output.as_path())),
            (None, Some(exec)) => Some(Cow::Owned(exec.join(OUTPUT_ROOT))),
            (None, None) => None,
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.execution_root
            .iter()
            .chain(self.output_base.iter())
            .chain(self.output_path.iter())
            .any(|root| path.starts_with(root))
    }

    pub fn is_empty(&self) -> bool {
        self.execution_root.is_none() && self.output_base.is_none() && self.output_path.is_none()
    }
}

enum Location {
    Local(String),
    Unsupported(String),
}

fn decode_uri(uri: &str) -> Result<Location, String> {
    let url = Url::parse(uri).map_err(|e| e.to_string())?;
    if url.scheme() != "file" {
        return Ok(Location::Unsupported(url.scheme().to_owned()));
    }
    let path = url
        .to_file_path()
        .map_err(|()| "not a local file path".to_owned())?;
    path.into_os_string()
        .into_string()
        .map(Location::Local)
        .map_err(|_| "path is not valid UTF-8".to_owned())
}

/// Classifies one file reference of a set resolved under `mnemonic`.
///
/// Returns `None` for anything that is not a readable local file: inline contents, other URI
/// schemes and URIs that fail to decode. Decoding failures are logged, never propagated.
pub fn classify(file: &FileRef, mnemonic: &Arc<str>, roots: &BuildRoots) -> Option<OutputArtifact> {
    let uri = file.uri.as_ref()?;
    let path = match decode_uri(uri) {
        Ok(Location::Local(path)) => path,
        Ok(Location::Unsupported(scheme)) => {
            debug!(%uri, %scheme, "skipping artifact with unsupported scheme");
            return None;
        }
        Err(reason) => {
            warn!(%uri, %reason, "dropping artifact with malformed uri");
            return None;
        }
    };

    if file.path_prefix.len() >= 2 {
        // The first segment is the output root itself ("bazel-out"); the rest starts with the
        // configuration mnemonic.
        let relative_path = file.path_prefix[1..]
            .iter()
            .map(|segment| &**segment)
            .chain(std::iter::once(&*file.name))
            .collect::<Vec<&str>>()
            .join("/");
        return Some(OutputArtifact::Local(LocalArtifact::new(
            path,
            relative_path,
            mnemonic.clone(),
        )));
    }

    if roots.contains(Path::new(&path)) {
        let relative = roots.output_path().and_then(|output| {
            Path::new(&path)
                .strip_prefix(&*output)
                .ok()
                .and_then(|rel| rel.to_str())
                .map(|rel| rel.to_owned())
        });
        if let Some(relative_path) = relative {
            return Some(OutputArtifact::Local(LocalArtifact::new(
                path,
                relative_path,
                mnemonic.clone(),
            )));
        }
    }
    Some(OutputArtifact::Source(SourceArtifact::new(path)))
}
