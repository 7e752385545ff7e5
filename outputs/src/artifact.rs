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

use std::{fmt, path::Path, sync::Arc};

/// A file reported by the build: either something the build produced, or a source file it
/// merely referenced.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OutputArtifact {
    Local(LocalArtifact),
    Source(SourceArtifact),
}

/// A build output on the local disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalArtifact {
    path: String,
    relative_path: String,
    configuration_mnemonic: Arc<str>,
}

/// A file that existed before the build, e.g. a source file listed in an output group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceArtifact {
    path: String,
}

impl LocalArtifact {
    pub fn new<P: Into<String>, R: Into<String>>(
        path: P,
        relative_path: R,
        configuration_mnemonic: Arc<str>,
    ) -> LocalArtifact {
        LocalArtifact {
            path: path.into(),
            relative_path: relative_path.into(),
            configuration_mnemonic,
        }
    }

    pub fn path(&self) -> &Path {
        Path::new(&self.path)
    }

    /// Path below the output root, starting with the configuration mnemonic,
    /// e.g. `k8-fastbuild/bin/java/app/app.jar`.
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn configuration_mnemonic(&self) -> &str {
        &self.configuration_mnemonic
    }
}

impl SourceArtifact {
    pub fn new<P: Into<String>>(path: P) -> SourceArtifact {
        SourceArtifact { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        Path::new(&self.path)
    }
}

impl OutputArtifact {
    pub fn path(&self) -> &Path {
        match self {
            OutputArtifact::Local(a) => a.path(),
            OutputArtifact::Source(a) => a.path(),
        }
    }

    /// The key artifacts are filtered and deduplicated by. Source artifacts have no output
    /// root, so they are keyed by their absolute path.
    pub fn relative_path(&self) -> &str {
        match self {
            OutputArtifact::Local(a) => a.relative_path(),
            OutputArtifact::Source(a) => &a.path,
        }
    }

    pub fn configuration_mnemonic(&self) -> Option<&str> {
        match self {
            OutputArtifact::Local(a) => Some(a.configuration_mnemonic()),
            OutputArtifact::Source(_) => None,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, OutputArtifact::Local(_))
    }

    pub fn is_source(&self) -> bool {
        matches!(self, OutputArtifact::Source(_))
    }

    pub fn as_local(&self) -> Option<&LocalArtifact> {
        match self {
            OutputArtifact::Local(a) => Some(a),
            OutputArtifact::Source(_) => None,
        }
    }
}

impl fmt::Display for OutputArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputArtifact::Local(a) => write!(f, "{}", a.relative_path),
            OutputArtifact::Source(a) => write!(f, "{} (source)", a.path),
        }
    }
}
