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

//! Resolves the output artifacts of every completed target in a build event stream.
//!
//! ```no_run
//! use bep_events::JsonLinesProvider;
//! use bep_outputs::{parse_bep_output, BuildRoots};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut provider = JsonLinesProvider::open("build_events.json")?;
//! let output = parse_bep_output(&mut provider, &BuildRoots::new())?;
//! for artifact in output.output_group_artifacts("default") {
//!     println!("{}", artifact);
//! }
//! # Ok(())
//! # }
//! ```

use bep_events::{BuildEventStreamProvider, StreamError};
use bep_intern::Interner;
use bep_metrics::scoped_metric;
use thiserror::Error;
use tracing::debug;

pub mod artifact;
pub mod classify;
pub mod output;
pub mod reducer;
pub mod resolve;
pub mod store;

#[cfg(test)]
mod property_tests;

pub use artifact::{LocalArtifact, OutputArtifact, SourceArtifact};
pub use classify::{classify, BuildRoots, OUTPUT_ROOT};
pub use output::{ArtifactData, CompletedTarget, ParsedOutput, ResolvedOutputGroup};
pub use reducer::{reduce, BuildResult, EventStreamReducer, ReducedStream};
pub use resolve::{ArtifactNode, NodeKey, OutputGraphResolver, ResolverStats};
pub use store::{FileRef, FileSetStore, NamedFileSet};

#[derive(Error, Debug)]
pub enum BepError {
    #[error("reading build event stream")]
    Stream(#[from] StreamError),
    #[error("build event stream contained no events")]
    EmptyStream,
    #[error("named set of files '{0}' defined more than once")]
    DuplicateFileSet(String),
    #[error("named set of files '{0}' referenced but never defined")]
    UndefinedFileSet(String),
    #[error("named set of files '{0}' includes itself")]
    CyclicFileSet(String),
    #[error("target {label} references unknown configuration '{configuration}'")]
    UnknownConfiguration { label: String, configuration: String },
}

impl BepError {
    /// True if the stream itself is malformed, as opposed to unreadable.
    pub fn is_protocol_violation(&self) -> bool {
        !matches!(self, BepError::Stream(_))
    }
}

/// Drains `provider` and resolves every target's output groups.
pub fn parse_bep_output<P>(provider: &mut P, roots: &BuildRoots) -> Result<ParsedOutput, BepError>
where
    P: BuildEventStreamProvider + ?Sized,
{
    let mut interner = Interner::new();
    parse_bep_output_with_interner(provider, roots, &mut interner)
}

/// Like [`parse_bep_output`], interning into a caller-owned `interner` so strings can be shared
/// with other parses.
pub fn parse_bep_output_with_interner<P>(
    provider: &mut P,
    roots: &BuildRoots,
    interner: &mut Interner,
) -> Result<ParsedOutput, BepError>
where
    P: BuildEventStreamProvider + ?Sized,
{
    let reduced = {
        scoped_metric!("reduce");
        reduce(provider, interner)?
    };
    let events = reduced.events;
    let output = {
        scoped_metric!("resolve");
        ParsedOutput::build(reduced, roots)?
    };
    let stats = output.stats();
    debug!(
        events,
        targets = output.targets().len(),
        file_sets = stats.file_sets_resolved,
        cache_hits = stats.cache_hits,
        dropped = stats.artifacts_dropped,
        bytes = output.bytes_consumed(),
        "resolved build outputs"
    );
    Ok(output)
}
