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

//! The immutable result of a parse and the queries it answers.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::Arc,
};

use bep_metrics::scoped_metric;
use dashmap::DashSet;
use rayon::prelude::*;

use crate::{
    artifact::OutputArtifact,
    classify::BuildRoots,
    reducer::{BuildResult, ReducedStream},
    resolve::{ArtifactNode, NodeKey, OutputGraphResolver, ResolverStats},
    BepError,
};

/// One output group of a completed target, with its file sets resolved.
#[derive(Debug)]
pub struct ResolvedOutputGroup {
    name: Arc<str>,
    file_sets: Vec<Arc<str>>,
    nodes: Vec<Arc<ArtifactNode>>,
    incomplete: bool,
}

impl ResolvedOutputGroup {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ids of the top-level sets, as the target listed them.
    pub fn file_sets(&self) -> &[Arc<str>] {
        &self.file_sets
    }

    pub fn nodes(&self) -> &[Arc<ArtifactNode>] {
        &self.nodes
    }

    /// Bazel could not produce every output of this group.
    pub fn is_incomplete(&self) -> bool {
        self.incomplete
    }

    /// The full closure, deduplicated.
    pub fn artifacts(&self) -> Vec<Arc<OutputArtifact>> {
        let mut collector = Collector::default();
        collector.walk_all(&self.nodes, &|_| true);
        collector.artifacts
    }
}

#[derive(Debug)]
pub struct CompletedTarget {
    label: Arc<str>,
    configuration_id: Option<Arc<str>>,
    configuration_mnemonic: Option<Arc<str>>,
    success: bool,
    output_groups: Vec<ResolvedOutputGroup>,
}

impl CompletedTarget {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn configuration_id(&self) -> Option<&str> {
        self.configuration_id.as_deref()
    }

    pub fn configuration_mnemonic(&self) -> Option<&str> {
        self.configuration_mnemonic.as_deref()
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn output_groups(&self) -> &[ResolvedOutputGroup] {
        &self.output_groups
    }

    pub fn output_group(&self, name: &str) -> Option<&ResolvedOutputGroup> {
        self.output_groups.iter().find(|g| g.name() == name)
    }
}

/// Everything known about one artifact across the build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactData {
    pub artifact: Arc<OutputArtifact>,
    pub output_groups: BTreeSet<Arc<str>>,
    pub targets: BTreeSet<Arc<str>>,
}

/// The outputs of one build. Read-only once built; queries may run from any thread.
#[derive(Debug)]
pub struct ParsedOutput {
    build_id: Option<String>,
    local_exec_root: Option<String>,
    start_time_millis: Option<i64>,
    command: Option<String>,
    build_result: BuildResult,
    exit_code_name: Option<String>,
    targets: Vec<CompletedTarget>,
    bytes_consumed: u64,
    complete: bool,
    stats: ResolverStats,
}

impl ParsedOutput {
    /// Resolves every target of `reduced`.
    ///
    /// When `roots` has no execution root the stream's own `localExecRoot` stands in.
    pub fn build(reduced: ReducedStream, roots: &BuildRoots) -> Result<ParsedOutput, BepError> {
        let roots = match (&roots.execution_root, &reduced.local_exec_root) {
            (None, Some(exec_root)) => roots.clone().with_execution_root(exec_root),
            _ => roots.clone(),
        };

        let mut resolver = OutputGraphResolver::new(&reduced.store, &roots);
        let mut targets = Vec::with_capacity(reduced.targets.len());
        for record in &reduced.targets {
            let mnemonic = record
                .configuration_id
                .as_ref()
                .and_then(|id| reduced.mnemonic(id))
                .cloned();
            let mut output_groups = Vec::with_capacity(record.output_groups.len());
            for group in &record.output_groups {
                let mut nodes = Vec::with_capacity(group.file_sets.len());
                if !group.file_sets.is_empty() {
                    let mnemonic =
                        mnemonic
                            .as_ref()
                            .ok_or_else(|| BepError::UnknownConfiguration {
                                label: record.label.to_string(),
                                configuration: record
                                    .configuration_id
                                    .as_deref()
                                    .unwrap_or_default()
                                    .to_owned(),
                            })?;
                    for id in &group.file_sets {
                        nodes.push(resolver.resolve(id, mnemonic)?);
                    }
                }
                output_groups.push(ResolvedOutputGroup {
                    name: group.name.clone(),
                    file_sets: group.file_sets.clone(),
                    nodes,
                    incomplete: group.incomplete,
                });
            }
            targets.push(CompletedTarget {
                label: record.label.clone(),
                configuration_id: record.configuration_id.clone(),
                configuration_mnemonic: mnemonic,
                success: record.success,
                output_groups,
            });
        }
        let stats = resolver.stats();

        Ok(ParsedOutput {
            build_id: reduced.build_id,
            local_exec_root: reduced.local_exec_root,
            start_time_millis: reduced.start_time_millis,
            command: reduced.command,
            build_result: reduced.build_result,
            exit_code_name: reduced.exit_code_name,
            targets,
            bytes_consumed: reduced.bytes_consumed,
            complete: reduced.finished || reduced.last_message,
            stats,
        })
    }

    pub fn build_id(&self) -> Option<&str> {
        self.build_id.as_deref()
    }

    pub fn local_exec_root(&self) -> Option<&str> {
        self.local_exec_root.as_deref()
    }

    pub fn start_time_millis(&self) -> Option<i64> {
        self.start_time_millis
    }

    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    pub fn build_result(&self) -> BuildResult {
        self.build_result
    }

    /// Bazel's name for the exit code, e.g. `BUILD_FAILURE`.
    pub fn exit_code_name(&self) -> Option<&str> {
        self.exit_code_name.as_deref()
    }

    pub fn targets(&self) -> &[CompletedTarget] {
        &self.targets
    }

    /// The first target with this exact label.
    pub fn target(&self, label: &str) -> Option<&CompletedTarget> {
        self.targets.iter().find(|t| t.label() == label)
    }

    pub fn bytes_consumed(&self) -> u64 {
        self.bytes_consumed
    }

    /// False if the stream ended without a final event, e.g. a build still running.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn stats(&self) -> ResolverStats {
        self.stats
    }

    /// Artifacts of `output_group` across every target.
    pub fn output_group_artifacts(&self, output_group: &str) -> Vec<Arc<OutputArtifact>> {
        scoped_metric!("query");
        let mut collector = Collector::default();
        for group in self.targets.iter().filter_map(|t| t.output_group(output_group)) {
            collector.walk_all(&group.nodes, &|_| true);
        }
        collector.artifacts
    }

    /// Artifacts of `output_group` for the target(s) labelled `label`.
    pub fn target_output_group_artifacts(
        &self,
        label: &str,
        output_group: &str,
    ) -> Vec<Arc<OutputArtifact>> {
        scoped_metric!("query");
        let mut collector = Collector::default();
        for group in self
            .targets
            .iter()
            .filter(|t| t.label() == label)
            .filter_map(|t| t.output_group(output_group))
        {
            collector.walk_all(&group.nodes, &|_| true);
        }
        collector.artifacts
    }

    /// Artifacts whose relative path matches `path_filter`, from every output group whose name
    /// matches `group_filter`.
    ///
    /// Targets are walked in parallel. All walks share one visited set, so a node reachable
    /// from many targets is walked by whichever gets there first and skipped by the rest.
    pub fn matching_output_group_artifacts<G, P>(
        &self,
        group_filter: G,
        path_filter: P,
    ) -> Vec<Arc<OutputArtifact>>
    where
        G: Fn(&str) -> bool + Sync,
        P: Fn(&str) -> bool + Sync,
    {
        scoped_metric!("query");
        let visited: DashSet<NodeKey> = DashSet::new();
        let chunks: Vec<Vec<Arc<OutputArtifact>>> = self
            .targets
            .par_iter()
            .map(|target| {
                let mut found = vec![];
                for group in target
                    .output_groups
                    .iter()
                    .filter(|g| group_filter(g.name()))
                {
                    for root in &group.nodes {
                        walk_shared(root, &visited, &path_filter, &mut found);
                    }
                }
                found
            })
            .collect();
        distinct(chunks.into_iter().flatten())
    }

    /// Every artifact of every target, filtered by relative path.
    pub fn all_output_artifacts<P>(&self, path_filter: P) -> Vec<Arc<OutputArtifact>>
    where
        P: Fn(&str) -> bool,
    {
        scoped_metric!("query");
        let mut collector = Collector::default();
        for target in &self.targets {
            for group in &target.output_groups {
                collector.walk_all(&group.nodes, &path_filter);
            }
        }
        collector.artifacts
    }

    /// Artifacts listed directly in the top-level sets of a target's matching output groups,
    /// without descending into included sets.
    pub fn direct_artifacts_for_target<G, P>(
        &self,
        label: &str,
        group_filter: G,
        path_filter: P,
    ) -> Vec<Arc<OutputArtifact>>
    where
        G: Fn(&str) -> bool,
        P: Fn(&str) -> bool,
    {
        let artifacts = self
            .targets
            .iter()
            .filter(|t| t.label() == label)
            .flat_map(|t| t.output_groups.iter())
            .filter(|g| group_filter(g.name()))
            .flat_map(|g| g.nodes.iter())
            .flat_map(|node| node.direct().iter())
            .filter(|a| path_filter(a.relative_path()))
            .cloned();
        distinct(artifacts)
    }

    /// Every artifact keyed by relative path, with the groups and targets that produced it.
    pub fn full_artifact_data(&self) -> HashMap<String, ArtifactData> {
        scoped_metric!("query");
        let mut data: HashMap<String, ArtifactData> = HashMap::new();
        for target in &self.targets {
            for group in &target.output_groups {
                let mut collector = Collector::default();
                collector.walk_all(&group.nodes, &|_| true);
                for artifact in collector.artifacts {
                    let entry = data
                        .entry(artifact.relative_path().to_owned())
                        .or_insert_with(|| ArtifactData {
                            artifact: artifact.clone(),
                            output_groups: BTreeSet::new(),
                            targets: BTreeSet::new(),
                        });
                    entry.output_groups.insert(group.name.clone());
                    entry.targets.insert(target.label.clone());
                }
            }
        }
        data
    }
}

/// Sequential walk state for one query: nodes already walked and artifacts already emitted.
#[derive(Default)]
struct Collector {
    visited: HashSet<NodeKey>,
    seen: HashSet<Arc<OutputArtifact>>,
    artifacts: Vec<Arc<OutputArtifact>>,
}

impl Collector {
    fn walk_all<F>(&mut self, roots: &[Arc<ArtifactNode>], path_filter: &F)
    where
        F: Fn(&str) -> bool + ?Sized,
    {
        for root in roots {
            self.walk(root, path_filter);
        }
    }

    // Pre-order, matching `ArtifactNode::iter` with repeated sub-graphs skipped.
    fn walk<F>(&mut self, root: &Arc<ArtifactNode>, path_filter: &F)
    where
        F: Fn(&str) -> bool + ?Sized,
    {
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if !self.visited.insert(node.key().clone()) {
                continue;
            }
            for artifact in node.direct() {
                if path_filter(artifact.relative_path()) && self.seen.insert(artifact.clone()) {
                    self.artifacts.push(artifact.clone());
                }
            }
            stack.extend(node.children().iter().rev());
        }
    }
}

fn walk_shared<P>(
    root: &Arc<ArtifactNode>,
    visited: &DashSet<NodeKey>,
    path_filter: &P,
    found: &mut Vec<Arc<OutputArtifact>>,
) where
    P: Fn(&str) -> bool,
{
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        // Losing the race for a node just means another target already claimed it.
        if !visited.insert(node.key().clone()) {
            continue;
        }
        found.extend(
            node.direct()
                .iter()
                .filter(|a| path_filter(a.relative_path()))
                .cloned(),
        );
        stack.extend(node.children().iter().rev());
    }
}

fn distinct<I>(artifacts: I) -> Vec<Arc<OutputArtifact>>
where
    I: IntoIterator<Item = Arc<OutputArtifact>>,
{
    let mut seen = HashSet::new();
    artifacts
        .into_iter()
        .filter(|a| seen.insert(a.clone()))
        .collect()
}
