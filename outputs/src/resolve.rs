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

//! Memoized resolution of the named-set graph.
//!
//! Each (set, configuration mnemonic) pair is resolved once into an [`ArtifactNode`]. Nodes keep
//! their children by reference instead of flattening them, so a set shared by many targets costs
//! one node no matter how often it is reached.

use std::{
    collections::{hash_map::Entry, HashMap},
    slice,
    sync::Arc,
};

use petgraph::{
    algo::toposort,
    graph::{DiGraph, NodeIndex},
    visit::DfsPostOrder,
};

use crate::{
    artifact::OutputArtifact,
    classify::{classify, BuildRoots},
    store::FileSetStore,
    BepError,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeKey {
    pub file_set: Arc<str>,
    pub mnemonic: Arc<str>,
}

impl NodeKey {
    pub fn new(file_set: Arc<str>, mnemonic: Arc<str>) -> NodeKey {
        NodeKey { file_set, mnemonic }
    }
}

/// One resolved set: its own artifacts plus the resolved sets it includes.
#[derive(Debug)]
pub struct ArtifactNode {
    key: NodeKey,
    direct: Vec<Arc<OutputArtifact>>,
    children: Vec<Arc<ArtifactNode>>,
}

impl ArtifactNode {
    pub fn key(&self) -> &NodeKey {
        &self.key
    }

    /// Artifacts listed by this set itself, in declaration order.
    pub fn direct(&self) -> &[Arc<OutputArtifact>] {
        &self.direct
    }

    pub fn children(&self) -> &[Arc<ArtifactNode>] {
        &self.children
    }

    /// Walks the whole closure: direct artifacts first, then each child in declaration order.
    /// Artifacts reachable along several paths are yielded once per path.
    pub fn iter(&self) -> Artifacts<'_> {
        Artifacts {
            direct: self.direct.iter(),
            pending: self.children.iter().rev().map(|c| &**c).collect(),
        }
    }

    pub fn artifacts(&self) -> Vec<Arc<OutputArtifact>> {
        self.iter().cloned().collect()
    }
}

pub struct Artifacts<'a> {
    direct: slice::Iter<'a, Arc<OutputArtifact>>,
    pending: Vec<&'a ArtifactNode>,
}

impl<'a> Iterator for Artifacts<'a> {
    type Item = &'a Arc<OutputArtifact>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(artifact) = self.direct.next() {
                return Some(artifact);
            }
            let node = self.pending.pop()?;
            self.direct = node.direct.iter();
            self.pending.extend(node.children.iter().rev().map(|c| &**c));
        }
    }
}

type FileSetGraph = DiGraph<Arc<str>, ()>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverStats {
    /// Distinct (set, mnemonic) pairs walked.
    pub file_sets_resolved: usize,
    /// Lookups answered from the cache.
    pub cache_hits: usize,
    /// File references the classifier rejected.
    pub artifacts_dropped: usize,
}

pub struct OutputGraphResolver<'a> {
    store: &'a FileSetStore,
    roots: &'a BuildRoots,
    cache: HashMap<NodeKey, Arc<ArtifactNode>>,
    stats: ResolverStats,
}

impl<'a> OutputGraphResolver<'a> {
    pub fn new(store: &'a FileSetStore, roots: &'a BuildRoots) -> OutputGraphResolver<'a> {
        OutputGraphResolver {
            store,
            roots,
            cache: HashMap::new(),
            stats: ResolverStats::default(),
        }
    }

    pub fn stats(&self) -> ResolverStats {
        self.stats
    }

    /// Resolves `file_set` under `mnemonic`, reusing every node resolved before.
    ///
    /// The sets not yet in the cache are gathered into a graph first and built in post-order
    /// from the root, so a set is only built once all of its children are in the cache.
    pub fn resolve(
        &mut self,
        file_set: &Arc<str>,
        mnemonic: &Arc<str>,
    ) -> Result<Arc<ArtifactNode>, BepError> {
        let root = NodeKey::new(file_set.clone(), mnemonic.clone());
        if let Some(node) = self.cache.get(&root) {
            self.stats.cache_hits += 1;
            return Ok(node.clone());
        }

        let (graph, start) = self.unresolved_graph(file_set, mnemonic)?;
        if let Err(cycle) = toposort(&graph, None) {
            return Err(BepError::CyclicFileSet(graph[cycle.node_id()].to_string()));
        }

        let mut dfs = DfsPostOrder::new(&graph, start);
        while let Some(index) = dfs.next(&graph) {
            let node = self.build_node(NodeKey::new(graph[index].clone(), mnemonic.clone()))?;
            self.cache.insert(node.key.clone(), node);
        }

        self.cache
            .get(&root)
            .cloned()
            .ok_or_else(|| BepError::UndefinedFileSet(file_set.to_string()))
    }

    /// Sets reachable from `file_set` that have no node for `mnemonic` yet, with an edge from
    /// each set to every child it includes. Cached children end the descent.
    fn unresolved_graph(
        &self,
        file_set: &Arc<str>,
        mnemonic: &Arc<str>,
    ) -> Result<(FileSetGraph, NodeIndex), BepError> {
        let mut graph = FileSetGraph::new();
        let mut indices: HashMap<Arc<str>, NodeIndex> = HashMap::new();
        let start = graph.add_node(file_set.clone());
        indices.insert(file_set.clone(), start);

        let mut pending = vec![(file_set.clone(), start)];
        while let Some((id, index)) = pending.pop() {
            let set = self.store.get(&id)?;
            for child in set.children() {
                if self
                    .cache
                    .contains_key(&NodeKey::new(child.clone(), mnemonic.clone()))
                {
                    continue;
                }
                let child_index = match indices.entry(child.clone()) {
                    Entry::Occupied(e) => *e.get(),
                    Entry::Vacant(e) => {
                        let child_index = graph.add_node(child.clone());
                        pending.push((child.clone(), child_index));
                        *e.insert(child_index)
                    }
                };
                graph.update_edge(index, child_index, ());
            }
        }
        Ok((graph, start))
    }

    fn build_node(&mut self, key: NodeKey) -> Result<Arc<ArtifactNode>, BepError> {
        let store = self.store;
        let set = store.get(&key.file_set)?;
        let mut direct = Vec::with_capacity(set.files().len());
        for file in set.files() {
            match classify(file, &key.mnemonic, self.roots) {
                Some(artifact) => direct.push(Arc::new(artifact)),
                None => self.stats.artifacts_dropped += 1,
            }
        }
        let mut children = Vec::with_capacity(set.children().len());
        for child in set.children() {
            let child_key = NodeKey::new(child.clone(), key.mnemonic.clone());
            match self.cache.get(&child_key) {
                Some(node) => children.push(node.clone()),
                None => return Err(BepError::UndefinedFileSet(child.to_string())),
            }
        }
        self.stats.file_sets_resolved += 1;
        Ok(Arc::new(ArtifactNode {
            key,
            direct,
            children,
        }))
    }
}
