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

use proptest::prelude::*;

use super::{parse_bep_output, BuildRoots, ParsedOutput};
use bep_events::{
    BuildEvent, Configuration, EventListProvider, EventPayload, File, NamedSetOfFiles,
    OutputGroup, TargetCompleted,
};
use std::collections::HashSet;

/// Sets only include sets with a lower index, so the graph is always acyclic.
#[derive(Debug, Clone)]
struct Graph {
    /// (file numbers, child set indices) per set.
    sets: Vec<(Vec<usize>, Vec<usize>)>,
    /// ("default" sets, "extra" sets) per target.
    targets: Vec<(Vec<usize>, Vec<usize>)>,
}

fn graph_strategy() -> impl Strategy<Value = Graph> {
    (1usize..10)
        .prop_flat_map(|n| {
            let sets = (0..n)
                .map(|i| {
                    let children = if i == 0 {
                        Just(Vec::<usize>::new()).boxed()
                    } else {
                        prop::collection::vec(0..i, 0..3).boxed()
                    };
                    (prop::collection::vec(0usize..6, 0..3), children)
                })
                .collect::<Vec<_>>();
            let targets = prop::collection::vec(
                (
                    prop::collection::vec(0..n, 0..3),
                    prop::collection::vec(0..n, 0..2),
                ),
                1..5,
            );
            (sets, targets)
        })
        .prop_map(|(sets, targets)| Graph { sets, targets })
}

fn file(number: usize) -> File {
    let name = format!("f{}", number);
    let uri = format!("file:///exec/bazel-out/k8/bin/{}", name);
    File::new(name, uri).with_prefix(vec!["bazel-out", "k8", "bin"])
}

fn group(name: &str, sets: &[usize]) -> OutputGroup {
    OutputGroup {
        name: name.to_owned(),
        file_sets: sets.iter().map(|s| s.to_string()).collect(),
        incomplete: false,
    }
}

fn events(graph: &Graph) -> Vec<BuildEvent> {
    let mut events: Vec<BuildEvent> = vec![EventPayload::Configuration(Configuration {
        id: "cfg".to_owned(),
        mnemonic: "k8".to_owned(),
    })
    .into()];
    for (i, (files, children)) in graph.sets.iter().enumerate() {
        events.push(
            EventPayload::NamedSet(NamedSetOfFiles {
                id: i.to_string(),
                files: files.iter().map(|f| file(*f)).collect(),
                file_sets: children.iter().map(|c| c.to_string()).collect(),
            })
            .into(),
        );
    }
    for (t, (default, extra)) in graph.targets.iter().enumerate() {
        events.push(
            EventPayload::TargetCompleted(TargetCompleted {
                label: format!("//pkg:t{}", t),
                configuration_id: Some("cfg".to_owned()),
                success: true,
                output_groups: vec![group("default", default), group("extra", extra)],
            })
            .into(),
        );
    }
    events
}

fn parse(graph: &Graph) -> ParsedOutput {
    let mut provider = EventListProvider::new(events(graph));
    parse_bep_output(&mut provider, &BuildRoots::new()).expect("acyclic graph parses")
}

fn flatten(graph: &Graph, set: usize, out: &mut Vec<String>) {
    let (files, children) = &graph.sets[set];
    out.extend(files.iter().map(|f| format!("k8/bin/f{}", f)));
    for child in children {
        flatten(graph, *child, out);
    }
}

fn naive_distinct(graph: &Graph, default_only: bool) -> Vec<String> {
    let mut all = vec![];
    for (default, extra) in &graph.targets {
        for set in default {
            flatten(graph, *set, &mut all);
        }
        if !default_only {
            for set in extra {
                flatten(graph, *set, &mut all);
            }
        }
    }
    let mut seen = HashSet::new();
    all.into_iter().filter(|p| seen.insert(p.clone())).collect()
}

fn reachable(graph: &Graph) -> usize {
    let mut seen = HashSet::new();
    let mut stack: Vec<usize> = graph
        .targets
        .iter()
        .flat_map(|(default, extra)| default.iter().chain(extra.iter()).cloned())
        .collect();
    while let Some(set) = stack.pop() {
        if seen.insert(set) {
            stack.extend(graph.sets[set].1.iter().cloned());
        }
    }
    seen.len()
}

fn paths(artifacts: &[std::sync::Arc<crate::OutputArtifact>]) -> Vec<String> {
    artifacts
        .iter()
        .map(|a| a.relative_path().to_owned())
        .collect()
}

proptest! {
    #[test]
    fn group_query_matches_naive_flatten(graph in graph_strategy()) {
        let first = paths(&parse(&graph).output_group_artifacts("default"));
        let second = paths(&parse(&graph).output_group_artifacts("default"));
        prop_assert_eq!(&first, &second, "fresh parses must agree on order");
        prop_assert_eq!(first, naive_distinct(&graph, true));
    }

    #[test]
    fn each_reachable_set_is_resolved_once(graph in graph_strategy()) {
        let output = parse(&graph);
        prop_assert_eq!(output.stats().file_sets_resolved, reachable(&graph));
    }

    #[test]
    fn parallel_query_emits_each_artifact_once(graph in graph_strategy()) {
        let output = parse(&graph);
        let matching = paths(&output.matching_output_group_artifacts(|_| true, |_| true));
        let unique: HashSet<String> = matching.iter().cloned().collect();
        prop_assert_eq!(unique.len(), matching.len());

        let expected: HashSet<String> = naive_distinct(&graph, false).into_iter().collect();
        prop_assert_eq!(&unique, &expected);
        let sequential: HashSet<String> =
            paths(&output.all_output_artifacts(|_| true)).into_iter().collect();
        prop_assert_eq!(&sequential, &expected);
    }
}
