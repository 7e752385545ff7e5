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

use bep_events::{BuildEventStreamProvider, EventPayload, JsonLinesProvider};
use insta::assert_snapshot;

mod common;

fn read_all(provider: &mut impl BuildEventStreamProvider) -> Vec<bep_events::BuildEvent> {
    let mut events = vec![];
    while let Some(event) = provider.next().expect("well formed input") {
        events.push(event);
    }
    events
}

#[test]
fn decodes_a_bazel_build() {
    let path = common::input_path("build.json");
    let mut provider = JsonLinesProvider::open(&path).unwrap();
    let events = read_all(&mut provider);

    let kinds: Vec<&str> = events.iter().map(|e| e.kind()).collect();
    assert_snapshot!(kinds.join("\n"), @r###"
    started
    progress
    workspace
    pattern
    configuration
    namedSet
    namedSet
    targetCompleted
    namedSet
    targetCompleted
    targetCompleted
    buildFinished
    buildToolLogs
    "###);

    assert!(events.last().unwrap().last_message);
    assert_eq!(
        provider.bytes_consumed(),
        std::fs::metadata(&path).unwrap().len()
    );
}

#[test]
fn target_completion_keeps_output_groups_in_order() {
    let mut provider = JsonLinesProvider::open(common::input_path("build.json")).unwrap();
    let targets: Vec<_> = read_all(&mut provider)
        .into_iter()
        .filter_map(|e| match e.payload {
            EventPayload::TargetCompleted(t) => Some(t),
            _ => None,
        })
        .collect();
    assert_eq!(targets.len(), 3);

    let app = &targets[0];
    assert_eq!(app.label, "//java/app:app");
    assert_eq!(app.configuration_id.as_deref(), Some("9a3fc2"));
    let groups: Vec<(&str, &[String])> = app
        .output_groups
        .iter()
        .map(|g| (g.name.as_str(), g.file_sets.as_slice()))
        .collect();
    assert_eq!(
        groups,
        vec![
            ("default", &["1".to_owned()][..]),
            ("_hidden_top_level_INTERNAL_", &["0".to_owned()][..]),
        ]
    );

    let broken = &targets[2];
    assert!(!broken.success);
    assert!(broken.output_groups.is_empty());
}

#[test]
fn inline_contents_have_no_uri() {
    let mut provider = JsonLinesProvider::open(common::input_path("build.json")).unwrap();
    let set = read_all(&mut provider)
        .into_iter()
        .find_map(|e| match e.payload {
            EventPayload::NamedSet(set) if set.id == "2" => Some(set),
            _ => None,
        })
        .unwrap();
    assert_eq!(set.files.len(), 2);
    assert!(set.files[0].uri.is_some());
    assert!(set.files[0].path_prefix.is_empty());
    assert_eq!(set.files[1].name, "stdout");
    assert!(set.files[1].uri.is_none());
}
