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

use std::{ffi::OsString, path::Path};

use bep_events::JsonLinesProvider;
use bep_outputs::parse_bep_output;
use bepq::{list_targets, select_artifacts, Config, DebugMode};

fn args(list: &[&str]) -> Vec<OsString> {
    list.iter().map(OsString::from).collect()
}

fn config(list: &[&str]) -> Config {
    Config::from_vec(args(list))
        .expect("valid arguments")
        .expect("not a help request")
}

fn fixture() -> String {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("outputs")
        .join("tests")
        .join("inputs")
        .join("build.json")
        .to_string_lossy()
        .into_owned()
}

#[test]
fn defaults() {
    let config = config(&["build.json"]);
    assert_eq!(config.event_file, "build.json");
    assert_eq!(config.output_groups, vec!["default".to_owned()]);
    assert!(config.targets.is_empty());
    assert!(config.debug_modes.is_empty());
    assert_eq!(config.parallelism, num_cpus::get());
    assert!(config.roots.is_empty());
}

#[test]
fn all_flags() {
    let config = config(&[
        "-C",
        "/work",
        "-j",
        "3",
        "-d",
        "stats",
        "-d",
        "list",
        "--execution-root",
        "/exec",
        "--output-path",
        "/exec/out",
        "--output-group",
        "srcs",
        "--output-group",
        "default",
        "--target",
        "//a:b",
        "events.json",
    ]);
    assert_eq!(config.execution_dir.as_deref(), Some("/work"));
    assert_eq!(config.parallelism, 3);
    assert_eq!(config.debug_modes, vec![DebugMode::Stats, DebugMode::List]);
    assert_eq!(config.roots.execution_root.as_deref(), Some(Path::new("/exec")));
    assert_eq!(config.roots.output_base, None);
    assert_eq!(
        config.roots.output_path().as_deref(),
        Some(Path::new("/exec/out"))
    );
    assert_eq!(config.output_groups, vec!["srcs", "default"]);
    assert_eq!(config.targets, vec!["//a:b"]);
    assert_eq!(config.event_file, "events.json");
}

#[test]
fn help() {
    assert!(Config::from_vec(args(&["--help"])).unwrap().is_none());
}

#[test]
fn bad_arguments() {
    let err = Config::from_vec(args(&["-d", "verbose", "x.json"])).unwrap_err();
    assert!(err.to_string().contains("verbose"));
    assert!(Config::from_vec(args(&[])).is_err());
    assert!(Config::from_vec(args(&["a.json", "b.json"])).is_err());
}

#[test]
fn selects_default_outputs() {
    let config = config(&[&fixture()]);
    let mut provider = JsonLinesProvider::open(&config.event_file).unwrap();
    let output = parse_bep_output(&mut provider, &config.roots).unwrap();
    let artifacts = select_artifacts(&output, &config).unwrap();
    let paths: Vec<&str> = artifacts.iter().map(|a| a.relative_path()).collect();
    assert_eq!(
        paths,
        vec![
            "k8-fastbuild/bin/java/app/app",
            "k8-fastbuild/bin/java/app/app.jar",
            "k8-fastbuild/bin/java/lib/liblib.jar",
        ]
    );
}

#[test]
fn selects_by_target() {
    let config = config(&["--target", "//java/lib:lib", "--output-group", "srcs", &fixture()]);
    let mut provider = JsonLinesProvider::open(&config.event_file).unwrap();
    let output = parse_bep_output(&mut provider, &config.roots).unwrap();
    let artifacts = select_artifacts(&output, &config).unwrap();
    assert_eq!(artifacts.len(), 1);
    assert!(artifacts[0].is_source());

    let missing = bepq::Config {
        targets: vec!["//nope:nope".to_owned()],
        ..config
    };
    assert!(select_artifacts(&output, &missing).is_err());
}

#[test]
fn lists_targets() {
    let config = config(&["-d", "list", &fixture()]);
    let mut provider = JsonLinesProvider::open(&config.event_file).unwrap();
    let output = parse_bep_output(&mut provider, &config.roots).unwrap();
    let mut out = Vec::new();
    list_targets(&output, &mut out).unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "//java/app:app [k8-fastbuild] default _hidden_top_level_INTERNAL_\n\
         //java/lib:lib [k8-fastbuild] default srcs(incomplete)\n\
         //java/broken:broken [k8-fastbuild] FAILED\n"
    );
}
