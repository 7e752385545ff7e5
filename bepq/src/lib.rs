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

use std::{
    collections::HashSet,
    ffi::OsString,
    io::{self, Write},
    sync::Arc,
};

use anyhow::{self, Context};
use pico_args::Arguments;
use thiserror::Error;
use tracing::warn;

use bep_events::JsonLinesProvider;
use bep_metrics::scoped_metric;
use bep_outputs::{parse_bep_output, BuildResult, BuildRoots, OutputArtifact, ParsedOutput};

pub const USAGE: &str = "\
usage: bepq [options] EVENTS_FILE

Prints the output artifacts recorded in a Bazel --build_event_json_file.

options:
  -C DIR                   change to DIR before doing anything else
  -j N                     query with N threads [default: number of CPUs]
  -d MODE                  enable debugging: 'stats' prints resolver statistics and
                           timings, 'list' lists targets instead of artifacts
  --execution-root DIR     execution root, as printed by 'bazel info execution_root'
  --output-base DIR        output base, as printed by 'bazel info output_base'
  --output-path DIR        output path [default: EXECUTION_ROOT/bazel-out]
  --output-group NAME      output group to list, may be repeated [default: default]
  --target LABEL           only list artifacts of LABEL, may be repeated
  -h, --help               print this message
";

/// Debugging aids selected with `-d`.
#[derive(Debug, PartialEq, Eq)]
pub enum DebugMode {
    /// List the completed targets and their output groups instead of artifacts.
    List,
    Stats,
}

#[derive(Error, Debug)]
#[error("Unknown debug setting '{0}'")]
pub struct DebugModeError(String);

impl std::str::FromStr for DebugMode {
    type Err = DebugModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stats" => Ok(DebugMode::Stats),
            "list" => Ok(DebugMode::List),
            e => Err(DebugModeError(e.to_owned())),
        }
    }
}

#[derive(Debug)]
pub struct Config {
    pub execution_dir: Option<String>,
    pub parallelism: usize,
    pub event_file: String,
    pub debug_modes: Vec<DebugMode>,
    pub roots: BuildRoots,
    pub output_groups: Vec<String>,
    pub targets: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Option<Config>> {
        Config::from_args(Arguments::from_env())
    }

    pub fn from_vec(args: Vec<OsString>) -> anyhow::Result<Option<Config>> {
        Config::from_args(Arguments::from_vec(args))
    }

    /// `None` means help was requested.
    pub fn from_args(mut args: Arguments) -> anyhow::Result<Option<Config>> {
        if args.contains(["-h", "--help"]) {
            return Ok(None);
        }
        let execution_dir: Option<String> = args.opt_value_from_str("-C")?;
        let parallelism = match args.opt_value_from_str::<_, usize>("-j")? {
            Some(0) | None => num_cpus::get(),
            Some(n) => n,
        };
        let debug_modes: Vec<DebugMode> = args.values_from_str("-d")?;

        let mut roots = BuildRoots::new();
        if let Some(root) = args.opt_value_from_str::<_, String>("--execution-root")? {
            roots = roots.with_execution_root(root);
        }
        if let Some(base) = args.opt_value_from_str::<_, String>("--output-base")? {
            roots = roots.with_output_base(base);
        }
        if let Some(path) = args.opt_value_from_str::<_, String>("--output-path")? {
            roots = roots.with_output_path(path);
        }
        let mut output_groups: Vec<String> = args.values_from_str("--output-group")?;
        if output_groups.is_empty() {
            output_groups.push("default".to_owned());
        }
        let targets: Vec<String> = args.values_from_str("--target")?;

        let mut free = args.free()?;
        let event_file = match free.len() {
            0 => anyhow::bail!("missing build event file\n\n{}", USAGE),
            1 => free.remove(0),
            _ => anyhow::bail!("expected a single build event file, got {}", free.join(" ")),
        };

        Ok(Some(Config {
            execution_dir,
            parallelism,
            event_file,
            debug_modes,
            roots,
            output_groups,
            targets,
        }))
    }

    fn has_debug_mode(&self, mode: DebugMode) -> bool {
        self.debug_modes.iter().any(|m| m == &mode)
    }
}

/// The artifacts `config` asks for. Sorted, since the parallel query has no fixed order.
pub fn select_artifacts(
    output: &ParsedOutput,
    config: &Config,
) -> anyhow::Result<Vec<Arc<OutputArtifact>>> {
    let groups: HashSet<&str> = config.output_groups.iter().map(|g| g.as_str()).collect();
    let mut artifacts = if config.targets.is_empty() {
        output.matching_output_group_artifacts(|g| groups.contains(g), |_| true)
    } else {
        let mut seen = HashSet::new();
        let mut artifacts = vec![];
        for label in &config.targets {
            if output.target(label).is_none() {
                anyhow::bail!("unknown target '{}'", label);
            }
            for group in &config.output_groups {
                for artifact in output.target_output_group_artifacts(label, group) {
                    if seen.insert(artifact.clone()) {
                        artifacts.push(artifact);
                    }
                }
            }
        }
        artifacts
    };
    artifacts.sort_by(|a, b| a.relative_path().cmp(b.relative_path()));
    Ok(artifacts)
}

/// One line per completed target: label, configuration, status and output groups.
pub fn list_targets(output: &ParsedOutput, out: &mut dyn Write) -> io::Result<()> {
    for target in output.targets() {
        write!(
            out,
            "{} [{}]",
            target.label(),
            target.configuration_mnemonic().unwrap_or("?")
        )?;
        if !target.success() {
            write!(out, " FAILED")?;
        }
        for group in target.output_groups() {
            if group.is_incomplete() {
                write!(out, " {}(incomplete)", group.name())?;
            } else {
                write!(out, " {}", group.name())?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

pub fn run(config: Config) -> anyhow::Result<()> {
    if let Some(dir) = &config.execution_dir {
        std::env::set_current_dir(&dir).with_context(|| format!("changing to {} for -C", &dir))?;
    }

    let metrics_enabled = config.has_debug_mode(DebugMode::Stats);
    if metrics_enabled {
        bep_metrics::enable();
    }
    let mut provider = JsonLinesProvider::open(&config.event_file)
        .with_context(|| format!("opening {}", &config.event_file))?;
    let output = {
        scoped_metric!("parse");
        parse_bep_output(&mut provider, &config.roots)
            .with_context(|| format!("parsing {}", &config.event_file))?
    };
    if !output.is_complete() {
        warn!(file = %config.event_file, "build event stream ends before the build finished");
    } else if output.build_result() != BuildResult::Success {
        warn!(
            result = ?output.build_result(),
            exit_code = output.exit_code_name().unwrap_or("?"),
            "build did not succeed, outputs may be missing"
        );
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if config.has_debug_mode(DebugMode::List) {
        list_targets(&output, &mut out)?;
    } else {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallelism)
            .build_global()
        {
            warn!(error = %e, "keeping the existing thread pool");
        }
        // Query metrics are recorded per thread, and only this thread's are dumped below.
        let artifacts = select_artifacts(&output, &config)?;
        for artifact in artifacts {
            writeln!(out, "{}", artifact.path().display())?;
        }
    }

    if metrics_enabled {
        let stats = output.stats();
        eprintln!(
            "file sets resolved: {}, cache hits: {}, artifacts dropped: {}, bytes read: {}",
            stats.file_sets_resolved,
            stats.cache_hits,
            stats.artifacts_dropped,
            output.bytes_consumed()
        );
        bep_metrics::dump();
    }
    Ok(())
}
