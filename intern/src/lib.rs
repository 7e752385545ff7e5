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

use std::{collections::HashSet, sync::Arc};

// A build event stream repeats the same handful of strings (URIs, path prefixes, labels,
// configuration ids) thousands of times. Everything the reducer keeps goes through here so each
// distinct string is allocated once per parse.
#[derive(Debug, Default)]
pub struct Interner {
    strings: HashSet<Arc<str>>,
    requests: usize,
}

// Rough translation of HashMap entry API to be more ergonomic.
#[derive(Debug, PartialEq, Eq)]
pub enum InsertResult {
    AlreadyExists(Arc<str>),
    Inserted(Arc<str>),
}

impl InsertResult {
    pub fn into_inner(self) -> Arc<str> {
        match self {
            InsertResult::AlreadyExists(s) => s,
            InsertResult::Inserted(s) => s,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InternStats {
    pub requests: usize,
    pub unique: usize,
}

impl Interner {
    pub fn new() -> Interner {
        Interner::default()
    }

    pub fn insert(&mut self, s: &str) -> InsertResult {
        self.requests += 1;
        if let Some(existing) = self.strings.get(s) {
            return InsertResult::AlreadyExists(existing.clone());
        }
        let shared: Arc<str> = Arc::from(s);
        self.strings.insert(shared.clone());
        InsertResult::Inserted(shared)
    }

    pub fn intern(&mut self, s: &str) -> Arc<str> {
        self.insert(s).into_inner()
    }

    pub fn intern_all<'s, I>(&mut self, strings: I) -> Vec<Arc<str>>
    where
        I: IntoIterator<Item = &'s String>,
    {
        strings.into_iter().map(|s| self.intern(s)).collect()
    }

    pub fn contains(&self, s: &str) -> bool {
        self.strings.contains(s)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn stats(&self) -> InternStats {
        InternStats {
            requests: self.requests,
            unique: self.strings.len(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{InsertResult, Interner};
    use std::sync::Arc;

    #[test]
    fn same_string_is_shared() {
        let mut interner = Interner::new();
        let a = interner.intern("file:///execroot/bazel-out/k8-fastbuild/bin/a.jar");
        let b = interner.intern(&String::from(
            "file:///execroot/bazel-out/k8-fastbuild/bin/a.jar",
        ));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(interner.len(), 1);
    }

    #[test]
    fn insert_reports_existing() {
        let mut interner = Interner::new();
        assert!(matches!(interner.insert("k8-opt"), InsertResult::Inserted(_)));
        assert!(matches!(
            interner.insert("k8-opt"),
            InsertResult::AlreadyExists(_)
        ));
        assert!(interner.contains("k8-opt"));
        assert!(!interner.contains("k8-dbg"));
    }

    #[test]
    fn stats_count_requests_and_unique() {
        let mut interner = Interner::new();
        let prefixes = vec![
            "bazel-out".to_owned(),
            "k8-fastbuild".to_owned(),
            "bin".to_owned(),
            "bazel-out".to_owned(),
        ];
        let interned = interner.intern_all(&prefixes);
        assert_eq!(interned.len(), 4);
        assert!(Arc::ptr_eq(&interned[0], &interned[3]));
        let stats = interner.stats();
        assert_eq!(stats.requests, 4);
        assert_eq!(stats.unique, 3);
    }
}
