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
    collections::{hash_map::Entry, HashMap},
    sync::Arc,
};

use bep_events::{File, NamedSetOfFiles};
use bep_intern::Interner;

use crate::BepError;

/// A file reference from a named set, with every string interned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub name: Arc<str>,
    pub uri: Option<Arc<str>>,
    pub path_prefix: Vec<Arc<str>>,
}

impl FileRef {
    pub fn intern(file: &File, interner: &mut Interner) -> FileRef {
        FileRef {
            name: interner.intern(&file.name),
            uri: file.uri.as_ref().map(|uri| interner.intern(uri)),
            path_prefix: interner.intern_all(&file.path_prefix),
        }
    }
}

/// One node of the shared file-set graph, exactly as the stream described it.
#[derive(Debug)]
pub struct NamedFileSet {
    id: Arc<str>,
    files: Vec<FileRef>,
    children: Vec<Arc<str>>,
}

impl NamedFileSet {
    pub fn new(id: Arc<str>, files: Vec<FileRef>, children: Vec<Arc<str>>) -> NamedFileSet {
        NamedFileSet {
            id,
            files,
            children,
        }
    }

    pub fn intern(set: &NamedSetOfFiles, interner: &mut Interner) -> NamedFileSet {
        NamedFileSet {
            id: interner.intern(&set.id),
            files: set
                .files
                .iter()
                .map(|f| FileRef::intern(f, interner))
                .collect(),
            children: interner.intern_all(&set.file_sets),
        }
    }

    pub fn id(&self) -> &Arc<str> {
        &self.id
    }

    pub fn files(&self) -> &[FileRef] {
        &self.files
    }

    /// Ids of the sets this one includes, in declaration order.
    pub fn children(&self) -> &[Arc<str>] {
        &self.children
    }
}

/// Every named set seen in one stream, keyed by id. Lives for a single parse.
#[derive(Debug, Default)]
pub struct FileSetStore {
    sets: HashMap<Arc<str>, NamedFileSet>,
}

impl FileSetStore {
    pub fn new() -> FileSetStore {
        FileSetStore::default()
    }

    /// Stores a set. Ids are unique within a stream, so a second definition means the stream
    /// is malformed or was replayed.
    pub fn define(&mut self, set: NamedFileSet) -> Result<(), BepError> {
        match self.sets.entry(set.id.clone()) {
            Entry::Occupied(e) => Err(BepError::DuplicateFileSet(e.key().to_string())),
            Entry::Vacant(e) => {
                e.insert(set);
                Ok(())
            }
        }
    }

    pub fn get(&self, id: &str) -> Result<&NamedFileSet, BepError> {
        self.sets
            .get(id)
            .ok_or_else(|| BepError::UndefinedFileSet(id.to_owned()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sets.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}
