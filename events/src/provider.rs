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
    collections::VecDeque,
    fs,
    io::{BufRead, BufReader},
    path::Path,
};

use tracing::debug;

use crate::{decode::EventDecoder, event::BuildEvent, StreamError};

/// A pull-based source of build events.
pub trait BuildEventStreamProvider {
    /// Returns the next event, or `None` once the stream is exhausted.
    fn next(&mut self) -> Result<Option<BuildEvent>, StreamError>;

    fn bytes_consumed(&self) -> u64;
}

/// Reads Bazel's `--build_event_json_file` format: one JSON event per line.
#[derive(Debug)]
pub struct JsonLinesProvider<R> {
    reader: R,
    decoder: EventDecoder,
    buf: String,
    line: usize,
    bytes_consumed: u64,
}

impl JsonLinesProvider<BufReader<fs::File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let file = fs::File::open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "reading build events");
        Ok(JsonLinesProvider::new(BufReader::new(file)))
    }
}

impl<R: BufRead> JsonLinesProvider<R> {
    pub fn new(reader: R) -> Self {
        JsonLinesProvider::with_decoder(reader, EventDecoder::new())
    }

    pub fn with_decoder(reader: R, decoder: EventDecoder) -> Self {
        JsonLinesProvider {
            reader,
            decoder,
            buf: String::new(),
            line: 0,
            bytes_consumed: 0,
        }
    }
}

impl<R: BufRead> BuildEventStreamProvider for JsonLinesProvider<R> {
    fn next(&mut self) -> Result<Option<BuildEvent>, StreamError> {
        loop {
            self.buf.clear();
            let read = self.reader.read_line(&mut self.buf)?;
            if read == 0 {
                return Ok(None);
            }
            self.line += 1;
            self.bytes_consumed += read as u64;
            let line = self.line;
            let json = self.buf.trim();
            if json.is_empty() {
                continue;
            }
            return self
                .decoder
                .decode_str(json)
                .map(Some)
                .map_err(|source| StreamError::Decode { line, source });
        }
    }

    fn bytes_consumed(&self) -> u64 {
        self.bytes_consumed
    }
}

/// Serves events that were already decoded, for embedders and tests.
#[derive(Debug, Default)]
pub struct EventListProvider {
    events: VecDeque<BuildEvent>,
}

impl EventListProvider {
    pub fn new<I>(events: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<BuildEvent>,
    {
        EventListProvider {
            events: events.into_iter().map(Into::into).collect(),
        }
    }
}

impl BuildEventStreamProvider for EventListProvider {
    fn next(&mut self) -> Result<Option<BuildEvent>, StreamError> {
        Ok(self.events.pop_front())
    }

    fn bytes_consumed(&self) -> u64 {
        0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::event::EventPayload;

    #[test]
    fn skips_blank_lines_and_counts_bytes() {
        let input = "{\"id\":{\"started\":{}},\"started\":{\"uuid\":\"u\"}}\n\n{\"id\":{\"progress\":{}}}\n";
        let mut provider = JsonLinesProvider::new(input.as_bytes());
        assert!(provider.next().unwrap().is_some());
        let second = provider.next().unwrap().unwrap();
        assert_eq!(second.payload, EventPayload::Other("progress".to_owned()));
        assert!(provider.next().unwrap().is_none());
        assert_eq!(provider.bytes_consumed(), input.len() as u64);
    }

    #[test]
    fn decode_errors_carry_the_line() {
        let input = "{\"id\":{\"started\":{}}}\n{not json\n";
        let mut provider = JsonLinesProvider::new(input.as_bytes());
        provider.next().unwrap();
        match provider.next().unwrap_err() {
            StreamError::Decode { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn list_provider_drains_in_order() {
        let mut provider = EventListProvider::new(vec![
            EventPayload::Other("a".to_owned()),
            EventPayload::Other("b".to_owned()),
        ]);
        assert_eq!(provider.next().unwrap().unwrap().kind(), "a");
        assert_eq!(provider.next().unwrap().unwrap().kind(), "b");
        assert!(provider.next().unwrap().is_none());
        assert_eq!(provider.bytes_consumed(), 0);
    }
}
