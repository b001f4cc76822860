// ============================================================
// Layer 4 — Batch Stream
// ============================================================
// Groups tuples from a TextReader into training batches.
//
// How batching works here:
//   1. read a window of up to `batch * sortk` tuples
//   2. drop tuples longer than the per-side word limit
//   3. optionally sort the window by (target, source) length
//      so batches hold similarly sized sentences
//   4. cut the window into batches of at most `batch` tuples
//
// Position:
//   A stream position is (reader tuples consumed before the
//   current window, batches already handed out of it). Because
//   the window is a pure function of the reader position, a
//   resumed stream rebuilds it and drops the batches already
//   seen, reproducing the uninterrupted batch sequence.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::data::reader::TextReader;

/// One batch of raw line tuples.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LineBatch {
    pub rows: Vec<Vec<String>>,
}

impl LineBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All lines of input `i`.
    pub fn column(&self, i: usize) -> Vec<String> {
        self.rows.iter().map(|r| r[i].clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreamPosition {
    /// Reader tuples consumed before the current window
    pub lines:   usize,
    /// Batches already yielded from the current window
    pub batches: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    pub batch: usize,
    /// Window size in batches; 1 disables sorting
    pub sortk: usize,
    /// Word limit per input, 0 disables; inputs past the list are unchecked
    pub limit: Vec<usize>,
}

pub struct BatchStream {
    reader:       TextReader,
    options:      BatchOptions,
    window:       VecDeque<LineBatch>,
    window_start: usize,
    yielded:      usize,
}

impl BatchStream {
    pub fn new(reader: TextReader, options: BatchOptions) -> Self {
        let options = BatchOptions {
            batch: options.batch.max(1),
            sortk: options.sortk.max(1),
            limit: options.limit,
        };
        Self { reader, options, window: VecDeque::new(), window_start: 0, yielded: 0 }
    }

    pub fn reader(&self) -> &TextReader {
        &self.reader
    }

    pub fn reader_mut(&mut self) -> &mut TextReader {
        &mut self.reader
    }

    pub fn position(&self) -> StreamPosition {
        StreamPosition { lines: self.window_start, batches: self.yielded }
    }

    /// Move to a previously recorded position of the same epoch.
    pub fn seek(&mut self, position: StreamPosition) {
        self.reset_window();
        self.reader.reset_position();
        self.reader.advance(position.lines);
        self.window_start = self.reader.position();
        if position.batches > 0 {
            self.fill_window();
            for _ in 0..position.batches {
                if self.window.pop_front().is_none() {
                    break;
                }
                self.yielded += 1;
            }
        }
    }

    /// Rewind for `epoch`.
    pub fn reset(&mut self, epoch: usize) {
        self.reader.reset(epoch);
        self.reset_window();
    }

    fn reset_window(&mut self) {
        self.window.clear();
        self.window_start = 0;
        self.yielded = 0;
    }

    fn accept(&self, tuple: &[String]) -> bool {
        self.options
            .limit
            .iter()
            .zip(tuple)
            .all(|(&limit, line)| limit == 0 || line.split_whitespace().count() <= limit)
    }

    fn fill_window(&mut self) {
        self.window_start = self.reader.position();
        self.yielded = 0;

        let capacity = self.options.batch * self.options.sortk;
        let mut tuples: Vec<Vec<String>> = Vec::with_capacity(capacity);
        while tuples.len() < capacity {
            match self.reader.next() {
                Some(t) if self.accept(&t) => tuples.push(t),
                Some(_) => continue,
                None => break,
            }
        }

        if self.options.sortk > 1 {
            tuples.sort_by_key(|t| {
                let words = |i: usize| t.get(i).map_or(0, |l| l.split_whitespace().count());
                (words(1), words(0))
            });
        }

        let batch = self.options.batch;
        let mut rows = tuples.into_iter().peekable();
        while rows.peek().is_some() {
            let chunk: Vec<Vec<String>> = rows.by_ref().take(batch).collect();
            self.window.push_back(LineBatch { rows: chunk });
        }
    }
}

impl Iterator for BatchStream {
    type Item = LineBatch;

    fn next(&mut self) -> Option<LineBatch> {
        if self.window.is_empty() {
            self.fill_window();
        }
        let batch = self.window.pop_front()?;
        self.yielded += 1;
        Some(batch)
    }
}
