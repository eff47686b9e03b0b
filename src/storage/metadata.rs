/*
 * Copyright 2025 Vijaykumar Singh
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

//! Item metadata, positionally aligned with the vector index

use crate::core::error::{SearchError, SearchResult};
use crate::core::types::{Item, Ordinal};

/// Ordered item records. Entry `i` describes the embedding with ordinal `i`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataStore {
    items: Vec<Item>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: Vec<Item>) -> Self {
        Self { items }
    }

    pub fn append(&mut self, item: Item) -> Ordinal {
        let ordinal = self.items.len();
        self.items.push(item);
        ordinal
    }

    pub fn get(&self, ordinal: Ordinal) -> SearchResult<&Item> {
        self.items.get(ordinal).ok_or(SearchError::OutOfRange {
            ordinal,
            size: self.items.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> + '_ {
        self.items.iter()
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.items.truncate(len);
    }
}
