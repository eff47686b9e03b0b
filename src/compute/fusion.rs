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

//! Embedding fusion policy
//!
//! Turns zero, one or two unit-norm signals (image, text) into the single
//! unit-norm vector that is stored or queried. The same policy instance must
//! serve ingestion and search, otherwise scores between items fused under
//! different weights are not comparable.

use serde::{Deserialize, Serialize};

use crate::compute::distance::axpy;
use crate::core::config::FusionConfig;
use crate::core::error::{SearchError, SearchResult};
use crate::core::types::Embedding;

/// Weighted-sum fusion of image and text embeddings.
///
/// With both signals present the result is
/// `normalize(image_weight * image + text_weight * text)`. The canonical
/// weighting is [`FusionPolicy::DEFAULT`]: 0.6 image, 0.4 text.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionPolicy {
    image_weight: f32,
    text_weight: f32,
}

impl FusionPolicy {
    pub const DEFAULT: FusionPolicy = FusionPolicy {
        image_weight: 0.6,
        text_weight: 0.4,
    };

    pub fn new(image_weight: f32, text_weight: f32) -> SearchResult<Self> {
        let valid = |w: f32| w.is_finite() && w >= 0.0;
        if !valid(image_weight) || !valid(text_weight) || image_weight + text_weight == 0.0 {
            return Err(SearchError::InvalidEmbedding(format!(
                "invalid fusion weights image={} text={}",
                image_weight, text_weight
            )));
        }
        Ok(Self {
            image_weight,
            text_weight,
        })
    }

    pub fn image_weight(&self) -> f32 {
        self.image_weight
    }

    pub fn text_weight(&self) -> f32 {
        self.text_weight
    }

    /// Combine the available signals into one unit-norm embedding.
    ///
    /// - neither present: `NoSignal`
    /// - exactly one present: returned unchanged
    /// - both present: weighted sum, re-normalized
    pub fn fuse(
        &self,
        image: Option<&Embedding>,
        text: Option<&Embedding>,
    ) -> SearchResult<Embedding> {
        match (image, text) {
            (None, None) => Err(SearchError::NoSignal),
            (Some(single), None) | (None, Some(single)) => Ok(single.clone()),
            (Some(image), Some(text)) => {
                if image.dimension() != text.dimension() {
                    return Err(SearchError::DimensionMismatch {
                        expected: image.dimension(),
                        actual: text.dimension(),
                    });
                }

                let mut combined = vec![0.0f32; image.dimension()];
                axpy(&mut combined, self.image_weight, image.as_slice());
                axpy(&mut combined, self.text_weight, text.as_slice());

                // Zero only when the weighted signals cancel out exactly
                Embedding::new(combined)
            }
        }
    }
}

impl Default for FusionPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<FusionConfig> for FusionPolicy {
    type Error = SearchError;

    fn try_from(config: FusionConfig) -> SearchResult<Self> {
        FusionPolicy::new(config.image_weight, config.text_weight)
    }
}
