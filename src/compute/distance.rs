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

//! Scalar vector kernels used by the index and the fusion policy
//!
//! Every stored and queried embedding is unit-norm, so the inner product is
//! the cosine similarity and no per-comparison normalization is needed.

/// Inner product of two equal-length vectors.
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let len = a.len().min(b.len());
    let chunks = len / 4;
    let mut acc = [0.0f32; 4];

    // Four independent accumulators keep the loop free of a serial dependency
    for i in 0..chunks {
        let base = i * 4;
        acc[0] += a[base] * b[base];
        acc[1] += a[base + 1] * b[base + 1];
        acc[2] += a[base + 2] * b[base + 2];
        acc[3] += a[base + 3] * b[base + 3];
    }

    let mut sum = (acc[0] + acc[1]) + (acc[2] + acc[3]);
    for i in (chunks * 4)..len {
        sum += a[i] * b[i];
    }
    sum
}

/// Euclidean (L2) norm.
#[inline]
pub fn l2_norm(v: &[f32]) -> f32 {
    dot_product(v, v).sqrt()
}

/// `acc += weight * v`, element-wise.
#[inline]
pub fn axpy(acc: &mut [f32], weight: f32, v: &[f32]) {
    debug_assert_eq!(acc.len(), v.len());
    for (a, x) in acc.iter_mut().zip(v) {
        *a += weight * x;
    }
}
