// SPDX-License-Identifier: MIT
/*
 * Copyright (c) [2023 - Present] Emily Matheys <emilymatt96@gmail.com>
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to deal
 * in the Software without restriction, including without limitation the rights
 * to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
 * copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in all
 * copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
 * SOFTWARE.
 */

use thiserror::Error;

/// Errors surfaced by configuration-shaped, recoverable conditions.
///
/// Conditions that instead indicate a contract violation by the caller
/// (mismatched attribute lengths, a non-rigid transform, reading features
/// before they exist) are programmer errors and abort via `assert!`/`panic!`
/// rather than returning one of these.
#[derive(Debug, Error)]
pub enum SubmapError {
    /// A `MapperParameters` cropper discriminator did not match one of the
    /// recognized kinds (`box`, `cylinder`, `sphere`, `max-radius`).
    #[error("unrecognized cropping volume kind: {0:?}")]
    UnknownCropperKind(String),
}

/// A convenience alias for results produced by configuration parsing.
pub type SubmapResult<T> = Result<T, SubmapError>;
