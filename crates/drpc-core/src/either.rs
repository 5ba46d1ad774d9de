// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Two-variant discriminated union for protocol fields whose wire shape
//! is one of two unrelated alternatives (e.g. `string | Location[]`).
//!
//! The wire format carries no type tag, so decoding needs a pair of
//! predicates evaluated against the raw JSON value before structural
//! decoding is attempted. Encoding just serializes whichever side is
//! populated.

use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::errors::UnionError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Either<L, R> {
    Left(L),
    Right(R),
}

impl<L, R> Either<L, R> {
    pub fn for_left(value: L) -> Self {
        Either::Left(value)
    }

    pub fn for_right(value: R) -> Self {
        Either::Right(value)
    }

    pub fn is_left(&self) -> bool {
        matches!(self, Either::Left(_))
    }

    pub fn is_right(&self) -> bool {
        matches!(self, Either::Right(_))
    }

    pub fn left(&self) -> Option<&L> {
        match self {
            Either::Left(value) => Some(value),
            Either::Right(_) => None,
        }
    }

    pub fn right(&self) -> Option<&R> {
        match self {
            Either::Left(_) => None,
            Either::Right(value) => Some(value),
        }
    }

    /// Consumes the union, returning the left value or `ValueAbsent`.
    pub fn into_left(self) -> Result<L, UnionError> {
        match self {
            Either::Left(value) => Ok(value),
            Either::Right(_) => Err(UnionError::ValueAbsent("left")),
        }
    }

    /// Consumes the union, returning the right value or `ValueAbsent`.
    pub fn into_right(self) -> Result<R, UnionError> {
        match self {
            Either::Left(_) => Err(UnionError::ValueAbsent("right")),
            Either::Right(value) => Ok(value),
        }
    }
}

impl<L: Serialize, R: Serialize> Serialize for Either<L, R> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Either::Left(value) => value.serialize(serializer),
            Either::Right(value) => value.serialize(serializer),
        }
    }
}

/// Decodes an ambiguous JSON value into an `Either` using the given
/// disambiguation predicates.
///
/// The predicates are expected to be mutually exclusive over the payloads the
/// call site can encounter; if both or neither match, decoding fails with
/// [`UnionError::Ambiguous`] rather than guessing.
pub fn decode_either<L, R>(
    value: &Value,
    is_left: impl Fn(&Value) -> bool,
    is_right: impl Fn(&Value) -> bool,
) -> Result<Either<L, R>, UnionError>
where
    L: DeserializeOwned,
    R: DeserializeOwned,
{
    match (is_left(value), is_right(value)) {
        (true, false) => Ok(Either::Left(serde_json::from_value(value.clone())?)),
        (false, true) => Ok(Either::Right(serde_json::from_value(value.clone())?)),
        (left_matched, right_matched) => Err(UnionError::Ambiguous {
            left_matched,
            right_matched,
        }),
    }
}

/// Predicates for the common disambiguation cases.
pub mod shape {
    use serde_json::Value;

    pub fn is_string(value: &Value) -> bool {
        value.is_string()
    }

    pub fn is_number(value: &Value) -> bool {
        value.is_number()
    }

    pub fn is_bool(value: &Value) -> bool {
        value.is_boolean()
    }

    pub fn is_array(value: &Value) -> bool {
        value.is_array()
    }

    pub fn is_object(value: &Value) -> bool {
        value.is_object()
    }

    /// Matches objects carrying the given property.
    pub fn has_key(key: &'static str) -> impl Fn(&Value) -> bool {
        move |value| value.get(key).is_some()
    }
}
