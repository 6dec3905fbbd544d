//! Owned handle over either kind of engine object.

use mixtile_core::{Error, NumericArray, Result};

use crate::TiledMatrix;

/// A numeric array or a tiled matrix, passed across an API boundary that
/// does not know which one it holds.
#[derive(Debug)]
pub enum ObjectHandle {
    Array(NumericArray),
    Tiled(TiledMatrix),
}

const ARRAY: &str = "numeric array";
const TILED: &str = "tiled matrix";

impl ObjectHandle {
    /// Human-readable kind of the held object.
    pub fn kind(&self) -> &'static str {
        match self {
            ObjectHandle::Array(_) => ARRAY,
            ObjectHandle::Tiled(_) => TILED,
        }
    }

    fn mismatch(&self, expected: &'static str) -> Error {
        Error::Type {
            expected,
            actual: self.kind(),
        }
    }

    pub fn as_array(&self) -> Result<&NumericArray> {
        match self {
            ObjectHandle::Array(array) => Ok(array),
            _ => Err(self.mismatch(ARRAY)),
        }
    }

    pub fn as_array_mut(&mut self) -> Result<&mut NumericArray> {
        match self {
            ObjectHandle::Array(array) => Ok(array),
            other => Err(other.mismatch(ARRAY)),
        }
    }

    pub fn as_tiled(&self) -> Result<&TiledMatrix> {
        match self {
            ObjectHandle::Tiled(tiled) => Ok(tiled),
            _ => Err(self.mismatch(TILED)),
        }
    }

    pub fn as_tiled_mut(&mut self) -> Result<&mut TiledMatrix> {
        match self {
            ObjectHandle::Tiled(tiled) => Ok(tiled),
            other => Err(other.mismatch(TILED)),
        }
    }

    pub fn into_array(self) -> Result<NumericArray> {
        match self {
            ObjectHandle::Array(array) => Ok(array),
            other => Err(other.mismatch(ARRAY)),
        }
    }

    pub fn into_tiled(self) -> Result<TiledMatrix> {
        match self {
            ObjectHandle::Tiled(tiled) => Ok(tiled),
            other => Err(other.mismatch(TILED)),
        }
    }
}

impl From<NumericArray> for ObjectHandle {
    fn from(array: NumericArray) -> Self {
        ObjectHandle::Array(array)
    }
}

impl From<TiledMatrix> for ObjectHandle {
    fn from(tiled: TiledMatrix) -> Self {
        ObjectHandle::Tiled(tiled)
    }
}
