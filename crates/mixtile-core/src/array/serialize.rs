//! Binary encoding of arrays.
//!
//! ```text
//! u64 precision code | u64 count | u8 matrix flag | [u64 rows | u64 cols] | count * width bytes
//! ```
//!
//! All integers and elements are little-endian.

use super::{Dimensions, NumericArray};
use crate::buffer::HostBuffer;
use crate::config::get_context;
use crate::{Error, Precision, Result};

fn swap_to_little_endian(bytes: &mut [u8], width: usize) {
    if cfg!(target_endian = "big") {
        for element in bytes.chunks_exact_mut(width) {
            element.reverse();
        }
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        if self.bytes.len() < n {
            return Err(Error::Serialization(format!(
                "stream truncated while reading {what}"
            )));
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Ok(head)
    }

    fn u64(&mut self, what: &str) -> Result<u64> {
        let mut word = [0u8; 8];
        word.copy_from_slice(self.take(8, what)?);
        Ok(u64::from_le_bytes(word))
    }

    fn usize(&mut self, what: &str) -> Result<usize> {
        let value = self.u64(what)?;
        usize::try_from(value)
            .map_err(|_| Error::Serialization(format!("{what} {value} does not fit in memory")))
    }

    fn u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }
}

impl NumericArray {
    /// Encode precision, shape and raw elements.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let host = self.holder.read_host()?;
        let mut out = Vec::with_capacity(33 + host.len());

        out.extend_from_slice(&self.precision.code().to_le_bytes());
        out.extend_from_slice(&(self.len as u64).to_le_bytes());
        match self.dims {
            Some(dims) => {
                out.push(1);
                out.extend_from_slice(&(dims.rows as u64).to_le_bytes());
                out.extend_from_slice(&(dims.cols as u64).to_le_bytes());
            }
            None => out.push(0),
        }

        let start = out.len();
        out.extend_from_slice(host.as_bytes());
        swap_to_little_endian(&mut out[start..], self.precision.width());
        Ok(out)
    }

    /// Decode an array written by [`NumericArray::serialize`].
    ///
    /// The stream must contain exactly one array.
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader { bytes };

        let code = reader.u64("precision code")?;
        let precision = Precision::from_code(code)
            .map_err(|_| Error::Serialization(format!("unknown precision code {code}")))?;
        let count = reader.usize("element count")?;

        let dims = match reader.u8("matrix flag")? {
            0 => None,
            1 => {
                let rows = reader.usize("row count")?;
                let cols = reader.usize("column count")?;
                if rows.checked_mul(cols) != Some(count) {
                    return Err(Error::Serialization(format!(
                        "{rows}x{cols} matrix does not hold {count} elements"
                    )));
                }
                Some(Dimensions::new(rows, cols))
            }
            flag => {
                return Err(Error::Serialization(format!("invalid matrix flag {flag}")));
            }
        };

        let expected = count.checked_mul(precision.width()).ok_or_else(|| {
            Error::Serialization(format!("element count {count} overflows"))
        })?;
        if reader.bytes.len() != expected {
            return Err(Error::Serialization(format!(
                "expected {expected} element bytes, found {}",
                reader.bytes.len()
            )));
        }

        let mut host = HostBuffer::from_bytes(reader.bytes);
        swap_to_little_endian(host.as_bytes_mut(), precision.width());

        let mut array = Self::from_host(host, count, precision, get_context());
        array.dims = dims;
        Ok(array)
    }
}
