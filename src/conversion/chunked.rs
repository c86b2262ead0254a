//! Chunked retrieval of deferred columns.

use crate::api::{Api, CType, HandleType, NO_TOTAL, NULL_DATA, RawHandle};
use crate::diag::{ErrorClass, Outcome, check};
use crate::error::{Error, Result};

use super::{Value, ValueKind, convert_bound, decode_variable};

/// Buffer sizes for chunked retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLimits {
    /// Size of the first get-data buffer.
    pub initial: usize,
    /// Upper bound on the buffer passed to a single get-data call.
    pub max: usize,
}

impl Default for ChunkLimits {
    fn default() -> Self {
        Self {
            initial: 1024,
            max: 1024 * 1024,
        }
    }
}

impl ChunkLimits {
    /// Clamp a requested buffer size to the limits, keeping room for the
    /// terminator plus at least one character.
    fn clamp(&self, size: usize, c_type: CType) -> usize {
        let floor = c_type.terminator_len() + if c_type == CType::WCHAR { 2 } else { 1 };
        let size = size.min(self.max).max(floor);
        if c_type == CType::WCHAR {
            // a chunk must never split a UTF-16 code unit
            size & !1
        } else {
            size
        }
    }
}

/// Retrieve a deferred column of the current row.
///
/// Fixed-width representations take a single call. Character and binary
/// data is read with a growing buffer until the driver reports the value
/// complete: the buffer doubles while the total length is unknown and is
/// sized to the remainder once the driver reports it.
pub fn read_deferred(
    api: &dyn Api,
    stmt: RawHandle,
    column: u16,
    c_type: CType,
    target: ValueKind,
    limits: ChunkLimits,
) -> Result<Value> {
    if let Some(width) = c_type.fixed_width() {
        let mut buf = vec![0u8; width];
        let mut indicator: isize = 0;
        let ret = api.get_data(stmt, column, c_type, &mut buf, &mut indicator);
        if check(api, HandleType::Stmt, stmt, "SQLGetData", ret, ErrorClass::Fetch)?
            == Outcome::NoData
        {
            return Err(Error::Internal(format!(
                "column {} was already retrieved for this row",
                column
            )));
        }
        return convert_bound(c_type, target, &buf, indicator);
    }

    let terminator = c_type.terminator_len();
    let mut buf = vec![0u8; limits.clamp(limits.initial, c_type)];
    let mut data = Vec::new();
    let mut chunks = 0usize;

    loop {
        let mut indicator: isize = 0;
        let ret = api.get_data(stmt, column, c_type, &mut buf, &mut indicator);
        let outcome = check(api, HandleType::Stmt, stmt, "SQLGetData", ret, ErrorClass::Fetch)?;
        tracing::trace!(column, chunk = chunks, buffer = buf.len(), indicator, "get data");
        if outcome == Outcome::NoData {
            if chunks == 0 {
                return Err(Error::Internal(format!(
                    "column {} was already retrieved for this row",
                    column
                )));
            }
            break;
        }
        chunks += 1;

        if indicator == NULL_DATA {
            return Ok(Value::Null);
        }
        let capacity = buf.len() - terminator;
        let remaining = match indicator {
            NO_TOTAL => None,
            n => Some(usize::try_from(n).map_err(|_| {
                Error::Internal(format!("SQLGetData returned indicator {}", n))
            })?),
        };
        match remaining {
            Some(len) if len <= capacity => {
                data.extend_from_slice(&buf[..len]);
                break;
            }
            Some(len) => {
                data.extend_from_slice(&buf[..capacity]);
                let next = limits.clamp(len - capacity + terminator, c_type);
                buf.resize(next, 0);
            }
            None => {
                data.extend_from_slice(&buf[..capacity]);
                let next = limits.clamp(buf.len().saturating_mul(2), c_type);
                buf.resize(next, 0);
            }
        }
    }

    if chunks > 1 {
        tracing::trace!(column, chunks, len = data.len(), "assembled chunked column");
    }
    decode_variable(c_type, target, &data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp() {
        let limits = ChunkLimits {
            initial: 7,
            max: 33,
        };
        assert_eq!(limits.clamp(7, CType::CHAR), 7);
        assert_eq!(limits.clamp(7, CType::WCHAR), 6);
        assert_eq!(limits.clamp(100, CType::BINARY), 33);
        assert_eq!(limits.clamp(100, CType::WCHAR), 32);
        assert_eq!(limits.clamp(0, CType::CHAR), 2);
        assert_eq!(limits.clamp(0, CType::WCHAR), 4);
        assert_eq!(limits.clamp(0, CType::BINARY), 1);
    }
}
