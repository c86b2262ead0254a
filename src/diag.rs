//! Translation of native return codes into outcomes and errors.

use crate::api::{Api, HandleType, RawHandle, SqlReturn};
use crate::error::{Diagnostics, Error, Result};

/// Upper bound on diagnostic records read for one failing call.
const MAX_RECORDS: i16 = 64;

/// Normalized outcome of a successful native call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// No more rows / no more result sets / nothing left to retrieve.
    NoData,
}

/// Error class a failing call is reported under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    HandleAllocation,
    AttributeSet,
    Connect,
    Prepare,
    Execute,
    Describe,
    Bind,
    Fetch,
    Transaction,
    Close,
}

impl ErrorClass {
    fn wrap(self, diag: Diagnostics) -> Error {
        match self {
            ErrorClass::HandleAllocation => Error::HandleAllocation(diag),
            ErrorClass::AttributeSet => Error::AttributeSet(diag),
            ErrorClass::Connect => Error::Connect(diag),
            ErrorClass::Prepare => Error::Prepare(diag),
            ErrorClass::Execute => Error::Execute(diag),
            ErrorClass::Describe => Error::Describe(diag),
            ErrorClass::Bind => Error::Bind(diag),
            ErrorClass::Fetch => Error::Fetch(diag),
            ErrorClass::Transaction => Error::Transaction(diag),
            ErrorClass::Close => Error::Close(diag),
        }
    }
}

/// Normalize the return code of `function` called on `handle`.
pub fn check(
    api: &dyn Api,
    kind: HandleType,
    handle: RawHandle,
    function: &'static str,
    ret: SqlReturn,
    class: ErrorClass,
) -> Result<Outcome> {
    match ret {
        SqlReturn::SUCCESS => Ok(Outcome::Success),
        SqlReturn::SUCCESS_WITH_INFO => {
            if tracing::enabled!(tracing::Level::DEBUG) {
                for record in read_records(api, kind, handle) {
                    tracing::debug!(function, %record, "native call returned info");
                }
            }
            Ok(Outcome::Success)
        }
        SqlReturn::NO_DATA => Ok(Outcome::NoData),
        SqlReturn::INVALID_HANDLE => Err(Error::Internal(format!(
            "{} called with invalid {} handle {}",
            function, kind, handle
        ))),
        SqlReturn::NEED_DATA | SqlReturn::STILL_EXECUTING => Err(Error::Internal(format!(
            "{} returned unexpected {}",
            function, ret
        ))),
        _ => Err(translate(api, kind, handle, function, ret, class)),
    }
}

/// Build the error for a failing call, reading every diagnostic record of the handle.
pub fn translate(
    api: &dyn Api,
    kind: HandleType,
    handle: RawHandle,
    function: &'static str,
    ret: SqlReturn,
    class: ErrorClass,
) -> Error {
    let records = if handle.is_null() {
        Vec::new()
    } else {
        read_records(api, kind, handle)
    };
    class.wrap(Diagnostics {
        function,
        ret,
        records,
    })
}

fn read_records(api: &dyn Api, kind: HandleType, handle: RawHandle) -> Vec<crate::api::DiagRecord> {
    (1..=MAX_RECORDS)
        .map_while(|n| api.get_diag_rec(kind, handle, n))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{DiagRecord, ScriptedApi};

    #[test]
    fn test_outcomes() {
        let api = ScriptedApi::new();
        let h = RawHandle(1);
        let kind = HandleType::Stmt;
        assert_eq!(
            check(&api, kind, h, "SQLFetch", SqlReturn::SUCCESS, ErrorClass::Fetch).unwrap(),
            Outcome::Success
        );
        assert_eq!(
            check(&api, kind, h, "SQLFetch", SqlReturn::NO_DATA, ErrorClass::Fetch).unwrap(),
            Outcome::NoData
        );
        let err = check(&api, kind, h, "SQLFetch", SqlReturn::INVALID_HANDLE, ErrorClass::Fetch)
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[test]
    fn test_translate_keeps_record_order() {
        let api = ScriptedApi::new();
        let mut env = RawHandle::NULL;
        api.alloc_handle(HandleType::Env, RawHandle::NULL, &mut env);
        api.push_diag(
            env,
            vec![
                DiagRecord::new("01000", 1, "first"),
                DiagRecord::new("HY000", 2, "second"),
            ],
        );
        let err = translate(
            &api,
            HandleType::Env,
            env,
            "SQLSetEnvAttr",
            SqlReturn::ERROR,
            ErrorClass::AttributeSet,
        );
        let diag = err.diagnostics().unwrap();
        assert_eq!(diag.function, "SQLSetEnvAttr");
        assert_eq!(diag.records.len(), 2);
        assert_eq!(diag.records[0].message, "first");
        assert_eq!(diag.records[1].message, "second");
        assert!(matches!(err, Error::AttributeSet(_)));
    }
}
