use custom_error::custom_error;
use std::io::Error as IoError;

// the following type alias is needed because the `custom_error!` macro doesn't
// allow `&` in type specifications.
type Str = &'static str;

custom_error! {#[derive(Clone)] pub Fail
    IoError{} = "IO error",
    Malformed{details: Str} = "encountered a malformed datagram ({details})",
    Misdelivered{} = "datagram addressed to an unknown channel",
    WrongDirection{details: Str} = "message type not valid for this role ({details})",
    Ignored{details: Str} = "operation had no effect ({details})",
    OutOfRange{details: Str} = "a value is out of range ({details})",
    ResourceNotFound{details: Str} = "resource not found ({details})",
    Timeout{} = "an operation timed out",
    Disposed{} = "session has already been disposed",
}

impl From<IoError> for Fail {
    fn from(_: IoError) -> Self {
        Fail::IoError {}
    }
}
