use std::error;
use std::fmt;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Storage(String),
    Encoding(String),
    IteratorOutOfRange(String),
    Capacity(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error. {}", e),
            Error::Storage(msg) => write!(f, "Storage error. {}", msg),
            Error::Encoding(msg) => write!(f, "Encoding error. {}", msg),
            Error::IteratorOutOfRange(msg) => write!(f, "Iterator out of range. {}", msg),
            Error::Capacity(msg) => write!(f, "Capacity error. {}", msg),
        }
    }
}

impl error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

#[macro_export]
macro_rules! err {
    ($variant:ident, $($arg:tt)*) => {
        $crate::error::Error::$variant(format!($($arg)*))
    };
}
