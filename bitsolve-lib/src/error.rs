// MIT License
//
// Copyright (c) 2019 Alasdair Armstrong
//
// Permission is hereby granted, free of charge, to any person
// obtaining a copy of this software and associated documentation
// files (the "Software"), to deal in the Software without
// restriction, including without limitation the rights to use, copy,
// modify, merge, publish, distribute, sublicense, and/or sell copies
// of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be
// included in all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND,
// EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF
// MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
// NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS
// BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN
// ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

use std::error;
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    Type(&'static str),
    /// Raised for inputs outside the supported fragment, such as
    /// bitvectors wider than 64 bits or a quantifier nested below an
    /// `ite` or equality.
    Unsupported(String),
    /// Errors while reading a configuration file.
    Config(String),
    /// Used for cases that should be unreachable (i.e. are definite
    /// errors).
    Unreachable(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Error::*;
        match self {
            Type(msg) => write!(f, "Type error: {}", msg),
            Unsupported(msg) => write!(f, "Unsupported: {}", msg),
            Config(msg) => write!(f, "Configuration error: {}", msg),
            Unreachable(msg) => write!(f, "Unreachable: {}", msg),
        }
    }
}

impl error::Error for Error {}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Config(msg)
    }
}
