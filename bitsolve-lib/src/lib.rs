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

//! This crate implements two pieces of a bit-vector SMT solver: a
//! normalization pass that rewrites chains of associative and
//! commutative operators into a canonical coefficient form
//! ([normalize]), and a counterexample-guided quantifier
//! instantiation loop for quantified bit-vector formulas ([quant]).
//!
//! Both are built over a hash-consed term DAG ([node]) and a small
//! bit-blasting ground solver ([smt]).

pub mod bitvector;
pub mod config;
pub mod error;
pub mod eval;
pub mod log;
pub mod node;
pub mod normalize;
pub mod quant;
pub mod rewrite;
pub mod smt;
