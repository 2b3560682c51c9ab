// BSD 2-Clause License
//
// Copyright (c) 2019, 2020 Alasdair Armstrong
//
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without
// modification, are permitted provided that the following conditions are
// met:
//
// 1. Redistributions of source code must retain the above copyright
// notice, this list of conditions and the following disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright
// notice, this list of conditions and the following disclaimer in the
// documentation and/or other materials provided with the distribution.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS
// "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT
// LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR
// A PARTICULAR PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT
// HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT
// LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE,
// DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY
// THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT
// (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE
// OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! A light term rewriter: constant folding plus a handful of
//! neutral and absorbing element rules. The normalizer runs it before
//! and after each of its rewrites.

use std::collections::HashMap;

use crate::eval::eval_op;
use crate::bitvector::BitVector;
use crate::node::{rebuild, Kind, Node, NodeManager, Rebuild, Sort, Visit};

pub struct Rewriter<'a> {
    nm: &'a mut NodeManager,
}

impl<'a> Rewriter<'a> {
    pub fn new(nm: &'a mut NodeManager) -> Self {
        Rewriter { nm }
    }

    fn fold(&mut self, kind: Kind, children: &[Node]) -> Option<Node> {
        if !children.iter().all(|c| self.nm.is_value(*c)) {
            return None;
        }
        let args: Vec<_> = children.iter().map(|c| self.nm.bv_value(*c)).collect();
        let value = eval_op(kind, &args)?.ok()?;
        let sort = match kind {
            Kind::Not | Kind::And | Kind::Or | Kind::Implies | Kind::Equal | Kind::BvUlt | Kind::BvSlt => Sort::Bool,
            Kind::Ite => self.nm.sort(children[1]).clone(),
            _ => Sort::BitVec(value.len()),
        };
        Some(self.nm.mk_const(&sort, value))
    }

    fn value_is(&self, n: Node, pred: fn(BitVector) -> bool) -> bool {
        self.nm.value(n).map_or(false, pred)
    }

    /// Simplify `kind(children)`, assuming the children are already
    /// simplified.
    pub fn simplify(&mut self, kind: Kind, children: &[Node]) -> Node {
        use Kind::*;
        if let Some(n) = self.fold(kind, children) {
            return n;
        }
        match (kind, children) {
            (BvAdd, &[a, b]) | (BvOr, &[a, b]) | (BvXor, &[a, b]) if self.value_is(b, |v| v.is_zero()) => a,
            (BvAdd, &[a, b]) | (BvOr, &[a, b]) | (BvXor, &[a, b]) if self.value_is(a, |v| v.is_zero()) => b,
            (BvMul, &[a, b]) if self.value_is(b, |v| v.is_one()) => a,
            (BvMul, &[a, b]) if self.value_is(a, |v| v.is_one()) => b,
            (BvMul, &[a, _]) | (BvAnd, &[a, _]) if self.value_is(a, |v| v.is_zero()) => a,
            (BvMul, &[_, b]) | (BvAnd, &[_, b]) if self.value_is(b, |v| v.is_zero()) => b,
            (BvAnd, &[a, b]) if self.value_is(b, |v| v.is_ones()) => a,
            (BvAnd, &[a, b]) if self.value_is(a, |v| v.is_ones()) => b,
            (BvAnd, &[a, b]) | (BvOr, &[a, b]) if a == b => a,
            (BvXor, &[a, b]) if a == b => {
                let w = self.nm.width(a);
                self.nm.mk_zero(w)
            }
            (BvNot, &[a]) if self.nm.kind(a) == BvNot => self.nm.child(a, 0),
            (BvNeg, &[a]) if self.nm.kind(a) == BvNeg => self.nm.child(a, 0),
            (Not, &[a]) if self.nm.kind(a) == Not => self.nm.child(a, 0),
            (Equal, &[a, b]) if a == b => self.nm.mk_true(),
            (BvUlt, &[a, b]) | (BvSlt, &[a, b]) if a == b => self.nm.mk_false(),
            (And, &[a, b]) | (Or, &[a, b]) if a == b => a,
            (And, &[a, b]) if self.nm.is_true(a) => b,
            (And, &[a, b]) if self.nm.is_true(b) => a,
            (And, &[a, _]) if self.nm.is_false(a) => a,
            (And, &[_, b]) if self.nm.is_false(b) => b,
            (Or, &[a, b]) if self.nm.is_false(a) => b,
            (Or, &[a, b]) if self.nm.is_false(b) => a,
            (Or, &[a, _]) if self.nm.is_true(a) => a,
            (Or, &[_, b]) if self.nm.is_true(b) => b,
            (Implies, &[a, b]) if self.nm.is_true(a) => b,
            (Implies, &[a, _]) if self.nm.is_false(a) => self.nm.mk_true(),
            (Ite, &[c, t, _]) if self.nm.is_true(c) => t,
            (Ite, &[c, _, e]) if self.nm.is_false(c) => e,
            (Ite, &[_, t, e]) if t == e => t,
            _ => self.nm.mk_node(kind, children),
        }
    }
}

impl<'a> Rebuild for Rewriter<'a> {
    fn source(&self) -> &NodeManager {
        self.nm
    }

    fn enter(&mut self, n: Node) -> Visit {
        if self.nm.num_children(n) == 0 {
            Visit::Done(n)
        } else {
            Visit::Descend
        }
    }

    fn leave(&mut self, n: Node, children: Vec<Node>) -> Node {
        let kind = self.nm.kind(n);
        self.simplify(kind, &children)
    }
}

/// Rewrite `n`, memoizing results in `cache`.
pub fn rewrite(nm: &mut NodeManager, cache: &mut HashMap<Node, Node>, n: Node) -> Node {
    rebuild(&mut Rewriter::new(nm), cache, n)
}
