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

//! Concrete evaluation of terms. Booleans evaluate to width-1
//! bitvectors. Quantifiers are evaluated by enumerating every value
//! of the bound parameter, so they are only supported for narrow
//! parameters.

use std::collections::HashMap;

use crate::bitvector::BitVector;
use crate::error::Error;
use crate::node::{post_order_with, Kind, Node, NodeManager, Sort};

/// The widest quantified parameter [eval] will enumerate.
pub const MAX_QUANTIFIED_WIDTH: u32 = 12;

/// An assignment to variables and uninterpreted functions. Variables
/// and function applications missing from the model are zero.
#[derive(Clone, Debug, Default)]
pub struct Model {
    pub vars: HashMap<Node, BitVector>,
    pub funs: HashMap<Node, HashMap<Vec<BitVector>, BitVector>>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fun_value(&self, uf: Node, args: &[BitVector]) -> Option<BitVector> {
        self.funs.get(&uf).and_then(|table| table.get(args)).copied()
    }
}

fn zero_of(sort: &Sort) -> BitVector {
    match sort {
        Sort::BitVec(w) | Sort::Fun(_, w) => BitVector::zeros(*w),
        Sort::Bool => BitVector::from_bool(false),
    }
}

/// Evaluate a single operator on concrete arguments. Returns `None`
/// for kinds that are not operators over values (symbols,
/// quantifiers and function applications).
pub fn eval_op(kind: Kind, args: &[BitVector]) -> Option<Result<BitVector, Error>> {
    use Kind::*;
    let bool = BitVector::from_bool;
    let r = match kind {
        Value | Var | Param | Uf | Forall | Exists | Apply => return None,
        Not => !args[0],
        And => args[0] & args[1],
        Or => args[0] | args[1],
        Implies => !args[0] | args[1],
        Ite => {
            if args[0].is_true() {
                args[1]
            } else {
                args[2]
            }
        }
        Equal => bool(args[0] == args[1]),
        BvNot => !args[0],
        BvNeg => -args[0],
        BvAnd => args[0] & args[1],
        BvOr => args[0] | args[1],
        BvXor => args[0] ^ args[1],
        BvAdd => args[0] + args[1],
        BvMul => args[0] * args[1],
        BvUdiv => args[0].udiv(args[1]),
        BvUrem => args[0].urem(args[1]),
        BvShl => args[0].shl(args[1]),
        BvShr => args[0].lshr(args[1]),
        BvAshr => args[0].ashr(args[1]),
        BvUlt => bool(args[0].ult(args[1])),
        BvSlt => bool(args[0].slt(args[1])),
        BvConcat => return Some(args[0].concat(args[1])),
        BvExtract(hi, lo) => args[0].extract(hi, lo),
    };
    Some(Ok(r))
}

struct Evaluator<'a> {
    nm: &'a NodeManager,
    model: &'a Model,
    bound: HashMap<Node, BitVector>,
}

impl<'a> Evaluator<'a> {
    fn symbol(&self, n: Node) -> BitVector {
        self.bound
            .get(&n)
            .or_else(|| self.model.vars.get(&n))
            .copied()
            .unwrap_or_else(|| zero_of(self.nm.sort(n)))
    }

    fn quantifier(&mut self, n: Node) -> Result<BitVector, Error> {
        let param = self.nm.child(n, 0);
        let body = self.nm.child(n, 1);
        let width = self.nm.width(param);
        if width > MAX_QUANTIFIED_WIDTH {
            return Err(Error::Unsupported(format!("evaluating a quantifier over {} bits", width)));
        }
        let forall = self.nm.kind(n) == Kind::Forall;
        let saved = self.bound.get(&param).copied();
        let mut result = forall;
        for v in 0..(1u64 << width) {
            self.bound.insert(param, BitVector::new(v, width));
            if self.eval(body)?.is_true() != forall {
                result = !forall;
                break;
            }
        }
        match saved {
            Some(v) => self.bound.insert(param, v),
            None => self.bound.remove(&param),
        };
        Ok(BitVector::from_bool(result))
    }

    fn eval(&mut self, root: Node) -> Result<BitVector, Error> {
        let mut values: HashMap<Node, BitVector> = HashMap::new();
        let nm = self.nm;
        for n in post_order_with(nm, &[root], |n| !nm.kind(n).is_quantifier()) {
            let v = match self.nm.kind(n) {
                Kind::Value => self.nm.bv_value(n),
                Kind::Var | Kind::Param => self.symbol(n),
                Kind::Uf => zero_of(self.nm.sort(n)),
                Kind::Forall | Kind::Exists => self.quantifier(n)?,
                Kind::Apply => {
                    let children = self.nm.children(n);
                    let args: Vec<BitVector> = children[1..].iter().map(|c| values[c]).collect();
                    self.model.fun_value(children[0], &args).unwrap_or_else(|| zero_of(self.nm.sort(n)))
                }
                kind => {
                    let args: Vec<BitVector> = self.nm.children(n).iter().map(|c| values[c]).collect();
                    match eval_op(kind, &args) {
                        Some(r) => r?,
                        None => return Err(Error::Unreachable(format!("cannot evaluate {}", kind.name()))),
                    }
                }
            };
            values.insert(n, v);
        }
        Ok(values[&root])
    }
}

/// Evaluate `root` under `model`.
pub fn eval(nm: &NodeManager, model: &Model, root: Node) -> Result<BitVector, Error> {
    Evaluator { nm, model, bound: HashMap::new() }.eval(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_arith() {
        let mut nm = NodeManager::new();
        let x = nm.mk_bv_var(4, "x");
        let y = nm.mk_bv_var(4, "y");
        let s = nm.mk_sub(x, y);
        let m = nm.mk_mul(s, x);
        let mut model = Model::new();
        model.vars.insert(x, BitVector::new(3, 4));
        model.vars.insert(y, BitVector::new(5, 4));
        assert_eq!(eval(&nm, &model, m).unwrap(), BitVector::new(10, 4))
    }

    #[test]
    fn test_eval_quantifier() {
        let mut nm = NodeManager::new();
        let p = nm.mk_param(4, "p");
        let x = nm.mk_bv_var(4, "x");
        let le = nm.mk_ule(p, x);
        let q = nm.mk_forall(p, le);
        let mut model = Model::new();
        model.vars.insert(x, BitVector::new(14, 4));
        assert!(!eval(&nm, &model, q).unwrap().is_true());
        model.vars.insert(x, BitVector::ones(4));
        assert!(eval(&nm, &model, q).unwrap().is_true());
    }

    #[test]
    fn test_eval_uf() {
        let mut nm = NodeManager::new();
        let f = nm.mk_uf(vec![4], 4, "f");
        let x = nm.mk_bv_var(4, "x");
        let app = nm.mk_apply(f, &[x]);
        let mut model = Model::new();
        model.vars.insert(x, BitVector::new(2, 4));
        let mut table = HashMap::new();
        table.insert(vec![BitVector::new(2, 4)], BitVector::new(9, 4));
        model.funs.insert(f, table);
        assert_eq!(eval(&nm, &model, app).unwrap(), BitVector::new(9, 4));
        model.vars.insert(x, BitVector::new(3, 4));
        assert_eq!(eval(&nm, &model, app).unwrap(), BitVector::zeros(4))
    }

    #[test]
    fn test_wide_quantifier_unsupported() {
        let mut nm = NodeManager::new();
        let p = nm.mk_param(32, "p");
        let t = nm.mk_eq(p, p);
        let q = nm.mk_exists(p, t);
        assert!(eval(&nm, &Model::new(), q).is_err())
    }
}
