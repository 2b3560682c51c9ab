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

//! Enumerative synthesis of terms from input/output examples.
//!
//! Terms are enumerated bottom-up by size. Each candidate is
//! evaluated on every example as it is built, and a candidate whose
//! outputs match an earlier one is dropped, so the search only keeps
//! one term per observable behaviour.

use std::collections::{HashMap, HashSet};

use crate::bitvector::BitVector;
use crate::eval::{eval, Model};
use crate::node::{Node, NodeManager};
use crate::smt::Terminator;

/// A synthesized (or explicit) interpretation of a variable, and the
/// enumeration limit it was found with.
#[derive(Clone, Copy, Debug)]
pub struct SynthResult {
    /// True for an if-then-else table over the known examples rather
    /// than a closed form.
    pub partial: bool,
    pub limit: u32,
    pub value: Node,
}

#[derive(Clone, Debug)]
pub struct Example {
    pub inputs: Vec<BitVector>,
    pub output: BitVector,
}

/// Does `candidate`, a term over `inputs`, produce the expected
/// output on every example?
pub fn check_candidate(nm: &NodeManager, candidate: Node, inputs: &[Node], examples: &[Example]) -> bool {
    let mut model = Model::new();
    examples.iter().all(|ex| {
        for (input, v) in inputs.iter().zip(ex.inputs.iter()) {
            model.vars.insert(*input, *v);
        }
        eval(nm, &model, candidate).map_or(false, |r| r == ex.output)
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Op {
    Not,
    Neg,
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Shl,
    Lshr,
    Udiv,
    Urem,
}

const UNARY: [Op; 2] = [Op::Not, Op::Neg];

const BINARY: [Op; 10] =
    [Op::Add, Op::Sub, Op::Mul, Op::And, Op::Or, Op::Xor, Op::Shl, Op::Lshr, Op::Udiv, Op::Urem];

impl Op {
    fn is_commutative(self) -> bool {
        matches!(self, Op::Add | Op::Mul | Op::And | Op::Or | Op::Xor)
    }

    fn apply(self, x: BitVector, y: BitVector) -> BitVector {
        match self {
            Op::Not => !x,
            Op::Neg => -x,
            Op::Add => x + y,
            Op::Sub => x - y,
            Op::Mul => x * y,
            Op::And => x & y,
            Op::Or => x | y,
            Op::Xor => x ^ y,
            Op::Shl => x.shl(y),
            Op::Lshr => x.lshr(y),
            Op::Udiv => x.udiv(y),
            Op::Urem => x.urem(y),
        }
    }

    fn build(self, nm: &mut NodeManager, x: Node, y: Node) -> Node {
        use crate::node::Kind::*;
        match self {
            Op::Not => nm.mk_bvnot(x),
            Op::Neg => nm.mk_neg(x),
            Op::Add => nm.mk_add(x, y),
            Op::Sub => nm.mk_sub(x, y),
            Op::Mul => nm.mk_mul(x, y),
            Op::And => nm.mk_node(BvAnd, &[x, y]),
            Op::Or => nm.mk_node(BvOr, &[x, y]),
            Op::Xor => nm.mk_node(BvXor, &[x, y]),
            Op::Shl => nm.mk_node(BvShl, &[x, y]),
            Op::Lshr => nm.mk_node(BvShr, &[x, y]),
            Op::Udiv => nm.mk_node(BvUdiv, &[x, y]),
            Op::Urem => nm.mk_node(BvUrem, &[x, y]),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Cmp {
    Eq,
    Ult,
}

#[derive(Clone, Copy, Debug)]
enum Expr {
    Leaf(Node),
    Unary(Op, usize),
    Binary(Op, usize, usize),
    /// `ite(lhs cmp rhs, then, else)`, comparing two leaves
    Ite(Cmp, usize, usize, usize, usize),
}

enum Step {
    Found(usize),
    Continue,
    Exhausted,
}

struct Enumerator<'a> {
    target: Vec<BitVector>,
    exprs: Vec<Expr>,
    values: Vec<Vec<BitVector>>,
    by_size: Vec<Vec<usize>>,
    seen: HashSet<Vec<BitVector>>,
    budget: u32,
    terminator: &'a Terminator,
}

impl<'a> Enumerator<'a> {
    fn add(&mut self, size: usize, expr: Expr, values: Vec<BitVector>) -> Step {
        if self.budget == 0 || (self.budget % 256 == 0 && self.terminator.terminate()) {
            return Step::Exhausted;
        }
        self.budget -= 1;
        if !self.seen.insert(values.clone()) {
            return Step::Continue;
        }
        let i = self.exprs.len();
        let found = values == self.target;
        self.exprs.push(expr);
        self.values.push(values);
        if self.by_size.len() <= size {
            self.by_size.resize(size + 1, Vec::new())
        }
        self.by_size[size].push(i);
        if found {
            Step::Found(i)
        } else {
            Step::Continue
        }
    }

    fn of_size(&self, size: usize) -> Vec<usize> {
        self.by_size.get(size).cloned().unwrap_or_default()
    }

    fn unary(&mut self, size: usize) -> Step {
        for x in self.of_size(size - 1) {
            for op in UNARY.iter() {
                let values = self.values[x].iter().map(|v| op.apply(*v, *v)).collect();
                match self.add(size, Expr::Unary(*op, x), values) {
                    Step::Continue => (),
                    step => return step,
                }
            }
        }
        Step::Continue
    }

    fn binary(&mut self, size: usize) -> Step {
        for lsize in 1..size - 1 {
            let rsize = size - 1 - lsize;
            for x in self.of_size(lsize) {
                for y in self.of_size(rsize) {
                    for op in BINARY.iter() {
                        if op.is_commutative() && x > y {
                            continue;
                        }
                        let values = self.values[x].iter().zip(self.values[y].iter()).map(|(a, b)| op.apply(*a, *b)).collect();
                        match self.add(size, Expr::Binary(*op, x, y), values) {
                            Step::Continue => (),
                            step => return step,
                        }
                    }
                }
            }
        }
        Step::Continue
    }

    fn ite(&mut self, size: usize) -> Step {
        if size < 4 {
            return Step::Continue;
        }
        let leaves = self.of_size(1);
        for tsize in 1..size - 2 {
            let esize = size - 2 - tsize;
            for t in self.of_size(tsize) {
                for e in self.of_size(esize) {
                    for a in &leaves {
                        for b in &leaves {
                            if a == b {
                                continue;
                            }
                            for cmp in &[Cmp::Eq, Cmp::Ult] {
                                if *cmp == Cmp::Eq && a > b {
                                    continue;
                                }
                                let values = (0..self.target.len())
                                    .map(|i| {
                                        let (x, y) = (self.values[*a][i], self.values[*b][i]);
                                        let c = match cmp {
                                            Cmp::Eq => x == y,
                                            Cmp::Ult => x.ult(y),
                                        };
                                        if c {
                                            self.values[t][i]
                                        } else {
                                            self.values[e][i]
                                        }
                                    })
                                    .collect();
                                match self.add(size, Expr::Ite(*cmp, *a, *b, t, e), values) {
                                    Step::Continue => (),
                                    step => return step,
                                }
                            }
                        }
                    }
                }
            }
        }
        Step::Continue
    }

    fn largest_size(&self) -> usize {
        self.by_size.iter().rposition(|exprs| !exprs.is_empty()).unwrap_or(0)
    }

    fn build(&self, nm: &mut NodeManager, root: usize) -> Node {
        let mut built: HashMap<usize, Node> = HashMap::new();
        let mut stack = vec![root];
        while let Some(&i) = stack.last() {
            if built.contains_key(&i) {
                stack.pop();
                continue;
            }
            let operands: Vec<usize> = match self.exprs[i] {
                Expr::Leaf(_) => vec![],
                Expr::Unary(_, x) => vec![x],
                Expr::Binary(_, x, y) => vec![x, y],
                Expr::Ite(_, a, b, t, e) => vec![a, b, t, e],
            };
            let pending: Vec<usize> = operands.iter().copied().filter(|j| !built.contains_key(j)).collect();
            if !pending.is_empty() {
                stack.extend(pending);
                continue;
            }
            let n = match self.exprs[i] {
                Expr::Leaf(n) => n,
                Expr::Unary(op, x) => op.build(nm, built[&x], built[&x]),
                Expr::Binary(op, x, y) => op.build(nm, built[&x], built[&y]),
                Expr::Ite(cmp, a, b, t, e) => {
                    let cond = match cmp {
                        Cmp::Eq => nm.mk_eq(built[&a], built[&b]),
                        Cmp::Ult => nm.mk_ult(built[&a], built[&b]),
                    };
                    nm.mk_ite(cond, built[&t], built[&e])
                }
            };
            built.insert(i, n);
            stack.pop();
        }
        built[&root]
    }
}

/// Resize an input to the output width.
fn fit(nm: &mut NodeManager, n: Node, width: u32) -> Node {
    let w = nm.width(n);
    if w < width {
        nm.mk_zero_extend(n, width - w)
    } else if w > width {
        nm.mk_extract(n, width - 1, 0)
    } else {
        n
    }
}

fn fit_value(v: BitVector, width: u32) -> BitVector {
    if v.len() < width {
        v.zero_extend(width)
    } else if v.len() > width {
        v.extract(width - 1, 0)
    } else {
        v
    }
}

/// Search for a term over `inputs` that maps the inputs of every
/// example to its output. Leaves are the inputs, `consts` of the
/// output width, zero and one. At most `limit` candidate terms are
/// evaluated.
pub fn synthesize_term(
    nm: &mut NodeManager,
    inputs: &[Node],
    examples: &[Example],
    consts: &[Node],
    limit: u32,
    terminator: &Terminator,
) -> Option<Node> {
    let width = examples.first()?.output.len();

    let mut outputs: HashMap<&[BitVector], BitVector> = HashMap::new();
    for ex in examples {
        if *outputs.entry(ex.inputs.as_slice()).or_insert(ex.output) != ex.output {
            return None;
        }
    }

    let mut e = Enumerator {
        target: examples.iter().map(|ex| ex.output).collect(),
        exprs: Vec::new(),
        values: Vec::new(),
        by_size: vec![Vec::new(); 2],
        seen: HashSet::new(),
        budget: limit,
        terminator,
    };

    let mut leaves = Vec::new();
    for (i, input) in inputs.iter().enumerate() {
        let leaf = fit(nm, *input, width);
        leaves.push((leaf, examples.iter().map(|ex| fit_value(ex.inputs[i], width)).collect::<Vec<_>>()))
    }
    for c in consts.iter().chain([nm.mk_zero(width), nm.mk_one(width)].iter()) {
        let v = nm.bv_value(*c);
        if v.len() == width {
            leaves.push((*c, vec![v; examples.len()]))
        }
    }
    for (leaf, values) in leaves {
        match e.add(1, Expr::Leaf(leaf), values) {
            Step::Found(i) => return Some(e.build(nm, i)),
            Step::Exhausted => return None,
            Step::Continue => (),
        }
    }

    let mut size = 2;
    while size <= 2 * e.largest_size() + 4 {
        for phase in 0..3 {
            let step = match phase {
                0 => e.ite(size),
                1 => e.unary(size),
                _ => e.binary(size),
            };
            match step {
                Step::Found(i) => return Some(e.build(nm, i)),
                Step::Exhausted => return None,
                Step::Continue => (),
            }
        }
        size += 1
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn examples(rows: &[(&[u64], u64)], width: u32) -> Vec<Example> {
        rows.iter()
            .map(|(ins, out)| Example {
                inputs: ins.iter().map(|v| BitVector::new(*v, width)).collect(),
                output: BitVector::new(*out, width),
            })
            .collect()
    }

    #[test]
    fn test_synthesize_increment() {
        let mut nm = NodeManager::new();
        let x = nm.mk_param(8, "x");
        let exs = examples(&[(&[0], 1), (&[5], 6), (&[255], 0), (&[17], 18)], 8);
        let t = synthesize_term(&mut nm, &[x], &exs, &[], 1000, &Terminator::never()).unwrap();
        assert!(check_candidate(&nm, t, &[x], &exs))
    }

    #[test]
    fn test_synthesize_constant() {
        let mut nm = NodeManager::new();
        let x = nm.mk_param(4, "x");
        let seven = nm.mk_value(BitVector::new(7, 4));
        let exs = examples(&[(&[0], 7), (&[3], 7)], 4);
        let t = synthesize_term(&mut nm, &[x], &exs, &[seven], 10, &Terminator::never()).unwrap();
        assert_eq!(t, seven)
    }

    #[test]
    fn test_synthesize_ite() {
        let mut nm = NodeManager::new();
        let x = nm.mk_param(4, "x");
        let y = nm.mk_param(4, "y");
        let exs = examples(&[(&[6, 9], 9), (&[9, 6], 9), (&[3, 3], 3), (&[12, 5], 12), (&[2, 10], 10)], 4);
        let t = synthesize_term(&mut nm, &[x, y], &exs, &[], 10000, &Terminator::never()).unwrap();
        assert!(check_candidate(&nm, t, &[x, y], &exs))
    }

    #[test]
    fn test_mixed_widths() {
        let mut nm = NodeManager::new();
        let x = nm.mk_param(2, "x");
        let exs = vec![
            Example { inputs: vec![BitVector::new(3, 2)], output: BitVector::new(3, 8) },
            Example { inputs: vec![BitVector::new(1, 2)], output: BitVector::new(1, 8) },
        ];
        let t = synthesize_term(&mut nm, &[x], &exs, &[], 10, &Terminator::never()).unwrap();
        assert_eq!(nm.width(t), 8);
        assert!(check_candidate(&nm, t, &[x], &exs))
    }

    #[test]
    fn test_contradictory_examples() {
        let mut nm = NodeManager::new();
        let x = nm.mk_param(4, "x");
        let exs = examples(&[(&[1], 2), (&[1], 3)], 4);
        assert!(synthesize_term(&mut nm, &[x], &exs, &[], 10000, &Terminator::never()).is_none())
    }

    #[test]
    fn test_limit() {
        let mut nm = NodeManager::new();
        let x = nm.mk_param(8, "x");
        let y = nm.mk_param(8, "y");
        let exs = examples(&[(&[3, 4], 181), (&[10, 1], 7), (&[0, 0], 99)], 8);
        assert!(synthesize_term(&mut nm, &[x, y], &exs, &[], 20, &Terminator::never()).is_none())
    }

    #[test]
    fn test_check_candidate() {
        let mut nm = NodeManager::new();
        let x = nm.mk_param(4, "x");
        let two = nm.mk_value(BitVector::new(2, 4));
        let t = nm.mk_mul(x, two);
        assert!(check_candidate(&nm, t, &[x], &examples(&[(&[3], 6), (&[9], 2)], 4)));
        assert!(!check_candidate(&nm, t, &[x], &examples(&[(&[3], 7)], 4)))
    }
}
