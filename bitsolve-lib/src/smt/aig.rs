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

//! An and-inverter graph together with a bit-blaster from ground
//! bitvector terms into it. The number of AND gates created while
//! bit-blasting is used by the normalizer as a cheap proxy for the
//! cost of a set of assertions.

use std::collections::HashMap;
use std::ops::Not;

use crate::node::{post_order, Kind, Node, NodeManager, Sort};

/// A possibly negated reference to an AIG node. Node 0 is the
/// constant false, so `AigLit(0)` is false and `AigLit(1)` is true.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AigLit(u32);

impl AigLit {
    pub const FALSE: AigLit = AigLit(0);
    pub const TRUE: AigLit = AigLit(1);

    pub fn index(self) -> usize {
        (self.0 >> 1) as usize
    }

    pub fn is_negated(self) -> bool {
        self.0 & 1 == 1
    }

    pub fn is_const(self) -> bool {
        self.index() == 0
    }
}

impl Not for AigLit {
    type Output = AigLit;

    fn not(self) -> AigLit {
        AigLit(self.0 ^ 1)
    }
}

#[derive(Copy, Clone, Debug)]
pub enum AigNode {
    False,
    Input,
    And(AigLit, AigLit),
}

pub struct AigManager {
    nodes: Vec<AigNode>,
    strash: HashMap<(AigLit, AigLit), AigLit>,
    num_ands: usize,
}

impl Default for AigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AigManager {
    pub fn new() -> Self {
        AigManager { nodes: vec![AigNode::False], strash: HashMap::new(), num_ands: 0 }
    }

    pub fn node(&self, index: usize) -> AigNode {
        self.nodes[index]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn num_ands(&self) -> usize {
        self.num_ands
    }

    pub fn mk_input(&mut self) -> AigLit {
        self.nodes.push(AigNode::Input);
        AigLit(((self.nodes.len() - 1) as u32) << 1)
    }

    pub fn mk_const(&self, b: bool) -> AigLit {
        if b {
            AigLit::TRUE
        } else {
            AigLit::FALSE
        }
    }

    pub fn mk_and(&mut self, a: AigLit, b: AigLit) -> AigLit {
        if a == AigLit::FALSE || b == AigLit::FALSE || a == !b {
            return AigLit::FALSE;
        }
        if a == AigLit::TRUE || a == b {
            return b;
        }
        if b == AigLit::TRUE {
            return a;
        }
        let key = if a < b { (a, b) } else { (b, a) };
        if let Some(lit) = self.strash.get(&key) {
            return *lit;
        }
        self.nodes.push(AigNode::And(key.0, key.1));
        self.num_ands += 1;
        let lit = AigLit(((self.nodes.len() - 1) as u32) << 1);
        self.strash.insert(key, lit);
        lit
    }

    pub fn mk_or(&mut self, a: AigLit, b: AigLit) -> AigLit {
        !self.mk_and(!a, !b)
    }

    pub fn mk_xor(&mut self, a: AigLit, b: AigLit) -> AigLit {
        let both = self.mk_and(a, b);
        let neither = self.mk_and(!a, !b);
        self.mk_and(!both, !neither)
    }

    pub fn mk_iff(&mut self, a: AigLit, b: AigLit) -> AigLit {
        !self.mk_xor(a, b)
    }

    pub fn mk_ite(&mut self, cond: AigLit, then_lit: AigLit, else_lit: AigLit) -> AigLit {
        if then_lit == else_lit {
            return then_lit;
        }
        let t = self.mk_and(cond, then_lit);
        let e = self.mk_and(!cond, else_lit);
        self.mk_or(t, e)
    }

    /// Evaluate every node given the values of the inputs. The
    /// result is indexed by node; nodes are topologically ordered so a
    /// single pass suffices.
    pub fn simulate<F>(&self, input: F) -> Vec<bool>
    where
        F: Fn(usize) -> bool,
    {
        let mut values = Vec::with_capacity(self.nodes.len());
        for (i, node) in self.nodes.iter().enumerate() {
            let v = match node {
                AigNode::False => false,
                AigNode::Input => input(i),
                AigNode::And(a, b) => lit_value(&values, *a) && lit_value(&values, *b),
            };
            values.push(v)
        }
        values
    }
}

pub fn lit_value(values: &[bool], lit: AigLit) -> bool {
    values[lit.index()] ^ lit.is_negated()
}

type Bits = Vec<AigLit>;

/// Translates ground terms into AIG literals, least significant bit
/// first. Booleans are a single literal. Function applications become
/// fresh inputs; the ground solver adds the functional consistency
/// constraints between them.
pub struct AigBitblaster {
    pub aig: AigManager,
    bits: HashMap<Node, Bits>,
    new_applies: Vec<Node>,
}

impl Default for AigBitblaster {
    fn default() -> Self {
        Self::new()
    }
}

impl AigBitblaster {
    pub fn new() -> Self {
        AigBitblaster { aig: AigManager::new(), bits: HashMap::new(), new_applies: Vec::new() }
    }

    pub fn bits(&self, n: Node) -> Option<&[AigLit]> {
        self.bits.get(&n).map(|b| b.as_slice())
    }

    pub fn blasted(&self) -> impl Iterator<Item = (&Node, &Bits)> {
        self.bits.iter()
    }

    /// Applications encountered since the last call.
    pub fn take_new_applies(&mut self) -> Vec<Node> {
        std::mem::take(&mut self.new_applies)
    }

    /// Count the AND gates needed for `roots`, counting shared
    /// structure between roots (and with previous calls) once.
    pub fn count_aig_ands(&mut self, nm: &NodeManager, roots: &[Node]) -> usize {
        let before = self.aig.num_ands();
        for root in roots {
            self.blast(nm, *root);
        }
        self.aig.num_ands() - before
    }

    pub fn blast_bool(&mut self, nm: &NodeManager, n: Node) -> AigLit {
        self.blast(nm, n)[0]
    }

    pub fn blast(&mut self, nm: &NodeManager, root: Node) -> Bits {
        if let Some(bits) = self.bits.get(&root) {
            return bits.clone();
        }
        for n in post_order(nm, &[root]) {
            if self.bits.contains_key(&n) {
                continue;
            }
            let bits = self.blast_node(nm, n);
            self.bits.insert(n, bits);
        }
        self.bits[&root].clone()
    }

    fn blast_node(&mut self, nm: &NodeManager, n: Node) -> Bits {
        use Kind::*;
        let args: Vec<Bits> = nm.children(n).iter().map(|c| self.bits[c].clone()).collect();
        let aig = &mut self.aig;
        match nm.kind(n) {
            Value => {
                let bv = nm.bv_value(n);
                (0..bv.len()).map(|i| aig.mk_const(bv.bit(i))).collect()
            }
            Var => match nm.sort(n) {
                Sort::Bool => vec![aig.mk_input()],
                Sort::BitVec(w) => inputs(aig, *w),
                Sort::Fun(_, _) => Vec::new(),
            },
            Uf => Vec::new(),
            Param | Forall | Exists => panic!("cannot bit-blast quantified term {}", nm.display(n)),
            Apply => {
                self.new_applies.push(n);
                inputs(aig, nm.width(n))
            }
            Not => vec![!args[0][0]],
            And => vec![aig.mk_and(args[0][0], args[1][0])],
            Or => vec![aig.mk_or(args[0][0], args[1][0])],
            Implies => vec![aig.mk_or(!args[0][0], args[1][0])],
            Ite => args[1].iter().zip(args[2].iter()).map(|(t, e)| aig.mk_ite(args[0][0], *t, *e)).collect(),
            Equal => vec![eq_bits(aig, &args[0], &args[1])],
            BvNot => args[0].iter().map(|b| !*b).collect(),
            BvNeg => {
                let inverted: Bits = args[0].iter().map(|b| !*b).collect();
                let zero = vec![AigLit::FALSE; inverted.len()];
                add_bits(aig, &inverted, &zero, AigLit::TRUE)
            }
            BvAnd => args[0].iter().zip(args[1].iter()).map(|(a, b)| aig.mk_and(*a, *b)).collect(),
            BvOr => args[0].iter().zip(args[1].iter()).map(|(a, b)| aig.mk_or(*a, *b)).collect(),
            BvXor => args[0].iter().zip(args[1].iter()).map(|(a, b)| aig.mk_xor(*a, *b)).collect(),
            BvAdd => add_bits(aig, &args[0], &args[1], AigLit::FALSE),
            BvMul => mul_bits(aig, &args[0], &args[1]),
            BvUdiv => udiv_urem_bits(aig, &args[0], &args[1]).0,
            BvUrem => udiv_urem_bits(aig, &args[0], &args[1]).1,
            BvShl => shift_bits(aig, &args[0], &args[1], Shift::Left),
            BvShr => shift_bits(aig, &args[0], &args[1], Shift::Logical),
            BvAshr => shift_bits(aig, &args[0], &args[1], Shift::Arithmetic),
            BvUlt => vec![ult_bits(aig, &args[0], &args[1])],
            BvSlt => {
                // Signed comparison is unsigned comparison with the
                // sign bits swapped
                let (mut a, mut b) = (args[0].clone(), args[1].clone());
                let top = a.len() - 1;
                std::mem::swap(&mut a[top], &mut b[top]);
                vec![ult_bits(aig, &a, &b)]
            }
            BvConcat => {
                let mut bits = args[1].clone();
                bits.extend_from_slice(&args[0]);
                bits
            }
            BvExtract(hi, lo) => args[0][lo as usize..=hi as usize].to_vec(),
        }
    }
}

fn inputs(aig: &mut AigManager, width: u32) -> Bits {
    (0..width).map(|_| aig.mk_input()).collect()
}

pub fn eq_bits(aig: &mut AigManager, a: &[AigLit], b: &[AigLit]) -> AigLit {
    let mut result = AigLit::TRUE;
    for (x, y) in a.iter().zip(b.iter()) {
        let same = aig.mk_iff(*x, *y);
        result = aig.mk_and(result, same)
    }
    result
}

fn full_adder(aig: &mut AigManager, a: AigLit, b: AigLit, carry: AigLit) -> (AigLit, AigLit) {
    let half = aig.mk_xor(a, b);
    let sum = aig.mk_xor(half, carry);
    let c1 = aig.mk_and(a, b);
    let c2 = aig.mk_and(half, carry);
    (sum, aig.mk_or(c1, c2))
}

fn add_bits(aig: &mut AigManager, a: &[AigLit], b: &[AigLit], carry_in: AigLit) -> Bits {
    let mut carry = carry_in;
    let mut sum = Vec::with_capacity(a.len());
    for (x, y) in a.iter().zip(b.iter()) {
        let (s, c) = full_adder(aig, *x, *y, carry);
        sum.push(s);
        carry = c
    }
    sum
}

/// Shift-and-add multiplication, truncated to the operand width.
fn mul_bits(aig: &mut AigManager, a: &[AigLit], b: &[AigLit]) -> Bits {
    let width = a.len();
    let mut result = vec![AigLit::FALSE; width];
    for (i, bit) in b.iter().enumerate() {
        let mut partial = vec![AigLit::FALSE; width];
        for j in 0..(width - i) {
            partial[i + j] = aig.mk_and(a[j], *bit)
        }
        result = add_bits(aig, &result, &partial, AigLit::FALSE)
    }
    result
}

/// `a < b` as unsigned integers.
fn ult_bits(aig: &mut AigManager, a: &[AigLit], b: &[AigLit]) -> AigLit {
    let mut lt = AigLit::FALSE;
    for (x, y) in a.iter().zip(b.iter()) {
        // From the least significant bit up: a < b at this prefix if
        // this bit is smaller, or it is equal and the lower bits are
        let smaller = aig.mk_and(!*x, *y);
        let same = aig.mk_iff(*x, *y);
        let carried = aig.mk_and(same, lt);
        lt = aig.mk_or(smaller, carried)
    }
    lt
}

/// Restoring division. Division by zero yields a quotient of all ones
/// and the dividend as remainder.
fn udiv_urem_bits(aig: &mut AigManager, a: &[AigLit], b: &[AigLit]) -> (Bits, Bits) {
    let width = a.len();
    let mut quotient = vec![AigLit::FALSE; width];
    let mut rem = vec![AigLit::FALSE; width];
    let neg_b: Bits = b.iter().map(|x| !*x).collect();
    for i in (0..width).rev() {
        // rem = (rem << 1) | a[i], tracking the bit shifted out
        let overflow = rem[width - 1];
        rem.rotate_right(1);
        rem[0] = a[i];
        let lt = ult_bits(aig, &rem, b);
        let ge = aig.mk_or(overflow, !lt);
        let diff = add_bits(aig, &rem, &neg_b, AigLit::TRUE);
        rem = rem.iter().zip(diff.iter()).map(|(r, d)| aig.mk_ite(ge, *d, *r)).collect();
        quotient[i] = ge
    }
    (quotient, rem)
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Shift {
    Left,
    Logical,
    Arithmetic,
}

/// A barrel shifter. Shift amounts of at least the width give zero
/// (or the sign bit, for arithmetic shifts).
fn shift_bits(aig: &mut AigManager, a: &[AigLit], amount: &[AigLit], shift: Shift) -> Bits {
    let width = a.len();
    let fill = if shift == Shift::Arithmetic { a[width - 1] } else { AigLit::FALSE };
    let mut result = a.to_vec();
    let mut too_far = AigLit::FALSE;
    for (stage, bit) in amount.iter().enumerate() {
        if stage >= 64 || (1usize << stage) >= width {
            too_far = aig.mk_or(too_far, *bit);
            continue;
        }
        let dist = 1usize << stage;
        let shifted: Bits = (0..width)
            .map(|i| match shift {
                Shift::Left => {
                    if i >= dist {
                        result[i - dist]
                    } else {
                        AigLit::FALSE
                    }
                }
                Shift::Logical | Shift::Arithmetic => {
                    if i + dist < width {
                        result[i + dist]
                    } else {
                        fill
                    }
                }
            })
            .collect();
        result = result.iter().zip(shifted.iter()).map(|(r, s)| aig.mk_ite(*bit, *s, *r)).collect()
    }
    result.iter().map(|r| aig.mk_ite(too_far, fill, *r)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitvector::BitVector;
    use crate::eval::{eval, Model};

    fn check_binop(kind: Kind, width: u32) {
        let mut nm = NodeManager::new();
        let x = nm.mk_bv_var(width, "x");
        let y = nm.mk_bv_var(width, "y");
        let t = nm.mk_node(kind, &[x, y]);
        let mut blaster = AigBitblaster::new();
        let out = blaster.blast(&nm, t);
        let xs = blaster.bits(x).unwrap().to_vec();
        let ys = blaster.bits(y).unwrap().to_vec();
        for a in 0..(1u64 << width) {
            for b in 0..(1u64 << width) {
                let values = blaster.aig.simulate(|i| {
                    xs.iter().position(|l| l.index() == i).map(|bit| (a >> bit) & 1 == 1).unwrap_or_else(|| {
                        ys.iter().position(|l| l.index() == i).map(|bit| (b >> bit) & 1 == 1).unwrap_or(false)
                    })
                });
                let mut got = 0u64;
                for (i, lit) in out.iter().enumerate() {
                    if lit_value(&values, *lit) {
                        got |= 1 << i
                    }
                }
                let mut model = Model::new();
                model.vars.insert(x, BitVector::new(a, width));
                model.vars.insert(y, BitVector::new(b, width));
                let expected = eval(&nm, &model, t).unwrap().to_u64();
                assert_eq!(got, expected, "{} {} {}", kind.name(), a, b)
            }
        }
    }

    #[test]
    fn test_arith_circuits() {
        for kind in &[Kind::BvAdd, Kind::BvMul, Kind::BvUdiv, Kind::BvUrem] {
            check_binop(*kind, 3)
        }
    }

    #[test]
    fn test_shift_circuits() {
        for kind in &[Kind::BvShl, Kind::BvShr, Kind::BvAshr] {
            check_binop(*kind, 3);
            check_binop(*kind, 4)
        }
    }

    #[test]
    fn test_comparison_circuits() {
        check_binop(Kind::BvUlt, 3);
        check_binop(Kind::BvSlt, 3);
        check_binop(Kind::Equal, 3)
    }

    #[test]
    fn test_strashing() {
        let mut nm = NodeManager::new();
        let x = nm.mk_bv_var(8, "x");
        let y = nm.mk_bv_var(8, "y");
        let a = nm.mk_add(x, y);
        let mut blaster = AigBitblaster::new();
        let first = blaster.count_aig_ands(&nm, &[a]);
        assert!(first > 0);
        assert_eq!(blaster.count_aig_ands(&nm, &[a]), 0);
        let b = nm.mk_add(y, x);
        assert!(blaster.count_aig_ands(&nm, &[b]) < first)
    }
}
