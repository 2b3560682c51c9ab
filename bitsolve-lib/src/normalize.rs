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

//! Normalization of associative and commutative bitvector chains.
//!
//! A chain of additions (or multiplications) is summarised as a
//! [CoefficientsMap] from each leaf of the chain to the number of
//! times it occurs. Normalizing an equality or comparison between two
//! chains folds constants together, moves inverted terms to the
//! other side, and factors out the part both sides have in common so
//! it can be shared. Rewrites are only committed by [PassNormalize::apply]
//! when they shrink the bit-blasted circuit.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::bitvector::BitVector;
use crate::config::SolverConfig;
use crate::log;
use crate::node::{contains_quantifier, Kind, Node, NodeManager};
use crate::rewrite::rewrite;
use crate::smt::aig::AigBitblaster;

pub mod adders;

/// Leaf to coefficient. Ordered by node id, so iteration order is
/// deterministic.
pub type CoefficientsMap = BTreeMap<Node, BitVector>;

/// Node to the number of references to it from parent nodes.
pub type ParentsMap = HashMap<Node, u64>;

/// Depth up to which multiplication is distributed over shifts and
/// additions.
const DISTRIB_MUL_DEPTH: u8 = 5;

#[derive(Clone, Debug, Default, Serialize)]
pub struct NormalizeStats {
    pub num_normalizations: u64,
    #[serde(serialize_with = "log::serialize_seconds")]
    pub time_apply: Duration,
    #[serde(serialize_with = "log::serialize_seconds")]
    pub time_normalize_add: Duration,
    #[serde(serialize_with = "log::serialize_seconds")]
    pub time_compute_coefficients: Duration,
    #[serde(serialize_with = "log::serialize_seconds")]
    pub time_adder_chains: Duration,
    pub size_before: usize,
    pub size_after_process: usize,
    pub size_after_adders: usize,
}

/// Count, for each node, how often it occurs as an operand of a node
/// of `kind` reachable from `nodes` through nodes of `kind`. Each root
/// counts as one reference to itself. For additions, inverted
/// additions `~(a + b)` are traversed as well.
pub fn count_chain_parents(nm: &NodeManager, nodes: &[Node], kind: Kind, parents: &mut ParentsMap) {
    let mut cache = HashSet::new();
    for root in nodes {
        *parents.entry(*root).or_insert(0) += 1;
        let mut visit = vec![*root];
        while let Some(cur) = visit.pop() {
            if cache.insert(cur) && (nm.kind(cur) == kind || (kind == Kind::BvAdd && nm.is_inverted_add(cur))) {
                for child in nm.children(cur) {
                    *parents.entry(*child).or_insert(0) += 1;
                    visit.push(*child)
                }
            }
        }
    }
}

/// A node of `kind` is a leaf of the chain if some of its parents lie
/// outside it, i.e. it has fewer parents within the chain than
/// overall.
fn is_leaf(nm: &NodeManager, kind: Kind, node: Node, parents: &ParentsMap, in_chain: &ParentsMap) -> bool {
    if nm.kind(node) != kind {
        return true;
    }
    match (parents.get(&node), in_chain.get(&node)) {
        (Some(global), Some(local)) => local < global,
        _ => false,
    }
}

pub fn remove_zero_coeffs(coeffs: &mut CoefficientsMap) {
    coeffs.retain(|_, c| !c.is_zero())
}

/// Move the part common to both maps into a new map. Afterwards
/// `lhs + common` and `rhs + common` equal the maps passed in.
pub fn compute_common_coefficients(lhs: &mut CoefficientsMap, rhs: &mut CoefficientsMap) -> CoefficientsMap {
    let mut common = CoefficientsMap::new();
    for (n, c0) in lhs.iter_mut() {
        if let Some(c1) = rhs.get_mut(n) {
            let occs = if c0.compare(*c1) != Ordering::Greater { *c0 } else { *c1 };
            if occs.is_zero() {
                continue;
            }
            *c0 = *c0 - occs;
            *c1 = *c1 - occs;
            common.insert(*n, occs);
        }
    }
    common
}

fn increment(coeffs: &mut CoefficientsMap, n: Node, width: u32) {
    coeffs.entry(n).and_modify(|c| *c = c.inc()).or_insert_with(|| BitVector::one(width));
}

fn pow(base: BitVector, mut exp: u64) -> BitVector {
    let mut result = BitVector::one(base.len());
    let mut square = base;
    while exp > 0 {
        if exp & 1 == 1 {
            result = result * square
        }
        square = square * square;
        exp >>= 1
    }
    result
}

fn identity(kind: Kind, width: u32) -> BitVector {
    match kind {
        Kind::BvMul => BitVector::one(width),
        Kind::BvAnd => BitVector::ones(width),
        _ => BitVector::zeros(width),
    }
}

fn get_factorized_add(nm: &mut NodeManager, node: Node, coeff: BitVector) -> Node {
    assert!(!coeff.is_zero());
    if coeff.is_one() {
        node
    } else if coeff.is_ones() {
        nm.mk_neg(node)
    } else {
        let c = nm.mk_value(coeff);
        nm.mk_mul(c, node)
    }
}

/// Strip wrappers that preserve the structure of a chain below them:
/// bitwise not, shifts, extracts, and concatenation with a constant.
fn get_top(nm: &NodeManager, node: Node) -> Node {
    top_path(nm, node).1
}

fn top_path(nm: &NodeManager, node: Node) -> (Vec<(Node, usize)>, Node) {
    let mut path = Vec::new();
    let mut cur = node;
    loop {
        let through = match nm.kind(cur) {
            Kind::BvNot | Kind::BvShl | Kind::BvShr | Kind::BvExtract(_, _) => 0,
            Kind::BvConcat if nm.is_value(nm.child(cur, 0)) => 1,
            Kind::BvConcat if nm.is_value(nm.child(cur, 1)) => 0,
            _ => break,
        };
        path.push((cur, through));
        cur = nm.child(cur, through)
    }
    (path, cur)
}

/// Rebuild the wrappers that [get_top] stripped from `node` around
/// `normalized`.
fn rebuild_top(nm: &mut NodeManager, node: Node, normalized: Node) -> Node {
    let (path, top) = top_path(nm, node);
    assert_eq!(nm.sort(top), nm.sort(normalized));
    let mut result = normalized;
    for (wrapper, through) in path.into_iter().rev() {
        let mut children = nm.children(wrapper).to_vec();
        children[through] = result;
        result = nm.mk_like(wrapper, &children)
    }
    result
}

/// `t * (y udiv t) = 0` holds exactly when `t = 0` or `t > y`.
fn rewrite_term(nm: &mut NodeManager, children: &[Node]) -> Option<Node> {
    let (mul, val) = if nm.kind(children[0]) == Kind::BvMul {
        (children[0], children[1])
    } else if nm.kind(children[1]) == Kind::BvMul {
        (children[1], children[0])
    } else {
        return None;
    };
    if !nm.value(val).map_or(false, |v| v.is_zero()) {
        return None;
    }
    let (udiv, t) = if nm.kind(nm.child(mul, 0)) == Kind::BvUdiv {
        (nm.child(mul, 0), nm.child(mul, 1))
    } else if nm.kind(nm.child(mul, 1)) == Kind::BvUdiv {
        (nm.child(mul, 1), nm.child(mul, 0))
    } else {
        return None;
    };
    if nm.child(udiv, 1) != t {
        return None;
    }
    let y = nm.child(udiv, 0);
    let is_zero = nm.mk_eq(t, val);
    let gt = nm.mk_ugt(t, y);
    Some(nm.mk_or(is_zero, gt))
}

/// Distribute multiplication over shifts and additions:
///
/// - `(x << s) * r` becomes `(x * r) << s`
/// - `(x + y) * r` becomes `x * r + y * r`
///
/// and symmetrically for the right operand, up to `depth` levels.
fn distrib_mul(nm: &mut NodeManager, left: Node, right: Node, depth: u8) -> Node {
    if depth > 0 {
        if nm.kind(left) == Kind::BvShl {
            let (x, s) = (nm.child(left, 0), nm.child(left, 1));
            let m = distrib_mul(nm, x, right, depth - 1);
            return nm.mk_node(Kind::BvShl, &[m, s]);
        }
        if nm.kind(right) == Kind::BvShl {
            let (x, s) = (nm.child(right, 0), nm.child(right, 1));
            let m = distrib_mul(nm, x, left, depth - 1);
            return nm.mk_node(Kind::BvShl, &[m, s]);
        }
        if nm.kind(left) == Kind::BvAdd {
            let (x, y) = (nm.child(left, 0), nm.child(left, 1));
            let l = distrib_mul(nm, x, right, depth - 1);
            let r = distrib_mul(nm, y, right, depth - 1);
            return nm.mk_add(l, r);
        }
        if nm.kind(right) == Kind::BvAdd {
            let (x, y) = (nm.child(right, 0), nm.child(right, 1));
            let l = distrib_mul(nm, x, left, depth - 1);
            let r = distrib_mul(nm, y, left, depth - 1);
            return nm.mk_add(l, r);
        }
    }
    nm.mk_mul(left, right)
}

pub struct PassNormalize<'a> {
    nm: &'a mut NodeManager,
    share_aware: bool,
    /// Parent counts over all assertions of the current [PassNormalize::apply]
    parents: ParentsMap,
    cache: HashMap<Node, Option<Node>>,
    rewrite_cache: HashMap<Node, Node>,
    processed: HashSet<Node>,
    pub stats: NormalizeStats,
}

impl<'a> PassNormalize<'a> {
    pub fn new(nm: &'a mut NodeManager, config: &SolverConfig) -> Self {
        Self::with_share_aware(nm, config.share_aware)
    }

    pub fn with_share_aware(nm: &'a mut NodeManager, share_aware: bool) -> Self {
        PassNormalize {
            nm,
            share_aware,
            parents: ParentsMap::new(),
            cache: HashMap::new(),
            rewrite_cache: HashMap::new(),
            processed: HashSet::new(),
            stats: NormalizeStats::default(),
        }
    }

    pub fn nm(&self) -> &NodeManager {
        self.nm
    }

    pub fn nm_mut(&mut self) -> &mut NodeManager {
        self.nm
    }

    fn rewrite(&mut self, n: Node) -> Node {
        rewrite(self.nm, &mut self.rewrite_cache, n)
    }

    /// Count references to every node reachable from `assertions`,
    /// visiting each node once.
    pub fn count_parents(&mut self, assertions: &[Node]) {
        let mut cache = HashSet::new();
        let mut visit = assertions.to_vec();
        while let Some(cur) = visit.pop() {
            if cache.insert(cur) {
                for child in self.nm.children(cur) {
                    *self.parents.entry(*child).or_insert(0) += 1;
                    visit.push(*child)
                }
            }
        }
    }

    /// Compute the coefficient of each leaf of the `kind` chain rooted
    /// at `node`, adding them into `coeffs`. In share-aware mode
    /// `parents` must hold the in-chain parent counts from
    /// [count_chain_parents]; chain nodes referenced from outside the
    /// chain are kept as leaves.
    pub fn compute_coefficients(&mut self, node: Node, kind: Kind, parents: &ParentsMap, coeffs: &mut CoefficientsMap) {
        let in_chain = if self.share_aware { Some(parents) } else { None };
        self.coefficients(node, kind, in_chain, coeffs)
    }

    fn coefficients(&mut self, node: Node, kind: Kind, in_chain: Option<&ParentsMap>, coeffs: &mut CoefficientsMap) {
        let now = Instant::now();
        let zero = BitVector::zeros(self.nm.width(node));

        let mut nodes = Vec::new();
        let mut intermediate = HashSet::new();
        let mut cfs: HashMap<Node, BitVector> = HashMap::new();

        let mut visit = vec![node];
        while let Some(cur) = visit.pop() {
            if cfs.contains_key(&cur) {
                continue;
            }
            cfs.insert(cur, zero);
            nodes.push(cur);
            if self.nm.kind(cur) == kind {
                if let Some(in_chain) = in_chain {
                    if !in_chain.contains_key(&cur) {
                        panic!("chain node {} is missing from the parents map", self.nm.display(cur))
                    }
                    if is_leaf(self.nm, kind, cur, &self.parents, in_chain) {
                        continue;
                    }
                }
                intermediate.insert(cur);
                visit.extend_from_slice(self.nm.children(cur))
            }
        }

        // Children have smaller ids than their parents, so visiting in
        // descending order finishes each parent before its children
        nodes.sort();
        assert_eq!(nodes.last(), Some(&node));
        if let Some(c) = cfs.get_mut(&node) {
            *c = c.inc()
        }
        for cur in nodes.iter().rev() {
            let c = cfs[cur];
            if intermediate.contains(cur) {
                for child in self.nm.children(*cur) {
                    if let Some(cc) = cfs.get_mut(child) {
                        *cc = *cc + c
                    }
                }
            } else {
                coeffs.entry(*cur).and_modify(|e| *e = *e + c).or_insert(c);
            }
        }

        self.stats.time_compute_coefficients += now.elapsed()
    }

    /// Build a term of `kind` from a coefficients map. Returns `None`
    /// if every coefficient is zero.
    pub fn mk_node(&mut self, kind: Kind, coeffs: &CoefficientsMap) -> Option<Node> {
        assert!(matches!(kind, Kind::BvAdd | Kind::BvMul | Kind::BvAnd));
        let mut terms: Vec<(Node, BitVector)> =
            coeffs.iter().filter(|(_, c)| !c.is_zero()).map(|(n, c)| (*n, *c)).collect();
        if terms.is_empty() {
            return None;
        }

        match kind {
            Kind::BvAdd => {
                let mut result = get_factorized_add_mul(self.nm, terms[0].0, terms[0].1);
                for (n, c) in &terms[1..] {
                    let term = get_factorized_add_mul(self.nm, *n, *c);
                    result = self.nm.mk_add(result, term)
                }
                Some(result)
            }
            Kind::BvAnd => {
                let leaves: Vec<Node> = terms.iter().map(|(n, _)| *n).collect();
                Some(self.nm.mk_nary(Kind::BvAnd, &leaves))
            }
            _ => {
                // Combine the two leaves with the most occurrences and
                // subtract, like computing an addition chain
                while terms.len() > 1 {
                    terms.sort_by(|a, b| b.1.compare(a.1));
                    while terms.last().map_or(false, |(_, c)| c.is_zero()) {
                        terms.pop();
                    }
                    for i in 1..terms.len() {
                        let occs = terms[i].1;
                        terms[i].0 = self.nm.mk_mul(terms[i - 1].0, terms[i].0);
                        terms[i - 1].1 = terms[i - 1].1 - occs
                    }
                }
                let (base, coeff) = terms[0];
                assert!(coeff.fits_in_u64());
                let mut result = base;
                for _ in 1..coeff.to_u64() {
                    result = self.nm.mk_mul(result, base)
                }
                Some(result)
            }
        }
    }

    /// Fold the values in an addition chain into a single constant,
    /// which is returned. With `push_neg`, an inverted addition
    /// `~(a + b)` that is not shared is expanded using `~x = -x - 1`.
    /// An inverted leaf `~y` where `y` is also a leaf is cancelled
    /// against it. With `keep_value`, the constant is added back into
    /// the map as a leaf.
    pub fn normalize_add(
        &mut self,
        node: Node,
        coeffs: &mut CoefficientsMap,
        parents: &ParentsMap,
        keep_value: bool,
        push_neg: bool,
    ) -> BitVector {
        assert_eq!(self.nm.kind(node), Kind::BvAdd);
        let now = Instant::now();
        let width = self.nm.width(node);
        let zero = BitVector::zeros(width);
        let mut value = zero;

        loop {
            let mut progress = false;
            let keys: Vec<Node> = coeffs.keys().rev().copied().collect();
            for cur in keys {
                let coeff = coeffs[&cur];
                if coeff.is_zero() {
                    continue;
                }

                if self.nm.is_value(cur) {
                    value = value + self.nm.bv_value(cur) * coeff;
                    coeffs.insert(cur, zero);
                } else if push_neg
                    && self.nm.is_inverted_add(cur)
                    && parents.get(&self.nm.child(cur, 0)).copied().unwrap_or(0) <= 1
                {
                    progress = true;
                    let neg = -coeff;
                    coeffs.insert(cur, zero);
                    let mut cfs = CoefficientsMap::new();
                    let inner = self.nm.child(cur, 0);
                    self.compute_coefficients(inner, Kind::BvAdd, parents, &mut cfs);
                    for (c, cf) in cfs {
                        let cf = cf * neg;
                        if self.nm.is_value(c) {
                            value = value + self.nm.bv_value(c) * cf
                        } else {
                            coeffs.entry(c).and_modify(|e| *e = *e + cf).or_insert(cf);
                        }
                    }
                    value = value + neg;
                    break;
                } else if self.nm.kind(cur) == Kind::BvNot {
                    let inner = self.nm.child(cur, 0);
                    if let Some(ic) = coeffs.get_mut(&inner) {
                        *ic = *ic - coeff;
                        value = value - coeff;
                        coeffs.insert(cur, zero);
                    }
                }
            }
            if !progress {
                break;
            }
        }

        if keep_value && !value.is_zero() {
            let val = self.nm.mk_value(value);
            increment(coeffs, val, width)
        }

        self.stats.time_normalize_add += now.elapsed();
        value
    }

    /// Fold the values in a bitwise-and chain into a single constant,
    /// and clip every other coefficient to one.
    pub fn normalize_and(&mut self, node: Node, coeffs: &mut CoefficientsMap) -> BitVector {
        let width = self.nm.width(node);
        let one = BitVector::one(width);
        let mut value = BitVector::ones(width);
        for (cur, c) in coeffs.iter_mut() {
            if c.is_zero() {
                continue;
            }
            if self.nm.is_value(*cur) {
                value = value & self.nm.bv_value(*cur);
                *c = BitVector::zeros(width)
            } else if c.compare(one) == Ordering::Greater {
                *c = one
            }
        }
        value
    }

    /// Fold the values in a multiplication chain into a single
    /// constant. With `keep_value` it is added back into the map.
    pub fn normalize_mul(&mut self, node: Node, coeffs: &mut CoefficientsMap, keep_value: bool) -> BitVector {
        assert_eq!(self.nm.kind(node), Kind::BvMul);
        let width = self.nm.width(node);
        let mut value = BitVector::one(width);
        for (cur, c) in coeffs.iter_mut() {
            if self.nm.is_value(*cur) {
                assert!(c.fits_in_u64());
                value = value * pow(self.nm.bv_value(*cur), c.to_u64());
                *c = BitVector::zeros(width)
            }
        }
        if keep_value && !value.is_one() {
            let val = self.nm.mk_value(value);
            increment(coeffs, val, width)
        }
        value
    }

    /// Move inverted leaves of `coeffs0` to the other side of an
    /// equality, adjusting the constant `value` of the `coeffs0` side:
    /// `c * ~x` becomes `c * x` on the other side with `value - c`, and
    /// `c * ~(y + 1)` becomes `c * y` with `value - 2c`.
    fn normalize_coefficients_eq_add(
        &mut self,
        coeffs0: &mut CoefficientsMap,
        coeffs1: &mut CoefficientsMap,
        value: &mut BitVector,
    ) {
        let width = value.len();
        let one = self.nm.mk_one(width);
        let zero = BitVector::zeros(width);

        for (cur, c) in coeffs0.iter_mut() {
            let coeff = *c;
            if coeff.is_zero() || self.nm.kind(*cur) != Kind::BvNot {
                continue;
            }
            let inner = self.nm.child(*cur, 0);
            let neg = if self.nm.kind(inner) == Kind::BvAdd {
                let (a, b) = (self.nm.child(inner, 0), self.nm.child(inner, 1));
                if a == one {
                    Some(b)
                } else if b == one {
                    Some(a)
                } else {
                    None
                }
            } else {
                Some(inner)
            };
            if let Some(neg) = neg {
                if self.nm.kind(inner) == Kind::BvAdd {
                    *value = *value - coeff
                }
                *c = zero;
                if self.nm.is_value(neg) {
                    *value = *value - self.nm.bv_value(neg) * coeff
                } else {
                    coeffs1.entry(neg).and_modify(|e| *e = *e + coeff).or_insert(coeff);
                }
                *value = *value - coeff
            }
        }
    }

    /// Compute normalized coefficient maps for both sides of an
    /// equality between two chains of the same kind.
    pub fn normalize_coefficients_eq(
        &mut self,
        node0: Node,
        node1: Node,
        coeffs0: &mut CoefficientsMap,
        coeffs1: &mut CoefficientsMap,
    ) {
        let kind = self.nm.kind(node0);
        assert_eq!(kind, self.nm.kind(node1));
        assert!(matches!(kind, Kind::BvAdd | Kind::BvMul));
        let width = self.nm.width(node0);

        let mut parents = ParentsMap::new();
        if self.share_aware {
            count_chain_parents(self.nm, &[node0, node1], kind, &mut parents)
        }

        self.compute_coefficients(node0, kind, &parents, coeffs0);
        self.compute_coefficients(node1, kind, &parents, coeffs1);

        if kind == Kind::BvAdd {
            let mut value0 = self.normalize_add(node0, coeffs0, &parents, false, true);
            let mut value1 = self.normalize_add(node1, coeffs1, &parents, false, true);
            self.normalize_coefficients_eq_add(coeffs0, coeffs1, &mut value0);
            self.normalize_coefficients_eq_add(coeffs1, coeffs0, &mut value1);
            let value = value0 - value1;
            if !value.is_zero() {
                let val = self.nm.mk_value(value);
                increment(coeffs0, val, width)
            }
        } else {
            let value0 = self.normalize_mul(node0, coeffs0, false);
            let value1 = self.normalize_mul(node1, coeffs1, false);
            if !value0.is_one() {
                let val = self.nm.mk_value(value0);
                increment(coeffs0, val, width)
            }
            if !value1.is_one() {
                let val = self.nm.mk_value(value1);
                increment(coeffs1, val, width)
            }
        }

        let common_coeffs = compute_common_coefficients(coeffs0, coeffs1);
        if kind == Kind::BvMul {
            if let Some(common) = self.mk_node(kind, &common_coeffs) {
                increment(coeffs0, common, width);
                increment(coeffs1, common, width)
            }
        }
    }

    fn normalize_eq_add_sides(
        &mut self,
        coeffs0: &CoefficientsMap,
        coeffs1: &CoefficientsMap,
        width: u32,
    ) -> (Node, Node) {
        let mut lvalue = BitVector::zeros(width);
        let mut rvalue = BitVector::zeros(width);
        let mut lhs = Vec::new();
        let mut rhs = Vec::new();

        for (cur, coeff) in coeffs0 {
            if coeff.is_zero() {
                continue;
            }
            if self.nm.is_value(*cur) {
                lvalue = lvalue + self.nm.bv_value(*cur) * *coeff
            } else {
                lhs.push(get_factorized_add(self.nm, *cur, *coeff))
            }
        }
        for (cur, coeff) in coeffs1 {
            if coeff.is_zero() {
                continue;
            }
            if self.nm.is_value(*cur) {
                rvalue = rvalue + self.nm.bv_value(*cur) * *coeff
            } else {
                rhs.push(get_factorized_add(self.nm, *cur, *coeff))
            }
        }

        // Keep the constant on one side, e.g. (a + 2 = b + 3) becomes (a - 1 = b)
        let value = lvalue - rvalue;
        if !value.is_zero() {
            lhs.push(self.nm.mk_value(value))
        }

        lhs.sort();
        rhs.sort();
        let left = if lhs.is_empty() { self.nm.mk_zero(width) } else { self.nm.mk_nary(Kind::BvAdd, &lhs) };
        let right = if rhs.is_empty() { self.nm.mk_zero(width) } else { self.nm.mk_nary(Kind::BvAdd, &rhs) };
        (left, right)
    }

    /// Expand a multiplication side into a right-nested product of its
    /// leaves in id order. An empty side is the constant one.
    fn mk_mul_side(&mut self, coeffs: &CoefficientsMap, width: u32) -> Node {
        let mut leaves = Vec::new();
        for (n, c) in coeffs {
            assert!(c.fits_in_u64());
            for _ in 0..c.to_u64() {
                leaves.push(*n)
            }
        }
        leaves.sort();
        match leaves.pop() {
            None => self.nm.mk_one(width),
            Some(last) => leaves.into_iter().rev().fold(last, |acc, n| self.nm.mk_mul(n, acc)),
        }
    }

    /// Normalize an equality between two chains of the same kind
    /// (addition or multiplication). Returns the new equality and
    /// whether anything changed.
    pub fn normalize_eq_add_mul(&mut self, node0: Node, node1: Node) -> (Node, bool) {
        let kind = self.nm.kind(node0);
        let width = self.nm.width(node0);

        let mut coeffs0 = CoefficientsMap::new();
        let mut coeffs1 = CoefficientsMap::new();
        self.normalize_coefficients_eq(node0, node1, &mut coeffs0, &mut coeffs1);

        let (left, right) = if kind == Kind::BvAdd {
            self.normalize_eq_add_sides(&coeffs0, &coeffs1, width)
        } else {
            (self.mk_mul_side(&coeffs0, width), self.mk_mul_side(&coeffs1, width))
        };

        if left == right {
            (self.nm.mk_true(), true)
        } else if left == node0 && right == node1 {
            (self.nm.mk_eq(node0, node1), false)
        } else {
            (self.nm.mk_eq(left, right), true)
        }
    }

    /// Factor out the common part of two coefficient maps, then
    /// rebuild both sides with the common part as a shared leaf.
    pub fn normalize_common(
        &mut self,
        kind: Kind,
        lhs: &mut CoefficientsMap,
        rhs: &mut CoefficientsMap,
        lhs_width: u32,
        rhs_width: u32,
    ) -> (Node, Node) {
        let common_coeffs = compute_common_coefficients(lhs, rhs);
        if let Some(common) = self.mk_node(kind, &common_coeffs) {
            increment(lhs, common, lhs_width);
            increment(rhs, common, rhs_width)
        }

        remove_zero_coeffs(lhs);
        remove_zero_coeffs(rhs);

        let left = match self.mk_node(kind, lhs) {
            Some(n) => n,
            None => self.nm.mk_value(identity(kind, lhs_width)),
        };
        let right = match self.mk_node(kind, rhs) {
            Some(n) => n,
            None => self.nm.mk_value(identity(kind, rhs_width)),
        };
        (left, right)
    }

    /// Normalize `parent_kind(node0, node1)` where the operands are
    /// (possibly wrapped) addition or multiplication chains. The rewrite
    /// is rejected unless it removes leaves from at least one side.
    pub fn normalize_comm_assoc(&mut self, parent_kind: Kind, node0: Node, node1: Node) -> (Node, bool) {
        let top_lhs = get_top(self.nm, node0);
        let top_rhs = get_top(self.nm, node1);

        let kind = match (self.nm.kind(top_lhs), self.nm.kind(top_rhs)) {
            (k @ (Kind::BvAdd | Kind::BvMul), _) => k,
            (_, k @ (Kind::BvAdd | Kind::BvMul)) => k,
            _ => return (self.nm.mk_node(parent_kind, &[node0, node1]), false),
        };

        let mut parents = ParentsMap::new();
        if self.share_aware {
            count_chain_parents(self.nm, &[top_lhs, top_rhs], kind, &mut parents)
        }

        let mut lhs = CoefficientsMap::new();
        let mut rhs = CoefficientsMap::new();
        self.compute_coefficients(top_lhs, kind, &parents, &mut lhs);
        self.compute_coefficients(top_rhs, kind, &parents, &mut rhs);
        let lhs_coeff_size = lhs.len();
        let rhs_coeff_size = rhs.len();

        for (top, coeffs) in [(top_lhs, &mut lhs), (top_rhs, &mut rhs)] {
            match self.nm.kind(top) {
                Kind::BvAdd => {
                    self.normalize_add(top, coeffs, &parents, true, true);
                }
                Kind::BvMul => {
                    self.normalize_mul(top, coeffs, true);
                }
                _ => (),
            }
        }

        let lhs_width = self.nm.width(top_lhs);
        let rhs_width = self.nm.width(top_rhs);
        let (left, right) = self.normalize_common(kind, &mut lhs, &mut rhs, lhs_width, rhs_width);

        if lhs_coeff_size <= lhs.len() && rhs_coeff_size <= rhs.len() {
            return (self.nm.mk_node(parent_kind, &[node0, node1]), false);
        }

        let rebuilt_left = rebuild_top(self.nm, node0, left);
        let rebuilt_right = rebuild_top(self.nm, node1, right);
        let changed = rebuilt_left != node0 || rebuilt_right != node1;
        (self.nm.mk_node(parent_kind, &[rebuilt_left, rebuilt_right]), changed)
    }

    /// Normalize a single addition, multiplication, or bitwise-and
    /// chain. The rewrite is rejected unless it reduces the number of
    /// leaves.
    pub fn normalize_comm_assoc_node(&mut self, node: Node) -> (Node, bool) {
        let kind = self.nm.kind(node);
        assert!(matches!(kind, Kind::BvAdd | Kind::BvMul | Kind::BvAnd));
        let width = self.nm.width(node);
        let mut parents = ParentsMap::new();
        if self.share_aware {
            count_chain_parents(self.nm, &[node], kind, &mut parents)
        }

        let mut coeffs = CoefficientsMap::new();
        self.compute_coefficients(node, kind, &parents, &mut coeffs);
        let coeffs_size = coeffs.len();

        match kind {
            Kind::BvAdd => {
                self.normalize_add(node, &mut coeffs, &parents, true, true);
            }
            Kind::BvMul => {
                self.normalize_mul(node, &mut coeffs, true);
            }
            _ => {
                let value = self.normalize_and(node, &mut coeffs);
                if value.is_zero() {
                    return (self.nm.mk_value(value), true);
                }
                if !value.is_ones() {
                    let val = self.nm.mk_value(value);
                    increment(&mut coeffs, val, width)
                }
            }
        }
        remove_zero_coeffs(&mut coeffs);

        if coeffs_size <= coeffs.len() {
            return (node, false);
        }

        let result = match self.mk_node(kind, &coeffs) {
            Some(n) => n,
            None => self.nm.mk_value(identity(kind, width)),
        };
        (result, result != node)
    }

    fn cached(&self, n: Node) -> Node {
        match self.cache.get(&n) {
            Some(Some(result)) => *result,
            _ => panic!("node {} was not processed before its parent", n.id()),
        }
    }

    /// Normalize every equality and comparison within `node`,
    /// repeating until the equalities between chains reach a fixed
    /// point.
    pub fn process(&mut self, node: Node) -> Node {
        let mut node = self.rewrite(node);

        loop {
            let mut normalized = false;
            let mut visit = vec![node];

            while let Some(&cur) = visit.last() {
                match self.cache.get(&cur) {
                    None => {
                        self.cache.insert(cur, None);
                        visit.extend_from_slice(self.nm.children(cur));
                        continue;
                    }
                    Some(Some(_)) => {
                        visit.pop();
                        continue;
                    }
                    Some(None) => (),
                }

                let children: Vec<Node> = self.nm.children(cur).iter().map(|c| self.cached(*c)).collect();
                let kind = self.nm.kind(cur);
                let chain_kind = |nm: &NodeManager, n: Node| matches!(nm.kind(n), Kind::BvAdd | Kind::BvMul);

                let result = if kind == Kind::Equal
                    && chain_kind(self.nm, children[0])
                    && self.nm.kind(children[0]) == self.nm.kind(children[1])
                {
                    let (result, norm) = self.normalize_eq_add_mul(children[0], children[1]);
                    if norm {
                        self.stats.num_normalizations += 1;
                        normalized = true
                    }
                    result
                } else if kind == Kind::Equal {
                    match rewrite_term(self.nm, &children) {
                        Some(rw) => rw,
                        None => {
                            let (result, norm) = self.normalize_comm_assoc(kind, children[0], children[1]);
                            if norm {
                                self.stats.num_normalizations += 1
                            }
                            result
                        }
                    }
                } else if kind == Kind::BvUlt || kind == Kind::BvSlt {
                    let (result, norm) = self.normalize_comm_assoc(kind, children[0], children[1]);
                    if norm {
                        self.stats.num_normalizations += 1
                    }
                    result
                } else if kind == Kind::BvMul {
                    let distributed = distrib_mul(self.nm, children[0], children[1], DISTRIB_MUL_DEPTH);
                    self.rewrite(distributed)
                } else {
                    self.nm.mk_like(cur, &children)
                };

                if self.share_aware {
                    let count = self.parents.get(&cur).copied().unwrap_or(0);
                    self.parents.insert(result, count);
                }
                self.cache.insert(cur, Some(result));
                visit.pop();
            }

            if normalized {
                node = self.cached(node)
            } else {
                break;
            }
        }

        let result = self.cached(node);
        self.rewrite(result)
    }

    /// Normalize a set of assertions in place. The per-assertion
    /// normalization from [PassNormalize::process] and the global adder
    /// normalization are both tried, and the one giving the smaller
    /// circuit is kept, provided it is smaller than the input.
    /// Quantified assertions are left alone. Returns whether any
    /// assertion changed.
    pub fn apply(&mut self, assertions: &mut [Node]) -> bool {
        let now = Instant::now();
        log!(log::NORMALIZE, format!("apply normalization to {} assertions", assertions.len()));

        self.cache.clear();
        self.parents.clear();

        let quantified: Vec<bool> = assertions.iter().map(|a| contains_quantifier(self.nm, *a)).collect();
        if self.share_aware {
            let ground: Vec<Node> =
                assertions.iter().zip(quantified.iter()).filter(|(_, q)| !**q).map(|(a, _)| *a).collect();
            self.count_parents(&ground)
        }

        let mut blaster_before = AigBitblaster::new();
        let mut blaster_after1 = AigBitblaster::new();
        let mut blaster_after2 = AigBitblaster::new();
        let mut size_before = 0;
        let mut size_after1 = 0;
        let mut size_after2 = 0;

        let mut new_assertions = Vec::with_capacity(assertions.len());
        for (assertion, q) in assertions.iter().zip(quantified.iter()) {
            if *q {
                new_assertions.push(*assertion);
                continue;
            }
            size_before += blaster_before.count_aig_ands(self.nm, &[*assertion]);
            let processed = if self.processed.insert(*assertion) {
                let processed = self.process(*assertion);
                if processed != *assertion {
                    log!(
                        log::NORMALIZE,
                        format!("found normalization: {} -> {}", self.nm.display(*assertion), self.nm.display(processed))
                    )
                }
                processed
            } else {
                *assertion
            };
            size_after1 += blaster_after1.count_aig_ands(self.nm, &[processed]);
            new_assertions.push(processed)
        }

        let norm_assertions = self.normalize_adders(&new_assertions);
        for (assertion, q) in norm_assertions.iter().zip(quantified.iter()) {
            if !*q {
                size_after2 += blaster_after2.count_aig_ands(self.nm, &[*assertion])
            }
        }

        let (processed_assertions, size_after) = if size_after2 < size_after1 {
            (norm_assertions, size_after2)
        } else {
            (new_assertions, size_after1)
        };

        log!(log::NORMALIZE, format!("AIG size initial:     {}", size_before));
        log!(log::NORMALIZE, format!("AIG size first pass:  {}", size_after1));
        log!(log::NORMALIZE, format!("AIG size second pass: {}", size_after2));

        let mut changed = false;
        if size_after < size_before {
            for (assertion, processed) in assertions.iter_mut().zip(processed_assertions.into_iter()) {
                if *assertion != processed {
                    *assertion = processed;
                    changed = true
                }
            }
        }

        self.stats.size_before = size_before;
        self.stats.size_after_process = size_after1;
        self.stats.size_after_adders = size_after2;
        self.parents.clear();
        self.cache.clear();
        self.rewrite_cache.clear();
        self.stats.time_apply += now.elapsed();
        changed
    }
}

/// A single term of an addition chain, `coeff * node`.
fn get_factorized_add_mul(nm: &mut NodeManager, node: Node, coeff: BitVector) -> Node {
    if coeff.is_one() {
        node
    } else {
        let c = nm.mk_value(coeff);
        nm.mk_mul(c, node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{eval, Model};

    fn bv(value: u64, width: u32) -> BitVector {
        BitVector::new(value, width)
    }

    fn eval_with(nm: &NodeManager, vars: &[(Node, u64)], n: Node) -> BitVector {
        let mut model = Model::new();
        for (v, value) in vars {
            model.vars.insert(*v, bv(*value, nm.width(*v)));
        }
        eval(nm, &model, n).unwrap()
    }

    #[test]
    fn test_common_coefficients() {
        let mut nm = NodeManager::new();
        let vars: Vec<Node> = ["a", "b", "c", "d"].iter().map(|name| nm.mk_bv_var(8, name)).collect();
        let (a, b, c, d) = (vars[0], vars[1], vars[2], vars[3]);

        let mut lhs: CoefficientsMap = vec![(a, bv(6, 8)), (b, bv(3, 8)), (c, bv(2, 8)), (d, bv(1, 8))].into_iter().collect();
        let mut rhs: CoefficientsMap = vec![(a, bv(7, 8)), (b, bv(5, 8)), (c, bv(3, 8))].into_iter().collect();
        let common = compute_common_coefficients(&mut lhs, &mut rhs);

        let expected: CoefficientsMap = vec![(a, bv(6, 8)), (b, bv(3, 8)), (c, bv(2, 8))].into_iter().collect();
        assert_eq!(common, expected);
        assert_eq!(lhs[&d], bv(1, 8));
        assert!(lhs[&a].is_zero() && lhs[&b].is_zero() && lhs[&c].is_zero());
        assert_eq!(rhs[&a], bv(1, 8));
        assert_eq!(rhs[&b], bv(2, 8));
        assert_eq!(rhs[&c], bv(1, 8))
    }

    #[test]
    fn test_compute_coefficients() {
        let mut nm = NodeManager::new();
        let a = nm.mk_bv_var(8, "a");
        let b = nm.mk_bv_var(8, "b");
        let c = nm.mk_bv_var(8, "c");
        let ab = nm.mk_add(a, b);
        let ac = nm.mk_add(a, c);
        let s = nm.mk_add(ab, ac);

        let mut pass = PassNormalize::with_share_aware(&mut nm, false);
        let mut coeffs = CoefficientsMap::new();
        pass.compute_coefficients(s, Kind::BvAdd, &ParentsMap::new(), &mut coeffs);
        assert_eq!(coeffs.len(), 3);
        assert_eq!(coeffs[&a], bv(2, 8));
        assert_eq!(coeffs[&b], bv(1, 8));
        assert_eq!(coeffs[&c], bv(1, 8))
    }

    #[test]
    fn test_compute_coefficients_shared() {
        let mut nm = NodeManager::new();
        let a = nm.mk_bv_var(8, "a");
        let b = nm.mk_bv_var(8, "b");
        let c = nm.mk_bv_var(8, "c");
        let x = nm.mk_bv_var(8, "x");
        let y = nm.mk_bv_var(8, "y");
        let ab = nm.mk_add(a, b);
        let s = nm.mk_add(ab, c);
        let e1 = nm.mk_eq(s, x);
        let e2 = nm.mk_eq(ab, y);

        let mut pass = PassNormalize::with_share_aware(&mut nm, true);
        pass.count_parents(&[e1, e2]);
        let mut in_chain = ParentsMap::new();
        count_chain_parents(pass.nm(), &[s], Kind::BvAdd, &mut in_chain);
        let mut coeffs = CoefficientsMap::new();
        pass.compute_coefficients(s, Kind::BvAdd, &in_chain, &mut coeffs);

        // a + b is also used outside the chain, so it stays a leaf
        assert_eq!(coeffs.len(), 2);
        assert_eq!(coeffs[&ab], bv(1, 8));
        assert_eq!(coeffs[&c], bv(1, 8))
    }

    #[test]
    fn test_mk_node_mul() {
        let mut nm = NodeManager::new();
        let a = nm.mk_bv_var(8, "a");
        let b = nm.mk_bv_var(8, "b");
        let mut pass = PassNormalize::with_share_aware(&mut nm, false);

        let cube: CoefficientsMap = vec![(a, bv(3, 8))].into_iter().collect();
        let n = pass.mk_node(Kind::BvMul, &cube).unwrap();
        let aa = pass.nm_mut().mk_mul(a, a);
        let aaa = pass.nm_mut().mk_mul(aa, a);
        assert_eq!(n, aaa);

        let coeffs: CoefficientsMap = vec![(a, bv(2, 8)), (b, bv(1, 8))].into_iter().collect();
        let n = pass.mk_node(Kind::BvMul, &coeffs).unwrap();
        assert_eq!(eval_with(pass.nm(), &[(a, 3), (b, 5)], n), bv(45, 8));

        assert_eq!(pass.mk_node(Kind::BvAdd, &CoefficientsMap::new()), None)
    }

    #[test]
    fn test_mk_node_add() {
        let mut nm = NodeManager::new();
        let a = nm.mk_bv_var(8, "a");
        let b = nm.mk_bv_var(8, "b");
        let mut pass = PassNormalize::with_share_aware(&mut nm, false);

        let coeffs: CoefficientsMap = vec![(a, bv(3, 8)), (b, bv(1, 8))].into_iter().collect();
        let n = pass.mk_node(Kind::BvAdd, &coeffs).unwrap();
        let nm = pass.nm_mut();
        let three = nm.mk_value(bv(3, 8));
        let three_a = nm.mk_mul(three, a);
        assert_eq!(n, nm.mk_add(three_a, b))
    }

    #[test]
    fn test_normalize_add_values() {
        let mut nm = NodeManager::new();
        let a = nm.mk_bv_var(8, "a");
        let three = nm.mk_value(bv(3, 8));
        let five = nm.mk_value(bv(5, 8));
        let s = nm.mk_add(a, three);
        let s = nm.mk_add(s, five);

        let mut pass = PassNormalize::with_share_aware(&mut nm, false);
        let parents = ParentsMap::new();
        let mut coeffs = CoefficientsMap::new();
        pass.compute_coefficients(s, Kind::BvAdd, &parents, &mut coeffs);
        let value = pass.normalize_add(s, &mut coeffs, &parents, true, true);
        remove_zero_coeffs(&mut coeffs);

        assert_eq!(value, bv(8, 8));
        let eight = pass.nm_mut().mk_value(bv(8, 8));
        assert_eq!(coeffs.len(), 2);
        assert_eq!(coeffs[&a], bv(1, 8));
        assert_eq!(coeffs[&eight], bv(1, 8))
    }

    #[test]
    fn test_normalize_add_push_neg() {
        let mut nm = NodeManager::new();
        let a = nm.mk_bv_var(8, "a");
        let b = nm.mk_bv_var(8, "b");
        let c = nm.mk_bv_var(8, "c");
        let ab = nm.mk_add(a, b);
        let inv = nm.mk_bvnot(ab);
        let s = nm.mk_add(inv, c);

        let mut pass = PassNormalize::with_share_aware(&mut nm, false);
        let parents = ParentsMap::new();
        let mut coeffs = CoefficientsMap::new();
        pass.compute_coefficients(s, Kind::BvAdd, &parents, &mut coeffs);
        let value = pass.normalize_add(s, &mut coeffs, &parents, false, true);
        remove_zero_coeffs(&mut coeffs);

        // ~(a + b) + c = -a - b - 1 + c
        assert_eq!(value, BitVector::ones(8));
        assert_eq!(coeffs.len(), 3);
        assert_eq!(coeffs[&a], BitVector::ones(8));
        assert_eq!(coeffs[&b], BitVector::ones(8));
        assert_eq!(coeffs[&c], bv(1, 8))
    }

    #[test]
    fn test_normalize_mul() {
        let mut nm = NodeManager::new();
        let a = nm.mk_bv_var(8, "a");
        let two = nm.mk_value(bv(2, 8));
        let three = nm.mk_value(bv(3, 8));
        let l = nm.mk_mul(two, a);
        let r = nm.mk_mul(three, a);
        let m = nm.mk_mul(l, r);

        let mut pass = PassNormalize::with_share_aware(&mut nm, false);
        let mut coeffs = CoefficientsMap::new();
        pass.compute_coefficients(m, Kind::BvMul, &ParentsMap::new(), &mut coeffs);
        let value = pass.normalize_mul(m, &mut coeffs, false);
        remove_zero_coeffs(&mut coeffs);
        assert_eq!(value, bv(6, 8));
        assert_eq!(coeffs.len(), 1);
        assert_eq!(coeffs[&a], bv(2, 8))
    }

    #[test]
    fn test_pow() {
        assert_eq!(pow(bv(3, 8), 0), bv(1, 8));
        assert_eq!(pow(bv(3, 8), 5), bv(243, 8));
        assert_eq!(pow(bv(2, 8), 8), bv(0, 8))
    }

    #[test]
    fn test_eq_add_factorize() {
        let mut nm = NodeManager::new();
        let a = nm.mk_bv_var(8, "a");
        let b = nm.mk_bv_var(8, "b");
        let c = nm.mk_bv_var(8, "c");
        let aa = nm.mk_add(a, a);
        let aaa = nm.mk_add(aa, a);
        let bc = nm.mk_add(b, c);

        let mut pass = PassNormalize::with_share_aware(&mut nm, false);
        let (eq, changed) = pass.normalize_eq_add_mul(aaa, bc);
        assert!(changed);
        let nm = pass.nm_mut();
        let three = nm.mk_value(bv(3, 8));
        let three_a = nm.mk_mul(three, a);
        assert_eq!(eq, nm.mk_eq(three_a, bc))
    }

    #[test]
    fn test_eq_add_cancel() {
        let mut nm = NodeManager::new();
        let a = nm.mk_bv_var(8, "a");
        let two = nm.mk_value(bv(2, 8));
        let three = nm.mk_value(bv(3, 8));
        let l = nm.mk_add(a, two);
        let r = nm.mk_add(a, three);
        let eq = nm.mk_eq(l, r);

        let mut pass = PassNormalize::with_share_aware(&mut nm, true);
        let result = pass.process(eq);
        assert!(pass.nm().is_false(result));

        let same = pass.nm_mut().mk_eq(l, l);
        let result = pass.process(same);
        assert!(pass.nm().is_true(result))
    }

    #[test]
    fn test_eq_add_inverted() {
        let mut nm = NodeManager::new();
        let x = nm.mk_bv_var(4, "x");
        let y = nm.mk_bv_var(4, "y");
        let z = nm.mk_bv_var(4, "z");
        let w = nm.mk_bv_var(4, "w");
        let not_x = nm.mk_bvnot(x);
        let l = nm.mk_add(not_x, y);
        let r = nm.mk_add(z, w);
        let eq = nm.mk_eq(l, r);

        let mut pass = PassNormalize::with_share_aware(&mut nm, false);
        let (result, changed) = pass.normalize_eq_add_mul(l, r);
        assert!(changed);
        let nm = pass.nm();
        // x has moved to the right hand side
        assert!(!nm.children(nm.child(result, 0)).contains(&not_x));
        for i in 0..256u64 {
            let vars = [(x, i & 0xf), (y, i >> 4), (z, (i * 7) & 0xf), (w, (i * 3 + 1) & 0xf)];
            assert_eq!(eval_with(nm, &vars, eq), eval_with(nm, &vars, result))
        }
    }

    #[test]
    fn test_eq_mul() {
        let mut nm = NodeManager::new();
        let a = nm.mk_bv_var(8, "a");
        let b = nm.mk_bv_var(8, "b");
        let c = nm.mk_bv_var(8, "c");
        let two = nm.mk_value(bv(2, 8));
        let ab = nm.mk_mul(a, b);
        let l = nm.mk_mul(ab, two);
        let r = nm.mk_mul(c, a);

        let mut pass = PassNormalize::with_share_aware(&mut nm, false);
        let (result, changed) = pass.normalize_eq_add_mul(l, r);
        assert!(changed);
        let nm = pass.nm();
        let eq = nm.children(result).to_vec();
        for (va, vb, vc) in [(3, 5, 10), (3, 5, 11), (0, 7, 1), (128, 1, 0)] {
            let vars = [(a, va), (b, vb), (c, vc)];
            let expected = (2 * va * vb) & 0xff == (vc * va) & 0xff;
            assert_eq!(eval_with(nm, &vars, eq[0]) == eval_with(nm, &vars, eq[1]), expected)
        }
    }

    #[test]
    fn test_comm_assoc_common() {
        let mut nm = NodeManager::new();
        let a = nm.mk_bv_var(8, "a");
        let b = nm.mk_bv_var(8, "b");
        let c = nm.mk_bv_var(8, "c");
        let d = nm.mk_bv_var(8, "d");
        let ab = nm.mk_add(a, b);
        let l = nm.mk_add(ab, c);
        let ba = nm.mk_add(b, a);
        let r = nm.mk_add(ba, d);

        let mut pass = PassNormalize::with_share_aware(&mut nm, false);
        let (result, changed) = pass.normalize_comm_assoc(Kind::BvUlt, l, r);
        assert!(changed);
        let nm = pass.nm_mut();
        let cab = nm.mk_add(c, ab);
        let dab = nm.mk_add(d, ab);
        assert_eq!(result, nm.mk_ult(cab, dab))
    }

    #[test]
    fn test_comm_assoc_through_extract() {
        let mut nm = NodeManager::new();
        let a = nm.mk_bv_var(8, "a");
        let b = nm.mk_bv_var(8, "b");
        let c = nm.mk_bv_var(8, "c");
        let d = nm.mk_bv_var(8, "d");
        let ab = nm.mk_add(a, b);
        let l = nm.mk_add(ab, c);
        let ba = nm.mk_add(b, a);
        let r = nm.mk_add(ba, d);
        let l = nm.mk_extract(l, 3, 0);
        let r = nm.mk_extract(r, 3, 0);

        let mut pass = PassNormalize::with_share_aware(&mut nm, false);
        let (result, changed) = pass.normalize_comm_assoc(Kind::Equal, l, r);
        assert!(changed);
        let nm = pass.nm_mut();
        let cab = nm.mk_add(c, ab);
        let dab = nm.mk_add(d, ab);
        let l = nm.mk_extract(cab, 3, 0);
        let r = nm.mk_extract(dab, 3, 0);
        assert_eq!(result, nm.mk_eq(l, r))
    }

    #[test]
    fn test_comm_assoc_rejected() {
        let mut nm = NodeManager::new();
        let a = nm.mk_bv_var(8, "a");
        let b = nm.mk_bv_var(8, "b");
        let c = nm.mk_bv_var(8, "c");
        let l = nm.mk_add(a, b);
        let eq = nm.mk_eq(l, c);

        let mut pass = PassNormalize::with_share_aware(&mut nm, false);
        assert_eq!(pass.normalize_comm_assoc(Kind::Equal, l, c), (eq, false))
    }

    #[test]
    fn test_comm_assoc_node() {
        let mut nm = NodeManager::new();
        let a = nm.mk_bv_var(8, "a");
        let one = nm.mk_value(bv(1, 8));
        let two = nm.mk_value(bv(2, 8));
        let s = nm.mk_add(a, one);
        let s = nm.mk_add(s, two);
        let lo = nm.mk_value(bv(0x0f, 8));
        let hi = nm.mk_value(bv(0xf3, 8));
        let m = nm.mk_node(Kind::BvAnd, &[a, lo]);
        let m = nm.mk_node(Kind::BvAnd, &[m, hi]);
        let z = nm.mk_value(bv(0xf0, 8));
        let zm = nm.mk_node(Kind::BvAnd, &[m, z]);

        let mut pass = PassNormalize::with_share_aware(&mut nm, false);
        let (result, changed) = pass.normalize_comm_assoc_node(s);
        assert!(changed);
        let three = pass.nm_mut().mk_value(bv(3, 8));
        assert_eq!(result, pass.nm_mut().mk_add(a, three));

        let (result, changed) = pass.normalize_comm_assoc_node(m);
        assert!(changed);
        let masked = pass.nm_mut().mk_value(bv(0x03, 8));
        assert_eq!(result, pass.nm_mut().mk_node(Kind::BvAnd, &[a, masked]));

        let (result, changed) = pass.normalize_comm_assoc_node(zm);
        assert!(changed);
        assert_eq!(pass.nm().value(result), Some(bv(0, 8)));

        let b = pass.nm_mut().mk_bv_var(8, "b");
        let ab = pass.nm_mut().mk_add(a, b);
        assert_eq!(pass.normalize_comm_assoc_node(ab), (ab, false))
    }

    #[test]
    fn test_comm_assoc_node_inverted_add() {
        let mut nm = NodeManager::new();
        let a = nm.mk_bv_var(4, "a");
        let b = nm.mk_bv_var(4, "b");
        let c = nm.mk_bv_var(4, "c");
        let ab = nm.mk_add(a, b);
        let not_ab = nm.mk_bvnot(ab);
        // ~(a + b) + c
        let s1 = nm.mk_add(not_ab, c);
        // ~(a + b) + a + b
        let s2 = nm.mk_nary(Kind::BvAdd, &[not_ab, a, b]);

        let config = SolverConfig::default();
        let mut pass = PassNormalize::new(&mut nm, &config);
        let (r1, _) = pass.normalize_comm_assoc_node(s1);
        let (r2, changed) = pass.normalize_comm_assoc_node(s2);
        assert!(changed);
        assert_eq!(pass.nm().value(r2), Some(BitVector::ones(4)));

        for va in 0..16 {
            for vb in 0..16 {
                for vc in 0..16 {
                    let vars = [(a, va), (b, vb), (c, vc)];
                    assert_eq!(eval_with(pass.nm(), &vars, s1), eval_with(pass.nm(), &vars, r1));
                    assert_eq!(eval_with(pass.nm(), &vars, s2), eval_with(pass.nm(), &vars, r2))
                }
            }
        }
    }

    #[test]
    fn test_rewrite_udiv() {
        let mut nm = NodeManager::new();
        let t = nm.mk_bv_var(4, "t");
        let y = nm.mk_bv_var(4, "y");
        let q = nm.mk_node(Kind::BvUdiv, &[y, t]);
        let m = nm.mk_mul(t, q);
        let zero = nm.mk_zero(4);
        let eq = nm.mk_eq(m, zero);

        let mut pass = PassNormalize::with_share_aware(&mut nm, false);
        let result = pass.process(eq);
        assert_eq!(pass.nm().kind(result), Kind::Or);
        for vt in 0..16 {
            for vy in 0..16 {
                let vars = [(t, vt), (y, vy)];
                assert_eq!(eval_with(pass.nm(), &vars, eq), eval_with(pass.nm(), &vars, result))
            }
        }
    }

    #[test]
    fn test_distrib_mul() {
        let mut nm = NodeManager::new();
        let a = nm.mk_bv_var(8, "a");
        let b = nm.mk_bv_var(8, "b");
        let c = nm.mk_bv_var(8, "c");
        let ab = nm.mk_add(a, b);
        let m = distrib_mul(&mut nm, ab, c, DISTRIB_MUL_DEPTH);
        let ac = nm.mk_mul(a, c);
        let bc = nm.mk_mul(b, c);
        assert_eq!(m, nm.mk_add(ac, bc));
        assert_eq!(distrib_mul(&mut nm, ab, c, 0), nm.mk_mul(ab, c))
    }

    #[test]
    fn test_apply() {
        let mut nm = NodeManager::new();
        let a = nm.mk_bv_var(8, "a");
        let b = nm.mk_bv_var(8, "b");
        let c = nm.mk_bv_var(8, "c");
        let five = nm.mk_value(bv(5, 8));
        let seven = nm.mk_value(bv(7, 8));
        let ab = nm.mk_add(a, b);
        let l = nm.mk_add(ab, five);
        let ac = nm.mk_add(a, c);
        let r = nm.mk_add(ac, seven);
        let eq = nm.mk_eq(l, r);
        let p = nm.mk_param(4, "p");
        let pp = nm.mk_add(p, p);
        let qe = nm.mk_eq(pp, p);
        let q = nm.mk_forall(p, qe);

        let mut assertions = vec![eq, q];
        let mut pass = PassNormalize::with_share_aware(&mut nm, true);
        assert!(pass.apply(&mut assertions));
        assert_ne!(assertions[0], eq);
        assert_eq!(assertions[1], q);
        assert!(pass.stats.size_after_process < pass.stats.size_before);

        for (va, vb, vc) in [(1, 2, 0), (9, 4, 2), (200, 3, 1), (0, 0, 0)] {
            let vars = [(a, va), (b, vb), (c, vc)];
            assert_eq!(eval_with(pass.nm(), &vars, eq), eval_with(pass.nm(), &vars, assertions[0]))
        }

        // Normalizing again gives nothing smaller
        let normalized = assertions.clone();
        assert!(!pass.apply(&mut assertions));
        assert_eq!(assertions, normalized)
    }
}
