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

//! Global normalization of addition chains.
//!
//! All addition chains in a set of assertions are flattened and then
//! rebuilt together, adding shared leaves in the same order in every
//! chain. Chains with common leaves then share their prefixes when
//! hash-consed.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::Instant;

use super::{remove_zero_coeffs, CoefficientsMap, PassNormalize};
use crate::bitvector::BitVector;
use crate::log;
use crate::node::{contains_quantifier, rebuild, Kind, Node, NodeManager, Substitute};

/// The node a leaf is ordered by. Concatenations, extracts, and
/// bitwise negations are looked through.
pub fn cmp_repr(nm: &NodeManager, node: Node) -> Node {
    let mut cur = node;
    loop {
        match nm.kind(cur) {
            Kind::BvConcat => cur = nm.child(cur, 1),
            Kind::BvExtract(_, _) | Kind::BvNot => cur = nm.child(cur, 0),
            _ => return cur,
        }
    }
}

/// Order leaves by the (sorted) ids of the chains they occur in,
/// lexicographically. If one list is a prefix of the other the longer
/// one comes first, so leaves shared by more chains are added first.
fn sort_cmp(a: Node, occs_a: &[u64], b: Node, occs_b: &[u64]) -> Ordering {
    if occs_a != occs_b {
        for (x, y) in occs_a.iter().zip(occs_b) {
            if x != y {
                return x.cmp(y);
            }
        }
        if occs_a.len() != occs_b.len() {
            return occs_b.len().cmp(&occs_a.len());
        }
    }
    a.cmp(&b)
}

impl<'a> PassNormalize<'a> {
    /// Compute (non share-aware) coefficients for every addition chain
    /// reachable from `assertions`, including chains nested below the
    /// leaves of other chains.
    fn collect_adders(&mut self, assertions: &[Node]) -> BTreeMap<Node, CoefficientsMap> {
        let mut adders = BTreeMap::new();
        let mut cache = HashSet::new();
        let mut visit = assertions.to_vec();

        while let Some(cur) = visit.pop() {
            if !cache.insert(cur) {
                continue;
            }
            if self.nm.kind(cur) == Kind::BvAdd {
                let mut coeffs = CoefficientsMap::new();
                self.coefficients(cur, Kind::BvAdd, None, &mut coeffs);
                visit.extend(coeffs.keys());
                adders.insert(cur, coeffs);
            } else {
                visit.extend_from_slice(self.nm.children(cur))
            }
        }

        adders
    }

    /// Rebuild every addition chain in the (unquantified) assertions
    /// so that leaves common to several chains are added in a
    /// consistent order. Returns the new assertions, in the same order.
    pub fn normalize_adders(&mut self, assertions: &[Node]) -> Vec<Node> {
        let now = Instant::now();

        let ground: Vec<Node> = assertions.iter().filter(|a| !contains_quantifier(self.nm, **a)).copied().collect();
        let mut adders = self.collect_adders(&ground);
        for coeffs in adders.values_mut() {
            remove_zero_coeffs(coeffs)
        }

        // Leaf to the chains it occurs in, and the same for the
        // representative each leaf is ordered by
        let mut elements: BTreeMap<Node, Vec<Node>> = BTreeMap::new();
        let mut elements_repr: HashMap<Node, BTreeSet<Node>> = HashMap::new();
        let mut sizes = Vec::new();
        for (chain, coeffs) in &adders {
            for leaf in coeffs.keys() {
                elements.entry(*leaf).or_default().push(*chain);
                elements_repr.entry(cmp_repr(self.nm, *leaf)).or_default().insert(*chain);
            }
            sizes.push((*chain, coeffs.len()))
        }

        // Larger chains get smaller ids
        sizes.sort_by(|a, b| b.1.cmp(&a.1));
        let ids: HashMap<Node, u64> = sizes.iter().enumerate().map(|(i, (chain, _))| (*chain, i as u64)).collect();

        let occs: HashMap<Node, Vec<u64>> = elements_repr
            .iter()
            .map(|(repr, chains)| {
                let mut v: Vec<u64> = chains.iter().map(|c| ids[c]).collect();
                v.sort_unstable();
                (*repr, v)
            })
            .collect();

        let mut order: Vec<(Node, Node)> = elements.keys().map(|leaf| (*leaf, cmp_repr(self.nm, *leaf))).collect();
        order.sort_by(|(leaf_a, a), (leaf_b, b)| sort_cmp(*a, &occs[a], *b, &occs[b]).then(leaf_a.cmp(leaf_b)));

        // Each leaf is consumed once per chain in the sorted order, with
        // whatever multiplicity remains added afterwards
        let mut plans: BTreeMap<Node, Vec<(Node, BitVector)>> = BTreeMap::new();
        for (leaf, _) in &order {
            for chain in &elements[leaf] {
                if let Some(c) = adders.get_mut(chain).and_then(|coeffs| coeffs.get_mut(leaf)) {
                    plans.entry(*chain).or_default().push((*leaf, BitVector::one(c.len())));
                    *c = c.dec()
                }
            }
        }
        for (chain, plan) in plans.iter_mut() {
            for (leaf, rem) in &adders[chain] {
                if !rem.is_zero() {
                    plan.push((*leaf, *rem))
                }
            }
        }

        // Chains nested below leaves have smaller ids, so they are
        // rebuilt first and substituted into the leaves of later chains
        let mut results: HashMap<Node, Node> = HashMap::new();
        let mut cache = HashMap::new();
        for (chain, plan) in &plans {
            let mut sum = None;
            for (leaf, coeff) in plan {
                let image = rebuild(&mut Substitute { nm: self.nm, subst: &results }, &mut cache, *leaf);
                let arg = if coeff.is_one() {
                    image
                } else {
                    let c = self.nm.mk_value(*coeff);
                    self.nm.mk_mul(c, image)
                };
                sum = Some(match sum {
                    None => arg,
                    Some(sum) => self.nm.mk_add(arg, sum),
                })
            }
            if let Some(sum) = sum {
                results.insert(*chain, sum);
            }
        }

        let result = assertions
            .iter()
            .map(|a| {
                if contains_quantifier(self.nm, *a) {
                    *a
                } else {
                    rebuild(&mut Substitute { nm: self.nm, subst: &results }, &mut cache, *a)
                }
            })
            .collect();

        log!(log::NORMALIZE, format!("normalized {} adder chains", results.len()));
        self.stats.time_adder_chains += now.elapsed();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cmp_repr() {
        let mut nm = NodeManager::new();
        let x = nm.mk_bv_var(8, "x");
        let y = nm.mk_bv_var(4, "y");
        let not_x = nm.mk_bvnot(x);
        let ext = nm.mk_extract(not_x, 3, 0);
        let cat = nm.mk_concat(y, ext);
        assert_eq!(cmp_repr(&nm, cat), x);
        assert_eq!(cmp_repr(&nm, y), y)
    }

    #[test]
    fn test_sort_cmp() {
        let mut nm = NodeManager::new();
        let a = nm.mk_bv_var(8, "a");
        let b = nm.mk_bv_var(8, "b");
        assert_eq!(sort_cmp(a, &[0, 1], b, &[0, 2]), Ordering::Less);
        assert_eq!(sort_cmp(a, &[0], b, &[0, 1]), Ordering::Greater);
        assert_eq!(sort_cmp(a, &[1], b, &[0, 1]), Ordering::Greater);
        assert_eq!(sort_cmp(a, &[0, 1], b, &[0, 1]), Ordering::Less);
        assert_eq!(sort_cmp(b, &[0, 1], a, &[0, 1]), Ordering::Greater)
    }

    #[test]
    fn test_shared_prefix() {
        let mut nm = NodeManager::new();
        let a = nm.mk_bv_var(8, "a");
        let b = nm.mk_bv_var(8, "b");
        let c = nm.mk_bv_var(8, "c");
        let d = nm.mk_bv_var(8, "d");
        // (a + b) + c and (d + b) + a share the leaves a and b
        let ab = nm.mk_add(a, b);
        let s1 = nm.mk_add(ab, c);
        let db = nm.mk_add(d, b);
        let s2 = nm.mk_add(db, a);
        let x = nm.mk_bv_var(8, "x");
        let e1 = nm.mk_eq(s1, x);
        let e2 = nm.mk_eq(s2, x);

        let mut pass = PassNormalize::with_share_aware(&mut nm, false);
        let result = pass.normalize_adders(&[e1, e2]);
        let nm = pass.nm();
        let lhs1 = nm.child(result[0], 0);
        let lhs2 = nm.child(result[1], 0);
        assert_eq!(nm.kind(lhs1), Kind::BvAdd);
        assert_eq!(nm.kind(lhs2), Kind::BvAdd);
        // Both chains are built on a common subterm adding a and b
        let inner1 = nm.child(lhs1, 1);
        let inner2 = nm.child(lhs2, 1);
        assert_eq!(inner1, inner2);
        assert_eq!(nm.kind(inner1), Kind::BvAdd);
        assert!(nm.children(inner1).contains(&a));
        assert!(nm.children(inner1).contains(&b))
    }

    #[test]
    fn test_residual_coefficients() {
        let mut nm = NodeManager::new();
        let a = nm.mk_bv_var(8, "a");
        let b = nm.mk_bv_var(8, "b");
        let aa = nm.mk_add(a, a);
        let s = nm.mk_add(aa, a);
        let s = nm.mk_add(s, b);
        let x = nm.mk_bv_var(8, "x");
        let e = nm.mk_eq(s, x);

        let mut pass = PassNormalize::with_share_aware(&mut nm, false);
        let result = pass.normalize_adders(&[e]);
        let nm = pass.nm_mut();
        let lhs = nm.child(result[0], 0);
        // Each leaf once in order, then 2 * a
        let two = nm.mk_value(BitVector::new(2, 8));
        let two_a = nm.mk_mul(two, a);
        let first = nm.child(lhs, 1);
        assert_eq!(nm.child(lhs, 0), two_a);
        assert_eq!(nm.kind(first), Kind::BvAdd);
        assert!(nm.children(first).contains(&a));
        assert!(nm.children(first).contains(&b))
    }

    #[test]
    fn test_quantified_untouched() {
        let mut nm = NodeManager::new();
        let p = nm.mk_param(4, "p");
        let x = nm.mk_bv_var(4, "x");
        let s = nm.mk_add(p, x);
        let s = nm.mk_add(s, p);
        let e = nm.mk_eq(s, x);
        let q = nm.mk_forall(p, e);

        let mut pass = PassNormalize::with_share_aware(&mut nm, false);
        assert_eq!(pass.normalize_adders(&[q]), vec![q])
    }
}
