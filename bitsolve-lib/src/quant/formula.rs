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

//! Preparing quantified formulas for the CEGQI loop: pushing negations
//! into quantifiers, binding free variables, computing which
//! parameters each parameter may depend on, and building the dual of
//! a formula.

use std::collections::{HashMap, HashSet};

use crate::error::Error;
use crate::node::{post_order, rebuild, substitute, Kind, Node, NodeManager, Rebuild, Sort, Transfer, Visit};

/// Rewrite the conjunction of `assertions` so every quantifier occurs
/// positively. Negations are pushed through `not`, `and`, `or` and
/// `implies`, flipping the quantifiers they pass. Free variables
/// become existentially bound at the outermost level, and every
/// quantifier binds its own parameter.
pub fn normalize_quantifiers(nm: &mut NodeManager, assertions: &[Node]) -> Result<Node, Error> {
    let root = nm.mk_conj(assertions);
    let root = push_negations(nm, root)?;
    let root = bind_free_vars(nm, root)?;
    let mut cache = HashMap::new();
    Ok(rebuild(&mut FreshBinders { nm }, &mut cache, root))
}

fn quantified_nodes(nm: &NodeManager, root: Node) -> HashSet<Node> {
    let mut quantified = HashSet::new();
    for n in post_order(nm, &[root]) {
        if nm.kind(n).is_quantifier() || nm.children(n).iter().any(|c| quantified.contains(c)) {
            quantified.insert(n);
        }
    }
    quantified
}

fn push_negations(nm: &mut NodeManager, root: Node) -> Result<Node, Error> {
    use Kind::*;
    let quantified = quantified_nodes(nm, root);
    let mut done: HashMap<(Node, bool), Node> = HashMap::new();
    let mut stack = vec![(root, true, false)];

    while let Some((n, pol, expanded)) = stack.pop() {
        if done.contains_key(&(n, pol)) {
            continue;
        }

        if !quantified.contains(&n) {
            let result = if pol { n } else { nm.mk_not(n) };
            done.insert((n, pol), result);
            continue;
        }

        let kind = nm.kind(n);
        let children = nm.children(n).to_vec();
        let operands: Vec<(Node, bool)> = match kind {
            Not => vec![(children[0], !pol)],
            And | Or => vec![(children[0], pol), (children[1], pol)],
            Implies => vec![(children[0], !pol), (children[1], pol)],
            Forall | Exists => vec![(children[1], pol)],
            _ => return Err(Error::Unsupported(format!("quantifier below {}", kind.name()))),
        };

        if !expanded {
            stack.push((n, pol, true));
            for op in operands.iter().rev() {
                if !done.contains_key(op) {
                    stack.push((op.0, op.1, false))
                }
            }
            continue;
        }

        let results: Vec<Node> = operands.iter().map(|op| done[op]).collect();
        let result = match (kind, pol) {
            (Not, _) => results[0],
            (And, true) | (Or, false) => nm.mk_and(results[0], results[1]),
            (Or, true) | (And, false) | (Implies, true) => nm.mk_or(results[0], results[1]),
            (Implies, false) => nm.mk_and(results[0], results[1]),
            (Forall, true) | (Exists, false) => nm.mk_forall(children[0], results[0]),
            (Exists, true) | (Forall, false) => nm.mk_exists(children[0], results[0]),
            _ => unreachable!(),
        };
        done.insert((n, pol), result);
    }

    Ok(done[&(root, true)])
}

fn bind_free_vars(nm: &mut NodeManager, root: Node) -> Result<Node, Error> {
    let vars: Vec<Node> = post_order(nm, &[root]).into_iter().filter(|n| nm.kind(*n) == Kind::Var).collect();
    if vars.is_empty() {
        return Ok(root);
    }

    let mut subst = HashMap::new();
    let mut params = Vec::new();
    for v in vars {
        let name = nm.name(v).unwrap_or("_").to_string();
        match nm.sort(v).clone() {
            Sort::BitVec(w) => {
                let p = nm.mk_param(w, &name);
                subst.insert(v, p);
                params.push(p)
            }
            Sort::Bool => {
                let p = nm.mk_param(1, &name);
                let one = nm.mk_one(1);
                subst.insert(v, nm.mk_eq(p, one));
                params.push(p)
            }
            Sort::Fun(_, _) => return Err(Error::Unreachable(format!("variable {} has a function sort", name))),
        }
    }

    let mut result = substitute(nm, &subst, root);
    for p in params.into_iter().rev() {
        result = nm.mk_exists(p, result)
    }
    Ok(result)
}

/// Gives every quantifier node a parameter of its own, so a parameter
/// is bound by exactly one quantifier.
struct FreshBinders<'a> {
    nm: &'a mut NodeManager,
}

impl<'a> Rebuild for FreshBinders<'a> {
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
        if !kind.is_quantifier() {
            return self.nm.mk_like(n, &children);
        }
        let param = children[0];
        let name = self.nm.name(param).unwrap_or("_").to_string();
        let fresh = self.nm.mk_param(self.nm.width(param), &name);
        let mut subst = HashMap::new();
        subst.insert(param, fresh);
        let body = substitute(self.nm, &subst, children[1]);
        self.nm.mk_node(kind, &[fresh, body])
    }
}

/// The quantifier structure of a formula.
#[derive(Debug, Default)]
pub struct VarDeps {
    /// Universally bound parameters, outermost first
    pub universal: Vec<Node>,
    /// Existentially bound parameters, outermost first
    pub existential: Vec<Node>,
    /// For an existential parameter, the universal parameters bound
    /// around it, and for a universal parameter the existential ones.
    pub deps: HashMap<Node, Vec<Node>>,
    /// Number of quantifiers enclosing the binder of each parameter.
    pub depth: HashMap<Node, usize>,
}

enum Frame {
    Enter(Node),
    Exit(Node),
}

pub fn compute_var_deps(nm: &NodeManager, root: Node) -> VarDeps {
    let mut deps = VarDeps::default();
    let mut foralls: Vec<Node> = Vec::new();
    let mut exists: Vec<Node> = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![Frame::Enter(root)];

    while let Some(frame) = stack.pop() {
        match frame {
            Frame::Enter(n) => {
                if !visited.insert(n) {
                    continue;
                }
                let kind = nm.kind(n);
                if kind.is_quantifier() {
                    let param = nm.child(n, 0);
                    deps.depth.insert(param, foralls.len() + exists.len());
                    if kind == Kind::Forall {
                        deps.deps.insert(param, exists.clone());
                        deps.universal.push(param);
                        foralls.push(param)
                    } else {
                        deps.deps.insert(param, foralls.clone());
                        deps.existential.push(param);
                        exists.push(param)
                    }
                    stack.push(Frame::Exit(n));
                    stack.push(Frame::Enter(nm.child(n, 1)))
                } else {
                    for child in nm.children(n).iter().rev() {
                        stack.push(Frame::Enter(*child))
                    }
                }
            }
            Frame::Exit(n) => {
                if nm.kind(n) == Kind::Forall {
                    foralls.pop();
                } else {
                    exists.pop();
                }
            }
        }
    }

    deps
}

struct Dual<'a> {
    transfer: Transfer<'a>,
}

impl<'a> Rebuild for Dual<'a> {
    fn source(&self) -> &NodeManager {
        self.transfer.src
    }

    fn enter(&mut self, n: Node) -> Visit {
        self.transfer.enter(n)
    }

    fn leave(&mut self, n: Node, children: Vec<Node>) -> Node {
        let kind = match self.transfer.src.kind(n) {
            Kind::Forall => Kind::Exists,
            Kind::Exists => Kind::Forall,
            kind => kind,
        };
        self.transfer.dst.mk_node(kind, &children)
    }
}

/// Copy `root` into `dst` with every quantifier swapped and the
/// result negated. Parameters are read by the kind of their binder,
/// so this is the negation of `root`.
pub fn mk_dual_formula(src: &NodeManager, dst: &mut NodeManager, root: Node) -> Node {
    let mut symbols = HashMap::new();
    let mut cache = HashMap::new();
    let dual = rebuild(&mut Dual { transfer: Transfer { src, dst, symbols: &mut symbols } }, &mut cache, root);
    dst.mk_not(dual)
}

pub fn collect_consts(nm: &NodeManager, root: Node) -> Vec<Node> {
    post_order(nm, &[root]).into_iter().filter(|n| nm.is_value(*n) && !nm.is_bool(*n)).collect()
}

pub fn collect_ufs(nm: &NodeManager, root: Node) -> Vec<Node> {
    post_order(nm, &[root]).into_iter().filter(|n| nm.kind(*n) == Kind::Uf).collect()
}

/// Copies a quantified formula into a ground solver's node manager,
/// replacing each quantifier by its body. Every parameter and
/// function symbol must be mapped by `map`.
pub struct Ground<'a> {
    pub src: &'a NodeManager,
    pub dst: &'a mut NodeManager,
    pub map: &'a HashMap<Node, Node>,
}

impl<'a> Rebuild for Ground<'a> {
    fn source(&self) -> &NodeManager {
        self.src
    }

    fn enter(&mut self, n: Node) -> Visit {
        if let Some(m) = self.map.get(&n) {
            return Visit::Done(*m);
        }
        match self.src.kind(n) {
            Kind::Value => Visit::Done(self.dst.mk_const(self.src.sort(n), self.src.bv_value(n))),
            Kind::Var | Kind::Param | Kind::Uf => {
                panic!("unmapped symbol {} when grounding formula", self.src.name(n).unwrap_or("_"))
            }
            _ => Visit::Descend,
        }
    }

    fn leave(&mut self, n: Node, children: Vec<Node>) -> Node {
        if self.src.kind(n).is_quantifier() {
            children[1]
        } else {
            self.dst.mk_node(self.src.kind(n), &children)
        }
    }
}

/// Instantiate `root` with `map`, copying it into `dst`.
pub fn build_refinement(src: &NodeManager, dst: &mut NodeManager, root: Node, map: &HashMap<Node, Node>) -> Node {
    let mut cache = HashMap::new();
    rebuild(&mut Ground { src, dst, map }, &mut cache, root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitvector::BitVector;
    use crate::eval::{eval, Model};

    fn holds(nm: &NodeManager, n: Node) -> bool {
        eval(nm, &Model::new(), n).unwrap().is_true()
    }

    #[test]
    fn test_negation_flips_quantifiers() {
        let mut nm = NodeManager::new();
        let p = nm.mk_param(4, "p");
        let x = nm.mk_bv_var(4, "x");
        let lt = nm.mk_ult(p, x);
        let q = nm.mk_forall(p, lt);
        let neg = nm.mk_not(q);
        let root = normalize_quantifiers(&mut nm, &[neg]).unwrap();

        // exists x. exists p'. not (p' < x)
        assert_eq!(nm.kind(root), Kind::Exists);
        let inner = nm.child(root, 1);
        assert_eq!(nm.kind(inner), Kind::Exists);
        let body = nm.child(inner, 1);
        assert_eq!(nm.kind(body), Kind::Not);
        assert_ne!(nm.child(inner, 0), p);
        assert!(holds(&nm, root))
    }

    #[test]
    fn test_implies() {
        let mut nm = NodeManager::new();
        let p = nm.mk_param(3, "p");
        let zero = nm.mk_zero(3);
        let eq = nm.mk_eq(p, zero);
        let q = nm.mk_exists(p, eq);
        let t = nm.mk_true();
        let imp = nm.mk_implies(q, t);
        let root = normalize_quantifiers(&mut nm, &[imp]).unwrap();
        // (not exists p. p = 0) or true
        assert_eq!(nm.kind(root), Kind::Or);
        assert_eq!(nm.kind(nm.child(root, 0)), Kind::Forall);
        assert!(holds(&nm, root))
    }

    #[test]
    fn test_quantifier_below_ite() {
        let mut nm = NodeManager::new();
        let p = nm.mk_param(2, "p");
        let eq = nm.mk_eq(p, p);
        let q = nm.mk_forall(p, eq);
        let c = nm.mk_var(Sort::Bool, "c");
        let t = nm.mk_true();
        let ite = nm.mk_ite(c, q, t);
        assert!(normalize_quantifiers(&mut nm, &[ite]).is_err())
    }

    #[test]
    fn test_shared_binder_renamed() {
        let mut nm = NodeManager::new();
        let p = nm.mk_param(2, "p");
        let zero = nm.mk_zero(2);
        let eq = nm.mk_eq(p, zero);
        let q = nm.mk_forall(p, eq);
        let nq = nm.mk_not(q);
        let root = normalize_quantifiers(&mut nm, &[q, nq]).unwrap();
        let deps = compute_var_deps(&nm, root);
        assert_eq!(deps.universal.len(), 1);
        assert_eq!(deps.existential.len(), 1);
        assert_ne!(deps.universal[0], deps.existential[0])
    }

    #[test]
    fn test_free_bool_var() {
        let mut nm = NodeManager::new();
        let b = nm.mk_var(Sort::Bool, "b");
        let root = normalize_quantifiers(&mut nm, &[b]).unwrap();
        assert_eq!(nm.kind(root), Kind::Exists);
        assert!(holds(&nm, root))
    }

    #[test]
    fn test_var_deps() {
        // forall x. exists y. forall z. exists w. x + y = z + w
        let mut nm = NodeManager::new();
        let x = nm.mk_param(4, "x");
        let y = nm.mk_param(4, "y");
        let z = nm.mk_param(4, "z");
        let w = nm.mk_param(4, "w");
        let l = nm.mk_add(x, y);
        let r = nm.mk_add(z, w);
        let eq = nm.mk_eq(l, r);
        let qw = nm.mk_exists(w, eq);
        let qz = nm.mk_forall(z, qw);
        let qy = nm.mk_exists(y, qz);
        let qx = nm.mk_forall(x, qy);

        let deps = compute_var_deps(&nm, qx);
        assert_eq!(deps.universal, vec![x, z]);
        assert_eq!(deps.existential, vec![y, w]);
        assert_eq!(deps.deps[&y], vec![x]);
        assert_eq!(deps.deps[&w], vec![x, z]);
        assert_eq!(deps.deps[&z], vec![y]);
        assert!(deps.deps[&x].is_empty());
        assert_eq!(deps.depth[&w], 3)
    }

    #[test]
    fn test_dual_formula() {
        let mut src = NodeManager::new();
        let x = src.mk_param(3, "x");
        let y = src.mk_param(3, "y");
        let le = src.mk_ule(x, y);
        let qy = src.mk_forall(y, le);
        let qx = src.mk_exists(x, qy);
        assert!(holds(&src, qx));

        let mut dst = NodeManager::new();
        let dual = mk_dual_formula(&src, &mut dst, qx);
        assert_eq!(dst.kind(dual), Kind::Not);
        let swapped = dst.child(dual, 0);
        assert_eq!(dst.kind(swapped), Kind::Forall);
        assert_eq!(dst.kind(dst.child(swapped, 1)), Kind::Exists);
        let deps = compute_var_deps(&dst, dual);
        assert_eq!(deps.universal.len(), 1);
        assert_eq!(deps.deps[&deps.existential[0]], deps.universal)
    }

    #[test]
    fn test_build_refinement() {
        let mut src = NodeManager::new();
        let x = src.mk_param(4, "x");
        let y = src.mk_param(4, "y");
        let three = src.mk_value(BitVector::new(3, 4));
        let sum = src.mk_add(x, three);
        let eq = src.mk_eq(sum, y);
        let qy = src.mk_exists(y, eq);
        let qx = src.mk_forall(x, qy);
        assert_eq!(collect_consts(&src, qx), vec![three]);

        let mut dst = NodeManager::new();
        let c = dst.mk_value(BitVector::new(5, 4));
        let v = dst.mk_bv_var(4, "y");
        let mut map = HashMap::new();
        map.insert(x, c);
        map.insert(y, v);
        let r = build_refinement(&src, &mut dst, qx, &map);
        assert_eq!(dst.kind(r), Kind::Equal);
        let mut model = Model::new();
        model.vars.insert(v, BitVector::new(8, 4));
        assert!(eval(&dst, &model, r).unwrap().is_true())
    }
}
