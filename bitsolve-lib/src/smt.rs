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

//! This module defines the interface to ground (quantifier-free)
//! decision procedures used by the quantifier solver, along with a
//! concrete implementation that bit-blasts terms into an AIG and
//! solves the resulting CNF with CaDiCaL.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::bitvector::BitVector;
use crate::eval::{eval, Model};
use crate::log;
use crate::node::{Kind, Node, NodeManager, Sort};

pub mod aig;

use aig::{eq_bits, AigBitblaster, AigLit, AigNode};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SmtResult {
    Sat,
    Unsat,
    Unknown,
}

use SmtResult::*;

impl SmtResult {
    pub fn is_unknown(self) -> bool {
        self == Unknown
    }

    /// The result for the dual of a formula, which is satisfiable
    /// exactly when the original is not.
    pub fn dual(self) -> Self {
        match self {
            Sat => Unsat,
            Unsat => Sat,
            Unknown => Unknown,
        }
    }
}

/// A cancellation predicate. Solvers poll it before each query and
/// periodically during search, and give up with [SmtResult::Unknown]
/// once it returns true.
#[derive(Clone, Default)]
pub struct Terminator {
    check: Option<Arc<dyn Fn() -> bool + Send + Sync>>,
}

impl Terminator {
    pub fn never() -> Self {
        Terminator { check: None }
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Terminator { check: Some(Arc::new(f)) }
    }

    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self::from_fn(move || flag.load(Ordering::Relaxed))
    }

    pub fn deadline(deadline: Instant) -> Self {
        Self::from_fn(move || Instant::now() >= deadline)
    }

    /// Terminate when either predicate does.
    pub fn or(&self, other: &Terminator) -> Self {
        match (&self.check, &other.check) {
            (None, _) => other.clone(),
            (_, None) => self.clone(),
            (Some(f), Some(g)) => {
                let (f, g) = (f.clone(), g.clone());
                Self::from_fn(move || f() || g())
            }
        }
    }

    pub fn terminate(&self) -> bool {
        self.check.as_ref().map_or(false, |f| f())
    }
}

/// A ground decision procedure. Each solver owns the node manager its
/// terms are built in.
pub trait GroundSolver: Send {
    fn new() -> Self
    where
        Self: Sized;

    fn nm(&self) -> &NodeManager;

    fn nm_mut(&mut self) -> &mut NodeManager;

    fn assert_formula(&mut self, formula: Node);

    /// Check satisfiability of the assertions together with
    /// `assumptions`, which only hold for this check.
    fn check_sat(&mut self, assumptions: &[Node]) -> SmtResult;

    /// The value of a ground term in the model from the last
    /// satisfiable check.
    fn get_value(&mut self, term: Node) -> Option<BitVector>;

    /// The value of an uninterpreted function at the given arguments
    /// in the model from the last satisfiable check.
    fn get_fun_value(&self, uf: Node, args: &[BitVector]) -> Option<BitVector>;

    fn push(&mut self);

    fn pop(&mut self);

    fn set_terminator(&mut self, terminator: Terminator);
}

/// Lets CaDiCaL poll a [Terminator] during search.
struct Interrupt {
    terminator: Terminator,
}

impl cadical::Callbacks for Interrupt {
    fn terminate(&mut self) -> bool {
        self.terminator.terminate()
    }
}

/// SAT literals are DIMACS-style: a positive variable index, negated
/// by sign.
type Lit = i32;

fn sat_lit(var: Lit, negated: bool) -> Lit {
    if negated {
        -var
    } else {
        var
    }
}

pub struct Solver {
    nm: NodeManager,
    blaster: AigBitblaster,
    sat: cadical::Solver<Interrupt>,
    num_sat_vars: i32,
    sat_vars: Vec<Option<Lit>>,
    applies: HashMap<Node, Vec<Node>>,
    /// Activation literals of the open push scopes
    scopes: Vec<Lit>,
    terminator: Terminator,
    model: Option<Model>,
    checks: usize,
}

impl Solver {
    pub fn model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    pub fn num_checks(&self) -> usize {
        self.checks
    }

    fn mapped(&self, lit: AigLit) -> Option<Lit> {
        self.sat_vars.get(lit.index()).copied().flatten().map(|v| sat_lit(v, lit.is_negated()))
    }

    fn new_sat_var(&mut self) -> Lit {
        self.num_sat_vars += 1;
        self.num_sat_vars
    }

    fn map_var(&mut self, index: usize) -> Lit {
        if self.sat_vars.len() <= index {
            self.sat_vars.resize(index + 1, None)
        }
        let v = self.new_sat_var();
        self.sat_vars[index] = Some(v);
        v
    }

    /// Tseitin-encode the cone of `root` into the SAT solver, returning
    /// the SAT literal for it.
    fn encode(&mut self, root: AigLit) -> Lit {
        let mut stack = vec![root.index()];
        while let Some(&i) = stack.last() {
            if self.sat_vars.get(i).copied().flatten().is_some() {
                stack.pop();
                continue;
            }
            match self.blaster.aig.node(i) {
                AigNode::False => {
                    let v = self.map_var(i);
                    self.sat.add_clause([-v]);
                    stack.pop();
                }
                AigNode::Input => {
                    self.map_var(i);
                    stack.pop();
                }
                AigNode::And(a, b) => match (self.mapped(a), self.mapped(b)) {
                    (Some(la), Some(lb)) => {
                        let x = self.map_var(i);
                        self.sat.add_clause([-x, la]);
                        self.sat.add_clause([-x, lb]);
                        self.sat.add_clause([x, -la, -lb]);
                        stack.pop();
                    }
                    (la, lb) => {
                        if la.is_none() {
                            stack.push(a.index())
                        }
                        if lb.is_none() {
                            stack.push(b.index())
                        }
                    }
                },
            }
        }
        match self.mapped(root) {
            Some(lit) => lit,
            None => unreachable!("AIG literal was not encoded"),
        }
    }

    /// Functional consistency for applications blasted since the last
    /// call: equal arguments imply equal results.
    fn ackermannize(&mut self) {
        for app in self.blaster.take_new_applies() {
            let children = self.nm.children(app).to_vec();
            let uf = children[0];
            let others = self.applies.entry(uf).or_insert_with(Vec::new).clone();
            for other in others {
                let other_children = self.nm.children(other).to_vec();
                let mut args_eq = AigLit::TRUE;
                for (x, y) in children[1..].iter().zip(other_children[1..].iter()) {
                    let xb = self.blaster.blast(&self.nm, *x);
                    let yb = self.blaster.blast(&self.nm, *y);
                    let eq = eq_bits(&mut self.blaster.aig, &xb, &yb);
                    args_eq = self.blaster.aig.mk_and(args_eq, eq)
                }
                let rb = self.blaster.blast(&self.nm, app);
                let ob = self.blaster.blast(&self.nm, other);
                let res_eq = eq_bits(&mut self.blaster.aig, &rb, &ob);
                let constraint = self.blaster.aig.mk_or(!args_eq, res_eq);
                let lit = self.encode(constraint);
                self.sat.add_clause([lit])
            }
            self.applies.entry(uf).or_insert_with(Vec::new).push(app)
        }
    }

    fn blast_formula(&mut self, formula: Node) -> Lit {
        assert!(self.nm.is_bool(formula), "cannot assert non-boolean term");
        let lit = self.blaster.blast_bool(&self.nm, formula);
        self.ackermannize();
        self.encode(lit)
    }

    fn bits_value(&self, values: &[bool], bits: &[AigLit]) -> BitVector {
        let mut v = 0u64;
        for (i, lit) in bits.iter().enumerate() {
            if aig::lit_value(values, *lit) {
                v |= 1 << i
            }
        }
        BitVector::new(v, bits.len() as u32)
    }

    fn extract_model(&self) -> Model {
        let sat = &self.sat;
        let sat_vars = &self.sat_vars;
        let values = self.blaster.aig.simulate(|i| {
            sat_vars.get(i).copied().flatten().map_or(false, |v| sat.value(v) == Some(true))
        });

        let mut model = Model::new();
        for (n, bits) in self.blaster.blasted() {
            match self.nm.kind(*n) {
                Kind::Var => {
                    model.vars.insert(*n, self.bits_value(&values, bits));
                }
                Kind::Apply => {
                    let children = self.nm.children(*n);
                    let args = children[1..]
                        .iter()
                        .filter_map(|arg| self.blaster.bits(*arg).map(|b| self.bits_value(&values, b)))
                        .collect();
                    let result = self.bits_value(&values, bits);
                    model.funs.entry(children[0]).or_insert_with(HashMap::new).insert(args, result);
                }
                _ => (),
            }
        }
        model
    }
}

impl GroundSolver for Solver {
    fn new() -> Self {
        Solver {
            nm: NodeManager::new(),
            blaster: AigBitblaster::new(),
            sat: cadical::Solver::new(),
            num_sat_vars: 0,
            sat_vars: Vec::new(),
            applies: HashMap::new(),
            scopes: Vec::new(),
            terminator: Terminator::never(),
            model: None,
            checks: 0,
        }
    }

    fn nm(&self) -> &NodeManager {
        &self.nm
    }

    fn nm_mut(&mut self) -> &mut NodeManager {
        &mut self.nm
    }

    fn assert_formula(&mut self, formula: Node) {
        self.model = None;
        let lit = self.blast_formula(formula);
        match self.scopes.last() {
            Some(act) => self.sat.add_clause([-*act, lit]),
            None => self.sat.add_clause([lit]),
        }
    }

    fn check_sat(&mut self, assumptions: &[Node]) -> SmtResult {
        self.model = None;
        self.checks += 1;
        if self.terminator.terminate() {
            return Unknown;
        }

        let mut lits: Vec<Lit> = self.scopes.clone();
        for a in assumptions {
            let lit = self.blast_formula(*a);
            lits.push(lit)
        }

        let result = self.sat.solve_with(lits.iter().copied());
        log!(log::SAT, format!("check_sat {}: {:?} with {} variables", self.checks, result, self.num_sat_vars));
        match result {
            Some(true) => {
                self.model = Some(self.extract_model());
                Sat
            }
            Some(false) => Unsat,
            None => Unknown,
        }
    }

    fn get_value(&mut self, term: Node) -> Option<BitVector> {
        let model = self.model.as_ref()?;
        eval(&self.nm, model, term).ok()
    }

    fn get_fun_value(&self, uf: Node, args: &[BitVector]) -> Option<BitVector> {
        let model = self.model.as_ref()?;
        match self.nm.sort(uf) {
            Sort::Fun(_, codomain) => Some(model.fun_value(uf, args).unwrap_or_else(|| BitVector::zeros(*codomain))),
            _ => None,
        }
    }

    fn push(&mut self) {
        let act = self.new_sat_var();
        self.scopes.push(act)
    }

    fn pop(&mut self) {
        if let Some(act) = self.scopes.pop() {
            self.sat.add_clause([-act])
        }
    }

    fn set_terminator(&mut self, terminator: Terminator) {
        self.sat.set_callbacks(Some(Interrupt { terminator: terminator.clone() }));
        self.terminator = terminator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factoring() {
        // x * y = 143 with x, y > 1 over 8 bits
        let mut solver = Solver::new();
        let nm = solver.nm_mut();
        let x = nm.mk_bv_var(8, "x");
        let y = nm.mk_bv_var(8, "y");
        let m = nm.mk_mul(x, y);
        let c = nm.mk_value(BitVector::new(143, 8));
        let eq = nm.mk_eq(m, c);
        let one = nm.mk_one(8);
        let gx = nm.mk_ugt(x, one);
        let gy = nm.mk_ugt(y, one);
        let ltx = nm.mk_ult(x, c);
        let lty = nm.mk_ult(y, c);
        let f = nm.mk_conj(&[eq, gx, gy, ltx, lty]);
        solver.assert_formula(f);
        assert_eq!(solver.check_sat(&[]), Sat);
        let xv = solver.get_value(x).unwrap();
        let yv = solver.get_value(y).unwrap();
        assert_eq!(xv * yv, BitVector::new(143, 8));
        assert!(solver.get_value(f).unwrap().is_true())
    }

    #[test]
    fn test_unsat_and_assumptions() {
        let mut solver = Solver::new();
        let nm = solver.nm_mut();
        let x = nm.mk_bv_var(4, "x");
        let one = nm.mk_one(4);
        let inc = nm.mk_add(x, one);
        let lt = nm.mk_ult(inc, x);
        let ones = nm.mk_ones(4);
        let not_max = {
            let eq = nm.mk_eq(x, ones);
            nm.mk_not(eq)
        };
        solver.assert_formula(lt);
        assert_eq!(solver.check_sat(&[]), Sat);
        assert_eq!(solver.get_value(x), Some(BitVector::ones(4)));
        assert_eq!(solver.check_sat(&[not_max]), Unsat);
        assert_eq!(solver.check_sat(&[]), Sat)
    }

    #[test]
    fn test_push_pop() {
        let mut solver = Solver::new();
        let nm = solver.nm_mut();
        let x = nm.mk_bv_var(4, "x");
        let zero = nm.mk_zero(4);
        let eq = nm.mk_eq(x, zero);
        let ne = nm.mk_not(eq);
        solver.assert_formula(ne);
        solver.push();
        solver.assert_formula(eq);
        assert_eq!(solver.check_sat(&[]), Unsat);
        solver.pop();
        assert_eq!(solver.check_sat(&[]), Sat)
    }

    #[test]
    fn test_uf_consistency() {
        let mut solver = Solver::new();
        let nm = solver.nm_mut();
        let f = nm.mk_uf(vec![4], 4, "f");
        let x = nm.mk_bv_var(4, "x");
        let y = nm.mk_bv_var(4, "y");
        let fx = nm.mk_apply(f, &[x]);
        let fy = nm.mk_apply(f, &[y]);
        let args = nm.mk_eq(x, y);
        let res = nm.mk_eq(fx, fy);
        let not_res = nm.mk_not(res);
        let both = nm.mk_and(args, not_res);
        solver.assert_formula(both);
        assert_eq!(solver.check_sat(&[]), Unsat)
    }

    #[test]
    fn test_fun_value() {
        let mut solver = Solver::new();
        let nm = solver.nm_mut();
        let f = nm.mk_uf(vec![4], 4, "f");
        let three = nm.mk_value(BitVector::new(3, 4));
        let seven = nm.mk_value(BitVector::new(7, 4));
        let app = nm.mk_apply(f, &[three]);
        let eq = nm.mk_eq(app, seven);
        solver.assert_formula(eq);
        assert_eq!(solver.check_sat(&[]), Sat);
        assert_eq!(solver.get_fun_value(f, &[BitVector::new(3, 4)]), Some(BitVector::new(7, 4)))
    }

    #[test]
    fn test_terminator() {
        let mut solver = Solver::new();
        solver.set_terminator(Terminator::from_fn(|| true));
        assert_eq!(solver.check_sat(&[]), Unknown);
        let flag = Arc::new(AtomicBool::new(false));
        let t = Terminator::never().or(&Terminator::from_flag(flag.clone()));
        assert!(!t.terminate());
        flag.store(true, Ordering::SeqCst);
        assert!(t.terminate())
    }

    #[test]
    fn test_terminator_interrupts_search() {
        use std::sync::atomic::AtomicUsize;

        // (x * y) * z != x * (y * z) is unsat, but only after real search
        let mut solver = Solver::new();
        let nm = solver.nm_mut();
        let x = nm.mk_bv_var(8, "x");
        let y = nm.mk_bv_var(8, "y");
        let z = nm.mk_bv_var(8, "z");
        let xy = nm.mk_mul(x, y);
        let lhs = nm.mk_mul(xy, z);
        let yz = nm.mk_mul(y, z);
        let rhs = nm.mk_mul(x, yz);
        let eq = nm.mk_eq(lhs, rhs);
        let ne = nm.mk_not(eq);
        solver.assert_formula(ne);

        // The first poll is the check before solving, later polls come
        // from the SAT search
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();
        solver.set_terminator(Terminator::from_fn(move || counter.fetch_add(1, Ordering::SeqCst) >= 1));
        assert_eq!(solver.check_sat(&[]), Unknown);
        assert!(polls.load(Ordering::SeqCst) >= 2)
    }
}
