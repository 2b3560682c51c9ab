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

//! Counterexample-guided quantifier instantiation.
//!
//! A quantified formula is solved with two ground solvers. The
//! forall solver checks a candidate model for the existential
//! variables against every assignment to the universal ones, and the
//! exists solver looks for existential values consistent with every
//! counterexample found so far. Candidate models are synthesized
//! from the exists solver's answers at those counterexamples.
//!
//! Optionally a second pair of solvers works on the dual (negated)
//! formula in another thread, and the first definite answer wins.

use crossbeam::thread;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::bitvector::BitVector;
use crate::config::{SolverConfig, SynthMode};
use crate::error::Error;
use crate::log;
use crate::node::{rebuild, Kind, Node, NodeManager, Rebuild, Sort, Transfer, Visit};
use crate::rewrite::rewrite;
use crate::smt::{GroundSolver, SmtResult, Solver, Terminator};
use crate::{if_logging, log_from};

pub mod flat_model;
pub mod formula;
pub mod synth;

use flat_model::{FlatModel, Row, VarIndex};
use formula::{build_refinement, collect_consts, collect_ufs, compute_var_deps, mk_dual_formula, Ground};
use synth::{check_candidate, synthesize_term, Example, SynthResult};

use SmtResult::*;

/// Enumeration limit for quantifier instantiation terms.
const QI_SYNTH_LIMIT: u32 = 10000;

/// Synthesis limits grow for variables whose last model was partial,
/// but are reset once they exceed this multiple of the configured
/// limit.
const MAX_LIMIT_FACTOR: u32 = 10;

#[derive(Clone, Debug, Default, Serialize)]
pub struct QuantStats {
    pub refinements: u32,
    pub qi_lemmas: u32,
    pub synthesize_const: u32,
    pub synthesize_term: u32,
    pub synthesize_none: u32,
    pub synthesize_model_const: u32,
    pub synthesize_model_term: u32,
    pub synthesize_model_none: u32,
    #[serde(serialize_with = "log::serialize_seconds")]
    pub time_e_solver: Duration,
    #[serde(serialize_with = "log::serialize_seconds")]
    pub time_f_solver: Duration,
    #[serde(serialize_with = "log::serialize_seconds")]
    pub time_synth: Duration,
    #[serde(serialize_with = "log::serialize_seconds")]
    pub time_refine: Duration,
    #[serde(serialize_with = "log::serialize_seconds")]
    pub time_qinst: Duration,
    #[serde(serialize_with = "log::serialize_seconds")]
    pub time_checkinst: Duration,
}

/// A universally quantified parameter and the fresh ground variable
/// standing for it in the forall solver.
#[derive(Clone, Debug)]
pub struct Universal {
    pub param: Node,
    pub var: Node,
    /// Existential parameters bound around this one
    pub deps: Vec<Node>,
}

/// An existentially quantified parameter. Its skolem symbol lives in
/// the forall solver and its symbol in the exists solver. Both are
/// functions of the universal parameters in `deps`, or plain
/// variables if there are none.
#[derive(Clone, Debug)]
pub struct Existential {
    pub param: Node,
    pub width: u32,
    pub deps: Vec<Node>,
    pub skolem: Node,
    pub symbol: Node,
}

/// The forall/exists solver pair for one formula.
pub struct GroundSolvers<S> {
    tid: usize,
    config: SolverConfig,
    forall: S,
    exists: S,
    formula: Node,
    universals: Vec<Universal>,
    existentials: Vec<Existential>,
    index: VarIndex,
    depth: HashMap<Node, usize>,
    ufs: HashMap<Node, Node>,
    consts: Vec<Node>,
    synth_model: HashMap<Node, SynthResult>,
    ces: Vec<Row>,
    seen_ces: HashSet<Vec<BitVector>>,
    cur_qi: HashMap<Node, Node>,
    terminator: Terminator,
    result: SmtResult,
    pub stats: QuantStats,
}

fn symbol_name(nm: &NodeManager, n: Node) -> String {
    nm.name(n).unwrap_or("_").to_string()
}

/// Mirrors a formula into the forall solver: universal parameters
/// become ground variables, existential ones their synthesized
/// values or skolem terms, and quantifiers disappear.
struct Instantiate<'a> {
    nm: &'a mut NodeManager,
    universals: &'a [Universal],
    existentials: &'a [Existential],
    index: &'a VarIndex,
    model: &'a HashMap<Node, SynthResult>,
    evar_map: &'a mut HashMap<Node, Node>,
}

impl<'a> Rebuild for Instantiate<'a> {
    fn source(&self) -> &NodeManager {
        self.nm
    }

    fn enter(&mut self, n: Node) -> Visit {
        match self.nm.kind(n) {
            Kind::Param => {
                if let Some(i) = self.index.universal(n) {
                    return Visit::Done(self.universals[i].var);
                }
                if let Some(r) = self.model.get(&n) {
                    return Visit::Replace(r.value);
                }
                match self.index.existential(n) {
                    Some(i) => {
                        let e = &self.existentials[i];
                        let term = if e.deps.is_empty() {
                            e.skolem
                        } else {
                            let args: Vec<Node> = e
                                .deps
                                .iter()
                                .filter_map(|d| self.index.universal(*d).map(|j| self.universals[j].var))
                                .collect();
                            self.nm.mk_apply(e.skolem, &args)
                        };
                        self.evar_map.insert(n, term);
                        Visit::Done(term)
                    }
                    None => panic!("unbound parameter {} in quantified formula", symbol_name(self.nm, n)),
                }
            }
            Kind::Value | Kind::Var | Kind::Uf => Visit::Done(n),
            _ => Visit::Descend,
        }
    }

    fn leave(&mut self, n: Node, children: Vec<Node>) -> Node {
        if self.nm.kind(n).is_quantifier() {
            children[1]
        } else {
            self.nm.mk_like(n, &children)
        }
    }
}

impl<S: GroundSolver> GroundSolvers<S> {
    /// Set up the solver pair for `root`, a formula in `src` as
    /// produced by [formula::normalize_quantifiers]. With `dual` the
    /// pair works on the negation of `root` instead.
    pub fn new(tid: usize, config: &SolverConfig, src: &NodeManager, root: Node, dual: bool) -> Self {
        let mut forall = S::new();
        let mut exists = S::new();

        let formula = if dual {
            mk_dual_formula(src, forall.nm_mut(), root)
        } else {
            let mut symbols = HashMap::new();
            let mut cache = HashMap::new();
            rebuild(&mut Transfer { src, dst: forall.nm_mut(), symbols: &mut symbols }, &mut cache, root)
        };

        let deps = compute_var_deps(forall.nm(), formula);

        let mut universals = Vec::new();
        for p in &deps.universal {
            let name = symbol_name(forall.nm(), *p);
            let width = forall.nm().width(*p);
            let var = forall.nm_mut().mk_bv_var(width, &name);
            universals.push(Universal { param: *p, var, deps: deps.deps.get(p).cloned().unwrap_or_default() })
        }

        let mut existentials = Vec::new();
        for p in &deps.existential {
            let name = symbol_name(forall.nm(), *p);
            let width = forall.nm().width(*p);
            let e_deps = deps.deps.get(p).cloned().unwrap_or_default();
            let (skolem, symbol) = if e_deps.is_empty() {
                (forall.nm_mut().mk_bv_var(width, &name), exists.nm_mut().mk_bv_var(width, &name))
            } else {
                let domain: Vec<u32> = e_deps.iter().map(|d| forall.nm().width(*d)).collect();
                (forall.nm_mut().mk_uf(domain.clone(), width, &name), exists.nm_mut().mk_uf(domain, width, &name))
            };
            existentials.push(Existential { param: *p, width, deps: e_deps, skolem, symbol })
        }

        let mut ufs = HashMap::new();
        for uf in collect_ufs(forall.nm(), formula) {
            let name = symbol_name(forall.nm(), uf);
            if let Sort::Fun(domain, codomain) = forall.nm().sort(uf).clone() {
                ufs.insert(uf, exists.nm_mut().mk_uf(domain, codomain, &name));
            }
        }

        let consts = collect_consts(forall.nm(), formula);
        let index = VarIndex::new(&universals, &existentials);

        log_from!(
            tid,
            log::QUANT,
            format!(
                "{} formula with {} universal and {} existential variables",
                if dual { "dual" } else { "original" },
                universals.len(),
                existentials.len()
            )
        );

        GroundSolvers {
            tid,
            config: config.clone(),
            forall,
            exists,
            formula,
            universals,
            existentials,
            index,
            depth: deps.depth,
            ufs,
            consts,
            synth_model: HashMap::new(),
            ces: Vec::new(),
            seen_ces: HashSet::new(),
            cur_qi: HashMap::new(),
            terminator: Terminator::never(),
            result: Unknown,
            stats: QuantStats::default(),
        }
    }

    pub fn set_terminator(&mut self, terminator: Terminator) {
        self.forall.set_terminator(terminator.clone());
        self.exists.set_terminator(terminator.clone());
        self.terminator = terminator
    }

    pub fn result(&self) -> SmtResult {
        self.result
    }

    /// The node manager holding the formula and the synthesized model.
    pub fn nm(&self) -> &NodeManager {
        self.forall.nm()
    }

    pub fn formula(&self) -> Node {
        self.formula
    }

    pub fn universals(&self) -> &[Universal] {
        &self.universals
    }

    pub fn existentials(&self) -> &[Existential] {
        &self.existentials
    }

    /// Counterexamples found so far, in the order they were found.
    pub fn counterexamples(&self) -> &[Row] {
        &self.ces
    }

    pub fn synth_model(&self) -> &HashMap<Node, SynthResult> {
        &self.synth_model
    }

    /// Substitute the universal parameters with counterexample
    /// values and the existential ones with exists solver symbols,
    /// and assert the result to the exists solver.
    fn refine_exists_solver(&mut self, evar_map: &HashMap<Node, Node>) -> Result<(), Error> {
        let now = Instant::now();

        let mut uvals = Vec::with_capacity(self.universals.len());
        for u in &self.universals {
            let width = self.forall.nm().width(u.var);
            uvals.push(self.forall.get_value(u.var).unwrap_or_else(|| BitVector::zeros(width)))
        }
        let mut evals = Vec::with_capacity(self.existentials.len());
        for e in &self.existentials {
            let v = match evar_map.get(&e.param) {
                Some(t) => self.forall.get_value(*t),
                None => None,
            };
            evals.push(v.unwrap_or_else(|| BitVector::zeros(e.width)))
        }

        let mut map = self.ufs.clone();
        let enm = self.exists.nm_mut();
        for (u, v) in self.universals.iter().zip(uvals.iter()) {
            map.insert(u.param, enm.mk_value(*v));
        }
        for e in &self.existentials {
            let term = if e.deps.is_empty() {
                e.symbol
            } else {
                let args: Vec<Node> = e.deps.iter().map(|d| map[d]).collect();
                enm.mk_apply(e.symbol, &args)
            };
            map.insert(e.param, term);
        }

        let refinement = build_refinement(self.forall.nm(), self.exists.nm_mut(), self.formula, &map);
        let refinement = rewrite(self.exists.nm_mut(), &mut HashMap::new(), refinement);
        if self.exists.nm().is_true(refinement) {
            return Err(Error::Unreachable("trivially true quantifier refinement".to_string()));
        }

        self.stats.refinements += 1;
        if self.seen_ces.insert(uvals.clone()) {
            if_logging!(log::QUANT, {
                let values: Vec<String> = uvals.iter().map(|v| v.to_string()).collect();
                log_from!(self.tid, log::QUANT, format!("counterexample {}: {}", self.ces.len(), values.join(" ")))
            });
            self.ces.push(Row { uvals, evals })
        } else {
            log_from!(self.tid, log::QUANT, "duplicate counterexample");
        }
        self.exists.assert_formula(refinement);

        self.stats.time_refine += now.elapsed();
        Ok(())
    }

    /// Explicit interpretation for an existential variable: an
    /// if-then-else over the counterexamples, falling through to
    /// zero or to a fresh function of the dependencies.
    fn mk_concrete_ite_model(&mut self, evar: usize, flat: &FlatModel) -> Node {
        let e = &self.existentials[evar];
        let nm = self.forall.nm_mut();
        let mut result = if self.config.synth_ite_complete {
            nm.mk_zero(e.width)
        } else {
            let domain: Vec<u32> = e.deps.iter().map(|d| nm.width(*d)).collect();
            let name = format!("{}_else", symbol_name(nm, e.param));
            let uf = nm.mk_uf(domain, e.width, &name);
            nm.mk_apply(uf, &e.deps)
        };

        for row in flat.rows() {
            let mut conds = Vec::with_capacity(e.deps.len());
            for d in &e.deps {
                if let Some(v) = self.index.value(*d, row) {
                    let c = nm.mk_value(v);
                    conds.push(nm.mk_eq(*d, c))
                }
            }
            let cond = nm.mk_conj(&conds);
            let value = nm.mk_value(row.evals[evar]);
            result = nm.mk_ite(cond, value, result)
        }
        result
    }

    fn synthesize(&mut self, evar: usize, flat: &FlatModel, limit: u32) -> Option<Node> {
        let e = &self.existentials[evar];
        let examples = self.index.build_input_output_values(flat.rows(), &e.deps, e.param);

        let now = Instant::now();
        let prev = self.synth_model.get(&e.param).filter(|r| !r.partial).map(|r| r.value);
        let reused = prev.filter(|p| check_candidate(self.forall.nm(), *p, &e.deps, &examples));
        self.stats.time_checkinst += now.elapsed();
        if reused.is_some() {
            return reused;
        }

        if self.config.synth == SynthMode::None {
            return None;
        }
        synthesize_term(self.forall.nm_mut(), &e.deps, &examples, &self.consts, limit, &self.terminator)
    }

    /// Candidate interpretations for every existential variable from
    /// the flattened exists model.
    fn synthesize_model(&mut self, flat: &FlatModel) -> HashMap<Node, SynthResult> {
        let now = Instant::now();
        let opt_limit = self.config.synth_limit;
        let mut model = HashMap::new();
        self.stats.synthesize_model_const = 0;
        self.stats.synthesize_model_term = 0;
        self.stats.synthesize_model_none = 0;

        for i in 0..self.existentials.len() {
            if self.terminator.terminate() {
                break;
            }
            let param = self.existentials[i].param;

            if self.existentials[i].deps.is_empty() {
                let v = flat.constant(param).unwrap_or_else(|| BitVector::zeros(self.existentials[i].width));
                let value = self.forall.nm_mut().mk_value(v);
                model.insert(param, SynthResult { partial: false, limit: 0, value });
                self.stats.synthesize_model_const += 1;
                continue;
            }

            let mut limit = match self.synth_model.get(&param) {
                Some(prev) if prev.partial => prev.limit.saturating_mul(3) / 2,
                Some(prev) => prev.limit,
                None => opt_limit,
            };
            if limit > opt_limit.saturating_mul(MAX_LIMIT_FACTOR) {
                limit = opt_limit
            }

            let result = match self.synthesize(i, flat, limit) {
                Some(value) => {
                    if self.forall.nm().is_value(value) {
                        self.stats.synthesize_model_const += 1
                    } else {
                        self.stats.synthesize_model_term += 1
                    }
                    SynthResult { partial: false, limit, value }
                }
                None => {
                    self.stats.synthesize_model_none += 1;
                    SynthResult { partial: true, limit, value: self.mk_concrete_ite_model(i, flat) }
                }
            };
            if_logging!(log::SYNTH, {
                let nm = self.forall.nm();
                log_from!(
                    self.tid,
                    log::SYNTH,
                    format!(
                        "{} := {}{}",
                        symbol_name(nm, param),
                        if result.partial { "(partial) " } else { "" },
                        nm.display(result.value)
                    )
                )
            });
            model.insert(param, result);
        }

        self.stats.synthesize_const += self.stats.synthesize_model_const;
        self.stats.synthesize_term += self.stats.synthesize_model_term;
        self.stats.synthesize_none += self.stats.synthesize_model_none;
        self.stats.time_synth += now.elapsed();
        model
    }

    /// The formula with universal parameters replaced by fresh ground
    /// variables and existential ones by their candidate model, or
    /// their skolem term if they have none. `evar_map` receives the
    /// ground term each existential parameter was replaced by.
    fn instantiate_formula(&mut self, evar_map: &mut HashMap<Node, Node>) -> Node {
        let mut cache = HashMap::new();
        let mut inst = Instantiate {
            nm: self.forall.nm_mut(),
            universals: &self.universals,
            existentials: &self.existentials,
            index: &self.index,
            model: &self.synth_model,
            evar_map: &mut *evar_map,
        };
        let result = rebuild(&mut inst, &mut cache, self.formula);
        let values: Vec<(Node, Node)> =
            self.synth_model.iter().map(|(p, r)| (*p, rebuild(&mut inst, &mut cache, r.value))).collect();
        evar_map.extend(values);
        result
    }

    /// Try to express each universal variable of the counterexamples
    /// as a function of the existential ones, and use the terms found
    /// to instantiate the formula in the exists solver.
    fn synthesize_quant_inst(&mut self) {
        let now = Instant::now();
        let free_evars: Vec<Node> = self.existentials.iter().filter(|e| e.deps.is_empty()).map(|e| e.param).collect();
        let mut map: HashMap<Node, Node> = HashMap::new();
        let mut qi = HashMap::new();

        for i in 0..self.universals.len() {
            if self.terminator.terminate() {
                return;
            }
            let u = self.universals[i].clone();
            let mut inputs = u.deps.clone();
            inputs.extend(free_evars.iter().filter(|e| !u.deps.contains(*e)));

            let mut term = None;
            if !inputs.is_empty() {
                let examples: Vec<Example> = self.index.build_input_output_values(&self.ces, &inputs, u.param);
                term = self
                    .cur_qi
                    .get(&u.param)
                    .copied()
                    .filter(|prev| check_candidate(self.forall.nm(), *prev, &inputs, &examples));
                if term.is_none() {
                    term = synthesize_term(self.forall.nm_mut(), &inputs, &examples, &[], QI_SYNTH_LIMIT, &self.terminator)
                }
            }

            match term {
                Some(t) => {
                    map.insert(u.param, t);
                    qi.insert(u.param, t);
                }
                None => {
                    let width = self.forall.nm().width(u.param);
                    let v = self.forall.get_value(u.var).unwrap_or_else(|| BitVector::zeros(width));
                    map.insert(u.param, self.forall.nm_mut().mk_value(v));
                }
            }
        }

        if !qi.is_empty() {
            let lemma = self.build_quant_inst_refinement(&map);
            self.exists.assert_formula(lemma);
            self.stats.qi_lemmas += 1;
            log_from!(self.tid, log::QUANT, format!("instantiation lemma for {} variables", qi.len()));
        }
        self.cur_qi = qi;
        self.stats.time_qinst += now.elapsed();
    }

    /// Ground the formula in the exists solver with universal
    /// parameters replaced by the terms in `map`, which are over the
    /// existential parameters.
    fn build_quant_inst_refinement(&mut self, map: &HashMap<Node, Node>) -> Node {
        let mut params: Vec<(bool, usize, Node)> = Vec::new();
        for e in &self.existentials {
            params.push((!e.deps.is_empty(), self.depth.get(&e.param).copied().unwrap_or(0), e.param))
        }
        for u in &self.universals {
            params.push((true, self.depth.get(&u.param).copied().unwrap_or(0), u.param))
        }
        // Outer parameters first, so the terms for each parameter only
        // refer to parameters already grounded.
        params.sort();

        let mut images = self.ufs.clone();
        let mut cache = HashMap::new();
        for (_, _, p) in params {
            let image = if let Some(term) = map.get(&p) {
                let mut ground = Ground { src: self.forall.nm(), dst: self.exists.nm_mut(), map: &images };
                rebuild(&mut ground, &mut cache, *term)
            } else if let Some(i) = self.index.existential(p) {
                let e = &self.existentials[i];
                if e.deps.is_empty() {
                    e.symbol
                } else {
                    let args: Vec<Node> = e.deps.iter().map(|d| images[d]).collect();
                    self.exists.nm_mut().mk_apply(e.symbol, &args)
                }
            } else {
                continue;
            };
            images.insert(p, image);
        }

        let mut ground = Ground { src: self.forall.nm(), dst: self.exists.nm_mut(), map: &images };
        rebuild(&mut ground, &mut cache, self.formula)
    }

    /// One round of the refinement loop. Returns `None` if a new
    /// counterexample was found and the loop should continue.
    fn find_model(&mut self, skip_exists: bool) -> Result<Option<SmtResult>, Error> {
        if !skip_exists {
            if self.terminator.terminate() {
                return Ok(Some(Unknown));
            }
            let now = Instant::now();
            let r = self.exists.check_sat(&[]);
            self.stats.time_e_solver += now.elapsed();
            log_from!(self.tid, log::QUANT, format!("exists solver: {:?}", r));
            match r {
                Unsat => return Ok(Some(Unsat)),
                Unknown => return Ok(Some(Unknown)),
                Sat => (),
            }

            let flat = FlatModel::generate(&mut self.exists, &self.index, &self.existentials, &self.ces);
            self.synth_model = self.synthesize_model(&flat);
        }

        let mut evar_map = HashMap::new();
        let g = self.instantiate_formula(&mut evar_map);

        if self.terminator.terminate() {
            return Ok(Some(Unknown));
        }
        let now = Instant::now();

        if self.universals.is_empty() {
            self.forall.assert_formula(g);
            let r = self.forall.check_sat(&[]);
            self.stats.time_f_solver += now.elapsed();
            if r == Sat {
                for e in &self.existentials {
                    let v = self.forall.get_value(e.skolem).unwrap_or_else(|| BitVector::zeros(e.width));
                    let value = self.forall.nm_mut().mk_value(v);
                    self.synth_model.insert(e.param, SynthResult { partial: false, limit: 0, value });
                }
            }
            return Ok(Some(r));
        }

        let neg = self.forall.nm_mut().mk_not(g);
        let r = self.forall.check_sat(&[neg]);
        self.stats.time_f_solver += now.elapsed();
        log_from!(self.tid, log::QUANT, format!("forall solver: {:?}", r));
        match r {
            Unsat => return Ok(Some(Sat)),
            Unknown => return Ok(Some(Unknown)),
            Sat => (),
        }

        self.refine_exists_solver(&evar_map)?;
        if self.config.synth_qi {
            self.synthesize_quant_inst()
        }
        Ok(None)
    }

    /// Run the refinement loop until a definite answer, or until the
    /// terminator fires.
    pub fn run(&mut self) -> Result<SmtResult, Error> {
        let mut skip_exists = true;
        let result = loop {
            if let Some(r) = self.find_model(skip_exists)? {
                break r;
            }
            skip_exists = false
        };
        log_from!(self.tid, log::QUANT, format!("result {:?} after {} refinements", result, self.stats.refinements));
        self.result = result;
        Ok(result)
    }

    /// The formula with each existential quantifier replaced by the
    /// model found for its parameter. Universal quantifiers remain,
    /// so the result can be evaluated to check the model.
    pub fn model_formula(&mut self) -> Node {
        let mut subst = HashMap::new();
        for e in &self.existentials {
            let value = match self.synth_model.get(&e.param) {
                Some(r) => r.value,
                None => self.forall.nm_mut().mk_zero(e.width),
            };
            subst.insert(e.param, value);
        }
        let mut cache = HashMap::new();
        rebuild(&mut ModelSubst { nm: self.forall.nm_mut(), subst: &subst }, &mut cache, self.formula)
    }
}

struct ModelSubst<'a> {
    nm: &'a mut NodeManager,
    subst: &'a HashMap<Node, Node>,
}

impl<'a> Rebuild for ModelSubst<'a> {
    fn source(&self) -> &NodeManager {
        self.nm
    }

    fn enter(&mut self, n: Node) -> Visit {
        match self.subst.get(&n) {
            Some(m) => Visit::Done(*m),
            None if self.nm.num_children(n) == 0 => Visit::Done(n),
            None => Visit::Descend,
        }
    }

    fn leave(&mut self, n: Node, children: Vec<Node>) -> Node {
        if self.nm.kind(n) == Kind::Exists {
            children[1]
        } else {
            self.nm.mk_like(n, &children)
        }
    }
}

/// Race the original and dual solver pairs in two threads. The first
/// definite answer stops the other thread.
fn run_parallel<S: GroundSolver>(
    orig: &mut GroundSolvers<S>,
    dual: &mut GroundSolvers<S>,
    terminator: &Terminator,
) -> Result<SmtResult, Error> {
    let found = Arc::new(AtomicBool::new(false));
    let stop = Terminator::from_flag(found.clone()).or(terminator);
    orig.set_terminator(stop.clone());
    dual.set_terminator(stop);

    let joined = thread::scope(|scope| {
        let handles: Vec<_> = vec![orig, dual]
            .into_iter()
            .map(|gslv| {
                let found = found.clone();
                scope.spawn(move |_| {
                    let result = gslv.run();
                    if let Ok(r) = result {
                        if !r.is_unknown() {
                            found.store(true, Ordering::SeqCst)
                        }
                    }
                    result
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join()).collect::<Vec<_>>()
    });

    let mut results = Vec::new();
    for joined in joined.map_err(|_| Error::Unreachable("quantifier solver thread panicked".to_string()))? {
        match joined {
            Ok(r) => results.push(r?),
            Err(_) => return Err(Error::Unreachable("quantifier solver thread panicked".to_string())),
        }
    }

    if !results[0].is_unknown() {
        log_from!(0, log::QUANT, format!("original formula solved: {:?}", results[0]));
        Ok(results[0])
    } else {
        log_from!(1, log::QUANT, format!("dual formula solved: {:?}", results[1]));
        Ok(results[1].dual())
    }
}

/// Decides quantified bit-vector formulas by counterexample-guided
/// instantiation.
pub struct QuantSolver<S: GroundSolver = Solver> {
    config: SolverConfig,
    terminator: Terminator,
    solvers: Option<GroundSolvers<S>>,
    dual: Option<GroundSolvers<S>>,
    result: SmtResult,
}

impl<S: GroundSolver> QuantSolver<S> {
    pub fn new(config: &SolverConfig) -> Self {
        QuantSolver { config: config.clone(), terminator: Terminator::never(), solvers: None, dual: None, result: Unknown }
    }

    pub fn set_terminator(&mut self, terminator: Terminator) {
        self.terminator = terminator
    }

    /// Decide the conjunction of `assertions`. Quantifiers may only
    /// occur below Boolean connectives, and free variables are read
    /// as existentially quantified.
    pub fn check_sat(&mut self, nm: &mut NodeManager, assertions: &[Node]) -> Result<SmtResult, Error> {
        let root = formula::normalize_quantifiers(nm, assertions)?;
        let has_ufs = !collect_ufs(nm, root).is_empty();

        let mut orig = GroundSolvers::new(0, &self.config, nm, root, false);
        let result = if self.config.dual_solver && !has_ufs {
            let mut dual = GroundSolvers::new(1, &self.config, nm, root, true);
            let result = run_parallel(&mut orig, &mut dual, &self.terminator)?;
            self.dual = Some(dual);
            result
        } else {
            if has_ufs {
                log!(log::QUANT, "dual solver disabled for formula with uninterpreted functions")
            }
            orig.set_terminator(self.terminator.clone());
            orig.run()?
        };

        self.solvers = Some(orig);
        self.result = result;
        Ok(result)
    }

    pub fn result(&self) -> SmtResult {
        self.result
    }

    pub fn solvers(&self) -> Option<&GroundSolvers<S>> {
        self.solvers.as_ref()
    }

    pub fn dual_solvers(&self) -> Option<&GroundSolvers<S>> {
        self.dual.as_ref()
    }

    /// Statistics for the original formula's solver pair.
    pub fn stats(&self) -> Option<&QuantStats> {
        self.solvers.as_ref().map(|gslv| &gslv.stats)
    }

    /// A formula in [GroundSolvers::nm] that holds iff the synthesized
    /// model is a model of the input. Only available when the
    /// original (not the dual) formula was found satisfiable.
    pub fn model_formula(&mut self) -> Option<Node> {
        match self.solvers.as_mut() {
            Some(gslv) if gslv.result() == Sat => Some(gslv.model_formula()),
            _ => None,
        }
    }

    /// The synthesized model as pairs of variable names and terms.
    /// `None` unless the original formula was found satisfiable; a
    /// formula without existential variables has an empty model.
    pub fn model(&self) -> Option<Vec<(String, String)>> {
        let gslv = match self.solvers.as_ref() {
            Some(gslv) if gslv.result() == Sat => gslv,
            _ => return None,
        };
        let nm = gslv.nm();
        Some(
            gslv.existentials
                .iter()
                .filter_map(|e| {
                    gslv.synth_model.get(&e.param).map(|r| (symbol_name(nm, e.param), nm.display(r.value)))
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{eval, Model};

    fn config(dual_solver: bool) -> SolverConfig {
        SolverConfig { dual_solver, ..SolverConfig::default() }
    }

    fn bv(nm: &mut NodeManager, v: u64, width: u32) -> Node {
        nm.mk_value(BitVector::new(v, width))
    }

    fn model_holds(solver: &mut QuantSolver) -> bool {
        let formula = solver.model_formula().unwrap();
        let nm = solver.solvers().unwrap().nm();
        eval(nm, &Model::new(), formula).unwrap().is_true()
    }

    /// forall x. exists y. y = x + 1
    fn successor(nm: &mut NodeManager, width: u32) -> Node {
        let x = nm.mk_param(width, "x");
        let y = nm.mk_param(width, "y");
        let one = bv(nm, 1, width);
        let succ = nm.mk_add(x, one);
        let eq = nm.mk_eq(y, succ);
        let qy = nm.mk_exists(y, eq);
        nm.mk_forall(x, qy)
    }

    /// exists y. forall x. y = x + 1
    fn constant_successor(nm: &mut NodeManager, width: u32) -> Node {
        let x = nm.mk_param(width, "x");
        let y = nm.mk_param(width, "y");
        let one = bv(nm, 1, width);
        let succ = nm.mk_add(x, one);
        let eq = nm.mk_eq(y, succ);
        let qx = nm.mk_forall(x, eq);
        nm.mk_exists(y, qx)
    }

    #[test]
    fn test_ground_formula() {
        let mut nm = NodeManager::new();
        let x = nm.mk_bv_var(4, "x");
        let three = bv(&mut nm, 3, 4);
        let five = bv(&mut nm, 5, 4);
        let sum = nm.mk_add(x, three);
        let eq = nm.mk_eq(sum, five);
        let mut solver = QuantSolver::<Solver>::new(&config(false));
        assert_eq!(solver.check_sat(&mut nm, &[eq]).unwrap(), Sat);
        assert_eq!(solver.model(), Some(vec![("x".to_string(), "#x2".to_string())]));
        assert!(model_holds(&mut solver))
    }

    #[test]
    fn test_successor_sat() {
        let mut nm = NodeManager::new();
        let f = successor(&mut nm, 4);
        let mut solver = QuantSolver::<Solver>::new(&config(false));
        assert_eq!(solver.check_sat(&mut nm, &[f]).unwrap(), Sat);
        assert!(model_holds(&mut solver))
    }

    #[test]
    fn test_constant_successor_unsat() {
        let mut nm = NodeManager::new();
        let f = constant_successor(&mut nm, 4);
        let mut solver = QuantSolver::<Solver>::new(&config(false));
        assert_eq!(solver.check_sat(&mut nm, &[f]).unwrap(), Unsat);
        assert!(solver.stats().unwrap().refinements >= 2);
        assert!(solver.model_formula().is_none())
    }

    #[test]
    fn test_dual_solver() {
        let mut nm = NodeManager::new();
        let f = constant_successor(&mut nm, 4);
        let mut solver = QuantSolver::<Solver>::new(&config(true));
        assert_eq!(solver.check_sat(&mut nm, &[f]).unwrap(), Unsat);
        assert!(solver.dual_solvers().is_some());

        let mut nm = NodeManager::new();
        let f = successor(&mut nm, 4);
        let mut solver = QuantSolver::<Solver>::new(&config(true));
        assert_eq!(solver.check_sat(&mut nm, &[f]).unwrap(), Sat)
    }

    #[test]
    fn test_ite_model() {
        let mut nm = NodeManager::new();
        let f = successor(&mut nm, 3);
        let config = SolverConfig { synth: SynthMode::None, synth_qi: false, ..config(false) };
        let mut solver = QuantSolver::<Solver>::new(&config);
        assert_eq!(solver.check_sat(&mut nm, &[f]).unwrap(), Sat);
        let stats = solver.stats().unwrap();
        assert_eq!(stats.synthesize_term, 0);
        assert!(stats.synthesize_none > 0);
        assert!(model_holds(&mut solver))
    }

    #[test]
    fn test_ite_complete_model() {
        let mut nm = NodeManager::new();
        let f = successor(&mut nm, 3);
        let config = SolverConfig { synth: SynthMode::None, synth_ite_complete: true, ..config(false) };
        let mut solver = QuantSolver::<Solver>::new(&config);
        assert_eq!(solver.check_sat(&mut nm, &[f]).unwrap(), Sat);
        assert!(model_holds(&mut solver))
    }

    #[test]
    fn test_counterexamples_grow() {
        let mut nm = NodeManager::new();
        let f = constant_successor(&mut nm, 4);
        let root = formula::normalize_quantifiers(&mut nm, &[f]).unwrap();
        let mut gslv = GroundSolvers::<Solver>::new(0, &config(false), &nm, root, false);

        let mut skip_exists = true;
        loop {
            let before = gslv.counterexamples().len();
            match gslv.find_model(skip_exists).unwrap() {
                Some(r) => {
                    assert_eq!(r, Unsat);
                    break;
                }
                None => assert_eq!(gslv.counterexamples().len(), before + 1),
            }
            skip_exists = false
        }
        let ces = gslv.counterexamples();
        let distinct: HashSet<&Vec<BitVector>> = ces.iter().map(|row| &row.uvals).collect();
        assert_eq!(distinct.len(), ces.len())
    }

    #[test]
    fn test_uf_disables_dual() {
        let mut nm = NodeManager::new();
        let f = nm.mk_uf(vec![4], 4, "f");
        let x = nm.mk_param(4, "x");
        let app = nm.mk_apply(f, &[x]);
        let eq = nm.mk_eq(app, app);
        let q = nm.mk_forall(x, eq);
        let mut solver = QuantSolver::<Solver>::new(&config(true));
        assert_eq!(solver.check_sat(&mut nm, &[q]).unwrap(), Sat);
        assert!(solver.dual_solvers().is_none())
    }

    #[test]
    fn test_terminated() {
        let mut nm = NodeManager::new();
        let f = successor(&mut nm, 4);
        let mut solver = QuantSolver::<Solver>::new(&config(true));
        solver.set_terminator(Terminator::from_fn(|| true));
        assert_eq!(solver.check_sat(&mut nm, &[f]).unwrap(), Unknown);
        assert!(solver.model_formula().is_none())
    }

    #[test]
    fn test_quantifier_below_equality() {
        let mut nm = NodeManager::new();
        let f = successor(&mut nm, 4);
        let t = nm.mk_true();
        let eq = nm.mk_eq(f, t);
        let mut solver = QuantSolver::<Solver>::new(&config(false));
        assert!(solver.check_sat(&mut nm, &[eq]).is_err())
    }
}
