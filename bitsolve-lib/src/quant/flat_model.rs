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

use std::collections::HashMap;

use super::synth::Example;
use super::{Existential, Universal};
use crate::bitvector::BitVector;
use crate::node::Node;
use crate::smt::GroundSolver;

/// Values for every quantified variable at one counterexample. For a
/// counterexample found by the forall solver, `evals` holds the values
/// the existential variables took in the refuted candidate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    pub uvals: Vec<BitVector>,
    pub evals: Vec<BitVector>,
}

/// Positions of the quantified variables within a [Row].
#[derive(Debug, Default)]
pub struct VarIndex {
    uindex: HashMap<Node, usize>,
    eindex: HashMap<Node, usize>,
}

impl VarIndex {
    pub fn new(universals: &[Universal], existentials: &[Existential]) -> Self {
        VarIndex {
            uindex: universals.iter().enumerate().map(|(i, u)| (u.param, i)).collect(),
            eindex: existentials.iter().enumerate().map(|(i, e)| (e.param, i)).collect(),
        }
    }

    pub fn universal(&self, param: Node) -> Option<usize> {
        self.uindex.get(&param).copied()
    }

    pub fn existential(&self, param: Node) -> Option<usize> {
        self.eindex.get(&param).copied()
    }

    pub fn value(&self, var: Node, row: &Row) -> Option<BitVector> {
        match self.universal(var) {
            Some(i) => row.uvals.get(i).copied(),
            None => self.existential(var).and_then(|i| row.evals.get(i).copied()),
        }
    }

    /// One example per row, mapping the values of `inputs` to the
    /// value of `output`.
    pub fn build_input_output_values(&self, rows: &[Row], inputs: &[Node], output: Node) -> Vec<Example> {
        rows.iter()
            .filter_map(|row| {
                let inputs = inputs.iter().map(|v| self.value(*v, row)).collect::<Option<Vec<_>>>()?;
                Some(Example { inputs, output: self.value(output, row)? })
            })
            .collect()
    }
}

/// The exists solver's model, read at every counterexample seen so
/// far. Existential variables without dependencies have one value
/// shared by all rows.
#[derive(Debug)]
pub struct FlatModel {
    rows: Vec<Row>,
    constants: HashMap<Node, BitVector>,
}

impl FlatModel {
    pub fn generate<S: GroundSolver>(
        exists: &mut S,
        index: &VarIndex,
        existentials: &[Existential],
        ces: &[Row],
    ) -> Self {
        let mut constants = HashMap::new();
        for e in existentials.iter().filter(|e| e.deps.is_empty()) {
            let v = exists.get_value(e.symbol).unwrap_or_else(|| BitVector::zeros(e.width));
            constants.insert(e.param, v);
        }

        let mut rows = Vec::with_capacity(ces.len());
        for ce in ces {
            let mut evals = Vec::with_capacity(existentials.len());
            for e in existentials {
                let v = match constants.get(&e.param) {
                    Some(v) => *v,
                    None => {
                        let args: Vec<BitVector> = e.deps.iter().filter_map(|d| index.value(*d, ce)).collect();
                        exists.get_fun_value(e.symbol, &args).unwrap_or_else(|| BitVector::zeros(e.width))
                    }
                };
                evals.push(v)
            }
            rows.push(Row { uvals: ce.uvals.clone(), evals })
        }

        FlatModel { rows, constants }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// The value of an existential variable without dependencies.
    pub fn constant(&self, evar: Node) -> Option<BitVector> {
        self.constants.get(&evar).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeManager;
    use crate::smt::{SmtResult, Solver};

    #[test]
    fn test_input_output_values() {
        let mut nm = NodeManager::new();
        let x = nm.mk_param(4, "x");
        let y = nm.mk_param(4, "y");
        let x_var = nm.mk_bv_var(4, "x");
        let y_uf = nm.mk_uf(vec![4], 4, "y");
        let universals = vec![Universal { param: x, var: x_var, deps: vec![] }];
        let existentials = vec![Existential { param: y, width: 4, deps: vec![x], skolem: y_uf, symbol: y_uf }];
        let index = VarIndex::new(&universals, &existentials);

        let bv = |v| BitVector::new(v, 4);
        let rows = vec![Row { uvals: vec![bv(1)], evals: vec![bv(2)] }, Row { uvals: vec![bv(5)], evals: vec![bv(10)] }];
        let exs = index.build_input_output_values(&rows, &[x], y);
        assert_eq!(exs.len(), 2);
        assert_eq!(exs[1].inputs, vec![bv(5)]);
        assert_eq!(exs[1].output, bv(10));

        // Universal variable as the output, as used for instantiation
        let exs = index.build_input_output_values(&rows, &[y], x);
        assert_eq!(exs[0].inputs, vec![bv(2)]);
        assert_eq!(exs[0].output, bv(1))
    }

    #[test]
    fn test_generate() {
        let mut fnm = NodeManager::new();
        let x = fnm.mk_param(4, "x");
        let y = fnm.mk_param(4, "y");
        let z = fnm.mk_param(4, "z");
        let x_var = fnm.mk_bv_var(4, "x");

        let mut exists = Solver::new();
        let nm = exists.nm_mut();
        let y_uf = nm.mk_uf(vec![4], 4, "y");
        let z_var = nm.mk_bv_var(4, "z");
        let bv = |v| BitVector::new(v, 4);
        let mut facts = Vec::new();
        for (arg, res) in &[(1, 2), (5, 10)] {
            let a = nm.mk_value(bv(*arg));
            let app = nm.mk_apply(y_uf, &[a]);
            let r = nm.mk_value(bv(*res));
            facts.push(nm.mk_eq(app, r))
        }
        let seven = nm.mk_value(bv(7));
        facts.push(nm.mk_eq(z_var, seven));
        let conj = nm.mk_conj(&facts);
        exists.assert_formula(conj);
        assert_eq!(exists.check_sat(&[]), SmtResult::Sat);

        let universals = vec![Universal { param: x, var: x_var, deps: vec![] }];
        let existentials = vec![
            Existential { param: y, width: 4, deps: vec![x], skolem: y_uf, symbol: y_uf },
            Existential { param: z, width: 4, deps: vec![], skolem: z_var, symbol: z_var },
        ];
        let index = VarIndex::new(&universals, &existentials);
        let ces = vec![Row { uvals: vec![bv(5)], evals: vec![bv(0), bv(0)] }, Row { uvals: vec![bv(1)], evals: vec![bv(0), bv(0)] }];
        let flat = FlatModel::generate(&mut exists, &index, &existentials, &ces);

        assert_eq!(flat.rows()[0].evals, vec![bv(10), bv(7)]);
        assert_eq!(flat.rows()[1].evals, vec![bv(2), bv(7)]);
        assert_eq!(flat.constant(z), Some(bv(7)));
        assert_eq!(flat.constant(y), None)
    }
}
