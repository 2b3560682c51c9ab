// MIT License
//
// Copyright (c) 2019 Alasdair Armstrong
//
// Permission is hereby granted, free of charge, to any person
// obtaining a copy of this software and associated documentation
// files (the "Software"), to deal in the Software without
// restriction, including without limitation the rights to use, copy,
// modify, merge, publish, distribute, sublicense, and/or sell copies
// of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be
// included in all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND,
// EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF
// MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
// NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS
// BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN
// ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::process::exit;
use std::time::{Duration, Instant};

use bitsolve_lib::bitvector::BitVector;
use bitsolve_lib::eval::{eval, Model, MAX_QUANTIFIED_WIDTH};
use bitsolve_lib::log;
use bitsolve_lib::node::{Kind, Node, NodeManager};
use bitsolve_lib::normalize::{NormalizeStats, PassNormalize};
use bitsolve_lib::quant::{QuantSolver, QuantStats};
use bitsolve_lib::smt::aig::AigBitblaster;
use bitsolve_lib::smt::{Solver, Terminator};

mod opts;
use opts::CommonOpts;

fn main() {
    let code = bench_main();
    exit(code)
}

#[derive(Serialize)]
struct NormalizeRun {
    problem: usize,
    assertions: usize,
    changed: bool,
    ands_before: usize,
    ands_after: usize,
    stats: NormalizeStats,
}

#[derive(Serialize)]
struct QuantRun {
    problem: usize,
    formula: String,
    result: String,
    model_checked: Option<bool>,
    #[serde(serialize_with = "log::serialize_seconds")]
    time: Duration,
    stats: QuantStats,
}

#[derive(Serialize)]
struct Report {
    seed: u64,
    normalize: Vec<NormalizeRun>,
    quant: Vec<QuantRun>,
}

/// A random sum of the leaves, some of them negated or inverted,
/// optionally scaled by a small constant.
fn random_chain(nm: &mut NodeManager, rng: &mut StdRng, leaves: &[Node], width: u32) -> Node {
    let len = rng.gen_range(1, 5);
    let mut terms = Vec::with_capacity(len);
    for _ in 0..len {
        let leaf = leaves[rng.gen_range(0, leaves.len())];
        let term = match rng.gen_range(0, 6) {
            0 => nm.mk_bvnot(leaf),
            1 => nm.mk_neg(leaf),
            2 => {
                let k = nm.mk_value(BitVector::new(rng.gen_range(2, 8), width));
                nm.mk_mul(k, leaf)
            }
            _ => leaf,
        };
        terms.push(term)
    }
    if rng.gen_range(0, 3) == 0 {
        terms.push(nm.mk_value(BitVector::new(rng.gen_range(0, 1 << width.min(16)), width)))
    }
    nm.mk_nary(Kind::BvAdd, &terms)
}

fn random_normalize_problem(nm: &mut NodeManager, rng: &mut StdRng, width: u32) -> Vec<Node> {
    let leaves: Vec<Node> = (0..4).map(|i| nm.mk_bv_var(width, &format!("v{}", i))).collect();
    let num_assertions = rng.gen_range(1, 5);
    let mut assertions = Vec::with_capacity(num_assertions);
    for _ in 0..num_assertions {
        let lhs = random_chain(nm, rng, &leaves, width);
        let rhs = random_chain(nm, rng, &leaves, width);
        let atom = match rng.gen_range(0, 4) {
            0 => nm.mk_ult(lhs, rhs),
            1 => nm.mk_slt(lhs, rhs),
            _ => nm.mk_eq(lhs, rhs),
        };
        assertions.push(atom)
    }
    assertions
}

fn random_term(nm: &mut NodeManager, rng: &mut StdRng, leaves: &[Node], width: u32, depth: u32) -> Node {
    if depth == 0 || rng.gen_range(0, 3) == 0 {
        return if rng.gen_range(0, 4) == 0 {
            nm.mk_value(BitVector::new(rng.gen_range(0, 1 << width.min(16)), width))
        } else {
            leaves[rng.gen_range(0, leaves.len())]
        };
    }
    let lhs = random_term(nm, rng, leaves, width, depth - 1);
    match rng.gen_range(0, 6) {
        0 => nm.mk_bvnot(lhs),
        1 => nm.mk_neg(lhs),
        op => {
            let rhs = random_term(nm, rng, leaves, width, depth - 1);
            let kind = match op {
                2 => Kind::BvAdd,
                3 => Kind::BvMul,
                4 => Kind::BvAnd,
                _ => Kind::BvXor,
            };
            nm.mk_node(kind, &[lhs, rhs])
        }
    }
}

/// Either `forall x. exists y. P(x, y)` or `exists y. forall x. P(x, y)`.
fn random_quant_problem(nm: &mut NodeManager, rng: &mut StdRng, width: u32) -> Node {
    let x = nm.mk_param(width, "x");
    let y = nm.mk_param(width, "y");
    let lhs = random_term(nm, rng, &[x, y], width, 2);
    let rhs = random_term(nm, rng, &[x, y], width, 2);
    let atom = if rng.gen::<bool>() { nm.mk_eq(lhs, rhs) } else { nm.mk_ule(lhs, rhs) };
    if rng.gen::<bool>() {
        let inner = nm.mk_exists(y, atom);
        nm.mk_forall(x, inner)
    } else {
        let inner = nm.mk_forall(x, atom);
        nm.mk_exists(y, inner)
    }
}

fn count_ands(nm: &NodeManager, assertions: &[Node]) -> usize {
    let mut blaster = AigBitblaster::new();
    assertions.iter().map(|a| blaster.count_aig_ands(nm, &[*a])).sum()
}

fn bench_main() -> i32 {
    let mut opts = opts::common_opts();
    opts.optopt("n", "normalize", "number of random normalization problems", "N");
    opts.optopt("q", "quant", "number of random quantified problems", "N");
    opts.optopt("w", "width", "bit-width for normalization problems", "BITS");
    opts.optopt("", "quant-width", "bit-width for quantified problems", "BITS");

    let (matches, CommonOpts { config, seed, timeout }) = opts::parse(&opts);
    let num_normalize: usize = opts::get_or_usage(&opts, &matches, "normalize", 20);
    let num_quant: usize = opts::get_or_usage(&opts, &matches, "quant", 10);
    let width: u32 = opts::get_or_usage(&opts, &matches, "width", 8);
    let quant_width: u32 = opts::get_or_usage(&opts, &matches, "quant-width", 4);

    if width == 0 || width > 64 || quant_width == 0 || quant_width > 64 {
        eprintln!("Bit-widths must be between 1 and 64");
        return 1;
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut report = Report { seed, normalize: Vec::new(), quant: Vec::new() };

    for problem in 0..num_normalize {
        let mut nm = NodeManager::new();
        let mut assertions = random_normalize_problem(&mut nm, &mut rng, width);
        let ands_before = count_ands(&nm, &assertions);
        let (changed, stats) = {
            let mut pass = PassNormalize::new(&mut nm, &config);
            let changed = pass.apply(&mut assertions);
            (changed, pass.stats.clone())
        };
        let ands_after = count_ands(&nm, &assertions);
        log!(log::VERBOSE, format!("normalize {}: {} -> {} and gates", problem, ands_before, ands_after));
        report.normalize.push(NormalizeRun {
            problem,
            assertions: assertions.len(),
            changed,
            ands_before,
            ands_after,
            stats,
        })
    }

    for problem in 0..num_quant {
        let mut nm = NodeManager::new();
        let formula = random_quant_problem(&mut nm, &mut rng, quant_width);
        let mut solver = QuantSolver::<Solver>::new(&config);
        if let Some(secs) = timeout {
            solver.set_terminator(Terminator::deadline(Instant::now() + Duration::from_secs(secs)))
        }

        let now = Instant::now();
        let result = match solver.check_sat(&mut nm, &[formula]) {
            Ok(result) => result,
            Err(e) => {
                eprintln!("Error solving {}: {}", nm.display(formula), e);
                return 1;
            }
        };
        let time = now.elapsed();
        log!(log::VERBOSE, format!("quant {}: {:?} in {}ms", problem, result, time.as_millis()));

        let model_checked = if quant_width <= MAX_QUANTIFIED_WIDTH {
            solver.model_formula().and_then(|m| {
                let gnm = solver.solvers()?.nm();
                eval(gnm, &Model::new(), m).ok().map(|v| v.is_true())
            })
        } else {
            None
        };
        if model_checked == Some(false) {
            eprintln!("Model check failed for {}", nm.display(formula))
        }

        report.quant.push(QuantRun {
            problem,
            formula: nm.display(formula),
            result: format!("{:?}", result),
            model_checked,
            time,
            stats: solver.stats().cloned().unwrap_or_default(),
        })
    }

    match toml::to_string(&report) {
        Ok(s) => {
            print!("{}", s);
            0
        }
        Err(e) => {
            eprintln!("Could not serialize statistics: {}", e);
            1
        }
    }
}
