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

//! This module implements the term DAG shared by the normalizer, the
//! quantifier solver and the ground solver. Terms live in a
//! [NodeManager], which hash-conses them, so two structurally
//! identical terms are always the same [Node]. Nodes are allocated in
//! an arena and ordered by allocation index, which means a node is
//! always greater than each of its children.

use id_arena::{Arena, Id};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::fmt::Write;
use std::ops::Index;

use crate::bitvector::{BitVector, MAX_WIDTH};
use crate::error::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Value,
    Var,
    /// A variable bound by a quantifier
    Param,
    /// An uninterpreted function symbol
    Uf,
    Not,
    And,
    Or,
    Implies,
    Ite,
    Equal,
    /// Quantifiers have two children, the bound [Kind::Param] and the body
    Forall,
    Exists,
    /// Application of a [Kind::Uf], which is the first child
    Apply,
    BvNot,
    BvNeg,
    BvAnd,
    BvOr,
    BvXor,
    BvAdd,
    BvMul,
    BvUdiv,
    BvUrem,
    BvShl,
    BvShr,
    BvAshr,
    BvUlt,
    BvSlt,
    BvConcat,
    BvExtract(u32, u32),
}

impl Kind {
    pub fn is_quantifier(self) -> bool {
        matches!(self, Kind::Forall | Kind::Exists)
    }

    pub fn is_symbol(self) -> bool {
        matches!(self, Kind::Var | Kind::Param | Kind::Uf)
    }

    pub fn is_bv_binary(self) -> bool {
        use Kind::*;
        matches!(self, BvAnd | BvOr | BvXor | BvAdd | BvMul | BvUdiv | BvUrem | BvShl | BvShr | BvAshr)
    }

    pub fn is_commutative(self) -> bool {
        use Kind::*;
        matches!(self, And | Or | Equal | BvAnd | BvOr | BvXor | BvAdd | BvMul)
    }

    pub fn name(self) -> &'static str {
        use Kind::*;
        match self {
            Value => "value",
            Var => "var",
            Param => "param",
            Uf => "uf",
            Not => "not",
            And => "and",
            Or => "or",
            Implies => "=>",
            Ite => "ite",
            Equal => "=",
            Forall => "forall",
            Exists => "exists",
            Apply => "apply",
            BvNot => "bvnot",
            BvNeg => "bvneg",
            BvAnd => "bvand",
            BvOr => "bvor",
            BvXor => "bvxor",
            BvAdd => "bvadd",
            BvMul => "bvmul",
            BvUdiv => "bvudiv",
            BvUrem => "bvurem",
            BvShl => "bvshl",
            BvShr => "bvlshr",
            BvAshr => "bvashr",
            BvUlt => "bvult",
            BvSlt => "bvslt",
            BvConcat => "concat",
            BvExtract(_, _) => "extract",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Sort {
    Bool,
    BitVec(u32),
    /// Function sort with the widths of each argument and the result
    Fun(Vec<u32>, u32),
}

impl Sort {
    pub fn width(&self) -> Option<u32> {
        match self {
            Sort::BitVec(w) => Some(*w),
            _ => None,
        }
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Sort::Bool)
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sort::Bool => write!(f, "Bool"),
            Sort::BitVec(w) => write!(f, "(_ BitVec {})", w),
            Sort::Fun(args, ret) => {
                write!(f, "(")?;
                for arg in args {
                    write!(f, "(_ BitVec {}) ", arg)?
                }
                write!(f, "-> (_ BitVec {}))", ret)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeData {
    kind: Kind,
    sort: Sort,
    children: Vec<Node>,
    value: Option<BitVector>,
    symbol: Option<u32>,
}

impl NodeData {
    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn sort(&self) -> &Sort {
        &self.sort
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }
}

/// A handle to a term in a [NodeManager]. Handles are only
/// meaningful for the manager that created them.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Node(Id<NodeData>);

impl Node {
    /// The allocation index of the node, unique within its manager.
    pub fn id(self) -> usize {
        self.0.index()
    }
}

impl Ord for Node {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id().cmp(&other.id())
    }
}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct NodeManager {
    arena: Arena<NodeData>,
    unique: HashMap<NodeData, Node>,
    names: Vec<String>,
}

impl Index<Node> for NodeManager {
    type Output = NodeData;

    fn index(&self, n: Node) -> &Self::Output {
        &self.arena[n.0]
    }
}

impl Default for NodeManager {
    fn default() -> Self {
        Self::new()
    }
}

fn expect_bv(sort: &Sort) -> Result<u32, Error> {
    sort.width().ok_or(Error::Type("expected a bitvector operand"))
}

fn expect_bool(sort: &Sort) -> Result<(), Error> {
    if sort.is_bool() {
        Ok(())
    } else {
        Err(Error::Type("expected a boolean operand"))
    }
}

impl NodeManager {
    pub fn new() -> Self {
        NodeManager { arena: Arena::new(), unique: HashMap::new(), names: Vec::new() }
    }

    /// The number of nodes allocated so far.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.len() == 0
    }

    fn intern(&mut self, data: NodeData) -> Node {
        if let Some(n) = self.unique.get(&data) {
            return *n;
        }
        let n = Node(self.arena.alloc(data.clone()));
        self.unique.insert(data, n);
        n
    }

    fn sort_of(&self, kind: Kind, children: &[Node]) -> Result<Sort, Error> {
        use Kind::*;
        let arity = |n: usize| {
            if children.len() == n {
                Ok(())
            } else {
                Err(Error::Type("wrong number of operands"))
            }
        };
        let sort = |i: usize| &self[children[i]].sort;
        match kind {
            Value | Var | Param | Uf => Err(Error::Type("symbols and values have dedicated constructors")),
            Not => {
                arity(1)?;
                expect_bool(sort(0))?;
                Ok(Sort::Bool)
            }
            And | Or | Implies => {
                arity(2)?;
                expect_bool(sort(0))?;
                expect_bool(sort(1))?;
                Ok(Sort::Bool)
            }
            Ite => {
                arity(3)?;
                expect_bool(sort(0))?;
                if sort(1) != sort(2) || matches!(sort(1), Sort::Fun(_, _)) {
                    return Err(Error::Type("ite branches must have the same sort"));
                }
                Ok(sort(1).clone())
            }
            Equal => {
                arity(2)?;
                if sort(0) != sort(1) || matches!(sort(0), Sort::Fun(_, _)) {
                    return Err(Error::Type("equality operands must have the same sort"));
                }
                Ok(Sort::Bool)
            }
            Forall | Exists => {
                arity(2)?;
                if self[children[0]].kind != Param {
                    return Err(Error::Type("quantifiers must bind a parameter"));
                }
                expect_bool(sort(1))?;
                Ok(Sort::Bool)
            }
            Apply => match children.split_first() {
                Some((f, args)) => match &self[*f].sort {
                    Sort::Fun(domain, codomain) => {
                        if domain.len() != args.len() {
                            return Err(Error::Type("wrong number of function arguments"));
                        }
                        for (w, arg) in domain.iter().zip(args) {
                            if self[*arg].sort != Sort::BitVec(*w) {
                                return Err(Error::Type("function argument has the wrong sort"));
                            }
                        }
                        Ok(Sort::BitVec(*codomain))
                    }
                    _ => Err(Error::Type("applied term is not a function")),
                },
                None => Err(Error::Type("apply requires a function")),
            },
            BvNot | BvNeg => {
                arity(1)?;
                Ok(Sort::BitVec(expect_bv(sort(0))?))
            }
            BvAnd | BvOr | BvXor | BvAdd | BvMul | BvUdiv | BvUrem | BvShl | BvShr | BvAshr => {
                arity(2)?;
                let w = expect_bv(sort(0))?;
                if expect_bv(sort(1))? != w {
                    return Err(Error::Type("bitvector operands must have the same width"));
                }
                Ok(Sort::BitVec(w))
            }
            BvUlt | BvSlt => {
                arity(2)?;
                let w = expect_bv(sort(0))?;
                if expect_bv(sort(1))? != w {
                    return Err(Error::Type("bitvector operands must have the same width"));
                }
                Ok(Sort::Bool)
            }
            BvConcat => {
                arity(2)?;
                let w = expect_bv(sort(0))? + expect_bv(sort(1))?;
                if w > MAX_WIDTH {
                    return Err(Error::Unsupported(format!("concatenation of width {}", w)));
                }
                Ok(Sort::BitVec(w))
            }
            BvExtract(hi, lo) => {
                arity(1)?;
                let w = expect_bv(sort(0))?;
                if lo > hi || hi >= w {
                    return Err(Error::Type("extract indices out of range"));
                }
                Ok(Sort::BitVec(hi - lo + 1))
            }
        }
    }

    pub fn try_mk_node(&mut self, kind: Kind, children: &[Node]) -> Result<Node, Error> {
        let sort = self.sort_of(kind, children)?;
        Ok(self.intern(NodeData { kind, sort, children: children.to_vec(), value: None, symbol: None }))
    }

    /// Create (or find) the node `kind(children)`. Ill-sorted nodes
    /// are a bug in the caller, so this panics on a type error; use
    /// [NodeManager::try_mk_node] for untrusted input.
    pub fn mk_node(&mut self, kind: Kind, children: &[Node]) -> Node {
        match self.try_mk_node(kind, children) {
            Ok(n) => n,
            Err(e) => panic!("{} when building {} node", e, kind.name()),
        }
    }

    pub fn mk_value(&mut self, bv: BitVector) -> Node {
        self.intern(NodeData {
            kind: Kind::Value,
            sort: Sort::BitVec(bv.len()),
            children: Vec::new(),
            value: Some(bv),
            symbol: None,
        })
    }

    pub fn mk_bool(&mut self, b: bool) -> Node {
        self.intern(NodeData {
            kind: Kind::Value,
            sort: Sort::Bool,
            children: Vec::new(),
            value: Some(BitVector::from_bool(b)),
            symbol: None,
        })
    }

    /// Make a value of the given sort, with booleans represented as
    /// width-1 bitvectors.
    pub fn mk_const(&mut self, sort: &Sort, bv: BitVector) -> Node {
        match sort {
            Sort::Bool => self.mk_bool(bv.is_true()),
            _ => self.mk_value(bv),
        }
    }

    pub fn mk_true(&mut self) -> Node {
        self.mk_bool(true)
    }

    pub fn mk_false(&mut self) -> Node {
        self.mk_bool(false)
    }

    pub fn mk_zero(&mut self, width: u32) -> Node {
        self.mk_value(BitVector::zeros(width))
    }

    pub fn mk_one(&mut self, width: u32) -> Node {
        self.mk_value(BitVector::one(width))
    }

    pub fn mk_ones(&mut self, width: u32) -> Node {
        self.mk_value(BitVector::ones(width))
    }

    fn mk_symbol(&mut self, kind: Kind, sort: Sort, name: &str) -> Node {
        let symbol = self.names.len() as u32;
        self.names.push(name.to_string());
        self.intern(NodeData { kind, sort, children: Vec::new(), value: None, symbol: Some(symbol) })
    }

    /// Create a fresh variable. Variables are never merged, even if
    /// they share a name.
    pub fn mk_var(&mut self, sort: Sort, name: &str) -> Node {
        assert!(!matches!(sort, Sort::Fun(_, _)), "use mk_uf for function symbols");
        self.mk_symbol(Kind::Var, sort, name)
    }

    pub fn mk_bv_var(&mut self, width: u32, name: &str) -> Node {
        self.mk_var(Sort::BitVec(width), name)
    }

    pub fn mk_param(&mut self, width: u32, name: &str) -> Node {
        self.mk_symbol(Kind::Param, Sort::BitVec(width), name)
    }

    pub fn mk_uf(&mut self, domain: Vec<u32>, codomain: u32, name: &str) -> Node {
        self.mk_symbol(Kind::Uf, Sort::Fun(domain, codomain), name)
    }

    pub fn mk_apply(&mut self, uf: Node, args: &[Node]) -> Node {
        let mut children = Vec::with_capacity(args.len() + 1);
        children.push(uf);
        children.extend_from_slice(args);
        self.mk_node(Kind::Apply, &children)
    }

    pub fn mk_forall(&mut self, param: Node, body: Node) -> Node {
        self.mk_node(Kind::Forall, &[param, body])
    }

    pub fn mk_exists(&mut self, param: Node, body: Node) -> Node {
        self.mk_node(Kind::Exists, &[param, body])
    }

    pub fn mk_not(&mut self, n: Node) -> Node {
        self.mk_node(Kind::Not, &[n])
    }

    pub fn mk_and(&mut self, lhs: Node, rhs: Node) -> Node {
        self.mk_node(Kind::And, &[lhs, rhs])
    }

    pub fn mk_or(&mut self, lhs: Node, rhs: Node) -> Node {
        self.mk_node(Kind::Or, &[lhs, rhs])
    }

    pub fn mk_implies(&mut self, lhs: Node, rhs: Node) -> Node {
        self.mk_node(Kind::Implies, &[lhs, rhs])
    }

    pub fn mk_eq(&mut self, lhs: Node, rhs: Node) -> Node {
        self.mk_node(Kind::Equal, &[lhs, rhs])
    }

    pub fn mk_ite(&mut self, cond: Node, then_branch: Node, else_branch: Node) -> Node {
        self.mk_node(Kind::Ite, &[cond, then_branch, else_branch])
    }

    pub fn mk_add(&mut self, lhs: Node, rhs: Node) -> Node {
        self.mk_node(Kind::BvAdd, &[lhs, rhs])
    }

    pub fn mk_mul(&mut self, lhs: Node, rhs: Node) -> Node {
        self.mk_node(Kind::BvMul, &[lhs, rhs])
    }

    pub fn mk_neg(&mut self, n: Node) -> Node {
        self.mk_node(Kind::BvNeg, &[n])
    }

    pub fn mk_bvnot(&mut self, n: Node) -> Node {
        self.mk_node(Kind::BvNot, &[n])
    }

    /// Subtraction is represented as `lhs + -rhs`.
    pub fn mk_sub(&mut self, lhs: Node, rhs: Node) -> Node {
        let neg = self.mk_neg(rhs);
        self.mk_add(lhs, neg)
    }

    pub fn mk_ult(&mut self, lhs: Node, rhs: Node) -> Node {
        self.mk_node(Kind::BvUlt, &[lhs, rhs])
    }

    pub fn mk_ule(&mut self, lhs: Node, rhs: Node) -> Node {
        let gt = self.mk_ult(rhs, lhs);
        self.mk_not(gt)
    }

    pub fn mk_ugt(&mut self, lhs: Node, rhs: Node) -> Node {
        self.mk_ult(rhs, lhs)
    }

    pub fn mk_slt(&mut self, lhs: Node, rhs: Node) -> Node {
        self.mk_node(Kind::BvSlt, &[lhs, rhs])
    }

    pub fn mk_sle(&mut self, lhs: Node, rhs: Node) -> Node {
        let gt = self.mk_slt(rhs, lhs);
        self.mk_not(gt)
    }

    pub fn mk_extract(&mut self, n: Node, hi: u32, lo: u32) -> Node {
        self.mk_node(Kind::BvExtract(hi, lo), &[n])
    }

    pub fn mk_concat(&mut self, hi: Node, lo: Node) -> Node {
        self.mk_node(Kind::BvConcat, &[hi, lo])
    }

    pub fn mk_zero_extend(&mut self, n: Node, by: u32) -> Node {
        if by == 0 {
            n
        } else {
            let zero = self.mk_zero(by);
            self.mk_concat(zero, n)
        }
    }

    /// Left-fold a binary operator over a non-empty list of operands.
    pub fn mk_nary(&mut self, kind: Kind, args: &[Node]) -> Node {
        assert!(!args.is_empty(), "mk_nary requires at least one operand");
        let mut result = args[0];
        for arg in &args[1..] {
            result = self.mk_node(kind, &[result, *arg])
        }
        result
    }

    /// Conjunction of a list of formulas, `true` if it is empty.
    pub fn mk_conj(&mut self, args: &[Node]) -> Node {
        if args.is_empty() {
            self.mk_true()
        } else {
            self.mk_nary(Kind::And, args)
        }
    }

    pub fn kind(&self, n: Node) -> Kind {
        self[n].kind
    }

    pub fn sort(&self, n: Node) -> &Sort {
        &self[n].sort
    }

    pub fn children(&self, n: Node) -> &[Node] {
        &self[n].children
    }

    pub fn child(&self, n: Node, i: usize) -> Node {
        self[n].children[i]
    }

    pub fn num_children(&self, n: Node) -> usize {
        self[n].children.len()
    }

    pub fn is_value(&self, n: Node) -> bool {
        self[n].kind == Kind::Value
    }

    pub fn value(&self, n: Node) -> Option<BitVector> {
        self[n].value
    }

    /// The value of a value node. Panics if `n` is not a value.
    pub fn bv_value(&self, n: Node) -> BitVector {
        match self[n].value {
            Some(bv) => bv,
            None => panic!("node {} is not a value", n.id()),
        }
    }

    /// The width of a bitvector node. Panics if `n` is not a bitvector.
    pub fn width(&self, n: Node) -> u32 {
        match &self[n].sort {
            Sort::BitVec(w) => *w,
            sort => panic!("node {} has sort {}, expected a bitvector", n.id(), sort),
        }
    }

    pub fn is_bool(&self, n: Node) -> bool {
        self[n].sort.is_bool()
    }

    pub fn is_true(&self, n: Node) -> bool {
        self.is_bool(n) && self[n].value.map_or(false, |bv| bv.is_true())
    }

    pub fn is_false(&self, n: Node) -> bool {
        self.is_bool(n) && self[n].value.map_or(false, |bv| !bv.is_true())
    }

    /// A bitwise negation of an addition, `~(a + b)`.
    pub fn is_inverted_add(&self, n: Node) -> bool {
        self.kind(n) == Kind::BvNot && self.kind(self.child(n, 0)) == Kind::BvAdd
    }

    pub fn name(&self, n: Node) -> Option<&str> {
        self[n].symbol.map(|s| self.names[s as usize].as_str())
    }

    /// Rebuild `n` with new children, keeping its kind.
    pub fn mk_like(&mut self, n: Node, children: &[Node]) -> Node {
        if self.children(n) == children {
            n
        } else {
            let kind = self.kind(n);
            self.mk_node(kind, children)
        }
    }

    pub fn display(&self, n: Node) -> String {
        let mut buf = String::new();
        // Writing to a String cannot fail
        let _ = self.write_node(&mut buf, n);
        buf
    }

    fn write_node(&self, buf: &mut String, n: Node) -> fmt::Result {
        let data = &self[n];
        match data.kind {
            Kind::Value => match (&data.sort, data.value) {
                (Sort::Bool, Some(bv)) => write!(buf, "{}", bv.is_true()),
                (_, Some(bv)) => write!(buf, "{}", bv),
                _ => write!(buf, "?"),
            },
            Kind::Var | Kind::Param | Kind::Uf => {
                write!(buf, "{}@{}", self.name(n).unwrap_or("_"), n.id())
            }
            Kind::BvExtract(hi, lo) => {
                write!(buf, "((_ extract {} {}) ", hi, lo)?;
                self.write_node(buf, data.children[0])?;
                write!(buf, ")")
            }
            Kind::Forall | Kind::Exists => {
                write!(buf, "({} ((", data.kind.name())?;
                self.write_node(buf, data.children[0])?;
                write!(buf, " {})) ", self[data.children[0]].sort)?;
                self.write_node(buf, data.children[1])?;
                write!(buf, ")")
            }
            Kind::Apply => {
                write!(buf, "(")?;
                for (i, child) in data.children.iter().enumerate() {
                    if i > 0 {
                        write!(buf, " ")?
                    }
                    self.write_node(buf, *child)?
                }
                write!(buf, ")")
            }
            kind => {
                write!(buf, "({}", kind.name())?;
                for child in &data.children {
                    write!(buf, " ")?;
                    self.write_node(buf, *child)?
                }
                write!(buf, ")")
            }
        }
    }
}

/// What a [Rebuild] visitor wants to do with a node when it is first
/// encountered.
pub enum Visit {
    /// Visit the children, then call [Rebuild::leave]
    Descend,
    /// Rebuild this node as if it were the given (source) node instead
    Replace(Node),
    /// The node maps directly to the given result
    Done(Node),
}

/// A memoized post-order rewrite over a DAG. The traversal uses an
/// explicit stack, so arbitrarily deep terms are fine. The source and
/// target node managers may be the same or different.
pub trait Rebuild {
    fn source(&self) -> &NodeManager;

    fn enter(&mut self, _node: Node) -> Visit {
        Visit::Descend
    }

    /// Called once all children of `node` have been rebuilt, with
    /// `children` holding their results in order.
    fn leave(&mut self, node: Node, children: Vec<Node>) -> Node;
}

enum Frame {
    Visit(Node),
    Finish(Node),
    Alias(Node, Node),
}

/// Rebuild `root` using `visitor`. Results are stored in `cache`,
/// which can be shared between calls to rebuild several roots with
/// the same mapping.
pub fn rebuild<R: Rebuild>(visitor: &mut R, cache: &mut HashMap<Node, Node>, root: Node) -> Node {
    let mut stack = vec![Frame::Visit(root)];

    while let Some(frame) = stack.pop() {
        match frame {
            Frame::Visit(n) => {
                if cache.contains_key(&n) {
                    continue;
                }
                match visitor.enter(n) {
                    Visit::Done(result) => {
                        cache.insert(n, result);
                    }
                    Visit::Replace(m) => {
                        if let Some(result) = cache.get(&m) {
                            let result = *result;
                            cache.insert(n, result);
                        } else {
                            stack.push(Frame::Alias(n, m));
                            stack.push(Frame::Visit(m))
                        }
                    }
                    Visit::Descend => {
                        stack.push(Frame::Finish(n));
                        for child in visitor.source().children(n).iter().rev() {
                            if !cache.contains_key(child) {
                                stack.push(Frame::Visit(*child))
                            }
                        }
                    }
                }
            }
            Frame::Finish(n) => {
                if cache.contains_key(&n) {
                    continue;
                }
                let children = visitor.source().children(n).iter().map(|c| cache[c]).collect();
                let result = visitor.leave(n, children);
                cache.insert(n, result);
            }
            Frame::Alias(n, m) => {
                let result = cache[&m];
                cache.insert(n, result);
            }
        }
    }

    cache[&root]
}

/// Nodes reachable from `roots`, each listed once, children before
/// parents.
pub fn post_order(nm: &NodeManager, roots: &[Node]) -> Vec<Node> {
    post_order_with(nm, roots, |_| true)
}

/// Like [post_order], but the children of a node are only visited if
/// `descend` returns true for it.
pub fn post_order_with<F>(nm: &NodeManager, roots: &[Node], descend: F) -> Vec<Node>
where
    F: Fn(Node) -> bool,
{
    let mut visited: HashMap<Node, bool> = HashMap::new();
    let mut order = Vec::new();
    let mut stack: Vec<Node> = roots.iter().rev().copied().collect();

    while let Some(n) = stack.pop() {
        match visited.get(&n) {
            Some(true) => (),
            Some(false) => {
                visited.insert(n, true);
                order.push(n)
            }
            None => {
                visited.insert(n, false);
                stack.push(n);
                if descend(n) {
                    for child in nm.children(n).iter().rev() {
                        if !visited.contains_key(child) {
                            stack.push(*child)
                        }
                    }
                }
            }
        }
    }

    order
}

pub fn contains_quantifier(nm: &NodeManager, root: Node) -> bool {
    post_order(nm, &[root]).into_iter().any(|n| nm.kind(n).is_quantifier())
}

/// Copies terms from one node manager into another. Symbols are
/// mapped through `symbols`, and any symbol without an entry is
/// recreated in the target with the same name and sort.
pub struct Transfer<'a> {
    pub src: &'a NodeManager,
    pub dst: &'a mut NodeManager,
    pub symbols: &'a mut HashMap<Node, Node>,
}

impl<'a> Rebuild for Transfer<'a> {
    fn source(&self) -> &NodeManager {
        self.src
    }

    fn enter(&mut self, n: Node) -> Visit {
        let data = &self.src[n];
        match data.kind {
            Kind::Value => Visit::Done(self.dst.mk_const(&data.sort, self.src.bv_value(n))),
            Kind::Var | Kind::Param | Kind::Uf => {
                if let Some(m) = self.symbols.get(&n) {
                    return Visit::Done(*m);
                }
                let name = self.src.name(n).unwrap_or("_");
                let m = match &data.sort {
                    Sort::Fun(domain, codomain) => self.dst.mk_uf(domain.clone(), *codomain, name),
                    sort if data.kind == Kind::Param => self.dst.mk_param(sort.width().unwrap_or(1), name),
                    sort => self.dst.mk_var(sort.clone(), name),
                };
                self.symbols.insert(n, m);
                Visit::Done(m)
            }
            _ => Visit::Descend,
        }
    }

    fn leave(&mut self, n: Node, children: Vec<Node>) -> Node {
        self.dst.mk_node(self.src.kind(n), &children)
    }
}

/// Substitute nodes within a single manager. Every occurrence of a
/// key of `subst` is replaced by its value, and the rest of the term
/// is rebuilt around it.
pub struct Substitute<'a> {
    pub nm: &'a mut NodeManager,
    pub subst: &'a HashMap<Node, Node>,
}

impl<'a> Rebuild for Substitute<'a> {
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
        self.nm.mk_like(n, &children)
    }
}

pub fn substitute(nm: &mut NodeManager, subst: &HashMap<Node, Node>, root: Node) -> Node {
    let mut cache = HashMap::new();
    rebuild(&mut Substitute { nm, subst }, &mut cache, root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_consing() {
        let mut nm = NodeManager::new();
        let x = nm.mk_bv_var(8, "x");
        let y = nm.mk_bv_var(8, "y");
        let a1 = nm.mk_add(x, y);
        let a2 = nm.mk_add(x, y);
        assert_eq!(a1, a2);
        assert_ne!(nm.mk_add(y, x), a1);
        assert_eq!(nm.mk_zero(8), nm.mk_value(BitVector::zeros(8)));
        assert_ne!(nm.mk_bv_var(8, "x"), x)
    }

    #[test]
    fn test_ids_follow_construction() {
        let mut nm = NodeManager::new();
        let x = nm.mk_bv_var(8, "x");
        let y = nm.mk_bv_var(8, "y");
        let a = nm.mk_add(x, y);
        let m = nm.mk_mul(a, x);
        assert!(x < a && y < a && a < m)
    }

    #[test]
    fn test_sorts() {
        let mut nm = NodeManager::new();
        let x = nm.mk_bv_var(8, "x");
        let b = nm.mk_var(Sort::Bool, "b");
        let c = nm.mk_concat(x, x);
        assert_eq!(nm.width(c), 16);
        let e = nm.mk_extract(c, 11, 4);
        assert_eq!(nm.width(e), 8);
        assert!(nm.try_mk_node(Kind::BvAdd, &[x, b]).is_err());
        assert!(nm.try_mk_node(Kind::BvAdd, &[x, c]).is_err());
        assert!(nm.try_mk_node(Kind::BvExtract(8, 0), &[x]).is_err());
        let f = nm.mk_uf(vec![8, 8], 4, "f");
        let app = nm.mk_apply(f, &[x, x]);
        assert_eq!(nm.sort(app), &Sort::BitVec(4));
        assert!(nm.try_mk_node(Kind::Apply, &[f, x]).is_err())
    }

    #[test]
    fn test_substitute() {
        let mut nm = NodeManager::new();
        let x = nm.mk_bv_var(8, "x");
        let y = nm.mk_bv_var(8, "y");
        let z = nm.mk_bv_var(8, "z");
        let a = nm.mk_add(x, y);
        let m = nm.mk_mul(a, a);
        let mut subst = HashMap::new();
        subst.insert(x, z);
        let r = substitute(&mut nm, &subst, m);
        let expected = {
            let a = nm.mk_add(z, y);
            nm.mk_mul(a, a)
        };
        assert_eq!(r, expected)
    }

    #[test]
    fn test_transfer() {
        let mut src = NodeManager::new();
        let mut dst = NodeManager::new();
        let x = src.mk_bv_var(8, "x");
        let one = src.mk_one(8);
        let a = src.mk_add(x, one);
        let mut symbols = HashMap::new();
        let mut cache = HashMap::new();
        let b = rebuild(&mut Transfer { src: &src, dst: &mut dst, symbols: &mut symbols }, &mut cache, a);
        assert_eq!(dst.kind(b), Kind::BvAdd);
        assert_eq!(dst.name(dst.child(b, 0)), Some("x"));
        assert_eq!(dst.display(b), format!("(bvadd x@{} #x01)", dst.child(b, 0).id()))
    }

    #[test]
    fn test_post_order() {
        let mut nm = NodeManager::new();
        let x = nm.mk_bv_var(8, "x");
        let a = nm.mk_add(x, x);
        let m = nm.mk_mul(a, x);
        assert_eq!(post_order(&nm, &[m]), vec![x, a, m])
    }
}
