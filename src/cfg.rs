//! Control flow graphs over the typed AST.
//!
//! Blocks hold `StmtId`s from the owning function's statement arena. A
//! compound statement's id appearing in a block stands for its *head* only
//! (the `if`/`for` condition, the `switch` value and case expressions); its
//! bodies live in successor blocks. Successor order is fixed at build time
//! and defines the pre-order the flow analyzer walks in.

use crate::go::ast::{FuncNode, Stmt, StmtId};

/// Unique identifier for a basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub usize);

/// A basic block: straight-line statement heads plus a successor list.
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub nodes: Vec<StmtId>,
    pub succs: Vec<BlockId>,
}

/// CFG of one function body.
#[derive(Debug, Clone)]
pub struct FuncCfg {
    pub blocks: Vec<Block>,
    pub entry: BlockId,
}

impl FuncCfg {
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0]
    }

    /// Build the CFG for a function. `None` when it has no body.
    pub fn build(func: &FuncNode) -> Option<FuncCfg> {
        let body = func.body.as_ref()?;
        let mut builder = Builder {
            func,
            blocks: Vec::new(),
        };
        let entry = builder.new_block();
        builder.build_seq(body, entry);
        Some(FuncCfg {
            blocks: builder.blocks,
            entry,
        })
    }
}

struct Builder<'a> {
    func: &'a FuncNode,
    blocks: Vec<Block>,
}

impl<'a> Builder<'a> {
    fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(Block::default());
        id
    }

    fn push_node(&mut self, block: BlockId, sid: StmtId) {
        self.blocks[block.0].nodes.push(sid);
    }

    fn add_succ(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from.0].succs.push(to);
    }

    /// Thread a statement sequence through `cur`. Returns the open block at
    /// the end, or `None` when the sequence terminated (an explicit return).
    fn build_seq(&mut self, stmts: &[StmtId], mut cur: BlockId) -> Option<BlockId> {
        for &sid in stmts {
            cur = self.build_stmt(sid, cur)?;
        }
        Some(cur)
    }

    fn build_stmt(&mut self, sid: StmtId, cur: BlockId) -> Option<BlockId> {
        let func = self.func;
        match func.stmt(sid) {
            Stmt::Return(_) => {
                self.push_node(cur, sid);
                None
            }
            Stmt::If(stmt) => {
                // The head block sees the initializer and the condition.
                if let Some(init) = stmt.init {
                    self.push_node(cur, init);
                }
                self.push_node(cur, sid);

                let then_block = self.new_block();
                self.add_succ(cur, then_block);
                let then_end = self.build_seq(&stmt.then_body, then_block);

                let merge = self.new_block();
                match stmt.else_body {
                    Some(els) => {
                        let else_block = self.new_block();
                        self.add_succ(cur, else_block);
                        if let Some(end) = self.build_stmt(els, else_block) {
                            self.add_succ(end, merge);
                        }
                    }
                    None => self.add_succ(cur, merge),
                }
                if let Some(end) = then_end {
                    self.add_succ(end, merge);
                }
                Some(merge)
            }
            Stmt::For(stmt) => {
                if let Some(init) = stmt.init {
                    self.push_node(cur, init);
                }
                let header = self.new_block();
                self.add_succ(cur, header);
                // The `for` id in the header stands for its condition.
                self.push_node(header, sid);

                let body_block = self.new_block();
                let exit = self.new_block();
                self.add_succ(header, body_block);
                self.add_succ(header, exit);

                if let Some(end) = self.build_seq(&stmt.body, body_block) {
                    if let Some(post) = stmt.post {
                        self.push_node(end, post);
                    }
                    self.add_succ(end, header);
                }
                Some(exit)
            }
            Stmt::Switch(stmt) => {
                if let Some(init) = stmt.init {
                    self.push_node(cur, init);
                }
                // The switch id stands for the value and case expressions.
                self.push_node(cur, sid);

                let merge = self.new_block();
                let mut has_default = false;
                for case in &stmt.cases {
                    if case.exprs.is_empty() {
                        has_default = true;
                    }
                    let case_block = self.new_block();
                    self.add_succ(cur, case_block);
                    if let Some(end) = self.build_seq(&case.body, case_block) {
                        self.add_succ(end, merge);
                    }
                }
                if !has_default {
                    self.add_succ(cur, merge);
                }
                Some(merge)
            }
            Stmt::Block(ids) => {
                // A nested block shares control flow with its parent.
                self.build_seq(ids, cur)
            }
            _ => {
                self.push_node(cur, sid);
                Some(cur)
            }
        }
    }
}
