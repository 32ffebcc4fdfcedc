//! Scope-aware reference rewriting.
//!
//! Renames free references to a fixed set of top-level names while leaving
//! references that are shadowed by a parameter or a nested declaration
//! alone. Only what the rename needs is tracked: a stack of name sets, one
//! per function, block, loop head, catch clause and named class.

use oxc_ast::ast::{
    ArrowFunctionExpression, BlockStatement, CatchClause, Class, Expression, ForInStatement,
    ForOfStatement, ForStatement, ForStatementInit, ForStatementLeft, FormalParameters, Function,
    IdentifierReference, ImportExpression, ObjectProperty, Statement, StaticBlock,
    VariableDeclaration, VariableDeclarationKind,
};
use oxc_ast_visit::{walk, Visit};
use oxc_syntax::scope::ScopeFlags;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::edit::{Edit, SyntaxRange};
use crate::parse::collect_binding_names;

#[derive(Debug, Default)]
pub struct ScopeStack {
    scopes: Vec<HashSet<String>>,
}

impl ScopeStack {
    pub fn push(&mut self, names: HashSet<String>) {
        self.scopes.push(names);
    }

    pub fn pop(&mut self) {
        self.scopes.pop();
    }

    pub fn is_shadowed(&self, name: &str) -> bool {
        self.scopes.iter().any(|s| s.contains(name))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BINDING COLLECTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Binding identifiers of a parameter list. Default values are expressions
/// and are not entered.
struct BindingCollector<'s> {
    symbols: &'s mut HashSet<String>,
}

impl<'a> Visit<'a> for BindingCollector<'_> {
    fn visit_binding_identifier(&mut self, ident: &oxc_ast::ast::BindingIdentifier<'a>) {
        self.symbols.insert(ident.name.to_string());
    }

    fn visit_expression(&mut self, _expr: &Expression<'a>) {}
}

/// `var` declarations hoisted to the enclosing function.
struct VarCollector<'s> {
    symbols: &'s mut HashSet<String>,
}

impl<'a> Visit<'a> for VarCollector<'_> {
    fn visit_variable_declaration(&mut self, decl: &VariableDeclaration<'a>) {
        if decl.kind == VariableDeclarationKind::Var {
            let mut names = Vec::new();
            for d in &decl.declarations {
                collect_binding_names(&d.id, &mut names);
            }
            self.symbols.extend(names);
        }
        walk::walk_variable_declaration(self, decl);
    }

    fn visit_function(&mut self, _func: &Function<'a>, _flags: ScopeFlags) {}

    fn visit_arrow_function_expression(&mut self, _func: &ArrowFunctionExpression<'a>) {}

    fn visit_static_block(&mut self, _block: &StaticBlock<'a>) {}
}

fn parameter_names(params: &FormalParameters, symbols: &mut HashSet<String>) {
    let mut collector = BindingCollector { symbols };
    collector.visit_formal_parameters(params);
}

/// Block-scoped declarations made directly in `body`.
pub fn lexical_names(body: &[Statement], symbols: &mut HashSet<String>) {
    for stmt in body {
        match stmt {
            Statement::VariableDeclaration(var) if var.kind != VariableDeclarationKind::Var => {
                let mut names = Vec::new();
                for d in &var.declarations {
                    collect_binding_names(&d.id, &mut names);
                }
                symbols.extend(names);
            }
            Statement::FunctionDeclaration(func) => {
                if let Some(id) = &func.id {
                    symbols.insert(id.name.to_string());
                }
            }
            Statement::ClassDeclaration(class) => {
                if let Some(id) = &class.id {
                    symbols.insert(id.name.to_string());
                }
            }
            _ => {}
        }
    }
}

/// Everything a module declares in its own scope, `var`s in nested blocks
/// included.
pub fn module_scope_names(body: &[Statement]) -> HashSet<String> {
    let mut symbols = HashSet::new();
    function_body_names(body, &mut symbols);
    symbols
}

fn function_body_names(body: &[Statement], symbols: &mut HashSet<String>) {
    let mut vars = VarCollector {
        symbols: &mut *symbols,
    };
    for stmt in body {
        vars.visit_statement(stmt);
    }
    lexical_names(body, symbols);
}

fn declaration_names(decl: &VariableDeclaration) -> HashSet<String> {
    let mut names = Vec::new();
    if decl.kind != VariableDeclarationKind::Var {
        for d in &decl.declarations {
            collect_binding_names(&d.id, &mut names);
        }
    }
    names.into_iter().collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// REFERENCE REWRITER
// ═══════════════════════════════════════════════════════════════════════════════

/// Renames free references according to `renames` (`from -> to`).
///
/// A reference is rewritten when `from` is not shadowed at that point. With
/// `guard_target` set, a reference whose target name is shadowed there is
/// left alone and reported through `conflicts` instead.
pub struct ReferenceRewriter<'r> {
    renames: &'r HashMap<String, String>,
    /// Replacement for the `import` keyword of `import(...)` expressions.
    dynamic_import: Option<&'r str>,
    guard_target: bool,
    scopes: ScopeStack,
    pub edits: Vec<Edit>,
    pub conflicts: BTreeSet<String>,
    pub dynamic_imports: usize,
}

impl<'r> ReferenceRewriter<'r> {
    pub fn new(renames: &'r HashMap<String, String>) -> Self {
        ReferenceRewriter {
            renames,
            dynamic_import: None,
            guard_target: false,
            scopes: ScopeStack::default(),
            edits: Vec::new(),
            conflicts: BTreeSet::new(),
            dynamic_imports: 0,
        }
    }

    pub fn with_dynamic_import(mut self, name: &'r str) -> Self {
        self.dynamic_import = Some(name);
        self
    }

    pub fn guard_target(mut self) -> Self {
        self.guard_target = true;
        self
    }

    fn target_for(&mut self, name: &str) -> Option<&'r str> {
        let renames = self.renames;
        let target = renames.get(name)?;
        if self.scopes.is_shadowed(name) {
            return None;
        }
        if self.guard_target && self.scopes.is_shadowed(target) {
            self.conflicts.insert(name.to_string());
            return None;
        }
        Some(target.as_str())
    }

    fn scoped<F: FnOnce(&mut Self)>(&mut self, names: HashSet<String>, f: F) {
        self.scopes.push(names);
        f(self);
        self.scopes.pop();
    }
}

impl<'a> Visit<'a> for ReferenceRewriter<'_> {
    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        if let Some(target) = self.target_for(ident.name.as_str()) {
            self.edits.push(Edit::overwrite(ident.span, target));
        }
    }

    fn visit_object_property(&mut self, prop: &ObjectProperty<'a>) {
        if prop.shorthand {
            if let Expression::Identifier(ident) = &prop.value {
                if let Some(target) = self.target_for(ident.name.as_str()) {
                    self.edits
                        .push(Edit::overwrite(ident.span, format!("{}: {}", ident.name, target)));
                }
                return;
            }
        }
        walk::walk_object_property(self, prop);
    }

    fn visit_import_expression(&mut self, expr: &ImportExpression<'a>) {
        if let Some(name) = self.dynamic_import {
            let keyword = SyntaxRange::new(expr.span.start, expr.span.start + "import".len() as u32);
            self.edits.push(Edit::overwrite(keyword, name));
            self.dynamic_imports += 1;
        }
        walk::walk_import_expression(self, expr);
    }

    fn visit_function(&mut self, func: &Function<'a>, flags: ScopeFlags) {
        let mut names = HashSet::new();
        if let Some(id) = &func.id {
            names.insert(id.name.to_string());
        }
        parameter_names(&func.params, &mut names);
        if let Some(body) = &func.body {
            function_body_names(&body.statements, &mut names);
        }
        self.scoped(names, |this| walk::walk_function(this, func, flags));
    }

    fn visit_arrow_function_expression(&mut self, func: &ArrowFunctionExpression<'a>) {
        let mut names = HashSet::new();
        parameter_names(&func.params, &mut names);
        function_body_names(&func.body.statements, &mut names);
        self.scoped(names, |this| walk::walk_arrow_function_expression(this, func));
    }

    fn visit_class(&mut self, class: &Class<'a>) {
        let mut names = HashSet::new();
        if let Some(id) = &class.id {
            names.insert(id.name.to_string());
        }
        self.scoped(names, |this| walk::walk_class(this, class));
    }

    fn visit_static_block(&mut self, block: &StaticBlock<'a>) {
        let mut names = HashSet::new();
        function_body_names(&block.body, &mut names);
        self.scoped(names, |this| walk::walk_static_block(this, block));
    }

    fn visit_block_statement(&mut self, block: &BlockStatement<'a>) {
        let mut names = HashSet::new();
        lexical_names(&block.body, &mut names);
        self.scoped(names, |this| walk::walk_block_statement(this, block));
    }

    fn visit_for_statement(&mut self, stmt: &ForStatement<'a>) {
        let names = match &stmt.init {
            Some(ForStatementInit::VariableDeclaration(decl)) => declaration_names(decl),
            _ => HashSet::new(),
        };
        self.scoped(names, |this| walk::walk_for_statement(this, stmt));
    }

    fn visit_for_in_statement(&mut self, stmt: &ForInStatement<'a>) {
        let names = match &stmt.left {
            ForStatementLeft::VariableDeclaration(decl) => declaration_names(decl),
            _ => HashSet::new(),
        };
        self.scoped(names, |this| walk::walk_for_in_statement(this, stmt));
    }

    fn visit_for_of_statement(&mut self, stmt: &ForOfStatement<'a>) {
        let names = match &stmt.left {
            ForStatementLeft::VariableDeclaration(decl) => declaration_names(decl),
            _ => HashSet::new(),
        };
        self.scoped(names, |this| walk::walk_for_of_statement(this, stmt));
    }

    fn visit_catch_clause(&mut self, clause: &CatchClause<'a>) {
        let mut names = Vec::new();
        if let Some(param) = &clause.param {
            collect_binding_names(&param.pattern, &mut names);
        }
        self.scoped(names.into_iter().collect(), |this| {
            walk::walk_catch_clause(this, clause)
        });
    }
}
