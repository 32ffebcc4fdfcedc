//! Export preservation.
//!
//! Before optimization every export of the entry unit becomes a plain
//! declaration plus a `window["name"] = local;` assignment, which the
//! optimizer keeps as an observable side effect. Afterwards the optimized
//! program is re-parsed and each such assignment is turned back into an
//! export, whatever local the optimizer left it pointing at.

use oxc_ast::ast::{
    AssignmentExpression, AssignmentOperator, AssignmentTarget, Class, Expression, Function,
    Program, Statement,
};
use oxc_span::{GetSpan, Span};
use std::collections::{HashMap, HashSet};

use crate::diagnostics::{Anomaly, PipelineError};
use crate::discovery::{discover, ClosureKind, ExportBinding, SiteRewrite, DEFAULT_EXPORT};
use crate::edit::{Edit, SyntaxRange};
use crate::mangle::SharedMangler;
use crate::parse::{is_identifier_name, top_level_bindings, with_program, TopLevelKind};
use crate::stage::{ExternContext, StageContext};
use crate::stages::statement_line;

const STAGE: &str = "exports";
const GLOBAL: &str = "window";

// ═══════════════════════════════════════════════════════════════════════════════
// PRE-PHASE
// ═══════════════════════════════════════════════════════════════════════════════

pub fn preserve(code: &str, ctx: &mut StageContext<'_>) -> Result<Vec<Edit>, PipelineError> {
    if !ctx.options.format.is_module() {
        return Ok(vec![]);
    }
    let sites = with_program(code, STAGE, |program| {
        discover(program, code, ctx.file_name, ctx.mangler)
    })?;

    let mut edits = Vec::new();
    let mut tail = String::new();
    for site in sites {
        match site.rewrite {
            SiteRewrite::StripPrefix(prefix) => edits.push(Edit::remove(prefix)),
            SiteRewrite::NameAnonymous {
                prefix,
                insert_at,
                name,
            } => {
                edits.push(Edit::remove(prefix));
                edits.push(Edit::append_before(SyntaxRange::at(insert_at), format!(" {}", name)));
            }
            SiteRewrite::RemoveStatement(range) => {
                let span = Span::new(range.start, range.end);
                edits.push(Edit::remove(statement_line(code, span)));
            }
        }
        for binding in site.bindings {
            tail.push_str(&format!(
                "\n{}[{}] = {};",
                GLOBAL,
                string_literal(&binding.exported_name),
                binding.local_name
            ));
            ctx.memory.exports.record(binding);
        }
    }
    if !tail.is_empty() {
        edits.push(Edit::append(tail));
    }
    log::debug!("{}: {} export(s) preserved", STAGE, ctx.memory.exports.len());
    Ok(edits)
}

pub fn externs(ctx: &ExternContext<'_>) -> Option<String> {
    if !ctx.options.format.is_module() || ctx.memory.exports.is_empty() {
        return None;
    }
    let mut seen = HashSet::new();
    let mut out = String::new();
    for binding in ctx.memory.exports.iter() {
        let name = binding.exported_name.as_str();
        if !seen.insert(name) {
            continue;
        }
        if name == DEFAULT_EXPORT || is_identifier_name(name) {
            out.push_str(&format!("{}.{};\n", GLOBAL, name));
        } else {
            out.push_str(&format!("{}[{}];\n", GLOBAL, string_literal(name)));
        }
    }
    Some(out)
}

// ═══════════════════════════════════════════════════════════════════════════════
// POST-PHASE
// ═══════════════════════════════════════════════════════════════════════════════

pub fn restore(code: &str, ctx: &mut StageContext<'_>) -> Result<Vec<Edit>, PipelineError> {
    if !ctx.options.format.is_module() || ctx.memory.exports.is_empty() {
        return Ok(vec![]);
    }
    let bindings: Vec<ExportBinding> = ctx.memory.exports.iter().cloned().collect();
    let imported: HashSet<String> = ctx.memory.imports.mangled.iter().cloned().collect();
    let file = ctx.file_name;
    let mangler = ctx.mangler;

    let (edits, anomalies) = with_program(code, STAGE, |program| {
        let mut restorer = Restorer::new(code, program, file, mangler, &imported);
        for binding in &bindings {
            restorer.restore(binding);
        }
        Ok(restorer.finish())
    })?;
    for anomaly in anomalies {
        ctx.warn(anomaly);
    }
    Ok(edits)
}

/// One `window.X = R` found at the top level of the optimized program.
struct Assignment<'t, 'a> {
    exported: String,
    right: &'t Expression<'a>,
    span: Span,
    statement: usize,
    used: bool,
}

/// What happens to one top-level statement that holds export assignments.
struct StatementPlan {
    span: Span,
    /// Spans of the statement's sequence elements, in order.
    elements: Vec<Span>,
    matched: Vec<(Span, Option<String>)>,
}

#[derive(Clone, Copy)]
struct Declaration {
    kind: TopLevelKind,
    start: u32,
    id: Span,
}

struct Restorer<'t, 'a> {
    code: &'t str,
    file: &'t str,
    mangler: &'t SharedMangler,
    imported: &'t HashSet<String>,
    top: HashMap<String, TopLevelKind>,
    /// Top-level function and class declarations by name.
    declarations: HashMap<String, Declaration>,
    assignments: Vec<Assignment<'t, 'a>>,
    plans: Vec<StatementPlan>,
    prefixed: HashSet<String>,
    declared: HashSet<String>,
    edits: Vec<Edit>,
    aggregate: Vec<(String, String)>,
    anomalies: Vec<Anomaly>,
}

impl<'t, 'a> Restorer<'t, 'a> {
    fn new(
        code: &'t str,
        program: &'t Program<'a>,
        file: &'t str,
        mangler: &'t SharedMangler,
        imported: &'t HashSet<String>,
    ) -> Self {
        let mut declarations = HashMap::new();
        let mut assignments = Vec::new();
        let mut plans = Vec::new();

        for stmt in &program.body {
            match stmt {
                Statement::FunctionDeclaration(func) => {
                    if let Some(id) = &func.id {
                        declarations.insert(
                            id.name.to_string(),
                            Declaration {
                                kind: TopLevelKind::Function,
                                start: func.span.start,
                                id: id.span,
                            },
                        );
                    }
                }
                Statement::ClassDeclaration(class) => {
                    if let Some(id) = &class.id {
                        declarations.insert(
                            id.name.to_string(),
                            Declaration {
                                kind: TopLevelKind::Class,
                                start: class.span.start,
                                id: id.span,
                            },
                        );
                    }
                }
                Statement::ExpressionStatement(expr_stmt) => {
                    let statement = plans.len();
                    let elements: Vec<&Expression<'a>> = match &expr_stmt.expression {
                        Expression::SequenceExpression(seq) => seq.expressions.iter().collect(),
                        other => vec![other],
                    };
                    let spans: Vec<Span> = elements.iter().map(|e| e.span()).collect();
                    let mut found = false;
                    for element in elements {
                        if let Expression::AssignmentExpression(assign) = element {
                            if let Some(exported) = global_property(assign) {
                                found = true;
                                assignments.push(Assignment {
                                    exported,
                                    right: &assign.right,
                                    span: assign.span,
                                    statement,
                                    used: false,
                                });
                            }
                        }
                    }
                    if found {
                        plans.push(StatementPlan {
                            span: expr_stmt.span,
                            elements: spans,
                            matched: Vec::new(),
                        });
                    }
                }
                _ => {}
            }
        }

        Restorer {
            code,
            file,
            mangler,
            imported,
            top: top_level_bindings(program),
            declarations,
            assignments,
            plans,
            prefixed: HashSet::new(),
            declared: HashSet::new(),
            edits: Vec::new(),
            aggregate: Vec::new(),
            anomalies: Vec::new(),
        }
    }

    fn restore(&mut self, binding: &ExportBinding) {
        let Some(index) = self
            .assignments
            .iter()
            .position(|a| !a.used && a.exported == binding.exported_name)
        else {
            self.anomalies.push(Anomaly::restoration(format!(
                "export `{}` (local `{}`) has no `{}` assignment in the optimized output",
                binding.exported_name, binding.local_name, GLOBAL
            )));
            return;
        };
        self.assignments[index].used = true;
        let right = self.assignments[index].right;
        let span = self.assignments[index].span;
        let statement = self.assignments[index].statement;

        let replacement = self.restoration(binding, right);
        self.plans[statement].matched.push((span, replacement));
    }

    /// Declaration text that takes the assignment's place, if any. Prefixes
    /// and aggregate entries are recorded on the side.
    fn restoration(&mut self, binding: &ExportBinding, right: &Expression<'a>) -> Option<String> {
        let exported = binding.exported_name.as_str();
        let kind = binding.closure_kind;

        match right.without_parentheses() {
            Expression::Identifier(ident) => {
                let local = ident.name.as_str();
                if self.imported.contains(local) {
                    self.export_alias(local, exported);
                    return None;
                }
                if let Some(&decl) = self.declarations.get(local) {
                    let shape_matches = (kind.is_function() && decl.kind == TopLevelKind::Function)
                        || (kind.is_class() && decl.kind == TopLevelKind::Class);
                    if shape_matches && !self.prefixed.contains(local) {
                        if exported == DEFAULT_EXPORT {
                            self.prefix(local, decl.start, "export default ");
                            if matches!(kind, ClosureKind::DefaultFunction | ClosureKind::DefaultClass) {
                                self.unname(local, decl.id);
                            }
                            return None;
                        }
                        if exported == local {
                            self.prefix(local, decl.start, "export ");
                            return None;
                        }
                    }
                }
                if self.top.contains_key(local) {
                    self.export_alias(local, exported);
                    return None;
                }
                self.constant(exported, right)
            }
            Expression::FunctionExpression(func) if kind.is_function() => {
                Some(self.function_declaration(func, exported))
            }
            Expression::ClassExpression(class) if kind.is_class() => {
                Some(self.class_declaration(class, exported))
            }
            _ => self.constant(exported, right),
        }
    }

    fn prefix(&mut self, local: &str, start: u32, keyword: &str) {
        self.prefixed.insert(local.to_string());
        self.edits.push(Edit::append_before(SyntaxRange::at(start), keyword));
    }

    /// Drops the name given to an anonymous default export, unless the
    /// optimized code still refers to it beyond the declaration and the
    /// export assignment.
    fn unname(&mut self, local: &str, id: Span) {
        if self.code.matches(local).count() != 2 {
            return;
        }
        let mut start = id.start;
        if start > 0 && self.code.as_bytes()[start as usize - 1] == b' ' {
            start -= 1;
        }
        self.edits.push(Edit::remove(SyntaxRange::new(start, id.end)));
    }

    fn export_alias(&mut self, local: &str, exported: &str) {
        self.aggregate.push((local.to_string(), exported.to_string()));
    }

    fn text(&self, span: Span) -> &'t str {
        let code = self.code;
        &code[span.start as usize..span.end as usize]
    }

    /// Whether `exported` can be declared under its own name.
    fn declarable(&self, exported: &str) -> bool {
        is_identifier_name(exported)
            && !self.top.contains_key(exported)
            && !self.declared.contains(exported)
    }

    fn fresh_local(&mut self, exported: &str) -> String {
        let base: String = exported
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '$' { c } else { '_' })
            .collect();
        let origin_id = self.mangler.origin_id(self.file);
        let mut name = self.mangler.mangle(&base, &origin_id);
        while self.top.contains_key(&name) || self.declared.contains(&name) {
            name.push('_');
        }
        name
    }

    /// `(own name, exported)` of a function or class expression turned into a
    /// declaration: the keyword prefix and the name to declare, if any.
    fn declaration_head(&mut self, own: Option<&str>, exported: &str) -> (&'static str, Option<String>) {
        match own {
            Some(own) if own == exported => ("export ", Some(own.to_string())),
            Some(own) if exported == DEFAULT_EXPORT => ("export default ", Some(own.to_string())),
            Some(own) => {
                self.export_alias(own, exported);
                ("", Some(own.to_string()))
            }
            None if exported == DEFAULT_EXPORT => ("export default ", None),
            None if self.declarable(exported) => ("export ", Some(exported.to_string())),
            None => {
                let local = self.fresh_local(exported);
                self.export_alias(&local, exported);
                ("", Some(local))
            }
        }
    }

    fn function_declaration(&mut self, func: &Function<'a>, exported: &str) -> String {
        let own = func.id.as_ref().map(|id| id.name.as_str());
        let (keyword, name) = self.declaration_head(own, exported);
        let mut out = String::from(keyword);
        if func.r#async {
            out.push_str("async ");
        }
        out.push_str("function");
        if func.generator {
            out.push('*');
        }
        if let Some(name) = name {
            out.push(' ');
            out.push_str(&name);
            self.declared.insert(name);
        }
        out.push_str(self.text(Span::new(func.params.span.start, func.span.end)));
        out
    }

    fn class_declaration(&mut self, class: &Class<'a>, exported: &str) -> String {
        let own = class.id.as_ref().map(|id| id.name.as_str());
        let body_start = match &class.id {
            Some(id) => id.span.end,
            None => class.span.start + "class".len() as u32,
        };
        let (keyword, name) = self.declaration_head(own, exported);
        let mut out = format!("{}class", keyword);
        if let Some(name) = name {
            out.push(' ');
            out.push_str(&name);
            self.declared.insert(name);
        }
        out.push_str(self.text(Span::new(body_start, class.span.end)));
        out
    }

    fn constant(&mut self, exported: &str, value: &Expression<'a>) -> Option<String> {
        let mut text = self.text(value.span()).to_string();
        if matches!(value.without_parentheses(), Expression::SequenceExpression(_)) {
            text = format!("({})", text);
        }
        if exported == DEFAULT_EXPORT {
            return Some(format!("export default {};", text));
        }
        let local = if self.declarable(exported) {
            exported.to_string()
        } else {
            self.fresh_local(exported)
        };
        self.declared.insert(local.clone());
        self.export_alias(&local, exported);
        Some(format!("const {} = {};", local, text))
    }

    /// Breaks a sequence that mixes export assignments with other side
    /// effects into one statement per run, so evaluation order is kept.
    fn split_sequence(&self, plan: StatementPlan) -> Edit {
        let mut out = String::new();
        let mut run: Vec<&str> = Vec::new();
        for span in &plan.elements {
            match plan.matched.iter().find(|(m, _)| m == span) {
                Some((_, replacement)) => {
                    flush_run(&mut out, &mut run);
                    if let Some(text) = replacement {
                        out.push_str(text);
                    }
                }
                None => run.push(self.text(*span)),
            }
        }
        flush_run(&mut out, &mut run);
        Edit::overwrite(plan.span, out)
    }

    fn finish(mut self) -> (Vec<Edit>, Vec<Anomaly>) {
        for plan in std::mem::take(&mut self.plans) {
            if plan.matched.is_empty() {
                continue;
            }
            if plan.matched.len() == plan.elements.len() {
                let texts: Vec<String> = plan.matched.into_iter().filter_map(|(_, t)| t).collect();
                if texts.is_empty() {
                    self.edits.push(Edit::remove(statement_line(self.code, plan.span)));
                } else {
                    self.edits.push(Edit::overwrite(plan.span, texts.join("\n")));
                }
            } else {
                let split = self.split_sequence(plan);
                self.edits.push(split);
            }
        }

        let mut tail = String::new();
        if !self.aggregate.is_empty() {
            let specifiers: Vec<String> = self
                .aggregate
                .iter()
                .map(|(local, exported)| export_specifier(local, exported))
                .collect();
            tail.push_str(&format!("\nexport{{{}}};", specifiers.join(",")));
        }
        if !tail.is_empty() {
            if self.code.ends_with('\n') {
                tail.remove(0);
                tail.push('\n');
            }
            self.edits.push(Edit::append(tail));
        }
        (self.edits, self.anomalies)
    }
}

/// Emits `run` as one expression statement.
fn flush_run(out: &mut String, run: &mut Vec<&str>) {
    if run.is_empty() {
        return;
    }
    let expression = run.join(",");
    run.clear();
    // These would read as a declaration or a block at statement start.
    let ambiguous = ["function", "async function", "class", "{", "let["]
        .iter()
        .any(|p| expression.starts_with(p));
    if ambiguous {
        out.push_str(&format!("({});", expression));
    } else {
        out.push_str(&expression);
        out.push(';');
    }
}

/// Double-quoted JS string literal for an export name.
fn string_literal(name: &str) -> String {
    serde_json::Value::from(name).to_string()
}

fn export_specifier(local: &str, exported: &str) -> String {
    if local == exported {
        return local.to_string();
    }
    if exported == DEFAULT_EXPORT || is_identifier_name(exported) {
        format!("{} as {}", local, exported)
    } else {
        format!("{} as {}", local, string_literal(exported))
    }
}

/// `X` of a plain `window.X = ...` or `window['X'] = ...`.
fn global_property(assign: &AssignmentExpression) -> Option<String> {
    if assign.operator != AssignmentOperator::Assign {
        return None;
    }
    match &assign.left {
        AssignmentTarget::StaticMemberExpression(member) if is_global(&member.object) => {
            Some(member.property.name.to_string())
        }
        AssignmentTarget::ComputedMemberExpression(member) if is_global(&member.object) => {
            match &member.expression {
                Expression::StringLiteral(lit) => Some(lit.value.to_string()),
                _ => None,
            }
        }
        _ => None,
    }
}

fn is_global(object: &Expression) -> bool {
    matches!(object, Expression::Identifier(id) if id.name.as_str() == GLOBAL)
}

#[cfg(test)]
#[path = "exports_tests.rs"]
mod tests;
