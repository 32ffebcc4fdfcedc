//! Import preservation.
//!
//! Import declarations leave the unit before optimization and come back
//! verbatim afterwards. In between, every imported local is known under its
//! mangled name and declared as an extern function, and `import(...)` calls
//! a stub function instead.

use oxc_ast::ast::{ImportDeclarationSpecifier, Statement};
use oxc_ast_visit::Visit;
use oxc_span::GetSpan;
use std::collections::HashMap;

use crate::diagnostics::PipelineError;
use crate::edit::{apply, Edit, SyntaxRange};
use crate::parse::with_program;
use crate::scope::{module_scope_names, ReferenceRewriter};
use crate::stage::{ExternContext, StageContext};
use crate::stages::statement_line;

const STAGE: &str = "imports";

pub fn preserve(code: &str, ctx: &mut StageContext<'_>) -> Result<Vec<Edit>, PipelineError> {
    let mangler = ctx.mangler;
    let registry = &mut ctx.memory.imports;

    with_program(code, STAGE, |program| {
        let mut edits = Vec::new();
        let mut renames = HashMap::new();

        for stmt in &program.body {
            let Statement::ImportDeclaration(import) = stmt else {
                continue;
            };
            let origin = import.source.value.as_str();
            let text = &code[import.span.start as usize..import.span.end as usize];
            registry.retain(origin, text);
            edits.push(Edit::remove(statement_line(code, import.span)));

            let origin_id = mangler.origin_id(origin);
            for spec in import.specifiers.iter().flatten() {
                let local = match spec {
                    ImportDeclarationSpecifier::ImportSpecifier(s) => &s.local,
                    ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => &s.local,
                    ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => &s.local,
                };
                let mangled = mangler.mangle(local.name.as_str(), &origin_id);
                if !registry.is_mangled(&mangled) {
                    registry.mangled.push(mangled.clone());
                }
                renames.insert(local.name.to_string(), mangled);
            }
        }

        let dynamic_name = mangler.dynamic_import_name();
        let mut rewriter = ReferenceRewriter::new(&renames).with_dynamic_import(&dynamic_name);
        rewriter.visit_program(program);
        if rewriter.dynamic_imports > 0 {
            registry.dynamic_import = Some(dynamic_name.clone());
        }
        edits.extend(rewriter.edits);

        log::debug!(
            "{}: {} import origin(s), {} binding(s) renamed",
            STAGE,
            registry.retained.len(),
            renames.len()
        );
        Ok(edits)
    })
}

pub fn externs(ctx: &ExternContext<'_>) -> Option<String> {
    let registry = &ctx.memory.imports;
    let mut out = String::new();
    for name in &registry.mangled {
        out.push_str(&format!("function {}(){{}};\n", name));
    }
    if let Some(name) = &registry.dynamic_import {
        out.push_str(&format!("function {}(path){{}};\n", name));
    }
    (!out.is_empty()).then_some(out)
}

pub fn restore(code: &str, ctx: &mut StageContext<'_>) -> Result<Vec<Edit>, PipelineError> {
    let registry = &ctx.memory.imports;
    if registry.retained.is_empty() && registry.dynamic_import.is_none() {
        return Ok(vec![]);
    }

    let mut originals = Vec::new();
    for mangled in &registry.mangled {
        match ctx.mangler.resolve(mangled) {
            Some(original) => originals.push((mangled.clone(), original)),
            None => log::warn!("{}: `{}` has no registered original name", STAGE, mangled),
        }
    }

    with_program(code, STAGE, |program| {
        // A module-scope declaration the optimizer left under an imported
        // name makes that name unusable for the import. Those imports bind
        // their mangled name instead.
        let taken = module_scope_names(&program.body);
        let mut renames = HashMap::new();
        let mut rebound = HashMap::new();
        for (mangled, original) in originals {
            if taken.contains(&original) {
                log::debug!("{}: `{}` is declared at module scope, importing as `{}`", STAGE, original, mangled);
                rebound.insert(original, mangled);
            } else {
                renames.insert(mangled, original);
            }
        }
        if let Some(name) = &registry.dynamic_import {
            renames.insert(name.clone(), "import".to_string());
        }

        let mut rewriter = ReferenceRewriter::new(&renames).guard_target();
        rewriter.visit_program(program);

        let mut edits = Vec::new();
        for (_, text) in &registry.retained {
            let text = rebind_locals(text, &rebound)?;
            edits.push(Edit::append_before(SyntaxRange::at(0), format!("{}\n", text)));
        }
        // The optimizer introduced a local with the original name somewhere
        // the import is used; keep the mangled name there as an alias.
        for mangled in &rewriter.conflicts {
            if let Some(original) = renames.get(mangled) {
                log::debug!("{}: `{}` is shadowed, aliasing as `{}`", STAGE, original, mangled);
                edits.push(Edit::append_before(
                    SyntaxRange::at(0),
                    format!("const {} = {};\n", mangled, original),
                ));
            }
        }
        edits.extend(rewriter.edits);
        Ok(edits)
    })
}

/// Rewrites import declarations in `text` so that each local named in
/// `rebound` is bound under its replacement name instead.
fn rebind_locals(text: &str, rebound: &HashMap<String, String>) -> Result<String, PipelineError> {
    if rebound.is_empty() {
        return Ok(text.to_string());
    }
    let edits = with_program(text, STAGE, |program| {
        let mut edits = Vec::new();
        for stmt in &program.body {
            let Statement::ImportDeclaration(import) = stmt else {
                continue;
            };
            for spec in import.specifiers.iter().flatten() {
                let (local, shorthand) = match spec {
                    ImportDeclarationSpecifier::ImportSpecifier(s) => {
                        (&s.local, s.imported.span() == s.local.span)
                    }
                    ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => (&s.local, false),
                    ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => (&s.local, false),
                };
                let Some(name) = rebound.get(local.name.as_str()) else {
                    continue;
                };
                let replacement = if shorthand {
                    format!("{} as {}", local.name, name)
                } else {
                    name.clone()
                };
                edits.push(Edit::overwrite(local.span, replacement));
            }
        }
        Ok(edits)
    })?;
    let (rewritten, _) = apply(&edits, text, STAGE)?;
    Ok(rewritten)
}
