//! Export Discovery Module
//!
//! Classifies every export declaration of an entry module into an
//! `ExportBinding` and describes how the declaration has to be rewritten so
//! that the optimizer only sees plain declarations.

use oxc_ast::ast::{
    Declaration, ExportDefaultDeclarationKind, ExportNamedDeclaration, ModuleExportName, Program,
    Statement,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::diagnostics::PipelineError;
use crate::edit::SyntaxRange;
use crate::mangle::SharedMangler;
use crate::parse::{collect_binding_names, top_level_bindings, with_program, TopLevelKind};

pub const DEFAULT_EXPORT: &str = "default";

// ═══════════════════════════════════════════════════════════════════════════════
// EXPORT BINDINGS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClosureKind {
    NamedFunction,
    NamedClass,
    NamedDefaultFunction,
    DefaultFunction,
    NamedDefaultClass,
    DefaultClass,
    NamedConstant,
}

impl ClosureKind {
    pub fn is_function(self) -> bool {
        matches!(
            self,
            ClosureKind::NamedFunction | ClosureKind::NamedDefaultFunction | ClosureKind::DefaultFunction
        )
    }

    pub fn is_class(self) -> bool {
        matches!(
            self,
            ClosureKind::NamedClass | ClosureKind::NamedDefaultClass | ClosureKind::DefaultClass
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBinding {
    pub local_name: String,
    pub exported_name: String,
    pub closure_kind: ClosureKind,
    /// The export statement in the buffer discovery ran on.
    pub range: SyntaxRange,
    pub origin_module: Option<String>,
}

/// Export bindings of one compilation unit, in source order.
#[derive(Debug, Clone, Default)]
pub struct ExportRegistry {
    bindings: Vec<ExportBinding>,
}

impl ExportRegistry {
    pub fn record(&mut self, binding: ExportBinding) {
        self.bindings.push(binding);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExportBinding> {
        self.bindings.iter()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn by_exported(&self, exported: &str) -> Option<&ExportBinding> {
        self.bindings.iter().find(|b| b.exported_name == exported)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DISCOVERY
// ═══════════════════════════════════════════════════════════════════════════════

/// How one export statement turns into a plain declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteRewrite {
    /// Drop the `export` / `export default` keywords in front of a declaration.
    StripPrefix(SyntaxRange),
    /// Drop the keywords and give the anonymous declaration a name.
    NameAnonymous {
        prefix: SyntaxRange,
        insert_at: u32,
        name: String,
    },
    /// The statement declares nothing itself (`export { a }`, `export default a`).
    RemoveStatement(SyntaxRange),
}

#[derive(Debug, Clone)]
pub struct ExportSite {
    pub rewrite: SiteRewrite,
    pub bindings: Vec<ExportBinding>,
}

/// Walks the top level of `program` and classifies every export.
pub fn discover(
    program: &Program,
    code: &str,
    file: &str,
    mangler: &SharedMangler,
) -> Result<Vec<ExportSite>, PipelineError> {
    let top = top_level_bindings(program);
    let mut sites = Vec::new();

    for stmt in &program.body {
        match stmt {
            Statement::ExportAllDeclaration(all) => {
                let construct = match &all.exported {
                    Some(name) => format!(
                        "export * as {} from '{}'",
                        export_name(name),
                        all.source.value
                    ),
                    None => format!("export * from '{}'", all.source.value),
                };
                return Err(PipelineError::unsupported(&construct, file, code, all.span.start));
            }
            Statement::ExportNamedDeclaration(named) => {
                if let Some(site) = named_site(named, code, file, &top)? {
                    sites.push(site);
                }
            }
            Statement::ExportDefaultDeclaration(default) => {
                let range = SyntaxRange::from(default.span);
                let binding = |local: String, kind: ClosureKind| ExportBinding {
                    local_name: local,
                    exported_name: DEFAULT_EXPORT.to_string(),
                    closure_kind: kind,
                    range,
                    origin_module: None,
                };
                let site = match &default.declaration {
                    ExportDefaultDeclarationKind::FunctionDeclaration(func) => {
                        let prefix = SyntaxRange::new(default.span.start, func.span.start);
                        match &func.id {
                            Some(id) => ExportSite {
                                rewrite: SiteRewrite::StripPrefix(prefix),
                                bindings: vec![binding(
                                    id.name.to_string(),
                                    ClosureKind::NamedDefaultFunction,
                                )],
                            },
                            None => {
                                let name = synthetic_default_name(file, mangler);
                                ExportSite {
                                    rewrite: SiteRewrite::NameAnonymous {
                                        prefix,
                                        insert_at: func.params.span.start,
                                        name: name.clone(),
                                    },
                                    bindings: vec![binding(name, ClosureKind::DefaultFunction)],
                                }
                            }
                        }
                    }
                    ExportDefaultDeclarationKind::ClassDeclaration(class) => {
                        let prefix = SyntaxRange::new(default.span.start, class.span.start);
                        match &class.id {
                            Some(id) => ExportSite {
                                rewrite: SiteRewrite::StripPrefix(prefix),
                                bindings: vec![binding(
                                    id.name.to_string(),
                                    ClosureKind::NamedDefaultClass,
                                )],
                            },
                            None => {
                                let name = synthetic_default_name(file, mangler);
                                ExportSite {
                                    rewrite: SiteRewrite::NameAnonymous {
                                        prefix,
                                        insert_at: class.span.start + "class".len() as u32,
                                        name: name.clone(),
                                    },
                                    bindings: vec![binding(name, ClosureKind::DefaultClass)],
                                }
                            }
                        }
                    }
                    ExportDefaultDeclarationKind::Identifier(ident) => {
                        let local = ident.name.to_string();
                        let kind = match top.get(&local) {
                            Some(TopLevelKind::Function) => ClosureKind::NamedDefaultFunction,
                            Some(TopLevelKind::Class) => ClosureKind::NamedDefaultClass,
                            _ => ClosureKind::NamedConstant,
                        };
                        ExportSite {
                            rewrite: SiteRewrite::RemoveStatement(range),
                            bindings: vec![binding(local, kind)],
                        }
                    }
                    _ => {
                        return Err(PipelineError::unsupported(
                            "export default of a non-identifier expression",
                            file,
                            code,
                            default.span.start,
                        ))
                    }
                };
                sites.push(site);
            }
            _ => {}
        }
    }

    Ok(sites)
}

fn named_site(
    named: &ExportNamedDeclaration,
    code: &str,
    file: &str,
    top: &HashMap<String, TopLevelKind>,
) -> Result<Option<ExportSite>, PipelineError> {
    let range = SyntaxRange::from(named.span);

    if let Some(source) = &named.source {
        let construct = format!("export {{ ... }} from '{}'", source.value);
        return Err(PipelineError::unsupported(&construct, file, code, named.span.start));
    }

    let binding = |local: String, exported: String, kind: ClosureKind| ExportBinding {
        local_name: local,
        exported_name: exported,
        closure_kind: kind,
        range,
        origin_module: None,
    };

    let site = match &named.declaration {
        Some(Declaration::FunctionDeclaration(func)) => {
            let Some(id) = &func.id else { return Ok(None) };
            ExportSite {
                rewrite: SiteRewrite::StripPrefix(SyntaxRange::new(named.span.start, func.span.start)),
                bindings: vec![binding(id.name.to_string(), id.name.to_string(), ClosureKind::NamedFunction)],
            }
        }
        Some(Declaration::ClassDeclaration(class)) => {
            let Some(id) = &class.id else { return Ok(None) };
            ExportSite {
                rewrite: SiteRewrite::StripPrefix(SyntaxRange::new(named.span.start, class.span.start)),
                bindings: vec![binding(id.name.to_string(), id.name.to_string(), ClosureKind::NamedClass)],
            }
        }
        Some(Declaration::VariableDeclaration(var)) => {
            let mut names = Vec::new();
            for d in &var.declarations {
                collect_binding_names(&d.id, &mut names);
            }
            ExportSite {
                rewrite: SiteRewrite::StripPrefix(SyntaxRange::new(named.span.start, var.span.start)),
                bindings: names
                    .into_iter()
                    .map(|n| binding(n.clone(), n, ClosureKind::NamedConstant))
                    .collect(),
            }
        }
        Some(_) => return Ok(None),
        None => {
            let bindings = named
                .specifiers
                .iter()
                .map(|spec| {
                    let local = export_name(&spec.local);
                    let exported = export_name(&spec.exported);
                    let is_default = exported == DEFAULT_EXPORT;
                    let kind = match (top.get(&local), is_default) {
                        (Some(TopLevelKind::Function), false) => ClosureKind::NamedFunction,
                        (Some(TopLevelKind::Function), true) => ClosureKind::NamedDefaultFunction,
                        (Some(TopLevelKind::Class), false) => ClosureKind::NamedClass,
                        (Some(TopLevelKind::Class), true) => ClosureKind::NamedDefaultClass,
                        _ => ClosureKind::NamedConstant,
                    };
                    binding(local, exported, kind)
                })
                .collect();
            ExportSite {
                rewrite: SiteRewrite::RemoveStatement(range),
                bindings,
            }
        }
    };
    Ok(Some(site))
}

fn export_name(name: &ModuleExportName) -> String {
    match name {
        ModuleExportName::IdentifierName(n) => n.name.to_string(),
        ModuleExportName::IdentifierReference(r) => r.name.to_string(),
        ModuleExportName::StringLiteral(s) => s.value.to_string(),
    }
}

fn synthetic_default_name(file: &str, mangler: &SharedMangler) -> String {
    let id = mangler.origin_id(file);
    mangler.mangle("default_export", &id)
}

/// Pre-bundle discovery for one source module.
///
/// Only the entry module's exports survive bundling as exports of the chunk,
/// so other modules report nothing.
pub fn discover_module_exports(
    file: &str,
    code: &str,
    is_entry: bool,
    mangler: &SharedMangler,
) -> Result<Vec<ExportBinding>, PipelineError> {
    if !is_entry {
        return Ok(vec![]);
    }
    let sites = with_program(code, "export-discovery", |program| {
        discover(program, code, file, mangler)
    })?;
    let bindings = sites
        .into_iter()
        .flat_map(|site| site.bindings)
        .map(|mut b| {
            b.origin_module = Some(file.to_string());
            b
        })
        .collect::<Vec<_>>();
    log::debug!("{}: discovered {} export(s)", file, bindings.len());
    Ok(bindings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sites(code: &str) -> Result<Vec<ExportSite>, PipelineError> {
        let mangler = SharedMangler::new(0);
        with_program(code, "test", |program| discover(program, code, "entry.js", &mangler))
    }

    fn kinds(code: &str) -> Vec<(String, String, ClosureKind)> {
        sites(code)
            .unwrap()
            .into_iter()
            .flat_map(|s| s.bindings)
            .map(|b| (b.local_name, b.exported_name, b.closure_kind))
            .collect()
    }

    #[test]
    fn test_named_declarations() {
        let found = kinds("export function foo(){}\nexport class Bar {}\nexport let a = 1, { b } = o;");
        assert_eq!(
            found,
            vec![
                ("foo".into(), "foo".into(), ClosureKind::NamedFunction),
                ("Bar".into(), "Bar".into(), ClosureKind::NamedClass),
                ("a".into(), "a".into(), ClosureKind::NamedConstant),
                ("b".into(), "b".into(), ClosureKind::NamedConstant),
            ]
        );
    }

    #[test]
    fn test_specifiers_use_declaration_shape() {
        let found = kinds("function f(){}\nclass K {}\nlet v = 1;\nexport { f as g, K, v, f as default };");
        assert_eq!(
            found,
            vec![
                ("f".into(), "g".into(), ClosureKind::NamedFunction),
                ("K".into(), "K".into(), ClosureKind::NamedClass),
                ("v".into(), "v".into(), ClosureKind::NamedConstant),
                ("f".into(), "default".into(), ClosureKind::NamedDefaultFunction),
            ]
        );
    }

    #[test]
    fn test_default_forms() {
        assert_eq!(
            kinds("export default function main(){}")[0].2,
            ClosureKind::NamedDefaultFunction
        );
        assert_eq!(kinds("export default class App {}")[0].2, ClosureKind::NamedDefaultClass);
        assert_eq!(kinds("export default class {}")[0].2, ClosureKind::DefaultClass);

        let found = kinds("export default function(){}");
        assert_eq!(found[0].2, ClosureKind::DefaultFunction);
        assert!(found[0].0.starts_with("default_export_"));
    }

    #[test]
    fn test_anonymous_default_is_named_in_place() {
        let code = "export default function (a) {}";
        let site = sites(code).unwrap().remove(0);
        match site.rewrite {
            SiteRewrite::NameAnonymous { prefix, insert_at, .. } => {
                assert_eq!(&code[prefix.start as usize..prefix.end as usize], "export default ");
                assert_eq!(&code[insert_at as usize..], "(a) {}");
            }
            other => panic!("unexpected rewrite {other:?}"),
        }
    }

    #[test]
    fn test_wildcard_reexport_is_rejected() {
        let err = sites("const a = 1;\nexport * from './x';").unwrap_err();
        match err {
            PipelineError::UnsupportedSyntaxForm { construct, line, .. } => {
                assert_eq!(construct, "export * from './x'");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_sourced_reexport_is_rejected() {
        assert!(matches!(
            sites("export { a } from './x';"),
            Err(PipelineError::UnsupportedSyntaxForm { .. })
        ));
    }

    #[test]
    fn test_default_expression_is_rejected() {
        assert!(matches!(
            sites("export default 1 + 2;"),
            Err(PipelineError::UnsupportedSyntaxForm { .. })
        ));
    }

    #[test]
    fn test_module_discovery_tags_origin() {
        let mangler = SharedMangler::new(0);
        let found = discover_module_exports("src/main.js", "export const x = 1;", true, &mangler).unwrap();
        assert_eq!(found[0].origin_module.as_deref(), Some("src/main.js"));

        let skipped = discover_module_exports("src/dep.js", "export * from './y';", false, &mangler).unwrap();
        assert!(skipped.is_empty());
    }
}
