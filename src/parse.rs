//! Syntax-tree access for stages.
//!
//! Stages only read node shape, type and span. The tree lives in an arena
//! that is dropped as soon as the stage has computed its edits.

use lazy_static::lazy_static;
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    BindingPattern, Class, Declaration, Function, ImportDeclarationSpecifier, Program, Statement,
    VariableDeclaration,
};
use oxc_parser::Parser;
use oxc_span::SourceType;
use regex::Regex;
use std::collections::{HashMap, HashSet};

use crate::diagnostics::PipelineError;

lazy_static! {
    static ref IDENT_RE: Regex = Regex::new(r"^[a-zA-Z_$][a-zA-Z0-9_$]*$").unwrap();
    static ref RESERVED_WORDS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        for word in [
            "break", "case", "catch", "class", "const", "continue", "debugger", "default",
            "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for",
            "function", "if", "import", "in", "instanceof", "new", "null", "return", "super",
            "switch", "this", "throw", "true", "try", "typeof", "var", "void", "while", "with",
            "yield", "let", "static", "implements", "interface", "package", "private",
            "protected", "public", "await",
        ] {
            s.insert(word);
        }
        s
    };
}

/// Parses `code` as a module and runs `f` against the tree.
pub fn with_program<T, F>(code: &str, stage: &str, f: F) -> Result<T, PipelineError>
where
    F: for<'a> FnOnce(&Program<'a>) -> Result<T, PipelineError>,
{
    let allocator = Allocator::default();
    let source_type = SourceType::default().with_module(true);
    let ret = Parser::new(&allocator, code, source_type).parse();

    if ret.panicked || !ret.errors.is_empty() {
        let message = ret
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(PipelineError::Parse {
            stage: stage.to_string(),
            message,
        });
    }

    f(&ret.program)
}

/// Usable as a bare identifier (and so as an unquoted property key).
pub fn is_identifier_name(name: &str) -> bool {
    IDENT_RE.is_match(name) && !RESERVED_WORDS.contains(name)
}

pub fn collect_binding_names(pattern: &BindingPattern, names: &mut Vec<String>) {
    match pattern {
        BindingPattern::BindingIdentifier(id) => names.push(id.name.to_string()),
        BindingPattern::ObjectPattern(obj) => {
            for prop in &obj.properties {
                collect_binding_names(&prop.value, names);
            }
            if let Some(rest) = &obj.rest {
                collect_binding_names(&rest.argument, names);
            }
        }
        BindingPattern::ArrayPattern(arr) => {
            for elem in arr.elements.iter().flatten() {
                collect_binding_names(elem, names);
            }
            if let Some(rest) = &arr.rest {
                collect_binding_names(&rest.argument, names);
            }
        }
        BindingPattern::AssignmentPattern(assign) => collect_binding_names(&assign.left, names),
    }
}

/// What a top-level name is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopLevelKind {
    Function,
    Class,
    Variable,
    Import,
}

/// Top-level bindings of a program, including exported declarations.
pub fn top_level_bindings(program: &Program) -> HashMap<String, TopLevelKind> {
    let mut out = HashMap::new();
    for stmt in &program.body {
        match stmt {
            Statement::ExportNamedDeclaration(export) => match &export.declaration {
                Some(Declaration::FunctionDeclaration(func)) => {
                    bind_function(func, &mut out);
                }
                Some(Declaration::ClassDeclaration(class)) => bind_class(class, &mut out),
                Some(Declaration::VariableDeclaration(var)) => bind_variables(var, &mut out),
                _ => {}
            },
            Statement::ImportDeclaration(import) => {
                for spec in import.specifiers.iter().flatten() {
                    let local = match spec {
                        ImportDeclarationSpecifier::ImportSpecifier(s) => &s.local,
                        ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => &s.local,
                        ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => &s.local,
                    };
                    out.insert(local.name.to_string(), TopLevelKind::Import);
                }
            }
            Statement::FunctionDeclaration(func) => bind_function(func, &mut out),
            Statement::ClassDeclaration(class) => bind_class(class, &mut out),
            Statement::VariableDeclaration(var) => bind_variables(var, &mut out),
            _ => {}
        }
    }
    out
}

fn bind_function(func: &Function, out: &mut HashMap<String, TopLevelKind>) {
    if let Some(id) = &func.id {
        out.insert(id.name.to_string(), TopLevelKind::Function);
    }
}

fn bind_class(class: &Class, out: &mut HashMap<String, TopLevelKind>) {
    if let Some(id) = &class.id {
        out.insert(id.name.to_string(), TopLevelKind::Class);
    }
}

fn bind_variables(var: &VariableDeclaration, out: &mut HashMap<String, TopLevelKind>) {
    let mut names = Vec::new();
    for d in &var.declarations {
        collect_binding_names(&d.id, &mut names);
    }
    for name in names {
        out.insert(name, TopLevelKind::Variable);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_names() {
        assert!(is_identifier_name("foo"));
        assert!(is_identifier_name("$_a1"));
        assert!(!is_identifier_name("a-b"));
        assert!(!is_identifier_name("1a"));
        assert!(!is_identifier_name("class"));
    }

    #[test]
    fn test_parse_error_names_stage() {
        let err = with_program("let = ;", "exports", |_| Ok(())).unwrap_err();
        match err {
            PipelineError::Parse { stage, .. } => assert_eq!(stage, "exports"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_top_level_bindings() {
        let code = "import a, { b as c } from 'x';\nfunction f(){}\nclass K {}\nconst { d, e: [g] } = o;\nexport let h = 1;";
        let bindings = with_program(code, "test", |program| Ok(top_level_bindings(program))).unwrap();
        assert_eq!(bindings.get("a"), Some(&TopLevelKind::Import));
        assert_eq!(bindings.get("c"), Some(&TopLevelKind::Import));
        assert_eq!(bindings.get("f"), Some(&TopLevelKind::Function));
        assert_eq!(bindings.get("K"), Some(&TopLevelKind::Class));
        assert_eq!(bindings.get("d"), Some(&TopLevelKind::Variable));
        assert_eq!(bindings.get("g"), Some(&TopLevelKind::Variable));
        assert_eq!(bindings.get("h"), Some(&TopLevelKind::Variable));
        assert!(!bindings.contains_key("e"));
    }
}
