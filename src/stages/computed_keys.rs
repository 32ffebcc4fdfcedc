use oxc_ast::ast::{MethodDefinition, ObjectProperty, PropertyDefinition, PropertyKey};
use oxc_ast_visit::{walk, Visit};
use oxc_span::{GetSpan, Span};

use crate::diagnostics::PipelineError;
use crate::edit::{Edit, SyntaxRange};
use crate::parse::{is_identifier_name, with_program};
use crate::stage::StageContext;

const STAGE: &str = "computed-keys";

/// Keys that read differently once unquoted inside a class body.
const CLASS_CONTEXTUAL: [&str; 7] = [
    "constructor",
    "prototype",
    "get",
    "set",
    "static",
    "async",
    "accessor",
];

/// `{['a']: 1}` to `{a: 1}` and `{[0]: 1}` to `{0: 1}`.
pub fn normalize(code: &str, _ctx: &mut StageContext<'_>) -> Result<Vec<Edit>, PipelineError> {
    with_program(code, STAGE, |program| {
        let mut finder = KeyFinder {
            code,
            edits: Vec::new(),
        };
        finder.visit_program(program);
        Ok(finder.edits)
    })
}

struct KeyFinder<'c> {
    code: &'c str,
    edits: Vec<Edit>,
}

impl KeyFinder<'_> {
    fn unwrap_key(&mut self, key: &PropertyKey, reserved: &[&str]) {
        let replacement = match key {
            PropertyKey::StringLiteral(lit) => {
                let value = lit.value.as_str();
                if !is_identifier_name(value) || reserved.contains(&value) {
                    return;
                }
                value.to_string()
            }
            PropertyKey::NumericLiteral(num) => self.text(num.span).to_string(),
            _ => return,
        };
        if let Some(range) = self.brackets(key.span()) {
            self.edits.push(Edit::overwrite(range, replacement));
        }
    }

    fn text(&self, span: Span) -> &str {
        &self.code[span.start as usize..span.end as usize]
    }

    /// The `[` ... `]` pair around a key, whitespace allowed inside.
    fn brackets(&self, span: Span) -> Option<SyntaxRange> {
        let before = self.code[..span.start as usize].trim_end();
        if !before.ends_with('[') {
            return None;
        }
        let after = &self.code[span.end as usize..];
        let trimmed = after.trim_start();
        if !trimmed.starts_with(']') {
            return None;
        }
        let open = before.len() - 1;
        let close = span.end as usize + (after.len() - trimmed.len());
        Some(SyntaxRange::new(open as u32, close as u32 + 1))
    }
}

impl<'a> Visit<'a> for KeyFinder<'_> {
    fn visit_object_property(&mut self, prop: &ObjectProperty<'a>) {
        if prop.computed {
            self.unwrap_key(&prop.key, &["__proto__"]);
        }
        walk::walk_object_property(self, prop);
    }

    fn visit_method_definition(&mut self, method: &MethodDefinition<'a>) {
        if method.computed {
            self.unwrap_key(&method.key, &CLASS_CONTEXTUAL);
        }
        walk::walk_method_definition(self, method);
    }

    fn visit_property_definition(&mut self, prop: &PropertyDefinition<'a>) {
        if prop.computed {
            self.unwrap_key(&prop.key, &CLASS_CONTEXTUAL);
        }
        walk::walk_property_definition(self, prop);
    }
}
